//! Context Pool
//!
//! Contexts are created once and handed out by value. A checked-out context
//! is owned exclusively by its scheduler, so nothing can touch a pooled
//! context's cache; `checkin` resets and verifies it before reuse.

use super::context::ConflictResolutionContext;
use super::merge::merge_to_master;
use crate::config::ConflictResolutionConfig;
use crate::domain::{CrError, Result};
use crate::ports::KeyValueStore;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, info};

/// Fixed set of reusable sub-block contexts sharing one ledger and common store.
pub struct ContextPool<C> {
    config: Arc<ConflictResolutionConfig>,
    common: Arc<dyn KeyValueStore>,
    master: Arc<dyn KeyValueStore>,
    available: VecDeque<ConflictResolutionContext<C>>,
}

impl<C> ContextPool<C> {
    pub fn new(
        config: ConflictResolutionConfig,
        common: Arc<dyn KeyValueStore>,
        master: Arc<dyn KeyValueStore>,
    ) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);
        let available = (0..config.num_slots)
            .map(|slot| {
                ConflictResolutionContext::new(slot, common.clone(), master.clone(), config.clone())
            })
            .collect();

        info!(slots = config.num_slots, "[qc-18] Context pool initialised");
        Ok(Self {
            config,
            common,
            master,
            available,
        })
    }

    pub fn config(&self) -> &ConflictResolutionConfig {
        &self.config
    }

    pub fn capacity(&self) -> usize {
        self.config.num_slots
    }

    pub fn available(&self) -> usize {
        self.available.len()
    }

    /// Take exclusive ownership of an idle context.
    pub fn checkout(&mut self) -> Result<ConflictResolutionContext<C>> {
        let ctx = self.available.pop_front().ok_or(CrError::PoolExhausted)?;
        debug!(slot = ctx.slot(), "[qc-18] Context checked out");
        Ok(ctx)
    }

    /// Reset `ctx` and return it to the pool.
    pub fn checkin(&mut self, mut ctx: ConflictResolutionContext<C>) -> Result<()> {
        if self.available.len() >= self.capacity()
            || self.available.iter().any(|c| c.slot() == ctx.slot())
        {
            return Err(CrError::InvariantViolation(format!(
                "slot {} returned to a pool that already holds it",
                ctx.slot()
            )));
        }
        ctx.reset();
        ctx.assert_reset()?;
        debug!(slot = ctx.slot(), "[qc-18] Context checked in");
        self.available.push_back(ctx);
        Ok(())
    }

    /// Copy the common store into the ledger (phase markers excluded).
    pub fn merge_to_master(&self) -> Result<usize> {
        merge_to_master(
            self.common.as_ref(),
            self.master.as_ref(),
            &self.config.phase_marker_keys,
        )
    }

    /// Clear the common store at block end. All contexts must be checked in.
    pub fn reset_common_store(&self) -> Result<()> {
        if self.available.len() != self.capacity() {
            return Err(CrError::InvariantViolation(format!(
                "{} context(s) still checked out",
                self.capacity() - self.available.len()
            )));
        }
        info!("[qc-18] Resetting common store");
        self.common.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryStore;
    use crate::application::Phase;
    use crate::domain::ExecutionStatus;

    fn pool(slots: usize) -> (ContextPool<u32>, Arc<InMemoryStore>, Arc<InMemoryStore>) {
        let common = Arc::new(InMemoryStore::new());
        let master = Arc::new(InMemoryStore::new());
        let config = ConflictResolutionConfig {
            num_slots: slots,
            ..Default::default()
        };
        let pool = ContextPool::new(config, common.clone(), master.clone()).unwrap();
        (pool, common, master)
    }

    #[test]
    fn test_checkout_until_exhausted() {
        let (mut pool, _, _) = pool(2);
        let a = pool.checkout().unwrap();
        let b = pool.checkout().unwrap();
        assert_ne!(a.slot(), b.slot());
        assert_eq!(pool.available(), 0);
        assert!(matches!(pool.checkout(), Err(CrError::PoolExhausted)));
    }

    #[test]
    fn test_checkin_resets_context() {
        let (mut pool, _, _) = pool(1);
        let mut ctx = pool.checkout().unwrap();
        ctx.begin([3; 32]).unwrap();
        ctx.add_contract_result(42, ExecutionStatus::Success).unwrap();

        pool.checkin(ctx).unwrap();
        let ctx = pool.checkout().unwrap();
        assert_eq!(ctx.phase(), Phase::Idle);
        ctx.assert_reset().unwrap();
    }

    #[test]
    fn test_reset_common_requires_all_contexts() {
        let (mut pool, common, _) = pool(2);
        common.set("k", b"v".to_vec()).unwrap();

        let ctx = pool.checkout().unwrap();
        assert!(pool.reset_common_store().is_err());
        pool.checkin(ctx).unwrap();

        pool.reset_common_store().unwrap();
        assert!(common.is_empty().unwrap());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = ConflictResolutionConfig {
            num_slots: 0,
            ..Default::default()
        };
        let result: Result<ContextPool<u32>> = ContextPool::new(
            config,
            Arc::new(InMemoryStore::new()),
            Arc::new(InMemoryStore::new()),
        );
        assert!(matches!(result, Err(CrError::InvalidConfig(_))));
    }

    #[test]
    fn test_pool_merge_to_master() {
        let (pool, common, master) = pool(1);
        common.set("a", b"1".to_vec()).unwrap();
        common.set("_sub_block_ready", b"1".to_vec()).unwrap();

        assert_eq!(pool.merge_to_master().unwrap(), 1);
        assert_eq!(master.keys().unwrap(), vec!["a"]);
    }
}
