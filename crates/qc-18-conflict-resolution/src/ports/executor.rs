//! Contract execution port
//!
//! The sandboxed interpreter lives outside this crate. It receives a
//! `ContractAccess` bound to one cache and one contract index and must be
//! deterministic given identical reads.

use crate::domain::{ContractAccess, ExecutionOutcome, Result};

/// Runs one contract invocation against the sub-block cache.
pub trait ContractExecutor<C> {
    fn execute(&mut self, contract: &C, state: &mut ContractAccess<'_>) -> Result<ExecutionOutcome>;
}

impl<C, F> ContractExecutor<C> for F
where
    F: FnMut(&C, &mut ContractAccess<'_>) -> Result<ExecutionOutcome>,
{
    fn execute(&mut self, contract: &C, state: &mut ContractAccess<'_>) -> Result<ExecutionOutcome> {
        self(contract, state)
    }
}
