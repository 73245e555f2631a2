//! Shared fixtures for integration tests.

#![allow(dead_code)]

use qc_18_conflict_resolution::{ContractAccess, CrError, ExecutionOutcome, Result};
use std::sync::Once;

static TRACING: Once = Once::new();

/// Install a test subscriber honouring `RUST_LOG`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Scripted contract used by the tests.
#[derive(Clone, Debug, PartialEq)]
pub enum Contract {
    /// `key = key or default`
    Init { key: &'static str, default: i64 },
    /// `to = from + delta`
    Derive {
        from: &'static str,
        to: &'static str,
        delta: i64,
    },
    /// Write a constant to several keys
    Put {
        keys: Vec<&'static str>,
        value: i64,
    },
    /// Debit a fee sink, then write `key = value`
    PayAndPut {
        fee_key: &'static str,
        key: &'static str,
        value: i64,
    },
}

pub fn read_int(state: &mut ContractAccess<'_>, key: &str) -> Result<Option<i64>> {
    match state.get(key)? {
        Some(bytes) => {
            let text = String::from_utf8(bytes).map_err(|e| CrError::Execution(e.to_string()))?;
            let n = text
                .parse::<i64>()
                .map_err(|e| CrError::Execution(e.to_string()))?;
            Ok(Some(n))
        }
        None => Ok(None),
    }
}

/// Deterministic interpreter for `Contract`.
pub fn interpret(contract: &Contract, state: &mut ContractAccess<'_>) -> Result<ExecutionOutcome> {
    match contract {
        Contract::Init { key, default } => {
            let value = read_int(state, key)?.unwrap_or(*default);
            state.set(key, value.to_string())?;
        }
        Contract::Derive { from, to, delta } => {
            let Some(base) = read_int(state, from)? else {
                return Ok(ExecutionOutcome::failure());
            };
            state.set(to, (base + delta).to_string())?;
        }
        Contract::Put { keys, value } => {
            for key in keys {
                state.set(key, value.to_string())?;
            }
        }
        Contract::PayAndPut {
            fee_key,
            key,
            value,
        } => {
            let balance = read_int(state, fee_key)?.unwrap_or(0);
            state.set(fee_key, (balance + 1).to_string())?;
            state.set(key, value.to_string())?;
        }
    }
    Ok(ExecutionOutcome::success())
}
