//! Canonical State Representation
//!
//! `SET <key> <value>;` per key, keys in ascending byte order, values as
//! UTF-8 text. Every node must produce byte-identical output, so entries are
//! re-sorted here regardless of the order they arrive in.

use crate::domain::{CrError, Result};
use std::collections::BTreeMap;

/// Render entries as concatenated `SET k v;` statements sorted by key.
pub fn render_state<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Result<String>
where
    K: AsRef<str>,
    V: AsRef<[u8]>,
{
    let sorted: BTreeMap<String, V> = entries
        .into_iter()
        .map(|(k, v)| (k.as_ref().to_string(), v))
        .collect();

    let mut out = String::new();
    for (key, value) in &sorted {
        let text = std::str::from_utf8(value.as_ref())
            .map_err(|_| CrError::NonUtf8Value { key: key.clone() })?;
        out.push_str("SET ");
        out.push_str(key);
        out.push(' ');
        out.push_str(text);
        out.push(';');
    }
    Ok(out)
}
