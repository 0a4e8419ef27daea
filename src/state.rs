//! Dynamic configuration state values and subset matching
//!
//! Snapshots of interface configuration are loosely shaped: the daemon can
//! grow new keys without notice, and callers usually only care about a
//! handful of them. This module models such snapshots as maps of tagged
//! values and answers the one question verification needs: is an expected
//! partial state contained in an observed full state?

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One interface's configuration as an ordered key/value mapping.
pub type StateMap = BTreeMap<String, StateValue>;

/// A single configuration value.
///
/// Comparison is structural and exact: variants never coerce into each
/// other, so integer 0 and string "0" are different values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StateValue {
    Bool(bool),
    Int(i64),
    Str(String),
    List(Vec<StateValue>),
    Map(StateMap),
}

impl From<bool> for StateValue {
    fn from(v: bool) -> Self {
        StateValue::Bool(v)
    }
}

impl From<i64> for StateValue {
    fn from(v: i64) -> Self {
        StateValue::Int(v)
    }
}

impl From<u32> for StateValue {
    fn from(v: u32) -> Self {
        StateValue::Int(i64::from(v))
    }
}

impl From<&str> for StateValue {
    fn from(v: &str) -> Self {
        StateValue::Str(v.to_string())
    }
}

impl From<String> for StateValue {
    fn from(v: String) -> Self {
        StateValue::Str(v)
    }
}

impl From<Vec<StateValue>> for StateValue {
    fn from(v: Vec<StateValue>) -> Self {
        StateValue::List(v)
    }
}

impl From<StateMap> for StateValue {
    fn from(v: StateMap) -> Self {
        StateValue::Map(v)
    }
}

/// Returns true iff every (key, value) pair of `expected` is present in
/// `observed` with an identical value.
///
/// Only the top-level map is subset-matched; nested lists and maps must
/// match exactly, not as sub-collections. An empty `expected` matches any
/// observation. Keys present in `observed` but not in `expected` are
/// ignored. Never fails, no side effects.
pub fn is_subset(observed: &StateMap, expected: &StateMap) -> bool {
    expected
        .iter()
        .all(|(key, want)| observed.get(key) == Some(want))
}
