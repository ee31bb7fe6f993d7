//! Flag sets: the unit the search explores

use super::checksum::Checksum;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{self, Display};

/// The value a single optimization flag takes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FlagValue {
    /// A switch such as `-fomit-frame-pointer`
    Bool(bool),
    /// A numeric level such as `-O2` or `--param inline-unit-growth=40`
    Int(i64),
}

impl Display for FlagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlagValue::Bool(b) => write!(f, "{b}"),
            FlagValue::Int(i) => write!(f, "{i}"),
        }
    }
}

/// An unordered mapping from flag name to value.
///
/// Backed by a `BTreeMap` so iteration is always name-sorted, which is the
/// canonical form the checksum is computed over. A flag missing from the map
/// is simply not passed to the compiler.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlagSet(BTreeMap<String, FlagValue>);

impl FlagSet {
    /// Create an empty flag set
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Return a copy with `name` set to `value`
    #[must_use]
    pub fn with(&self, name: impl Into<String>, value: FlagValue) -> Self {
        let mut next = self.clone();
        next.0.insert(name.into(), value);
        next
    }

    /// Return a copy with `name` removed
    #[must_use]
    pub fn without(&self, name: &str) -> Self {
        let mut next = self.clone();
        next.0.remove(name);
        next
    }

    /// Set a flag in place
    pub fn insert(&mut self, name: impl Into<String>, value: FlagValue) -> Option<FlagValue> {
        self.0.insert(name.into(), value)
    }

    pub fn get(&self, name: &str) -> Option<FlagValue> {
        self.0.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate in canonical (name-sorted) order
    pub fn iter(&self) -> impl Iterator<Item = (&str, FlagValue)> {
        self.0.iter().map(|(name, value)| (name.as_str(), *value))
    }

    /// Stable content checksum of this flag set
    pub fn checksum(&self) -> Checksum {
        Checksum::of(self)
    }

    /// Render as compiler arguments.
    ///
    /// `true` switches render as the bare name, `false` switches are omitted,
    /// numeric flags render as `name=value`.
    pub fn to_args(&self) -> Vec<String> {
        self.iter()
            .filter_map(|(name, value)| match value {
                FlagValue::Bool(true) => Some(name.to_string()),
                FlagValue::Bool(false) => None,
                FlagValue::Int(level) => Some(format!("{name}={level}")),
            })
            .collect()
    }
}

impl Display for FlagSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "(no flags)");
        }
        let rendered: Vec<String> = self
            .iter()
            .map(|(name, value)| match value {
                FlagValue::Bool(b) => format!("{name}:{b}"),
                FlagValue::Int(level) => format!("{name}={level}"),
            })
            .collect();
        write!(f, "{}", rendered.join(" "))
    }
}

impl<S: Into<String>> FromIterator<(S, FlagValue)> for FlagSet {
    fn from_iter<I: IntoIterator<Item = (S, FlagValue)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_and_without_do_not_mutate_the_original() {
        let base = FlagSet::from_iter([("-O", FlagValue::Int(1))]);
        let raised = base.with("-O", FlagValue::Int(2));
        let dropped = base.without("-O");

        assert_eq!(base.get("-O"), Some(FlagValue::Int(1)));
        assert_eq!(raised.get("-O"), Some(FlagValue::Int(2)));
        assert!(dropped.is_empty());
    }

    #[test]
    fn renders_compiler_arguments() {
        let flags = FlagSet::from_iter([
            ("-funroll-loops", FlagValue::Bool(true)),
            ("-fno-inline", FlagValue::Bool(false)),
            ("-falign-loops", FlagValue::Int(8)),
        ]);
        assert_eq!(
            flags.to_args(),
            vec!["-falign-loops=8".to_string(), "-funroll-loops".to_string()]
        );
    }

    #[test]
    fn json_round_trip_uses_plain_values() {
        let flags = FlagSet::from_iter([
            ("opt_level", FlagValue::Int(2)),
            ("lto", FlagValue::Bool(true)),
        ]);
        let json = serde_json::to_string(&flags).unwrap();
        assert_eq!(json, r#"{"lto":true,"opt_level":2}"#);
        let back: FlagSet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, flags);
    }
}
