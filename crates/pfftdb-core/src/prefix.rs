//! Compact identifier expansion (`prefix:local` → namespace + local).

use std::borrow::Cow;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::term::BLANK_PREFIX;

/// What to do with a `prefix:local` whose prefix is not in the table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrefixPolicy {
    /// Leave the field untouched.
    #[default]
    PassThrough,
    /// Reject the field, unless it is already an absolute IRI.
    Reject,
}

/// Short name → namespace mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrefixTable {
    entries: BTreeMap<String, String>,
}

impl PrefixTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, prefix: impl Into<String>, namespace: impl Into<String>) {
        self.entries.insert(prefix.into(), namespace.into());
    }

    pub fn with(mut self, prefix: impl Into<String>, namespace: impl Into<String>) -> Self {
        self.insert(prefix, namespace);
        self
    }

    pub fn namespace(&self, prefix: &str) -> Option<&str> {
        self.entries.get(prefix).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// A copy of `self` with `overrides` layered on top.
    pub fn merged_with(&self, overrides: &PrefixTable) -> PrefixTable {
        let mut merged = self.clone();
        merged
            .entries
            .extend(overrides.entries.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged
    }

    /// Expand `field` using pass-through semantics for unknown prefixes.
    pub fn resolve<'a>(&self, field: &'a str) -> Cow<'a, str> {
        match self.split(field) {
            Some((prefix, local)) => match self.entries.get(prefix) {
                Some(namespace) => Cow::Owned(format!("{namespace}{local}")),
                None => Cow::Borrowed(field),
            },
            None => Cow::Borrowed(field),
        }
    }

    /// Expand `field`, applying `policy` to unknown prefixes.
    pub fn resolve_with<'a>(&self, field: &'a str, policy: PrefixPolicy) -> Result<Cow<'a, str>> {
        let Some((prefix, local)) = self.split(field) else {
            return Ok(Cow::Borrowed(field));
        };
        if let Some(namespace) = self.entries.get(prefix) {
            return Ok(Cow::Owned(format!("{namespace}{local}")));
        }
        match policy {
            PrefixPolicy::PassThrough => Ok(Cow::Borrowed(field)),
            PrefixPolicy::Reject if is_absolute_iri(prefix, local) => Ok(Cow::Borrowed(field)),
            PrefixPolicy::Reject => Err(Error::UnknownPrefix {
                prefix: prefix.to_string(),
                field: field.to_string(),
            }),
        }
    }

    fn split<'a>(&self, field: &'a str) -> Option<(&'a str, &'a str)> {
        if field.starts_with(BLANK_PREFIX) {
            return None;
        }
        let (prefix, local) = field.split_once(':')?;
        if prefix.is_empty() {
            return None;
        }
        Some((prefix, local))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for PrefixTable {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut table = PrefixTable::new();
        for (k, v) in iter {
            table.insert(k, v);
        }
        table
    }
}

fn is_absolute_iri(scheme: &str, rest: &str) -> bool {
    rest.starts_with("//") || scheme.eq_ignore_ascii_case("urn") || scheme.eq_ignore_ascii_case("mailto")
}
