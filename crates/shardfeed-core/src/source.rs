//! Filter rules parsed from `listenSource`.
//!
//! A rule has up to three segments, `indices/types/ids`, separated by `/`
//! (or `:`). Each segment is a comma separated list of exact names, and a
//! `*` anywhere in the list turns that dimension into a wildcard. Missing
//! trailing segments are wildcards too, so `wallet` and `wallet/*/*` are the
//! same rule.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::{Error, Result};

/// Wildcard token.
pub const MATCH_ALL: &str = "*";

const SEPARATORS: [char; 2] = ['/', ':'];

/// One dimension of a rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Selector {
    /// Matches every value.
    All,
    /// Matches only the listed values.
    Only(BTreeSet<String>),
}

impl Selector {
    /// Build a finite selector.
    pub fn only<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Selector::Only(values.into_iter().map(Into::into).collect())
    }

    /// Membership test.
    pub fn matches(&self, value: &str) -> bool {
        match self {
            Selector::All => true,
            Selector::Only(values) => values.contains(value),
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Selector::All)
    }

    fn parse(segment: &str, rule: &str) -> Result<Self> {
        let mut values = BTreeSet::new();
        for part in segment.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            if part == MATCH_ALL {
                return Ok(Selector::All);
            }
            values.insert(part.to_string());
        }

        if values.is_empty() {
            return Err(Error::invalid_source(rule, "empty segment"));
        }
        Ok(Selector::Only(values))
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::All => f.write_str(MATCH_ALL),
            Selector::Only(values) => {
                let joined: Vec<&str> = values.iter().map(String::as_str).collect();
                f.write_str(&joined.join(","))
            }
        }
    }
}

/// A single subscription rule over index, document type, and document id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChangeSource {
    pub indices: Selector,
    pub types: Selector,
    pub ids: Selector,
}

impl ChangeSource {
    /// Rule that admits every change.
    pub fn match_all() -> Self {
        Self {
            indices: Selector::All,
            types: Selector::All,
            ids: Selector::All,
        }
    }

    pub fn new(indices: Selector, types: Selector, ids: Selector) -> Self {
        Self {
            indices,
            types,
            ids,
        }
    }

    /// Parse a rule string such as `wallet/tx/*`.
    pub fn parse(rule: &str) -> Result<Self> {
        let trimmed = rule.trim();
        if trimmed.is_empty() {
            return Err(Error::invalid_source(rule, "rule is blank"));
        }

        let segments: Vec<&str> = trimmed.split(SEPARATORS).collect();
        if segments.len() > 3 {
            return Err(Error::invalid_source(
                rule,
                format!("expected at most 3 segments, found {}", segments.len()),
            ));
        }

        let selector = |idx: usize| -> Result<Selector> {
            match segments.get(idx) {
                Some(segment) => Selector::parse(segment, rule),
                None => Ok(Selector::All),
            }
        };

        Ok(Self {
            indices: selector(0)?,
            types: selector(1)?,
            ids: selector(2)?,
        })
    }
}

impl FromStr for ChangeSource {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for ChangeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.indices, self.types, self.ids)
    }
}

/// The process-wide rule set.
///
/// Read-only after construction and cheap to clone; concurrent readers need
/// no locking.
#[derive(Debug, Clone)]
pub struct SourceSet {
    rules: Arc<[ChangeSource]>,
}

impl SourceSet {
    /// Build a set from parsed rules, dropping duplicates.
    pub fn new(rules: impl IntoIterator<Item = ChangeSource>) -> Self {
        let unique: BTreeSet<ChangeSource> = rules.into_iter().collect();
        Self {
            rules: unique.into_iter().collect(),
        }
    }

    /// Parse every rule string; the first invalid rule aborts.
    pub fn parse<I, S>(rules: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let parsed = rules
            .into_iter()
            .map(|rule| ChangeSource::parse(rule.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(parsed))
    }

    /// A single `*` rule.
    pub fn match_all() -> Self {
        Self::new([ChangeSource::match_all()])
    }

    pub fn rules(&self) -> &[ChangeSource] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl Default for SourceSet {
    fn default() -> Self {
        Self::match_all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_wildcard() {
        let source = ChangeSource::parse("*").unwrap();
        assert_eq!(source, ChangeSource::match_all());
    }

    #[test]
    fn test_parse_index_only() {
        let source = ChangeSource::parse("wallet").unwrap();
        assert_eq!(source.indices, Selector::only(["wallet"]));
        assert!(source.types.is_all());
        assert!(source.ids.is_all());
    }

    #[test]
    fn test_parse_full_rule() {
        let source = ChangeSource::parse("wallet,market/tx/abc, def").unwrap();
        assert_eq!(source.indices, Selector::only(["wallet", "market"]));
        assert_eq!(source.types, Selector::only(["tx"]));
        assert_eq!(source.ids, Selector::only(["abc", "def"]));
    }

    #[test]
    fn test_parse_colon_separator() {
        let slash = ChangeSource::parse("wallet/tx/*").unwrap();
        let colon = ChangeSource::parse("wallet:tx:*").unwrap();
        assert_eq!(slash, colon);
        assert!(colon.ids.is_all());
    }

    #[test]
    fn test_star_in_list_wins() {
        let source = ChangeSource::parse("wallet,*").unwrap();
        assert!(source.indices.is_all());
    }

    #[test]
    fn test_parse_rejects_bad_rules() {
        assert!(ChangeSource::parse("").is_err());
        assert!(ChangeSource::parse("   ").is_err());
        assert!(ChangeSource::parse("wallet//abc").is_err());
        assert!(ChangeSource::parse("a/b/c/d").is_err());
        assert!(matches!(
            ChangeSource::parse(","),
            Err(Error::InvalidSource { .. })
        ));
    }

    #[test]
    fn test_display_roundtrip() {
        let source = ChangeSource::parse("wallet/tx").unwrap();
        assert_eq!(source.to_string(), "wallet/tx/*");
        assert_eq!(source.to_string().parse::<ChangeSource>().unwrap(), source);
    }

    #[test]
    fn test_source_set_dedup() {
        let set = SourceSet::parse(["wallet", "wallet/*", "market"]).unwrap();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_source_set_default_matches_all() {
        let set = SourceSet::default();
        assert_eq!(set.rules(), &[ChangeSource::match_all()]);
    }
}
