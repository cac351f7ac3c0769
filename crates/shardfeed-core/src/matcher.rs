//! Rule evaluation.

use crate::event::ChangeEvent;
use crate::source::{ChangeSource, SourceSet};

/// Decides whether a change observed on an index should be broadcast.
///
/// Within one rule all three dimensions must match; across rules any match
/// suffices.
pub struct SourceMatcher;

impl SourceMatcher {
    /// Check one rule against an event seen on `index`.
    pub fn matches(index: &str, event: &ChangeEvent, rule: &ChangeSource) -> bool {
        rule.indices.matches(index)
            && rule.types.matches(event.doc_type())
            && rule.ids.matches(event.id())
    }

    /// Check whether any rule in the set admits the event.
    pub fn eligible(index: &str, event: &ChangeEvent, rules: &SourceSet) -> bool {
        rules
            .rules()
            .iter()
            .any(|rule| Self::matches(index, event, rule))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules(rules: &[&str]) -> SourceSet {
        SourceSet::parse(rules.iter().copied()).unwrap()
    }

    #[test]
    fn test_index_rule() {
        let set = rules(&["wallet"]);
        let event = ChangeEvent::index("1", "tx", 1, &b"{}"[..]);

        assert!(SourceMatcher::eligible("wallet", &event, &set));
        assert!(!SourceMatcher::eligible("market", &event, &set));
    }

    #[test]
    fn test_all_dimensions_must_match() {
        let rule = ChangeSource::parse("wallet/tx/abc").unwrap();

        let hit = ChangeEvent::index("abc", "tx", 1, &b"{}"[..]);
        let wrong_type = ChangeEvent::index("abc", "block", 1, &b"{}"[..]);
        let wrong_id = ChangeEvent::index("xyz", "tx", 1, &b"{}"[..]);

        assert!(SourceMatcher::matches("wallet", &hit, &rule));
        assert!(!SourceMatcher::matches("market", &hit, &rule));
        assert!(!SourceMatcher::matches("wallet", &wrong_type, &rule));
        assert!(!SourceMatcher::matches("wallet", &wrong_id, &rule));
    }

    #[test]
    fn test_any_rule_suffices() {
        let set = rules(&["wallet/tx", "market/*/abc"]);

        let tx = ChangeEvent::delete("zzz", "tx", 2);
        let abc = ChangeEvent::delete("abc", "quote", 2);
        let other = ChangeEvent::delete("zzz", "quote", 2);

        assert!(SourceMatcher::eligible("wallet", &tx, &set));
        assert!(SourceMatcher::eligible("market", &abc, &set));
        assert!(!SourceMatcher::eligible("market", &other, &set));
        assert!(!SourceMatcher::eligible("wallet", &abc, &set));
    }

    #[test]
    fn test_match_all_and_empty_sets() {
        let event = ChangeEvent::create("1", "t", 1, &b"{}"[..]);

        assert!(SourceMatcher::eligible("anything", &event, &SourceSet::match_all()));
        assert!(!SourceMatcher::eligible(
            "anything",
            &event,
            &SourceSet::new(Vec::new())
        ));
    }
}
