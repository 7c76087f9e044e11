use tracing::debug;

use crate::rules::{Captures, ClassificationRule, RuleTable};
use crate::types::AuditRecord;

/// Response codes of administrative calls that failed; these are noise and
/// never reach the rule table.
pub const EXCLUDED_RESPONSE_CODES: &[&str] = &["400", "401", "500"];

/// One record paired with the path captures of the rule it matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match<'a> {
    pub record: &'a AuditRecord,
    pub captures: Captures,
}

impl Match<'_> {
    /// Capture `index`, if the group participated in the match.
    pub fn capture(&self, index: usize) -> Option<&str> {
        self.captures.get(index).and_then(|c| c.as_deref())
    }
}

/// A rule together with every record it matched, in record order.
#[derive(Debug, Clone)]
pub struct Classified<'a> {
    pub rule: &'a ClassificationRule,
    pub matches: Vec<Match<'a>>,
}

/// Drop records describing failed administrative calls.
pub fn without_failed_calls(records: &[AuditRecord]) -> Vec<&AuditRecord> {
    records
        .iter()
        .filter(|r| !EXCLUDED_RESPONSE_CODES.contains(&r.response_code.as_str()))
        .collect()
}

/// Group `records` by the rules they match.
///
/// Every rule sees every surviving record, so one record may be counted by
/// several rules. Rules without matches are left out.
pub fn classify<'a>(records: &'a [AuditRecord], table: &'a RuleTable) -> Vec<Classified<'a>> {
    let candidates = without_failed_calls(records);
    let mut classified = Vec::new();

    for rule in table.rules() {
        let matches: Vec<Match<'a>> = candidates
            .iter()
            .filter_map(|record| {
                rule.matches(record).map(|captures| Match {
                    record: *record,
                    captures,
                })
            })
            .collect();

        debug!("check({}) resolver:{:?} matched {}", rule.plural_phrase, rule.resolver, matches.len());

        if !matches.is_empty() {
            classified.push(Classified { rule, matches });
        }
    }

    classified
}
