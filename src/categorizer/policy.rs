use std::fmt;

use serde::{Deserialize, Serialize};

use crate::categorizer::match_evaluator::{MatchResult, SkipReason};
use crate::categorizer::pattern_library::PatternLibrary;
use crate::mail_reader::message::Message;

/// Final decision for one (message, target category) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", content = "tags", rename_all = "kebab-case")]
pub enum Verdict {
    /// Tag the message; holds the complete new tag set.
    Apply(Vec<String>),
    SkipAlreadyTagged,
    SkipExcluded,
    SkipConflictingCategory,
    SkipNoMatch,
}

impl Verdict {
    pub fn is_apply(&self) -> bool {
        matches!(self, Verdict::Apply(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            Verdict::Apply(_) => "apply",
            Verdict::SkipAlreadyTagged => "skip-already-tagged",
            Verdict::SkipExcluded => "skip-excluded",
            Verdict::SkipConflictingCategory => "skip-conflicting-category",
            Verdict::SkipNoMatch => "skip-no-match",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Turns a match result into a verdict. Pure: tagging and auditing are up to the caller.
pub fn decide(
    message: &Message,
    match_result: &MatchResult,
    target_category: &str,
    library: &PatternLibrary,
) -> Verdict {
    if let Some(reason) = match_result.skip_reason() {
        return match reason {
            SkipReason::ExcludedSender | SkipReason::ExcludedKeyword => Verdict::SkipExcluded,
            SkipReason::NumberWithoutAction => Verdict::SkipNoMatch,
        };
    }

    let subject = message.subject.to_lowercase();
    if library.has_secondary_keyword(&subject) && !library.has_primary_keyword(&subject) {
        return Verdict::SkipExcluded;
    }

    let already_tagged = message.categories.iter().any(|c| c == target_category);
    if !message.categories.is_empty() && !already_tagged {
        return Verdict::SkipConflictingCategory;
    }
    if already_tagged {
        return Verdict::SkipAlreadyTagged;
    }

    if !match_result.matched() {
        return Verdict::SkipNoMatch;
    }

    let mut tags = message.categories.clone();
    tags.push(target_category.to_string());
    Verdict::Apply(tags)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::categorizer::match_evaluator::{evaluate, MatchReason};
    use crate::settings::CategorizerSettings;

    fn library() -> PatternLibrary {
        PatternLibrary::new(&CategorizerSettings::default()).unwrap()
    }

    fn matched() -> MatchResult {
        MatchResult::Evaluated {
            reasons: vec![MatchReason::PrimaryKeywordSubject],
        }
    }

    fn message(subject: &str, categories: &[&str]) -> Message {
        Message {
            subject: subject.to_string(),
            categories: categories.iter().map(|c| c.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_skipped_results_map_directly() {
        let library = library();
        let msg = message("reset password", &[]);
        let excluded = MatchResult::Skipped {
            reason: SkipReason::ExcludedKeyword,
        };
        let guard = MatchResult::Skipped {
            reason: SkipReason::NumberWithoutAction,
        };
        assert_eq!(decide(&msg, &excluded, "KARL", &library), Verdict::SkipExcluded);
        assert_eq!(decide(&msg, &guard, "KARL", &library), Verdict::SkipNoMatch);
    }

    #[test]
    fn test_secondary_keyword_suppresses_positive_match() {
        let library = library();
        let msg = message("DDT form attached", &[]);
        assert_eq!(decide(&msg, &matched(), "KARL", &library), Verdict::SkipExcluded);
    }

    #[test]
    fn test_secondary_keyword_with_primary_support_is_allowed() {
        let library = library();
        let msg = message("DDT reset", &[]);
        assert_eq!(
            decide(&msg, &matched(), "KARL", &library),
            Verdict::Apply(vec!["KARL".to_string()])
        );
    }

    #[test]
    fn test_other_category_conflicts() {
        let library = library();
        let msg = message("Change phone number", &["ADRIAN"]);
        assert_eq!(
            decide(&msg, &matched(), "KARL", &library),
            Verdict::SkipConflictingCategory
        );
    }

    #[test]
    fn test_already_tagged() {
        let library = library();
        let msg = message("Change phone number", &["ADRIAN", "KARL"]);
        assert_eq!(decide(&msg, &matched(), "KARL", &library), Verdict::SkipAlreadyTagged);
    }

    #[test]
    fn test_no_match() {
        let library = library();
        let msg = message("Lunch", &[]);
        let nothing = MatchResult::Evaluated { reasons: vec![] };
        assert_eq!(decide(&msg, &nothing, "KARL", &library), Verdict::SkipNoMatch);
    }

    #[test]
    fn test_apply_appends_target_last() {
        let library = library();
        let msg = message("unlock user", &[]);
        let result = evaluate(&msg, &library);
        assert_eq!(
            decide(&msg, &result, "KARL", &library),
            Verdict::Apply(vec!["KARL".to_string()])
        );
    }

    #[test]
    fn test_verdict_serialization() {
        let json = serde_json::to_value(Verdict::Apply(vec!["KARL".to_string()])).unwrap();
        assert_eq!(json, serde_json::json!({"verdict": "apply", "tags": ["KARL"]}));

        let json = serde_json::to_value(Verdict::SkipNoMatch).unwrap();
        assert_eq!(json, serde_json::json!({"verdict": "skip-no-match"}));
    }
}
