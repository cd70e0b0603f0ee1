//! Evidence collection for a single message.
//!
//! Evaluation is an ordered table of named gates. A gate either stops the
//! evaluation with a [`SkipReason`] or lets it continue, possibly adding
//! [`MatchReason`]s. Exclusions come first, then the `number` guard, then
//! the fallbacks and finally the subject-level signals.

use std::fmt;
use std::ops::ControlFlow;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::categorizer::pattern_library::PatternLibrary;
use crate::mail_reader::message::Message;

/// Evidence that a message belongs to the target category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchReason {
    PrimaryKeywordSubject,
    Regex,
    FuzzySubject,
    FallbackBody,
    FallbackAttachmentOnly,
    FallbackAttachmentName,
    DdtRequestEdgeCase,
    AdvancedFuzzyPhrase,
}

impl MatchReason {
    pub fn as_str(self) -> &'static str {
        match self {
            MatchReason::PrimaryKeywordSubject => "primary-keyword-subject",
            MatchReason::Regex => "regex",
            MatchReason::FuzzySubject => "fuzzy-subject",
            MatchReason::FallbackBody => "fallback-body",
            MatchReason::FallbackAttachmentOnly => "fallback-attachment-only",
            MatchReason::FallbackAttachmentName => "fallback-attachment-name",
            MatchReason::DdtRequestEdgeCase => "ddt-request-edge-case",
            MatchReason::AdvancedFuzzyPhrase => "advanced-fuzzy-phrase",
        }
    }
}

impl fmt::Display for MatchReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why evaluation stopped before collecting evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    ExcludedSender,
    ExcludedKeyword,
    NumberWithoutAction,
}

impl SkipReason {
    pub fn as_str(self) -> &'static str {
        match self {
            SkipReason::ExcludedSender => "excluded-sender",
            SkipReason::ExcludedKeyword => "excluded-keyword",
            SkipReason::NumberWithoutAction => "number-without-action",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum MatchResult {
    /// A gate short-circuited; no evidence was collected.
    Skipped { reason: SkipReason },
    /// Every gate ran. An empty reason list means no match was found.
    Evaluated { reasons: Vec<MatchReason> },
}

impl MatchResult {
    pub fn matched(&self) -> bool {
        matches!(self, MatchResult::Evaluated { reasons } if !reasons.is_empty())
    }

    pub fn reasons(&self) -> &[MatchReason] {
        match self {
            MatchResult::Evaluated { reasons } => reasons,
            MatchResult::Skipped { .. } => &[],
        }
    }

    pub fn skip_reason(&self) -> Option<SkipReason> {
        match self {
            MatchResult::Skipped { reason } => Some(*reason),
            MatchResult::Evaluated { .. } => None,
        }
    }

    /// Reason labels for audit output.
    pub fn labels(&self) -> Vec<String> {
        match self.skip_reason() {
            Some(reason) => vec![reason.to_string()],
            None => self.reasons().iter().map(ToString::to_string).collect(),
        }
    }
}

/// Words that make a subject mentioning "number" actionable.
const NUMBER_ACTIONS: [&str; 5] = ["change", "update", "modify", "reset", "migrate"];

const NO_SUBJECT: &str = "(no subject)";

struct Evaluation<'a> {
    library: &'a PatternLibrary,
    message: &'a Message,
    subject: String,
    sender: String,
    body: String,
    regex_matched: bool,
    fuzzy_subject: Option<bool>,
    reasons: Vec<MatchReason>,
}

impl<'a> Evaluation<'a> {
    fn new(message: &'a Message, library: &'a PatternLibrary) -> Self {
        Self {
            library,
            message,
            subject: message.subject.to_lowercase(),
            sender: message.sender.to_lowercase(),
            body: message.body.to_lowercase(),
            regex_matched: false,
            fuzzy_subject: None,
            reasons: Vec::new(),
        }
    }

    fn add(&mut self, reason: MatchReason) {
        if !self.reasons.contains(&reason) {
            self.reasons.push(reason);
        }
    }

    fn subject_has_primary_keyword(&self) -> bool {
        self.library.has_primary_keyword(&self.subject)
    }

    fn subject_fuzzy_match(&mut self) -> bool {
        match self.fuzzy_subject {
            Some(matched) => matched,
            None => {
                let matched = self.library.fuzzy_primary_match(&self.subject);
                self.fuzzy_subject = Some(matched);
                matched
            }
        }
    }
}

type Gate = fn(&mut Evaluation<'_>) -> ControlFlow<SkipReason>;

const GATES: [(&str, Gate); 9] = [
    ("sender-exclusion", sender_exclusion),
    ("keyword-exclusion", keyword_exclusion),
    ("regex-scan", regex_scan),
    ("ddt-request-edge-case", ddt_request_edge_case),
    ("number-without-action", number_without_action),
    ("body-fallback", body_fallback),
    ("attachment-only-fallback", attachment_only_fallback),
    ("attachment-name-fallback", attachment_name_fallback),
    ("primary-decision", primary_decision),
];

/// Gate names in evaluation order.
pub fn gate_names() -> impl Iterator<Item = &'static str> {
    GATES.iter().map(|(name, _)| *name)
}

fn sender_exclusion(ev: &mut Evaluation<'_>) -> ControlFlow<SkipReason> {
    if ev.library.is_excluded_sender(&ev.sender) {
        return ControlFlow::Break(SkipReason::ExcludedSender);
    }
    ControlFlow::Continue(())
}

fn keyword_exclusion(ev: &mut Evaluation<'_>) -> ControlFlow<SkipReason> {
    if ev.library.has_excluded_keyword(&ev.subject) {
        return ControlFlow::Break(SkipReason::ExcludedKeyword);
    }
    ControlFlow::Continue(())
}

fn regex_scan(ev: &mut Evaluation<'_>) -> ControlFlow<SkipReason> {
    if ev.library.matches_regex(&ev.subject) {
        ev.regex_matched = true;
        ev.add(MatchReason::Regex);
    }
    ControlFlow::Continue(())
}

fn ddt_request_edge_case(ev: &mut Evaluation<'_>) -> ControlFlow<SkipReason> {
    let subject = &ev.subject;
    if (subject.contains("ddt") || subject.contains("dtt")) && subject.contains("request") {
        ev.add(MatchReason::DdtRequestEdgeCase);
    }
    ControlFlow::Continue(())
}

// Overrides whatever the earlier gates found.
fn number_without_action(ev: &mut Evaluation<'_>) -> ControlFlow<SkipReason> {
    let subject = &ev.subject;
    if subject.contains("number") && !NUMBER_ACTIONS.iter().any(|action| subject.contains(action)) {
        return ControlFlow::Break(SkipReason::NumberWithoutAction);
    }
    ControlFlow::Continue(())
}

fn body_fallback(ev: &mut Evaluation<'_>) -> ControlFlow<SkipReason> {
    let subject_signal =
        ev.subject_has_primary_keyword() || ev.regex_matched || ev.subject_fuzzy_match();
    if !subject_signal && ev.library.fuzzy_primary_match(&ev.body) {
        ev.add(MatchReason::FallbackBody);
    }
    ControlFlow::Continue(())
}

fn attachment_only_fallback(ev: &mut Evaluation<'_>) -> ControlFlow<SkipReason> {
    let subject = ev.subject.trim();
    let no_subject = subject.is_empty() || subject == NO_SUBJECT;
    if no_subject && ev.body.trim().is_empty() && !ev.message.attachments.is_empty() {
        ev.add(MatchReason::FallbackAttachmentOnly);
    }
    ControlFlow::Continue(())
}

fn attachment_name_fallback(ev: &mut Evaluation<'_>) -> ControlFlow<SkipReason> {
    let (library, message) = (ev.library, ev.message);
    if let Some(name) = message
        .attachments
        .iter()
        .find(|name| library.is_important_attachment(name))
    {
        debug!("Attachment name matched: {}", name);
        ev.add(MatchReason::FallbackAttachmentName);
    }
    ControlFlow::Continue(())
}

fn primary_decision(ev: &mut Evaluation<'_>) -> ControlFlow<SkipReason> {
    if ev.subject_has_primary_keyword() {
        ev.add(MatchReason::PrimaryKeywordSubject);
    }
    if ev.subject_fuzzy_match() {
        ev.add(MatchReason::FuzzySubject);
    }
    if ev.library.advanced_phrase_match(&ev.subject) {
        ev.add(MatchReason::AdvancedFuzzyPhrase);
    }
    ControlFlow::Continue(())
}

/// Runs every gate against `message`. Pure; safe to call from any thread.
pub fn evaluate(message: &Message, library: &PatternLibrary) -> MatchResult {
    let mut evaluation = Evaluation::new(message, library);
    for (name, gate) in GATES {
        if let ControlFlow::Break(reason) = gate(&mut evaluation) {
            debug!("Message {} stopped at gate {}: {}", message.id, name, reason);
            return MatchResult::Skipped { reason };
        }
    }
    MatchResult::Evaluated {
        reasons: evaluation.reasons,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::CategorizerSettings;

    fn library() -> PatternLibrary {
        PatternLibrary::new(&CategorizerSettings::default()).unwrap()
    }

    fn with_subject(subject: &str) -> Message {
        Message {
            subject: subject.to_string(),
            sender: "someone@example.com".to_string(),
            ..Default::default()
        }
    }

    /// A library with one ten-letter keyword and nothing else that could match.
    fn single_keyword_library(keyword: &str, fuzzy_threshold: u8) -> PatternLibrary {
        PatternLibrary::new(&CategorizerSettings {
            primary_keywords: vec![keyword.to_string()],
            regex_patterns: vec![],
            advanced_phrases: vec![],
            fuzzy_threshold,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_gate_order() {
        let names: Vec<&str> = gate_names().collect();
        assert_eq!(
            names,
            vec![
                "sender-exclusion",
                "keyword-exclusion",
                "regex-scan",
                "ddt-request-edge-case",
                "number-without-action",
                "body-fallback",
                "attachment-only-fallback",
                "attachment-name-fallback",
                "primary-decision",
            ]
        );
    }

    #[test]
    fn test_excluded_sender_short_circuits_before_subject() {
        let message = Message {
            sender: "LE-HELPDESK.PH".to_string(),
            subject: "UCUBE reset password".to_string(),
            ..Default::default()
        };
        assert_eq!(
            evaluate(&message, &library()),
            MatchResult::Skipped {
                reason: SkipReason::ExcludedSender
            }
        );
    }

    #[test]
    fn test_excluded_keyword_short_circuits() {
        let result = evaluate(&with_subject("UCube reset password"), &library());
        assert_eq!(result.skip_reason(), Some(SkipReason::ExcludedKeyword));
        assert!(!result.matched());
        assert!(result.reasons().is_empty());
    }

    #[test]
    fn test_change_mobile_number_matches() {
        let result = evaluate(&with_subject("change mobile number"), &library());
        assert!(result.matched());
        assert!(result.reasons().contains(&MatchReason::PrimaryKeywordSubject));
        assert!(result.reasons().contains(&MatchReason::Regex));
    }

    #[test]
    fn test_number_without_action_is_skipped() {
        let result = evaluate(&with_subject("your number is confirmed"), &library());
        assert_eq!(result.skip_reason(), Some(SkipReason::NumberWithoutAction));
    }

    #[test]
    fn test_number_guard_overrides_earlier_evidence() {
        // "ddt" + "request" fires the edge case, but the guard still wins
        let result = evaluate(&with_subject("DDT request for number"), &library());
        assert_eq!(result.skip_reason(), Some(SkipReason::NumberWithoutAction));
    }

    #[test]
    fn test_ddt_request_edge_case() {
        let result = evaluate(&with_subject("DTT request"), &library());
        assert_eq!(result.reasons(), &[MatchReason::DdtRequestEdgeCase]);
    }

    #[test]
    fn test_failed_body_check_keeps_earlier_evidence() {
        // Reasons only accumulate: an empty body does not cancel the edge-case
        // match, so this differs from a reset-on-miss evaluation on purpose.
        let message = Message {
            subject: "DTT request".to_string(),
            body: String::new(),
            ..Default::default()
        };
        let result = evaluate(&message, &library());
        assert!(result.matched());
        assert!(!result.reasons().contains(&MatchReason::FallbackBody));
        assert!(result.reasons().contains(&MatchReason::DdtRequestEdgeCase));
    }

    #[test]
    fn test_body_fallback_only_without_subject_signals() {
        let message = Message {
            subject: "Hello team".to_string(),
            body: "Could you please unlock my account".to_string(),
            ..Default::default()
        };
        let result = evaluate(&message, &library());
        assert_eq!(result.reasons(), &[MatchReason::FallbackBody]);

        let message = Message {
            subject: "Reset request".to_string(),
            body: "Could you please unlock my account".to_string(),
            ..Default::default()
        };
        let result = evaluate(&message, &library());
        assert!(!result.reasons().contains(&MatchReason::FallbackBody));
        assert!(result.reasons().contains(&MatchReason::PrimaryKeywordSubject));
    }

    #[test]
    fn test_attachment_only_message_collects_both_attachment_reasons() {
        let message = Message {
            attachments: vec!["reset_request.pdf".to_string()],
            ..Default::default()
        };
        let result = evaluate(&message, &library());
        assert!(result.matched());
        assert!(result.reasons().contains(&MatchReason::FallbackAttachmentOnly));
        assert!(result.reasons().contains(&MatchReason::FallbackAttachmentName));
    }

    #[test]
    fn test_no_subject_placeholder_counts_as_empty() {
        let message = Message {
            subject: "(No Subject)".to_string(),
            body: "   \n".to_string(),
            attachments: vec!["scan.pdf".to_string()],
            ..Default::default()
        };
        assert_eq!(
            evaluate(&message, &library()).reasons(),
            &[MatchReason::FallbackAttachmentOnly]
        );
    }

    #[test]
    fn test_attachment_name_requires_keyword() {
        let message = Message {
            subject: "Hello".to_string(),
            body: "see attached".to_string(),
            attachments: vec!["invoice.pdf".to_string(), "photo.jpg".to_string()],
            ..Default::default()
        };
        assert!(!evaluate(&message, &library()).matched());
    }

    #[test]
    fn test_advanced_phrase_catches_typos() {
        let result = evaluate(&with_subject("pls unlok usr"), &library());
        assert!(result.reasons().contains(&MatchReason::AdvancedFuzzyPhrase));
    }

    #[test]
    fn test_unrelated_subject_does_not_match() {
        let result = evaluate(&with_subject("Lunch on friday?"), &library());
        assert_eq!(result, MatchResult::Evaluated { reasons: vec![] });
        assert!(!result.matched());
    }

    #[test]
    fn test_fuzzy_threshold_is_inclusive() {
        // "abcdefghiX" against "abcdefghij" scores exactly 90
        let message = with_subject("ref abcdefghiX");

        let at_threshold = evaluate(&message, &single_keyword_library("abcdefghij", 90));
        assert_eq!(at_threshold.reasons(), &[MatchReason::FuzzySubject]);

        let above_score = evaluate(&message, &single_keyword_library("abcdefghij", 91));
        assert!(!above_score.matched());
    }

    #[test]
    fn test_fuzzy_score_below_threshold_does_not_match() {
        // 8 of 9 letters scores 88.9
        let message = with_subject("abcdefghX");
        let result = evaluate(&message, &single_keyword_library("abcdefghi", 90));
        assert!(!result.matched());
    }

    #[test]
    fn test_evaluate_is_deterministic() {
        let library = library();
        let message = Message {
            subject: "Request to unlock user account".to_string(),
            body: "reset my phone".to_string(),
            attachments: vec!["update.docx".to_string()],
            ..Default::default()
        };
        let first = evaluate(&message, &library);
        for _ in 0..5 {
            assert_eq!(evaluate(&message, &library), first);
        }
    }

    #[test]
    fn test_labels() {
        let skipped = MatchResult::Skipped {
            reason: SkipReason::ExcludedSender,
        };
        assert_eq!(skipped.labels(), vec!["excluded-sender"]);

        let evaluated = MatchResult::Evaluated {
            reasons: vec![MatchReason::Regex, MatchReason::FallbackBody],
        };
        assert_eq!(evaluated.labels(), vec!["regex", "fallback-body"]);
    }
}
