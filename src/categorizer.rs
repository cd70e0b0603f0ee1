//! Decision core: decides whether a message gets the target category and why.
//!
//! Everything in here is pure and holds no mutable state, so it can be
//! shared freely between the monitor worker and the control surfaces.

pub mod match_evaluator;
pub mod pattern_library;
pub mod policy;
pub mod similarity;

pub use match_evaluator::{evaluate, gate_names};
pub use pattern_library::PatternLibrary;
pub use policy::{decide, Verdict};

use serde::Serialize;

use crate::mail_reader::message::Message;

/// Match result and verdict for one message, as shown by `check` and `preview`.
#[derive(Debug, Clone, Serialize)]
pub struct Classification {
    pub message_id: String,
    pub subject: String,
    #[serde(flatten)]
    pub verdict: Verdict,
    pub reasons: Vec<String>,
}

pub fn classify(message: &Message, target_category: &str, library: &PatternLibrary) -> Classification {
    let result = evaluate(message, library);
    let verdict = decide(message, &result, target_category, library);
    Classification {
        message_id: message.id.clone(),
        subject: message.subject.clone(),
        verdict,
        reasons: result.labels(),
    }
}
