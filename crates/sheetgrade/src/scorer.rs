//! Scoring: compare item decisions against the locked answer key.
//!
//! Blank and ambiguous readings always count as incorrect, but keep their
//! distinct tags so an instructor can review them separately. The scorer
//! never persists anything; appending the resulting record is the caller's
//! explicit, separate step.

use crate::decision::ItemDecision;
use crate::error::KeyMismatchError;
use crate::key::AnswerKey;

/// Outcome tag for a single item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemTag {
    Correct,
    Incorrect,
    Blank,
    Ambiguous,
}

/// Per-item scoring detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ItemResult {
    /// 1-based item number as printed on the sheet.
    pub item: usize,
    /// Keyed answer.
    pub expected: char,
    /// What the decision engine read.
    pub decision: ItemDecision,
    pub tag: ItemTag,
}

/// A score prior to the explicit persist step.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ScoreDraft {
    pub correct: usize,
    pub total: usize,
    pub items: Vec<ItemResult>,
}

/// Score a decision sequence against `key`.
///
/// Fails when the lengths disagree in either direction; grading never
/// silently truncates or pads.
pub fn score_decisions(
    decisions: &[ItemDecision],
    key: &AnswerKey,
) -> Result<ScoreDraft, KeyMismatchError> {
    if decisions.len() != key.len() {
        return Err(KeyMismatchError {
            key_items: key.len(),
            decision_items: decisions.len(),
        });
    }

    let mut items = Vec::with_capacity(decisions.len());
    let mut correct = 0usize;
    for (i, decision) in decisions.iter().enumerate() {
        let expected = key.answer(i).expect("length checked above");
        let tag = match decision {
            ItemDecision::Choice(c) if *c == expected => {
                correct += 1;
                ItemTag::Correct
            }
            ItemDecision::Choice(_) => ItemTag::Incorrect,
            ItemDecision::Blank => ItemTag::Blank,
            ItemDecision::Ambiguous => ItemTag::Ambiguous,
        };
        items.push(ItemResult {
            item: i + 1,
            expected,
            decision: *decision,
            tag,
        });
    }

    Ok(ScoreDraft {
        correct,
        total: key.len(),
        items,
    })
}
