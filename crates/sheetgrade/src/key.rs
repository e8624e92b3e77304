//! Answer key model.
//!
//! An [`AnswerKey`] is an ordered, gap-free run of choice letters for items
//! 1..N. Lifecycle (create → edit → lock → reset) is enforced by the store;
//! the value handed to the grading pipeline is always a locked, read-only
//! snapshot.

/// An ordered answer key; index 0 holds item 1's answer.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AnswerKey {
    answers: Vec<char>,
}

impl AnswerKey {
    /// Build a key from answers in item order.
    pub fn from_answers(answers: Vec<char>) -> Result<Self, String> {
        if answers.is_empty() {
            return Err("answer key must contain at least one item".to_string());
        }
        for (i, c) in answers.iter().enumerate() {
            if !c.is_ascii_uppercase() {
                return Err(format!(
                    "item {}: answer '{}' is not an uppercase choice letter",
                    i + 1,
                    c
                ));
            }
        }
        Ok(Self { answers })
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.answers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.answers.is_empty()
    }

    /// Answer for a 0-based item index.
    pub fn answer(&self, item: usize) -> Option<char> {
        self.answers.get(item).copied()
    }

    /// All answers in item order.
    pub fn answers(&self) -> &[char] {
        &self.answers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_uppercase_letters() {
        let key = AnswerKey::from_answers(vec!['A', 'D', 'B']).expect("valid key");
        assert_eq!(key.len(), 3);
        assert_eq!(key.answer(1), Some('D'));
        assert_eq!(key.answer(3), None);
    }

    #[test]
    fn rejects_empty_and_non_letters() {
        assert!(AnswerKey::from_answers(vec![]).is_err());
        assert!(AnswerKey::from_answers(vec!['a']).is_err());
        assert!(AnswerKey::from_answers(vec!['A', '4']).is_err());
    }
}
