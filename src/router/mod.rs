//! Question routing for tutorgate
//!
//! Decides which model tier answers a student's question and orchestrates
//! the metered request flow around that decision.

pub mod classifier;
pub mod tutor;

pub use classifier::Classifier;
pub use tutor::{Answer, TutorRouter};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Question type, decided once per request
///
/// Either supplied by the caller (explicit choice in the widget) or inferred
/// by the [`Classifier`]. Also names the usage counter a request is charged to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionType {
    /// Vocabulary and single-word lookups
    Simple,
    /// Grammar, passage analysis, reasoning
    Complex,
}

impl QuestionType {
    /// Convert to string representation for logging and metrics labels
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Complex => "complex",
        }
    }

    /// The sibling type used for cross-tier deduction
    pub fn other(&self) -> Self {
        match self {
            Self::Simple => Self::Complex,
            Self::Complex => Self::Simple,
        }
    }

    /// Model tier that serves this question type
    pub fn tier(&self) -> ModelTier {
        match self {
            Self::Simple => ModelTier::Fast,
            Self::Complex => ModelTier::Thorough,
        }
    }
}

impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Model tier (generic)
///
/// Maps to config.toml: models.fast, models.thorough
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    /// Brief answers, minimal system prompt, small output budget
    Fast,
    /// Larger system prompt and output budget, supports follow-up expansion
    Thorough,
}

impl ModelTier {
    /// Convert to string representation for logging and metrics labels
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fast => "fast",
            Self::Thorough => "thorough",
        }
    }
}

impl fmt::Display for ModelTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A student's question, alive for one request only
#[derive(Debug, Clone, Default)]
pub struct Question {
    /// Raw question text
    pub text: String,
    /// Supporting material (problem explanation) resolved by the caller
    pub context: Option<String>,
    /// Caller-selected type; trusted as-is when present
    pub question_type: Option<QuestionType>,
    /// Previous answer to expand on (follow-up mode)
    pub previous_answer: Option<String>,
}

impl Question {
    /// Create a question with no context, type or follow-up
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// Attach supporting context
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Set the caller-selected question type
    pub fn with_type(mut self, question_type: QuestionType) -> Self {
        self.question_type = Some(question_type);
        self
    }

    /// Ask to expand a previous answer
    pub fn with_previous_answer(mut self, answer: impl Into<String>) -> Self {
        self.previous_answer = Some(answer.into());
        self
    }

    /// Whether this is a follow-up ("expand previous answer") request
    pub fn is_follow_up(&self) -> bool {
        self.previous_answer
            .as_deref()
            .is_some_and(|answer| !answer.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_question_type_tier_mapping() {
        assert_eq!(QuestionType::Simple.tier(), ModelTier::Fast);
        assert_eq!(QuestionType::Complex.tier(), ModelTier::Thorough);
    }

    #[test]
    fn test_question_type_other() {
        assert_eq!(QuestionType::Simple.other(), QuestionType::Complex);
        assert_eq!(QuestionType::Complex.other(), QuestionType::Simple);
    }

    #[test]
    fn test_question_type_serde() {
        assert_eq!(
            serde_json::from_str::<QuestionType>(r#""simple""#).unwrap(),
            QuestionType::Simple
        );
        assert_eq!(
            serde_json::from_str::<QuestionType>(r#""complex""#).unwrap(),
            QuestionType::Complex
        );
        assert!(serde_json::from_str::<QuestionType>(r#""detailed""#).is_err());
        assert_eq!(
            serde_json::to_string(&ModelTier::Thorough).unwrap(),
            r#""thorough""#
        );
    }

    #[test]
    fn test_question_builder() {
        let q = Question::new("why?")
            .with_context("passage")
            .with_type(QuestionType::Complex)
            .with_previous_answer("because");

        assert_eq!(q.text, "why?");
        assert_eq!(q.context.as_deref(), Some("passage"));
        assert_eq!(q.question_type, Some(QuestionType::Complex));
        assert!(q.is_follow_up());
    }

    #[test]
    fn test_blank_previous_answer_is_not_follow_up() {
        let q = Question::new("why?").with_previous_answer("   ");
        assert!(!q.is_follow_up());
    }
}
