//! Rule-based question classification
//!
//! Fast, deterministic classification using ordered predicate lists.
//! Zero LLM overhead - all decisions are pure CPU logic.
//!
//! Evaluation order:
//! 1. Simple signatures (word lookups, meaning/synonym/example requests,
//!    bare multiple-choice answer queries). First match wins.
//! 2. Complex signatures (reasoning, comparison, wrong-answer traps,
//!    multi-option references, analysis requests).
//! 3. Nothing matched: `Complex`. Ambiguous questions go to the thorough tier.

use super::QuestionType;
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

/// A named predicate over question text
#[derive(Clone, Copy)]
pub struct Signature {
    /// Stable name, used in logs
    pub name: &'static str,
    matches: fn(&str) -> bool,
}

impl Signature {
    const fn new(name: &'static str, matches: fn(&str) -> bool) -> Self {
        Self { name, matches }
    }

    /// Test the signature against question text
    pub fn matches(&self, text: &str) -> bool {
        (self.matches)(text)
    }
}

impl std::fmt::Debug for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signature").field("name", &self.name).finish()
    }
}

/// Maximum words in a bare lookup ("predictive?", "take off")
const MAX_LOOKUP_WORDS: usize = 3;

/// Maximum words in a meaning or synonym request ("resilience의 의미가 뭐예요?")
///
/// Longer questions that mention meaning ("밑줄 친 부분이 의미하는 바가 ...")
/// are usually about a passage, not a word.
const MAX_REQUEST_WORDS: usize = 6;

fn pattern(re: &str) -> Regex {
    Regex::new(re).expect("classifier pattern must compile")
}

static LOOKUP_PHRASE: LazyLock<Regex> =
    LazyLock::new(|| pattern(r"^[A-Za-z][A-Za-z'\-]*(?:\s+[A-Za-z][A-Za-z'\-]*)*$"));

static MEANING_REQUEST: LazyLock<Regex> =
    LazyLock::new(|| pattern(r"(?i)(뜻|의미|번역|meaning|\bmeans?\b|translat)"));

static SYNONYM_REQUEST: LazyLock<Regex> =
    LazyLock::new(|| pattern(r"(?i)(동의어|유의어|반의어|synonym|antonym)"));

static GRAMMAR_POINT_REQUEST: LazyLock<Regex> =
    LazyLock::new(|| pattern(r"(?i)(품사|part of speech|grammar point)"));

static EXAMPLE_SENTENCE_REQUEST: LazyLock<Regex> =
    LazyLock::new(|| pattern(r"(?i)(예문|example sentences?)"));

// "정답이 뭐예요", "답 몇 번", a bare "정답?", "what is the answer"
static ANSWER_ONLY_REQUEST: LazyLock<Regex> = LazyLock::new(|| {
    pattern(
        r"(?i)((?:^|\s)(?:정답|답)(?:은|이|이요)?\s*(?:뭐|무엇|몇\s*번)|^(?:정답|답)\s*[?？]?$|what is the (?:correct )?answer)",
    )
});

static REASONING_MARKER: LazyLock<Regex> =
    LazyLock::new(|| pattern(r"(?i)(왜|이유|\bwhy\b|reason)"));

static COMPARISON_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    pattern(r"(?i)(차이|비교|difference|differ|compare|\bversus\b|\bvs\.?(?:\s|$))")
});

static WRONG_ANSWER_MARKER: LazyLock<Regex> =
    LazyLock::new(|| pattern(r"(?i)(오답|함정|틀린|틀렸|\bwrong\b|\btrap\b|incorrect)"));

static ANALYSIS_REQUEST: LazyLock<Regex> = LazyLock::new(|| {
    pattern(r"(?i)(분석|해석|구조|요지|주제|설명|analy[sz]|explain|structure)")
});

/// Strip trailing question marks, periods and whitespace
fn strip_trailing_punctuation(text: &str) -> &str {
    text.trim()
        .trim_end_matches(['?', '？', '.', '!', '。'])
        .trim_end()
}

fn is_short_lookup(text: &str) -> bool {
    let stripped = strip_trailing_punctuation(text);
    !stripped.is_empty()
        && stripped.split_whitespace().count() <= MAX_LOOKUP_WORDS
        && LOOKUP_PHRASE.is_match(stripped)
}

fn is_brief(text: &str) -> bool {
    text.split_whitespace().count() <= MAX_REQUEST_WORDS
}

fn is_meaning_request(text: &str) -> bool {
    is_brief(text) && MEANING_REQUEST.is_match(text)
}

fn is_synonym_request(text: &str) -> bool {
    is_brief(text) && SYNONYM_REQUEST.is_match(text)
}

fn is_grammar_point_request(text: &str) -> bool {
    GRAMMAR_POINT_REQUEST.is_match(text)
}

fn is_example_sentence_request(text: &str) -> bool {
    EXAMPLE_SENTENCE_REQUEST.is_match(text)
}

fn is_answer_only_request(text: &str) -> bool {
    ANSWER_ONLY_REQUEST.is_match(text.trim())
}

fn has_reasoning_marker(text: &str) -> bool {
    REASONING_MARKER.is_match(text)
}

fn has_comparison_marker(text: &str) -> bool {
    COMPARISON_MARKER.is_match(text)
}

fn has_wrong_answer_marker(text: &str) -> bool {
    WRONG_ANSWER_MARKER.is_match(text)
}

/// Two distinct circled-number options (①..⑳) in one question
fn references_multiple_options(text: &str) -> bool {
    let options: BTreeSet<char> = text
        .chars()
        .filter(|c| ('\u{2460}'..='\u{2473}').contains(c))
        .collect();
    options.len() >= 2
}

fn is_analysis_request(text: &str) -> bool {
    ANALYSIS_REQUEST.is_match(text)
}

/// Signatures routed to the fast tier, checked first
pub const SIMPLE_SIGNATURES: &[Signature] = &[
    Signature::new("short_lookup", is_short_lookup),
    Signature::new("meaning_request", is_meaning_request),
    Signature::new("synonym_request", is_synonym_request),
    Signature::new("grammar_point_request", is_grammar_point_request),
    Signature::new("example_sentence_request", is_example_sentence_request),
    Signature::new("answer_only_request", is_answer_only_request),
];

/// Signatures routed to the thorough tier
pub const COMPLEX_SIGNATURES: &[Signature] = &[
    Signature::new("reasoning_marker", has_reasoning_marker),
    Signature::new("comparison_marker", has_comparison_marker),
    Signature::new("wrong_answer_marker", has_wrong_answer_marker),
    Signature::new("multiple_options", references_multiple_options),
    Signature::new("analysis_request", is_analysis_request),
];

/// Result of classifying a question
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    /// Resolved question type
    pub question_type: QuestionType,
    /// Name of the signature that matched; `None` means the default applied
    pub matched: Option<&'static str>,
}

/// Stateless classifier over the ordered signature lists
#[derive(Debug, Clone, Copy, Default)]
pub struct Classifier;

impl Classifier {
    /// Create a new classifier
    pub fn new() -> Self {
        Self
    }

    /// Classify question text
    pub fn classify(&self, text: &str) -> QuestionType {
        self.explain(text).question_type
    }

    /// Classify and report which signature decided it
    pub fn explain(&self, text: &str) -> Classification {
        if let Some(sig) = SIMPLE_SIGNATURES.iter().find(|sig| sig.matches(text)) {
            return Classification {
                question_type: QuestionType::Simple,
                matched: Some(sig.name),
            };
        }

        if let Some(sig) = COMPLEX_SIGNATURES.iter().find(|sig| sig.matches(text)) {
            return Classification {
                question_type: QuestionType::Complex,
                matched: Some(sig.name),
            };
        }

        Classification {
            question_type: QuestionType::Complex,
            matched: None,
        }
    }
}
