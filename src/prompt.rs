//! Prompt assembly
//!
//! Builds the tier-specific request: a cacheable system prompt, an optional
//! cacheable context block and the per-request question segment. Static
//! instruction text is marked for server-side caching so that only the
//! variable part of each request is billed at the full input rate.

use crate::config::ModelsConfig;
use crate::error::{AppError, AppResult};
use crate::router::ModelTier;
use regex::Regex;
use std::sync::LazyLock;

/// Version tag carried by the built-in templates
pub const PROMPT_VERSION: &str = "2026-02-11";

/// Output ceiling for the word-detail template
pub const WORD_DETAIL_MAX_TOKENS: u32 = 1000;

const FAST_SYSTEM_PROMPT: &str = "You are a vocabulary tutor for Korean students.
When given an English word, respond with ONLY this exact format:

word 한국어뜻(품사)

Examples:
predictive 예측적인(형용사)
unprecedented 전례 없는(형용사)
facilitate 촉진하다, 용이하게 하다(동사)
resilience 회복력, 탄력(명사)

Rules:
- Output ONLY one line
- Include part of speech in parentheses: 명사, 동사, 형용사, 부사
- If the word has multiple common meanings, separate with comma
- NO explanations, NO etymology, NO examples, NO extra text";

const THOROUGH_SYSTEM_PROMPT: &str = "You are an English tutor for Korean students preparing for 수능/TOEFL/SAT.

NEVER write HTML tags. Students cannot see rendered HTML.
FORBIDDEN: <table>, <tr>, <td>, <th>, <div>, <span>, <style>

For comparison tables, use this Markdown format ONLY:

| 구분 | 항목1 | 항목2 |
|------|------|------|
| 내용1 | 설명1 | 설명2 |

You handle complex questions: grammar explanations, passage analysis,
problem solving, sentence structure, reading comprehension, etc.

Guidelines:
- Answer in Korean (한국어)
- Be thorough but concise
- Use bullet points and numbered lists for clarity
- For passage analysis, quote specific parts
- For grammar, provide the rule + exceptions + examples
- Use Markdown formatting only (NO HTML)";

const WORD_DETAIL_SYSTEM_PROMPT: &str = "You are an English vocabulary tutor.

When asked about a word, respond EXACTLY in this format:

━━━━ 📘 단어 정보 ━━━━
word 한글뜻

💡 어원: etymology explanation in Korean

🔗 어원 관련 단어: 3-5 high school level words sharing the same root (format: word1(뜻), word2(뜻), word3(뜻))

🧠 암기법: a memorable story connecting etymology to meaning, in Korean

🔄 동의어: synonym1, synonym2, synonym3

⚡ 반의어: antonym1, antonym2

📝 예문: English example sentence.
        한글 번역

Use this exact format with these exact emoji headers. NO HTML tags.";

const ANSWER_RULES: &str = "Answer only what was asked. Give at most 2 examples. \
Finish every sentence. Answer in Korean. Use Markdown format only (tables as Markdown pipes). NO HTML.";

const EXPAND_INSTRUCTION: &str = "위 답변을 확장하여 더 상세히 설명해주세요. \
추가 예문, 비교 분석, 실전 적용법 등을 포함해주세요.\nUse Markdown format only. NO HTML.";

// "what is the meaning of X", "meaning of X"
static LOOKUP_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:what(?:'s|\s+is)\s+the\s+meaning\s+of|meaning\s+of)\s+")
        .expect("lookup prefix pattern must compile")
});

// "X 뜻", "X의 의미가 뭐예요", "X meaning"
static LOOKUP_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\s*(?:의\s*)?(?:뜻|의미|meaning)(?:이|가|은|는)?(?:\s*(?:뭐예요|뭐에요|뭐야|뭔가요|알려줘|알려주세요))?$",
    )
    .expect("lookup suffix pattern must compile")
});

/// Server-side caching hint for one segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheHint {
    /// Ask the completion service to cache this block
    Ephemeral,
    NoCache,
}

/// One text block of a prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub text: String,
    pub cache: CacheHint,
}

impl Segment {
    pub fn cached(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            cache: CacheHint::Ephemeral,
        }
    }

    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            cache: CacheHint::NoCache,
        }
    }

    pub fn is_cached(&self) -> bool {
        self.cache == CacheHint::Ephemeral
    }
}

/// Fully assembled request for one tier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptRequest {
    pub tier: ModelTier,
    pub system: Vec<Segment>,
    pub user: Vec<Segment>,
    pub max_tokens: u32,
}

impl PromptRequest {
    /// User content joined into a single string
    pub fn user_text(&self) -> String {
        self.user
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

#[derive(Debug, Clone)]
struct TierTemplate {
    system_prompt: String,
    max_tokens: u32,
    followup_max_tokens: u32,
}

/// Tier templates and output ceilings
#[derive(Debug, Clone)]
pub struct PromptAssembler {
    fast: TierTemplate,
    thorough: TierTemplate,
}

/// Prefix a built-in template with [`PROMPT_VERSION`]
fn versioned(template: &str) -> String {
    format!("[VERSION {}] {}", PROMPT_VERSION, template)
}

impl Default for PromptAssembler {
    fn default() -> Self {
        Self::from_config(&ModelsConfig::default())
    }
}

impl PromptAssembler {
    /// Build templates from model configuration
    ///
    /// A configured `system_prompt` replaces the built-in template for that tier.
    pub fn from_config(models: &ModelsConfig) -> Self {
        Self {
            fast: TierTemplate {
                system_prompt: models
                    .fast
                    .system_prompt()
                    .map(str::to_string)
                    .unwrap_or_else(|| versioned(FAST_SYSTEM_PROMPT)),
                max_tokens: models.fast.max_tokens(),
                followup_max_tokens: models.fast.followup_max_tokens(),
            },
            thorough: TierTemplate {
                system_prompt: models
                    .thorough
                    .system_prompt()
                    .map(str::to_string)
                    .unwrap_or_else(|| versioned(THOROUGH_SYSTEM_PROMPT)),
                max_tokens: models.thorough.max_tokens(),
                followup_max_tokens: models.thorough.followup_max_tokens(),
            },
        }
    }

    fn template(&self, tier: ModelTier) -> &TierTemplate {
        match tier {
            ModelTier::Fast => &self.fast,
            ModelTier::Thorough => &self.thorough,
        }
    }

    /// Assemble the request for a tier
    ///
    /// # Arguments
    ///
    /// * `tier` - Target tier
    /// * `question` - Raw question text
    /// * `context` - Supporting material; omitted when blank, ignored by the fast tier
    /// * `previous_answer` - Selects expand mode (thorough tier only)
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` for a blank question or an expand
    /// request on the fast tier.
    pub fn assemble(
        &self,
        tier: ModelTier,
        question: &str,
        context: Option<&str>,
        previous_answer: Option<&str>,
    ) -> AppResult<PromptRequest> {
        let question = question.trim();
        if question.is_empty() {
            return Err(AppError::Validation("question cannot be empty".to_string()));
        }

        let previous_answer = previous_answer.map(str::trim).filter(|a| !a.is_empty());
        let template = self.template(tier);
        let system = vec![Segment::cached(template.system_prompt.clone())];

        match tier {
            ModelTier::Fast => {
                if previous_answer.is_some() {
                    return Err(AppError::Validation(
                        "expanding a previous answer is only supported for complex questions"
                            .to_string(),
                    ));
                }

                Ok(PromptRequest {
                    tier,
                    system,
                    user: vec![Segment::plain(clean_lookup(question))],
                    max_tokens: template.max_tokens,
                })
            }
            ModelTier::Thorough => {
                let mut user = Vec::with_capacity(2);
                if let Some(context) = context.map(str::trim).filter(|c| !c.is_empty()) {
                    user.push(Segment::cached(format!("[해설 자료]\n{}", context)));
                }

                let max_tokens = match previous_answer {
                    Some(answer) => {
                        user.push(Segment::plain(format!(
                            "[이전 질문]\n{}\n\n[이전 답변]\n{}\n\n[요청]\n{}",
                            question, answer, EXPAND_INSTRUCTION
                        )));
                        template.followup_max_tokens
                    }
                    None => {
                        user.push(Segment::plain(format!(
                            "[학생 질문]\n{}\n\n{}",
                            question, ANSWER_RULES
                        )));
                        template.max_tokens
                    }
                };

                Ok(PromptRequest {
                    tier,
                    system,
                    user,
                    max_tokens,
                })
            }
        }
    }

    /// Assemble the detailed vocabulary card request (fast tier)
    pub fn word_detail(&self, word: &str) -> AppResult<PromptRequest> {
        let word = word.trim();
        if word.is_empty() {
            return Err(AppError::Validation("word cannot be empty".to_string()));
        }

        Ok(PromptRequest {
            tier: ModelTier::Fast,
            system: vec![Segment::cached(versioned(WORD_DETAIL_SYSTEM_PROMPT))],
            user: vec![Segment::plain(format!(
                "{}의 뜻과 상세 정보를 알려주세요. USE THE EXACT FORMAT ABOVE.",
                word
            ))],
            max_tokens: WORD_DETAIL_MAX_TOKENS,
        })
    }
}

/// Strip trailing punctuation and meaning-request boilerplate from a lookup
///
/// Falls back to the trimmed input when nothing would remain.
pub fn clean_lookup(question: &str) -> String {
    let trimmed = question.trim();
    let stripped = trimmed.trim_end_matches(['?', '？', '.', '!', '。']).trim_end();
    let stripped = LOOKUP_PREFIX.replace(stripped, "");
    let stripped = LOOKUP_SUFFIX.replace(&stripped, "");
    let cleaned = stripped.trim();

    if cleaned.is_empty() {
        trimmed.to_string()
    } else {
        cleaned.to_string()
    }
}
