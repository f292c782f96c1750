//! Chat endpoint handlers
//!
//! Handles POST /api/chat (tutor questions) and POST /api/word-detail
//! (vocabulary cards). Both are metered by the usage ledger and answer with
//! the same envelope.

use crate::cost::CostBreakdown;
use crate::error::AppError;
use crate::handlers::AppState;
use crate::handlers::extractor::ApiJson;
use crate::middleware::{RequestId, UserId};
use crate::models::UsageTelemetry;
use crate::router::{Answer, ModelTier, Question, QuestionType};
use axum::{Extension, Json, extract::State};
use serde::{Deserialize, Deserializer, Serialize};

/// Maximum allowed question length in characters
pub const MAX_QUESTION_LENGTH: usize = 10_000;

/// Maximum allowed word length for vocabulary cards
pub const MAX_WORD_LENGTH: usize = 100;

/// Chat request from the widget
///
/// Validation is enforced during deserialization - invalid instances cannot exist.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    question: String,
    question_type: Option<QuestionType>,
    page_id: Option<String>,
    context: Option<String>,
    previous_answer: Option<String>,
}

impl ChatRequest {
    pub fn question(&self) -> &str {
        &self.question
    }

    pub fn question_type(&self) -> Option<QuestionType> {
        self.question_type
    }

    pub fn page_id(&self) -> Option<&str> {
        self.page_id.as_deref()
    }

    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    pub fn previous_answer(&self) -> Option<&str> {
        self.previous_answer.as_deref()
    }
}

/// Treat `""` and whitespace-only strings like an absent field
fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl<'de> Deserialize<'de> for ChatRequest {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct RawChatRequest {
            question: String,
            #[serde(default, alias = "questionType")]
            question_type: Option<QuestionType>,
            #[serde(default)]
            page_id: Option<String>,
            #[serde(default)]
            context: Option<String>,
            #[serde(default)]
            previous_answer: Option<String>,
        }

        let raw = RawChatRequest::deserialize(deserializer)?;

        if raw.question.trim().is_empty() {
            return Err(serde::de::Error::custom(
                "question cannot be empty or contain only whitespace",
            ));
        }

        // Count Unicode characters, not bytes
        let char_count = raw.question.chars().count();
        if char_count > MAX_QUESTION_LENGTH {
            return Err(serde::de::Error::custom(format!(
                "question exceeds maximum length of {} characters (got {})",
                MAX_QUESTION_LENGTH, char_count
            )));
        }

        Ok(ChatRequest {
            question: raw.question,
            question_type: raw.question_type,
            page_id: non_blank(raw.page_id),
            context: non_blank(raw.context),
            previous_answer: non_blank(raw.previous_answer),
        })
    }
}

/// Vocabulary card request
#[derive(Debug, Clone)]
pub struct WordDetailRequest {
    word: String,
}

impl WordDetailRequest {
    pub fn word(&self) -> &str {
        &self.word
    }
}

impl<'de> Deserialize<'de> for WordDetailRequest {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct RawWordDetailRequest {
            word: String,
        }

        let raw = RawWordDetailRequest::deserialize(deserializer)?;
        let word = raw.word.trim();

        if word.is_empty() {
            return Err(serde::de::Error::custom("word cannot be empty"));
        }
        if word.chars().count() > MAX_WORD_LENGTH {
            return Err(serde::de::Error::custom(format!(
                "word exceeds maximum length of {} characters",
                MAX_WORD_LENGTH
            )));
        }

        Ok(WordDetailRequest {
            word: word.to_string(),
        })
    }
}

/// Cost summary returned to the widget
#[derive(Debug, Clone, Serialize)]
pub struct CostSummary {
    pub total: f64,
    pub currency: &'static str,
}

impl From<&CostBreakdown> for CostSummary {
    fn from(cost: &CostBreakdown) -> Self {
        Self {
            total: cost.total,
            currency: "USD",
        }
    }
}

/// Per-answer metadata
#[derive(Debug, Clone, Serialize)]
pub struct AnswerMetadata {
    pub question_type: QuestionType,
    pub tier: ModelTier,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deducted_from: Option<QuestionType>,
    pub response_time_ms: u64,
    pub usage: UsageTelemetry,
    pub cost: CostSummary,
}

/// Successful answer envelope
#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    pub success: bool,
    pub answer: String,
    pub metadata: AnswerMetadata,
}

impl From<Answer> for ChatResponse {
    fn from(answer: Answer) -> Self {
        let cost = CostSummary::from(&answer.cost);
        Self {
            success: true,
            answer: answer.answer,
            metadata: AnswerMetadata {
                question_type: answer.question_type,
                tier: answer.tier,
                model: answer.model,
                deducted_from: answer.deducted_from,
                response_time_ms: answer.elapsed_ms,
                usage: answer.telemetry,
                cost,
            },
        }
    }
}

/// Resolve the supporting context for a request
///
/// Inline context wins; otherwise the page cache is consulted. A cache miss
/// is not an error: the question is answered without context.
async fn resolve_context(
    state: &AppState,
    request: &ChatRequest,
    request_id: RequestId,
) -> Option<String> {
    if let Some(context) = request.context() {
        return Some(context.to_string());
    }

    let page_id = request.page_id()?;
    match state.contexts().get(page_id).await {
        Some(entry) => {
            tracing::debug!(
                request_id = %request_id,
                page_id = %page_id,
                context_len = entry.context.len(),
                "Using cached context"
            );
            Some(entry.context)
        }
        None => {
            tracing::info!(
                request_id = %request_id,
                page_id = %page_id,
                "No cached context for page, answering without it"
            );
            None
        }
    }
}

/// POST /api/chat handler
pub async fn handler(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    user: UserId,
    ApiJson(request): ApiJson<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    tracing::debug!(
        request_id = %request_id,
        user_id = %user,
        question_length = request.question().chars().count(),
        question_type = ?request.question_type(),
        page_id = ?request.page_id(),
        follow_up = request.previous_answer().is_some(),
        "Received chat request"
    );

    let mut question = Question::new(request.question());
    if let Some(context) = resolve_context(&state, &request, request_id).await {
        question = question.with_context(context);
    }
    if let Some(question_type) = request.question_type() {
        question = question.with_type(question_type);
    }
    if let Some(previous) = request.previous_answer() {
        question = question.with_previous_answer(previous);
    }

    let answer = state
        .router()
        .answer(user.as_str(), &question)
        .await
        .inspect_err(|e| {
            tracing::warn!(request_id = %request_id, user_id = %user, error = %e, "Chat request failed");
        })?;

    Ok(Json(ChatResponse::from(answer)))
}

/// POST /api/word-detail handler
pub async fn word_detail_handler(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    user: UserId,
    ApiJson(request): ApiJson<WordDetailRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    tracing::debug!(
        request_id = %request_id,
        user_id = %user,
        word = %request.word(),
        "Received word detail request"
    );

    let answer = state
        .router()
        .word_detail(user.as_str(), request.word())
        .await
        .inspect_err(|e| {
            tracing::warn!(request_id = %request_id, user_id = %user, error = %e, "Word detail request failed");
        })?;

    Ok(Json(ChatResponse::from(answer)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::{EchoGateway, state, state_with};
    use crate::handlers::{AppState, build_router};
    use crate::middleware::USER_ID_HEADER;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        response::Response,
    };
    use std::sync::Arc;
    use tower::ServiceExt;

    fn post(uri: &str, user: Option<&str>, body: serde_json::Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(user) = user {
            builder = builder.header(USER_ID_HEADER, user);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn send(state: &AppState, request: Request<Body>) -> Response {
        build_router(state.clone()).oneshot(request).await.unwrap()
    }

    async fn json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_chat_request_rejects_blank_question() {
        let result: Result<ChatRequest, _> = serde_json::from_str(r#"{"question":"   "}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_chat_request_length_counts_characters() {
        let at_limit = "가".repeat(MAX_QUESTION_LENGTH);
        let body = serde_json::json!({ "question": at_limit });
        assert!(serde_json::from_value::<ChatRequest>(body).is_ok());

        let over = "a".repeat(MAX_QUESTION_LENGTH + 1);
        let body = serde_json::json!({ "question": over });
        let err = serde_json::from_value::<ChatRequest>(body).unwrap_err();
        assert!(err.to_string().contains("maximum length"));
    }

    #[test]
    fn test_chat_request_accepts_camel_case_question_type() {
        let request: ChatRequest =
            serde_json::from_str(r#"{"question":"q","questionType":"complex"}"#).unwrap();
        assert_eq!(request.question_type(), Some(QuestionType::Complex));
    }

    #[test]
    fn test_chat_request_rejects_unknown_question_type() {
        let result: Result<ChatRequest, _> =
            serde_json::from_str(r#"{"question":"q","question_type":"medium"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_chat_request_blank_optionals_are_absent() {
        let request: ChatRequest = serde_json::from_str(
            r#"{"question":"q","page_id":"","context":"  ","previous_answer":""}"#,
        )
        .unwrap();
        assert!(request.page_id().is_none());
        assert!(request.context().is_none());
        assert!(request.previous_answer().is_none());
    }

    #[test]
    fn test_word_detail_request_trims_word() {
        let request: WordDetailRequest = serde_json::from_str(r#"{"word":"  abandon "}"#).unwrap();
        assert_eq!(request.word(), "abandon");
        assert!(serde_json::from_str::<WordDetailRequest>(r#"{"word":" "}"#).is_err());
    }

    #[tokio::test]
    async fn test_chat_simple_question_uses_fast_tier() {
        let state = state();
        let response = send(
            &state,
            post("/api/chat", Some("u1"), serde_json::json!({ "question": "abandon 뜻" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["answer"], "fast answer");
        assert_eq!(body["metadata"]["question_type"], "simple");
        assert_eq!(body["metadata"]["tier"], "fast");
        assert_eq!(body["metadata"]["cost"]["currency"], "USD");
        assert!((body["metadata"]["cost"]["total"].as_f64().unwrap() - 1.0).abs() < 1e-9);
        assert_eq!(body["metadata"]["usage"]["input_tokens"], 1_000_000);
    }

    #[tokio::test]
    async fn test_chat_requires_user_id() {
        let state = state();
        let response = send(
            &state,
            post("/api/chat", None, serde_json::json!({ "question": "abandon 뜻" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_chat_empty_question_is_bad_request() {
        let state = state();
        let response = send(
            &state,
            post("/api/chat", Some("u1"), serde_json::json!({ "question": "" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json(response).await["success"], false);
    }

    #[tokio::test]
    async fn test_chat_uses_cached_page_context() {
        let gateway = Arc::new(EchoGateway::default());
        let state = state_with(Arc::clone(&gateway));
        state.contexts().put("page-7", "정답은 3번이다").await.unwrap();

        let response = send(
            &state,
            post(
                "/api/chat",
                Some("u1"),
                serde_json::json!({
                    "question": "왜 3번이 정답인가요?",
                    "question_type": "complex",
                    "page_id": "page-7"
                }),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let prompts = gateway.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].user_text().contains("정답은 3번이다"));
    }

    #[tokio::test]
    async fn test_chat_cache_miss_answers_without_context() {
        let gateway = Arc::new(EchoGateway::default());
        let state = state_with(Arc::clone(&gateway));

        let response = send(
            &state,
            post(
                "/api/chat",
                Some("u1"),
                serde_json::json!({
                    "question": "왜 3번이 정답인가요?",
                    "question_type": "complex",
                    "page_id": "missing"
                }),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let prompts = gateway.prompts.lock().unwrap();
        assert!(!prompts[0].user_text().contains("[해설 자료]"));
    }

    #[tokio::test]
    async fn test_chat_quota_exhaustion_returns_429_with_denial() {
        let state = state();
        let ask = || {
            post(
                "/api/chat",
                Some("u1"),
                serde_json::json!({ "question": "q", "question_type": "simple" }),
            )
        };

        // simple=2, complex=2, total=3: third simple borrows complex, fourth hits total
        for _ in 0..3 {
            assert_eq!(send(&state, ask()).await.status(), StatusCode::OK);
        }

        let response = send(&state, ask()).await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let body = json(response).await;
        assert_eq!(body["allowed"], false);
        assert_eq!(body["reason"], "total_limit_exceeded");
        assert_eq!(body["usage"]["total"], 3);
    }

    #[tokio::test]
    async fn test_chat_reports_cross_tier_deduction() {
        let state = state();
        let ask = || {
            post(
                "/api/chat",
                Some("u1"),
                serde_json::json!({ "question": "q", "question_type": "simple" }),
            )
        };
        send(&state, ask()).await;
        send(&state, ask()).await;

        let body = json(send(&state, ask()).await).await;
        assert_eq!(body["metadata"]["question_type"], "simple");
        assert_eq!(body["metadata"]["deducted_from"], "complex");
    }

    #[tokio::test]
    async fn test_word_detail_meters_as_simple() {
        let state = state();
        let response = send(
            &state,
            post("/api/word-detail", Some("u1"), serde_json::json!({ "word": "abandon" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = json(response).await;
        assert_eq!(body["metadata"]["question_type"], "simple");

        let snapshot = state.ledger().snapshot("u1").await.unwrap();
        assert_eq!(snapshot.simple.used, 1);
    }
}
