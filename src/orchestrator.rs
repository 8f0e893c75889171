use thiserror::Error;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::app_state::AppState;
use crate::engine::InferenceError;
use crate::prompt::{compose, split_assessment};
use crate::safety::{SafetyLevel, SafetyResult};
use crate::severity::{estimate, RecommendedAction, SeverityResult};
use crate::types::{AskRequest, AskResponse, Language, TaskType};

pub const MAX_QUESTION_CHARS: usize = 4000;

pub const DEFAULT_TEMPERATURE: f32 = 0.2;
pub const MIN_TEMPERATURE: f32 = 0.0;
pub const MAX_TEMPERATURE: f32 = 1.5;

pub const DEFAULT_MAX_TOKENS: u32 = 512;
pub const MIN_MAX_TOKENS: u32 = 64;
pub const MAX_MAX_TOKENS: u32 = 1024;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Question cannot be empty.")]
    EmptyQuestion,
    #[error("Question is too long ({len} characters, the limit is {max}).")]
    QuestionTooLong { len: usize, max: usize },
    #[error("Unsupported task_type `{0}`; expected one of general_qa, medical_qa, diagnosis, drug, lab, education.")]
    UnknownTaskType(String),
    #[error("Unsupported language `{0}`; expected `en` or `zh`.")]
    UnknownLanguage(String),
    #[error("temperature must be a finite number.")]
    InvalidTemperature,
    #[error("Malformed request body: {0}")]
    MalformedBody(String),
}

/// 校验、补默认值、夹紧之后的请求
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedAsk {
    pub question: String,
    pub task_type: TaskType,
    pub language: Language,
    pub temperature: f32,
    pub max_tokens: u32,
}

pub fn validate(request: AskRequest) -> Result<ValidatedAsk, ValidationError> {
    let question = request.question.trim();
    if question.is_empty() {
        return Err(ValidationError::EmptyQuestion);
    }
    let len = question.chars().count();
    if len > MAX_QUESTION_CHARS {
        return Err(ValidationError::QuestionTooLong {
            len,
            max: MAX_QUESTION_CHARS,
        });
    }

    let task_type = match request.task_type.as_deref() {
        None => TaskType::default(),
        Some(raw) => TaskType::parse(raw)
            .ok_or_else(|| ValidationError::UnknownTaskType(raw.to_string()))?,
    };

    let language = match request.language.as_deref() {
        None => Language::default(),
        Some(raw) => Language::from_locale(raw)
            .ok_or_else(|| ValidationError::UnknownLanguage(raw.to_string()))?,
    };

    let temperature = match request.temperature {
        None => DEFAULT_TEMPERATURE,
        Some(t) if !t.is_finite() => return Err(ValidationError::InvalidTemperature),
        Some(t) => (t as f32).clamp(MIN_TEMPERATURE, MAX_TEMPERATURE),
    };

    let max_tokens = request
        .max_tokens
        .map(|n| n.clamp(MIN_MAX_TOKENS as i64, MAX_MAX_TOKENS as i64) as u32)
        .unwrap_or(DEFAULT_MAX_TOKENS);

    Ok(ValidatedAsk {
        question: question.to_string(),
        task_type,
        language,
        temperature,
        max_tokens,
    })
}

/// 单个请求在流水线里的位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Validated,
    Classified,
    Estimated,
    PromptComposed,
    InferenceDone,
    Responded,
    Rejected,
    Degraded,
}

struct StageTracker {
    stage: Stage,
}

impl StageTracker {
    fn new() -> Self {
        Self {
            stage: Stage::Received,
        }
    }

    fn advance(&mut self, next: Stage) {
        debug!(from = ?self.stage, to = ?next, "ask stage");
        self.stage = next;
    }
}

#[derive(Debug)]
pub struct AskOutcome {
    pub response: AskResponse,
    /// Responded 或 Degraded
    pub stage: Stage,
    pub failure: Option<InferenceError>,
}

/// `/api/ask` 的完整流程：
/// 校验 -> 安全分类 -> 严重程度 -> 组 prompt -> 调模型 -> 组装响应。
///
/// 推理失败不会向上抛，而是返回带兜底答案的降级响应；
/// safety / severity 是本地计算的，任何情况下都会返回。
pub async fn handle(state: &AppState, request: AskRequest) -> Result<AskOutcome, ValidationError> {
    let span = info_span!("ask", question_len = request.question.trim().chars().count());
    run(state, request).instrument(span).await
}

async fn run(state: &AppState, request: AskRequest) -> Result<AskOutcome, ValidationError> {
    let mut tracker = StageTracker::new();

    let ask = match validate(request) {
        Ok(ask) => ask,
        Err(err) => {
            tracker.advance(Stage::Rejected);
            warn!(error = %err, "ask rejected");
            return Err(err);
        }
    };
    tracker.advance(Stage::Validated);

    let safety = state.classifier.classify(&ask.question);
    tracker.advance(Stage::Classified);

    let severity = estimate(&ask.question, &safety);
    tracker.advance(Stage::Estimated);

    let prompt = compose(
        &ask.question,
        ask.task_type,
        ask.language,
        &safety,
        &severity,
    );
    tracker.advance(Stage::PromptComposed);

    let generated = state
        .engine
        .generate(&prompt, ask.temperature, ask.max_tokens)
        .await
        .and_then(|raw| {
            let (answer, assessment) = split_assessment(&raw);
            if answer.is_empty() {
                Err(InferenceError::Upstream(
                    "model returned an empty answer".to_string(),
                ))
            } else {
                Ok((answer, assessment))
            }
        });

    match generated {
        Ok((answer, model_assessment)) => {
            tracker.advance(Stage::InferenceDone);
            let answer = overlay_safety(ask.language, &safety, answer);
            tracker.advance(Stage::Responded);
            info!(
                safety = safety.level.as_str(),
                severity = severity.severity.as_str(),
                task_type = ask.task_type.as_str(),
                language = ask.language.as_str(),
                model = state.engine.model_name(),
                "ask answered"
            );

            Ok(AskOutcome {
                response: AskResponse {
                    answer,
                    safety,
                    severity,
                    used_prompt: prompt,
                    model_assessment,
                },
                stage: tracker.stage,
                failure: None,
            })
        }
        Err(err) => {
            tracker.advance(Stage::Degraded);
            warn!(
                error = %err,
                kind = err.kind(),
                safety = safety.level.as_str(),
                "inference failed, returning fallback answer"
            );

            let answer = fallback_answer(ask.language, &safety, &severity);
            Ok(AskOutcome {
                response: AskResponse {
                    answer,
                    safety,
                    severity,
                    used_prompt: prompt,
                    model_assessment: None,
                },
                stage: tracker.stage,
                failure: Some(err),
            })
        }
    }
}

fn emergency_banner(language: Language) -> &'static str {
    match language {
        Language::En => {
            "⚠ EMERGENCY: Your description contains signs that may indicate a medical emergency. \
             Please call your local emergency number or go to the nearest emergency department immediately."
        }
        Language::Zh => {
            "⚠ 紧急提示：您描述的症状可能提示医疗急症。请立即拨打当地急救电话或前往最近的急诊科。"
        }
    }
}

/// emergency 时把醒目的提示放在模型答案最前面
fn overlay_safety(language: Language, safety: &SafetyResult, answer: String) -> String {
    if safety.level == SafetyLevel::Emergency {
        format!("{}\n\n{}", emergency_banner(language), answer)
    } else {
        answer
    }
}

fn describe_action(language: Language, action: RecommendedAction) -> &'static str {
    match (language, action) {
        (Language::En, RecommendedAction::SelfCare) => {
            "look after yourself at home and keep an eye on your symptoms"
        }
        (Language::En, RecommendedAction::SeeDoctor) => "make an appointment with a doctor",
        (Language::En, RecommendedAction::SeekUrgentCare) => "seek urgent medical care",
        (Language::En, RecommendedAction::Emergency) => "call emergency services now",
        (Language::Zh, RecommendedAction::SelfCare) => "居家观察并留意症状变化",
        (Language::Zh, RecommendedAction::SeeDoctor) => "预约医生就诊",
        (Language::Zh, RecommendedAction::SeekUrgentCare) => "尽快就医",
        (Language::Zh, RecommendedAction::Emergency) => "立即拨打急救电话",
    }
}

/// 模型不可用时的兜底答案，只基于本地的 safety / severity
pub fn fallback_answer(
    language: Language,
    safety: &SafetyResult,
    severity: &SeverityResult,
) -> String {
    let action = describe_action(language, severity.recommended_action);
    let body = match language {
        Language::En => format!(
            "The AI model is temporarily unavailable, so a detailed answer could not be generated. \
             Based on an automatic safety check, the recommended action is to {action} ({}). \
             This tool provides general health information only and is not a substitute for \
             professional medical advice.",
            severity.time_window
        ),
        Language::Zh => format!(
            "AI 模型暂时不可用，无法生成详细回答。根据自动安全检查，建议您{action}（{}）。\
             本工具仅提供一般健康信息，不能替代专业医疗建议。",
            severity.time_window
        ),
    };

    overlay_safety(language, safety, body)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::AppConfig;
    use crate::engine::testing::ScriptedEngine;
    use crate::severity::SeverityLevel;

    fn request(question: &str) -> AskRequest {
        AskRequest {
            question: question.to_string(),
            task_type: Some("general_qa".to_string()),
            language: Some("en".to_string()),
            temperature: None,
            max_tokens: None,
        }
    }

    fn state_with(engine: Arc<ScriptedEngine>) -> Arc<AppState> {
        AppState::with_engine(AppConfig::default(), engine)
    }

    #[test]
    fn validate_applies_defaults() {
        let ask = validate(AskRequest {
            question: "  hello  ".to_string(),
            task_type: None,
            language: None,
            temperature: None,
            max_tokens: None,
        })
        .unwrap();
        assert_eq!(ask.question, "hello");
        assert_eq!(ask.task_type, TaskType::GeneralQa);
        assert_eq!(ask.language, Language::En);
        assert_eq!(ask.temperature, DEFAULT_TEMPERATURE);
        assert_eq!(ask.max_tokens, DEFAULT_MAX_TOKENS);
    }

    #[test]
    fn validate_clamps_numeric_fields() {
        let mut req = request("q");
        req.temperature = Some(9.0);
        req.max_tokens = Some(-5);
        let ask = validate(req).unwrap();
        assert_eq!(ask.temperature, MAX_TEMPERATURE);
        assert_eq!(ask.max_tokens, MIN_MAX_TOKENS);

        let mut req = request("q");
        req.temperature = Some(-1.0);
        req.max_tokens = Some(100_000);
        let ask = validate(req).unwrap();
        assert_eq!(ask.temperature, MIN_TEMPERATURE);
        assert_eq!(ask.max_tokens, MAX_MAX_TOKENS);
    }

    #[test]
    fn validate_rejects_bad_fields() {
        assert_eq!(validate(request(" \n\t ")), Err(ValidationError::EmptyQuestion));

        let mut req = request("q");
        req.task_type = Some("surgery".to_string());
        assert!(matches!(validate(req), Err(ValidationError::UnknownTaskType(_))));

        let mut req = request("q");
        req.language = Some("fr".to_string());
        assert!(matches!(validate(req), Err(ValidationError::UnknownLanguage(_))));

        let mut req = request("q");
        req.temperature = Some(f64::NAN);
        assert_eq!(validate(req), Err(ValidationError::InvalidTemperature));

        let long = "a".repeat(MAX_QUESTION_CHARS + 1);
        assert!(matches!(
            validate(request(&long)),
            Err(ValidationError::QuestionTooLong { .. })
        ));
    }

    #[tokio::test]
    async fn whitespace_question_never_reaches_engine() {
        let engine = Arc::new(ScriptedEngine::answering("unused"));
        let state = state_with(engine.clone());

        let err = handle(&state, request("   ")).await.unwrap_err();
        assert_eq!(err, ValidationError::EmptyQuestion);
        assert_eq!(engine.calls(), 0);
    }

    #[tokio::test]
    async fn safe_question_gets_model_answer() {
        let engine = Arc::new(ScriptedEngine::answering(
            "Rest and hydrate.\n###JSON### {\"severity\":\"low\",\"recommended_action\":\"self_care\"}",
        ));
        let state = state_with(engine.clone());

        let outcome = handle(
            &state,
            request("I have a mild headache for three days, no fever."),
        )
        .await
        .unwrap();

        assert_eq!(outcome.stage, Stage::Responded);
        assert!(outcome.failure.is_none());
        let resp = outcome.response;
        assert_eq!(resp.answer, "Rest and hydrate.");
        assert_eq!(resp.safety.level, SafetyLevel::Safe);
        assert!(matches!(
            resp.severity.severity,
            SeverityLevel::Low | SeverityLevel::Medium
        ));
        assert_eq!(
            resp.model_assessment.and_then(|a| a.severity).as_deref(),
            Some("low")
        );
        assert_eq!(engine.last_prompt().as_deref(), Some(resp.used_prompt.as_str()));
    }

    #[tokio::test]
    async fn emergency_still_calls_engine_and_overlays_banner() {
        let engine = Arc::new(ScriptedEngine::answering("Call an ambulance."));
        let state = state_with(engine.clone());

        let outcome = handle(
            &state,
            request("I am having severe chest pain and can't breathe."),
        )
        .await
        .unwrap();

        assert_eq!(engine.calls(), 1);
        let resp = outcome.response;
        assert_eq!(resp.safety.level, SafetyLevel::Emergency);
        assert_eq!(resp.severity.recommended_action, RecommendedAction::Emergency);
        assert!(resp.answer.starts_with("⚠ EMERGENCY"));
        assert!(resp.answer.ends_with("Call an ambulance."));
    }

    #[tokio::test]
    async fn every_inference_failure_degrades() {
        let failures = [
            InferenceError::Auth("HF_API_KEY is not set".to_string()),
            InferenceError::RateLimit,
            InferenceError::Timeout(100),
            InferenceError::Upstream("502".to_string()),
        ];

        for failure in failures {
            let engine = Arc::new(ScriptedEngine::failing(failure.clone()));
            let state = state_with(engine);

            let outcome = handle(&state, request("My knee hurts after running"))
                .await
                .unwrap();
            assert_eq!(outcome.stage, Stage::Degraded);
            assert_eq!(outcome.failure, Some(failure));
            assert!(outcome.response.answer.contains("temporarily unavailable"));
            assert!(!outcome.response.used_prompt.is_empty());
            assert!(outcome.response.model_assessment.is_none());
        }
    }

    #[tokio::test]
    async fn degraded_emergency_keeps_banner_and_safety() {
        let engine = Arc::new(ScriptedEngine::failing(InferenceError::Timeout(50)));
        let state = state_with(engine);

        let outcome = handle(&state, request("I want to end my life")).await.unwrap();
        let resp = outcome.response;
        assert_eq!(resp.safety.level, SafetyLevel::Emergency);
        assert_eq!(resp.severity.severity, SeverityLevel::Critical);
        assert!(resp.answer.starts_with("⚠ EMERGENCY"));
        assert!(resp.answer.contains("call emergency services now"));
    }

    #[tokio::test]
    async fn blank_model_answer_is_treated_as_upstream_failure() {
        let engine = Arc::new(ScriptedEngine::answering("   ###JSON### {}"));
        let state = state_with(engine);

        let outcome = handle(&state, request("what is a normal heart rate")).await.unwrap();
        assert_eq!(outcome.stage, Stage::Degraded);
        assert!(matches!(outcome.failure, Some(InferenceError::Upstream(_))));
    }

    #[test]
    fn chinese_fallback_uses_chinese_text() {
        let safety = SafetyResult::safe();
        let severity = SeverityResult::baseline();
        let text = fallback_answer(Language::Zh, &safety, &severity);
        assert!(text.contains("AI 模型暂时不可用"));
        assert!(text.contains("居家观察"));
    }
}
