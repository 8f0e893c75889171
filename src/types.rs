use serde::{Deserialize, Serialize};

use crate::safety::SafetyResult;
use crate::severity::SeverityResult;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// `/api/ask` 的原始请求体。
/// 枚举字段先按字符串接收，由 orchestrator 统一校验，
/// 这样非法取值返回 400 而不是 Rocket 默认的 422。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskRequest {
    pub question: String,
    #[serde(default)]
    pub task_type: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub max_tokens: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskResponse {
    pub answer: String,
    pub safety: SafetyResult,
    pub severity: SeverityResult,
    pub used_prompt: String,
    /// 模型在 `###JSON###` 之后自带的评估，仅供参考
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_assessment: Option<ModelAssessment>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelAssessment {
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub recommended_action: Option<String>,
    #[serde(default)]
    pub time_window: Option<String>,
    #[serde(default)]
    pub risk_notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    GeneralQa,
    MedicalQa,
    Diagnosis,
    Drug,
    Lab,
    Education,
}

impl TaskType {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "general_qa" => Some(Self::GeneralQa),
            "medical_qa" => Some(Self::MedicalQa),
            "diagnosis" => Some(Self::Diagnosis),
            "drug" => Some(Self::Drug),
            "lab" => Some(Self::Lab),
            "education" => Some(Self::Education),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GeneralQa => "general_qa",
            Self::MedicalQa => "medical_qa",
            Self::Diagnosis => "diagnosis",
            Self::Drug => "drug",
            Self::Lab => "lab",
            Self::Education => "education",
        }
    }
}

impl Default for TaskType {
    fn default() -> Self {
        Self::GeneralQa
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    En,
    Zh,
}

impl Language {
    /// 接受 `en`、`en-US`、`zh_CN` 这类 locale，只看主语言标签
    pub fn from_locale(raw: &str) -> Option<Self> {
        let primary = raw
            .trim()
            .split(|c: char| c == '-' || c == '_')
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();

        match primary.as_str() {
            "en" => Some(Self::En),
            "zh" => Some(Self::Zh),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Zh => "zh",
        }
    }
}

impl Default for Language {
    fn default() -> Self {
        Self::En
    }
}
