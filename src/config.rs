use std::env;
use std::str::FromStr;

use anyhow::{Context, Result};
use tracing::warn;

pub const DEFAULT_MODEL_ID: &str = "meta-llama/Meta-Llama-3-8B-Instruct";
pub const DEFAULT_API_URL: &str = "https://router.huggingface.co/v1/chat/completions";
pub const DEFAULT_TIMEOUT_MS: u64 = 60_000;
pub const DEFAULT_CORS_ALLOW_ORIGIN: &str = "*";

/// 托管模型的连接参数
#[derive(Debug, Clone)]
pub struct HfConfig {
    /// 为空时推理直接返回 Auth 错误，不发请求
    pub api_key: Option<String>,
    pub model_id: String,
    pub api_url: String,
    pub timeout_ms: u64,
}

impl Default for HfConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model_id: DEFAULT_MODEL_ID.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

/// 进程启动时读取一次，之后只读
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub hf: HfConfig,
    /// false 时推理失败返回 502/503（响应体里仍带 safety / severity）
    pub degrade_on_failure: bool,
    pub extra_emergency_terms: Vec<String>,
    pub extra_warning_terms: Vec<String>,
    /// 写进 Access-Control-Allow-Origin，浏览器前端跨域调用用
    pub cors_allow_origin: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            hf: HfConfig::default(),
            degrade_on_failure: true,
            extra_emergency_terms: Vec::new(),
            extra_warning_terms: Vec::new(),
            cors_allow_origin: DEFAULT_CORS_ALLOW_ORIGIN.to_string(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// 从任意 key -> value 查找函数构建配置，方便测试
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let api_key = lookup("HF_API_KEY")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
        if api_key.is_none() {
            warn!("HF_API_KEY is not set; every /api/ask call will return a degraded answer");
        }

        let hf = HfConfig {
            api_key,
            model_id: non_empty(lookup("HF_MODEL_ID")).unwrap_or(defaults.hf.model_id),
            api_url: non_empty(lookup("HF_API_URL")).unwrap_or(defaults.hf.api_url),
            timeout_ms: parse_or_default(&lookup, "HF_TIMEOUT_MS", defaults.hf.timeout_ms),
        };

        Self {
            hf,
            degrade_on_failure: parse_or_default(
                &lookup,
                "ASK_DEGRADE_ON_FAILURE",
                defaults.degrade_on_failure,
            ),
            extra_emergency_terms: split_terms(lookup("SAFETY_EXTRA_EMERGENCY_TERMS")),
            extra_warning_terms: split_terms(lookup("SAFETY_EXTRA_WARNING_TERMS")),
            cors_allow_origin: non_empty(lookup("CORS_ALLOW_ORIGIN"))
                .unwrap_or(defaults.cors_allow_origin),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    match non_empty(lookup(key)) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .with_context(|| format!("invalid value `{raw}` for {key}")),
    }
}

/// 解析失败只打 warning 并回退默认值，不让进程起不来
fn parse_or_default<T, F>(lookup: &F, key: &str, default: T) -> T
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    match parse_var(lookup, key) {
        Ok(Some(value)) => value,
        Ok(None) => default,
        Err(err) => {
            warn!("{err:#}; falling back to the default");
            default
        }
    }
}

fn split_terms(raw: Option<String>) -> Vec<String> {
    raw.map(|list| {
        list.split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}
