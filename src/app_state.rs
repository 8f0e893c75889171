use std::sync::Arc;

use tracing::debug;

use crate::config::AppConfig;
use crate::engine::{HfInferenceClient, InferenceEngine};
use crate::safety::SafetyClassifier;

/// 全局共享状态（启动时构建，之后只读）：
/// - config: 环境变量里读到的配置
/// - classifier: 安全规则表
/// - engine: 推理引擎，测试里可以换成假的
pub struct AppState {
    pub config: AppConfig,
    pub classifier: SafetyClassifier,
    pub engine: Arc<dyn InferenceEngine>,
}

impl AppState {
    /// 用 Hugging Face 客户端构建
    pub fn new(config: AppConfig) -> Arc<Self> {
        let engine: Arc<dyn InferenceEngine> = Arc::new(HfInferenceClient::new(config.hf.clone()));
        Self::with_engine(config, engine)
    }

    pub fn with_engine(config: AppConfig, engine: Arc<dyn InferenceEngine>) -> Arc<Self> {
        let classifier = SafetyClassifier::with_extra_terms(
            &config.extra_emergency_terms,
            &config.extra_warning_terms,
        );
        debug!(rules = classifier.rules().len(), "safety rules loaded");

        Arc::new(Self {
            config,
            classifier,
            engine,
        })
    }
}
