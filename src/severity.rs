use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::safety::{
    contains_affirmed, contains_any_str, normalize, split_sentences, SafetyLevel, SafetyResult,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeverityLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl SeverityLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendedAction {
    SelfCare,
    SeeDoctor,
    SeekUrgentCare,
    Emergency,
}

impl RecommendedAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SelfCare => "self_care",
            Self::SeeDoctor => "see_doctor",
            Self::SeekUrgentCare => "seek_urgent_care",
            Self::Emergency => "emergency",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeverityResult {
    pub severity: SeverityLevel,
    pub recommended_action: RecommendedAction,
    pub time_window: String,
    pub risk_notes: String,
}

impl SeverityResult {
    /// 没有任何规则命中时的结果
    pub fn baseline() -> Self {
        Self {
            severity: SeverityLevel::Low,
            recommended_action: RecommendedAction::SelfCare,
            time_window: BASELINE_WINDOW.to_string(),
            risk_notes: "No specific risk factors detected.".to_string(),
        }
    }

    pub fn is_high_or_worse(&self) -> bool {
        self.severity >= SeverityLevel::High
    }
}

const BASELINE_WINDOW: &str =
    "Monitor at home; see a doctor if symptoms persist beyond a few days or get worse";
const WARNING_WINDOW: &str = "Within 24 hours";
const EMERGENCY_WINDOW: &str = "Immediately: call emergency services or go to the nearest emergency department";

#[derive(Debug)]
pub struct SeverityRule {
    pub name: &'static str,
    pub terms: &'static [&'static str],
    /// 为 true 时被否定的词不算（"no fever" 不算发烧）
    pub negatable: bool,
    pub severity: SeverityLevel,
    pub action: RecommendedAction,
    pub time_window: &'static str,
    pub note: &'static str,
}

impl SeverityRule {
    fn outcome(&self) -> (SeverityLevel, RecommendedAction) {
        (self.severity, self.action)
    }

    fn matches(&self, text: &str, sentences: &[&str]) -> bool {
        if self.negatable {
            sentences
                .iter()
                .any(|s| self.terms.iter().any(|t| contains_affirmed(s, t)))
        } else {
            contains_any_str(text, self.terms)
        }
    }
}

/// 严重程度规则表。所有命中的规则都会收集起来，取 (severity, action) 最高者；
/// 结果相同时保留排在前面的那条的描述。
pub const SEVERITY_RULES: &[SeverityRule] = &[
    SeverityRule {
        name: "high_fever",
        terms: &[
            "high fever",
            "39°",
            "40°",
            "39 degrees",
            "40 degrees",
            "103°",
            "104°",
            "103 f",
            "104 f",
            "高烧",
            "高热",
        ],
        negatable: true,
        severity: SeverityLevel::High,
        action: RecommendedAction::SeekUrgentCare,
        time_window: "Within 24 hours",
        note: "High fever reported",
    },
    SeverityRule {
        name: "fever",
        terms: &["fever", "febrile", "发烧", "发热"],
        negatable: true,
        severity: SeverityLevel::Medium,
        action: RecommendedAction::SeeDoctor,
        time_window: "Within 1-3 days, sooner if it rises or lasts more than 3 days",
        note: "Fever reported",
    },
    SeverityRule {
        name: "intense_pain",
        terms: &["severe", "worst", "unbearable", "excruciating", "剧烈", "剧痛"],
        negatable: false,
        severity: SeverityLevel::High,
        action: RecommendedAction::SeekUrgentCare,
        time_window: "Within 24 hours",
        note: "Intense pain or severe symptoms described",
    },
    SeverityRule {
        name: "persistent",
        terms: &[
            "weeks",
            "months",
            "persistent",
            "chronic",
            "keeps coming back",
            "for a week",
            "几周",
            "数月",
            "持续",
            "反复",
        ],
        negatable: false,
        severity: SeverityLevel::Medium,
        action: RecommendedAction::SeeDoctor,
        time_window: "Within the next week",
        note: "Symptoms are long-lasting or recurring",
    },
    SeverityRule {
        name: "worsening",
        terms: &["getting worse", "worsening", "spreading", "越来越", "加重"],
        negatable: false,
        severity: SeverityLevel::Medium,
        action: RecommendedAction::SeeDoctor,
        time_window: "Within 1-3 days",
        note: "Symptoms are getting worse",
    },
    SeverityRule {
        name: "mild",
        terms: &["mild", "slight", "minor", "a bit", "轻微", "有点"],
        negatable: false,
        severity: SeverityLevel::Low,
        action: RecommendedAction::SelfCare,
        time_window: BASELINE_WINDOW,
        note: "Symptoms described as mild",
    },
];

/// 根据问题文本和安全分级估计严重程度。
///
/// 安全分级优先：emergency 直接得到 critical / emergency，
/// warning 至少是 high / seek_urgent_care。
pub fn estimate(question: &str, safety: &SafetyResult) -> SeverityResult {
    estimate_with_rules(question, safety, SEVERITY_RULES)
}

pub fn estimate_with_rules(
    question: &str,
    safety: &SafetyResult,
    rules: &[SeverityRule],
) -> SeverityResult {
    let text = normalize(question);
    let sentences = split_sentences(&text);

    let matched: Vec<&SeverityRule> = rules
        .iter()
        .filter(|rule| rule.matches(&text, &sentences))
        .collect();
    if !matched.is_empty() {
        let names: Vec<&str> = matched.iter().map(|r| r.name).collect();
        debug!(rules = ?names, "severity rules matched");
    }

    // 严格大于才替换，平局保留先出现的规则
    let winner = matched.iter().copied().fold(None::<&SeverityRule>, |best, rule| match best {
        Some(b) if rule.outcome() <= b.outcome() => Some(b),
        _ => Some(rule),
    });

    let mut result = match winner {
        Some(rule) => SeverityResult {
            severity: rule.severity,
            recommended_action: rule.action,
            time_window: rule.time_window.to_string(),
            risk_notes: String::new(),
        },
        None => SeverityResult::baseline(),
    };

    match safety.level {
        SafetyLevel::Emergency => {
            result.severity = SeverityLevel::Critical;
            result.recommended_action = RecommendedAction::Emergency;
            result.time_window = EMERGENCY_WINDOW.to_string();
        }
        SafetyLevel::Warning => {
            let floor = (SeverityLevel::High, RecommendedAction::SeekUrgentCare);
            if (result.severity, result.recommended_action) < floor {
                result.severity = floor.0;
                result.recommended_action = floor.1;
                result.time_window = WARNING_WINDOW.to_string();
            }
        }
        SafetyLevel::Safe => {}
    }

    let mut notes: Vec<String> = matched.iter().map(|r| r.note.to_string()).collect();
    if safety.level != SafetyLevel::Safe {
        notes.push(format!("Safety check: {}", safety.message));
    }
    if !notes.is_empty() {
        result.risk_notes = notes.join("; ");
    } else if result.risk_notes.is_empty() {
        result.risk_notes = SeverityResult::baseline().risk_notes;
    }

    result
}
