use serde::{Deserialize, Serialize};

/// 安全分级：safe < warning < emergency
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyLevel {
    Safe,
    Warning,
    Emergency,
}

impl SafetyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Safe => "safe",
            Self::Warning => "warning",
            Self::Emergency => "emergency",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyResult {
    pub level: SafetyLevel,
    pub message: String,
    /// 命中的规则名，safe 时为空
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_rule: Option<String>,
}

impl SafetyResult {
    pub fn safe() -> Self {
        Self {
            level: SafetyLevel::Safe,
            message: SAFE_MESSAGE.to_string(),
            matched_rule: None,
        }
    }
}

const SAFE_MESSAGE: &str =
    "No emergency features detected. This tool provides general health information only.";

/// 单条规则的匹配方式
#[derive(Debug, Clone)]
pub enum Matcher {
    /// 全文任意位置出现即命中
    Anywhere(Vec<String>),
    /// 在某个句子里以未被否定的形式出现
    Sentence(Vec<String>),
    /// 同一个句子里，既有未被否定的 anchor，又有未被否定的 companion
    Cluster {
        anchors: Vec<String>,
        companions: Vec<String>,
    },
}

impl Matcher {
    fn matches(&self, text: &str, sentences: &[&str]) -> bool {
        match self {
            Matcher::Anywhere(terms) => contains_any(text, terms),
            Matcher::Sentence(terms) => sentences
                .iter()
                .any(|s| terms.iter().any(|t| contains_affirmed(s, t))),
            Matcher::Cluster {
                anchors,
                companions,
            } => sentences.iter().any(|s| {
                anchors.iter().any(|t| contains_affirmed(s, t))
                    && companions.iter().any(|t| contains_affirmed(s, t))
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SafetyRule {
    pub name: String,
    pub level: SafetyLevel,
    pub matcher: Matcher,
    pub message: String,
}

impl SafetyRule {
    fn new(name: &str, level: SafetyLevel, matcher: Matcher, message: &str) -> Self {
        Self {
            name: name.to_string(),
            level,
            matcher,
            message: message.to_string(),
        }
    }
}

/// 基于有序规则表的关键词安全分类器。
///
/// 规则按顺序求值，第一条命中的规则决定结果；emergency 规则排在
/// warning 规则之前，所以紧急情况总是优先。规则表本身就是配置数据，
/// 可以通过 [`SafetyClassifier::rules`] 审计，也可以追加额外关键词。
#[derive(Debug, Clone)]
pub struct SafetyClassifier {
    rules: Vec<SafetyRule>,
}

impl SafetyClassifier {
    pub fn new(rules: Vec<SafetyRule>) -> Self {
        Self { rules }
    }

    /// 默认规则表 + 配置里追加的关键词（各自排在对应级别的最后）
    pub fn with_extra_terms(extra_emergency: &[String], extra_warning: &[String]) -> Self {
        let mut rules = emergency_rules();
        if let Some(rule) = extra_rule(
            "configured_emergency_term",
            SafetyLevel::Emergency,
            extra_emergency,
            "Detected a configured emergency term. Call emergency services immediately.",
        ) {
            rules.push(rule);
        }

        rules.extend(warning_rules());
        if let Some(rule) = extra_rule(
            "configured_warning_term",
            SafetyLevel::Warning,
            extra_warning,
            "Detected a configured warning term. Please seek medical evaluation soon.",
        ) {
            rules.push(rule);
        }

        Self::new(rules)
    }

    pub fn rules(&self) -> &[SafetyRule] {
        &self.rules
    }

    /// 对原始问题做分类。空输入、乱码都不会出错，没命中就是 safe。
    pub fn classify(&self, question: &str) -> SafetyResult {
        let text = normalize(question);
        let sentences = split_sentences(&text);

        self.rules
            .iter()
            .find(|rule| rule.matcher.matches(&text, &sentences))
            .map(|rule| SafetyResult {
                level: rule.level,
                message: rule.message.clone(),
                matched_rule: Some(rule.name.clone()),
            })
            .unwrap_or_else(SafetyResult::safe)
    }
}

impl Default for SafetyClassifier {
    fn default() -> Self {
        Self::with_extra_terms(&[], &[])
    }
}

fn extra_rule(
    name: &str,
    level: SafetyLevel,
    terms: &[String],
    message: &str,
) -> Option<SafetyRule> {
    let terms: Vec<String> = terms
        .iter()
        .map(|t| normalize(t.trim()))
        .filter(|t| !t.is_empty())
        .collect();

    if terms.is_empty() {
        return None;
    }
    Some(SafetyRule::new(name, level, Matcher::Anywhere(terms), message))
}

fn terms(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

pub fn emergency_rules() -> Vec<SafetyRule> {
    use SafetyLevel::Emergency;

    vec![
        SafetyRule::new(
            "cardiac_cluster",
            Emergency,
            Matcher::Cluster {
                anchors: terms(&["chest pain", "胸痛"]),
                companions: terms(&[
                    // 放射痛
                    "left arm",
                    "jaw",
                    "radiat",
                    "to my back",
                    "to the back",
                    "in my back",
                    "shoulder",
                    "左臂",
                    "下颌",
                    "后背",
                    "肩",
                    // 气短
                    "shortness of breath",
                    "short of breath",
                    "气短",
                    "呼吸困难",
                    // 出汗
                    "sweating",
                    "cold sweat",
                    "大汗",
                ]),
            },
            "Detected severe chest pain with concerning features. Call emergency services immediately.",
        ),
        SafetyRule::new(
            "severe_breathing",
            Emergency,
            Matcher::Anywhere(terms(&[
                "can't breathe",
                "cannot breathe",
                "unable to breathe",
                "喘不过来",
                "呼吸不过来",
                "严重呼吸困难",
            ])),
            "Detected severe breathing difficulty. Call emergency services immediately.",
        ),
        SafetyRule::new(
            "gi_bleeding",
            Emergency,
            Matcher::Sentence(terms(&[
                "vomiting blood",
                "bloody vomit",
                "black stool",
                "tarry stool",
                "呕血",
                "黑便",
            ])),
            "Detected possible gastrointestinal bleeding. Please seek emergency care immediately.",
        ),
        SafetyRule::new(
            "stroke",
            Emergency,
            Matcher::Anywhere(terms(&[
                "sudden weakness on one side",
                "face drooping",
                "slurred speech",
                "突然说不出话",
                "一侧肢体无力",
                "口角歪斜",
            ])),
            "Detected possible stroke symptoms. Call emergency services immediately.",
        ),
        SafetyRule::new(
            "suicidal_ideation",
            Emergency,
            Matcher::Anywhere(terms(&[
                "kill myself",
                "end my life",
                "suicide",
                "suicidal",
                "自杀",
                "想死",
            ])),
            "Detected suicidal thoughts. Immediate help is required. Contact emergency services or a crisis hotline.",
        ),
    ]
}

pub fn warning_rules() -> Vec<SafetyRule> {
    vec![SafetyRule::new(
        "concerning_symptom",
        SafetyLevel::Warning,
        Matcher::Anywhere(terms(&[
            "shortness of breath",
            "short of breath",
            "blood in stool",
            "black stool",
            "vomiting blood",
            "unintentional weight loss",
            "severe pain",
            "chest tightness",
            "chest pain",
            "气短",
            "便血",
            "体重下降",
            "胸闷",
        ])),
        "Detected potentially concerning symptoms. Please seek medical evaluation soon.",
    )]
}

/// 否定词只作用于紧跟在后面的几个词（同一分句内）
const NEGATION_WINDOW_TOKENS: usize = 3;
const NEGATION_WINDOW_CHARS: usize = 4;

const NEGATION_TOKENS: &[&str] = &[
    "no", "not", "without", "denies", "denied", "never", "haven't", "hasn't", "don't",
    "doesn't", "didn't",
];
const NEGATION_CJK: &[&str] = &["没有", "沒有", "无", "無"];

/// 小写化，并把弯引号统一成直引号（"can’t" -> "can't"）
pub(crate) fn normalize(text: &str) -> String {
    text.to_lowercase().replace(['\u{2019}', '\u{2018}'], "'")
}

/// 中英文简单分句，去掉空句
pub(crate) fn split_sentences(text: &str) -> Vec<&str> {
    text.split(|c: char| matches!(c, '.' | '!' | '?' | '\n' | '。' | '！' | '？'))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// `pos` 处的词是否被前面的否定词修饰。
///
/// 只看同一分句（逗号、分号切开）里紧挨着的前几个英文词，
/// 中文没有空格，看前几个字符。"chest pain, no fever" 里的 chest pain 不算否定。
pub(crate) fn is_negated_at(sentence: &str, pos: usize) -> bool {
    let prefix = &sentence[..pos];
    let clause = prefix
        .rsplit(|c: char| matches!(c, ',' | ';' | ':' | '，' | '；' | '：' | '、'))
        .next()
        .unwrap_or(prefix);

    let english = clause
        .split_whitespace()
        .rev()
        .take(NEGATION_WINDOW_TOKENS)
        .map(|token| token.trim_matches(|c: char| !c.is_alphanumeric() && c != '\''))
        .any(|token| NEGATION_TOKENS.iter().any(|neg| *neg == token));
    if english {
        return true;
    }

    let chars: Vec<char> = clause.trim_end().chars().collect();
    let tail: String = chars[chars.len().saturating_sub(NEGATION_WINDOW_CHARS)..]
        .iter()
        .collect();
    NEGATION_CJK.iter().any(|neg| tail.contains(neg))
}

/// 句子里至少有一处 `term` 没有被否定
pub(crate) fn contains_affirmed(sentence: &str, term: &str) -> bool {
    sentence
        .match_indices(term)
        .any(|(pos, _)| !is_negated_at(sentence, pos))
}

pub(crate) fn contains_any(haystack: &str, needles: &[String]) -> bool {
    needles.iter().any(|n| haystack.contains(n.as_str()))
}

pub(crate) fn contains_any_str(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(q: &str) -> SafetyResult {
        SafetyClassifier::default().classify(q)
    }

    #[test]
    fn empty_and_garbage_input_is_safe() {
        for q in ["", "   ", "???", "\u{0}\u{1}", "asdkjh qweqwe"] {
            let r = classify(q);
            assert_eq!(r.level, SafetyLevel::Safe, "input {q:?}");
            assert!(!r.message.is_empty());
            assert!(r.matched_rule.is_none());
        }
    }

    #[test]
    fn mild_headache_is_safe() {
        let r = classify("I have a mild headache for three days, no fever.");
        assert_eq!(r.level, SafetyLevel::Safe);
    }

    #[test]
    fn chest_pain_with_breathing_problem_is_emergency() {
        let r = classify("I am having severe chest pain and can't breathe.");
        assert_eq!(r.level, SafetyLevel::Emergency);
    }

    #[test]
    fn typographic_apostrophe_still_matches() {
        let r = classify("I can\u{2019}t breathe properly");
        assert_eq!(r.level, SafetyLevel::Emergency);
        assert_eq!(r.matched_rule.as_deref(), Some("severe_breathing"));
    }

    #[test]
    fn cardiac_cluster_needs_companion_in_same_sentence() {
        let r = classify("Chest pain that goes to my left arm and I'm sweating");
        assert_eq!(r.matched_rule.as_deref(), Some("cardiac_cluster"));

        // 伴随症状在另一句里：只算 warning
        let r = classify("I have chest pain. Yesterday my left arm was sore");
        assert_eq!(r.level, SafetyLevel::Warning);
    }

    #[test]
    fn negated_cardiac_sentence_is_not_emergency() {
        let r = classify("No chest pain radiating to the jaw.");
        assert_ne!(r.level, SafetyLevel::Emergency);
    }

    #[test]
    fn negated_gi_bleeding_downgrades_to_warning() {
        let r = classify("I have no black stool, just stomach ache");
        assert_eq!(r.level, SafetyLevel::Warning);

        let r = classify("Since this morning I have black stool");
        assert_eq!(r.level, SafetyLevel::Emergency);
        assert_eq!(r.matched_rule.as_deref(), Some("gi_bleeding"));
    }

    #[test]
    fn chinese_terms_are_recognised() {
        assert_eq!(classify("我想自杀").level, SafetyLevel::Emergency);
        assert_eq!(classify("最近有点胸闷").level, SafetyLevel::Warning);
        assert_eq!(classify("没有黑便，只是胃痛").level, SafetyLevel::Safe);
    }

    /// 每条 emergency 规则各挑一个能单独触发的示例
    fn emergency_example(rule: &SafetyRule) -> Vec<String> {
        match &rule.matcher {
            Matcher::Anywhere(terms) | Matcher::Sentence(terms) => terms.clone(),
            Matcher::Cluster {
                anchors,
                companions,
            } => anchors
                .iter()
                .flat_map(|a| companions.iter().map(move |c| format!("{a} {c}")))
                .collect(),
        }
    }

    #[test]
    fn every_emergency_pattern_wins_over_distractors() {
        use crate::severity::{estimate, RecommendedAction};

        let distractors = [
            "Doctor, {} and a mild cough, no fever",
            "I have {} and I do not know what to do",
            "{}, not sure if it matters, without any allergies",
            "没有发烧，{}",
        ];
        for rule in emergency_rules() {
            for example in emergency_example(&rule) {
                for template in distractors {
                    let q = template.replace("{}", &example);
                    let safety = classify(&q);
                    assert_eq!(safety.level, SafetyLevel::Emergency, "input {q:?}");
                    let severity = estimate(&q, &safety);
                    assert_eq!(
                        severity.recommended_action,
                        RecommendedAction::Emergency,
                        "input {q:?}"
                    );
                }
            }
        }
    }

    #[test]
    fn unrelated_negation_does_not_cancel_emergency() {
        for q in [
            "Crushing chest pain radiating to my left arm, no fever",
            "I have chest pain and shortness of breath and I do not know what to do",
            "I am vomiting blood and not feeling well",
            "胸痛放射到左臂，没有发烧",
        ] {
            assert_eq!(classify(q).level, SafetyLevel::Emergency, "input {q:?}");
        }
    }

    #[test]
    fn chest_pain_coming_back_is_not_radiation() {
        let r = classify("The chest pain came back this morning");
        assert_eq!(r.level, SafetyLevel::Warning);

        let r = classify("Chest pain that spreads to my back");
        assert_eq!(r.matched_rule.as_deref(), Some("cardiac_cluster"));
    }

    #[test]
    fn emergency_rules_precede_warning_rules() {
        let classifier = SafetyClassifier::default();
        let levels: Vec<SafetyLevel> = classifier.rules().iter().map(|r| r.level).collect();
        let mut sorted = levels.clone();
        sorted.sort_by(|a, b| b.cmp(a));
        assert_eq!(levels, sorted);
    }

    #[test]
    fn extra_terms_are_appended_per_level() {
        let classifier = SafetyClassifier::with_extra_terms(
            &["Anaphylaxis".to_string(), " ".to_string()],
            &["dizzy".to_string()],
        );
        assert_eq!(
            classifier.classify("possible anaphylaxis after a bee sting").level,
            SafetyLevel::Emergency
        );
        assert_eq!(classifier.classify("I feel dizzy").level, SafetyLevel::Warning);

        let names: Vec<&str> = classifier.rules().iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names.last(), Some(&"configured_warning_term"));
    }

    #[test]
    fn negation_only_covers_the_next_few_words() {
        assert!(!contains_affirmed("no fever", "fever"));
        assert!(!contains_affirmed("she denies any chest pain", "chest pain"));
        assert!(!contains_affirmed("没有明显发烧", "发烧"));
        assert!(contains_affirmed("fever but no cough", "fever"));
        assert!(contains_affirmed("no appetite, high fever", "fever"));
        assert!(contains_affirmed("not hungry and i have had a fever all day", "fever"));
        assert!(contains_affirmed("snow outside and a fever", "fever"));
        assert!(contains_affirmed("know that my fever is back", "fever"));
    }

    #[test]
    fn any_affirmed_occurrence_is_enough() {
        assert!(contains_affirmed("no fever yesterday but a fever today", "fever"));
        assert!(!is_negated_at("no fever", 0));
    }
}
