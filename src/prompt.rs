use crate::safety::{SafetyLevel, SafetyResult};
use crate::severity::SeverityResult;
use crate::types::{Language, ModelAssessment, TaskType};

/// 模型输出里分隔正文和结构化评估的标记
pub const ASSESSMENT_MARKER: &str = "###JSON###";

pub const SYSTEM_MESSAGE: &str = "You are a helpful, cautious medical-style assistant.";

const BASE_GUIDANCE: &str = "You are a cautious, evidence-informed medical-style assistant.
You are NOT a doctor and you cannot make definitive diagnoses or prescribe medications.

You must always:
- Emphasize that your answer is general information, not medical advice.
- Encourage the user to see a healthcare professional for any serious or persistent symptoms.
- Be concise, well-structured, and easy to understand.
- Never invent lab values, medications, or detailed treatment plans.";

const ASSESSMENT_INSTRUCTION: &str = "After you finish the full human-readable answer, on a new line output:
###JSON### followed by a single-line JSON object with this exact schema:

{
  \"severity\": \"low\" | \"medium\" | \"high\" | \"critical\",
  \"recommended_action\": \"self_care\" | \"see_doctor\" | \"seek_urgent_care\" | \"emergency\",
  \"time_window\": \"short free-text description of when the user should seek care\",
  \"risk_notes\": \"one short sentence summarizing why you chose this severity\"
}

Do NOT explain the JSON. Do NOT add extra text after the JSON. The JSON must be valid.";

fn language_instruction(language: Language) -> &'static str {
    match language {
        Language::Zh => {
            "Please answer in Simplified Chinese (简体中文), unless the user clearly uses another language."
        }
        Language::En => "Please answer in English.",
    }
}

fn task_instruction(task_type: TaskType) -> &'static str {
    match task_type {
        TaskType::GeneralQa => {
            "Task: Provide general medical-style information based on the user's question."
        }
        TaskType::MedicalQa => {
            "Task: Provide general medical information and suggestions based on the user's question. \
             Focus on explaining possible causes, typical work-up, and when to see a doctor."
        }
        TaskType::Diagnosis => {
            "Task: Provide diagnostic-style reasoning. Explain possible causes and differential diagnoses, \
             but clearly state that this is NOT a formal diagnosis and that only a licensed clinician \
             can diagnose and treat."
        }
        TaskType::Drug => {
            "Task: Provide information about medications (indications, common side effects, precautions, \
             interactions). Do NOT prescribe any medications. Always remind the user to consult a doctor \
             or pharmacist before taking or changing medicines."
        }
        TaskType::Lab => {
            "Task: Provide a general interpretation of lab or imaging results. Explain what the values or \
             findings might mean, possible causes, and when further evaluation is needed. Do not make \
             definitive diagnoses."
        }
        TaskType::Education => {
            "Task: Provide health education and lifestyle advice (prevention, long-term management, \
             self-care). Keep the advice practical, realistic, and conservative."
        }
    }
}

fn context_block(safety: &SafetyResult, severity: &SeverityResult) -> String {
    let mut lines = vec![
        "Safety context (computed before this request reached you):".to_string(),
        format!("- Safety level: {}", safety.level.as_str()),
        format!("- Safety note: {}", safety.message),
        format!("- Estimated severity: {}", severity.severity.as_str()),
        format!(
            "- Recommended action: {}",
            severity.recommended_action.as_str()
        ),
        format!("- Time window: {}", severity.time_window),
    ];

    if severity.is_high_or_worse() {
        lines.push(
            "- The situation may be serious: clearly recommend prompt evaluation by a healthcare \
             professional and do not suggest waiting it out."
                .to_string(),
        );
    }
    if safety.level == SafetyLevel::Emergency {
        lines.push(
            "- This may be a medical emergency: begin your answer by telling the user to call local \
             emergency services now, and never downplay the urgency."
                .to_string(),
        );
    }

    lines.join("\n")
}

/// 拼出发给模型的完整 prompt。
///
/// 输出只依赖入参，没有时间戳或随机数，
/// 因为它会原样作为 `used_prompt` 返回给调用方。
pub fn compose(
    question: &str,
    task_type: TaskType,
    language: Language,
    safety: &SafetyResult,
    severity: &SeverityResult,
) -> String {
    format!(
        "{BASE_GUIDANCE}\n\n{lang}\n\n{task}\n\n{context}\n\nUser question:\n\"\"\"{question}\"\"\"\n\n\
         Now provide your answer in a clear, structured format, with headings and bullet points when helpful.\n\n\
         {ASSESSMENT_INSTRUCTION}\n",
        lang = language_instruction(language),
        task = task_instruction(task_type),
        context = context_block(safety, severity),
        question = fence_safe(question),
    )
}

/// 问题放在 `"""` 块里，问题自带的三引号换成 `'''`，免得提前闭合
fn fence_safe(question: &str) -> String {
    question.replace("\"\"\"", "'''")
}

/// 把模型输出拆成正文和（可选的）结构化评估。
/// 没有标记、或者 JSON 解析失败时，评估为 None。
pub fn split_assessment(raw_output: &str) -> (String, Option<ModelAssessment>) {
    let Some(idx) = raw_output.find(ASSESSMENT_MARKER) else {
        return (raw_output.trim().to_string(), None);
    };

    let answer = raw_output[..idx].trim().to_string();
    let tail = &raw_output[idx + ASSESSMENT_MARKER.len()..];

    let (Some(start), Some(end)) = (tail.find('{'), tail.rfind('}')) else {
        return (answer, None);
    };
    if end <= start {
        return (answer, None);
    }

    let assessment = serde_json::from_str::<ModelAssessment>(&tail[start..=end]).ok();
    (answer, assessment)
}
