//! Canned replies and model directives for triage.

use serde::Serialize;

use crate::base::types::PatientContext;

/// Opening message shown before the first turn.
pub const GREETING: &str =
    "Hello! I'm your CareLink AI Health Assistant. I'm here to help assess your symptoms. Please describe what you're experiencing today.";

/// Reply for the `Mild` tier.
pub const MILD_REPLY: &str = "I see. These symptoms seem manageable, but it's good that you're being proactive about your health. For mild symptoms like these, monitoring at home and self-care is often sufficient. However, if symptoms worsen, please seek medical attention. Would you like some self-care recommendations?";

/// Reply for the `Moderate` tier.
pub const MODERATE_REPLY: &str = "Thank you for sharing that information. Based on your symptoms, I'd recommend scheduling an appointment with a healthcare provider within the next 24-48 hours. Can you tell me more about when these symptoms started?";

/// Reply for the `Severe` tier.
pub const SEVERE_REPLY: &str = "I understand you're experiencing concerning symptoms. Based on your description, this appears to be a high-priority situation. I recommend seeking immediate medical attention. Would you like me to help you find the nearest emergency facility?";

/// System directive for model-backed triage.
pub const TRIAGE_SYSTEM_DIRECTIVE: &str = r#####"
ROLE: You are a conservative medical triage assistant.
OUTPUT: Return ONLY compact JSON with keys: severity, summary, advice, red_flags, differential, rationale.
severity MUST be one of: Mild, Moderate, Severe, Critical.
CONTEXT: Use patient context carefully (age, weight, allergies, medical_history) to inform risk, red flags, and level of care.
ALLERGIES: If allergies are present, note interactions or risks relevant to symptoms.
COMORBIDITIES: From medical_history, factor chronic conditions that may increase severity.
SAFETY: When in doubt, recommend contacting a healthcare professional. This is NOT medical advice.
STYLE: Be concise, plain language, no markdown, no extra keys.
"#####;

/// Addendum sent when a previous model answer could not be parsed.
pub const REPAIR_DIRECTIVE: &str =
    "Return STRICT JSON only. No prose, no markdown fences. If prior output was malformed, rewrite it as valid JSON with the exact required keys.";

const RESPONSE_FORMAT: &str = r#####"{
  "severity": "Mild|Moderate|Severe|Critical",
  "summary": "short summary",
  "advice": "next steps for patient",
  "red_flags": ["..."],
  "differential": ["..."],
  "rationale": "plain-language reasoning"
}"#####;

/// Patient context as rendered into the prompt; field order is significant.
#[derive(Serialize)]
struct PromptPatientContext<'a> {
    age: String,
    weight: &'a str,
    allergies: &'a str,
    medical_history: &'a str,
}

fn or_default<'a>(value: Option<&'a str>, default: &'a str) -> &'a str {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => v,
        _ => default,
    }
}

/// Build the user prompt for a triage request.
pub fn build_triage_prompt(symptoms: &str, patient: &PatientContext) -> String {
    let context = PromptPatientContext {
        age: patient.age.map(|a| a.to_string()).unwrap_or_else(|| "Unknown".to_string()),
        weight: or_default(patient.weight.as_deref(), "Unknown"),
        allergies: or_default(patient.allergies.as_deref(), "None reported"),
        medical_history: or_default(patient.medical_history.as_deref(), "None reported"),
    };

    // Serializing plain strings cannot fail.
    let context = serde_json::to_string_pretty(&context).unwrap_or_default();

    format!(
        "PATIENT_CONTEXT:\n{context}\n\nPATIENT_SYMPTOM_DESCRIPTION:\n{}\n\nRESPONSE_FORMAT:\n{RESPONSE_FORMAT}\n",
        symptoms.trim()
    )
}

/// Build the follow-up prompt asking the model to fix malformed output.
pub fn build_repair_prompt(original_prompt: &str) -> String {
    format!("{REPAIR_DIRECTIVE}\n\nPRIOR_REQUEST:\n{original_prompt}\n")
}
