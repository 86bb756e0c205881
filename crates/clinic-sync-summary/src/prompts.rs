//! Prompts for patient history summarization.

use clinic_sync_core::models::{Medication, Patient, Visit, UNKNOWN_LABEL};

/// System prompt for history summarization.
pub const SYSTEM_PROMPT: &str = r#"You are a clinical assistant helping a doctor review a patient's history before a consultation.

Summarize the visit history below in a short paragraph:
- Recurring or chronic complaints
- Diagnoses over time
- Medications prescribed, noting repeats
- Anything the doctor should double-check (allergies, interactions)

Be factual. Do not invent findings that are not in the history.
Output JSON with a single "summary" string field."#;

/// User prompt for one patient's history, oldest visit first.
///
/// Only visits belonging to `patient` are included. Prescribed medications
/// are named from `medications`, falling back to "Unknown".
pub fn make_history_prompt(
    patient: &Patient,
    visits: &[Visit],
    medications: &[Medication],
) -> String {
    let mut history: Vec<&Visit> = visits
        .iter()
        .filter(|v| v.patient_id == patient.id)
        .collect();
    history.sort_by_key(|v| v.date);

    let gender = if patient.gender.is_empty() {
        "gender not recorded"
    } else {
        patient.gender.as_str()
    };
    let mut prompt = format!(
        "Patient: {} ({}), age {}, {}\n",
        patient.name, patient.code, patient.age, gender
    );
    if let Some(allergies) = patient.allergies.as_deref().filter(|a| !a.trim().is_empty()) {
        prompt.push_str(&format!("Allergies: {}\n", allergies));
    }
    if let Some(conditions) = patient
        .chronic_conditions
        .as_deref()
        .filter(|c| !c.trim().is_empty())
    {
        prompt.push_str(&format!("Chronic conditions: {}\n", conditions));
    }

    prompt.push_str("\nVisit history:\n");
    for visit in history {
        prompt.push_str(&format!(
            "- {}: symptoms: {}; diagnosis: {}",
            visit.date,
            or_none(&visit.symptoms),
            or_none(&visit.diagnosis)
        ));

        let prescribed: Vec<String> = visit
            .prescribed_meds
            .iter()
            .map(|med| {
                let name = medications
                    .iter()
                    .find(|m| m.id == med.medication_id)
                    .map_or(UNKNOWN_LABEL, |m| m.brand_name.as_str());
                let details: Vec<&str> = [&med.dosage, &med.frequency, &med.duration]
                    .into_iter()
                    .map(String::as_str)
                    .filter(|d| !d.is_empty())
                    .collect();
                if details.is_empty() {
                    name.to_string()
                } else {
                    format!("{} ({})", name, details.join(", "))
                }
            })
            .collect();
        if !prescribed.is_empty() {
            prompt.push_str(&format!("; prescribed: {}", prescribed.join(", ")));
        }
        prompt.push('\n');
    }

    prompt
}

fn or_none(text: &str) -> &str {
    if text.trim().is_empty() {
        "none recorded"
    } else {
        text
    }
}

/// Build a complete chat-formatted prompt with system context.
pub fn build_full_prompt(
    patient: &Patient,
    visits: &[Visit],
    medications: &[Medication],
) -> String {
    let mut prompt = String::new();

    prompt.push_str("<|system|>\n");
    prompt.push_str(SYSTEM_PROMPT);
    prompt.push_str("\n<|end|>\n");

    prompt.push_str("<|user|>\n");
    prompt.push_str(&make_history_prompt(patient, visits, medications));
    prompt.push_str("<|end|>\n");
    prompt.push_str("<|assistant|>\n");

    prompt
}
