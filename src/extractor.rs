//! Positional field extraction from a report message.

use crate::error::{PipelineError, Result};
use crate::segment::{segments, SegmentKind};

const PATIENT_ID_FIELD: usize = 3;
const PATIENT_NAME_FIELD: usize = 5;
const PATIENT_DOB_FIELD: usize = 7;
const ACCESSION_FIELD: usize = 3;
const PROCEDURE_FIELD: usize = 4;
const PAYLOAD_FIELD: usize = 5;
const OBSERVATION_CODE_FIELD: usize = 11;

/// Characters of OBR-4.2 kept as the modality code.
const MODALITY_LEN: usize = 2;

/// Everything recovered from one message. Fields stay `None` when the segment
/// or position was never seen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedFields {
    pub patient_name: Option<String>,
    pub patient_id: Option<String>,
    pub patient_dob: Option<String>,
    pub accession_number: Option<String>,
    pub modality_code: Option<String>,
    pub observation_code: Option<String>,
    pub encoded_payload: String,
}

/// The six scalar fields once all of them are known to be non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportFields {
    pub patient_name: String,
    pub patient_id: String,
    pub patient_dob: String,
    pub accession_number: String,
    pub modality_code: String,
    pub observation_code: String,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

impl ParsedFields {
    /// Labels of every scalar field that is unset or empty, in a fixed order.
    pub fn missing(&self) -> Vec<String> {
        [
            (&self.patient_name, "PID-5 (Patient Name)"),
            (&self.patient_id, "PID-3 (Patient ID)"),
            (&self.patient_dob, "PID-7 (Patient DOB)"),
            (&self.accession_number, "OBR-3 (Accession Number)"),
            (&self.modality_code, "OBR-4-2 (Modality)"),
            (&self.observation_code, "OBX-11"),
        ]
        .into_iter()
        .filter(|(value, _)| present(value).is_none())
        .map(|(_, label)| label.to_string())
        .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.missing().is_empty()
    }

    /// Validation gate in front of any binary work.
    pub fn complete(&self) -> Result<ReportFields> {
        let missing = self.missing();
        if !missing.is_empty() {
            return Err(PipelineError::MissingFields(missing));
        }
        let take = |value: &Option<String>| value.clone().unwrap_or_default();
        Ok(ReportFields {
            patient_name: take(&self.patient_name),
            patient_id: take(&self.patient_id),
            patient_dob: take(&self.patient_dob),
            accession_number: take(&self.accession_number),
            modality_code: take(&self.modality_code),
            observation_code: take(&self.observation_code),
        })
    }

    /// One-line summary for error logs.
    pub fn context_line(&self) -> String {
        let show = |value: &Option<String>| value.clone().unwrap_or_else(|| "None".to_string());
        format!(
            "PID-5={} PID-3={} PID-7={} OBR-3={} OBR-4-2={} OBX-11={}",
            show(&self.patient_name),
            show(&self.patient_id),
            show(&self.patient_dob),
            show(&self.accession_number),
            show(&self.modality_code),
            show(&self.observation_code),
        )
    }
}

fn trimmed(value: &str) -> String {
    value.trim().to_string()
}

/// Scan every segment of `message` and collect the fields the pipeline needs.
///
/// Never fails: short lines simply leave their fields unset. Call
/// [`ParsedFields::complete`] to enforce presence.
pub fn extract(message: &str) -> ParsedFields {
    let mut fields = ParsedFields::default();

    for segment in segments(message) {
        match segment.kind {
            SegmentKind::PatientIdentity => {
                if let Some(v) = segment.field(PATIENT_NAME_FIELD) {
                    fields.patient_name = Some(trimmed(v));
                }
                if let Some(v) = segment.field(PATIENT_ID_FIELD) {
                    fields.patient_id = Some(trimmed(v));
                }
                if let Some(v) = segment.field(PATIENT_DOB_FIELD) {
                    fields.patient_dob = Some(trimmed(v));
                }
            }
            SegmentKind::Order => {
                if let Some(v) = segment.field(ACCESSION_FIELD) {
                    fields.accession_number = Some(trimmed(v));
                }
                if let Some(v) = segment.component(PROCEDURE_FIELD, 1) {
                    let code: String = v.chars().take(MODALITY_LEN).collect();
                    fields.modality_code = Some(trimmed(&code));
                }
            }
            SegmentKind::Result => {
                if let Some(v) = segment.field(OBSERVATION_CODE_FIELD) {
                    fields.observation_code = Some(trimmed(v));
                }
                if let Some(fragment) = segment.field(PAYLOAD_FIELD) {
                    fields.encoded_payload.push_str(fragment.trim());
                }
            }
            SegmentKind::Other => {}
        }
    }

    log::debug!(
        "Extracted fields: {} (payload {} chars)",
        fields.context_line(),
        fields.encoded_payload.len()
    );
    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    const MESSAGE: &str = "MSH|^~\\&|RAD|HOSP|PACS|HOSP|202401011200||ORU^R01|1|P|2.3\n\
PID|1||12345||JOHN SMITH||19700101|M\n\
OBR|1||ACC001|RAD^CT HEAD\n\
OBX|1|ED|PDF||^^PDF^Base64^QUJD||||||M\n\
OBX|2|ED|PDF||REVG||||||M\n";

    #[test]
    fn test_extracts_all_fields() {
        let fields = extract(MESSAGE);
        assert_eq!(fields.patient_name.as_deref(), Some("JOHN SMITH"));
        assert_eq!(fields.patient_id.as_deref(), Some("12345"));
        assert_eq!(fields.patient_dob.as_deref(), Some("19700101"));
        assert_eq!(fields.accession_number.as_deref(), Some("ACC001"));
        assert_eq!(fields.modality_code.as_deref(), Some("CT"));
        assert_eq!(fields.observation_code.as_deref(), Some("M"));
        assert_eq!(fields.encoded_payload, "^^PDF^Base64^QUJDREVG");
        assert!(fields.is_complete());
    }

    #[test]
    fn test_fields_are_trimmed() {
        let msg = "PID|1||  12345 ||  DOE^JANE  ||19800202 \nOBR|1|| ACC9 |X^ MR \n";
        let fields = extract(msg);
        assert_eq!(fields.patient_id.as_deref(), Some("12345"));
        assert_eq!(fields.patient_name.as_deref(), Some("DOE^JANE"));
        assert_eq!(fields.patient_dob.as_deref(), Some("19800202"));
        assert_eq!(fields.accession_number.as_deref(), Some("ACC9"));
        // truncation happens before trimming
        assert_eq!(fields.modality_code.as_deref(), Some("M"));
    }

    #[test]
    fn test_short_lines_leave_fields_unset() {
        let fields = extract("PID|1||12345\nOBR|1||ACC001\nOBX|1|ED\n");
        assert_eq!(fields.patient_id.as_deref(), Some("12345"));
        assert_eq!(fields.patient_name, None);
        assert_eq!(fields.patient_dob, None);
        assert_eq!(fields.accession_number.as_deref(), Some("ACC001"));
        assert_eq!(fields.modality_code, None);
        assert_eq!(fields.observation_code, None);
        assert!(fields.encoded_payload.is_empty());
    }

    #[test]
    fn test_empty_value_differs_from_absent_but_is_missing() {
        let fields = extract("PID|1||12345||||19700101\n");
        assert_eq!(fields.patient_name, Some(String::new()));
        assert!(fields.missing().contains(&"PID-5 (Patient Name)".to_string()));
    }

    #[test]
    fn test_modality_requires_second_component() {
        let fields = extract("OBR|1||ACC001|CTHEAD\n");
        assert_eq!(fields.modality_code, None);
        assert!(fields.missing().contains(&"OBR-4-2 (Modality)".to_string()));
    }

    #[test]
    fn test_complete_reports_missing_in_order() {
        let fields = extract("OBR|1||ACC001\n");
        match fields.complete() {
            Err(PipelineError::MissingFields(missing)) => assert_eq!(
                missing,
                vec![
                    "PID-5 (Patient Name)",
                    "PID-3 (Patient ID)",
                    "PID-7 (Patient DOB)",
                    "OBR-4-2 (Modality)",
                    "OBX-11",
                ]
            ),
            other => panic!("Expected MissingFields, got {:?}", other),
        }
    }

    #[test]
    fn test_complete_returns_report_fields() {
        let report = extract(MESSAGE).complete().unwrap();
        assert_eq!(report.patient_name, "JOHN SMITH");
        assert_eq!(report.modality_code, "CT");
    }

    #[test]
    fn test_carriage_return_segments() {
        let msg = MESSAGE.replace('\n', "\r");
        assert_eq!(extract(&msg), extract(MESSAGE));
    }

    #[test]
    fn test_last_result_segment_wins_for_observation_code() {
        let msg = "OBX|1|ED|PDF||AA||||||F\nOBX|2|ED|PDF||BB||||||M\n";
        let fields = extract(msg);
        assert_eq!(fields.observation_code.as_deref(), Some("M"));
        assert_eq!(fields.encoded_payload, "AABB");
    }
}
