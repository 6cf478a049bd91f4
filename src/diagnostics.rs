//! Failure records appended to a JSON-lines file.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{PipelineError, ReadWarning};
use crate::extractor::ParsedFields;
use crate::pipeline::Stage;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecoveredFields {
    pub patient_name: Option<String>,
    pub patient_id: Option<String>,
    pub patient_dob: Option<String>,
    pub accession_number: Option<String>,
    pub modality_code: Option<String>,
    pub observation_code: Option<String>,
    pub payload_length: usize,
}

impl From<&ParsedFields> for RecoveredFields {
    fn from(fields: &ParsedFields) -> Self {
        Self {
            patient_name: fields.patient_name.clone(),
            patient_id: fields.patient_id.clone(),
            patient_dob: fields.patient_dob.clone(),
            accession_number: fields.accession_number.clone(),
            modality_code: fields.modality_code.clone(),
            observation_code: fields.observation_code.clone(),
            payload_length: fields.encoded_payload.len(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticRecord {
    pub timestamp: DateTime<Utc>,
    pub source: PathBuf,
    pub stage: String,
    pub error_kind: String,
    pub error: String,
    pub fields: RecoveredFields,
    pub warnings: Vec<String>,
}

impl DiagnosticRecord {
    pub fn new(
        source: &Path,
        stage: Stage,
        error: &PipelineError,
        fields: &ParsedFields,
        warnings: &[ReadWarning],
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            source: source.to_path_buf(),
            stage: stage.to_string(),
            error_kind: error.kind().to_string(),
            error: error.to_string(),
            fields: fields.into(),
            warnings: warnings.iter().map(|w| w.to_string()).collect(),
        }
    }
}

pub struct DiagnosticsLog {
    path: PathBuf,
}

impl DiagnosticsLog {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn append(&self, record: &DiagnosticRecord) -> Result<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open diagnostics log: {}", self.path.display()))?;
        file.write_all(line.as_bytes())
            .with_context(|| format!("Failed to write diagnostics log: {}", self.path.display()))?;
        Ok(())
    }

    /// Every record in the log, oldest first.
    pub fn read_all(&self) -> Result<Vec<DiagnosticRecord>> {
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read diagnostics log: {}", self.path.display()))?;
        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).context("Malformed diagnostics record"))
            .collect()
    }
}
