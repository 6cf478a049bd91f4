//! Deterministic names for the files each stage produces.

use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::config::DirectoryConfig;
use crate::extractor::ReportFields;

fn unsafe_chars() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[^A-Za-z0-9_\-]").expect("static pattern"))
}

/// Replace anything outside `[A-Za-z0-9_-]` with `_`.
pub fn safe(value: &str) -> String {
    if value.is_empty() {
        return "UNKNOWN".to_string();
    }
    unsafe_chars().replace_all(value, "_").into_owned()
}

/// File stem shared by every artifact of one message.
pub fn artifact_stem(fields: &ReportFields) -> String {
    format!(
        "{}_{}_{}",
        safe(&fields.patient_name),
        safe(&fields.patient_id),
        safe(&fields.accession_number)
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionArtifacts {
    pub document: PathBuf,
    pub image: PathBuf,
    pub container: PathBuf,
}

impl ConversionArtifacts {
    pub fn for_fields(fields: &ReportFields, dirs: &DirectoryConfig) -> Self {
        let stem = artifact_stem(fields);
        Self {
            document: dirs.documents.join(format!("{stem}.pdf")),
            image: dirs.images.join(format!("{stem}.jpg")),
            container: dirs.output.join(format!("{stem}.dcm")),
        }
    }

    pub fn paths(&self) -> [&Path; 3] {
        [
            self.document.as_path(),
            self.image.as_path(),
            self.container.as_path(),
        ]
    }
}
