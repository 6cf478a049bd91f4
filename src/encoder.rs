//! Wrapping the rendered image and report metadata into a DICOM file.

use std::fmt;
use std::path::Path;
use std::process::Command;

use crate::config::EncoderConfig;
use crate::error::{PipelineError, Result};
use crate::extractor::ReportFields;
use crate::external::run_tool;

/// A DICOM attribute tag, printed as `(gggg,eeee)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DicomTag {
    pub group: u16,
    pub element: u16,
}

impl DicomTag {
    pub const PATIENT_NAME: DicomTag = DicomTag::new(0x0010, 0x0010);
    pub const PATIENT_ID: DicomTag = DicomTag::new(0x0010, 0x0020);
    pub const PATIENT_BIRTH_DATE: DicomTag = DicomTag::new(0x0010, 0x0030);
    pub const PATIENT_SEX: DicomTag = DicomTag::new(0x0010, 0x0040);
    pub const ACCESSION_NUMBER: DicomTag = DicomTag::new(0x0008, 0x0050);
    pub const MODALITY: DicomTag = DicomTag::new(0x0008, 0x0060);

    pub const fn new(group: u16, element: u16) -> Self {
        Self { group, element }
    }
}

impl fmt::Display for DicomTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:04X},{:04X})", self.group, self.element)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataTag {
    pub tag: DicomTag,
    pub value: String,
}

/// The six tag/value pairs written into every container.
pub fn metadata_tags(fields: &ReportFields) -> Vec<MetadataTag> {
    [
        (DicomTag::PATIENT_NAME, &fields.patient_name),
        (DicomTag::PATIENT_ID, &fields.patient_id),
        (DicomTag::PATIENT_BIRTH_DATE, &fields.patient_dob),
        // OBX-11 is carried in the patient sex slot
        (DicomTag::PATIENT_SEX, &fields.observation_code),
        (DicomTag::ACCESSION_NUMBER, &fields.accession_number),
        (DicomTag::MODALITY, &fields.modality_code),
    ]
    .into_iter()
    .map(|(tag, value)| MetadataTag {
        tag,
        value: value.clone(),
    })
    .collect()
}

pub trait Encoder: Send + Sync {
    fn encode(&self, image: &Path, output: &Path, tags: &[MetadataTag]) -> Result<()>;
}

/// Shells out to DCMTK's `img2dcm`.
pub struct Img2DcmEncoder {
    program: String,
    extra_args: Vec<String>,
}

impl Img2DcmEncoder {
    pub fn new(config: &EncoderConfig) -> Self {
        Self {
            program: config.program.clone(),
            extra_args: config.extra_args.clone(),
        }
    }

    fn command(&self, image: &Path, output: &Path, tags: &[MetadataTag]) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.extra_args);
        for tag in tags {
            cmd.arg("-k").arg(format!("{}={}", tag.tag, tag.value));
        }
        cmd.arg(image).arg(output);
        cmd
    }
}

impl Encoder for Img2DcmEncoder {
    fn encode(&self, image: &Path, output: &Path, tags: &[MetadataTag]) -> Result<()> {
        run_tool(&mut self.command(image, output, tags)).map_err(PipelineError::EncodeFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields() -> ReportFields {
        ReportFields {
            patient_name: "SMITH^JOHN".to_string(),
            patient_id: "12345".to_string(),
            patient_dob: "19700101".to_string(),
            accession_number: "ACC001".to_string(),
            modality_code: "CT".to_string(),
            observation_code: "M".to_string(),
        }
    }

    #[test]
    fn test_tag_display() {
        assert_eq!(DicomTag::PATIENT_NAME.to_string(), "(0010,0010)");
        assert_eq!(DicomTag::ACCESSION_NUMBER.to_string(), "(0008,0050)");
    }

    #[test]
    fn test_metadata_tags_map_fields() {
        let tags = metadata_tags(&fields());
        assert_eq!(tags.len(), 6);
        assert_eq!(tags[3].tag, DicomTag::PATIENT_SEX);
        assert_eq!(tags[3].value, "M");
        assert_eq!(tags[5].tag, DicomTag::MODALITY);
        assert_eq!(tags[5].value, "CT");
    }

    #[test]
    fn test_img2dcm_command_line() {
        let encoder = Img2DcmEncoder::new(&EncoderConfig {
            program: "img2dcm".to_string(),
            extra_args: vec!["-q".to_string()],
        });
        let cmd = encoder.command(
            Path::new("/j/a.jpg"),
            Path::new("/d/a.dcm"),
            &metadata_tags(&fields()),
        );
        let args: Vec<_> = cmd.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(
            args,
            vec![
                "-q",
                "-k",
                "(0010,0010)=SMITH^JOHN",
                "-k",
                "(0010,0020)=12345",
                "-k",
                "(0010,0030)=19700101",
                "-k",
                "(0010,0040)=M",
                "-k",
                "(0008,0050)=ACC001",
                "-k",
                "(0008,0060)=CT",
                "/j/a.jpg",
                "/d/a.dcm",
            ]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_nonzero_exit_is_encode_failure_with_stderr() {
        let encoder = Img2DcmEncoder::new(&EncoderConfig {
            program: "sh".to_string(),
            extra_args: vec!["-c".to_string(), "echo 'cannot read image' >&2; exit 1".to_string()],
        });
        let err = encoder
            .encode(Path::new("a.jpg"), Path::new("a.dcm"), &[])
            .unwrap_err();
        match err {
            PipelineError::EncodeFailed(msg) => assert_eq!(msg, "cannot read image"),
            other => panic!("Expected EncodeFailed, got {:?}", other),
        }
    }
}
