//! Per-file conversion: read, extract, decode, render, encode, route.
//!
//! A run walks `Pending → Stabilizing → Extracted → Decoded → Rasterized →
//! Encoded → Archived` strictly in order. The first stage that fails ends the
//! run; there is no retry. Whatever happens, the source file is then moved
//! exactly once, into the archive directory on success or the error directory
//! on failure. This module is the only place that moves source files.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::artifacts::ConversionArtifacts;
use crate::config::PipelineConfig;
use crate::diagnostics::{DiagnosticRecord, DiagnosticsLog};
use crate::encoder::{metadata_tags, Encoder, Img2DcmEncoder};
use crate::error::{PipelineError, ReadWarning};
use crate::extractor::{self, ParsedFields};
use crate::payload;
use crate::rasterizer::{PdftoppmRasterizer, Rasterizer};
use crate::reader::MessageReader;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Pending,
    Stabilizing,
    Extracted,
    Decoded,
    Rasterized,
    Encoded,
    Archived,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Pending => "Pending",
            Stage::Stabilizing => "Stabilizing",
            Stage::Extracted => "Extracted",
            Stage::Decoded => "Decoded",
            Stage::Rasterized => "Rasterized",
            Stage::Encoded => "Encoded",
            Stage::Archived => "Archived",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalState {
    Archived,
    Failed(Stage),
}

#[derive(Debug)]
pub enum PipelineOutcome {
    Success {
        artifacts: ConversionArtifacts,
    },
    Failure {
        stage: Stage,
        error: PipelineError,
        fields: ParsedFields,
    },
}

/// Everything known about one finished run.
#[derive(Debug)]
pub struct PipelineReport {
    pub source: PathBuf,
    pub outcome: PipelineOutcome,
    pub warnings: Vec<ReadWarning>,
    /// Where the source file ended up, or why it could not be moved.
    pub routing: Result<PathBuf, PipelineError>,
}

impl PipelineReport {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, PipelineOutcome::Success { .. })
    }

    pub fn terminal_state(&self) -> TerminalState {
        match &self.outcome {
            PipelineOutcome::Success { .. } => TerminalState::Archived,
            PipelineOutcome::Failure { stage, .. } => TerminalState::Failed(*stage),
        }
    }
}

struct StageFailure {
    stage: Stage,
    error: PipelineError,
}

trait AtStage<T> {
    fn at(self, stage: Stage) -> Result<T, StageFailure>;
}

impl<T> AtStage<T> for Result<T, PipelineError> {
    fn at(self, stage: Stage) -> Result<T, StageFailure> {
        self.map_err(|error| StageFailure { stage, error })
    }
}

/// Mutable bookkeeping for a run in progress, kept so failures can report it.
struct Run {
    stage: Stage,
    fields: ParsedFields,
    warnings: Vec<ReadWarning>,
}

impl Run {
    fn new() -> Self {
        Self {
            stage: Stage::Pending,
            fields: ParsedFields::default(),
            warnings: Vec::new(),
        }
    }

    fn enter(&mut self, stage: Stage) {
        log::debug!("{} -> {}", self.stage, stage);
        self.stage = stage;
    }
}

pub struct Pipeline {
    config: PipelineConfig,
    reader: MessageReader,
    rasterizer: Arc<dyn Rasterizer>,
    encoder: Arc<dyn Encoder>,
    diagnostics: DiagnosticsLog,
}

impl Pipeline {
    /// A pipeline backed by `pdftoppm` and `img2dcm`.
    pub fn new(config: PipelineConfig) -> anyhow::Result<Self> {
        let rasterizer = Arc::new(PdftoppmRasterizer::new(&config.rasterizer));
        let encoder = Arc::new(Img2DcmEncoder::new(&config.encoder));
        Self::with_tools(config, rasterizer, encoder)
    }

    pub fn with_tools(
        config: PipelineConfig,
        rasterizer: Arc<dyn Rasterizer>,
        encoder: Arc<dyn Encoder>,
    ) -> anyhow::Result<Self> {
        config.validate()?;
        config.ensure_directories()?;
        Ok(Self {
            reader: MessageReader::new(config.stability.clone()),
            diagnostics: DiagnosticsLog::new(config.diagnostics.path.clone()),
            config,
            rasterizer,
            encoder,
        })
    }

    pub fn with_reader(mut self, reader: MessageReader) -> Self {
        self.reader = reader;
        self
    }

    pub fn process(&self, source: &Path) -> PipelineReport {
        log::info!("Processing file: {}", source.display());

        let mut run = Run::new();
        let outcome = match self.convert(source, &mut run) {
            Ok(artifacts) => PipelineOutcome::Success { artifacts },
            Err(StageFailure { stage, error }) => {
                log::error!("Error processing {} at {}: {}", source.display(), stage, error);
                log::error!("Context: {}", run.fields.context_line());
                self.record_failure(source, stage, &error, &run);
                PipelineOutcome::Failure {
                    stage,
                    error,
                    fields: run.fields.clone(),
                }
            }
        };

        let routing = self.route(source, &outcome);

        PipelineReport {
            source: source.to_path_buf(),
            outcome,
            warnings: run.warnings,
            routing,
        }
    }

    fn convert(&self, source: &Path, run: &mut Run) -> Result<ConversionArtifacts, StageFailure> {
        run.enter(Stage::Stabilizing);
        let message = self.reader.read(source).at(Stage::Stabilizing)?;
        run.warnings.extend(message.warnings.iter().cloned());

        run.enter(Stage::Extracted);
        run.fields = extractor::extract(&message.text);
        let report = run.fields.complete().at(Stage::Extracted)?;
        let artifacts = ConversionArtifacts::for_fields(&report, &self.config.directories);

        run.enter(Stage::Decoded);
        let document = payload::decode(&run.fields.encoded_payload).at(Stage::Decoded)?;
        write_artifact(&artifacts.document, &document).at(Stage::Decoded)?;
        log::info!("PDF saved: {}", artifacts.document.display());

        run.enter(Stage::Rasterized);
        self.rasterizer
            .rasterize_first_page(&artifacts.document, &artifacts.image)
            .at(Stage::Rasterized)?;
        log::info!("JPEG created: {}", artifacts.image.display());

        run.enter(Stage::Encoded);
        self.encoder
            .encode(&artifacts.image, &artifacts.container, &metadata_tags(&report))
            .at(Stage::Encoded)?;
        log::info!("DICOM created: {}", artifacts.container.display());

        Ok(artifacts)
    }

    fn record_failure(&self, source: &Path, stage: Stage, error: &PipelineError, run: &Run) {
        let record = DiagnosticRecord::new(source, stage, error, &run.fields, &run.warnings);
        if let Err(e) = self.diagnostics.append(&record) {
            log::error!("Failed to write diagnostic record: {e:#}");
        }
    }

    /// Move `source` straight to the error directory. Used when a run could
    /// not produce a report at all.
    pub fn quarantine(&self, source: &Path) -> Result<PathBuf, PipelineError> {
        move_into(source, &self.config.directories.error)
    }

    fn route(&self, source: &Path, outcome: &PipelineOutcome) -> Result<PathBuf, PipelineError> {
        let (dir, label) = match outcome {
            PipelineOutcome::Success { .. } => (&self.config.directories.archive, "archive"),
            PipelineOutcome::Failure { .. } => (&self.config.directories.error, "error"),
        };

        match move_into(source, dir) {
            Ok(dest) => {
                log::info!("Moved HL7 to {}: {}", label, dest.display());
                Ok(dest)
            }
            Err(e) => {
                log::error!("Failed to move {} to {} directory: {}", source.display(), label, e);
                Err(e)
            }
        }
    }
}

fn write_artifact(path: &Path, bytes: &[u8]) -> Result<(), PipelineError> {
    std::fs::write(path, bytes).map_err(|source| PipelineError::ArtifactWrite {
        path: path.to_path_buf(),
        source,
    })
}

fn routing_error(source: &Path, destination: &Path, err: io::Error) -> PipelineError {
    PipelineError::RoutingFailed {
        path: source.to_path_buf(),
        destination: destination.to_path_buf(),
        source: err,
    }
}

/// Move `source` into `dir`, keeping its file name. Only a rename that would
/// cross filesystems falls back to copy and remove.
pub fn move_into(source: &Path, dir: &Path) -> Result<PathBuf, PipelineError> {
    let name = source.file_name().ok_or_else(|| {
        routing_error(
            source,
            dir,
            io::Error::new(io::ErrorKind::InvalidInput, "source has no file name"),
        )
    })?;
    let destination = dir.join(name);

    match std::fs::rename(source, &destination) {
        Ok(()) => Ok(destination),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            log::debug!(
                "{} is on another filesystem than {}, copying",
                source.display(),
                dir.display()
            );
            copy_then_remove(source, &destination)?;
            Ok(destination)
        }
        Err(e) => Err(routing_error(source, &destination, e)),
    }
}

/// Copy `source` to `destination`, then remove `source`. On any failure the
/// copy is discarded so the file only ever exists in one place.
fn copy_then_remove(source: &Path, destination: &Path) -> Result<(), PipelineError> {
    if let Err(e) = std::fs::copy(source, destination) {
        discard_copy(destination);
        return Err(routing_error(source, destination, e));
    }
    if let Err(e) = std::fs::remove_file(source) {
        discard_copy(destination);
        return Err(routing_error(source, destination, e));
    }
    Ok(())
}

fn discard_copy(destination: &Path) {
    match std::fs::remove_file(destination) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => log::error!("Failed to remove copy {}: {}", destination.display(), e),
    }
}
