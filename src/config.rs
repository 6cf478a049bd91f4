use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_ROOT: &str = "/var/lib/filemonitor/HL7toDICOM";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PipelineConfig {
    pub directories: DirectoryConfig,
    #[serde(default)]
    pub stability: StabilityConfig,
    #[serde(default)]
    pub rasterizer: RasterizerConfig,
    #[serde(default)]
    pub encoder: EncoderConfig,
    pub diagnostics: DiagnosticsConfig,
    pub logging: Option<LoggingConfig>,
}

/// Where source files and artifacts end up.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct DirectoryConfig {
    /// Successfully converted source messages.
    pub archive: PathBuf,
    /// Quarantined source messages.
    pub error: PathBuf,
    /// Decoded PDF documents.
    pub documents: PathBuf,
    /// First-page JPEG renderings.
    pub images: PathBuf,
    /// Final DICOM files.
    pub output: PathBuf,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StabilityConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_max_wait_ms")]
    pub max_wait_ms: u64,
    #[serde(default = "default_required_stable_polls")]
    pub required_stable_polls: u32,
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_max_wait_ms() -> u64 {
    30_000
}

fn default_required_stable_polls() -> u32 {
    2
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RasterizerConfig {
    #[serde(default = "default_rasterizer_program")]
    pub program: String,
    #[serde(default = "default_dpi")]
    pub dpi: u32,
}

fn default_rasterizer_program() -> String {
    "pdftoppm".to_string()
}

fn default_dpi() -> u32 {
    200
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EncoderConfig {
    #[serde(default = "default_encoder_program")]
    pub program: String,
    #[serde(default)]
    pub extra_args: Vec<String>,
}

fn default_encoder_program() -> String {
    "img2dcm".to_string()
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DiagnosticsConfig {
    /// JSON-lines file that receives one record per failed message.
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<PathBuf>,
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            max_wait_ms: default_max_wait_ms(),
            required_stable_polls: default_required_stable_polls(),
        }
    }
}

impl StabilityConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }
}

impl Default for RasterizerConfig {
    fn default() -> Self {
        Self {
            program: default_rasterizer_program(),
            dpi: default_dpi(),
        }
    }
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            program: default_encoder_program(),
            extra_args: Vec::new(),
        }
    }
}

impl DirectoryConfig {
    /// The standard directory layout below `root`.
    pub fn under(root: &Path) -> Self {
        Self {
            archive: root.join("HL7"),
            error: root.join("pdf2dcmERROR"),
            documents: root.join("PDFs"),
            images: root.join("JPEGs"),
            output: root.join("DICOM"),
        }
    }

    pub fn all(&self) -> [(&'static str, &Path); 5] {
        [
            ("archive", self.archive.as_path()),
            ("error", self.error.as_path()),
            ("documents", self.documents.as_path()),
            ("images", self.images.as_path()),
            ("output", self.output.as_path()),
        ]
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::rooted_at(Path::new(DEFAULT_ROOT))
    }
}

impl PipelineConfig {
    /// A self-contained configuration with every path below `root`.
    pub fn rooted_at(root: &Path) -> Self {
        Self {
            directories: DirectoryConfig::under(root),
            stability: StabilityConfig::default(),
            rasterizer: RasterizerConfig::default(),
            encoder: EncoderConfig::default(),
            diagnostics: DiagnosticsConfig {
                path: root.join("logs").join("hl7_pdf_dcm_errors.jsonl"),
            },
            logging: Some(LoggingConfig {
                level: "info".to_string(),
                file: None,
            }),
        }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: PipelineConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path.as_ref(), content)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.stability.poll_interval_ms == 0 {
            anyhow::bail!("stability.poll_interval_ms must be greater than zero");
        }
        if self.stability.required_stable_polls == 0 {
            anyhow::bail!("stability.required_stable_polls must be at least 1");
        }
        if self.rasterizer.dpi == 0 {
            anyhow::bail!("rasterizer.dpi must be greater than zero");
        }
        if self.rasterizer.program.trim().is_empty() || self.encoder.program.trim().is_empty() {
            anyhow::bail!("rasterizer.program and encoder.program must not be empty");
        }
        Ok(())
    }

    /// Create every configured directory, including the diagnostics log's parent.
    pub fn ensure_directories(&self) -> Result<()> {
        for (name, dir) in self.directories.all() {
            std::fs::create_dir_all(dir).with_context(|| {
                format!("Failed to create {} directory: {}", name, dir.display())
            })?;
        }
        if let Some(parent) = self.diagnostics.path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create diagnostics directory: {}", parent.display())
            })?;
        }
        Ok(())
    }
}
