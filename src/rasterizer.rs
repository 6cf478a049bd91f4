//! First-page rendering of the decoded document.

use std::io;
use std::path::Path;
use std::process::Command;

use crate::config::RasterizerConfig;
use crate::error::{PipelineError, Result};
use crate::external::run_tool;

pub trait Rasterizer: Send + Sync {
    /// Render page 1 of `document` into a JPEG at `output`.
    fn rasterize_first_page(&self, document: &Path, output: &Path) -> Result<()>;
}

/// Renders with poppler's `pdftoppm`.
pub struct PdftoppmRasterizer {
    program: String,
    dpi: u32,
}

impl PdftoppmRasterizer {
    pub fn new(config: &RasterizerConfig) -> Self {
        Self {
            program: config.program.clone(),
            dpi: config.dpi,
        }
    }

    fn command(&self, document: &Path, output: &Path) -> Command {
        // pdftoppm appends the extension itself
        let output_root = output.with_extension("");
        let dpi = self.dpi.to_string();
        let mut cmd = Command::new(&self.program);
        cmd.args(["-jpeg", "-r", dpi.as_str(), "-f", "1", "-l", "1", "-singlefile"])
            .arg(document)
            .arg(output_root);
        cmd
    }
}

impl Rasterizer for PdftoppmRasterizer {
    fn rasterize_first_page(&self, document: &Path, output: &Path) -> Result<()> {
        // an image left by an earlier run must not pass the existence check below
        match std::fs::remove_file(output) {
            Ok(()) => log::debug!("Removed stale image {}", output.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(PipelineError::RasterizeFailed(format!(
                    "cannot replace existing image {}: {e}",
                    output.display()
                )));
            }
        }

        run_tool(&mut self.command(document, output)).map_err(PipelineError::RasterizeFailed)?;

        if !output.is_file() {
            return Err(PipelineError::RasterizeFailed(
                "No pages found in PDF for JPEG conversion.".to_string(),
            ));
        }
        Ok(())
    }
}
