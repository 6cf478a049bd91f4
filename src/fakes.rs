//! In-process stand-ins for the external rendering and encoding tools.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::encoder::{Encoder, MetadataTag};
use crate::error::{PipelineError, Result};
use crate::rasterizer::Rasterizer;

/// What a fake tool does when called.
#[derive(Debug, Clone)]
pub enum FakeBehavior {
    /// Write these bytes to the output path.
    Produce(Vec<u8>),
    /// Fail with this message and write nothing.
    Fail(String),
}

pub struct FakeRasterizer {
    behavior: FakeBehavior,
    calls: Mutex<Vec<(PathBuf, PathBuf)>>,
}

impl FakeRasterizer {
    pub fn producing(image: &[u8]) -> Self {
        Self::new(FakeBehavior::Produce(image.to_vec()))
    }

    pub fn failing(message: &str) -> Self {
        Self::new(FakeBehavior::Fail(message.to_string()))
    }

    pub fn new(behavior: FakeBehavior) -> Self {
        Self {
            behavior,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// `(document, output)` pairs seen so far.
    pub fn calls(&self) -> Vec<(PathBuf, PathBuf)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl Rasterizer for FakeRasterizer {
    fn rasterize_first_page(&self, document: &Path, output: &Path) -> Result<()> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((document.to_path_buf(), output.to_path_buf()));
        }
        match &self.behavior {
            FakeBehavior::Produce(bytes) => {
                std::fs::write(output, bytes).map_err(|source| PipelineError::ArtifactWrite {
                    path: output.to_path_buf(),
                    source,
                })
            }
            FakeBehavior::Fail(message) => Err(PipelineError::RasterizeFailed(message.clone())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeCall {
    pub image: PathBuf,
    pub output: PathBuf,
    pub tags: Vec<MetadataTag>,
}

pub struct FakeEncoder {
    behavior: FakeBehavior,
    calls: Mutex<Vec<EncodeCall>>,
}

impl FakeEncoder {
    pub fn producing(container: &[u8]) -> Self {
        Self::new(FakeBehavior::Produce(container.to_vec()))
    }

    pub fn failing(stderr: &str) -> Self {
        Self::new(FakeBehavior::Fail(stderr.to_string()))
    }

    pub fn new(behavior: FakeBehavior) -> Self {
        Self {
            behavior,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<EncodeCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl Encoder for FakeEncoder {
    fn encode(&self, image: &Path, output: &Path, tags: &[MetadataTag]) -> Result<()> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(EncodeCall {
                image: image.to_path_buf(),
                output: output.to_path_buf(),
                tags: tags.to_vec(),
            });
        }
        match &self.behavior {
            FakeBehavior::Produce(bytes) => {
                std::fs::write(output, bytes).map_err(|source| PipelineError::ArtifactWrite {
                    path: output.to_path_buf(),
                    source,
                })
            }
            FakeBehavior::Fail(stderr) => Err(PipelineError::EncodeFailed(stderr.clone())),
        }
    }
}
