//! Loading a message file once its writer appears to be done with it.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::thread;

use crate::config::StabilityConfig;
use crate::error::{PipelineError, ReadWarning, Result};

/// Immutable message text together with where it came from.
#[derive(Debug, Clone)]
pub struct RawMessage {
    pub path: PathBuf,
    pub text: String,
    pub warnings: Vec<ReadWarning>,
}

/// Reports the current size of a file. Swappable so tests can fake a writer.
pub trait SizeProbe: Send + Sync {
    fn size(&self, path: &Path) -> io::Result<u64>;
}

pub struct FsProbe;

impl SizeProbe for FsProbe {
    fn size(&self, path: &Path) -> io::Result<u64> {
        Ok(std::fs::metadata(path)?.len())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stability {
    Stable,
    TimedOut,
}

pub struct MessageReader {
    policy: StabilityConfig,
    probe: Box<dyn SizeProbe>,
}

impl MessageReader {
    pub fn new(policy: StabilityConfig) -> Self {
        Self::with_probe(policy, Box::new(FsProbe))
    }

    pub fn with_probe(policy: StabilityConfig, probe: Box<dyn SizeProbe>) -> Self {
        Self { policy, probe }
    }

    /// Poll the file size until it has stayed the same for the configured
    /// number of consecutive polls, or the wait bound runs out.
    pub fn wait_until_stable(&self, path: &Path) -> Stability {
        let interval = self.policy.poll_interval();
        let polls = (self.policy.max_wait_ms / self.policy.poll_interval_ms.max(1)).max(1);

        let mut last_size: Option<u64> = None;
        let mut stable_count = 0;

        for _ in 0..polls {
            let current = match self.probe.size(path) {
                Ok(size) => size,
                Err(e) => {
                    log::debug!("Size check failed for {}: {e}", path.display());
                    return Stability::TimedOut;
                }
            };

            if last_size == Some(current) {
                stable_count += 1;
                if stable_count >= self.policy.required_stable_polls {
                    return Stability::Stable;
                }
            } else {
                stable_count = 0;
                last_size = Some(current);
            }
            thread::sleep(interval);
        }
        Stability::TimedOut
    }

    pub fn read(&self, path: &Path) -> Result<RawMessage> {
        let mut file = open(path)?;
        let mut warnings = Vec::new();

        if self.wait_until_stable(path) == Stability::TimedOut {
            log::warn!(
                "File may still be writing: {}, proceeding anyway",
                path.display()
            );
            warnings.push(ReadWarning::StillWriting {
                waited: self.policy.max_wait(),
            });
        }

        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)
            .map_err(|source| PipelineError::Unreadable {
                path: path.to_path_buf(),
                source,
            })?;

        // Invalid UTF-8 sequences are dropped rather than rejected.
        let text: String = String::from_utf8_lossy(&bytes)
            .chars()
            .filter(|c| *c != char::REPLACEMENT_CHARACTER)
            .collect();

        if text.trim().is_empty() {
            return Err(PipelineError::EmptyMessage(path.to_path_buf()));
        }

        Ok(RawMessage {
            path: path.to_path_buf(),
            text,
            warnings,
        })
    }
}

fn open(path: &Path) -> Result<File> {
    File::open(path).map_err(|source| match source.kind() {
        io::ErrorKind::NotFound => PipelineError::NotFound(path.to_path_buf()),
        _ => PipelineError::Unreadable {
            path: path.to_path_buf(),
            source,
        },
    })
}

/// Poll interval and bound small enough for tests.
#[cfg(test)]
pub(crate) fn quick_policy() -> StabilityConfig {
    StabilityConfig {
        poll_interval_ms: 1,
        max_wait_ms: 20,
        required_stable_polls: 2,
    }
}
