//! Running independent pipelines for several files at once.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::pipeline::{Pipeline, PipelineReport};

#[derive(Debug, Default)]
pub struct BatchSummary {
    /// Reports in the order the files were given.
    pub reports: Vec<PipelineReport>,
    /// Runs whose worker panicked and produced no report. Their files are
    /// moved to the error directory when possible.
    pub crashed: Vec<PathBuf>,
}

impl BatchSummary {
    pub fn succeeded(&self) -> usize {
        self.reports.iter().filter(|r| r.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.reports.len() - self.succeeded() + self.crashed.len()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed() == 0
    }
}

/// Process `files` with at most `jobs` pipelines running at the same time.
/// Each run is blocking, so it goes to tokio's blocking pool.
pub async fn process_files(pipeline: Arc<Pipeline>, files: Vec<PathBuf>, jobs: usize) -> BatchSummary {
    let limit = Arc::new(Semaphore::new(jobs.max(1)));
    let mut set = JoinSet::new();

    for (index, file) in files.iter().cloned().enumerate() {
        let permit = limit.clone().acquire_owned().await.ok();
        let pipeline = pipeline.clone();
        set.spawn_blocking(move || {
            let _permit = permit;
            match panic::catch_unwind(AssertUnwindSafe(|| pipeline.process(&file))) {
                Ok(report) => Some((index, report)),
                Err(cause) => {
                    log::error!(
                        "Pipeline worker for {} panicked: {}",
                        file.display(),
                        panic_message(cause.as_ref())
                    );
                    match pipeline.quarantine(&file) {
                        Ok(dest) => log::info!("Moved HL7 to error: {}", dest.display()),
                        Err(e) => log::error!("{e}"),
                    }
                    None
                }
            }
        });
    }

    let mut finished = Vec::with_capacity(files.len());
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(Some(entry)) => finished.push(entry),
            Ok(None) => {}
            Err(e) => log::error!("Pipeline worker failed: {e}"),
        }
    }
    finished.sort_by_key(|(index, _)| *index);

    let crashed = files
        .iter()
        .enumerate()
        .filter(|(index, _)| !finished.iter().any(|(done, _)| done == index))
        .map(|(_, file)| file.clone())
        .collect();

    BatchSummary {
        reports: finished.into_iter().map(|(_, report)| report).collect(),
        crashed,
    }
}

fn panic_message(cause: &(dyn Any + Send)) -> &str {
    if let Some(message) = cause.downcast_ref::<&str>() {
        message
    } else if let Some(message) = cause.downcast_ref::<String>() {
        message
    } else {
        "unknown cause"
    }
}
