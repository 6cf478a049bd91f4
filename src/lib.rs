pub mod artifacts;
pub mod batch;
pub mod config;
pub mod diagnostics;
pub mod encoder;
pub mod error;
pub mod external;
pub mod extractor;
pub mod fakes;
pub mod payload;
pub mod pipeline;
pub mod rasterizer;
pub mod reader;
pub mod segment;

pub use config::PipelineConfig;
pub use error::{PipelineError, ReadWarning};
pub use extractor::{ParsedFields, ReportFields};
pub use pipeline::{Pipeline, PipelineOutcome, PipelineReport, Stage};
