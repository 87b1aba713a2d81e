pub mod captions;
pub mod config;
pub mod error;
pub mod interactive;
pub mod media;
pub mod pipeline;
pub mod select;
pub mod source;
pub mod status;

pub use config::Config;
pub use error::{AyavidError, Result};
pub use pipeline::{
    print_summary, GenerationRequest, JobHandle, Pipeline, PipelineConfig, PipelineResult,
    PipelineStats,
};
pub use status::{JobStatus, Stage, StatusStore};
