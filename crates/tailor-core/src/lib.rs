pub mod error;
pub mod extract;
pub mod fit;
pub mod models;
pub mod pipeline;
pub mod resume;
pub mod retry;
pub mod session;
pub mod site;
pub mod summary;
pub mod template;
pub mod throttle;
pub mod traits;
pub mod util;

#[cfg(test)]
pub(crate) mod testutil;

pub use error::{AppError, AuthFailure};
pub use models::{
    ConfidenceSignal, Credentials, Document, ExperienceProfile, ExtractionStatus, FitDecision,
    Job, compute_hash,
};
pub use pipeline::{Pipeline, PipelineState, Stage};
pub use traits::{ArtifactStore, BrowserDriver, DriverLauncher, Prompt, TextGenerator};
