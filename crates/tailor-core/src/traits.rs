use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::AppError;
use crate::models::{Document, FitDecision, Job};

/// Interval between element lookups in the default [`BrowserDriver::wait_for`].
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// The browser capabilities the session and extraction stages rely on.
///
/// Implementations wrap one automation engine. Nothing in the core knows
/// about an engine beyond CSS selector strings.
pub trait BrowserDriver: Send + Sync {
    type Element: Send + Sync;

    fn navigate(&self, url: &str) -> impl Future<Output = Result<(), AppError>> + Send;

    fn current_url(&self) -> impl Future<Output = Result<String, AppError>> + Send;

    fn find_all(
        &self,
        selector: &str,
    ) -> impl Future<Output = Result<Vec<Self::Element>, AppError>> + Send;

    fn find_within(
        &self,
        parent: &Self::Element,
        selector: &str,
    ) -> impl Future<Output = Result<Vec<Self::Element>, AppError>> + Send;

    fn click(&self, element: &Self::Element) -> impl Future<Output = Result<(), AppError>> + Send;

    fn type_text(
        &self,
        element: &Self::Element,
        text: &str,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    fn read_text(
        &self,
        element: &Self::Element,
    ) -> impl Future<Output = Result<String, AppError>> + Send;

    fn attribute(
        &self,
        element: &Self::Element,
        name: &str,
    ) -> impl Future<Output = Result<Option<String>, AppError>> + Send;

    /// Shut the browser down. Called at most once per launched driver.
    fn quit(&mut self) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Wait until `selector` matches at least one element, polling until
    /// `timeout`. Expiry is a [`AppError::TransientError`].
    fn wait_for(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<Self::Element, AppError>> + Send {
        async move {
            let deadline = Instant::now() + timeout;
            loop {
                if let Some(el) = self.find_all(selector).await?.into_iter().next() {
                    return Ok(el);
                }
                let now = Instant::now();
                if now >= deadline {
                    return Err(AppError::TransientError(format!(
                        "timed out after {}ms waiting for '{selector}'",
                        timeout.as_millis()
                    )));
                }
                tokio::time::sleep(WAIT_POLL_INTERVAL.min(deadline - now)).await;
            }
        }
    }
}

/// Starts an isolated browser instance.
pub trait DriverLauncher: Send + Sync {
    type Driver: BrowserDriver + 'static;

    fn launch(&self) -> impl Future<Output = Result<Self::Driver, AppError>> + Send;
}

/// A system + user message pair for the text-generation backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

impl Prompt {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
        }
    }
}

/// Free text in, free text out.
pub trait TextGenerator: Send + Sync + Clone {
    fn complete(&self, prompt: &Prompt) -> impl Future<Output = Result<String, AppError>> + Send;
}

/// Persists the artifacts handed between pipeline stages.
pub trait ArtifactStore: Send + Sync {
    fn save_jobs(&self, jobs: &[Job]) -> Result<(), AppError>;

    /// `None` when no extraction has been persisted yet.
    fn load_jobs(&self) -> Result<Option<Vec<Job>>, AppError>;

    fn save_decision(&self, decision: &FitDecision) -> Result<(), AppError>;

    fn load_decision(&self) -> Result<Option<FitDecision>, AppError>;

    fn save_document(&self, document: &Document) -> Result<(), AppError>;

    /// Append lines of feedback for the user (requirements the profile lacks).
    fn append_feedback(&self, lines: &[String]) -> Result<(), AppError>;
}

/// An ArtifactStore that keeps nothing, for one-shot runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullStore;

impl ArtifactStore for NullStore {
    fn save_jobs(&self, _jobs: &[Job]) -> Result<(), AppError> {
        Ok(())
    }

    fn load_jobs(&self) -> Result<Option<Vec<Job>>, AppError> {
        Ok(None)
    }

    fn save_decision(&self, _decision: &FitDecision) -> Result<(), AppError> {
        Ok(())
    }

    fn load_decision(&self) -> Result<Option<FitDecision>, AppError> {
        Ok(None)
    }

    fn save_document(&self, _document: &Document) -> Result<(), AppError> {
        Ok(())
    }

    fn append_feedback(&self, _lines: &[String]) -> Result<(), AppError> {
        Ok(())
    }
}
