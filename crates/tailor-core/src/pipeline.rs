use std::fmt;

use crate::error::AppError;
use crate::extract::{ExtractConfig, extract};
use crate::fit::{FitConfig, FitSelector};
use crate::models::{
    Credentials, Document, ExperienceProfile, ExtractionStatus, FitDecision, Job,
};
use crate::resume::{ResumeConfig, ResumeGenerator};
use crate::session::{Session, SessionConfig};
use crate::site::SiteProfile;
use crate::traits::{ArtifactStore, DriverLauncher, TextGenerator};

/// A working stage of the pipeline, as named in a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Authenticating,
    Extracting,
    Selecting,
    Generating,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Authenticating => "authenticating",
            Stage::Extracting => "extracting",
            Stage::Selecting => "selecting",
            Stage::Generating => "generating",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Authenticating,
    Extracting,
    Selecting,
    Generating,
    Done,
    Failed { stage: Stage, reason: String },
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed { .. })
    }

    /// Allowed moves. Extraction may finish on its own; selection and
    /// generation may start from persisted artifacts.
    pub fn can_transition_to(&self, next: &PipelineState) -> bool {
        use PipelineState::*;
        match (self, next) {
            (Done | Failed { .. }, _) => false,
            (_, Failed { .. }) => true,
            (Idle, Authenticating | Selecting | Generating) => true,
            (Authenticating, Extracting) => true,
            (Extracting, Selecting | Done) => true,
            (Selecting, Generating) => true,
            (Generating, Done) => true,
            _ => false,
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Idle => f.write_str("idle"),
            PipelineState::Authenticating => f.write_str("authenticating"),
            PipelineState::Extracting => f.write_str("extracting"),
            PipelineState::Selecting => f.write_str("selecting"),
            PipelineState::Generating => f.write_str("generating"),
            PipelineState::Done => f.write_str("done"),
            PipelineState::Failed { stage, reason } => write!(f, "failed while {stage}: {reason}"),
        }
    }
}

/// Events emitted by the pipeline for monitoring/logging.
#[derive(Debug, Clone)]
pub enum PipelineEvent<'a> {
    Transition {
        from: &'a PipelineState,
        to: &'a PipelineState,
    },
    JobExtracted {
        job: &'a Job,
    },
    ExtractionFinished {
        jobs: usize,
        warnings: usize,
    },
    JobSelected {
        decision: &'a FitDecision,
    },
    DocumentReady {
        document: &'a Document,
    },
    Failed {
        stage: Stage,
        error: &'a AppError,
    },
}

/// Trait for receiving pipeline events (decoupled logging).
pub trait PipelineReporter: Send + Sync {
    fn report(&self, event: PipelineEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl PipelineReporter for TracingReporter {
    fn report(&self, event: PipelineEvent<'_>) {
        match event {
            PipelineEvent::Transition { from, to } => {
                tracing::debug!(%from, %to, "Pipeline transition");
            }
            PipelineEvent::JobExtracted { job } => {
                tracing::debug!(job_id = %job.id(), status = %job.extraction_status(), "Job extracted");
            }
            PipelineEvent::ExtractionFinished { jobs, warnings } => {
                tracing::info!(%jobs, %warnings, "Extraction finished");
            }
            PipelineEvent::JobSelected { decision } => {
                tracing::info!(
                    job_id = %decision.selected_job_id,
                    signal = ?decision.confidence_signal,
                    "Job selected"
                );
            }
            PipelineEvent::DocumentReady { document } => {
                tracing::info!(
                    job_id = %document.source_job_id,
                    gaps = document.gaps.len(),
                    repaired = document.repaired,
                    "Resume generated"
                );
            }
            PipelineEvent::Failed { stage, error } => {
                tracing::error!(%stage, %error, "Pipeline failed");
            }
        }
    }
}

/// Jobs from one extraction run.
#[derive(Debug, Clone)]
pub struct ExtractionSummary {
    pub jobs: Vec<Job>,
    /// Jobs that came out `partial` or `failed`.
    pub warnings: usize,
}

/// Everything a full run produced.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub extraction: ExtractionSummary,
    pub decision: FitDecision,
    pub document: Document,
}

/// Sequences the stages and is the only writer of persisted artifacts.
///
/// Persisted outputs are never rolled back, so a failed selection or
/// generation can be re-run from what the store already holds.
pub struct Pipeline<L, G, S, R = TracingReporter>
where
    L: DriverLauncher,
    G: TextGenerator,
    S: ArtifactStore,
    R: PipelineReporter,
{
    launcher: L,
    site: SiteProfile,
    session_config: SessionConfig,
    extract_config: ExtractConfig,
    selector: FitSelector<G>,
    writer: ResumeGenerator<G>,
    store: S,
    reporter: R,
    state: PipelineState,
}

impl<L, G, S> Pipeline<L, G, S, TracingReporter>
where
    L: DriverLauncher,
    G: TextGenerator,
    S: ArtifactStore,
{
    pub fn new(launcher: L, generator: G, store: S) -> Self {
        Self {
            launcher,
            site: SiteProfile::default(),
            session_config: SessionConfig::default(),
            extract_config: ExtractConfig::default(),
            selector: FitSelector::new(generator.clone()),
            writer: ResumeGenerator::new(generator),
            store,
            reporter: TracingReporter,
            state: PipelineState::Idle,
        }
    }
}

impl<L, G, S, R> Pipeline<L, G, S, R>
where
    L: DriverLauncher,
    G: TextGenerator,
    S: ArtifactStore,
    R: PipelineReporter,
{
    pub fn with_site(mut self, site: SiteProfile) -> Self {
        self.site = site;
        self
    }

    pub fn with_session_config(mut self, config: SessionConfig) -> Self {
        self.session_config = config;
        self
    }

    pub fn with_extract_config(mut self, config: ExtractConfig) -> Self {
        self.extract_config = config;
        self
    }

    pub fn with_fit_config(mut self, config: FitConfig) -> Self {
        self.selector = self.selector.with_config(config);
        self
    }

    pub fn with_resume_config(mut self, config: ResumeConfig) -> Self {
        self.writer = self.writer.with_config(config);
        self
    }

    pub fn with_reporter<R2: PipelineReporter>(self, reporter: R2) -> Pipeline<L, G, S, R2> {
        Pipeline {
            launcher: self.launcher,
            site: self.site,
            session_config: self.session_config,
            extract_config: self.extract_config,
            selector: self.selector,
            writer: self.writer,
            store: self.store,
            reporter,
            state: self.state,
        }
    }

    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Back to `Idle` after a finished or failed run.
    pub fn reset(&mut self) {
        self.state = PipelineState::Idle;
    }

    /// Sign in, read every saved job, and persist them.
    pub async fn run_extraction(
        &mut self,
        credentials: &Credentials,
    ) -> Result<ExtractionSummary, AppError> {
        self.start_run()?;
        let summary = self.extract_stage(credentials).await?;
        self.transition(PipelineState::Done)?;
        Ok(summary)
    }

    /// Select from the persisted jobs, then generate for the selection.
    pub async fn run_tailoring(
        &mut self,
        profile: &ExperienceProfile,
    ) -> Result<(FitDecision, Document), AppError> {
        self.start_run()?;
        let jobs = self.saved_jobs(Stage::Selecting)?;
        let decision = self.select_stage(&jobs, profile).await?;
        let document = self.generate_for(&jobs, &decision.selected_job_id, profile).await?;
        self.transition(PipelineState::Done)?;
        Ok((decision, document))
    }

    /// Generate for `job_id`, or for the persisted decision when `None`.
    pub async fn run_generation(
        &mut self,
        profile: &ExperienceProfile,
        job_id: Option<&str>,
    ) -> Result<Document, AppError> {
        self.start_run()?;
        let jobs = self.saved_jobs(Stage::Generating)?;
        let job_id = match job_id {
            Some(id) => id.to_string(),
            None => match self.store.load_decision() {
                Ok(Some(decision)) => decision.selected_job_id,
                Ok(None) => {
                    return Err(self.fail(
                        Stage::Generating,
                        AppError::EmptyInputError("no saved decision; run selection first".into()),
                    ));
                }
                Err(e) => return Err(self.fail(Stage::Generating, e)),
            },
        };
        let document = self.generate_for(&jobs, &job_id, profile).await?;
        self.transition(PipelineState::Done)?;
        Ok(document)
    }

    /// Extraction, selection, and generation in one go.
    pub async fn run_all(
        &mut self,
        credentials: &Credentials,
        profile: &ExperienceProfile,
    ) -> Result<RunOutcome, AppError> {
        self.start_run()?;
        let extraction = self.extract_stage(credentials).await?;
        let decision = self.select_stage(&extraction.jobs, profile).await?;
        let document = self
            .generate_for(&extraction.jobs, &decision.selected_job_id, profile)
            .await?;
        self.transition(PipelineState::Done)?;
        Ok(RunOutcome {
            extraction,
            decision,
            document,
        })
    }

    fn start_run(&mut self) -> Result<(), AppError> {
        if self.state.is_terminal() {
            self.reset();
        }
        if self.state != PipelineState::Idle {
            return Err(AppError::InvalidTransition(format!(
                "a run is already in progress ({})",
                self.state
            )));
        }
        Ok(())
    }

    fn transition(&mut self, next: PipelineState) -> Result<(), AppError> {
        if !self.state.can_transition_to(&next) {
            return Err(AppError::InvalidTransition(format!("{} -> {next}", self.state)));
        }
        self.reporter.report(PipelineEvent::Transition {
            from: &self.state,
            to: &next,
        });
        self.state = next;
        Ok(())
    }

    /// Record the failure as the terminal state and hand the error back.
    fn fail(&mut self, stage: Stage, error: AppError) -> AppError {
        self.reporter.report(PipelineEvent::Failed {
            stage,
            error: &error,
        });
        if !self.state.is_terminal() {
            self.state = PipelineState::Failed {
                stage,
                reason: error.to_string(),
            };
        }
        error
    }

    /// Leaves the pipeline in `Extracting` on success.
    async fn extract_stage(
        &mut self,
        credentials: &Credentials,
    ) -> Result<ExtractionSummary, AppError> {
        self.transition(PipelineState::Authenticating)?;
        let opened = Session::<L::Driver>::open(
            &self.launcher,
            credentials,
            self.site,
            self.session_config.clone(),
        )
        .await;
        let mut session = match opened {
            Ok(session) => session,
            Err(e) => return Err(self.fail(Stage::Authenticating, e)),
        };

        if let Err(e) = self.transition(PipelineState::Extracting) {
            session.close().await;
            return Err(e);
        }

        let mut jobs = Vec::new();
        let mut stopped_by = None;
        {
            let mut saved = extract(&session, self.extract_config.clone());
            while let Some(item) = saved.next().await {
                match item {
                    Ok(job) => {
                        self.reporter.report(PipelineEvent::JobExtracted { job: &job });
                        jobs.push(job);
                    }
                    Err(e) => {
                        stopped_by = Some(e);
                        break;
                    }
                }
            }
        }
        session.close().await;

        // Whatever was read is kept, even when a block cut the run short.
        if let Err(e) = self.store.save_jobs(&jobs) {
            return Err(self.fail(Stage::Extracting, e));
        }
        if let Some(e) = stopped_by {
            tracing::warn!(kept = jobs.len(), "Extraction stopped early; partial results saved");
            return Err(self.fail(Stage::Extracting, e));
        }

        let warnings = jobs
            .iter()
            .filter(|j| j.extraction_status() != ExtractionStatus::Complete)
            .count();
        self.reporter.report(PipelineEvent::ExtractionFinished {
            jobs: jobs.len(),
            warnings,
        });
        Ok(ExtractionSummary { jobs, warnings })
    }

    fn saved_jobs(&mut self, stage: Stage) -> Result<Vec<Job>, AppError> {
        match self.store.load_jobs() {
            Ok(Some(jobs)) => Ok(jobs),
            Ok(None) => Err(self.fail(
                stage,
                AppError::EmptyInputError("no saved jobs; run extraction first".into()),
            )),
            Err(e) => Err(self.fail(stage, e)),
        }
    }

    async fn select_stage(
        &mut self,
        jobs: &[Job],
        profile: &ExperienceProfile,
    ) -> Result<FitDecision, AppError> {
        self.transition(PipelineState::Selecting)?;

        let usable: Vec<Job> = jobs
            .iter()
            .filter(|j| j.extraction_status() != ExtractionStatus::Failed)
            .cloned()
            .collect();
        if usable.len() < jobs.len() {
            tracing::warn!(
                skipped = jobs.len() - usable.len(),
                "Leaving unreadable jobs out of selection"
            );
        }

        let decision = match self.selector.select(&usable, profile).await {
            Ok(decision) => decision,
            Err(e) => return Err(self.fail(Stage::Selecting, e)),
        };
        if let Err(e) = self.store.save_decision(&decision) {
            return Err(self.fail(Stage::Selecting, e));
        }
        self.reporter.report(PipelineEvent::JobSelected {
            decision: &decision,
        });
        Ok(decision)
    }

    async fn generate_for(
        &mut self,
        jobs: &[Job],
        job_id: &str,
        profile: &ExperienceProfile,
    ) -> Result<Document, AppError> {
        self.transition(PipelineState::Generating)?;

        let Some(job) = jobs.iter().find(|j| j.id() == job_id) else {
            return Err(self.fail(
                Stage::Generating,
                AppError::NoValidSelectionError(format!("job {job_id} is not among the saved jobs")),
            ));
        };

        let document = match self.writer.generate(job, profile).await {
            Ok(document) => document,
            Err(e) => return Err(self.fail(Stage::Generating, e)),
        };
        if let Err(e) = self.store.save_document(&document) {
            return Err(self.fail(Stage::Generating, e));
        }
        if !document.gaps.is_empty() {
            let lines: Vec<String> = document
                .gaps
                .iter()
                .map(|gap| format!("{} at {}: {gap}", job.title(), job.company()))
                .collect();
            if let Err(e) = self.store.append_feedback(&lines) {
                return Err(self.fail(Stage::Generating, e));
            }
        }
        self.reporter.report(PipelineEvent::DocumentReady {
            document: &document,
        });
        Ok(document)
    }
}
