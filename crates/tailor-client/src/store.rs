use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tailor_core::error::AppError;
use tailor_core::models::{Document, FitDecision, Job};
use tailor_core::traits::ArtifactStore;

const JOBS_FILE: &str = "saved_jobs.json";
const DECISION_FILE: &str = "decision.json";
const DOCUMENT_FILE: &str = "resume.json";
const TEX_FILE: &str = "resume.tex";
const FEEDBACK_FILE: &str = "feedback.txt";

/// Pipeline artifacts as files in one directory.
///
/// JSON for structured data, the rendered `.tex` next to it. Each file is
/// written to a temporary sibling and renamed into place, so a crash never
/// leaves a half-written artifact behind.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    dir: PathBuf,
}

impl FsArtifactStore {
    /// Use `dir`, creating it if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, AppError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn jobs_path(&self) -> PathBuf {
        self.dir.join(JOBS_FILE)
    }

    pub fn tex_path(&self) -> PathBuf {
        self.dir.join(TEX_FILE)
    }

    pub fn feedback_path(&self) -> PathBuf {
        self.dir.join(FEEDBACK_FILE)
    }

    fn write_atomic(&self, name: &str, contents: &[u8]) -> Result<(), AppError> {
        let path = self.dir.join(name);
        let tmp_path = self.dir.join(format!(".{name}.tmp"));
        fs::write(&tmp_path, contents)
            .and_then(|_| fs::rename(&tmp_path, &path))
            .map_err(|e| AppError::StorageError(format!("writing {}: {e}", path.display())))?;
        tracing::debug!(path = %path.display(), bytes = contents.len(), "Artifact written");
        Ok(())
    }

    fn write_json<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> Result<(), AppError> {
        let json = serde_json::to_vec_pretty(value)?;
        self.write_atomic(name, &json)
    }

    fn read_json<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, AppError> {
        let path = self.dir.join(name);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::StorageError(format!(
                "reading {}: {e}",
                path.display()
            ))),
        }
    }
}

impl ArtifactStore for FsArtifactStore {
    fn save_jobs(&self, jobs: &[Job]) -> Result<(), AppError> {
        self.write_json(JOBS_FILE, jobs)?;
        tracing::info!(jobs = jobs.len(), path = %self.jobs_path().display(), "Saved jobs");
        Ok(())
    }

    fn load_jobs(&self) -> Result<Option<Vec<Job>>, AppError> {
        self.read_json(JOBS_FILE)
    }

    fn save_decision(&self, decision: &FitDecision) -> Result<(), AppError> {
        self.write_json(DECISION_FILE, decision)
    }

    fn load_decision(&self) -> Result<Option<FitDecision>, AppError> {
        self.read_json(DECISION_FILE)
    }

    fn save_document(&self, document: &Document) -> Result<(), AppError> {
        self.write_atomic(TEX_FILE, document.rendered.as_bytes())?;
        self.write_json(DOCUMENT_FILE, document)?;
        tracing::info!(path = %self.tex_path().display(), "Saved resume");
        Ok(())
    }

    fn append_feedback(&self, lines: &[String]) -> Result<(), AppError> {
        let path = self.feedback_path();
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        for line in lines {
            writeln!(file, "{line}")?;
        }
        Ok(())
    }
}
