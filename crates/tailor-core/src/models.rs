use std::fmt;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;

static POSTING_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/jobs/view/(?:[^/]*-)?(\d+)").expect("posting id pattern is valid")
});

/// How much of a saved item could be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionStatus {
    Complete,
    Partial,
    Failed,
}

impl ExtractionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionStatus::Complete => "complete",
            ExtractionStatus::Partial => "partial",
            ExtractionStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ExtractionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Fields read for one saved item, before it is frozen into a [`Job`].
#[derive(Debug, Clone, Default)]
pub struct JobDraft {
    pub title: String,
    pub company: String,
    pub location: String,
    pub description: String,
    pub url: String,
    pub issues: Vec<String>,
}

impl JobDraft {
    /// Freeze the draft. The extraction status is derived from which fields
    /// ended up non-empty, so a `complete` job always has a description.
    pub fn into_job(self, id: String, scraped_at: DateTime<Utc>) -> Job {
        let has = |s: &str| !s.trim().is_empty();
        let extraction_status = if !has(&self.url) && !has(&self.title) {
            ExtractionStatus::Failed
        } else if has(&self.title)
            && has(&self.company)
            && has(&self.url)
            && has(&self.description)
        {
            ExtractionStatus::Complete
        } else {
            ExtractionStatus::Partial
        };

        Job {
            id,
            title: self.title.trim().to_string(),
            company: self.company.trim().to_string(),
            location: self.location.trim().to_string(),
            description: self.description.trim().to_string(),
            url: self.url,
            scraped_at,
            extraction_status,
            issues: self.issues,
        }
    }
}

/// One scraped job posting. Immutable once produced.
///
/// Loading re-derives the extraction status from the fields, so an edited
/// file cannot claim `complete` for a job without a description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "StoredJob")]
pub struct Job {
    id: String,
    title: String,
    company: String,
    location: String,
    description: String,
    url: String,
    scraped_at: DateTime<Utc>,
    extraction_status: ExtractionStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    issues: Vec<String>,
}

/// A [`Job`] as written to disk, before its status is checked.
#[derive(Deserialize)]
struct StoredJob {
    id: String,
    title: String,
    company: String,
    #[serde(default)]
    location: String,
    #[serde(default)]
    description: String,
    url: String,
    scraped_at: DateTime<Utc>,
    #[serde(default)]
    extraction_status: Option<ExtractionStatus>,
    #[serde(default)]
    issues: Vec<String>,
}

impl TryFrom<StoredJob> for Job {
    type Error = String;

    fn try_from(stored: StoredJob) -> Result<Self, Self::Error> {
        if stored.id.trim().is_empty() {
            return Err("saved job has an empty id".into());
        }
        let claimed = stored.extraction_status;
        let job = JobDraft {
            title: stored.title,
            company: stored.company,
            location: stored.location,
            description: stored.description,
            url: stored.url,
            issues: stored.issues,
        }
        .into_job(stored.id, stored.scraped_at);

        if let Some(claimed) = claimed.filter(|c| *c != job.extraction_status) {
            tracing::warn!(
                job_id = %job.id,
                %claimed,
                derived = %job.extraction_status,
                "Saved job status does not match its fields"
            );
        }
        Ok(job)
    }
}

impl Job {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn company(&self) -> &str {
        &self.company
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn scraped_at(&self) -> DateTime<Utc> {
        self.scraped_at
    }

    pub fn extraction_status(&self) -> ExtractionStatus {
        self.extraction_status
    }

    /// What went wrong while reading this item, if anything.
    pub fn issues(&self) -> &[String] {
        &self.issues
    }
}

/// Free-text description of the user's background. Passed through whole.
#[derive(Clone, PartialEq, Eq)]
pub struct ExperienceProfile(String);

impl ExperienceProfile {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ExperienceProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ExperienceProfile({} chars)", self.0.len())
    }
}

/// How the selected job id was recovered from the model's answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceSignal {
    /// The answer named a known id verbatim.
    ExactId,
    /// The answer named a known id after normalisation, or mentioned exactly one.
    NearId,
    /// No usable id; resolved by matching the answer against job titles.
    TitleMatch,
}

/// Output of the fit selector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitDecision {
    pub selected_job_id: String,
    pub rationale: String,
    pub confidence_signal: ConfidenceSignal,
    pub decided_at: DateTime<Utc>,
}

/// Output of the resume generator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Template body markup that passed structural validation.
    pub body: String,
    /// `body` placed into the template's fixed preamble; the `.tex` source.
    pub rendered: String,
    pub source_job_id: String,
    pub generated_at: DateTime<Utc>,
    /// Requirements of the posting the profile could not back up.
    #[serde(default)]
    pub gaps: Vec<String>,
    /// True when the first draft failed validation and a repair was needed.
    #[serde(default)]
    pub repaired: bool,
}

/// Account credentials for the target site.
#[derive(Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Compute a SHA-256 hash of a string, returned as 64-char hex.
pub fn compute_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Resolve `href` against `base` and drop query string and fragment.
///
/// Tracking parameters make the same posting look different between runs.
pub fn canonical_url(href: &str, base: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    let mut url = match Url::parse(href) {
        Ok(u) => u,
        Err(url::ParseError::RelativeUrlWithoutBase) => Url::parse(base).ok()?.join(href).ok()?,
        Err(_) => return None,
    };
    url.set_query(None);
    url.set_fragment(None);
    Some(url.to_string())
}

/// Stable job id: the posting number when the URL carries one, a short URL
/// hash otherwise, and the listing position as a last resort.
pub fn derive_job_id(url: Option<&str>, page: usize, index: usize) -> String {
    match url.filter(|u| !u.is_empty()) {
        Some(u) => match POSTING_ID.captures(u) {
            Some(caps) => caps[1].to_string(),
            None => compute_hash(u)[..12].to_string(),
        },
        None => format!("item-{page}-{index}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(title: &str, company: &str, description: &str, url: &str) -> JobDraft {
        JobDraft {
            title: title.into(),
            company: company.into(),
            description: description.into(),
            url: url.into(),
            ..JobDraft::default()
        }
    }

    #[test]
    fn test_complete_requires_description() {
        let job = draft("Engineer", "Acme", "Build things", "https://x/jobs/view/1/")
            .into_job("1".into(), Utc::now());
        assert_eq!(job.extraction_status(), ExtractionStatus::Complete);

        let job = draft("Engineer", "Acme", "   ", "https://x/jobs/view/1/")
            .into_job("1".into(), Utc::now());
        assert_eq!(job.extraction_status(), ExtractionStatus::Partial);
        assert!(job.description().is_empty());
    }

    #[test]
    fn test_nothing_readable_is_failed() {
        let job = draft("", "Acme", "", "").into_job("item-1-0".into(), Utc::now());
        assert_eq!(job.extraction_status(), ExtractionStatus::Failed);
    }

    #[test]
    fn test_job_serde_keeps_status() {
        let job = draft("Engineer", "Acme", "Build", "https://x/jobs/view/9/")
            .into_job("9".into(), Utc::now());
        let json = serde_json::to_string(&job).unwrap();
        assert!(json.contains(r#""extraction_status":"complete""#));
        assert!(!json.contains("issues"));
        let back: Job = serde_json::from_str(&json).unwrap();
        assert_eq!(back, job);
    }

    #[test]
    fn test_loaded_status_is_rederived() {
        let json = r#"{
            "id": "9",
            "title": "Engineer",
            "company": "Acme",
            "location": "Remote",
            "description": "",
            "url": "https://x/jobs/view/9/",
            "scraped_at": "2025-05-01T12:00:00Z",
            "extraction_status": "complete"
        }"#;
        let job: Job = serde_json::from_str(json).unwrap();
        assert_eq!(job.extraction_status(), ExtractionStatus::Partial);

        let missing_id = json.replace(r#""id": "9""#, r#""id": " ""#);
        let err = serde_json::from_str::<Job>(&missing_id).unwrap_err();
        assert!(err.to_string().contains("empty id"));
    }

    #[test]
    fn test_derive_job_id_prefers_posting_number() {
        assert_eq!(
            derive_job_id(Some("https://www.linkedin.com/jobs/view/3912345678/"), 0, 0),
            "3912345678"
        );
        assert_eq!(
            derive_job_id(
                Some("https://www.linkedin.com/jobs/view/backend-engineer-at-acme-4011/"),
                0,
                0
            ),
            "4011"
        );
        let hashed = derive_job_id(Some("https://jobs.example.com/posting/abc"), 0, 0);
        assert_eq!(hashed.len(), 12);
        assert_eq!(derive_job_id(None, 2, 5), "item-2-5");
        assert_eq!(derive_job_id(Some(""), 0, 3), "item-0-3");
    }

    #[test]
    fn test_canonical_url_strips_tracking() {
        assert_eq!(
            canonical_url("/jobs/view/42/?refId=abc&trk=x#top", "https://www.linkedin.com"),
            Some("https://www.linkedin.com/jobs/view/42/".to_string())
        );
        assert_eq!(
            canonical_url("https://www.linkedin.com/jobs/view/7/?trk=y", "https://ignored.test"),
            Some("https://www.linkedin.com/jobs/view/7/".to_string())
        );
        assert_eq!(canonical_url("  ", "https://www.linkedin.com"), None);
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let creds = Credentials::new("me@example.com", "hunter2");
        let dbg = format!("{creds:?}");
        assert!(dbg.contains("me@example.com"));
        assert!(!dbg.contains("hunter2"));
    }

    #[test]
    fn test_compute_hash_consistency() {
        let h1 = compute_hash("hello world");
        assert_eq!(h1, compute_hash("hello world"));
        assert_eq!(h1.len(), 64);
        assert_ne!(h1, compute_hash("hello"));
    }
}
