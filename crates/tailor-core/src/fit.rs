use std::sync::LazyLock;
use std::time::Duration;

use chrono::Utc;
use regex::Regex;

use crate::error::AppError;
use crate::models::{ConfidenceSignal, ExperienceProfile, FitDecision, Job};
use crate::retry::{RetryPolicy, complete_with_retry};
use crate::summary;
use crate::traits::{Prompt, TextGenerator};
use crate::util::{strip_code_fences, truncate_chars};

/// Minimum similarity for a title-only match.
const TITLE_MATCH_THRESHOLD: f64 = 0.85;

static LABELED_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?im)^[\s*_`"'>-]*(?:selected[\s_]*)?job[\s_]*id[\s*_`"']*[:=][\s*_`"']*(.+?)\s*$"#)
        .expect("job id label pattern is valid")
});

static LABELED_RATIONALE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?ims)^[\s*_`"'>-]*rationale[\s*_`"']*[:=]\s*(.+)$"#)
        .expect("rationale label pattern is valid")
});

const SYSTEM_PROMPT: &str = "You are a career advisor. Given a candidate's experience and a list \
of saved job postings, choose the single posting the candidate is the strongest fit for. \
Only choose from the listed postings.";

/// Prompt shaping and retry budget for fit selection.
#[derive(Debug, Clone)]
pub struct FitConfig {
    /// Sentences kept from each description.
    pub summary_sentences: usize,
    /// Hard cap on each summarized description.
    pub max_description_chars: usize,
    pub retry: RetryPolicy,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            summary_sentences: summary::DEFAULT_SENTENCES,
            max_description_chars: 2000,
            retry: RetryPolicy::once(Duration::from_secs(2)),
        }
    }
}

/// Picks the best-fitting job for a profile with one model call.
#[derive(Clone)]
pub struct FitSelector<G: TextGenerator> {
    generator: G,
    config: FitConfig,
}

impl<G: TextGenerator> FitSelector<G> {
    pub fn new(generator: G) -> Self {
        Self {
            generator,
            config: FitConfig::default(),
        }
    }

    pub fn with_config(mut self, config: FitConfig) -> Self {
        self.config = config;
        self
    }

    /// Choose one job from `jobs`. The returned id is always one of theirs.
    pub async fn select(
        &self,
        jobs: &[Job],
        profile: &ExperienceProfile,
    ) -> Result<FitDecision, AppError> {
        if jobs.is_empty() {
            return Err(AppError::EmptyInputError("no jobs to choose from".into()));
        }

        let prompt = self.build_prompt(jobs, profile);
        tracing::info!(jobs = jobs.len(), "Asking model for best fit");
        let answer =
            complete_with_retry(&self.generator, &prompt, &self.config.retry, "fit selection")
                .await?;

        let parsed = Answer::parse(&answer);
        let Some((job, signal)) = resolve(&parsed, jobs) else {
            tracing::warn!(answer = %truncate_chars(answer.trim(), 200), "Model answer names no known job");
            return Err(AppError::NoValidSelectionError(format!(
                "answer did not identify any of the {} jobs: {}",
                jobs.len(),
                truncate_chars(answer.trim(), 200)
            )));
        };

        tracing::info!(job_id = %job.id(), signal = ?signal, "Selected job");
        Ok(FitDecision {
            selected_job_id: job.id().to_string(),
            rationale: parsed.rationale,
            confidence_signal: signal,
            decided_at: Utc::now(),
        })
    }

    fn build_prompt(&self, jobs: &[Job], profile: &ExperienceProfile) -> Prompt {
        let mut listing = String::new();
        for (n, job) in jobs.iter().enumerate() {
            let summary = summary::summarize(job.description(), self.config.summary_sentences);
            let summary = truncate_chars(&summary, self.config.max_description_chars);
            listing.push_str(&format!(
                "[{}] id: {}\ntitle: {}\ncompany: {}\nlocation: {}\nsummary: {}\n\n",
                n + 1,
                job.id(),
                job.title(),
                job.company(),
                job.location(),
                if summary.is_empty() { "(no description)" } else { summary.as_str() },
            ));
        }

        let user = format!(
            "## Candidate experience\n{}\n\n## Saved jobs\n{}\
             Answer in exactly this format:\n\
             JOB_ID: <the id of the chosen job, copied exactly>\n\
             RATIONALE: <two or three sentences on why this job fits best>",
            profile.as_str().trim(),
            listing
        );
        Prompt::new(SYSTEM_PROMPT, user)
    }
}

/// What could be read out of a model answer.
#[derive(Debug, Default)]
struct Answer {
    /// Explicitly labeled or JSON-provided id values, in order of appearance.
    candidates: Vec<String>,
    rationale: String,
    /// First non-empty line, for title matching when nothing is labeled.
    first_line: String,
    text: String,
}

impl Answer {
    fn parse(raw: &str) -> Self {
        let text = strip_code_fences(raw);
        let mut answer = Answer {
            first_line: text
                .lines()
                .map(str::trim)
                .find(|l| !l.is_empty())
                .unwrap_or_default()
                .to_string(),
            ..Default::default()
        };

        if let Ok(serde_json::Value::Object(map)) = serde_json::from_str(&text) {
            for key in ["job_id", "selected_job_id", "id"] {
                match map.get(key) {
                    Some(serde_json::Value::String(s)) => answer.candidates.push(clean_value(s)),
                    Some(serde_json::Value::Number(n)) => answer.candidates.push(n.to_string()),
                    _ => {}
                }
            }
            if let Some(serde_json::Value::String(r)) = map.get("rationale") {
                answer.rationale = r.trim().to_string();
            }
        }

        for caps in LABELED_ID.captures_iter(&text) {
            let value = clean_value(&caps[1]);
            if !value.is_empty() {
                answer.candidates.push(value);
            }
        }

        if answer.rationale.is_empty() {
            answer.rationale = LABELED_RATIONALE
                .captures(&text)
                .map(|caps| caps[1].trim().to_string())
                .unwrap_or_else(|| text.trim().to_string());
        }
        answer.text = text;
        answer
    }
}

/// Strip the quoting and trailing punctuation models wrap values in.
fn clean_value(value: &str) -> String {
    value
        .trim_matches(|c: char| {
            c.is_whitespace()
                || matches!(
                    c,
                    '*' | '_' | '`' | '"' | '\'' | '[' | ']' | '(' | ')' | '<' | '>' | '.' | ',' | ';'
                )
        })
        .to_string()
}

/// Resolution order: exact id, near id, title match. `None` when nothing
/// resolves to exactly one job.
fn resolve<'j>(answer: &Answer, jobs: &'j [Job]) -> Option<(&'j Job, ConfidenceSignal)> {
    for candidate in &answer.candidates {
        if let Some(job) = jobs.iter().find(|j| j.id() == candidate.as_str()) {
            return Some((job, ConfidenceSignal::ExactId));
        }
    }

    for candidate in &answer.candidates {
        let wanted = normalize_id(candidate);
        if let Some(job) = unique(jobs.iter().filter(|j| normalize_id(j.id()) == wanted)) {
            return Some((job, ConfidenceSignal::NearId));
        }
        if let Some(job) = unique_id_among_tokens(candidate, jobs) {
            return Some((job, ConfidenceSignal::NearId));
        }
    }
    if answer.candidates.is_empty() {
        if let Some(job) = unique_id_among_tokens(&answer.text, jobs) {
            return Some((job, ConfidenceSignal::NearId));
        }
    }

    let phrases: Vec<&str> = if answer.candidates.is_empty() {
        vec![answer.first_line.as_str()]
    } else {
        answer.candidates.iter().map(String::as_str).collect()
    };
    phrases
        .into_iter()
        .find_map(|phrase| best_title_match(phrase, jobs))
        .map(|job| (job, ConfidenceSignal::TitleMatch))
}

fn unique<'j>(mut matches: impl Iterator<Item = &'j Job>) -> Option<&'j Job> {
    let first = matches.next()?;
    matches.all(|other| other.id() == first.id()).then_some(first)
}

/// The single job whose id appears as a whole token of `text`.
fn unique_id_among_tokens<'j>(text: &str, jobs: &'j [Job]) -> Option<&'j Job> {
    let tokens: Vec<String> = text
        .split_whitespace()
        .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|t| !t.is_empty())
        .map(normalize_id)
        .collect();
    unique(
        jobs.iter()
            .filter(|j| !normalize_id(j.id()).is_empty())
            .filter(|j| tokens.contains(&normalize_id(j.id()))),
    )
}

fn best_title_match<'j>(phrase: &str, jobs: &'j [Job]) -> Option<&'j Job> {
    let phrase = normalize_text(phrase);
    if phrase.is_empty() {
        return None;
    }
    if named_titles(&phrase, jobs) > 1 {
        tracing::debug!(%phrase, "Answer names more than one job title");
        return None;
    }

    let mut scored: Vec<(&Job, f64)> = jobs
        .iter()
        .map(|job| (job, title_score(&phrase, job)))
        .filter(|(_, score)| *score >= TITLE_MATCH_THRESHOLD)
        .collect();
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));

    match scored.as_slice() {
        [] => None,
        [(job, _)] => Some(*job),
        [(job, best), (_, second), ..] if best - second > f64::EPSILON => Some(*job),
        _ => None,
    }
}

/// Distinct job titles spelled out in `phrase`, ignoring a title that only
/// appears as part of a longer named one.
fn named_titles(phrase: &str, jobs: &[Job]) -> usize {
    let mut named: Vec<String> = jobs
        .iter()
        .map(|job| normalize_text(job.title()))
        .filter(|title| !title.is_empty() && contains_words(phrase, title))
        .collect();
    named.sort();
    named.dedup();
    named
        .iter()
        .filter(|title| {
            !named
                .iter()
                .any(|other| other != *title && contains_words(other, title))
        })
        .count()
}

fn title_score(phrase: &str, job: &Job) -> f64 {
    let title = normalize_text(job.title());
    if title.is_empty() {
        return 0.0;
    }
    let with_company = normalize_text(&format!("{} at {}", job.title(), job.company()));

    let mut score = similarity(phrase, &title).max(similarity(phrase, &with_company));
    if contains_words(phrase, &title) {
        let coverage = title.chars().count() as f64 / phrase.chars().count() as f64;
        score = score.max(TITLE_MATCH_THRESHOLD + 0.15 * coverage.min(1.0));
    }
    score
}

/// `needle` appears in `haystack` on word boundaries.
fn contains_words(haystack: &str, needle: &str) -> bool {
    format!(" {haystack} ").contains(&format!(" {needle} "))
}

/// Lowercase alphanumerics only: "Job #3912-A" → "job3912a".
fn normalize_id(id: &str) -> String {
    id.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Lowercase words separated by single spaces.
fn normalize_text(text: &str) -> String {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// 1 − levenshtein / longer length, over chars.
fn similarity(a: &str, b: &str) -> f64 {
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 1.0;
    }
    1.0 - levenshtein(a, b) as f64 / longest as f64
}

fn levenshtein(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}
