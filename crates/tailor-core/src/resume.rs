use std::time::Duration;

use chrono::Utc;

use crate::error::AppError;
use crate::models::{Document, ExperienceProfile, Job};
use crate::retry::{RetryPolicy, complete_with_retry};
use crate::template::{ResumeTemplate, Violation};
use crate::traits::{Prompt, TextGenerator};
use crate::util::strip_code_fences;

const SYSTEM_PROMPT: &str = "You are an expert resume writer. You tailor a candidate's resume to \
one job posting using only facts from the candidate's own experience notes. Never invent \
employers, titles, dates, numbers, or skills.";

#[derive(Debug, Clone)]
pub struct ResumeConfig {
    /// Budget for each backend call (draft and repair separately).
    pub retry: RetryPolicy,
}

impl Default for ResumeConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::once(Duration::from_secs(2)),
        }
    }
}

/// Writes a tailored resume body, validates it, and repairs it once.
#[derive(Clone)]
pub struct ResumeGenerator<G: TextGenerator> {
    generator: G,
    template: ResumeTemplate,
    config: ResumeConfig,
}

/// A model answer split into markup and gap notes.
struct Draft {
    body: String,
    gaps: Vec<String>,
}

impl Draft {
    fn from_answer(answer: &str) -> Self {
        let text = strip_code_fences(answer);
        let mut body = Vec::new();
        let mut gaps = Vec::new();
        for line in text.lines() {
            match gap_note(line) {
                Some(gap) if !gap.is_empty() => gaps.push(gap.to_string()),
                Some(_) => {}
                None => body.push(line),
            }
        }
        Self {
            body: body.join("\n").trim().to_string(),
            gaps,
        }
    }
}

/// The text of a `% GAP: ...` comment line.
fn gap_note(line: &str) -> Option<&str> {
    let rest = line.trim_start().strip_prefix('%')?.trim_start();
    let label = rest.get(..4)?;
    if !label.eq_ignore_ascii_case("gap:") {
        return None;
    }
    Some(rest[4..].trim())
}

impl<G: TextGenerator> ResumeGenerator<G> {
    pub fn new(generator: G) -> Self {
        Self {
            generator,
            template: ResumeTemplate::default(),
            config: ResumeConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ResumeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn template(&self) -> &ResumeTemplate {
        &self.template
    }

    /// Produce a validated document for `job`. At most one repair round.
    pub async fn generate(
        &self,
        job: &Job,
        profile: &ExperienceProfile,
    ) -> Result<Document, AppError> {
        if job.description().is_empty() {
            tracing::warn!(job_id = %job.id(), "Job has no description, tailoring to title only");
        }

        let prompt = self.draft_prompt(job, profile);
        tracing::info!(job_id = %job.id(), "Drafting resume");
        let answer =
            complete_with_retry(&self.generator, &prompt, &self.config.retry, "resume draft")
                .await?;
        let draft = Draft::from_answer(&answer);

        let violation = match self.template.check(&draft.body) {
            Ok(()) => return Ok(self.finish(job, draft, Vec::new(), false)),
            Err(v) => v,
        };
        tracing::warn!(job_id = %job.id(), violation = %violation, "Draft failed validation, requesting repair");

        let prompt = self.repair_prompt(job, profile, &draft.body, &violation);
        let answer =
            complete_with_retry(&self.generator, &prompt, &self.config.retry, "resume repair")
                .await?;
        let repaired = Draft::from_answer(&answer);

        match self.template.check(&repaired.body) {
            Ok(()) => {
                tracing::info!(job_id = %job.id(), "Repair passed validation");
                Ok(self.finish(job, repaired, draft.gaps, true))
            }
            Err(v) => {
                tracing::warn!(job_id = %job.id(), violation = %v, "Repair failed validation");
                Err(AppError::TemplateValidationError {
                    violation: v.message,
                    excerpt: v.excerpt,
                })
            }
        }
    }

    fn finish(&self, job: &Job, draft: Draft, earlier_gaps: Vec<String>, repaired: bool) -> Document {
        let mut gaps = earlier_gaps;
        for gap in draft.gaps {
            if !gaps.contains(&gap) {
                gaps.push(gap);
            }
        }
        Document {
            rendered: self.template.assemble(&draft.body),
            body: draft.body,
            source_job_id: job.id().to_string(),
            generated_at: Utc::now(),
            gaps,
            repaired,
        }
    }

    fn draft_prompt(&self, job: &Job, profile: &ExperienceProfile) -> Prompt {
        let user = format!(
            "{guide}\n\n## Job posting\nTitle: {title}\nCompany: {company}\nLocation: {location}\n\n{description}\n\n\
             ## Candidate experience\n{profile}\n\n\
             Write the resume body now. Lead the summary and order the bullets by what this posting asks for.",
            guide = self.template.authoring_guide(),
            title = job.title(),
            company = job.company(),
            location = job.location(),
            description = job.description(),
            profile = profile.as_str().trim(),
        );
        Prompt::new(SYSTEM_PROMPT, user)
    }

    fn repair_prompt(
        &self,
        job: &Job,
        profile: &ExperienceProfile,
        previous: &str,
        violation: &Violation,
    ) -> Prompt {
        let mut prompt = self.draft_prompt(job, profile);
        prompt.user.push_str(&format!(
            "\n\n## Fix required\nYour previous body was rejected: {violation}.\n\
             Return the corrected body in full, changing only what is needed.\n\n\
             Previous body:\n{previous}"
        ));
        prompt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::SAMPLE_BODY;
    use crate::testutil::{MockGenerator, make_job};

    fn job() -> Job {
        make_job(
            "102",
            "Backend Engineer",
            "Globex",
            "Design Go services. Own distributed systems. Kubernetes a plus.",
        )
    }

    fn profile() -> ExperienceProfile {
        ExperienceProfile::new("5 years backend engineering, Go and distributed systems")
    }

    fn missing_skills() -> String {
        SAMPLE_BODY.replace(r"\begin{cvsection}{Skills}", r"\begin{cvsection}{Tools}")
    }

    #[tokio::test]
    async fn valid_first_draft_needs_one_call() {
        let answer = format!("```latex\n{SAMPLE_BODY}\n% GAP: Kubernetes\n```");
        let generator = MockGenerator::new(&answer);
        let doc = ResumeGenerator::new(generator.clone())
            .generate(&job(), &profile())
            .await
            .unwrap();

        assert_eq!(generator.calls(), 1);
        assert_eq!(doc.source_job_id, "102");
        assert!(!doc.repaired);
        assert_eq!(doc.gaps, vec!["Kubernetes"]);
        assert!(!doc.body.contains("GAP"));
        assert!(!doc.body.contains("```"));
        assert_eq!(ResumeTemplate::default().check(&doc.body), Ok(()));
        assert!(doc.rendered.contains(r"\begin{document}"));

        let prompt = &generator.prompts()[0];
        assert!(prompt.user.contains("Kubernetes a plus"));
        assert!(prompt.user.contains("Go and distributed systems"));
    }

    #[tokio::test]
    async fn malformed_draft_is_repaired_once() {
        let generator = MockGenerator::with_responses(vec![
            Ok(format!("{}\n% GAP: Kubernetes", missing_skills())),
            Ok(SAMPLE_BODY.to_string()),
        ]);
        let doc = ResumeGenerator::new(generator.clone())
            .generate(&job(), &profile())
            .await
            .unwrap();

        assert_eq!(generator.calls(), 2);
        assert!(doc.repaired);
        assert_eq!(doc.gaps, vec!["Kubernetes"]);
        let repair = &generator.prompts()[1];
        assert!(repair.user.contains("Skills"));
        assert!(repair.user.contains(r"\begin{cvsection}{Tools}"));
    }

    #[tokio::test]
    async fn second_failure_is_a_template_error() {
        let generator = MockGenerator::with_responses(vec![
            Ok(missing_skills()),
            Ok(SAMPLE_BODY.replace("40\\%", "$40\\%$")),
        ]);
        let err = ResumeGenerator::new(generator.clone())
            .generate(&job(), &profile())
            .await
            .unwrap_err();

        assert_eq!(generator.calls(), 2);
        match err {
            AppError::TemplateValidationError { violation, excerpt } => {
                assert_eq!(violation, "math mode is not allowed");
                assert!(excerpt.contains('$'));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn model_errors_propagate() {
        let generator = MockGenerator::with_error(AppError::ModelError {
            message: "invalid api key".into(),
            status_code: 401,
            retryable: false,
        });
        let err = ResumeGenerator::new(generator)
            .generate(&job(), &profile())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ModelError { status_code: 401, .. }));
    }

    #[test]
    fn gap_notes_are_case_insensitive_and_trimmed() {
        assert_eq!(gap_note("  % gap:  Terraform "), Some("Terraform"));
        assert_eq!(gap_note("%GAP: AWS"), Some("AWS"));
        assert_eq!(gap_note("% regular comment"), None);
        assert_eq!(gap_note(r"\item text"), None);
    }
}
