use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use tailor_client::{ChromeLauncher, FsArtifactStore, OpenAiGenerator};
use tailor_core::extract::ExtractConfig;
use tailor_core::throttle::ThrottleConfig;
use tailor_core::traits::ArtifactStore;
use tailor_core::{Credentials, ExperienceProfile, Job, Pipeline};

#[derive(Parser)]
#[command(name = "tailor", version, about = "Saved-job extraction and tailored resumes")]
struct Cli {
    /// Directory for saved jobs, decisions, and generated resumes
    #[arg(long, global = true, env = "TAILOR_DATA_DIR", default_value = "data")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in and save every job from the saved-jobs list
    Extract {
        #[command(flatten)]
        account: AccountArgs,

        #[command(flatten)]
        browser: BrowserArgs,
    },

    /// Pick the best-fitting saved job and write a resume for it
    Tailor {
        /// Plain-text file describing your experience
        #[arg(short, long, env = "TAILOR_PROFILE")]
        profile: PathBuf,

        /// Skip selection and write for this job id
        #[arg(short, long, conflicts_with = "reuse_decision")]
        job: Option<String>,

        /// Skip selection and write for the previously selected job
        #[arg(long, default_value_t = false)]
        reuse_decision: bool,

        #[command(flatten)]
        model: ModelArgs,
    },

    /// Extract, select, and write in one go
    Run {
        /// Plain-text file describing your experience
        #[arg(short, long, env = "TAILOR_PROFILE")]
        profile: PathBuf,

        #[command(flatten)]
        account: AccountArgs,

        #[command(flatten)]
        browser: BrowserArgs,

        #[command(flatten)]
        model: ModelArgs,
    },

    /// List the saved jobs from the last extraction
    Jobs {
        /// Print CSV instead of a table
        #[arg(long, default_value_t = false)]
        csv: bool,
    },
}

#[derive(Args)]
struct AccountArgs {
    /// Account email
    #[arg(long, env = "TAILOR_EMAIL")]
    email: String,

    /// Account password (reads from TAILOR_PASSWORD env var if not provided)
    #[arg(long, env = "TAILOR_PASSWORD", hide_env_values = true)]
    password: String,
}

#[derive(Args)]
struct BrowserArgs {
    /// Show the browser window (useful for completing a verification step)
    #[arg(long, default_value_t = false)]
    headed: bool,

    /// Chrome/Chromium binary to use instead of searching well-known paths
    #[arg(long, env = "CHROME_BIN")]
    chrome_bin: Option<PathBuf>,

    /// Persistent browser profile directory
    #[arg(long)]
    user_data_dir: Option<PathBuf>,

    /// Stop after this many pages of saved jobs
    #[arg(long, default_value_t = 10)]
    max_pages: usize,

    /// Minimum delay between opening postings, in milliseconds
    #[arg(long, default_value_t = 2000)]
    delay_ms: u64,

    /// Minimum delay between list pages, in milliseconds
    #[arg(long, default_value_t = 3000)]
    page_delay_ms: u64,

    /// Maximum random jitter added to each delay, in milliseconds
    #[arg(long, default_value_t = 1000)]
    jitter_ms: u64,
}

#[derive(Args)]
struct ModelArgs {
    /// LLM model to use (e.g., "gpt-4o-mini", "gemini-2.5-flash")
    #[arg(short, long, env = "TAILOR_MODEL", default_value = "gpt-4o-mini")]
    model: String,

    /// OpenAI-compatible API base URL
    #[arg(
        short,
        long,
        env = "TAILOR_BASE_URL",
        default_value = "https://api.openai.com/v1"
    )]
    base_url: String,

    /// API key (reads from TAILOR_API_KEY env var if not provided)
    #[arg(short, long, env = "TAILOR_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Setup tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("tailor=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let store = FsArtifactStore::new(&cli.data_dir)
        .map_err(|e| anyhow::anyhow!(e))
        .with_context(|| format!("Cannot use data directory {}", cli.data_dir.display()))?;

    match cli.command {
        Commands::Extract { account, browser } => cmd_extract(account, browser, store).await?,
        Commands::Tailor {
            profile,
            job,
            reuse_decision,
            model,
        } => cmd_tailor(&profile, job.as_deref(), reuse_decision, model, store).await?,
        Commands::Run {
            profile,
            account,
            browser,
            model,
        } => cmd_run(&profile, account, browser, model, store).await?,
        Commands::Jobs { csv } => cmd_jobs(csv, &store)?,
    }

    Ok(())
}

impl AccountArgs {
    fn credentials(&self) -> Credentials {
        Credentials::new(&self.email, &self.password)
    }
}

impl BrowserArgs {
    fn launcher(&self) -> ChromeLauncher {
        let mut launcher = ChromeLauncher::new().with_headless(!self.headed);
        if let Some(bin) = &self.chrome_bin {
            launcher = launcher.with_chrome_bin(bin);
        }
        if let Some(dir) = &self.user_data_dir {
            launcher = launcher.with_user_data_dir(dir);
        }
        launcher
    }

    fn extract_config(&self) -> ExtractConfig {
        let throttle = ThrottleConfig::new(Duration::from_millis(self.delay_ms))
            .with_page_delay(Duration::from_millis(self.page_delay_ms))
            .with_jitter(Duration::from_millis(self.jitter_ms));
        ExtractConfig::default()
            .with_max_pages(self.max_pages)
            .with_throttle(throttle)
    }
}

impl ModelArgs {
    fn generator(&self) -> Result<OpenAiGenerator> {
        let api_key = self.api_key.clone().unwrap_or_default();
        if api_key.is_empty() {
            tracing::warn!("No API key set (TAILOR_API_KEY); only keyless local servers will work");
        }
        OpenAiGenerator::with_base_url(&api_key, &self.model, &self.base_url)
            .map_err(|e| anyhow::anyhow!(e))
            .context("Failed to create LLM client")
    }
}

fn read_profile(path: &Path) -> Result<ExperienceProfile> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read profile file: {}", path.display()))?;
    if text.trim().is_empty() {
        anyhow::bail!("Profile file {} is empty", path.display());
    }
    Ok(ExperienceProfile::new(text))
}

async fn cmd_extract(account: AccountArgs, browser: BrowserArgs, store: FsArtifactStore) -> Result<()> {
    let jobs_path = store.jobs_path();
    // No model call happens during extraction; the generator is never used.
    let generator = OpenAiGenerator::new("", "unused").map_err(|e| anyhow::anyhow!(e))?;
    let mut pipeline = Pipeline::new(browser.launcher(), generator, store)
        .with_extract_config(browser.extract_config());

    let summary = pipeline
        .run_extraction(&account.credentials())
        .await
        .map_err(|e| anyhow::anyhow!(e))?;

    println!(
        "Saved {} jobs ({} incomplete) to {}",
        summary.jobs.len(),
        summary.warnings,
        jobs_path.display()
    );
    Ok(())
}

async fn cmd_tailor(
    profile_path: &Path,
    job: Option<&str>,
    reuse_decision: bool,
    model: ModelArgs,
    store: FsArtifactStore,
) -> Result<()> {
    let profile = read_profile(profile_path)?;
    let tex_path = store.tex_path();
    let feedback_path = store.feedback_path();
    let mut pipeline = Pipeline::new(ChromeLauncher::new(), model.generator()?, store);

    if job.is_some() || reuse_decision {
        let document = pipeline
            .run_generation(&profile, job)
            .await
            .map_err(|e| anyhow::anyhow!(e))?;
        print_document(&document, &tex_path, &feedback_path);
    } else {
        let (decision, document) = pipeline
            .run_tailoring(&profile)
            .await
            .map_err(|e| anyhow::anyhow!(e))?;
        println!("Selected job {}: {}", decision.selected_job_id, decision.rationale);
        print_document(&document, &tex_path, &feedback_path);
    }
    Ok(())
}

async fn cmd_run(
    profile_path: &Path,
    account: AccountArgs,
    browser: BrowserArgs,
    model: ModelArgs,
    store: FsArtifactStore,
) -> Result<()> {
    let profile = read_profile(profile_path)?;
    let tex_path = store.tex_path();
    let feedback_path = store.feedback_path();
    let mut pipeline = Pipeline::new(browser.launcher(), model.generator()?, store)
        .with_extract_config(browser.extract_config());

    let outcome = pipeline
        .run_all(&account.credentials(), &profile)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;

    println!(
        "Read {} saved jobs ({} incomplete)",
        outcome.extraction.jobs.len(),
        outcome.extraction.warnings
    );
    println!(
        "Selected job {}: {}",
        outcome.decision.selected_job_id, outcome.decision.rationale
    );
    print_document(&outcome.document, &tex_path, &feedback_path);
    Ok(())
}

fn print_document(document: &tailor_core::Document, tex_path: &Path, feedback_path: &Path) {
    println!("Resume written to {}", tex_path.display());
    if document.repaired {
        println!("  (first draft needed a repair pass)");
    }
    if !document.gaps.is_empty() {
        println!("Requirements your profile does not cover:");
        for gap in &document.gaps {
            println!("  - {gap}");
        }
        println!("(also appended to {})", feedback_path.display());
    }
}

#[derive(Serialize)]
struct JobRow<'a> {
    id: &'a str,
    status: &'a str,
    title: &'a str,
    company: &'a str,
    location: &'a str,
    url: &'a str,
    scraped_at: String,
}

impl<'a> From<&'a Job> for JobRow<'a> {
    fn from(job: &'a Job) -> Self {
        Self {
            id: job.id(),
            status: job.extraction_status().as_str(),
            title: job.title(),
            company: job.company(),
            location: job.location(),
            url: job.url(),
            scraped_at: job.scraped_at().format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        }
    }
}

fn cmd_jobs(csv: bool, store: &FsArtifactStore) -> Result<()> {
    let Some(jobs) = store.load_jobs().map_err(|e| anyhow::anyhow!(e))? else {
        println!(
            "No saved jobs in {}. Run `tailor extract` first.",
            store.dir().display()
        );
        return Ok(());
    };

    if csv {
        let mut wtr = csv::Writer::from_writer(std::io::stdout());
        for job in &jobs {
            wtr.serialize(JobRow::from(job))?;
        }
        wtr.flush()?;
        return Ok(());
    }

    if jobs.is_empty() {
        println!("The last extraction found no saved jobs.");
        return Ok(());
    }

    for job in &jobs {
        let row = JobRow::from(job);
        println!(
            "  [{:<8}] {:<12} {} at {} ({})",
            row.status, row.id, row.title, row.company, row.location
        );
    }
    println!("\nTotal: {} jobs", jobs.len());
    Ok(())
}
