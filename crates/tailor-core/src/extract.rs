use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use chrono::Utc;

use crate::error::AppError;
use crate::models::{Job, JobDraft, canonical_url, derive_job_id};
use crate::session::Session;
use crate::throttle::{Navigation, Pacer, ThrottleConfig};
use crate::traits::BrowserDriver;

/// Limits and pacing for one extraction run.
#[derive(Debug, Clone)]
pub struct ExtractConfig {
    /// Hard stop on pagination, whatever the UI claims.
    pub max_pages: usize,
    /// Upper bound for waiting on list or posting content.
    pub element_timeout: Duration,
    /// Upper bound for a "see more" expansion to show up.
    pub expand_timeout: Duration,
    pub throttle: ThrottleConfig,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            max_pages: 10,
            element_timeout: Duration::from_secs(10),
            expand_timeout: Duration::from_secs(3),
            throttle: ThrottleConfig::default(),
        }
    }
}

impl ExtractConfig {
    pub fn with_max_pages(mut self, pages: usize) -> Self {
        self.max_pages = pages.max(1);
        self
    }

    pub fn with_element_timeout(mut self, timeout: Duration) -> Self {
        self.element_timeout = timeout;
        self
    }

    pub fn with_throttle(mut self, throttle: ThrottleConfig) -> Self {
        self.throttle = throttle;
        self
    }
}

/// Walk the saved-jobs view of an open session.
///
/// Nothing is read until the returned cursor is polled.
pub fn extract<D: BrowserDriver + 'static>(
    session: &Session<D>,
    config: ExtractConfig,
) -> SavedJobs<'_, D> {
    SavedJobs {
        session,
        pacer: Pacer::new(config.throttle.clone()),
        config,
        cursor: Cursor::NotStarted,
        page: 0,
        page_url: String::new(),
        queue: VecDeque::new(),
        seen_ids: HashSet::new(),
        seen_urls: HashSet::new(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cursor {
    NotStarted,
    OnPage,
    Exhausted,
}

/// A saved item as read from its list card.
struct Card {
    index: usize,
    draft: JobDraft,
}

/// Lazy, finite, non-restartable sequence of saved jobs.
///
/// Each call to [`SavedJobs::next`] yields one job, an error that ends the
/// sequence, or `None` once the last page is done. Per-item problems never
/// end the sequence; they degrade that job's extraction status instead.
pub struct SavedJobs<'s, D: BrowserDriver + 'static> {
    session: &'s Session<D>,
    config: ExtractConfig,
    pacer: Pacer,
    cursor: Cursor,
    page: usize,
    page_url: String,
    queue: VecDeque<Card>,
    seen_ids: HashSet<String>,
    seen_urls: HashSet<String>,
}

/// Everything a drained [`SavedJobs`] produced.
#[derive(Debug)]
pub struct ExtractionRun {
    pub jobs: Vec<Job>,
    /// The error that ended extraction early, if any.
    pub stopped_by: Option<AppError>,
}

impl<D: BrowserDriver + 'static> SavedJobs<'_, D> {
    pub async fn next(&mut self) -> Option<Result<Job, AppError>> {
        while self.queue.is_empty() {
            let loaded = match self.cursor {
                Cursor::Exhausted => return None,
                Cursor::NotStarted => self.open_first_page().await,
                Cursor::OnPage => self.advance_page().await,
            };
            match loaded {
                // A page of already-seen cards still leads on to the next one.
                Ok(true) => {}
                Ok(false) => {
                    self.cursor = Cursor::Exhausted;
                    return None;
                }
                Err(e) => {
                    self.cursor = Cursor::Exhausted;
                    return Some(Err(e));
                }
            }
        }

        let card = self.queue.pop_front()?;
        match self.read_item(card).await {
            Ok(job) => Some(Ok(job)),
            Err(e) => {
                self.cursor = Cursor::Exhausted;
                self.queue.clear();
                Some(Err(e))
            }
        }
    }

    /// Drain the sequence, keeping every job produced before a stop.
    pub async fn collect_all(mut self) -> ExtractionRun {
        let mut jobs = Vec::new();
        let mut stopped_by = None;
        while let Some(item) = self.next().await {
            match item {
                Ok(job) => jobs.push(job),
                Err(e) => {
                    stopped_by = Some(e);
                    break;
                }
            }
        }
        ExtractionRun { jobs, stopped_by }
    }

    /// `false` when the saved view is empty.
    async fn open_first_page(&mut self) -> Result<bool, AppError> {
        let url = self.session.site().saved_jobs_url;
        tracing::info!(%url, "Opening saved jobs");
        self.pacer.pause(Navigation::Page).await;
        self.load_list(url).await?;
        self.cursor = Cursor::OnPage;
        let cards = self.harvest_page().await?;
        Ok(cards > 0)
    }

    /// Go back to the current list page and follow its "next" control.
    /// `false` when there is no further page.
    async fn advance_page(&mut self) -> Result<bool, AppError> {
        if self.page + 1 >= self.config.max_pages {
            tracing::info!(max_pages = self.config.max_pages, "Page limit reached");
            return Ok(false);
        }
        let driver = self.session.driver()?;
        let site = self.session.site();

        self.pacer.pause(Navigation::Page).await;
        let page_url = self.page_url.clone();
        self.load_list(&page_url).await?;

        let Some(next) = driver.find_all(site.next_page).await?.into_iter().next() else {
            tracing::info!(pages = self.page + 1, "No further pages");
            return Ok(false);
        };
        driver.click(&next).await?;
        self.page += 1;
        tracing::info!(page = self.page + 1, "Moved to next page");
        let cards = self.harvest_page().await?;
        Ok(cards > 0)
    }

    /// Navigate to a list page under the session's retry budget.
    async fn load_list(&self, url: &str) -> Result<(), AppError> {
        self.session
            .config()
            .retry
            .run("load saved jobs list", || async move {
                self.session.navigate(url).await?;
                self.await_list().await
            })
            .await
    }

    /// Wait for the list to render, failing fast on a block page.
    async fn await_list(&self) -> Result<(), AppError> {
        let driver = self.session.driver()?;
        self.check_blocked().await?;
        driver
            .wait_for(self.session.site().list_ready, self.config.element_timeout)
            .await?;
        self.check_blocked().await
    }

    /// Queue every card on the current list page not already queued in
    /// this run. Returns how many cards the page showed.
    async fn harvest_page(&mut self) -> Result<usize, AppError> {
        let driver = self.session.driver()?;
        let site = self.session.site();

        self.session
            .config()
            .retry
            .run("saved jobs list", || self.await_list())
            .await?;
        self.page_url = driver.current_url().await?;

        let cards = driver.find_all(site.item_card).await?;
        tracing::info!(page = self.page + 1, items = cards.len(), "Found saved items");

        for (index, card) in cards.iter().enumerate() {
            let mut draft = JobDraft::default();
            match self.read_card(card, &mut draft).await {
                Ok(()) => {}
                Err(e @ (AppError::BlockedError(_) | AppError::DriverError(_))) => return Err(e),
                Err(e) => draft.issues.push(format!("card: {e}")),
            }
            if !draft.url.is_empty() && !self.seen_urls.insert(draft.url.clone()) {
                tracing::debug!(url = %draft.url, "Skipping posting already listed");
                continue;
            }
            self.queue.push_back(Card { index, draft });
        }
        Ok(cards.len())
    }

    async fn read_card(&self, card: &D::Element, draft: &mut JobDraft) -> Result<(), AppError> {
        let driver = self.session.driver()?;
        let site = self.session.site();

        if let Some(link) = driver.find_within(card, site.card_link).await?.first() {
            if let Some(href) = driver.attribute(link, "href").await? {
                draft.url = canonical_url(&href, site.base_url).unwrap_or_default();
            }
        }
        draft.title = first_text_within(driver, card, site.card_title).await?;
        draft.company = first_text_within(driver, card, site.card_company).await?;
        draft.location = first_text_within(driver, card, site.card_location).await?;
        Ok(())
    }

    /// Visit one posting and fill in what the card did not have. Only a
    /// block or a dead browser escapes; anything else is noted on the job.
    async fn read_item(&mut self, card: Card) -> Result<Job, AppError> {
        let Card { index, mut draft } = card;

        if draft.url.is_empty() {
            draft.issues.push("no posting link on card".into());
        } else {
            self.pacer.pause(Navigation::Item).await;
            match self.read_detail(&mut draft).await {
                Ok(()) => {}
                Err(e @ (AppError::BlockedError(_) | AppError::DriverError(_))) => return Err(e),
                Err(e) => draft.issues.push(format!("detail: {e}")),
            }
        }

        let url = (!draft.url.is_empty()).then_some(draft.url.as_str());
        let id = self.unique_id(derive_job_id(url, self.page, index));
        let job = draft.into_job(id, Utc::now());

        if job.issues().is_empty() {
            tracing::info!(job_id = %job.id(), title = %job.title(), "Extracted job");
        } else {
            tracing::warn!(
                job_id = %job.id(),
                status = %job.extraction_status(),
                issues = ?job.issues(),
                "Extracted job with problems"
            );
        }
        Ok(job)
    }

    async fn read_detail(&self, draft: &mut JobDraft) -> Result<(), AppError> {
        let driver = self.session.driver()?;
        let site = self.session.site();

        self.session.navigate(&draft.url).await?;
        self.check_blocked().await?;
        driver
            .wait_for(site.detail_ready, self.config.element_timeout)
            .await?;

        if draft.title.is_empty() {
            draft.title = first_text(driver, site.detail_title).await?;
        }
        if draft.company.is_empty() {
            draft.company = first_text(driver, site.detail_company).await?;
        }
        if draft.location.is_empty() {
            draft.location = first_text(driver, site.detail_location).await?;
        }

        self.expand_description().await;
        draft.description = first_text(driver, site.description).await?;
        if draft.description.is_empty() {
            draft.issues.push("description not found".into());
        }
        Ok(())
    }

    /// Click "see more" when present. Failure here only means we read the
    /// collapsed text.
    async fn expand_description(&self) {
        let Ok(driver) = self.session.driver() else {
            return;
        };
        let site = self.session.site();

        let button = match driver.find_all(site.see_more).await {
            Ok(found) => found.into_iter().next(),
            Err(e) => {
                tracing::debug!(error = %e, "Could not look for see-more control");
                None
            }
        };
        let Some(button) = button else {
            return;
        };
        if let Err(e) = driver.click(&button).await {
            tracing::debug!(error = %e, "See-more click failed, reading visible text");
            return;
        }
        if let Err(e) = driver
            .wait_for(site.description_expanded, self.config.expand_timeout)
            .await
        {
            tracing::debug!(error = %e, "Expansion not confirmed, reading visible text");
        }
    }

    async fn check_blocked(&self) -> Result<(), AppError> {
        let driver = self.session.driver()?;
        let site = self.session.site();

        let url = driver.current_url().await?;
        if let Some(marker) = site.block_url_markers.iter().find(|m| url.contains(*m)) {
            return Err(AppError::BlockedError(format!(
                "redirected to {url} (matched '{marker}')"
            )));
        }
        if !driver.find_all(site.block_page).await?.is_empty() {
            return Err(AppError::BlockedError(format!("challenge page at {url}")));
        }
        Ok(())
    }

    fn unique_id(&mut self, base: String) -> String {
        let mut id = base.clone();
        let mut n = 2;
        while !self.seen_ids.insert(id.clone()) {
            id = format!("{base}-{n}");
            n += 1;
        }
        id
    }
}

/// Text of the first selector that yields a non-empty string.
async fn first_text<D: BrowserDriver>(driver: &D, selectors: &[&str]) -> Result<String, AppError> {
    for selector in selectors {
        for el in driver.find_all(selector).await? {
            let text = driver.read_text(&el).await?;
            if !text.trim().is_empty() {
                return Ok(text.trim().to_string());
            }
        }
    }
    Ok(String::new())
}

async fn first_text_within<D: BrowserDriver>(
    driver: &D,
    parent: &D::Element,
    selectors: &[&str],
) -> Result<String, AppError> {
    for selector in selectors {
        for el in driver.find_within(parent, selector).await? {
            let text = driver.read_text(&el).await?;
            if !text.trim().is_empty() {
                return Ok(text.trim().to_string());
            }
        }
    }
    Ok(String::new())
}
