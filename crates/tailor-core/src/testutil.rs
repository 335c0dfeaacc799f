//! Test utilities: mock implementations of all core traits.
//!
//! Handwritten mocks for dependency injection in unit tests.
//! All mocks use `Arc<Mutex<_>>` for interior mutability, allowing
//! test assertions on recorded calls.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use chrono::Utc;

use crate::error::AppError;
use crate::models::{Document, FitDecision, Job, JobDraft};
use crate::site::SiteProfile;
use crate::traits::{ArtifactStore, BrowserDriver, DriverLauncher, Prompt, TextGenerator};

// ---------------------------------------------------------------------------
// Scripted site
// ---------------------------------------------------------------------------

pub const BASE_URL: &str = "https://jobs.test";
pub const LOGIN_URL: &str = "https://jobs.test/login";
pub const SAVED_URL: &str = "https://jobs.test/saved";

/// A site profile with short selectors matching the mock pages below.
pub fn test_site() -> SiteProfile {
    SiteProfile {
        base_url: BASE_URL,
        login_url: LOGIN_URL,
        saved_jobs_url: SAVED_URL,
        username_input: "#user",
        password_input: "#pass",
        submit_button: "#submit",
        signed_in_landmark: "#nav",
        login_error: "#login-error",
        challenge_url_markers: &["/checkpoint/"],
        locked_text_markers: &["restricted"],
        block_url_markers: &["/blocked"],
        block_page: "#captcha",
        list_ready: "#list, #empty",
        item_card: ".card",
        card_link: ".card-link",
        card_title: &[".card-title"],
        card_company: &[".card-company"],
        card_location: &[".card-location"],
        next_page: "#next",
        detail_ready: "#description",
        detail_title: &["h1"],
        detail_company: &[".company"],
        detail_location: &[".location"],
        see_more: "#see-more",
        description_expanded: "#description-full",
        description: &["#description-full", "#description"],
    }
}

/// What clicking a mock element does.
#[derive(Debug, Clone)]
pub enum ClickAction {
    Navigate(String),
    /// Reveal the current page's `hidden_until_expand` nodes.
    Expand,
    Fail,
}

/// One element on a scripted page.
#[derive(Debug, Clone, Default)]
pub struct MockNode {
    selectors: Vec<String>,
    text: String,
    attributes: HashMap<String, String>,
    children: Vec<MockNode>,
    on_click: Option<ClickAction>,
    hidden_until_expand: bool,
}

impl MockNode {
    pub fn new(selector: &str) -> Self {
        Self {
            selectors: vec![selector.to_string()],
            ..Default::default()
        }
    }

    pub fn text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attributes.insert(name.to_string(), value.to_string());
        self
    }

    pub fn child(mut self, child: MockNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn on_click(mut self, action: ClickAction) -> Self {
        self.on_click = Some(action);
        self
    }

    pub fn hidden_until_expand(mut self) -> Self {
        self.hidden_until_expand = true;
        self
    }

    /// Selector groups match when any comma-separated part is one of ours.
    fn matches(&self, selector: &str) -> bool {
        selector
            .split(',')
            .map(str::trim)
            .any(|part| self.selectors.iter().any(|own| own == part))
    }
}

/// Pages keyed by URL.
#[derive(Debug, Clone, Default)]
pub struct MockSite {
    pages: HashMap<String, Vec<MockNode>>,
    failing: HashSet<String>,
    /// Remaining failed navigations per URL.
    flaky: Arc<Mutex<HashMap<String, usize>>>,
}

impl MockSite {
    pub fn page(mut self, url: &str, nodes: Vec<MockNode>) -> Self {
        self.pages.insert(url.to_string(), nodes);
        self
    }

    /// Navigating to `url` fails with a transient error.
    pub fn failing_page(mut self, url: &str) -> Self {
        self.failing.insert(url.to_string());
        self
    }

    /// The first `failures` navigations to `url` fail with a transient
    /// error; later ones serve the page normally.
    pub fn flaky_page(self, url: &str, failures: usize) -> Self {
        self.flaky.lock().unwrap().insert(url.to_string(), failures);
        self
    }
}

/// How the scripted login form responds to a submit.
#[derive(Debug, Clone, Copy)]
pub enum LoginOutcome {
    Success,
    WrongPassword,
    Challenge,
    Locked,
    /// Lands on a page that never shows the landmark or an error.
    Hang,
}

/// A site whose login form leads to the page matching `outcome`.
pub fn login_site(outcome: LoginOutcome) -> MockSite {
    let target = match outcome {
        LoginOutcome::Success => "https://jobs.test/feed",
        LoginOutcome::WrongPassword => "https://jobs.test/login-submit",
        LoginOutcome::Challenge => "https://jobs.test/checkpoint/challenge/1",
        LoginOutcome::Locked => "https://jobs.test/login-locked",
        LoginOutcome::Hang => "https://jobs.test/loading",
    };
    MockSite::default()
        .page(
            LOGIN_URL,
            vec![
                MockNode::new("#user"),
                MockNode::new("#pass"),
                MockNode::new("#submit").on_click(ClickAction::Navigate(target.to_string())),
            ],
        )
        .page("https://jobs.test/feed", vec![MockNode::new("#nav")])
        .page(
            "https://jobs.test/login-submit",
            vec![
                MockNode::new("#user"),
                MockNode::new("#login-error").text("Wrong password. Try again."),
            ],
        )
        .page(
            "https://jobs.test/login-locked",
            vec![MockNode::new("#login-error").text("Your account has been restricted.")],
        )
        .page("https://jobs.test/checkpoint/challenge/1", vec![])
        .page("https://jobs.test/loading", vec![])
}

pub fn posting_url(posting: &str) -> String {
    format!("{BASE_URL}/jobs/view/{posting}/")
}

/// A saved-list card linking to [`posting_url`] with a tracking query.
pub fn card(posting: &str, title: &str, company: &str, location: &str) -> MockNode {
    MockNode::new(".card")
        .child(MockNode::new(".card-link").attr("href", &format!("/jobs/view/{posting}/?trk=saved")))
        .child(MockNode::new(".card-title").text(title))
        .child(MockNode::new(".card-company").text(company))
        .child(MockNode::new(".card-location").text(location))
}

/// A rendered saved list, with a "next" control when `next` is given.
pub fn saved_list(cards: Vec<MockNode>, next: Option<&str>) -> Vec<MockNode> {
    let mut nodes = vec![MockNode::new("#list")];
    nodes.extend(cards);
    if let Some(next) = next {
        nodes.push(MockNode::new("#next").on_click(ClickAction::Navigate(next.to_string())));
    }
    nodes
}

pub fn empty_list() -> Vec<MockNode> {
    vec![MockNode::new("#empty")]
}

/// A posting page. With `full`, the visible text is a teaser and the full
/// description appears after clicking "see more".
pub fn detail_page(visible: &str, full: Option<&str>) -> Vec<MockNode> {
    let mut nodes = vec![MockNode::new("#description").text(visible)];
    if let Some(full) = full {
        nodes.push(MockNode::new("#see-more").on_click(ClickAction::Expand));
        nodes.push(
            MockNode::new("#description-full")
                .text(full)
                .hidden_until_expand(),
        );
    }
    nodes
}

// ---------------------------------------------------------------------------
// MockDriver / MockLauncher
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Recorder {
    launches: usize,
    quits: usize,
    typed: Vec<String>,
    visits: Vec<String>,
}

/// Browser driver that walks a [`MockSite`].
pub struct MockDriver {
    site: Arc<MockSite>,
    recorder: Arc<Mutex<Recorder>>,
    current: Mutex<String>,
    expanded: Mutex<HashSet<String>>,
}

impl MockDriver {
    fn go(&self, url: &str) {
        *self.current.lock().unwrap() = url.to_string();
        self.recorder.lock().unwrap().visits.push(url.to_string());
    }

    fn visible(&self, node: &MockNode) -> bool {
        !node.hidden_until_expand
            || self
                .expanded
                .lock()
                .unwrap()
                .contains(self.current.lock().unwrap().as_str())
    }

    fn collect(&self, nodes: &[MockNode], selector: &str, found: &mut Vec<MockNode>) {
        for node in nodes.iter().filter(|n| self.visible(n)) {
            if node.matches(selector) {
                found.push(node.clone());
            }
            self.collect(&node.children, selector, found);
        }
    }
}

impl BrowserDriver for MockDriver {
    type Element = MockNode;

    async fn navigate(&self, url: &str) -> Result<(), AppError> {
        if self.site.failing.contains(url) {
            return Err(AppError::TransientError(format!("navigation to {url} failed")));
        }
        if let Some(left) = self.site.flaky.lock().unwrap().get_mut(url) {
            if *left > 0 {
                *left -= 1;
                return Err(AppError::TransientError(format!("navigation to {url} timed out")));
            }
        }
        self.go(url);
        Ok(())
    }

    async fn current_url(&self) -> Result<String, AppError> {
        Ok(self.current.lock().unwrap().clone())
    }

    async fn find_all(&self, selector: &str) -> Result<Vec<MockNode>, AppError> {
        let current = self.current.lock().unwrap().clone();
        let mut found = Vec::new();
        if let Some(nodes) = self.site.pages.get(&current) {
            self.collect(nodes, selector, &mut found);
        }
        Ok(found)
    }

    async fn find_within(&self, parent: &MockNode, selector: &str) -> Result<Vec<MockNode>, AppError> {
        let mut found = Vec::new();
        self.collect(&parent.children, selector, &mut found);
        Ok(found)
    }

    async fn click(&self, element: &MockNode) -> Result<(), AppError> {
        match &element.on_click {
            Some(ClickAction::Navigate(url)) => self.go(url),
            Some(ClickAction::Expand) => {
                let current = self.current.lock().unwrap().clone();
                self.expanded.lock().unwrap().insert(current);
            }
            Some(ClickAction::Fail) => {
                return Err(AppError::TransientError("element click intercepted".into()));
            }
            None => {}
        }
        Ok(())
    }

    async fn type_text(&self, _element: &MockNode, text: &str) -> Result<(), AppError> {
        self.recorder.lock().unwrap().typed.push(text.to_string());
        Ok(())
    }

    async fn read_text(&self, element: &MockNode) -> Result<String, AppError> {
        Ok(element.text.clone())
    }

    async fn attribute(&self, element: &MockNode, name: &str) -> Result<Option<String>, AppError> {
        Ok(element.attributes.get(name).cloned())
    }

    async fn quit(&mut self) -> Result<(), AppError> {
        self.recorder.lock().unwrap().quits += 1;
        Ok(())
    }
}

/// Launches [`MockDriver`]s over a shared site and records what they did.
#[derive(Clone)]
pub struct MockLauncher {
    site: Arc<MockSite>,
    recorder: Arc<Mutex<Recorder>>,
    failure: Option<String>,
}

impl MockLauncher {
    pub fn new(site: MockSite) -> Self {
        Self {
            site: Arc::new(site),
            recorder: Arc::new(Mutex::new(Recorder::default())),
            failure: None,
        }
    }

    /// A launcher whose browser never starts.
    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::new(MockSite::default())
        }
    }

    pub fn launches(&self) -> usize {
        self.recorder.lock().unwrap().launches
    }

    pub fn quits(&self) -> usize {
        self.recorder.lock().unwrap().quits
    }

    pub fn typed(&self) -> Vec<String> {
        self.recorder.lock().unwrap().typed.clone()
    }

    pub fn visits(&self) -> Vec<String> {
        self.recorder.lock().unwrap().visits.clone()
    }
}

impl DriverLauncher for MockLauncher {
    type Driver = MockDriver;

    async fn launch(&self) -> Result<MockDriver, AppError> {
        if let Some(message) = &self.failure {
            return Err(AppError::DriverError(message.clone()));
        }
        self.recorder.lock().unwrap().launches += 1;
        Ok(MockDriver {
            site: self.site.clone(),
            recorder: self.recorder.clone(),
            current: Mutex::new("about:blank".to_string()),
            expanded: Mutex::new(HashSet::new()),
        })
    }
}

// ---------------------------------------------------------------------------
// MockGenerator
// ---------------------------------------------------------------------------

/// Text generator that replays queued responses and records every prompt.
#[derive(Clone)]
pub struct MockGenerator {
    /// Queue of responses. Each call pops the first element.
    /// If empty, returns an empty string.
    responses: Arc<Mutex<Vec<Result<String, AppError>>>>,
    prompts: Arc<Mutex<Vec<Prompt>>>,
}

impl MockGenerator {
    pub fn new(response: &str) -> Self {
        Self::with_responses(vec![Ok(response.to_string())])
    }

    pub fn with_error(error: AppError) -> Self {
        Self::with_responses(vec![Err(error)])
    }

    pub fn with_responses(responses: Vec<Result<String, AppError>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompts(&self) -> Vec<Prompt> {
        self.prompts.lock().unwrap().clone()
    }
}

impl TextGenerator for MockGenerator {
    async fn complete(&self, prompt: &Prompt) -> Result<String, AppError> {
        self.prompts.lock().unwrap().push(prompt.clone());
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok(String::new())
        } else {
            responses.remove(0)
        }
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// In-memory artifact store for testing.
#[derive(Clone, Default)]
pub struct MemoryStore {
    jobs: Arc<Mutex<Option<Vec<Job>>>>,
    decision: Arc<Mutex<Option<FitDecision>>>,
    documents: Arc<Mutex<Vec<Document>>>,
    feedback: Arc<Mutex<Vec<String>>>,
}

impl MemoryStore {
    pub fn with_jobs(jobs: Vec<Job>) -> Self {
        let store = Self::default();
        *store.jobs.lock().unwrap() = Some(jobs);
        store
    }

    pub fn jobs(&self) -> Option<Vec<Job>> {
        self.jobs.lock().unwrap().clone()
    }

    pub fn decision(&self) -> Option<FitDecision> {
        self.decision.lock().unwrap().clone()
    }

    pub fn documents(&self) -> Vec<Document> {
        self.documents.lock().unwrap().clone()
    }

    pub fn feedback(&self) -> Vec<String> {
        self.feedback.lock().unwrap().clone()
    }
}

impl ArtifactStore for MemoryStore {
    fn save_jobs(&self, jobs: &[Job]) -> Result<(), AppError> {
        *self.jobs.lock().unwrap() = Some(jobs.to_vec());
        Ok(())
    }

    fn load_jobs(&self) -> Result<Option<Vec<Job>>, AppError> {
        Ok(self.jobs.lock().unwrap().clone())
    }

    fn save_decision(&self, decision: &FitDecision) -> Result<(), AppError> {
        *self.decision.lock().unwrap() = Some(decision.clone());
        Ok(())
    }

    fn load_decision(&self) -> Result<Option<FitDecision>, AppError> {
        Ok(self.decision.lock().unwrap().clone())
    }

    fn save_document(&self, document: &Document) -> Result<(), AppError> {
        self.documents.lock().unwrap().push(document.clone());
        Ok(())
    }

    fn append_feedback(&self, lines: &[String]) -> Result<(), AppError> {
        self.feedback.lock().unwrap().extend_from_slice(lines);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// A complete job with a LinkedIn-style posting URL.
pub fn make_job(id: &str, title: &str, company: &str, description: &str) -> Job {
    JobDraft {
        title: title.to_string(),
        company: company.to_string(),
        location: "Remote".to_string(),
        description: description.to_string(),
        url: format!("https://www.linkedin.com/jobs/view/{id}/"),
        issues: Vec::new(),
    }
    .into_job(id.to_string(), Utc::now())
}
