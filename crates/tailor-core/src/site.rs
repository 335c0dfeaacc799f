//! Selectors and URLs for the target site.
//!
//! Everything that breaks when the site ships a new front end lives here.
//! Comma-separated selectors are CSS selector groups (any match counts);
//! slices are tried in order and the first non-empty read wins.

/// URLs, selectors, and text markers for one site.
#[derive(Debug, Clone, Copy)]
pub struct SiteProfile {
    pub base_url: &'static str,
    pub login_url: &'static str,
    pub saved_jobs_url: &'static str,

    // Login form
    pub username_input: &'static str,
    pub password_input: &'static str,
    pub submit_button: &'static str,
    /// Present only once the user is signed in.
    pub signed_in_landmark: &'static str,
    pub login_error: &'static str,
    pub challenge_url_markers: &'static [&'static str],
    pub locked_text_markers: &'static [&'static str],

    // Block detection
    pub block_url_markers: &'static [&'static str],
    pub block_page: &'static str,

    // Saved-items list
    /// Shown when the list has finished rendering, with or without items.
    pub list_ready: &'static str,
    pub item_card: &'static str,
    pub card_link: &'static str,
    pub card_title: &'static [&'static str],
    pub card_company: &'static [&'static str],
    pub card_location: &'static [&'static str],
    pub next_page: &'static str,

    // Posting detail
    pub detail_ready: &'static str,
    pub detail_title: &'static [&'static str],
    pub detail_company: &'static [&'static str],
    pub detail_location: &'static [&'static str],
    pub see_more: &'static str,
    pub description_expanded: &'static str,
    pub description: &'static [&'static str],
}

impl SiteProfile {
    /// LinkedIn "My items → Saved jobs".
    pub const fn linkedin() -> Self {
        Self {
            base_url: "https://www.linkedin.com",
            login_url: "https://www.linkedin.com/login",
            saved_jobs_url: "https://www.linkedin.com/my-items/saved-jobs/",

            username_input: "#username",
            password_input: "#password",
            submit_button: "button[type='submit']",
            signed_in_landmark: "#global-nav, .global-nav__me, .feed-identity-module",
            login_error: "#error-for-username, #error-for-password, .alert-content, .form__label--error",
            challenge_url_markers: &["/checkpoint/challenge", "/checkpoint/lg/", "/two-step"],
            locked_text_markers: &["restricted", "locked", "suspended"],

            block_url_markers: &["/checkpoint/", "/authwall", "captcha"],
            block_page: "#captcha-internal, iframe[src*='captcha'], .challenge-dialog",

            list_ready: ".reusable-search__entity-result-list, .workflow-results-container, .artdeco-empty-state",
            item_card: "li.reusable-search__result-container, .entity-result",
            card_link: "a[href*='/jobs/view/']",
            card_title: &[
                ".entity-result__title-text a",
                ".entity-result__title-text",
                "a[href*='/jobs/view/']",
            ],
            card_company: &[".entity-result__primary-subtitle"],
            card_location: &[".entity-result__secondary-subtitle"],
            next_page: "button.artdeco-pagination__button--next:not([disabled])",

            detail_ready: ".jobs-description__container, .jobs-box__html-content, .job-details-module",
            detail_title: &[
                ".job-details-jobs-unified-top-card__job-title",
                "[data-test-id='job-details-job-title']",
                "h1",
            ],
            detail_company: &[
                ".job-details-jobs-unified-top-card__company-name",
                "[data-test-id='job-details-company-name']",
            ],
            detail_location: &[
                ".job-details-jobs-unified-top-card__primary-description-container .tvm__text",
                ".job-details-jobs-unified-top-card__bullet",
            ],
            see_more: "button.jobs-description__footer-button, button.show-more-less-html__button--more",
            description_expanded: ".jobs-description__content--expanded, .show-more-less-html__markup--expanded",
            description: &[
                ".jobs-description__container",
                ".jobs-box--fadein.jobs-box--full-width.jobs-box--with-cta-large.jobs-description",
                ".job-details-module",
                ".jobs-box__html-content",
            ],
        }
    }
}

impl Default for SiteProfile {
    fn default() -> Self {
        Self::linkedin()
    }
}
