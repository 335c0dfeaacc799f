use std::time::Duration;

use crate::error::{AppError, AuthFailure};
use crate::models::Credentials;
use crate::retry::RetryPolicy;
use crate::site::SiteProfile;
use crate::traits::{BrowserDriver, DriverLauncher};

/// Timeouts and retry budget for a browser session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Upper bound for one element wait (login form, post-login landmark).
    pub element_timeout: Duration,
    /// Upper bound for one page navigation.
    pub navigation_timeout: Duration,
    /// Budget for transient waits during login.
    pub retry: RetryPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            element_timeout: Duration::from_secs(15),
            navigation_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }
}

impl SessionConfig {
    pub fn with_element_timeout(mut self, timeout: Duration) -> Self {
        self.element_timeout = timeout;
        self
    }

    pub fn with_navigation_timeout(mut self, timeout: Duration) -> Self {
        self.navigation_timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// An authenticated browser session against the target site.
///
/// Exclusively owns the driver. [`Session::close`] is idempotent; a session
/// dropped while still open schedules the driver shutdown on the current
/// Tokio runtime so no browser outlives the pipeline.
pub struct Session<D: BrowserDriver + 'static> {
    driver: Option<D>,
    site: SiteProfile,
    config: SessionConfig,
}

impl<D: BrowserDriver + 'static> Session<D> {
    /// Launch a browser, sign in, and wait for the signed-in landmark.
    ///
    /// On any failure after launch the browser is shut down before the
    /// error is returned.
    pub async fn open<L>(
        launcher: &L,
        credentials: &Credentials,
        site: SiteProfile,
        config: SessionConfig,
    ) -> Result<Self, AppError>
    where
        L: DriverLauncher<Driver = D>,
    {
        let driver = launcher.launch().await.map_err(|e| match e {
            AppError::DriverError(_) => e,
            other => AppError::DriverError(other.to_string()),
        })?;
        tracing::info!("Browser launched");

        let mut session = Self {
            driver: Some(driver),
            site,
            config,
        };

        match session.login(credentials).await {
            Ok(()) => {
                tracing::info!(email = %credentials.email, "Signed in");
                Ok(session)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Sign-in failed, closing browser");
                session.close().await;
                Err(e)
            }
        }
    }

    pub fn is_open(&self) -> bool {
        self.driver.is_some()
    }

    pub fn site(&self) -> &SiteProfile {
        &self.site
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The underlying driver, or a `DriverError` once the session is closed.
    pub fn driver(&self) -> Result<&D, AppError> {
        self.driver
            .as_ref()
            .ok_or_else(|| AppError::DriverError("browser session is closed".into()))
    }

    /// Navigate with the configured upper bound.
    pub async fn navigate(&self, url: &str) -> Result<(), AppError> {
        let driver = self.driver()?;
        let timeout = self.config.navigation_timeout;
        match tokio::time::timeout(timeout, driver.navigate(url)).await {
            Ok(result) => result,
            Err(_) => Err(AppError::TransientError(format!(
                "navigation to {url} did not finish within {}s",
                timeout.as_secs()
            ))),
        }
    }

    /// Shut the browser down. Safe to call any number of times.
    pub async fn close(&mut self) {
        if let Some(mut driver) = self.driver.take() {
            match driver.quit().await {
                Ok(()) => tracing::info!("Browser closed"),
                Err(e) => tracing::warn!(error = %e, "Browser did not shut down cleanly"),
            }
        }
    }

    async fn login(&self, credentials: &Credentials) -> Result<(), AppError> {
        let driver = self.driver()?;
        let site = &self.site;
        let timeout = self.config.element_timeout;

        self.config
            .retry
            .run("open login page", || async move {
                self.navigate(site.login_url).await?;
                driver.wait_for(site.username_input, timeout).await
            })
            .await?;

        let username = driver.wait_for(site.username_input, timeout).await?;
        driver.type_text(&username, &credentials.email).await?;
        let password = driver.wait_for(site.password_input, timeout).await?;
        driver.type_text(&password, &credentials.password).await?;
        let submit = driver.wait_for(site.submit_button, timeout).await?;
        driver.click(&submit).await?;

        self.config
            .retry
            .run("signed-in landmark", || self.await_landmark())
            .await
    }

    /// One bounded wait for the signed-in landmark. A timeout becomes an
    /// `AuthError` when the page explains why, and stays transient otherwise.
    async fn await_landmark(&self) -> Result<(), AppError> {
        let driver = self.driver()?;
        match driver
            .wait_for(self.site.signed_in_landmark, self.config.element_timeout)
            .await
        {
            Ok(_) => Ok(()),
            Err(AppError::TransientError(msg)) => match self.detect_auth_failure().await? {
                Some(failure) => Err(AppError::AuthError(failure)),
                None => Err(AppError::TransientError(msg)),
            },
            Err(e) => Err(e),
        }
    }

    async fn detect_auth_failure(&self) -> Result<Option<AuthFailure>, AppError> {
        let driver = self.driver()?;
        let site = &self.site;

        let url = driver.current_url().await?;
        if site.challenge_url_markers.iter().any(|m| url.contains(m)) {
            return Ok(Some(AuthFailure::Challenge));
        }

        let mut messages = Vec::new();
        for el in driver.find_all(site.login_error).await? {
            let text = driver.read_text(&el).await?;
            let text = text.trim();
            if !text.is_empty() {
                messages.push(text.to_string());
            }
        }
        if messages.is_empty() {
            return Ok(None);
        }

        let joined = messages.join("; ");
        let lowered = joined.to_lowercase();
        if site.locked_text_markers.iter().any(|m| lowered.contains(m)) {
            Ok(Some(AuthFailure::AccountLocked))
        } else {
            Ok(Some(AuthFailure::BadCredentials(joined)))
        }
    }
}

impl<D: BrowserDriver + 'static> Drop for Session<D> {
    fn drop(&mut self) {
        let Some(mut driver) = self.driver.take() else {
            return;
        };
        tracing::warn!("Session dropped while open; shutting browser down in the background");
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = driver.quit().await {
                        tracing::warn!(error = %e, "Background browser shutdown failed");
                    }
                });
            }
            Err(_) => {
                tracing::error!("No async runtime available; browser left to the driver's own drop");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::*;

    fn creds() -> Credentials {
        Credentials::new("me@example.com", "secret")
    }

    fn fast_config() -> SessionConfig {
        SessionConfig::default()
            .with_element_timeout(Duration::from_secs(2))
            .with_retry(RetryPolicy::default().with_base_delay(Duration::from_millis(10)))
    }

    #[tokio::test(start_paused = true)]
    async fn open_signs_in_and_close_is_idempotent() {
        let launcher = MockLauncher::new(login_site(LoginOutcome::Success));
        let mut session = Session::open(&launcher, &creds(), test_site(), fast_config())
            .await
            .unwrap();

        assert!(session.is_open());
        let typed = launcher.typed();
        assert!(typed.contains(&"me@example.com".to_string()));
        assert!(typed.contains(&"secret".to_string()));

        session.close().await;
        session.close().await;
        assert!(!session.is_open());
        assert_eq!(launcher.launches(), 1);
        assert_eq!(launcher.quits(), 1);
        assert!(matches!(session.driver(), Err(AppError::DriverError(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn bad_credentials_surface_reason_and_close_browser() {
        let launcher = MockLauncher::new(login_site(LoginOutcome::WrongPassword));
        let err = Session::open(&launcher, &creds(), test_site(), fast_config())
            .await
            .err()
            .unwrap();

        match err {
            AppError::AuthError(AuthFailure::BadCredentials(msg)) => {
                assert!(msg.contains("Wrong password"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(launcher.launches(), launcher.quits());
    }

    #[tokio::test(start_paused = true)]
    async fn verification_checkpoint_is_a_challenge() {
        let launcher = MockLauncher::new(login_site(LoginOutcome::Challenge));
        let err = Session::open(&launcher, &creds(), test_site(), fast_config())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, AppError::AuthError(AuthFailure::Challenge)));
        assert_eq!(launcher.launches(), launcher.quits());
    }

    #[tokio::test(start_paused = true)]
    async fn restricted_account_is_reported_as_locked() {
        let launcher = MockLauncher::new(login_site(LoginOutcome::Locked));
        let err = Session::open(&launcher, &creds(), test_site(), fast_config())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, AppError::AuthError(AuthFailure::AccountLocked)));
        assert_eq!(launcher.launches(), launcher.quits());
    }

    #[tokio::test(start_paused = true)]
    async fn missing_landmark_retries_then_surfaces_transient() {
        let launcher = MockLauncher::new(login_site(LoginOutcome::Hang));
        let err = Session::open(&launcher, &creds(), test_site(), fast_config())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, AppError::TransientError(_)));
        assert_eq!(launcher.launches(), 1);
        assert_eq!(launcher.quits(), 1);
    }

    #[tokio::test]
    async fn launch_failure_is_a_driver_error() {
        let launcher = MockLauncher::failing("chrome not found");
        let err = Session::open(&launcher, &creds(), test_site(), fast_config())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, AppError::DriverError(_)));
        assert_eq!(launcher.launches(), 0);
        assert_eq!(launcher.quits(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_session_still_quits_browser() {
        let launcher = MockLauncher::new(login_site(LoginOutcome::Success));
        let session = Session::open(&launcher, &creds(), test_site(), fast_config())
            .await
            .unwrap();
        drop(session);
        tokio::task::yield_now().await;
        assert_eq!(launcher.quits(), 1);
    }
}
