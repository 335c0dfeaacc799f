use std::path::PathBuf;
use std::time::Duration;

use chromiumoxide::error::CdpError;
use chromiumoxide::{Browser, BrowserConfig, Element, Page};
use futures::StreamExt;
use tailor_core::error::AppError;
use tailor_core::traits::{BrowserDriver, DriverLauncher};
use tokio::task::JoinHandle;

/// Starts Chromium instances over the Chrome DevTools Protocol.
///
/// Each [`DriverLauncher::launch`] starts a separate browser process with
/// one tab. Headless by default; a visible window helps when the site asks
/// for a verification step the user has to complete by hand.
#[derive(Debug, Clone)]
pub struct ChromeLauncher {
    headless: bool,
    chrome_bin: Option<PathBuf>,
    user_data_dir: Option<PathBuf>,
    launch_timeout: Duration,
}

impl Default for ChromeLauncher {
    fn default() -> Self {
        Self::new()
    }
}

impl ChromeLauncher {
    pub fn new() -> Self {
        Self {
            headless: true,
            chrome_bin: None,
            user_data_dir: None,
            launch_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Use this binary instead of searching for one.
    pub fn with_chrome_bin(mut self, path: impl Into<PathBuf>) -> Self {
        self.chrome_bin = Some(path.into());
        self
    }

    /// Keep the browser profile here, so cookies survive between runs.
    pub fn with_user_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.user_data_dir = Some(dir.into());
        self
    }

    pub fn with_launch_timeout(mut self, timeout: Duration) -> Self {
        self.launch_timeout = timeout;
        self
    }

    fn config(&self) -> Result<BrowserConfig, AppError> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .disable_default_args()
            .launch_timeout(self.launch_timeout)
            .window_size(1366, 900);

        // Snap-packaged Chromium exposes a wrapper that rejects standard
        // Chrome CLI flags, so prefer the real binary when one is found.
        if let Some(bin) = self.chrome_bin.clone().or_else(find_chrome_binary) {
            tracing::info!("Using Chrome binary: {}", bin.display());
            builder = builder.chrome_executable(bin);
        }
        if let Some(dir) = &self.user_data_dir {
            builder = builder.user_data_dir(dir);
        }
        if self.headless {
            builder = builder.arg("--headless=new");
        } else {
            builder = builder.with_head();
        }

        builder
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-popup-blocking")
            .arg("--disable-translate")
            .arg("--no-first-run")
            .arg("--lang=en-US")
            .build()
            .map_err(|e| AppError::DriverError(format!("Browser config error: {e}")))
    }
}

impl DriverLauncher for ChromeLauncher {
    type Driver = ChromeDriver;

    async fn launch(&self) -> Result<ChromeDriver, AppError> {
        let (mut browser, mut handler) = Browser::launch(self.config()?)
            .await
            .map_err(|e| AppError::DriverError(format!("Failed to launch browser: {e}")))?;

        // The CDP handler must be polled continuously for the connection to work.
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    tracing::warn!("Browser CDP handler error: {event:?}");
                    break;
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                let _ = browser.close().await;
                let _ = browser.wait().await;
                handler.abort();
                return Err(AppError::DriverError(format!("Failed to open tab: {e}")));
            }
        };

        Ok(ChromeDriver {
            browser,
            page,
            handler,
        })
    }
}

/// One Chromium process driven through a single tab.
pub struct ChromeDriver {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
}

/// A dead connection means the browser is gone; anything else is worth
/// another try.
fn map_cdp(context: &str, e: CdpError) -> AppError {
    match e {
        CdpError::Ws(_) | CdpError::ChannelSendError(_) | CdpError::NoResponse => {
            AppError::DriverError(format!("{context}: {e}"))
        }
        other => AppError::TransientError(format!("{context}: {other}")),
    }
}

impl BrowserDriver for ChromeDriver {
    type Element = Element;

    async fn navigate(&self, url: &str) -> Result<(), AppError> {
        self.page
            .goto(url)
            .await
            .map_err(|e| map_cdp(&format!("navigation to {url}"), e))?;
        Ok(())
    }

    async fn current_url(&self) -> Result<String, AppError> {
        let url = self
            .page
            .url()
            .await
            .map_err(|e| map_cdp("reading current url", e))?;
        Ok(url.unwrap_or_default())
    }

    async fn find_all(&self, selector: &str) -> Result<Vec<Element>, AppError> {
        match self.page.find_elements(selector).await {
            Ok(found) => Ok(found),
            Err(CdpError::NotFound) => Ok(Vec::new()),
            Err(e) => Err(map_cdp(&format!("querying '{selector}'"), e)),
        }
    }

    async fn find_within(&self, parent: &Element, selector: &str) -> Result<Vec<Element>, AppError> {
        match parent.find_elements(selector).await {
            Ok(found) => Ok(found),
            Err(CdpError::NotFound) => Ok(Vec::new()),
            Err(e) => Err(map_cdp(&format!("querying '{selector}' in element"), e)),
        }
    }

    async fn click(&self, element: &Element) -> Result<(), AppError> {
        element
            .click()
            .await
            .map_err(|e| map_cdp("click", e))?;
        Ok(())
    }

    async fn type_text(&self, element: &Element, text: &str) -> Result<(), AppError> {
        element
            .click()
            .await
            .map_err(|e| map_cdp("focusing input", e))?;
        element
            .type_str(text)
            .await
            .map_err(|e| map_cdp("typing", e))?;
        Ok(())
    }

    async fn read_text(&self, element: &Element) -> Result<String, AppError> {
        let text = element
            .inner_text()
            .await
            .map_err(|e| map_cdp("reading text", e))?;
        Ok(text.unwrap_or_default())
    }

    async fn attribute(&self, element: &Element, name: &str) -> Result<Option<String>, AppError> {
        element
            .attribute(name)
            .await
            .map_err(|e| map_cdp(&format!("reading attribute '{name}'"), e))
    }

    async fn quit(&mut self) -> Result<(), AppError> {
        let closed = self.browser.close().await;
        let _ = self.browser.wait().await;
        self.handler.abort();
        closed
            .map(|_| ())
            .map_err(|e| AppError::DriverError(format!("Failed to close browser: {e}")))
    }
}

/// Tries to locate the real Chrome/Chromium binary.
///
/// On systems where Chromium is installed via **snap**, the wrapper at
/// `/snap/bin/chromium` strips unknown CLI flags, breaking headless mode.
/// We look for the real binary inside the snap first, then fall back to
/// well-known system paths. If nothing is found we return `None` and let
/// `chromiumoxide` do its own lookup.
pub fn find_chrome_binary() -> Option<PathBuf> {
    let candidates: &[&str] = &[
        // Snap (Ubuntu default)
        "/snap/chromium/current/usr/lib/chromium-browser/chrome",
        // Flatpak
        "/var/lib/flatpak/exports/bin/org.chromium.Chromium",
        // Common apt / manual installs
        "/usr/bin/google-chrome-stable",
        "/usr/bin/google-chrome",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
        // macOS
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    ];

    // Also honour an explicit override via env var.
    if let Ok(p) = std::env::var("CHROME_BIN") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    candidates.iter().map(PathBuf::from).find(|p| p.exists())
}
