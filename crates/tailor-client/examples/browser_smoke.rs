/// Smoke-test for `ChromeLauncher`.
///
/// Launches a headless Chromium, opens <https://example.com>, and checks the
/// driver can find and read the page heading.
///
/// Run with:
///   cargo run -p tailor-client --example browser_smoke
use std::time::Duration;

use tailor_client::ChromeLauncher;
use tailor_core::traits::{BrowserDriver, DriverLauncher};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("info")
        .init();

    println!("Launching headless browser…");
    let mut driver = ChromeLauncher::new().launch().await?;

    let url = "https://example.com";
    println!("Opening {url} …");
    driver.navigate(url).await?;

    let heading = driver.wait_for("h1", Duration::from_secs(10)).await?;
    let text = driver.read_text(&heading).await?;
    let links = driver.find_all("a[href]").await?;
    let href = match links.first() {
        Some(link) => driver.attribute(link, "href").await?,
        None => None,
    };

    driver.quit().await?;

    // Basic sanity checks
    assert_eq!(text.trim(), "Example Domain", "unexpected heading");
    assert!(href.is_some(), "expected at least one link");

    println!("OK: heading {text:?}, first link {href:?}");
    Ok(())
}
