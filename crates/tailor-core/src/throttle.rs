//! Navigation pacing for the extraction stage.
//!
//! The target site rate-limits and flags accounts that click through saved
//! items faster than a person would. Every item-level and page-level
//! navigation goes through a [`Pacer`], which enforces a minimum gap since
//! the previous navigation plus optional random jitter.

use std::time::Duration;

use tokio::time::Instant;

/// Which kind of navigation is about to happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    /// Opening one saved posting.
    Item,
    /// Moving to another page of the saved list.
    Page,
}

/// Configuration for navigation pacing.
#[derive(Debug, Clone)]
pub struct ThrottleConfig {
    /// Minimum gap before opening a posting.
    pub item_delay: Duration,

    /// Minimum gap before loading another results page.
    pub page_delay: Duration,

    /// Maximum random jitter added on top of either delay (uniform [0, jitter]).
    ///
    /// Set to `Duration::ZERO` to disable.
    pub jitter: Duration,
}

impl ThrottleConfig {
    /// Same delay for both navigation kinds, no jitter.
    pub fn new(delay: Duration) -> Self {
        Self {
            item_delay: delay,
            page_delay: delay,
            jitter: Duration::ZERO,
        }
    }

    pub fn with_page_delay(mut self, delay: Duration) -> Self {
        self.page_delay = delay;
        self
    }

    /// Add random jitter (uniform [0, jitter]) on top of the base delay.
    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// Compute the effective delay for a single wait (delay + random jitter).
    fn effective_delay(&self, kind: Navigation) -> Duration {
        let base = match kind {
            Navigation::Item => self.item_delay,
            Navigation::Page => self.page_delay,
        };
        if self.jitter.is_zero() {
            return base;
        }
        let jitter_ms = rand_jitter_ms(self.jitter.as_millis() as u64);
        base + Duration::from_millis(jitter_ms)
    }
}

impl Default for ThrottleConfig {
    /// 2s between postings, 3s between pages, up to 1s jitter.
    fn default() -> Self {
        Self {
            item_delay: Duration::from_secs(2),
            page_delay: Duration::from_secs(3),
            jitter: Duration::from_secs(1),
        }
    }
}

/// Sleeps between navigations so consecutive ones keep the configured gap.
#[derive(Debug)]
pub struct Pacer {
    config: ThrottleConfig,
    last: Option<Instant>,
}

impl Pacer {
    pub fn new(config: ThrottleConfig) -> Self {
        Self { config, last: None }
    }

    /// Wait until the gap for `kind` has elapsed since the previous
    /// navigation, then record now as the latest one. The first call never
    /// waits.
    pub async fn pause(&mut self, kind: Navigation) {
        if let Some(last) = self.last {
            let required = self.config.effective_delay(kind);
            let elapsed = last.elapsed();
            if elapsed < required {
                let sleep_duration = required - elapsed;
                tracing::debug!(
                    navigation = ?kind,
                    sleep_ms = %sleep_duration.as_millis(),
                    "Pacing navigation"
                );
                tokio::time::sleep(sleep_duration).await;
            }
        }
        self.last = Some(Instant::now());
    }
}

// ---------------------------------------------------------------------------
// Jitter from a xorshift seeded by the clock; no `rand` dependency.
// ---------------------------------------------------------------------------

fn rand_jitter_ms(max_ms: u64) -> u64 {
    if max_ms == 0 {
        return 0;
    }
    let mut x = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;
    x ^= x << 13;
    x ^= x >> 7;
    x ^= x << 17;
    x % max_ms
}
