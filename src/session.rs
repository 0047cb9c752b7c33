//! Browser session management using chromiumoxide.
//!
//! One long-lived, headful Chromium bound to a persistent profile
//! directory, so cookies and any solved challenges survive across runs.
//! The session exposes only navigate/extract primitives through the
//! [`PageFetcher`] seam; retry policy belongs to the walker, never here.

use crate::error::AcquireError;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default per-navigation timeout.
pub const NAVIGATION_TIMEOUT_MS: u64 = 30_000;

/// Find the Chrome/Chromium binary path.
pub fn find_chrome() -> Option<PathBuf> {
    // 1. REVHARVEST_CHROME_PATH env
    if let Ok(p) = std::env::var("REVHARVEST_CHROME_PATH") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    // 2. System PATH
    for name in ["google-chrome", "google-chrome-stable", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    // 3. Common macOS locations
    if cfg!(target_os = "macos") {
        let mut candidates = vec![
            PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome"),
            PathBuf::from("/Applications/Chromium.app/Contents/MacOS/Chromium"),
        ];
        if let Some(home) = dirs::home_dir() {
            candidates
                .push(home.join("Applications/Google Chrome.app/Contents/MacOS/Google Chrome"));
        }
        for c in candidates {
            if c.exists() {
                return Some(c);
            }
        }
    }

    None
}

/// Minimal navigate/extract surface the adapters drive.
///
/// Implemented by [`BrowserSession`] for real runs and by fixture
/// fetchers in tests, mirroring how the source sites are exercised
/// without a live browser.
#[async_trait]
pub trait PageFetcher: Send {
    /// Load a URL and wait for the DOM to settle, bounded by the
    /// session timeout. Never retried at this level.
    async fn goto(&mut self, url: &str) -> Result<(), AcquireError>;

    /// Full outer HTML of the current page.
    async fn content(&mut self) -> Result<String, AcquireError>;

    /// Current page URL.
    async fn current_url(&mut self) -> Result<String, AcquireError>;
}

/// A live Chromium session bound to a persistent profile directory.
///
/// Exclusively owns the profile for the process lifetime; two instances
/// sharing one profile directory is undefined and must be prevented by
/// the caller.
pub struct BrowserSession {
    browser: Browser,
    page: Page,
    handler_task: tokio::task::JoinHandle<()>,
    timeout_ms: u64,
}

impl BrowserSession {
    /// Launch a headful Chromium with a persistent profile.
    ///
    /// Headful on purpose: a human must be able to see and solve
    /// challenges in the window.
    pub async fn launch(profile_dir: &Path) -> Result<Self> {
        Self::launch_with_timeout(profile_dir, NAVIGATION_TIMEOUT_MS).await
    }

    pub async fn launch_with_timeout(profile_dir: &Path, timeout_ms: u64) -> Result<Self> {
        let chrome_path = find_chrome().context(
            "Chrome not found. Install Chrome/Chromium or set REVHARVEST_CHROME_PATH.",
        )?;

        std::fs::create_dir_all(profile_dir)
            .with_context(|| format!("failed to create profile dir {}", profile_dir.display()))?;

        info!(
            profile = %profile_dir.display(),
            chrome = %chrome_path.display(),
            "launching browser session"
        );

        let config = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .user_data_dir(profile_dir)
            .with_head()
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .build()
            .map_err(|e| anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch Chromium")?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                let _ = event;
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .context("failed to open page")?;

        Ok(Self {
            browser,
            page,
            handler_task,
            timeout_ms,
        })
    }

    /// Release the browser and profile. Called on every exit path; the
    /// engine treats a failed close as a warning, not an error.
    pub async fn close(mut self) -> Result<()> {
        debug!("closing browser session");
        let _ = self.page.close().await;
        if let Err(e) = self.browser.close().await {
            warn!("browser close failed: {e}");
        }
        let _ = self.browser.wait().await;
        self.handler_task.abort();
        Ok(())
    }
}

#[async_trait]
impl PageFetcher for BrowserSession {
    async fn goto(&mut self, url: &str) -> Result<(), AcquireError> {
        debug!(url, "navigating");
        let nav = tokio::time::timeout(
            Duration::from_millis(self.timeout_ms),
            self.page.goto(url),
        )
        .await;

        match nav {
            Ok(Ok(_)) => {
                // Wait for the DOM to settle, not just the initial response.
                let _ = tokio::time::timeout(
                    Duration::from_millis(self.timeout_ms),
                    self.page.wait_for_navigation(),
                )
                .await;
                Ok(())
            }
            Ok(Err(e)) => Err(AcquireError::Navigation {
                url: url.to_string(),
                cause: e.to_string(),
            }),
            Err(_) => Err(AcquireError::Navigation {
                url: url.to_string(),
                cause: format!("timed out after {}ms", self.timeout_ms),
            }),
        }
    }

    async fn content(&mut self) -> Result<String, AcquireError> {
        let result = self
            .page
            .evaluate("document.documentElement.outerHTML")
            .await
            .map_err(|e| AcquireError::Session(anyhow!("failed to read page HTML: {e}")))?;

        result
            .into_value()
            .map_err(|e| AcquireError::Session(anyhow!("failed to convert HTML result: {e:?}")))
    }

    async fn current_url(&mut self) -> Result<String, AcquireError> {
        let url = self
            .page
            .url()
            .await
            .map_err(|e| AcquireError::Session(anyhow!("failed to read URL: {e}")))?
            .map(|u| u.to_string())
            .unwrap_or_default();
        Ok(url)
    }
}
