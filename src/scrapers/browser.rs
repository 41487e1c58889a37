//! Shared headless-browser session.
//!
//! One long-lived chromiumoxide browser serves the whole process; every
//! logical operation gets its own page and closes it on the way out, so a
//! failed search cannot leak state into the next one.

use std::time::Duration;

use chromiumoxide::cdp::browser_protocol::network::{
    SetBlockedUrLsParams, SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::page::NavigateParams;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{ExtractionError, ExtractionErrorCode};

/// Subresource patterns stripped from the network path. The extractor only
/// reads text and attributes, so images, fonts and media are dead weight.
const BLOCKED_URL_PATTERNS: &[&str] = &[
    "*.png", "*.jpg", "*.jpeg", "*.gif", "*.webp", "*.svg", "*.ico", "*.woff", "*.woff2",
    "*.ttf", "*.otf", "*.mp4", "*.webm", "*.mp3",
];

/// Browser session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub headless: bool,
    pub user_agent: String,
    pub timeout: Duration,
}

/// Lazily launched browser shared across searches.
pub struct BrowserSession {
    config: SessionConfig,
    browser: Mutex<Option<Browser>>,
}

impl BrowserSession {
    /// Common Chrome executable paths to check.
    const CHROME_PATHS: &'static [&'static str] = &[
        // Linux
        "/usr/bin/google-chrome",
        "/usr/bin/google-chrome-stable",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
        "/snap/bin/chromium",
        // macOS
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
        // Common install locations
        "/opt/google/chrome/google-chrome",
    ];

    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            browser: Mutex::new(None),
        }
    }

    /// Find a Chrome executable on this machine.
    fn find_chrome() -> Result<std::path::PathBuf, ExtractionError> {
        for path in Self::CHROME_PATHS {
            let p = std::path::Path::new(path);
            if p.exists() {
                info!("Found Chrome at: {}", path);
                return Ok(p.to_path_buf());
            }
        }

        for cmd in &[
            "google-chrome",
            "google-chrome-stable",
            "chromium",
            "chromium-browser",
        ] {
            if let Ok(output) = std::process::Command::new("which").arg(cmd).output() {
                if output.status.success() {
                    let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
                    if !path.is_empty() {
                        info!("Found Chrome in PATH: {}", path);
                        return Ok(std::path::PathBuf::from(path));
                    }
                }
            }
        }

        Err(ExtractionError::new(
            ExtractionErrorCode::BrowserInit,
            "Chrome/Chromium not found; install chromium or google-chrome",
        ))
    }

    async fn launch(config: &SessionConfig) -> Result<Browser, ExtractionError> {
        info!("Launching browser (headless={})", config.headless);

        let chrome_path = Self::find_chrome()?;

        let mut builder = BrowserConfig::builder().chrome_executable(chrome_path);

        // with_head means NOT headless, confusingly
        if !config.headless {
            builder = builder.with_head();
        }

        builder = builder
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-infobars")
            .arg("--disable-dev-shm-usage")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-background-networking")
            .arg("--disable-sync")
            .arg("--disable-translate")
            .arg("--metrics-recording-only")
            .arg("--no-sandbox") // Often needed for headless in containers/restricted environments
            .arg("--disable-gpu") // Recommended for headless
            .arg("--disable-software-rasterizer");

        let browser_config = builder.build().map_err(|e| {
            ExtractionError::new(
                ExtractionErrorCode::BrowserInit,
                format!("Failed to build browser config: {}", e),
            )
        })?;

        let (browser, mut handler) = Browser::launch(browser_config).await.map_err(|e| {
            ExtractionError::new(
                ExtractionErrorCode::BrowserInit,
                format!("Failed to launch browser: {}", e),
            )
        })?;

        // Drive the CDP message loop until the browser goes away.
        tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });

        Ok(browser)
    }

    /// Open a fresh page with the user agent set and non-essential
    /// subresources blocked.
    pub async fn new_page(&self) -> Result<Page, ExtractionError> {
        let mut guard = self.browser.lock().await;
        if guard.is_none() {
            *guard = Some(Self::launch(&self.config).await?);
        }
        let browser = guard.as_ref().expect("browser launched above");

        let page = browser.new_page("about:blank").await.map_err(|e| {
            ExtractionError::search(format!("Failed to open page: {}", e))
        })?;
        drop(guard);

        page.execute(SetUserAgentOverrideParams::new(
            self.config.user_agent.clone(),
        ))
        .await
        .map_err(|e| ExtractionError::search(format!("Failed to set user agent: {}", e)))?;

        let patterns: Vec<String> = BLOCKED_URL_PATTERNS.iter().map(|s| s.to_string()).collect();
        if let Err(e) = page.execute(SetBlockedUrLsParams::new(patterns)).await {
            // Purely an optimization, never worth failing the search over.
            debug!("Could not block subresources: {}", e);
        }

        Ok(page)
    }

    /// Navigate and wait for the document to become interactive.
    pub async fn navigate(&self, page: &Page, url: &str) -> Result<(), ExtractionError> {
        info!("Navigating to {}", url);
        let nav_params = NavigateParams::builder()
            .url(url)
            .build()
            .map_err(|e| ExtractionError::search(format!("Invalid URL: {}", e)))?;

        page.execute(nav_params)
            .await
            .map_err(|e| ExtractionError::search(format!("Navigation failed: {}", e)))?;

        // Wait on document.readyState instead of a fixed delay.
        let wait_for_ready_script = r#"
            new Promise((resolve) => {
                if (document.readyState === 'complete' || document.readyState === 'interactive') {
                    resolve(document.readyState);
                } else {
                    document.addEventListener('DOMContentLoaded', () => resolve(document.readyState));
                    // Fallback timeout in case event never fires
                    setTimeout(() => resolve('timeout'), 10000);
                }
            })
        "#;

        match tokio::time::timeout(
            self.config.timeout,
            page.evaluate(wait_for_ready_script.to_string()),
        )
        .await
        {
            Ok(Ok(result)) => {
                let state: String = result
                    .into_value()
                    .unwrap_or_else(|_| "unknown".to_string());
                debug!("Page ready state: {}", state);
            }
            Ok(Err(e)) => {
                debug!("Could not check ready state: {}", e);
            }
            Err(_) => {
                warn!("Timeout waiting for page ready state");
            }
        }

        // Small additional delay for late-rendering content.
        tokio::time::sleep(Duration::from_millis(500)).await;

        Ok(())
    }

    /// Close a page, ignoring failures; pages must not accumulate.
    pub async fn close_page(page: Page) {
        let _ = page.close().await;
    }

    /// Drop the browser. The next operation relaunches it.
    pub async fn shutdown(&self) {
        let mut guard = self.browser.lock().await;
        if guard.take().is_some() {
            info!("Browser closed");
        }
    }
}
