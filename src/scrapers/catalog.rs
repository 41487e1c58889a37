//! Browser-driven extractor for the gift search page.
//!
//! The page is a JavaScript application with custom dropdown-search widgets
//! instead of native form controls, so every interaction goes through the
//! matcher tables in `selectors`. Filter misses degrade the search instead of
//! failing it; only a missing search button is fatal.

use std::sync::Mutex as StdMutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chromiumoxide::{Element, Page};
use tracing::{debug, info, warn};

use super::browser::{BrowserSession, SessionConfig};
use super::selectors::{
    self, ElementMatcher, FilterField, CARD_COUNT_CAP, CARD_IMAGES, COUNT_ELEMENT,
    COUNT_FALLBACKS, DROPDOWN_OPTIONS, DROPDOWN_SEARCH_INPUTS, GIFT_LINK_ANCHOR, ITEM_CONTAINERS,
    MODAL_CLOSE_BUTTONS, RESULT_GRIDS, RESULT_INDICATORS, SEARCH_BUTTONS, SUBSCRIBE_MODAL,
};
use super::{ExtractionError, ExtractionErrorCode, SearchBackend};
use crate::config::Settings;
use crate::models::{ExtractorStats, GiftItem, SearchCriteria, SearchResult};

/// How many elements a text-filtered matcher inspects before giving up.
const TEXT_SCAN_LIMIT: usize = 40;

/// How many gift cards are summarized per search.
const ITEM_EXTRACT_LIMIT: usize = 10;

/// Extractor configuration.
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    pub base_url: String,
    pub headless: bool,
    pub user_agent: String,
    pub timeout: Duration,
}

impl From<&Settings> for ExtractorConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            base_url: settings.base_url.clone(),
            headless: settings.headless,
            user_agent: settings.user_agent.clone(),
            timeout: settings.request_timeout,
        }
    }
}

/// Extractor over a shared browser session. One fresh page per search.
pub struct CatalogExtractor {
    session: BrowserSession,
    base_url: String,
    stats: StdMutex<ExtractorStats>,
}

impl CatalogExtractor {
    pub fn new(config: ExtractorConfig) -> Self {
        let session = BrowserSession::new(SessionConfig {
            headless: config.headless,
            user_agent: config.user_agent,
            timeout: config.timeout,
        });
        Self {
            session,
            base_url: config.base_url,
            stats: StdMutex::new(ExtractorStats::default()),
        }
    }

    /// Snapshot of the request counters.
    pub fn stats(&self) -> ExtractorStats {
        self.lock_stats().clone()
    }

    pub fn reset_stats(&self) {
        *self.lock_stats() = ExtractorStats::default();
    }

    /// Shut the browser down; the next search relaunches it.
    pub async fn shutdown(&self) {
        self.session.shutdown().await;
    }

    fn lock_stats(&self) -> std::sync::MutexGuard<'_, ExtractorStats> {
        self.stats.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record(&self, success: bool, started: Instant) {
        let elapsed_ms = started.elapsed().as_millis() as u64;
        self.lock_stats().record(success, elapsed_ms);
    }

    /// Evaluate an ordered matcher list, returning the first hit.
    async fn find_first(page: &Page, matchers: &[ElementMatcher]) -> Option<Element> {
        for matcher in matchers {
            match matcher.text {
                None => {
                    if let Ok(element) = page.find_element(matcher.selector).await {
                        return Some(element);
                    }
                }
                Some(fragment) => {
                    let Ok(elements) = page.find_elements(matcher.selector).await else {
                        continue;
                    };
                    for element in elements.into_iter().take(TEXT_SCAN_LIMIT) {
                        if let Ok(Some(text)) = element.inner_text().await {
                            if text.contains(fragment) {
                                return Some(element);
                            }
                        }
                    }
                }
            }
        }
        None
    }

    /// First element matching any of the plain selectors.
    async fn find_by_selectors(page: &Page, selectors: &[&str]) -> Option<Element> {
        for selector in selectors {
            if let Ok(element) = page.find_element(*selector).await {
                return Some(element);
            }
        }
        None
    }

    /// Poll for an element to appear; CDP queries do not wait by themselves.
    async fn wait_for_element(page: &Page, selector: &str, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if page.find_element(selector).await.is_ok() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
    }

    /// Drive one dropdown-search widget: open it, type the value into its
    /// search input, click the matching option. Any miss logs and returns;
    /// a missing filter narrows the search less but never aborts it.
    async fn select_dropdown_value(&self, page: &Page, field: &FilterField, value: &str) {
        debug!("Selecting {}: {}", field.name, value);

        let Some(button) = Self::find_first(page, field.openers).await else {
            warn!("{} control not found, skipping filter", field.name);
            return;
        };
        if let Err(e) = button.click().await {
            warn!("Could not open {} control: {}", field.name, e);
            return;
        }

        // Give the panel time to mount its search input.
        tokio::time::sleep(Duration::from_millis(1000)).await;

        let Some(input) = Self::find_by_selectors(page, DROPDOWN_SEARCH_INPUTS).await else {
            warn!("{} panel has no search input", field.name);
            Self::close_dropdown(page).await;
            return;
        };
        if let Err(e) = input.type_str(value).await {
            warn!("Could not type into {} search input: {}", field.name, e);
            Self::close_dropdown(page).await;
            return;
        }

        // Wait for the option list to re-filter.
        tokio::time::sleep(Duration::from_millis(1500)).await;

        let mut clicked = false;
        'options: for selector in DROPDOWN_OPTIONS {
            let Ok(options) = page.find_elements(*selector).await else {
                continue;
            };
            for option in options.into_iter().take(TEXT_SCAN_LIMIT) {
                if let Ok(Some(text)) = option.inner_text().await {
                    if text.trim().contains(value) {
                        clicked = option.click().await.is_ok();
                        break 'options;
                    }
                }
            }
        }
        if clicked {
            debug!("Picked {}: {}", field.name, value);
        } else {
            warn!("Option \"{}\" not found in {} panel", value, field.name);
        }

        Self::close_dropdown(page).await;
    }

    /// Collapse an open panel by clicking outside it.
    async fn close_dropdown(page: &Page) {
        if let Ok(body) = page.find_element("body").await {
            let _ = body.click().await;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }

    async fn fill_search_form(&self, page: &Page, criteria: &SearchCriteria) {
        debug!("Filling search form");

        self.select_dropdown_value(page, &selectors::GIFT_FIELD, &criteria.gift_name)
            .await;
        if let Some(ref model) = criteria.model {
            self.select_dropdown_value(page, &selectors::MODEL_FIELD, model)
                .await;
        }
        if let Some(ref background) = criteria.background {
            self.select_dropdown_value(page, &selectors::BACKGROUND_FIELD, background)
                .await;
        }
        if let Some(ref pattern) = criteria.pattern {
            self.select_dropdown_value(page, &selectors::PATTERN_FIELD, pattern)
                .await;
        }
    }

    async fn click_search_button(&self, page: &Page) -> Result<(), ExtractionError> {
        let Some(button) = Self::find_first(page, SEARCH_BUTTONS).await else {
            return Err(ExtractionError::search("search button not found"));
        };
        button
            .click()
            .await
            .map_err(|e| ExtractionError::search(format!("search button click failed: {}", e)))?;
        Ok(())
    }

    /// Wait for any results indicator. Nothing appearing is tolerated and
    /// reads as an empty result set.
    async fn wait_for_results(&self, page: &Page) {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            for selector in RESULT_INDICATORS {
                if page.find_element(*selector).await.is_ok() {
                    debug!("Results rendered (selector: {})", selector);
                    // Settle delay so the counter text is final.
                    tokio::time::sleep(Duration::from_millis(1000)).await;
                    return;
                }
            }
            if Instant::now() >= deadline {
                warn!("No results indicator appeared, treating as empty result set");
                return;
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
    }

    /// Extract the found count: counter element, then a "Found: N" label in
    /// the page text, then counting rendered cards, then 0.
    async fn extract_count(&self, page: &Page) -> i64 {
        if let Ok(element) = page.find_element(COUNT_ELEMENT).await {
            if let Ok(Some(text)) = element.inner_text().await {
                if let Some(count) = selectors::parse_count_text(&text) {
                    debug!("Count from counter element: {} ({:?})", count, text.trim());
                    return count;
                }
            }
        }

        if let Ok(result) = page
            .evaluate("document.body ? document.body.innerText : ''")
            .await
        {
            if let Ok(body) = result.into_value::<String>() {
                if let Some(count) = selectors::parse_found_label(&body) {
                    debug!("Count from found-label text: {}", count);
                    return count;
                }
            }
        }

        for selector in COUNT_FALLBACKS {
            if let Ok(element) = page.find_element(*selector).await {
                if let Ok(Some(text)) = element.inner_text().await {
                    if let Some(count) = selectors::parse_count_text(&text) {
                        debug!("Count from fallback {}: {}", selector, count);
                        return count;
                    }
                }
            }
        }

        for selector in CARD_IMAGES {
            if let Ok(elements) = page.find_elements(*selector).await {
                let n = elements.len();
                if n > 0 && n < CARD_COUNT_CAP {
                    debug!("Count from card elements {}: {}", selector, n);
                    return n as i64;
                }
            }
        }

        warn!("Could not determine result count, defaulting to 0");
        0
    }

    async fn extract_items(&self, page: &Page) -> Vec<GiftItem> {
        let mut elements = Vec::new();
        for selector in ITEM_CONTAINERS {
            if let Ok(found) = page.find_elements(*selector).await {
                if !found.is_empty() {
                    elements = found;
                    break;
                }
            }
        }

        let mut items = Vec::new();
        for (index, element) in elements.into_iter().take(ITEM_EXTRACT_LIMIT).enumerate() {
            if let Some(item) = Self::extract_item(&element, index).await {
                items.push(item);
            }
        }
        items
    }

    /// Best-effort single-card extraction; any failure drops the card.
    async fn extract_item(element: &Element, index: usize) -> Option<GiftItem> {
        let id = match element.attribute("data-id").await {
            Ok(Some(id)) => id,
            _ => match element.attribute("id").await {
                Ok(Some(id)) => id,
                _ => format!("item-{}", index),
            },
        };

        let name = match element
            .find_element("h1, h2, h3, [class*=\"name\" i], [class*=\"title\" i]")
            .await
        {
            Ok(heading) => heading
                .inner_text()
                .await
                .ok()
                .flatten()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| "Unknown Gift".to_string()),
            Err(_) => "Unknown Gift".to_string(),
        };

        let image_url = match element.find_element("img").await {
            Ok(img) => img.attribute("src").await.ok().flatten(),
            Err(_) => None,
        };

        let rarity = match element
            .find_element("[class*=\"rarity\" i], [class*=\"percent\" i]")
            .await
        {
            Ok(el) => el
                .inner_text()
                .await
                .ok()
                .flatten()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty()),
            Err(_) => None,
        };

        Some(GiftItem {
            id: id.trim().to_string(),
            name,
            image_url,
            rarity,
        })
    }

    /// Dismiss the subscription overlay that blocks card clicks: close
    /// button, then Escape, then removing the node outright.
    async fn dismiss_subscribe_modal(&self, page: &Page) {
        if page.find_element(SUBSCRIBE_MODAL).await.is_err() {
            return;
        }
        debug!("Dismissing subscription overlay");

        let mut closed = false;
        if let Some(button) = Self::find_first(page, MODAL_CLOSE_BUTTONS).await {
            if button.click().await.is_ok() {
                tokio::time::sleep(Duration::from_millis(1000)).await;
                closed = true;
            }
        }

        if !closed {
            if let Ok(body) = page.find_element("body").await {
                let _ = body.press_key("Escape").await;
                tokio::time::sleep(Duration::from_millis(1000)).await;
            }
        }

        let _ = page
            .evaluate(
                r#"(() => {
                    const modal = document.getElementById('subscribe-modal-portal');
                    if (modal) { modal.style.display = 'none'; modal.remove(); }
                    document
                        .querySelectorAll('[class*="overlay"], [class*="backdrop"]')
                        .forEach((el) => el.remove());
                })()"#,
            )
            .await;
    }

    /// Open the last result card and read the gift's t.me deep link.
    async fn extract_last_gift_link(&self, page: &Page) -> Option<String> {
        self.dismiss_subscribe_modal(page).await;

        let Some(grid) = Self::find_by_selectors(page, RESULT_GRIDS).await else {
            warn!("Results grid not found");
            return None;
        };
        let cards = grid.find_elements("div > div").await.unwrap_or_default();
        let Some(last_card) = cards.into_iter().last() else {
            warn!("No gift cards in results grid");
            return None;
        };

        if last_card.click().await.is_err() {
            // Something still intercepts the pointer; align the card into
            // view and try once more.
            let _ = last_card.scroll_into_view().await;
            if let Err(e) = last_card.click().await {
                warn!("Could not open last gift card: {}", e);
                return None;
            }
        }

        // Let the detail view render.
        tokio::time::sleep(Duration::from_millis(3000)).await;

        if let Ok(anchor) = page.find_element(GIFT_LINK_ANCHOR).await {
            if let Ok(Some(href)) = anchor.attribute("href").await {
                debug!("Gift link from anchor: {}", href);
                return Some(href);
            }
        }

        // The detail page URL itself carries the gift id.
        let current = page.url().await.ok().flatten().map(|u| u.to_string());
        let derived = current.as_deref().and_then(selectors::gift_link_from_url);
        if let Some(ref link) = derived {
            debug!("Gift link from page URL: {}", link);
        } else {
            warn!("No gift deep link found");
        }
        derived
    }

    async fn run_search(
        &self,
        page: &Page,
        criteria: &SearchCriteria,
    ) -> Result<SearchResult, ExtractionError> {
        self.session.navigate(page, &self.base_url).await?;

        if !Self::wait_for_element(page, "input, select, button", Duration::from_secs(10)).await {
            return Err(ExtractionError::search("search form never rendered"));
        }

        self.fill_search_form(page, criteria).await;
        self.click_search_button(page).await?;
        self.wait_for_results(page).await;

        let count = self.extract_count(page).await;
        let items = self.extract_items(page).await;

        Ok(SearchResult::new(count, items, criteria.clone()))
    }
}

#[async_trait]
impl SearchBackend for CatalogExtractor {
    async fn search(&self, criteria: &SearchCriteria) -> Result<SearchResult, ExtractionError> {
        let started = Instant::now();
        self.lock_stats().total_requests += 1;

        info!("Searching gifts: {}", criteria.gift_name);
        let page = match self.session.new_page().await {
            Ok(page) => page,
            Err(e) => {
                self.record(false, started);
                return Err(e);
            }
        };

        let outcome = self.run_search(&page, criteria).await;
        BrowserSession::close_page(page).await;

        match outcome {
            Ok(result) => {
                self.record(true, started);
                info!(
                    "Found {} gifts in {}ms",
                    result.count,
                    started.elapsed().as_millis()
                );
                Ok(result)
            }
            Err(e) => {
                self.record(false, started);
                Err(e)
            }
        }
    }

    async fn latest_gift_link(
        &self,
        criteria: &SearchCriteria,
    ) -> Result<Option<String>, ExtractionError> {
        let started = Instant::now();
        self.lock_stats().total_requests += 1;

        info!("Fetching latest gift link: {}", criteria.gift_name);
        let page = match self.session.new_page().await {
            Ok(page) => page,
            Err(e) => {
                self.record(false, started);
                return Err(e);
            }
        };

        let outcome = async {
            self.run_search(&page, criteria).await?;
            Ok::<_, ExtractionError>(self.extract_last_gift_link(&page).await)
        }
        .await;
        BrowserSession::close_page(page).await;

        match outcome {
            Ok(link) => {
                self.record(true, started);
                Ok(link)
            }
            Err(e) => {
                self.record(false, started);
                Err(ExtractionError::new(
                    ExtractionErrorCode::LinkExtractionFailed,
                    e.message,
                ))
            }
        }
    }
}
