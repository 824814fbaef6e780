//! Storefront library importer.
//!
//! Drives a WebDriver-controlled browser against the storefront's
//! purchase-history page and feeds the scraped titles into the store. Split
//! in two phases because login is interactive: phase one opens the browser
//! on the storefront so the user can sign in, phase two navigates to the
//! purchase history and walks its pages.

pub mod webdriver;

use crate::store::Store;
use crate::tasks::TaskLog;
use crate::util::env::{env_opt, env_parse};
use anyhow::{Context, Result};
use rand::{thread_rng, Rng};
use serde::Serialize;
use serde_json::json;
use std::collections::HashSet;
use std::time::{Duration, Instant};
use tracing::debug;

pub use webdriver::{BrowserSession, ElementRef, WebdriverClient};

#[derive(Debug, Clone)]
pub struct ImporterConfig {
    /// Chromedriver endpoint, e.g. http://localhost:9515.
    pub webdriver_url: String,
    pub landing_url: String,
    pub purchases_url: String,
    /// URL fragment that marks a logged-in purchase-history view.
    pub purchases_path: String,
    pub title_selector: String,
    pub next_button_selector: String,
    pub login_timeout_secs: u64,
    /// Post-login settle wait before scraping begins.
    pub settle_secs: u64,
    /// Jittered per-page delay range in milliseconds.
    pub page_delay_ms: (u64, u64),
}

impl ImporterConfig {
    pub fn from_env() -> Self {
        Self {
            webdriver_url: env_opt("WEBDRIVER_URL")
                .unwrap_or_else(|| "http://localhost:9515".to_string()),
            landing_url: env_opt("STOREFRONT_URL")
                .unwrap_or_else(|| "https://www.epicgames.com/".to_string()),
            purchases_url: env_opt("STOREFRONT_PURCHASES_URL").unwrap_or_else(|| {
                "https://www.epicgames.com/account/transactions/purchases".to_string()
            }),
            purchases_path: env_opt("STOREFRONT_PURCHASES_PATH")
                .unwrap_or_else(|| "/transactions/purchases".to_string()),
            title_selector: env_opt("IMPORT_TITLE_SELECTOR")
                .unwrap_or_else(|| "span.am-hoct6b".to_string()),
            next_button_selector: env_opt("IMPORT_NEXT_SELECTOR")
                .unwrap_or_else(|| "#next-btn".to_string()),
            login_timeout_secs: env_parse("IMPORT_LOGIN_TIMEOUT_SECS", 180u64),
            settle_secs: env_parse("IMPORT_SETTLE_SECS", 10u64),
            page_delay_ms: (
                env_parse("IMPORT_PAGE_DELAY_MIN_MS", 2000u64),
                env_parse("IMPORT_PAGE_DELAY_MAX_MS", 4000u64),
            ),
        }
    }
}

/// Terminal state of the pagination walk. A DOM/lookup failure is reported
/// distinctly from a genuine last page so silently truncated imports are
/// visible to the user.
#[derive(Debug, Clone, PartialEq)]
pub enum PageEnd {
    LastPage,
    Indeterminate(String),
}

#[derive(Debug, PartialEq)]
enum NextPage {
    Advance,
    Stop(PageEnd),
}

/// Observed state of the "next" control, decoupled from the live session so
/// the stop/advance decision stays a pure function.
#[derive(Debug)]
enum PagerProbe {
    LookupFailed(String),
    Missing,
    StateUnreadable(String),
    Ready { classes: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportOutcome {
    pub success: bool,
    pub titles_found: usize,
    pub titles_saved: usize,
    pub new_titles: usize,
    pub pages_processed: u32,
    /// "last-page" or "indeterminate"; see `page_state_detail` for the latter.
    pub page_state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_state_detail: Option<String>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ImportOutcome {
    pub fn failure(error: impl std::fmt::Display) -> Self {
        Self {
            success: false,
            titles_found: 0,
            titles_saved: 0,
            new_titles: 0,
            pages_processed: 0,
            page_state: "failed".to_string(),
            page_state_detail: None,
            message: format!("import failed: {error}"),
            error: Some(error.to_string()),
        }
    }
}

/// Chrome capabilities tuned to look like a regular interactive browser
/// rather than an automation harness.
pub fn stealth_capabilities() -> serde_json::Value {
    json!({
        "browserName": "chrome",
        "goog:chromeOptions": {
            "args": [
                "--disable-blink-features=AutomationControlled",
                "--disable-dev-shm-usage",
                "--no-sandbox",
                "--start-maximized",
                "--user-agent=Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
            ],
            "excludeSwitches": ["enable-automation", "enable-logging"],
            "useAutomationExtension": false,
            "prefs": {
                "credentials_enable_service": false,
                "profile.password_manager_enabled": false
            }
        }
    })
}

/// Phase one: launch the browser on the storefront landing page so the user
/// can log in. Does not block on login.
pub async fn open_session(config: &ImporterConfig, log: &TaskLog) -> Result<BrowserSession> {
    log.push("launching browser session...");
    let client = WebdriverClient::new(&config.webdriver_url)?;
    let session = client
        .new_session(stealth_capabilities())
        .await
        .context("could not start browser session (is chromedriver running?)")?;

    // Belt and braces on top of the chrome options.
    let _ = session
        .execute_script(
            "Object.defineProperty(navigator, 'webdriver', {get: () => undefined});",
            json!([]),
        )
        .await;

    log.push(format!("browser session {} ready", session.id()));
    log.push("navigating to storefront; log in when prompted".to_string());
    session
        .navigate(&config.landing_url)
        .await
        .context("navigating to storefront landing page")?;
    Ok(session)
}

/// Phase two: walk the purchase-history pages, collect titles and save them.
/// All errors are converted into a failed outcome; the caller owns session
/// teardown.
pub async fn run_extraction(
    session: &BrowserSession,
    config: &ImporterConfig,
    store: &Store,
    log: &TaskLog,
) -> ImportOutcome {
    match extract_inner(session, config, store, log).await {
        Ok(outcome) => outcome,
        Err(err) => {
            log.push(format!("[error] extraction failed: {err:#}"));
            ImportOutcome::failure(format!("{err:#}"))
        }
    }
}

async fn extract_inner(
    session: &BrowserSession,
    config: &ImporterConfig,
    store: &Store,
    log: &TaskLog,
) -> Result<ImportOutcome> {
    log.push("navigating to purchase history...".to_string());
    session
        .navigate(&config.purchases_url)
        .await
        .context("navigating to purchase history")?;

    wait_for_login(session, config, log).await;

    let mut scraped: Vec<String> = Vec::new();
    let mut pages = 0u32;
    let end = loop {
        pages += 1;
        log.push(format!("processing page {pages}..."));
        human_pause(config.page_delay_ms).await;

        let on_page = scrape_titles(session, &config.title_selector).await?;
        log.push(format!("found {} titles on page {pages}", on_page.len()));
        scraped.extend(on_page);

        match advance_page(session, config, log).await {
            NextPage::Advance => {
                log.push("moving to next page...".to_string());
                human_pause(config.page_delay_ms).await;
            }
            NextPage::Stop(end) => break end,
        }
    };

    match &end {
        PageEnd::LastPage => log.push(format!("reached last page after {pages} page(s)")),
        PageEnd::Indeterminate(reason) => log.push(format!(
            "[warn] stopped without confirming last page ({reason}); results may be truncated"
        )),
    }

    let unique = dedup_first_seen(scraped);
    log.push(format!("{} unique titles total", unique.len()));

    let mut saved = 0usize;
    let mut new = 0usize;
    for title in &unique {
        match store.add_game(title, None) {
            Ok((_, was_new)) => {
                saved += 1;
                if was_new {
                    new += 1;
                    log.push(format!("saved: {title}"));
                } else {
                    debug!(title, "already in library");
                }
            }
            Err(err) => log.push(format!("[error] could not save '{title}': {err:#}")),
        }
    }
    log.push(format!("saved {saved} titles ({new} new)"));

    let (page_state, page_state_detail) = match end {
        PageEnd::LastPage => ("last-page".to_string(), None),
        PageEnd::Indeterminate(reason) => ("indeterminate".to_string(), Some(reason)),
    };
    let success = !unique.is_empty();
    let message = if success {
        format!("imported {saved} titles ({new} new) across {pages} page(s)")
    } else {
        "no titles found; check the purchase-history page manually".to_string()
    };
    Ok(ImportOutcome {
        success,
        titles_found: unique.len(),
        titles_saved: saved,
        new_titles: new,
        pages_processed: pages,
        page_state,
        page_state_detail,
        message,
        error: None,
    })
}

/// Poll the current URL until it lands on the purchase-history path. On
/// timeout we proceed anyway; the scrape will simply find nothing.
async fn wait_for_login(session: &BrowserSession, config: &ImporterConfig, log: &TaskLog) {
    log.push("waiting for login (complete it in the browser window)...".to_string());
    let deadline = Instant::now() + Duration::from_secs(config.login_timeout_secs);
    let mut logged_in = false;
    while Instant::now() < deadline {
        match session.current_url().await {
            Ok(url) if url.contains(&config.purchases_path) => {
                logged_in = true;
                break;
            }
            Ok(_) => {}
            Err(err) => debug!(error = %err, "url poll failed during login wait"),
        }
        tokio::time::sleep(Duration::from_secs(2)).await;
    }
    if !logged_in {
        log.push("login wait timed out; proceeding anyway".to_string());
        return;
    }
    log.push(format!(
        "login detected; settling for {} seconds before scraping",
        config.settle_secs
    ));
    for i in 0..config.settle_secs {
        tokio::time::sleep(Duration::from_secs(1)).await;
        if i % 3 == 0 {
            // Light scroll activity while settling, errors ignored.
            let _ = session
                .execute_script("window.scrollBy(0, arguments[0]);", json!([120]))
                .await;
        }
    }
}

/// Scrape the title elements on the current view. Per-element read failures
/// are skipped; a selector-level failure propagates.
async fn scrape_titles(session: &BrowserSession, selector: &str) -> Result<Vec<String>> {
    let elements = session
        .find_elements(selector)
        .await
        .context("title element lookup")?;
    let mut titles = Vec::with_capacity(elements.len());
    for element in &elements {
        match session.element_text(element).await {
            Ok(text) => {
                let text = text.trim().to_string();
                if text.len() > 1 {
                    titles.push(text);
                }
            }
            Err(err) => debug!(error = %err, "skipping unreadable title element"),
        }
    }
    Ok(titles)
}

/// Decide whether another page exists. Absent pager means a single-page
/// list; disabled pager means last page; any lookup or click failure is an
/// indeterminate stop, not a silent "done".
async fn advance_page(
    session: &BrowserSession,
    config: &ImporterConfig,
    log: &TaskLog,
) -> NextPage {
    let (probe, button) = match session.find_elements(&config.next_button_selector).await {
        Err(err) => (PagerProbe::LookupFailed(format!("{err:#}")), None),
        Ok(buttons) => match buttons.into_iter().next() {
            None => (PagerProbe::Missing, None),
            Some(button) => match session.element_attr(&button, "class").await {
                Ok(classes) => (
                    PagerProbe::Ready {
                        classes: classes.unwrap_or_default(),
                    },
                    Some(button),
                ),
                Err(err) => (PagerProbe::StateUnreadable(format!("{err:#}")), None),
            },
        },
    };

    if let NextPage::Stop(end) = classify_pager(probe) {
        return NextPage::Stop(end);
    }
    let Some(button) = button else {
        return NextPage::Stop(PageEnd::Indeterminate("pager element unavailable".into()));
    };

    if let Err(err) = session.scroll_into_view(&button).await {
        debug!(error = %err, "scroll to pager failed");
    }
    human_pause((500, 1500)).await;

    match session.click(&button).await {
        Ok(()) => NextPage::Advance,
        Err(err) => {
            log.push(format!("[warn] pager click failed: {err:#}"));
            NextPage::Stop(PageEnd::Indeterminate(format!("pager click failed: {err:#}")))
        }
    }
}

/// Pure stop/advance decision from the observed pager state. A missing or
/// disabled control is a genuine last page; any failed observation is an
/// indeterminate stop.
fn classify_pager(probe: PagerProbe) -> NextPage {
    match probe {
        PagerProbe::LookupFailed(reason) => {
            NextPage::Stop(PageEnd::Indeterminate(format!("pager lookup failed: {reason}")))
        }
        PagerProbe::Missing => NextPage::Stop(PageEnd::LastPage),
        PagerProbe::StateUnreadable(reason) => NextPage::Stop(PageEnd::Indeterminate(format!(
            "pager state read failed: {reason}"
        ))),
        PagerProbe::Ready { classes } if next_control_disabled(&classes) => {
            NextPage::Stop(PageEnd::LastPage)
        }
        PagerProbe::Ready { .. } => NextPage::Advance,
    }
}

/// The storefront marks the exhausted pager via a disabled class
/// (MUI renders `Mui-disabled`).
fn next_control_disabled(classes: &str) -> bool {
    classes
        .split_whitespace()
        .any(|class| class == "disabled" || class.contains("disabled") || class.contains("Mui-disabled"))
}

/// Deduplicate, preserving first-seen order.
pub fn dedup_first_seen(titles: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    titles
        .into_iter()
        .filter(|title| seen.insert(title.clone()))
        .collect()
}

async fn human_pause(range_ms: (u64, u64)) {
    let (min, max) = range_ms;
    let wait = if max > min {
        thread_rng().gen_range(min..=max)
    } else {
        min
    };
    tokio::time::sleep(Duration::from_millis(wait)).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_preserves_first_seen_order() {
        let scraped = vec!["A", "B", "A", "C", "B"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(dedup_first_seen(scraped), vec!["A", "B", "C"]);
    }

    #[test]
    fn disabled_pager_classes_are_recognized() {
        assert!(next_control_disabled("MuiButton-root Mui-disabled"));
        assert!(next_control_disabled("btn disabled"));
        assert!(!next_control_disabled("MuiButton-root primary"));
        assert!(!next_control_disabled(""));
    }

    #[test]
    fn pager_classification_separates_last_page_from_indeterminate() {
        assert_eq!(
            classify_pager(PagerProbe::Missing),
            NextPage::Stop(PageEnd::LastPage)
        );
        assert_eq!(
            classify_pager(PagerProbe::Ready {
                classes: "MuiButton-root Mui-disabled".into()
            }),
            NextPage::Stop(PageEnd::LastPage)
        );
        assert_eq!(
            classify_pager(PagerProbe::Ready {
                classes: "MuiButton-root primary".into()
            }),
            NextPage::Advance
        );
        assert!(matches!(
            classify_pager(PagerProbe::LookupFailed("connection reset".into())),
            NextPage::Stop(PageEnd::Indeterminate(reason)) if reason.contains("pager lookup failed")
        ));
        assert!(matches!(
            classify_pager(PagerProbe::StateUnreadable("stale element".into())),
            NextPage::Stop(PageEnd::Indeterminate(reason)) if reason.contains("pager state read failed")
        ));
    }

    #[test]
    fn importer_config_defaults_target_the_storefront() {
        let config = ImporterConfig::from_env();
        assert!(config.purchases_url.contains(&config.purchases_path));
        assert!(!config.title_selector.is_empty());
        assert!(config.page_delay_ms.0 <= config.page_delay_ms.1);
    }
}
