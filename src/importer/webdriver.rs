//! Minimal W3C WebDriver wire client over reqwest.
//!
//! Only the handful of endpoints the storefront importer needs: session
//! create/delete, navigation, CSS element lookup, text/attribute reads,
//! clicks and synchronous script execution. Pointed at a locally running
//! chromedriver.

use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

/// W3C element identifier key in element references.
const ELEMENT_KEY: &str = "element-6066-11e4-a852-e4a93385c5";

#[derive(Debug, Deserialize)]
struct WdValue<T> {
    value: T,
}

#[derive(Debug, Deserialize)]
struct WdError {
    #[serde(default)]
    error: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct WdNewSession {
    #[serde(rename = "sessionId")]
    session_id: String,
}

/// Opaque reference to a DOM element within one session.
#[derive(Debug, Clone, Deserialize)]
pub struct ElementRef {
    #[serde(rename = "element-6066-11e4-a852-e4a93385c5")]
    id: String,
}

#[derive(Clone)]
pub struct WebdriverClient {
    http: Client,
    base_url: String,
}

impl WebdriverClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .build()
            .context("failed to construct webdriver HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Create a session with the given `alwaysMatch` capabilities.
    pub async fn new_session(&self, capabilities: Value) -> Result<BrowserSession> {
        let url = format!("{}/session", self.base_url);
        let body = json!({ "capabilities": { "alwaysMatch": capabilities } });
        let resp = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("webdriver unreachable at {}", self.base_url))?;
        let parsed: WdValue<WdNewSession> = decode(resp, "new session").await?;
        Ok(BrowserSession {
            client: self.clone(),
            session_id: parsed.value.session_id,
        })
    }
}

/// One live browser session. Dropping it does not close the browser; call
/// [`BrowserSession::close`] in a cleanup step.
pub struct BrowserSession {
    client: WebdriverClient,
    session_id: String,
}

impl BrowserSession {
    pub fn id(&self) -> &str {
        &self.session_id
    }

    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/session/{}{}",
            self.client.base_url, self.session_id, path
        )
    }

    async fn post<T: serde::de::DeserializeOwned>(&self, path: &str, body: Value) -> Result<T> {
        let resp = self
            .client
            .http
            .post(self.endpoint(path))
            .json(&body)
            .send()
            .await
            .with_context(|| format!("webdriver request failed: POST {path}"))?;
        let parsed: WdValue<T> = decode(resp, path).await?;
        Ok(parsed.value)
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let resp = self
            .client
            .http
            .get(self.endpoint(path))
            .send()
            .await
            .with_context(|| format!("webdriver request failed: GET {path}"))?;
        let parsed: WdValue<T> = decode(resp, path).await?;
        Ok(parsed.value)
    }

    pub async fn navigate(&self, url: &str) -> Result<()> {
        let _: Option<Value> = self.post("/url", json!({ "url": url })).await?;
        Ok(())
    }

    pub async fn current_url(&self) -> Result<String> {
        self.get("/url").await
    }

    /// All elements matching a CSS selector. Zero matches is not an error.
    pub async fn find_elements(&self, css: &str) -> Result<Vec<ElementRef>> {
        self.post(
            "/elements",
            json!({ "using": "css selector", "value": css }),
        )
        .await
    }

    pub async fn element_text(&self, element: &ElementRef) -> Result<String> {
        self.get(&format!("/element/{}/text", element.id)).await
    }

    pub async fn element_attr(&self, element: &ElementRef, name: &str) -> Result<Option<String>> {
        self.get(&format!("/element/{}/attribute/{}", element.id, name))
            .await
    }

    pub async fn click(&self, element: &ElementRef) -> Result<()> {
        let _: Option<Value> = self
            .post(&format!("/element/{}/click", element.id), json!({}))
            .await?;
        Ok(())
    }

    /// Synchronous script execution; element args can be passed via the
    /// element key encoding if ever needed.
    pub async fn execute_script(&self, script: &str, args: Value) -> Result<Value> {
        self.post("/execute/sync", json!({ "script": script, "args": args }))
            .await
    }

    /// Scroll an element into view, best effort.
    pub async fn scroll_into_view(&self, element: &ElementRef) -> Result<Value> {
        self.post(
            "/execute/sync",
            json!({
                "script": "arguments[0].scrollIntoView({behavior: 'smooth', block: 'center'});",
                "args": [ { ELEMENT_KEY: element.id } ]
            }),
        )
        .await
    }

    pub async fn close(&self) -> Result<()> {
        let resp = self
            .client
            .http
            .delete(self.endpoint(""))
            .send()
            .await
            .context("webdriver request failed: DELETE session")?;
        let _: WdValue<Option<Value>> = decode(resp, "delete session").await?;
        Ok(())
    }
}

async fn decode<T: serde::de::DeserializeOwned>(resp: reqwest::Response, what: &str) -> Result<T> {
    let status = resp.status();
    let text = resp.text().await.unwrap_or_default();
    if !status.is_success() {
        if let Ok(err) = serde_json::from_str::<WdValue<WdError>>(&text) {
            return Err(anyhow!(
                "webdriver {what} failed ({}): {}",
                err.value.error,
                err.value.message
            ));
        }
        return Err(anyhow!("webdriver {what} failed (status={status}): {text}"));
    }
    serde_json::from_str(&text)
        .map_err(|err| anyhow!("failed to parse webdriver response for {what} ({err}): {text}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_refs_decode_with_w3c_key() {
        let raw = format!(r#"[{{"{ELEMENT_KEY}": "abc-123"}}]"#);
        let elements: Vec<ElementRef> = serde_json::from_str(&raw).unwrap();
        assert_eq!(elements.len(), 1);
        assert_eq!(elements[0].id, "abc-123");
    }
}
