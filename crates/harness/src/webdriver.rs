//! [`DocumentSurface`] over a W3C WebDriver endpoint.
//!
//! Commands click the page's buttons, queries read the text of the page's
//! state elements and parse it as JSON.

use async_trait::async_trait;
use eyre::{eyre, OptionExt, Result as EyreResult, WrapErr};
use reqwest::{Client, Method, StatusCode};
use serde_json::{json, Value};
use tracing::debug;
use url::Url;

use crate::config::{Selectors, TargetConfig};
use crate::error::HarnessError;
use crate::surface::{Command, DocumentSurface, StateKey, SurfaceFactory};

const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

#[derive(Clone, Debug)]
struct WebDriverClient {
    client: Client,
    endpoint: Url,
}

impl WebDriverClient {
    async fn request(&self, method: Method, path: &str, body: Option<Value>) -> EyreResult<Value> {
        let url = self
            .endpoint
            .join(path)
            .wrap_err_with(|| format!("invalid webdriver path '{path}'"))?;

        debug!(%method, %url, "WebDriver request");

        let mut builder = self.client.request(method, url);
        if let Some(body) = body {
            builder = builder.json(&body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let body: Value = response.json().await?;

        Ok(unwrap_value(status, body)?)
    }
}

/// Extracts the `value` member of a WebDriver response, turning error
/// payloads into [`HarnessError::WebDriver`].
fn unwrap_value(status: StatusCode, mut body: Value) -> Result<Value, HarnessError> {
    let value = body
        .as_object_mut()
        .and_then(|object| object.remove("value"))
        .unwrap_or(Value::Null);

    let error = value.get("error").and_then(Value::as_str);
    if !status.is_success() || error.is_some() {
        return Err(HarnessError::WebDriver {
            error: error.unwrap_or("unknown error").to_owned(),
            message: value
                .get("message")
                .and_then(Value::as_str)
                .map_or_else(|| format!("HTTP {status}"), str::to_owned),
        });
    }

    Ok(value)
}

fn element_reference(value: &Value) -> EyreResult<String> {
    value
        .get(ELEMENT_KEY)
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| eyre!("response is not an element reference: {value}"))
}

fn parse_items(text: &str) -> EyreResult<Vec<Value>> {
    let value: Value = serde_json::from_str(text)
        .wrap_err_with(|| format!("'{}' content is not JSON: {text:?}", StateKey::Items))?;

    match value {
        Value::Array(items) => Ok(items),
        other => Err(HarnessError::UnexpectedState {
            key: StateKey::Items.as_str(),
            value: other,
        }
        .into()),
    }
}

fn room_url(base_url: &Url, document_id: &str) -> Url {
    let mut url = base_url.clone();
    let _ignored = url.query_pairs_mut().append_pair("room", document_id);
    url
}

/// Opens one browser session per harness session.
#[derive(Clone, Debug)]
pub struct WebDriverFactory {
    client: WebDriverClient,
    base_url: Url,
    browser_name: String,
    headless: bool,
    selectors: Selectors,
}

impl WebDriverFactory {
    pub fn new(target: &TargetConfig) -> EyreResult<Self> {
        let endpoint = Url::parse(&target.webdriver_url)
            .wrap_err_with(|| format!("invalid webdriver url '{}'", target.webdriver_url))?;
        let base_url = Url::parse(&target.base_url)
            .wrap_err_with(|| format!("invalid base url '{}'", target.base_url))?;

        Ok(Self {
            client: WebDriverClient {
                client: Client::new(),
                endpoint,
            },
            base_url,
            browser_name: target.browser_name.clone(),
            headless: target.headless,
            selectors: target.selectors.clone(),
        })
    }

    fn capabilities(&self) -> Value {
        let mut always_match = json!({ "browserName": self.browser_name });
        if self.headless {
            always_match["goog:chromeOptions"] = json!({ "args": ["--headless=new"] });
            always_match["moz:firefoxOptions"] = json!({ "args": ["-headless"] });
        }
        json!({ "capabilities": { "alwaysMatch": always_match } })
    }
}

#[async_trait]
impl SurfaceFactory for WebDriverFactory {
    async fn open(&self, document_id: &str) -> EyreResult<Box<dyn DocumentSurface>> {
        let created = self
            .client
            .request(Method::POST, "session", Some(self.capabilities()))
            .await?;
        let session_id = created
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_eyre("new session response has no sessionId")?
            .to_owned();

        let page = WebDriverPage {
            client: self.client.clone(),
            session_id,
            selectors: self.selectors.clone(),
        };

        let url = room_url(&self.base_url, document_id);
        if let Err(err) = page
            .request(Method::POST, "url", Some(json!({ "url": url.as_str() })))
            .await
        {
            drop(page.close().await);
            return Err(err.wrap_err(format!("failed to navigate to '{url}'")));
        }

        Ok(Box::new(page))
    }
}

#[derive(Debug)]
pub struct WebDriverPage {
    client: WebDriverClient,
    session_id: String,
    selectors: Selectors,
}

impl WebDriverPage {
    async fn request(&self, method: Method, path: &str, body: Option<Value>) -> EyreResult<Value> {
        let path = format!("session/{}/{path}", self.session_id);
        self.client.request(method, &path, body).await
    }

    async fn find(&self, selector: &str) -> EyreResult<String> {
        let value = self
            .request(
                Method::POST,
                "element",
                Some(json!({ "using": "css selector", "value": selector })),
            )
            .await
            .wrap_err_with(|| format!("failed to find '{selector}'"))?;

        element_reference(&value)
    }

    async fn click(&self, command: Command) -> EyreResult<()> {
        let element = self.find(self.selectors.command(command)).await?;
        let _ignored = self
            .request(Method::POST, &format!("element/{element}/click"), Some(json!({})))
            .await?;
        Ok(())
    }

    async fn text(&self, key: StateKey) -> EyreResult<String> {
        let element = self.find(self.selectors.state(key)).await?;
        let value = self
            .request(Method::GET, &format!("element/{element}/text"), None)
            .await?;

        value
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| eyre!("element text is not a string: {value}"))
    }
}

#[async_trait]
impl DocumentSurface for WebDriverPage {
    async fn push(&self) -> EyreResult<()> {
        self.click(Command::Push).await
    }

    async fn delete(&self) -> EyreResult<()> {
        self.click(Command::Delete).await
    }

    async fn move_item(&self) -> EyreResult<()> {
        self.click(Command::Move).await
    }

    async fn undo(&self) -> EyreResult<()> {
        self.click(Command::Undo).await
    }

    async fn redo(&self) -> EyreResult<()> {
        self.click(Command::Redo).await
    }

    async fn clear(&self) -> EyreResult<()> {
        self.click(Command::Clear).await
    }

    async fn drop_transport(&self) -> EyreResult<()> {
        self.click(Command::DropTransport).await
    }

    async fn reject_as_connectivity_fault(&self) -> EyreResult<()> {
        self.click(Command::RejectAsConnectivityFault).await
    }

    async fn reject_as_application_fault(&self) -> EyreResult<()> {
        self.click(Command::RejectAsApplicationFault).await
    }

    async fn items(&self) -> EyreResult<Vec<Value>> {
        parse_items(&self.text(StateKey::Items).await?)
    }

    async fn connection_id(&self) -> EyreResult<Value> {
        let text = self.text(StateKey::ConnectionId).await?;
        serde_json::from_str(&text).wrap_err_with(|| {
            format!("'{}' content is not JSON: {text:?}", StateKey::ConnectionId)
        })
    }

    async fn close(&self) -> EyreResult<()> {
        let path = format!("session/{}", self.session_id);
        let _ignored = self.client.request(Method::DELETE, &path, None).await?;
        Ok(())
    }
}
