//! Authenticated HTTP access to a Gaudeam instance.
//!
//! A [`GaudeamSession`] is the only thing the Drive code needs from the
//! outside world: a base URL and a way to issue requests with the
//! `_gaudeam_session` cookie attached.

use reqwest::header::{HeaderMap, HeaderValue, COOKIE};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{IgiturError, Result};

pub const GAUDEAM_HOST: &str = "gaudeam.de";
pub const SESSION_COOKIE: &str = "_gaudeam_session";

const USER_AGENT: &str = concat!("igitur/", env!("CARGO_PKG_VERSION"));

/// Status and body of a completed request.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Turns any non-2xx response into an [`IgiturError::Remote`].
    pub fn ensure_success(self, context: impl Into<String>) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(IgiturError::remote(context, self.status, self.text()))
        }
    }
}

#[derive(Clone)]
pub struct GaudeamSession {
    client: Client,
    base_url: String,
    cookie: String,
}

impl std::fmt::Debug for GaudeamSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GaudeamSession")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl GaudeamSession {
    /// Session for `https://{subdomain}.gaudeam.de` using the value of the
    /// `_gaudeam_session` cookie from a logged in browser session.
    pub fn new(session_cookie: impl Into<String>, subdomain: &str) -> Self {
        Self::with_base_url(session_cookie, format!("https://{subdomain}.{GAUDEAM_HOST}"))
    }

    pub fn with_base_url(session_cookie: impl Into<String>, base_url: impl Into<String>) -> Self {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .pool_idle_timeout(Some(std::time::Duration::from_secs(90)))
            .build()
            .unwrap_or_default();

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            cookie: session_cookie.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// The underlying client, without the session cookie. Used for requests
    /// to third-party endpoints such as signed storage uploads.
    pub fn http(&self) -> &Client {
        &self.client
    }

    fn auth_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(&format!("{SESSION_COOKIE}={}", self.cookie)) {
            headers.insert(COOKIE, value);
        }
        headers
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.headers(self.auth_headers())
    }

    async fn execute(&self, builder: RequestBuilder) -> Result<HttpResponse> {
        let response = self.authorized(builder).send().await?;
        let status = response.status();
        let body = response.bytes().await?.to_vec();
        debug!("HTTP {} ({} bytes)", status, body.len());
        Ok(HttpResponse { status, body })
    }

    pub async fn get(&self, path: &str) -> Result<HttpResponse> {
        let url = self.url(path);
        debug!("GET {url}");
        self.execute(self.client.get(&url)).await
    }

    pub async fn post_json<T: Serialize + ?Sized>(&self, path: &str, body: Option<&T>) -> Result<HttpResponse> {
        let url = self.url(path);
        debug!("POST {url}");
        let mut builder = self.client.post(&url);
        if let Some(body) = body {
            builder = builder.json(body);
        }
        self.execute(builder).await
    }

    pub async fn delete(&self, path: &str) -> Result<HttpResponse> {
        let url = self.url(path);
        debug!("DELETE {url}");
        self.execute(self.client.delete(&url)).await
    }

    /// Starts a GET and hands back the unread response so large bodies can
    /// be streamed.
    pub async fn get_streaming(&self, path: &str) -> Result<reqwest::Response> {
        let url = self.url(path);
        debug!("GET (streaming) {url}");
        Ok(self.authorized(self.client.get(&url)).send().await?)
    }

    /// Checks the cookie against `/api/v1/current_member`.
    pub async fn is_valid(&self) -> Result<bool> {
        Ok(self.get("/api/v1/current_member").await?.is_success())
    }

    pub async fn ensure_valid(&self) -> Result<()> {
        if self.is_valid().await? {
            Ok(())
        } else {
            Err(IgiturError::Authentication(
                "Session is invalid. Please login again.".to_string(),
            ))
        }
    }

    pub async fn current_member(&self) -> Result<CurrentMember> {
        self.get("/api/v1/current_member")
            .await?
            .ensure_success("Error fetching current member")?
            .json()
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct CurrentMember {
    #[serde(default)]
    pub personal_record: Option<PersonalRecord>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct PersonalRecord {
    #[serde(default)]
    pub email: Option<String>,
}

impl CurrentMember {
    pub fn email(&self) -> Option<&str> {
        self.personal_record.as_ref()?.email.as_deref()
    }
}
