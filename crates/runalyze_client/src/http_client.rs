//! HTTP client implementation for runalyze.com.
//!
//! This module provides a reqwest-based implementation of the [`RunalyzeClient`](crate::RunalyzeClient) trait.
//! Redirects are never followed: the caller inspects every `302` because a
//! bounce to `/login` is how the site reports an expired session.

use crate::config::Config;
use crate::cookie_jar::SessionStore;
use crate::observability::Verbosity;
use crate::utils::{extract_csrf_token, filename_from_content_disposition, redact_form_body, week_bounds};
use crate::{ExportFile, ExportFormat, RunalyzeClient, RunalyzeError};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::StatusCode;
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;

const BROWSER_HEADERS: &[(&str, &str)] = &[
    (
        "accept",
        "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8,application/signed-exchange;v=b3;q=0.7",
    ),
    ("accept-language", "en-GB,en;q=0.9,en-US;q=0.4"),
    (
        "sec-ch-ua",
        "\"Google Chrome\";v=\"137\", \"Chromium\";v=\"137\", \"Not/A)Brand\";v=\"24\"",
    ),
    ("sec-ch-ua-mobile", "?0"),
    ("sec-ch-ua-platform", "\"macOS\""),
    ("sec-fetch-dest", "document"),
    ("sec-fetch-mode", "navigate"),
    ("sec-fetch-site", "same-origin"),
    ("sec-fetch-user", "?1"),
    ("upgrade-insecure-requests", "1"),
    (
        "user-agent",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/137.0.0.0 Safari/537.36",
    ),
];

const RESPONSE_PREVIEW_CHARS: usize = 512;

fn browser_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    for &(name, value) in BROWSER_HEADERS {
        headers.insert(
            HeaderName::from_static(name),
            HeaderValue::from_static(value),
        );
    }
    headers
}

/// Status, headers and fully buffered body of one exchange.
#[derive(Debug)]
struct RawResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl RawResponse {
    fn location(&self) -> Option<&str> {
        self.headers
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
    }

    fn is_login_redirect(&self) -> bool {
        if !self.status.is_redirection() {
            return false;
        }
        self.location()
            .and_then(|loc| loc.split(['?', '#']).next())
            .is_some_and(|path| path.trim_end_matches('/').ends_with("/login"))
    }
}

/// Client for runalyze.com using reqwest and a persistent cookie jar.
#[derive(Clone, Debug)]
pub struct ReqwestRunalyzeClient {
    base_url: String,
    username: String,
    password: SecretString,
    verbosity: Verbosity,
    session: Arc<SessionStore>,
    client: reqwest::Client,
}

impl ReqwestRunalyzeClient {
    /// Create a client whose session lives in `config.cookie_path`.
    ///
    /// Cookies saved by a previous run are loaded here, so a still-valid
    /// session is reused without logging in.
    pub fn new(config: &Config) -> Result<Self, RunalyzeError> {
        let base_url = config.base_url.trim_end_matches('/');
        let domain = reqwest::Url::parse(base_url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .ok_or_else(|| RunalyzeError::Config(format!("invalid base url: {base_url}")))?;
        let session = SessionStore::open(&config.cookie_path, domain)?;
        Self::with_session(config, Arc::new(session))
    }

    /// Create a client around an already opened session store.
    pub fn with_session(config: &Config, session: Arc<SessionStore>) -> Result<Self, RunalyzeError> {
        let client = reqwest::Client::builder()
            .default_headers(browser_headers())
            .redirect(reqwest::redirect::Policy::none())
            .cookie_provider(session.clone())
            .build()?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
            verbosity: config.verbosity,
            session,
            client,
        })
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Every request goes through here so logging happens in one place.
    async fn send(&self, request: reqwest::RequestBuilder) -> Result<RawResponse, RunalyzeError> {
        let request = request.build()?;
        tracing::debug!(method = %request.method(), url = %request.url(), "request");
        if self.verbosity.allows(Verbosity::Trace) {
            for (name, value) in request.headers() {
                tracing::trace!(header = %name, value = ?value, "request header");
            }
            if let Some(body) = request.body().and_then(|b| b.as_bytes()) {
                let body = String::from_utf8_lossy(body);
                tracing::trace!(body = %redact_form_body(&body), "request body");
            }
        }

        let resp = self.client.execute(request).await?;
        let status = resp.status();
        tracing::debug!(status = status.as_u16(), url = %resp.url(), "response");
        let headers = resp.headers().clone();
        let body = resp.bytes().await?.to_vec();

        if self.verbosity.allows(Verbosity::Trace) {
            for (name, value) in &headers {
                tracing::trace!(header = %name, value = ?value, "response header");
            }
            if !body.is_empty() {
                let preview: String = String::from_utf8_lossy(&body)
                    .chars()
                    .take(RESPONSE_PREVIEW_CHARS)
                    .collect();
                tracing::trace!(body = %preview, "response body preview");
            }
        }

        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }

    /// GET the login page and scrape the CSRF token out of the form.
    async fn fetch_csrf_token(&self) -> Result<String, RunalyzeError> {
        let resp = self.send(self.client.get(self.url("/login"))).await?;
        if resp.status != StatusCode::OK {
            return Err(RunalyzeError::UnexpectedStatus(resp.status.as_u16()));
        }
        extract_csrf_token(&String::from_utf8_lossy(&resp.body)).ok_or(RunalyzeError::TokenNotFound)
    }
}

#[async_trait]
impl RunalyzeClient for ReqwestRunalyzeClient {
    async fn login(&self) -> Result<(), RunalyzeError> {
        let token = self.fetch_csrf_token().await?;
        let form = [
            ("_username", self.username.as_str()),
            ("_password", self.password.expose_secret()),
            ("_remember_me", "on"),
            ("submit", "Sign in"),
            ("_csrf_token", token.as_str()),
        ];
        let request = self
            .client
            .post(self.url("/login"))
            .header(header::CACHE_CONTROL, "max-age=0")
            .form(&form);
        let resp = self.send(request).await?;
        if resp.status != StatusCode::FOUND {
            return Err(RunalyzeError::LoginFailed(resp.status.as_u16()));
        }
        tracing::debug!(location = ?resp.location(), "login accepted");
        Ok(())
    }

    async fn fetch_week(&self, week_start: NaiveDate) -> Result<Vec<u8>, RunalyzeError> {
        let (start, end) = week_bounds(week_start);
        let request = self
            .client
            .get(self.url("/databrowser"))
            .query(&[("start", start), ("end", end)])
            .header("x-requested-with", "XMLHttpRequest")
            .header(header::ACCEPT, "text/html, */*; q=0.01")
            .header("sec-fetch-dest", "empty")
            .header("sec-fetch-mode", "cors");
        let resp = self.send(request).await?;
        if resp.is_login_redirect() {
            return Err(RunalyzeError::RedirectedToLogin);
        }
        if !resp.status.is_success() {
            return Err(RunalyzeError::UnexpectedStatus(resp.status.as_u16()));
        }
        Ok(resp.body)
    }

    async fn fetch_export(
        &self,
        activity_id: &str,
        format: ExportFormat,
    ) -> Result<ExportFile, RunalyzeError> {
        let url = self.url(&format!(
            "/activity/{}/export/file/{}",
            activity_id,
            format.path_segment()
        ));
        let request = self
            .client
            .get(url)
            .header(header::REFERER, self.url("/dashboard"));
        let resp = self.send(request).await?;
        if resp.is_login_redirect() {
            return Err(RunalyzeError::RedirectedToLogin);
        }
        match resp.status {
            StatusCode::OK => {}
            StatusCode::NOT_FOUND => return Err(RunalyzeError::NotFound),
            other => return Err(RunalyzeError::UnexpectedStatus(other.as_u16())),
        }
        let filename = resp
            .headers
            .get(header::CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(filename_from_content_disposition)
            .ok_or(RunalyzeError::FilenameMissing)?;
        Ok(ExportFile {
            bytes: resp.body,
            filename,
        })
    }

    async fn persist_session(&self) -> Result<(), RunalyzeError> {
        self.session.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn config(cookie_path: PathBuf) -> Config {
        Config {
            username: "runner".into(),
            password: SecretString::new("pw".into()),
            base_url: "https://runalyze.com/".into(),
            cookie_path,
            verbosity: Verbosity::Info,
        }
    }

    #[test]
    fn client_new_trims_base_url_and_opens_session() {
        let dir = tempfile::tempdir().unwrap();
        let client = ReqwestRunalyzeClient::new(&config(dir.path().join("c.json"))).expect("client");
        assert_eq!(client.url("/login"), "https://runalyze.com/login");
        assert_eq!(client.session().canonical_domain(), "runalyze.com");
    }

    #[test]
    fn client_new_rejects_invalid_base_url() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path().join("c.json"));
        cfg.base_url = "not a url".into();
        assert!(matches!(
            ReqwestRunalyzeClient::new(&cfg),
            Err(RunalyzeError::Config(_))
        ));
    }

    fn redirect(location: &str) -> RawResponse {
        let mut headers = HeaderMap::new();
        headers.insert(header::LOCATION, HeaderValue::from_str(location).unwrap());
        RawResponse {
            status: StatusCode::FOUND,
            headers,
            body: Vec::new(),
        }
    }

    #[test]
    fn login_redirect_detection() {
        assert!(redirect("https://runalyze.com/login").is_login_redirect());
        assert!(redirect("/login?_target=x").is_login_redirect());
        assert!(!redirect("/dashboard").is_login_redirect());
        let ok = RawResponse {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Vec::new(),
        };
        assert!(!ok.is_login_redirect());
    }

    #[test]
    fn browser_headers_are_complete() {
        let headers = browser_headers();
        assert_eq!(headers.len(), BROWSER_HEADERS.len());
        assert!(headers.contains_key("sec-fetch-mode"));
    }
}
