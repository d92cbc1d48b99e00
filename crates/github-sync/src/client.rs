//! # GitHub REST Client
//!
//! Paginated list, create and update calls for labels and milestones, plus
//! organization repository listing. Works against api.github.com and GitHub
//! Enterprise (`https://host/api/v3`) alike.
//!
//! Reads follow `Link: rel="next"` headers until exhausted and are retried on
//! transient failures. Create and update calls are sent exactly once.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client as HttpClient, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::time::sleep;
use tracing::{debug, instrument, warn};

use crate::error::{Result, SyncError};
use crate::resource::Resource;
use crate::targets::{OrgRepository, OrganizationClient, RepositoryCoordinate};

const USER_AGENT: &str = concat!("github-sync/", env!("CARGO_PKG_VERSION"));
const API_VERSION: &str = "2022-11-28";
const PER_PAGE: &str = "100";
const MAX_READ_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY_MS: u64 = 500;

/// List/create/update access to one resource kind.
#[async_trait]
pub trait ResourceClient<R: Resource>: Send + Sync {
    /// All resources of the kind in `repo` (every page).
    async fn list(&self, repo: &RepositoryCoordinate) -> Result<Vec<R>>;

    /// Create `resource` in `repo`.
    async fn create(&self, repo: &RepositoryCoordinate, resource: &R) -> Result<()>;

    /// Overwrite the mutable fields of the resource addressed by `id`.
    async fn update(&self, repo: &RepositoryCoordinate, id: &R::Id, resource: &R) -> Result<()>;
}

#[derive(Debug, Deserialize)]
struct GitHubError {
    message: String,
}

/// REST client bound to one API root and one credential.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    http_client: HttpClient,
    base_url: String,
    token: Option<String>,
}

impl GitHubClient {
    /// Create a client for `base_url`, authenticating with `token` if given.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(base_url: &str, token: Option<&str>, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert("X-GitHub-Api-Version", HeaderValue::from_static(API_VERSION));

        let http_client = HttpClient::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.is_empty()).map(ToString::to_string),
        })
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let request = self.http_client.request(method, url);
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn collection_url<R: Resource>(&self, repo: &RepositoryCoordinate) -> String {
        format!(
            "{}/repos/{}/{}/{}",
            self.base_url,
            repo.owner,
            repo.repo,
            R::COLLECTION
        )
    }

    /// Fetch every page of a collection.
    async fn get_all<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut next = Some(url.to_string());
        let mut first = true;

        while let Some(page_url) = next {
            let response = self.get_with_retry(&page_url, first.then_some(query)).await?;
            first = false;

            next = next_page_url(response.headers());
            let page: Vec<T> = response.json().await?;
            debug!(url = %page_url, count = page.len(), "Fetched page");
            items.extend(page);
        }

        Ok(items)
    }

    /// GET with retry on transient failures.
    async fn get_with_retry(&self, url: &str, query: Option<&[(&str, &str)]>) -> Result<Response> {
        let mut attempt = 1;
        loop {
            let mut request = self.request(Method::GET, url);
            if let Some(query) = query {
                request = request.query(query).query(&[("per_page", PER_PAGE)]);
            }

            let result = match request.send().await {
                Ok(response) => check_status(response, url).await,
                Err(e) => Err(SyncError::Http(e)),
            };

            match result {
                Err(e) if e.is_transient() && attempt < MAX_READ_ATTEMPTS => {
                    let backoff_ms = RETRY_BASE_DELAY_MS * 2_u64.pow(attempt - 1);
                    warn!(
                        url,
                        error = %e,
                        "Read failed, retrying in {}ms (attempt {}/{})",
                        backoff_ms,
                        attempt,
                        MAX_READ_ATTEMPTS
                    );
                    sleep(Duration::from_millis(backoff_ms)).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    /// Send a mutating request once and check the response.
    async fn send_once(&self, method: Method, url: &str, body: &serde_json::Value) -> Result<()> {
        let response = self.request(method, url).json(body).send().await?;
        check_status(response, url).await?;
        Ok(())
    }
}

#[async_trait]
impl<R: Resource> ResourceClient<R> for GitHubClient {
    #[instrument(skip_all, fields(kind = %R::KIND, repository = %repo))]
    async fn list(&self, repo: &RepositoryCoordinate) -> Result<Vec<R>> {
        let url = self.collection_url::<R>(repo);
        let items: Vec<R> = self.get_all(&url, R::LIST_QUERY).await?;
        debug!(count = items.len(), "Listed {}s", R::KIND);
        Ok(items)
    }

    #[instrument(skip_all, fields(kind = %R::KIND, repository = %repo, key = resource.key()))]
    async fn create(&self, repo: &RepositoryCoordinate, resource: &R) -> Result<()> {
        let url = self.collection_url::<R>(repo);
        self.send_once(Method::POST, &url, &resource.create_body())
            .await
    }

    #[instrument(skip_all, fields(kind = %R::KIND, repository = %repo, id = %id))]
    async fn update(&self, repo: &RepositoryCoordinate, id: &R::Id, resource: &R) -> Result<()> {
        let url = format!(
            "{}/{}",
            self.collection_url::<R>(repo),
            urlencoding::encode(&id.to_string())
        );
        self.send_once(Method::PATCH, &url, &resource.update_body())
            .await
    }
}

#[async_trait]
impl OrganizationClient for GitHubClient {
    #[instrument(skip(self))]
    async fn list_org_repositories(&self, org: &str) -> Result<Vec<OrgRepository>> {
        let url = format!("{}/orgs/{}/repos", self.base_url, org);
        self.get_all(&url, &[]).await
    }
}

/// Map a non-success response to a `SyncError`.
async fn check_status(response: Response, url: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let reset_in = rate_limit_reset(response.headers());
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<GitHubError>(&body)
        .map(|e| e.message)
        .unwrap_or_else(|_| {
            status
                .canonical_reason()
                .unwrap_or("unknown error")
                .to_string()
        });

    Err(match (status.as_u16(), reset_in) {
        (403 | 429, Some(reset_in)) => SyncError::RateLimitExceeded { reset_in },
        (401 | 403, _) => SyncError::Authentication(message),
        (404, _) => SyncError::NotFound(format!("{url}: {message}")),
        (code, _) => SyncError::Api {
            status: code,
            message,
        },
    })
}

/// Time until requests may resume, if the response is rate limited.
///
/// Secondary limits send `retry-after` while quota remains; primary limits
/// report an exhausted `x-ratelimit-remaining`.
fn rate_limit_reset(headers: &HeaderMap) -> Option<Duration> {
    if let Some(seconds) = header_number::<u64>(headers, header::RETRY_AFTER.as_str()) {
        return Some(Duration::from_secs(seconds));
    }

    let remaining = header_number::<i64>(headers, "x-ratelimit-remaining")?;
    if remaining > 0 {
        return None;
    }

    header_number::<i64>(headers, "x-ratelimit-reset").map(|reset_timestamp| {
        let now = chrono::Utc::now().timestamp();
        #[allow(clippy::cast_sign_loss)]
        let seconds_until_reset = (reset_timestamp - now).max(0) as u64;
        Duration::from_secs(seconds_until_reset)
    })
}

fn header_number<T: std::str::FromStr>(headers: &HeaderMap, name: &str) -> Option<T> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}

/// Extract the `rel="next"` target of a `Link` header.
fn next_page_url(headers: &HeaderMap) -> Option<String> {
    let link = headers.get(header::LINK)?.to_str().ok()?;
    link.split(',').find_map(|part| {
        let (target, params) = part.split_once(';')?;
        params
            .split(';')
            .any(|p| p.trim() == r#"rel="next""#)
            .then(|| {
                target
                    .trim()
                    .trim_start_matches('<')
                    .trim_end_matches('>')
                    .to_string()
            })
    })
}
