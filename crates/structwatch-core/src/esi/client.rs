//! ESI HTTP client

use super::token::TokenSource;
use super::FetchError;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;
use structwatch_common::config::EsiConfig;
use tracing::{debug, info, warn};

/// Language used when the caller does not ask for specific languages
pub const DEFAULT_LANGUAGE: &str = "en";

/// Wait before the retry following failed attempt number `retry_count` (0-based)
pub fn retry_delay(base: Duration, retry_count: u32) -> Duration {
    base.saturating_mul(retry_count.saturating_mul(retry_count))
}

/// Retrying, paging ESI client
pub struct EsiClient {
    http: Client,
    base_url: String,
    datasource: String,
    max_retries: u32,
    retry_base_delay: Duration,
}

impl EsiClient {
    /// Create a new client from configuration
    pub fn new(config: &EsiConfig) -> Result<Self, FetchError> {
        let http = Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.as_str())
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            datasource: config.datasource.clone(),
            max_retries: config.max_retries,
            retry_base_delay: config.retry_base_delay(),
        })
    }

    /// Fetch a single object
    pub async fn fetch<T: DeserializeOwned>(
        &self,
        path: &str,
        args: &[(&str, String)],
        token: Option<&dyn TokenSource>,
    ) -> Result<T, FetchError> {
        let query = self.query(args, None, None);
        let (body, _) = self.get_with_retries(path, &query, token, None).await?;
        decode(&body)
    }

    /// Fetch all pages of a list endpoint, concatenated in page order
    pub async fn fetch_paged<T: DeserializeOwned>(
        &self,
        path: &str,
        args: &[(&str, String)],
        token: Option<&dyn TokenSource>,
    ) -> Result<Vec<T>, FetchError> {
        self.fetch_pages(path, args, None, token).await
    }

    /// Fetch a list endpoint once per language.
    ///
    /// Without languages the endpoint is fetched once and the result is keyed
    /// by the default language.
    pub async fn fetch_localized<T: DeserializeOwned>(
        &self,
        path: &str,
        args: &[(&str, String)],
        languages: &[String],
        paged: bool,
        token: Option<&dyn TokenSource>,
    ) -> Result<BTreeMap<String, Vec<T>>, FetchError> {
        let mut results = BTreeMap::new();

        if languages.is_empty() {
            let items = self.fetch_list(path, args, None, paged, token).await?;
            results.insert(DEFAULT_LANGUAGE.to_string(), items);
            return Ok(results);
        }

        for language in languages {
            let items = self
                .fetch_list(path, args, Some(language), paged, token)
                .await?;
            results.insert(language.clone(), items);
        }
        Ok(results)
    }

    /// POST a JSON body, used by bulk lookup endpoints
    pub async fn post<B, T>(
        &self,
        path: &str,
        body: &B,
        token: Option<&dyn TokenSource>,
    ) -> Result<T, FetchError>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let url = self.url(path);
        let url = url.as_str();
        let query = self.query(&[], None, None);
        let query = query.as_slice();
        let bytes = self
            .with_retries(path, None, || async move {
                let mut request = self.http.post(url).query(query).json(body);
                if let Some(token) = token {
                    request = with_bearer(request, token).await?;
                }
                let response = check_status(request.send().await?).await?;
                Ok(response.bytes().await?.to_vec())
            })
            .await?;
        decode(&bytes)
    }

    async fn fetch_list<T: DeserializeOwned>(
        &self,
        path: &str,
        args: &[(&str, String)],
        language: Option<&str>,
        paged: bool,
        token: Option<&dyn TokenSource>,
    ) -> Result<Vec<T>, FetchError> {
        if paged {
            return self.fetch_pages(path, args, language, token).await;
        }
        let query = self.query(args, language, None);
        let (body, _) = self.get_with_retries(path, &query, token, None).await?;
        decode(&body)
    }

    async fn fetch_pages<T: DeserializeOwned>(
        &self,
        path: &str,
        args: &[(&str, String)],
        language: Option<&str>,
        token: Option<&dyn TokenSource>,
    ) -> Result<Vec<T>, FetchError> {
        let query = self.query(args, language, Some(1));
        let (body, pages) = self.get_with_retries(path, &query, token, None).await?;
        let mut items: Vec<T> = decode(&body)?;
        let pages = pages.unwrap_or(1);

        for page in 2..=pages {
            let query = self.query(args, language, Some(page));
            let (body, _) = self
                .get_with_retries(path, &query, token, Some((page, pages)))
                .await?;
            let mut page_items: Vec<T> = decode(&body)?;
            items.append(&mut page_items);
        }

        Ok(items)
    }

    /// GET with retries. Returns the body and the declared page count.
    async fn get_with_retries(
        &self,
        path: &str,
        query: &[(String, String)],
        token: Option<&dyn TokenSource>,
        page: Option<(u32, u32)>,
    ) -> Result<(Vec<u8>, Option<u32>), FetchError> {
        let url = self.url(path);
        let url = url.as_str();
        self.with_retries(path, page, || async move {
            let mut request = self.http.get(url).query(query);
            if let Some(token) = token {
                request = with_bearer(request, token).await?;
            }
            let response = check_status(request.send().await?).await?;
            let pages = response
                .headers()
                .get("x-pages")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u32>().ok());
            Ok((response.bytes().await?.to_vec(), pages))
        })
        .await
    }

    async fn with_retries<R, F, Fut>(
        &self,
        path: &str,
        page: Option<(u32, u32)>,
        attempt: F,
    ) -> Result<R, FetchError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<R, FetchError>>,
    {
        match page {
            Some((page, pages)) => info!(path, page, pages, "Fetching from ESI"),
            None => info!(path, "Fetching from ESI"),
        }

        let mut retry_count = 0;
        loop {
            if retry_count > 0 {
                warn!(path, retry_count, max_retries = self.max_retries, "Retrying ESI request");
            }
            match attempt().await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_transient() && retry_count < self.max_retries => {
                    let delay = retry_delay(self.retry_base_delay, retry_count);
                    warn!(path, error = %e, "Transient error while fetching from ESI");
                    debug!(path, delay_ms = delay.as_millis() as u64, "Waiting until next retry");
                    tokio::time::sleep(delay).await;
                    retry_count += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn query(
        &self,
        args: &[(&str, String)],
        language: Option<&str>,
        page: Option<u32>,
    ) -> Vec<(String, String)> {
        let mut query: Vec<(String, String)> = args
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        query.push(("datasource".to_string(), self.datasource.clone()));
        if let Some(language) = language {
            query.push(("language".to_string(), language.to_string()));
        }
        if let Some(page) = page {
            query.push(("page".to_string(), page.to_string()));
        }
        query
    }
}

async fn with_bearer(
    request: RequestBuilder,
    token: &dyn TokenSource,
) -> Result<RequestBuilder, FetchError> {
    let access_token = token.access_token().await?;
    Ok(request.bearer_auth(access_token))
}

async fn check_status(response: Response) -> Result<Response, FetchError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(FetchError::from_status(status.as_u16(), message))
}

fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T, FetchError> {
    serde_json::from_slice(body).map_err(|e| FetchError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::esi::StaticToken;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer, max_retries: u32) -> EsiClient {
        let config = EsiConfig {
            base_url: server.uri(),
            max_retries,
            retry_base_delay_ms: 10,
            timeout_secs: 2,
            ..EsiConfig::default()
        };
        EsiClient::new(&config).unwrap()
    }

    #[test]
    fn test_retry_delay_is_quadratic() {
        let base = Duration::from_secs(1);
        assert_eq!(retry_delay(base, 0), Duration::ZERO);
        assert_eq!(retry_delay(base, 1), Duration::from_secs(1));
        assert_eq!(retry_delay(base, 2), Duration::from_secs(4));
        assert_eq!(retry_delay(base, 3), Duration::from_secs(9));
    }

    #[tokio::test]
    async fn test_fetch_paged_concatenates_pages_in_order() {
        let server = MockServer::start().await;
        for (page, body) in [("1", json!([1, 2])), ("2", json!([3, 4])), ("3", json!([5]))] {
            Mock::given(method("GET"))
                .and(path("/corporations/2001/structures/"))
                .and(query_param("page", page))
                .respond_with(
                    ResponseTemplate::new(200)
                        .insert_header("X-Pages", "3")
                        .set_body_json(body),
                )
                .expect(1)
                .mount(&server)
                .await;
        }

        let items: Vec<i64> = client(&server, 3)
            .fetch_paged("/corporations/2001/structures/", &[], None)
            .await
            .unwrap();
        assert_eq!(items, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_missing_pages_header_means_single_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/corporations/2001/structures/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([7, 8])))
            .expect(1)
            .mount(&server)
            .await;

        let items: Vec<i64> = client(&server, 3)
            .fetch_paged("/corporations/2001/structures/", &[], None)
            .await
            .unwrap();
        assert_eq!(items, vec![7, 8]);
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried_until_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/status/"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(3)
            .expect(3)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/status/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"players": 42})))
            .expect(1)
            .mount(&server)
            .await;

        let status: serde_json::Value = client(&server, 3)
            .fetch("/status/", &[], None)
            .await
            .unwrap();
        assert_eq!(status["players"], 42);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/status/"))
            .respond_with(ResponseTemplate::new(502))
            .expect(4)
            .mount(&server)
            .await;

        let result: Result<serde_json::Value, _> =
            client(&server, 3).fetch("/status/", &[], None).await;
        assert!(matches!(result, Err(FetchError::Transient(_))));
    }

    #[tokio::test]
    async fn test_permanent_errors_are_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/corporations/2001/structures/"))
            .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
            .expect(1)
            .mount(&server)
            .await;

        let result: Result<Vec<i64>, _> = client(&server, 3)
            .fetch_paged("/corporations/2001/structures/", &[], None)
            .await;
        match result {
            Err(FetchError::Permanent { status, .. }) => assert_eq!(status, 403),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_timeout_counts_as_transient() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/status/"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let result: Result<serde_json::Value, _> =
            client(&server, 0).fetch("/status/", &[], None).await;
        assert!(matches!(result, Err(FetchError::Transient(_))));
    }

    #[tokio::test]
    async fn test_fetch_localized_repeats_per_language() {
        let server = MockServer::start().await;
        for (language, name) in [("en", "Reprocessing"), ("de", "Wiederaufbereitung")] {
            Mock::given(method("GET"))
                .and(path("/corporations/2001/structures/"))
                .and(query_param("language", language))
                .and(header("authorization", "Bearer secret"))
                .respond_with(
                    ResponseTemplate::new(200)
                        .insert_header("X-Pages", "1")
                        .set_body_json(json!([{ "name": name }])),
                )
                .expect(1)
                .mount(&server)
                .await;
        }

        let token = StaticToken::new("secret");
        let languages = vec!["en".to_string(), "de".to_string()];
        let results: BTreeMap<String, Vec<serde_json::Value>> = client(&server, 3)
            .fetch_localized(
                "/corporations/2001/structures/",
                &[],
                &languages,
                true,
                Some(&token),
            )
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results["de"][0]["name"], "Wiederaufbereitung");
        assert_eq!(results["en"][0]["name"], "Reprocessing");
    }
}
