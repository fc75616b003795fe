use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::future::Future;
use thiserror::Error;
use tracing::debug;

use crate::constants::constants;

/// A single card's worth of data, normalized from either API endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResult {
  pub external_id: String,
  pub title: String,
  pub channel_name: String,
  pub thumbnail_url: String,
  pub published_at: DateTime<Utc>,
}

/// Ordered results for one shelf; insertion order is display order.
pub type ResultSet = Vec<SearchResult>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
  #[error("network failure: {0}")]
  Network(String),
  #[error("malformed response: {0}")]
  MalformedResponse(String),
  #[error("no API key configured (set {0})")]
  MissingCredential(String),
}

impl FetchError {
  /// Short label used in log fields.
  pub fn kind(&self) -> &'static str {
    match self {
      FetchError::Network(_) => "network",
      FetchError::MalformedResponse(_) => "malformed_response",
      FetchError::MissingCredential(_) => "missing_credential",
    }
  }
}

// --- Transport ---

/// Raw HTTP reply handed back by a [`Transport`].
#[derive(Debug, Clone)]
pub struct HttpReply {
  pub status: u16,
  pub body: String,
}

/// The single HTTP capability the fetcher needs.
pub trait Transport: Send + Sync + 'static {
  fn get(&self, url: &str) -> impl Future<Output = Result<HttpReply, FetchError>> + Send;
}

#[derive(Clone, Default)]
pub struct HttpTransport {
  client: Client,
}

impl HttpTransport {
  pub fn new(client: Client) -> Self {
    Self { client }
  }
}

impl Transport for HttpTransport {
  async fn get(&self, url: &str) -> Result<HttpReply, FetchError> {
    // `without_url` keeps the API key out of error messages.
    let response = self.client.get(url).send().await.map_err(|e| FetchError::Network(e.without_url().to_string()))?;
    let status = response.status().as_u16();
    let body = response.text().await.map_err(|e| FetchError::Network(e.without_url().to_string()))?;
    Ok(HttpReply { status, body })
  }
}

// --- Wire format ---

#[derive(Deserialize)]
struct ListResponse {
  items: Vec<ApiItem>,
}

#[derive(Deserialize)]
struct ApiItem {
  id: ApiId,
  snippet: Snippet,
}

/// `search` nests the id (`{"videoId": ..}`), `videos` returns it flat.
#[derive(Deserialize)]
#[serde(untagged)]
enum ApiId {
  Flat(String),
  Nested(NestedId),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NestedId {
  video_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snippet {
  title: String,
  channel_title: String,
  #[serde(default)]
  thumbnails: Thumbnails,
  published_at: String,
}

#[derive(Deserialize, Default)]
struct Thumbnails {
  medium: Option<Thumbnail>,
  default: Option<Thumbnail>,
}

#[derive(Deserialize)]
struct Thumbnail {
  url: String,
}

/// Undo the HTML escaping the Data API applies to snippet text.
/// e.g. `Rock &amp; Roll &#39;99` → `Rock & Roll '99`
fn decode_entities(s: &str) -> String {
  html_escape::decode_html_entities(s).to_string()
}

/// Parse a `search` or `videos` list payload into at most `cap` results.
/// Items without a video id (channel or playlist hits) are skipped.
pub(crate) fn parse_items(body: &str, cap: usize) -> Result<ResultSet, FetchError> {
  let response: ListResponse =
    serde_json::from_str(body).map_err(|e| FetchError::MalformedResponse(e.to_string()))?;

  let mut results = Vec::with_capacity(response.items.len().min(cap));
  for item in response.items {
    if results.len() == cap {
      break;
    }
    let external_id = match item.id {
      ApiId::Flat(id) => id,
      ApiId::Nested(NestedId { video_id: Some(id) }) => id,
      ApiId::Nested(NestedId { video_id: None }) => continue,
    };
    let published_at = DateTime::parse_from_rfc3339(&item.snippet.published_at)
      .map_err(|e| FetchError::MalformedResponse(format!("publishedAt '{}': {}", item.snippet.published_at, e)))?
      .with_timezone(&Utc);
    let thumbnails = item.snippet.thumbnails;
    let thumbnail_url = thumbnails.medium.or(thumbnails.default).map(|t| t.url).unwrap_or_default();
    results.push(SearchResult {
      external_id,
      title: decode_entities(&item.snippet.title),
      channel_name: decode_entities(&item.snippet.channel_title),
      thumbnail_url,
      published_at,
    });
  }
  Ok(results)
}

/// Pull `error.message` out of an API error body, if there is one.
fn api_error_message(body: &str) -> Option<String> {
  let val: serde_json::Value = serde_json::from_str(body).ok()?;
  val.get("error")?.get("message")?.as_str().map(|s| s.to_string())
}

// --- Fetcher ---

/// Builds Data API requests and normalizes the replies.
pub struct ResultFetcher<T: Transport = HttpTransport> {
  transport: T,
  api_key: Option<String>,
  api_base: String,
  region_code: String,
  max_results: usize,
}

impl ResultFetcher<HttpTransport> {
  pub fn new(client: Client, api_key: Option<String>, region_code: impl Into<String>) -> Self {
    Self::with_transport(HttpTransport::new(client), api_key, region_code)
  }
}

impl<T: Transport> ResultFetcher<T> {
  pub fn with_transport(transport: T, api_key: Option<String>, region_code: impl Into<String>) -> Self {
    let c = constants();
    Self {
      transport,
      api_key: api_key.filter(|k| !k.trim().is_empty()),
      api_base: c.api_base.trim_end_matches('/').to_string(),
      region_code: region_code.into(),
      max_results: c.max_results,
    }
  }

  pub fn max_results(&self) -> usize {
    self.max_results
  }

  pub fn region_code(&self) -> &str {
    &self.region_code
  }

  fn search_url(&self, key: &str, query: &str) -> String {
    format!(
      "{}/search?key={}&q={}&part=snippet&type=video&maxResults={}",
      self.api_base,
      urlencoding::encode(key),
      urlencoding::encode(query),
      self.max_results
    )
  }

  fn popular_url(&self, key: &str) -> String {
    format!(
      "{}/videos?key={}&part=snippet&chart=mostPopular&regionCode={}&videoCategoryId={}&maxResults={}",
      self.api_base,
      urlencoding::encode(key),
      urlencoding::encode(&self.region_code),
      urlencoding::encode(&constants().music_category_id),
      self.max_results
    )
  }

  fn require_key(&self) -> Result<&str, FetchError> {
    self.api_key.as_deref().ok_or_else(|| FetchError::MissingCredential(constants().api_key_env.clone()))
  }

  /// Keyword search. A blank query returns an empty set without touching the network.
  pub async fn fetch(&self, query: &str) -> Result<ResultSet, FetchError> {
    let query = query.trim();
    if query.is_empty() {
      return Ok(Vec::new());
    }
    let key = self.require_key()?;
    debug!(query = %query, "fetching search results");
    self.request(&self.search_url(key, query)).await
  }

  /// The region's most popular music videos.
  pub async fn fetch_popular(&self) -> Result<ResultSet, FetchError> {
    let key = self.require_key()?;
    debug!(region = %self.region_code, "fetching popular chart");
    self.request(&self.popular_url(key)).await
  }

  async fn request(&self, url: &str) -> Result<ResultSet, FetchError> {
    let reply = self.transport.get(url).await?;
    if !(200..300).contains(&reply.status) {
      let detail = api_error_message(&reply.body).unwrap_or_else(|| "no error detail".to_string());
      return Err(FetchError::Network(format!("HTTP {}: {}", reply.status, detail)));
    }
    parse_items(&reply.body, self.max_results)
  }
}

#[cfg(test)]
pub(crate) mod tests {
  use super::*;
  use std::sync::{Arc, Mutex};

  /// Records every requested URL and answers with a canned reply.
  #[derive(Clone)]
  pub(crate) struct RecordingTransport {
    pub calls: Arc<Mutex<Vec<String>>>,
    reply: Result<HttpReply, FetchError>,
  }

  impl RecordingTransport {
    pub(crate) fn ok(body: &str) -> Self {
      Self::with_reply(Ok(HttpReply { status: 200, body: body.to_string() }))
    }

    pub(crate) fn with_reply(reply: Result<HttpReply, FetchError>) -> Self {
      Self { calls: Arc::new(Mutex::new(Vec::new())), reply }
    }

    pub(crate) fn urls(&self) -> Vec<String> {
      self.calls.lock().unwrap().clone()
    }
  }

  impl Transport for RecordingTransport {
    async fn get(&self, url: &str) -> Result<HttpReply, FetchError> {
      self.calls.lock().unwrap().push(url.to_string());
      self.reply.clone()
    }
  }

  pub(crate) const SEARCH_PAYLOAD: &str = r#"{"items":[{"id":{"videoId":"abc123"},"snippet":{"title":"Song A","channelTitle":"Chan","thumbnails":{"medium":{"url":"http://x/a.jpg"}},"publishedAt":"2024-01-01T00:00:00Z"}}]}"#;

  const POPULAR_PAYLOAD: &str = r#"{"items":[{"id":"xyz789","snippet":{"title":"Hit","channelTitle":"Label","thumbnails":{"medium":{"url":"http://x/b.jpg"}},"publishedAt":"2024-03-05T10:30:00Z"}}]}"#;

  fn fetcher(transport: RecordingTransport) -> ResultFetcher<RecordingTransport> {
    ResultFetcher::with_transport(transport, Some("test-key".to_string()), "IN")
  }

  fn many_items(n: usize) -> String {
    let items: Vec<String> = (0..n)
      .map(|i| {
        format!(
          r#"{{"id":{{"videoId":"v{i}"}},"snippet":{{"title":"T{i}","channelTitle":"C","thumbnails":{{}},"publishedAt":"2024-01-01T00:00:00Z"}}}}"#
        )
      })
      .collect();
    format!(r#"{{"items":[{}]}}"#, items.join(","))
  }

  // --- fetch ---

  #[tokio::test]
  async fn empty_query_issues_no_request() {
    let transport = RecordingTransport::ok(SEARCH_PAYLOAD);
    let f = fetcher(transport.clone());
    assert_eq!(f.fetch("").await, Ok(Vec::new()));
    assert_eq!(f.fetch("   ").await, Ok(Vec::new()));
    assert!(transport.urls().is_empty());
  }

  #[tokio::test]
  async fn query_issues_exactly_one_encoded_request() {
    let transport = RecordingTransport::ok(SEARCH_PAYLOAD);
    let f = fetcher(transport.clone());
    f.fetch("lofi chill & beats").await.unwrap();
    let urls = transport.urls();
    assert_eq!(urls.len(), 1);
    assert!(urls[0].contains("/search?"));
    assert!(urls[0].contains("q=lofi%20chill%20%26%20beats"));
    assert!(urls[0].contains("part=snippet"));
    assert!(urls[0].contains("type=video"));
    assert!(urls[0].contains("maxResults=12"));
    assert!(urls[0].contains("key=test-key"));
  }

  #[tokio::test]
  async fn search_payload_maps_nested_id() {
    let f = fetcher(RecordingTransport::ok(SEARCH_PAYLOAD));
    let results = f.fetch("song").await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].external_id, "abc123");
    assert_eq!(results[0].title, "Song A");
    assert_eq!(results[0].channel_name, "Chan");
    assert_eq!(results[0].thumbnail_url, "http://x/a.jpg");
    assert_eq!(results[0].published_at.to_rfc3339(), "2024-01-01T00:00:00+00:00");
  }

  #[tokio::test]
  async fn popular_payload_maps_flat_id() {
    let transport = RecordingTransport::ok(POPULAR_PAYLOAD);
    let f = fetcher(transport.clone());
    let results = f.fetch_popular().await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].external_id, "xyz789");
    let urls = transport.urls();
    assert_eq!(urls.len(), 1);
    assert!(urls[0].contains("/videos?"));
    assert!(urls[0].contains("chart=mostPopular"));
    assert!(urls[0].contains("regionCode=IN"));
    assert!(!urls[0].contains("q="));
  }

  #[tokio::test]
  async fn results_never_exceed_cap() {
    let f = fetcher(RecordingTransport::ok(&many_items(20)));
    let results = f.fetch("anything").await.unwrap();
    assert_eq!(results.len(), f.max_results());
    assert_eq!(results[0].external_id, "v0");
  }

  #[tokio::test]
  async fn non_success_status_is_network_failure() {
    let body = r#"{"error":{"code":403,"message":"quotaExceeded"}}"#;
    let f = fetcher(RecordingTransport::with_reply(Ok(HttpReply { status: 403, body: body.to_string() })));
    let err = f.fetch("x").await.unwrap_err();
    assert_eq!(err, FetchError::Network("HTTP 403: quotaExceeded".to_string()));
    assert_eq!(err.kind(), "network");
  }

  #[tokio::test]
  async fn transport_error_is_network_failure() {
    let f = fetcher(RecordingTransport::with_reply(Err(FetchError::Network("connection refused".to_string()))));
    assert!(matches!(f.fetch_popular().await, Err(FetchError::Network(_))));
  }

  #[tokio::test]
  async fn missing_fields_are_malformed() {
    let f = fetcher(RecordingTransport::ok(r#"{"items":[{"id":{"videoId":"a"}}]}"#));
    assert!(matches!(f.fetch("x").await, Err(FetchError::MalformedResponse(_))));

    let f = fetcher(RecordingTransport::ok(r#"{"kind":"youtube#searchListResponse"}"#));
    assert!(matches!(f.fetch("x").await, Err(FetchError::MalformedResponse(_))));

    let f = fetcher(RecordingTransport::ok("<html>"));
    assert!(matches!(f.fetch("x").await, Err(FetchError::MalformedResponse(_))));
  }

  #[tokio::test]
  async fn bad_timestamp_is_malformed() {
    let body = SEARCH_PAYLOAD.replace("2024-01-01T00:00:00Z", "yesterday");
    let f = fetcher(RecordingTransport::ok(&body));
    let err = f.fetch("x").await.unwrap_err();
    assert_eq!(err.kind(), "malformed_response");
  }

  #[tokio::test]
  async fn missing_key_fails_without_request() {
    let transport = RecordingTransport::ok(SEARCH_PAYLOAD);
    let f = ResultFetcher::with_transport(transport.clone(), None, "IN");
    assert!(matches!(f.fetch("x").await, Err(FetchError::MissingCredential(_))));
    assert!(matches!(f.fetch_popular().await, Err(FetchError::MissingCredential(_))));

    let f = ResultFetcher::with_transport(transport.clone(), Some("  ".to_string()), "IN");
    assert!(matches!(f.fetch("x").await, Err(FetchError::MissingCredential(_))));
    assert!(transport.urls().is_empty());
  }

  // --- parse_items ---

  #[test]
  fn skips_items_without_video_id() {
    let body = r#"{"items":[
      {"id":{"channelId":"UC1"},"snippet":{"title":"A channel","channelTitle":"C","publishedAt":"2024-01-01T00:00:00Z"}},
      {"id":{"videoId":"v1"},"snippet":{"title":"A video","channelTitle":"C","publishedAt":"2024-01-01T00:00:00Z"}}
    ]}"#;
    let results = parse_items(body, 12).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].external_id, "v1");
  }

  #[test]
  fn thumbnail_falls_back_to_default() {
    let body = r#"{"items":[{"id":"v1","snippet":{"title":"t","channelTitle":"c","thumbnails":{"default":{"url":"http://x/d.jpg"}},"publishedAt":"2024-01-01T00:00:00Z"}}]}"#;
    assert_eq!(parse_items(body, 12).unwrap()[0].thumbnail_url, "http://x/d.jpg");
  }

  #[test]
  fn empty_items_is_empty_set() {
    assert!(parse_items(r#"{"items":[]}"#, 12).unwrap().is_empty());
  }

  // --- decode_entities ---

  #[test]
  fn decodes_common_entities() {
    assert_eq!(decode_entities("Rock &amp; Roll &#39;99"), "Rock & Roll '99");
    assert_eq!(decode_entities("&quot;Live&quot; &lt;3"), "\"Live\" <3");
    assert_eq!(decode_entities("&amp;lt;"), "&lt;");
    assert_eq!(decode_entities("plain"), "plain");
  }

  #[test]
  fn decodes_numeric_and_named_entities_in_snippets() {
    assert_eq!(decode_entities("Don&#x27;t Stop &#8211; Live"), "Don't Stop – Live");
    assert_eq!(decode_entities("Caf&eacute;"), "Café");

    let body = r#"{"items":[{"id":"n1","snippet":{"title":"Don&#x27;t Stop &#8211; Live","channelTitle":"Caf&eacute;","publishedAt":"2024-01-01T00:00:00Z","thumbnails":{}}}]}"#;
    let results = parse_items(body, 12).unwrap();
    assert_eq!(results[0].title, "Don't Stop – Live");
    assert_eq!(results[0].channel_name, "Café");
  }
}
