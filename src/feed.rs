use futures::stream::{self, StreamExt};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::constants::constants;
use crate::youtube::{FetchError, ResultFetcher, ResultSet, SearchResult, Transport};

/// Key under which keyword search results are stored.
pub const SEARCH_KEY: &str = "search";

const SEARCH_LABEL: &str = "🔍 Search Results";

/// Where a shelf gets its results from.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub enum CategorySource {
  /// The region's most-popular music chart.
  Popular,
  /// A fixed keyword search.
  Query(String),
}

/// A start-up shelf, as configured in `constants.ron`.
#[derive(Debug, Clone, Deserialize)]
pub struct Category {
  pub key: String,
  pub label: String,
  pub source: CategorySource,
}

/// One fetch to run, tagged with the generation it was issued under.
#[derive(Debug, Clone)]
pub struct FetchRequest {
  pub key: String,
  pub generation: u64,
  pub source: CategorySource,
}

/// A completed fetch, delivered to the UI loop in completion order.
#[derive(Debug)]
pub struct FetchOutcome {
  pub key: String,
  pub generation: u64,
  pub result: Result<ResultSet, FetchError>,
}

/// Borrowed view of one non-empty shelf, ready for rendering.
#[derive(Debug, Clone, Copy)]
pub struct Shelf<'a> {
  pub key: &'a str,
  pub label: &'a str,
  pub results: &'a [SearchResult],
}

/// Result sets keyed by shelf. Each key is replaced wholesale on completion;
/// outcomes from a superseded request for the same key are dropped.
#[derive(Debug, Default)]
pub struct ResultSets {
  sets: HashMap<String, ResultSet>,
  issued: HashMap<String, u64>,
  settled: HashMap<String, u64>,
}

impl ResultSets {
  /// Record a new request for `key` and return its generation.
  pub fn begin(&mut self, key: &str) -> u64 {
    let generation = self.issued.entry(key.to_string()).or_insert(0);
    *generation += 1;
    *generation
  }

  /// Store `results` for `key` unless a newer request has been issued since.
  /// Returns whether the set was replaced.
  pub fn apply(&mut self, key: &str, generation: u64, results: ResultSet) -> bool {
    let latest = self.issued.get(key).copied().unwrap_or(0);
    if generation < latest {
      return false;
    }
    self.settled.insert(key.to_string(), generation);
    self.sets.insert(key.to_string(), results);
    true
  }

  /// Whether the newest request for `key` has not completed yet.
  pub fn is_pending(&self, key: &str) -> bool {
    self.issued.get(key).copied().unwrap_or(0) > self.settled.get(key).copied().unwrap_or(0)
  }

  pub fn any_pending(&self) -> bool {
    self.issued.keys().any(|k| self.is_pending(k))
  }

  pub fn get(&self, key: &str) -> Option<&ResultSet> {
    self.sets.get(key)
  }

  /// Look a result up by id across every shelf.
  pub fn find(&self, external_id: &str) -> Option<&SearchResult> {
    self.sets.values().flat_map(|set| set.iter()).find(|r| r.external_id == external_id)
  }

  /// Non-empty shelves in display order: search results first, then categories as configured.
  pub fn shelves<'a>(&'a self, categories: &'a [Category]) -> Vec<Shelf<'a>> {
    let mut shelves = Vec::new();
    if let Some(results) = self.sets.get(SEARCH_KEY)
      && !results.is_empty()
    {
      shelves.push(Shelf { key: SEARCH_KEY, label: SEARCH_LABEL, results });
    }
    for category in categories {
      if let Some(results) = self.sets.get(&category.key)
        && !results.is_empty()
      {
        shelves.push(Shelf { key: &category.key, label: &category.label, results });
      }
    }
    shelves
  }
}

/// Run `requests` concurrently (up to `feed_concurrency` at once), sending each
/// outcome through `tx` as soon as it completes.
pub async fn run_fetches<T: Transport>(
  fetcher: Arc<ResultFetcher<T>>,
  requests: Vec<FetchRequest>,
  tx: mpsc::UnboundedSender<FetchOutcome>,
) {
  stream::iter(requests)
    .map(|request| {
      let fetcher = Arc::clone(&fetcher);
      let tx = tx.clone();
      async move {
        let result = match &request.source {
          CategorySource::Popular => fetcher.fetch_popular().await,
          CategorySource::Query(query) => fetcher.fetch(query).await,
        };
        let _ = tx.send(FetchOutcome { key: request.key, generation: request.generation, result });
      }
    })
    .buffer_unordered(constants().feed_concurrency.max(1))
    .collect::<()>()
    .await;
}
