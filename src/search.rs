//! Offline search over the cache.
//!
//! Works entirely against the local `CacheStore`, no network access.
//!
//! # Matching
//!
//! The query is split on whitespace into lowercase terms. A record matches when
//! every term is found (case-insensitive substring) in at least one field of the
//! requested categories, or of all categories when none are requested. List
//! fields match when any element does; for people and topics the element's
//! display name is compared.
//!
//! # Ranking
//!
//! Per term, scores add up:
//!
//! ```text
//! title contains term          +10
//! tag equals term               +8
//! channel contains term         +5
//! tag contains term (not equal) +3
//! description contains term     +2
//! ```
//!
//! Ties are broken by publish time (newest first), then by id ascending, so
//! results are deterministic.

use color_eyre::{eyre::eyre, Result};
use std::str::FromStr;
use std::sync::Arc;

use crate::cache::{CacheStore, CachedRecord};

const TITLE_SCORE: u32 = 10;
const TAG_EXACT_SCORE: u32 = 8;
const CHANNEL_SCORE: u32 = 5;
const TAG_PARTIAL_SCORE: u32 = 3;
const DESCRIPTION_SCORE: u32 = 2;

/// Searchable field groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchCategory {
  Title,
  Channel,
  Description,
  Tags,
  People,
  Topics,
}

impl SearchCategory {
  pub const ALL: [SearchCategory; 6] = [
    SearchCategory::Title,
    SearchCategory::Channel,
    SearchCategory::Description,
    SearchCategory::Tags,
    SearchCategory::People,
    SearchCategory::Topics,
  ];

  /// Does `term` (already lowercase) occur in this category of `record`?
  fn matches(&self, record: &CachedRecord, term: &str) -> bool {
    match self {
      SearchCategory::Title => contains(&record.title, term),
      SearchCategory::Channel => contains(&record.channel, term),
      SearchCategory::Description => contains(&record.description, term),
      SearchCategory::Tags => record.tags.iter().any(|t| contains(t, term)),
      SearchCategory::People => record.people.iter().any(|p| contains(&p.name, term)),
      SearchCategory::Topics => record.topics.iter().any(|t| contains(&t.name, term)),
    }
  }
}

impl FromStr for SearchCategory {
  type Err = color_eyre::Report;

  fn from_str(s: &str) -> Result<Self> {
    match s.trim().to_lowercase().as_str() {
      "title" | "titles" => Ok(SearchCategory::Title),
      "channel" | "channels" => Ok(SearchCategory::Channel),
      "description" | "descriptions" => Ok(SearchCategory::Description),
      "tag" | "tags" => Ok(SearchCategory::Tags),
      "people" | "person" | "speakers" => Ok(SearchCategory::People),
      "topic" | "topics" => Ok(SearchCategory::Topics),
      other => Err(eyre!("Unknown search category '{}'", other)),
    }
  }
}

fn contains(field: &str, term: &str) -> bool {
  field.to_lowercase().contains(term)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
  pub text: String,
  /// Empty means every category
  pub categories: Vec<SearchCategory>,
  pub limit: usize,
  pub offset: usize,
}

impl SearchQuery {
  pub fn new(text: impl Into<String>) -> Self {
    Self {
      text: text.into(),
      categories: Vec::new(),
      limit: 20,
      offset: 0,
    }
  }

  pub fn limit(mut self, limit: usize) -> Self {
    self.limit = limit;
    self
  }

  pub fn offset(mut self, offset: usize) -> Self {
    self.offset = offset;
    self
  }

  pub fn categories(mut self, categories: Vec<SearchCategory>) -> Self {
    self.categories = categories;
    self
  }

  fn terms(&self) -> Vec<String> {
    self
      .text
      .split_whitespace()
      .map(|t| t.to_lowercase())
      .collect()
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchResults {
  /// The requested page
  pub records: Vec<CachedRecord>,
  /// Number of matches before paging
  pub total: usize,
}

/// Relevance score of `record` for the given lowercase terms.
pub fn score(record: &CachedRecord, terms: &[String]) -> u32 {
  let title = record.title.to_lowercase();
  let channel = record.channel.to_lowercase();
  let description = record.description.to_lowercase();
  let tags: Vec<String> = record.tags.iter().map(|t| t.to_lowercase()).collect();

  terms
    .iter()
    .map(|term| {
      let term = term.as_str();
      let mut s = 0;
      if title.contains(term) {
        s += TITLE_SCORE;
      }
      if channel.contains(term) {
        s += CHANNEL_SCORE;
      }
      if tags.iter().any(|t| t == term) {
        s += TAG_EXACT_SCORE;
      } else if tags.iter().any(|t| t.contains(term)) {
        s += TAG_PARTIAL_SCORE;
      }
      if description.contains(term) {
        s += DESCRIPTION_SCORE;
      }
      s
    })
    .sum()
}

fn page<T>(items: Vec<T>, offset: usize, limit: usize) -> Vec<T> {
  items.into_iter().skip(offset).take(limit).collect()
}

/// Search engine that reads only from the local cache.
#[derive(Clone)]
pub struct OfflineSearch {
  store: Arc<dyn CacheStore>,
}

impl OfflineSearch {
  pub fn new(store: Arc<dyn CacheStore>) -> Self {
    Self { store }
  }

  pub fn search(&self, query: &SearchQuery) -> Result<SearchResults> {
    let records = self.store.get_all_sorted_by_publish_desc()?;
    let terms = query.terms();

    if terms.is_empty() {
      let total = records.len();
      return Ok(SearchResults {
        records: page(records, query.offset, query.limit),
        total,
      });
    }

    let categories: &[SearchCategory] = if query.categories.is_empty() {
      &SearchCategory::ALL
    } else {
      &query.categories
    };

    let mut scored: Vec<(u32, CachedRecord)> = records
      .into_iter()
      .filter(|record| {
        terms
          .iter()
          .all(|term| categories.iter().any(|c| c.matches(record, term)))
      })
      .map(|record| (score(&record, &terms), record))
      .collect();

    scored.sort_by(|(sa, a), (sb, b)| {
      sb.cmp(sa)
        .then_with(|| b.published_at.cmp(&a.published_at))
        .then_with(|| a.id.cmp(&b.id))
    });

    let total = scored.len();
    let records = page(scored, query.offset, query.limit)
      .into_iter()
      .map(|(_, record)| record)
      .collect();

    Ok(SearchResults { records, total })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::fixtures::record;
  use crate::cache::{LinkedEntity, SqliteCacheStore};
  use crate::db::Database;

  fn engine(records: &[CachedRecord]) -> OfflineSearch {
    let store = SqliteCacheStore::new(Database::open_in_memory().unwrap());
    store.put_many(records).unwrap();
    OfflineSearch::new(Arc::new(store))
  }

  fn two_records() -> Vec<CachedRecord> {
    let mut a = record("A", 2024, 2, 1);
    a.title = "Bitcoin halving explained".into();
    let mut b = record("B", 2024, 1, 1);
    b.title = "Cooking with cast iron".into();
    vec![a, b]
  }

  fn ids(results: &SearchResults) -> Vec<&str> {
    results.records.iter().map(|r| r.id.as_str()).collect()
  }

  #[test]
  fn test_empty_query_returns_newest_first_page() {
    let engine = engine(&two_records());
    let results = engine.search(&SearchQuery::new("").limit(1)).unwrap();
    assert_eq!(ids(&results), vec!["A"]);
    assert_eq!(results.total, 2);

    let results = engine
      .search(&SearchQuery::new("   ").limit(1).offset(1))
      .unwrap();
    assert_eq!(ids(&results), vec!["B"]);
    assert_eq!(results.total, 2);
  }

  #[test]
  fn test_single_term_match() {
    let engine = engine(&two_records());
    let results = engine.search(&SearchQuery::new("bitcoin")).unwrap();
    assert_eq!(ids(&results), vec!["A"]);
    assert_eq!(results.total, 1);
  }

  #[test]
  fn test_all_terms_must_match_one_record() {
    let engine = engine(&two_records());
    let results = engine.search(&SearchQuery::new("bitcoin ethereum")).unwrap();
    assert!(results.records.is_empty());
    assert_eq!(results.total, 0);
  }

  #[test]
  fn test_terms_may_match_different_fields() {
    let mut recs = two_records();
    recs[0].channel = "Crypto Weekly".into();
    let engine = engine(&recs);
    let results = engine.search(&SearchQuery::new("BITCOIN weekly")).unwrap();
    assert_eq!(ids(&results), vec!["A"]);
  }

  #[test]
  fn test_categories_restrict_matching() {
    let mut recs = two_records();
    recs[1].description = "No bitcoin here, just pans".into();
    let engine = engine(&recs);

    let all = engine.search(&SearchQuery::new("bitcoin")).unwrap();
    assert_eq!(all.total, 2);

    let titles_only = engine
      .search(&SearchQuery::new("bitcoin").categories(vec![SearchCategory::Title]))
      .unwrap();
    assert_eq!(ids(&titles_only), vec!["A"]);

    let descriptions_only = engine
      .search(&SearchQuery::new("bitcoin").categories(vec![SearchCategory::Description]))
      .unwrap();
    assert_eq!(ids(&descriptions_only), vec!["B"]);
  }

  #[test]
  fn test_linked_entities_match_on_name() {
    let mut recs = two_records();
    recs[1].people = vec![LinkedEntity {
      id: "p-77".into(),
      name: "Ada Lovelace".into(),
    }];
    recs[0].topics = vec![LinkedEntity {
      id: "t-1".into(),
      name: "Monetary policy".into(),
    }];
    let engine = engine(&recs);

    let results = engine.search(&SearchQuery::new("lovelace")).unwrap();
    assert_eq!(ids(&results), vec!["B"]);

    // The id sub-field is not searchable
    assert_eq!(engine.search(&SearchQuery::new("p-77")).unwrap().total, 0);

    let results = engine
      .search(&SearchQuery::new("monetary").categories(vec![SearchCategory::Topics]))
      .unwrap();
    assert_eq!(ids(&results), vec!["A"]);
  }

  #[test]
  fn test_score_weights() {
    let mut rec = record("x", 2024, 1, 1);
    rec.title = "Rust async".into();
    rec.channel = "Rustacean Station".into();
    rec.description = "all about rust".into();
    rec.tags = vec!["rust".into(), "rustlang".into()];

    let terms = vec!["rust".to_string()];
    assert_eq!(score(&rec, &terms), 10 + 5 + 8 + 2);

    rec.tags = vec!["rustlang".into()];
    assert_eq!(score(&rec, &terms), 10 + 5 + 3 + 2);

    let terms = vec!["rust".to_string(), "async".to_string()];
    assert_eq!(score(&rec, &terms), (10 + 5 + 3 + 2) + 10);
  }

  #[test]
  fn test_ranked_by_score_then_recency_then_id() {
    let mut title_hit = record("t", 2023, 1, 1);
    title_hit.title = "Ethereum roadmap".into();
    let mut desc_new = record("d2", 2024, 6, 1);
    desc_new.description = "mentions ethereum".into();
    let mut desc_old = record("d1", 2024, 1, 1);
    desc_old.description = "mentions ethereum too".into();
    let mut same_b = record("sb", 2022, 1, 1);
    same_b.description = "ethereum".into();
    let mut same_a = record("sa", 2022, 1, 1);
    same_a.description = "ethereum".into();

    let engine = engine(&[desc_old, same_b, title_hit, desc_new, same_a]);
    let results = engine.search(&SearchQuery::new("ethereum")).unwrap();
    assert_eq!(ids(&results), vec!["t", "d2", "d1", "sa", "sb"]);
    assert_eq!(results.total, 5);

    let page = engine
      .search(&SearchQuery::new("ethereum").limit(2).offset(1))
      .unwrap();
    assert_eq!(ids(&page), vec!["d2", "d1"]);
    assert_eq!(page.total, 5);
  }

  #[test]
  fn test_offset_past_end_is_empty() {
    let engine = engine(&two_records());
    let results = engine
      .search(&SearchQuery::new("").limit(10).offset(5))
      .unwrap();
    assert!(results.records.is_empty());
    assert_eq!(results.total, 2);
  }

  #[test]
  fn test_parse_categories() {
    assert_eq!("Tags".parse::<SearchCategory>().unwrap(), SearchCategory::Tags);
    assert_eq!("people".parse::<SearchCategory>().unwrap(), SearchCategory::People);
    assert!("thumbnails".parse::<SearchCategory>().is_err());
  }
}
