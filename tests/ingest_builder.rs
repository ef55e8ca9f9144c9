// tests/ingest_builder.rs
// Raw feed items in, canonical articles out.

mod common;

use common::*;
use hyperlocal_news::ingest::{DropReason, UNKNOWN_SOURCE};
use hyperlocal_news::{
    ArticleBuilder, ArticleStatus, FeedSource, JsonFileFeed, LangCode, RawFeedItem,
};

#[test]
fn same_item_always_gets_the_same_id() {
    let b = ArticleBuilder::default();
    let a1 = b.build(&nmc_item()).unwrap();
    let a2 = b.build(&nmc_item()).unwrap();
    assert_eq!(a1.id(), a2.id());
    assert_eq!(a1, a2);

    let other = b.build(&item(4)).unwrap();
    assert_ne!(a1.id(), other.id());
}

#[test]
fn new_article_is_pending_with_no_enrichment() {
    let a = ArticleBuilder::default().build(&nmc_item()).unwrap();
    assert_eq!(a.status(), ArticleStatus::Pending);
    assert!(a.enrichment().is_empty());
    assert_eq!(a.source_language(), LangCode::En);
    assert_eq!(a.title(), "NMC launches drive");
}

#[test]
fn duplicates_and_invalid_items_are_dropped() {
    let empty = RawFeedItem {
        source: "Lokmat".into(),
        ..Default::default()
    };
    let out = ArticleBuilder::default().build_batch(vec![nmc_item(), empty, nmc_item()], None);

    assert_eq!(out.articles.len(), 1);
    assert_eq!(out.dropped.len(), 2);
    assert!(out
        .dropped
        .iter()
        .any(|d| matches!(d.reason, DropReason::Validation { .. })));
    assert!(out
        .dropped
        .iter()
        .any(|d| matches!(&d.reason, DropReason::Duplicate { id } if id == out.articles[0].id())));
}

#[test]
fn items_without_a_source_are_kept() {
    let mut anonymous = item(5);
    anonymous.source = String::new();
    let out = ArticleBuilder::default().build_batch(vec![nmc_item(), anonymous], None);

    assert_eq!(out.articles.len(), 2);
    assert!(out.dropped.is_empty());
    assert!(out.articles.iter().any(|a| a.source() == UNKNOWN_SOURCE));
}

#[test]
fn batch_is_newest_first_and_capped() {
    let mut undated = item(9);
    undated.published = None;
    let items = vec![item(1), undated, item(7), item(3)];

    let out = ArticleBuilder::default().build_batch(items, Some(2));

    let titles: Vec<&str> = out.articles.iter().map(|a| a.title()).collect();
    assert_eq!(titles, vec!["Ward 7 water supply update", "Ward 3 water supply update"]);
    let over: Vec<&str> = out
        .dropped
        .iter()
        .filter(|d| d.reason == DropReason::OverLimit)
        .map(|d| d.title.as_str())
        .collect();
    // Undated items sort last, so they are the first to go.
    assert_eq!(over, vec!["Ward 1 water supply update", "Ward 9 water supply update"]);
}

#[test]
fn devanagari_without_declared_language_is_detected() {
    let raw = RawFeedItem {
        source: "Dainik Bhaskar Nagpur".into(),
        title: "नागपुर में जल आपूर्ति बहाल".into(),
        body: "नागपुर महानगर पालिका ने वार्ड 12 में जल आपूर्ति बहाल की।".into(),
        ..Default::default()
    };
    let a = ArticleBuilder::new(LangCode::Mr).build(&raw).unwrap();
    assert_eq!(a.source_language(), LangCode::Hi);
}

#[tokio::test]
async fn json_feed_feeds_the_builder() {
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path().join("items.json");
    let items = vec![nmc_item(), item(2)];
    std::fs::write(&p, serde_json::to_string(&items).unwrap()).unwrap();

    let fetched = JsonFileFeed::new(&p).fetch_items().await.unwrap();
    assert_eq!(fetched, items);

    let out = ArticleBuilder::default().build_batch(fetched, None);
    assert_eq!(out.articles.len(), 2);
    assert!(out.dropped.is_empty());
}

#[tokio::test]
async fn malformed_feed_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path().join("items.json");
    std::fs::write(&p, "{ not json").unwrap();
    let err = JsonFileFeed::new(&p).fetch_items().await.unwrap_err();
    assert!(format!("{err:#}").contains("parsing raw feed items"));
}
