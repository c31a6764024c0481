//! End-to-end tests: feeds served by wiremock, fetched by the scheduler and
//! stored in SQLite.
//!
//! Each test creates its own in-memory SQLite database for isolation.

use chrono::{TimeZone, Utc};
use gator::commands;
use gator::feed::Fetcher;
use gator::scheduler::{Scheduler, TickReport};
use gator::shutdown::Shutdown;
use gator::storage::{Database, Feed, User};
use pretty_assertions::assert_eq;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const BOOT_DEV_RSS: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<rss version="2.0" xmlns:atom="http://www.w3.org/2005/Atom">
  <channel>
    <title>Boot.dev Blog</title>
    <link>https://blog.boot.dev/</link>
    <description>Recent content on Boot.dev Blog</description>
    <atom:link href="https://blog.boot.dev/index.xml" rel="self" type="application/rss+xml" />
    <item>
      <title>Rust &amp; Go: a comparison</title>
      <link>https://blog.boot.dev/rust-vs-go/</link>
      <pubDate>Mon, 02 Jan 2006 15:04:05 -0700</pubDate>
      <description>Which one &lt;wins&gt;?</description>
    </item>
    <item>
      <title>Named zones</title>
      <link>https://blog.boot.dev/named/</link>
      <pubDate>Mon, 02 Jan 2006 15:04:05 MST</pubDate>
    </item>
    <item>
      <title>Short form</title>
      <link>https://blog.boot.dev/short/</link>
      <pubDate>02 Jan 06 15:04 MST</pubDate>
    </item>
    <lastBuildDate>Mon, 02 Jan 2006 15:04:05 -0700</lastBuildDate>
    <item>
      <title>Zulu</title>
      <link>https://blog.boot.dev/zulu/</link>
      <pubDate>2006-01-02T15:04:05Z</pubDate>
    </item>
    <item>
      <title>Undated</title>
      <link>https://blog.boot.dev/undated/</link>
      <pubDate>sometime last week</pubDate>
    </item>
  </channel>
</rss>"#;

async fn setup() -> (Database, User) {
    let db = Database::open(":memory:").await.unwrap();
    let user = commands::register(&db, "kahya").await.unwrap();
    (db, user)
}

async fn serve(server: &MockServer, route: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

async fn add(db: &Database, user: &User, name: &str, url: String) -> Feed {
    commands::add_feed(db, user, name, &url).await.unwrap().0
}

#[tokio::test]
async fn test_single_feed_end_to_end() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/index.xml"))
        .and(header("User-Agent", "gator"))
        .respond_with(ResponseTemplate::new(200).set_body_string(BOOT_DEV_RSS))
        .expect(1)
        .mount(&server)
        .await;

    let (db, user) = setup().await;
    let feed = add(&db, &user, "Boot.dev", format!("{}/index.xml", server.uri())).await;
    let scheduler = Scheduler::new(db.clone(), Fetcher::default());

    let report = scheduler.tick(&Shutdown::never()).await;
    assert_eq!(
        report,
        TickReport {
            feeds_claimed: 1,
            posts_inserted: 5,
            ..TickReport::default()
        }
    );

    let stamped = db.get_feed(feed.id).await.unwrap();
    assert!(stamped.last_fetched_at.is_some());

    let posts = commands::browse(&db, &user, 10).await.unwrap();
    assert_eq!(posts.len(), 5);

    let by_url = |url: &str| posts.iter().find(|p| p.url == url).unwrap().clone();

    let numeric = by_url("https://blog.boot.dev/rust-vs-go/");
    assert_eq!(numeric.title, "Rust & Go: a comparison");
    assert_eq!(numeric.description, "Which one <wins>?");
    assert_eq!(
        numeric.published_at,
        Some(Utc.with_ymd_and_hms(2006, 1, 2, 22, 4, 5).unwrap())
    );
    assert_eq!(
        by_url("https://blog.boot.dev/named/").published_at,
        Some(Utc.with_ymd_and_hms(2006, 1, 2, 22, 4, 5).unwrap())
    );
    assert_eq!(
        by_url("https://blog.boot.dev/short/").published_at,
        Some(Utc.with_ymd_and_hms(2006, 1, 2, 22, 4, 0).unwrap())
    );
    assert_eq!(
        by_url("https://blog.boot.dev/zulu/").published_at,
        Some(Utc.with_ymd_and_hms(2006, 1, 2, 15, 4, 5).unwrap())
    );
    assert_eq!(by_url("https://blog.boot.dev/undated/").published_at, None);
}

#[tokio::test]
async fn test_refetch_creates_no_duplicates() {
    let server = MockServer::start().await;
    serve(&server, "/index.xml", BOOT_DEV_RSS).await;

    let (db, user) = setup().await;
    add(&db, &user, "Boot.dev", format!("{}/index.xml", server.uri())).await;
    let scheduler = Scheduler::new(db.clone(), Fetcher::default());

    scheduler.tick(&Shutdown::never()).await;
    let second = scheduler.tick(&Shutdown::never()).await;

    assert_eq!(second.posts_inserted, 0);
    assert_eq!(second.duplicates, 5);
    assert_eq!(db.count_posts().await.unwrap(), 5);
}

#[tokio::test]
async fn test_unreachable_feed_does_not_stop_healthy_feed() {
    let server = MockServer::start().await;
    serve(&server, "/index.xml", BOOT_DEV_RSS).await;

    let (db, user) = setup().await;
    let down = add(&db, &user, "Down", "http://127.0.0.1:1/rss".to_string()).await;
    let healthy = add(&db, &user, "Boot.dev", format!("{}/index.xml", server.uri())).await;
    let scheduler = Scheduler::new(db.clone(), Fetcher::default());

    // One rotation: both never fetched, lowest id first
    let first = scheduler.tick(&Shutdown::never()).await;
    assert_eq!(first.fetch_failures, 1);
    assert_eq!(first.posts_inserted, 0);

    let second = scheduler.tick(&Shutdown::never()).await;
    assert_eq!(second.fetch_failures, 0);
    assert_eq!(second.posts_inserted, 5);

    assert!(db.get_feed(down.id).await.unwrap().last_fetched_at.is_some());
    assert!(db.get_feed(healthy.id).await.unwrap().last_fetched_at.is_some());
    assert_eq!(db.posts_for_feed(healthy.id).await.unwrap().len(), 5);
    assert!(db.posts_for_feed(down.id).await.unwrap().is_empty());

    // The unreachable feed is stalest again and comes back around
    let third = scheduler.tick(&Shutdown::never()).await;
    assert_eq!(third.fetch_failures, 1);
}

#[tokio::test]
async fn test_undecodable_feed_does_not_stop_healthy_feed() {
    let server = MockServer::start().await;
    serve(&server, "/broken.xml", "<rss><channel><item>").await;
    serve(&server, "/index.xml", BOOT_DEV_RSS).await;

    let (db, user) = setup().await;
    add(&db, &user, "Broken", format!("{}/broken.xml", server.uri())).await;
    add(&db, &user, "Boot.dev", format!("{}/index.xml", server.uri())).await;
    let scheduler = Scheduler::new(db.clone(), Fetcher::default());

    let first = scheduler.tick(&Shutdown::never()).await;
    let second = scheduler.tick(&Shutdown::never()).await;

    assert_eq!(first.fetch_failures + second.fetch_failures, 1);
    assert_eq!(second.posts_inserted, 5);
}

#[tokio::test]
async fn test_unreachable_feed_is_contained() {
    let (db, user) = setup().await;
    let feed = add(&db, &user, "Down", "http://127.0.0.1:1/rss".to_string()).await;
    let scheduler = Scheduler::new(db.clone(), Fetcher::default());

    let report = scheduler.tick(&Shutdown::never()).await;

    assert_eq!(report.fetch_failures, 1);
    assert!(db.get_feed(feed.id).await.unwrap().last_fetched_at.is_some());
}

#[tokio::test]
async fn test_no_feeds_tick_is_noop() {
    let (db, _) = setup().await;
    let scheduler = Scheduler::new(db.clone(), Fetcher::default());

    assert_eq!(scheduler.tick(&Shutdown::never()).await, TickReport::default());
    assert_eq!(db.count_posts().await.unwrap(), 0);
}
