// tests/providers_fixtures.rs
use mergelines::headline::Source;
use mergelines::ingest::providers::{HackerNewsProvider, NineToFiveMacProvider, TechmemeProvider};
use mergelines::ingest::types::SourceProvider;
use std::fs;

#[tokio::test]
async fn parses_techmeme_fixture() {
    let html = fs::read_to_string("tests/fixtures/techmeme.html").expect("fixture");
    let p = TechmemeProvider::from_fixture(&html);
    assert_eq!(p.source(), Source::Techmeme);
    let out = p.fetch_latest().await.expect("ok");

    let titles: Vec<&str> = out.iter().map(|h| h.title.as_str()).collect();
    assert_eq!(
        titles,
        vec![
            "Apple unveils M5 MacBook Pro and iPad Pro with faster Neural Accelerators",
            "Nvidia agrees to invest $5B in Intel and co-develop PC chips",
            "OpenAI launches Sora app for iOS, reaching top of App Store",
            "EU fines Google €2.95B over adtech practices",
        ]
    );
    let positions: Vec<i64> = out.iter().map(|h| h.popularity).collect();
    assert_eq!(positions, vec![0, 1, 2, 3]);
    assert_eq!(out[2].url, "https://www.techmeme.com/251001/p12#a251001p12");
    assert!(out.iter().all(|h| !h.url.contains("/r2/")));
}

#[tokio::test]
async fn parses_hackernews_fixture() {
    let json = fs::read_to_string("tests/fixtures/hackernews.json").expect("fixture");
    let out = HackerNewsProvider::from_fixture(&json)
        .fetch_latest()
        .await
        .expect("ok");

    assert_eq!(out.len(), 4);
    assert!(out.iter().all(|h| h.source == Source::HackerNews));
    assert_eq!(out[0].popularity, 512);
    assert_eq!(out[0].points, Some(512));
    assert_eq!(out[0].comment_count, Some(300));

    let ask = &out[1];
    assert_eq!(ask.url, "https://news.ycombinator.com/item?id=45438503");
    assert_eq!(ask.discussion_url.as_deref(), Some(ask.url.as_str()));
}

#[tokio::test]
async fn parses_9to5mac_fixture() {
    let xml = fs::read_to_string("tests/fixtures/9to5mac.xml").expect("fixture");
    let out = NineToFiveMacProvider::from_fixture(&xml)
        .fetch_latest()
        .await
        .expect("ok");

    let titles: Vec<&str> = out.iter().map(|h| h.title.as_str()).collect();
    assert_eq!(
        titles,
        vec![
            "OpenAI's Sora app hits No. 1 on the App Store",
            "iOS 26.1 beta 3 now available for developers",
            "Here's everything new in macOS Tahoe 26.1",
        ]
    );
    assert_eq!(out[0].popularity, 88);
    assert_eq!(out[0].timestamp.to_rfc3339(), "2025-10-03T14:12:00+00:00");
    assert!(out.iter().all(|h| h.comment_count.is_some()));
}
