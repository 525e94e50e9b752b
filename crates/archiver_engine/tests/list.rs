use std::num::NonZeroU32;
use std::sync::Arc;

use archiver_core::DateRange;
use archiver_engine::{list_posts, FetchSettings, ListError, ListQuery, RateLimiter, ReqwestFetcher};
use futures_util::StreamExt;
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fetcher() -> ReqwestFetcher {
    let limiter = Arc::new(RateLimiter::per_second(NonZeroU32::new(1_000).unwrap()));
    ReqwestFetcher::new(FetchSettings::default(), limiter).expect("client")
}

fn post(id: u32, date: &str) -> serde_json::Value {
    json!({
        "id": id,
        "slug": format!("post-{id}"),
        "title": format!("Post {id}"),
        "canonical_url": format!("https://blog.example.com/p/post-{id}"),
        "post_date": date,
    })
}

async fn mount_page(server: &MockServer, offset: usize, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/api/v1/posts"))
        .and(query_param("offset", offset.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

async fn collect(
    fetcher: &ReqwestFetcher,
    source: &str,
    query: ListQuery,
) -> Vec<Result<archiver_core::Post, ListError>> {
    list_posts(fetcher, source, query).collect().await
}

#[tokio::test]
async fn walks_pages_until_a_short_page() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        0,
        json!([post(5, "2024-05-01"), post(4, "2024-04-01")]),
    )
    .await;
    mount_page(&server, 2, json!([post(3, "2024-03-01T10:00:00Z")])).await;

    let query = ListQuery {
        page_size: 2,
        ..ListQuery::default()
    };
    let posts: Vec<_> = collect(&fetcher(), &server.uri(), query)
        .await
        .into_iter()
        .map(|p| p.expect("post").stable_id)
        .collect();
    assert_eq!(posts, vec!["5", "4", "3"]);
}

#[tokio::test]
async fn wrapped_pages_stop_at_total() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        0,
        json!({"posts": [post(2, "2024-02-01"), post(1, "2024-01-01")], "total": 2}),
    )
    .await;

    let query = ListQuery {
        page_size: 2,
        ..ListQuery::default()
    };
    let posts = collect(&fetcher(), &server.uri(), query).await;
    assert_eq!(posts.len(), 2);
    // No request for offset 2 was mounted; reaching it would have surfaced an error.
    assert!(posts.iter().all(Result::is_ok));
}

#[tokio::test]
async fn date_filter_is_inclusive_and_applies_before_limit() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        0,
        json!([
            post(5, "2024-05-01"),
            post(4, "2024-04-30T23:59:59Z"),
            post(3, "2024-04-15"),
            post(2, "2024-04-01T00:00:00Z"),
            post(1, "2024-03-31"),
        ]),
    )
    .await;

    let range = DateRange::parse(Some("2024-04-01"), Some("2024-04-30")).unwrap();
    let all: Vec<_> = collect(&fetcher(), &server.uri(), ListQuery::new(range, None))
        .await
        .into_iter()
        .map(|p| p.unwrap().stable_id)
        .collect();
    assert_eq!(all, vec!["4", "3", "2"]);

    let limited: Vec<_> = collect(&fetcher(), &server.uri(), ListQuery::new(range, Some(2)))
        .await
        .into_iter()
        .map(|p| p.unwrap().stable_id)
        .collect();
    assert_eq!(limited, vec!["4", "3"]);
}

#[tokio::test]
async fn listing_is_restartable() {
    let server = MockServer::start().await;
    mount_page(&server, 0, json!([post(2, "2024-02-01"), post(1, "2024-01-01")])).await;

    let fetcher = fetcher();
    let first: Vec<_> = collect(&fetcher, &server.uri(), ListQuery::default())
        .await
        .into_iter()
        .map(Result::unwrap)
        .collect();
    let second: Vec<_> = collect(&fetcher, &server.uri(), ListQuery::default())
        .await
        .into_iter()
        .map(Result::unwrap)
        .collect();
    assert_eq!(first, second);
}

#[tokio::test]
async fn malformed_page_ends_the_listing_with_a_parse_error() {
    let server = MockServer::start().await;
    mount_page(&server, 0, json!([post(3, "2024-03-01"), post(2, "2024-02-01")])).await;
    mount_page(&server, 2, json!({"unexpected": true})).await;

    let query = ListQuery {
        page_size: 2,
        ..ListQuery::default()
    };
    let items = collect(&fetcher(), &server.uri(), query).await;
    assert_eq!(items.len(), 3);
    assert!(items[0].is_ok());
    assert!(items[1].is_ok());
    assert!(matches!(items[2], Err(ListError::Parse { .. })));
}

#[tokio::test]
async fn bad_post_date_is_a_parse_error() {
    let server = MockServer::start().await;
    mount_page(&server, 0, json!([post(1, "last tuesday")])).await;

    let items = collect(&fetcher(), &server.uri(), ListQuery::default()).await;
    assert_eq!(items.len(), 1);
    assert!(matches!(items[0], Err(ListError::Parse { .. })));
}
