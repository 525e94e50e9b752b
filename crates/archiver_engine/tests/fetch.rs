use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};

use archiver_engine::{FailureKind, FetchSettings, Fetcher, RateLimiter, ReqwestFetcher, RetryPolicy};
use secrecy::SecretString;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_settings() -> FetchSettings {
    FetchSettings {
        retry: RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(40),
        },
        ..FetchSettings::default()
    }
}

fn unlimited() -> Arc<RateLimiter> {
    Arc::new(RateLimiter::per_second(NonZeroU32::new(1_000).unwrap()))
}

#[tokio::test]
async fn fetcher_returns_body_and_metadata() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/doc"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw("<html>ok</html>", "text/html; charset=utf-8"),
        )
        .mount(&server)
        .await;

    let fetcher = ReqwestFetcher::new(fast_settings(), unlimited()).expect("client");
    let url = format!("{}/doc", server.uri());

    let output = fetcher.get(&url).await.expect("fetch ok");
    assert_eq!(output.metadata.original_url, url);
    assert_eq!(output.metadata.final_url, url);
    assert_eq!(output.metadata.attempts, 1);
    assert_eq!(output.metadata.byte_len, 15);
    assert!(output
        .metadata
        .content_type
        .unwrap()
        .starts_with("text/html"));
    assert_eq!(output.bytes, b"<html>ok</html>");
}

#[tokio::test]
async fn transient_errors_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(200).set_body_string("finally"))
        .mount(&server)
        .await;

    let fetcher = ReqwestFetcher::new(fast_settings(), unlimited()).expect("client");
    let output = fetcher
        .get(&format!("{}/flaky", server.uri()))
        .await
        .expect("third attempt succeeds");
    assert_eq!(output.metadata.attempts, 3);
    assert_eq!(output.bytes, b"finally");
}

#[tokio::test]
async fn retries_stop_at_max_attempts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/down"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let fetcher = ReqwestFetcher::new(fast_settings(), unlimited()).expect("client");
    let err = fetcher
        .get(&format!("{}/down", server.uri()))
        .await
        .expect_err("should fail");
    assert_eq!(err.kind, FailureKind::HttpStatus(500));
    assert_eq!(err.attempts, 3);
}

#[tokio::test]
async fn client_errors_fail_immediately() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = ReqwestFetcher::new(fast_settings(), unlimited()).expect("client");
    let err = fetcher
        .get(&format!("{}/missing", server.uri()))
        .await
        .expect_err("should fail");
    assert_eq!(err.kind, FailureKind::HttpStatus(404));
    assert_eq!(err.attempts, 1);
}

#[tokio::test]
async fn auth_cookie_is_sent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/private"))
        .and(header("cookie", "session=s3cret"))
        .respond_with(ResponseTemplate::new(200).set_body_string("members only"))
        .mount(&server)
        .await;

    let settings = FetchSettings {
        auth_cookie: Some(SecretString::from("session=s3cret".to_string())),
        ..fast_settings()
    };
    let fetcher = ReqwestFetcher::new(settings, unlimited()).expect("client");
    let output = fetcher
        .get(&format!("{}/private", server.uri()))
        .await
        .expect("cookie matched");
    assert_eq!(output.bytes, b"members only");
    assert!(!format!("{fetcher:?}").contains("s3cret"));
}

#[tokio::test]
async fn slow_responses_time_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;

    let settings = FetchSettings {
        request_timeout: Duration::from_millis(100),
        retry: RetryPolicy {
            max_attempts: 1,
            ..RetryPolicy::default()
        },
        ..FetchSettings::default()
    };
    let fetcher = ReqwestFetcher::new(settings, unlimited()).expect("client");
    let err = fetcher
        .get(&format!("{}/slow", server.uri()))
        .await
        .expect_err("should time out");
    assert_eq!(err.kind, FailureKind::Timeout);
}

#[tokio::test]
async fn oversized_bodies_are_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/big"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![b'x'; 100]))
        .mount(&server)
        .await;

    let settings = FetchSettings {
        max_bytes: 10,
        ..fast_settings()
    };
    let fetcher = ReqwestFetcher::new(settings, unlimited()).expect("client");
    let err = fetcher
        .get(&format!("{}/big", server.uri()))
        .await
        .expect_err("too large");
    assert!(matches!(err.kind, FailureKind::TooLarge { max_bytes: 10, .. }));
}

#[tokio::test]
async fn invalid_urls_are_rejected_without_a_request() {
    let fetcher = ReqwestFetcher::new(fast_settings(), unlimited()).expect("client");
    let err = fetcher.get("not a url").await.expect_err("invalid");
    assert_eq!(err.kind, FailureKind::InvalidUrl);
}

#[tokio::test]
async fn shared_limiter_bounds_request_starts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;

    let limiter = Arc::new(RateLimiter::per_second(NonZeroU32::new(5).unwrap()));
    let fetcher = Arc::new(ReqwestFetcher::new(fast_settings(), limiter).expect("client"));

    let started = Instant::now();
    let calls = (0..10).map(|i| {
        let fetcher = fetcher.clone();
        let url = format!("{}/item/{i}", server.uri());
        async move { fetcher.get(&url).await }
    });
    let results = futures_util::future::join_all(calls).await;
    let elapsed = started.elapsed();

    assert!(results.iter().all(Result::is_ok));
    // Ten starts at five per second with a burst of one: the last may start no
    // earlier than nine periods (1.8 s) after the first.
    assert!(elapsed >= Duration::from_millis(1_700), "elapsed {elapsed:?}");
}
