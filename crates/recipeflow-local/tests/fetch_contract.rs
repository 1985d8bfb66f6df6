//! Fetcher contract tests against a local axum fixture server.
//!
//! Loopback is normally SSRF-blocked, so every test here opts into the
//! private-hosts escape hatch before touching the fetcher.

use axum::http::StatusCode;
use axum::response::{Html, IntoResponse};
use axum::{routing::get, Router};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use recipeflow_core::ProcessOptions;
use recipeflow_local::fetch::{Fetcher, MAX_CONTENT_BYTES};

fn allow_loopback() {
    std::env::set_var("RECIPEFLOW_ALLOW_PRIVATE_HOSTS", "1");
}

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind fixture listener");
    let addr: SocketAddr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("axum serve");
    });
    format!("http://{addr}")
}

fn fast_opts() -> ProcessOptions {
    ProcessOptions {
        retry_delay: Some(0.0),
        ..Default::default()
    }
}

#[tokio::test]
async fn fetches_html_and_reports_the_final_url() {
    allow_loopback();
    let app = Router::new().route(
        "/",
        get(|| async { Html("<html><body><h1>Tomato Soup</h1></body></html>") }),
    );
    let base = serve(app).await;

    let fetcher = Fetcher::new().unwrap();
    let page = fetcher.fetch(&format!("{base}/"), &fast_opts()).await.unwrap();
    assert_eq!(page.status, 200);
    assert!(page.content.contains("Tomato Soup"));
    assert!(page.final_url.starts_with("http://127.0.0.1"));
    assert!(!page.truncated);
}

#[tokio::test]
async fn http_429_is_retried_until_success() {
    allow_loopback();
    let hits = Arc::new(AtomicUsize::new(0));
    let hits2 = hits.clone();
    let app = Router::new().route(
        "/flaky",
        get(move || {
            let hits = hits2.clone();
            async move {
                if hits.fetch_add(1, Ordering::SeqCst) < 2 {
                    (StatusCode::TOO_MANY_REQUESTS, "slow down").into_response()
                } else {
                    Html("<p>recipe body</p>").into_response()
                }
            }
        }),
    );
    let base = serve(app).await;

    let fetcher = Fetcher::new().unwrap();
    let page = fetcher
        .fetch(&format!("{base}/flaky"), &fast_opts())
        .await
        .unwrap();
    assert!(page.content.contains("recipe body"));
    assert_eq!(hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn persistent_429_exhausts_into_an_aggregate_error() {
    allow_loopback();
    let app = Router::new().route(
        "/always429",
        get(|| async { (StatusCode::TOO_MANY_REQUESTS, "never") }),
    );
    let base = serve(app).await;

    let fetcher = Fetcher::new().unwrap();
    let err = fetcher
        .fetch(&format!("{base}/always429"), &fast_opts())
        .await
        .unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("after 3 attempts"), "{msg}");
    assert!(msg.contains("429"), "{msg}");
}

#[tokio::test]
async fn non_200_status_is_fatal_on_first_occurrence() {
    allow_loopback();
    let hits = Arc::new(AtomicUsize::new(0));
    let hits2 = hits.clone();
    let app = Router::new().route(
        "/missing",
        get(move || {
            let hits = hits2.clone();
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
                (StatusCode::NOT_FOUND, "nope")
            }
        }),
    );
    let base = serve(app).await;

    let fetcher = Fetcher::new().unwrap();
    let err = fetcher
        .fetch(&format!("{base}/missing"), &fast_opts())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("404"), "{err}");
    // No retries for a plain error status.
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn oversized_bodies_are_truncated_at_the_cap() {
    allow_loopback();
    let app = Router::new().route(
        "/huge",
        get(|| async { "a".repeat(MAX_CONTENT_BYTES + 1024) }),
    );
    let base = serve(app).await;

    let fetcher = Fetcher::new().unwrap();
    let page = fetcher
        .fetch(&format!("{base}/huge"), &fast_opts())
        .await
        .unwrap();
    assert!(page.truncated);
    assert_eq!(page.content.len(), MAX_CONTENT_BYTES);
}

#[tokio::test]
async fn reports_the_charset_from_the_content_type() {
    allow_loopback();
    let app = Router::new().route(
        "/",
        get(|| async {
            (
                [("content-type", "text/html; charset=UTF-8")],
                "<html><body>hi</body></html>",
            )
        }),
    );
    let base = serve(app).await;

    let fetcher = Fetcher::new().unwrap();
    let page = fetcher.fetch(&format!("{base}/"), &fast_opts()).await.unwrap();
    assert_eq!(page.encoding.as_deref(), Some("utf-8"));
}
