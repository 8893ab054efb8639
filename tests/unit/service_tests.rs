// ImageService end-to-end tests against in-memory storage and a stub fetcher

use http::StatusCode;

use kagami::cache::{cache_control_for, CacheClassConfig, CachePolicyResolver, TtlConfig};
use kagami::fetch::StubReply;
use kagami::pipeline::ImageRequest;
use kagami::storage::StorageError;

use super::common::{error_code, Harness, HYBRID_CONFIG, RESIZER, STORAGE_CONFIG};

const ORIGINAL: &[u8] = b"\xff\xd8\xff original jpeg bytes";

#[tokio::test]
async fn test_path_derivative_goes_through_interceptor() {
    let h = Harness::new(STORAGE_CONFIG).with_image("thumbnails/cat.jpg", ORIGINAL);
    h.fetcher.on(RESIZER, StubReply::ok("image/webp", b"webp bytes"));

    let request = ImageRequest::get("https://images.example.com/thumbnails/cat.jpg")
        .unwrap()
        .with_header("accept", "image/webp,image/*;q=0.8");
    let response = h.send(request).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(&response.body[..], b"webp bytes");
    assert_eq!(
        response.header("cache-control"),
        Some("public, max-age=31536000")
    );
    assert_eq!(response.header("vary"), Some("Accept"));
    assert_eq!(response.header("debug-strategy"), Some("interceptor"));
    assert!(response
        .header("debug-options")
        .unwrap()
        .contains("derivative-thumbnail"));
    assert!(response.header("x-request-id").is_some());

    let urls = h.fetcher.urls();
    assert_eq!(
        urls,
        vec![format!(
            "{}/cdn-cgi/image/width=320,height=150,fit=scale-down,quality=85,format=webp/https://images.example.com/thumbnails/cat.jpg",
            RESIZER
        )]
    );
    assert_eq!(h.metrics.get_strategy_success("interceptor"), 1);
    assert_eq!(h.metrics.get_status_count(200), 1);
}

#[tokio::test]
async fn test_explicit_width_overrides_derivative() {
    let h = Harness::new(STORAGE_CONFIG).with_image("photos/cat.jpg", ORIGINAL);
    h.fetcher.on(RESIZER, StubReply::ok("image/jpeg", b"resized"));

    let response = h
        .get("https://images.example.com/photos/cat.jpg?derivative=thumbnail&width=999")
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert!(h.fetcher.urls()[0].contains("/width=999,height=150,"));
}

#[tokio::test]
async fn test_auto_width_never_reaches_resizer() {
    let h = Harness::new(STORAGE_CONFIG).with_image("photos/cat.jpg", ORIGINAL);
    h.fetcher.on(RESIZER, StubReply::ok("image/jpeg", b"resized"));

    let request = ImageRequest::get("https://images.example.com/photos/cat.jpg?width=auto")
        .unwrap()
        .with_header("sec-ch-viewport-width", "1200")
        .with_header("sec-ch-dpr", "2");
    let response = h.send(request).await;

    assert_eq!(response.status, StatusCode::OK);
    let url = &h.fetcher.urls()[0];
    // 1200 * 2 = 2400, nearest breakpoint is 2048
    assert!(url.contains("/width=2048,"), "unexpected url {}", url);
    assert!(!url.contains("width=auto"));
}

#[tokio::test]
async fn test_platform_domain_uses_direct_url() {
    let h = Harness::new(STORAGE_CONFIG).with_image("photos/cat.jpg", ORIGINAL);
    h.fetcher.on(RESIZER, StubReply::ok("image/jpeg", b"resized"));

    let response = h
        .get("https://kagami.acme.workers.dev/photos/cat.jpg?width=640")
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.header("debug-strategy"), Some("direct-url"));
    assert!(h.fetcher.urls()[0].ends_with("/https://bucket.example.org/photos/cat.jpg"));
}

#[tokio::test]
async fn test_failed_transforms_fall_through_to_direct_serving() {
    let h = Harness::new(STORAGE_CONFIG).with_image("photos/cat.jpg", ORIGINAL);
    h.fetcher
        .on(RESIZER, StubReply::status(StatusCode::SERVICE_UNAVAILABLE));

    let response = h.get("https://images.example.com/photos/cat.jpg?width=640").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(&response.body[..], ORIGINAL);
    assert_eq!(response.header("debug-strategy"), Some("direct-serving"));
    assert_eq!(
        response.header("debug-attempts"),
        Some("interceptor: status 503; direct-url: status 503; direct-serving: ok (200)")
    );
    assert_eq!(h.metrics.get_strategy_failure("interceptor"), 1);
    assert_eq!(h.metrics.get_strategy_failure("direct-url"), 1);
    assert_eq!(h.metrics.get_strategy_success("direct-serving"), 1);
}

#[tokio::test]
async fn test_marker_request_serves_raw_original() {
    let h = Harness::new(STORAGE_CONFIG).with_image("thumbnails/cat.jpg", ORIGINAL);

    let request = ImageRequest::get("https://images.example.com/thumbnails/cat.jpg?width=320")
        .unwrap()
        .with_header("via", "1.1 image-resizing");
    let response = h.send(request).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(&response.body[..], ORIGINAL);
    assert_eq!(response.header("content-type"), Some("image/jpeg"));
    assert!(h.fetcher.calls().is_empty());
    assert_eq!(h.metrics.get_reentrant_requests(), 1);
}

#[tokio::test]
async fn test_marker_request_for_missing_key_is_404() {
    let h = Harness::new(STORAGE_CONFIG);

    let request = ImageRequest::get("https://images.example.com/missing.jpg")
        .unwrap()
        .with_header("via", "1.1 Image-Resizing");
    let response = h.send(request).await;

    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert!(h.fetcher.calls().is_empty());
}

#[tokio::test]
async fn test_missing_key_short_circuits_with_404() {
    let h = Harness::new(STORAGE_CONFIG);

    let response = h.get("https://images.example.com/photos/missing.jpg").await;

    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(error_code(&response), "NOT_FOUND");
    assert_eq!(response.header("cache-control"), Some("no-store"));
    assert!(h.fetcher.calls().is_empty());
}

#[tokio::test]
async fn test_all_strategies_failing_is_502() {
    let h = Harness::new(HYBRID_CONFIG).with_image("photos/cat.jpg", ORIGINAL);
    h.fetcher.on(RESIZER, StubReply::status(StatusCode::BAD_GATEWAY));

    let response = h.get("https://images.example.com/photos/cat.jpg?width=640").await;

    assert_eq!(response.status, StatusCode::BAD_GATEWAY);
    assert_eq!(error_code(&response), "STRATEGIES_EXHAUSTED");
    assert_eq!(response.header("cache-control"), Some("no-store"));
    assert_eq!(
        response.header("debug-attempts"),
        Some("interceptor: status 502; direct-url: status 502; remote-fallback: status 502")
    );
    assert_eq!(h.fetcher.calls().len(), 3);
    assert_eq!(h.metrics.get_status_count(502), 1);
}

#[tokio::test]
async fn test_hybrid_missing_key_uses_remote_origin() {
    let h = Harness::new(HYBRID_CONFIG);
    h.fetcher.on(RESIZER, StubReply::ok("image/jpeg", b"from legacy"));

    let response = h.get("https://images.example.com/photos/cat.jpg?width=640").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.header("debug-strategy"), Some("remote-fallback"));
    assert!(h.fetcher.urls()[0].ends_with("/https://legacy.example.org/photos/cat.jpg"));
    assert_eq!(h.store.reads(), vec!["photos/cat.jpg".to_string()]);
}

#[tokio::test]
async fn test_explicit_format_skips_vary() {
    let h = Harness::new(STORAGE_CONFIG).with_image("photos/cat.jpg", ORIGINAL);
    h.fetcher.on(RESIZER, StubReply::ok("image/png", b"png"));

    let response = h
        .get("https://images.example.com/photos/cat.jpg?width=300&format=png")
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.header("vary"), None);
}

#[tokio::test]
async fn test_invalid_format_falls_back_to_negotiation_with_vary() {
    let h = Harness::new(STORAGE_CONFIG).with_image("photos/cat.jpg", ORIGINAL);
    h.fetcher.on(RESIZER, StubReply::ok("image/avif", b"avif"));

    let request = ImageRequest::get("https://images.example.com/photos/cat.jpg?width=300&format=bmp")
        .unwrap()
        .with_header("accept", "image/avif,image/webp");
    let response = h.send(request).await;

    assert_eq!(response.status, StatusCode::OK);
    assert!(h.fetcher.urls()[0].contains("format=avif"));
    assert_eq!(response.header("vary"), Some("Accept"));
}

#[tokio::test]
async fn test_response_cache_serves_repeat_requests() {
    let yaml = format!("{}response_cache:\n  enabled: true\n", STORAGE_CONFIG);
    let h = Harness::new(&yaml).with_image("photos/cat.jpg", ORIGINAL);
    h.fetcher.on(RESIZER, StubReply::ok("image/jpeg", b"resized"));

    let url = "https://images.example.com/photos/cat.jpg?width=640";
    let first = h.get(url).await;
    let second = h.get(url).await;

    assert_eq!(first.header("debug-response-cache"), Some("miss"));
    assert_eq!(second.header("debug-response-cache"), Some("hit"));
    assert_eq!(&second.body[..], b"resized");
    assert_eq!(h.fetcher.calls().len(), 1);
    assert_eq!(h.metrics.get_response_cache_hits(), 1);
    assert_eq!(h.metrics.get_response_cache_misses(), 1);
}

#[tokio::test]
async fn test_production_errors_hide_detail() {
    let yaml = format!("{}environment: production\n", STORAGE_CONFIG);
    let h = Harness::new(&yaml);

    let response = h.get("https://images.example.com/photos/missing.jpg").await;

    let body: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
    assert_eq!(body["error"]["code"], "NOT_FOUND");
    assert!(body["error"].get("message").is_none());
}

#[tokio::test]
async fn test_debug_headers_respect_environment() {
    let yaml = STORAGE_CONFIG.replace(
        "debug:\n  enabled: true\n",
        "debug:\n  enabled: true\n  environments: [staging]\n",
    );
    let h = Harness::new(&yaml).with_image("photos/cat.jpg", ORIGINAL);
    h.fetcher.on(RESIZER, StubReply::ok("image/jpeg", b"resized"));

    let response = h.get("https://images.example.com/photos/cat.jpg").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.header("debug-strategy"), None);
}

#[tokio::test]
async fn test_rejects_empty_path_and_unsupported_method() {
    let h = Harness::new(STORAGE_CONFIG);

    let root = h.get("https://images.example.com/").await;
    assert_eq!(root.status, StatusCode::BAD_REQUEST);

    let mut post = ImageRequest::get("https://images.example.com/cat.jpg").unwrap();
    post.method = "POST".to_string();
    let response = h.send(post).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&response), "VALIDATION_ERROR");
}

#[test]
fn test_cache_ttl_by_status_class() {
    let resolver = CachePolicyResolver::new(&[CacheClassConfig {
        name: "image".to_string(),
        regex: r"\.(jpe?g|png|webp)$".to_string(),
        ttl: TtlConfig {
            ok: 31_536_000,
            redirects: 0,
            client_error: 60,
            server_error: 0,
        },
        cacheability: true,
        image_compression: None,
        mirage: false,
    }])
    .unwrap();

    let url = "https://images.example.com/photos/cat.jpg";
    let policy = resolver.resolve_cache_config(url);
    assert_eq!(policy, resolver.resolve_cache_config(url));

    assert_eq!(
        cache_control_for(200, &policy).as_deref(),
        Some("public, max-age=31536000")
    );
    assert_eq!(cache_control_for(404, &policy).as_deref(), Some("public, max-age=60"));
    assert_eq!(cache_control_for(500, &policy), None);

    let other = resolver.resolve_cache_config("https://images.example.com/app.js");
    assert!(!other.cacheability);
    assert_eq!(cache_control_for(200, &other), None);
}

#[tokio::test]
async fn test_route_priority_reorders_strategies() {
    let yaml = format!(
        "{}routes:\n  - pattern: \"*.example.com\"\n    strategies:\n      priority: [direct-serving]\n",
        STORAGE_CONFIG
    );
    let h = Harness::new(&yaml).with_image("photos/cat.jpg", ORIGINAL);

    let response = h.get("https://images.example.com/photos/cat.jpg?width=640").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.header("debug-strategy"), Some("direct-serving"));
    assert_eq!(response.header("debug-route"), Some("*.example.com"));
    assert!(h.fetcher.calls().is_empty());
}

#[tokio::test]
async fn test_metadata_mode_delivers_non_ascii_directive() {
    let config = STORAGE_CONFIG.replace(
        "  endpoint: \"https://resizer.example.net\"\n",
        "  endpoint: \"https://resizer.example.net\"\n  mode: metadata\n",
    );
    let h = Harness::new(&config).with_image("photos/cat.jpg", ORIGINAL);
    h.fetcher.on(RESIZER, StubReply::ok("image/jpeg", b"resized"));

    let response = h
        .get("https://images.example.com/photos/cat.jpg?width=300&background=%C3%A9cru")
        .await;

    assert_eq!(response.status, StatusCode::OK);
    let calls = h.fetcher.calls();
    let header = calls[0]
        .headers
        .get("x-resize-options")
        .expect("directive header is sent");
    let options: serde_json::Value = serde_json::from_slice(header.as_bytes()).unwrap();
    assert_eq!(options["image"]["background"], "\u{e9}cru");
    assert_eq!(options["image"]["width"], 300);
}

#[tokio::test]
async fn test_storage_failure_status_ignores_key_contents() {
    let h = Harness::new(STORAGE_CONFIG);
    h.store.fail_with(StorageError::Body {
        key: "banners/404-hero.jpg".to_string(),
        message: "connection reset".to_string(),
    });

    let response = h
        .get("https://images.example.com/banners/404-hero.jpg?width=640")
        .await;

    assert_eq!(response.status, StatusCode::BAD_GATEWAY);
    assert_eq!(error_code(&response), "UPSTREAM_FAILURE");
    assert!(h.fetcher.calls().is_empty());
}

#[tokio::test]
async fn test_storage_access_denied_is_403() {
    let h = Harness::new(STORAGE_CONFIG);
    h.store.fail_with(StorageError::Service {
        code: Some("AccessDenied".to_string()),
        message: "Access Denied".to_string(),
    });

    let response = h.get("https://images.example.com/photos/cat.jpg").await;

    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert_eq!(error_code(&response), "FORBIDDEN");
}
