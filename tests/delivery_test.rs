//! 投递与图片下载集成测试（wiremock 模拟渲染端和图片服务器）

use overlay_notifier::{
    build_payload, Deliver, DispatchError, HttpDeliverer, Media, Notifier, NotifierConfig,
    NotifierOptions, OverlayNotifier, PayloadNormalizer,
};
use serde_json::{json, Map, Value};
use std::time::Duration;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer) -> NotifierConfig {
    NotifierConfig::default()
        .with_server_url(format!("{}/notify", server.uri()))
        .with_id("living-room")
        .with_duration(1)
}

#[tokio::test]
async fn test_http_deliverer_posts_camel_case_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/notify"))
        .and(body_partial_json(json!({
            "id": "living-room",
            "title": "Motion",
            "message": "Driveway",
            "corner": "bottom_end",
            "largeIcon": "mdi:motion-sensor",
            "smallIcon": "mdi:camera",
            "smallIconColor": "#049cdb",
            "image": "mdi:cctv"
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let config = config_for(&server);
    let options = NotifierOptions::new().with_body("Driveway");
    let payload = build_payload(
        "Motion",
        &options,
        None,
        Some("mdi:cctv".to_string()),
        &config,
    );

    HttpDeliverer::new().send(&payload, &config).await.unwrap();
}

#[tokio::test]
async fn test_http_deliverer_accepts_any_2xx() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let config = config_for(&server);
    let payload = build_payload("Hi", &NotifierOptions::new(), None, None, &config);
    assert!(HttpDeliverer::new().send(&payload, &config).await.is_ok());
}

#[tokio::test]
async fn test_http_deliverer_reports_status_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("renderer crashed"))
        .mount(&server)
        .await;

    let config = config_for(&server);
    let payload = build_payload("Hi", &NotifierOptions::new(), None, None, &config);
    let err = HttpDeliverer::new().send(&payload, &config).await.unwrap_err();

    match err {
        DispatchError::Status { status, body } => {
            assert_eq!(status, 500);
            assert_eq!(body, "renderer crashed");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_http_deliverer_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    let mut config = config_for(&server);
    config.request_timeout_secs = 1;
    let payload = build_payload("Hi", &NotifierOptions::new(), None, None, &config);
    let err = HttpDeliverer::new().send(&payload, &config).await.unwrap_err();

    assert!(err.is_network());
    assert!(err.is_timeout());
}

#[tokio::test]
async fn test_overrides_win_over_configured_fields() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let config = config_for(&server);
    let mut overrides = Map::new();
    overrides.insert("corner".to_string(), json!("top_start"));
    overrides.insert("transparency".to_string(), json!(40));
    let options = NotifierOptions::new().with_overrides(overrides);
    let payload = build_payload("Hi", &options, None, None, &config);

    HttpDeliverer::new().send(&payload, &config).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let body: Value = requests[0].body_json().unwrap();
    assert_eq!(body["corner"], json!("top_start"));
    assert_eq!(body["transparency"], json!(40));
    assert_eq!(body["title"], json!("Hi"));
}

#[tokio::test]
async fn test_remote_image_is_fetched_and_base64_encoded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/snapshot.jpg"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0xff, 0xd8, 0xff]))
        .expect(1)
        .mount(&server)
        .await;

    let config = config_for(&server);
    let media = Media::from(format!("{}/snapshot.jpg", server.uri()));
    let payload = PayloadNormalizer::new()
        .normalize("Camera", &NotifierOptions::new(), Some(&media), None, &config)
        .await
        .unwrap();

    assert_eq!(payload.image.as_deref(), Some("/9j/"));
}

#[tokio::test]
async fn test_remote_image_failure_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let config = config_for(&server);
    let media = Media::from(format!("{}/missing.jpg", server.uri()));
    let err = PayloadNormalizer::new()
        .resolve_image(Some(&media), &config)
        .await
        .unwrap_err();

    assert!(matches!(err, DispatchError::Status { status: 404, .. }));
}

#[tokio::test]
async fn test_notifier_sends_without_image_when_fetch_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/notify"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let notifier = OverlayNotifier::new(config_for(&server))
        .with_tick_period(Duration::from_millis(20));
    let media = Media::from(format!("{}/snapshot.jpg", server.uri()));
    notifier.send_notification("Camera", None, Some(media), None).await;
    notifier.drain().await;
    notifier.shutdown().await;

    let posts: Vec<_> = server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.method.as_str() == "POST")
        .collect();
    assert_eq!(posts.len(), 1);
    let body: Value = posts[0].body_json().unwrap();
    assert_eq!(body["title"], json!("Camera"));
    assert!(body.get("image").is_none());
    assert_eq!(notifier.stats().delivered, 1);
}

#[tokio::test]
async fn test_blank_destination_makes_no_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let notifier = OverlayNotifier::new(NotifierConfig::default().with_duration(1))
        .with_tick_period(Duration::from_millis(20));
    notifier.send_notification("Nowhere", None, None, None).await;
    notifier.drain().await;
    notifier.shutdown().await;

    let stats = notifier.stats();
    assert_eq!(stats.skipped, 1);
    assert_eq!(stats.delivered, 0);
    assert_eq!(stats.depth, 0);
}

#[tokio::test]
async fn test_unparseable_destination_is_skipped_not_failed() {
    let notifier = OverlayNotifier::new(
        NotifierConfig::default()
            .with_server_url("not a url")
            .with_duration(1),
    )
    .with_tick_period(Duration::from_millis(20));
    notifier.send_notification("Nowhere", None, None, None).await;
    notifier.drain().await;
    notifier.shutdown().await;

    let stats = notifier.stats();
    assert_eq!(stats.skipped, 1);
    assert_eq!(stats.failed, 0);
    assert_eq!(stats.delivered, 0);
}
