mod common;

use std::time::Duration;

use chrono::{TimeZone, Utc};
use common::{drain, test_config, MockBackend, API_KEY, PROJECT_ID};
use logsicle::transport::{AppLogOptions, MetricOptions, RequestLogOptions};
use logsicle::{LogsicleClient, QueueEvent, ResourceType};

#[tokio::test]
async fn test_delivers_every_item_in_one_batch() {
    let backend = MockBackend::accepting().await;
    let client = LogsicleClient::new(test_config(&backend.url())).expect("client");
    let mut events = client.subscribe();

    for i in 0..5 {
        client.app.info(format!("message {i}"), AppLogOptions::default());
    }
    client.flush().await.expect("flush");

    let requests = backend.accepted();
    assert_eq!(requests.len(), 1);
    assert_eq!(
        requests[0].messages(),
        (0..5).map(|i| format!("message {i}")).collect::<Vec<_>>()
    );
    assert_eq!(
        drain(&mut events),
        vec![QueueEvent::BatchProcessed {
            resource_type: ResourceType::App,
            count: 5,
            retries: 0,
        }]
    );

    client.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn test_request_shape_and_headers() {
    let backend = MockBackend::accepting().await;
    let client = LogsicleClient::new(test_config(&backend.url())).expect("client");

    client.app.warning(
        "disk almost full",
        AppLogOptions::default().with_metadata("free_mb", 512),
    );
    client.flush().await.expect("flush");

    let request = &backend.accepted()[0];
    assert_eq!(request.resource_type, "app");
    assert_eq!(
        request.headers.get("authorization").map(String::as_str),
        Some(format!("Bearer {API_KEY}").as_str())
    );
    assert_eq!(
        request.headers.get("content-type").map(String::as_str),
        Some("application/json")
    );
    assert!(request
        .headers
        .get("user-agent")
        .is_some_and(|agent| agent.starts_with("logsicle-rust/")));
    assert!(request.headers.get("content-encoding").is_none());

    let payload = &request.payloads()[0];
    assert_eq!(payload["project_id"], PROJECT_ID);
    assert_eq!(payload["level"], "warning");
    assert_eq!(payload["service_name"], "integration");
    assert_eq!(payload["metadata"]["free_mb"], 512);
    assert!(payload["timestamp"].as_str().is_some_and(|ts| ts.ends_with('Z')));

    client.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn test_duplicates_within_ttl_are_sent_once() {
    let backend = MockBackend::accepting().await;
    let client = LogsicleClient::new(test_config(&backend.url())).expect("client");

    let first = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let second = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 1).unwrap();
    client.app.error(
        "same failure",
        AppLogOptions::default().with_timestamp(first),
    );
    client.app.error(
        "same failure",
        AppLogOptions::default().with_timestamp(second),
    );
    client.flush().await.expect("flush");

    let requests = backend.accepted();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].messages(), vec!["same failure"]);

    client.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn test_repeat_after_delivery_is_sent_again() {
    let backend = MockBackend::accepting().await;
    let client = LogsicleClient::new(test_config(&backend.url())).expect("client");

    client.app.error("same failure", AppLogOptions::default());
    client.flush().await.expect("flush");
    client.app.error("same failure", AppLogOptions::default());
    client.flush().await.expect("flush");

    let requests = backend.accepted();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].messages(), vec!["same failure"]);

    client.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn test_twice_max_size_produces_several_requests() {
    let backend = MockBackend::accepting().await;
    let mut config = test_config(&backend.url());
    config.batching.max_size = 10;
    let client = LogsicleClient::new(config).expect("client");

    for i in 0..20 {
        client.app.info(format!("message {i}"), AppLogOptions::default());
    }
    client.flush().await.expect("flush");

    let requests = backend.accepted();
    assert!(requests.len() >= 2, "got {} requests", requests.len());
    let delivered: Vec<String> = requests.iter().flat_map(|r| r.messages()).collect();
    assert_eq!(
        delivered,
        (0..20).map(|i| format!("message {i}")).collect::<Vec<_>>()
    );

    client.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn test_each_type_goes_to_its_own_route() {
    let backend = MockBackend::accepting().await;
    let client = LogsicleClient::new(test_config(&backend.url())).expect("client");

    client.app.info("hello", AppLogOptions::default());
    client.request.log_request(
        "GET",
        "/health",
        200,
        Duration::from_millis(2),
        None,
        RequestLogOptions::default(),
    );
    client
        .metric
        .gauge("queue.depth", 3.0, MetricOptions::default());
    client.flush().await.expect("flush");

    let mut routes: Vec<String> = backend
        .accepted()
        .into_iter()
        .map(|request| request.resource_type)
        .collect();
    routes.sort();
    assert_eq!(routes, vec!["app", "metric", "request"]);

    client.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn test_compressed_bodies() {
    let backend = MockBackend::accepting().await;
    let mut config = test_config(&backend.url());
    config.compression.enabled = true;
    let client = LogsicleClient::new(config).expect("client");

    client.app.info("squeeze me", AppLogOptions::default());
    client.flush().await.expect("flush");

    let request = &backend.accepted()[0];
    assert_eq!(
        request.headers.get("content-encoding").map(String::as_str),
        Some("zstd")
    );
    assert_eq!(request.messages(), vec!["squeeze me"]);

    client.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn test_no_requests_after_shutdown() {
    let backend = MockBackend::accepting().await;
    let client = LogsicleClient::new(test_config(&backend.url())).expect("client");

    client.app.info("before", AppLogOptions::default());
    client.shutdown().await.expect("shutdown");
    assert_eq!(backend.call_count(), 1);

    client.app.info("after", AppLogOptions::default());
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(backend.call_count(), 1);
}
