//! Failure injection tests for the batch proxy.

use mani_proxy::batch::content_type::parse_boundary;
use mani_proxy::config::ProxyConfig;
use serde_json::{json, Value};

mod common;

async fn post_json(proxy: &common::TestProxy, envelope: Value) -> Value {
    let res = common::client()
        .post(proxy.url())
        .header("content-type", "application/json")
        .body(envelope.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    res.json().await.unwrap()
}

#[tokio::test]
async fn test_upstream_error_status_is_a_response() {
    let upstream = common::start_upstream().await;
    let proxy = common::start_proxy(ProxyConfig::default()).await;

    let body = post_json(
        &proxy,
        json!({"requests":[{"url": format!("http://{upstream}/fail"), "method": "POST"}]}),
    )
    .await;

    let response = &body["responses"][0]["response"];
    assert_eq!(response["statusCode"], 500);
    assert_eq!(response["body"]["bytes"], "Ym9vbQ==");
}

#[tokio::test]
async fn test_invalid_targets_do_not_stop_the_batch() {
    let upstream = common::start_upstream().await;
    let proxy = common::start_proxy(ProxyConfig::default()).await;

    let body = post_json(
        &proxy,
        json!({"requests":[
            {"url": "/relative/path", "method": "GET"},
            {"url": format!("http://{upstream}/text"), "method": "NOT A METHOD"},
            {"url": format!("http://{upstream}/text"), "method": "GET",
             "headers": [["bad header", "x"]]},
            {"url": format!("http://{upstream}/text"), "method": "GET"}
        ]}),
    )
    .await;

    let elements = body["responses"].as_array().unwrap();
    assert_eq!(elements.len(), 4);
    assert!(elements[0]["error"]["detail"]
        .as_str()
        .unwrap()
        .starts_with("invalid url /relative/path"));
    assert!(elements[1]["error"]["detail"]
        .as_str()
        .unwrap()
        .starts_with("invalid method"));
    assert!(elements[2]["error"]["detail"]
        .as_str()
        .unwrap()
        .starts_with("invalid header"));
    assert_eq!(elements[3]["response"]["statusCode"], 200);
}

#[tokio::test]
async fn test_oversized_upstream_body() {
    let upstream = common::start_upstream().await;
    let mut config = ProxyConfig::default();
    config.upstream.max_response_body_bytes = 1;
    let proxy = common::start_proxy(config).await;

    let body = post_json(
        &proxy,
        json!({"requests":[{"url": format!("http://{upstream}/text"), "method": "GET"}]}),
    )
    .await;

    let detail = body["responses"][0]["error"]["detail"].as_str().unwrap();
    assert!(detail.starts_with("failed to read response body"), "{detail}");
}

#[tokio::test]
async fn test_oversized_envelope_is_rejected() {
    let mut config = ProxyConfig::default();
    config.limits.max_body_bytes = 64;
    let proxy = common::start_proxy(config).await;

    let res = common::client()
        .post(proxy.url())
        .header("content-type", "application/json")
        .body(format!(r#"{{"requests":[],"pad":"{}"}}"#, "x".repeat(256)))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 413);
}

#[tokio::test]
async fn test_truncated_multipart_closes_envelope() {
    let upstream = common::start_upstream().await;
    let proxy = common::start_proxy(ProxyConfig::default()).await;

    let body = format!(
        "--b\r\n\
         x-mani-url: http://{upstream}/text\r\n\
         x-mani-method: GET\r\n\
         \r\n\
         \r\n\
         --b\r\n\
         x-mani-url: http://{upstream}/te"
    );
    let res = common::client()
        .post(proxy.url())
        .header("content-type", "multipart/mixed; boundary=b")
        .body(body)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);

    let content_type = res.headers()["content-type"].to_str().unwrap().to_string();
    let boundary = parse_boundary(&content_type).unwrap();
    let text = res.text().await.unwrap();

    assert!(text.contains("x-mani-status: 200"));
    assert!(text.contains("hi"));
    assert!(text.contains("x-mani-error: failed to read multipart message"));
    assert!(text.ends_with(&format!("--{boundary}--\r\n")));
}

#[tokio::test]
async fn test_multipart_part_without_url_mid_batch() {
    let upstream = common::start_upstream().await;
    let proxy = common::start_proxy(ProxyConfig::default()).await;

    let body = format!(
        "--b\r\n\
         x-mani-url: http://{upstream}/text\r\n\
         x-mani-method: GET\r\n\
         \r\n\
         \r\n\
         --b\r\n\
         x-mani-method: GET\r\n\
         \r\n\
         \r\n\
         --b\r\n\
         x-mani-url: http://{upstream}/created\r\n\
         x-mani-method: POST\r\n\
         \r\n\
         \r\n\
         --b--\r\n"
    );
    let res = common::client()
        .post(proxy.url())
        .header("content-type", "multipart/mixed; boundary=b")
        .body(body)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);

    let text = res.text().await.unwrap();
    let status = text.find("x-mani-status: 200").unwrap();
    let error = text.find("x-mani-error: part missing url header").unwrap();
    let created = text.find("x-mani-status: 201").unwrap();
    assert!(status < error && error < created, "{text}");
}
