//! Load testing for the batch proxy.

use std::time::Instant;

use mani_proxy::config::ProxyConfig;
use serde_json::{json, Value};

mod common;

#[tokio::test]
async fn test_concurrent_batches() {
    let upstream = common::start_upstream().await;
    let mut config = ProxyConfig::default();
    config.limits.buffer_pool_size = 4;
    let proxy = common::start_proxy(config).await;

    let concurrency = 16;
    let batches_per_task = 10;
    let fan_out = 8;

    let requests: Vec<Value> = (0..fan_out)
        .map(|i| {
            let path = if i % 2 == 0 { "text" } else { "json" };
            json!({"url": format!("http://{upstream}/{path}"), "method": "GET"})
        })
        .collect();
    let envelope = json!({ "requests": requests }).to_string();

    let client = common::client();
    let start = Instant::now();

    let mut tasks = Vec::new();
    for _ in 0..concurrency {
        let client = client.clone();
        let url = proxy.url();
        let envelope = envelope.clone();
        tasks.push(tokio::spawn(async move {
            let mut latencies = Vec::new();
            for _ in 0..batches_per_task {
                let batch_start = Instant::now();
                let res = client
                    .post(&url)
                    .header("content-type", "application/json")
                    .body(envelope.clone())
                    .send()
                    .await
                    .unwrap();
                assert_eq!(res.status(), 200);
                let body: Value = res.json().await.unwrap();
                let elements = body["responses"].as_array().unwrap();
                assert_eq!(elements.len(), fan_out);
                for (i, element) in elements.iter().enumerate() {
                    let response = &element["response"];
                    assert_eq!(response["statusCode"], 200);
                    if i % 2 == 0 {
                        assert_eq!(response["body"]["bytes"], "aGk=");
                    } else {
                        assert_eq!(response["body"]["json"], json!({"a": 1}));
                    }
                }
                latencies.push(batch_start.elapsed());
            }
            latencies
        }));
    }

    let mut all_latencies = Vec::new();
    for task in tasks {
        all_latencies.extend(task.await.unwrap());
    }

    let duration = start.elapsed();
    let total = concurrency * batches_per_task;
    assert_eq!(all_latencies.len(), total);

    all_latencies.sort();
    let p50 = all_latencies[all_latencies.len() / 2];
    let p99 = all_latencies[(all_latencies.len() as f64 * 0.99) as usize];

    println!("\n--- Load Test Results ---");
    println!("Batches:        {}", total);
    println!("Sub-requests:   {}", total * fan_out);
    println!("Concurrency:    {}", concurrency);
    println!("Total Duration: {:?}", duration);
    println!("Batches/sec:    {:.2}", total as f64 / duration.as_secs_f64());
    println!("P50 Latency:    {:?}", p50);
    println!("P99 Latency:    {:?}", p99);
    println!("-------------------------\n");
}
