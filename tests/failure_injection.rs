//! Failure injection tests for the load balancer.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use relay_lb::Strategy;
use reqwest::StatusCode;
use tokio::net::TcpListener;
use tokio::sync::Notify;

mod common;

#[tokio::test]
async fn test_retry_on_dead_backend() {
    let alive = common::start_mock_backend("b2").await;
    let dead = common::closed_addr().await;

    let proxy = common::start_proxy(common::config_for(&[dead, alive], Strategy::RoundRobin)).await;
    let client = common::client();

    // Round-robin starts at the dead backend; the retry lands on b2.
    let res = client.get(proxy.url("/")).send().await.expect("Proxy unreachable");
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.text().await.unwrap(), "b2");

    let backends = proxy.balancer.pool().backends();
    assert!(!backends[0].is_alive(), "failed backend should be marked dead");
    assert!(backends[1].is_alive());

    for _ in 0..4 {
        let res = client.get(proxy.url("/")).send().await.unwrap();
        assert_eq!(res.text().await.unwrap(), "b2");
    }

    proxy.shutdown.trigger();
}

#[tokio::test]
async fn test_all_backends_down_returns_503() {
    let a = common::closed_addr().await;
    let b = common::closed_addr().await;
    let c = common::closed_addr().await;

    let proxy = common::start_proxy(common::config_for(&[a, b, c], Strategy::LeastConnections)).await;
    let client = common::client();

    let res = client.get(proxy.url("/orders")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(res.text().await.unwrap(), "Service not available");

    // One attempt plus one retry: exactly two backends were tried and marked dead.
    let alive = proxy.balancer.pool().backends().iter().filter(|b| b.is_alive()).count();
    assert_eq!(alive, 1);

    let res = client.get(proxy.url("/orders")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(proxy.balancer.pool().backends().iter().all(|b| !b.is_alive()));

    proxy.shutdown.trigger();
}

#[tokio::test]
async fn test_upstream_error_status_is_not_a_failure() {
    let calls = Arc::new(AtomicU32::new(0));
    let cc = calls.clone();
    let backend = common::start_programmable_backend(move |_| {
        let cc = cc.clone();
        async move {
            cc.fetch_add(1, Ordering::SeqCst);
            (500, "boom".to_string())
        }
    })
    .await;

    let proxy = common::start_proxy(common::config_for(&[backend], Strategy::RoundRobin)).await;

    let res = common::client().get(proxy.url("/")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(res.text().await.unwrap(), "boom");
    assert_eq!(calls.load(Ordering::SeqCst), 1, "a 500 must not be retried");
    assert!(proxy.balancer.pool().backends()[0].is_alive());

    proxy.shutdown.trigger();
}

#[tokio::test]
async fn test_host_rewritten_and_path_joined() {
    let backend = common::start_programmable_backend(|head| async move {
        (200, format!("{} {}", head.host, head.target))
    })
    .await;

    let mut config = common::config_for(&[], Strategy::RoundRobin);
    config.backends = vec![format!("http://{}/api", backend)];
    let proxy = common::start_proxy(config).await;

    let res = common::client()
        .get(proxy.url("/items/7?page=2"))
        .header("host", "lb.example.com")
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.headers().contains_key("x-request-id"));
    assert_eq!(res.text().await.unwrap(), format!("{} /api/items/7?page=2", backend));

    proxy.shutdown.trigger();
}

#[tokio::test]
async fn test_oversized_body_rejected_before_forwarding() {
    let calls = Arc::new(AtomicU32::new(0));
    let cc = calls.clone();
    let backend = common::start_programmable_backend(move |_| {
        let cc = cc.clone();
        async move {
            cc.fetch_add(1, Ordering::SeqCst);
            (200, "ok".to_string())
        }
    })
    .await;

    let mut config = common::config_for(&[backend], Strategy::RoundRobin);
    config.limits.max_body_bytes = 16;
    let proxy = common::start_proxy(config).await;

    let res = common::client().post(proxy.url("/upload")).body("x".repeat(64)).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(proxy.balancer.pool().backends()[0].is_alive());

    proxy.shutdown.trigger();
}

#[tokio::test]
async fn test_health_check_restores_dead_backend() {
    let steady = common::start_mock_backend("steady").await;
    // Reserve a port, leave it closed for now.
    let revived: SocketAddr = common::closed_addr().await;

    let mut config = common::config_for(&[revived, steady], Strategy::RoundRobin);
    config.health_check.enabled = true;
    config.health_check.interval_secs = 1;
    config.health_check.timeout_secs = 1;
    let proxy = common::start_proxy(config).await;
    let client = common::client();

    let res = client.get(proxy.url("/")).send().await.unwrap();
    assert_eq!(res.text().await.unwrap(), "steady");
    assert!(!proxy.balancer.pool().backends()[0].is_alive());

    // Successful requests to the other backend do not revive it.
    for _ in 0..3 {
        assert_eq!(client.get(proxy.url("/")).send().await.unwrap().text().await.unwrap(), "steady");
    }
    assert!(!proxy.balancer.pool().backends()[0].is_alive());

    let listener = TcpListener::bind(revived).await.unwrap();
    common::serve_programmable(listener, |_| async { (200, "revived".to_string()) });

    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert!(proxy.balancer.pool().backends()[0].is_alive(), "probe should restore the backend");

    let mut bodies = Vec::new();
    for _ in 0..4 {
        bodies.push(client.get(proxy.url("/")).send().await.unwrap().text().await.unwrap());
    }
    assert!(bodies.iter().any(|b| b == "revived"));
    assert!(bodies.iter().any(|b| b == "steady"));

    proxy.shutdown.trigger();
}

/// A backend that signals `arrived` as soon as a request reaches it, then answers after `delay`.
async fn start_signalling_backend(arrived: Arc<Notify>, delay: Duration, body: &'static str) -> SocketAddr {
    common::start_programmable_backend(move |_| {
        let arrived = arrived.clone();
        async move {
            arrived.notify_one();
            tokio::time::sleep(delay).await;
            (200, body.to_string())
        }
    })
    .await
}

#[tokio::test]
async fn test_graceful_shutdown_drains_in_flight() {
    let arrived = Arc::new(Notify::new());
    let backend = start_signalling_backend(arrived.clone(), Duration::from_millis(300), "slow").await;
    let proxy = common::start_proxy(common::config_for(&[backend], Strategy::RoundRobin)).await;

    let client = common::client();
    let url = proxy.url("/");
    let in_flight = tokio::spawn(async move { client.get(url).send().await });

    tokio::time::timeout(Duration::from_secs(5), arrived.notified())
        .await
        .expect("request never reached the backend");
    proxy.shutdown.trigger();

    let res = in_flight.await.unwrap().expect("in-flight request should complete");
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.text().await.unwrap(), "slow");

    let stopped = tokio::time::timeout(Duration::from_secs(2), proxy.handle).await;
    assert!(matches!(stopped, Ok(Ok(Ok(())))));
}

#[tokio::test]
async fn test_shutdown_grace_period_is_bounded() {
    let arrived = Arc::new(Notify::new());
    let backend = start_signalling_backend(arrived.clone(), Duration::from_secs(10), "too slow").await;

    let mut config = common::config_for(&[backend], Strategy::RoundRobin);
    config.timeouts.request_secs = 30;
    config.timeouts.shutdown_grace_secs = 1;
    let proxy = common::start_proxy(config).await;

    let client = common::client();
    let url = proxy.url("/");
    let _in_flight = tokio::spawn(async move { client.get(url).send().await });

    tokio::time::timeout(Duration::from_secs(5), arrived.notified())
        .await
        .expect("request never reached the backend");

    let started = Instant::now();
    proxy.shutdown.trigger();
    let stopped = tokio::time::timeout(Duration::from_secs(3), proxy.handle).await;

    assert!(matches!(stopped, Ok(Ok(Ok(())))), "server should stop after the grace period");
    assert!(started.elapsed() >= Duration::from_millis(900));
}
