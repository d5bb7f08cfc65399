//! Proxy pool refresh and selection

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use analytics_mcp_server::analytics::proxy_pool::{PoolPhase, ProxyPool, ProxyVerifier};
use async_trait::async_trait;
use mockito::{Server, ServerGuard};

/// Accepts every proxy except the ones listed.
struct RejectSome(Vec<&'static str>);

#[async_trait]
impl ProxyVerifier for RejectSome {
    async fn verify(&self, proxy: &str) -> bool {
        !self.0.iter().any(|rejected| *rejected == proxy)
    }
}

/// Accepts everything, but takes its time once `slow` is set.
struct Throttled {
    slow: AtomicBool,
}

#[async_trait]
impl ProxyVerifier for Throttled {
    async fn verify(&self, _proxy: &str) -> bool {
        if self.slow.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
        true
    }
}

async fn list_server(body: &str) -> ServerGuard {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/http.txt")
        .with_status(200)
        .with_body(body)
        .create_async()
        .await;
    server
}

#[tokio::test]
async fn test_refresh_keeps_only_verified_proxies() {
    let server = list_server("10.0.0.1:8080\n10.0.0.2:3128\n10.0.0.3:80\n").await;
    let pool = ProxyPool::with_verifier(
        format!("{}/http.txt", server.url()),
        Arc::new(RejectSome(vec!["http://10.0.0.3:80"])),
        2,
    )
    .unwrap();

    assert_eq!(pool.refresh().await.unwrap(), 2);

    let status = pool.status().await;
    assert_eq!(status.phase, PoolPhase::Ready);
    assert_eq!(status.candidates, 3);
    assert_eq!(status.working, 2);
    assert!(status.last_refresh.is_some());

    let allowed: HashSet<&str> = ["http://10.0.0.1:8080", "http://10.0.0.2:3128"].into_iter().collect();
    for _ in 0..50 {
        let proxy = pool.get().await.unwrap();
        assert!(allowed.contains(proxy.as_str()), "unexpected proxy {}", proxy);
    }
}

#[tokio::test]
async fn test_ready_pool_with_no_working_proxy_returns_none() {
    let server = list_server("10.0.0.9:8080\n").await;
    let pool = ProxyPool::with_verifier(
        format!("{}/http.txt", server.url()),
        Arc::new(RejectSome(vec!["http://10.0.0.9:8080"])),
        4,
    )
    .unwrap();

    assert_eq!(pool.refresh().await.unwrap(), 0);
    assert_eq!(pool.status().await.phase, PoolPhase::Ready);
    assert!(pool.get().await.is_none());
}

#[tokio::test]
async fn test_failed_source_leaves_pool_uninitialized() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/http.txt")
        .with_status(503)
        .create_async()
        .await;
    let pool = ProxyPool::with_verifier(
        format!("{}/http.txt", server.url()),
        Arc::new(RejectSome(vec![])),
        4,
    )
    .unwrap();

    assert!(pool.refresh().await.is_err());
    assert_eq!(pool.status().await.phase, PoolPhase::Uninitialized);
    assert!(pool.get().await.is_none());
}

#[tokio::test]
async fn test_previous_proxies_served_while_refreshing() {
    let server = list_server("10.0.0.1:8080\n10.0.0.2:3128\n").await;
    let verifier = Arc::new(Throttled {
        slow: AtomicBool::new(false),
    });
    let pool = Arc::new(
        ProxyPool::with_verifier(format!("{}/http.txt", server.url()), verifier.clone(), 2)
            .unwrap(),
    );
    assert_eq!(pool.refresh().await.unwrap(), 2);

    verifier.slow.store(true, Ordering::SeqCst);
    let refreshing = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.refresh().await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(pool.status().await.phase, PoolPhase::Populating);
    assert_eq!(pool.status().await.working, 2);
    assert!(pool.get().await.is_some());

    assert_eq!(refreshing.await.unwrap().unwrap(), 2);
    assert_eq!(pool.status().await.phase, PoolPhase::Ready);
}
