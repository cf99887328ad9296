use std::future::Future;
use std::net::Ipv4Addr;
use std::net::SocketAddr;
use std::time::Duration;

use remote_tasks::Args;
use remote_tasks::JobProgress;
use serde_json::Value;

/// every test binds to an OS-assigned port on the loopback interface.
pub fn any_local_port() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, 0))
}

/// settings with reconnection delays short enough for tests.
pub fn test_args() -> Args {
    Args {
        reconnection_delay: Duration::from_millis(20),
        reconnection_delay_max: Duration::from_millis(200),
        ..Default::default()
    }
}

/// fails the test instead of hanging it.
pub async fn within<F: Future>(future: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(20), future)
        .await
        .expect("timed out")
}

/// polls `condition` until it holds.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    within(async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
}

/// receives exactly `n` progress notifications.
pub async fn next_progress(progress: &mut JobProgress, n: usize) -> Vec<Value> {
    let mut received = Vec::with_capacity(n);
    for _ in 0..n {
        let payload = within(progress.recv()).await.expect("progress stream closed");
        received.push(payload);
    }
    received
}

/// receives the remaining progress notifications, until the stream closes.
pub async fn remaining_progress(progress: &mut JobProgress) -> Vec<Value> {
    let mut received = vec![];
    while let Some(payload) = within(progress.recv()).await {
        received.push(payload);
    }
    received
}
