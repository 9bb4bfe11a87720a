#![allow(dead_code)]

use ijt_client::{Client, ClientConfig};
use ijt_net_sim::{fixture, SimBridge};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

pub const EP: &str = "opc.tcp://station7:4840";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A client on a fresh bridge populated with the tightening-system fixture.
pub fn client_with(config: ClientConfig) -> (SimBridge, Client) {
    init_tracing();
    let bridge = SimBridge::new();
    fixture::tightening_system(&bridge);
    let client = Client::builder()
        .config(config)
        .channel(Arc::new(bridge.clone()))
        .build()
        .expect("client builds");
    (bridge, client)
}

pub fn client() -> (SimBridge, Client) {
    client_with(ClientConfig::new(EP).with_subscribe_on_connect(false))
}

/// Wait for `cond`, failing the test after a second.
pub async fn eventually(mut cond: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(1), async {
        while !cond() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("condition within a second");
}

pub async fn within<T>(fut: impl Future<Output = T>) -> T {
    tokio::time::timeout(Duration::from_secs(1), fut)
        .await
        .expect("completes within a second")
}
