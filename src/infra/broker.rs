//! Embedded MQTT broker using rumqttd
//!
//! Lets the bridge host the local broker on the same device. Also used by the
//! end-to-end tests.

use anyhow::Context;
use rumqttd::{Broker, Config, ConnectionSettings, RouterConfig, ServerSettings};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

fn broker_config(listen_addr: SocketAddr) -> Config {
    let router_config = RouterConfig {
        max_segment_size: 10 * 1024 * 1024,
        max_segment_count: 10,
        max_connections: 64,
        max_outgoing_packet_count: 200,
        initialized_filters: None,
        ..Default::default()
    };

    let mut servers = HashMap::new();
    servers.insert(
        "v4".to_string(),
        ServerSettings {
            name: "v4".to_string(),
            listen: listen_addr,
            tls: None,
            next_connection_delay_ms: 1,
            connections: ConnectionSettings {
                connection_timeout_ms: 5000,
                max_payload_size: 4096,
                max_inflight_count: 100,
                auth: None,
                dynamic_filters: true,
                external_auth: None,
            },
        },
    );

    Config {
        id: 0,
        router: router_config,
        v4: Some(servers),
        v5: None,
        ws: None,
        prometheus: None,
        metrics: None,
        bridge: None,
        console: None,
        cluster: None,
    }
}

/// Start an in-process broker listening on `bind_address:port`
///
/// The broker runs on its own thread for the lifetime of the process.
pub fn start_embedded_broker(bind_address: &str, port: u16) -> anyhow::Result<()> {
    let addr_str = format!("{}:{}", bind_address, port);
    let listen_addr: SocketAddr = addr_str
        .parse()
        .with_context(|| format!("Invalid broker bind address {}", addr_str))?;

    let config = broker_config(listen_addr);

    thread::Builder::new()
        .name("embedded-broker".to_string())
        .spawn(move || {
            let mut broker = Broker::new(config);
            // start() blocks until the broker fails
            if let Err(e) = broker.start() {
                warn!(error = %e, "broker_start_failed");
            }
        })
        .context("Failed to spawn broker thread")?;

    // Give broker time to bind
    thread::sleep(Duration::from_millis(100));
    info!(bind_address = %bind_address, port = %port, "broker_started");
    Ok(())
}
