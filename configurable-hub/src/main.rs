/********************************************************************************
 * Copyright (c) 2024 Contributors to the Eclipse Foundation
 *
 * See the NOTICE file(s) distributed with this work for additional
 * information regarding copyright ownership.
 *
 * This program and the accompanying materials are made available under the
 * terms of the Apache License Version 2.0 which is available at
 * https://www.apache.org/licenses/LICENSE-2.0
 *
 * SPDX-License-Identifier: Apache-2.0
 ********************************************************************************/

mod config;

use crate::config::{BrokerConfig, Config};
use async_trait::async_trait;
use clap::Parser;
use mqtt_hub::{
    ConnectionRegistry, DisconnectedListener, IncomingMessage, MessageListener, TransportError,
};
use mqtt_hub_rumqttc::RumqttcTransportFactory;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command()]
struct HubArgs {
    #[arg(short, long, value_name = "FILE")]
    config: String,
}

/// Logs every message and loss seen on one broker connection.
struct TrafficLogger {
    url: String,
}

#[async_trait]
impl MessageListener for TrafficLogger {
    async fn on_message(&self, message: IncomingMessage) {
        info!(
            url = %self.url,
            msg_id = message.id,
            topic = %message.topic,
            qos = message.qos.level(),
            payload = %String::from_utf8_lossy(&message.payload),
            "message"
        );
    }
}

#[async_trait]
impl DisconnectedListener for TrafficLogger {
    async fn on_disconnected(&self, cause: &TransportError) {
        warn!(url = %self.url, err = %cause, code = %cause.code(), "broker connection lost");
    }
}

async fn open_broker(registry: &ConnectionRegistry, broker: &BrokerConfig) {
    let channel = match registry.connect(broker.connect_request()).await {
        Ok(channel) => channel,
        Err(err) => {
            warn!(url = %broker.url, err = %err, code = %err.code(), "unable to connect");
            return;
        }
    };

    let logger = Arc::new(TrafficLogger {
        url: broker.url.clone(),
    });
    channel.set_message_listener(logger.clone());
    channel.set_disconnected_listener(logger);

    let (topics, qos_levels) = broker.subscription_filters();
    if topics.is_empty() {
        return;
    }
    if let Err(err) = channel.subscribe(&topics, &qos_levels).await {
        warn!(url = %broker.url, err = %err, "unable to subscribe");
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();

    info!("Started configurable-hub");

    let args = HubArgs::parse();
    let config = Config::load(&args.config)?;

    let registry = ConnectionRegistry::with_config(
        Arc::new(RumqttcTransportFactory::new()),
        config.hub_config.clone(),
    );

    for broker in &config.brokers {
        open_broker(&registry, broker).await;
    }
    info!(
        connected = registry.connected_urls().len(),
        configured = config.brokers.len(),
        "brokers opened"
    );

    tokio::signal::ctrl_c().await?;

    info!("Shutting down configurable-hub");
    registry.disconnect_all().await;

    Ok(())
}
