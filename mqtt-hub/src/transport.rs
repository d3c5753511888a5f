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

//! Interface of the MQTT transport collaborator.
//!
//! Framing, keep-alive, TLS and packet encoding live behind these traits. The
//! registry only needs to open a session, issue publishes and subscriptions,
//! tear the session down, and be told about unsolicited events.

use crate::error::TransportError;
use crate::message::{IncomingMessage, OutgoingMessage, QoS};
use crate::options::ConnectOptions;
use async_trait::async_trait;
use std::sync::Arc;

/// Receives events a transport emits on its own execution context.
#[async_trait]
pub trait TransportEventHandler: Send + Sync {
    /// The session dropped without the owner asking for it.
    async fn on_connection_lost(&self, cause: TransportError);

    /// A publish arrived from the broker. Called in the order the broker delivered them.
    async fn on_message_arrived(&self, message: IncomingMessage);
}

/// One client session with one broker.
#[async_trait]
pub trait MqttTransport: Send + Sync {
    /// Installs the handler for unsolicited events, replacing any previous one.
    fn set_event_handler(&self, handler: Arc<dyn TransportEventHandler>);

    /// Resolves once the broker acknowledged the session or the attempt failed.
    async fn connect(&self, options: &ConnectOptions) -> Result<(), TransportError>;

    async fn publish(&self, topic: &str, message: OutgoingMessage) -> Result<(), TransportError>;

    /// `topics` and `qos_levels` are parallel sequences.
    async fn subscribe(&self, topics: &[String], qos_levels: &[QoS])
        -> Result<(), TransportError>;

    /// Sends a protocol-level disconnect.
    async fn disconnect(&self) -> Result<(), TransportError>;

    /// Releases the session's I/O resources.
    fn close(&self);

    /// Drops the installed event handler so no further events are delivered.
    fn unregister_resources(&self);
}

/// Builds a transport for a broker URL.
///
/// Construction is synchronous; an error here means the URL or client id was
/// refused before any network activity took place. The registry holds no locks
/// while calling `create`, so a factory may query the registry it serves.
/// Transports built for an attempt that loses a race for the same URL are
/// closed without ever connecting.
pub trait TransportFactory: Send + Sync {
    fn create(&self, url: &str, client_id: &str)
        -> Result<Arc<dyn MqttTransport>, TransportError>;
}
