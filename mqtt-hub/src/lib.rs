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

//! # mqtt-hub
//!
//! `mqtt-hub` keeps several MQTT broker connections alive inside one process,
//! at most one per broker URL, and routes each connection's asynchronous
//! outcomes back to the right caller exactly once.
//!
//! Typical usage is centered on [`ConnectionRegistry`] and [`MqttChannel`]:
//!
//! ```
//! use std::sync::Arc;
//! use mqtt_hub::{ConnectRequest, ConnectionRegistry, IncomingMessage, MessageListener, QoS};
//! use integration_test_utils::ScriptedTransportFactory;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let factory = Arc::new(ScriptedTransportFactory::new());
//! let registry = ConnectionRegistry::new(factory.clone());
//!
//! let channel = registry
//!     .connect(ConnectRequest::new("tcp://broker1:1883", "client-a"))
//!     .await
//!     .expect("scripted transports accept connections by default");
//!
//! let listener: Arc<dyn MessageListener> = Arc::new(|message: IncomingMessage| {
//!     println!("{} -> {} bytes", message.topic, message.payload.len());
//! });
//! channel.set_message_listener(listener);
//!
//! channel
//!     .subscribe(&["sensors/#".to_string()], &[QoS::AtLeastOnce])
//!     .await
//!     .unwrap();
//! let id = channel.publish("sensors/7", QoS::AtMostOnce, "21.5").await.unwrap();
//! assert_eq!(id, 0);
//!
//! registry.disconnect_all().await;
//! assert!(registry.connected_urls().is_empty());
//! # });
//! ```
//!
//! ## Lifecycle
//!
//! A registry entry is created when a connect attempt starts and removed by the
//! first of: a caller `disconnect`, a connect failure, or an unsolicited
//! connection loss. The removal is atomic, and only the remover closes the
//! channel and reports the outcome. Loss is reported to the channel's
//! [`DisconnectedListener`]; caller-initiated disconnects are not.
//!
//! ## Transports
//!
//! The wire protocol lives behind [`MqttTransport`] and [`TransportFactory`].
//! `mqtt-hub-rumqttc` provides an implementation backed by `rumqttc`.
//!
//! ## Observability model
//!
//! The workspace uses `tracing` for logs/events.
//! Library code emits events and does not initialize a global subscriber.
//! Binaries and tests are responsible for one-time `tracing_subscriber`
//! initialization at process boundaries.

mod channel;
pub use channel::{DisconnectedListener, MessageListener, MqttChannel};

mod error;
pub use error::{ConnectError, TransportError, DISCONNECTED_MESSAGE};

mod message;
pub use message::{IncomingMessage, LastWill, OutgoingMessage, QoS};

#[doc(hidden)]
pub mod observability;

mod options;
pub use options::{ConnectOptions, ConnectRequest, HubConfig};

mod registry;
pub use registry::ConnectionRegistry;

mod transport;
pub use transport::{MqttTransport, TransportEventHandler, TransportFactory};
