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

//! # mqtt-hub-rumqttc
//!
//! [`mqtt_hub::MqttTransport`] implementation on top of `rumqttc` (MQTT 3.1.1
//! over plain TCP).
//!
//! ```no_run
//! use std::sync::Arc;
//! use mqtt_hub::{ConnectRequest, ConnectionRegistry};
//! use mqtt_hub_rumqttc::RumqttcTransportFactory;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let registry = ConnectionRegistry::new(Arc::new(RumqttcTransportFactory::new()));
//! let _channel = registry
//!     .connect(ConnectRequest::new("tcp://localhost:1883", "hub-demo"))
//!     .await?;
//! # Ok::<_, mqtt_hub::ConnectError>(())
//! # });
//! ```
//!
//! Sessions are not re-established after a loss; the registry reports the
//! loss and a new `connect` starts a fresh session.

mod broker_address;
pub use broker_address::{BrokerAddress, DEFAULT_PORT};

mod transport;
pub use transport::{
    RumqttcTransport, RumqttcTransportFactory, CLIENT_TIMEOUT_CODE, DEFAULT_REQUEST_CAPACITY,
};
