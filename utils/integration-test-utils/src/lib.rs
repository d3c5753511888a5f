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

//! Scriptable transports and recording listeners shared by the workspace's
//! integration tests, doctests and benchmarks.

mod recording_listeners;
mod scripted_transport;

pub use recording_listeners::{RecordingDisconnectedListener, RecordingMessageListener};
pub use scripted_transport::{ConnectBehavior, ScriptedTransport, ScriptedTransportFactory};

use bytes::Bytes;
use mqtt_hub::{IncomingMessage, QoS};

/// Installs a test subscriber honoring `RUST_LOG`. Safe to call from every test.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn incoming_message(id: u16, topic: &str, payload: &'static [u8]) -> IncomingMessage {
    IncomingMessage {
        id,
        topic: topic.to_string(),
        qos: QoS::AtLeastOnce,
        retain: false,
        payload: Bytes::from_static(payload),
    }
}
