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

use async_trait::async_trait;
use mqtt_hub::{DisconnectedListener, IncomingMessage, MessageListener, TransportError};
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(1);
const WAIT_LIMIT: Duration = Duration::from_secs(5);

#[derive(Default)]
pub struct RecordingMessageListener {
    name: String,
    messages: Mutex<Vec<IncomingMessage>>,
}

impl RecordingMessageListener {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            messages: Mutex::new(Vec::new()),
        }
    }

    pub fn messages(&self) -> Vec<IncomingMessage> {
        self.messages.lock().unwrap().clone()
    }

    pub fn topics(&self) -> Vec<String> {
        self.messages()
            .into_iter()
            .map(|message| message.topic)
            .collect()
    }

    pub fn count(&self) -> usize {
        self.messages.lock().unwrap().len()
    }

    /// Waits until at least `expected` messages were recorded.
    pub async fn wait_for(&self, expected: usize) {
        tokio::time::timeout(WAIT_LIMIT, async {
            while self.count() < expected {
                tokio::time::sleep(WAIT_POLL_INTERVAL).await;
            }
        })
        .await
        .expect("message listener was not notified in time");
    }
}

#[async_trait]
impl MessageListener for RecordingMessageListener {
    async fn on_message(&self, message: IncomingMessage) {
        debug!("{}: received message on {}", self.name, message.topic);
        self.messages.lock().unwrap().push(message);
    }
}

#[derive(Default)]
pub struct RecordingDisconnectedListener {
    name: String,
    causes: Mutex<Vec<TransportError>>,
}

impl RecordingDisconnectedListener {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            causes: Mutex::new(Vec::new()),
        }
    }

    pub fn causes(&self) -> Vec<TransportError> {
        self.causes.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.causes.lock().unwrap().len()
    }

    /// Waits until at least `expected` losses were recorded.
    pub async fn wait_for(&self, expected: usize) {
        tokio::time::timeout(WAIT_LIMIT, async {
            while self.count() < expected {
                tokio::time::sleep(WAIT_POLL_INTERVAL).await;
            }
        })
        .await
        .expect("disconnected listener was not notified in time");
    }
}

#[async_trait]
impl DisconnectedListener for RecordingDisconnectedListener {
    async fn on_disconnected(&self, cause: &TransportError) {
        debug!("{}: connection lost: {}", self.name, cause);
        self.causes.lock().unwrap().push(cause.clone());
    }
}
