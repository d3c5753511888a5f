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
use mqtt_hub::{
    ConnectOptions, IncomingMessage, MqttTransport, OutgoingMessage, QoS, TransportError,
    TransportEventHandler, TransportFactory,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::debug;

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(1);
const WAIT_LIMIT: Duration = Duration::from_secs(5);

/// How a scripted transport answers `connect`.
#[derive(Clone, Debug)]
pub enum ConnectBehavior {
    Accept,
    Fail(TransportError),
    /// Park the attempt until [`ScriptedTransport::complete_connect`] is called.
    Hold,
}

/// In-memory transport whose outcomes are driven by the test.
pub struct ScriptedTransport {
    url: String,
    client_id: String,
    behavior: ConnectBehavior,
    handler: Mutex<Option<Arc<dyn TransportEventHandler>>>,
    pending_connect: Mutex<Option<oneshot::Sender<Result<(), TransportError>>>>,
    connect_options: Mutex<Option<ConnectOptions>>,
    publish_failure: Mutex<Option<TransportError>>,
    published: Mutex<Vec<(String, OutgoingMessage)>>,
    subscriptions: Mutex<Vec<(Vec<String>, Vec<QoS>)>>,
    disconnect_calls: AtomicUsize,
    unregister_calls: AtomicUsize,
    close_calls: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new(url: &str, client_id: &str, behavior: ConnectBehavior) -> Self {
        Self {
            url: url.to_string(),
            client_id: client_id.to_string(),
            behavior,
            handler: Mutex::new(None),
            pending_connect: Mutex::new(None),
            connect_options: Mutex::new(None),
            publish_failure: Mutex::new(None),
            published: Mutex::new(Vec::new()),
            subscriptions: Mutex::new(Vec::new()),
            disconnect_calls: AtomicUsize::new(0),
            unregister_calls: AtomicUsize::new(0),
            close_calls: AtomicUsize::new(0),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Resolves a held connect. Returns `false` if no attempt is parked.
    pub fn complete_connect(&self, result: Result<(), TransportError>) -> bool {
        match self.pending_connect.lock().unwrap().take() {
            Some(sender) => sender.send(result).is_ok(),
            None => false,
        }
    }

    pub fn has_pending_connect(&self) -> bool {
        self.pending_connect.lock().unwrap().is_some()
    }

    /// Waits until a held connect is parked on this transport.
    pub async fn wait_for_pending_connect(&self) {
        tokio::time::timeout(WAIT_LIMIT, async {
            while !self.has_pending_connect() {
                tokio::time::sleep(WAIT_POLL_INTERVAL).await;
            }
        })
        .await
        .expect("connect attempt was never parked");
    }

    /// Delivers an unsolicited loss to the installed handler, if any.
    pub async fn emit_connection_lost(&self, cause: TransportError) {
        let handler = self.handler.lock().unwrap().clone();
        match handler {
            Some(handler) => handler.on_connection_lost(cause).await,
            None => debug!("{}: no handler for connection loss", self.url),
        }
    }

    pub async fn emit_message(&self, message: IncomingMessage) {
        let handler = self.handler.lock().unwrap().clone();
        match handler {
            Some(handler) => handler.on_message_arrived(message).await,
            None => debug!("{}: no handler for message on {}", self.url, message.topic),
        }
    }

    pub fn has_event_handler(&self) -> bool {
        self.handler.lock().unwrap().is_some()
    }

    pub fn fail_publishes_with(&self, error: Option<TransportError>) {
        *self.publish_failure.lock().unwrap() = error;
    }

    pub fn connect_options(&self) -> Option<ConnectOptions> {
        self.connect_options.lock().unwrap().clone()
    }

    pub fn published(&self) -> Vec<(String, OutgoingMessage)> {
        self.published.lock().unwrap().clone()
    }

    pub fn subscriptions(&self) -> Vec<(Vec<String>, Vec<QoS>)> {
        self.subscriptions.lock().unwrap().clone()
    }

    pub fn disconnect_calls(&self) -> usize {
        self.disconnect_calls.load(Ordering::SeqCst)
    }

    pub fn unregister_calls(&self) -> usize {
        self.unregister_calls.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MqttTransport for ScriptedTransport {
    fn set_event_handler(&self, handler: Arc<dyn TransportEventHandler>) {
        *self.handler.lock().unwrap() = Some(handler);
    }

    async fn connect(&self, options: &ConnectOptions) -> Result<(), TransportError> {
        *self.connect_options.lock().unwrap() = Some(options.clone());
        debug!("{}: connecting as {}", self.url, options.client_id);

        match &self.behavior {
            ConnectBehavior::Accept => Ok(()),
            ConnectBehavior::Fail(err) => Err(err.clone()),
            ConnectBehavior::Hold => {
                let (tx, rx) = oneshot::channel();
                *self.pending_connect.lock().unwrap() = Some(tx);
                rx.await.unwrap_or_else(|_| Err(TransportError::disconnected()))
            }
        }
    }

    async fn publish(&self, topic: &str, message: OutgoingMessage) -> Result<(), TransportError> {
        if let Some(err) = self.publish_failure.lock().unwrap().clone() {
            return Err(err);
        }
        self.published
            .lock()
            .unwrap()
            .push((topic.to_string(), message));
        Ok(())
    }

    async fn subscribe(
        &self,
        topics: &[String],
        qos_levels: &[QoS],
    ) -> Result<(), TransportError> {
        self.subscriptions
            .lock()
            .unwrap()
            .push((topics.to_vec(), qos_levels.to_vec()));
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.disconnect_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn close(&self) {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        // A parked connect observes the closed session as a failure without cause.
        self.pending_connect.lock().unwrap().take();
    }

    fn unregister_resources(&self) {
        self.unregister_calls.fetch_add(1, Ordering::SeqCst);
        self.handler.lock().unwrap().take();
    }
}

/// Factory handing out [`ScriptedTransport`]s and remembering every one it built.
pub struct ScriptedTransportFactory {
    default_behavior: ConnectBehavior,
    behaviors: Mutex<HashMap<String, ConnectBehavior>>,
    rejections: Mutex<HashMap<String, TransportError>>,
    created: Mutex<Vec<Arc<ScriptedTransport>>>,
}

impl ScriptedTransportFactory {
    /// Every connect is accepted unless scripted otherwise.
    pub fn new() -> Self {
        Self::with_default_behavior(ConnectBehavior::Accept)
    }

    pub fn with_default_behavior(default_behavior: ConnectBehavior) -> Self {
        Self {
            default_behavior,
            behaviors: Mutex::new(HashMap::new()),
            rejections: Mutex::new(HashMap::new()),
            created: Mutex::new(Vec::new()),
        }
    }

    /// Scripts how transports subsequently built for `url` answer `connect`.
    pub fn script(&self, url: &str, behavior: ConnectBehavior) {
        self.behaviors
            .lock()
            .unwrap()
            .insert(url.to_string(), behavior);
    }

    /// Makes transport construction for `url` fail synchronously.
    pub fn reject(&self, url: &str, error: TransportError) {
        self.rejections
            .lock()
            .unwrap()
            .insert(url.to_string(), error);
    }

    pub fn created_count(&self) -> usize {
        self.created.lock().unwrap().len()
    }

    pub fn created_for(&self, url: &str) -> Vec<Arc<ScriptedTransport>> {
        self.created
            .lock()
            .unwrap()
            .iter()
            .filter(|transport| transport.url() == url)
            .cloned()
            .collect()
    }

    /// The most recently built transport for `url`.
    pub fn latest(&self, url: &str) -> Option<Arc<ScriptedTransport>> {
        self.created_for(url).pop()
    }

    /// Waits until a transport for `url` has been built.
    pub async fn wait_for_transport(&self, url: &str) -> Arc<ScriptedTransport> {
        tokio::time::timeout(WAIT_LIMIT, async {
            loop {
                if let Some(transport) = self.latest(url) {
                    return transport;
                }
                tokio::time::sleep(WAIT_POLL_INTERVAL).await;
            }
        })
        .await
        .expect("transport was never created")
    }
}

impl Default for ScriptedTransportFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl TransportFactory for ScriptedTransportFactory {
    fn create(&self, url: &str, client_id: &str) -> Result<Arc<dyn MqttTransport>, TransportError> {
        if let Some(err) = self.rejections.lock().unwrap().get(url) {
            return Err(err.clone());
        }

        let behavior = self
            .behaviors
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .unwrap_or_else(|| self.default_behavior.clone());
        let transport = Arc::new(ScriptedTransport::new(url, client_id, behavior));
        self.created.lock().unwrap().push(transport.clone());
        Ok(transport)
    }
}
