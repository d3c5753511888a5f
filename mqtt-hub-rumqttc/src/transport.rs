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

use crate::broker_address::BrokerAddress;
use async_trait::async_trait;
use mqtt_hub::observability::{events, fields};
use mqtt_hub::{
    ConnectOptions, IncomingMessage, MqttTransport, OutgoingMessage, QoS, TransportError,
    TransportEventHandler, TransportFactory,
};
use rumqttc::{
    AsyncClient, ClientError, ConnectReturnCode, ConnectionError, Event, EventLoop, MqttOptions,
    Outgoing, Packet, SubscribeFilter,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const COMPONENT: &str = "rumqttc_transport";

pub const DEFAULT_REQUEST_CAPACITY: usize = 64;

const DISCONNECT_GRACE: Duration = Duration::from_secs(1);

/// Reason code reported when the broker does not acknowledge in time.
pub const CLIENT_TIMEOUT_CODE: i32 = 32000;

type HandlerSlot = Arc<RwLock<Option<Arc<dyn TransportEventHandler>>>>;

enum TransportEvent {
    Message(IncomingMessage),
    ConnectionLost(TransportError),
}

pub(crate) fn to_rumqttc_qos(qos: QoS) -> rumqttc::QoS {
    match qos {
        QoS::AtMostOnce => rumqttc::QoS::AtMostOnce,
        QoS::AtLeastOnce => rumqttc::QoS::AtLeastOnce,
        QoS::ExactlyOnce => rumqttc::QoS::ExactlyOnce,
    }
}

pub(crate) fn from_rumqttc_qos(qos: rumqttc::QoS) -> QoS {
    match qos {
        rumqttc::QoS::AtMostOnce => QoS::AtMostOnce,
        rumqttc::QoS::AtLeastOnce => QoS::AtLeastOnce,
        rumqttc::QoS::ExactlyOnce => QoS::ExactlyOnce,
    }
}

/// MQTT 3.1.1 CONNACK return code.
pub(crate) fn return_code(code: &ConnectReturnCode) -> i32 {
    match code {
        ConnectReturnCode::Success => 0,
        ConnectReturnCode::RefusedProtocolVersion => 1,
        ConnectReturnCode::BadClientId => 2,
        ConnectReturnCode::ServiceUnavailable => 3,
        ConnectReturnCode::BadUserNamePassword => 4,
        ConnectReturnCode::NotAuthorized => 5,
    }
}

pub(crate) fn connection_error(err: &ConnectionError) -> TransportError {
    match err {
        ConnectionError::ConnectionRefused(code) => TransportError::with_reason_code(
            format!("connection refused: {code:?}"),
            return_code(code),
        ),
        other => TransportError::new(other.to_string()),
    }
}

fn client_error(err: ClientError) -> TransportError {
    TransportError::new(err.to_string())
}

pub(crate) fn mqtt_options(address: &BrokerAddress, options: &ConnectOptions) -> MqttOptions {
    let mut mqtt_options = MqttOptions::new(
        options.client_id.clone(),
        address.host.clone(),
        address.port,
    );
    mqtt_options
        .set_keep_alive(Duration::from_secs(u64::from(options.keep_alive_secs)))
        .set_clean_session(options.clean_session);

    if let Some(username) = &options.username {
        let password = options.password.clone().unwrap_or_default();
        mqtt_options.set_credentials(username.clone(), password);
    }

    if let Some(will) = &options.last_will {
        mqtt_options.set_last_will(rumqttc::LastWill::new(
            will.topic.clone(),
            will.payload.to_vec(),
            to_rumqttc_qos(will.qos),
            will.retain,
        ));
    }

    mqtt_options
}

/// One broker session driven by a `rumqttc` event loop.
///
/// `connect` spawns two tasks: the poll task owns the [`EventLoop`], and a
/// dispatcher task hands events to the installed handler in arrival order.
/// Handlers therefore never run on the poll task and may tear the session
/// down from inside a callback.
pub struct RumqttcTransport {
    url: String,
    address: BrokerAddress,
    request_capacity: usize,
    client: Mutex<Option<AsyncClient>>,
    handler: HandlerSlot,
    closing: Arc<AtomicBool>,
    event_loop: Mutex<Option<JoinHandle<()>>>,
}

impl RumqttcTransport {
    pub fn new(url: &str, address: BrokerAddress, request_capacity: usize) -> Self {
        Self {
            url: url.to_string(),
            address,
            request_capacity,
            client: Mutex::new(None),
            handler: Arc::new(RwLock::new(None)),
            closing: Arc::new(AtomicBool::new(false)),
            event_loop: Mutex::new(None),
        }
    }

    pub fn address(&self) -> &BrokerAddress {
        &self.address
    }

    fn client(&self) -> Result<AsyncClient, TransportError> {
        self.client
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(TransportError::disconnected)
    }
}

#[async_trait]
impl MqttTransport for RumqttcTransport {
    fn set_event_handler(&self, handler: Arc<dyn TransportEventHandler>) {
        *self.handler.write().unwrap_or_else(PoisonError::into_inner) = Some(handler);
    }

    async fn connect(&self, options: &ConnectOptions) -> Result<(), TransportError> {
        let (client, event_loop) =
            AsyncClient::new(mqtt_options(&self.address, options), self.request_capacity);
        {
            let mut slot = self.client.lock().unwrap_or_else(PoisonError::into_inner);
            if slot.is_some() {
                return Err(TransportError::new(format!(
                    "{}: session already started",
                    self.url
                )));
            }
            *slot = Some(client);
        }

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (connack_tx, connack_rx) = oneshot::channel();

        tokio::spawn(dispatch_events(
            self.url.clone(),
            event_rx,
            self.handler.clone(),
        ));
        let poll_task = tokio::spawn(run_event_loop(
            self.url.clone(),
            event_loop,
            connack_tx,
            event_tx,
            self.closing.clone(),
        ));
        *self.event_loop.lock().unwrap_or_else(PoisonError::into_inner) = Some(poll_task);

        debug!(
            event = events::TRANSPORT_EVENT_LOOP_START,
            component = COMPONENT,
            url = %self.url,
            broker = %self.address,
            client_id = %options.client_id,
            "started event loop"
        );

        match tokio::time::timeout(options.connection_timeout, connack_rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(TransportError::disconnected()),
            Err(_) => {
                warn!(
                    event = events::TRANSPORT_CONNECT_TIMEOUT,
                    component = COMPONENT,
                    url = %self.url,
                    timeout_secs = options.connection_timeout.as_secs(),
                    "broker did not acknowledge in time"
                );
                Err(TransportError::with_reason_code(
                    "timed out waiting for a response from the server",
                    CLIENT_TIMEOUT_CODE,
                ))
            }
        }
    }

    async fn publish(&self, topic: &str, message: OutgoingMessage) -> Result<(), TransportError> {
        self.client()?
            .publish(
                topic,
                to_rumqttc_qos(message.qos),
                message.retain,
                message.payload.to_vec(),
            )
            .await
            .map_err(client_error)
    }

    async fn subscribe(
        &self,
        topics: &[String],
        qos_levels: &[QoS],
    ) -> Result<(), TransportError> {
        let filters = topics
            .iter()
            .zip(qos_levels)
            .map(|(topic, qos)| SubscribeFilter::new(topic.clone(), to_rumqttc_qos(*qos)));

        self.client()?
            .subscribe_many(filters)
            .await
            .map_err(client_error)
    }

    /// Queues a DISCONNECT and gives the event loop a bounded grace period to
    /// flush it before `close` tears the loop down.
    async fn disconnect(&self) -> Result<(), TransportError> {
        self.closing.store(true, Ordering::SeqCst);
        self.client()?.disconnect().await.map_err(client_error)?;

        let task = self
            .event_loop
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(mut task) = task {
            if tokio::time::timeout(DISCONNECT_GRACE, &mut task).await.is_err() {
                task.abort();
            }
        }
        Ok(())
    }

    fn close(&self) {
        self.closing.store(true, Ordering::SeqCst);
        if let Some(task) = self
            .event_loop
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
        self.client
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    fn unregister_resources(&self) {
        self.handler
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

async fn run_event_loop(
    url: String,
    mut event_loop: EventLoop,
    connack: oneshot::Sender<Result<(), TransportError>>,
    events_tx: mpsc::UnboundedSender<TransportEvent>,
    closing: Arc<AtomicBool>,
) {
    let mut connack = Some(connack);

    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                info!(
                    event = events::TRANSPORT_CONNACK,
                    component = COMPONENT,
                    url = %url,
                    session_present = ack.session_present,
                    "broker acknowledged session"
                );
                if let Some(tx) = connack.take() {
                    let _ = tx.send(Ok(()));
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let message = IncomingMessage {
                    id: publish.pkid,
                    topic: publish.topic,
                    qos: from_rumqttc_qos(publish.qos),
                    retain: publish.retain,
                    payload: publish.payload,
                };
                if events_tx.send(TransportEvent::Message(message)).is_err() {
                    break;
                }
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => break,
            Ok(_) => {}
            Err(err) => {
                let cause = connection_error(&err);
                if let Some(tx) = connack.take() {
                    let _ = tx.send(Err(cause));
                } else if closing.load(Ordering::SeqCst) {
                    debug!(
                        event = events::TRANSPORT_EVENT_LOOP_STOP,
                        component = COMPONENT,
                        url = %url,
                        err = %err,
                        reason = fields::REASON_CLOSING,
                        "event loop ended while closing"
                    );
                } else {
                    let _ = events_tx.send(TransportEvent::ConnectionLost(cause));
                }
                break;
            }
        }
    }

    debug!(
        event = events::TRANSPORT_EVENT_LOOP_STOP,
        component = COMPONENT,
        url = %url,
        "event loop stopped"
    );
}

/// Hands events to the installed handler one at a time, in arrival order.
///
/// Each delivery runs as its own task so a panicking handler costs only that
/// event, not the rest of the session.
async fn dispatch_events(
    url: String,
    mut events_rx: mpsc::UnboundedReceiver<TransportEvent>,
    handler: HandlerSlot,
) {
    while let Some(event) = events_rx.recv().await {
        let current = handler
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let Some(current) = current else {
            debug!(
                event = events::TRANSPORT_EVENT_DROPPED,
                component = COMPONENT,
                url = %url,
                reason = fields::REASON_NO_LISTENER,
                "no event handler installed"
            );
            continue;
        };

        let delivery = tokio::spawn(async move {
            match event {
                TransportEvent::Message(message) => current.on_message_arrived(message).await,
                TransportEvent::ConnectionLost(cause) => current.on_connection_lost(cause).await,
            }
        });
        if let Err(err) = delivery.await {
            warn!(
                event = events::TRANSPORT_HANDLER_PANICKED,
                component = COMPONENT,
                url = %url,
                err = %err,
                "event handler failed"
            );
        }
    }

    debug!(
        event = events::TRANSPORT_DISPATCH_STOP,
        component = COMPONENT,
        url = %url,
        "event dispatch stopped"
    );
}

/// Builds a [`RumqttcTransport`] per broker URL.
#[derive(Clone, Debug)]
pub struct RumqttcTransportFactory {
    request_capacity: usize,
}

impl RumqttcTransportFactory {
    pub fn new() -> Self {
        Self::with_request_capacity(DEFAULT_REQUEST_CAPACITY)
    }

    /// Bound of the queue between callers and the event loop.
    pub fn with_request_capacity(request_capacity: usize) -> Self {
        Self { request_capacity }
    }
}

impl Default for RumqttcTransportFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl TransportFactory for RumqttcTransportFactory {
    fn create(&self, url: &str, _client_id: &str) -> Result<Arc<dyn MqttTransport>, TransportError> {
        let address = BrokerAddress::parse(url)?;
        Ok(Arc::new(RumqttcTransport::new(
            url,
            address,
            self.request_capacity,
        )))
    }
}
