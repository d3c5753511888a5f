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

//! A live broker connection and the listeners attached to it.

use crate::error::TransportError;
use crate::message::{IncomingMessage, OutgoingMessage, QoS};
use crate::observability::{events, fields};
use crate::transport::MqttTransport;
use async_trait::async_trait;
use bytes::Bytes;
use std::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, warn};

const COMPONENT: &str = "channel";

/// Notified when the channel's connection is lost without the owner asking for it.
///
/// Caller-initiated disconnects never reach this listener.
#[async_trait]
pub trait DisconnectedListener: Send + Sync {
    async fn on_disconnected(&self, cause: &TransportError);
}

/// Notified for every publish the broker delivers on the channel.
#[async_trait]
pub trait MessageListener: Send + Sync {
    async fn on_message(&self, message: IncomingMessage);
}

#[async_trait]
impl<F> DisconnectedListener for F
where
    F: Fn(&TransportError) + Send + Sync,
{
    async fn on_disconnected(&self, cause: &TransportError) {
        (self)(cause)
    }
}

#[async_trait]
impl<F> MessageListener for F
where
    F: Fn(IncomingMessage) + Send + Sync,
{
    async fn on_message(&self, message: IncomingMessage) {
        (self)(message)
    }
}

type ListenerSlot<L> = RwLock<Option<Arc<L>>>;

fn current_listener<L: ?Sized>(slot: &ListenerSlot<L>) -> Option<Arc<L>> {
    slot.read()
        .unwrap_or_else(PoisonError::into_inner)
        .as_ref()
        .cloned()
}

fn replace_listener<L: ?Sized>(slot: &ListenerSlot<L>, listener: Option<Arc<L>>) {
    *slot.write().unwrap_or_else(PoisonError::into_inner) = listener;
}

/// Wraps one transport session.
///
/// A channel is handed out by [`ConnectionRegistry::connect`](crate::ConnectionRegistry::connect)
/// once the broker accepted the session. Publishes and subscriptions go through
/// the channel directly; teardown goes through the registry.
///
/// Listener assignment is not synchronized with event delivery, so listeners
/// should be set before the channel is shared with other tasks.
pub struct MqttChannel {
    url: String,
    transport: Arc<dyn MqttTransport>,
    next_message_id: AtomicU32,
    disconnected_listener: ListenerSlot<dyn DisconnectedListener>,
    message_listener: ListenerSlot<dyn MessageListener>,
}

impl MqttChannel {
    pub(crate) fn new(url: &str, transport: Arc<dyn MqttTransport>) -> Self {
        Self {
            url: url.to_string(),
            transport,
            next_message_id: AtomicU32::new(0),
            disconnected_listener: RwLock::new(None),
            message_listener: RwLock::new(None),
        }
    }

    /// Broker URL this channel is registered under.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub(crate) fn transport(&self) -> Arc<dyn MqttTransport> {
        self.transport.clone()
    }

    /// Sets the loss listener. The last call wins.
    pub fn set_disconnected_listener(&self, listener: Arc<dyn DisconnectedListener>) {
        replace_listener(&self.disconnected_listener, Some(listener));
    }

    pub fn clear_disconnected_listener(&self) {
        replace_listener(&self.disconnected_listener, None);
    }

    /// Sets the incoming-message listener. The last call wins.
    pub fn set_message_listener(&self, listener: Arc<dyn MessageListener>) {
        replace_listener(&self.message_listener, Some(listener));
    }

    pub fn clear_message_listener(&self) {
        replace_listener(&self.message_listener, None);
    }

    /// Publishes `payload` on `topic`.
    ///
    /// Every call is tagged with the next channel-local sequence id, starting at
    /// zero, which is returned on success. Delivery guarantees for `qos` are
    /// entirely the transport's.
    pub async fn publish(
        &self,
        topic: &str,
        qos: QoS,
        payload: impl Into<Bytes>,
    ) -> Result<u32, TransportError> {
        let id = self.next_message_id.fetch_add(1, Ordering::SeqCst);
        let message = OutgoingMessage {
            id,
            qos,
            retain: false,
            payload: payload.into(),
        };
        let payload_len = message.payload.len();

        match self.transport.publish(topic, message).await {
            Ok(()) => {
                debug!(
                    event = events::CHANNEL_PUBLISH_OK,
                    component = COMPONENT,
                    url = %self.url,
                    msg_id = id,
                    topic,
                    qos = qos.level(),
                    payload_len,
                    "published message"
                );
                Ok(id)
            }
            Err(err) => {
                warn!(
                    event = events::CHANNEL_PUBLISH_FAILED,
                    component = COMPONENT,
                    url = %self.url,
                    msg_id = id,
                    topic,
                    qos = qos.level(),
                    err = %err,
                    code = %fields::format_code(err.reason_code()),
                    "unable to publish message"
                );
                Err(err)
            }
        }
    }

    /// Subscribes to `topics`, each with the QoS at the same position in `qos_levels`.
    ///
    /// The two sequences are passed through unchecked.
    pub async fn subscribe(
        &self,
        topics: &[String],
        qos_levels: &[QoS],
    ) -> Result<(), TransportError> {
        let topic_list = fields::format_topics(topics);

        match self.transport.subscribe(topics, qos_levels).await {
            Ok(()) => {
                debug!(
                    event = events::CHANNEL_SUBSCRIBE_OK,
                    component = COMPONENT,
                    url = %self.url,
                    topic = %topic_list,
                    "subscribed"
                );
                Ok(())
            }
            Err(err) => {
                warn!(
                    event = events::CHANNEL_SUBSCRIBE_FAILED,
                    component = COMPONENT,
                    url = %self.url,
                    topic = %topic_list,
                    err = %err,
                    code = %fields::format_code(err.reason_code()),
                    "unable to subscribe"
                );
                Err(err)
            }
        }
    }

    pub(crate) async fn on_connection_lost(&self, cause: &TransportError) {
        match current_listener(&self.disconnected_listener) {
            Some(listener) => listener.on_disconnected(cause).await,
            None => debug!(
                event = events::CHANNEL_LOSS_DROPPED,
                component = COMPONENT,
                url = %self.url,
                reason = fields::REASON_NO_LISTENER,
                "dropping connection loss"
            ),
        }
    }

    pub(crate) async fn on_message_arrived(&self, message: IncomingMessage) {
        let Some(listener) = current_listener(&self.message_listener) else {
            debug!(
                event = events::CHANNEL_MESSAGE_DROPPED,
                component = COMPONENT,
                url = %self.url,
                msg_id = message.id,
                topic = %message.topic,
                reason = fields::REASON_NO_LISTENER,
                "dropping incoming message"
            );
            return;
        };

        debug!(
            event = events::CHANNEL_MESSAGE_RECEIVED,
            component = COMPONENT,
            url = %self.url,
            msg_id = message.id,
            topic = %message.topic,
            payload_len = message.payload.len(),
            "received message"
        );
        listener.on_message(message).await;
    }

    /// Tears the session down. Must run at most once per channel; the registry's
    /// atomic removal guarantees that.
    pub(crate) async fn close(&self) {
        debug!(
            event = events::CHANNEL_CLOSE,
            component = COMPONENT,
            url = %self.url,
            "closing channel"
        );

        if let Err(err) = self.transport.disconnect().await {
            debug!(
                event = events::CHANNEL_CLOSE_DISCONNECT_FAILED,
                component = COMPONENT,
                url = %self.url,
                err = %err,
                "ignoring disconnect failure while closing"
            );
        }
        self.transport.unregister_resources();
        self.transport.close();
    }
}

impl Debug for MqttChannel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttChannel")
            .field("url", &self.url)
            .field(
                "next_message_id",
                &self.next_message_id.load(Ordering::SeqCst),
            )
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::{DisconnectedListener, MessageListener, MqttChannel};
    use crate::error::TransportError;
    use crate::message::{IncomingMessage, OutgoingMessage, QoS};
    use crate::options::ConnectOptions;
    use crate::transport::{MqttTransport, TransportEventHandler};
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct RecordingTransport {
        published: Mutex<Vec<(String, OutgoingMessage)>>,
        subscribed: Mutex<Vec<(Vec<String>, Vec<QoS>)>>,
        fail_publish: bool,
        fail_disconnect: bool,
        disconnect_calls: AtomicUsize,
        unregister_calls: AtomicUsize,
        close_calls: AtomicUsize,
    }

    #[async_trait]
    impl MqttTransport for RecordingTransport {
        fn set_event_handler(&self, _handler: Arc<dyn TransportEventHandler>) {}

        async fn connect(&self, _options: &ConnectOptions) -> Result<(), TransportError> {
            Ok(())
        }

        async fn publish(
            &self,
            topic: &str,
            message: OutgoingMessage,
        ) -> Result<(), TransportError> {
            if self.fail_publish {
                return Err(TransportError::disconnected());
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
            self.subscribed
                .lock()
                .unwrap()
                .push((topics.to_vec(), qos_levels.to_vec()));
            Ok(())
        }

        async fn disconnect(&self) -> Result<(), TransportError> {
            self.disconnect_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_disconnect {
                return Err(TransportError::new("already closed"));
            }
            Ok(())
        }

        fn close(&self) {
            self.close_calls.fetch_add(1, Ordering::SeqCst);
        }

        fn unregister_resources(&self) {
            self.unregister_calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn incoming(id: u16, topic: &str) -> IncomingMessage {
        IncomingMessage {
            id,
            topic: topic.to_string(),
            qos: QoS::AtLeastOnce,
            retain: false,
            payload: Bytes::from_static(b"payload"),
        }
    }

    #[tokio::test]
    async fn publish_ids_increase_from_zero() {
        let transport = Arc::new(RecordingTransport::default());
        let channel = MqttChannel::new("tcp://broker:1883", transport.clone());

        for expected in 0..5u32 {
            let id = channel
                .publish("sensors/temp", QoS::AtLeastOnce, "21.5")
                .await
                .expect("publish should succeed");
            assert_eq!(id, expected);
        }

        let published = transport.published.lock().unwrap();
        let ids: Vec<u32> = published.iter().map(|(_, message)| message.id).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);
        assert!(published
            .iter()
            .all(|(topic, message)| topic == "sensors/temp" && message.qos == QoS::AtLeastOnce));
    }

    #[tokio::test]
    async fn publish_failure_without_cause_reports_disconnected_message() {
        let transport = Arc::new(RecordingTransport {
            fail_publish: true,
            ..Default::default()
        });
        let channel = MqttChannel::new("tcp://broker:1883", transport);

        let err = channel
            .publish("t", QoS::AtMostOnce, Bytes::new())
            .await
            .expect_err("publish should fail");

        assert_eq!(err.message(), crate::error::DISCONNECTED_MESSAGE);
    }

    #[tokio::test]
    async fn subscribe_passes_parallel_sequences_through() {
        let transport = Arc::new(RecordingTransport::default());
        let channel = MqttChannel::new("tcp://broker:1883", transport.clone());
        let topics = vec!["a/#".to_string(), "b/+".to_string()];

        channel
            .subscribe(&topics, &[QoS::AtMostOnce, QoS::ExactlyOnce])
            .await
            .expect("subscribe should succeed");

        let subscribed = transport.subscribed.lock().unwrap();
        assert_eq!(
            subscribed.as_slice(),
            &[(topics, vec![QoS::AtMostOnce, QoS::ExactlyOnce])]
        );
    }

    #[tokio::test]
    async fn events_without_listeners_are_dropped() {
        let channel = MqttChannel::new(
            "tcp://broker:1883",
            Arc::new(RecordingTransport::default()),
        );

        channel.on_message_arrived(incoming(1, "a")).await;
        channel
            .on_connection_lost(&TransportError::new("socket reset"))
            .await;
    }

    #[tokio::test]
    async fn last_listener_set_wins() {
        let channel = MqttChannel::new(
            "tcp://broker:1883",
            Arc::new(RecordingTransport::default()),
        );
        let first = Arc::new(Mutex::new(Vec::new()));
        let second = Arc::new(Mutex::new(Vec::new()));

        let first_sink = first.clone();
        let listener: Arc<dyn MessageListener> =
            Arc::new(move |message: IncomingMessage| first_sink.lock().unwrap().push(message.id));
        channel.set_message_listener(listener);

        let second_sink = second.clone();
        let listener: Arc<dyn MessageListener> =
            Arc::new(move |message: IncomingMessage| second_sink.lock().unwrap().push(message.id));
        channel.set_message_listener(listener);

        channel.on_message_arrived(incoming(7, "a")).await;
        channel.on_message_arrived(incoming(8, "a")).await;

        assert!(first.lock().unwrap().is_empty());
        assert_eq!(*second.lock().unwrap(), vec![7, 8]);

        channel.clear_message_listener();
        channel.on_message_arrived(incoming(9, "a")).await;
        assert_eq!(*second.lock().unwrap(), vec![7, 8]);
    }

    #[tokio::test]
    async fn connection_loss_reaches_disconnected_listener() {
        let channel = MqttChannel::new(
            "tcp://broker:1883",
            Arc::new(RecordingTransport::default()),
        );
        let causes = Arc::new(Mutex::new(Vec::new()));
        let sink = causes.clone();
        let listener: Arc<dyn DisconnectedListener> = Arc::new(move |cause: &TransportError| {
            sink.lock().unwrap().push(cause.message().to_string())
        });
        channel.set_disconnected_listener(listener);

        channel
            .on_connection_lost(&TransportError::new("keep alive timeout"))
            .await;

        assert_eq!(*causes.lock().unwrap(), vec!["keep alive timeout"]);
    }

    #[tokio::test]
    async fn close_suppresses_disconnect_failure_and_releases_resources() {
        let transport = Arc::new(RecordingTransport {
            fail_disconnect: true,
            ..Default::default()
        });
        let channel = MqttChannel::new("tcp://broker:1883", transport.clone());

        channel.close().await;

        assert_eq!(transport.disconnect_calls.load(Ordering::SeqCst), 1);
        assert_eq!(transport.unregister_calls.load(Ordering::SeqCst), 1);
        assert_eq!(transport.close_calls.load(Ordering::SeqCst), 1);
    }
}
