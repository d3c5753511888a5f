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

//! URL-keyed connection registry and its lifecycle rules.
//!
//! An entry exists from the moment a connect attempt starts until the first of
//! caller disconnect, connect failure or unsolicited loss removes it. Removal is
//! the only synchronization point: whoever removes the entry closes the channel
//! and reports the outcome, everyone else observes absence and does nothing.

use crate::channel::MqttChannel;
use crate::error::{ConnectError, TransportError};
use crate::message::IncomingMessage;
use crate::observability::{events, fields};
use crate::options::{ConnectRequest, HubConfig};
use crate::transport::{TransportEventHandler, TransportFactory};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

const COMPONENT: &str = "registry";

type ChannelMap = DashMap<String, Arc<MqttChannel>>;

/// Removes `url` only while it still maps to `channel`.
///
/// The identity check keeps a stale event from an older channel from evicting a
/// newer one registered under the same URL.
fn remove_if_current(channels: &ChannelMap, url: &str, channel: &Arc<MqttChannel>) -> bool {
    channels
        .remove_if(url, |_, registered| Arc::ptr_eq(registered, channel))
        .is_some()
}

/// Owns the URL to channel mapping for one application context.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use mqtt_hub::{ConnectRequest, ConnectionRegistry};
/// use integration_test_utils::ScriptedTransportFactory;
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let registry = ConnectionRegistry::new(Arc::new(ScriptedTransportFactory::new()));
///
/// let channel = registry
///     .connect(ConnectRequest::new("tcp://broker1:1883", "client-a"))
///     .await
///     .unwrap();
/// assert!(registry.is_connected(channel.url()));
///
/// assert!(registry.disconnect("tcp://broker1:1883").await);
/// assert!(!registry.disconnect("tcp://broker1:1883").await);
/// # });
/// ```
pub struct ConnectionRegistry {
    config: HubConfig,
    factory: Arc<dyn TransportFactory>,
    channels: Arc<ChannelMap>,
}

impl ConnectionRegistry {
    pub fn new(factory: Arc<dyn TransportFactory>) -> Self {
        Self::with_config(factory, HubConfig::default())
    }

    pub fn with_config(factory: Arc<dyn TransportFactory>, config: HubConfig) -> Self {
        Self {
            config,
            factory,
            channels: Arc::new(DashMap::new()),
        }
    }

    /// Opens a connection to `request.url()`.
    ///
    /// A provisional entry is registered before the transport is asked to
    /// connect, so `disconnect` may be called for a URL whose connect is still in
    /// flight. The returned future resolves exactly once:
    ///
    /// - `Ok(channel)` when the broker accepted the session and the entry is still ours;
    /// - `Err(Rejected)` when options or transport construction fail, with no entry created;
    /// - `Err(AlreadyConnected)` when the URL already has an entry;
    /// - `Err(Failed)` when the transport reports failure;
    /// - `Err(Interrupted)` when the broker accepted but the entry was removed meanwhile.
    ///
    /// Dropping the future before the transport answers removes the provisional
    /// entry and closes its channel, so the URL is free for the next attempt.
    pub async fn connect(&self, request: ConnectRequest) -> Result<Arc<MqttChannel>, ConnectError> {
        let url = request.url().to_string();
        let client_id = request.client_id().to_string();

        let options = request.to_options(&self.config).map_err(|err| {
            self.log_rejected(&url, &client_id, &err);
            ConnectError::Rejected(err)
        })?;

        if self.channels.contains_key(&url) {
            return Err(self.refuse_duplicate(url, &client_id));
        }

        // Built outside the map so a factory may call back into the registry.
        let transport = self.factory.create(&url, &client_id).map_err(|err| {
            self.log_rejected(&url, &client_id, &err);
            ConnectError::Rejected(err)
        })?;

        let mut provisional = match self.channels.entry(url.clone()) {
            Entry::Occupied(_) => {
                // Lost the insert to a concurrent connect; this transport never connected.
                transport.close();
                return Err(self.refuse_duplicate(url, &client_id));
            }
            Entry::Vacant(vacant) => {
                let channel = Arc::new(MqttChannel::new(&url, transport));
                vacant.insert(channel.clone());
                ProvisionalEntry {
                    channels: self.channels.clone(),
                    url: url.clone(),
                    channel,
                    settled: false,
                }
            }
        };
        let channel = provisional.channel.clone();

        let transport = channel.transport();
        transport.set_event_handler(Arc::new(ChannelEventRouter {
            url: url.clone(),
            channel: Arc::downgrade(&channel),
            channels: Arc::downgrade(&self.channels),
        }));

        info!(
            event = events::CONNECT_START,
            component = COMPONENT,
            url = %url,
            client_id = %client_id,
            keep_alive_secs = options.keep_alive_secs,
            "connecting"
        );

        let outcome = transport.connect(&options).await;
        provisional.settle();

        match outcome {
            Ok(()) => {
                let still_registered = self
                    .channels
                    .get(&url)
                    .is_some_and(|registered| Arc::ptr_eq(registered.value(), &channel));

                if still_registered {
                    info!(
                        event = events::CONNECT_OK,
                        component = COMPONENT,
                        url = %url,
                        client_id = %client_id,
                        "connected"
                    );
                    Ok(channel)
                } else {
                    warn!(
                        event = events::CONNECT_INTERRUPTED,
                        component = COMPONENT,
                        url = %url,
                        client_id = %client_id,
                        reason = fields::REASON_ENTRY_ABSENT,
                        "connection was torn down before it became active"
                    );
                    Err(ConnectError::Interrupted { url })
                }
            }
            Err(err) => {
                let owned = remove_if_current(&self.channels, &url, &channel);
                warn!(
                    event = events::CONNECT_FAILED,
                    component = COMPONENT,
                    url = %url,
                    client_id = %client_id,
                    err = %err,
                    code = %fields::format_code(err.reason_code()),
                    cleanup = owned,
                    "connect failed"
                );
                if owned {
                    channel.close().await;
                }
                Err(ConnectError::Failed(err))
            }
        }
    }

    /// Removes and closes the channel registered for `url`.
    ///
    /// Returns `false` when no entry was present, including when a concurrent
    /// disconnect, connect failure or connection loss removed it first.
    pub async fn disconnect(&self, url: &str) -> bool {
        let Some((_, channel)) = self.channels.remove(url) else {
            debug!(
                event = events::DISCONNECT_MISSING,
                component = COMPONENT,
                url,
                reason = fields::REASON_ENTRY_ABSENT,
                "nothing to disconnect"
            );
            return false;
        };

        channel.close().await;
        info!(
            event = events::DISCONNECT_OK,
            component = COMPONENT,
            url,
            "disconnected"
        );
        true
    }

    /// Disconnects every URL registered when the call started.
    ///
    /// Each removal is independently atomic; connects racing with this call
    /// may survive it.
    pub async fn disconnect_all(&self) {
        let urls = self.connected_urls();
        let mut count = 0usize;

        for url in &urls {
            if self.disconnect(url).await {
                count += 1;
            }
        }

        info!(
            event = events::DISCONNECT_ALL,
            component = COMPONENT,
            count,
            "disconnected all"
        );
    }

    /// Snapshot membership test; may be stale by the time it returns.
    pub fn is_connected(&self, url: &str) -> bool {
        self.channels.contains_key(url)
    }

    /// Snapshot of registered URLs, provisional entries included. Order is unspecified.
    pub fn connected_urls(&self) -> Vec<String> {
        self.channels
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// The channel currently registered for `url`, if any.
    pub fn channel(&self, url: &str) -> Option<Arc<MqttChannel>> {
        self.channels.get(url).map(|entry| entry.value().clone())
    }

    fn refuse_duplicate(&self, url: String, client_id: &str) -> ConnectError {
        warn!(
            event = events::CONNECT_DUPLICATE,
            component = COMPONENT,
            url = %url,
            client_id,
            "refusing second connection for url"
        );
        ConnectError::AlreadyConnected { url }
    }

    fn log_rejected(&self, url: &str, client_id: &str, err: &TransportError) {
        warn!(
            event = events::CONNECT_REJECTED,
            component = COMPONENT,
            url,
            client_id,
            err = %err,
            code = %fields::format_code(err.reason_code()),
            "connect request rejected"
        );
    }
}

/// Provisional entry owned by an in-flight `connect`.
///
/// Dropped unsettled means the connect future itself was dropped while the
/// transport was still connecting. The entry is then removed like any other
/// removal, and whoever wins that removal closes the channel.
struct ProvisionalEntry {
    channels: Arc<ChannelMap>,
    url: String,
    channel: Arc<MqttChannel>,
    settled: bool,
}

impl ProvisionalEntry {
    /// The transport answered; the caller of `connect` now owns the outcome.
    fn settle(&mut self) {
        self.settled = true;
    }
}

impl Drop for ProvisionalEntry {
    fn drop(&mut self) {
        if self.settled || !remove_if_current(&self.channels, &self.url, &self.channel) {
            return;
        }

        warn!(
            event = events::CONNECT_CANCELLED,
            component = COMPONENT,
            url = %self.url,
            "connect dropped before the broker answered"
        );

        let channel = self.channel.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move { channel.close().await });
            }
            Err(_) => {
                let transport = channel.transport();
                transport.unregister_resources();
                transport.close();
            }
        }
    }
}

/// Adapts transport events for one channel back into the registry.
///
/// Holds weak references only: the transport owns this router and the channel
/// owns the transport.
struct ChannelEventRouter {
    url: String,
    channel: Weak<MqttChannel>,
    channels: Weak<ChannelMap>,
}

#[async_trait]
impl TransportEventHandler for ChannelEventRouter {
    async fn on_connection_lost(&self, cause: TransportError) {
        let (Some(channel), Some(channels)) = (self.channel.upgrade(), self.channels.upgrade())
        else {
            debug!(
                event = events::CONNECTION_LOST_IGNORED,
                component = COMPONENT,
                url = %self.url,
                reason = fields::REASON_CHANNEL_DROPPED,
                "ignoring connection loss"
            );
            return;
        };

        if !remove_if_current(&channels, &self.url, &channel) {
            debug!(
                event = events::CONNECTION_LOST_IGNORED,
                component = COMPONENT,
                url = %self.url,
                err = %cause,
                reason = fields::REASON_ENTRY_ABSENT,
                "ignoring connection loss"
            );
            return;
        }

        warn!(
            event = events::CONNECTION_LOST,
            component = COMPONENT,
            url = %self.url,
            err = %cause,
            code = %fields::format_code(cause.reason_code()),
            "connection lost"
        );
        channel.close().await;
        channel.on_connection_lost(&cause).await;
    }

    async fn on_message_arrived(&self, message: IncomingMessage) {
        if let Some(channel) = self.channel.upgrade() {
            channel.on_message_arrived(message).await;
        }
    }
}
