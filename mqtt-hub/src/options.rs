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

//! Caller-facing connect requests and the transport-facing options derived from them.

use crate::error::TransportError;
use crate::message::LastWill;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_CONNECTION_TIMEOUT_SECS: u64 = 15;

fn default_connection_timeout_secs() -> u64 {
    DEFAULT_CONNECTION_TIMEOUT_SECS
}

fn default_clean_session() -> bool {
    true
}

/// Registry-wide defaults applied to every connect attempt.
#[derive(Deserialize, Serialize, Debug, Clone, Eq, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct HubConfig {
    #[serde(default = "default_connection_timeout_secs")]
    pub connection_timeout_secs: u64,
    #[serde(default = "default_clean_session")]
    pub clean_session: bool,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            connection_timeout_secs: DEFAULT_CONNECTION_TIMEOUT_SECS,
            clean_session: true,
        }
    }
}

/// What a caller supplies to open a connection.
///
/// ```
/// use std::time::Duration;
/// use mqtt_hub::{ConnectRequest, LastWill};
///
/// let request = ConnectRequest::new("tcp://broker1:1883", "sensor-7")
///     .with_credentials("sensor", "secret")
///     .with_keep_alive(Duration::from_millis(20_000))
///     .with_last_will(LastWill::new("sensors/7/status", "offline"));
///
/// assert_eq!(request.url(), "tcp://broker1:1883");
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ConnectRequest {
    pub(crate) url: String,
    pub(crate) client_id: String,
    pub(crate) username: Option<String>,
    pub(crate) password: Option<String>,
    pub(crate) keep_alive: Duration,
    pub(crate) last_will: Option<LastWill>,
}

impl ConnectRequest {
    pub fn new(url: &str, client_id: &str) -> Self {
        Self {
            url: url.to_string(),
            client_id: client_id.to_string(),
            username: None,
            password: None,
            keep_alive: Duration::from_secs(60),
            last_will: None,
        }
    }

    pub fn with_credentials(mut self, username: &str, password: &str) -> Self {
        self.username = Some(username.to_string());
        self.password = Some(password.to_string());
        self
    }

    pub fn with_username(mut self, username: &str) -> Self {
        self.username = Some(username.to_string());
        self
    }

    /// Keep-alive interval; sub-second precision is dropped when handed to the transport.
    pub fn with_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn with_last_will(mut self, last_will: LastWill) -> Self {
        self.last_will = Some(last_will);
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub(crate) fn to_options(&self, config: &HubConfig) -> Result<ConnectOptions, TransportError> {
        if self.client_id.is_empty() {
            return Err(TransportError::new("client id must not be empty"));
        }

        let keep_alive_secs = u16::try_from(self.keep_alive.as_secs()).map_err(|_| {
            TransportError::new(format!(
                "keep alive of {}s exceeds the protocol maximum of {}s",
                self.keep_alive.as_secs(),
                u16::MAX
            ))
        })?;

        Ok(ConnectOptions {
            client_id: self.client_id.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            keep_alive_secs,
            connection_timeout: Duration::from_secs(config.connection_timeout_secs),
            clean_session: config.clean_session,
            last_will: self.last_will.clone(),
        })
    }
}

/// Options a transport needs to open one broker session.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ConnectOptions {
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub keep_alive_secs: u16,
    /// Upper bound on waiting for the broker's acknowledgement; enforced by the transport.
    pub connection_timeout: Duration,
    pub clean_session: bool,
    pub last_will: Option<LastWill>,
}
