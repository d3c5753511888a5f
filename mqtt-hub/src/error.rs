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

//! Error values surfaced by the registry, channels and transports.

use thiserror::Error;

/// Message reported when a transport completes an operation without a cause,
/// which happens when the connection goes away underneath the request.
pub const DISCONNECTED_MESSAGE: &str = "mqtt by disconnected";

fn message_or_disconnected(message: &Option<String>) -> &str {
    message.as_deref().unwrap_or(DISCONNECTED_MESSAGE)
}

/// Failure reported by a transport collaborator.
///
/// Both parts are optional because transports frequently report a failure
/// without a human readable cause or a machine readable code.
#[derive(Clone, Debug, Default, Eq, Error, PartialEq)]
#[error("{}", message_or_disconnected(.message))]
pub struct TransportError {
    message: Option<String>,
    reason_code: Option<i32>,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            reason_code: None,
        }
    }

    pub fn with_reason_code(message: impl Into<String>, reason_code: i32) -> Self {
        Self {
            message: Some(message.into()),
            reason_code: Some(reason_code),
        }
    }

    /// A failure with no known cause, e.g. a request dropped by a closing connection.
    pub fn disconnected() -> Self {
        Self::default()
    }

    pub fn message(&self) -> &str {
        message_or_disconnected(&self.message)
    }

    pub fn reason_code(&self) -> Option<i32> {
        self.reason_code
    }

    /// The reason code rendered the way the caller API reports codes; empty when absent.
    pub fn code(&self) -> String {
        self.reason_code
            .map(|code| code.to_string())
            .unwrap_or_default()
    }
}

/// Outcome of a failed [`ConnectionRegistry::connect`](crate::ConnectionRegistry::connect).
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum ConnectError {
    /// The request was refused before any connection attempt was issued.
    #[error("connect request rejected: {0}")]
    Rejected(TransportError),
    /// Another connection already owns the URL.
    #[error("a connection to {url} is already registered")]
    AlreadyConnected { url: String },
    /// The transport reported that the connection attempt failed.
    #[error("{0}")]
    Failed(TransportError),
    /// The broker accepted the connection but the entry was removed in the meantime
    /// by a disconnect request or a connection loss.
    #[error("connection to {url} was torn down before it became active")]
    Interrupted { url: String },
}

impl ConnectError {
    /// Human readable part of the `(message, code)` pair.
    pub fn message(&self) -> String {
        match self {
            ConnectError::Rejected(err) | ConnectError::Failed(err) => err.message().to_string(),
            _ => self.to_string(),
        }
    }

    /// Machine readable part of the `(message, code)` pair; empty when unknown.
    pub fn code(&self) -> String {
        match self {
            ConnectError::Rejected(err) | ConnectError::Failed(err) => err.code(),
            _ => String::new(),
        }
    }
}
