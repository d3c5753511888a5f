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

use mqtt_hub::TransportError;
use std::fmt::{Display, Formatter};

pub const DEFAULT_PORT: u16 = 1883;

const PLAIN_SCHEMES: [&str; 2] = ["tcp://", "mqtt://"];
const TLS_SCHEMES: [&str; 2] = ["ssl://", "mqtts://"];

/// Host and port of a plain TCP broker.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BrokerAddress {
    pub host: String,
    pub port: u16,
}

impl BrokerAddress {
    /// Accepts `tcp://host:port`, `mqtt://host:port` and bare `host[:port]`.
    pub fn parse(url: &str) -> Result<Self, TransportError> {
        if TLS_SCHEMES.iter().any(|scheme| url.starts_with(scheme)) {
            return Err(TransportError::new(format!(
                "{url}: tls transports are not enabled"
            )));
        }

        let authority = PLAIN_SCHEMES
            .iter()
            .find_map(|scheme| url.strip_prefix(scheme))
            .unwrap_or(url);
        if authority.contains("://") {
            return Err(TransportError::new(format!("{url}: unsupported scheme")));
        }
        let authority = authority.trim_end_matches('/');

        let (host, port) = split_host_port(authority)
            .ok_or_else(|| TransportError::new(format!("{url}: invalid port")))?;
        if host.is_empty() {
            return Err(TransportError::new(format!("{url}: missing host")));
        }

        Ok(Self {
            host: host.to_string(),
            port,
        })
    }
}

fn split_host_port(authority: &str) -> Option<(&str, u16)> {
    // Bracketed IPv6 literal, optionally followed by a port.
    if let Some(rest) = authority.strip_prefix('[') {
        let (host, tail) = rest.split_once(']')?;
        return match tail.strip_prefix(':') {
            Some(port) => Some((host, port.parse().ok()?)),
            None if tail.is_empty() => Some((host, DEFAULT_PORT)),
            None => None,
        };
    }

    match authority.rsplit_once(':') {
        Some((host, port)) => Some((host, port.parse().ok()?)),
        None => Some((authority, DEFAULT_PORT)),
    }
}

impl Display for BrokerAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}
