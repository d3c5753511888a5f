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

use mqtt_hub::{ConnectRequest, HubConfig, LastWill, QoS};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_KEEP_ALIVE_MS: u64 = 60_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("unable to parse config file: {0}")]
    Parse(#[from] json5::Error),
    #[error("duplicate broker url found: {0}")]
    DuplicateBroker(String),
    #[error("broker {0} sets a password without a username")]
    PasswordWithoutUsername(String),
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub(crate) hub_config: HubConfig,
    pub(crate) brokers: Vec<BrokerConfig>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct BrokerConfig {
    pub(crate) url: String,
    pub(crate) client_id: String,
    #[serde(default)]
    pub(crate) username: Option<String>,
    #[serde(default)]
    pub(crate) password: Option<String>,
    #[serde(default = "default_keep_alive_ms")]
    pub(crate) keep_alive_ms: u64,
    #[serde(default)]
    pub(crate) last_will: Option<LastWillConfig>,
    #[serde(default)]
    pub(crate) subscriptions: Vec<SubscriptionConfig>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct LastWillConfig {
    pub(crate) topic: String,
    pub(crate) payload: String,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct SubscriptionConfig {
    pub(crate) topic: String,
    #[serde(default)]
    pub(crate) qos: QoS,
}

fn default_keep_alive_ms() -> u64 {
    DEFAULT_KEEP_ALIVE_MS
}

impl Config {
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        Self::from_json5(&contents)
    }

    pub fn from_json5(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = json5::from_str(contents)?;

        let mut urls = HashSet::new();
        for broker in &config.brokers {
            if !urls.insert(broker.url.as_str()) {
                return Err(ConfigError::DuplicateBroker(broker.url.clone()));
            }
            if broker.password.is_some() && broker.username.is_none() {
                return Err(ConfigError::PasswordWithoutUsername(broker.url.clone()));
            }
        }
        Ok(config)
    }
}

impl BrokerConfig {
    pub fn connect_request(&self) -> ConnectRequest {
        let mut request = ConnectRequest::new(&self.url, &self.client_id)
            .with_keep_alive(Duration::from_millis(self.keep_alive_ms));

        request = match (&self.username, &self.password) {
            (Some(username), Some(password)) => request.with_credentials(username, password),
            (Some(username), None) => request.with_username(username),
            // Rejected at load time when a password is set.
            (None, _) => request,
        };

        if let Some(will) = &self.last_will {
            request = request.with_last_will(LastWill::new(will.topic.clone(), will.payload.clone()));
        }
        request
    }

    /// Subscriptions as the parallel topic / QoS sequences a channel expects.
    pub fn subscription_filters(&self) -> (Vec<String>, Vec<QoS>) {
        self.subscriptions
            .iter()
            .map(|subscription| (subscription.topic.clone(), subscription.qos))
            .unzip()
    }
}

#[cfg(test)]
mod tests {
    use super::{Config, ConfigError};
    use mqtt_hub::QoS;

    #[test]
    fn bundled_config_parses() {
        let config = Config::from_json5(include_str!("../HUB_CONFIG.json5"))
            .expect("bundled config should parse");

        assert_eq!(config.hub_config.connection_timeout_secs, 15);
        assert_eq!(config.brokers.len(), 2);

        let local = &config.brokers[0];
        let (topics, qos_levels) = local.subscription_filters();
        assert_eq!(topics, vec!["sensors/#", "alerts/+"]);
        assert_eq!(qos_levels, vec![QoS::AtLeastOnce, QoS::ExactlyOnce]);

        let request = local.connect_request();
        assert_eq!(request.url(), "tcp://localhost:1883");
        assert_eq!(request.client_id(), "configurable-hub-local");
    }

    #[test]
    fn optional_fields_fall_back_to_defaults() {
        let config = Config::from_json5(
            r#"{ brokers: [ { url: "broker1", client_id: "a", subscriptions: [ { topic: "t" } ] } ] }"#,
        )
        .expect("minimal config should parse");

        assert_eq!(config.hub_config.connection_timeout_secs, 15);
        assert!(config.hub_config.clean_session);
        assert_eq!(config.brokers[0].keep_alive_ms, 60_000);
        assert_eq!(config.brokers[0].subscriptions[0].qos, QoS::AtMostOnce);
    }

    #[test]
    fn duplicate_broker_urls_are_rejected() {
        let err = Config::from_json5(
            r#"{ brokers: [ { url: "broker1", client_id: "a" }, { url: "broker1", client_id: "b" } ] }"#,
        )
        .expect_err("duplicates should be rejected");

        assert!(matches!(err, ConfigError::DuplicateBroker(url) if url == "broker1"));
    }

    #[test]
    fn password_without_username_is_rejected() {
        let err = Config::from_json5(
            r#"{ brokers: [ { url: "broker1", client_id: "a", password: "secret" } ] }"#,
        )
        .expect_err("orphan password should be rejected");

        assert!(matches!(&err, ConfigError::PasswordWithoutUsername(url) if url == "broker1"));
        assert!(!err.to_string().contains("secret"));
    }

    #[test]
    fn username_alone_is_accepted() {
        let config = Config::from_json5(
            r#"{ brokers: [ { url: "broker1", client_id: "a", username: "user" } ] }"#,
        )
        .expect("username without password should parse");

        assert_eq!(config.brokers[0].username.as_deref(), Some("user"));
    }

    #[test]
    fn unknown_fields_and_bad_qos_are_rejected() {
        assert!(Config::from_json5(r#"{ brokers: [], retries: 3 }"#).is_err());
        assert!(Config::from_json5(
            r#"{ brokers: [ { url: "b", client_id: "a", subscriptions: [ { topic: "t", qos: 3 } ] } ] }"#
        )
        .is_err());
    }

    #[test]
    fn missing_file_reports_path() {
        let err = Config::load("/nonexistent/hub.json5").expect_err("load should fail");
        assert!(err.to_string().contains("/nonexistent/hub.json5"));
    }
}
