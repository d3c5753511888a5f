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

mod support;

use bytes::Bytes;
use integration_test_utils::{ConnectBehavior, RecordingDisconnectedListener};
use mqtt_hub::{
    ConnectError, ConnectRequest, ConnectionRegistry, HubConfig, LastWill, QoS, TransportError,
};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn connect_then_disconnect_twice() {
    let (factory, registry) = support::make_registry();

    support::connect_ok(&registry, "broker1").await;
    assert!(registry.is_connected("broker1"));

    assert!(registry.disconnect("broker1").await);
    assert!(!registry.disconnect("broker1").await);
    assert!(!registry.is_connected("broker1"));

    let transport = factory.latest("broker1").expect("transport should exist");
    assert_eq!(transport.disconnect_calls(), 1);
    assert_eq!(transport.unregister_calls(), 1);
    assert_eq!(transport.close_calls(), 1);
}

#[tokio::test]
async fn failed_connect_reports_error_once_and_leaves_no_entry() {
    let (factory, registry) = support::make_registry();
    factory.script(
        "broker2",
        ConnectBehavior::Fail(TransportError::with_reason_code("auth rejected", 5)),
    );

    let err = registry
        .connect(ConnectRequest::new("broker2", "client"))
        .await
        .expect_err("connect should fail");

    assert!(matches!(err, ConnectError::Failed(_)));
    assert_eq!(err.message(), "auth rejected");
    assert_eq!(err.code(), "5");
    assert!(!registry.is_connected("broker2"));

    let transport = factory.latest("broker2").expect("transport should exist");
    assert_eq!(transport.close_calls(), 1);
    // The event handler went away with the channel, a late loss reaches nobody.
    assert!(!transport.has_event_handler());
    transport
        .emit_connection_lost(TransportError::new("late loss"))
        .await;
    assert!(registry.connected_urls().is_empty());
}

#[tokio::test]
async fn unsolicited_loss_notifies_listener_once() {
    let (factory, registry) = support::make_registry();
    let channel = support::connect_ok(&registry, "broker3").await;
    let (_, losses) = support::attach_listeners(&channel);

    let transport = factory.latest("broker3").expect("transport should exist");
    transport
        .emit_connection_lost(TransportError::new("keep alive timeout"))
        .await;
    transport
        .emit_connection_lost(TransportError::new("second report"))
        .await;

    assert_eq!(losses.count(), 1);
    assert_eq!(losses.causes()[0].message(), "keep alive timeout");
    assert!(!registry.disconnect("broker3").await);
    assert_eq!(transport.close_calls(), 1);
}

#[tokio::test]
async fn caller_disconnect_does_not_notify_disconnected_listener() {
    let (_factory, registry) = support::make_registry();
    let channel = support::connect_ok(&registry, "broker4").await;
    let losses = Arc::new(RecordingDisconnectedListener::new("broker4"));
    channel.set_disconnected_listener(losses.clone());

    assert!(registry.disconnect("broker4").await);
    assert_eq!(losses.count(), 0);
}

#[tokio::test]
async fn reconnect_after_loss_gets_a_fresh_channel() {
    let (factory, registry) = support::make_registry();
    let first = support::connect_ok(&registry, "broker5").await;

    factory
        .latest("broker5")
        .expect("transport should exist")
        .emit_connection_lost(TransportError::disconnected())
        .await;
    assert!(!registry.is_connected("broker5"));

    let second = support::connect_ok(&registry, "broker5").await;
    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(factory.created_for("broker5").len(), 2);

    // A stale loss from the first transport must not evict the new channel.
    factory.created_for("broker5")[0]
        .emit_connection_lost(TransportError::new("stale"))
        .await;
    let registered = registry.channel("broker5").expect("entry should remain");
    assert!(Arc::ptr_eq(&registered, &second));
}

#[tokio::test]
async fn duplicate_connect_is_refused_without_new_transport() {
    let (factory, registry) = support::make_registry();
    support::connect_ok(&registry, "broker6").await;

    let err = registry
        .connect(ConnectRequest::new("broker6", "other"))
        .await
        .expect_err("duplicate should be refused");

    assert_eq!(
        err,
        ConnectError::AlreadyConnected {
            url: "broker6".to_string()
        }
    );
    assert_eq!(factory.created_for("broker6").len(), 1);
    assert!(registry.is_connected("broker6"));
}

#[tokio::test]
async fn rejected_construction_surfaces_immediately() {
    let (factory, registry) = support::make_registry();
    factory.reject(
        "ssl://broker:8883",
        TransportError::with_reason_code("tls is not supported", 32103),
    );

    let err = registry
        .connect(ConnectRequest::new("ssl://broker:8883", "client"))
        .await
        .expect_err("construction should be rejected");

    assert!(matches!(err, ConnectError::Rejected(_)));
    assert_eq!(err.code(), "32103");
    assert!(registry.connected_urls().is_empty());
}

#[tokio::test]
async fn disconnect_all_empties_the_registry() {
    let (factory, registry) = support::make_registry();
    for url in ["a", "b", "c"] {
        support::connect_ok(&registry, url).await;
    }

    let mut urls = registry.connected_urls();
    urls.sort();
    assert_eq!(urls, vec!["a", "b", "c"]);

    registry.disconnect_all().await;

    assert!(registry.connected_urls().is_empty());
    for url in ["a", "b", "c"] {
        assert_eq!(factory.latest(url).unwrap().close_calls(), 1);
    }
}

#[tokio::test]
async fn connect_options_reach_the_transport() {
    integration_test_utils::init_logging();
    let factory = Arc::new(integration_test_utils::ScriptedTransportFactory::new());
    let registry = ConnectionRegistry::with_config(
        factory.clone(),
        HubConfig {
            connection_timeout_secs: 3,
            clean_session: false,
        },
    );

    let request = ConnectRequest::new("tcp://broker:1883", "client-7")
        .with_credentials("user", "secret")
        .with_keep_alive(Duration::from_millis(30_500))
        .with_last_will(LastWill::new("clients/7/state", "offline"));
    registry.connect(request).await.expect("connect should succeed");

    let options = factory
        .latest("tcp://broker:1883")
        .and_then(|transport| transport.connect_options())
        .expect("options should be recorded");
    assert_eq!(options.client_id, "client-7");
    assert_eq!(options.username.as_deref(), Some("user"));
    assert_eq!(options.password.as_deref(), Some("secret"));
    assert_eq!(options.keep_alive_secs, 30);
    assert_eq!(options.connection_timeout, Duration::from_secs(3));
    assert!(!options.clean_session);

    let will = options.last_will.expect("will should be set");
    assert_eq!(will.topic, "clients/7/state");
    assert_eq!(will.payload, Bytes::from_static(b"offline"));
    assert_eq!(will.qos, QoS::ExactlyOnce);
    assert!(!will.retain);
}
