use integration_test_utils::{
    RecordingDisconnectedListener, RecordingMessageListener, ScriptedTransportFactory,
};
use mqtt_hub::{ConnectRequest, ConnectionRegistry, MqttChannel};
use std::sync::Arc;

pub(crate) fn make_registry() -> (Arc<ScriptedTransportFactory>, Arc<ConnectionRegistry>) {
    integration_test_utils::init_logging();

    let factory = Arc::new(ScriptedTransportFactory::new());
    let registry = Arc::new(ConnectionRegistry::new(factory.clone()));
    (factory, registry)
}

pub(crate) async fn connect_ok(registry: &ConnectionRegistry, url: &str) -> Arc<MqttChannel> {
    registry
        .connect(ConnectRequest::new(url, &format!("{url}-client")))
        .await
        .expect("connect should succeed")
}

#[allow(dead_code)]
pub(crate) fn attach_listeners(
    channel: &MqttChannel,
) -> (
    Arc<RecordingMessageListener>,
    Arc<RecordingDisconnectedListener>,
) {
    let messages = Arc::new(RecordingMessageListener::new(channel.url()));
    let losses = Arc::new(RecordingDisconnectedListener::new(channel.url()));
    channel.set_message_listener(messages.clone());
    channel.set_disconnected_listener(losses.clone());
    (messages, losses)
}
