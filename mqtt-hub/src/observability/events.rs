//! Canonical structured event names used across `mqtt-hub`.

// Registry connect lifecycle events.
pub const CONNECT_START: &str = "connect_start";
pub const CONNECT_REJECTED: &str = "connect_rejected";
pub const CONNECT_DUPLICATE: &str = "connect_duplicate";
pub const CONNECT_OK: &str = "connect_ok";
pub const CONNECT_FAILED: &str = "connect_failed";
pub const CONNECT_INTERRUPTED: &str = "connect_interrupted";
pub const CONNECT_CANCELLED: &str = "connect_cancelled";

// Registry teardown events.
pub const DISCONNECT_OK: &str = "disconnect_ok";
pub const DISCONNECT_MISSING: &str = "disconnect_missing";
pub const DISCONNECT_ALL: &str = "disconnect_all";
pub const CONNECTION_LOST: &str = "connection_lost";
pub const CONNECTION_LOST_IGNORED: &str = "connection_lost_ignored";

// Channel events.
pub const CHANNEL_PUBLISH_OK: &str = "channel_publish_ok";
pub const CHANNEL_PUBLISH_FAILED: &str = "channel_publish_failed";
pub const CHANNEL_SUBSCRIBE_OK: &str = "channel_subscribe_ok";
pub const CHANNEL_SUBSCRIBE_FAILED: &str = "channel_subscribe_failed";
pub const CHANNEL_MESSAGE_RECEIVED: &str = "channel_message_received";
pub const CHANNEL_MESSAGE_DROPPED: &str = "channel_message_dropped";
pub const CHANNEL_LOSS_DROPPED: &str = "channel_loss_dropped";
pub const CHANNEL_CLOSE: &str = "channel_close";
pub const CHANNEL_CLOSE_DISCONNECT_FAILED: &str = "channel_close_disconnect_failed";

// Transport adapter events.
pub const TRANSPORT_EVENT_LOOP_START: &str = "transport_event_loop_start";
pub const TRANSPORT_EVENT_LOOP_STOP: &str = "transport_event_loop_stop";
pub const TRANSPORT_CONNACK: &str = "transport_connack";
pub const TRANSPORT_CONNECT_TIMEOUT: &str = "transport_connect_timeout";
pub const TRANSPORT_EVENT_DROPPED: &str = "transport_event_dropped";
pub const TRANSPORT_HANDLER_PANICKED: &str = "transport_handler_panicked";
pub const TRANSPORT_DISPATCH_STOP: &str = "transport_dispatch_stop";
