/// Registry collection path, relative to the registry base URL
pub const SERVICES_PATH: &str = "services";

/// Event-bus address the poller publishes status updates on
pub const STATUS_ADDRESS: &str = "kry.services";

/// SockJS raw websocket endpoint of the event-bus bridge
pub const EVENTBUS_WS_PATH: &str = "eventbus/websocket";

/// Event-bus bridge frame types
pub const FRAME_REGISTER: &str = "register";
pub const FRAME_PING: &str = "ping";
pub const FRAME_PONG: &str = "pong";
pub const FRAME_RECEIVE: &str = "rec";
pub const FRAME_ERROR: &str = "err";

/// Backend schema limit for name and url
pub const MAX_FIELD_LEN: usize = 255;

/// API path prefix of the dashboard daemon
pub const API_PREFIX: &str = "/v1";
