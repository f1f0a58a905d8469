pub mod engine;
pub mod error;
pub mod push;
pub mod registry;
pub mod validate;

#[cfg(test)]
mod testing;

pub use engine::{EngineConfig, EngineHandle};
pub use error::{PollerError, Result};
pub use push::transport::WsConnector;
pub use push::{PushHandler, ReconnectPolicy, SubscriberConfig, SubscriberHandle, SubscriberState};
pub use registry::{HttpRegistryClient, RegistryApi};
