//! vidbridge core orchestration.
//!
//! Pure Rust crate with no platform dependencies.
//! Consumed by native app shells via UniFFI bindings.

pub mod channel;
pub mod config;
pub mod controller;
pub mod errors;
pub mod events;
pub mod media;

#[cfg(feature = "livekit")]
pub mod livekit_backend;

pub use channel::{ChannelHandler, Command, MethodCall, MethodResult};
pub use config::BridgeConfig;
pub use controller::{ControllerConfig, ControllerHandle, ControllerSnapshot, SessionController};
pub use errors::SessionError;
pub use events::{
    ErrorCause, SdkState, SerialExecutor, StateEmitter, StateListener, StateNotification,
    UiExecutor,
};
pub use media::{
    CameraPosition, MediaBackend, MediaEvent, MediaEventSender, PublisherSettings,
    SessionCredentials, VideoStyle,
};

#[cfg(feature = "livekit")]
pub use livekit_backend::LiveKitBackend;
