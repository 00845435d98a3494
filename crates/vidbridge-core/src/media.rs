//! Seam between the session controller and the real-time media library.
//!
//! The backend owns connection, encoding, transport and capture. It is
//! driven with plain method calls from the controller actor and reports
//! outcomes asynchronously as [`MediaEvent`] values through the
//! [`MediaEventSender`] handed to it on `connect`.

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use vidbridge_video::VideoSurface;

use crate::controller::ControllerMessage;
use crate::errors::SessionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraPosition {
    #[default]
    Front,
    Back,
}

impl CameraPosition {
    pub fn toggled(self) -> Self {
        match self {
            Self::Front => Self::Back,
            Self::Back => Self::Front,
        }
    }
}

/// How a video renderer fits frames into its surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoStyle {
    ScaleToFill,
}

#[derive(Clone, PartialEq, Eq)]
pub struct SessionCredentials {
    pub api_key: String,
    pub session_id: String,
    pub token: String,
}

// Tokens are bearer credentials; keep them out of logs.
impl fmt::Debug for SessionCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCredentials")
            .field("api_key", &self.api_key)
            .field("session_id", &self.session_id)
            .field("token", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublisherSettings {
    pub name: String,
    pub publish_audio: bool,
    pub publish_video: bool,
    pub camera: CameraPosition,
    pub style: VideoStyle,
}

/// Callbacks from the media backend, one variant per listener method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaEvent {
    SessionConnected { session_id: String },
    SessionDisconnected,
    StreamReceived { stream_id: String },
    StreamDropped { stream_id: String },
    SessionError { message: String },
    PublisherStreamCreated { stream_id: String },
    PublisherStreamDestroyed { stream_id: String },
    PublisherError { message: String },
    SubscriberConnected { stream_id: String },
    SubscriberDisconnected { stream_id: String },
    SubscriberError { message: String },
}

/// Routes backend callbacks into the controller queue, tagged with the
/// connect attempt they belong to. Cheap to clone; safe to use from any
/// thread.
#[derive(Clone)]
pub struct MediaEventSender {
    attempt: u64,
    tx: mpsc::UnboundedSender<ControllerMessage>,
}

impl MediaEventSender {
    pub(crate) fn new(attempt: u64, tx: mpsc::UnboundedSender<ControllerMessage>) -> Self {
        Self { attempt, tx }
    }

    pub fn attempt(&self) -> u64 {
        self.attempt
    }

    /// Returns false once the controller has stopped.
    pub fn send(&self, event: MediaEvent) -> bool {
        self.tx
            .send(ControllerMessage::Media {
                attempt: self.attempt,
                event,
            })
            .is_ok()
    }
}

/// Capabilities the controller needs from a real-time media library.
///
/// Calls are made from the controller actor only, one at a time, and must
/// not block: long-running work is started and reported back via events.
pub trait MediaBackend: Send {
    fn connect(
        &mut self,
        credentials: &SessionCredentials,
        events: MediaEventSender,
    ) -> Result<(), SessionError>;

    fn disconnect(&mut self);

    /// Build the local publisher and return its renderable surface.
    fn create_publisher(&mut self, settings: &PublisherSettings) -> Result<VideoSurface, SessionError>;

    fn publish(&mut self) -> Result<(), SessionError>;

    fn unpublish(&mut self);

    /// Subscribe to a remote stream and return its renderable surface.
    fn subscribe(&mut self, stream_id: &str, style: VideoStyle) -> Result<VideoSurface, SessionError>;

    fn unsubscribe(&mut self, stream_id: &str);

    fn set_publish_audio(&mut self, enabled: bool);

    fn set_publish_video(&mut self, enabled: bool);

    fn set_camera_position(&mut self, position: CameraPosition);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn camera_toggles_both_ways() {
        assert_eq!(CameraPosition::Front.toggled(), CameraPosition::Back);
        assert_eq!(CameraPosition::Back.toggled(), CameraPosition::Front);
    }

    #[test]
    fn credentials_debug_hides_token() {
        let creds = SessionCredentials {
            api_key: "k1".into(),
            session_id: "s1".into(),
            token: "secret-token".into(),
        };
        let dbg = format!("{creds:?}");
        assert!(dbg.contains("s1"));
        assert!(!dbg.contains("secret-token"));
    }

    #[test]
    fn sender_tags_attempt() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sender = MediaEventSender::new(4, tx);
        assert!(sender.send(MediaEvent::SessionDisconnected));

        match rx.try_recv().unwrap() {
            ControllerMessage::Media { attempt, event } => {
                assert_eq!(attempt, 4);
                assert_eq!(event, MediaEvent::SessionDisconnected);
            }
            _ => panic!("expected media message"),
        }
    }

    #[test]
    fn sender_reports_closed_controller() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let sender = MediaEventSender::new(1, tx);
        assert!(!sender.send(MediaEvent::SessionDisconnected));
    }
}
