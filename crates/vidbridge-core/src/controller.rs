//! Session controller actor.
//!
//! Owns the single session, the local publisher and at most one remote
//! subscriber. Commands from the channel and callbacks from the media
//! backend share one queue and are handled strictly one at a time, so no
//! state here is ever touched from a callback thread.

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use vidbridge_video::{SurfaceHost, SurfaceRegion, VideoSurface};

use crate::channel::Command;
use crate::config::BridgeConfig;
use crate::errors::SessionError;
use crate::events::{ErrorCause, SdkState, StateEmitter, StateNotification};
use crate::media::{
    CameraPosition, MediaBackend, MediaEvent, MediaEventSender, PublisherSettings,
    SessionCredentials, VideoStyle,
};

pub(crate) enum ControllerMessage {
    Command(Command),
    Media { attempt: u64, event: MediaEvent },
    ConnectTimeout { attempt: u64 },
    Snapshot(oneshot::Sender<ControllerSnapshot>),
    Teardown(Option<oneshot::Sender<()>>),
}

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub publisher: PublisherSettings,
    /// How long `WAIT` may last before the attempt is abandoned.
    pub connect_timeout: Option<Duration>,
}

impl From<&BridgeConfig> for ControllerConfig {
    fn from(config: &BridgeConfig) -> Self {
        Self {
            publisher: config.publisher_settings(),
            connect_timeout: config.connect_timeout(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublisherSnapshot {
    pub surface: VideoSurface,
    pub audio_enabled: bool,
    pub video_enabled: bool,
    pub camera: CameraPosition,
}

/// Point-in-time view of the controller, answered in queue order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerSnapshot {
    pub state: SdkState,
    pub attempt: u64,
    pub session_id: Option<String>,
    pub connected: bool,
    pub publisher: Option<PublisherSnapshot>,
    pub subscriber_stream: Option<String>,
}

/// Cloneable handle for talking to the controller actor.
#[derive(Clone)]
pub struct ControllerHandle {
    tx: mpsc::UnboundedSender<ControllerMessage>,
}

impl ControllerHandle {
    pub(crate) fn new(tx: mpsc::UnboundedSender<ControllerMessage>) -> Self {
        Self { tx }
    }

    /// Queue a command. Returns as soon as it is enqueued.
    pub fn submit(&self, command: Command) -> Result<(), SessionError> {
        self.tx
            .send(ControllerMessage::Command(command))
            .map_err(|_| SessionError::ControllerClosed)
    }

    pub async fn snapshot(&self) -> Result<ControllerSnapshot, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(ControllerMessage::Snapshot(reply))
            .map_err(|_| SessionError::ControllerClosed)?;
        rx.await.map_err(|_| SessionError::ControllerClosed)
    }

    /// Release publisher, subscriber and session, then wait for completion.
    pub async fn teardown(&self) -> Result<(), SessionError> {
        let (done, rx) = oneshot::channel();
        self.tx
            .send(ControllerMessage::Teardown(Some(done)))
            .map_err(|_| SessionError::ControllerClosed)?;
        rx.await.map_err(|_| SessionError::ControllerClosed)
    }

    /// Fire-and-forget variant of [`teardown`](Self::teardown).
    pub fn request_teardown(&self) {
        let _ = self.tx.send(ControllerMessage::Teardown(None));
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

struct ActiveSession {
    credentials: SessionCredentials,
    connected: bool,
}

struct LocalPublisher {
    surface: VideoSurface,
    audio_enabled: bool,
    video_enabled: bool,
    camera: CameraPosition,
}

struct RemoteSubscriber {
    stream_id: String,
    surface: VideoSurface,
}

pub struct SessionController {
    backend: Box<dyn MediaBackend>,
    host: Arc<SurfaceHost>,
    emitter: StateEmitter,
    config: ControllerConfig,
    /// Weak so the actor stops once every handle is gone.
    tx: mpsc::WeakUnboundedSender<ControllerMessage>,
    state: SdkState,
    attempt: u64,
    session: Option<ActiveSession>,
    publisher: Option<LocalPublisher>,
    subscriber: Option<RemoteSubscriber>,
}

impl SessionController {
    /// Spawn the actor on `runtime` and return a handle to it.
    pub fn spawn(
        backend: Box<dyn MediaBackend>,
        host: Arc<SurfaceHost>,
        emitter: StateEmitter,
        config: ControllerConfig,
        runtime: &Handle,
    ) -> (ControllerHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let controller = Self {
            backend,
            host,
            emitter,
            config,
            tx: tx.downgrade(),
            state: SdkState::LoggedOut,
            attempt: 0,
            session: None,
            publisher: None,
            subscriber: None,
        };
        let task = runtime.spawn(controller.run(rx));
        (ControllerHandle::new(tx), task)
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<ControllerMessage>) {
        tracing::info!("session controller started");
        while let Some(message) = rx.recv().await {
            match message {
                ControllerMessage::Command(command) => self.handle_command(command),
                ControllerMessage::Media { attempt, event } => {
                    if attempt != self.attempt {
                        tracing::warn!(attempt, current = self.attempt, ?event, "dropping callback from superseded session");
                        continue;
                    }
                    self.handle_media_event(event);
                }
                ControllerMessage::ConnectTimeout { attempt } => self.handle_connect_timeout(attempt),
                ControllerMessage::Snapshot(reply) => {
                    let _ = reply.send(self.snapshot());
                }
                ControllerMessage::Teardown(done) => {
                    self.teardown();
                    if let Some(done) = done {
                        let _ = done.send(());
                    }
                }
            }
        }
        self.release_session();
        tracing::info!("session controller stopped");
    }

    fn set_state(&mut self, notification: StateNotification) {
        self.state = notification.state;
        self.emitter.emit(notification);
    }

    fn snapshot(&self) -> ControllerSnapshot {
        ControllerSnapshot {
            state: self.state,
            attempt: self.attempt,
            session_id: self.session.as_ref().map(|s| s.credentials.session_id.clone()),
            connected: self.session.as_ref().is_some_and(|s| s.connected),
            publisher: self.publisher.as_ref().map(|p| PublisherSnapshot {
                surface: p.surface,
                audio_enabled: p.audio_enabled,
                video_enabled: p.video_enabled,
                camera: p.camera,
            }),
            subscriber_stream: self.subscriber.as_ref().map(|s| s.stream_id.clone()),
        }
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::InitSession(credentials) => self.init_session(credentials),
            Command::SwapCamera => match self.publisher.as_mut() {
                Some(publisher) => {
                    publisher.camera = publisher.camera.toggled();
                    self.backend.set_camera_position(publisher.camera);
                    tracing::info!(camera = ?publisher.camera, "camera swapped");
                }
                None => tracing::debug!("swapCamera ignored: no publisher"),
            },
            Command::ToggleAudio { publish_audio } => match self.publisher.as_mut() {
                Some(publisher) => {
                    publisher.audio_enabled = publish_audio;
                    self.backend.set_publish_audio(publish_audio);
                    tracing::info!("publish audio: {publish_audio}");
                }
                None => tracing::debug!("toggleAudio ignored: no publisher"),
            },
            Command::ToggleVideo { publish_video } => match self.publisher.as_mut() {
                Some(publisher) => {
                    publisher.video_enabled = publish_video;
                    self.backend.set_publish_video(publish_video);
                    tracing::info!("publish video: {publish_video}");
                }
                None => tracing::debug!("toggleVideo ignored: no publisher"),
            },
        }
    }

    fn init_session(&mut self, credentials: SessionCredentials) {
        if self.session.is_some() || self.publisher.is_some() || self.subscriber.is_some() {
            tracing::info!("initSession with a live session, releasing it first");
            self.release_session();
        }

        self.attempt += 1;
        let attempt = self.attempt;
        self.set_state(StateNotification::new(SdkState::Wait));

        let Some(tx) = self.tx.upgrade() else {
            return;
        };
        let events = MediaEventSender::new(attempt, tx);

        match self.backend.connect(&credentials, events) {
            Ok(()) => {
                tracing::info!(session_id = %credentials.session_id, attempt, "connecting");
                self.session = Some(ActiveSession {
                    credentials,
                    connected: false,
                });
                self.schedule_connect_timeout(attempt);
            }
            Err(e) => {
                tracing::warn!("{e}");
                // The backend may still hold the sender for this attempt.
                self.attempt += 1;
                self.set_state(StateNotification::error(ErrorCause::Connect));
            }
        }
    }

    fn schedule_connect_timeout(&self, attempt: u64) {
        let Some(timeout) = self.config.connect_timeout else {
            return;
        };
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(tx) = tx.upgrade() {
                let _ = tx.send(ControllerMessage::ConnectTimeout { attempt });
            }
        });
    }

    fn handle_connect_timeout(&mut self, attempt: u64) {
        if attempt != self.attempt || self.state != SdkState::Wait {
            return;
        }
        tracing::warn!(attempt, "session connect timed out");
        self.release_session();
        // Late callbacks from the abandoned connect must not revive it.
        self.attempt += 1;
        self.set_state(StateNotification::error(ErrorCause::Timeout));
    }

    // -----------------------------------------------------------------------
    // Backend callbacks
    // -----------------------------------------------------------------------

    fn handle_media_event(&mut self, event: MediaEvent) {
        match event {
            MediaEvent::SessionConnected { session_id } => self.on_session_connected(session_id),

            MediaEvent::SessionDisconnected => {
                tracing::info!("session disconnected");
                // The session took its publisher and subscriber with it.
                self.session = None;
                if self.publisher.take().is_some() {
                    self.host.detach(SurfaceRegion::Publisher);
                }
                if self.subscriber.take().is_some() {
                    self.host.detach(SurfaceRegion::Subscriber);
                }
                self.set_state(StateNotification::new(SdkState::LoggedOut));
            }

            MediaEvent::StreamReceived { stream_id } => self.on_stream_received(stream_id),

            MediaEvent::StreamDropped { stream_id } => match self.subscriber.take() {
                Some(subscriber) => {
                    tracing::info!(stream_id = %stream_id, subscribed = %subscriber.stream_id, "stream dropped, discarding subscriber");
                    self.backend.unsubscribe(&subscriber.stream_id);
                    self.host.detach(SurfaceRegion::Subscriber);
                }
                None => tracing::debug!(stream_id = %stream_id, "stream dropped without a subscriber"),
            },

            MediaEvent::SessionError { message } => {
                tracing::warn!("session error: {message}");
                self.set_state(StateNotification::error(ErrorCause::Connect));
            }

            MediaEvent::PublisherStreamCreated { stream_id } => {
                tracing::info!(stream_id = %stream_id, "publisher stream created");
            }

            MediaEvent::PublisherStreamDestroyed { stream_id } => {
                tracing::info!(stream_id = %stream_id, "publisher stream destroyed");
            }

            MediaEvent::PublisherError { message } => {
                tracing::warn!("publisher error: {message}");
                self.set_state(StateNotification::error(ErrorCause::Publish));
            }

            MediaEvent::SubscriberConnected { stream_id } => {
                tracing::info!(stream_id = %stream_id, "subscriber connected");
            }

            MediaEvent::SubscriberDisconnected { stream_id } => {
                tracing::info!(stream_id = %stream_id, "subscriber disconnected");
                self.set_state(StateNotification::new(SdkState::LoggedOut));
            }

            MediaEvent::SubscriberError { message } => {
                tracing::warn!("subscriber error: {message}");
                self.set_state(StateNotification::error(ErrorCause::Subscribe));
            }
        }
    }

    fn on_session_connected(&mut self, session_id: String) {
        let Some(session) = self.session.as_mut() else {
            tracing::debug!(session_id = %session_id, "connected callback without a session, ignored");
            return;
        };
        tracing::info!(session_id = %session_id, "session connected");
        session.connected = true;

        if self.publisher.is_some() {
            tracing::debug!("publisher already live");
            self.set_state(StateNotification::new(SdkState::LoggedIn));
            return;
        }

        let settings = self.config.publisher.clone();
        let surface = match self.backend.create_publisher(&settings) {
            Ok(surface) => surface,
            Err(e) => {
                tracing::warn!("{e}");
                self.set_state(StateNotification::error(ErrorCause::Publish));
                return;
            }
        };
        self.host.attach(SurfaceRegion::Publisher, surface);
        self.publisher = Some(LocalPublisher {
            surface,
            audio_enabled: settings.publish_audio,
            video_enabled: settings.publish_video,
            camera: settings.camera,
        });

        if let Err(e) = self.backend.publish() {
            tracing::warn!("{e}");
            self.set_state(StateNotification::error(ErrorCause::Publish));
            return;
        }
        self.set_state(StateNotification::new(SdkState::LoggedIn));
    }

    fn on_stream_received(&mut self, stream_id: String) {
        if let Some(existing) = self.subscriber.as_ref() {
            tracing::debug!(stream_id = %stream_id, current = %existing.stream_id, "already subscribed, stream ignored");
            return;
        }

        match self.backend.subscribe(&stream_id, VideoStyle::ScaleToFill) {
            Ok(surface) => {
                tracing::info!(stream_id = %stream_id, "subscribing to remote stream");
                self.host.attach(SurfaceRegion::Subscriber, surface);
                self.subscriber = Some(RemoteSubscriber { stream_id, surface });
            }
            Err(e) => {
                tracing::warn!("{e}");
                self.set_state(StateNotification::error(ErrorCause::Subscribe));
            }
        }
    }

    // -----------------------------------------------------------------------
    // Teardown
    // -----------------------------------------------------------------------

    /// Stop subscriber, publisher and session on the backend and clear the
    /// regions they occupied. Emits nothing.
    fn release_session(&mut self) {
        if let Some(subscriber) = self.subscriber.take() {
            self.backend.unsubscribe(&subscriber.stream_id);
            self.host.detach(SurfaceRegion::Subscriber);
        }
        if self.publisher.take().is_some() {
            self.backend.unpublish();
            self.host.detach(SurfaceRegion::Publisher);
        }
        if self.session.take().is_some() {
            self.backend.disconnect();
        }
    }

    fn teardown(&mut self) {
        let was_live = self.session.is_some() || self.publisher.is_some() || self.subscriber.is_some();
        self.release_session();
        self.attempt += 1;
        tracing::info!(was_live, "session torn down");
        if was_live {
            self.set_state(StateNotification::new(SdkState::LoggedOut));
        }
    }
}
