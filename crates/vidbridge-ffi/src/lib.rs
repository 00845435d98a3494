//! UniFFI bindings for vidbridge-core.
//!
//! Provides a VidBridge object that owns the session controller, the named
//! method channel and the state emitter, and wires the native media SDK and
//! platform view into them through callback interfaces.

use std::path::Path;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};

use serde_json::Value;
use vidbridge_core::{
    channel::MethodCall,
    config::DEFAULT_LOG_FILTER,
    events::{
        ErrorCause as CoreErrorCause, SdkState as CoreSdkState,
        StateNotification as CoreStateNotification,
    },
    media::{
        CameraPosition as CoreCameraPosition, PublisherSettings as CorePublisherSettings,
        VideoStyle as CoreVideoStyle,
    },
    BridgeConfig, ChannelHandler, ControllerConfig, ControllerHandle, MediaBackend, MediaEvent,
    MediaEventSender, MethodResult, SerialExecutor, SessionController, SessionCredentials,
    SessionError, StateEmitter,
};
use vidbridge_video::{SurfaceHost, SurfaceRegion as CoreSurfaceRegion, VideoSurface};

uniffi::include_scaffolding!("vidbridge");

/// Settings file looked up inside the app data directory.
const CONFIG_FILE: &str = "bridge.json";

fn lock<T>(m: &StdMutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Native log helper ────────────────────────────────────────────────

/// Write a message to logcat on Android, or stderr on other platforms.
///
/// Used before the tracing subscriber is installed.
fn native_log(msg: &str) {
    #[cfg(target_os = "android")]
    {
        use std::ffi::CString;
        unsafe extern "C" {
            fn __android_log_write(prio: i32, tag: *const std::ffi::c_char, text: *const std::ffi::c_char) -> i32;
        }
        let Ok(tag) = CString::new("VIDBRIDGE_FFI") else { return };
        let Ok(text) = CString::new(msg.replace('\0', "")) else { return };
        unsafe { __android_log_write(4 /* INFO */, tag.as_ptr(), text.as_ptr()); }
    }
    #[cfg(not(target_os = "android"))]
    eprintln!("{msg}");
}

// ── Namespace functions ──────────────────────────────────────────────

/// Initialize tracing. Only the first call has any effect.
///
/// `RUST_LOG` wins over `filter`; an empty `filter` means the default.
pub fn init_logging(filter: String) {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .or_else(|_| {
                let directives = if filter.trim().is_empty() { DEFAULT_LOG_FILTER } else { filter.as_str() };
                tracing_subscriber::EnvFilter::try_new(directives)
            })
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER));
        if tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_ansi(false)
            .try_init()
            .is_err()
        {
            native_log("VIDBRIDGE FFI: a global tracing subscriber is already installed");
        }
    });
}

/// Frames for the two regions of a host container of the given size.
pub fn split_layout(width: f32, height: f32) -> Vec<SurfaceFrame> {
    let frames = vidbridge_video::split_layout(width, height);
    vec![
        SurfaceFrame::new(SurfaceRegion::Subscriber, frames.subscriber),
        SurfaceFrame::new(SurfaceRegion::Publisher, frames.publisher),
    ]
}

// ── FFI-safe type conversions ──────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceRegion {
    Publisher,
    Subscriber,
}

impl From<CoreSurfaceRegion> for SurfaceRegion {
    fn from(r: CoreSurfaceRegion) -> Self {
        match r {
            CoreSurfaceRegion::Publisher => Self::Publisher,
            CoreSurfaceRegion::Subscriber => Self::Subscriber,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraPosition {
    Front,
    Back,
}

impl From<CoreCameraPosition> for CameraPosition {
    fn from(p: CoreCameraPosition) -> Self {
        match p {
            CoreCameraPosition::Front => Self::Front,
            CoreCameraPosition::Back => Self::Back,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoStyle {
    ScaleToFill,
}

impl From<CoreVideoStyle> for VideoStyle {
    fn from(s: CoreVideoStyle) -> Self {
        match s {
            CoreVideoStyle::ScaleToFill => Self::ScaleToFill,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdkState {
    LoggedOut,
    LoggedIn,
    Wait,
    Error,
}

impl From<CoreSdkState> for SdkState {
    fn from(s: CoreSdkState) -> Self {
        match s {
            CoreSdkState::LoggedOut => Self::LoggedOut,
            CoreSdkState::LoggedIn => Self::LoggedIn,
            CoreSdkState::Wait => Self::Wait,
            CoreSdkState::Error => Self::Error,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCause {
    Connect,
    Publish,
    Subscribe,
    Timeout,
}

impl From<CoreErrorCause> for ErrorCause {
    fn from(c: CoreErrorCause) -> Self {
        match c {
            CoreErrorCause::Connect => Self::Connect,
            CoreErrorCause::Publish => Self::Publish,
            CoreErrorCause::Subscribe => Self::Subscribe,
            CoreErrorCause::Timeout => Self::Timeout,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateUpdate {
    pub state: SdkState,
    /// Wire label, e.g. `LOGGED_IN`.
    pub label: String,
    pub cause: Option<ErrorCause>,
}

impl From<CoreStateNotification> for StateUpdate {
    fn from(n: CoreStateNotification) -> Self {
        Self {
            state: n.state.into(),
            label: n.state.as_str().to_string(),
            cause: n.cause.map(Into::into),
        }
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

impl From<&CorePublisherSettings> for PublisherSettings {
    fn from(s: &CorePublisherSettings) -> Self {
        Self {
            name: s.name.clone(),
            publish_audio: s.publish_audio,
            publish_video: s.publish_video,
            camera: s.camera.into(),
            style: s.style.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceFrame {
    pub region: SurfaceRegion,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl SurfaceFrame {
    fn new(region: SurfaceRegion, rect: vidbridge_video::Rect) -> Self {
        Self {
            region,
            x: rect.x,
            y: rect.y,
            width: rect.width,
            height: rect.height,
        }
    }
}

/// Reply to a method call. `result` is the JSON-encoded value unless it is
/// a plain string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodResponse {
    Success { result: String },
    Error { code: String, message: String },
    NotImplemented,
}

impl From<MethodResult> for MethodResponse {
    fn from(r: MethodResult) -> Self {
        match r {
            MethodResult::Success(Value::String(result)) => Self::Success { result },
            MethodResult::Success(other) => Self::Success { result: other.to_string() },
            MethodResult::Error { code, message, .. } => Self::Error { code, message },
            MethodResult::NotImplemented => Self::NotImplemented,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Invalid arguments: {msg}")]
    InvalidArguments { msg: String },
    #[error("Malformed call: {msg}")]
    MalformedCall { msg: String },
    #[error("Session error: {msg}")]
    Session { msg: String },
    #[error("Controller closed: {msg}")]
    ControllerClosed { msg: String },
    #[error("Runtime error: {msg}")]
    Runtime { msg: String },
}

impl From<SessionError> for BridgeError {
    fn from(e: SessionError) -> Self {
        tracing::error!("BridgeError: {e}");
        let msg = e.to_string();
        match e {
            SessionError::Connect(_) | SessionError::Publish(_) | SessionError::Subscribe(_) => {
                Self::Session { msg }
            }
            SessionError::CommandArgument { .. } => Self::InvalidArguments { msg },
            SessionError::MalformedCall(_) => Self::MalformedCall { msg },
            SessionError::ControllerClosed => Self::ControllerClosed { msg },
        }
    }
}

// ── Callback interfaces ──────────────────────────────────────────────

pub trait StateListener: Send + Sync {
    fn on_update_state(&self, update: StateUpdate);
}

/// Native container hosting the publisher and subscriber regions.
pub trait HostView: Send + Sync {
    fn add_surface(&self, region: SurfaceRegion, surface_id: u64);
    fn clear_region(&self, region: SurfaceRegion);
}

/// Native media SDK. Results of `connect`, `publish` and `subscribe` are
/// reported back through the `on_*` methods of [`VidBridge`].
pub trait MediaSdk: Send + Sync {
    fn connect(&self, api_key: String, session_id: String, token: String);
    fn disconnect(&self);
    fn create_publisher(&self, settings: PublisherSettings) -> u64;
    fn publish(&self);
    fn unpublish(&self);
    fn subscribe(&self, stream_id: String, style: VideoStyle) -> u64;
    fn unsubscribe(&self, stream_id: String);
    fn set_publish_audio(&self, enabled: bool);
    fn set_publish_video(&self, enabled: bool);
    fn set_camera_position(&self, position: CameraPosition);
}

// ── Bridges: FFI callbacks → core traits ─────────────────────────────

struct BridgeListener {
    ffi_listener: Box<dyn StateListener>,
}

impl vidbridge_core::StateListener for BridgeListener {
    fn on_update_state(&self, notification: CoreStateNotification) {
        self.ffi_listener.on_update_state(notification.into());
    }
}

struct BridgeHostView {
    view: Box<dyn HostView>,
}

impl vidbridge_video::HostView for BridgeHostView {
    fn add_surface(&self, region: CoreSurfaceRegion, surface: VideoSurface) {
        self.view.add_surface(region.into(), surface.id);
    }

    fn clear_region(&self, region: CoreSurfaceRegion) {
        self.view.clear_region(region.into());
    }
}

type SdkSlot = Arc<StdMutex<Option<Box<dyn MediaSdk>>>>;
type EventSlot = Arc<StdMutex<Option<MediaEventSender>>>;

/// Backend driving the native SDK registered with
/// [`VidBridge::set_media_sdk`]. The SDK can be registered after the bridge
/// is created; commands issued before that fail or are ignored.
struct PlatformBackend {
    sdk: SdkSlot,
    events: EventSlot,
}

impl PlatformBackend {
    fn with_sdk<R>(&self, f: impl FnOnce(&dyn MediaSdk) -> R) -> Option<R> {
        let guard = lock(&self.sdk);
        match guard.as_deref() {
            Some(sdk) => Some(f(sdk)),
            None => {
                tracing::warn!("no media SDK registered");
                None
            }
        }
    }
}

impl MediaBackend for PlatformBackend {
    fn connect(
        &mut self,
        credentials: &SessionCredentials,
        events: MediaEventSender,
    ) -> Result<(), SessionError> {
        // The SDK may call back before `connect` returns.
        *lock(&self.events) = Some(events);
        self.with_sdk(|sdk| {
            sdk.connect(
                credentials.api_key.clone(),
                credentials.session_id.clone(),
                credentials.token.clone(),
            )
        })
        .ok_or_else(|| SessionError::Connect("no media SDK registered".into()))
    }

    fn disconnect(&mut self) {
        self.with_sdk(|sdk| sdk.disconnect());
        *lock(&self.events) = None;
    }

    fn create_publisher(&mut self, settings: &CorePublisherSettings) -> Result<VideoSurface, SessionError> {
        self.with_sdk(|sdk| sdk.create_publisher(settings.into()))
            .map(VideoSurface::new)
            .ok_or_else(|| SessionError::Publish("no media SDK registered".into()))
    }

    fn publish(&mut self) -> Result<(), SessionError> {
        self.with_sdk(|sdk| sdk.publish())
            .ok_or_else(|| SessionError::Publish("no media SDK registered".into()))
    }

    fn unpublish(&mut self) {
        self.with_sdk(|sdk| sdk.unpublish());
    }

    fn subscribe(&mut self, stream_id: &str, style: CoreVideoStyle) -> Result<VideoSurface, SessionError> {
        self.with_sdk(|sdk| sdk.subscribe(stream_id.to_string(), style.into()))
            .map(VideoSurface::new)
            .ok_or_else(|| SessionError::Subscribe("no media SDK registered".into()))
    }

    fn unsubscribe(&mut self, stream_id: &str) {
        self.with_sdk(|sdk| sdk.unsubscribe(stream_id.to_string()));
    }

    fn set_publish_audio(&mut self, enabled: bool) {
        self.with_sdk(|sdk| sdk.set_publish_audio(enabled));
    }

    fn set_publish_video(&mut self, enabled: bool) {
        self.with_sdk(|sdk| sdk.set_publish_video(enabled));
    }

    fn set_camera_position(&mut self, position: CoreCameraPosition) {
        self.with_sdk(|sdk| sdk.set_camera_position(position.into()));
    }
}

// ── VidBridge ────────────────────────────────────────────────────────

pub struct VidBridge {
    channel: ChannelHandler,
    controller: ControllerHandle,
    emitter: StateEmitter,
    sdk: SdkSlot,
    events: EventSlot,
    host: Arc<SurfaceHost>,
    /// Taken only by `Drop`.
    rt: Option<tokio::runtime::Runtime>,
}

impl VidBridge {
    pub fn new(data_dir: String) -> Result<Self, BridgeError> {
        native_log("VIDBRIDGE FFI: VidBridge::new() called");
        let config = BridgeConfig::load(&Path::new(&data_dir).join(CONFIG_FILE));
        init_logging(config.log_filter.clone());

        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("vidbridge-rt")
            .enable_all()
            .build()
            .map_err(|e| BridgeError::Runtime { msg: e.to_string() })?;
        let executor = SerialExecutor::spawn("vidbridge-notify")
            .map_err(|e| BridgeError::Runtime { msg: e.to_string() })?;
        let emitter = StateEmitter::new(Arc::new(executor));

        let sdk: SdkSlot = Arc::default();
        let events: EventSlot = Arc::default();
        let backend = Self::backend(&config, &rt, sdk.clone(), events.clone());
        let host = SurfaceHost::global();

        let (controller, _task) = SessionController::spawn(
            backend,
            host.clone(),
            emitter.clone(),
            ControllerConfig::from(&config),
            rt.handle(),
        );
        let channel = ChannelHandler::new(config.channel_name.clone(), controller.clone());

        tracing::info!(channel = %config.channel_name, "VidBridge ready");
        Ok(Self {
            channel,
            controller,
            emitter,
            sdk,
            events,
            host,
            rt: Some(rt),
        })
    }

    fn backend(
        config: &BridgeConfig,
        rt: &tokio::runtime::Runtime,
        sdk: SdkSlot,
        events: EventSlot,
    ) -> Box<dyn MediaBackend> {
        #[cfg(feature = "livekit")]
        if let Some(url) = config.livekit_url.as_deref() {
            tracing::info!(url, "using LiveKit media backend");
            return Box::new(vidbridge_core::LiveKitBackend::new(url, rt.handle().clone()));
        }
        let _ = (config, rt);
        Box::new(PlatformBackend { sdk, events })
    }

    pub fn channel_name(&self) -> String {
        self.channel.name().to_string()
    }

    /// Dispatch a decoded call. `args_json` is the JSON-encoded argument map.
    pub fn handle_method_call(&self, method: String, args_json: Option<String>) -> MethodResponse {
        let args = match args_json.as_deref() {
            None => Value::Null,
            Some(raw) => match serde_json::from_str(raw) {
                Ok(args) => args,
                Err(e) => {
                    tracing::warn!(%method, "unparsable arguments: {e}");
                    return MethodResult::from_error(&SessionError::MalformedCall(e.to_string())).into();
                }
            },
        };
        self.channel.handle_call(&MethodCall::new(method, args)).into()
    }

    /// Dispatch a call encoded with the JSON method codec and return the
    /// encoded reply.
    pub fn handle_message(&self, message: Vec<u8>) -> Vec<u8> {
        self.channel.handle_message(&message)
    }

    pub fn add_listener(&self, listener: Box<dyn StateListener>) {
        self.emitter.add_listener(Arc::new(BridgeListener { ffi_listener: listener }));
    }

    pub fn set_media_sdk(&self, sdk: Box<dyn MediaSdk>) {
        tracing::info!("media SDK registered");
        *lock(&self.sdk) = Some(sdk);
    }

    /// Hand the platform view to the host. Surfaces attached so far are
    /// replayed into it.
    pub fn realize_host_view(&self, view: Box<dyn HostView>) {
        self.host.realize(Arc::new(BridgeHostView { view }));
    }

    pub fn release_host_view(&self) {
        self.host.release();
    }

    pub fn state(&self) -> Result<SdkState, BridgeError> {
        let snapshot = self.block_on(self.controller.snapshot())??;
        Ok(snapshot.state.into())
    }

    pub fn teardown(&self) -> Result<(), BridgeError> {
        self.block_on(self.controller.teardown())??;
        Ok(())
    }

    fn block_on<F: std::future::Future>(&self, future: F) -> Result<F::Output, BridgeError> {
        let rt = self.rt.as_ref().ok_or_else(|| BridgeError::Runtime {
            msg: "runtime shut down".into(),
        })?;
        Ok(rt.block_on(future))
    }

    // ── Media SDK callbacks ──────────────────────────────────────────

    fn forward(&self, event: MediaEvent) {
        match lock(&self.events).as_ref() {
            Some(sender) => {
                if !sender.send(event) {
                    tracing::warn!("controller stopped, media callback dropped");
                }
            }
            None => tracing::warn!(?event, "media callback without a session"),
        }
    }

    pub fn on_session_connected(&self, session_id: String) {
        self.forward(MediaEvent::SessionConnected { session_id });
    }

    pub fn on_session_disconnected(&self) {
        self.forward(MediaEvent::SessionDisconnected);
    }

    pub fn on_stream_received(&self, stream_id: String) {
        self.forward(MediaEvent::StreamReceived { stream_id });
    }

    pub fn on_stream_dropped(&self, stream_id: String) {
        self.forward(MediaEvent::StreamDropped { stream_id });
    }

    pub fn on_session_error(&self, message: String) {
        self.forward(MediaEvent::SessionError { message });
    }

    pub fn on_publisher_stream_created(&self, stream_id: String) {
        self.forward(MediaEvent::PublisherStreamCreated { stream_id });
    }

    pub fn on_publisher_stream_destroyed(&self, stream_id: String) {
        self.forward(MediaEvent::PublisherStreamDestroyed { stream_id });
    }

    pub fn on_publisher_error(&self, message: String) {
        self.forward(MediaEvent::PublisherError { message });
    }

    pub fn on_subscriber_connected(&self, stream_id: String) {
        self.forward(MediaEvent::SubscriberConnected { stream_id });
    }

    pub fn on_subscriber_disconnected(&self, stream_id: String) {
        self.forward(MediaEvent::SubscriberDisconnected { stream_id });
    }

    pub fn on_subscriber_error(&self, message: String) {
        self.forward(MediaEvent::SubscriberError { message });
    }
}

fn teardown_and_shutdown(rt: tokio::runtime::Runtime, controller: &ControllerHandle) {
    if let Err(e) = rt.block_on(controller.teardown()) {
        tracing::debug!("teardown on drop: {e}");
    }
}

impl Drop for VidBridge {
    fn drop(&mut self) {
        let Some(rt) = self.rt.take() else { return };
        if tokio::runtime::Handle::try_current().is_err() {
            teardown_and_shutdown(rt, &self.controller);
            return;
        }

        // A runtime can neither block nor be dropped inside an async
        // context; finish on a plain thread instead.
        let slot = Arc::new(StdMutex::new(Some(rt)));
        let worker_slot = slot.clone();
        let controller = self.controller.clone();
        let spawned = std::thread::Builder::new()
            .name("vidbridge-teardown".into())
            .spawn(move || {
                if let Some(rt) = lock(&worker_slot).take() {
                    teardown_and_shutdown(rt, &controller);
                }
            });
        if let Err(e) = spawned {
            tracing::warn!("teardown thread failed to start: {e}");
            self.controller.request_teardown();
            if let Some(rt) = lock(&slot).take() {
                rt.shutdown_background();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    const RECV_TIMEOUT: Duration = Duration::from_secs(5);

    struct ChannelListener {
        tx: StdMutex<mpsc::Sender<StateUpdate>>,
    }

    impl StateListener for ChannelListener {
        fn on_update_state(&self, update: StateUpdate) {
            let _ = lock(&self.tx).send(update);
        }
    }

    #[derive(Default)]
    struct FakeSdk {
        calls: Arc<StdMutex<Vec<String>>>,
    }

    impl FakeSdk {
        fn record(&self, call: impl Into<String>) {
            lock(&self.calls).push(call.into());
        }
    }

    impl MediaSdk for FakeSdk {
        fn connect(&self, _api_key: String, session_id: String, _token: String) {
            self.record(format!("connect:{session_id}"));
        }
        fn disconnect(&self) {
            self.record("disconnect");
        }
        fn create_publisher(&self, settings: PublisherSettings) -> u64 {
            self.record(format!("create_publisher:{}", settings.name));
            7
        }
        fn publish(&self) {
            self.record("publish");
        }
        fn unpublish(&self) {
            self.record("unpublish");
        }
        fn subscribe(&self, stream_id: String, _style: VideoStyle) -> u64 {
            self.record(format!("subscribe:{stream_id}"));
            8
        }
        fn unsubscribe(&self, stream_id: String) {
            self.record(format!("unsubscribe:{stream_id}"));
        }
        fn set_publish_audio(&self, enabled: bool) {
            self.record(format!("audio:{enabled}"));
        }
        fn set_publish_video(&self, enabled: bool) {
            self.record(format!("video:{enabled}"));
        }
        fn set_camera_position(&self, position: CameraPosition) {
            self.record(format!("camera:{position:?}"));
        }
    }

    fn bridge() -> (VidBridge, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let bridge = VidBridge::new(dir.path().to_string_lossy().into_owned()).unwrap();
        (bridge, dir)
    }

    fn listen(bridge: &VidBridge) -> mpsc::Receiver<StateUpdate> {
        let (tx, rx) = mpsc::channel();
        bridge.add_listener(Box::new(ChannelListener { tx: StdMutex::new(tx) }));
        rx
    }

    #[test]
    fn default_channel_name() {
        let (bridge, _dir) = bridge();
        assert_eq!(bridge.channel_name(), "com.vonage");
    }

    #[test]
    fn channel_name_comes_from_config() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), r#"{"channel_name":"com.example.video"}"#).unwrap();
        let bridge = VidBridge::new(dir.path().to_string_lossy().into_owned()).unwrap();
        assert_eq!(bridge.channel_name(), "com.example.video");
    }

    #[test]
    fn missing_token_is_rejected() {
        let (bridge, _dir) = bridge();
        let response = bridge.handle_method_call(
            "initSession".into(),
            Some(r#"{"apiKey":"k","sessionId":"s"}"#.into()),
        );
        match response {
            MethodResponse::Error { code, .. } => assert_eq!(code, "INVALID_ARGUMENTS"),
            other => panic!("expected error, got {other:?}"),
        }
        assert_eq!(bridge.state().unwrap(), SdkState::LoggedOut);
    }

    #[test]
    fn unparsable_args_are_malformed() {
        let (bridge, _dir) = bridge();
        let response = bridge.handle_method_call("toggleAudio".into(), Some("{".into()));
        assert!(matches!(response, MethodResponse::Error { ref code, .. } if code == "MALFORMED_CALL"));
    }

    #[test]
    fn unknown_method_is_not_implemented() {
        let (bridge, _dir) = bridge();
        assert_eq!(
            bridge.handle_method_call("hangUp".into(), None),
            MethodResponse::NotImplemented
        );
        assert!(bridge.handle_message(br#"{"method":"hangUp"}"#.to_vec()).is_empty());
    }

    #[test]
    fn connect_without_sdk_reports_error() {
        let (bridge, _dir) = bridge();
        let updates = listen(&bridge);

        let response = bridge.handle_method_call(
            "initSession".into(),
            Some(r#"{"apiKey":"k","sessionId":"s","token":"t"}"#.into()),
        );
        assert_eq!(response, MethodResponse::Success { result: String::new() });

        assert_eq!(updates.recv_timeout(RECV_TIMEOUT).unwrap().state, SdkState::Wait);
        let failed = updates.recv_timeout(RECV_TIMEOUT).unwrap();
        assert_eq!(failed.label, "ERROR");
        assert_eq!(failed.cause, Some(ErrorCause::Connect));
    }

    #[test]
    fn session_lifecycle_through_callbacks() {
        let (bridge, _dir) = bridge();
        let updates = listen(&bridge);
        let sdk = FakeSdk::default();
        let calls = sdk.calls.clone();
        bridge.set_media_sdk(Box::new(sdk));

        bridge.handle_method_call(
            "initSession".into(),
            Some(r#"{"apiKey":"k","sessionId":"s1","token":"t"}"#.into()),
        );
        assert_eq!(updates.recv_timeout(RECV_TIMEOUT).unwrap().state, SdkState::Wait);
        assert_eq!(bridge.state().unwrap(), SdkState::Wait);

        bridge.on_session_connected("s1".into());
        let connected = updates.recv_timeout(RECV_TIMEOUT).unwrap();
        assert_eq!(connected.state, SdkState::LoggedIn);
        assert_eq!(connected.label, "LOGGED_IN");

        bridge.on_stream_received("remote-1".into());
        bridge.handle_message(br#"{"method":"toggleAudio","args":{"publishAudio":false}}"#.to_vec());
        bridge.teardown().unwrap();
        assert_eq!(updates.recv_timeout(RECV_TIMEOUT).unwrap().state, SdkState::LoggedOut);

        assert_eq!(
            *lock(&calls),
            vec![
                "connect:s1",
                "create_publisher:vidbridge",
                "publish",
                "subscribe:remote-1",
                "audio:false",
                "unsubscribe:remote-1",
                "unpublish",
                "disconnect",
            ]
        );
    }

    #[test]
    fn drop_inside_async_context_still_tears_down() {
        let (bridge, _dir) = bridge();
        let updates = listen(&bridge);
        let sdk = FakeSdk::default();
        let calls = sdk.calls.clone();
        bridge.set_media_sdk(Box::new(sdk));

        bridge.handle_method_call(
            "initSession".into(),
            Some(r#"{"apiKey":"k","sessionId":"s2","token":"t"}"#.into()),
        );
        assert_eq!(updates.recv_timeout(RECV_TIMEOUT).unwrap().state, SdkState::Wait);
        bridge.state().unwrap();

        let outer = tokio::runtime::Builder::new_current_thread().build().unwrap();
        outer.block_on(async move { drop(bridge) });

        assert_eq!(updates.recv_timeout(RECV_TIMEOUT).unwrap().state, SdkState::LoggedOut);
        assert!(lock(&calls).contains(&"disconnect".to_string()));
    }

    #[test]
    fn callbacks_without_session_are_ignored() {
        let (bridge, _dir) = bridge();
        let updates = listen(&bridge);
        bridge.on_session_connected("stray".into());
        assert_eq!(bridge.state().unwrap(), SdkState::LoggedOut);
        assert!(updates.recv_timeout(Duration::from_millis(100)).is_err());
    }

    #[test]
    fn layout_lists_both_regions() {
        let frames = split_layout(200.0, 100.0);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].region, SurfaceRegion::Subscriber);
        assert_eq!(frames[0].width, 100.0);
        assert_eq!(frames[1].region, SurfaceRegion::Publisher);
        assert_eq!(frames[1].x, 100.0);
    }

    #[test]
    fn session_errors_map_to_bridge_errors() {
        assert!(matches!(
            BridgeError::from(SessionError::ControllerClosed),
            BridgeError::ControllerClosed { .. }
        ));
        assert!(matches!(
            BridgeError::from(SessionError::Publish("x".into())),
            BridgeError::Session { .. }
        ));
    }
}
