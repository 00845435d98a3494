use std::fmt;
use std::str::FromStr;
use std::sync::mpsc;
use std::sync::{Arc, PoisonError, RwLock};

/// Coarse session state surfaced to the app shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SdkState {
    #[default]
    LoggedOut,
    LoggedIn,
    Wait,
    Error,
}

impl SdkState {
    /// Wire label carried by `updateState`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LoggedOut => "LOGGED_OUT",
            Self::LoggedIn => "LOGGED_IN",
            Self::Wait => "WAIT",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for SdkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SdkState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LOGGED_OUT" => Ok(Self::LoggedOut),
            "LOGGED_IN" => Ok(Self::LoggedIn),
            "WAIT" => Ok(Self::Wait),
            "ERROR" => Ok(Self::Error),
            other => Err(format!("unknown state label: {other}")),
        }
    }
}

/// Which backend path produced an `ERROR`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCause {
    Connect,
    Publish,
    Subscribe,
    Timeout,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateNotification {
    pub state: SdkState,
    pub cause: Option<ErrorCause>,
}

impl StateNotification {
    pub fn new(state: SdkState) -> Self {
        Self { state, cause: None }
    }

    pub fn error(cause: ErrorCause) -> Self {
        Self {
            state: SdkState::Error,
            cause: Some(cause),
        }
    }
}

/// Trait for receiving state notifications from the controller.
/// Always invoked on the emitter's [`UiExecutor`].
pub trait StateListener: Send + Sync {
    fn on_update_state(&self, notification: StateNotification);
}

// ---------------------------------------------------------------------------
// UI execution context
// ---------------------------------------------------------------------------

pub type UiJob = Box<dyn FnOnce() + Send + 'static>;

/// The host UI execution context. Jobs must run in submission order.
pub trait UiExecutor: Send + Sync {
    fn execute(&self, job: UiJob);
}

/// Runs jobs on the calling thread. For hosts that are already serialized.
pub struct InlineExecutor;

impl UiExecutor for InlineExecutor {
    fn execute(&self, job: UiJob) {
        job();
    }
}

/// FIFO executor backed by one named thread.
///
/// Listeners running here hop onto the platform main thread themselves
/// (`Handler(Looper.getMainLooper()).post`, `DispatchQueue.main.async`);
/// both preserve submission order.
pub struct SerialExecutor {
    tx: mpsc::Sender<UiJob>,
}

impl SerialExecutor {
    pub fn spawn(thread_name: &str) -> std::io::Result<Self> {
        let (tx, rx) = mpsc::channel::<UiJob>();
        std::thread::Builder::new()
            .name(thread_name.to_string())
            .spawn(move || {
                while let Ok(job) = rx.recv() {
                    job();
                }
                tracing::debug!("serial executor drained");
            })?;
        Ok(Self { tx })
    }
}

impl UiExecutor for SerialExecutor {
    fn execute(&self, job: UiJob) {
        if self.tx.send(job).is_err() {
            tracing::warn!("serial executor thread gone, notification dropped");
        }
    }
}

// ---------------------------------------------------------------------------
// Emitter
// ---------------------------------------------------------------------------

/// Dispatches notifications to registered listeners on the UI executor.
#[derive(Clone)]
pub struct StateEmitter {
    listeners: Arc<RwLock<Vec<Arc<dyn StateListener>>>>,
    executor: Arc<dyn UiExecutor>,
}

impl StateEmitter {
    pub fn new(executor: Arc<dyn UiExecutor>) -> Self {
        Self {
            listeners: Arc::new(RwLock::new(Vec::new())),
            executor,
        }
    }

    pub fn add_listener(&self, listener: Arc<dyn StateListener>) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    pub fn emit(&self, notification: StateNotification) {
        let listeners = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        tracing::info!(state = %notification.state, cause = ?notification.cause, "updateState");
        self.executor.execute(Box::new(move || {
            for listener in &listeners {
                listener.on_update_state(notification.clone());
            }
        }));
    }
}
