//! Command/notification channel between the app shell and the controller.
//!
//! Messages use the JSON method codec: calls are `{"method", "args"}`
//! objects, replies are `[result]` or `[code, message, details]` envelopes,
//! and an empty reply means the method is not implemented.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::controller::ControllerHandle;
use crate::errors::SessionError;
use crate::events::StateNotification;
use crate::media::SessionCredentials;

/// Outbound method carrying the state label.
pub const UPDATE_STATE_METHOD: &str = "updateState";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodCall {
    pub method: String,
    #[serde(default)]
    pub args: Value,
}

impl MethodCall {
    pub fn new(method: impl Into<String>, args: Value) -> Self {
        Self {
            method: method.into(),
            args,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    InitSession(SessionCredentials),
    SwapCamera,
    ToggleAudio { publish_audio: bool },
    ToggleVideo { publish_video: bool },
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InitSessionArgs {
    api_key: String,
    session_id: String,
    token: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ToggleAudioArgs {
    publish_audio: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ToggleVideoArgs {
    publish_video: bool,
}

fn parse_args<T: DeserializeOwned>(call: &MethodCall) -> Result<T, SessionError> {
    serde_json::from_value(call.args.clone()).map_err(|e| SessionError::CommandArgument {
        method: call.method.clone(),
        reason: e.to_string(),
    })
}

impl Command {
    /// Decode a method call. `Ok(None)` means the method is unknown.
    pub fn from_call(call: &MethodCall) -> Result<Option<Self>, SessionError> {
        let command = match call.method.as_str() {
            "initSession" => {
                let args: InitSessionArgs = parse_args(call)?;
                Self::InitSession(SessionCredentials {
                    api_key: args.api_key,
                    session_id: args.session_id,
                    token: args.token,
                })
            }
            "swapCamera" => Self::SwapCamera,
            "toggleAudio" => {
                let args: ToggleAudioArgs = parse_args(call)?;
                Self::ToggleAudio {
                    publish_audio: args.publish_audio,
                }
            }
            "toggleVideo" => {
                let args: ToggleVideoArgs = parse_args(call)?;
                Self::ToggleVideo {
                    publish_video: args.publish_video,
                }
            }
            _ => return Ok(None),
        };
        Ok(Some(command))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MethodResult {
    Success(Value),
    Error {
        code: String,
        message: String,
        details: Value,
    },
    NotImplemented,
}

impl MethodResult {
    /// Empty acknowledgement; the real outcome arrives as a notification.
    pub fn ack() -> Self {
        Self::Success(Value::String(String::new()))
    }

    pub fn from_error(error: &SessionError) -> Self {
        Self::Error {
            code: error.code().to_string(),
            message: error.to_string(),
            details: Value::Null,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::Success(result) => json!([result]).to_string().into_bytes(),
            Self::Error { code, message, details } => {
                json!([code, message, details]).to_string().into_bytes()
            }
            Self::NotImplemented => Vec::new(),
        }
    }
}

pub fn decode_method_call(message: &[u8]) -> Result<MethodCall, SessionError> {
    serde_json::from_slice(message).map_err(|e| SessionError::MalformedCall(e.to_string()))
}

/// Encode an outbound `updateState` call. The payload is the bare label.
pub fn encode_notification(notification: &StateNotification) -> Vec<u8> {
    json!({
        "method": UPDATE_STATE_METHOD,
        "args": notification.state.as_str(),
    })
    .to_string()
    .into_bytes()
}

/// Inbound side of the named channel.
#[derive(Clone)]
pub struct ChannelHandler {
    name: String,
    controller: ControllerHandle,
}

impl ChannelHandler {
    pub fn new(name: impl Into<String>, controller: ControllerHandle) -> Self {
        Self {
            name: name.into(),
            controller,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Validate and dispatch one call. Argument errors are reported here and
    /// never reach the controller.
    pub fn handle_call(&self, call: &MethodCall) -> MethodResult {
        match Command::from_call(call) {
            Ok(Some(command)) => {
                tracing::debug!(channel = %self.name, method = %call.method, "dispatching");
                match self.controller.submit(command) {
                    Ok(()) => MethodResult::ack(),
                    Err(e) => MethodResult::from_error(&e),
                }
            }
            Ok(None) => {
                tracing::warn!(channel = %self.name, method = %call.method, "method not implemented");
                MethodResult::NotImplemented
            }
            Err(e) => {
                tracing::warn!(channel = %self.name, "{e}");
                MethodResult::from_error(&e)
            }
        }
    }

    /// Handle an encoded call and return the encoded reply.
    pub fn handle_message(&self, message: &[u8]) -> Vec<u8> {
        match decode_method_call(message) {
            Ok(call) => self.handle_call(&call).encode(),
            Err(e) => {
                tracing::warn!(channel = %self.name, "{e}");
                MethodResult::from_error(&e).encode()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::ControllerMessage;
    use crate::events::{ErrorCause, SdkState};
    use tokio::sync::mpsc;

    fn handler() -> (ChannelHandler, mpsc::UnboundedReceiver<ControllerMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ChannelHandler::new("com.vonage", ControllerHandle::new(tx)), rx)
    }

    fn queued_command(rx: &mut mpsc::UnboundedReceiver<ControllerMessage>) -> Option<Command> {
        match rx.try_recv() {
            Ok(ControllerMessage::Command(command)) => Some(command),
            _ => None,
        }
    }

    #[test]
    fn init_session_is_acknowledged_and_queued() {
        let (handler, mut rx) = handler();
        let call = MethodCall::new(
            "initSession",
            json!({"apiKey": "k1", "sessionId": "s1", "token": "t1"}),
        );

        assert_eq!(handler.handle_call(&call), MethodResult::ack());
        assert_eq!(
            queued_command(&mut rx),
            Some(Command::InitSession(SessionCredentials {
                api_key: "k1".into(),
                session_id: "s1".into(),
                token: "t1".into(),
            }))
        );
    }

    #[test]
    fn init_session_missing_token_fails_without_queueing() {
        let (handler, mut rx) = handler();
        let call = MethodCall::new("initSession", json!({"apiKey": "k1", "sessionId": "s1"}));

        match handler.handle_call(&call) {
            MethodResult::Error { code, message, .. } => {
                assert_eq!(code, "INVALID_ARGUMENTS");
                assert!(message.contains("token"), "{message}");
            }
            other => panic!("expected error, got {other:?}"),
        }
        assert!(queued_command(&mut rx).is_none());
    }

    #[test]
    fn argument_keys_are_case_sensitive() {
        let call = MethodCall::new("toggleAudio", json!({"PublishAudio": true}));
        assert!(matches!(
            Command::from_call(&call),
            Err(SessionError::CommandArgument { .. })
        ));
    }

    #[test]
    fn mistyped_argument_is_rejected() {
        let call = MethodCall::new("toggleVideo", json!({"publishVideo": "yes"}));
        assert!(Command::from_call(&call).is_err());
    }

    #[test]
    fn swap_camera_needs_no_args() {
        let call = MethodCall::new("swapCamera", Value::Null);
        assert_eq!(Command::from_call(&call), Ok(Some(Command::SwapCamera)));
    }

    #[test]
    fn unknown_method_is_not_implemented() {
        let (handler, mut rx) = handler();
        let reply = handler.handle_message(br#"{"method":"hangUp","args":null}"#);
        assert!(reply.is_empty());
        assert!(queued_command(&mut rx).is_none());
    }

    #[test]
    fn toggle_audio_over_the_wire() {
        let (handler, mut rx) = handler();
        let reply = handler.handle_message(br#"{"method":"toggleAudio","args":{"publishAudio":false}}"#);

        assert_eq!(reply, br#"[""]"#.to_vec());
        assert_eq!(
            queued_command(&mut rx),
            Some(Command::ToggleAudio { publish_audio: false })
        );
    }

    #[test]
    fn malformed_message_yields_error_envelope() {
        let (handler, _rx) = handler();
        let reply: Value = serde_json::from_slice(&handler.handle_message(b"not json")).unwrap();
        assert_eq!(reply[0], "MALFORMED_CALL");
        assert_eq!(reply[2], Value::Null);
    }

    #[test]
    fn closed_controller_is_reported() {
        let (handler, rx) = handler();
        drop(rx);
        let result = handler.handle_call(&MethodCall::new("swapCamera", Value::Null));
        assert_eq!(result, MethodResult::from_error(&SessionError::ControllerClosed));
    }

    #[test]
    fn notification_carries_bare_label() {
        let encoded = encode_notification(&StateNotification::error(ErrorCause::Timeout));
        let value: Value = serde_json::from_slice(&encoded).unwrap();
        assert_eq!(value, json!({"method": "updateState", "args": "ERROR"}));

        let encoded = encode_notification(&StateNotification::new(SdkState::LoggedIn));
        let value: Value = serde_json::from_slice(&encoded).unwrap();
        assert_eq!(value["args"], "LOGGED_IN");
    }
}
