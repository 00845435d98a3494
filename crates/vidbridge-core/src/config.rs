use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::media::{CameraPosition, PublisherSettings, VideoStyle};

pub const DEFAULT_CHANNEL_NAME: &str = "com.vonage";
pub const DEFAULT_LOG_FILTER: &str = "vidbridge_core=debug,vidbridge_ffi=debug,vidbridge_video=info";

/// Bridge configuration, read from `bridge.json` in the app data dir.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct BridgeConfig {
    #[serde(default = "default_channel_name")]
    pub channel_name: String,
    /// Seconds to stay in `WAIT` before giving up; `null` waits forever.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: Option<u64>,
    #[serde(default = "default_publisher_name")]
    pub publisher_name: String,
    #[serde(default = "default_true")]
    pub publish_audio_on_start: bool,
    #[serde(default = "default_true")]
    pub publish_video_on_start: bool,
    #[serde(default)]
    pub camera: CameraPosition,
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    /// Signaling server for the LiveKit backend.
    #[serde(default)]
    pub livekit_url: Option<String>,
}

fn default_channel_name() -> String {
    DEFAULT_CHANNEL_NAME.to_string()
}

fn default_connect_timeout_secs() -> Option<u64> {
    Some(30)
}

fn default_publisher_name() -> String {
    "vidbridge".to_string()
}

fn default_true() -> bool {
    true
}

fn default_log_filter() -> String {
    DEFAULT_LOG_FILTER.to_string()
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            channel_name: default_channel_name(),
            connect_timeout_secs: default_connect_timeout_secs(),
            publisher_name: default_publisher_name(),
            publish_audio_on_start: true,
            publish_video_on_start: true,
            camera: CameraPosition::Front,
            log_filter: default_log_filter(),
            livekit_url: None,
        }
    }
}

impl BridgeConfig {
    /// Load from `path`, falling back to defaults when the file is missing
    /// or unreadable.
    pub fn load(path: &Path) -> Self {
        let mut config = match std::fs::read_to_string(path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("ignoring corrupt config {}: {e}", path.display());
                Self::default()
            }),
            Err(_) => Self::default(),
        };
        config.livekit_url = config.livekit_url.take().filter(|raw| match url::Url::parse(raw) {
            Ok(parsed) if matches!(parsed.scheme(), "ws" | "wss" | "http" | "https") => true,
            _ => {
                tracing::warn!("ignoring invalid livekit_url: {raw}");
                false
            }
        });
        config
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_secs.map(Duration::from_secs)
    }

    /// Settings for the publisher created on session connect.
    pub fn publisher_settings(&self) -> PublisherSettings {
        PublisherSettings {
            name: self.publisher_name.clone(),
            publish_audio: self.publish_audio_on_start,
            publish_video: self.publish_video_on_start,
            camera: self.camera,
            style: VideoStyle::ScaleToFill,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn temp_dir() -> tempfile::TempDir {
        tempfile::tempdir().unwrap()
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = temp_dir();
        let config = BridgeConfig::load(&dir.path().join("bridge.json"));
        assert_eq!(config, BridgeConfig::default());
        assert_eq!(config.channel_name, "com.vonage");
        assert_eq!(config.connect_timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_corrupt_file_falls_back_to_defaults() {
        let dir = temp_dir();
        let path = dir.path().join("bridge.json");
        fs::write(&path, "{{ nope").unwrap();
        assert_eq!(BridgeConfig::load(&path), BridgeConfig::default());
    }

    #[test]
    fn test_partial_json_uses_serde_defaults() {
        let dir = temp_dir();
        let path = dir.path().join("bridge.json");
        fs::write(&path, r#"{"camera":"back","connect_timeout_secs":null}"#).unwrap();

        let config = BridgeConfig::load(&path);
        assert_eq!(config.camera, CameraPosition::Back);
        assert_eq!(config.connect_timeout(), None);
        assert!(config.publish_audio_on_start);
        assert_eq!(config.channel_name, DEFAULT_CHANNEL_NAME);
    }

    #[test]
    fn test_livekit_url_is_validated() {
        let dir = temp_dir();
        let path = dir.path().join("bridge.json");

        fs::write(&path, r#"{"livekit_url":"wss://rtc.example.org"}"#).unwrap();
        assert_eq!(
            BridgeConfig::load(&path).livekit_url.as_deref(),
            Some("wss://rtc.example.org")
        );

        fs::write(&path, r#"{"livekit_url":"not a url"}"#).unwrap();
        assert_eq!(BridgeConfig::load(&path).livekit_url, None);
    }

    #[test]
    fn test_publisher_settings_scale_to_fill() {
        let settings = BridgeConfig::default().publisher_settings();
        assert_eq!(settings.style, VideoStyle::ScaleToFill);
        assert!(settings.publish_audio && settings.publish_video);
        assert_eq!(settings.camera, CameraPosition::Front);
    }
}
