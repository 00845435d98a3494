use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use livekit::options::TrackPublishOptions;
use livekit::prelude::*;
use livekit::track::{RemoteTrack, TrackSource as LkTrackSource};
use livekit::webrtc::audio_source::native::NativeAudioSource;
use livekit::webrtc::prelude::*;
use livekit::webrtc::video_source::native::NativeVideoSource;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use vidbridge_video::VideoSurface;

use crate::errors::SessionError;
use crate::media::{
    CameraPosition, MediaBackend, MediaEvent, MediaEventSender, PublisherSettings,
    SessionCredentials, VideoStyle,
};

/// Audio source options.
const AUDIO_SAMPLE_RATE: u32 = 48_000;
const AUDIO_CHANNELS: u32 = 1;
const AUDIO_QUEUE_SIZE_MS: u32 = 100;

/// Default capture resolution.
const VIDEO_WIDTH: u32 = 1280;
const VIDEO_HEIGHT: u32 = 720;

type RoomSlot = Arc<Mutex<Option<Arc<Room>>>>;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Media backend on top of a LiveKit room.
///
/// The access token already names the room, so `sessionId` is only echoed
/// back in the connected callback and `apiKey` is unused. Remote video tracks are the "streams".
/// Platform capture code feeds frames into the sources exposed here and
/// reads [`camera_position`](Self::camera_position) to pick the device.
pub struct LiveKitBackend {
    url: String,
    runtime: Handle,
    room: RoomSlot,
    camera: Arc<Mutex<CameraPosition>>,
    audio_source: Option<NativeAudioSource>,
    video_source: Option<NativeVideoSource>,
    settings: Option<PublisherSettings>,
    events: Option<MediaEventSender>,
    event_task: Option<JoinHandle<()>>,
    next_surface: u64,
}

impl LiveKitBackend {
    pub fn new(url: impl Into<String>, runtime: Handle) -> Self {
        Self {
            url: url.into(),
            runtime,
            room: Arc::new(Mutex::new(None)),
            camera: Arc::new(Mutex::new(CameraPosition::Front)),
            audio_source: None,
            video_source: None,
            settings: None,
            events: None,
            event_task: None,
            next_surface: 0,
        }
    }

    pub fn camera_position(&self) -> CameraPosition {
        *lock(&self.camera)
    }

    /// Source for feeding PCM frames from native capture.
    pub fn audio_source(&self) -> Option<NativeAudioSource> {
        self.audio_source.clone()
    }

    /// Source for feeding captured video frames.
    pub fn video_source(&self) -> Option<NativeVideoSource> {
        self.video_source.clone()
    }

    fn mint_surface(&mut self) -> VideoSurface {
        self.next_surface += 1;
        VideoSurface::new(self.next_surface)
    }

    fn set_muted(&self, source: LkTrackSource, muted: bool) {
        let Some(room) = lock(&self.room).clone() else {
            tracing::debug!("not connected, mute change ignored");
            return;
        };
        let local = room.local_participant();
        for (_, pub_) in local.track_publications() {
            if pub_.source() == source {
                if muted {
                    pub_.mute();
                } else {
                    pub_.unmute();
                }
                break;
            }
        }
    }

    async fn event_loop(
        url: String,
        token: String,
        session_id: String,
        room_slot: RoomSlot,
        events: MediaEventSender,
    ) {
        let mut options = RoomOptions::default();
        options.auto_subscribe = true;

        let (room, mut room_events) = match Room::connect(&url, &token, options).await {
            Ok(connected) => connected,
            Err(e) => {
                let _ = events.send(MediaEvent::SessionError { message: e.to_string() });
                return;
            }
        };
        *lock(&room_slot) = Some(Arc::new(room));
        let _ = events.send(MediaEvent::SessionConnected { session_id });

        while let Some(event) = room_events.recv().await {
            match event {
                RoomEvent::TrackSubscribed { track, .. } => {
                    if let RemoteTrack::Video(video) = track {
                        let _ = events.send(MediaEvent::StreamReceived {
                            stream_id: video.sid().to_string(),
                        });
                    }
                }

                RoomEvent::TrackUnsubscribed { track, .. } => {
                    if let RemoteTrack::Video(video) = track {
                        let _ = events.send(MediaEvent::StreamDropped {
                            stream_id: video.sid().to_string(),
                        });
                    }
                }

                RoomEvent::LocalTrackPublished { publication, .. } => {
                    let _ = events.send(MediaEvent::PublisherStreamCreated {
                        stream_id: publication.sid().to_string(),
                    });
                }

                RoomEvent::LocalTrackUnpublished { publication, .. } => {
                    let _ = events.send(MediaEvent::PublisherStreamDestroyed {
                        stream_id: publication.sid().to_string(),
                    });
                }

                RoomEvent::Disconnected { reason } => {
                    tracing::info!("room disconnected: {reason:?}");
                    *lock(&room_slot) = None;
                    let _ = events.send(MediaEvent::SessionDisconnected);
                    break;
                }

                _ => {
                    tracing::debug!("unhandled room event: {event:?}");
                }
            }
        }

        tracing::info!("room event loop ended");
    }
}

impl MediaBackend for LiveKitBackend {
    fn connect(
        &mut self,
        credentials: &SessionCredentials,
        events: MediaEventSender,
    ) -> Result<(), SessionError> {
        if credentials.token.is_empty() {
            return Err(SessionError::Connect("empty access token".into()));
        }

        self.events = Some(events.clone());
        let task = self.runtime.spawn(Self::event_loop(
            self.url.clone(),
            credentials.token.clone(),
            credentials.session_id.clone(),
            self.room.clone(),
            events,
        ));
        if let Some(previous) = self.event_task.replace(task) {
            previous.abort();
        }
        Ok(())
    }

    fn disconnect(&mut self) {
        if let Some(room) = lock(&self.room).take() {
            self.runtime.spawn(async move {
                if let Err(e) = room.close().await {
                    tracing::warn!("error closing room: {e}");
                }
            });
        }
        if let Some(task) = self.event_task.take() {
            task.abort();
        }
        self.events = None;
    }

    fn create_publisher(&mut self, settings: &PublisherSettings) -> Result<VideoSurface, SessionError> {
        let audio = NativeAudioSource::new(
            AudioSourceOptions {
                echo_cancellation: true,
                noise_suppression: true,
                auto_gain_control: true,
            },
            AUDIO_SAMPLE_RATE,
            AUDIO_CHANNELS,
            AUDIO_QUEUE_SIZE_MS,
        );
        let video = NativeVideoSource::new(
            VideoResolution {
                width: VIDEO_WIDTH,
                height: VIDEO_HEIGHT,
            },
            false,
        );

        self.audio_source = Some(audio);
        self.video_source = Some(video);
        self.settings = Some(settings.clone());
        *lock(&self.camera) = settings.camera;

        tracing::info!(name = %settings.name, "publisher sources created");
        Ok(self.mint_surface())
    }

    fn publish(&mut self) -> Result<(), SessionError> {
        let room = lock(&self.room)
            .clone()
            .ok_or_else(|| SessionError::Publish("not connected".into()))?;
        let (Some(audio), Some(video), Some(settings)) = (
            self.audio_source.clone(),
            self.video_source.clone(),
            self.settings.clone(),
        ) else {
            return Err(SessionError::Publish("publisher not created".into()));
        };
        let events = self.events.clone();

        self.runtime.spawn(async move {
            let local = room.local_participant();

            let audio_track = LocalAudioTrack::create_audio_track(
                "microphone",
                RtcAudioSource::Native(audio),
            );
            let video_track = LocalVideoTrack::create_video_track(
                "camera",
                RtcVideoSource::Native(video),
            );

            let published = async {
                local
                    .publish_track(
                        LocalTrack::Audio(audio_track),
                        TrackPublishOptions {
                            source: LkTrackSource::Microphone,
                            ..Default::default()
                        },
                    )
                    .await
                    .map_err(|e| format!("publish audio: {e}"))?;
                local
                    .publish_track(
                        LocalTrack::Video(video_track),
                        TrackPublishOptions {
                            source: LkTrackSource::Camera,
                            ..Default::default()
                        },
                    )
                    .await
                    .map_err(|e| format!("publish video: {e}"))?;
                Ok::<(), String>(())
            }
            .await;

            match published {
                Ok(()) => {
                    for (_, pub_) in local.track_publications() {
                        let enabled = match pub_.source() {
                            LkTrackSource::Microphone => settings.publish_audio,
                            LkTrackSource::Camera => settings.publish_video,
                            _ => true,
                        };
                        if !enabled {
                            pub_.mute();
                        }
                    }
                    tracing::info!("camera and microphone tracks published");
                }
                Err(message) => {
                    if let Some(events) = events {
                        let _ = events.send(MediaEvent::PublisherError { message });
                    }
                }
            }
        });
        Ok(())
    }

    fn unpublish(&mut self) {
        self.audio_source = None;
        self.video_source = None;
        self.settings = None;

        let Some(room) = lock(&self.room).clone() else {
            return;
        };
        self.runtime.spawn(async move {
            let local = room.local_participant();
            let sids: Vec<_> = local.track_publications().keys().cloned().collect();
            for sid in sids {
                if let Err(e) = local.unpublish_track(&sid).await {
                    tracing::warn!("unpublish {sid}: {e}");
                }
            }
        });
    }

    fn subscribe(&mut self, stream_id: &str, style: VideoStyle) -> Result<VideoSurface, SessionError> {
        // Tracks are auto-subscribed; the renderer picks up the track by sid.
        if lock(&self.room).is_none() {
            return Err(SessionError::Subscribe("not connected".into()));
        }
        tracing::info!(stream_id, ?style, "remote video track bound to surface");
        if let Some(events) = self.events.as_ref() {
            let _ = events.send(MediaEvent::SubscriberConnected {
                stream_id: stream_id.to_string(),
            });
        }
        Ok(self.mint_surface())
    }

    fn unsubscribe(&mut self, stream_id: &str) {
        let Some(room) = lock(&self.room).clone() else {
            return;
        };
        for participant in room.remote_participants().values() {
            for (sid, pub_) in participant.track_publications() {
                if sid.to_string() == stream_id {
                    pub_.set_subscribed(false);
                    return;
                }
            }
        }
    }

    fn set_publish_audio(&mut self, enabled: bool) {
        self.set_muted(LkTrackSource::Microphone, !enabled);
    }

    fn set_publish_video(&mut self, enabled: bool) {
        self.set_muted(LkTrackSource::Camera, !enabled);
    }

    fn set_camera_position(&mut self, position: CameraPosition) {
        *lock(&self.camera) = position;
    }
}
