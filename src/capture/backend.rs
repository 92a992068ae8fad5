use anyhow::Result;
use tokio::sync::{mpsc, watch};

/// A bounded slice of recorded media handed to the uploader as one
/// transmission unit.
#[derive(Debug, Clone)]
pub struct MediaChunk {
    /// Encoded media bytes (container format is the backend's concern).
    pub data: Vec<u8>,
    /// Milliseconds since capture started.
    pub timestamp_ms: u64,
}

/// What kind of display surface a screen stream was acquired from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplaySurface {
    /// The entire screen. The only surface accepted outright.
    Monitor,
    /// A single application window.
    Window,
    /// A single browser tab.
    Browser,
    /// The platform could not report the surface kind. Accepted: when the
    /// capability cannot be determined we do not reject the share.
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Video,
    SystemAudio,
    Microphone,
}

/// One track inside an acquired stream. `id` is the device identity used
/// for de-duplication when mixing audio sources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackInfo {
    pub id: String,
    pub kind: TrackKind,
    pub label: String,
}

/// Description of an acquired display stream, reported by the backend
/// before chunks start flowing.
#[derive(Debug, Clone)]
pub struct DisplayDescriptor {
    pub surface: DisplaySurface,
    pub video_track: TrackInfo,
    /// Audio tracks exposed by the acquisition: any system audio the
    /// display stream carries plus a separately acquired microphone track.
    pub audio_tracks: Vec<TrackInfo>,
}

/// Liveness of the underlying video track. Flips to `Ended` when the user
/// revokes sharing through the platform chrome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackState {
    Live,
    Ended,
}

/// Capture backend seam.
///
/// A backend owns one device/stream and is responsible for releasing all
/// underlying tracks when stopped. Implementations:
/// - [`super::file::FileAudioBackend`] / [`super::file::FileScreenBackend`]
///   replay recorded media for local runs and tests
/// - device backends are platform-gated behind this same trait
#[async_trait::async_trait]
pub trait CaptureBackend: Send + Sync {
    /// Start producing chunks. Returns the receiving end of the chunk
    /// stream; the channel closes when capture finishes.
    async fn start(&mut self) -> Result<mpsc::Receiver<MediaChunk>>;

    /// Ask the backend to emit any buffered data promptly.
    async fn flush(&mut self) -> Result<()>;

    /// Stop capturing and release owned device resources.
    async fn stop(&mut self) -> Result<()>;

    fn is_capturing(&self) -> bool;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

/// Extension for screen-capture backends: exposes the stream description
/// needed for surface validation, and the video track's liveness.
#[async_trait::async_trait]
pub trait ScreenBackend: CaptureBackend {
    fn descriptor(&self) -> &DisplayDescriptor;

    /// Watch for the video track state. Observers must treat `Ended` as
    /// terminal for this acquisition.
    fn track_state(&self) -> watch::Receiver<TrackState>;
}
