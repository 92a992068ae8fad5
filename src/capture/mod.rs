//! Media capture pipelines
//!
//! Each pipeline exclusively owns one device/stream, produces a sequence
//! of timed chunks with monotonically increasing sequence numbers, and
//! reports its lifecycle through a state watch. Pipelines convert their
//! own failures into state transitions; they never panic or abort the
//! session across the pipeline boundary.

pub mod audio;
pub mod backend;
pub mod file;
pub mod screen;

pub use audio::AudioPipeline;
pub use backend::{
    CaptureBackend, DisplayDescriptor, DisplaySurface, MediaChunk, ScreenBackend, TrackInfo,
    TrackKind, TrackState,
};
pub use file::{FileAudioBackend, FileScreenBackend};
pub use screen::{ScreenError, ScreenPipeline, ScreenTiming, MIN_CHUNK_BYTES};

/// Lifecycle of a capture pipeline.
///
/// `Failed` is sticky for the screen pipeline: it never silently resumes
/// and requires an explicit restart that re-acquires a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Recording,
    Stopping,
    Stopped,
    Failed,
}
