//! Question fetch and synthesized-audio playback
//!
//! The playback controller owns the lifetime of the current question's
//! audio: a newly fetched question is decoded and played exactly once
//! automatically, replay is an idempotent manual restart, and the
//! previous clip is always stopped and released before a new one starts.

mod player;

pub use player::{
    decode_audio, DecodedAudio, NullSink, PlaybackSink, PlaybackState, QuestionPlayer, WavFileSink,
};
