// Integration tests for question audio playback: base64 decode, one-shot
// auto-play, replay semantics, and error handling for bad payloads.

use std::time::Duration;

use anyhow::Result;
use base64::Engine;
use interview_client::question::{
    DecodedAudio, PlaybackSink, PlaybackState, QuestionPlayer, WavFileSink,
};
use tempfile::TempDir;

fn wav_payload_b64(samples: &[i16]) -> String {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 16_000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
    }
    base64::engine::general_purpose::STANDARD.encode(cursor.into_inner())
}

async fn wait_for_state(player: &QuestionPlayer, state: PlaybackState) {
    for _ in 0..100 {
        if player.state() == state {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("expected {:?}, still {:?}", state, player.state());
}

#[tokio::test]
async fn test_question_audio_plays_once_and_lands_on_disk() -> Result<()> {
    let dir = TempDir::new()?;
    let player = QuestionPlayer::new(Box::new(WavFileSink::new(dir.path())?));

    let samples: Vec<i16> = (0..1600).map(|i| (i % 256) as i16).collect();
    player.load_and_play(&wav_payload_b64(&samples)).await?;
    wait_for_state(&player, PlaybackState::Idle).await;

    let clip = dir.path().join("question-000.wav");
    assert!(clip.exists(), "played clip should be written out");

    let mut reader = hound::WavReader::open(&clip)?;
    let written: Vec<i16> = reader.samples::<i16>().collect::<std::result::Result<_, _>>()?;
    assert_eq!(written, samples, "playback must reproduce the decoded PCM");
    Ok(())
}

#[tokio::test]
async fn test_replay_restarts_the_current_clip() -> Result<()> {
    let dir = TempDir::new()?;
    let player = QuestionPlayer::new(Box::new(WavFileSink::new(dir.path())?));

    let samples: Vec<i16> = vec![100; 800];
    player.load_and_play(&wav_payload_b64(&samples)).await?;
    wait_for_state(&player, PlaybackState::Idle).await;

    player.replay().await;
    wait_for_state(&player, PlaybackState::Idle).await;

    assert!(dir.path().join("question-000.wav").exists());
    assert!(
        dir.path().join("question-001.wav").exists(),
        "replay should play the same clip again"
    );
    Ok(())
}

#[tokio::test]
async fn test_replay_with_nothing_loaded_is_a_no_op() {
    let dir = TempDir::new().unwrap();
    let player = QuestionPlayer::new(Box::new(WavFileSink::new(dir.path()).unwrap()));

    player.replay().await;
    assert_eq!(player.state(), PlaybackState::NotLoaded);
}

#[tokio::test]
async fn test_undecodable_payload_marks_the_player_errored() {
    let dir = TempDir::new().unwrap();
    let player = QuestionPlayer::new(Box::new(WavFileSink::new(dir.path()).unwrap()));

    let garbage = base64::engine::general_purpose::STANDARD.encode(b"not audio at all");
    assert!(player.load_and_play(&garbage).await.is_err());
    assert_eq!(player.state(), PlaybackState::Errored);
}

/// Sink that stalls in synchronous I/O for the whole clip.
struct SlowSink {
    hold: Duration,
}

impl PlaybackSink for SlowSink {
    fn play(&mut self, _audio: &DecodedAudio) -> Result<()> {
        std::thread::sleep(self.hold);
        Ok(())
    }
}

#[tokio::test]
async fn test_slow_sink_does_not_stall_the_runtime() -> Result<()> {
    let player = QuestionPlayer::new(Box::new(SlowSink {
        hold: Duration::from_millis(300),
    }));

    player.load_and_play(&wav_payload_b64(&[1; 400])).await?;

    // The single-threaded test runtime must keep turning while the sink
    // sleeps; if playback ran inline this sleep could not complete first.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(player.state(), PlaybackState::Playing);

    wait_for_state(&player, PlaybackState::Idle).await;
    Ok(())
}

#[tokio::test]
async fn test_loading_a_new_clip_replaces_the_previous_one() -> Result<()> {
    let dir = TempDir::new()?;
    let player = QuestionPlayer::new(Box::new(WavFileSink::new(dir.path())?));

    player.load_and_play(&wav_payload_b64(&[1; 400])).await?;
    wait_for_state(&player, PlaybackState::Idle).await;

    player.load_and_play(&wav_payload_b64(&[2; 400])).await?;
    wait_for_state(&player, PlaybackState::Idle).await;

    let mut reader = hound::WavReader::open(dir.path().join("question-001.wav"))?;
    let written: Vec<i16> = reader.samples::<i16>().collect::<std::result::Result<_, _>>()?;
    assert_eq!(written, vec![2i16; 400]);
    Ok(())
}
