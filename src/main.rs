use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use interview_client::{
    Config, FileAudioBackend, FileScreenBackend, HttpBackend, InterviewSession, NatsChannel,
    SessionConfig, StartOptions, WavFileSink,
};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "interview-client", about = "Candidate interview session client")]
struct Args {
    /// Path to the config file (without extension).
    #[arg(long, default_value = "config/interview-client")]
    config: String,

    /// Interview id to join.
    #[arg(long)]
    interview_id: String,

    #[arg(long)]
    candidate_name: String,

    #[arg(long)]
    candidate_email: String,

    /// WAV file standing in for the microphone.
    #[arg(long)]
    mic_file: String,

    /// Media file standing in for the shared screen.
    #[arg(long)]
    screen_file: Option<String>,

    /// Webcam snapshot to upload at start.
    #[arg(long)]
    snapshot: Option<String>,

    /// Directory where question audio is written.
    #[arg(long, default_value = "questions")]
    playback_dir: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let cfg = Config::load(&args.config)?;

    info!("Interview client v0.1.0");
    info!("Backend: {}", cfg.backend.base_url);

    let api = Arc::new(HttpBackend::new(
        cfg.backend.base_url.clone(),
        cfg.backend.api_key.clone(),
    ));
    let channel = Arc::new(NatsChannel::connect(&cfg.channel.nats_url).await?);

    let session_config = SessionConfig {
        interview_id: args.interview_id.clone(),
        candidate_name: args.candidate_name.clone(),
        candidate_email: args.candidate_email.clone(),
        file_extension: cfg.capture.file_extension.clone(),
        audio_frame_duration: Duration::from_millis(cfg.capture.audio_frame_ms),
        screen_chunk_interval: Duration::from_secs(cfg.capture.screen_chunk_secs),
    };

    let sink = WavFileSink::new(&args.playback_dir)?;
    let session = Arc::new(InterviewSession::new(
        session_config,
        api,
        channel,
        Box::new(sink),
    ));

    let snapshot = match &args.snapshot {
        Some(path) => Some(std::fs::read(path)?),
        None => None,
    };
    let screen = args.screen_file.as_ref().map(|path| {
        Box::new(FileScreenBackend::new(
            path,
            Duration::from_secs(cfg.capture.screen_chunk_secs),
            256 * 1024,
        )) as Box<dyn interview_client::ScreenBackend>
    });

    session
        .start(StartOptions {
            screen,
            screen_prevalidated: false,
            snapshot,
        })
        .await?;

    print_help();
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        print!("> ");
        io::stdout().flush()?;
        let Some(line) = lines.next() else { break };
        let line = line?;
        let command = line.trim();

        match command {
            "record" => {
                let backend = Box::new(FileAudioBackend::new(
                    &args.mic_file,
                    Duration::from_millis(cfg.capture.audio_frame_ms),
                ));
                if let Err(e) = session.start_recording(backend).await {
                    warn!("Cannot start recording: {}", e);
                }
            }
            "stop" => {
                if let Err(e) = session.stop_recording().await {
                    warn!("Cannot stop recording: {}", e);
                }
            }
            "submit" => match session.submit_answer().await {
                Ok(response) if response.complete => {
                    println!("Interview complete.");
                }
                Ok(_) => println!("Answer submitted."),
                Err(e) => warn!("Submission failed: {}", e),
            },
            "replay" => session.replay_question().await,
            "restart-screen" => {
                let Some(path) = &args.screen_file else {
                    warn!("No screen file configured");
                    continue;
                };
                let backend = Box::new(FileScreenBackend::new(
                    path,
                    Duration::from_secs(cfg.capture.screen_chunk_secs),
                    256 * 1024,
                ));
                if let Err(e) = session.restart_screen(backend).await {
                    warn!("Screen restart failed: {}", e);
                }
            }
            "transcript" => println!("{}", session.transcript_display()),
            "status" => {
                let snapshot = session.snapshot();
                println!("phase: {:?}", snapshot.phase);
                if let Some(q) = &snapshot.question {
                    println!("question {}/{}: {}", q.index, q.total, q.text);
                }
                if let Some(remaining) = session.remaining_secs().await {
                    println!("time remaining: {}s", remaining);
                }
                let (sent, acked, failed) = session.screen_stats();
                println!(
                    "screen: {:?} (chunks sent={} acked={} failed={})",
                    session.screen_state(),
                    sent,
                    acked,
                    failed
                );
                println!("tab switches: {}", session.tab_switch_count());
                if let Some(err) = &snapshot.last_error {
                    println!("last error: {}", err);
                }
            }
            "end" | "quit" => {
                session
                    .end(interview_client::session::EndReason::Manual)
                    .await?;
                break;
            }
            "help" => print_help(),
            "" => {}
            other => println!("Unknown command: {other} (try 'help')"),
        }

        if session.is_complete() {
            break;
        }
    }

    if let Some(summary) = session.end_summary() {
        println!(
            "Answered {}/{} questions",
            summary.questions_answered.unwrap_or(0),
            summary.total_questions.unwrap_or(0)
        );
    }
    if let Ok(report) = session.fetch_summary().await {
        if let Some(general) = report.general_summary {
            println!("Summary: {general}");
        }
    }

    Ok(())
}

fn print_help() {
    println!("Commands:");
    println!("  record          start answering (microphone on)");
    println!("  stop            stop answering");
    println!("  submit          submit the current answer");
    println!("  replay          replay the question audio");
    println!("  restart-screen  restart screen sharing after a failure");
    println!("  transcript      show the live transcript");
    println!("  status          show session status");
    println!("  end             end the interview");
}
