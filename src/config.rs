use anyhow::Result;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub backend: BackendConfig,
    pub channel: ChannelConfig,
    pub capture: CaptureConfig,
}

#[derive(Debug, Deserialize)]
pub struct BackendConfig {
    /// Interview API base URL, e.g. `https://interviews.example.com`.
    pub base_url: String,
    /// Server-role key; only attached to endpoints that require it.
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChannelConfig {
    pub nats_url: String,
}

#[derive(Debug, Deserialize)]
pub struct CaptureConfig {
    /// Container extension for uploaded screen chunks.
    #[serde(default = "default_file_extension")]
    pub file_extension: String,
    /// Microphone frame cadence in milliseconds.
    #[serde(default = "default_audio_frame_ms")]
    pub audio_frame_ms: u64,
    /// Screen chunk interval in seconds.
    #[serde(default = "default_screen_chunk_secs")]
    pub screen_chunk_secs: u64,
}

fn default_file_extension() -> String {
    "mp4".to_string()
}

fn default_audio_frame_ms() -> u64 {
    250
}

fn default_screen_chunk_secs() -> u64 {
    10
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("INTERVIEW").separator("__"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
