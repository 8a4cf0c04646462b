use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// All process-wide knobs live here and are handed into constructors;
/// nothing reads these paths from globals.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub paths: PathsConfig,
    pub classifier: ClassifierConfig,
    pub launcher: LauncherConfig,
    pub ui: UiConfig,
    pub timing: TimingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub signal_file: PathBuf,
    pub captures_dir: PathBuf,
    pub quotes_file: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub program: String,
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LauncherConfig {
    /// Command the launcher spawns to run a capture session.
    pub session_program: String,
    pub session_args: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    pub window_title: String,
    pub font_family: String,
    pub font_size_pt: u32,
    pub bitmap_scale: usize,
    pub highlight_faces: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// How long the error banner stays up before the live view resumes.
    pub error_hold_ms: u64,
    /// How long a no-face snapshot stays up before the live view resumes.
    pub noface_hold_ms: u64,
    /// Launcher watcher poll interval.
    pub poll_interval_ms: u64,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            signal_file: PathBuf::from("camera_ready.signal"),
            captures_dir: PathBuf::from("captures"),
            quotes_file: PathBuf::from("quotes.txt"),
        }
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            program: "python3".to_string(),
            args: vec!["scripts/emotion_server.py".to_string()],
        }
    }
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            session_program: "moodcam".to_string(),
            session_args: Vec::new(),
        }
    }
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            window_title: "Emotion Detector".to_string(),
            font_family: "DejaVuSans".to_string(),
            font_size_pt: 16,
            bitmap_scale: 2,
            highlight_faces: true,
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            error_hold_ms: 3000,
            noface_hold_ms: 1500,
            poll_interval_ms: 100,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            paths: PathsConfig::default(),
            classifier: ClassifierConfig::default(),
            launcher: LauncherConfig::default(),
            ui: UiConfig::default(),
            timing: TimingConfig::default(),
        }
    }
}

impl AppConfig {
    pub const DEFAULT_PATH: &'static str = "moodcam.json";

    pub fn load(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            let content = fs::read_to_string(path)?;
            // Missing fields fall back to defaults via #[serde(default)].
            match serde_json::from_str::<AppConfig>(&content) {
                Ok(c) => {
                    println!("Loaded configuration from {}", path.display());
                    c
                }
                Err(e) => {
                    println!("Error parsing config: {}. Loading defaults.", e);
                    Self::default()
                }
            }
        } else {
            println!(
                "Configuration file not found. Creating default at {}",
                path.display()
            );
            Self::default()
        };

        // Always save back so new fields appear in the file.
        config.save(path)?;

        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}
