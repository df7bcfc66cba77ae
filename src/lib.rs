pub mod core;
pub mod errors;
pub mod http;
pub mod modules;
pub mod utils;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Context;
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use url::Url;

pub use crate::core::endpoint::{ContentStyle, Endpoint, HttpMethod, ParamType, Parameter};
pub use crate::core::engine::FuzzExecutor;
pub use crate::core::orchestrator::{DryRunPlan, Pipeline};
pub use crate::core::report::{Report, ReportEntry, ReportStore};
pub use crate::core::state::{PipelineStage, RunOutcome, RunSummary};
pub use crate::core::task::{FuzzResult, FuzzTask, Payload};
pub use crate::errors::{ConfigError, PipelineError, StorageError};
pub use crate::http::HttpClient;
pub use crate::modules::SourceTree;
pub use crate::utils::detector::ResponseClassifier;
pub use crate::utils::payload_loader::{PayloadSource, FALLBACK_PAYLOADS};
pub use crate::utils::{read_lines, read_payload_lines};

/// Which external payload generator to consult, if any.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeneratorKind {
    #[default]
    None,
    Service,
    Ollama,
}

impl std::str::FromStr for GeneratorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(GeneratorKind::None),
            "service" => Ok(GeneratorKind::Service),
            "ollama" => Ok(GeneratorKind::Ollama),
            other => Err(format!("unknown generator '{}' (none, service, ollama)", other)),
        }
    }
}

/// Run configuration, loadable from a JSON file and overridable from the CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScanConfig {
    pub base_url: String,
    pub sources: Vec<PathBuf>,
    pub endpoint_files: Vec<PathBuf>,
    /// Directory names skipped while walking sources, on top of the defaults.
    pub ignore_dirs: Vec<String>,
    pub max_workers: usize,
    pub timeout: u64,
    pub output_dir: PathBuf,
    pub max_duration: Option<u64>,
    pub generator: GeneratorKind,
    pub generator_url: Option<String>,
    pub generator_model: Option<String>,
    pub generator_timeout: u64,
    pub signatures_file: Option<PathBuf>,
    pub payloads_file: Option<PathBuf>,
    pub headers: Vec<String>,
    pub proxy: Option<String>,
    pub verbose: bool,
    pub dry_run: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            sources: Vec::new(),
            endpoint_files: Vec::new(),
            ignore_dirs: Vec::new(),
            max_workers: 4,
            timeout: 8,
            output_dir: PathBuf::from("results"),
            max_duration: None,
            generator: GeneratorKind::None,
            generator_url: None,
            generator_model: None,
            generator_timeout: 20,
            signatures_file: None,
            payloads_file: None,
            headers: Vec::new(),
            proxy: None,
            verbose: false,
            dry_run: false,
        }
    }
}

impl ScanConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read config file {}", path.display()))?;
        serde_json::from_str(&data)
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let raw = self.base_url.trim();
        if raw.is_empty() {
            return Err(ConfigError::MissingBaseUrl);
        }
        let url = Url::parse(raw)
            .map_err(|e| ConfigError::InvalidBaseUrl(raw.to_string(), e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidBaseUrl(
                raw.to_string(),
                "scheme must be http or https".to_string(),
            ));
        }
        if self.max_workers == 0 {
            return Err(ConfigError::ZeroWorkers);
        }
        if self.timeout == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.sources.is_empty() && self.endpoint_files.is_empty() {
            return Err(ConfigError::NoSources);
        }
        if self.generator == GeneratorKind::Service && self.generator_url.is_none() {
            return Err(ConfigError::MissingGeneratorUrl("service".to_string()));
        }
        Ok(())
    }

    pub fn parsed_headers(&self) -> Vec<(String, String)> {
        parse_custom_headers(&self.headers)
    }
}

pub fn parse_custom_headers(raw: &[String]) -> Vec<(String, String)> {
    raw.iter().filter_map(|h| {
        let mut parts = h.splitn(2, ':');
        let key = parts.next()?.trim().to_string();
        let val = parts.next().unwrap_or("").trim().to_string();
        if key.is_empty() { return None; }
        Some((key, val))
    }).collect()
}

/// Output abstraction for the pipeline.
/// The CLI implements this with colored terminal output; library callers
/// and tests use `NullSink`.
pub trait PipelineObserver: Send + Sync {
    fn on_log(&self, level: &str, message: &str);
    fn on_stage(&self, stage: PipelineStage);
    fn on_result(&self, result: &FuzzResult);
    fn on_progress(&self, phase: &str, current: usize, total: usize);
}

pub type SinkRef = Arc<dyn PipelineObserver>;

/// Discards every event.
pub struct NullSink;

impl NullSink {
    pub fn new_ref() -> SinkRef {
        Arc::new(Self)
    }
}

impl PipelineObserver for NullSink {
    fn on_log(&self, _level: &str, _message: &str) {}
    fn on_stage(&self, _stage: PipelineStage) {}
    fn on_result(&self, _result: &FuzzResult) {}
    fn on_progress(&self, _phase: &str, _current: usize, _total: usize) {}
}

/// Terminal output sink for CLI usage.
///
/// Fuzzing progress is drawn as a progress bar; while it is visible, other
/// lines are printed above it.
pub struct ConsoleSink {
    bar: Mutex<Option<ProgressBar>>,
}

impl ConsoleSink {
    pub fn new_ref() -> SinkRef {
        Arc::new(Self {
            bar: Mutex::new(None),
        })
    }

    fn out(&self, text: &str) {
        use std::io::Write;
        let guard = self.bar.lock().ok();
        match guard.as_deref().and_then(Option::as_ref) {
            Some(bar) => bar.println(text),
            None => {
                print!("{}\r\n", text);
                std::io::stdout().flush().ok();
            }
        }
    }
}

impl PipelineObserver for ConsoleSink {
    fn on_log(&self, level: &str, message: &str) {
        use colored::*;
        let colored = match level {
            "success" => message.green().to_string(),
            "error"   => message.red().to_string(),
            "warn"    => message.yellow().to_string(),
            "phase"   => message.bright_cyan().bold().to_string(),
            _         => message.to_string(),
        };
        self.out(&colored);
    }

    fn on_stage(&self, stage: PipelineStage) {
        use colored::*;
        let line = format!("[*] {}", stage);
        match stage {
            PipelineStage::Failed => self.out(&line.red().bold().to_string()),
            PipelineStage::Done => self.out(&line.green().bold().to_string()),
            _ => self.out(&line.bright_cyan().bold().to_string()),
        }
    }

    fn on_result(&self, result: &FuzzResult) {
        use colored::*;
        let Some(pattern) = result.error_pattern.as_deref() else {
            return;
        };
        self.out(&format!(
            "\n{} {} detected!",
            "[+]".green().bold(),
            "SQL error".red().bold()
        ));
        self.out(&format!("    Target:  {} {}", result.method, result.url.white()));
        self.out(&format!("    Payload: {}", result.payload.bright_yellow()));
        self.out(&format!(
            "    Info:    Status [{}] | Signature [{}]",
            result
                .status_code
                .map(|s| s.to_string())
                .unwrap_or_else(|| "N/A".to_string())
                .cyan(),
            pattern.blue()
        ));
        self.out(&"──────────────────────────────────────────".dimmed().to_string());
    }

    fn on_progress(&self, phase: &str, current: usize, total: usize) {
        let Ok(mut slot) = self.bar.lock() else {
            return;
        };
        if total == 0 {
            return;
        }
        if slot.is_none() && current < total {
            let bar = ProgressBar::new(total as u64);
            if let Ok(style) = ProgressStyle::default_bar()
                .template("  {bar:30.cyan/dark_gray} {pos}/{len} {msg}")
            {
                bar.set_style(style.progress_chars("█▓░"));
            }
            bar.set_message(phase.to_string());
            *slot = Some(bar);
        }
        if let Some(bar) = slot.as_ref() {
            bar.set_position(current as u64);
            if current >= total {
                bar.finish_and_clear();
                *slot = None;
            }
        }
    }
}
