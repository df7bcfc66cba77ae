use clap::Parser;
use colored::*;
use std::io::Write;
use std::path::PathBuf;
use std::process;
use tokio_util::sync::CancellationToken;

use sqlprobe::{ConsoleSink, GeneratorKind, Pipeline, RunOutcome, ScanConfig};

#[derive(Parser, Debug)]
#[command(
    name = "sqlprobe",
    version,
    about = "Automated SQL injection discovery for web applications",
    after_help = "\x1b[1;36mEXAMPLES:\x1b[0m
  Scan a Flask app:               sqlprobe --base-url http://localhost:5000 --source ./app
  From an endpoint list:          sqlprobe --base-url http://localhost:3000 --endpoints endpoints.json
  More workers, longer timeout:   sqlprobe --base-url http://t --source ./src -t 10 --timeout 15
  Ollama-generated payloads:      sqlprobe --base-url http://t --source ./src --generator ollama --model llama3
  Through a proxy (Burp):         sqlprobe --base-url http://t --source ./src --proxy http://127.0.0.1:8080
  Dry-run:                        sqlprobe --base-url http://t --source ./src --dry-run"
)]
pub struct Args {
    #[arg(long, required_unless_present = "config", help = "Base URL of the application under test")]
    pub base_url: Option<String>,

    #[arg(short = 's', long = "source", help = "Source file or directory to extract endpoints from")]
    pub sources: Vec<PathBuf>,

    #[arg(short = 'e', long = "endpoints", help = "JSON endpoint list file")]
    pub endpoints: Vec<PathBuf>,

    #[arg(long = "ignore-dir", help = "Directory name to skip while walking sources (repeatable)")]
    pub ignore_dirs: Vec<String>,

    #[arg(short = 't', long = "threads", help = "Number of concurrent requests [default: 4]")]
    pub max_workers: Option<usize>,

    #[arg(long, help = "Per-request timeout in seconds [default: 8]")]
    pub timeout: Option<u64>,

    #[arg(short = 'o', long = "output", help = "Report directory [default: results]")]
    pub output_dir: Option<PathBuf>,

    #[arg(short = 'c', long, help = "JSON config file; command-line flags override it")]
    pub config: Option<PathBuf>,

    #[arg(long, help = "Payload generator: none, service or ollama")]
    pub generator: Option<GeneratorKind>,

    #[arg(long, help = "Payload generator URL")]
    pub generator_url: Option<String>,

    #[arg(long = "model", help = "Ollama model name")]
    pub generator_model: Option<String>,

    #[arg(long = "signatures", help = "Extra SQL error signatures, one regex per line")]
    pub signatures_file: Option<PathBuf>,

    #[arg(short = 'p', long = "payloads", help = "Replacement baseline payloads, one per line")]
    pub payloads_file: Option<PathBuf>,

    #[arg(short = 'H', long = "header", help = "Custom header (e.g. \"Authorization: Bearer TOKEN\")")]
    pub headers: Vec<String>,

    #[arg(long, help = "Proxy URL (e.g. http://127.0.0.1:8080)")]
    pub proxy: Option<String>,

    #[arg(long, help = "Abort the whole run after this many seconds")]
    pub max_duration: Option<u64>,

    #[arg(short = 'v', long, default_value_t = false, help = "Debug logging")]
    pub verbose: bool,

    #[arg(long, help = "Extract and plan without sending requests or writing a report")]
    pub dry_run: bool,
}

impl Args {
    /// Config file first, then every flag that was given on the command line.
    fn into_config(self) -> anyhow::Result<ScanConfig> {
        let mut config = match &self.config {
            Some(path) => ScanConfig::from_file(path)?,
            None => ScanConfig::default(),
        };

        if let Some(v) = self.base_url { config.base_url = v; }
        config.sources.extend(self.sources);
        config.endpoint_files.extend(self.endpoints);
        config.ignore_dirs.extend(self.ignore_dirs);
        if let Some(v) = self.max_workers { config.max_workers = v; }
        if let Some(v) = self.timeout { config.timeout = v; }
        if let Some(v) = self.output_dir { config.output_dir = v; }
        if let Some(v) = self.generator { config.generator = v; }
        if self.generator_url.is_some() { config.generator_url = self.generator_url; }
        if self.generator_model.is_some() { config.generator_model = self.generator_model; }
        if self.signatures_file.is_some() { config.signatures_file = self.signatures_file; }
        if self.payloads_file.is_some() { config.payloads_file = self.payloads_file; }
        config.headers.extend(self.headers);
        if self.proxy.is_some() { config.proxy = self.proxy; }
        if self.max_duration.is_some() { config.max_duration = self.max_duration; }
        config.verbose |= self.verbose;
        config.dry_run |= self.dry_run;

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() {
    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    let args = Args::parse();
    init_logging(args.verbose);

    let code = match run(args).await {
        Ok(code) => code,
        Err(e) => {
            eprint!("{}\r\n", format!("[!] {:#}", e).red());
            1
        }
    };
    process::exit(code);
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

async fn run(args: Args) -> anyhow::Result<i32> {
    let config = args.into_config()?;

    let token = CancellationToken::new();
    let mut pipeline = Pipeline::from_config(&config)?
        .with_sink(ConsoleSink::new_ref())
        .with_cancel_token(token.clone());

    if config.dry_run {
        let plan = pipeline.plan();
        println!(
            "[DRY RUN] Would fuzz {} endpoint(s) with {} task(s) against {}",
            plan.endpoints, plan.tasks, config.base_url
        );
        return Ok(0);
    }

    print_scan_config(&config);

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });

    let outcome = pipeline.run().await;
    print_summary(&outcome);

    Ok(match &outcome {
        RunOutcome::Done { .. } => 0,
        _ if outcome.is_cancelled() => 130,
        RunOutcome::Failed { .. } => 1,
    })
}

fn print_scan_config(config: &ScanConfig) {
    print!("{}\r\n", format!("[+] Target:     {}", config.base_url).green().bold());
    print!("{}\r\n", format!("[+] Workers:    {}", config.max_workers).blue());
    print!("{}\r\n", format!("[+] Timeout:    {}s", config.timeout).blue());
    print!("{}\r\n", format!("[+] Output:     {}", config.output_dir.display()).blue());
    let generator = match config.generator {
        GeneratorKind::None => "off (baseline payloads)",
        GeneratorKind::Service => "service",
        GeneratorKind::Ollama => "ollama",
    };
    print!("{}\r\n", format!("[+] Generator:  {}", generator).magenta());
    if let Some(ref proxy) = config.proxy {
        print!("{}\r\n", format!("[+] Proxy:      {}", proxy).yellow());
    }
    if !config.headers.is_empty() {
        print!("{}\r\n", format!("[+] Headers:    {} custom", config.headers.len()).yellow());
    }
    if let Some(secs) = config.max_duration {
        print!("{}\r\n", format!("[+] Max run:    {}s", secs).yellow());
    }
    print!("{}\r\n", "──────────────────────────────────────────────────".dimmed());
    std::io::stdout().flush().ok();
}

fn print_summary(outcome: &RunOutcome) {
    let s = outcome.summary();
    print!("\r\n{}\r\n", "━━━ Summary ━━━".bright_white().bold());
    print!("    Endpoints:         {}\r\n", s.endpoints);
    print!("    Skipped files:     {}\r\n", s.skipped_files);
    print!("    Degraded payloads: {}\r\n", s.degraded_generations);
    print!("    Requests:          {}\r\n", s.tasks);
    print!("    Request failures:  {}\r\n", s.request_failures);
    let detected = format!("{}", s.errors_detected);
    if s.errors_detected > 0 {
        print!("    SQL errors:        {}\r\n", detected.red().bold());
    } else {
        print!("    SQL errors:        {}\r\n", detected.green());
    }

    match outcome {
        RunOutcome::Done { location, .. } => {
            print!("{}\r\n", format!("[+] Report: {}", location.display()).green().bold());
        }
        RunOutcome::Failed { stage, error, .. } => {
            eprint!("{}\r\n", format!("[!] Failed during {}: {}", stage, error).red().bold());
        }
    }
    std::io::stdout().flush().ok();
}
