use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering::Relaxed};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};

use crate::core::endpoint::Parameter;
use crate::core::task::Payload;
use crate::errors::GenerationError;
use crate::modules::generator::PayloadGenerator;
use crate::utils::read_payload_lines;

/// Baseline payloads used whenever generation is off or fails.
pub const FALLBACK_PAYLOADS: [&str; 5] = ["'", "\"", "' OR '1'='1", "\" OR \"1\"=\"1", "' AND 'x'='y"];

pub const DEFAULT_GENERATION_TIMEOUT: Duration = Duration::from_secs(20);

/// Produces candidate payloads per parameter.
///
/// Delegates to an external generator under a timeout when one is
/// configured. Every failure degrades to the baseline set and is counted, so
/// `generate` always yields at least one payload and never errors.
pub struct PayloadSource {
    generator: Option<Arc<dyn PayloadGenerator>>,
    timeout: Duration,
    baseline: Vec<Payload>,
    degraded: AtomicUsize,
}

impl PayloadSource {
    /// Baseline payloads only; no external calls.
    pub fn fallback_only() -> Self {
        Self {
            generator: None,
            timeout: DEFAULT_GENERATION_TIMEOUT,
            baseline: FALLBACK_PAYLOADS.iter().map(|s| s.to_string()).collect(),
            degraded: AtomicUsize::new(0),
        }
    }

    pub fn with_generator(generator: Arc<dyn PayloadGenerator>, timeout: Duration) -> Self {
        Self {
            generator: Some(generator),
            timeout,
            ..Self::fallback_only()
        }
    }

    /// Replaces the baseline set. An empty list keeps the built-in set.
    pub fn with_baseline(mut self, payloads: Vec<Payload>) -> Self {
        if payloads.is_empty() {
            warn!("Ignoring empty baseline payload list; keeping the built-in set");
        } else {
            self.baseline = payloads;
        }
        self
    }

    /// Loads a replacement baseline from a file, one payload per line, used
    /// exactly as written.
    pub fn with_baseline_file(self, path: &Path) -> anyhow::Result<Self> {
        let payloads = read_payload_lines(path)
            .map_err(|e| anyhow::anyhow!("cannot read payload file {}: {}", path.display(), e))?;
        Ok(self.with_baseline(payloads))
    }

    pub fn baseline(&self) -> &[Payload] {
        &self.baseline
    }

    /// Number of GenerationDegraded events so far.
    pub fn degraded_count(&self) -> usize {
        self.degraded.load(Relaxed)
    }

    pub async fn generate(&self, parameter: &Parameter) -> Vec<Payload> {
        let Some(generator) = self.generator.as_ref() else {
            return self.baseline.clone();
        };

        if parameter.name.is_empty() {
            return self.degrade(parameter, "parameter has no name");
        }

        let attempt = tokio::time::timeout(self.timeout, generator.generate(parameter)).await;
        let outcome = attempt.unwrap_or(Err(GenerationError::Timeout(self.timeout)));

        match outcome {
            Ok(payloads) if payloads.is_empty() => {
                self.degrade(parameter, &GenerationError::Empty.to_string())
            }
            Ok(payloads) => {
                debug!(
                    "{} generated {} payload(s) for '{}'",
                    generator.name(),
                    payloads.len(),
                    parameter.name
                );
                payloads
            }
            Err(e) => self.degrade(parameter, &e.to_string()),
        }
    }

    /// Union of the payloads of every parameter, first-seen order, no repeats.
    pub async fn generate_for_all(&self, parameters: &[Parameter]) -> Vec<Payload> {
        let mut payloads: Vec<Payload> = Vec::new();
        for parameter in parameters {
            for payload in self.generate(parameter).await {
                if !payloads.contains(&payload) {
                    payloads.push(payload);
                }
            }
        }
        payloads
    }

    fn degrade(&self, parameter: &Parameter, reason: &str) -> Vec<Payload> {
        self.degraded.fetch_add(1, Relaxed);
        warn!(
            "GenerationDegraded for '{}': {}; using {} baseline payload(s)",
            parameter.name,
            reason,
            self.baseline.len()
        );
        self.baseline.clone()
    }
}

impl Default for PayloadSource {
    fn default() -> Self {
        Self::fallback_only()
    }
}
