use std::fs;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use log::{error, info, warn};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::core::endpoint::Endpoint;
use crate::core::engine::FuzzExecutor;
use crate::core::report::{Report, ReportStore};
use crate::core::state::{PipelineStage, RunOutcome, RunSummary, StageTracker};
use crate::core::task::{plan_tasks, FuzzResult, PayloadAssignment};
use crate::errors::{ParseSkipped, PipelineError};
use crate::http::HttpClient;
use crate::modules::endpoint_list::parse_endpoint_list;
use crate::modules::generator::{
    OllamaGenerator, ServiceGenerator, DEFAULT_OLLAMA_MODEL, DEFAULT_OLLAMA_URL,
};
use crate::modules::SourceTree;
use crate::utils::detector::ResponseClassifier;
use crate::utils::payload_loader::PayloadSource;
use crate::utils::{read_lines, unix_now};
use crate::{GeneratorKind, NullSink, ScanConfig, SinkRef};

/// What a run would do, computed without touching the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DryRunPlan {
    pub endpoints: usize,
    pub tasks: usize,
    pub skipped_files: usize,
}

/// Sequences extraction, payload generation, fuzzing, classification and
/// reporting for one target.
///
/// Stages run strictly one after another. Cancellation and the optional
/// run deadline are checked between every pair of stages and also
/// interrupt the two stages that wait on the network.
pub struct Pipeline {
    base_url: Url,
    sources: Vec<PathBuf>,
    endpoint_files: Vec<PathBuf>,
    endpoints: Vec<Endpoint>,
    source_tree: SourceTree,
    payloads: PayloadSource,
    classifier: ResponseClassifier,
    client: Arc<HttpClient>,
    max_workers: usize,
    store: ReportStore,
    cancel_token: CancellationToken,
    sink: SinkRef,
    max_duration: Option<Duration>,
    tracker: StageTracker,
}

impl Pipeline {
    pub fn new(base_url: Url, client: Arc<HttpClient>) -> Self {
        Self {
            base_url,
            sources: Vec::new(),
            endpoint_files: Vec::new(),
            endpoints: Vec::new(),
            source_tree: SourceTree::with_default_extractors(),
            payloads: PayloadSource::fallback_only(),
            classifier: ResponseClassifier::new(),
            client,
            max_workers: 4,
            store: ReportStore::new("results"),
            cancel_token: CancellationToken::new(),
            sink: NullSink::new_ref(),
            max_duration: None,
            tracker: StageTracker::new(),
        }
    }

    /// Builds a pipeline from a validated configuration: HTTP client,
    /// payload generator, extra signatures and baseline payloads.
    pub fn from_config(config: &ScanConfig) -> anyhow::Result<Self> {
        config.validate()?;
        let base_url = Url::parse(&config.base_url)?;

        let client = HttpClient::new(
            Duration::from_secs(config.timeout),
            config.proxy.as_deref(),
            &config.parsed_headers(),
        )
        .context("failed to build HTTP client")?;

        let generation_timeout = Duration::from_secs(config.generator_timeout);
        let mut payloads = match config.generator {
            GeneratorKind::None => PayloadSource::fallback_only(),
            GeneratorKind::Service => {
                let url = config.generator_url.clone().unwrap_or_default();
                PayloadSource::with_generator(Arc::new(ServiceGenerator::new(url)), generation_timeout)
            }
            GeneratorKind::Ollama => {
                let url = config.generator_url.as_deref().unwrap_or(DEFAULT_OLLAMA_URL);
                let model = config.generator_model.as_deref().unwrap_or(DEFAULT_OLLAMA_MODEL);
                PayloadSource::with_generator(Arc::new(OllamaGenerator::new(url, model)), generation_timeout)
            }
        };
        if let Some(path) = &config.payloads_file {
            payloads = payloads.with_baseline_file(path)?;
        }

        let mut classifier = ResponseClassifier::new();
        if let Some(path) = &config.signatures_file {
            let lines = read_lines(path)
                .with_context(|| format!("cannot read signatures file {}", path.display()))?;
            let added = classifier.extend_signatures(lines);
            info!("Loaded {} extra error signature(s) from {}", added, path.display());
        }

        let mut pipeline = Self::new(base_url, Arc::new(client))
            .with_sources(config.sources.iter().cloned())
            .with_endpoint_files(config.endpoint_files.iter().cloned())
            .with_source_tree(SourceTree::default().with_ignored_dirs(config.ignore_dirs.iter().cloned()))
            .with_payload_source(payloads)
            .with_classifier(classifier)
            .with_max_workers(config.max_workers)
            .with_output_dir(config.output_dir.clone());
        if let Some(secs) = config.max_duration {
            pipeline = pipeline.with_max_duration(Duration::from_secs(secs));
        }
        Ok(pipeline)
    }

    pub fn with_sources(mut self, sources: impl IntoIterator<Item = PathBuf>) -> Self {
        self.sources.extend(sources);
        self
    }

    /// Endpoint-list files, read as such whatever their extension.
    pub fn with_endpoint_files(mut self, files: impl IntoIterator<Item = PathBuf>) -> Self {
        self.endpoint_files.extend(files);
        self
    }

    /// Endpoints already extracted by the caller.
    pub fn with_endpoints(mut self, endpoints: impl IntoIterator<Item = Endpoint>) -> Self {
        self.endpoints.extend(endpoints);
        self
    }

    pub fn with_source_tree(mut self, tree: SourceTree) -> Self {
        self.source_tree = tree;
        self
    }

    pub fn with_payload_source(mut self, payloads: PayloadSource) -> Self {
        self.payloads = payloads;
        self
    }

    pub fn with_classifier(mut self, classifier: ResponseClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.store = ReportStore::new(dir);
        self
    }

    /// Replace the pipeline's cancel token with an external one (e.g. wired
    /// to Ctrl-C).
    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = token;
        self
    }

    pub fn with_sink(mut self, sink: SinkRef) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_max_duration(mut self, limit: Duration) -> Self {
        self.max_duration = Some(limit);
        self
    }

    pub fn stage(&self) -> PipelineStage {
        self.tracker.current()
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Extracts endpoints and counts the tasks the baseline payloads would
    /// produce. Sends nothing and writes nothing.
    pub fn plan(&self) -> DryRunPlan {
        let (endpoints, skipped) = self.extract();
        let assignments: Vec<PayloadAssignment> = endpoints
            .into_iter()
            .map(|endpoint| PayloadAssignment {
                endpoint: Arc::new(endpoint),
                payloads: self.payloads.baseline().to_vec(),
            })
            .collect();
        DryRunPlan {
            endpoints: assignments.len(),
            tasks: plan_tasks(&assignments).len(),
            skipped_files: skipped.len(),
        }
    }

    /// Runs every stage to completion. A pipeline runs once: a second call
    /// leaves the terminal stage untouched and fails with `AlreadyFinished`.
    pub async fn run(&mut self) -> RunOutcome {
        let mut summary = RunSummary::default();
        let deadline = self.max_duration.map(|d| Instant::now() + d);

        match self.execute(&mut summary, deadline).await {
            Ok(location) => {
                self.enter(PipelineStage::Done);
                self.sink.on_log(
                    "success",
                    &format!("[+] Report saved to {}", location.display()),
                );
                RunOutcome::Done { location, summary }
            }
            Err(error) => {
                let stage = match self.tracker.fail() {
                    Some(stage) => {
                        self.sink.on_stage(PipelineStage::Failed);
                        stage
                    }
                    None => self.tracker.current(),
                };
                if error.is_cancelled() {
                    warn!("Run cancelled during {}", stage);
                } else {
                    error!("Run failed during {}: {}", stage, error);
                }
                RunOutcome::Failed {
                    stage,
                    error,
                    summary,
                }
            }
        }
    }

    async fn execute(
        &mut self,
        summary: &mut RunSummary,
        deadline: Option<Instant>,
    ) -> Result<PathBuf, PipelineError> {
        self.step(deadline)?;
        let (endpoints, skipped) = self.extract();
        summary.endpoints = endpoints.len();
        summary.skipped_files = skipped.len();
        self.sink.on_log(
            "info",
            &format!(
                "[+] {} endpoint(s) extracted, {} file(s) skipped",
                endpoints.len(),
                skipped.len()
            ),
        );

        self.step(deadline)?;
        let assignments = self.interruptible(deadline, self.assign_payloads(endpoints)).await?;
        summary.degraded_generations = self.payloads.degraded_count();

        self.step(deadline)?;
        let tasks = plan_tasks(&assignments);
        summary.tasks = tasks.len();
        let executor = FuzzExecutor::new(
            Arc::clone(&self.client),
            self.base_url.clone(),
            self.max_workers,
        );
        let raw = self.interruptible(deadline, executor.run(tasks, &self.sink)).await?;

        self.step(deadline)?;
        let classified: Vec<FuzzResult> = raw
            .into_iter()
            .map(|result| self.classifier.classify(result))
            .collect();
        for result in &classified {
            if result.request_failed() {
                summary.request_failures += 1;
            }
            if result.error_detected() {
                summary.errors_detected += 1;
            }
            self.sink.on_result(result);
        }
        let groups = regroup(classified, summary.tasks, assignments.len())?;

        self.step(deadline)?;
        let report = Report::from_groups(self.base_url.as_str(), unix_now(), &groups);
        Ok(self.store.save(&report)?)
    }

    /// Stage boundary: observe cancellation and the deadline, then advance.
    fn step(&mut self, deadline: Option<Instant>) -> Result<(), PipelineError> {
        let Some(next) = self.tracker.current().next() else {
            return Err(PipelineError::AlreadyFinished(self.tracker.current()));
        };
        if self.cancel_token.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        if let (Some(deadline), Some(limit)) = (deadline, self.max_duration) {
            if Instant::now() >= deadline {
                return Err(PipelineError::TimedOut(limit));
            }
        }
        self.enter(next);
        Ok(())
    }

    fn enter(&mut self, stage: PipelineStage) {
        while self.tracker.current() != stage {
            if self.tracker.advance().is_none() {
                return;
            }
        }
        info!("Pipeline stage: {}", stage);
        self.sink.on_stage(stage);
    }

    async fn interruptible<F: Future>(
        &self,
        deadline: Option<Instant>,
        work: F,
    ) -> Result<F::Output, PipelineError> {
        let bounded = async {
            match (deadline, self.max_duration) {
                (Some(deadline), Some(limit)) => tokio::time::timeout_at(deadline, work)
                    .await
                    .map_err(|_| PipelineError::TimedOut(limit)),
                _ => Ok(work.await),
            }
        };
        tokio::select! {
            biased;
            _ = self.cancel_token.cancelled() => Err(PipelineError::Cancelled),
            out = bounded => out,
        }
    }

    fn extract(&self) -> (Vec<Endpoint>, Vec<ParseSkipped>) {
        let mut endpoints = Vec::new();
        let mut skipped = Vec::new();
        merge_all(&mut endpoints, self.endpoints.clone());

        for path in &self.endpoint_files {
            let parsed = fs::read_to_string(path)
                .map_err(|e| e.to_string())
                .and_then(|content| parse_endpoint_list(&content).map_err(|e| e.to_string()));
            match parsed {
                Ok(found) => merge_all(&mut endpoints, found),
                Err(reason) => {
                    let skip = ParseSkipped::new(path, reason);
                    warn!("ParseSkipped: {}", skip);
                    skipped.push(skip);
                }
            }
        }

        if !self.sources.is_empty() {
            let extraction = self.source_tree.scan(&self.sources);
            merge_all(&mut endpoints, extraction.endpoints);
            skipped.extend(extraction.skipped);
        }

        (endpoints, skipped)
    }

    async fn assign_payloads(&self, endpoints: Vec<Endpoint>) -> Vec<PayloadAssignment> {
        let total = endpoints.len();
        let mut assignments = Vec::with_capacity(total);
        for (i, endpoint) in endpoints.into_iter().enumerate() {
            let payloads = if endpoint.parameters.is_empty() {
                Vec::new()
            } else {
                self.payloads.generate_for_all(&endpoint.parameters).await
            };
            assignments.push(PayloadAssignment {
                endpoint: Arc::new(endpoint),
                payloads,
            });
            self.sink.on_progress("Generating payloads", i + 1, total);
        }
        assignments
    }
}

fn merge_all(into: &mut Vec<Endpoint>, found: Vec<Endpoint>) {
    for endpoint in found {
        match into.iter_mut().find(|e| e.path == endpoint.path) {
            Some(existing) => existing.merge(endpoint),
            None => into.push(endpoint),
        }
    }
}

/// Puts results back into task order, one slot per task, then groups them
/// by endpoint. Any missing, duplicated or foreign result is an
/// `Incomplete` error rather than a silently short report.
pub fn regroup(
    results: Vec<FuzzResult>,
    expected: usize,
    endpoint_count: usize,
) -> Result<Vec<Vec<FuzzResult>>, PipelineError> {
    let received = results.len();
    let incomplete = || PipelineError::Incomplete { expected, received };

    let mut slots: Vec<Option<FuzzResult>> = vec![None; expected];
    for result in results {
        match slots.get_mut(result.task_id) {
            Some(slot) if slot.is_none() => *slot = Some(result),
            _ => return Err(incomplete()),
        }
    }

    let mut groups: Vec<Vec<FuzzResult>> = vec![Vec::new(); endpoint_count];
    for slot in slots {
        let result = slot.ok_or_else(incomplete)?;
        let group = groups.get_mut(result.endpoint_index).ok_or_else(incomplete)?;
        group.push(result);
    }
    Ok(groups)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::endpoint::{HttpMethod, ParamType, Parameter};

    fn result(task_id: usize, endpoint_index: usize) -> FuzzResult {
        FuzzResult {
            task_id,
            endpoint_index,
            method: HttpMethod::Get,
            url: "http://t/x".to_string(),
            payload: format!("p{}", task_id),
            status_code: Some(200),
            body_excerpt: String::new(),
            error_pattern: None,
        }
    }

    #[test]
    fn test_regroup_restores_task_order_per_endpoint() {
        let shuffled = vec![result(3, 2), result(0, 0), result(2, 2), result(1, 0)];
        let groups = regroup(shuffled, 4, 3).unwrap();
        assert_eq!(groups.len(), 3);
        let ids: Vec<Vec<usize>> = groups
            .iter()
            .map(|g| g.iter().map(|r| r.task_id).collect())
            .collect();
        assert_eq!(ids, vec![vec![0, 1], vec![], vec![2, 3]]);
    }

    #[test]
    fn test_regroup_rejects_missing_and_duplicate_results() {
        let err = regroup(vec![result(0, 0)], 2, 1).unwrap_err();
        assert!(matches!(err, PipelineError::Incomplete { expected: 2, received: 1 }));

        let err = regroup(vec![result(0, 0), result(0, 0)], 2, 1).unwrap_err();
        assert!(matches!(err, PipelineError::Incomplete { .. }));

        let err = regroup(vec![result(5, 0)], 1, 1).unwrap_err();
        assert!(matches!(err, PipelineError::Incomplete { .. }));
    }

    fn pipeline() -> Pipeline {
        let client = HttpClient::new(Duration::from_secs(1), None, &[]).unwrap();
        Pipeline::new(Url::parse("http://127.0.0.1:9").unwrap(), Arc::new(client))
    }

    #[test]
    fn test_plan_counts_without_sending() {
        let endpoints = vec![
            Endpoint::new("/search")
                .with_method(HttpMethod::Get)
                .with_method(HttpMethod::Post)
                .with_parameter(Parameter::new("q", ParamType::String)),
            Endpoint::new("/health").with_method(HttpMethod::Get),
            Endpoint::new("/search").with_method(HttpMethod::Other("PUT".to_string())),
        ];
        let plan = pipeline().with_endpoints(endpoints).plan();
        assert_eq!(plan.endpoints, 2);
        assert_eq!(plan.tasks, 10);
        assert_eq!(plan.skipped_files, 0);
    }

    #[test]
    fn test_merge_all_unions_methods() {
        let mut endpoints = vec![Endpoint::new("/a").with_method(HttpMethod::Get)];
        merge_all(
            &mut endpoints,
            vec![
                Endpoint::new("/a").with_method(HttpMethod::Post),
                Endpoint::new("/b").with_method(HttpMethod::Get),
            ],
        );
        assert_eq!(endpoints.len(), 2);
        assert_eq!(endpoints[0].methods.len(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_reports_idle_stage() {
        let token = CancellationToken::new();
        token.cancel();
        let mut p = pipeline().with_cancel_token(token);
        let outcome = p.run().await;
        match outcome {
            RunOutcome::Failed { stage, error, .. } => {
                assert_eq!(stage, PipelineStage::Idle);
                assert!(error.is_cancelled());
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(p.stage(), PipelineStage::Failed);
    }

    #[tokio::test]
    async fn test_second_run_is_already_finished_not_cancelled() {
        let mut p = pipeline().with_cancel_token({
            let token = CancellationToken::new();
            token.cancel();
            token
        });
        assert!(p.run().await.is_cancelled());
        assert_eq!(p.stage(), PipelineStage::Failed);

        let again = p.run().await;
        assert!(!again.is_cancelled());
        match again {
            RunOutcome::Failed { stage, error, .. } => {
                assert_eq!(stage, PipelineStage::Failed);
                assert!(matches!(error, PipelineError::AlreadyFinished(PipelineStage::Failed)));
                assert!(error.to_string().starts_with("AlreadyFinished"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(p.stage(), PipelineStage::Failed);
    }
}
