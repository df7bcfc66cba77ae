//! Run state for the pipeline: the stage machine, and what a finished run
//! hands back to its caller.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use crate::errors::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PipelineStage {
    Idle,
    Extracting,
    GeneratingPayloads,
    Fuzzing,
    Classifying,
    Reporting,
    Done,
    Failed,
}

impl PipelineStage {
    /// The stage that follows this one on the happy path.
    pub fn next(self) -> Option<PipelineStage> {
        use PipelineStage::*;
        match self {
            Idle => Some(Extracting),
            Extracting => Some(GeneratingPayloads),
            GeneratingPayloads => Some(Fuzzing),
            Fuzzing => Some(Classifying),
            Classifying => Some(Reporting),
            Reporting => Some(Done),
            Done | Failed => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineStage::Done | PipelineStage::Failed)
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PipelineStage::Idle => "Idle",
            PipelineStage::Extracting => "Extracting",
            PipelineStage::GeneratingPayloads => "GeneratingPayloads",
            PipelineStage::Fuzzing => "Fuzzing",
            PipelineStage::Classifying => "Classifying",
            PipelineStage::Reporting => "Reporting",
            PipelineStage::Done => "Done",
            PipelineStage::Failed => "Failed",
        };
        write!(f, "{}", label)
    }
}

/// Tracks the current stage and refuses anything but forward steps or a
/// jump to `Failed` from a non-terminal stage.
#[derive(Debug)]
pub struct StageTracker {
    current: PipelineStage,
}

impl StageTracker {
    pub fn new() -> Self {
        Self {
            current: PipelineStage::Idle,
        }
    }

    pub fn current(&self) -> PipelineStage {
        self.current
    }

    /// Moves to the next stage. Returns the new stage, or `None` when the
    /// tracker is already terminal.
    pub fn advance(&mut self) -> Option<PipelineStage> {
        let next = self.current.next()?;
        self.current = next;
        Some(next)
    }

    /// Moves to `Failed`, returning the stage that failed.
    pub fn fail(&mut self) -> Option<PipelineStage> {
        if self.current.is_terminal() {
            return None;
        }
        let at = self.current;
        self.current = PipelineStage::Failed;
        Some(at)
    }
}

impl Default for StageTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Counters collected over a run, reported whatever the outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub endpoints: usize,
    pub skipped_files: usize,
    pub degraded_generations: usize,
    pub tasks: usize,
    pub request_failures: usize,
    pub errors_detected: usize,
}

#[derive(Debug)]
pub enum RunOutcome {
    Done {
        location: PathBuf,
        summary: RunSummary,
    },
    Failed {
        stage: PipelineStage,
        error: PipelineError,
        summary: RunSummary,
    },
}

impl RunOutcome {
    pub fn summary(&self) -> &RunSummary {
        match self {
            RunOutcome::Done { summary, .. } | RunOutcome::Failed { summary, .. } => summary,
        }
    }

    pub fn location(&self) -> Option<&PathBuf> {
        match self {
            RunOutcome::Done { location, .. } => Some(location),
            RunOutcome::Failed { .. } => None,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, RunOutcome::Done { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, RunOutcome::Failed { error, .. } if error.is_cancelled())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_order() {
        let mut tracker = StageTracker::new();
        let mut seen = vec![tracker.current()];
        while let Some(stage) = tracker.advance() {
            seen.push(stage);
        }
        assert_eq!(
            seen,
            vec![
                PipelineStage::Idle,
                PipelineStage::Extracting,
                PipelineStage::GeneratingPayloads,
                PipelineStage::Fuzzing,
                PipelineStage::Classifying,
                PipelineStage::Reporting,
                PipelineStage::Done,
            ]
        );
        assert_eq!(tracker.fail(), None);
    }

    #[test]
    fn test_fail_reports_originating_stage() {
        let mut tracker = StageTracker::new();
        tracker.advance();
        tracker.advance();
        assert_eq!(tracker.fail(), Some(PipelineStage::GeneratingPayloads));
        assert_eq!(tracker.current(), PipelineStage::Failed);
        assert_eq!(tracker.advance(), None);
        assert_eq!(tracker.fail(), None);
    }

    #[test]
    fn test_outcome_accessors() {
        let outcome = RunOutcome::Failed {
            stage: PipelineStage::Fuzzing,
            error: PipelineError::Cancelled,
            summary: RunSummary::default(),
        };
        assert!(outcome.is_cancelled());
        assert!(!outcome.is_done());
        assert!(outcome.location().is_none());
    }
}
