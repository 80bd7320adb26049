//! Progress-callback trait for pipeline stage events.
//!
//! Inject an [`Arc<dyn PipelineProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] to receive
//! events as a job moves through extraction, generation and compilation.
//! The CLI renders them with a spinner; a service would forward them to its
//! job-status channel.

use crate::job::{JobId, JobStatus};
use std::fmt;
use std::sync::Arc;

/// A pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Extraction,
    Generation,
    Compilation,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Extraction => "extraction",
            Stage::Generation => "generation",
            Stage::Compilation => "compilation",
        })
    }
}

/// Called by the pipeline as a job advances.
///
/// Implementations must be `Send + Sync`: independent jobs run concurrently
/// and may report through the same callback. All methods default to no-ops.
pub trait PipelineProgressCallback: Send + Sync {
    fn on_stage_start(&self, job_id: &JobId, stage: Stage) {
        let _ = (job_id, stage);
    }

    /// `detail` is a short human-readable summary (e.g. "4 chunks").
    fn on_stage_complete(&self, job_id: &JobId, stage: Stage, detail: &str) {
        let _ = (job_id, stage, detail);
    }

    /// Before each completion call. `depth` is 0 for top-level chunks and
    /// grows with each adaptive split.
    fn on_chunk_start(&self, job_id: &JobId, chunk_index: usize, total_chunks: usize, depth: usize) {
        let _ = (job_id, chunk_index, total_chunks, depth);
    }

    /// After a top-level chunk (including any re-splits) is done.
    /// `questions` is the number of question markers in its output.
    fn on_chunk_complete(
        &self,
        job_id: &JobId,
        chunk_index: usize,
        total_chunks: usize,
        questions: usize,
    ) {
        let _ = (job_id, chunk_index, total_chunks, questions);
    }

    /// Once, when the job reaches `ready` or `failed`.
    fn on_job_finished(&self, job_id: &JobId, status: JobStatus, error: Option<&str>) {
        let _ = (job_id, status, error);
    }
}

/// Used when no callback is configured.
pub struct NoopProgressCallback;

impl PipelineProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn PipelineProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counting {
        stages: AtomicUsize,
        chunks: AtomicUsize,
        finished: AtomicUsize,
    }

    impl PipelineProgressCallback for Counting {
        fn on_stage_complete(&self, _job_id: &JobId, _stage: Stage, _detail: &str) {
            self.stages.fetch_add(1, Ordering::SeqCst);
        }

        fn on_chunk_complete(&self, _: &JobId, _: usize, _: usize, _: usize) {
            self.chunks.fetch_add(1, Ordering::SeqCst);
        }

        fn on_job_finished(&self, _job_id: &JobId, _status: JobStatus, _error: Option<&str>) {
            self.finished.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        let id = JobId::from("j");
        cb.on_stage_start(&id, Stage::Extraction);
        cb.on_chunk_start(&id, 1, 2, 0);
        cb.on_job_finished(&id, JobStatus::Failed, Some("boom"));
    }

    #[test]
    fn overridden_methods_receive_events() {
        let cb = Arc::new(Counting::default());
        let dyn_cb: ProgressCallback = cb.clone();
        let id = JobId::from("j");

        dyn_cb.on_stage_complete(&id, Stage::Generation, "2 chunks");
        dyn_cb.on_chunk_complete(&id, 1, 2, 4);
        dyn_cb.on_chunk_complete(&id, 2, 2, 1);
        dyn_cb.on_job_finished(&id, JobStatus::Ready, None);

        assert_eq!(cb.stages.load(Ordering::SeqCst), 1);
        assert_eq!(cb.chunks.load(Ordering::SeqCst), 2);
        assert_eq!(cb.finished.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stage_display() {
        assert_eq!(Stage::Compilation.to_string(), "compilation");
    }
}
