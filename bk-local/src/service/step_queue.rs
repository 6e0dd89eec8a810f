//! Step Queue
//!
//! Buffer of steps from pipeline uploads, drained by the main loop.

use bk_core::domain::pipeline::{PipelineUpload, Step};
use std::collections::VecDeque;
use std::sync::Mutex;

use super::lock;

/// A pending step together with the env of the pipeline it came from
#[derive(Debug, Clone, PartialEq)]
pub struct StepEntry {
    pub step: Step,
    /// Pipeline env as `KEY=VALUE` strings
    pub inherited_env: Vec<String>,
}

#[derive(Debug, Default)]
pub struct StepQueue {
    entries: Mutex<VecDeque<StepEntry>>,
}

impl StepQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the upload's steps after everything already pending
    pub fn append(&self, upload: PipelineUpload) {
        let mut entries = lock(&self.entries);
        entries.extend(Self::entries_of(upload));
    }

    /// Discards every pending step, then adds the upload's steps
    pub fn replace(&self, upload: PipelineUpload) {
        let mut entries = lock(&self.entries);
        let dropped = entries.len();
        entries.clear();
        entries.extend(Self::entries_of(upload));
        if dropped > 0 {
            tracing::info!("Replaced {} pending steps", dropped);
        }
    }

    /// Pops the oldest pending step
    pub fn next(&self) -> Option<StepEntry> {
        lock(&self.entries).pop_front()
    }

    /// Drops every pending step, returning how many were discarded
    pub fn clear(&self) -> usize {
        let mut entries = lock(&self.entries);
        let dropped = entries.len();
        entries.clear();
        dropped
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.entries).is_empty()
    }

    fn entries_of(upload: PipelineUpload) -> impl Iterator<Item = StepEntry> {
        let env = upload.pipeline.env_vars();
        upload.pipeline.steps.into_iter().map(move |step| StepEntry {
            step,
            inherited_env: env.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bk_core::domain::pipeline::{CommandStep, PipelineDocument, WaitStep};

    fn command(label: &str) -> Step {
        Step::Command(CommandStep {
            label: Some(label.to_string()),
            commands: vec![format!("echo {}", label)],
            ..Default::default()
        })
    }

    fn upload(labels: &[&str], replace: bool) -> PipelineUpload {
        PipelineUpload {
            pipeline: PipelineDocument {
                env: Default::default(),
                steps: labels.iter().map(|label| command(label)).collect(),
            },
            replace,
        }
    }

    fn drain(queue: &StepQueue) -> Vec<Step> {
        std::iter::from_fn(|| queue.next()).map(|e| e.step).collect()
    }

    #[test]
    fn test_append_preserves_order_across_uploads() {
        let queue = StepQueue::new();
        queue.append(upload(&["a", "b"], false));
        queue.append(upload(&["c"], false));

        assert_eq!(drain(&queue), vec![command("a"), command("b"), command("c")]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_replace_discards_pending_steps() {
        let queue = StepQueue::new();
        queue.append(upload(&["a", "b"], false));
        queue.replace(upload(&["c"], true));

        assert_eq!(drain(&queue), vec![command("c")]);
    }

    #[test]
    fn test_entries_inherit_pipeline_env() {
        let queue = StepQueue::new();
        let mut up = upload(&["a"], false);
        up.pipeline.env.insert("Z".to_string(), "1".to_string());
        up.pipeline.env.insert("A".to_string(), "2".to_string());
        up.pipeline.steps.push(Step::Wait(WaitStep::default()));
        queue.append(up);

        assert_eq!(queue.len(), 2);
        let first = queue.next().unwrap();
        assert_eq!(first.inherited_env, vec!["A=2", "Z=1"]);
        let second = queue.next().unwrap();
        assert_eq!(second.step, Step::Wait(WaitStep::default()));
        assert!(queue.next().is_none());
    }

    #[test]
    fn test_clear_reports_dropped_count() {
        let queue = StepQueue::new();
        queue.append(upload(&["a", "b"], false));
        assert_eq!(queue.clear(), 2);
        assert!(queue.is_empty());
    }
}
