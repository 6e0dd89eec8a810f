//! Pipeline upload ingestion
//!
//! Single consumer of the upload channel. Uploads are applied to the step
//! queue in the order the server received them.

use bk_core::domain::pipeline::{PipelineUpload, Step};
use regex::Regex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc;

use super::StepQueue;

pub struct UploadIngester {
    queue: Arc<StepQueue>,
    step_filter: Option<Regex>,
    in_flight: Arc<AtomicUsize>,
}

impl UploadIngester {
    /// Creates an ingester feeding `queue`
    ///
    /// `in_flight` is incremented by the sender for each upload and
    /// decremented here once the upload has reached the queue.
    pub fn new(
        queue: Arc<StepQueue>,
        step_filter: Option<Regex>,
        in_flight: Arc<AtomicUsize>,
    ) -> Self {
        Self {
            queue,
            step_filter,
            in_flight,
        }
    }

    /// Drains the channel until every sender is dropped
    pub async fn run(self, mut uploads: mpsc::Receiver<PipelineUpload>) {
        while let Some(upload) = uploads.recv().await {
            self.apply(upload);
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
        tracing::debug!("Upload channel closed");
    }

    /// Filters an upload and appends or replaces it into the queue
    pub fn apply(&self, mut upload: PipelineUpload) {
        if let Some(filter) = &self.step_filter {
            upload.pipeline.steps.retain(|step| {
                let keep = step_matches(step, filter);
                if !keep {
                    tracing::info!("Skipping {} step filtered out by {}", describe(step), filter);
                }
                keep
            });
        }

        tracing::info!(
            "Pipeline upload with {} steps (replace: {})",
            upload.pipeline.steps.len(),
            upload.replace
        );

        if upload.replace {
            self.queue.replace(upload);
        } else {
            self.queue.append(upload);
        }
    }
}

/// Command steps must match by label, or by script when unlabeled
fn step_matches(step: &Step, filter: &Regex) -> bool {
    match step {
        Step::Command(command) => filter.is_match(&command.display_label()),
        _ => true,
    }
}

fn describe(step: &Step) -> String {
    match step {
        Step::Command(command) => format!("'{}'", command.display_label()),
        other => other.kind().to_string(),
    }
}
