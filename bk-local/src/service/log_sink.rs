//! Log sink
//!
//! Destination for job output uploaded by the agent as gzipped chunks.
//! The runner prints to stdout; tests collect output in memory.

use async_trait::async_trait;
use flate2::read::GzDecoder;
use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use super::lock;

/// Receives decompressed job output
#[async_trait]
pub trait LogSink: Send + Sync {
    /// Writes one chunk of a job's output
    ///
    /// # Arguments
    /// * `job_id` - The job the output belongs to
    /// * `bytes` - Decompressed log bytes
    async fn write_chunk(&self, job_id: Uuid, bytes: &[u8]) -> io::Result<()>;
}

/// Decompresses a gzip log chunk
pub fn gunzip(compressed: &[u8]) -> io::Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(compressed);
    let mut decompressed = Vec::new();
    decoder.read_to_end(&mut decompressed)?;
    Ok(decompressed)
}

/// Writes job output straight to the process stdout
#[derive(Debug, Clone, Copy, Default)]
pub struct StdoutLogSink;

#[async_trait]
impl LogSink for StdoutLogSink {
    async fn write_chunk(&self, _job_id: Uuid, bytes: &[u8]) -> io::Result<()> {
        // Each chunk goes out under a single stdout lock
        let bytes = bytes.to_vec();
        tokio::task::spawn_blocking(move || {
            let mut stdout = io::stdout().lock();
            stdout.write_all(&bytes)?;
            stdout.flush()
        })
        .await
        .map_err(io::Error::other)?
    }
}

/// Collects job output in memory
///
/// Clones share the same buffers.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLogSink {
    output: Arc<Mutex<Vec<u8>>>,
    by_job: Arc<Mutex<HashMap<Uuid, Vec<u8>>>>,
}

impl InMemoryLogSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, in arrival order
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&lock(&self.output)).into_owned()
    }

    /// Output of a single job
    pub fn job_output(&self, job_id: Uuid) -> String {
        lock(&self.by_job)
            .get(&job_id)
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
            .unwrap_or_default()
    }
}

#[async_trait]
impl LogSink for InMemoryLogSink {
    async fn write_chunk(&self, job_id: Uuid, bytes: &[u8]) -> io::Result<()> {
        lock(&self.output).extend_from_slice(bytes);
        lock(&self.by_job)
            .entry(job_id)
            .or_default()
            .extend_from_slice(bytes);
        Ok(())
    }
}
