//! Interactive confirmation of uploaded steps

use async_trait::async_trait;
use std::io::{self, BufRead, Write};
use tokio::sync::oneshot;

/// Asks the user yes/no questions
#[async_trait]
pub trait Prompter: Send + Sync {
    /// Returns true when the user agrees
    async fn confirm(&self, question: &str) -> bool;
}

/// Reads answers from stdin
///
/// The read runs on a detached thread, so an abandoned prompt does not keep
/// the runtime from shutting down.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdinPrompter;

#[async_trait]
impl Prompter for StdinPrompter {
    async fn confirm(&self, question: &str) -> bool {
        let question = question.to_string();
        let (tx, rx) = oneshot::channel();
        std::thread::spawn(move || {
            let _ = tx.send(read_answer(&question));
        });

        match rx.await {
            Ok(Ok(line)) => is_yes(&line),
            Ok(Err(e)) => {
                tracing::warn!("Failed to read answer: {}", e);
                false
            }
            Err(_) => {
                tracing::warn!("Prompt thread exited without an answer");
                false
            }
        }
    }
}

fn read_answer(question: &str) -> io::Result<String> {
    {
        let mut stderr = io::stderr().lock();
        write!(stderr, "{} [y/N] ", question)?;
        stderr.flush()?;
    }

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line)
}

/// Answers every question the same way
#[derive(Debug, Clone, Copy)]
pub struct FixedPrompter(pub bool);

#[async_trait]
impl Prompter for FixedPrompter {
    async fn confirm(&self, _question: &str) -> bool {
        self.0
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
