//! Shared test doubles.

#![allow(dead_code)]

use std::sync::Mutex;

use armount::exec::{Executor, HostCommand};
use armount::report::Reporter;
use armount_common::{ArmountError, ArmountResult};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

type Predicate = Box<dyn Fn(&str) -> bool + Send + Sync>;

/// Records every command and fails or cancels the ones matching a predicate.
#[derive(Default)]
pub struct RecordingExecutor {
    commands: Mutex<Vec<String>>,
    fail_when: Option<Predicate>,
    cancel_when: Option<(Predicate, CancellationToken)>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail commands whose rendered line satisfies `predicate`.
    pub fn failing(mut self, predicate: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        self.fail_when = Some(Box::new(predicate));
        self
    }

    /// Fire `token` and report cancellation for commands matching `predicate`.
    pub fn cancelling(
        mut self,
        predicate: impl Fn(&str) -> bool + Send + Sync + 'static,
        token: CancellationToken,
    ) -> Self {
        self.cancel_when = Some((Box::new(predicate), token));
        self
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }
}

#[async_trait]
impl Executor for RecordingExecutor {
    async fn run(&self, command: &HostCommand, cancel: &CancellationToken) -> ArmountResult<()> {
        let line = command.to_string();
        self.commands.lock().unwrap().push(line.clone());

        if let Some((predicate, token)) = &self.cancel_when {
            if predicate(&line) {
                token.cancel();
            }
        }
        if cancel.is_cancelled() {
            return Err(ArmountError::Cancelled { command: line });
        }
        if self.fail_when.as_ref().is_some_and(|p| p(&line)) {
            return Err(ArmountError::CommandFailed {
                command: line,
                status: "exit status: 32".to_string(),
            });
        }
        Ok(())
    }
}

/// Keeps every reported line, prefixed by its level.
#[derive(Default)]
pub struct MemoryReporter {
    lines: Mutex<Vec<String>>,
}

impl MemoryReporter {
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter_map(|l| l.strip_prefix("error: ").map(str::to_string))
            .collect()
    }
}

impl Reporter for MemoryReporter {
    fn say(&self, message: &str) {
        self.lines.lock().unwrap().push(format!("say: {message}"));
    }

    fn message(&self, message: &str) {
        self.lines.lock().unwrap().push(format!("message: {message}"));
    }

    fn error(&self, message: &str) {
        self.lines.lock().unwrap().push(format!("error: {message}"));
    }
}
