//! Operator-facing progress reporting.

use console::style;

/// Sink for progress and error messages shown to the operator.
pub trait Reporter: Send + Sync {
    /// Announce a phase.
    fn say(&self, message: &str);

    /// Report detail within a phase.
    fn message(&self, message: &str);

    /// Report an error.
    fn error(&self, message: &str);
}

/// Styled output on stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleReporter;

impl Reporter for ConsoleReporter {
    fn say(&self, message: &str) {
        eprintln!("{} {message}", style("==>").green().bold());
    }

    fn message(&self, message: &str) {
        eprintln!("    {message}");
    }

    fn error(&self, message: &str) {
        eprintln!("{} {message}", style("error:").red().bold());
    }
}

/// Reports through `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn say(&self, message: &str) {
        tracing::info!("{message}");
    }

    fn message(&self, message: &str) {
        tracing::debug!("{message}");
    }

    fn error(&self, message: &str) {
        tracing::error!("{message}");
    }
}
