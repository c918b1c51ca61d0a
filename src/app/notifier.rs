use crate::app::error::CombineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

/// Receives the non-fatal failures of the engine and the watch layer.
pub trait Notifier: Send + Sync {
    fn notify(&self, severity: Severity, error: &CombineError);
}

impl<F> Notifier for F
where
    F: Fn(Severity, &CombineError) + Send + Sync,
{
    fn notify(&self, severity: Severity, error: &CombineError) {
        self(severity, error)
    }
}

/// Default notifier: forwards everything to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, severity: Severity, error: &CombineError) {
        match severity {
            Severity::Warning => log::warn!("⚠️ {error}"),
            Severity::Error => log::error!("❌ {error}"),
        }
    }
}
