use crate::escalation::EscalationObserver;
use crate::messages::*;
use crate::r;
use std::io::Write;

pub fn stage_label(stage: EscalationStage) -> &'static str {
    match stage {
        EscalationStage::Normal => r::IDS_STAGE_NORMAL.get(),
        EscalationStage::Elevated => r::IDS_STAGE_ELEVATED.get(),
        EscalationStage::AlternateUser => r::IDS_STAGE_ALTERNATE_USER.get(),
    }
}

pub fn status_label(status: StageStatus) -> &'static str {
    match status {
        StageStatus::Pending => r::IDS_STATUS_PENDING.get(),
        StageStatus::Running => r::IDS_STATUS_RUNNING.get(),
        StageStatus::Succeeded => r::IDS_STATUS_SUCCEEDED.get(),
        StageStatus::Failed => r::IDS_STATUS_FAILED.get(),
    }
}

/// Writes escalation progress to the console (stderr by default, so stdout
/// stays clean for the payload's own output).
pub struct ConsoleObserver<W: Write> {
    out: W,
}

impl ConsoleObserver<std::io::Stderr> {
    pub fn new() -> Self {
        Self::with_writer(std::io::stderr())
    }
}

impl Default for ConsoleObserver<std::io::Stderr> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write> ConsoleObserver<W> {
    pub fn with_writer(out: W) -> Self {
        Self { out }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }
}

// Nothing useful to do if the console itself is gone, so write errors are
// dropped.
impl<W: Write> EscalationObserver for ConsoleObserver<W> {
    fn stage_status(&mut self, stage: EscalationStage, status: StageStatus) {
        // Every stage starts out pending; printing that is just noise.
        if status == StageStatus::Pending {
            return;
        }
        _ = writeln!(
            self.out,
            "[{}/{}] {}: {}",
            stage.index(),
            EscalationStage::ALL.len(),
            stage_label(stage),
            status_label(status)
        );
    }

    fn status(&mut self, title: &str, message: &str, severity: Severity) {
        _ = match severity {
            Severity::Info | Severity::Success => writeln!(self.out, "{message}"),
            Severity::Warning => writeln!(self.out, "warning: {message}"),
            // The final "go find an administrator" notice. Make it stand out.
            Severity::Error => writeln!(self.out, "\n{title}\n{message}"),
        };
    }

    fn finished(&mut self, _outcome: EscalationOutcome) {
        _ = self.out.flush();
    }
}
