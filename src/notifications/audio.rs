//! Terminal bell audio cue

use super::AudioCue;
use std::io::Write;

/// Rings the terminal bell (BEL) on stderr
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalBell;

impl AudioCue for TerminalBell {
    fn play(&self) {
        let mut stderr = std::io::stderr();
        if let Err(e) = stderr.write_all(b"\x07").and_then(|_| stderr.flush()) {
            tracing::debug!(error = %e, "Failed to ring terminal bell");
        }
    }
}
