//! User-facing output, kept separate from tracing diagnostics

use std::io::{self, Write};
use std::sync::Mutex;

/// Destination for text meant for the operator rather than the log
pub trait OutputWriter: Send + Sync {
    /// Write a full line
    fn line(&self, text: &str);

    /// Write text without a trailing newline and flush, for prompts
    fn prompt(&self, text: &str);
}

/// Writes to stdout
#[derive(Debug, Default, Clone, Copy)]
pub struct Console;

impl OutputWriter for Console {
    fn line(&self, text: &str) {
        let mut stdout = io::stdout().lock();
        let _ = writeln!(stdout, "{}", text);
    }

    fn prompt(&self, text: &str) {
        let mut stdout = io::stdout().lock();
        let _ = write!(stdout, "{}", text);
        let _ = stdout.flush();
    }
}

/// Captures output in memory
#[derive(Debug, Default)]
pub struct MemoryOutput {
    lines: Mutex<Vec<String>>,
}

impl MemoryOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().map(|l| l.clone()).unwrap_or_default()
    }
}

impl OutputWriter for MemoryOutput {
    fn line(&self, text: &str) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(text.to_string());
        }
    }

    fn prompt(&self, text: &str) {
        self.line(text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_output_records_lines_and_prompts() {
        let output = MemoryOutput::new();
        output.line("first");
        output.prompt("Move Email? ");
        assert_eq!(output.lines(), vec!["first", "Move Email? "]);
    }
}
