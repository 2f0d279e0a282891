//! Progress bar for batch processing, with log lines printed above it.
//!
//! All bars share one `MultiProgress`; `LogWriterFactory` routes
//! tracing output through it so log lines never tear the bar.

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::io::{self, Write};
use std::sync::OnceLock;
use std::time::Duration;
use tracing_subscriber::fmt::MakeWriter;

const BAR_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} {msg}";

static MULTI_PROGRESS: OnceLock<MultiProgress> = OnceLock::new();

fn multi_progress() -> &'static MultiProgress {
    MULTI_PROGRESS.get_or_init(|| {
        let mp = MultiProgress::new();
        mp.set_draw_target(ProgressDrawTarget::stderr_with_hz(10));
        mp
    })
}

/// Start a document progress bar; `None` when there is nothing to count
pub fn start_progress_bar(len: usize, message: &str) -> Option<ProgressBar> {
    if len == 0 {
        return None;
    }

    let style = ProgressStyle::with_template(BAR_TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");

    let pb = multi_progress().add(ProgressBar::new(len as u64));
    pb.set_style(style);
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    Some(pb)
}

/// `MakeWriter` for tracing-subscriber that prints above active bars
#[derive(Default, Clone)]
pub struct LogWriterFactory;

impl<'a> MakeWriter<'a> for LogWriterFactory {
    type Writer = LogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogWriter::default()
    }
}

/// Buffers bytes and emits whole lines
#[derive(Default)]
pub struct LogWriter {
    pending: String,
}

impl LogWriter {
    /// Remove and return every complete line in the buffer
    fn take_lines(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(idx) = self.pending.find('\n') {
            lines.push(self.pending[..idx].trim_end_matches('\r').to_string());
            self.pending.drain(..=idx);
        }
        lines
    }

    fn emit(line: String) {
        let _ = multi_progress().println(line);
    }
}

impl Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pending.push_str(&String::from_utf8_lossy(buf));
        for line in self.take_lines() {
            Self::emit(line);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if !self.pending.is_empty() {
            let rest = std::mem::take(&mut self.pending);
            Self::emit(rest.trim_end_matches('\r').to_string());
        }
        Ok(())
    }
}

impl Drop for LogWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}
