//! Console output: SQL on stdout, fill progress on stderr.

use indicatif::{ProgressBar, ProgressStyle};
use partwise_core::OutputSink;
use std::sync::Mutex;

/// Prints statements to stdout and tracks fill batches with a progress bar.
pub struct ConsoleSink {
    bar: Mutex<Option<ProgressBar>>,
}

impl ConsoleSink {
    /// Create a sink with no progress bar showing.
    pub fn new() -> Self {
        ConsoleSink {
            bar: Mutex::new(None),
        }
    }

    fn new_bar(total: u64) -> ProgressBar {
        let bar = ProgressBar::new(total);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} batches ({percent}%) | {elapsed_precise}")
            .map(|style| style.progress_chars("#>-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style);
        bar
    }
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputSink for ConsoleSink {
    fn statement(&self, sql: &str) {
        let text = format!("{}\n", sql);
        if let Ok(guard) = self.bar.lock() {
            // keep the bar below the SQL while it is drawn
            if let Some(bar) = guard.as_ref() {
                bar.println(text);
                return;
            }
        }
        println!("{}", text);
    }

    fn batch_finished(&self, batch: u64, total: u64) {
        let Ok(mut guard) = self.bar.lock() else {
            return;
        };
        let bar = guard.get_or_insert_with(|| Self::new_bar(total));
        bar.set_position(batch);
        if batch >= total {
            bar.finish_and_clear();
            *guard = None;
        }
    }
}
