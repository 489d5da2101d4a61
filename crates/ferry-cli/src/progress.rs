//! Terminal progress reporting, driven by [`ferry_core::events::Event`].

use indicatif::{ProgressBar, ProgressStyle};

/// A progress bar tracking bytes transferred against a known total.
pub struct TransferProgress {
    bar: ProgressBar,
}

impl TransferProgress {
    /// Build a bar for a transfer of `total_bytes`.
    #[must_use]
    pub fn new(total_bytes: u64) -> Self {
        let bar = ProgressBar::new(total_bytes);
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
        );
        Self { bar }
    }

    /// A handle that can be moved into an event-dispatcher subscriber
    /// closure.
    #[must_use]
    pub fn handle(&self) -> ProgressBar {
        self.bar.clone()
    }

    /// Update the bar's position to `bytes_written`.
    pub fn set_position(&self, bytes_written: u64) {
        self.bar.set_position(bytes_written);
    }

    /// Mark the bar complete with a final message.
    pub fn finish(&self, message: impl Into<String>) {
        self.bar.finish_with_message(message.into());
    }

    /// Remove the bar, e.g. after a failure where a finished bar would be
    /// misleading.
    pub fn abandon(&self, message: impl Into<String>) {
        self.bar.abandon_with_message(message.into());
    }
}

/// Render a byte count as a human-readable size (`1.5 MiB`, etc).
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} {}", UNITS[unit])
    } else {
        format!("{value:.2} {}", UNITS[unit])
    }
}
