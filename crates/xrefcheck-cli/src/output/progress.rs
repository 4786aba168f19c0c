//! Live progress display fed from the verifier's shared counters.

use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use xrefcheck_core::SharedProgress;

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template("{prefix:>8} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-")
}

/// Redraws two progress bars from a [`SharedProgress`] about ten times a
/// second until told to stop.
pub struct ProgressDisplay {
    stop: CancellationToken,
    handle: JoinHandle<()>,
}

impl ProgressDisplay {
    pub fn spawn(progress: SharedProgress) -> Self {
        let multi = MultiProgress::new();
        let local = multi.add(ProgressBar::new(0));
        local.set_style(bar_style());
        local.set_prefix("local");
        let external = multi.add(ProgressBar::new(0));
        external.set_style(bar_style());
        external.set_prefix("external");

        let stop = CancellationToken::new();
        let worker_stop = stop.clone();
        let handle = tokio::spawn(async move {
            loop {
                redraw(&progress, &local, &external);
                tokio::select! {
                    () = worker_stop.cancelled() => break,
                    () = tokio::time::sleep(Duration::from_millis(100)) => {}
                }
            }
            redraw(&progress, &local, &external);
            local.finish_and_clear();
            external.finish_and_clear();
        });
        Self { stop, handle }
    }

    /// Stop sampling and clear the bars.
    pub async fn finish(self) {
        self.stop.cancel();
        let _ = self.handle.await;
    }
}

fn redraw(progress: &SharedProgress, local: &ProgressBar, external: &ProgressBar) {
    let snapshot = match progress.lock() {
        Ok(guard) => *guard,
        Err(_) => return,
    };
    local.set_length(snapshot.local.total);
    local.set_position(snapshot.local.done);
    if snapshot.local.errors > 0 {
        local.set_message(format!("{} failed", snapshot.local.errors));
    }
    external.set_length(snapshot.external.total);
    external.set_position(snapshot.external.done);
    let pending_retries = snapshot
        .external_fixable
        .total
        .saturating_sub(snapshot.external_fixable.done);
    let mut message = String::new();
    if snapshot.external.errors > 0 {
        message.push_str(&format!("{} failed", snapshot.external.errors));
    }
    if pending_retries > 0 {
        if !message.is_empty() {
            message.push_str(", ");
        }
        message.push_str(&format!("{pending_retries} rate limited"));
    }
    external.set_message(message);
}
