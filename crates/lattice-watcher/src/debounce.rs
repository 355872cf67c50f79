//! Two-timer debouncer: quiet period plus a hard maximum wait

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::watcher::{ChangeType, FileChange};

/// Quiet period: a flush fires after this much silence.
pub const DEFAULT_QUIET: Duration = Duration::from_millis(1500);
/// Hard ceiling: a busy stream flushes at least this often.
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy)]
pub struct DebounceConfig {
    pub quiet: Duration,
    pub max_wait: Duration,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        DebounceConfig {
            quiet: DEFAULT_QUIET,
            max_wait: DEFAULT_MAX_WAIT,
        }
    }
}

/// One flushed group: every accumulated path of one change type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeGroup {
    pub change_type: ChangeType,
    pub paths: Vec<PathBuf>,
}

/// Pure debouncing state machine. Events reset the quiet timer and arm
/// the max-wait timer if it is not already running; the flush clears
/// both atomically.
pub struct Debouncer {
    config: DebounceConfig,
    pending: BTreeMap<ChangeType, Vec<PathBuf>>,
    quiet_deadline: Option<Instant>,
    max_deadline: Option<Instant>,
}

impl Debouncer {
    pub fn new(config: DebounceConfig) -> Self {
        Debouncer {
            config,
            pending: BTreeMap::new(),
            quiet_deadline: None,
            max_deadline: None,
        }
    }

    pub fn record(&mut self, change: FileChange, now: Instant) {
        self.quiet_deadline = Some(now + self.config.quiet);
        if self.max_deadline.is_none() {
            self.max_deadline = Some(now + self.config.max_wait);
        }
        self.pending
            .entry(change.change_type)
            .or_default()
            .push(change.path);
    }

    /// When the next flush is due: whichever timer fires first.
    pub fn deadline(&self) -> Option<Instant> {
        match (self.quiet_deadline, self.max_deadline) {
            (Some(quiet), Some(max)) => Some(quiet.min(max)),
            (deadline, None) | (None, deadline) => deadline,
        }
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Emit everything accumulated, most-impactful type first (BUILD,
    /// then `.d`, then `.o`), and reset timers and accumulators.
    pub fn flush(&mut self) -> Vec<ChangeGroup> {
        self.quiet_deadline = None;
        self.max_deadline = None;
        std::mem::take(&mut self.pending)
            .into_iter()
            .map(|(change_type, paths)| ChangeGroup { change_type, paths })
            .collect()
    }
}

/// Pump classified changes into the debouncer and emit flushes.
/// Cancellation flushes once more, then ends the task.
pub async fn run_debouncer(
    mut changes: mpsc::UnboundedReceiver<FileChange>,
    config: DebounceConfig,
    cancel: CancellationToken,
    flushes: mpsc::Sender<Vec<ChangeGroup>>,
) {
    let mut debouncer = Debouncer::new(config);
    loop {
        let deadline = debouncer.deadline();
        tokio::select! {
            _ = cancel.cancelled() => {
                if debouncer.has_pending() {
                    let _ = flushes.send(debouncer.flush()).await;
                }
                return;
            }
            change = changes.recv() => {
                match change {
                    Some(change) => debouncer.record(change, Instant::now()),
                    None => {
                        if debouncer.has_pending() {
                            let _ = flushes.send(debouncer.flush()).await;
                        }
                        return;
                    }
                }
            }
            _ = sleep_until_or_forever(deadline) => {
                let groups = debouncer.flush();
                debug!("debounce flush: {} groups", groups.len());
                if flushes.send(groups).await.is_err() {
                    return;
                }
            }
        }
    }
}

async fn sleep_until_or_forever(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn change(change_type: ChangeType, path: &str) -> FileChange {
        FileChange {
            change_type,
            path: Path::new(path).to_path_buf(),
        }
    }

    #[test]
    fn burst_coalesces_into_one_ordered_flush() {
        // Events at t=0 (BUILD), t=0.4s (.d), t=1.0s (.o); silence after.
        let start = Instant::now();
        let mut debouncer = Debouncer::new(DebounceConfig::default());
        debouncer.record(change(ChangeType::BuildFile, "/ws/a/BUILD"), start);
        debouncer.record(
            change(ChangeType::DFile, "/out/x.d"),
            start + Duration::from_millis(400),
        );
        debouncer.record(change(ChangeType::OFile, "/out/x.o"), start + Duration::from_secs(1));

        // Quiet timer resets on every event: due 1.5s after the last.
        assert_eq!(debouncer.deadline(), Some(start + Duration::from_millis(2500)));

        let groups = debouncer.flush();
        assert_eq!(
            groups.iter().map(|g| g.change_type).collect::<Vec<_>>(),
            vec![ChangeType::BuildFile, ChangeType::DFile, ChangeType::OFile]
        );
        assert!(!debouncer.has_pending());
        assert_eq!(debouncer.deadline(), None);
    }

    #[test]
    fn max_wait_caps_a_busy_stream() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(DebounceConfig::default());
        // One event per second keeps resetting the quiet timer.
        for i in 0..20 {
            debouncer.record(
                change(ChangeType::OFile, &format!("/out/{i}.o")),
                start + Duration::from_secs(i),
            );
            let deadline = debouncer.deadline().unwrap();
            assert!(
                deadline <= start + DEFAULT_MAX_WAIT,
                "deadline never exceeds the max-wait ceiling"
            );
        }
    }

    #[test]
    fn flush_is_atomic() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(DebounceConfig::default());
        debouncer.record(change(ChangeType::DFile, "/out/x.d"), start);
        let _ = debouncer.flush();
        // The next event re-arms both timers from scratch.
        let later = start + Duration::from_secs(60);
        debouncer.record(change(ChangeType::OFile, "/out/x.o"), later);
        assert_eq!(debouncer.deadline(), Some(later + DEFAULT_QUIET));
    }

    #[tokio::test(start_paused = true)]
    async fn pump_emits_a_single_flush_for_a_burst() {
        let (change_tx, change_rx) = mpsc::unbounded_channel();
        let (flush_tx, mut flush_rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        let pump = tokio::spawn(run_debouncer(
            change_rx,
            DebounceConfig::default(),
            cancel.clone(),
            flush_tx,
        ));

        change_tx.send(change(ChangeType::BuildFile, "/ws/BUILD")).unwrap();
        tokio::time::sleep(Duration::from_millis(400)).await;
        change_tx.send(change(ChangeType::DFile, "/out/x.d")).unwrap();
        tokio::time::sleep(Duration::from_millis(600)).await;
        change_tx.send(change(ChangeType::OFile, "/out/x.o")).unwrap();

        let groups = flush_rx.recv().await.unwrap();
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].change_type, ChangeType::BuildFile);

        // Silence afterwards: no second flush pending.
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(flush_rx.try_recv().is_err());

        cancel.cancel();
        pump.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_flushes_once() {
        let (change_tx, change_rx) = mpsc::unbounded_channel();
        let (flush_tx, mut flush_rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        let pump = tokio::spawn(run_debouncer(
            change_rx,
            DebounceConfig::default(),
            cancel.clone(),
            flush_tx,
        ));

        change_tx.send(change(ChangeType::OFile, "/out/x.o")).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();
        let groups = flush_rx.recv().await.unwrap();
        assert_eq!(groups.len(), 1);
        assert!(flush_rx.recv().await.is_none());
        pump.await.unwrap();
    }
}
