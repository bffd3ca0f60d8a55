//! Post-commit notifications.
//!
//! Transactions append [`Notification`]s to the `outbox` tree; an
//! [`OutboxDispatcher`] delivers them afterwards, either inline after each
//! commit or from its own thread (see [`OutboxDispatcher::spawn`]). Delivery
//! is best effort: a sink failure is logged and retried a bounded number of
//! times, and never reaches back into trade state.
use super::config::OutboxSection;
use super::error::TradeError;
use super::store::{decode, encode};
use super::trade::Trade;
use parking_lot::{Condvar, Mutex};
use sled::Tree;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    #[n(0)]
    Proposed,
    #[n(1)]
    Accepted,
    #[n(2)]
    Rejected,
    #[n(3)]
    Countered,
    #[n(4)]
    Cancelled,
    #[n(5)]
    Expired,
    #[n(6)]
    Vetoed,
    #[n(7)]
    Executed,
    #[n(8)]
    ExecutionFailed,
    #[n(9)]
    Overridden,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    #[n(0)]
    pub kind: NotificationKind,
    #[n(1)]
    pub trade_id: String,
    #[n(2)]
    pub league_id: String,
    #[n(3)]
    pub recipients: Vec<String>, // team ids
    #[n(4)]
    pub message: String,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone)]
pub(crate) struct OutboxRecord {
    #[n(0)]
    notification: Notification,
    #[n(1)]
    attempts: u32,
}

/// Delivery channel for notifications (push, email, chat...).
pub trait NotificationSink: Send + Sync {
    fn emit(&self, notification: &Notification) -> anyhow::Result<()>;
}

/// Keeps everything it is given. Handy for tests and local runs.
#[derive(Default)]
pub struct RecordingSink {
    delivered: Mutex<Vec<Notification>>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    pub delivered: usize,
    pub retried: usize,
    pub dropped: usize,
}

pub struct OutboxDispatcher {
    outbox: Tree,
    sink: Arc<dyn NotificationSink>,
    config: OutboxSection,
    draining: Mutex<()>,
    woken: Mutex<bool>,
    wakeup: Condvar,
}

/// Dispatcher thread started by [`OutboxDispatcher::spawn`]. Dropping the
/// handle asks the thread to stop.
pub struct DispatcherHandle {
    dispatcher: Arc<OutboxDispatcher>,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl Notification {
    pub fn to_parties(kind: NotificationKind, trade: &Trade, message: impl Into<String>) -> Self {
        Self {
            kind,
            trade_id: trade.id.clone(),
            league_id: trade.league_id.clone(),
            recipients: trade.parties().iter().map(|t| t.to_string()).collect(),
            message: message.into(),
        }
    }

    pub fn to_team(
        kind: NotificationKind,
        trade: &Trade,
        team_id: &str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            trade_id: trade.id.clone(),
            league_id: trade.league_id.clone(),
            recipients: vec![team_id.to_string()],
            message: message.into(),
        }
    }
}

impl OutboxRecord {
    pub(crate) fn new(notification: Notification) -> Self {
        Self {
            notification,
            attempts: 0,
        }
    }
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn notifications(&self) -> Vec<Notification> {
        self.delivered.lock().clone()
    }
    pub fn kinds_for(&self, trade_id: &str) -> Vec<NotificationKind> {
        self.delivered
            .lock()
            .iter()
            .filter(|n| n.trade_id == trade_id)
            .map(|n| n.kind)
            .collect()
    }
}

impl NotificationSink for RecordingSink {
    fn emit(&self, notification: &Notification) -> anyhow::Result<()> {
        self.delivered.lock().push(notification.clone());
        Ok(())
    }
}

impl OutboxDispatcher {
    pub fn new(
        instance: &sled::Db,
        sink: Arc<dyn NotificationSink>,
        config: OutboxSection,
    ) -> Result<Self, TradeError> {
        Ok(Self {
            outbox: instance.open_tree("outbox")?,
            sink,
            config,
            draining: Mutex::new(()),
            woken: Mutex::new(false),
            wakeup: Condvar::new(),
        })
    }

    pub fn pending(&self) -> usize {
        self.outbox.len()
    }

    /// Delivers up to `batch_size` queued notifications in commit order.
    pub fn drain(&self) -> Result<DrainReport, TradeError> {
        // One drainer at a time, or a notification could go out twice.
        let _guard = self.draining.lock();
        let mut report = DrainReport::default();

        let batch = self
            .outbox
            .iter()
            .take(self.config.batch_size)
            .collect::<Result<Vec<_>, _>>()?;

        for (key, bytes) in batch {
            let mut record: OutboxRecord = match decode(&bytes) {
                Ok(record) => record,
                Err(err) => {
                    tracing::error!(error = %err, "dropping undecodable outbox record");
                    self.outbox.remove(&key)?;
                    report.dropped += 1;
                    continue;
                }
            };

            match self.sink.emit(&record.notification) {
                Ok(()) => {
                    self.outbox.remove(&key)?;
                    report.delivered += 1;
                }
                Err(err) => {
                    record.attempts += 1;
                    if record.attempts >= self.config.max_attempts {
                        tracing::error!(
                            trade_id = %record.notification.trade_id,
                            kind = ?record.notification.kind,
                            attempts = record.attempts,
                            error = %err,
                            "notification dropped"
                        );
                        self.outbox.remove(&key)?;
                        report.dropped += 1;
                    } else {
                        tracing::warn!(
                            trade_id = %record.notification.trade_id,
                            kind = ?record.notification.kind,
                            attempts = record.attempts,
                            error = %err,
                            "notification delivery failed"
                        );
                        self.outbox.insert(&key, encode(&record)?)?;
                        report.retried += 1;
                    }
                }
            }
        }

        Ok(report)
    }

    /// Tell the dispatcher thread that new rows were committed. Never blocks
    /// on delivery.
    pub fn wake(&self) {
        *self.woken.lock() = true;
        self.wakeup.notify_one();
    }

    fn wait_for_work(&self, poll: Duration) {
        let mut woken = self.woken.lock();
        if !*woken {
            self.wakeup.wait_for(&mut woken, poll);
        }
        *woken = false;
    }

    /// Drain whenever woken, and every `poll` for retries, until `stop` is set.
    pub fn run_until(&self, stop: &AtomicBool, poll: Duration) {
        tracing::info!(poll_ms = poll.as_millis() as u64, "outbox dispatcher started");
        while !stop.load(Ordering::Relaxed) {
            self.wait_for_work(poll);
            loop {
                match self.drain() {
                    // A full batch left the queue; there may be more behind it.
                    Ok(report) if report.delivered + report.dropped >= self.config.batch_size => {}
                    Ok(_) => break,
                    Err(err) => {
                        tracing::error!(error = %err, "outbox drain failed");
                        break;
                    }
                }
            }
        }
        tracing::info!("outbox dispatcher stopped");
    }

    pub fn spawn(self: Arc<Self>) -> std::io::Result<DispatcherHandle> {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let poll = Duration::from_millis(self.config.poll_interval_ms.max(1));
        let dispatcher = Arc::clone(&self);
        let thread = std::thread::Builder::new()
            .name("outbox-dispatcher".to_string())
            .spawn(move || dispatcher.run_until(&flag, poll))?;
        Ok(DispatcherHandle {
            dispatcher: self,
            stop,
            thread: Some(thread),
        })
    }
}

impl DispatcherHandle {
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
        self.dispatcher.wake();
    }

    /// Stop and wait for the drain in progress to finish.
    pub fn join(mut self) -> anyhow::Result<()> {
        self.stop();
        match self.thread.take() {
            Some(thread) => thread
                .join()
                .map_err(|_| anyhow::anyhow!("outbox dispatcher thread panicked")),
            None => Ok(()),
        }
    }
}

impl Drop for DispatcherHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FailingSink {
        calls: AtomicUsize,
    }

    impl NotificationSink for FailingSink {
        fn emit(&self, _: &Notification) -> anyhow::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("smtp unavailable")
        }
    }

    fn enqueue(outbox: &Tree, id: u64, trade_id: &str) {
        let record = OutboxRecord::new(Notification {
            kind: NotificationKind::Proposed,
            trade_id: trade_id.into(),
            league_id: "l".into(),
            recipients: vec!["t2".into()],
            message: "new proposal".into(),
        });
        outbox
            .insert(id.to_be_bytes(), encode(&record).unwrap())
            .unwrap();
    }

    #[test]
    fn delivers_in_order_and_empties_outbox() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let db = sled::open(dir.path().join("outbox.db"))?;
        let sink = Arc::new(RecordingSink::new());
        let dispatcher = OutboxDispatcher::new(&db, sink.clone(), OutboxSection::default())?;

        enqueue(&dispatcher.outbox, 1, "trade_a");
        enqueue(&dispatcher.outbox, 2, "trade_b");

        let report = dispatcher.drain()?;
        assert_eq!(report.delivered, 2);
        assert_eq!(dispatcher.pending(), 0);

        let ids: Vec<_> = sink
            .notifications()
            .into_iter()
            .map(|n| n.trade_id)
            .collect();
        assert_eq!(ids, vec!["trade_a".to_string(), "trade_b".to_string()]);
        Ok(())
    }

    #[test]
    fn failing_sink_is_retried_then_dropped() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let db = sled::open(dir.path().join("outbox.db"))?;
        let sink = Arc::new(FailingSink {
            calls: AtomicUsize::new(0),
        });
        let config = OutboxSection {
            batch_size: 10,
            max_attempts: 2,
            ..OutboxSection::default()
        };
        let dispatcher = OutboxDispatcher::new(&db, sink.clone(), config)?;
        enqueue(&dispatcher.outbox, 1, "trade_a");

        let first = dispatcher.drain()?;
        assert_eq!(first.retried, 1);
        assert_eq!(dispatcher.pending(), 1);

        let second = dispatcher.drain()?;
        assert_eq!(second.dropped, 1);
        assert_eq!(dispatcher.pending(), 0);
        assert_eq!(sink.calls.load(Ordering::SeqCst), 2);
        Ok(())
    }

    struct SlowSink {
        inner: RecordingSink,
    }

    impl NotificationSink for SlowSink {
        fn emit(&self, notification: &Notification) -> anyhow::Result<()> {
            std::thread::sleep(Duration::from_millis(50));
            self.inner.emit(notification)
        }
    }

    #[test]
    fn background_thread_delivers_after_wake() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let db = sled::open(dir.path().join("outbox.db"))?;
        let sink = Arc::new(SlowSink {
            inner: RecordingSink::new(),
        });
        let config = OutboxSection {
            batch_size: 1,
            poll_interval_ms: 10_000,
            ..OutboxSection::default()
        };
        let dispatcher = Arc::new(OutboxDispatcher::new(&db, sink.clone(), config)?);
        let handle = Arc::clone(&dispatcher).spawn()?;

        enqueue(&dispatcher.outbox, 1, "trade_a");
        enqueue(&dispatcher.outbox, 2, "trade_b");
        let woke_at = std::time::Instant::now();
        dispatcher.wake();
        // Waking only flips a flag; the slow sink runs on the other thread.
        assert!(woke_at.elapsed() < Duration::from_millis(50));

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while dispatcher.pending() > 0 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        handle.join()?;

        assert_eq!(dispatcher.pending(), 0);
        assert_eq!(sink.inner.notifications().len(), 2);
        Ok(())
    }
}
