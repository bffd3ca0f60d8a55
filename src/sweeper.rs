//! Time-driven transitions: PROPOSED trades past `expires_at` expire, and
//! ACCEPTED trades whose review window lapsed without enough vetoes execute.
//!
//! Each trade is handled in its own transaction, so a sweep can be stopped
//! between batches and rerun at any time. Trades already moved on are skipped.
use super::config::SweeperSection;
use super::error::{ExecutionIntegrityError, TradeError};
use super::executor::{Execution, ExecutionCause, execute_in};
use super::service::{Committed, TradeService, expire_in};
use super::trade::{TimeStamp, Trade};
use chrono::Utc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

const SWEEPER_ACTOR: &str = "sweeper";

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SweepOutcome {
    Expired,
    Executed,
    Failed(ExecutionIntegrityError),
    Skipped,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub expired: Vec<String>,
    pub executed: Vec<String>,
    /// Trades whose execution was refused by re-validation
    pub failed: Vec<String>,
    pub skipped: usize,
    /// Set when a stop request cut the sweep short
    pub interrupted: bool,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.expired.is_empty() && self.executed.is_empty() && self.failed.is_empty()
    }

    fn record(&mut self, trade_id: &str, outcome: SweepOutcome) {
        match outcome {
            SweepOutcome::Expired => self.expired.push(trade_id.to_string()),
            SweepOutcome::Executed => self.executed.push(trade_id.to_string()),
            SweepOutcome::Failed(_) => self.failed.push(trade_id.to_string()),
            SweepOutcome::Skipped => self.skipped += 1,
        }
    }
}

// Cheap pre-filter on a snapshot; the transaction re-checks everything.
fn is_candidate(trade: &Trade, now: &TimeStamp<Utc>) -> bool {
    trade.is_overdue_at(now)
        || (trade.review_lapsed_at(now) && trade.last_execution_error.is_none())
}

impl TradeService {
    pub(crate) fn sweep_trade(
        &self,
        trade_id: &str,
        now: &TimeStamp<Utc>,
    ) -> Result<SweepOutcome, TradeError> {
        self.commit(|tx| {
            let mut trade = tx.trade(trade_id)?;

            if trade.is_overdue_at(now) {
                expire_in(tx, &mut trade, SWEEPER_ACTOR, now)?;
                return Ok(Committed::Done(SweepOutcome::Expired));
            }
            if !trade.review_lapsed_at(now) || trade.last_execution_error.is_some() {
                return Ok(Committed::Done(SweepOutcome::Skipped));
            }

            let needed = tx.policy(&trade.league_id)?.trade_votes_needed;
            if needed > 0 && trade.veto_votes >= needed {
                return Ok(Committed::Done(SweepOutcome::Skipped));
            }
            match execute_in(tx, &mut trade, ExecutionCause::ReviewLapsed, now)? {
                Execution::Completed => Ok(Committed::Done(SweepOutcome::Executed)),
                Execution::Refused(err) => Ok(Committed::Done(SweepOutcome::Failed(err))),
            }
        })
    }
}

pub struct ExpirationSweeper {
    service: TradeService,
    config: SweeperSection,
}

/// Background sweeper started by [`ExpirationSweeper::spawn`].
pub struct SweeperHandle {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl ExpirationSweeper {
    pub fn new(service: TradeService) -> Self {
        let config = service.config().sweeper.clone();
        Self { service, config }
    }

    pub fn run_once(&self) -> Result<SweepReport, TradeError> {
        self.sweep(&AtomicBool::new(false))
    }

    /// One pass over every trade. `stop` is checked before each batch.
    pub fn sweep(&self, stop: &AtomicBool) -> Result<SweepReport, TradeError> {
        let now = self.service.now();
        let mut candidates = Vec::new();
        for trade in self.service.stores.scan_trades() {
            let trade = trade?;
            if is_candidate(&trade, &now) {
                candidates.push(trade.id);
            }
        }

        let mut report = SweepReport::default();
        for batch in candidates.chunks(self.config.batch_size.max(1)) {
            if stop.load(Ordering::Relaxed) {
                report.interrupted = true;
                break;
            }
            for trade_id in batch {
                match self.service.sweep_trade(trade_id, &now) {
                    Ok(outcome) => report.record(trade_id, outcome),
                    // Someone else moved the trade first.
                    Err(err) if err.is_retryable() => {
                        tracing::debug!(trade_id = %trade_id, error = %err, "sweep lost a race");
                        report.skipped += 1;
                    }
                    Err(err) => return Err(err),
                }
            }
        }

        if !report.is_empty() {
            tracing::info!(
                expired = report.expired.len(),
                executed = report.executed.len(),
                failed = report.failed.len(),
                skipped = report.skipped,
                "sweep finished"
            );
        }
        Ok(report)
    }

    /// Sweep every `interval_secs` until `stop` is set.
    pub fn run_until(&self, stop: &AtomicBool) {
        let interval = Duration::from_secs(self.config.interval_secs);
        tracing::info!(interval_secs = self.config.interval_secs, "sweeper started");

        while !stop.load(Ordering::Relaxed) {
            if let Err(err) = self.sweep(stop) {
                tracing::error!(error = %err, "sweep failed");
            }
            let started = Instant::now();
            while !stop.load(Ordering::Relaxed) && started.elapsed() < interval {
                std::thread::sleep(Duration::from_millis(100).min(interval));
            }
        }
        tracing::info!("sweeper stopped");
    }

    pub fn spawn(self) -> anyhow::Result<SweeperHandle> {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let thread = std::thread::Builder::new()
            .name("trade-sweeper".to_string())
            .spawn(move || self.run_until(&flag))?;
        Ok(SweeperHandle {
            stop,
            thread: Some(thread),
        })
    }
}

impl SweeperHandle {
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    /// Stop and wait for the current batch to finish.
    pub fn join(mut self) -> anyhow::Result<()> {
        self.stop();
        match self.thread.take() {
            Some(thread) => thread
                .join()
                .map_err(|_| anyhow::anyhow!("sweeper thread panicked")),
            None => Ok(()),
        }
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
