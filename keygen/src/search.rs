//! Parallel brute-force search for a keypair that passes the candidate filter
//!
//! Each worker is a blocking task looping generate -> count -> filter. The
//! first worker to hand a match to the [`WinnerSlot`] wins and cancels the
//! shared token; the others notice at the top of their next iteration and
//! exit. Attempt counters are per worker, readable at any time through
//! [`Progress`], and only summed for the final report once every worker has
//! been joined.

use crate::error::{KeygenError, Result};
use crate::filter::{CandidateFilter, Pattern};
use crate::keypair::{KeySource, Keypair};
use futures::future::join_all;
use regex::Regex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Result of a single delivery attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Accepted,
    Rejected,
}

/// Single-use handoff electing exactly one winning keypair
pub struct WinnerSlot {
    sender: Mutex<Option<oneshot::Sender<Keypair>>>,
}

impl WinnerSlot {
    pub fn channel() -> (Arc<Self>, oneshot::Receiver<Keypair>) {
        let (tx, rx) = oneshot::channel();
        let slot = Self {
            sender: Mutex::new(Some(tx)),
        };
        (Arc::new(slot), rx)
    }

    /// Hand over `keypair` without waiting.
    ///
    /// Rejected when another worker already delivered, is delivering at this
    /// instant, or the receiver has gone away.
    pub fn try_deliver(&self, keypair: Keypair) -> Delivery {
        let Ok(mut sender) = self.sender.try_lock() else {
            return Delivery::Rejected;
        };

        match sender.take() {
            Some(tx) => match tx.send(keypair) {
                Ok(()) => Delivery::Accepted,
                Err(_) => Delivery::Rejected,
            },
            None => Delivery::Rejected,
        }
    }
}

/// Live, lock-free view of the per-worker attempt counters
#[derive(Clone)]
pub struct Progress {
    counters: Arc<[AtomicU64]>,
}

impl Progress {
    fn new(workers: usize) -> Self {
        Self {
            counters: (0..workers).map(|_| AtomicU64::new(0)).collect(),
        }
    }

    pub fn workers(&self) -> usize {
        self.counters.len()
    }

    pub fn worker(&self, index: usize) -> u64 {
        self.counters[index].load(Ordering::Relaxed)
    }

    /// Sum of all counters. Exact once the search has returned.
    pub fn total(&self) -> u64 {
        self.counters
            .iter()
            .map(|c| c.load(Ordering::Relaxed))
            .sum()
    }
}

/// Why a worker stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// Delivered the winning keypair
    Won,
    /// Found a match after the slot was taken
    Lost,
    /// Saw the cancellation signal
    Cancelled,
    /// Key generation failed
    Failed,
}

#[derive(Debug, Clone)]
pub struct WorkerReport {
    pub index: usize,
    pub attempts: u64,
    pub exit: WorkerExit,
}

#[derive(Debug)]
pub struct SearchOutcome {
    pub winner: Keypair,
    /// Candidates generated across all workers, the winner included
    pub attempts: u64,
    pub elapsed: Duration,
    pub reports: Vec<WorkerReport>,
}

/// Coordinates N workers racing to find one matching keypair
pub struct Search<P = Regex> {
    filter: Arc<CandidateFilter<P>>,
    progress: Progress,
}

impl<P: Pattern + 'static> Search<P> {
    /// Prepare a search over `workers` workers (at least one)
    pub fn new(filter: CandidateFilter<P>, workers: usize) -> Self {
        Self {
            filter: Arc::new(filter),
            progress: Progress::new(workers.max(1)),
        }
    }

    pub fn workers(&self) -> usize {
        self.progress.workers()
    }

    pub fn progress(&self) -> Progress {
        self.progress.clone()
    }

    /// Run until one worker delivers a match, then stop and join every worker.
    ///
    /// `make_source` is called once per worker index. Returns
    /// [`KeygenError::Worker`] if a worker task panicked and no match was
    /// delivered, or [`KeygenError::SearchExhausted`] if every worker failed
    /// to generate keys before a match.
    pub async fn run<S, F>(self, mut make_source: F) -> Result<SearchOutcome>
    where
        S: KeySource + Send + 'static,
        F: FnMut(usize) -> S,
    {
        let workers = self.workers();
        let started = Instant::now();
        let cancel = CancellationToken::new();
        let (slot, winner_rx) = WinnerSlot::channel();

        info!(
            workers,
            vanity = self.filter.has_vanity(),
            "Searching for a matching keypair"
        );

        let handles: Vec<_> = (0..workers)
            .map(|index| {
                let source = make_source(index);
                let worker = Worker {
                    index,
                    filter: Arc::clone(&self.filter),
                    slot: Arc::clone(&slot),
                    progress: self.progress.clone(),
                    cancel: cancel.clone(),
                };
                tokio::task::spawn_blocking(move || worker.run(source))
            })
            .collect();

        // Workers now hold the only slot handles. If they all exit without a
        // winner the sender is dropped and the receive below fails.
        drop(slot);

        let winner = winner_rx.await;
        cancel.cancel();

        let mut reports = Vec::with_capacity(workers);
        let mut crashed = None;
        for joined in join_all(handles).await {
            match joined {
                Ok(report) => reports.push(report),
                Err(err) => {
                    warn!(error = %err, "Worker task did not complete");
                    crashed.get_or_insert_with(|| err.to_string());
                }
            }
        }

        let winner = match (winner, crashed) {
            (Ok(winner), _) => winner,
            (Err(_), Some(reason)) => return Err(KeygenError::Worker(reason)),
            (Err(_), None) => return Err(KeygenError::SearchExhausted { workers }),
        };
        let attempts = self.progress.total();
        let elapsed = started.elapsed();

        info!(
            attempts,
            elapsed_ms = elapsed.as_millis() as u64,
            public_key = %winner.public_hex(),
            "Found matching keypair"
        );

        Ok(SearchOutcome {
            winner,
            attempts,
            elapsed,
            reports,
        })
    }
}

struct Worker<P> {
    index: usize,
    filter: Arc<CandidateFilter<P>>,
    slot: Arc<WinnerSlot>,
    progress: Progress,
    cancel: CancellationToken,
}

impl<P: Pattern> Worker<P> {
    fn run<S: KeySource>(self, mut source: S) -> WorkerReport {
        let exit = self.search(&mut source);
        let attempts = self.progress.worker(self.index);
        debug!(worker = self.index, attempts, ?exit, "Worker stopped");

        WorkerReport {
            index: self.index,
            attempts,
            exit,
        }
    }

    fn search<S: KeySource>(&self, source: &mut S) -> WorkerExit {
        let counter = &self.progress.counters[self.index];

        loop {
            if self.cancel.is_cancelled() {
                return WorkerExit::Cancelled;
            }

            let keypair = match source.generate() {
                Ok(keypair) => keypair,
                Err(err) => {
                    warn!(worker = self.index, error = %err, "Key generation failed, worker exiting");
                    return WorkerExit::Failed;
                }
            };

            counter.fetch_add(1, Ordering::Relaxed);

            if !self.filter.is_valid(keypair.public_key()) {
                continue;
            }

            return match self.slot.try_deliver(keypair) {
                Delivery::Accepted => {
                    self.cancel.cancel();
                    WorkerExit::Won
                }
                Delivery::Rejected => WorkerExit::Lost,
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::has_marker;
    use crate::keypair::RngKeySource;
    use ed25519_dalek::SigningKey;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::VecDeque;
    use std::sync::Barrier;

    const TIMEOUT: Duration = Duration::from_secs(30);

    fn matching(tag: u8) -> Keypair {
        let mut public = [tag; 32];
        public[28..].copy_from_slice(&[0x08, 0x3e, 0x05, 0x23]);
        Keypair::from_parts([tag; 32], public)
    }

    fn non_matching(tag: u8) -> Keypair {
        Keypair::from_parts([tag; 32], [tag; 32])
    }

    /// Yields a fixed sequence, then fails as if entropy ran out
    struct ScriptedSource {
        script: VecDeque<Keypair>,
    }

    impl ScriptedSource {
        fn new(script: impl IntoIterator<Item = Keypair>) -> Self {
            Self {
                script: script.into_iter().collect(),
            }
        }
    }

    impl KeySource for ScriptedSource {
        fn generate(&mut self) -> Result<Keypair> {
            self.script
                .pop_front()
                .ok_or_else(|| KeygenError::Entropy("script exhausted".into()))
        }
    }

    /// Yields the same keypair forever
    struct RepeatSource(Keypair);

    impl KeySource for RepeatSource {
        fn generate(&mut self) -> Result<Keypair> {
            Ok(self.0.clone())
        }
    }

    fn filter() -> CandidateFilter {
        CandidateFilter::new(None).unwrap()
    }

    #[test]
    fn test_slot_accepts_once() {
        let (slot, mut rx) = WinnerSlot::channel();
        assert_eq!(slot.try_deliver(matching(1)), Delivery::Accepted);
        assert_eq!(slot.try_deliver(matching(2)), Delivery::Rejected);
        assert_eq!(rx.try_recv().unwrap(), matching(1));
    }

    #[test]
    fn test_slot_rejects_without_receiver() {
        let (slot, rx) = WinnerSlot::channel();
        drop(rx);
        assert_eq!(slot.try_deliver(matching(1)), Delivery::Rejected);
    }

    #[test]
    fn test_slot_single_winner_under_contention() {
        const THREADS: usize = 16;
        let (slot, rx) = WinnerSlot::channel();
        let barrier = Arc::new(Barrier::new(THREADS));

        let handles: Vec<_> = (0..THREADS)
            .map(|i| {
                let slot = Arc::clone(&slot);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    (i as u8, slot.try_deliver(matching(i as u8)))
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let accepted: Vec<_> = results
            .iter()
            .filter(|(_, d)| *d == Delivery::Accepted)
            .collect();
        assert_eq!(accepted.len(), 1);

        let winner = rx.blocking_recv().unwrap();
        assert_eq!(winner, matching(accepted[0].0));
    }

    #[test]
    fn test_worker_count_has_floor() {
        assert_eq!(Search::new(filter(), 0).workers(), 1);
        assert_eq!(Search::new(filter(), 6).workers(), 6);
    }

    #[tokio::test]
    async fn test_single_worker_returns_fourth_candidate() {
        let script = [non_matching(1), non_matching(2), non_matching(3), matching(4)];
        let outcome = Search::new(filter(), 1)
            .run(|_| ScriptedSource::new(script.clone()))
            .await
            .unwrap();

        assert_eq!(outcome.winner, matching(4));
        assert_eq!(outcome.attempts, 4);
        assert_eq!(outcome.reports.len(), 1);
        assert_eq!(outcome.reports[0].attempts, 4);
        assert_eq!(outcome.reports[0].exit, WorkerExit::Won);
    }

    #[tokio::test]
    async fn test_counter_equals_winning_position() {
        for position in [1usize, 2, 7, 20] {
            let script: Vec<_> = (1..position)
                .map(|i| non_matching(i as u8))
                .chain(std::iter::once(matching(0xee)))
                .collect();

            let search = Search::new(filter(), 1);
            let progress = search.progress();
            let outcome = search
                .run(|_| ScriptedSource::new(script.clone()))
                .await
                .unwrap();

            assert_eq!(outcome.attempts, position as u64);
            assert_eq!(progress.worker(0), position as u64);
        }
    }

    #[tokio::test]
    async fn test_losers_are_cancelled() {
        let search = Search::new(filter(), 4);
        let outcome = tokio::time::timeout(
            TIMEOUT,
            search.run(|index| -> Box<dyn KeySource + Send> {
                if index == 0 {
                    Box::new(ScriptedSource::new([non_matching(0), matching(9)]))
                } else {
                    Box::new(RepeatSource(non_matching(index as u8)))
                }
            }),
        )
        .await
        .expect("search did not stop after a winner was found")
        .unwrap();

        assert_eq!(outcome.winner, matching(9));
        assert_eq!(outcome.reports.len(), 4);
        for report in &outcome.reports {
            let expected = if report.index == 0 {
                WorkerExit::Won
            } else {
                WorkerExit::Cancelled
            };
            assert_eq!(report.exit, expected, "worker {}", report.index);
        }

        let summed: u64 = outcome.reports.iter().map(|r| r.attempts).sum();
        assert_eq!(outcome.attempts, summed);
        assert_eq!(outcome.reports[0].attempts, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_racing_workers_elect_one_winner() {
        let outcome = tokio::time::timeout(
            TIMEOUT,
            Search::new(filter(), 8).run(|index| RepeatSource(matching(index as u8))),
        )
        .await
        .unwrap()
        .unwrap();

        let won: Vec<_> = outcome
            .reports
            .iter()
            .filter(|r| r.exit == WorkerExit::Won)
            .collect();
        assert_eq!(won.len(), 1);
        assert_eq!(outcome.winner, matching(won[0].index as u8));
        assert!(outcome
            .reports
            .iter()
            .all(|r| matches!(r.exit, WorkerExit::Won | WorkerExit::Lost | WorkerExit::Cancelled)));

        let summed: u64 = outcome.reports.iter().map(|r| r.attempts).sum();
        assert_eq!(outcome.attempts, summed);
    }

    #[tokio::test]
    async fn test_failed_worker_does_not_stop_search() {
        let outcome = Search::new(filter(), 2)
            .run(|index| {
                if index == 0 {
                    ScriptedSource::new(Vec::new())
                } else {
                    ScriptedSource::new([non_matching(1), matching(2)])
                }
            })
            .await
            .unwrap();

        assert_eq!(outcome.winner, matching(2));
        assert_eq!(outcome.attempts, 2);
        let failed = outcome.reports.iter().find(|r| r.index == 0).unwrap();
        assert_eq!(failed.exit, WorkerExit::Failed);
        assert_eq!(failed.attempts, 0);
    }

    #[tokio::test]
    async fn test_all_workers_failing_is_reported() {
        let result = tokio::time::timeout(
            TIMEOUT,
            Search::new(filter(), 3).run(|i| ScriptedSource::new([non_matching(i as u8)])),
        )
        .await
        .expect("search hung after every worker failed");

        assert!(matches!(
            result,
            Err(KeygenError::SearchExhausted { workers: 3 })
        ));
    }

    /// Panics on its first call
    struct PanickingSource;

    impl KeySource for PanickingSource {
        fn generate(&mut self) -> Result<Keypair> {
            panic!("random source crashed");
        }
    }

    #[tokio::test]
    async fn test_panicking_worker_is_reported() {
        let result = tokio::time::timeout(
            TIMEOUT,
            Search::new(filter(), 1).run(|_| PanickingSource),
        )
        .await
        .expect("search hung after its only worker panicked");

        match result {
            Err(KeygenError::Worker(reason)) => assert!(reason.contains("panic"), "{reason}"),
            other => panic!("expected a worker error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_panicking_worker_does_not_hide_winner() {
        let outcome = Search::new(filter(), 2)
            .run(|index| -> Box<dyn KeySource + Send> {
                if index == 0 {
                    Box::new(PanickingSource)
                } else {
                    Box::new(ScriptedSource::new([non_matching(1), matching(2)]))
                }
            })
            .await
            .unwrap();

        assert_eq!(outcome.winner, matching(2));
        assert_eq!(outcome.reports.len(), 1);
        assert_eq!(outcome.reports[0].index, 1);
    }

    #[tokio::test]
    async fn test_real_keys_with_loose_pattern() {
        // Marker pre-check alone: about one key in 4096 passes
        let filter = CandidateFilter::with_patterns(Regex::new("83e").unwrap(), None);
        let outcome = tokio::time::timeout(
            TIMEOUT,
            Search::new(filter, 2)
                .run(|index| RngKeySource::new(StdRng::seed_from_u64(0x83e0 + index as u64))),
        )
        .await
        .unwrap()
        .unwrap();

        let winner = &outcome.winner;
        assert!(has_marker(winner.public_key()));
        let derived = SigningKey::from_bytes(winner.secret_key()).verifying_key();
        assert_eq!(&derived.to_bytes(), winner.public_key());
        assert!(outcome.attempts >= 1);
    }
}
