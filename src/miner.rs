use crate::block::BlockProof;
use crate::error::Error;
use crate::pow::{MiniPow, WorkBuffer};
use crate::stream::{NonceSource, StopFlag};
use derive_builder::Builder;
use flume::{Receiver, Sender};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{info, trace};

/// Parallel nonce search over a block template.
///
/// Every worker owns one [`WorkBuffer`] for its whole run, so memory use is
/// `threads * 128 MiB`.
#[derive(Builder, Debug)]
#[builder(pattern = "owned")]
pub struct Miner {
    pub threads: usize,
    /// Number of hash attempts made so far.
    #[builder(default = "Arc::new(AtomicU64::new(0))")]
    pub progress: Arc<AtomicU64>,
    #[builder(default = "0")]
    pub start_nonce: u64,
}

type Hit = Result<BlockProof, Error>;
type Evaluator = dyn Fn(&BlockProof, &mut Option<WorkBuffer>) -> Result<MiniPow, Error> + Send + Sync;

impl Miner {
    fn validate(&self) -> Result<(), Error> {
        if self.threads == 0 {
            return Err(Error::InvalidConfig("threads must be >= 1".into()));
        }
        Ok(())
    }

    /// Search nonces until the proof of work meets `difficulty`.
    ///
    /// Returns `Ok(None)` if `cancel` is raised first. Cancellation is
    /// observed between hash attempts.
    pub fn mine(
        &self,
        template: &BlockProof,
        difficulty: u64,
        cancel: &StopFlag,
    ) -> Result<Option<BlockProof>, Error> {
        self.validate()?;
        info!(
            block_num = template.header.block_num,
            difficulty,
            threads = self.threads,
            "mining started"
        );
        let found = mine_with(
            template,
            difficulty,
            self.threads,
            self.start_nonce,
            self.progress.clone(),
            cancel.clone(),
            Arc::new(evaluate_full),
        )?;
        match &found {
            Some(block_proof) => info!(
                block_num = block_proof.header.block_num,
                nonce = block_proof.pow.nonce,
                attempts = self.progress.load(Ordering::Relaxed),
                "proof found"
            ),
            None => info!("mining cancelled"),
        }
        Ok(found)
    }
}

impl MinerBuilder {
    fn validate(&self) -> Result<(), Error> {
        if self.threads.unwrap_or(0) == 0 {
            return Err(Error::InvalidConfig("threads must be >= 1".into()));
        }
        Ok(())
    }

    pub fn build_validated(self) -> Result<Miner, Error> {
        self.validate()?;
        self.build()
            .map_err(|e| Error::InvalidConfig(e.to_string()))
    }
}

fn evaluate_full(
    candidate: &BlockProof,
    scratch: &mut Option<WorkBuffer>,
) -> Result<MiniPow, Error> {
    let mut buffer = match scratch.take() {
        Some(buffer) => buffer,
        None => WorkBuffer::new()?,
    };
    let pow = candidate.proof_of_work_with(&mut buffer);
    *scratch = Some(buffer);
    Ok(pow)
}

fn mine_with(
    template: &BlockProof,
    difficulty: u64,
    threads: usize,
    start_nonce: u64,
    progress: Arc<AtomicU64>,
    cancel: StopFlag,
    evaluator: Arc<Evaluator>,
) -> Result<Option<BlockProof>, Error> {
    let nonce_source = Arc::new(NonceSource::new(start_nonce));
    let stop = StopFlag::new();
    // Each worker sends at most once, so sends never block.
    let (tx, rx): (Sender<Hit>, Receiver<Hit>) = flume::bounded(threads.max(1));
    let mut joins = Vec::with_capacity(threads.max(1));

    for _ in 0..threads.max(1) {
        let worker_template = template.clone();
        let worker_nonce = nonce_source.clone();
        let worker_stop = stop.clone();
        let worker_cancel = cancel.clone();
        let worker_progress = progress.clone();
        let worker_tx = tx.clone();
        let worker_evaluator = evaluator.clone();
        let join = thread::spawn(move || {
            worker_loop(
                worker_template,
                difficulty,
                worker_nonce,
                worker_stop,
                worker_cancel,
                worker_progress,
                worker_tx,
                worker_evaluator,
            );
        });
        joins.push(join);
    }
    drop(tx);

    let outcome = match rx.recv() {
        Ok(Ok(found)) => Ok(Some(found)),
        Ok(Err(err)) => Err(err),
        // All workers exited without a hit: cancelled.
        Err(_) => Ok(None),
    };

    stop.stop();
    join_handles(joins);
    outcome
}

#[allow(clippy::too_many_arguments)]
fn worker_loop(
    template: BlockProof,
    difficulty: u64,
    nonce_source: Arc<NonceSource>,
    stop: StopFlag,
    cancel: StopFlag,
    progress: Arc<AtomicU64>,
    tx: Sender<Hit>,
    evaluator: Arc<Evaluator>,
) {
    let mut scratch = None;
    while !stop.is_stopped() && !cancel.is_stopped() {
        let candidate = template.with_nonce(nonce_source.fetch());
        match evaluator(&candidate, &mut scratch) {
            Ok(pow) => {
                progress.fetch_add(1, Ordering::Relaxed);
                trace!(nonce = candidate.pow.nonce, %pow, "hash attempt");
                if pow.meets(difficulty) {
                    let _ = tx.send(Ok(candidate));
                    stop.stop();
                    break;
                }
            }
            Err(err) => {
                let _ = tx.send(Err(err));
                stop.stop();
                break;
            }
        }
    }
}

fn join_handles(joins: Vec<thread::JoinHandle<()>>) {
    for handle in joins {
        let _ = handle.join();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{BlockHeader, Proof};
    use crate::pow::MINI_POW_SIZE;
    use crate::verify::verify_block_proof;
    use std::time::Duration;

    fn template() -> BlockProof {
        BlockProof::new(
            BlockHeader {
                block_num: 1,
                timestamp: 1_000,
                ..BlockHeader::default()
            },
            Proof::default(),
        )
    }

    /// Maximum difficulty for `winner`, difficulty 1 for every other nonce.
    fn fake_evaluator(winner: u64) -> Arc<Evaluator> {
        Arc::new(move |candidate: &BlockProof, _: &mut Option<WorkBuffer>| -> Result<MiniPow, Error> {
            if candidate.pow.nonce == winner {
                Ok(MiniPow([0u8; MINI_POW_SIZE]))
            } else {
                Ok(MiniPow([0xff; MINI_POW_SIZE]))
            }
        })
    }

    #[test]
    fn finds_the_winning_nonce() {
        let progress = Arc::new(AtomicU64::new(0));
        let found = mine_with(
            &template(),
            2,
            2,
            0,
            progress.clone(),
            StopFlag::new(),
            fake_evaluator(5),
        )
        .expect("mining should not fail")
        .expect("should find a proof");
        assert_eq!(found.pow.nonce, 5);
        assert_eq!(found.header, template().header);
        assert!(progress.load(Ordering::SeqCst) >= 1);
    }

    #[test]
    fn pre_cancelled_search_returns_none() {
        let cancel = StopFlag::new();
        cancel.stop();
        let found = mine_with(
            &template(),
            2,
            2,
            0,
            Arc::new(AtomicU64::new(0)),
            cancel,
            fake_evaluator(u64::MAX),
        )
        .expect("cancellation is not an error");
        assert!(found.is_none());
    }

    #[test]
    fn cancellation_stops_running_workers() {
        let cancel = StopFlag::new();
        let canceller = cancel.clone();
        let slow: Arc<Evaluator> = Arc::new(|_: &BlockProof, _: &mut Option<WorkBuffer>| -> Result<MiniPow, Error> {
            thread::sleep(Duration::from_millis(1));
            Ok(MiniPow([0xff; MINI_POW_SIZE]))
        });
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            canceller.stop();
        });
        let found = mine_with(
            &template(),
            2,
            2,
            0,
            Arc::new(AtomicU64::new(0)),
            cancel,
            slow,
        )
        .expect("cancellation is not an error");
        handle.join().unwrap();
        assert!(found.is_none());
    }

    #[test]
    fn evaluator_errors_propagate() {
        let failing: Arc<Evaluator> = Arc::new(|_: &BlockProof, _: &mut Option<WorkBuffer>| -> Result<MiniPow, Error> {
            Err(Error::Allocation { bytes: 1 })
        });
        let err = mine_with(
            &template(),
            2,
            1,
            0,
            Arc::new(AtomicU64::new(0)),
            StopFlag::new(),
            failing,
        )
        .expect_err("allocation failure must surface");
        assert_eq!(err, Error::Allocation { bytes: 1 });
    }

    #[test]
    fn builder_rejects_zero_threads() {
        let err = MinerBuilder::default()
            .threads(0)
            .build_validated()
            .expect_err("zero threads");
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn mines_and_verifies_with_real_work_function() {
        // Every value meets difficulty 1, so the first attempt wins.
        let miner = MinerBuilder::default()
            .threads(1)
            .start_nonce(11)
            .build_validated()
            .expect("build miner");
        let found = miner
            .mine(&template(), 1, &StopFlag::new())
            .expect("mining should not fail")
            .expect("should find a proof");
        assert_eq!(found.pow.nonce, 11);
        assert_eq!(miner.progress.load(Ordering::SeqCst), 1);
        verify_block_proof(&found, 1).expect("mined proof verifies");
    }
}
