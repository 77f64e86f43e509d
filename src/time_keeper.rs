//! Windowed block-time estimator and difficulty controller.
//!
//! Every accepted block contributes its declared time and difficulty to a
//! sliding window. The median time error against the fixed schedule
//! `origin_time + n * block_interval` gives a chain time that a minority of
//! lying miners cannot move, and drives the difficulty of the next block.
//!
//! The keeper has no interior locking; one validation pipeline owns it and
//! advances it block by block.
use crate::config::TimeKeeperConfig;
use crate::error::{ConsensusError, Error};
use std::collections::VecDeque;
use tracing::{debug, warn};

/// Fixed-point scale of the relative time error (parts per ten million).
pub const ERROR_SCALE: i64 = 10_000_000;

/// Largest relative easing applied in one step, just below 100%.
pub const MAX_ERROR_RATIO: i64 = ERROR_SCALE - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRecord {
    pub block_num: u32,
    pub block_time: i64,
    pub block_difficulty: u64,
    /// Declared time minus the scheduled time for `block_num`.
    pub time_error_sec: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeKeeper {
    config: TimeKeeperConfig,
    records: VecDeque<TimeRecord>,
    current_difficulty: u64,
    next_difficulty: u64,
    current_time: i64,
    median_time_error: i64,
}

impl TimeKeeper {
    pub fn new(config: TimeKeeperConfig) -> Result<Self, Error> {
        config.validate()?;
        Ok(Self {
            current_time: config.origin_time,
            records: VecDeque::with_capacity(config.window + 1),
            config,
            current_difficulty: 0,
            next_difficulty: 0,
            median_time_error: 0,
        })
    }

    /// Replace the schedule and window size, keeping the grace period.
    ///
    /// Retained records keep the time error computed under the old schedule;
    /// statistics are recomputed over whatever the new window retains.
    pub fn configure(
        &mut self,
        origin_time: i64,
        block_interval_secs: i64,
        window: usize,
    ) -> Result<(), Error> {
        let config = TimeKeeperConfig {
            origin_time,
            block_interval_secs,
            window,
            grace_period_secs: self.config.grace_period_secs,
        };
        config.validate()?;
        self.config = config;
        while self.records.len() > self.config.window {
            self.records.pop_front();
        }
        self.update_stats();
        Ok(())
    }

    pub fn config(&self) -> &TimeKeeperConfig {
        &self.config
    }

    /// Seed history without recomputing statistics. Call [`init_stats`]
    /// once the replay is done.
    ///
    /// [`init_stats`]: TimeKeeper::init_stats
    pub fn push_init(&mut self, block_num: u32, block_time: i64, block_difficulty: u64) {
        self.append(block_num, block_time, block_difficulty);
    }

    pub fn init_stats(&mut self) -> Result<(), ConsensusError> {
        if self.records.is_empty() {
            return Err(ConsensusError::EmptyWindow);
        }
        self.update_stats();
        Ok(())
    }

    /// Accept the next block. On any violation nothing is modified.
    pub fn push(
        &mut self,
        block_num: u32,
        block_time: i64,
        block_difficulty: u64,
    ) -> Result<(), ConsensusError> {
        if let Err(err) = self.check_push(block_num, block_time, block_difficulty) {
            warn!(block_num, block_time, block_difficulty, %err, "rejected block");
            return Err(err);
        }
        self.append(block_num, block_time, block_difficulty);
        self.update_stats();
        debug!(
            block_num,
            median_time_error = self.median_time_error,
            current_difficulty = self.current_difficulty,
            next_difficulty = self.next_difficulty,
            "accepted block"
        );
        Ok(())
    }

    pub(crate) fn check_push(
        &self,
        block_num: u32,
        block_time: i64,
        block_difficulty: u64,
    ) -> Result<(), ConsensusError> {
        let head = self.records.back().ok_or(ConsensusError::EmptyWindow)?;
        let expected = head.block_num.wrapping_add(1);
        if block_num != expected {
            return Err(ConsensusError::OutOfSequence {
                expected,
                got: block_num,
            });
        }
        if block_difficulty < self.next_difficulty {
            return Err(ConsensusError::InsufficientDifficulty {
                required: self.next_difficulty,
                got: block_difficulty,
            });
        }
        let earliest = self
            .current_time
            .saturating_sub(self.config.grace_period_secs);
        if block_time < earliest {
            return Err(ConsensusError::TimestampTooEarly {
                earliest,
                got: block_time,
            });
        }
        Ok(())
    }

    /// Drop every record after `block_num` and recompute statistics.
    ///
    /// Rolling back past the oldest retained record would leave a window that
    /// cannot be rebuilt from this keeper alone, so it is refused.
    pub fn pop(&mut self, block_num: u32) -> Result<(), ConsensusError> {
        let (oldest, head) = match (self.records.front(), self.records.back()) {
            (Some(oldest), Some(head)) => (oldest.block_num, head.block_num),
            _ => return Ok(()),
        };
        if block_num >= head {
            return Ok(());
        }
        if block_num < oldest {
            return Err(ConsensusError::RollbackBeyondWindow {
                oldest,
                requested: block_num,
            });
        }
        while self
            .records
            .back()
            .is_some_and(|record| record.block_num > block_num)
        {
            self.records.pop_back();
        }
        self.update_stats();
        debug!(
            block_num,
            next_difficulty = self.next_difficulty,
            "rolled back time keeper"
        );
        Ok(())
    }

    fn append(&mut self, block_num: u32, block_time: i64, block_difficulty: u64) {
        let time_error_sec = block_time.saturating_sub(self.expected_time(block_num));
        self.records.push_back(TimeRecord {
            block_num,
            block_time,
            block_difficulty,
            time_error_sec,
        });
        if self.records.len() > self.config.window {
            self.records.pop_front();
        }
    }

    fn update_stats(&mut self) {
        if self.records.is_empty() {
            return;
        }
        self.median_time_error = median(self.records.iter().map(|r| r.time_error_sec).collect());
        self.current_time = self
            .expected_time(self.head_block_num())
            .saturating_add(self.median_time_error);
        self.current_difficulty =
            median(self.records.iter().map(|r| r.block_difficulty).collect());
        self.next_difficulty = adjust_difficulty(
            self.current_difficulty,
            self.median_time_error,
            self.config.block_interval_secs,
        );
    }

    pub fn expected_time(&self, block_num: u32) -> i64 {
        self.config.origin_time.saturating_add(
            i64::from(block_num).saturating_mul(self.config.block_interval_secs),
        )
    }

    /// Last retained block number, 0 when empty.
    pub fn head_block_num(&self) -> u32 {
        self.records.back().map_or(0, |r| r.block_num)
    }

    pub fn next_block_num(&self) -> u32 {
        self.head_block_num().wrapping_add(1)
    }

    /// Scheduled time of the next block.
    pub fn next_time(&self) -> i64 {
        self.expected_time(self.next_block_num())
    }

    /// Median of the declared difficulties in the window.
    pub fn current_difficulty(&self) -> u64 {
        self.current_difficulty
    }

    /// Difficulty every subsequent block must meet.
    pub fn next_difficulty(&self) -> u64 {
        self.next_difficulty
    }

    /// Chain time estimate: the head's scheduled time plus the median error.
    pub fn current_time(&self) -> i64 {
        self.current_time
    }

    pub fn median_time_error(&self) -> i64 {
        self.median_time_error
    }

    pub fn records(&self) -> impl Iterator<Item = &TimeRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Value at position `len / 2` in sorted order. The k-th order statistic is
/// unique as a value, so ties cannot make validators disagree.
fn median<T: Ord + Copy>(mut values: Vec<T>) -> T {
    let mid = values.len() / 2;
    *values.select_nth_unstable(mid).1
}

/// Next difficulty from the current median difficulty and median time error.
///
/// A block interval shorter than target is measured against the shortened
/// interval, a longer one against the target: recovering from a 50% loss
/// takes a 100% gain.
pub fn adjust_difficulty(current: u64, median_time_error: i64, interval_secs: i64) -> u64 {
    let scale = i128::from(ERROR_SCALE);
    let target = i128::from(interval_secs);
    let error = i128::from(median_time_error);
    let effective = (target + error).max(1);
    let divisor = if effective < target { effective } else { target };
    let ratio = (error * scale / divisor).min(i128::from(MAX_ERROR_RATIO));
    i128::from(current)
        .checked_mul(scale - ratio)
        .map(|scaled| scaled / scale)
        .and_then(|next| u64::try_from(next).ok())
        .unwrap_or(u64::MAX)
}
