//! Acceptance of blocks on top of the current head.
use crate::block::{Block, FullBlock};
use crate::config::TimeKeeperConfig;
use crate::error::{ConsensusError, Error, VerifyError};
use crate::pow::{MiniPow, WorkBuffer};
use crate::time_keeper::TimeKeeper;
use crate::types::Uint224;
use crate::verify::{verify_block_proof_with, verify_full_block_root};
use tracing::{debug, info};

/// Owns the time keeper of one chain and the id of its head block.
#[derive(Debug)]
pub struct ChainValidator {
    time_keeper: TimeKeeper,
    head_id: Uint224,
    buffer: Option<WorkBuffer>,
}

impl ChainValidator {
    pub fn new(time_keeper: TimeKeeper, head_id: Uint224) -> Self {
        Self {
            time_keeper,
            head_id,
            buffer: None,
        }
    }

    /// Start a chain at `genesis`, which is required to carry `genesis_difficulty`.
    pub fn from_genesis(
        config: TimeKeeperConfig,
        genesis: &Block,
        genesis_difficulty: u64,
    ) -> Result<Self, Error> {
        let mut time_keeper = TimeKeeper::new(config)?;
        let header = genesis.header();
        time_keeper.push_init(
            header.block_num,
            i64::from(header.timestamp),
            genesis_difficulty,
        );
        time_keeper.init_stats()?;
        Ok(Self::new(time_keeper, genesis.id()))
    }

    pub fn time_keeper(&self) -> &TimeKeeper {
        &self.time_keeper
    }

    pub fn head_id(&self) -> Uint224 {
        self.head_id
    }

    /// Validate `block` against the head and, if it passes, make it the new
    /// head. The proof's achieved difficulty is what the time keeper records.
    ///
    /// On rejection neither the head nor the time keeper changes.
    pub fn accept(&mut self, block: &FullBlock) -> Result<MiniPow, VerifyError> {
        let header = block.block.header();
        if header.prev != self.head_id {
            return Err(VerifyError::PrevMismatch);
        }
        if !block.block.state_matches() {
            return Err(VerifyError::StateMismatch);
        }
        verify_full_block_root(block)?;

        let required = self.time_keeper.next_difficulty();
        let block_time = i64::from(header.timestamp);
        // Sequence and timestamp rules are cheap; check them before hashing.
        self.time_keeper
            .check_push(header.block_num, block_time, required)?;

        let mut buffer = match self.buffer.take() {
            Some(buffer) => buffer,
            None => WorkBuffer::new()?,
        };
        let verified = verify_block_proof_with(&block.block.block_proof, required, &mut buffer);
        self.buffer = Some(buffer);
        let pow = verified?;

        self.time_keeper
            .push(header.block_num, block_time, pow.difficulty())?;
        self.head_id = block.block.id();
        info!(
            block_num = header.block_num,
            id = %self.head_id,
            next_difficulty = self.time_keeper.next_difficulty(),
            "block accepted"
        );
        Ok(pow)
    }

    /// Roll back to `block_num`, whose id becomes the head again.
    pub fn rollback(&mut self, block_num: u32, head_id: Uint224) -> Result<(), ConsensusError> {
        self.time_keeper.pop(block_num)?;
        self.head_id = head_id;
        debug!(block_num, id = %head_id, "chain rolled back");
        Ok(())
    }
}
