use crate::types::Uint160;

/// Rejections raised by the time keeper when a block breaks a consensus rule.
///
/// Each precondition of [`TimeKeeper::push`](crate::time_keeper::TimeKeeper::push)
/// maps to its own variant so callers can tell a stale peer from a hostile one.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConsensusError {
    #[error("time keeper window is empty")]
    EmptyWindow,
    #[error("block number out of sequence: expected {expected}, got {got}")]
    OutOfSequence { expected: u32, got: u32 },
    #[error("block difficulty {got} is below the required {required}")]
    InsufficientDifficulty { required: u64, got: u64 },
    #[error("block time {got} is earlier than {earliest}")]
    TimestampTooEarly { earliest: i64, got: i64 },
    #[error("cannot roll back to block {requested}, oldest retained block is {oldest}")]
    RollbackBeyondWindow { oldest: u32, requested: u32 },
}

/// Failures while checking a block against the chain head.
#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("block does not link to the current head")]
    PrevMismatch,
    #[error("header state hash does not match the block state")]
    StateMismatch,
    #[error("transaction merkle root does not match the header")]
    MerkleRootMismatch,
    #[error("transaction {id} appears more than once")]
    DuplicateTransaction { id: Uint160 },
    #[error("proof of work does not meet difficulty: required {required}, got {got}")]
    InsufficientWork { required: u64, got: u64 },
    #[error("consensus violation: {0}")]
    Consensus(#[from] ConsensusError),
    #[error("work evaluation failed: {0}")]
    Work(#[from] Error),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("failed to allocate {bytes} bytes for the work buffer")]
    Allocation { bytes: usize },
    #[error("solver failed: {0}")]
    SolverFailed(String),
    #[error("solver channel closed")]
    ChannelClosed,
    #[error(transparent)]
    Consensus(#[from] ConsensusError),
}
