//! Consensus core of a proof-of-work chain.
//!
//! - [`block`]: header, proof and block records with their digests.
//! - [`pow`]: the 128 MiB memory-hard work function.
//! - [`time_keeper`]: median-based chain time and difficulty controller.
//! - [`miner`] and [`chain`]: searching for and accepting blocks.
pub mod block;
pub mod chain;
pub mod config;
pub mod core;
pub mod error;
pub mod merkle;
pub mod miner;
pub mod pow;
pub mod stream;
pub mod time_keeper;
pub mod types;
pub mod verify;

pub use block::{
    create_genesis_block, AssetIssuance, Block, BlockHeader, BlockProof, BlockState, FullBlock,
    Proof, SignedTransaction, TrxBlock,
};
pub use chain::ChainValidator;
pub use config::{TimeKeeperConfig, TimeKeeperConfigBuilder, DEFAULT_GRACE_PERIOD_SECS};
pub use error::{ConsensusError, Error, VerifyError};
pub use merkle::merkle_root;
pub use miner::{Miner, MinerBuilder};
pub use pow::{proof_of_work, proof_of_work_with, MiniPow, WorkBuffer};
pub use stream::StopFlag;
pub use time_keeper::{TimeKeeper, TimeRecord};
pub use types::{Uint160, Uint224, Uint256};
pub use verify::verify_block_proof;
