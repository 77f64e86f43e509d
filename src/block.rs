//! Block records, from the minimal header up to the two full-block projections.
//!
//! Each level wraps the previous one by value. Serialization is field order
//! preserving, so the canonical encoding of a wrapper is the encoding of the
//! wrapped record followed by the added fields.
use crate::core::{encode, hash160, hash160_pair, hash224, hash256};
use crate::error::Error;
use crate::merkle::{empty_root, merkle_root};
use crate::pow::{proof_of_work, proof_of_work_with, MiniPow, WorkBuffer};
use crate::types::{Uint160, Uint224, Uint256};
use serde::{Deserialize, Serialize};

/// Number of issuance slots in [`BlockState`], one per asset type.
pub const ASSET_TYPE_COUNT: usize = 16;

/// 2014-01-01T00:00:00Z
pub const GENESIS_TIMESTAMP: u32 = 1_388_534_400;

/// Light-weight summary linking a block to all prior blocks.
///
/// Holds no nonce; that lives in [`Proof`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub version: u32,
    pub prev: Uint224,
    pub block_num: u32,
    /// Seconds since 1970.
    pub timestamp: u32,
    pub state_hash: Uint160,
    pub trx_mroot: Uint160,
}

impl BlockHeader {
    /// Digest used as the leaf of the proof's merkle branch.
    pub fn digest(&self) -> Uint160 {
        hash160(&encode(self))
    }
}

/// Merkle branch plus nonce.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof {
    pub branch: Vec<Uint160>,
    pub nonce: u64,
}

impl Proof {
    /// Lift `leaf` through the branch and bind the nonce, producing the
    /// 256-bit input of the work function.
    pub fn work_input(&self, leaf: &Uint160) -> Uint256 {
        let root = self
            .branch
            .iter()
            .fold(*leaf, |acc, sibling| hash160_pair(&acc, sibling));
        let mut buf = [0u8; Uint160::LEN + 8];
        buf[..Uint160::LEN].copy_from_slice(root.as_bytes());
        buf[Uint160::LEN..].copy_from_slice(&self.nonce.to_le_bytes());
        hash256(&buf)
    }
}

/// Header plus proof of work: the minimum needed to keep the work history.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockProof {
    pub header: BlockHeader,
    pub pow: Proof,
}

impl BlockProof {
    pub fn new(header: BlockHeader, pow: Proof) -> Self {
        Self { header, pow }
    }

    /// Identifier referenced by the successor's `prev`.
    pub fn id(&self) -> Uint224 {
        hash224(&encode(self))
    }

    pub fn work_input(&self) -> Uint256 {
        self.pow.work_input(&self.header.digest())
    }

    pub fn proof_of_work(&self) -> Result<MiniPow, Error> {
        proof_of_work(&self.work_input())
    }

    pub fn proof_of_work_with(&self, buffer: &mut WorkBuffer) -> MiniPow {
        proof_of_work_with(&self.work_input(), buffer)
    }

    pub fn with_nonce(&self, nonce: u64) -> Self {
        let mut next = self.clone();
        next.pow.nonce = nonce;
        next
    }
}

/// Ratio of backing to issued amount for one asset type.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetIssuance {
    /// Total base currency backing the issued asset.
    pub backing: u64,
    pub issued: u64,
}

/// Chain-wide accounting before this block's transactions are applied.
///
/// Kept with every block for the retention window so an old block can be
/// checked without the full history.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockState {
    /// 0.64 fixed-point fraction of the money supply.
    pub dividend_percent: u64,
    pub issuance: [AssetIssuance; ASSET_TYPE_COUNT],
    /// Soft-fork feature codes signalled by the miner.
    pub supported_features: Vec<u32>,
}

impl BlockState {
    /// Value committed to by [`BlockHeader::state_hash`].
    pub fn digest(&self) -> Uint160 {
        hash160(&encode(self))
    }

    pub fn supports(&self, feature: u32) -> bool {
        self.supported_features.contains(&feature)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub block_proof: BlockProof,
    pub state: BlockState,
}

impl Block {
    pub fn header(&self) -> &BlockHeader {
        &self.block_proof.header
    }

    pub fn id(&self) -> Uint224 {
        self.block_proof.id()
    }

    /// Whether the header commits to this block's state.
    pub fn state_matches(&self) -> bool {
        self.header().state_hash == self.state.digest()
    }
}

/// Transaction as produced by the execution layer. Its content is never
/// interpreted here.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub payload: Vec<u8>,
    pub signatures: Vec<Vec<u8>>,
}

impl SignedTransaction {
    pub fn id(&self) -> Uint160 {
        hash160(&encode(self))
    }
}

/// A block with the ids of its transactions, for peers that already hold
/// the transactions.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FullBlock {
    pub block: Block,
    pub trx_ids: Vec<Uint160>,
}

impl FullBlock {
    pub fn new(block: Block, trx_ids: Vec<Uint160>) -> Self {
        Self { block, trx_ids }
    }

    pub fn calculate_merkle_root(&self) -> Uint160 {
        merkle_root(&self.trx_ids)
    }
}

/// A block carrying the full transactions.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrxBlock {
    pub block: Block,
    pub trxs: Vec<SignedTransaction>,
}

impl TrxBlock {
    pub fn new(block: Block, trxs: Vec<SignedTransaction>) -> Self {
        Self { block, trxs }
    }

    /// Pair the block of `full` with the transactions it names. The ids in
    /// `full` are dropped; they are recomputed from `trxs` on demand.
    pub fn from_full_block(full: FullBlock, trxs: Vec<SignedTransaction>) -> Self {
        Self {
            block: full.block,
            trxs,
        }
    }

    pub fn trx_ids(&self) -> Vec<Uint160> {
        self.trxs.iter().map(SignedTransaction::id).collect()
    }

    pub fn calculate_merkle_root(&self) -> Uint160 {
        merkle_root(&self.trx_ids())
    }

    pub fn to_full_block(&self) -> FullBlock {
        FullBlock::new(self.block.clone(), self.trx_ids())
    }
}

impl From<&TrxBlock> for FullBlock {
    fn from(value: &TrxBlock) -> Self {
        value.to_full_block()
    }
}

/// The fixed first block of the chain.
pub fn create_genesis_block() -> TrxBlock {
    let state = BlockState::default();
    let header = BlockHeader {
        version: 0,
        prev: Uint224::default(),
        block_num: 0,
        timestamp: GENESIS_TIMESTAMP,
        state_hash: state.digest(),
        trx_mroot: empty_root(),
    };
    TrxBlock::new(
        Block {
            block_proof: BlockProof::new(header, Proof::default()),
            state,
        },
        Vec::new(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header() -> BlockHeader {
        BlockHeader {
            version: 1,
            prev: Uint224([3; 28]),
            block_num: 42,
            timestamp: GENESIS_TIMESTAMP + 600,
            state_hash: Uint160([4; 20]),
            trx_mroot: Uint160([5; 20]),
        }
    }

    fn trx(n: u8) -> SignedTransaction {
        SignedTransaction {
            payload: vec![n; 8],
            signatures: vec![vec![n, n + 1]],
        }
    }

    #[test]
    fn digest_is_pure() {
        let header = sample_header();
        assert_eq!(header.digest(), header.digest());
        assert_eq!(header.digest(), header.clone().digest());
    }

    #[test]
    fn digest_changes_with_every_field() {
        let base = sample_header();
        let base_digest = base.digest();
        let mutations: Vec<Box<dyn Fn(&mut BlockHeader)>> = vec![
            Box::new(|h: &mut BlockHeader| h.version += 1),
            Box::new(|h: &mut BlockHeader| h.prev.0[0] ^= 1),
            Box::new(|h: &mut BlockHeader| h.block_num += 1),
            Box::new(|h: &mut BlockHeader| h.timestamp += 1),
            Box::new(|h: &mut BlockHeader| h.state_hash.0[19] ^= 1),
            Box::new(|h: &mut BlockHeader| h.trx_mroot.0[0] ^= 0x80),
        ];
        for mutate in mutations {
            let mut header = base.clone();
            mutate(&mut header);
            assert_ne!(header.digest(), base_digest, "{header:?}");
        }
    }

    #[test]
    fn id_changes_with_nonce() {
        let proof = BlockProof::new(sample_header(), Proof::default());
        let bumped = proof.with_nonce(1);
        assert_eq!(proof.header, bumped.header);
        assert_ne!(proof.id(), bumped.id());
        assert_ne!(proof.work_input(), bumped.work_input());
    }

    #[test]
    fn id_changes_with_branch() {
        let proof = BlockProof::new(sample_header(), Proof::default());
        let mut branched = proof.clone();
        branched.pow.branch.push(Uint160([1; 20]));
        assert_ne!(proof.id(), branched.id());
        assert_ne!(proof.work_input(), branched.work_input());
    }

    #[test]
    fn work_input_folds_branch() {
        let header = sample_header();
        let sibling = Uint160([9; 20]);
        let pow = Proof {
            branch: vec![sibling],
            nonce: 7,
        };
        let root = hash160_pair(&header.digest(), &sibling);
        let mut buf = root.0.to_vec();
        buf.extend_from_slice(&7u64.to_le_bytes());
        assert_eq!(pow.work_input(&header.digest()), hash256(&buf));
    }

    #[test]
    fn encoding_extends_field_by_field() {
        let block = Block {
            block_proof: BlockProof::new(
                sample_header(),
                Proof {
                    branch: vec![Uint160([1; 20])],
                    nonce: 99,
                },
            ),
            state: BlockState {
                dividend_percent: 12,
                supported_features: vec![1, 2],
                ..BlockState::default()
            },
        };
        let mut expected = encode(&block.block_proof.header);
        expected.extend(encode(&block.block_proof.pow));
        expected.extend(encode(&block.state));
        assert_eq!(encode(&block), expected);

        let full = FullBlock::new(block.clone(), vec![Uint160([2; 20])]);
        let mut expected_full = encode(&block);
        expected_full.extend(encode(&full.trx_ids));
        assert_eq!(encode(&full), expected_full);
    }

    #[test]
    fn trx_block_reduces_to_same_root() {
        let trx_block = TrxBlock::new(Block::default(), vec![trx(1), trx(2), trx(3)]);
        let full: FullBlock = (&trx_block).into();
        assert_eq!(full.trx_ids.len(), 3);
        assert_eq!(full.calculate_merkle_root(), trx_block.calculate_merkle_root());
        assert_eq!(full.block, trx_block.block);

        let rebuilt = TrxBlock::from_full_block(full, trx_block.trxs.clone());
        assert_eq!(rebuilt, trx_block);
    }

    #[test]
    fn genesis_is_fixed() {
        let genesis = create_genesis_block();
        assert_eq!(genesis, create_genesis_block());
        assert_eq!(genesis.block.header().block_num, 0);
        assert!(genesis.trxs.is_empty());
        assert_eq!(genesis.block.header().trx_mroot, genesis.calculate_merkle_root());
        assert!(genesis.block.state_matches());
        assert!(genesis.block.header().prev.is_zero());
    }

    #[test]
    fn state_features() {
        let state = BlockState {
            supported_features: vec![3, 5],
            ..BlockState::default()
        };
        assert!(state.supports(5));
        assert!(!state.supports(4));
        assert_ne!(state.digest(), BlockState::default().digest());
    }
}
