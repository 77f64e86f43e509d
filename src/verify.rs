use crate::block::{BlockProof, FullBlock, TrxBlock};
use crate::error::VerifyError;
use crate::merkle::merkle_root;
use crate::pow::{MiniPow, WorkBuffer};
use crate::types::Uint160;
use std::collections::HashSet;

/// Re-evaluate the work function and check it meets `difficulty`.
pub fn verify_block_proof(block_proof: &BlockProof, difficulty: u64) -> Result<MiniPow, VerifyError> {
    let pow = block_proof.proof_of_work()?;
    check_difficulty(pow, difficulty)
}

/// Like [`verify_block_proof`] but reuses a caller-owned buffer.
pub fn verify_block_proof_with(
    block_proof: &BlockProof,
    difficulty: u64,
    buffer: &mut WorkBuffer,
) -> Result<MiniPow, VerifyError> {
    check_difficulty(block_proof.proof_of_work_with(buffer), difficulty)
}

fn check_difficulty(pow: MiniPow, required: u64) -> Result<MiniPow, VerifyError> {
    if !pow.meets(required) {
        return Err(VerifyError::InsufficientWork {
            required,
            got: pow.difficulty(),
        });
    }
    Ok(pow)
}

/// Check the id list against the header root. Repeated ids are refused first,
/// since duplicating a trailing run of ids leaves the root unchanged.
pub fn verify_full_block_root(block: &FullBlock) -> Result<(), VerifyError> {
    check_ids(&block.trx_ids, &block.block.header().trx_mroot)
}

pub fn verify_trx_block_root(block: &TrxBlock) -> Result<(), VerifyError> {
    check_ids(&block.trx_ids(), &block.block.header().trx_mroot)
}

fn check_ids(ids: &[Uint160], root: &Uint160) -> Result<(), VerifyError> {
    let mut seen = HashSet::with_capacity(ids.len());
    if let Some(id) = ids.iter().find(|id| !seen.insert(**id)) {
        return Err(VerifyError::DuplicateTransaction { id: *id });
    }
    if merkle_root(ids) != *root {
        return Err(VerifyError::MerkleRootMismatch);
    }
    Ok(())
}
