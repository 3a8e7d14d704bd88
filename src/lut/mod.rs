//! Address lookup table (LUT) manager: collects candidate addresses from a
//! built instruction set and creates/extends an executor-owned LUT.

use std::collections::HashSet;
use std::sync::Arc;

use solana_address_lookup_table_program::instruction::{create_lookup_table, extend_lookup_table};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::instruction::Instruction;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signer};
use solana_sdk::transaction::Transaction;
use tracing::info;

use crate::error::LiqsolError;

/// Account keys appear at the granularity this module needs: pubkey plus
/// whether the on-chain program requires it to be a transaction signer.
#[derive(Debug, Clone, Copy)]
pub struct CandidateAccountMeta {
    pub pubkey: Pubkey,
    pub is_signer: bool,
}

#[derive(Debug, Clone)]
pub struct CandidateInstruction {
    pub program_id: Pubkey,
    pub keys: Vec<CandidateAccountMeta>,
}

/// Returns the ordered, deduplicated union of every instruction's program
/// id and non-signer account keys, excluding `payer`. Order is stable
/// first-occurrence order across instructions.
pub fn collect_lut_candidate_addresses(ixs: &[CandidateInstruction], payer: Pubkey) -> Vec<Pubkey> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    let mut maybe_push = |pk: Pubkey, seen: &mut HashSet<Pubkey>, out: &mut Vec<Pubkey>| {
        if pk != payer && seen.insert(pk) {
            out.push(pk);
        }
    };
    for ix in ixs {
        maybe_push(ix.program_id, &mut seen, &mut out);
        for key in &ix.keys {
            if key.is_signer {
                continue;
            }
            maybe_push(key.pubkey, &mut seen, &mut out);
        }
    }
    out
}

/// Maximum addresses appended to a lookup table per `ExtendLookupTable`
/// instruction, matching the on-chain program's transaction-size limit.
pub const EXTEND_BATCH_SIZE: usize = 20;

/// Issues a lookup-table creation instruction, sends it, and confirms.
/// Returns the new table's address.
pub async fn create_executor_lut(
    client: &Arc<RpcClient>,
    authority: &Keypair,
    payer: &Keypair,
    recent_slot: u64,
) -> Result<Pubkey, LiqsolError> {
    let (ix, lut_address) = create_lookup_table(authority.pubkey(), payer.pubkey(), recent_slot);
    let blockhash = client.get_latest_blockhash().await?;
    let tx = Transaction::new_signed_with_payer(&[ix], Some(&payer.pubkey()), &[payer, authority], blockhash);
    let signature = client.send_and_confirm_transaction(&tx).await?;
    info!(%lut_address, %signature, "created executor lookup table");
    Ok(lut_address)
}

/// Appends `addresses` to `lut_address` in batches of
/// [`EXTEND_BATCH_SIZE`], confirming each batch before sending the next.
pub async fn extend_executor_lut(
    client: &Arc<RpcClient>,
    authority: &Keypair,
    payer: &Keypair,
    lut_address: Pubkey,
    addresses: &[Pubkey],
) -> Result<(), LiqsolError> {
    for batch in addresses.chunks(EXTEND_BATCH_SIZE) {
        let ix: Instruction = extend_lookup_table(
            lut_address,
            authority.pubkey(),
            Some(payer.pubkey()),
            batch.to_vec(),
        );
        let blockhash = client.get_latest_blockhash().await?;
        let tx = Transaction::new_signed_with_payer(&[ix], Some(&payer.pubkey()), &[payer, authority], blockhash);
        let signature = client.send_and_confirm_transaction_with_spinner_and_commitment(&tx, CommitmentConfig::confirmed()).await?;
        info!(%lut_address, %signature, batch_len = batch.len(), "extended executor lookup table");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidate_extraction_matches_worked_example() {
        let payer = Pubkey::new_unique();
        let signer = Pubkey::new_unique();
        let shared = Pubkey::new_unique();
        let a = Pubkey::new_unique();
        let b = Pubkey::new_unique();
        let p_a = Pubkey::new_unique();
        let p_b = Pubkey::new_unique();

        let ixs = vec![
            CandidateInstruction {
                program_id: p_a,
                keys: vec![
                    CandidateAccountMeta { pubkey: payer, is_signer: false },
                    CandidateAccountMeta { pubkey: signer, is_signer: true },
                    CandidateAccountMeta { pubkey: shared, is_signer: false },
                    CandidateAccountMeta { pubkey: a, is_signer: false },
                ],
            },
            CandidateInstruction {
                program_id: p_a,
                keys: vec![
                    CandidateAccountMeta { pubkey: shared, is_signer: false },
                    CandidateAccountMeta { pubkey: b, is_signer: false },
                    CandidateAccountMeta { pubkey: signer, is_signer: true },
                ],
            },
            CandidateInstruction {
                program_id: p_b,
                keys: vec![CandidateAccountMeta { pubkey: a, is_signer: false }],
            },
        ];

        let result = collect_lut_candidate_addresses(&ixs, payer);
        assert_eq!(result, vec![p_a, shared, a, b, p_b]);
    }

    #[test]
    fn extend_batches_at_twenty() {
        let addresses: Vec<Pubkey> = (0..45).map(|_| Pubkey::new_unique()).collect();
        let batches: Vec<_> = addresses.chunks(EXTEND_BATCH_SIZE).collect();
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].len(), 20);
        assert_eq!(batches[2].len(), 5);
    }
}
