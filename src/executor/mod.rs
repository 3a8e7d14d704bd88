//! Executor (component O): pops the highest-priority eligible plan, builds
//! and validates a liquidation transaction across a fixed downgrade-profile
//! list, simulates it, and — when broadcasting is enabled — sends it and
//! confirms by polling.
//!
//! Dynamic option bags become this module's explicit, fixed-order
//! [`DOWNGRADE_PROFILES`] list, per the design notes on dynamic option bags.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::RpcSimulateTransactionConfig;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::hash::Hash;
use solana_sdk::message::{v0, AddressLookupTableAccount, VersionedMessage};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature, Signer};
use solana_sdk::transaction::VersionedTransaction;
use solana_transaction_status::{option_serializer::OptionSerializer, TransactionConfirmationStatus, UiTransactionEncoding};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{info, warn};

use crate::error::{LiqsolError, SimulationFailure};
use crate::flashloan::{FlashLoanRequest, FlashLoanSymbol};
use crate::liquidation::{build_liquidation_window, LiquidationArtifact, LiquidationReserveSide, LiquidationRequest};
use crate::setup_state::SetupStateStore;
use crate::swap::SwapInstructions;
use crate::validator::{classify_instruction, validate_liquidation_window, DecodedInstruction, ValidatorContext};

/// Only one executor attempt is in flight at a time.
pub const BOT_MAX_INFLIGHT: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreReserveRefreshMode {
    All,
    MinimalTwo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DowngradeProfile {
    pub disable_farms_refresh: bool,
    pub disable_post_farms_refresh: bool,
    pub pre_reserve_refresh_mode: PreReserveRefreshMode,
    pub omit_compute_budget_ixs: bool,
}

/// The fixed-order downgrade-profile list: the happy path first, then
/// progressively more conservative fallbacks. Realizes the design note that
/// the `{disableFarmsRefresh, disablePostFarmsRefresh, preReserveRefreshMode,
/// omitComputeBudgetIxs}` option bag becomes an enumerated list traversed in
/// order rather than a dynamically-constructed combination.
pub const DOWNGRADE_PROFILES: &[DowngradeProfile] = &[
    DowngradeProfile {
        disable_farms_refresh: false,
        disable_post_farms_refresh: false,
        pre_reserve_refresh_mode: PreReserveRefreshMode::All,
        omit_compute_budget_ixs: false,
    },
    DowngradeProfile {
        disable_farms_refresh: false,
        disable_post_farms_refresh: true,
        pre_reserve_refresh_mode: PreReserveRefreshMode::All,
        omit_compute_budget_ixs: false,
    },
    DowngradeProfile {
        disable_farms_refresh: true,
        disable_post_farms_refresh: true,
        pre_reserve_refresh_mode: PreReserveRefreshMode::All,
        omit_compute_budget_ixs: false,
    },
    DowngradeProfile {
        disable_farms_refresh: true,
        disable_post_farms_refresh: true,
        pre_reserve_refresh_mode: PreReserveRefreshMode::MinimalTwo,
        omit_compute_budget_ixs: false,
    },
    DowngradeProfile {
        disable_farms_refresh: true,
        disable_post_farms_refresh: true,
        pre_reserve_refresh_mode: PreReserveRefreshMode::MinimalTwo,
        omit_compute_budget_ixs: true,
    },
];

/// Returns the profiles to try, in order. When `farm_required` (derived from
/// reserve state, i.e. at least one side of the liquidation has a farm
/// configured and the market requires its refresh), only profiles that keep
/// farms enabled are attempted.
pub fn profiles_for(farm_required: bool) -> Vec<DowngradeProfile> {
    DOWNGRADE_PROFILES
        .iter()
        .copied()
        .filter(|p| !farm_required || !p.disable_farms_refresh)
        .collect()
}

/// Everything needed to rebuild a [`LiquidationRequest`] under any
/// downgrade profile, without re-deriving reserve/obligation state each
/// time.
#[derive(Clone)]
pub struct ExecutionContext {
    pub klend_program_id: Pubkey,
    pub market_pubkey: Pubkey,
    pub lending_market_authority: Pubkey,
    pub liquidator: Pubkey,
    pub obligation_pubkey: Pubkey,
    pub obligation_owner: Pubkey,
    pub all_obligation_reserves: Vec<Pubkey>,
    pub repay: LiquidationReserveSide,
    pub withdraw: LiquidationReserveSide,
    pub liquidity_amount_base_units: u64,
    pub min_acceptable_received_collateral_amount: u64,
    pub flash_loan_symbol: FlashLoanSymbol,
    pub flash_loan_reserve_pubkey: Pubkey,
    pub flash_loan_reserve_liquidity_supply: Pubkey,
    pub flash_loan_reserve_token_program: Pubkey,
    pub flash_loan_ui_amount: String,
    pub compute_unit_limit: u32,
    pub compute_unit_price_micro_lamports: u64,
    pub swap: Option<SwapInstructions>,
    /// Destination ATAs already confirmed to exist on-chain, forwarded
    /// unchanged into every [`LiquidationRequest`] this context materializes.
    pub existing_atas: std::collections::HashSet<Pubkey>,
}

fn reserves_for_mode(ctx: &ExecutionContext, mode: PreReserveRefreshMode) -> Vec<Pubkey> {
    match mode {
        PreReserveRefreshMode::All => ctx.all_obligation_reserves.clone(),
        PreReserveRefreshMode::MinimalTwo => {
            let mut v = vec![ctx.repay.reserve_pubkey, ctx.withdraw.reserve_pubkey];
            v.dedup();
            v
        }
    }
}

/// `borrowIxIndex` is fully determined by how many compute-budget
/// instructions precede the flash-borrow in the canonical window: zero when
/// omitted, one when only the unit-limit is set, two when a unit-price is
/// also set.
fn compute_borrow_ix_index(profile: &DowngradeProfile, compute_unit_price_micro_lamports: u64) -> u8 {
    if profile.omit_compute_budget_ixs {
        0
    } else if compute_unit_price_micro_lamports > 0 {
        2
    } else {
        1
    }
}

fn materialize_request(ctx: &ExecutionContext, profile: DowngradeProfile, borrow_ix_index: u8) -> LiquidationRequest {
    let mut repay = ctx.repay.clone();
    let mut withdraw = ctx.withdraw.clone();
    if profile.disable_farms_refresh {
        repay.farm_pubkey = None;
        withdraw.farm_pubkey = None;
    }

    LiquidationRequest {
        klend_program_id: ctx.klend_program_id,
        market_pubkey: ctx.market_pubkey,
        lending_market_authority: ctx.lending_market_authority,
        liquidator: ctx.liquidator,
        obligation_pubkey: ctx.obligation_pubkey,
        obligation_owner: ctx.obligation_owner,
        obligation_reserves: reserves_for_mode(ctx, profile.pre_reserve_refresh_mode),
        flash_loan: FlashLoanRequest {
            market_pubkey: ctx.market_pubkey,
            klend_program_id: ctx.klend_program_id,
            signer: ctx.liquidator,
            symbol: ctx.flash_loan_symbol,
            reserve_pubkey: ctx.flash_loan_reserve_pubkey,
            reserve_liquidity_supply: ctx.flash_loan_reserve_liquidity_supply,
            reserve_token_program: ctx.flash_loan_reserve_token_program,
            lending_market_authority: ctx.lending_market_authority,
            ui_amount: ctx.flash_loan_ui_amount.clone(),
            borrow_ix_index,
        },
        repay,
        withdraw,
        liquidity_amount_base_units: ctx.liquidity_amount_base_units,
        min_acceptable_received_collateral_amount: ctx.min_acceptable_received_collateral_amount,
        compute_unit_limit: ctx.compute_unit_limit,
        compute_unit_price_micro_lamports: ctx.compute_unit_price_micro_lamports,
        swap: ctx.swap.clone(),
        existing_atas: ctx.existing_atas.clone(),
        omit_compute_budget_ixs: profile.omit_compute_budget_ixs,
        disable_post_farms_refresh: profile.disable_post_farms_refresh,
    }
}

fn find_flash_borrow_index(artifact: &LiquidationArtifact) -> Option<u8> {
    artifact
        .instructions
        .iter()
        .position(|ix| {
            ix.program_id == artifact.flash_loan.flash_borrow_ix.program_id
                && ix.data == artifact.flash_loan.flash_borrow_ix.data
        })
        .map(|i| i as u8)
}

/// Two-pass transaction assembly: build with a tentative `borrowIxIndex`
/// derived from the profile alone, then check the index the builder
/// actually placed the flash-borrow at and rebuild if it differs (e.g. a
/// future window-shape change upstream of the flash-borrow).
pub fn build_artifact_two_pass(ctx: &ExecutionContext, profile: DowngradeProfile) -> Result<LiquidationArtifact, LiqsolError> {
    let tentative_index = compute_borrow_ix_index(&profile, ctx.compute_unit_price_micro_lamports);
    let first_request = materialize_request(ctx, profile, tentative_index);
    let first_artifact = build_liquidation_window(&first_request)?;

    let actual_index = find_flash_borrow_index(&first_artifact)
        .ok_or_else(|| LiqsolError::bad_input("flash borrow instruction missing from assembled window"))?;
    if actual_index == tentative_index {
        return Ok(first_artifact);
    }

    let second_request = materialize_request(ctx, profile, actual_index);
    build_liquidation_window(&second_request)
}

fn decode_instructions(artifact: &LiquidationArtifact, validator_ctx: &ValidatorContext) -> Vec<DecodedInstruction> {
    artifact
        .instructions
        .iter()
        .map(|ix| classify_instruction(ix.program_id, &ix.data, validator_ctx))
        .collect()
}

#[derive(Debug, Clone)]
pub struct SimulationOutcome {
    pub err: Option<String>,
    pub logs: Vec<String>,
    pub units_consumed: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationLevel {
    Processed,
    Confirmed,
    Finalized,
}

#[derive(Debug, Clone)]
pub struct PolledStatus {
    pub confirmation_status: Option<ConfirmationLevel>,
    pub err: Option<String>,
}

/// Production/test collaborator boundary for everything that touches a
/// live RPC endpoint during execution, mirroring the [`crate::streaming`]
/// and [`crate::swap`] shim pattern so the downgrade loop and confirmation
/// state machine are unit-testable without a live cluster.
#[async_trait]
pub trait TransactionSubmitter: Send + Sync {
    async fn simulate(&self, tx: &VersionedTransaction) -> Result<SimulationOutcome, LiqsolError>;
    async fn send(&self, tx: &VersionedTransaction) -> Result<Signature, LiqsolError>;
    async fn get_signature_statuses(&self, signatures: &[Signature]) -> Result<Vec<Option<PolledStatus>>, LiqsolError>;
    async fn get_logs(&self, signature: &Signature) -> Result<Vec<String>, LiqsolError>;
}

pub struct RpcTransactionSubmitter {
    client: Arc<RpcClient>,
}

impl RpcTransactionSubmitter {
    pub fn new(client: Arc<RpcClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TransactionSubmitter for RpcTransactionSubmitter {
    async fn simulate(&self, tx: &VersionedTransaction) -> Result<SimulationOutcome, LiqsolError> {
        let config = RpcSimulateTransactionConfig {
            sig_verify: false,
            replace_recent_blockhash: true,
            commitment: Some(CommitmentConfig::processed()),
            ..RpcSimulateTransactionConfig::default()
        };
        let result = self.client.simulate_transaction_with_config(tx, config).await?;
        Ok(SimulationOutcome {
            err: result.value.err.map(|e| e.to_string()),
            logs: result.value.logs.unwrap_or_default(),
            units_consumed: result.value.units_consumed,
        })
    }

    async fn send(&self, tx: &VersionedTransaction) -> Result<Signature, LiqsolError> {
        self.client.send_transaction(tx).await.map_err(Into::into)
    }

    async fn get_signature_statuses(&self, signatures: &[Signature]) -> Result<Vec<Option<PolledStatus>>, LiqsolError> {
        let response = self.client.get_signature_statuses(signatures).await?;
        Ok(response
            .value
            .into_iter()
            .map(|maybe| {
                maybe.map(|status| PolledStatus {
                    confirmation_status: status.confirmation_status.map(|c| match c {
                        TransactionConfirmationStatus::Processed => ConfirmationLevel::Processed,
                        TransactionConfirmationStatus::Confirmed => ConfirmationLevel::Confirmed,
                        TransactionConfirmationStatus::Finalized => ConfirmationLevel::Finalized,
                    }),
                    err: status.err.map(|e| e.to_string()),
                })
            })
            .collect())
    }

    async fn get_logs(&self, signature: &Signature) -> Result<Vec<String>, LiqsolError> {
        let confirmed = self.client.get_transaction(signature, UiTransactionEncoding::Json).await?;
        let logs = confirmed
            .transaction
            .meta
            .map(|meta| match meta.log_messages {
                OptionSerializer::Some(logs) => logs,
                _ => Vec::new(),
            })
            .unwrap_or_default();
        Ok(logs)
    }
}

/// Deterministic fake driving a pre-scripted sequence of poll statuses and a
/// fixed simulate/send outcome, for unit tests of the downgrade loop and the
/// confirmation-polling state machine.
pub struct FakeTransactionSubmitter {
    pub simulate_outcomes: std::sync::Mutex<Vec<SimulationOutcome>>,
    pub poll_sequence: std::sync::Mutex<Vec<Option<PolledStatus>>>,
    pub send_signature: Signature,
}

#[async_trait]
impl TransactionSubmitter for FakeTransactionSubmitter {
    async fn simulate(&self, _tx: &VersionedTransaction) -> Result<SimulationOutcome, LiqsolError> {
        let mut outcomes = self.simulate_outcomes.lock().expect("fake submitter lock poisoned");
        if outcomes.is_empty() {
            return Err(LiqsolError::bad_input("fake submitter has no scripted simulate outcome left"));
        }
        Ok(outcomes.remove(0))
    }

    async fn send(&self, _tx: &VersionedTransaction) -> Result<Signature, LiqsolError> {
        Ok(self.send_signature)
    }

    async fn get_signature_statuses(&self, signatures: &[Signature]) -> Result<Vec<Option<PolledStatus>>, LiqsolError> {
        let mut sequence = self.poll_sequence.lock().expect("fake submitter lock poisoned");
        if sequence.is_empty() {
            return Ok(vec![None; signatures.len()]);
        }
        Ok(vec![sequence.remove(0)])
    }

    async fn get_logs(&self, _signature: &Signature) -> Result<Vec<String>, LiqsolError> {
        Ok(vec!["fake log".to_string()])
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PollParams {
    pub interval_ms: u64,
    pub timeout_ms: u64,
}

impl Default for PollParams {
    fn default() -> Self {
        Self {
            interval_ms: 500,
            timeout_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConfirmationOutcome {
    pub success: bool,
    pub poll_count: u32,
    pub duration_ms: u64,
    pub error: Option<String>,
    pub logs: Vec<String>,
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

/// `confirmSignatureByPolling`: polls `getSignatureStatuses` at
/// `interval_ms` up to `timeout_ms`. Terminal success on
/// `confirmed`/`finalized` with no error; terminal failure immediately on a
/// non-null error (no further polls); `processed` keeps polling; network
/// errors are logged and retried until timeout.
pub async fn confirm_signature_by_polling(
    submitter: &dyn TransactionSubmitter,
    signature: Signature,
    params: PollParams,
) -> ConfirmationOutcome {
    let start = Instant::now();
    let mut poll_count = 0u32;
    loop {
        poll_count += 1;
        match submitter.get_signature_statuses(&[signature]).await {
            Ok(statuses) => {
                if let Some(Some(status)) = statuses.into_iter().next() {
                    if let Some(err) = status.err {
                        let logs = submitter.get_logs(&signature).await.unwrap_or_default();
                        return ConfirmationOutcome {
                            success: false,
                            poll_count,
                            duration_ms: elapsed_ms(start),
                            error: Some(err),
                            logs,
                        };
                    }
                    if matches!(
                        status.confirmation_status,
                        Some(ConfirmationLevel::Confirmed) | Some(ConfirmationLevel::Finalized)
                    ) {
                        return ConfirmationOutcome {
                            success: true,
                            poll_count,
                            duration_ms: elapsed_ms(start),
                            error: None,
                            logs: Vec::new(),
                        };
                    }
                    // `processed` or an unrecognized status: keep polling.
                }
            }
            Err(e) => {
                warn!(error = %e, "network error polling signature status, retrying");
            }
        }

        if elapsed_ms(start) >= params.timeout_ms {
            return ConfirmationOutcome {
                success: false,
                poll_count,
                duration_ms: elapsed_ms(start),
                error: Some("timeout".to_string()),
                logs: Vec::new(),
            };
        }
        tokio::time::sleep(Duration::from_millis(params.interval_ms)).await;
    }
}

#[derive(Debug)]
pub struct DowngradeAttemptOutcome {
    pub profile: DowngradeProfile,
    pub artifact: LiquidationArtifact,
    pub transaction: VersionedTransaction,
    pub simulation: SimulationOutcome,
}

/// Builds, validates, and simulates a liquidation window across each
/// applicable downgrade profile in order, returning the first one that
/// simulates cleanly. Every failed profile's classified cause is tracked so
/// the caller can decide whether the exhausted plan should be marked
/// blocked.
pub async fn simulate_with_downgrades(
    ctx: &ExecutionContext,
    farm_required: bool,
    validator_ctx: &ValidatorContext,
    submitter: &dyn TransactionSubmitter,
    payer: &Keypair,
    other_signers: &[&Keypair],
    address_lookup_tables: &[AddressLookupTableAccount],
    blockhash: Hash,
) -> Result<DowngradeAttemptOutcome, LiqsolError> {
    let mut last_error: Option<LiqsolError> = None;

    for profile in profiles_for(farm_required) {
        let artifact = match build_artifact_two_pass(ctx, profile) {
            Ok(a) => a,
            Err(e) => {
                last_error = Some(e);
                continue;
            }
        };

        let decoded = decode_instructions(&artifact, validator_ctx);
        let require_pre_farms = artifact.pre_farm_count() > 0;
        let require_post_farms = !profile.disable_post_farms_refresh && artifact.pre_farm_count() > 0;
        let validation = validate_liquidation_window(&decoded, require_pre_farms, require_post_farms);
        if !validation.valid {
            last_error = Some(LiqsolError::AdjacencyInvalid {
                diagnostics: validation.diagnostics,
            });
            continue;
        }

        let message = match v0::Message::try_compile(&payer.pubkey(), &artifact.instructions, address_lookup_tables, blockhash) {
            Ok(m) => m,
            Err(e) => {
                last_error = Some(LiqsolError::bad_input(format!("failed to compile liquidation message: {e}")));
                continue;
            }
        };
        let mut signers = vec![payer];
        signers.extend(other_signers);
        let transaction = match VersionedTransaction::try_new(VersionedMessage::V0(message), &signers) {
            Ok(t) => t,
            Err(e) => {
                last_error = Some(LiqsolError::bad_input(format!("failed to sign liquidation transaction: {e}")));
                continue;
            }
        };

        let simulation = submitter.simulate(&transaction).await?;
        if let Some(_err) = &simulation.err {
            let classified = SimulationFailure::classify(&simulation.logs);
            last_error = Some(LiqsolError::SimulationFailed {
                logs: simulation.logs.clone(),
                classified,
            });
            continue;
        }

        return Ok(DowngradeAttemptOutcome {
            profile,
            artifact,
            transaction,
            simulation,
        });
    }

    Err(last_error.unwrap_or_else(|| LiqsolError::bad_input("no downgrade profile available to attempt")))
}

/// If `error` is a structural setup failure (not a transient/adjacency
/// issue), marks the plan blocked and returns `true`. Called after every
/// applicable downgrade profile has been exhausted without a clean
/// simulation.
pub async fn classify_and_maybe_block(
    setup_state: &mut SetupStateStore,
    key: &str,
    error: &LiqsolError,
    now_ms: u64,
) -> Result<bool, LiqsolError> {
    let reason = match error {
        LiqsolError::SimulationFailed {
            classified: SimulationFailure::InsufficientRent,
            ..
        } => Some("insufficient-rent"),
        LiqsolError::SimulationFailed {
            classified: SimulationFailure::ObligationMarketMismatch,
            ..
        } => Some("obligation-market-mismatch"),
        _ => None,
    };

    match reason {
        Some(reason) => {
            setup_state.mark_blocked(key, reason, now_ms).await?;
            info!(key, reason, "marked plan blocked after exhausting downgrade profiles");
            Ok(true)
        }
        None => Ok(false),
    }
}

/// Bounds the number of concurrently in-flight executor attempts to
/// [`BOT_MAX_INFLIGHT`].
pub struct ExecutorRunner {
    inflight: Arc<Semaphore>,
}

impl Default for ExecutorRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutorRunner {
    pub fn new() -> Self {
        Self {
            inflight: Arc::new(Semaphore::new(BOT_MAX_INFLIGHT)),
        }
    }

    pub async fn acquire(&self) -> OwnedSemaphorePermit {
        self.inflight.clone().acquire_owned().await.expect("inflight semaphore closed")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn side(farm: Option<Pubkey>, with_collateral: bool) -> LiquidationReserveSide {
        LiquidationReserveSide {
            reserve_pubkey: Pubkey::new_unique(),
            liquidity_mint: Pubkey::new_unique(),
            liquidity_supply: Pubkey::new_unique(),
            liquidity_token_program: spl_token::ID,
            collateral_mint: with_collateral.then(Pubkey::new_unique),
            collateral_supply: with_collateral.then(Pubkey::new_unique),
            farm_pubkey: farm,
        }
    }

    fn base_ctx(repay_farm: Option<Pubkey>, withdraw_farm: Option<Pubkey>) -> ExecutionContext {
        let repay = side(repay_farm, false);
        let withdraw = side(withdraw_farm, true);
        ExecutionContext {
            klend_program_id: Pubkey::new_unique(),
            market_pubkey: Pubkey::new_unique(),
            lending_market_authority: Pubkey::new_unique(),
            liquidator: Pubkey::new_unique(),
            obligation_pubkey: Pubkey::new_unique(),
            obligation_owner: Pubkey::new_unique(),
            all_obligation_reserves: vec![repay.reserve_pubkey, withdraw.reserve_pubkey],
            flash_loan_symbol: FlashLoanSymbol::Usdc,
            flash_loan_reserve_pubkey: repay.reserve_pubkey,
            flash_loan_reserve_liquidity_supply: repay.liquidity_supply,
            flash_loan_reserve_token_program: spl_token::ID,
            flash_loan_ui_amount: "100".to_string(),
            repay,
            withdraw,
            liquidity_amount_base_units: 100_000_000,
            min_acceptable_received_collateral_amount: 0,
            compute_unit_limit: 1_400_000,
            compute_unit_price_micro_lamports: 0,
            swap: None,
            existing_atas: std::collections::HashSet::new(),
        }
    }

    #[test]
    fn farm_required_filters_out_farm_disabling_profiles() {
        let profiles = profiles_for(true);
        assert!(profiles.iter().all(|p| !p.disable_farms_refresh));
        assert!(profiles.len() < DOWNGRADE_PROFILES.len());
    }

    #[test]
    fn farm_not_required_tries_every_profile() {
        assert_eq!(profiles_for(false).len(), DOWNGRADE_PROFILES.len());
    }

    #[test]
    fn two_pass_assembly_produces_consistent_borrow_ix_index() {
        let ctx = base_ctx(Some(Pubkey::new_unique()), None);
        for profile in DOWNGRADE_PROFILES {
            let artifact = build_artifact_two_pass(&ctx, *profile).unwrap();
            let actual = find_flash_borrow_index(&artifact).unwrap();
            assert_eq!(actual, compute_borrow_ix_index(profile, ctx.compute_unit_price_micro_lamports));
        }
    }

    #[test]
    fn minimal_two_mode_uses_only_repay_and_withdraw_reserves() {
        let ctx = base_ctx(None, None);
        let profile = DowngradeProfile {
            disable_farms_refresh: true,
            disable_post_farms_refresh: true,
            pre_reserve_refresh_mode: PreReserveRefreshMode::MinimalTwo,
            omit_compute_budget_ixs: false,
        };
        let request = materialize_request(&ctx, profile, 1);
        assert_eq!(request.obligation_reserves, vec![ctx.repay.reserve_pubkey, ctx.withdraw.reserve_pubkey]);
    }

    fn status(level: Option<ConfirmationLevel>, err: Option<&str>) -> Option<PolledStatus> {
        Some(PolledStatus {
            confirmation_status: level,
            err: err.map(|s| s.to_string()),
        })
    }

    #[tokio::test]
    async fn confirmation_succeeds_after_three_polls() {
        let submitter = FakeTransactionSubmitter {
            simulate_outcomes: std::sync::Mutex::new(vec![]),
            poll_sequence: std::sync::Mutex::new(vec![
                None,
                status(Some(ConfirmationLevel::Processed), None),
                status(Some(ConfirmationLevel::Confirmed), None),
            ]),
            send_signature: Signature::default(),
        };
        let params = PollParams {
            interval_ms: 1,
            timeout_ms: 1_000,
        };
        let outcome = confirm_signature_by_polling(&submitter, Signature::default(), params).await;
        assert!(outcome.success);
        assert_eq!(outcome.poll_count, 3);
        assert!(outcome.duration_ms <= 3 * params.interval_ms + 50);
    }

    #[tokio::test]
    async fn confirmation_fails_immediately_on_first_poll_error() {
        let submitter = FakeTransactionSubmitter {
            simulate_outcomes: std::sync::Mutex::new(vec![]),
            poll_sequence: std::sync::Mutex::new(vec![status(None, Some("InstructionError"))]),
            send_signature: Signature::default(),
        };
        let params = PollParams {
            interval_ms: 1,
            timeout_ms: 1_000,
        };
        let outcome = confirm_signature_by_polling(&submitter, Signature::default(), params).await;
        assert!(!outcome.success);
        assert_eq!(outcome.poll_count, 1);
        assert!(outcome.error.is_some());
    }

    #[tokio::test]
    async fn blocked_marking_triggers_on_insufficient_rent() {
        let dir = std::env::temp_dir().join(format!("liqsol-executor-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("setup_state.json");
        let mut store = SetupStateStore::load(&path).await.unwrap();

        let error = LiqsolError::SimulationFailed {
            logs: vec!["insufficient funds for rent".to_string()],
            classified: SimulationFailure::InsufficientRent,
        };
        let blocked = classify_and_maybe_block(&mut store, "obligation-1", &error, 1_000).await.unwrap();
        assert!(blocked);
        assert!(store.is_blocked("obligation-1"));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn adjacency_invalid_does_not_block() {
        let dir = std::env::temp_dir().join(format!("liqsol-executor-test-noblk-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("setup_state.json");
        let mut store = SetupStateStore::load(&path).await.unwrap();

        let error = LiqsolError::AdjacencyInvalid {
            diagnostics: "missing refreshObligation".to_string(),
        };
        let blocked = classify_and_maybe_block(&mut store, "obligation-2", &error, 1_000).await.unwrap();
        assert!(!blocked);
        assert!(!store.is_blocked("obligation-2"));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn runner_enforces_single_inflight_attempt() {
        let runner = ExecutorRunner::new();
        let _first = runner.acquire().await;
        let second = runner.inflight.clone().try_acquire_owned();
        assert!(second.is_err());
    }
}
