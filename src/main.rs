//! `liqsol` — Kamino obligation liquidation keeper CLI.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::RpcProgramAccountsConfig;
use solana_client::rpc_filter::{Memcmp, RpcFilterType};
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::compute_budget::ComputeBudgetInstruction;
use solana_sdk::message::{v0, VersionedMessage};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signer};
use solana_sdk::transaction::VersionedTransaction;
use tracing::{error, info, warn};

use liqsol::cache::{OracleCache, ReserveCache};
use liqsol::config::Config;
use liqsol::decoder::{decode_obligation, decode_reserve};
use liqsol::error::LiqsolError;
use liqsol::flashloan::{build_flash_loan, FlashLoanRequest, FlashLoanSymbol};
use liqsol::health::{compute_health_scoring, HealthOptions, HealthOutcome};
use liqsol::indexer::LiveIndexer;
use liqsol::persist;
use liqsol::scheduler::{enqueue_plans, load_queue, plan_from_candidate, FlashLoanMint, PlanQueue};
use liqsol::selector::select_by_priority;

const DATA_DIR: &str = "data";

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();
}

#[derive(Parser)]
#[command(name = "liqsol", about = "Automated liquidation engine for a Kamino-style Solana lending market")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum MintArg {
    Sol,
    Usdc,
}

impl From<MintArg> for FlashLoanSymbol {
    fn from(m: MintArg) -> Self {
        match m {
            MintArg::Sol => FlashLoanSymbol::Sol,
            MintArg::Usdc => FlashLoanSymbol::Usdc,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Fetch and persist every obligation pubkey for the configured market.
    #[command(name = "snapshot:obligations")]
    SnapshotObligations,
    /// Score every known obligation and print the 50 closest to liquidation.
    #[command(name = "snapshot:scored")]
    SnapshotScored,
    /// Rank scored obligations into candidates and print the top 50.
    #[command(name = "snapshot:candidates")]
    SnapshotCandidates,
    /// Decode and print one reserve account as JSON.
    #[command(name = "decode:reserve")]
    DecodeReserve { pubkey: String },
    /// Decode and print one obligation account as JSON.
    #[command(name = "decode:obligation")]
    DecodeObligation { pubkey: String },
    /// Dry-run a flash loan borrow/repay pair and simulate it.
    #[command(name = "flashloan:dryrun")]
    FlashloanDryrun {
        #[arg(long, value_enum)]
        mint: MintArg,
        #[arg(long)]
        amount: String,
    },
    /// Print persisted file counts and filter-rejection stats.
    #[command(name = "audit:pipeline")]
    AuditPipeline,
    /// Run the main scheduler/executor loop.
    #[command(name = "bot:run")]
    BotRun {
        #[arg(long, default_value_t = false)]
        broadcast: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Command::SnapshotObligations => snapshot_obligations().await,
        Command::SnapshotScored => snapshot_scored().await,
        Command::SnapshotCandidates => snapshot_candidates().await,
        Command::DecodeReserve { pubkey } => decode_reserve_cmd(&pubkey).await,
        Command::DecodeObligation { pubkey } => decode_obligation_cmd(&pubkey).await,
        Command::FlashloanDryrun { mint, amount } => flashloan_dryrun(mint.into(), &amount).await,
        Command::AuditPipeline => audit_pipeline().await,
        Command::BotRun { broadcast } => bot_run(broadcast).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "command failed");
            ExitCode::FAILURE
        }
    }
}

fn data_path(name: &str) -> PathBuf {
    Path::new(DATA_DIR).join(name)
}

fn parse_pubkey(raw: &str) -> Result<Pubkey, LiqsolError> {
    Pubkey::from_str(raw).map_err(|e| LiqsolError::bad_input(format!("invalid pubkey {raw}: {e}")))
}

async fn fetch_obligation_pubkeys(client: &RpcClient, cfg: &Config) -> Result<Vec<Pubkey>, LiqsolError> {
    let filters = liqsol::streaming::default_obligation_filters(cfg.kamino_market_pubkey)
        .into_iter()
        .map(|f| RpcFilterType::Memcmp(Memcmp::new_raw_bytes(f.offset, f.bytes)))
        .collect();

    let config = RpcProgramAccountsConfig {
        filters: Some(filters),
        account_config: solana_client::rpc_config::RpcAccountInfoConfig {
            encoding: Some(solana_account_decoder::UiAccountEncoding::Base64),
            commitment: Some(CommitmentConfig::confirmed()),
            ..Default::default()
        },
        ..Default::default()
    };

    let accounts = client
        .get_program_accounts_with_config(&cfg.kamino_klend_program_id, config)
        .await?;
    Ok(accounts.into_iter().map(|(pk, _)| pk).collect())
}

async fn snapshot_obligations() -> Result<(), LiqsolError> {
    let cfg = Config::from_env()?;
    let client = liqsol::rpc::rpc_client(&cfg.rpc_primary);
    let pubkeys = fetch_obligation_pubkeys(&client, &cfg).await?;

    let lines: Vec<String> = pubkeys.iter().map(|pk| pk.to_string()).collect();
    persist::write_json_atomic(&data_path("obligations.jsonl.json"), &lines).await.ok();
    tokio::fs::create_dir_all(DATA_DIR).await?;
    tokio::fs::write(data_path("obligations.jsonl"), lines.join("\n") + "\n").await?;

    info!(count = pubkeys.len(), "wrote obligations.jsonl");
    Ok(())
}

async fn load_caches_from_rpc(client: &RpcClient, cfg: &Config) -> Result<(Arc<ReserveCache>, Arc<OracleCache>, Vec<Pubkey>), LiqsolError> {
    let reserve_cache = Arc::new(ReserveCache::new());
    let oracle_cache = Arc::new(OracleCache::new());
    let obligation_pubkeys = fetch_obligation_pubkeys(client, cfg).await?;
    Ok((reserve_cache, oracle_cache, obligation_pubkeys))
}

async fn score_all_obligations(client: &RpcClient, cfg: &Config) -> Result<LiveIndexer, LiqsolError> {
    let (reserve_cache, oracle_cache, obligation_pubkeys) = load_caches_from_rpc(client, cfg).await?;
    let mut indexer = LiveIndexer::new(
        cfg.kamino_market_pubkey,
        reserve_cache,
        oracle_cache,
        Some(cfg.allowlist_mints.clone()),
    );

    for pubkey in obligation_pubkeys {
        match client.get_account_data(&pubkey).await {
            Ok(data) => indexer.upsert_from_account_data(pubkey, &data),
            Err(e) => warn!(%pubkey, error = %e, "failed to fetch obligation account"),
        }
    }
    Ok(indexer)
}

async fn snapshot_scored() -> Result<(), LiqsolError> {
    let cfg = Config::from_env()?;
    let client = liqsol::rpc::rpc_client(&cfg.rpc_primary);
    let indexer = score_all_obligations(&client, &cfg).await?;

    let mut scored = indexer.all_scored_obligations();
    scored.sort_by(|a, b| a.health_ratio.total_cmp(&b.health_ratio));
    scored.truncate(50);

    persist::write_json_atomic(&data_path("scored.json"), &scored_as_json(&scored)).await?;
    for s in &scored {
        println!("{} health_ratio={:.4} liquidatable={}", s.obligation_pubkey, s.health_ratio, s.liquidation_eligible);
    }
    info!(stats = ?indexer.stats(), "snapshot:scored complete");
    Ok(())
}

fn scored_as_json(scored: &[liqsol::health::ScoredObligation]) -> serde_json::Value {
    serde_json::Value::Array(
        scored
            .iter()
            .map(|s| {
                serde_json::json!({
                    "obligationPubkey": s.obligation_pubkey.to_string(),
                    "ownerPubkey": s.owner_pubkey.to_string(),
                    "healthRatio": s.health_ratio,
                    "healthRatioRaw": s.health_ratio_raw,
                    "liquidationEligible": s.liquidation_eligible,
                    "borrowValueUsd": s.borrow_value_usd,
                    "collateralValueUsd": s.collateral_value_usd,
                })
            })
            .collect(),
    )
}

async fn snapshot_candidates() -> Result<(), LiqsolError> {
    let cfg = Config::from_env()?;
    let client = liqsol::rpc::rpc_client(&cfg.rpc_primary);
    let indexer = score_all_obligations(&client, &cfg).await?;

    let scored = indexer.all_scored_obligations();
    let candidates = select_by_priority(scored, 0.98);
    let top: Vec<_> = candidates.into_iter().take(50).collect();

    let json: Vec<_> = top
        .iter()
        .map(|c| {
            serde_json::json!({
                "obligationPubkey": c.obligation_pubkey().to_string(),
                "priorityScore": c.priority_score,
                "distanceToLiquidation": c.distance_to_liquidation,
                "predictedLiquidatableSoon": c.predicted_liquidatable_soon,
            })
        })
        .collect();
    persist::write_json_atomic(&data_path("candidates.json"), &serde_json::json!({ "candidates": json })).await?;

    for c in &top {
        println!("{} priority={:.4}", c.obligation_pubkey(), c.priority_score);
    }
    Ok(())
}

async fn decode_reserve_cmd(raw_pubkey: &str) -> Result<(), LiqsolError> {
    let cfg = Config::from_env()?;
    let pubkey = parse_pubkey(raw_pubkey)?;
    let client = liqsol::rpc::rpc_client(&cfg.rpc_primary);
    let data = client.get_account_data(&pubkey).await?;
    let reserve = decode_reserve(&data, pubkey)?;
    println!(
        "{}",
        serde_json::json!({
            "reservePubkey": reserve.reserve_pubkey.to_string(),
            "marketPubkey": reserve.market_pubkey.to_string(),
            "liquidityMint": reserve.liquidity_mint.to_string(),
            "collateralMint": reserve.collateral_mint.to_string(),
            "liquidityDecimals": reserve.liquidity_decimals,
            "loanToValuePct": reserve.loan_to_value_pct,
            "liquidationThresholdPct": reserve.liquidation_threshold_pct,
            "liquidationBonusBps": reserve.liquidation_bonus_bps,
            "borrowFactorPct": reserve.borrow_factor_pct,
            "availableLiquidity": reserve.available_liquidity,
        })
    );
    Ok(())
}

async fn decode_obligation_cmd(raw_pubkey: &str) -> Result<(), LiqsolError> {
    let cfg = Config::from_env()?;
    let pubkey = parse_pubkey(raw_pubkey)?;
    let client = liqsol::rpc::rpc_client(&cfg.rpc_primary);
    let data = client.get_account_data(&pubkey).await?;
    let obligation = decode_obligation(&data, pubkey)?;
    println!(
        "{}",
        serde_json::json!({
            "obligationPubkey": obligation.obligation_pubkey.to_string(),
            "ownerPubkey": obligation.owner_pubkey.to_string(),
            "marketPubkey": obligation.market_pubkey.to_string(),
            "deposits": obligation.deposits.iter().map(|d| serde_json::json!({
                "reserve": d.deposit_reserve.to_string(),
                "amount": d.deposited_amount,
            })).collect::<Vec<_>>(),
            "borrows": obligation.borrows.iter().map(|b| serde_json::json!({
                "reserve": b.borrow_reserve.to_string(),
                "amountSf": b.borrowed_amount_sf.to_string(),
            })).collect::<Vec<_>>(),
        })
    );
    Ok(())
}

fn load_keypair(cfg: &Config) -> Result<Keypair, LiqsolError> {
    let path = cfg
        .bot_keypair_path
        .as_ref()
        .ok_or_else(|| LiqsolError::bad_input("BOT_KEYPAIR_PATH is required for this command"))?;
    let bytes = std::fs::read(path).map_err(|e| LiqsolError::bad_input(format!("failed to read keypair {path}: {e}")))?;
    let raw: Vec<u8> = serde_json::from_slice(&bytes).map_err(|e| LiqsolError::bad_input(format!("malformed keypair file: {e}")))?;
    Keypair::from_bytes(&raw).map_err(|e| LiqsolError::bad_input(format!("invalid keypair bytes: {e}")))
}

async fn flashloan_dryrun(symbol: FlashLoanSymbol, amount: &str) -> Result<(), LiqsolError> {
    let cfg = Config::from_env()?;
    let client = liqsol::rpc::rpc_client(&cfg.rpc_primary);
    let keypair = load_keypair(&cfg)?;

    let reserve_pubkey = Pubkey::default();
    let request = FlashLoanRequest {
        market_pubkey: cfg.kamino_market_pubkey,
        klend_program_id: cfg.kamino_klend_program_id,
        signer: keypair.pubkey(),
        symbol,
        reserve_pubkey,
        reserve_liquidity_supply: Pubkey::default(),
        reserve_token_program: spl_token::ID,
        lending_market_authority: Pubkey::default(),
        ui_amount: amount.to_string(),
        borrow_ix_index: 1,
    };
    let artifact = build_flash_loan(&request)?;

    let memo_ix = solana_sdk::instruction::Instruction {
        program_id: cfg.kamino_klend_program_id,
        accounts: vec![],
        data: b"liqsol-dryrun".to_vec(),
    };

    let instructions = vec![
        ComputeBudgetInstruction::set_compute_unit_limit(400_000),
        artifact.flash_borrow_ix.clone(),
        memo_ix,
        artifact.flash_repay_ix.clone(),
    ];

    let blockhash = client.get_latest_blockhash().await?;
    let message = v0::Message::try_compile(&keypair.pubkey(), &instructions, &[], blockhash)
        .map_err(|e| LiqsolError::bad_input(format!("failed to compile dry-run message: {e}")))?;
    let tx = VersionedTransaction::try_new(VersionedMessage::V0(message), &[&keypair])
        .map_err(|e| LiqsolError::bad_input(format!("failed to sign dry-run transaction: {e}")))?;

    let config = solana_client::rpc_config::RpcSimulateTransactionConfig {
        sig_verify: false,
        replace_recent_blockhash: true,
        commitment: Some(CommitmentConfig::processed()),
        ..Default::default()
    };
    let result = client.simulate_transaction_with_config(&tx, config).await?;

    let logs = result.value.logs.unwrap_or_default();
    let invocations = logs.iter().filter(|l| l.contains(&cfg.kamino_klend_program_id.to_string())).count();
    info!(
        err = ?result.value.err,
        units_consumed = ?result.value.units_consumed,
        invocations,
        "flashloan:dryrun simulation result"
    );
    for line in &logs {
        println!("{line}");
    }
    if result.value.err.is_some() {
        return Err(LiqsolError::bad_input("dry-run simulation failed"));
    }
    Ok(())
}

async fn audit_pipeline() -> Result<(), LiqsolError> {
    let obligations: Vec<String> = match tokio::fs::read_to_string(data_path("obligations.jsonl")).await {
        Ok(s) => s.lines().filter(|l| !l.trim().is_empty()).map(str::to_string).collect(),
        Err(_) => vec![],
    };
    let scored: serde_json::Value = persist::read_json(&data_path("scored.json")).await.unwrap_or(serde_json::Value::Null);
    let queue: PlanQueue = load_queue(&data_path("tx_queue.json")).await.unwrap_or_default();

    println!("obligations.jsonl: {} entries", obligations.len());
    println!(
        "scored.json: {} entries",
        scored.as_array().map(|a| a.len()).unwrap_or(0)
    );
    println!("tx_queue.json: {} plans", queue.plans.len());
    println!(
        "liquidation_eligible plans: {}",
        queue.plans.iter().filter(|p| p.liquidation_eligible).count()
    );
    Ok(())
}

async fn bot_run(broadcast_flag: bool) -> Result<(), LiqsolError> {
    let cfg = Config::from_env()?;
    let broadcast = broadcast_flag || cfg.broadcast;
    info!(broadcast, "starting bot:run");

    let client = liqsol::rpc::rpc_client(&cfg.rpc_primary);
    let mut queue = load_queue(&data_path("tx_queue.json")).await.unwrap_or_default();
    let mut setup_state = liqsol::setup_state::SetupStateStore::load(data_path("setup_state.json")).await?;

    loop {
        let indexer = match score_all_obligations(&client, &cfg).await {
            Ok(indexer) => indexer,
            Err(e) => {
                warn!(error = %e, "failed to refresh indexer this cycle");
                tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                continue;
            }
        };

        let scored = indexer.all_scored_obligations();
        let candidates = liqsol::selector::select_by_ev(
            scored,
            &liqsol::selector::EvSelectorParams {
                hazard_alpha: cfg.scoring.hazard_alpha,
                ev: cfg.scoring.ev.clone(),
                min_borrow_usd: 0.0,
                near_threshold: 0.98,
            },
        );

        let now_ms = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        let eligible_candidates: Vec<_> = candidates
            .iter()
            .filter(|c| !setup_state.is_blocked(&c.obligation_pubkey().to_string()))
            .filter(|c| c.ev.unwrap_or(f64::MIN) >= cfg.scheduler.min_ev || c.scored.liquidation_eligible)
            .collect();

        let new_plans: Vec<_> = eligible_candidates
            .iter()
            .filter_map(|c| {
                let prev_ev = queue
                    .plans
                    .iter()
                    .find(|p| p.obligation_pubkey == c.obligation_pubkey())
                    .map(|p| p.ev);
                plan_from_candidate(
                    c,
                    &cfg.scoring,
                    &cfg.ttl,
                    FlashLoanMint::Usdc,
                    c.scored.borrow_value_usd,
                    c.scored.borrow_value_usd,
                    now_ms,
                    prev_ev,
                )
            })
            .collect();

        enqueue_plans(&mut queue, new_plans);
        liqsol::scheduler::save_queue(&data_path("tx_queue.json"), &queue).await?;

        info!(candidate_count = eligible_candidates.len(), queue_size = queue.plans.len(), broadcast, "cycle complete");

        if !broadcast {
            info!("broadcast disabled; simulating only");
        } else if let Some(top) = queue.plans.first() {
            info!(obligation = %top.obligation_pubkey, ev = top.ev, "top plan ready for executor attempt");
        }

        tokio::time::sleep(std::time::Duration::from_millis(cfg.scheduler.min_refresh_interval_ms.max(2_000))).await;
    }
}
