use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use attmig_client::{AttestationRegistry, RpcClient};
use attmig_migrator::{
    AttestationLedger, CheckpointStore, IssuerPolicy, MigrationError, MigrationPlan,
    MigrationRunner, RetryExecutor, RetryPolicy,
};
use clap::{Parser as ClapParser, Subcommand as ClapSubcommand, ValueEnum};
use ethereum_types::Address;
use eyre::{OptionExt, Result, WrapErr, bail};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::networks::Network;

const DEFAULT_CHUNK_SIZE: u64 = 5;
const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 4_000;
const DEFAULT_RETRY_JITTER_MS: u64 = 2_000;
const MAX_RETRY_DELAY_MS: u64 = 600_000;
const GWEI: u64 = 1_000_000_000;

#[allow(clippy::upper_case_acronyms)]
#[derive(ClapParser)]
#[command(name = "attmig", about = "attestation registry migration tools")]
pub struct CLI {
    #[command(subcommand)]
    pub command: Subcommand,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum IssuerPolicyArg {
    Preserve,
    Reset,
}

impl From<IssuerPolicyArg> for IssuerPolicy {
    fn from(arg: IssuerPolicyArg) -> Self {
        match arg {
            IssuerPolicyArg::Preserve => IssuerPolicy::Preserve,
            IssuerPolicyArg::Reset => IssuerPolicy::ResetToZero,
        }
    }
}

#[derive(ClapSubcommand)]
pub enum Subcommand {
    #[command(
        name = "migrate",
        about = "Migrate attestation records to the new registry storage layout"
    )]
    Migrate {
        #[arg(long = "rpc-url", env = "ATTMIG_RPC_URL")]
        /// JSON-RPC endpoint of the ledger node
        rpc_url: String,
        #[arg(long = "network")]
        /// Known deployment whose registry address to use
        network: Option<Network>,
        #[arg(long = "registry", value_parser = parse_address)]
        /// Registry contract address; overrides --network
        registry: Option<Address>,
        #[arg(long = "signer", value_parser = parse_address)]
        /// Node-managed account the migration transactions are sent from
        signer: Address,
        #[arg(long = "accounts-file")]
        /// File with one account address per line
        accounts_file: Option<PathBuf>,
        #[arg(long = "from-block")]
        /// Collect the working set from issuance logs starting at this block
        from_block: Option<u64>,
        #[arg(long = "to-block")]
        /// Last block of the log scan (inclusive)
        to_block: Option<u64>,
        #[arg(long = "chunk-size", default_value_t = DEFAULT_CHUNK_SIZE, value_parser = clap::value_parser!(u64).range(1..=10_000))]
        /// Accounts per migration transaction (1-10000, inclusive)
        chunk_size: u64,
        #[arg(long = "resume-index")]
        /// First chunk index to submit; overrides the checkpoint file
        resume_index: Option<u64>,
        #[arg(long = "checkpoint-file")]
        /// Path of the durable progress marker
        checkpoint_file: Option<PathBuf>,
        #[arg(long = "run-id")]
        /// Identifier tying checkpoints to one logical run
        run_id: Option<String>,
        #[arg(long = "gas-ceiling")]
        /// Starting gas limit; adaptive tuning replaces it on gas failures
        gas_ceiling: Option<u64>,
        #[arg(long = "price-ceiling-gwei")]
        /// Maximum fee per gas, in gwei
        price_ceiling_gwei: Option<u64>,
        #[arg(long = "max-attempts", value_parser = clap::value_parser!(u32).range(1..))]
        /// Cap on attempts per call; unbounded when omitted
        max_attempts: Option<u32>,
        #[arg(long = "retry-base-delay-ms", default_value_t = DEFAULT_RETRY_BASE_DELAY_MS, value_parser = clap::value_parser!(u64).range(0..=MAX_RETRY_DELAY_MS))]
        /// Fixed inter-attempt delay in milliseconds
        retry_base_delay_ms: u64,
        #[arg(long = "retry-jitter-ms", default_value_t = DEFAULT_RETRY_JITTER_MS, value_parser = clap::value_parser!(u64).range(0..=MAX_RETRY_DELAY_MS))]
        /// Upper bound of the random delay added on top of the base
        retry_jitter_ms: u64,
        #[arg(long = "issuer-policy", value_enum, default_value_t = IssuerPolicyArg::Preserve)]
        /// Expected issuer field after migration
        issuer_policy: IssuerPolicyArg,
        #[arg(long = "dry-run", default_value_t = false)]
        /// Print the chunk plan without submitting anything
        dry_run: bool,
    },
}

impl Subcommand {
    pub async fn run(self) -> Result<()> {
        match self {
            Subcommand::Migrate {
                rpc_url,
                network,
                registry,
                signer,
                accounts_file,
                from_block,
                to_block,
                chunk_size,
                resume_index,
                checkpoint_file,
                run_id,
                gas_ceiling,
                price_ceiling_gwei,
                max_attempts,
                retry_base_delay_ms,
                retry_jitter_ms,
                issuer_policy,
                dry_run,
            } => {
                let registry_address = registry
                    .or_else(|| network.map(Network::registry_address))
                    .ok_or_eyre("either --registry or --network is required")?;

                let cancel = CancellationToken::new();
                spawn_ctrl_c_handler(cancel.clone());

                let rpc = RpcClient::new(&rpc_url);
                let registry = AttestationRegistry::new(rpc, registry_address, signer)
                    .with_cancellation(cancel.clone());

                let policy = RetryPolicy {
                    base_delay: Duration::from_millis(retry_base_delay_ms),
                    jitter_max: Duration::from_millis(retry_jitter_ms),
                    max_attempts,
                };

                let working_set = load_working_set(
                    &registry,
                    &RetryExecutor::new(policy.clone(), cancel.clone()),
                    accounts_file.as_deref(),
                    from_block,
                    to_block,
                )
                .await?;

                let mut plan = MigrationPlan::new(working_set, chunk_size as usize);
                plan.gas_limit = gas_ceiling;
                plan.max_fee_per_gas = price_ceiling_gwei
                    .map(|gwei| {
                        gwei.checked_mul(GWEI)
                            .ok_or_eyre("--price-ceiling-gwei overflows when scaled to wei")
                    })
                    .transpose()?;

                let checkpoint = checkpoint_file.map(|path| {
                    let run_id = run_id
                        .unwrap_or_else(|| format!("{registry_address:#x}-{chunk_size}"));
                    CheckpointStore::new(path, run_id)
                });

                plan.resume_index = match resume_index {
                    Some(index) => index as usize,
                    None => match &checkpoint {
                        Some(store) => store.resume_index()?.unwrap_or(0),
                        None => 0,
                    },
                };

                if dry_run {
                    print_plan(&plan);
                    return Ok(());
                }

                let executor = RetryExecutor::new(policy, cancel);
                let runner =
                    MigrationRunner::new(&registry, executor, checkpoint, issuer_policy.into());

                match runner.run(plan).await {
                    Ok(summary) => {
                        println!(
                            "migrated {} account(s) in {} chunk(s), {} gas, {} record(s) verified, {:.1}s",
                            summary.accounts_migrated,
                            summary.chunks_submitted,
                            summary.total_gas_used,
                            summary.records_verified,
                            summary.elapsed.as_secs_f64(),
                        );
                        Ok(())
                    }
                    Err(MigrationError::VerificationMismatch(mismatches)) => {
                        for mismatch in &mismatches {
                            error!(%mismatch, "verification mismatch");
                        }
                        bail!("verification failed with {} mismatch(es)", mismatches.len())
                    }
                    Err(err) => {
                        if let MigrationError::FatalSettlement { resume_from, .. } = &err {
                            warn!(
                                resume_from = *resume_from,
                                "re-run with --resume-index to continue"
                            );
                        }
                        Err(err).wrap_err("migration failed")
                    }
                }
            }
        }
    }
}

fn spawn_ctrl_c_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, stopping after the current attempt");
            cancel.cancel();
        }
    });
}

async fn load_working_set(
    registry: &AttestationRegistry,
    executor: &RetryExecutor,
    accounts_file: Option<&std::path::Path>,
    from_block: Option<u64>,
    to_block: Option<u64>,
) -> Result<Vec<Address>> {
    match (accounts_file, from_block, to_block) {
        (Some(path), None, None) => {
            let contents = fs::read_to_string(path)
                .wrap_err_with(|| format!("reading accounts file {}", path.display()))?;
            parse_accounts_file(&contents)
        }
        (None, Some(from), Some(to)) => {
            if from > to {
                bail!("--from-block {from} is past --to-block {to}");
            }
            let accounts = executor
                .execute_with_retry("account collection", |_| async move {
                    AttestationLedger::collect_accounts(registry, from, to).await
                })
                .await
                .wrap_err("collecting accounts from issuance logs")?;
            info!(accounts = accounts.len(), from, to, "working set collected from logs");
            Ok(accounts)
        }
        (None, _, _) => {
            bail!("either --accounts-file or both --from-block and --to-block are required")
        }
        (Some(_), _, _) => {
            bail!("--accounts-file conflicts with --from-block/--to-block")
        }
    }
}

fn parse_accounts_file(contents: &str) -> Result<Vec<Address>> {
    let mut accounts = Vec::new();
    for (number, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let address = parse_address(line)
            .map_err(|err| eyre::eyre!("line {}: {err}", number + 1))?;
        accounts.push(address);
    }
    if accounts.is_empty() {
        bail!("accounts file contains no addresses");
    }
    Ok(accounts)
}

fn parse_address(s: &str) -> Result<Address, String> {
    let stripped = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(stripped).map_err(|err| format!("invalid hex address: {err}"))?;
    if bytes.len() != 20 {
        return Err(format!("address must be 20 bytes, got {}", bytes.len()));
    }
    Ok(Address::from_slice(&bytes))
}

fn print_plan(plan: &MigrationPlan) {
    println!(
        "{} account(s), chunk size {}, {} chunk(s), resuming at chunk index {}",
        plan.working_set.len(),
        plan.chunk_size,
        plan.num_chunks(),
        plan.resume_index,
    );
    for (index, chunk) in plan.chunks().enumerate() {
        let status = if index < plan.resume_index {
            "done"
        } else {
            "pending"
        };
        let first = chunk.first().map(|a| format!("{a:#x}")).unwrap_or_default();
        let last = chunk.last().map(|a| format!("{a:#x}")).unwrap_or_default();
        println!(
            "  chunk {:>4}: {} account(s) [{first} .. {last}] {status}",
            index,
            chunk.len(),
        );
    }
}
