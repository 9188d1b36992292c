use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use admin_core::{
    dry_run::DryRunReport, CommandEditorController, ControllerConfig, SessionView,
};
use anyhow::{bail, Context, Result};
use chain::{
    abi,
    selectors::humanize_selector,
    ChainReader, ContractTransport, JsonRpcTransport, MissingWallet, RpcWallet, WalletProvider,
};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use shared::{
    domain::{Address, BlockMeta, HookPath, PoolId, ResolvedAddressSet, Selector, TxRecord},
    error::{CoreError, ErrorReport},
};
use tokio::io::AsyncReadExt;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;

use config::{load_settings, Settings};

#[derive(Parser, Debug)]
#[command(name = "hookctl", about = "Inspect and edit pool hook commands")]
struct Cli {
    /// Settings file; defaults to ./hookctl.toml when present.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Print machine-readable JSON instead of text.
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug, Clone)]
struct PoolTarget {
    pool: PoolId,
    #[arg(long)]
    hook_path: Option<HookPath>,
}

impl PoolTarget {
    fn hook_path(&self) -> HookPath {
        self.hook_path.unwrap_or_default()
    }
}

#[derive(Args, Debug, Clone)]
struct DraftInput {
    #[command(flatten)]
    target: PoolTarget,
    /// Draft JSON file, or `-` for stdin.
    draft: PathBuf,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Probe a registry contract for component addresses.
    Resolve {
        #[arg(long)]
        seed: Option<Address>,
    },
    /// Show the commands, locks and fees on chain for a pool.
    Show(PoolTarget),
    /// Validate a draft against the pool without writing.
    DryRun(DraftInput),
    Estimate(DraftInput),
    Submit(DraftInput),
    /// Apply catalog blocks to a pool.
    ApplyBlocks {
        pool: PoolId,
        #[arg(required = true)]
        block_ids: Vec<u64>,
        #[arg(long)]
        estimate_only: bool,
    },
    /// Compute a selector from a signature, or name a known selector.
    Selector { input: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(cli.config.as_deref())?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.log_filter.as_str()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let json = cli.json;
    match run(cli, settings).await {
        Ok(()) => Ok(()),
        Err(err) => match err.downcast_ref::<CoreError>() {
            Some(core) if json => {
                print_json(&ErrorReport::from(core))?;
                std::process::exit(1);
            }
            _ => Err(err),
        },
    }
}

async fn run(cli: Cli, settings: Settings) -> Result<()> {
    let json = cli.json;
    match cli.command {
        Command::Selector { input } => {
            let selector = match input.parse::<Selector>() {
                Ok(selector) => selector,
                Err(_) => abi::selector(input.trim()),
            };
            let name = humanize_selector(&selector);
            if json {
                print_json(&json!({ "selector": selector, "signature": name }))?;
            } else {
                println!("{selector} {name}");
            }
        }
        Command::Resolve { seed } => {
            let controller = connect(&settings).await?;
            let set = controller.resolve_addresses(seed).await?;
            if json {
                print_json(&*set)?;
            } else {
                print_addresses(&set);
            }
        }
        Command::Show(target) => {
            let controller = connect(&settings).await?;
            let view = controller
                .open_session(target.pool, target.hook_path())
                .await?;
            if json {
                print_json(&json!({
                    "poolId": view.pool,
                    "hookPath": view.hook_path,
                    "snapshot": view.snapshot,
                }))?;
            } else {
                print_session(&view);
            }
        }
        Command::DryRun(input) => {
            let controller = open_draft(&settings, &input).await?;
            let report = controller.dry_run().await?;
            if json {
                print_json(&report)?;
            } else {
                print_report(&report);
            }
        }
        Command::Estimate(input) => {
            let controller = open_draft(&settings, &input).await?;
            let gas = controller.estimate().await?;
            if json {
                print_json(&json!({ "gas": gas.to_string() }))?;
            } else {
                println!("estimated gas: {gas}");
            }
        }
        Command::Submit(input) => {
            let controller = open_draft(&settings, &input).await?;
            let record = controller.submit().await?;
            print_record(&record, json)?;
        }
        Command::ApplyBlocks {
            pool,
            block_ids,
            estimate_only,
        } => {
            let controller = connect(&settings).await?;
            controller.open_session(pool, HookPath::default()).await?;
            for id in block_ids {
                controller
                    .append_block(BlockMeta {
                        id,
                        representative_hook: String::new(),
                        enabled: true,
                        immutable: false,
                        description: None,
                        commands: None,
                    })
                    .await?;
            }
            if estimate_only {
                let gas = controller.estimate_apply_blocks().await?;
                if json {
                    print_json(&json!({ "gas": gas.to_string() }))?;
                } else {
                    println!("estimated gas: {gas}");
                }
            } else {
                let record = controller.submit_apply_blocks().await?;
                print_record(&record, json)?;
            }
        }
    }
    Ok(())
}

async fn connect(settings: &Settings) -> Result<Arc<CommandEditorController>> {
    let endpoint = settings.rpc_endpoint()?;
    let transport: Arc<dyn ContractTransport> = Arc::new(JsonRpcTransport::new(endpoint.clone()));
    let chain_id = transport
        .chain_id()
        .await
        .with_context(|| format!("failed to reach rpc node at {endpoint}"))?;
    if let Some(expected) = settings.chain_id {
        if expected != chain_id {
            bail!("rpc node reports chain {chain_id}, expected {expected}");
        }
    }
    info!(%endpoint, chain_id, "hookctl: connected");

    let wallet = RpcWallet::new(Arc::clone(&transport), settings.receipt_policy());
    let wallet: Arc<dyn WalletProvider> = match wallet.connect(settings.from_address).await {
        Ok(()) => Arc::new(wallet),
        Err(err) => {
            warn!(error = %err, "hookctl: no signing account, writes disabled");
            Arc::new(MissingWallet::default())
        }
    };

    let controller = CommandEditorController::new_with_wallet(
        ChainReader::new(transport),
        wallet,
        ControllerConfig {
            access_control: settings.access_control_address,
            master_control: settings.master_control_address,
            resolver_index_limit: Some(settings.resolver_index_limit),
        },
    );
    if controller.master_control().await.is_none() && settings.access_control_address.is_some() {
        controller.resolve_addresses(None).await?;
    }
    Ok(controller)
}

async fn open_draft(settings: &Settings, input: &DraftInput) -> Result<Arc<CommandEditorController>> {
    let raw = read_draft(&input.draft).await?;
    let controller = connect(settings).await?;
    controller
        .open_session(input.target.pool, input.target.hook_path())
        .await?;
    let count = controller.import_text(&raw).await?;
    info!(count, "hookctl: draft loaded");
    Ok(controller)
}

async fn read_draft(path: &Path) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut raw = String::new();
        tokio::io::stdin()
            .read_to_string(&mut raw)
            .await
            .context("failed to read draft from stdin")?;
        return Ok(raw);
    }
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read draft '{}'", path.display()))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_addresses(set: &ResolvedAddressSet) {
    if set.is_empty() {
        println!("no addresses resolved");
        return;
    }
    for (key, address) in &set.addresses {
        println!("{key:<24} {address}");
    }
    for address in &set.others {
        println!("{:<24} {address}", "(other)");
    }
}

fn fee_text(fee: Option<&Option<u64>>) -> String {
    match fee {
        Some(Some(bips)) => format!("{bips} bips"),
        _ => "unknown".to_string(),
    }
}

fn print_session(view: &SessionView) {
    let label = view
        .hook_path
        .label()
        .unwrap_or_else(|| view.hook_path.to_string());
    println!("pool {} hook {label}", view.pool);
    let Some(commands) = &view.snapshot.commands else {
        println!("commands unavailable");
        return;
    };
    if commands.is_empty() {
        println!("no commands");
    }
    for (index, command) in commands.iter().enumerate() {
        let locked = view
            .snapshot
            .locks
            .get(&command.key())
            .map(|locked| if *locked { "locked" } else { "unlocked" })
            .unwrap_or("lock unknown");
        println!(
            "{index:>3}. {} {} {:?} {locked} fee {}",
            command.target,
            humanize_selector(&command.selector),
            command.call_type,
            fee_text(view.snapshot.fees.get(&command.target)),
        );
    }
}

fn print_report(report: &DryRunReport) {
    println!("valid: {}", report.valid);
    for issue in &report.issues {
        println!("issue: {issue}");
    }
    for command in &report.locked_removals {
        println!(
            "locked removal: {} {}",
            command.target,
            humanize_selector(&command.selector)
        );
    }
    for target in &report.targets {
        println!("target {target} fee {}", fee_text(report.draft_fees.get(target)));
    }
    let total = |value: Option<u64>| value.map_or("unknown".to_string(), |v| v.to_string());
    println!(
        "fees: existing {} draft {} delta {}",
        total(report.summary.existing_total),
        total(report.summary.draft_total),
        report
            .summary
            .delta
            .map_or("unknown".to_string(), |delta| format!("{delta:+}")),
    );
}

fn print_record(record: &TxRecord, json: bool) -> Result<()> {
    if json {
        return print_json(record);
    }
    let hash = record
        .hash
        .map(|hash| hash.to_string())
        .unwrap_or_else(|| "-".to_string());
    println!(
        "{} {} {:?} hash {hash}",
        record.id,
        record.kind.as_str(),
        record.status
    );
    if let Some(error) = &record.error {
        println!("error: {error}");
    }
    Ok(())
}
