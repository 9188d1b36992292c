use std::collections::BTreeSet;

use chain::{
    abi::{command_from_token, Token},
    ChainReader,
};
use futures::future::join_all;
use serde::Serialize;
use shared::{
    domain::{Address, Command, CommandKey, FeeMap, HookPath, LockMap, PoolId},
    error::CoreError,
    protocol::parse_draft_text,
};
use tracing::{debug, warn};

use crate::master_control;

pub const NO_TARGETS: &str = "no targets detected";

pub fn parse_draft(raw: &str) -> Result<Vec<Command>, CoreError> {
    parse_draft_text(raw)
}

/// Unique targets in first-seen order.
pub fn compute_targets(draft: &[Command]) -> Vec<Address> {
    let mut seen = BTreeSet::new();
    draft
        .iter()
        .map(|command| command.target)
        .filter(|target| seen.insert(*target))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeSummary {
    pub existing_total: Option<u64>,
    pub draft_total: Option<u64>,
    pub delta: Option<i128>,
}

/// `None` when no target in the map has a known fee.
fn fee_total(fees: &FeeMap) -> Option<u64> {
    let mut known = fees.values().flatten().peekable();
    known.peek()?;
    Some(known.fold(0u64, |sum, fee| sum.saturating_add(*fee)))
}

pub fn compute_fee_summary(existing: &FeeMap, draft: &FeeMap) -> FeeSummary {
    let existing_total = fee_total(existing);
    let draft_total = fee_total(draft);
    let delta = match (existing_total, draft_total) {
        (None, None) => None,
        (existing, draft) => {
            Some(i128::from(draft.unwrap_or(0)) - i128::from(existing.unwrap_or(0)))
        }
    };
    FeeSummary {
        existing_total,
        draft_total,
        delta,
    }
}

/// Locked on-chain commands whose key is missing from the draft, in key order.
pub fn detect_locked_removals(draft: &[Command], locks: &LockMap) -> Vec<Command> {
    let present: BTreeSet<CommandKey> = draft.iter().map(Command::key).collect();
    locks
        .iter()
        .filter(|(key, locked)| **locked && !present.contains(key))
        .map(|(key, _)| Command::new(key.target, key.selector))
        .collect()
}

pub fn is_valid(draft: &[Command], locks: &LockMap) -> bool {
    !draft.is_empty() && detect_locked_removals(draft, locks).is_empty()
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DryRunReport {
    pub commands: Vec<Command>,
    pub targets: Vec<Address>,
    pub draft_fees: FeeMap,
    pub existing_fees: FeeMap,
    pub summary: FeeSummary,
    pub locked_removals: Vec<Command>,
    pub valid: bool,
    pub issues: Vec<String>,
}

impl DryRunReport {
    pub fn build(
        commands: Vec<Command>,
        draft_fees: FeeMap,
        existing_fees: FeeMap,
        locks: &LockMap,
    ) -> Self {
        let targets = compute_targets(&commands);
        let summary = compute_fee_summary(&existing_fees, &draft_fees);
        let locked_removals = detect_locked_removals(&commands, locks);
        let mut issues = Vec::new();
        if targets.is_empty() {
            issues.push(NO_TARGETS.to_string());
        }
        if !locked_removals.is_empty() {
            issues.push(format!(
                "{} locked command(s) cannot be removed for this pool",
                locked_removals.len()
            ));
        }
        let valid = is_valid(&commands, locks);
        Self {
            commands,
            targets,
            draft_fees,
            existing_fees,
            summary,
            locked_removals,
            valid,
            issues,
        }
    }
}

/// On-chain state of one `(pool, hook path)`. Every field degrades independently.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolSnapshot {
    pub commands: Option<Vec<Command>>,
    pub targets: Option<Vec<Address>>,
    pub locks: LockMap,
    pub fees: FeeMap,
}

/// Read-only chain queries backing the dry run. Never writes.
#[derive(Clone)]
pub struct DryRunValidator {
    reader: ChainReader,
    master_control: Option<Address>,
}

impl DryRunValidator {
    pub fn new(reader: ChainReader, master_control: Option<Address>) -> Self {
        Self {
            reader,
            master_control,
        }
    }

    pub fn master_control(&self) -> Option<Address> {
        self.master_control
    }

    pub fn set_master_control(&mut self, address: Option<Address>) {
        self.master_control = address;
    }

    pub async fn fetch_fee(&self, target: Address) -> Result<u64, CoreError> {
        let value = self
            .reader
            .call_one(target, &master_control::command_fee_bips(), &[])
            .await
            .map_err(|err| CoreError::ReadFailure {
                target,
                reason: err.to_string(),
            })?;
        match value {
            Token::Uint(fee) if fee.bits() <= 64 => Ok(fee.low_u64()),
            _ => Err(CoreError::ReadFailure {
                target,
                reason: "fee does not fit in 64 bits".to_string(),
            }),
        }
    }

    /// Fees for every target, fetched concurrently. A failed read becomes `None`.
    pub async fn fetch_fees(&self, targets: &[Address]) -> FeeMap {
        let reads = targets.iter().map(|target| async move {
            let fee = match self.fetch_fee(*target).await {
                Ok(fee) => Some(fee),
                Err(err) => {
                    debug!(%target, error = %err, "dry_run: fee unreadable");
                    None
                }
            };
            (*target, fee)
        });
        join_all(reads).await.into_iter().collect()
    }

    fn require_master_control(&self) -> Result<Address, CoreError> {
        self.master_control
            .ok_or(CoreError::MissingContext("master control address"))
    }

    pub async fn fetch_pool_commands(
        &self,
        pool: PoolId,
        hook_path: HookPath,
    ) -> Result<Vec<Command>, CoreError> {
        let master = self.require_master_control()?;
        let token = self
            .reader
            .call_one(
                master,
                &master_control::get_commands(),
                &master_control::pool_hook_args(pool, hook_path),
            )
            .await
            .map_err(|err| CoreError::ReadFailure {
                target: master,
                reason: err.to_string(),
            })?;
        decode_commands(master, token)
    }

    pub async fn fetch_pool_targets(&self, pool: PoolId) -> Result<Vec<Address>, CoreError> {
        let master = self.require_master_control()?;
        let token = self
            .reader
            .call_one(
                master,
                &master_control::pool_command_targets(),
                &[Token::Uint(pool.0)],
            )
            .await
            .map_err(|err| CoreError::ReadFailure {
                target: master,
                reason: err.to_string(),
            })?;
        Ok(token
            .into_array()
            .unwrap_or_default()
            .into_iter()
            .filter_map(Token::into_address)
            .collect())
    }

    pub async fn fetch_lock(
        &self,
        pool: PoolId,
        hook_path: HookPath,
        key: CommandKey,
    ) -> Result<bool, CoreError> {
        let master = self.require_master_control()?;
        let mut args = master_control::pool_hook_args(pool, hook_path);
        args.push(Token::Address(key.target));
        args.push(Token::FixedBytes(key.selector.0.to_vec()));
        let token = self
            .reader
            .call_one(master, &master_control::command_locked_for_pool(), &args)
            .await
            .map_err(|err| CoreError::ReadFailure {
                target: master,
                reason: err.to_string(),
            })?;
        Ok(token.into_bool().unwrap_or(false))
    }

    /// Lock flags for each distinct command key; unreadable flags are left out.
    pub async fn fetch_locks(
        &self,
        pool: PoolId,
        hook_path: HookPath,
        commands: &[Command],
    ) -> LockMap {
        let keys: BTreeSet<CommandKey> = commands.iter().map(Command::key).collect();
        let reads = keys.into_iter().map(|key| async move {
            (key, self.fetch_lock(pool, hook_path, key).await)
        });
        let mut locks = LockMap::new();
        for (key, result) in join_all(reads).await {
            match result {
                Ok(locked) => {
                    locks.insert(key, locked);
                }
                Err(err) => debug!(%key, error = %err, "dry_run: lock flag unreadable"),
            }
        }
        locks
    }

    /// Best-effort lookup of a catalog block's commands.
    pub async fn fetch_block_commands(&self, block_id: u64) -> Option<Vec<Command>> {
        let master = self.master_control?;
        for name in master_control::BLOCK_COMMAND_GETTERS {
            let function = master_control::block_commands(name);
            match self
                .reader
                .call_one(master, &function, &[Token::uint(block_id)])
                .await
            {
                Ok(token) => match decode_commands(master, token) {
                    Ok(commands) => return Some(commands),
                    Err(err) => debug!(block_id, getter = name, error = %err, "dry_run: block shape"),
                },
                Err(err) => debug!(block_id, getter = name, error = %err, "dry_run: block getter absent"),
            }
        }
        None
    }

    pub async fn snapshot(&self, pool: PoolId, hook_path: HookPath) -> PoolSnapshot {
        let commands = match self.fetch_pool_commands(pool, hook_path).await {
            Ok(commands) => Some(commands),
            Err(err) => {
                warn!(%pool, hook_path = %hook_path, error = %err, "dry_run: existing commands unavailable");
                None
            }
        };
        let targets = match self.fetch_pool_targets(pool).await {
            Ok(targets) => Some(targets),
            Err(err) => {
                debug!(%pool, error = %err, "dry_run: pool targets unavailable");
                None
            }
        };
        let existing = commands.as_deref().unwrap_or_default();
        let locks = self.fetch_locks(pool, hook_path, existing).await;
        let fee_targets = match &targets {
            Some(targets) if !targets.is_empty() => targets.clone(),
            _ => compute_targets(existing),
        };
        let fees = self.fetch_fees(&fee_targets).await;
        PoolSnapshot {
            commands,
            targets,
            locks,
            fees,
        }
    }

    /// Parses draft text and evaluates it against an existing snapshot.
    pub async fn dry_run(&self, raw: &str, existing: &PoolSnapshot) -> Result<DryRunReport, CoreError> {
        let commands = parse_draft(raw)?;
        Ok(self.evaluate(commands, existing).await)
    }

    pub async fn evaluate(&self, commands: Vec<Command>, existing: &PoolSnapshot) -> DryRunReport {
        let draft_fees = self.fetch_fees(&compute_targets(&commands)).await;
        DryRunReport::build(commands, draft_fees, existing.fees.clone(), &existing.locks)
    }
}

fn decode_commands(source: Address, token: Token) -> Result<Vec<Command>, CoreError> {
    let items = token.into_array().ok_or_else(|| CoreError::ReadFailure {
        target: source,
        reason: "expected a command array".to_string(),
    })?;
    items
        .into_iter()
        .map(command_from_token)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| CoreError::ReadFailure {
            target: source,
            reason: err.to_string(),
        })
}

#[cfg(test)]
#[path = "tests/dry_run_tests.rs"]
mod tests;
