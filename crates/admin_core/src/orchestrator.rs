use std::sync::Arc;

use chain::{abi::Function, ChainError, TxHandle, WalletProvider};
use chrono::Utc;
use primitive_types::U256;
use serde_json::json;
use shared::{
    domain::{Address, Command, HookPath, PoolId, TxId, TxKind, TxRecord},
    error::CoreError,
};
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

use crate::master_control;

/// A write against MasterControl.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    SetCommands {
        pool: PoolId,
        hook_path: HookPath,
        commands: Vec<Command>,
    },
    ApplyBlocks {
        pool: PoolId,
        block_ids: Vec<u64>,
    },
}

impl Operation {
    pub fn kind(&self) -> TxKind {
        match self {
            Operation::SetCommands { .. } => TxKind::SetCommands,
            Operation::ApplyBlocks { .. } => TxKind::ApplyBlocks,
        }
    }

    pub fn function(&self) -> Function {
        match self {
            Operation::SetCommands { .. } => master_control::set_commands(),
            Operation::ApplyBlocks { .. } => master_control::apply_blocks_to_pool(),
        }
    }

    pub fn calldata(&self) -> Result<Vec<u8>, CoreError> {
        let args = match self {
            Operation::SetCommands {
                pool,
                hook_path,
                commands,
            } => master_control::set_commands_args(*pool, *hook_path, commands),
            Operation::ApplyBlocks { pool, block_ids } => {
                master_control::apply_blocks_args(*pool, block_ids)
            }
        };
        self.function()
            .encode_input(&args)
            .map_err(|err| CoreError::Chain(err.to_string()))
    }

    pub fn meta(&self) -> serde_json::Value {
        match self {
            Operation::SetCommands {
                pool,
                hook_path,
                commands,
            } => json!({
                "poolId": pool,
                "hookPath": hook_path,
                "cmdCount": commands.len(),
            }),
            Operation::ApplyBlocks { pool, block_ids } => json!({
                "poolId": pool,
                "blockIds": block_ids,
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub enum TxEvent {
    Updated(TxRecord),
    Removed(TxId),
    Cleared,
}

/// Activity list, most recent first.
#[derive(Debug, Default)]
pub struct TxLedger {
    records: Vec<TxRecord>,
}

impl TxLedger {
    pub fn add(&mut self, record: TxRecord) {
        self.records.insert(0, record);
    }

    pub fn get(&self, id: &TxId) -> Option<&TxRecord> {
        self.records.iter().find(|record| &record.id == id)
    }

    /// Applies `change` and returns the updated record when it reported a change.
    pub fn update(
        &mut self,
        id: &TxId,
        change: impl FnOnce(&mut TxRecord) -> bool,
    ) -> Option<TxRecord> {
        let record = self.records.iter_mut().find(|record| &record.id == id)?;
        change(record).then(|| record.clone())
    }

    pub fn remove(&mut self, id: &TxId) -> Option<TxRecord> {
        let index = self.records.iter().position(|record| &record.id == id)?;
        Some(self.records.remove(index))
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn records(&self) -> &[TxRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

pub fn new_tx_id() -> TxId {
    let suffix = Uuid::new_v4().simple().to_string();
    TxId(format!("tx-{}-{}", Utc::now().timestamp_millis(), &suffix[..7]))
}

fn submission_error(err: ChainError) -> CoreError {
    match err {
        ChainError::Rejected(message) => CoreError::SubmissionRejected(message),
        ChainError::Reverted(message) => CoreError::SubmissionReverted(message),
        ChainError::NoSigner => CoreError::EstimationUnavailable,
        other => CoreError::Chain(other.to_string()),
    }
}

struct Prepared {
    id: TxId,
    kind: TxKind,
    target: Address,
    data: Vec<u8>,
}

/// Gas estimation and submission with local lifecycle tracking.
#[derive(Clone)]
pub struct TransactionOrchestrator {
    wallet: Arc<dyn WalletProvider>,
    target: Arc<RwLock<Option<Address>>>,
    ledger: Arc<Mutex<TxLedger>>,
    signer_gate: Arc<Mutex<()>>,
    events: broadcast::Sender<TxEvent>,
}

impl TransactionOrchestrator {
    pub fn new(wallet: Arc<dyn WalletProvider>, target: Option<Address>) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            wallet,
            target: Arc::new(RwLock::new(target)),
            ledger: Arc::new(Mutex::new(TxLedger::default())),
            signer_gate: Arc::new(Mutex::new(())),
            events,
        }
    }

    pub fn wallet(&self) -> Arc<dyn WalletProvider> {
        Arc::clone(&self.wallet)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TxEvent> {
        self.events.subscribe()
    }

    pub async fn set_target(&self, target: Option<Address>) {
        *self.target.write().await = target;
    }

    async fn require_target(&self) -> Result<Address, CoreError> {
        self.target
            .read()
            .await
            .ok_or(CoreError::MissingContext("master control address"))
    }

    pub async fn estimate(&self, operation: &Operation) -> Result<U256, CoreError> {
        let target = self.require_target().await?;
        if self.wallet.current_account().await.is_none() {
            return Err(CoreError::EstimationUnavailable);
        }
        let data = operation.calldata()?;
        let signer = self
            .wallet
            .request_signer()
            .await
            .map_err(submission_error)?;
        signer
            .estimate_gas(target, data)
            .await
            .map_err(submission_error)
    }

    /// Runs a submission to completion and returns the terminal record.
    pub async fn submit(&self, operation: &Operation) -> Result<TxRecord, CoreError> {
        let prepared = self.prepare(operation).await?;
        Ok(self.drive(prepared).await)
    }

    /// Registers the pending record and finishes the submission in the background.
    pub async fn submit_detached(&self, operation: &Operation) -> Result<TxId, CoreError> {
        let prepared = self.prepare(operation).await?;
        let id = prepared.id.clone();
        let this = self.clone();
        tokio::spawn(async move {
            this.drive(prepared).await;
        });
        Ok(id)
    }

    async fn prepare(&self, operation: &Operation) -> Result<Prepared, CoreError> {
        let target = self.require_target().await?;
        let data = operation.calldata()?;
        if self.wallet.current_account().await.is_none() {
            return Err(CoreError::EstimationUnavailable);
        }

        let id = new_tx_id();
        let record = TxRecord::pending(id.clone(), operation.kind(), Some(operation.meta()));
        self.ledger.lock().await.add(record.clone());
        info!(tx = %id, kind = operation.kind().as_str(), "tx: pending");
        let _ = self.events.send(TxEvent::Updated(record));
        Ok(Prepared {
            id,
            kind: operation.kind(),
            target,
            data,
        })
    }

    async fn drive(&self, prepared: Prepared) -> TxRecord {
        let Prepared {
            id,
            kind,
            target,
            data,
        } = prepared;
        match self.send(target, data).await {
            Ok(handle) => {
                let hash = handle.hash();
                self.transition(&id, |record| record.attach_hash(hash)).await;
                info!(tx = %id, %hash, "tx: sent");
                match handle.wait().await {
                    Ok(()) => {
                        self.transition(&id, TxRecord::succeed).await;
                        info!(tx = %id, %hash, "tx: confirmed");
                    }
                    Err(err) => self.fail(&id, submission_error(err)).await,
                }
            }
            Err(err) => self.fail(&id, err).await,
        }
        self.record(&id).await.unwrap_or_else(|| {
            let mut gone = TxRecord::pending(id.clone(), kind, None);
            gone.fail("record removed while in flight");
            gone
        })
    }

    /// Signer prompts go through one gate at a time; confirmation waits do not.
    async fn send(&self, target: Address, data: Vec<u8>) -> Result<Box<dyn TxHandle>, CoreError> {
        let _gate = self.signer_gate.lock().await;
        let signer = self
            .wallet
            .request_signer()
            .await
            .map_err(submission_error)?;
        signer
            .send_transaction(target, data)
            .await
            .map_err(submission_error)
    }

    async fn fail(&self, id: &TxId, err: CoreError) {
        let message = err.to_string();
        warn!(tx = %id, code = ?err.code(), error = %message, "tx: failed");
        self.transition(id, |record| record.fail(message)).await;
    }

    async fn transition(&self, id: &TxId, change: impl FnOnce(&mut TxRecord) -> bool) {
        let updated = self.ledger.lock().await.update(id, change);
        if let Some(record) = updated {
            let _ = self.events.send(TxEvent::Updated(record));
        }
    }

    pub async fn record(&self, id: &TxId) -> Option<TxRecord> {
        self.ledger.lock().await.get(id).cloned()
    }

    pub async fn history(&self) -> Vec<TxRecord> {
        self.ledger.lock().await.records().to_vec()
    }

    pub async fn remove(&self, id: &TxId) -> Option<TxRecord> {
        let removed = self.ledger.lock().await.remove(id);
        if removed.is_some() {
            let _ = self.events.send(TxEvent::Removed(id.clone()));
        }
        removed
    }

    pub async fn clear(&self) {
        self.ledger.lock().await.clear();
        let _ = self.events.send(TxEvent::Cleared);
    }
}

#[cfg(test)]
#[path = "tests/orchestrator_tests.rs"]
mod tests;
