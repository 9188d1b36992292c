use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use primitive_types::U256;
use shared::{
    domain::{Address, TxHash},
    protocol::WalletEvent,
};
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info};

use crate::{transport::ContractTransport, ChainError};

#[derive(Debug, Clone, Copy)]
pub struct ReceiptPolicy {
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl Default for ReceiptPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1000),
            timeout: Duration::from_secs(120),
        }
    }
}

/// A submitted transaction: the hash is known, confirmation is awaited separately.
#[async_trait]
pub trait TxHandle: Send + Sync {
    fn hash(&self) -> TxHash;

    async fn wait(self: Box<Self>) -> Result<(), ChainError>;
}

#[async_trait]
pub trait TxSigner: Send + Sync {
    fn address(&self) -> Address;

    async fn estimate_gas(&self, to: Address, data: Vec<u8>) -> Result<U256, ChainError>;

    async fn send_transaction(
        &self,
        to: Address,
        data: Vec<u8>,
    ) -> Result<Box<dyn TxHandle>, ChainError>;
}

#[async_trait]
pub trait WalletProvider: Send + Sync {
    async fn current_account(&self) -> Option<Address>;

    async fn current_chain_id(&self) -> Option<u64>;

    async fn request_signer(&self) -> Result<Arc<dyn TxSigner>, ChainError>;

    fn subscribe(&self) -> broadcast::Receiver<WalletEvent>;
}

pub struct PendingTransaction {
    hash: TxHash,
    transport: Arc<dyn ContractTransport>,
    policy: ReceiptPolicy,
}

impl PendingTransaction {
    pub fn new(hash: TxHash, transport: Arc<dyn ContractTransport>, policy: ReceiptPolicy) -> Self {
        Self {
            hash,
            transport,
            policy,
        }
    }
}

#[async_trait]
impl TxHandle for PendingTransaction {
    fn hash(&self) -> TxHash {
        self.hash
    }

    async fn wait(self: Box<Self>) -> Result<(), ChainError> {
        let hash = self.hash;
        let poll = async {
            loop {
                match self.transport.receipt_status(hash).await? {
                    Some(true) => return Ok::<(), ChainError>(()),
                    Some(false) => {
                        return Err(ChainError::Reverted(format!(
                            "transaction {hash} failed on chain"
                        )))
                    }
                    None => tokio::time::sleep(self.policy.poll_interval).await,
                }
            }
        };
        tokio::time::timeout(self.policy.timeout, poll)
            .await
            .map_err(|_| ChainError::Timeout(format!("receipt of {hash}")))?
    }
}

/// Signs through the node's unlocked account.
pub struct RpcSigner {
    address: Address,
    transport: Arc<dyn ContractTransport>,
    policy: ReceiptPolicy,
}

impl RpcSigner {
    pub fn new(
        address: Address,
        transport: Arc<dyn ContractTransport>,
        policy: ReceiptPolicy,
    ) -> Self {
        Self {
            address,
            transport,
            policy,
        }
    }
}

#[async_trait]
impl TxSigner for RpcSigner {
    fn address(&self) -> Address {
        self.address
    }

    async fn estimate_gas(&self, to: Address, data: Vec<u8>) -> Result<U256, ChainError> {
        self.transport.estimate_gas(self.address, to, data).await
    }

    async fn send_transaction(
        &self,
        to: Address,
        data: Vec<u8>,
    ) -> Result<Box<dyn TxHandle>, ChainError> {
        let hash = self
            .transport
            .send_transaction(self.address, to, data)
            .await?;
        debug!(from = %self.address, %to, %hash, "signer: transaction sent");
        Ok(Box::new(PendingTransaction::new(
            hash,
            Arc::clone(&self.transport),
            self.policy,
        )))
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct WalletState {
    account: Option<Address>,
    chain_id: Option<u64>,
}

/// Wallet backed by a node that holds unlocked accounts.
pub struct RpcWallet {
    transport: Arc<dyn ContractTransport>,
    policy: ReceiptPolicy,
    state: RwLock<WalletState>,
    events: broadcast::Sender<WalletEvent>,
}

impl RpcWallet {
    pub fn new(transport: Arc<dyn ContractTransport>, policy: ReceiptPolicy) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            transport,
            policy,
            state: RwLock::new(WalletState::default()),
            events,
        }
    }

    /// Picks `preferred` or the node's first account and records the chain id.
    pub async fn connect(&self, preferred: Option<Address>) -> Result<(), ChainError> {
        let chain_id = self.transport.chain_id().await?;
        let account = match preferred {
            Some(account) => Some(account),
            None => self.transport.accounts().await?.into_iter().next(),
        };
        self.set_chain_id(Some(chain_id)).await;
        self.set_account(account).await;
        info!(?account, chain_id, "wallet: connected");
        Ok(())
    }

    pub async fn set_account(&self, account: Option<Address>) {
        let mut state = self.state.write().await;
        if state.account == account {
            return;
        }
        state.account = account;
        let _ = self.events.send(WalletEvent::AccountChanged(account));
    }

    pub async fn set_chain_id(&self, chain_id: Option<u64>) {
        let mut state = self.state.write().await;
        if state.chain_id == chain_id {
            return;
        }
        state.chain_id = chain_id;
        let _ = self.events.send(WalletEvent::ChainChanged(chain_id));
    }
}

#[async_trait]
impl WalletProvider for RpcWallet {
    async fn current_account(&self) -> Option<Address> {
        self.state.read().await.account
    }

    async fn current_chain_id(&self) -> Option<u64> {
        self.state.read().await.chain_id
    }

    async fn request_signer(&self) -> Result<Arc<dyn TxSigner>, ChainError> {
        let account = self.current_account().await.ok_or(ChainError::NoSigner)?;
        Ok(Arc::new(RpcSigner::new(
            account,
            Arc::clone(&self.transport),
            self.policy,
        )))
    }

    fn subscribe(&self) -> broadcast::Receiver<WalletEvent> {
        self.events.subscribe()
    }
}

pub struct MissingWallet {
    events: broadcast::Sender<WalletEvent>,
}

impl Default for MissingWallet {
    fn default() -> Self {
        let (events, _) = broadcast::channel(1);
        Self { events }
    }
}

#[async_trait]
impl WalletProvider for MissingWallet {
    async fn current_account(&self) -> Option<Address> {
        None
    }

    async fn current_chain_id(&self) -> Option<u64> {
        None
    }

    async fn request_signer(&self) -> Result<Arc<dyn TxSigner>, ChainError> {
        Err(ChainError::NoSigner)
    }

    fn subscribe(&self) -> broadcast::Receiver<WalletEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
#[path = "tests/signer_tests.rs"]
mod tests;
