use async_trait::async_trait;
use primitive_types::U256;
use shared::domain::{Address, TxHash};

use crate::ChainError;

/// Raw node access. Calldata goes in already encoded; decoding is the caller's job.
#[async_trait]
pub trait ContractTransport: Send + Sync {
    async fn chain_id(&self) -> Result<u64, ChainError>;

    async fn accounts(&self) -> Result<Vec<Address>, ChainError>;

    async fn get_code(&self, address: Address) -> Result<Vec<u8>, ChainError>;

    async fn call(&self, to: Address, data: Vec<u8>) -> Result<Vec<u8>, ChainError>;

    async fn estimate_gas(
        &self,
        from: Address,
        to: Address,
        data: Vec<u8>,
    ) -> Result<U256, ChainError>;

    async fn send_transaction(
        &self,
        from: Address,
        to: Address,
        data: Vec<u8>,
    ) -> Result<TxHash, ChainError>;

    /// `None` while the transaction is not yet mined.
    async fn receipt_status(&self, hash: TxHash) -> Result<Option<bool>, ChainError>;
}
