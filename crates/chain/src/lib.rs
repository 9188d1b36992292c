pub mod abi;
pub mod reader;
pub mod rpc;
pub mod selectors;
pub mod signer;
pub mod transport;

use thiserror::Error;

pub use abi::{AbiError, Function, ParamType, Token};
pub use reader::ChainReader;
pub use rpc::JsonRpcTransport;
pub use signer::{
    MissingWallet, PendingTransaction, RpcSigner, RpcWallet, TxHandle, TxSigner, WalletProvider,
};
pub use transport::ContractTransport;

/// JSON-RPC code wallets use when the user declines a request.
pub const USER_REJECTED_CODE: i64 = 4001;

#[derive(Debug, Clone, Error)]
pub enum ChainError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("execution reverted: {0}")]
    Reverted(String),
    #[error("request rejected: {0}")]
    Rejected(String),
    #[error("no signer available")]
    NoSigner,
    #[error(transparent)]
    Abi(#[from] AbiError),
    #[error("timed out waiting for {0}")]
    Timeout(String),
}

impl ChainError {
    /// Classifies a JSON-RPC error object the way wallets and nodes report them.
    pub fn from_rpc(code: i64, message: String) -> Self {
        if code == USER_REJECTED_CODE {
            return ChainError::Rejected(message);
        }
        if code == 3 || message.to_ascii_lowercase().contains("revert") {
            return ChainError::Reverted(message);
        }
        ChainError::Rpc { code, message }
    }
}

impl From<reqwest::Error> for ChainError {
    fn from(value: reqwest::Error) -> Self {
        ChainError::Transport(value.to_string())
    }
}
