use std::sync::Arc;

use primitive_types::U256;
use shared::domain::Address;
use tracing::trace;

use crate::{
    abi::{Function, Token},
    transport::ContractTransport,
    ChainError,
};

/// Read-side chain access with typed function descriptors.
#[derive(Clone)]
pub struct ChainReader {
    transport: Arc<dyn ContractTransport>,
}

impl ChainReader {
    pub fn new(transport: Arc<dyn ContractTransport>) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> Arc<dyn ContractTransport> {
        Arc::clone(&self.transport)
    }

    pub async fn has_code(&self, address: Address) -> Result<bool, ChainError> {
        let code = self.transport.get_code(address).await?;
        Ok(!code.is_empty())
    }

    pub async fn call(
        &self,
        address: Address,
        function: &Function,
        args: &[Token],
    ) -> Result<Vec<Token>, ChainError> {
        let data = function.encode_input(args)?;
        trace!(%address, function = %function.name, "chain: call");
        let output = self.transport.call(address, data).await?;
        Ok(function.decode_output(&output)?)
    }

    /// Convenience for single-output views.
    pub async fn call_one(
        &self,
        address: Address,
        function: &Function,
        args: &[Token],
    ) -> Result<Token, ChainError> {
        let mut outputs = self.call(address, function, args).await?;
        if outputs.is_empty() {
            return Err(ChainError::Transport(format!(
                "{} returned no values",
                function.name
            )));
        }
        Ok(outputs.swap_remove(0))
    }

    pub async fn estimate_gas(
        &self,
        from: Address,
        address: Address,
        function: &Function,
        args: &[Token],
    ) -> Result<U256, ChainError> {
        let data = function.encode_input(args)?;
        self.transport.estimate_gas(from, address, data).await
    }
}
