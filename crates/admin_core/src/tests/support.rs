use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use chain::{
    abi::{encode, Function, Token},
    signer::ReceiptPolicy,
    ChainError, ChainReader, ContractTransport, RpcWallet,
};
use primitive_types::U256;
use shared::domain::{Address, Selector, TxHash};

pub const ACCOUNT: Address = Address([0xa1; 20]);
pub const SENT_HASH: TxHash = TxHash([0x11; 32]);

pub fn addr(last: u8) -> Address {
    let mut bytes = [0u8; 20];
    bytes[19] = last;
    Address(bytes)
}

type Reply = Result<Vec<u8>, ChainError>;

/// In-memory node: calls are answered from a table keyed by exact calldata.
#[derive(Default)]
pub struct FakeChain {
    code: Mutex<HashSet<Address>>,
    replies: Mutex<HashMap<(Address, Vec<u8>), Reply>>,
    calls: Mutex<Vec<(Address, Vec<u8>)>>,
    gas: Mutex<Option<Result<U256, ChainError>>>,
    send: Mutex<Option<Result<TxHash, ChainError>>>,
    receipt: Mutex<Option<Option<bool>>>,
    sent: Mutex<Vec<(Address, Address, Vec<u8>)>>,
    fee_delay: Mutex<Option<Duration>>,
}

impl FakeChain {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reader(self: &Arc<Self>) -> ChainReader {
        ChainReader::new(self.clone())
    }

    pub fn deploy(&self, address: Address) {
        self.code.lock().expect("code lock").insert(address);
    }

    pub fn respond(&self, to: Address, function: &Function, args: &[Token], outputs: &[Token]) {
        let data = function.encode_input(args).expect("encode probe input");
        self.replies
            .lock()
            .expect("replies lock")
            .insert((to, data), Ok(encode(outputs)));
    }

    pub fn fail(&self, to: Address, function: &Function, args: &[Token], err: ChainError) {
        let data = function.encode_input(args).expect("encode probe input");
        self.replies
            .lock()
            .expect("replies lock")
            .insert((to, data), Err(err));
    }

    pub fn set_gas(&self, gas: Result<U256, ChainError>) {
        *self.gas.lock().expect("gas lock") = Some(gas);
    }

    pub fn set_send(&self, result: Result<TxHash, ChainError>) {
        *self.send.lock().expect("send lock") = Some(result);
    }

    pub fn set_receipt(&self, status: Option<bool>) {
        *self.receipt.lock().expect("receipt lock") = Some(status);
    }

    /// Delays every `COMMAND_FEE_BIPS` read.
    pub fn set_fee_delay(&self, delay: Duration) {
        *self.fee_delay.lock().expect("delay lock") = Some(delay);
    }

    pub fn calls_with_selector(&self, selector: Selector) -> usize {
        self.calls
            .lock()
            .expect("calls lock")
            .iter()
            .filter(|(_, data)| data.starts_with(&selector.0))
            .count()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().expect("calls lock").len()
    }

    pub fn sent(&self) -> Vec<(Address, Address, Vec<u8>)> {
        self.sent.lock().expect("sent lock").clone()
    }
}

#[async_trait]
impl ContractTransport for FakeChain {
    async fn chain_id(&self) -> Result<u64, ChainError> {
        Ok(31337)
    }

    async fn accounts(&self) -> Result<Vec<Address>, ChainError> {
        Ok(vec![ACCOUNT])
    }

    async fn get_code(&self, address: Address) -> Result<Vec<u8>, ChainError> {
        if self.code.lock().expect("code lock").contains(&address) {
            Ok(vec![0x60, 0x80])
        } else {
            Ok(Vec::new())
        }
    }

    async fn call(&self, to: Address, data: Vec<u8>) -> Result<Vec<u8>, ChainError> {
        self.calls
            .lock()
            .expect("calls lock")
            .push((to, data.clone()));
        let fee_selector = chain::abi::selector("COMMAND_FEE_BIPS()");
        let delay = *self.fee_delay.lock().expect("delay lock");
        if let Some(delay) = delay.filter(|_| data.starts_with(&fee_selector.0)) {
            tokio::time::sleep(delay).await;
        }
        self.replies
            .lock()
            .expect("replies lock")
            .get(&(to, data))
            .cloned()
            .unwrap_or_else(|| Err(ChainError::Reverted("function not found".into())))
    }

    async fn estimate_gas(
        &self,
        _from: Address,
        _to: Address,
        _data: Vec<u8>,
    ) -> Result<U256, ChainError> {
        self.gas
            .lock()
            .expect("gas lock")
            .clone()
            .unwrap_or(Ok(U256::from(21_000u64)))
    }

    async fn send_transaction(
        &self,
        from: Address,
        to: Address,
        data: Vec<u8>,
    ) -> Result<TxHash, ChainError> {
        self.sent.lock().expect("sent lock").push((from, to, data));
        self.send
            .lock()
            .expect("send lock")
            .clone()
            .unwrap_or(Ok(SENT_HASH))
    }

    async fn receipt_status(&self, _hash: TxHash) -> Result<Option<bool>, ChainError> {
        Ok(self
            .receipt
            .lock()
            .expect("receipt lock")
            .unwrap_or(Some(true)))
    }
}

pub fn fast_policy() -> ReceiptPolicy {
    ReceiptPolicy {
        poll_interval: Duration::from_millis(5),
        timeout: Duration::from_millis(500),
    }
}

pub async fn connected_wallet(chain: &Arc<FakeChain>) -> Arc<RpcWallet> {
    let wallet = RpcWallet::new(chain.clone(), fast_policy());
    wallet.connect(Some(ACCOUNT)).await.expect("connect wallet");
    Arc::new(wallet)
}
