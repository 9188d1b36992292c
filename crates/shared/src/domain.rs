use std::{collections::BTreeMap, fmt, str::FromStr};

use chrono::{DateTime, Utc};
use primitive_types::U256;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValueParseError {
    #[error("expected {expected} bytes of hex, got {actual}")]
    Length { expected: usize, actual: usize },
    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("hook path text is {0} bytes, at most 32 allowed")]
    HookPathTooLong(usize),
    #[error("invalid pool id '{0}'")]
    PoolId(String),
    #[error("invalid command key '{0}', expected target:selector")]
    CommandKey(String),
}

fn strip_hex_prefix(raw: &str) -> &str {
    let trimmed = raw.trim();
    trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed)
}

fn decode_fixed<const N: usize>(raw: &str) -> Result<[u8; N], ValueParseError> {
    let bytes = hex::decode(strip_hex_prefix(raw))?;
    if bytes.len() != N {
        return Err(ValueParseError::Length {
            expected: N,
            actual: bytes.len(),
        });
    }
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes);
    Ok(out)
}

macro_rules! hex_newtype {
    ($name:ident, $len:expr) => {
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
        pub struct $name(pub [u8; $len]);

        impl $name {
            pub const LEN: usize = $len;
            pub const ZERO: Self = Self([0u8; $len]);

            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            pub fn is_zero(&self) -> bool {
                self.0.iter().all(|b| *b == 0)
            }
        }

        impl FromStr for $name {
            type Err = ValueParseError;

            fn from_str(raw: &str) -> Result<Self, Self::Err> {
                decode_fixed::<$len>(raw).map(Self)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "0x{}", hex::encode(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                raw.parse().map_err(de::Error::custom)
            }
        }
    };
}

hex_newtype!(Address, 20);
hex_newtype!(Selector, 4);
hex_newtype!(TxHash, 32);

/// 32-byte hook path key. Text that is not already a 0x-prefixed 32-byte hex
/// string is taken as UTF-8 and right-padded with zeros.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct HookPath(pub [u8; 32]);

impl HookPath {
    pub fn parse(input: &str) -> Result<Self, ValueParseError> {
        let trimmed = input.trim();
        if trimmed.len() == 66 && (trimmed.starts_with("0x") || trimmed.starts_with("0X")) {
            return decode_fixed::<32>(trimmed).map(Self);
        }
        let bytes = trimmed.as_bytes();
        if bytes.len() > 32 {
            return Err(ValueParseError::HookPathTooLong(bytes.len()));
        }
        let mut out = [0u8; 32];
        out[..bytes.len()].copy_from_slice(bytes);
        Ok(Self(out))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Printable ASCII name when the key was derived from text.
    pub fn label(&self) -> Option<String> {
        let end = self.0.iter().rposition(|b| *b != 0)? + 1;
        let body = &self.0[..end];
        if body.iter().all(|b| b.is_ascii_graphic()) {
            Some(String::from_utf8_lossy(body).into_owned())
        } else {
            None
        }
    }
}

impl FromStr for HookPath {
    type Err = ValueParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Self::parse(raw)
    }
}

impl fmt::Display for HookPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for HookPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.label() {
            Some(label) => write!(f, "HookPath({label})"),
            None => write!(f, "HookPath({self})"),
        }
    }
}

impl Serialize for HookPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for HookPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct PoolId(pub U256);

impl PoolId {
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
}

impl From<u64> for PoolId {
    fn from(value: u64) -> Self {
        Self(U256::from(value))
    }
}

impl FromStr for PoolId {
    type Err = ValueParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        let parsed = match trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
        {
            Some(body) => U256::from_str_radix(body, 16).ok(),
            None => U256::from_dec_str(trimmed).ok(),
        };
        parsed
            .map(Self)
            .ok_or_else(|| ValueParseError::PoolId(raw.to_string()))
    }
}

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for PoolId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PoolId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum CallType {
    #[default]
    Call,
    DelegateCall,
    StaticCall,
    Other(u8),
}

impl From<u8> for CallType {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::Call,
            1 => Self::DelegateCall,
            2 => Self::StaticCall,
            other => Self::Other(other),
        }
    }
}

impl From<CallType> for u8 {
    fn from(value: CallType) -> Self {
        match value {
            CallType::Call => 0,
            CallType::DelegateCall => 1,
            CallType::StaticCall => 2,
            CallType::Other(other) => other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Command {
    pub target: Address,
    pub selector: Selector,
    #[serde(default)]
    pub call_type: CallType,
    #[serde(default)]
    pub fee_bips: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provenance_block_id: Option<U256>,
}

impl Command {
    pub fn new(target: Address, selector: Selector) -> Self {
        Self {
            target,
            selector,
            call_type: CallType::Call,
            fee_bips: 0,
            provenance_block_id: None,
        }
    }

    /// Zero-target stand-in appended when a block's commands are unknown.
    pub fn placeholder() -> Self {
        Self::new(Address::ZERO, Selector::ZERO)
    }

    pub fn key(&self) -> CommandKey {
        CommandKey {
            target: self.target,
            selector: self.selector,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommandKey {
    pub target: Address,
    pub selector: Selector,
}

impl CommandKey {
    pub fn new(target: Address, selector: Selector) -> Self {
        Self { target, selector }
    }
}

impl fmt::Display for CommandKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.target, self.selector)
    }
}

impl FromStr for CommandKey {
    type Err = ValueParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let (target, selector) = raw
            .split_once(':')
            .ok_or_else(|| ValueParseError::CommandKey(raw.to_string()))?;
        Ok(Self {
            target: target.parse()?,
            selector: selector.parse()?,
        })
    }
}

impl Serialize for CommandKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for CommandKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

/// `true` marks a command the pool policy does not allow to be removed.
pub type LockMap = BTreeMap<CommandKey, bool>;

/// `None` means the target's fee could not be read.
pub type FeeMap = BTreeMap<Address, Option<u64>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxStatus {
    Pending,
    Success,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TxKind {
    SetCommands,
    ApplyBlocks,
}

impl TxKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxKind::SetCommands => "setCommands",
            TxKind::ApplyBlocks => "applyBlocks",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TxId(pub String);

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxRecord {
    pub id: TxId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<TxHash>,
    #[serde(rename = "type")]
    pub kind: TxKind,
    pub status: TxStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TxRecord {
    pub fn pending(id: TxId, kind: TxKind, meta: Option<serde_json::Value>) -> Self {
        let now = Utc::now();
        Self {
            id,
            hash: None,
            kind,
            status: TxStatus::Pending,
            created_at: now,
            updated_at: now,
            meta,
            error: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status != TxStatus::Pending
    }

    /// Hash may arrive after the record exists; ignored once terminal.
    pub fn attach_hash(&mut self, hash: TxHash) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.hash = Some(hash);
        self.updated_at = Utc::now();
        true
    }

    pub fn succeed(&mut self) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.status = TxStatus::Success;
        self.error = None;
        self.updated_at = Utc::now();
        true
    }

    pub fn fail(&mut self, error: impl Into<String>) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.status = TxStatus::Failed;
        self.error = Some(error.into());
        self.updated_at = Utc::now();
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Canonical,
    Other,
    Ignored,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedAddressSet {
    pub addresses: BTreeMap<String, Address>,
    pub others: Vec<Address>,
}

impl ResolvedAddressSet {
    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty() && self.others.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<Address> {
        self.addresses.get(key).copied()
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.addresses.values().any(|a| a == address) || self.others.contains(address)
    }

    /// First hit for a canonical key wins; later hits for the same key go to `others`.
    pub fn record(&mut self, key: &str, address: Address) -> Placement {
        if address.is_zero() {
            return Placement::Ignored;
        }
        if !self.addresses.contains_key(key) {
            self.addresses.insert(key.to_string(), address);
            return Placement::Canonical;
        }
        if self.record_other(address) {
            Placement::Other
        } else {
            Placement::Ignored
        }
    }

    pub fn record_other(&mut self, address: Address) -> bool {
        if address.is_zero() || self.contains(&address) {
            return false;
        }
        self.others.push(address);
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockMeta {
    pub id: u64,
    pub representative_hook: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub immutable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commands: Option<Vec<Command>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(last: u8) -> Address {
        let mut bytes = [0u8; 20];
        bytes[19] = last;
        Address(bytes)
    }

    #[test]
    fn address_parse_is_case_insensitive_and_displays_lowercase() {
        let upper: Address = "0xABCDEF0000000000000000000000000000000001"
            .parse()
            .expect("upper");
        let lower: Address = "abcdef0000000000000000000000000000000001"
            .parse()
            .expect("lower");
        assert_eq!(upper, lower);
        assert_eq!(
            upper.to_string(),
            "0xabcdef0000000000000000000000000000000001"
        );
    }

    #[test]
    fn address_rejects_wrong_length() {
        let err = "0x1234".parse::<Address>().expect_err("short");
        assert_eq!(
            err,
            ValueParseError::Length {
                expected: 20,
                actual: 2
            }
        );
    }

    #[test]
    fn hook_path_pads_ascii_and_keeps_raw_hash() {
        let named = HookPath::parse("beforeSwap").expect("ascii");
        assert_eq!(&named.0[..10], b"beforeSwap");
        assert!(named.0[10..].iter().all(|b| *b == 0));
        assert_eq!(named.label().as_deref(), Some("beforeSwap"));

        let raw = format!("0x{}", "11".repeat(32));
        let hashed = HookPath::parse(&raw).expect("raw");
        assert_eq!(hashed.0, [0x11; 32]);
        assert_eq!(hashed.to_string(), raw);
    }

    #[test]
    fn hook_path_rejects_long_text() {
        let err = HookPath::parse(&"x".repeat(33)).expect_err("too long");
        assert_eq!(err, ValueParseError::HookPathTooLong(33));
    }

    #[test]
    fn pool_id_accepts_decimal_and_hex() {
        assert_eq!("42".parse::<PoolId>().expect("dec"), PoolId::from(42));
        assert_eq!("0x2a".parse::<PoolId>().expect("hex"), PoolId::from(42));
        assert!("pool-7".parse::<PoolId>().is_err());
    }

    #[test]
    fn command_key_round_trips_through_legacy_string() {
        let key = CommandKey::new(addr(1), Selector([0x11, 0x11, 0x11, 0x11]));
        let text = key.to_string();
        assert_eq!(
            text,
            "0x0000000000000000000000000000000000000001:0x11111111"
        );
        assert_eq!(text.parse::<CommandKey>().expect("parse"), key);
    }

    #[test]
    fn tx_record_terminal_states_do_not_move() {
        let mut record = TxRecord::pending(TxId("tx-1".into()), TxKind::SetCommands, None);
        assert!(record.fail("user rejected"));
        assert!(!record.succeed());
        assert!(!record.attach_hash(TxHash([1; 32])));
        assert_eq!(record.status, TxStatus::Failed);
        assert_eq!(record.error.as_deref(), Some("user rejected"));
    }

    #[test]
    fn resolved_set_keeps_first_canonical_hit() {
        let mut set = ResolvedAddressSet::default();
        assert_eq!(set.record("masterControl", addr(1)), Placement::Canonical);
        assert_eq!(set.record("masterControl", addr(2)), Placement::Other);
        assert_eq!(set.record("masterControl", addr(2)), Placement::Ignored);
        assert_eq!(set.get("masterControl"), Some(addr(1)));
        assert_eq!(set.others, vec![addr(2)]);
    }
}
