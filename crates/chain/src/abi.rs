//! Contract ABI head/tail codec for the value shapes the hook admin flow uses.

use primitive_types::U256;
use sha3::{Digest, Keccak256};
use shared::domain::{Address, CallType, Command, Selector};
use thiserror::Error;

const WORD: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AbiError {
    #[error("read past end of data at offset {offset} (len {len})")]
    OutOfBounds { offset: usize, len: usize },
    #[error("invalid {kind} value")]
    InvalidValue { kind: String },
    #[error("expected {expected} arguments, got {actual}")]
    ArityMismatch { expected: usize, actual: usize },
    #[error("argument {index} does not match {expected}")]
    TypeMismatch { index: usize, expected: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamType {
    Address,
    Bool,
    Uint(usize),
    FixedBytes(usize),
    Array(Box<ParamType>),
    Tuple(Vec<ParamType>),
}

impl ParamType {
    /// `(address,bytes4,uint8,uint32,uint256)`
    pub fn command() -> Self {
        ParamType::Tuple(vec![
            ParamType::Address,
            ParamType::FixedBytes(4),
            ParamType::Uint(8),
            ParamType::Uint(32),
            ParamType::Uint(256),
        ])
    }

    pub fn array_of(inner: ParamType) -> Self {
        ParamType::Array(Box::new(inner))
    }

    pub fn canonical(&self) -> String {
        match self {
            ParamType::Address => "address".to_string(),
            ParamType::Bool => "bool".to_string(),
            ParamType::Uint(bits) => format!("uint{bits}"),
            ParamType::FixedBytes(len) => format!("bytes{len}"),
            ParamType::Array(inner) => format!("{}[]", inner.canonical()),
            ParamType::Tuple(items) => format!(
                "({})",
                items
                    .iter()
                    .map(ParamType::canonical)
                    .collect::<Vec<_>>()
                    .join(",")
            ),
        }
    }

    fn is_dynamic(&self) -> bool {
        match self {
            ParamType::Array(_) => true,
            ParamType::Tuple(items) => items.iter().any(ParamType::is_dynamic),
            _ => false,
        }
    }

    fn head_size(&self) -> usize {
        match self {
            ParamType::Tuple(items) if !self.is_dynamic() => {
                items.iter().map(ParamType::head_size).sum()
            }
            _ => WORD,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Address(Address),
    Bool(bool),
    Uint(U256),
    FixedBytes(Vec<u8>),
    Array(Vec<Token>),
    Tuple(Vec<Token>),
}

impl Token {
    pub fn uint(value: impl Into<U256>) -> Self {
        Token::Uint(value.into())
    }

    pub fn into_address(self) -> Option<Address> {
        match self {
            Token::Address(address) => Some(address),
            _ => None,
        }
    }

    pub fn into_bool(self) -> Option<bool> {
        match self {
            Token::Bool(value) => Some(value),
            _ => None,
        }
    }

    pub fn into_uint(self) -> Option<U256> {
        match self {
            Token::Uint(value) => Some(value),
            _ => None,
        }
    }

    pub fn into_array(self) -> Option<Vec<Token>> {
        match self {
            Token::Array(items) => Some(items),
            _ => None,
        }
    }

    fn is_dynamic(&self) -> bool {
        match self {
            Token::Array(_) => true,
            Token::Tuple(items) => items.iter().any(Token::is_dynamic),
            _ => false,
        }
    }

    fn matches(&self, ty: &ParamType) -> bool {
        match (self, ty) {
            (Token::Address(_), ParamType::Address) | (Token::Bool(_), ParamType::Bool) => true,
            (Token::Uint(value), ParamType::Uint(bits)) => value.bits() <= *bits,
            (Token::FixedBytes(bytes), ParamType::FixedBytes(len)) => bytes.len() == *len,
            (Token::Array(items), ParamType::Array(inner)) => {
                items.iter().all(|item| item.matches(inner))
            }
            (Token::Tuple(items), ParamType::Tuple(types)) => {
                items.len() == types.len() && items.iter().zip(types).all(|(i, t)| i.matches(t))
            }
            _ => false,
        }
    }
}

pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Keccak256::digest(data));
    out
}

/// First four bytes of the Keccak-256 hash of a canonical signature.
pub fn selector(signature: &str) -> Selector {
    let hash = keccak256(signature.as_bytes());
    Selector([hash[0], hash[1], hash[2], hash[3]])
}

fn u256_word(value: &U256) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    for (i, slot) in word.iter_mut().rev().enumerate() {
        *slot = value.byte(i);
    }
    word
}

fn usize_word(value: usize) -> [u8; WORD] {
    u256_word(&U256::from(value as u64))
}

pub fn encode(tokens: &[Token]) -> Vec<u8> {
    encode_sequence(tokens)
}

fn encode_sequence(tokens: &[Token]) -> Vec<u8> {
    let head_len: usize = tokens.iter().map(token_head_size).sum();
    let mut head = Vec::with_capacity(head_len);
    let mut tail = Vec::new();
    for token in tokens {
        if token.is_dynamic() {
            head.extend_from_slice(&usize_word(head_len + tail.len()));
            tail.extend(encode_token(token));
        } else {
            head.extend(encode_token(token));
        }
    }
    head.extend(tail);
    head
}

fn token_head_size(token: &Token) -> usize {
    match token {
        Token::Tuple(items) if !token.is_dynamic() => items.iter().map(token_head_size).sum(),
        _ => WORD,
    }
}

fn encode_token(token: &Token) -> Vec<u8> {
    match token {
        Token::Address(address) => {
            let mut word = [0u8; WORD];
            word[12..].copy_from_slice(address.as_bytes());
            word.to_vec()
        }
        Token::Bool(value) => usize_word(usize::from(*value)).to_vec(),
        Token::Uint(value) => u256_word(value).to_vec(),
        Token::FixedBytes(bytes) => {
            let mut word = [0u8; WORD];
            let len = bytes.len().min(WORD);
            word[..len].copy_from_slice(&bytes[..len]);
            word.to_vec()
        }
        Token::Array(items) => {
            let mut out = usize_word(items.len()).to_vec();
            out.extend(encode_sequence(items));
            out
        }
        Token::Tuple(items) => encode_sequence(items),
    }
}

pub fn decode(types: &[ParamType], data: &[u8]) -> Result<Vec<Token>, AbiError> {
    decode_sequence(types, data, 0)
}

fn read_word(data: &[u8], offset: usize) -> Result<&[u8], AbiError> {
    data.get(offset..offset + WORD).ok_or(AbiError::OutOfBounds {
        offset,
        len: data.len(),
    })
}

fn read_usize(data: &[u8], offset: usize) -> Result<usize, AbiError> {
    let value = U256::from_big_endian(read_word(data, offset)?);
    if value > U256::from(data.len() as u64) {
        return Err(AbiError::OutOfBounds {
            offset,
            len: data.len(),
        });
    }
    Ok(value.low_u64() as usize)
}

fn decode_sequence(types: &[ParamType], data: &[u8], base: usize) -> Result<Vec<Token>, AbiError> {
    let mut tokens = Vec::with_capacity(types.len());
    let mut cursor = base;
    for ty in types {
        if ty.is_dynamic() {
            let relative = read_usize(data, cursor)?;
            tokens.push(decode_param(ty, data, base + relative)?);
        } else {
            tokens.push(decode_param(ty, data, cursor)?);
        }
        cursor += ty.head_size();
    }
    Ok(tokens)
}

fn decode_param(ty: &ParamType, data: &[u8], at: usize) -> Result<Token, AbiError> {
    match ty {
        ParamType::Address => {
            let word = read_word(data, at)?;
            let mut bytes = [0u8; 20];
            bytes.copy_from_slice(&word[12..]);
            Ok(Token::Address(Address(bytes)))
        }
        ParamType::Bool => {
            let value = U256::from_big_endian(read_word(data, at)?);
            match value.low_u64() {
                0 if value.is_zero() => Ok(Token::Bool(false)),
                1 if value.bits() == 1 => Ok(Token::Bool(true)),
                _ => Err(AbiError::InvalidValue {
                    kind: "bool".to_string(),
                }),
            }
        }
        ParamType::Uint(bits) => {
            let value = U256::from_big_endian(read_word(data, at)?);
            if value.bits() > *bits {
                return Err(AbiError::InvalidValue {
                    kind: ty.canonical(),
                });
            }
            Ok(Token::Uint(value))
        }
        ParamType::FixedBytes(len) => {
            let word = read_word(data, at)?;
            Ok(Token::FixedBytes(word[..*len].to_vec()))
        }
        ParamType::Array(inner) => {
            let len = read_usize(data, at)?;
            let types = vec![inner.as_ref().clone(); len];
            Ok(Token::Array(decode_sequence(&types, data, at + WORD)?))
        }
        ParamType::Tuple(items) => Ok(Token::Tuple(decode_sequence(items, data, at)?)),
    }
}

/// Typed function descriptor; the canonical signature is derived from the input types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
    pub name: String,
    pub inputs: Vec<ParamType>,
    pub outputs: Vec<ParamType>,
}

impl Function {
    pub fn new(name: impl Into<String>, inputs: Vec<ParamType>, outputs: Vec<ParamType>) -> Self {
        Self {
            name: name.into(),
            inputs,
            outputs,
        }
    }

    pub fn signature(&self) -> String {
        format!(
            "{}({})",
            self.name,
            self.inputs
                .iter()
                .map(ParamType::canonical)
                .collect::<Vec<_>>()
                .join(",")
        )
    }

    pub fn selector(&self) -> Selector {
        selector(&self.signature())
    }

    pub fn encode_input(&self, args: &[Token]) -> Result<Vec<u8>, AbiError> {
        if args.len() != self.inputs.len() {
            return Err(AbiError::ArityMismatch {
                expected: self.inputs.len(),
                actual: args.len(),
            });
        }
        for (index, (arg, ty)) in args.iter().zip(&self.inputs).enumerate() {
            if !arg.matches(ty) {
                return Err(AbiError::TypeMismatch {
                    index,
                    expected: ty.canonical(),
                });
            }
        }
        let mut out = self.selector().0.to_vec();
        out.extend(encode(args));
        Ok(out)
    }

    pub fn decode_output(&self, data: &[u8]) -> Result<Vec<Token>, AbiError> {
        decode(&self.outputs, data)
    }
}

pub fn command_token(command: &Command) -> Token {
    Token::Tuple(vec![
        Token::Address(command.target),
        Token::FixedBytes(command.selector.0.to_vec()),
        Token::uint(u8::from(command.call_type)),
        Token::uint(command.fee_bips),
        Token::Uint(command.provenance_block_id.unwrap_or_default()),
    ])
}

pub fn command_from_token(token: Token) -> Result<Command, AbiError> {
    let invalid = || AbiError::InvalidValue {
        kind: ParamType::command().canonical(),
    };
    let Token::Tuple(items) = token else {
        return Err(invalid());
    };
    let [target, selector, call_type, fee_bips, provenance]: [Token; 5] =
        items.try_into().map_err(|_| invalid())?;

    let target = target.into_address().ok_or_else(invalid)?;
    let selector = match selector {
        Token::FixedBytes(bytes) if bytes.len() == 4 => {
            Selector([bytes[0], bytes[1], bytes[2], bytes[3]])
        }
        _ => return Err(invalid()),
    };
    let call_type = call_type.into_uint().ok_or_else(invalid)?;
    let fee_bips = fee_bips.into_uint().ok_or_else(invalid)?;
    let provenance = provenance.into_uint().ok_or_else(invalid)?;
    if call_type.bits() > 8 || fee_bips.bits() > 32 {
        return Err(invalid());
    }

    Ok(Command {
        target,
        selector,
        call_type: CallType::from(call_type.low_u64() as u8),
        fee_bips: fee_bips.low_u64() as u32,
        provenance_block_id: (!provenance.is_zero()).then_some(provenance),
    })
}

#[cfg(test)]
#[path = "tests/abi_tests.rs"]
mod tests;
