use super::*;
use shared::domain::CallType;

fn addr(last: u8) -> Address {
    let mut bytes = [0u8; 20];
    bytes[19] = last;
    Address(bytes)
}

fn word(last: u8) -> Vec<u8> {
    let mut out = vec![0u8; 32];
    out[31] = last;
    out
}

#[test]
fn selectors_match_known_values() {
    assert_eq!(
        selector("transfer(address,uint256)"),
        Selector([0xa9, 0x05, 0x9c, 0xbb])
    );
    assert_eq!(
        selector("balanceOf(address)"),
        Selector([0x70, 0xa0, 0x82, 0x31])
    );
}

#[test]
fn command_tuple_signature_is_canonical() {
    let set_commands = Function::new(
        "setCommands",
        vec![
            ParamType::Uint(256),
            ParamType::FixedBytes(32),
            ParamType::array_of(ParamType::command()),
        ],
        vec![],
    );
    assert_eq!(
        set_commands.signature(),
        "setCommands(uint256,bytes32,(address,bytes4,uint8,uint32,uint256)[])"
    );
}

#[test]
fn static_arguments_encode_one_word_each() {
    let function = Function::new(
        "transfer",
        vec![ParamType::Address, ParamType::Uint(256)],
        vec![],
    );
    let data = function
        .encode_input(&[Token::Address(addr(0xaa)), Token::uint(5u64)])
        .expect("encode");
    assert_eq!(&data[..4], &[0xa9, 0x05, 0x9c, 0xbb]);
    assert_eq!(data.len(), 4 + 64);
    assert_eq!(data[4 + 31], 0xaa);
    assert_eq!(&data[36..], word(5).as_slice());
}

#[test]
fn dynamic_array_uses_offset_then_length() {
    let encoded = encode(&[
        Token::uint(7u64),
        Token::Array(vec![Token::uint(1u64), Token::uint(2u64)]),
    ]);
    let mut expected = word(7);
    expected.extend(word(0x40));
    expected.extend(word(2));
    expected.extend(word(1));
    expected.extend(word(2));
    assert_eq!(encoded, expected);

    let decoded = decode(
        &[ParamType::Uint(256), ParamType::array_of(ParamType::Uint(256))],
        &encoded,
    )
    .expect("decode");
    assert_eq!(
        decoded,
        vec![
            Token::uint(7u64),
            Token::Array(vec![Token::uint(1u64), Token::uint(2u64)])
        ]
    );
}

#[test]
fn command_array_decodes_into_commands() {
    let first = Command {
        target: addr(1),
        selector: Selector([0x11; 4]),
        call_type: CallType::DelegateCall,
        fee_bips: 30,
        provenance_block_id: Some(U256::from(101u64)),
    };
    let second = Command::new(addr(2), Selector([0x22; 4]));
    let encoded = encode(&[Token::Array(vec![
        command_token(&first),
        command_token(&second),
    ])]);
    // offset + length + two static five-word tuples
    assert_eq!(encoded.len(), 32 * (2 + 2 * 5));

    let mut tokens =
        decode(&[ParamType::array_of(ParamType::command())], &encoded).expect("decode");
    let items = tokens.remove(0).into_array().expect("array");
    let commands: Vec<Command> = items
        .into_iter()
        .map(command_from_token)
        .collect::<Result<_, _>>()
        .expect("commands");
    assert_eq!(commands, vec![first, second]);
}

#[test]
fn truncated_data_is_out_of_bounds() {
    let err = decode(&[ParamType::Uint(256)], &[0u8; 16]).expect_err("short");
    assert!(matches!(err, AbiError::OutOfBounds { .. }));
    let err = decode(&[ParamType::array_of(ParamType::Address)], &word(0x20)).expect_err("len");
    assert!(matches!(err, AbiError::OutOfBounds { .. }));
}

#[test]
fn narrow_uint_rejects_wide_value() {
    let err = decode(&[ParamType::Uint(8)], &[0xff; 32]).expect_err("wide");
    assert!(matches!(err, AbiError::InvalidValue { .. }));
}

#[test]
fn encode_input_checks_arity_and_types() {
    let function = Function::new("burn", vec![ParamType::Uint(256)], vec![]);
    assert!(matches!(
        function.encode_input(&[]),
        Err(AbiError::ArityMismatch {
            expected: 1,
            actual: 0
        })
    ));
    assert!(matches!(
        function.encode_input(&[Token::Bool(true)]),
        Err(AbiError::TypeMismatch { index: 0, .. })
    ));
}

#[test]
fn bool_outputs_decode_strictly() {
    let function = Function::new("locked", vec![], vec![ParamType::Bool]);
    assert_eq!(
        function.decode_output(&word(1)).expect("true"),
        vec![Token::Bool(true)]
    );
    assert!(function.decode_output(&word(2)).is_err());
}
