//! Function descriptors for the MasterControl admin surface.

use chain::abi::{command_token, Function, ParamType, Token};
use shared::domain::{Command, HookPath, PoolId};

pub const BLOCK_COMMAND_GETTERS: &[&str] = &["getBlockCommands", "blockCommands"];

fn commands_type() -> ParamType {
    ParamType::array_of(ParamType::command())
}

pub fn get_commands() -> Function {
    Function::new(
        "getCommands",
        vec![ParamType::Uint(256), ParamType::FixedBytes(32)],
        vec![commands_type()],
    )
}

pub fn pool_command_targets() -> Function {
    Function::new(
        "poolCommandTargets",
        vec![ParamType::Uint(256)],
        vec![ParamType::array_of(ParamType::Address)],
    )
}

pub fn command_locked_for_pool() -> Function {
    Function::new(
        "commandLockedForPool",
        vec![
            ParamType::Uint(256),
            ParamType::FixedBytes(32),
            ParamType::Address,
            ParamType::FixedBytes(4),
        ],
        vec![ParamType::Bool],
    )
}

/// Per-target fee getter exposed by command contracts.
pub fn command_fee_bips() -> Function {
    Function::new("COMMAND_FEE_BIPS", vec![], vec![ParamType::Uint(256)])
}

pub fn block_commands(name: &str) -> Function {
    Function::new(name, vec![ParamType::Uint(256)], vec![commands_type()])
}

pub fn set_commands() -> Function {
    Function::new(
        "setCommands",
        vec![
            ParamType::Uint(256),
            ParamType::FixedBytes(32),
            commands_type(),
        ],
        vec![],
    )
}

pub fn apply_blocks_to_pool() -> Function {
    Function::new(
        "applyBlocksToPool",
        vec![
            ParamType::Uint(256),
            ParamType::array_of(ParamType::Uint(256)),
        ],
        vec![],
    )
}

pub fn pool_hook_args(pool: PoolId, hook_path: HookPath) -> Vec<Token> {
    vec![
        Token::Uint(pool.0),
        Token::FixedBytes(hook_path.as_bytes().to_vec()),
    ]
}

pub fn set_commands_args(pool: PoolId, hook_path: HookPath, commands: &[Command]) -> Vec<Token> {
    let mut args = pool_hook_args(pool, hook_path);
    args.push(Token::Array(commands.iter().map(command_token).collect()));
    args
}

pub fn apply_blocks_args(pool: PoolId, block_ids: &[u64]) -> Vec<Token> {
    vec![
        Token::Uint(pool.0),
        Token::Array(block_ids.iter().map(|id| Token::uint(*id)).collect()),
    ]
}
