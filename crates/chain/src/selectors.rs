use std::{collections::HashMap, sync::OnceLock};

use shared::domain::Selector;

use crate::abi::selector;

const KNOWN_SIGNATURES: &[&str] = &[
    "transfer(address,uint256)",
    "approve(address,uint256)",
    "transferFrom(address,address,uint256)",
    "mint(address,uint256)",
    "burn(uint256)",
    "setCommands(uint256,bytes32,(address,bytes4,uint8,uint32,uint256)[])",
    "applyBlocksToPool(uint256,uint256[])",
    "getCommands(uint256,bytes32)",
    "poolCommandTargets(uint256)",
    "commandLockedForPool(uint256,bytes32,address,bytes4)",
    "COMMAND_FEE_BIPS()",
];

fn table() -> &'static HashMap<Selector, &'static str> {
    static TABLE: OnceLock<HashMap<Selector, &'static str>> = OnceLock::new();
    TABLE.get_or_init(|| {
        KNOWN_SIGNATURES
            .iter()
            .map(|signature| (selector(signature), *signature))
            .collect()
    })
}

pub fn known_signature(selector: &Selector) -> Option<&'static str> {
    table().get(selector).copied()
}

/// Known signature text for a selector, or the raw hex when unknown.
pub fn humanize_selector(selector: &Selector) -> String {
    match known_signature(selector) {
        Some(signature) => signature.to_string(),
        None => selector.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn erc20_transfer_is_known() {
        let transfer = Selector([0xa9, 0x05, 0x9c, 0xbb]);
        assert_eq!(humanize_selector(&transfer), "transfer(address,uint256)");
    }

    #[test]
    fn unknown_selector_falls_back_to_hex() {
        assert_eq!(humanize_selector(&Selector([0xde, 0xad, 0xbe, 0xef])), "0xdeadbeef");
    }
}
