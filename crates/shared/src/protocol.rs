use primitive_types::U256;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    domain::{Address, CallType, Command, Selector},
    error::CoreError,
};

/// One element of the draft text format. Every field is optional on input.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftTextEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_type: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fee_bips: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provenance_block_id: Option<serde_json::Value>,
}

impl From<&Command> for DraftTextEntry {
    fn from(command: &Command) -> Self {
        Self {
            target: Some(command.target.to_string()),
            selector: Some(command.selector.to_string()),
            call_type: Some(command.call_type.into()),
            fee_bips: Some(command.fee_bips),
            provenance_block_id: command
                .provenance_block_id
                .map(|id| serde_json::Value::String(id.to_string())),
        }
    }
}

fn text_field(item: &serde_json::Value, key: &str) -> Option<String> {
    let text = match item.get(key)? {
        serde_json::Value::String(text) => text.trim().to_string(),
        serde_json::Value::Null => return None,
        other => other.to_string(),
    };
    (!text.is_empty()).then_some(text)
}

fn number_field<T: TryFrom<u64>>(item: &serde_json::Value, key: &str) -> Option<T> {
    let value = item.get(key)?;
    let raw = match value {
        serde_json::Value::Number(n) => n.as_u64()?,
        serde_json::Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    T::try_from(raw).ok()
}

impl DraftTextEntry {
    /// Reads one array element, keeping whichever fields have a usable shape.
    pub fn from_value(item: &serde_json::Value) -> Self {
        Self {
            target: text_field(item, "target"),
            selector: text_field(item, "selector"),
            call_type: number_field(item, "callType"),
            fee_bips: number_field(item, "feeBips"),
            provenance_block_id: item
                .get("provenanceBlockId")
                .filter(|value| !value.is_null())
                .cloned(),
        }
    }

    /// `None` when the entry has no usable target. Unreadable optional fields
    /// fall back to their defaults.
    pub fn into_command(self, index: usize) -> Option<Command> {
        let raw = self
            .target
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())?;
        let target: Address = match raw.parse() {
            Ok(target) => target,
            Err(err) => {
                debug!(index, target = %raw, error = %err, "draft: entry skipped");
                return None;
            }
        };

        let selector = self
            .selector
            .and_then(|raw| match raw.trim().parse::<Selector>() {
                Ok(selector) => Some(selector),
                Err(err) => {
                    debug!(index, selector = %raw, error = %err, "draft: selector unreadable");
                    None
                }
            })
            .unwrap_or(Selector::ZERO);

        Some(Command {
            target,
            selector,
            call_type: CallType::from(self.call_type.unwrap_or_default()),
            fee_bips: self.fee_bips.unwrap_or_default(),
            provenance_block_id: self.provenance_block_id.as_ref().and_then(parse_block_id),
        })
    }
}

fn parse_block_id(value: &serde_json::Value) -> Option<U256> {
    match value {
        serde_json::Value::Number(n) => n.as_u64().map(U256::from),
        serde_json::Value::String(s) => {
            let s = s.trim();
            match s.strip_prefix("0x") {
                Some(body) => U256::from_str_radix(body, 16).ok(),
                None => U256::from_dec_str(s).ok(),
            }
        }
        _ => None,
    }
}

/// Parses the JSON draft text. Invalid JSON or a non-array top level is an
/// error; entries without a readable target are dropped.
pub fn parse_draft_text(raw: &str) -> Result<Vec<Command>, CoreError> {
    let value: serde_json::Value =
        serde_json::from_str(raw).map_err(|err| CoreError::Parse(err.to_string()))?;
    let serde_json::Value::Array(items) = value else {
        return Err(CoreError::Parse(
            "JSON must be an array of commands".to_string(),
        ));
    };

    Ok(items
        .iter()
        .enumerate()
        .filter(|(_, item)| item.is_object())
        .filter_map(|(index, item)| DraftTextEntry::from_value(item).into_command(index))
        .collect())
}

pub fn render_draft_text(commands: &[Command]) -> Result<String, serde_json::Error> {
    let entries: Vec<DraftTextEntry> = commands.iter().map(DraftTextEntry::from).collect();
    serde_json::to_string_pretty(&entries)
}

/// Notifications from the signing/account collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum WalletEvent {
    AccountChanged(Option<Address>),
    ChainChanged(Option<u64>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_entries_without_target() {
        let commands = parse_draft_text(
            r#"[
                {"selector": "0x11111111"},
                {"target": "  ", "selector": "0x22222222"},
                {"target": "0x00000000000000000000000000000000000000aa", "selector": "0x33333333", "callType": 1, "feeBips": 25}
            ]"#,
        )
        .expect("parse");
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].selector, Selector([0x33; 4]));
        assert_eq!(commands[0].call_type, CallType::DelegateCall);
        assert_eq!(commands[0].fee_bips, 25);
    }

    #[test]
    fn malformed_entries_do_not_drop_the_rest() {
        let commands = parse_draft_text(
            r#"[
                {"target": "0x00000000000000000000000000000000000000aa", "selector": "0x11111111"},
                {"target": "0x123", "selector": "0x22222222"},
                {"target": 42},
                {"target": "0x...", "selector": "0x..."},
                {"target": "0x00000000000000000000000000000000000000bb", "selector": "0xzz", "callType": 900, "feeBips": -1}
            ]"#,
        )
        .expect("parse");
        assert_eq!(commands.len(), 2);
        assert_eq!(commands[0].selector, Selector([0x11; 4]));
        assert_eq!(commands[1].target.to_string(), "0x00000000000000000000000000000000000000bb");
        assert_eq!(commands[1].selector, Selector::ZERO);
        assert_eq!(commands[1].call_type, CallType::default());
        assert_eq!(commands[1].fee_bips, 0);
    }

    #[test]
    fn rejects_non_array_top_level() {
        let err = parse_draft_text(r#"{"target": "0x00"}"#).expect_err("object");
        assert!(matches!(err, CoreError::Parse(_)));
        assert!(parse_draft_text("not json").is_err());
    }

    #[test]
    fn missing_selector_defaults_to_zero() {
        let commands =
            parse_draft_text(r#"[{"target": "0x00000000000000000000000000000000000000aa"}]"#)
                .expect("parse");
        assert_eq!(commands[0].selector, Selector::ZERO);
        assert_eq!(commands[0].provenance_block_id, None);
    }

    #[test]
    fn rendered_text_parses_back() {
        let mut command = Command::new(
            "0x00000000000000000000000000000000000000aa"
                .parse()
                .expect("addr"),
            Selector([0xde, 0xad, 0xbe, 0xef]),
        );
        command.provenance_block_id = Some(U256::from(101u64));
        let text = render_draft_text(std::slice::from_ref(&command)).expect("render");
        assert_eq!(parse_draft_text(&text).expect("parse"), vec![command]);
    }
}
