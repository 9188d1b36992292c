use std::{collections::HashMap, fs, path::Path, time::Duration};

use anyhow::Context;
use chain::signer::ReceiptPolicy;
use shared::domain::Address;
use url::Url;

pub const DEFAULT_CONFIG_FILE: &str = "hookctl.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub rpc_url: String,
    pub chain_id: Option<u64>,
    pub master_control_address: Option<Address>,
    pub access_control_address: Option<Address>,
    /// Unlocked node account used to sign.
    pub from_address: Option<Address>,
    pub resolver_index_limit: usize,
    pub receipt_poll_interval_ms: u64,
    pub receipt_timeout_secs: u64,
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            rpc_url: "http://127.0.0.1:8545".into(),
            chain_id: None,
            master_control_address: None,
            access_control_address: None,
            from_address: None,
            resolver_index_limit: 50,
            receipt_poll_interval_ms: 1000,
            receipt_timeout_secs: 120,
            log_filter: "info".into(),
        }
    }
}

const KEYS: [&str; 9] = [
    "rpc_url",
    "chain_id",
    "master_control_address",
    "access_control_address",
    "from_address",
    "resolver_index_limit",
    "receipt_poll_interval_ms",
    "receipt_timeout_secs",
    "log_filter",
];

impl Settings {
    fn set(&mut self, key: &str, raw: &str) -> anyhow::Result<()> {
        let value = raw.trim();
        match key {
            "rpc_url" => self.rpc_url = value.to_string(),
            "chain_id" => self.chain_id = Some(parse_number(key, value)?),
            "master_control_address" => self.master_control_address = parse_address(key, value)?,
            "access_control_address" => self.access_control_address = parse_address(key, value)?,
            "from_address" => self.from_address = parse_address(key, value)?,
            "resolver_index_limit" => self.resolver_index_limit = parse_number(key, value)?,
            "receipt_poll_interval_ms" => self.receipt_poll_interval_ms = parse_number(key, value)?,
            "receipt_timeout_secs" => self.receipt_timeout_secs = parse_number(key, value)?,
            "log_filter" => self.log_filter = value.to_string(),
            _ => {}
        }
        Ok(())
    }

    pub fn rpc_endpoint(&self) -> anyhow::Result<Url> {
        Url::parse(&self.rpc_url).with_context(|| format!("invalid rpc_url '{}'", self.rpc_url))
    }

    pub fn receipt_policy(&self) -> ReceiptPolicy {
        ReceiptPolicy {
            poll_interval: Duration::from_millis(self.receipt_poll_interval_ms),
            timeout: Duration::from_secs(self.receipt_timeout_secs),
        }
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> anyhow::Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .parse()
        .with_context(|| format!("invalid {key} '{value}'"))
}

fn parse_address(key: &str, value: &str) -> anyhow::Result<Option<Address>> {
    if value.is_empty() {
        return Ok(None);
    }
    let address = value
        .parse::<Address>()
        .with_context(|| format!("invalid {key} '{value}'"))?;
    Ok(Some(address))
}

/// Defaults, then the config file, then `HOOKCTL_*` and `APP__*` variables.
pub fn load_settings(path: Option<&Path>) -> anyhow::Result<Settings> {
    let raw = match path {
        Some(path) => Some(
            fs::read_to_string(path)
                .with_context(|| format!("failed to read config '{}'", path.display()))?,
        ),
        None => fs::read_to_string(DEFAULT_CONFIG_FILE).ok(),
    };
    resolve_settings(raw.as_deref(), |name| std::env::var(name).ok())
}

fn resolve_settings(
    file: Option<&str>,
    env: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();

    if let Some(raw) = file {
        let file_cfg: HashMap<String, toml::Value> =
            toml::from_str(raw).context("config file is not valid TOML")?;
        for key in KEYS {
            if let Some(value) = file_cfg.get(key) {
                let text = match value {
                    toml::Value::String(text) => text.clone(),
                    other => other.to_string(),
                };
                settings.set(key, &text)?;
            }
        }
    }

    for key in KEYS {
        let upper = key.to_ascii_uppercase();
        if let Some(value) = env(&format!("HOOKCTL_{upper}")) {
            settings.set(key, &value)?;
        }
        if let Some(value) = env(&format!("APP__{upper}")) {
            settings.set(key, &value)?;
        }
    }

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn defaults_without_file_or_env() {
        let settings = resolve_settings(None, no_env).expect("settings");
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.receipt_policy().timeout, Duration::from_secs(120));
    }

    #[test]
    fn file_values_are_typed_and_validated() {
        let raw = r#"
rpc_url = "http://node:8545"
chain_id = 8453
master_control_address = "0x00000000000000000000000000000000000000C0"
resolver_index_limit = 10
"#;
        let settings = resolve_settings(Some(raw), no_env).expect("settings");
        assert_eq!(settings.rpc_url, "http://node:8545");
        assert_eq!(settings.chain_id, Some(8453));
        assert_eq!(
            settings.master_control_address.map(|a| a.to_string()),
            Some("0x00000000000000000000000000000000000000c0".to_string())
        );
        assert_eq!(settings.resolver_index_limit, 10);

        let bad = r#"from_address = "0x1234""#;
        assert!(resolve_settings(Some(bad), no_env).is_err());
    }

    #[test]
    fn app_prefix_overrides_hookctl_prefix_and_file() {
        let raw = r#"log_filter = "debug""#;
        let env = |name: &str| match name {
            "HOOKCTL_LOG_FILTER" => Some("warn".to_string()),
            "APP__LOG_FILTER" => Some("trace".to_string()),
            "HOOKCTL_RECEIPT_POLL_INTERVAL_MS" => Some("250".to_string()),
            _ => None,
        };
        let settings = resolve_settings(Some(raw), env).expect("settings");
        assert_eq!(settings.log_filter, "trace");
        assert_eq!(
            settings.receipt_policy().poll_interval,
            Duration::from_millis(250)
        );
    }

    #[test]
    fn empty_address_clears_the_setting() {
        let env = |name: &str| (name == "APP__FROM_ADDRESS").then(String::new);
        let raw = r#"from_address = "0x00000000000000000000000000000000000000a1""#;
        let settings = resolve_settings(Some(raw), env).expect("settings");
        assert_eq!(settings.from_address, None);
    }
}
