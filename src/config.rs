use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::from_str;
use std::collections::BTreeMap;
use std::path::PathBuf;

pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 15;
pub const DEFAULT_CONFIRM_INTERVAL_SECS: u64 = 3;

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Config {
    pub chain: Chain,
    pub root_secret: String,
    /// Org registry override; the built-in registry is used when empty.
    #[serde(default)]
    pub orgs: Vec<OrgEntry>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Chain {
    pub name: String,
    #[serde(rename = "chainId")]
    pub chain_id: u64,

    pub endpoint: String,
    pub opts: ChainOpts,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ChainOpts {
    /// Deployed leaderboard contract address.
    pub leaderboard: String,
    #[serde(rename = "gasLimit")]
    pub gas_limit: u64,
    #[serde(rename = "maxGasPrice")]
    pub max_gas_price: u128,

    #[serde(rename = "pollInterval", default = "default_poll_interval")]
    pub poll_interval: u64,

    #[serde(rename = "confirmInterval", default = "default_confirm_interval")]
    pub confirm_interval: u64,
}

fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

fn default_confirm_interval() -> u64 {
    DEFAULT_CONFIRM_INTERVAL_SECS
}

impl Default for ChainOpts {
    fn default() -> Self {
        Self {
            leaderboard: String::new(),
            gas_limit: 1_000_000,
            max_gas_price: 10_000_000_000,
            poll_interval: DEFAULT_POLL_INTERVAL_SECS,
            confirm_interval: DEFAULT_CONFIRM_INTERVAL_SECS,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct OrgEntry {
    pub id: u64,
    pub name: String,
}

impl Config {
    pub fn parse_from_file(file: &PathBuf) -> Result<Self> {
        let confstr = std::fs::read_to_string(file)?;
        from_str(&confstr).map_err(|e| Error::Config(format!("{}: {}", file.display(), e)))
    }

    pub fn registry(&self) -> OrgRegistry {
        if self.orgs.is_empty() {
            OrgRegistry::builtin()
        } else {
            OrgRegistry::from_pairs(self.orgs.iter().map(|o| (o.id, o.name.clone())))
        }
    }

    pub fn show() {
        let de: Self = Default::default();
        println!("{}", serde_json::to_string_pretty(&de).unwrap())
    }
}

/// Fixed set of organizations eligible for the leaderboard. Display names are
/// provisioned here, never read from the ledger; the ledger is only asked for
/// amounts.
#[derive(Debug, Clone, Default)]
pub struct OrgRegistry {
    orgs: BTreeMap<u64, String>,
}

impl OrgRegistry {
    pub fn builtin() -> Self {
        Self::from_pairs(
            [
                (1, "Red Cross"),
                (2, "Habitat for Humanity"),
                (3, "Food Bank Network"),
                (4, "Animal Rescue League"),
                (5, "Youth Education Fund"),
            ]
            .into_iter()
            .map(|(id, name)| (id, name.to_owned())),
        )
    }

    pub fn from_pairs<I: IntoIterator<Item = (u64, String)>>(pairs: I) -> Self {
        Self {
            orgs: pairs.into_iter().collect(),
        }
    }

    /// Org ids in ascending order; the enumeration domain for every refresh.
    pub fn ids(&self) -> Vec<u64> {
        self.orgs.keys().copied().collect()
    }

    pub fn contains(&self, id: u64) -> bool {
        self.orgs.contains_key(&id)
    }

    pub fn name(&self, id: u64) -> Option<&str> {
        self.orgs.get(&id).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, &str)> {
        self.orgs.iter().map(|(id, name)| (*id, name.as_str()))
    }

    pub fn len(&self) -> usize {
        self.orgs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orgs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_config_with_defaults() {
        let raw = r#"{
            "chain": {
                "name": "sepolia",
                "chainId": 11155111,
                "endpoint": "https://rpc.sepolia.org",
                "opts": {
                    "leaderboard": "0x81A1F0EaAe2a930B3CE1477e67500db7C6cA5719",
                    "gasLimit": 1000000,
                    "maxGasPrice": 10000000000
                }
            },
            "root_secret": "deadbeef"
        }"#;
        let config: Config = serde_json::from_str(raw).unwrap();
        assert_eq!(config.chain.chain_id, 11155111);
        assert_eq!(config.chain.opts.poll_interval, DEFAULT_POLL_INTERVAL_SECS);
        assert_eq!(config.chain.opts.confirm_interval, DEFAULT_CONFIRM_INTERVAL_SECS);
        assert!(config.orgs.is_empty());
    }

    #[test]
    fn builtin_registry_has_five_orgs_in_id_order() {
        let registry = OrgRegistry::builtin();
        assert_eq!(registry.ids(), vec![1, 2, 3, 4, 5]);
        assert_eq!(registry.name(1), Some("Red Cross"));
        assert_eq!(registry.name(9), None);
    }

    #[test]
    fn config_orgs_override_builtin() {
        let mut config = Config::default();
        config.orgs = vec![
            OrgEntry { id: 7, name: "Shelter".to_owned() },
            OrgEntry { id: 3, name: "Clinic".to_owned() },
        ];
        let registry = config.registry();
        assert_eq!(registry.ids(), vec![3, 7]);
        assert_eq!(registry.name(7), Some("Shelter"));
    }
}
