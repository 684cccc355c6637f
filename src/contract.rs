use crate::config::{Chain, Config};
use crate::error::{Error, Result};
use crate::state::RoundSnapshot;
use crate::tracker::{OpKind, TxHandle};
use crate::utils::{contract_err, extract_keypair_from_str, web3_err};
use async_trait::async_trait;
use lazy_static::lazy_static;
use log::warn;
use reqwest::{Client, Url};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::Mutex;
use web3::{
    api::Eth,
    contract::{tokens::Tokenize, Contract, Options},
    transports::Http,
    types::{Address, BlockNumber, U256},
};

/// Minimal ABI of the deployed leaderboard contract, limited to the surface
/// this client uses.
pub const LEADERBOARD_ABI: &str = r#"[
  {"type":"function","name":"donate","stateMutability":"payable","inputs":[{"name":"orgId","type":"uint256"}],"outputs":[]},
  {"type":"function","name":"fundRewardPool","stateMutability":"payable","inputs":[],"outputs":[]},
  {"type":"function","name":"startNewRound","stateMutability":"nonpayable","inputs":[],"outputs":[]},
  {"type":"function","name":"selectWinnerAndPayoutTop","stateMutability":"nonpayable","inputs":[],"outputs":[]},
  {"type":"function","name":"withdrawOrgFunds","stateMutability":"nonpayable","inputs":[{"name":"orgId","type":"uint256"}],"outputs":[]},
  {"type":"function","name":"admin","stateMutability":"view","inputs":[],"outputs":[{"name":"","type":"address"}]},
  {"type":"function","name":"canEndRound","stateMutability":"view","inputs":[],"outputs":[{"name":"","type":"bool"}]},
  {"type":"function","name":"getLeaderboard","stateMutability":"view","inputs":[{"name":"orgIds","type":"uint256[]"}],"outputs":[{"name":"","type":"uint256[]"}]},
  {"type":"function","name":"getRoundInfo","stateMutability":"view","inputs":[],"outputs":[{"name":"roundId","type":"uint256"},{"name":"startTime","type":"uint256"},{"name":"minEndTime","type":"uint256"},{"name":"poolBalance","type":"uint256"},{"name":"reward","type":"uint256"}]}
]"#;

lazy_static! {
    // Nonce lookup and signed submission must not interleave for one key.
    static ref SUBMIT_LOCK: Mutex<()> = Mutex::new(());
}

/// Bound identity. Produced by `connect`, owned by the controller, dropped on
/// teardown. The admin flag is filled in during bootstrap.
#[derive(Debug, Clone)]
pub struct Session {
    pub account: Address,
    pub chain_id: u64,
    pub admin: bool,
}

/// The five state-changing ledger operations, with wei amounts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    Donate { org_id: u64, amount: U256 },
    FundPool { amount: U256 },
    StartRound,
    SelectWinner,
    Withdraw { org_id: u64 },
}

impl WriteOp {
    pub fn kind(&self) -> OpKind {
        match self {
            WriteOp::Donate { .. } => OpKind::Donate,
            WriteOp::FundPool { .. } => OpKind::FundPool,
            WriteOp::StartRound => OpKind::StartRound,
            WriteOp::SelectWinner => OpKind::SelectWinner,
            WriteOp::Withdraw { .. } => OpKind::Withdraw,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxOutcome {
    Confirmed,
    Failed,
}

/// Typed capability set over the external ledger. Reads are side-effect-free
/// and may run concurrently; writes go through `submit` and are ordered by
/// the ledger itself.
#[async_trait]
pub trait LedgerGateway: Send + Sync {
    async fn connect(&self) -> Result<Session>;
    async fn round_info(&self) -> Result<RoundSnapshot>;
    async fn org_totals(&self, ids: &[u64]) -> Result<BTreeMap<u64, U256>>;
    async fn admin(&self) -> Result<Address>;
    async fn can_end_round(&self) -> Result<bool>;
    async fn submit(&self, op: &WriteOp) -> Result<TxHandle>;
    /// Waits on ledger finality; no client-imposed timeout.
    async fn await_confirmation(&self, handle: TxHandle) -> Result<TxOutcome>;
}

/// Production gateway over the deployed contract, web3 + HTTP transport.
pub struct EthLeaderboard {
    eth: Eth<Http>,
    chain: Chain,
    root_secret: String,
    confirm_interval: Duration,
}

impl EthLeaderboard {
    pub fn setup(config: &Config, timeout: Option<u64>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout.unwrap_or(10)))
            .build()
            .map_err(|e| Error::Config(format!("http client: {}", e)))?;
        let url = Url::parse(config.chain.endpoint.as_str())
            .map_err(|e| Error::Config(format!("bad endpoint {:?}: {}", config.chain.endpoint, e)))?;
        let transport = Http::with_client(client, url);
        let web3 = web3::Web3::new(transport);
        Ok(Self {
            eth: web3.eth(),
            chain: config.chain.clone(),
            root_secret: config.root_secret.clone(),
            confirm_interval: Duration::from_secs(config.chain.opts.confirm_interval),
        })
    }

    fn contract(&self) -> Result<Contract<Http>> {
        let addr: Address = self
            .chain
            .opts
            .leaderboard
            .trim()
            .parse()
            .map_err(|_| Error::ContractUnconfigured)?;
        Contract::from_json(self.eth.clone(), addr, LEADERBOARD_ABI.as_bytes())
            .map_err(|e| Error::GatewayCallFailed(format!("abi: {}", e)))
    }

    /// Preflight with `estimate_gas` to catch a revert before paying for it,
    /// then sign and send with a pending nonce.
    async fn signed_submit<P>(&self, func: &str, params: P, value: Option<U256>) -> Result<TxHandle>
    where
        P: Tokenize + Clone + Send,
    {
        let contract = self.contract()?;
        let (sk, from) = extract_keypair_from_str(&self.root_secret)?;

        let preflight = Options {
            value,
            ..Default::default()
        };
        contract
            .estimate_gas(func, params.clone(), from, preflight)
            .await
            .map_err(contract_err)?;

        let mut opt = Options {
            gas: Some(self.chain.opts.gas_limit.into()),
            gas_price: Some(self.chain.opts.max_gas_price.into()),
            value,
            ..Default::default()
        };
        let hash = {
            let _guard = SUBMIT_LOCK.lock().await;
            opt.nonce = Some(
                self.eth
                    .transaction_count(from, Some(BlockNumber::Pending))
                    .await
                    .map_err(web3_err)?,
            );
            contract
                .signed_call(func, params, opt, &sk)
                .await
                .map_err(web3_err)?
        };
        Ok(TxHandle(hash))
    }
}

#[async_trait]
impl LedgerGateway for EthLeaderboard {
    async fn connect(&self) -> Result<Session> {
        if self.chain.opts.leaderboard.trim().is_empty() {
            return Err(Error::ContractUnconfigured);
        }
        if self.root_secret.trim().is_empty() {
            return Err(Error::NoWallet);
        }
        let (_sk, account) = extract_keypair_from_str(&self.root_secret)?;

        let actual = self.eth.chain_id().await.map_err(web3_err)?.as_u64();
        if actual != self.chain.chain_id {
            return Err(Error::WrongNetwork {
                expected: self.chain.chain_id,
                actual,
            });
        }
        Ok(Session {
            account,
            chain_id: actual,
            admin: false,
        })
    }

    async fn round_info(&self) -> Result<RoundSnapshot> {
        let contract = self.contract()?;
        let (round_id, start_time, min_end_time, pool_balance, reward): (U256, U256, U256, U256, U256) = contract
            .query("getRoundInfo", (), None, Options::default(), None)
            .await
            .map_err(contract_err)?;
        Ok(RoundSnapshot {
            round_id: round_id.as_u64(),
            start_time: start_time.as_u64(),
            min_end_time: min_end_time.as_u64(),
            pool_balance,
            reward,
        })
    }

    async fn org_totals(&self, ids: &[u64]) -> Result<BTreeMap<u64, U256>> {
        let contract = self.contract()?;
        let params: Vec<U256> = ids.iter().map(|&id| U256::from(id)).collect();
        let totals: Vec<U256> = contract
            .query("getLeaderboard", params, None, Options::default(), None)
            .await
            .map_err(contract_err)?;
        if totals.len() != ids.len() {
            return Err(Error::GatewayCallFailed(format!(
                "getLeaderboard returned {} totals for {} ids",
                totals.len(),
                ids.len()
            )));
        }
        Ok(ids.iter().copied().zip(totals).collect())
    }

    async fn admin(&self) -> Result<Address> {
        let contract = self.contract()?;
        contract
            .query("admin", (), None, Options::default(), None)
            .await
            .map_err(contract_err)
    }

    async fn can_end_round(&self) -> Result<bool> {
        let contract = self.contract()?;
        contract
            .query("canEndRound", (), None, Options::default(), None)
            .await
            .map_err(contract_err)
    }

    async fn submit(&self, op: &WriteOp) -> Result<TxHandle> {
        match op {
            WriteOp::Donate { org_id, amount } => {
                self.signed_submit("donate", U256::from(*org_id), Some(*amount)).await
            }
            WriteOp::FundPool { amount } => self.signed_submit("fundRewardPool", (), Some(*amount)).await,
            WriteOp::StartRound => self.signed_submit("startNewRound", (), None).await,
            WriteOp::SelectWinner => self.signed_submit("selectWinnerAndPayoutTop", (), None).await,
            WriteOp::Withdraw { org_id } => {
                self.signed_submit("withdrawOrgFunds", U256::from(*org_id), None).await
            }
        }
    }

    async fn await_confirmation(&self, handle: TxHandle) -> Result<TxOutcome> {
        loop {
            match self.eth.transaction_receipt(handle.0).await {
                Ok(Some(receipt)) => {
                    let confirmed = receipt.status == Some(1.into());
                    return Ok(if confirmed { TxOutcome::Confirmed } else { TxOutcome::Failed });
                }
                Ok(None) => {}
                // Transient RPC failure is not finality, keep polling.
                Err(e) => warn!("receipt poll for {:?} failed: {}", handle.0, e),
            }
            tokio::time::sleep(self.confirm_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offline_config() -> Config {
        let mut config = Config::default();
        config.chain.name = "sepolia".to_owned();
        config.chain.chain_id = 11155111;
        config.chain.endpoint = "http://localhost:8545".to_owned();
        config
    }

    #[test]
    fn embedded_abi_parses() {
        let abi = web3::ethabi::Contract::load(LEADERBOARD_ABI.as_bytes()).unwrap();
        for name in [
            "donate",
            "fundRewardPool",
            "startNewRound",
            "selectWinnerAndPayoutTop",
            "withdrawOrgFunds",
            "admin",
            "canEndRound",
            "getLeaderboard",
            "getRoundInfo",
        ] {
            assert!(abi.function(name).is_ok(), "missing {}", name);
        }
    }

    #[tokio::test]
    async fn connect_without_contract_address_fails_before_any_network_call() {
        let mut config = offline_config();
        config.root_secret = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80".to_owned();
        let gateway = EthLeaderboard::setup(&config, Some(1)).unwrap();
        match gateway.connect().await {
            Err(Error::ContractUnconfigured) => {}
            other => panic!("expected ContractUnconfigured, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn connect_without_signing_key_fails_with_no_wallet() {
        let mut config = offline_config();
        config.chain.opts.leaderboard = "0x81A1F0EaAe2a930B3CE1477e67500db7C6cA5719".to_owned();
        let gateway = EthLeaderboard::setup(&config, Some(1)).unwrap();
        match gateway.connect().await {
            Err(Error::NoWallet) => {}
            other => panic!("expected NoWallet, got {:?}", other),
        }
    }
}
