//! Wallet and contract collaborator
//!
//! Signing and chain access live outside this crate; games and redemption
//! reach them through [`WalletGateway`]. The helpers here turn the gateway's
//! answers into precondition failures before any state changes.

use crate::config::WalletConfig;
use crate::errors::{ArcadeResult, ErrorCategory, PreconditionError};
use crate::store::normalize_address;
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

pub type TxHash = String;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WalletError {
    #[error("Wallet is not connected")]
    NotConnected,

    #[error("Transaction rejected: {0}")]
    Rejected(String),

    #[error("Contract call reverted: {0}")]
    Reverted(String),

    #[error("Wallet provider unavailable: {0}")]
    Unavailable(String),

    #[error("Balance fetch timed out after {0:?}")]
    Timeout(Duration),
}

impl WalletError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            WalletError::NotConnected => ErrorCategory::Precondition,
            _ => ErrorCategory::External,
        }
    }
}

/// Contract invocation handed to the wallet for signing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContractCall {
    pub contract: String,
    /// JSON ABI fragment for `function`
    pub abi: String,
    pub function: String,
    pub args: Vec<String>,
    /// Native value attached, in wei
    pub value: u128,
}

impl ContractCall {
    pub fn new(contract: impl Into<String>, function: impl Into<String>) -> Self {
        let function = function.into();
        Self {
            contract: contract.into(),
            abi: single_uint_abi(&function),
            function,
            args: Vec::new(),
            value: 0,
        }
    }

    /// Argument-free payable call; the stake travels as `value`
    pub fn payable(contract: impl Into<String>, function: impl Into<String>) -> Self {
        let function = function.into();
        Self {
            contract: contract.into(),
            abi: payable_abi(&function),
            function,
            args: Vec::new(),
            value: 0,
        }
    }

    pub fn arg(mut self, arg: impl ToString) -> Self {
        self.args.push(arg.to_string());
        self
    }

    pub fn value(mut self, value: u128) -> Self {
        self.value = value;
        self
    }
}

fn single_uint_abi(function: &str) -> String {
    serde_json::json!([{
        "type": "function",
        "name": function,
        "stateMutability": "nonpayable",
        "inputs": [{ "name": "amount", "type": "uint256" }],
        "outputs": [],
    }])
    .to_string()
}

fn payable_abi(function: &str) -> String {
    serde_json::json!([{
        "type": "function",
        "name": function,
        "stateMutability": "payable",
        "inputs": [],
        "outputs": [],
    }])
    .to_string()
}

#[async_trait]
pub trait WalletGateway: Send + Sync {
    /// Connected account, if the user approved a connection
    async fn connect(&self) -> Option<String>;

    async fn get_balance(&self, address: &str) -> Result<u128, WalletError>;

    async fn chain_id(&self) -> Result<u64, WalletError>;

    async fn switch_network(&self, chain_id: u64) -> Result<(), WalletError>;

    async fn send_contract_call(&self, call: ContractCall) -> Result<TxHash, WalletError>;
}

/// Balance read with a single retry bounded by the configured timeout
pub async fn fetch_balance_with_retry(
    wallet: &dyn WalletGateway,
    address: &str,
    retry_timeout: Duration,
) -> Result<u128, WalletError> {
    match wallet.get_balance(address).await {
        Ok(balance) => Ok(balance),
        Err(err) => {
            warn!(address, error = %err, "balance fetch failed, retrying once");
            tokio::time::timeout(retry_timeout, wallet.get_balance(address))
                .await
                .map_err(|_| WalletError::Timeout(retry_timeout))?
        }
    }
}

/// Connected address on the expected chain. A wallet on another chain is
/// asked to switch once; if it refuses the call fails with `WrongChain`.
pub async fn require_connected(wallet: &dyn WalletGateway, config: &WalletConfig) -> ArcadeResult<String> {
    let address = wallet.connect().await.ok_or(PreconditionError::NoWallet)?;
    let address = normalize_address(&address)?;

    let actual = wallet.chain_id().await?;
    if actual != config.chain_id {
        debug!(expected = config.chain_id, actual, "requesting network switch");
        if let Err(err) = wallet.switch_network(config.chain_id).await {
            warn!(error = %err, "network switch refused");
            return Err(PreconditionError::WrongChain {
                expected: config.chain_id,
                actual,
            }
            .into());
        }
    }

    Ok(address)
}

/// Preconditions for placing a bet of `amount`
pub async fn ensure_can_bet(wallet: &dyn WalletGateway, config: &WalletConfig, amount: u64) -> ArcadeResult<String> {
    let address = require_connected(wallet, config).await?;
    let retry_timeout = Duration::from_secs(config.balance_retry_timeout_secs);
    let available = fetch_balance_with_retry(wallet, &address, retry_timeout).await?;

    if available < u128::from(amount) {
        return Err(PreconditionError::InsufficientBalance {
            required: u128::from(amount),
            available,
        }
        .into());
    }
    Ok(address)
}

/// Scriptable wallet for unit tests
#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Debug)]
    pub struct FakeWallet {
        pub address: Option<String>,
        pub chain_id: Mutex<u64>,
        pub allow_switch: bool,
        pub balance: u128,
        /// Balance reads that fail before one succeeds
        pub balance_failures: AtomicUsize,
        pub balance_delay: Duration,
        pub call_result: Result<TxHash, WalletError>,
        pub calls: Mutex<Vec<ContractCall>>,
    }

    impl FakeWallet {
        pub fn connected(address: &str, balance: u128) -> Self {
            Self {
                address: Some(address.to_string()),
                chain_id: Mutex::new(WalletConfig::default().chain_id),
                allow_switch: true,
                balance,
                balance_failures: AtomicUsize::new(0),
                balance_delay: Duration::ZERO,
                call_result: Ok("0xtx".to_string()),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn disconnected() -> Self {
            Self {
                address: None,
                ..Self::connected("0x0", 0)
            }
        }

        pub fn calls(&self) -> Vec<ContractCall> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl WalletGateway for FakeWallet {
        async fn connect(&self) -> Option<String> {
            self.address.clone()
        }

        async fn get_balance(&self, _address: &str) -> Result<u128, WalletError> {
            if self.balance_failures.load(Ordering::SeqCst) > 0 {
                self.balance_failures.fetch_sub(1, Ordering::SeqCst);
                return Err(WalletError::Unavailable("rpc down".to_string()));
            }
            if !self.balance_delay.is_zero() {
                tokio::time::sleep(self.balance_delay).await;
            }
            Ok(self.balance)
        }

        async fn chain_id(&self) -> Result<u64, WalletError> {
            Ok(*self.chain_id.lock().unwrap())
        }

        async fn switch_network(&self, chain_id: u64) -> Result<(), WalletError> {
            if !self.allow_switch {
                return Err(WalletError::Rejected("user declined".to_string()));
            }
            *self.chain_id.lock().unwrap() = chain_id;
            Ok(())
        }

        async fn send_contract_call(&self, call: ContractCall) -> Result<TxHash, WalletError> {
            self.calls.lock().unwrap().push(call);
            self.call_result.clone()
        }
    }
}
