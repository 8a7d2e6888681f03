//! Miles to token redemption
//!
//! Order matters: preconditions, then the contract call, then the debit. If
//! the debit fails after the chain accepted the call, the user holds both
//! the tokens and the miles; that is logged loudly and returned, not undone.

use super::RewardsError;
use crate::config::WalletConfig;
use crate::errors::{ArcadeError, ArcadeResult, PreconditionError};
use crate::notify::{notify_failure, Notice, Notifier};
use crate::store::{get_i64, normalize_address, PartialUpdate, ProfileStore};
use crate::wallet::{require_connected, ContractCall, TxHash, WalletGateway};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RedeemReceipt {
    pub address: String,
    pub miles: u64,
    pub tx_hash: TxHash,
}

pub struct Redeemer {
    store: Arc<dyn ProfileStore>,
    config: WalletConfig,
    notifier: Arc<dyn Notifier>,
}

impl Redeemer {
    pub fn new(store: Arc<dyn ProfileStore>, config: WalletConfig, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, config, notifier }
    }

    pub async fn redeem(&self, wallet: &dyn WalletGateway, address: &str, miles: u64) -> ArcadeResult<RedeemReceipt> {
        let result = self.try_redeem(wallet, address, miles).await;
        match &result {
            Ok(receipt) => self
                .notifier
                .notify(Notice::success(format!("Redeemed {} Meow Miles", receipt.miles))),
            Err(err) => notify_failure(self.notifier.as_ref(), err),
        }
        result
    }

    async fn try_redeem(&self, wallet: &dyn WalletGateway, address: &str, miles: u64) -> ArcadeResult<RedeemReceipt> {
        if miles == 0 {
            return Err(PreconditionError::ZeroAmount.into());
        }
        let address = normalize_address(address)?;
        let connected = require_connected(wallet, &self.config).await?;
        if connected != address {
            return Err(PreconditionError::WalletMismatch {
                expected: address,
                connected,
            }
            .into());
        }

        let available = self.balance(&address).await?;
        if available < miles {
            return Err(PreconditionError::InsufficientMiles {
                required: miles,
                available,
            }
            .into());
        }

        let call = ContractCall::new(&self.config.token_contract, &self.config.redeem_function).arg(miles);
        let tx_hash = wallet.send_contract_call(call).await?;
        info!(address = %address, miles, tx_hash = %tx_hash, "redeem call accepted");

        let debit = i64::try_from(miles).unwrap_or(i64::MAX);
        let debited = self
            .store
            .run_atomic(&address, &|doc| {
                let available = doc.and_then(|d| get_i64(d, "miles")).unwrap_or(0);
                if available < debit {
                    return Err(PreconditionError::InsufficientMiles {
                        required: miles,
                        available: available.max(0) as u64,
                    }
                    .into());
                }
                Ok(PartialUpdate::new()
                    .increment("miles", -debit)
                    .increment("redeemedMiles", debit))
            })
            .await;

        if let Err(err) = debited {
            error!(address = %address, miles, tx_hash = %tx_hash, error = %err, "miles not debited after redeem call");
            return Err(ArcadeError::Rewards(RewardsError::DebitFailed {
                tx_hash,
                reason: err.to_string(),
            }));
        }

        Ok(RedeemReceipt { address, miles, tx_hash })
    }

    async fn balance(&self, address: &str) -> ArcadeResult<u64> {
        let doc = self.store.get(address).await?;
        Ok(doc
            .and_then(|d| get_i64(&d, "miles"))
            .map(|m| m.max(0) as u64)
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::{NoticeLevel, NoticeLog};
    use crate::store::MemoryProfileStore;
    use crate::wallet::test_support::FakeWallet;
    use crate::wallet::WalletError;

    const ADDRESS: &str = "0x00000000000000000000000000000000000000aa";

    async fn setup(miles: i64) -> (Redeemer, Arc<MemoryProfileStore>, Arc<NoticeLog>) {
        let store = Arc::new(MemoryProfileStore::new());
        store
            .set_merge(ADDRESS, &PartialUpdate::new().increment("miles", miles))
            .await
            .unwrap();
        let notices = Arc::new(NoticeLog::new());
        let redeemer = Redeemer::new(store.clone(), WalletConfig::default(), notices.clone());
        (redeemer, store, notices)
    }

    #[tokio::test]
    async fn test_redeem_debits_after_contract_call() {
        let (redeemer, store, notices) = setup(1_000).await;
        let wallet = FakeWallet::connected(ADDRESS, 0);

        let receipt = redeemer.redeem(&wallet, ADDRESS, 250).await.unwrap();
        assert_eq!(receipt.tx_hash, "0xtx");

        let calls = wallet.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].function, "redeem");
        assert_eq!(calls[0].args, vec!["250".to_string()]);

        let doc = store.get(ADDRESS).await.unwrap().unwrap();
        assert_eq!(get_i64(&doc, "miles"), Some(750));
        assert_eq!(get_i64(&doc, "redeemedMiles"), Some(250));
        assert_eq!(notices.notices()[0].level, NoticeLevel::Success);
    }

    #[tokio::test]
    async fn test_preconditions_block_contract_call() {
        let (redeemer, _, _) = setup(100).await;

        let wallet = FakeWallet::connected(ADDRESS, 0);
        let err = redeemer.redeem(&wallet, ADDRESS, 500).await.unwrap_err();
        assert!(matches!(err, ArcadeError::Precondition(PreconditionError::InsufficientMiles { .. })));

        let err = redeemer.redeem(&wallet, ADDRESS, 0).await.unwrap_err();
        assert!(matches!(err, ArcadeError::Precondition(PreconditionError::ZeroAmount)));

        let other = FakeWallet::connected("0x00000000000000000000000000000000000000bb", 0);
        let err = redeemer.redeem(&other, ADDRESS, 50).await.unwrap_err();
        assert!(matches!(err, ArcadeError::Precondition(PreconditionError::WalletMismatch { .. })));

        assert!(wallet.calls().is_empty());
        assert!(other.calls().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_call_keeps_miles() {
        let (redeemer, store, notices) = setup(100).await;
        let wallet = FakeWallet {
            call_result: Err(WalletError::Rejected("user denied".to_string())),
            ..FakeWallet::connected(ADDRESS, 0)
        };

        let err = redeemer.redeem(&wallet, ADDRESS, 50).await.unwrap_err();
        assert!(matches!(err, ArcadeError::Wallet(WalletError::Rejected(_))));

        let doc = store.get(ADDRESS).await.unwrap().unwrap();
        assert_eq!(get_i64(&doc, "miles"), Some(100));
        assert_eq!(notices.notices()[0].level, NoticeLevel::Error);
    }

    #[tokio::test]
    async fn test_debit_failure_is_reported_not_undone() {
        let (redeemer, store, _) = setup(100).await;
        let wallet = FakeWallet::connected(ADDRESS, 0);

        store.set_offline(true);
        let err = redeemer.redeem(&wallet, ADDRESS, 50).await.unwrap_err();

        assert!(matches!(err, ArcadeError::Rewards(RewardsError::DebitFailed { .. })));
        assert_eq!(wallet.calls().len(), 1);
    }
}
