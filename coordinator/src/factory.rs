//! Market factory boundary: list deployed markets and create new ones

use std::sync::Arc;

use distribution_model::{decode_hex, to_fixed, Address, Fixed18, TxHash};
use futures::future::BoxFuture;
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::chain::ReceiptStatus;
use crate::error::{ChainError, CoordinatorError, Result};
use crate::read::RemoteRead;
use crate::tracker::{TxAction, TxTracker};

/// Factory contract view
pub trait MarketFactory: Send + Sync {
    fn deployed_markets(&self) -> BoxFuture<'_, std::result::Result<Vec<Address>, ChainError>>;

    fn create_market(&self, params: EncodedMarketParams) -> BoxFuture<'_, std::result::Result<TxHash, ChainError>>;

    fn wait_for_creation(&self, hash: TxHash) -> BoxFuture<'_, std::result::Result<ReceiptStatus, ChainError>>;
}

/// Market creation request as entered by an operator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketParams {
    pub initial_mean: f64,
    pub initial_sigma: f64,
    /// L2 norm every position is scaled to
    pub k: f64,
    /// Backing constant
    pub b: f64,
    /// 32-byte oracle feed id, hex with optional `0x`
    pub price_feed_id: String,
    /// Unix seconds
    pub expiry: u64,
    /// Zero address for native collateral
    pub collateral: Address,
    pub description: String,
    pub lp_name: String,
    pub lp_symbol: String,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub whitelist: Vec<Address>,
}

/// `createMarket` arguments in contract units
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedMarketParams {
    pub initial_mean: Fixed18,
    pub initial_sigma: Fixed18,
    pub k: Fixed18,
    pub b: Fixed18,
    pub price_feed_id: [u8; 32],
    pub expiry: u64,
    pub collateral: Address,
    pub description: String,
    pub lp_name: String,
    pub lp_symbol: String,
    pub private: bool,
    pub whitelist: Vec<Address>,
}

impl MarketParams {
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| -> Result<()> { Err(CoordinatorError::InvalidInput(msg)) };

        for (name, value) in [
            ("initial mean", self.initial_mean),
            ("initial sigma", self.initial_sigma),
            ("k", self.k),
            ("b", self.b),
        ] {
            if !value.is_finite() {
                return invalid(format!("{} must be finite", name));
            }
        }
        if self.initial_sigma <= 0.0 {
            return invalid("initial sigma must be positive".into());
        }
        if self.k <= 0.0 || self.b <= 0.0 {
            return invalid("k and b must be positive".into());
        }
        if self.expiry == 0 {
            return invalid("expiry must be set".into());
        }
        if parse_feed_id(&self.price_feed_id).is_none() {
            return invalid(format!("price feed id {:?} is not 32 bytes of hex", self.price_feed_id));
        }
        if self.description.trim().is_empty() {
            return invalid("description is empty".into());
        }
        if self.lp_name.trim().is_empty() || self.lp_symbol.trim().is_empty() {
            return invalid("LP token name and symbol are required".into());
        }
        Ok(())
    }

    /// Validate, then convert every number to contract units
    ///
    /// The whitelist is only sent for private markets.
    pub fn encode(&self) -> Result<EncodedMarketParams> {
        self.validate()?;
        let price_feed_id = parse_feed_id(&self.price_feed_id)
            .ok_or_else(|| CoordinatorError::InvalidInput("bad price feed id".into()))?;

        Ok(EncodedMarketParams {
            initial_mean: to_fixed(self.initial_mean)?,
            initial_sigma: to_fixed(self.initial_sigma)?,
            k: to_fixed(self.k)?,
            b: to_fixed(self.b)?,
            price_feed_id,
            expiry: self.expiry,
            collateral: self.collateral,
            description: self.description.clone(),
            lp_name: self.lp_name.clone(),
            lp_symbol: self.lp_symbol.clone(),
            private: self.private,
            whitelist: if self.private { self.whitelist.clone() } else { Vec::new() },
        })
    }
}

/// Parse a bytes32 feed id
pub fn parse_feed_id(id: &str) -> Option<[u8; 32]> {
    decode_hex::<32>(id.trim())
}

/// Block explorer link for a transaction
pub fn explorer_tx_url(base: &str, hash: &TxHash) -> String {
    format!("{}/tx/{}", base.trim_end_matches('/'), hash)
}

/// Cached market list plus the create-market tracker
pub struct MarketDirectory {
    factory: Arc<dyn MarketFactory>,
    markets: parking_lot::Mutex<RemoteRead<Vec<Address>>>,
    tracker: TxTracker,
}

impl MarketDirectory {
    pub fn new(factory: Arc<dyn MarketFactory>) -> Self {
        Self {
            factory,
            markets: parking_lot::Mutex::new(RemoteRead::Pending),
            tracker: TxTracker::new(TxAction::CreateMarket),
        }
    }

    pub fn markets(&self) -> RemoteRead<Vec<Address>> {
        self.markets.lock().clone()
    }

    pub fn tracker(&self) -> &TxTracker {
        &self.tracker
    }

    pub async fn refresh(&self) -> RemoteRead<Vec<Address>> {
        let read: RemoteRead<Vec<Address>> = self.factory.deployed_markets().await.into();
        if let RemoteRead::Failed(reason) = &read {
            warn!("market list unavailable: {}", reason);
        }
        *self.markets.lock() = read.clone();
        read
    }

    /// Create a market and refresh the list once it is confirmed
    pub async fn create_market(&self, params: &MarketParams) -> Result<TxHash> {
        let encoded = match self.tracker.ensure_available().and_then(|_| params.encode()) {
            Ok(encoded) => encoded,
            Err(err) => {
                self.tracker.reject(&err);
                return Err(err);
            }
        };

        info!("creating market {:?}", encoded.description);
        let factory = &self.factory;
        let hash = self
            .tracker
            .run(factory.create_market(encoded), |h| factory.wait_for_creation(h))
            .await?;

        self.refresh().await;
        Ok(hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> MarketParams {
        MarketParams {
            initial_mean: 100.0,
            initial_sigma: 10.0,
            k: 1.0,
            b: 50.0,
            price_feed_id: format!("0x{}", "ab".repeat(32)),
            expiry: 1_900_000_000,
            collateral: Address::ZERO,
            description: "BTC close".into(),
            lp_name: "BTC LP".into(),
            lp_symbol: "BLP".into(),
            private: false,
            whitelist: vec![Address([1u8; 20])],
        }
    }

    #[test]
    fn test_encode_scales_to_fixed() {
        let encoded = params().encode().unwrap();
        assert_eq!(encoded.initial_mean.to_string(), "100");
        assert_eq!(encoded.initial_mean.raw().to_string(), "100000000000000000000");
        assert_eq!(encoded.price_feed_id, [0xab; 32]);
        // public market drops the whitelist
        assert!(encoded.whitelist.is_empty());
    }

    #[test]
    fn test_private_market_keeps_whitelist() {
        let mut p = params();
        p.private = true;
        assert_eq!(p.encode().unwrap().whitelist.len(), 1);
    }

    #[test]
    fn test_validation_rejects_bad_params() {
        let mut p = params();
        p.initial_sigma = 0.0;
        assert!(matches!(p.validate(), Err(CoordinatorError::InvalidInput(_))));

        let mut p = params();
        p.price_feed_id = "0x1234".into();
        assert!(p.validate().is_err());

        let mut p = params();
        p.k = f64::NAN;
        assert!(p.validate().is_err());

        let mut p = params();
        p.expiry = 0;
        assert!(p.validate().is_err());
    }

    #[test]
    fn test_explorer_url() {
        let hash = TxHash([0x11; 32]);
        let url = explorer_tx_url("https://explorer.test/", &hash);
        assert_eq!(url, format!("https://explorer.test/tx/0x{}", "11".repeat(32)));
    }
}
