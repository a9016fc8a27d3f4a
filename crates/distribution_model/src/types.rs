//! Market data model shared by the coordinator and its backends

use core::fmt;
use core::str::FromStr;

use num_bigint::BigUint;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::fixed::Fixed18;
use crate::ModelError;

/// Unsigned on-chain integer amount (wei, shares, allowance)
pub type Amount = BigUint;

/// 20-byte account / contract address
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address(pub [u8; 20]);

impl Address {
    pub const ZERO: Address = Address([0u8; 20]);

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }
}

impl From<[u8; 20]> for Address {
    fn from(bytes: [u8; 20]) -> Self {
        Address(bytes)
    }
}

impl FromStr for Address {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_hex::<20>(s)
            .map(Address)
            .ok_or_else(|| ModelError::InvalidAddress(s.to_string()))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_hex(f, &self.0)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_hex(f, &self.0)
    }
}

/// 32-byte transaction hash
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TxHash(pub [u8; 32]);

impl FromStr for TxHash {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_hex::<32>(s)
            .map(TxHash)
            .ok_or_else(|| ModelError::InvalidHash(s.to_string()))
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_hex(f, &self.0)
    }
}

impl fmt::Debug for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_hex(f, &self.0)
    }
}

macro_rules! impl_hex_serde {
    ($ty:ty) => {
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let text = String::deserialize(deserializer)?;
                text.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

impl_hex_serde!(Address);
impl_hex_serde!(TxHash);

/// Decode `0x`-prefixed (or bare) hex into exactly N bytes
pub fn decode_hex<const N: usize>(s: &str) -> Option<[u8; N]> {
    let s = s.trim();
    let digits = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
    if digits.len() != N * 2 || !digits.is_ascii() {
        return None;
    }

    let mut out = [0u8; N];
    for (i, byte) in out.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&digits[i * 2..i * 2 + 2], 16).ok()?;
    }
    Some(out)
}

fn write_hex(f: &mut fmt::Formatter<'_>, bytes: &[u8]) -> fmt::Result {
    f.write_str("0x")?;
    for b in bytes {
        write!(f, "{:02x}", b)?;
    }
    Ok(())
}

/// How collateral reaches the market contract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CollateralAsset {
    /// Sent as the call value of the transaction itself
    Native,
    /// ERC20-style token pulled by the market; needs a prior allowance
    Token(Address),
}

impl CollateralAsset {
    /// The market reports the zero address for native collateral
    pub fn from_token_address(token: Address) -> Self {
        if token.is_zero() {
            CollateralAsset::Native
        } else {
            CollateralAsset::Token(token)
        }
    }

    pub fn is_native(&self) -> bool {
        matches!(self, CollateralAsset::Native)
    }

    pub fn token_address(&self) -> Address {
        match self {
            CollateralAsset::Native => Address::ZERO,
            CollateralAsset::Token(token) => *token,
        }
    }
}

/// On-chain consensus distribution, decoded for display
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketConsensus {
    pub mean: f64,
    pub sigma: f64,
    pub description: String,
}

/// The user's draft distribution
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProposedState {
    pub mu: f64,
    pub sigma: f64,
}

impl ProposedState {
    pub fn new(mu: f64, sigma: f64) -> Self {
        Self { mu, sigma }
    }

    /// Draft seeded from the current consensus
    pub fn from_consensus(consensus: &MarketConsensus) -> Self {
        Self {
            mu: consensus.mean,
            sigma: consensus.sigma,
        }
    }

    /// Exact equality with the consensus; such a proposal needs no quote
    pub fn matches(&self, consensus: &MarketConsensus) -> bool {
        self.mu == consensus.mean && self.sigma == consensus.sigma
    }

    /// Finite mean and strictly positive finite sigma
    pub fn is_valid(&self) -> bool {
        self.mu.is_finite() && self.sigma.is_finite() && self.sigma > 0.0
    }
}

/// Collateral quote for one proposal
///
/// Both halves are set together or not at all; `None` means "not fetched"
/// or "invalidated", never "free".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Quote {
    collateral: Option<Amount>,
    arg_min_x: Option<Fixed18>,
}

impl Quote {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn resolved(collateral: Amount, arg_min_x: Fixed18) -> Self {
        Self {
            collateral: Some(collateral),
            arg_min_x: Some(arg_min_x),
        }
    }

    pub fn collateral(&self) -> Option<&Amount> {
        self.collateral.as_ref()
    }

    pub fn arg_min_x(&self) -> Option<&Fixed18> {
        self.arg_min_x.as_ref()
    }

    pub fn is_ready(&self) -> bool {
        self.collateral.is_some() && self.arg_min_x.is_some()
    }

    /// Both values, only when the quote is complete
    pub fn pair(&self) -> Option<(&Amount, &Fixed18)> {
        match (&self.collateral, &self.arg_min_x) {
            (Some(c), Some(a)) => Some((c, a)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_parse_and_display() {
        let addr: Address = "0x00000000000000000000000000000000000000Ab".parse().unwrap();
        assert_eq!(addr.0[19], 0xab);
        assert_eq!(addr.to_string(), "0x00000000000000000000000000000000000000ab");
        assert!("0x1234".parse::<Address>().is_err());
        assert!("0xzz00000000000000000000000000000000000000".parse::<Address>().is_err());
    }

    #[test]
    fn test_collateral_asset_from_zero_address() {
        assert_eq!(CollateralAsset::from_token_address(Address::ZERO), CollateralAsset::Native);
        let token = Address([7u8; 20]);
        assert_eq!(CollateralAsset::from_token_address(token), CollateralAsset::Token(token));
    }

    #[test]
    fn test_proposal_matches_consensus_exactly() {
        let consensus = MarketConsensus { mean: 100.0, sigma: 10.0, description: "BTC".into() };
        assert!(ProposedState::from_consensus(&consensus).matches(&consensus));
        assert!(!ProposedState::new(100.0, 10.000001).matches(&consensus));
    }

    #[test]
    fn test_quote_pair_requires_both_halves() {
        assert!(Quote::empty().pair().is_none());
        let quote = Quote::resolved(Amount::from(5u32), Fixed18::from_raw(3));
        assert!(quote.is_ready());
        assert_eq!(quote.pair().map(|(c, _)| c.clone()), Some(Amount::from(5u32)));
    }

    #[test]
    fn test_hash_serde_round_trip() {
        let hash = TxHash([0xab; 32]);
        let json = serde_json::to_string(&hash).unwrap();
        let back: TxHash = serde_json::from_str(&json).unwrap();
        assert_eq!(back, hash);
    }
}
