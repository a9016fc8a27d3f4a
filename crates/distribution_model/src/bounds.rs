//! Proposal slider bounds derived from the consensus

use crate::types::{MarketConsensus, ProposedState};

/// Smallest sigma the UI ever offers
pub const MIN_SIGMA_FLOOR: f64 = 0.1;

/// Allowed ranges for a proposal around the current consensus
///
/// - `mu` in `[mean - 2σ, mean + 2σ]`
/// - `sigma` in `[max(0.1, σ/2), 2σ]`; σ/2 is enforced by the contract
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProposalBounds {
    pub mu_min: f64,
    pub mu_max: f64,
    pub sigma_min: f64,
    pub sigma_max: f64,
}

impl ProposalBounds {
    pub fn for_consensus(consensus: &MarketConsensus) -> Self {
        Self {
            mu_min: consensus.mean - 2.0 * consensus.sigma,
            mu_max: consensus.mean + 2.0 * consensus.sigma,
            sigma_min: MIN_SIGMA_FLOOR.max(consensus.sigma / 2.0),
            sigma_max: consensus.sigma * 2.0,
        }
    }

    pub fn contains(&self, proposal: &ProposedState) -> bool {
        (self.mu_min..=self.mu_max).contains(&proposal.mu)
            && (self.sigma_min..=self.sigma_max).contains(&proposal.sigma)
    }

    pub fn clamp(&self, proposal: &ProposedState) -> ProposedState {
        ProposedState {
            mu: proposal.mu.clamp(self.mu_min.min(self.mu_max), self.mu_max.max(self.mu_min)),
            sigma: proposal.sigma.clamp(self.sigma_min, self.sigma_max.max(self.sigma_min)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_around_consensus() {
        let consensus = MarketConsensus { mean: 100.0, sigma: 10.0, description: String::new() };
        let bounds = ProposalBounds::for_consensus(&consensus);
        assert_eq!(bounds, ProposalBounds { mu_min: 80.0, mu_max: 120.0, sigma_min: 5.0, sigma_max: 20.0 });
        assert!(bounds.contains(&ProposedState::new(105.0, 12.0)));
        assert!(!bounds.contains(&ProposedState::new(121.0, 12.0)));
        assert_eq!(bounds.clamp(&ProposedState::new(150.0, 1.0)), ProposedState::new(120.0, 5.0));
    }

    #[test]
    fn test_sigma_floor() {
        let consensus = MarketConsensus { mean: 1.0, sigma: 0.1, description: String::new() };
        let bounds = ProposalBounds::for_consensus(&consensus);
        assert_eq!(bounds.sigma_min, MIN_SIGMA_FLOOR);
        // floor wins over a narrower max
        assert_eq!(bounds.clamp(&ProposedState::new(1.0, 0.5)).sigma, 0.2_f64.max(MIN_SIGMA_FLOOR));
    }
}
