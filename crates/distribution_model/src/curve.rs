//! Normal density curves for the consensus vs. proposal chart

use core::f64::consts::PI;

use crate::types::{MarketConsensus, ProposedState};

/// Normal probability density at `x`
///
/// `sigma == 0` is the degenerate distribution: `+inf` at the mean,
/// `0` everywhere else.
pub fn pdf(x: f64, mu: f64, sigma: f64) -> f64 {
    if sigma == 0.0 {
        return if x == mu { f64::INFINITY } else { 0.0 };
    }
    let exponent = -((x - mu) * (x - mu)) / (2.0 * sigma * sigma);
    (1.0 / (sigma * (2.0 * PI).sqrt())) * exponent.exp()
}

/// One chart sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurvePoint {
    pub x: f64,
    pub pdf_consensus: f64,
    pub pdf_proposed: f64,
}

/// Lazily evaluated curve over `[mean - 4σmax, mean + 4σmax]`
///
/// `steps + 1` evenly spaced points. Cloning restarts from the first
/// point; the curve holds no state beyond its inputs and a cursor.
#[derive(Debug, Clone)]
pub struct Curve {
    consensus_mean: f64,
    consensus_sigma: f64,
    proposed_mu: f64,
    proposed_sigma: f64,
    min_x: f64,
    step: f64,
    steps: usize,
    next: usize,
}

impl Curve {
    /// Domain bounds `(min_x, max_x)`
    pub fn domain(&self) -> (f64, f64) {
        (self.min_x, self.min_x + self.step * self.steps as f64)
    }

    /// A fresh iterator over the same points
    pub fn restart(&self) -> Curve {
        Curve { next: 0, ..self.clone() }
    }

    fn point(&self, i: usize) -> CurvePoint {
        let x = self.min_x + i as f64 * self.step;
        CurvePoint {
            x,
            pdf_consensus: pdf(x, self.consensus_mean, self.consensus_sigma),
            pdf_proposed: pdf(x, self.proposed_mu, self.proposed_sigma),
        }
    }
}

impl Iterator for Curve {
    type Item = CurvePoint;

    fn next(&mut self) -> Option<CurvePoint> {
        if self.next > self.steps {
            return None;
        }
        let point = self.point(self.next);
        self.next += 1;
        Some(point)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.steps + 1).saturating_sub(self.next);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Curve {}

/// Sample both densities over the shared chart domain
///
/// The domain is centred on the consensus mean and spans four of the wider
/// sigma on each side. `steps == 0` yields the single left edge point.
pub fn generate_curve(consensus: &MarketConsensus, proposed: &ProposedState, steps: usize) -> Curve {
    let max_sigma = consensus.sigma.max(proposed.sigma);
    let min_x = consensus.mean - 4.0 * max_sigma;
    let max_x = consensus.mean + 4.0 * max_sigma;
    let step = if steps == 0 { 0.0 } else { (max_x - min_x) / steps as f64 };

    Curve {
        consensus_mean: consensus.mean,
        consensus_sigma: consensus.sigma,
        proposed_mu: proposed.mu,
        proposed_sigma: proposed.sigma,
        min_x,
        step,
        steps,
        next: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn consensus(mean: f64, sigma: f64) -> MarketConsensus {
        MarketConsensus { mean, sigma, description: String::new() }
    }

    #[test]
    fn test_pdf_degenerate_sigma() {
        assert_eq!(pdf(5.0, 5.0, 0.0), f64::INFINITY);
        assert_eq!(pdf(5.1, 5.0, 0.0), 0.0);
        assert_eq!(pdf(-3.0, 5.0, 0.0), 0.0);
    }

    #[test]
    fn test_pdf_peak_value() {
        let sigma = 10.0;
        let expected = 1.0 / (sigma * (2.0 * PI).sqrt());
        assert_eq!(pdf(100.0, 100.0, sigma), expected);
    }

    #[test]
    fn test_curve_domain_and_length() {
        let curve = generate_curve(&consensus(100.0, 10.0), &ProposedState::new(105.0, 12.0), 100);
        assert_eq!(curve.len(), 101);
        assert_eq!(curve.domain(), (52.0, 148.0));

        let points: Vec<_> = curve.clone().collect();
        assert_eq!(points.len(), 101);
        assert_eq!(points[0].x, 52.0);
        assert!((points[100].x - 148.0).abs() < 1e-9);
        // midpoint sits on the consensus mean
        assert!((points[50].x - 100.0).abs() < 1e-9);
        assert!(points.iter().all(|p| p.pdf_consensus.is_finite() && p.pdf_proposed.is_finite()));
    }

    #[test]
    fn test_curve_is_restartable() {
        let mut curve = generate_curve(&consensus(0.0, 1.0), &ProposedState::new(0.5, 1.0), 10);
        let first: Vec<_> = curve.restart().collect();
        curve.next();
        curve.next();
        let again: Vec<_> = curve.restart().collect();
        assert_eq!(first, again);
        assert_eq!(curve.len(), 9);
    }

    #[test]
    fn test_curve_zero_steps() {
        let points: Vec<_> = generate_curve(&consensus(10.0, 2.0), &ProposedState::new(10.0, 1.0), 0).collect();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].x, 2.0);
    }

    proptest! {
        #[test]
        fn prop_pdf_peak_matches_normalisation(mu in -1e6f64..1e6, sigma in 1e-3f64..1e6) {
            let expected = 1.0 / (sigma * (2.0 * PI).sqrt());
            prop_assert_eq!(pdf(mu, mu, sigma), expected);
        }

        #[test]
        fn prop_pdf_symmetric(mu in -1e3f64..1e3, sigma in 1e-2f64..1e3, d in 0f64..1e3) {
            let left = pdf(mu - d, mu, sigma);
            let right = pdf(mu + d, mu, sigma);
            prop_assert!((left - right).abs() <= 1e-6 * left.max(right) + 1e-300);
        }
    }
}
