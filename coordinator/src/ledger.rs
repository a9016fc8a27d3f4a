//! Allowance gate and position leg book

use distribution_model::{Amount, CloseQuote, CollateralAsset, PositionLeg};
use log::debug;

use crate::error::CoordinatorError;
use crate::read::RemoteRead;

/// Spend approval tracking for token-denominated collateral
///
/// Native collateral travels with the call value and always passes.
#[derive(Debug, Clone, PartialEq)]
pub struct AllowanceGate {
    asset: CollateralAsset,
    allowance: RemoteRead<Amount>,
}

impl AllowanceGate {
    pub fn new(asset: CollateralAsset) -> Self {
        let allowance = match asset {
            CollateralAsset::Native => RemoteRead::Ready(Amount::default()),
            CollateralAsset::Token(_) => RemoteRead::Pending,
        };
        Self { asset, allowance }
    }

    pub fn asset(&self) -> CollateralAsset {
        self.asset
    }

    pub fn allowance(&self) -> &RemoteRead<Amount> {
        &self.allowance
    }

    /// Store a fresh allowance read (ignored for native collateral)
    pub fn update(&mut self, allowance: RemoteRead<Amount>) {
        if !self.asset.is_native() {
            self.allowance = allowance;
        }
    }

    /// `allowance >= required`, for gating the UI
    pub fn allowance_sufficient(&self, required: &Amount) -> bool {
        match self.asset {
            CollateralAsset::Native => true,
            CollateralAsset::Token(_) => matches!(&self.allowance, RemoteRead::Ready(approved) if approved >= required),
        }
    }

    /// Write-boundary check
    pub fn ensure(&self, required: &Amount) -> Result<(), CoordinatorError> {
        if self.asset.is_native() {
            return Ok(());
        }
        let approved = self.allowance.require("allowance")?;
        if approved < required {
            return Err(CoordinatorError::InsufficientAllowance {
                approved: approved.clone(),
                required: required.clone(),
            });
        }
        Ok(())
    }
}

/// The user's legs plus the close quote for the selected one
///
/// Legs are always replaced wholesale from a count-then-index fetch. Each
/// selection bumps a generation so late close quotes for an earlier
/// selection are dropped.
#[derive(Debug, Clone, Default)]
pub struct PositionBook {
    legs: RemoteRead<Vec<PositionLeg>>,
    selection_generation: u64,
    selected: Option<u64>,
    close_quote: Option<CloseQuote>,
}

impl PositionBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn legs(&self) -> &RemoteRead<Vec<PositionLeg>> {
        &self.legs
    }

    pub fn replace_legs(&mut self, legs: RemoteRead<Vec<PositionLeg>>) {
        self.legs = legs;
    }

    pub fn leg(&self, index: u64) -> Option<&PositionLeg> {
        self.legs.ready().and_then(|legs| legs.iter().find(|leg| leg.index == index))
    }

    pub fn selected(&self) -> Option<u64> {
        self.selected
    }

    /// Select a leg, invalidating any close quote; returns the selection generation
    pub fn select(&mut self, index: u64) -> u64 {
        self.selection_generation += 1;
        self.selected = Some(index);
        self.close_quote = None;
        self.selection_generation
    }

    pub fn clear_selection(&mut self) {
        self.selection_generation += 1;
        self.selected = None;
        self.close_quote = None;
    }

    pub fn is_current(&self, generation: u64) -> bool {
        generation == self.selection_generation
    }

    /// Apply a close quote if `generation` is still the latest selection
    pub fn apply_close_quote(&mut self, generation: u64, quote: CloseQuote) -> bool {
        if generation != self.selection_generation {
            debug!("close quote gen {} superseded by gen {}", generation, self.selection_generation);
            return false;
        }
        self.close_quote = Some(quote);
        true
    }

    /// Close quote for `index` if it is the current selection
    pub fn close_quote_for(&self, index: u64) -> Option<&CloseQuote> {
        match self.selected {
            Some(selected) if selected == index => self.close_quote.as_ref(),
            _ => None,
        }
    }

    /// `(selected leg, quote)` if a quote is retained
    pub fn close_quote(&self) -> Option<(u64, &CloseQuote)> {
        match (self.selected, &self.close_quote) {
            (Some(index), Some(quote)) => Some((index, quote)),
            _ => None,
        }
    }

    pub fn invalidate_close_quote(&mut self) {
        self.selection_generation += 1;
        self.close_quote = None;
    }
}
