//! Native token supply classification.
//!
//! Each aggregate is the signed sum of supply balances whose type falls in
//! the aggregate's inclusion set. The subgraph already signs balances
//! (treasury holdings, liquidity, lending deployments are negative), so no
//! inversion happens here.

use std::collections::HashSet;

use crate::error::MetricsError;
use crate::models::{ChainValues, SupplyCategory, TokenSupply};

/// Native token (OHM) addresses across chains.
pub const DEFAULT_NATIVE_TOKENS: [&str; 3] = [
    "0x64aa3364f17a4d01c6f1751fd97c2bd3d7e7f1d5", // Ethereum
    "0xf0cb2dc0db5e6c66b9a70ac27b06b878da017028", // Arbitrum
    "0x060cb087a9730e13aa191f31a6d86bff8dfcdcc0", // Base
];

/// Index-wrapped token (gOHM) addresses across chains.
pub const DEFAULT_WRAPPED_TOKENS: [&str; 4] = [
    "0x0ab87046fbb341d058f17cbc4c1133f25a20a52f", // Ethereum
    "0x8d9ba570d6cb60c7e3e0f31343efe75ab8e65fb1", // Arbitrum
    "0xd8ca34fd379d9ca3c6ee3b3905678320f5b45195", // Polygon
    "0x91fa20244fb509e8289ca630e5db3e9166233fdc", // Fantom
];

pub const TOTAL_SUPPLY_TYPES: &[SupplyCategory] = &[SupplyCategory::TotalSupply];

pub const CIRCULATING_SUPPLY_TYPES: &[SupplyCategory] = &[
    SupplyCategory::TotalSupply,
    SupplyCategory::Treasury,
    SupplyCategory::ManualOffset,
    SupplyCategory::BondsPreminted,
    SupplyCategory::BondsVestingDeposits,
    SupplyCategory::BondsDeposits,
    SupplyCategory::BoostedLiquidityVault,
];

pub const FLOATING_SUPPLY_TYPES: &[SupplyCategory] = &[
    SupplyCategory::TotalSupply,
    SupplyCategory::Treasury,
    SupplyCategory::ManualOffset,
    SupplyCategory::BondsPreminted,
    SupplyCategory::BondsVestingDeposits,
    SupplyCategory::BondsDeposits,
    SupplyCategory::BoostedLiquidityVault,
    SupplyCategory::Liquidity,
];

pub const BACKED_SUPPLY_TYPES: &[SupplyCategory] = &[
    SupplyCategory::TotalSupply,
    SupplyCategory::Treasury,
    SupplyCategory::ManualOffset,
    SupplyCategory::BondsPreminted,
    SupplyCategory::BondsVestingDeposits,
    SupplyCategory::BondsDeposits,
    SupplyCategory::BoostedLiquidityVault,
    SupplyCategory::Liquidity,
    SupplyCategory::Lending,
];

/// Recognized token identities. Built once from configuration and shared read-only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenIdentities {
    native: HashSet<String>,
    wrapped: HashSet<String>,
}

impl Default for TokenIdentities {
    fn default() -> Self {
        Self::new(DEFAULT_NATIVE_TOKENS, DEFAULT_WRAPPED_TOKENS)
    }
}

impl TokenIdentities {
    pub fn new<N, W>(native: N, wrapped: W) -> Self
    where
        N: IntoIterator,
        N::Item: AsRef<str>,
        W: IntoIterator,
        W::Item: AsRef<str>,
    {
        Self {
            native: native
                .into_iter()
                .map(|address| address.as_ref().to_lowercase())
                .collect(),
            wrapped: wrapped
                .into_iter()
                .map(|address| address.as_ref().to_lowercase())
                .collect(),
        }
    }

    pub fn is_native(&self, address: &str) -> bool {
        self.native.contains(&address.to_lowercase())
    }

    pub fn is_wrapped(&self, address: &str) -> bool {
        self.wrapped.contains(&address.to_lowercase())
    }

    /// Factor converting a balance of `address` into native units, if recognized.
    pub fn multiplier(&self, address: &str, rebase_index: f64) -> Option<f64> {
        if self.is_native(address) {
            Some(1.0)
        } else if self.is_wrapped(address) {
            Some(rebase_index)
        } else {
            None
        }
    }
}

/// An aggregate value and its per-chain breakdown.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SupplyBreakdown {
    pub value: f64,
    pub components: ChainValues,
}

/// The four canonical supply aggregates for one day.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SupplyAggregates {
    pub total: SupplyBreakdown,
    pub circulating: SupplyBreakdown,
    pub floating: SupplyBreakdown,
    pub backed: SupplyBreakdown,
}

#[derive(Debug, Clone)]
pub struct SupplyClassifier {
    identities: TokenIdentities,
}

impl SupplyClassifier {
    pub fn new(identities: TokenIdentities) -> Self {
        Self { identities }
    }

    pub fn identities(&self) -> &TokenIdentities {
        &self.identities
    }

    /// Sum native-equivalent balances of records whose type is in `included_types`.
    ///
    /// Returns the balance and the records that contributed to it. A matching
    /// record for a token outside the recognized identities is an error.
    pub fn classify<'a>(
        &self,
        records: &'a [TokenSupply],
        included_types: &[SupplyCategory],
        rebase_index: f64,
    ) -> Result<(f64, Vec<&'a TokenSupply>), MetricsError> {
        let weighted = self.weighted_balances(records, included_types, rebase_index)?;

        let balance = weighted.iter().map(|(_, balance)| balance).sum();
        let matched = weighted.into_iter().map(|(record, _)| record).collect();

        Ok((balance, matched))
    }

    /// Like [`classify`](Self::classify) but broken down by blockchain.
    pub fn breakdown(
        &self,
        records: &[TokenSupply],
        included_types: &[SupplyCategory],
        rebase_index: f64,
    ) -> Result<SupplyBreakdown, MetricsError> {
        let mut breakdown = SupplyBreakdown::default();

        for (record, balance) in self.weighted_balances(records, included_types, rebase_index)? {
            breakdown.value += balance;
            if let Some(blockchain) = record.blockchain {
                *breakdown.components.entry(blockchain).or_insert(0.0) += balance;
            }
        }

        Ok(breakdown)
    }

    pub fn aggregates(
        &self,
        records: &[TokenSupply],
        rebase_index: f64,
    ) -> Result<SupplyAggregates, MetricsError> {
        Ok(SupplyAggregates {
            total: self.breakdown(records, TOTAL_SUPPLY_TYPES, rebase_index)?,
            circulating: self.breakdown(records, CIRCULATING_SUPPLY_TYPES, rebase_index)?,
            floating: self.breakdown(records, FLOATING_SUPPLY_TYPES, rebase_index)?,
            backed: self.breakdown(records, BACKED_SUPPLY_TYPES, rebase_index)?,
        })
    }

    fn weighted_balances<'a>(
        &self,
        records: &'a [TokenSupply],
        included_types: &[SupplyCategory],
        rebase_index: f64,
    ) -> Result<Vec<(&'a TokenSupply, f64)>, MetricsError> {
        let mut weighted = Vec::new();

        for record in records {
            let Some(category) = record.category() else {
                continue;
            };
            if !included_types.contains(&category) {
                continue;
            }

            let multiplier = self
                .identities
                .multiplier(&record.token_address, rebase_index)
                .ok_or_else(|| {
                    MetricsError::upstream(format!(
                        "supply record {} on {} references unrecognized token {} ({})",
                        record.id,
                        record.date,
                        record.token,
                        record.token_address
                    ))
                })?;

            weighted.push((record, record.supply_balance * multiplier));
        }

        Ok(weighted)
    }
}
