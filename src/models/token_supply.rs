use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{Blockchain, SourceRecord};
use crate::utils::{f64_from_any, u64_from_any};

/// Closed set of supply categories published by the treasury subgraphs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SupplyCategory {
    TotalSupply,
    Treasury,
    ManualOffset,
    BondsPreminted,
    BondsVestingDeposits,
    BondsVestingTokens,
    BondsDeposits,
    BoostedLiquidityVault,
    Liquidity,
    Lending,
}

impl SupplyCategory {
    pub const ALL: [SupplyCategory; 10] = [
        SupplyCategory::TotalSupply,
        SupplyCategory::Treasury,
        SupplyCategory::ManualOffset,
        SupplyCategory::BondsPreminted,
        SupplyCategory::BondsVestingDeposits,
        SupplyCategory::BondsVestingTokens,
        SupplyCategory::BondsDeposits,
        SupplyCategory::BoostedLiquidityVault,
        SupplyCategory::Liquidity,
        SupplyCategory::Lending,
    ];

    /// Label used by the subgraphs in the `type` field.
    pub fn label(self) -> &'static str {
        match self {
            SupplyCategory::TotalSupply => "Total Supply",
            SupplyCategory::Treasury => "Treasury",
            SupplyCategory::ManualOffset => "Manual Offset",
            SupplyCategory::BondsPreminted => "OHM Bonds (Pre-minted)",
            SupplyCategory::BondsVestingDeposits => "OHM Bonds (Vesting Deposits)",
            SupplyCategory::BondsVestingTokens => "OHM Bonds (Vesting Tokens)",
            SupplyCategory::BondsDeposits => "OHM Bonds (Burnable Deposits)",
            SupplyCategory::BoostedLiquidityVault => "Boosted Liquidity Vault",
            SupplyCategory::Liquidity => "Liquidity",
            SupplyCategory::Lending => "Lending",
        }
    }

    /// Short hyphenated name, also accepted on input.
    pub fn short_name(self) -> &'static str {
        match self {
            SupplyCategory::TotalSupply => "Total-Supply",
            SupplyCategory::Treasury => "Treasury",
            SupplyCategory::ManualOffset => "Manual-Offset",
            SupplyCategory::BondsPreminted => "Bonds-Preminted",
            SupplyCategory::BondsVestingDeposits => "Bonds-Vesting-Deposits",
            SupplyCategory::BondsVestingTokens => "Bonds-Vesting-Tokens",
            SupplyCategory::BondsDeposits => "Bonds-Deposits",
            SupplyCategory::BoostedLiquidityVault => "Boosted-Liquidity-Vault",
            SupplyCategory::Liquidity => "Liquidity",
            SupplyCategory::Lending => "Lending",
        }
    }

    /// Resolve a subgraph `type` value. Unknown values yield `None`.
    pub fn from_label(value: &str) -> Option<Self> {
        let value = value.trim();
        SupplyCategory::ALL
            .into_iter()
            .find(|category| category.label() == value || category.short_name() == value)
    }
}

/// A supply-affecting entry for one blockchain on one day.
///
/// `supply_balance` already carries the sign the subgraph assigns: holdings
/// that reduce circulating supply are negative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenSupply {
    pub id: String,
    pub date: NaiveDate,
    #[serde(deserialize_with = "u64_from_any")]
    pub block: u64,
    #[serde(default, deserialize_with = "u64_from_any")]
    pub timestamp: u64,
    pub token: String,
    pub token_address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_address: Option<String>,
    #[serde(rename = "type")]
    pub supply_type: String,
    #[serde(default, deserialize_with = "f64_from_any")]
    pub balance: f64,
    #[serde(deserialize_with = "f64_from_any")]
    pub supply_balance: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blockchain: Option<Blockchain>,
}

impl TokenSupply {
    pub fn category(&self) -> Option<SupplyCategory> {
        SupplyCategory::from_label(&self.supply_type)
    }
}

impl SourceRecord for TokenSupply {
    fn date(&self) -> NaiveDate {
        self.date
    }

    fn block(&self) -> u64 {
        self.block
    }

    fn blockchain(&self) -> Option<Blockchain> {
        self.blockchain
    }

    fn set_blockchain(&mut self, blockchain: Blockchain) {
        self.blockchain = Some(blockchain);
    }
}
