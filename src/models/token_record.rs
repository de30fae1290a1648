use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{Blockchain, SourceRecord};
use crate::utils::{f64_from_any, u64_from_any};

/// Treasury asset category assigned by the subgraph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenCategory {
    Stable,
    Volatile,
    #[serde(rename = "Protocol-Owned Liquidity", alias = "Protocol-Owned-Liquidity")]
    ProtocolOwnedLiquidity,
    /// Categories this pipeline does not know. Never counted as treasury value.
    #[serde(other)]
    Other,
}

impl TokenCategory {
    /// Whether holdings of this category count towards treasury market value.
    pub fn is_treasury_asset(self) -> bool {
        matches!(
            self,
            TokenCategory::Stable | TokenCategory::Volatile | TokenCategory::ProtocolOwnedLiquidity
        )
    }
}

/// Balance-valued treasury holding for one blockchain on one day.
///
/// `value` may be negative (debt positions). `value_excluding_ohm` strips the
/// protocol's own token out of liquidity positions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRecord {
    pub id: String,
    pub date: NaiveDate,
    #[serde(deserialize_with = "u64_from_any")]
    pub block: u64,
    #[serde(default, deserialize_with = "u64_from_any")]
    pub timestamp: u64,
    pub source: String,
    pub source_address: String,
    pub token: String,
    pub token_address: String,
    pub category: TokenCategory,
    pub is_liquid: bool,
    #[serde(default)]
    pub is_bluechip: bool,
    #[serde(default, deserialize_with = "f64_from_any")]
    pub balance: f64,
    #[serde(default, deserialize_with = "f64_from_any")]
    pub rate: f64,
    #[serde(default, deserialize_with = "f64_from_any")]
    pub multiplier: f64,
    #[serde(deserialize_with = "f64_from_any")]
    pub value: f64,
    #[serde(deserialize_with = "f64_from_any")]
    pub value_excluding_ohm: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blockchain: Option<Blockchain>,
}

impl SourceRecord for TokenRecord {
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
