use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A subgraph source. Each blockchain publishes its own treasury subgraph.
///
/// Variant order is the order sources are flattened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Blockchain {
    Arbitrum,
    Ethereum,
    Fantom,
    Polygon,
    Base,
}

impl Blockchain {
    pub const ALL: [Blockchain; 5] = [
        Blockchain::Arbitrum,
        Blockchain::Ethereum,
        Blockchain::Fantom,
        Blockchain::Polygon,
        Blockchain::Base,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Blockchain::Arbitrum => "Arbitrum",
            Blockchain::Ethereum => "Ethereum",
            Blockchain::Fantom => "Fantom",
            Blockchain::Polygon => "Polygon",
            Blockchain::Base => "Base",
        }
    }
}

impl fmt::Display for Blockchain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Blockchain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Blockchain::ALL
            .into_iter()
            .find(|chain| chain.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown blockchain {:?}", s))
    }
}
