//! Movement categories tracked per ledger day.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// The six ways milk volume changes on a given day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementCategory {
    Produced,
    Collected,
    Sold,
    ProductionUsed,
    CalfConsumed,
    Waste,
}

impl MovementCategory {
    pub const ALL: [MovementCategory; 6] = [
        Self::Produced,
        Self::Collected,
        Self::Sold,
        Self::ProductionUsed,
        Self::CalfConsumed,
        Self::Waste,
    ];

    /// Get string representation for database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Produced => "produced",
            Self::Collected => "collected",
            Self::Sold => "sold",
            Self::ProductionUsed => "production_used",
            Self::CalfConsumed => "calf_consumed",
            Self::Waste => "waste",
        }
    }

    /// Inflows add to the closing balance, everything else draws it down.
    pub fn is_inflow(&self) -> bool {
        matches!(self, Self::Produced | Self::Collected)
    }
}

impl FromStr for MovementCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "produced" => Ok(Self::Produced),
            "collected" => Ok(Self::Collected),
            "sold" => Ok(Self::Sold),
            "production_used" => Ok(Self::ProductionUsed),
            "calf_consumed" => Ok(Self::CalfConsumed),
            "waste" => Ok(Self::Waste),
            other => Err(format!("unknown movement category '{}'", other)),
        }
    }
}

impl std::fmt::Display for MovementCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_names_parse_back() {
        for category in MovementCategory::ALL {
            assert_eq!(category.as_str().parse::<MovementCategory>(), Ok(category));
        }
        assert!("spilled".parse::<MovementCategory>().is_err());
    }

    #[test]
    fn serde_uses_database_names() {
        let json = serde_json::to_string(&MovementCategory::CalfConsumed).unwrap();
        assert_eq!(json, "\"calf_consumed\"");
        let parsed: MovementCategory = serde_json::from_str("\"production_used\"").unwrap();
        assert_eq!(parsed, MovementCategory::ProductionUsed);
    }

    #[test]
    fn only_produced_and_collected_are_inflows() {
        let inflows: Vec<_> = MovementCategory::ALL
            .into_iter()
            .filter(MovementCategory::is_inflow)
            .collect();
        assert_eq!(
            inflows,
            vec![MovementCategory::Produced, MovementCategory::Collected]
        );
    }
}
