use core::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Membership levels, ordered from lowest to highest.
#[derive(sqlx::Type, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[sqlx(type_name = "membership_tier", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MembershipTier {
    Free,
    Gold,
    Diamond,
    Platinum,
}

impl MembershipTier {
    pub const ALL: [MembershipTier; 4] = [
        MembershipTier::Free,
        MembershipTier::Gold,
        MembershipTier::Diamond,
        MembershipTier::Platinum,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MembershipTier::Free => "free",
            MembershipTier::Gold => "gold",
            MembershipTier::Diamond => "diamond",
            MembershipTier::Platinum => "platinum",
        }
    }

    /// Fixed price in minor currency units (cents).
    pub fn price_minor_units(&self) -> i64 {
        match self {
            MembershipTier::Free => 0,
            MembershipTier::Gold => 10_000,
            MembershipTier::Diamond => 50_000,
            MembershipTier::Platinum => 80_000,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            MembershipTier::Free => "Free",
            MembershipTier::Gold => "Gold",
            MembershipTier::Diamond => "Diamond",
            MembershipTier::Platinum => "Platinum",
        }
    }

    pub fn is_paid(&self) -> bool {
        self.price_minor_units() > 0
    }

    /// Paid tiers may run filtered inventory searches.
    pub fn allows_filtered_search(&self) -> bool {
        !matches!(self, MembershipTier::Free)
    }
}

impl fmt::Display for MembershipTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown membership tier: {0}")]
pub struct UnknownTier(pub String);

impl FromStr for MembershipTier {
    type Err = UnknownTier;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "free" => Ok(MembershipTier::Free),
            "gold" => Ok(MembershipTier::Gold),
            "diamond" => Ok(MembershipTier::Diamond),
            "platinum" => Ok(MembershipTier::Platinum),
            _ => Err(UnknownTier(raw.to_string())),
        }
    }
}

#[derive(sqlx::Type, Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[sqlx(type_name = "membership_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MembershipStatus {
    Active,
    Pending,
    Cancelled,
}

impl MembershipStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MembershipStatus::Active => "active",
            MembershipStatus::Pending => "pending",
            MembershipStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for MembershipStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
