//! Subscription tier types

use serde::{Deserialize, Serialize};

use crate::{DogLimit, EntitlementLimits, Feature};

/// Subscription tier levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Free tier - one dog, no messaging
    Free,
    /// Standard tier - three dogs, messaging and matching
    Standard,
    /// Premium tier - unlimited dogs, analytics
    Premium,
}

const FREE_FEATURES: &[Feature] = &[
    Feature::DogProfiles,
    Feature::BreedSearch,
    Feature::BreedingCalendar,
];

const STANDARD_FEATURES: &[Feature] = &[
    Feature::DogProfiles,
    Feature::BreedSearch,
    Feature::BreedingCalendar,
    Feature::Messaging,
    Feature::CompatibilityMatching,
    Feature::HealthRecords,
];

const PREMIUM_FEATURES: &[Feature] = &[
    Feature::DogProfiles,
    Feature::BreedSearch,
    Feature::BreedingCalendar,
    Feature::Messaging,
    Feature::CompatibilityMatching,
    Feature::HealthRecords,
    Feature::Analytics,
    Feature::PriorityListing,
    Feature::VerifiedBadge,
];

static FREE_LIMITS: EntitlementLimits = EntitlementLimits {
    max_dogs: DogLimit::Limited(1),
    can_message: false,
    can_use_compatibility: false,
    features: FREE_FEATURES,
};

static STANDARD_LIMITS: EntitlementLimits = EntitlementLimits {
    max_dogs: DogLimit::Limited(3),
    can_message: true,
    can_use_compatibility: true,
    features: STANDARD_FEATURES,
};

static PREMIUM_LIMITS: EntitlementLimits = EntitlementLimits {
    max_dogs: DogLimit::Unlimited,
    can_message: true,
    can_use_compatibility: true,
    features: PREMIUM_FEATURES,
};

impl Tier {
    /// All tiers, lowest first
    pub const ALL: [Tier; 3] = [Tier::Free, Tier::Standard, Tier::Premium];

    /// Capability table for this tier.
    ///
    /// This table is shared with the billing-event processor; both sides must
    /// agree on it or entitlements drift.
    pub fn limits(&self) -> &'static EntitlementLimits {
        match self {
            Self::Free => &FREE_LIMITS,
            Self::Standard => &STANDARD_LIMITS,
            Self::Premium => &PREMIUM_LIMITS,
        }
    }

    /// Get features available for this tier
    pub fn features(&self) -> &'static [Feature] {
        self.limits().features
    }

    /// Human-readable label
    pub const fn display_name(&self) -> &'static str {
        match self {
            Self::Free => "Free",
            Self::Standard => "Standard",
            Self::Premium => "Premium",
        }
    }

    /// Wire name
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Standard => "standard",
            Self::Premium => "premium",
        }
    }

    /// Parse a tier, mapping anything unrecognised to [`Tier::Free`].
    ///
    /// Stored documents are not trusted to carry a valid tier; an unknown
    /// value must never grant more than the free table.
    pub fn from_str_lossy(s: &str) -> Self {
        s.trim().parse().unwrap_or(Self::Free)
    }
}

impl Default for Tier {
    fn default() -> Self {
        Self::Free
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Tier {
    type Err = TierParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "free" => Ok(Self::Free),
            "standard" => Ok(Self::Standard),
            "premium" => Ok(Self::Premium),
            _ => Err(TierParseError(s.to_string())),
        }
    }
}

/// Error parsing a tier string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierParseError(pub String);

impl std::fmt::Display for TierParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid tier: {}", self.0)
    }
}

impl std::error::Error for TierParseError {}
