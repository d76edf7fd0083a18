//! Entitlement and feature types

use serde::{Deserialize, Serialize};

use crate::{Tier, WaggleError};

/// Feature identifier as used by UI collaborators
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureId(pub String);

impl FeatureId {
    /// Create a new feature ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Resolve to a known feature, if any
    pub fn known(&self) -> Option<Feature> {
        self.0.parse().ok()
    }
}

impl std::fmt::Display for FeatureId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for FeatureId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Known features in the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    /// Create and edit dog profiles
    DogProfiles,
    /// Breed lookup and autocomplete
    BreedSearch,
    /// Heat-cycle calendar
    BreedingCalendar,
    /// Owner-to-owner messaging
    Messaging,
    /// Compatibility matching between dogs
    CompatibilityMatching,
    /// Health and vaccination records
    HealthRecords,
    /// Profile analytics
    Analytics,
    /// Boosted placement in search results
    PriorityListing,
    /// Verified breeder badge
    VerifiedBadge,
}

impl Feature {
    /// All known features
    pub const ALL: [Feature; 9] = [
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

    /// Get the feature ID string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DogProfiles => "dog_profiles",
            Self::BreedSearch => "breed_search",
            Self::BreedingCalendar => "breeding_calendar",
            Self::Messaging => "messaging",
            Self::CompatibilityMatching => "compatibility_matching",
            Self::HealthRecords => "health_records",
            Self::Analytics => "analytics",
            Self::PriorityListing => "priority_listing",
            Self::VerifiedBadge => "verified_badge",
        }
    }

    /// Lowest tier whose table includes this feature
    pub fn min_tier(&self) -> Tier {
        Tier::ALL
            .into_iter()
            .find(|tier| tier.limits().has_feature(*self))
            .unwrap_or(Tier::Premium)
    }
}

impl std::fmt::Display for Feature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Feature {
    type Err = WaggleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|feature| feature.as_str() == s)
            .ok_or_else(|| WaggleError::UnknownFeature(s.to_string()))
    }
}

/// Maximum number of dog profiles a tier allows.
///
/// Stored in-band as an integer where `-1` means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum DogLimit {
    /// At most this many dogs
    Limited(u32),
    /// No cap
    Unlimited,
}

impl DogLimit {
    /// Wire value for unlimited
    pub const UNLIMITED_SENTINEL: i64 = -1;

    /// Whether one more dog fits given the current count
    pub fn allows(&self, current_dog_count: u32) -> bool {
        match self {
            Self::Unlimited => true,
            Self::Limited(max) => current_dog_count < *max,
        }
    }

    /// Slots left given the current count
    pub fn remaining(&self, current_dog_count: u32) -> DogSlots {
        match self {
            Self::Unlimited => DogSlots::Unlimited,
            Self::Limited(max) => DogSlots::Remaining(max.saturating_sub(current_dog_count)),
        }
    }
}

impl TryFrom<i64> for DogLimit {
    type Error = WaggleError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        if value == Self::UNLIMITED_SENTINEL {
            return Ok(Self::Unlimited);
        }
        u32::try_from(value)
            .map(Self::Limited)
            .map_err(|_| WaggleError::InvalidDogLimit(value))
    }
}

impl From<DogLimit> for i64 {
    fn from(limit: DogLimit) -> Self {
        match limit {
            DogLimit::Unlimited => DogLimit::UNLIMITED_SENTINEL,
            DogLimit::Limited(max) => i64::from(max),
        }
    }
}

impl std::fmt::Display for DogLimit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unlimited => write!(f, "unlimited"),
            Self::Limited(max) => write!(f, "{max}"),
        }
    }
}

/// Remaining dog profile slots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DogSlots {
    /// This many more dogs can be added
    Remaining(u32),
    /// No cap applies
    Unlimited,
}

impl DogSlots {
    /// Whether no cap applies
    pub fn is_unlimited(&self) -> bool {
        matches!(self, Self::Unlimited)
    }

    /// Finite slot count, if capped
    pub fn finite(&self) -> Option<u32> {
        match self {
            Self::Remaining(n) => Some(*n),
            Self::Unlimited => None,
        }
    }
}

/// Capability set for a tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EntitlementLimits {
    /// Dog profile cap
    pub max_dogs: DogLimit,
    /// Whether owner messaging is permitted
    pub can_message: bool,
    /// Whether compatibility matching is permitted
    pub can_use_compatibility: bool,
    /// Named feature flags
    pub features: &'static [Feature],
}

impl EntitlementLimits {
    /// Check feature membership
    pub fn has_feature(&self, feature: Feature) -> bool {
        self.features.contains(&feature)
    }

    /// Whether one more dog fits given the current count
    pub fn allows_dog(&self, current_dog_count: u32) -> bool {
        self.max_dogs.allows(current_dog_count)
    }

    /// Slots left given the current count
    pub fn remaining_dog_slots(&self, current_dog_count: u32) -> DogSlots {
        self.max_dogs.remaining(current_dog_count)
    }
}

/// Entitlement check result, for upgrade prompts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitlementCheck {
    /// Whether access is allowed
    pub allowed: bool,
    /// Reason if denied
    pub reason: Option<String>,
    /// Tier that would grant access, if denied
    pub required_tier: Option<Tier>,
}

impl EntitlementCheck {
    /// Access granted
    pub fn allowed() -> Self {
        Self {
            allowed: true,
            reason: None,
            required_tier: None,
        }
    }

    /// Access denied with a reason
    pub fn denied(reason: impl Into<String>, required_tier: Option<Tier>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
            required_tier,
        }
    }
}
