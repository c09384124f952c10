//! Feature tiers and the feature bitmap carried by catalog rows.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::ValidationError;

/// Product-capability bundle an organization is entitled to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FeatureTier {
    Free,
    Professional,
    Enterprise,
}

impl FeatureTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureTier::Free => "FREE",
            FeatureTier::Professional => "PROFESSIONAL",
            FeatureTier::Enterprise => "ENTERPRISE",
        }
    }

    pub fn is_paid(&self) -> bool {
        !matches!(self, FeatureTier::Free)
    }
}

impl fmt::Display for FeatureTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for FeatureTier {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "FREE" => Ok(FeatureTier::Free),
            "PROFESSIONAL" => Ok(FeatureTier::Professional),
            "ENTERPRISE" => Ok(FeatureTier::Enterprise),
            other => Err(ValidationError::invalid_format(
                "feature_tier",
                format!("unknown tier '{}'", other),
            )),
        }
    }
}

/// Set of individually priced features, stored as a bitmap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureBitmap(u32);

impl FeatureBitmap {
    pub const FAVICON: u32 = 1;
    pub const FULL_DOMAIN: u32 = 2;
    pub const GOOGLE_ANALYTICS: u32 = 4;
    pub const SOCIAL_SHARE_IMAGE: u32 = 8;
    pub const SOCIAL_SHARE_DESCRIPTION: u32 = 16;
    pub const PROMOTED_ORGANIZATIONS: u32 = 32;

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub fn bits(&self) -> u32 {
        self.0
    }

    pub fn contains(&self, feature: u32) -> bool {
        feature != 0 && self.0 & feature == feature
    }

    pub fn with(self, feature: u32) -> Self {
        Self(self.0 | feature)
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bitmap_contains_only_set_features() {
        let bitmap = FeatureBitmap::empty()
            .with(FeatureBitmap::FAVICON)
            .with(FeatureBitmap::PROMOTED_ORGANIZATIONS);

        assert_eq!(bitmap.bits(), 33);
        assert!(bitmap.contains(FeatureBitmap::FAVICON));
        assert!(bitmap.contains(FeatureBitmap::PROMOTED_ORGANIZATIONS));
        assert!(!bitmap.contains(FeatureBitmap::FULL_DOMAIN));
    }

    #[test]
    fn empty_bitmap_contains_nothing() {
        assert!(FeatureBitmap::empty().is_empty());
        assert!(!FeatureBitmap::from_bits(63).contains(0));
    }

    #[test]
    fn tier_round_trips_through_name() {
        for tier in [FeatureTier::Free, FeatureTier::Professional, FeatureTier::Enterprise] {
            assert_eq!(tier.as_str().parse::<FeatureTier>().unwrap(), tier);
        }
        assert!(!FeatureTier::Free.is_paid());
    }
}
