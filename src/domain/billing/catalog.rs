//! Pricing catalog rows and price resolution results.
//!
//! Catalog rows are append-only: a price change is a new row, so a
//! purchase can always be audited against the row that priced it. Only
//! `redemptions` and `archived` ever change after insert.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::feature_tier::{FeatureBitmap, FeatureTier};
use super::plan_type::{BillingInterval, PlanType};
use crate::domain::foundation::{CatalogRowId, Timestamp, ValidationError};

/// Coupons shorter than this are treated as absent.
const MIN_COUPON_LEN: usize = 2;

/// One priced version of a (plan type, coupon code) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanDefinition {
    pub id: CatalogRowId,
    pub plan_type: PlanType,
    pub coupon_code: String,
    pub coupon_applied_message: String,
    pub hidden_plan_comment: String,
    pub monthly_price_cents: i64,
    pub annual_price_cents: i64,
    pub features: FeatureBitmap,
    pub redemptions: i64,
    pub created_at: Timestamp,
    pub expires_at: Option<Timestamp>,
    pub archived: bool,
}

impl PlanDefinition {
    /// Creates a new catalog row for the given plan and coupon.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if a price is negative.
    pub fn new(
        plan_type: PlanType,
        coupon_code: &str,
        monthly_price_cents: i64,
        annual_price_cents: i64,
    ) -> Result<Self, ValidationError> {
        for (field, value) in [
            ("monthly_price_cents", monthly_price_cents),
            ("annual_price_cents", annual_price_cents),
        ] {
            if value < 0 {
                return Err(ValidationError::invalid_format(
                    field,
                    format!("price cannot be negative, got {}", value),
                ));
            }
        }

        Ok(Self {
            id: CatalogRowId::new(),
            plan_type,
            coupon_code: effective_coupon_code(plan_type, coupon_code),
            coupon_applied_message: String::new(),
            hidden_plan_comment: String::new(),
            monthly_price_cents,
            annual_price_cents,
            features: FeatureBitmap::empty(),
            redemptions: 0,
            created_at: Timestamp::now(),
            expires_at: None,
            archived: false,
        })
    }

    pub fn with_features(mut self, features: FeatureBitmap) -> Self {
        self.features = features;
        self
    }

    pub fn with_expiry(mut self, expires_at: Timestamp) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn with_created_at(mut self, created_at: Timestamp) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn with_messages(
        mut self,
        coupon_applied_message: impl Into<String>,
        hidden_plan_comment: impl Into<String>,
    ) -> Self {
        self.coupon_applied_message = coupon_applied_message.into();
        self.hidden_plan_comment = hidden_plan_comment.into();
        self
    }

    /// An expiry date in the past makes the row unusable, even if it is newest.
    pub fn is_expired_at(&self, now: Timestamp) -> bool {
        self.expires_at.map_or(false, |expires| expires.is_before(&now))
    }

    pub fn is_usable_at(&self, now: Timestamp) -> bool {
        !self.archived && !self.is_expired_at(now)
    }

    /// Price charged per billing interval of the row's plan type.
    pub fn price_cents(&self) -> i64 {
        match self.plan_type.billing_interval() {
            BillingInterval::Month => self.monthly_price_cents,
            BillingInterval::Year => self.annual_price_cents,
        }
    }
}

/// Normalizes a caller-supplied coupon, synthesizing the default coupon when blank.
pub fn effective_coupon_code(plan_type: PlanType, coupon_code: &str) -> String {
    let trimmed = coupon_code.trim();
    if trimmed.len() < MIN_COUPON_LEN {
        plan_type.default_coupon_code()
    } else {
        trimmed.to_ascii_uppercase()
    }
}

/// How a price resolution was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PriceStatus {
    /// The requested coupon row was usable.
    Matched,
    /// The requested coupon was missing, archived or expired; the default row priced it.
    DefaultFallback,
    /// Neither the coupon nor the default row exists. Price is zero and must not be sold.
    NoMatch,
}

impl PriceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PriceStatus::Matched => "MATCHED",
            PriceStatus::DefaultFallback => "DEFAULT_FALLBACK",
            PriceStatus::NoMatch => "NO_MATCH",
        }
    }
}

impl fmt::Display for PriceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Price and feature set resolved for a purchase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceResolution {
    pub plan_type: PlanType,
    pub price_cents: i64,
    pub feature_tier: FeatureTier,
    pub features: FeatureBitmap,
    pub catalog_row_id: Option<CatalogRowId>,
    /// Coupon of the row that priced the purchase, or the requested one on no match.
    pub coupon_code: String,
    pub coupon_applied_message: String,
    pub status: PriceStatus,
}

impl PriceResolution {
    pub fn from_row(row: &PlanDefinition, status: PriceStatus) -> Self {
        Self {
            plan_type: row.plan_type,
            price_cents: row.price_cents(),
            feature_tier: row.plan_type.feature_tier(),
            features: row.features,
            catalog_row_id: Some(row.id),
            coupon_code: row.coupon_code.clone(),
            coupon_applied_message: row.coupon_applied_message.clone(),
            status,
        }
    }

    pub fn no_match(plan_type: PlanType, coupon_code: impl Into<String>) -> Self {
        Self {
            plan_type,
            price_cents: 0,
            feature_tier: FeatureTier::Free,
            features: FeatureBitmap::empty(),
            catalog_row_id: None,
            coupon_code: coupon_code.into(),
            coupon_applied_message: String::new(),
            status: PriceStatus::NoMatch,
        }
    }

    pub fn is_priced(&self) -> bool {
        self.status != PriceStatus::NoMatch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(plan: PlanType, coupon: &str) -> PlanDefinition {
        PlanDefinition::new(plan, coupon, 12500, 125000).unwrap()
    }

    #[test]
    fn blank_coupon_becomes_default_coupon() {
        assert_eq!(
            effective_coupon_code(PlanType::ProfessionalMonthly, ""),
            "DEFAULT-PROFESSIONAL_MONTHLY"
        );
        assert_eq!(
            effective_coupon_code(PlanType::EnterpriseYearly, " x "),
            "DEFAULT-ENTERPRISE_YEARLY"
        );
    }

    #[test]
    fn coupon_is_trimmed_and_uppercased() {
        assert_eq!(effective_coupon_code(PlanType::ProfessionalMonthly, " 25off "), "25OFF");
    }

    #[test]
    fn negative_price_is_rejected() {
        assert!(PlanDefinition::new(PlanType::ProfessionalMonthly, "X1", -1, 0).is_err());
    }

    #[test]
    fn monthly_plan_prices_from_monthly_column() {
        assert_eq!(row(PlanType::ProfessionalMonthly, "25OFF").price_cents(), 12500);
        assert_eq!(row(PlanType::ProfessionalYearly, "25OFF").price_cents(), 125000);
    }

    #[test]
    fn expired_row_is_not_usable() {
        let now = Timestamp::now();
        let expired = row(PlanType::ProfessionalMonthly, "OLD").with_expiry(now.minus_days(1));
        let current = row(PlanType::ProfessionalMonthly, "NEW").with_expiry(now.add_days(1));

        assert!(expired.is_expired_at(now));
        assert!(!expired.is_usable_at(now));
        assert!(current.is_usable_at(now));
    }

    #[test]
    fn archived_row_is_not_usable() {
        let mut archived = row(PlanType::EnterpriseMonthly, "GONE");
        archived.archived = true;
        assert!(!archived.is_usable_at(Timestamp::now()));
    }

    #[test]
    fn no_match_resolution_is_zero_priced_and_flagged() {
        let resolution = PriceResolution::no_match(PlanType::EnterpriseMonthly, "NOPE");
        assert_eq!(resolution.price_cents, 0);
        assert_eq!(resolution.status, PriceStatus::NoMatch);
        assert!(!resolution.is_priced());
    }

    #[test]
    fn resolution_from_row_carries_row_identity() {
        let definition = row(PlanType::ProfessionalMonthly, "25OFF")
            .with_features(FeatureBitmap::from_bits(3));
        let resolution = PriceResolution::from_row(&definition, PriceStatus::Matched);

        assert_eq!(resolution.catalog_row_id, Some(definition.id));
        assert_eq!(resolution.price_cents, 12500);
        assert_eq!(resolution.feature_tier, FeatureTier::Professional);
        assert_eq!(resolution.features.bits(), 3);
    }
}
