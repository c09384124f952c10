//! Organization plan types and their billing shape.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::feature_tier::FeatureTier;
use crate::domain::foundation::ValidationError;

/// Plan an organization can hold.
///
/// The name encodes both the feature tier and the billing interval.
/// `*PaidWithoutGateway` plans are settled outside the gateway (invoice,
/// check) and never have a gateway subscription behind them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlanType {
    Free,
    ProfessionalMonthly,
    ProfessionalYearly,
    ProfessionalPaidWithoutGateway,
    EnterpriseMonthly,
    EnterpriseYearly,
    EnterprisePaidWithoutGateway,
}

/// How often a recurring plan bills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillingInterval {
    Month,
    Year,
}

impl BillingInterval {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingInterval::Month => "month",
            BillingInterval::Year => "year",
        }
    }
}

impl fmt::Display for BillingInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for BillingInterval {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "month" => Ok(BillingInterval::Month),
            "year" => Ok(BillingInterval::Year),
            other => Err(ValidationError::invalid_format(
                "billing_interval",
                format!("unknown interval '{}'", other),
            )),
        }
    }
}

impl PlanType {
    /// All plan types, in catalog order.
    pub const ALL: [PlanType; 7] = [
        PlanType::Free,
        PlanType::ProfessionalMonthly,
        PlanType::ProfessionalYearly,
        PlanType::ProfessionalPaidWithoutGateway,
        PlanType::EnterpriseMonthly,
        PlanType::EnterpriseYearly,
        PlanType::EnterprisePaidWithoutGateway,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PlanType::Free => "FREE",
            PlanType::ProfessionalMonthly => "PROFESSIONAL_MONTHLY",
            PlanType::ProfessionalYearly => "PROFESSIONAL_YEARLY",
            PlanType::ProfessionalPaidWithoutGateway => "PROFESSIONAL_PAID_WITHOUT_GATEWAY",
            PlanType::EnterpriseMonthly => "ENTERPRISE_MONTHLY",
            PlanType::EnterpriseYearly => "ENTERPRISE_YEARLY",
            PlanType::EnterprisePaidWithoutGateway => "ENTERPRISE_PAID_WITHOUT_GATEWAY",
        }
    }

    /// Monthly plans bill monthly; every other plan bills yearly.
    pub fn billing_interval(&self) -> BillingInterval {
        match self {
            PlanType::ProfessionalMonthly | PlanType::EnterpriseMonthly => BillingInterval::Month,
            _ => BillingInterval::Year,
        }
    }

    pub fn is_paid_without_gateway(&self) -> bool {
        matches!(
            self,
            PlanType::ProfessionalPaidWithoutGateway | PlanType::EnterprisePaidWithoutGateway
        )
    }

    /// Whether an organization can buy this plan through checkout.
    ///
    /// Plans paid outside the gateway are assigned by staff, never bought.
    pub fn is_purchasable(&self) -> bool {
        !matches!(self, PlanType::Free) && !self.is_paid_without_gateway()
    }

    /// Feature tier an organization is entitled to while holding this plan.
    pub fn feature_tier(&self) -> FeatureTier {
        match self {
            PlanType::Free => FeatureTier::Free,
            PlanType::ProfessionalMonthly
            | PlanType::ProfessionalYearly
            | PlanType::ProfessionalPaidWithoutGateway => FeatureTier::Professional,
            PlanType::EnterpriseMonthly
            | PlanType::EnterpriseYearly
            | PlanType::EnterprisePaidWithoutGateway => FeatureTier::Enterprise,
        }
    }

    /// Coupon code of the catalog row used when no coupon applies.
    pub fn default_coupon_code(&self) -> String {
        format!("DEFAULT-{}", self.as_str())
    }
}

impl fmt::Display for PlanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PlanType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace("_STRIPE", "_GATEWAY");
        PlanType::ALL
            .iter()
            .copied()
            .find(|plan| plan.as_str() == normalized)
            .ok_or_else(|| {
                ValidationError::invalid_format("plan_type", format!("unknown plan type '{}'", s))
            })
    }
}
