//! PricingCatalog - price resolution over the append-only plan catalog.
//!
//! A price change is a new row; the newest non-archived row for a
//! (plan type, coupon) pair wins. An expired newest row hides older rows
//! for that coupon and sends resolution to the plan's default coupon.

use std::sync::Arc;

use crate::domain::billing::{effective_coupon_code, PlanDefinition, PlanType, PriceResolution, PriceStatus};
use crate::domain::foundation::{CatalogRowId, DomainError, Timestamp};
use crate::ports::PlanCatalogRepository;

pub struct PricingCatalog {
    catalog: Arc<dyn PlanCatalogRepository>,
}

impl PricingCatalog {
    pub fn new(catalog: Arc<dyn PlanCatalogRepository>) -> Self {
        Self { catalog }
    }

    /// Resolves the price of a plan for a coupon at the current time.
    ///
    /// No match is not an error: the resolution carries a zero price and
    /// `PriceStatus::NoMatch`, and callers decide what that means.
    pub async fn resolve_price(
        &self,
        plan_type: PlanType,
        coupon_code: &str,
        increment_redemptions: bool,
    ) -> Result<PriceResolution, DomainError> {
        self.resolve_price_at(plan_type, coupon_code, increment_redemptions, Timestamp::now())
            .await
    }

    pub async fn resolve_price_at(
        &self,
        plan_type: PlanType,
        coupon_code: &str,
        increment_redemptions: bool,
        now: Timestamp,
    ) -> Result<PriceResolution, DomainError> {
        let coupon = effective_coupon_code(plan_type, coupon_code);
        let default_coupon = plan_type.default_coupon_code();

        let resolution = match self.usable_row(plan_type, &coupon, now).await? {
            Some(row) => PriceResolution::from_row(&row, PriceStatus::Matched),
            None if coupon != default_coupon => {
                match self.usable_row(plan_type, &default_coupon, now).await? {
                    Some(row) => {
                        tracing::info!(
                            plan_type = %plan_type,
                            coupon_code = %coupon,
                            "Coupon not usable, falling back to default price"
                        );
                        PriceResolution::from_row(&row, PriceStatus::DefaultFallback)
                    }
                    None => PriceResolution::no_match(plan_type, coupon),
                }
            }
            None => PriceResolution::no_match(plan_type, coupon),
        };

        if !resolution.is_priced() {
            tracing::warn!(plan_type = %plan_type, coupon_code = %resolution.coupon_code, "No catalog row for plan");
        }

        if increment_redemptions {
            if let Some(row_id) = resolution.catalog_row_id {
                self.catalog.increment_redemptions(row_id).await?;
            }
        }

        Ok(resolution)
    }

    async fn usable_row(
        &self,
        plan_type: PlanType,
        coupon_code: &str,
        now: Timestamp,
    ) -> Result<Option<PlanDefinition>, DomainError> {
        let newest = self.catalog.find_newest(plan_type, coupon_code).await?;
        Ok(newest.filter(|row| row.is_usable_at(now)))
    }

    /// Appends a new catalog version. Older rows for the pair stay untouched.
    pub async fn add_plan_definition(
        &self,
        row: PlanDefinition,
    ) -> Result<PlanDefinition, DomainError> {
        self.catalog.insert(&row).await?;
        tracing::info!(
            catalog_row_id = %row.id,
            plan_type = %row.plan_type,
            coupon_code = %row.coupon_code,
            "Plan definition added"
        );
        Ok(row)
    }

    pub async fn archive_plan_definition(&self, id: CatalogRowId) -> Result<(), DomainError> {
        self.catalog.archive(id).await?;
        tracing::info!(catalog_row_id = %id, "Plan definition archived");
        Ok(())
    }
}
