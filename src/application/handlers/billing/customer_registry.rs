//! CustomerRegistry - one gateway customer per purchaser.

use std::sync::Arc;
use std::time::Duration;

use super::gateway_call::bounded;
use crate::domain::billing::{BillingError, CustomerLink};
use crate::domain::foundation::{DomainError, PurchaserId};
use crate::ports::{CreateCustomerRequest, CustomerLinkRepository, PaymentGateway, SaveResult};

/// Gateway customer of a purchaser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerHandle {
    pub external_customer_id: String,
    /// True when this call created the link.
    pub created: bool,
}

pub struct CustomerRegistry {
    links: Arc<dyn CustomerLinkRepository>,
    gateway: Arc<dyn PaymentGateway>,
    gateway_timeout: Duration,
}

impl CustomerRegistry {
    pub fn new(
        links: Arc<dyn CustomerLinkRepository>,
        gateway: Arc<dyn PaymentGateway>,
        gateway_timeout: Duration,
    ) -> Self {
        Self {
            links,
            gateway,
            gateway_timeout,
        }
    }

    /// Returns the purchaser's gateway customer, creating it on first use.
    ///
    /// Two concurrent first calls may both reach the gateway; the unique
    /// index lets only one link land and both callers return its id.
    pub async fn get_or_create_customer(
        &self,
        purchaser_id: &PurchaserId,
        email: Option<&str>,
    ) -> Result<CustomerHandle, BillingError> {
        if let Some(link) = self.links.find_by_purchaser(purchaser_id).await? {
            return Ok(CustomerHandle {
                external_customer_id: link.external_customer_id().to_string(),
                created: false,
            });
        }

        let customer = bounded(
            self.gateway_timeout,
            "create_customer",
            self.gateway.create_customer(CreateCustomerRequest {
                purchaser_id: purchaser_id.clone(),
                email: email.map(str::to_string),
                idempotency_key: Some(format!("customer-{}", purchaser_id)),
            }),
        )
        .await?;

        let link = CustomerLink::new(purchaser_id.clone(), customer.id.clone())?;
        match self.links.insert(&link).await? {
            SaveResult::Inserted => {
                tracing::info!(
                    purchaser_id = %purchaser_id,
                    customer_id = %customer.id,
                    "Gateway customer linked"
                );
                Ok(CustomerHandle {
                    external_customer_id: customer.id,
                    created: true,
                })
            }
            SaveResult::AlreadyExists => {
                let winner = self.links.find_by_purchaser(purchaser_id).await?.ok_or_else(|| {
                    BillingError::ReconciliationConflict(format!(
                        "Customer link for {} conflicted but cannot be read back",
                        purchaser_id
                    ))
                })?;
                tracing::warn!(
                    purchaser_id = %purchaser_id,
                    orphaned_customer_id = %customer.id,
                    customer_id = %winner.external_customer_id(),
                    "Lost customer link race, using existing link"
                );
                Ok(CustomerHandle {
                    external_customer_id: winner.external_customer_id().to_string(),
                    created: false,
                })
            }
        }
    }

    /// Reverse lookup used by reconciliation.
    pub async fn find_purchaser(
        &self,
        external_customer_id: &str,
    ) -> Result<Option<PurchaserId>, DomainError> {
        Ok(self
            .links
            .find_by_external_customer_id(external_customer_id)
            .await?
            .map(|link| link.purchaser_id().clone()))
    }
}
