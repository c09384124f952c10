//! Link between a local purchaser and its gateway customer.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{PurchaserId, Timestamp, ValidationError};

/// One-to-one mapping from purchaser to gateway customer.
///
/// Created once and never mutated; both sides are unique in storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerLink {
    purchaser_id: PurchaserId,
    external_customer_id: String,
    created_at: Timestamp,
}

impl CustomerLink {
    pub fn new(
        purchaser_id: PurchaserId,
        external_customer_id: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        Self::reconstitute(purchaser_id, external_customer_id, Timestamp::now())
    }

    /// Rebuilds a link read back from storage.
    pub fn reconstitute(
        purchaser_id: PurchaserId,
        external_customer_id: impl Into<String>,
        created_at: Timestamp,
    ) -> Result<Self, ValidationError> {
        let external_customer_id = external_customer_id.into();
        if external_customer_id.trim().is_empty() {
            return Err(ValidationError::empty_field("external_customer_id"));
        }
        Ok(Self {
            purchaser_id,
            external_customer_id,
            created_at,
        })
    }

    pub fn purchaser_id(&self) -> &PurchaserId {
        &self.purchaser_id
    }

    pub fn external_customer_id(&self) -> &str {
        &self.external_customer_id
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_requires_external_customer_id() {
        let purchaser = PurchaserId::new("U1").unwrap();
        assert!(CustomerLink::new(purchaser.clone(), "").is_err());

        let link = CustomerLink::new(purchaser.clone(), "cus_1").unwrap();
        assert_eq!(link.purchaser_id(), &purchaser);
        assert_eq!(link.external_customer_id(), "cus_1");
    }
}
