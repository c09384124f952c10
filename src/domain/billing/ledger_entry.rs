//! Ledger entries: the append-only journal of money movement.
//!
//! Entries are only ever appended or annotated with refund and
//! cancellation stamps. PAYMENT_* entries are unique by gateway charge id.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::plan_type::PlanType;
use crate::domain::foundation::{
    LedgerEntryId, OrganizationId, PurchaserId, Timestamp, ValidationError,
};

/// What kind of money movement an entry journals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordKind {
    /// One-time charge made synchronously at checkout.
    PaymentFromCheckout,
    /// Charge the gateway made on its own for a recurring subscription.
    PaymentAutoRecurring,
    /// Subscription created at checkout; not itself a charge.
    SubscriptionSetup,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::PaymentFromCheckout => "PAYMENT_FROM_CHECKOUT",
            RecordKind::PaymentAutoRecurring => "PAYMENT_AUTO_RECURRING",
            RecordKind::SubscriptionSetup => "SUBSCRIPTION_SETUP",
        }
    }

    pub fn is_payment(&self) -> bool {
        !matches!(self, RecordKind::SubscriptionSetup)
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RecordKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PAYMENT_FROM_CHECKOUT" => Ok(RecordKind::PaymentFromCheckout),
            "PAYMENT_AUTO_RECURRING" => Ok(RecordKind::PaymentAutoRecurring),
            "SUBSCRIPTION_SETUP" => Ok(RecordKind::SubscriptionSetup),
            other => Err(ValidationError::invalid_format(
                "record_kind",
                format!("unknown record kind '{}'", other),
            )),
        }
    }
}

/// Money state of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryStatus {
    Succeeded,
    RefundPending,
    Refunded,
}

impl EntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryStatus::Succeeded => "SUCCEEDED",
            EntryStatus::RefundPending => "REFUND_PENDING",
            EntryStatus::Refunded => "REFUNDED",
        }
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EntryStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SUCCEEDED" => Ok(EntryStatus::Succeeded),
            "REFUND_PENDING" => Ok(EntryStatus::RefundPending),
            "REFUNDED" => Ok(EntryStatus::Refunded),
            other => Err(ValidationError::invalid_format(
                "status",
                format!("unknown entry status '{}'", other),
            )),
        }
    }
}

/// Card and network details reported by the gateway for a transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentDetails {
    pub brand: Option<String>,
    pub last4: Option<String>,
    pub exp_month: Option<i32>,
    pub exp_year: Option<i32>,
    pub network_status: Option<String>,
    pub failure_message: Option<String>,
}

/// Who paid what, for which plan. Shared by every record kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryParty {
    pub purchaser_id: PurchaserId,
    pub external_customer_id: String,
    pub organization_id: Option<OrganizationId>,
    pub plan_type: Option<PlanType>,
    pub coupon_code: Option<String>,
}

/// Journal row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: LedgerEntryId,
    pub record_kind: RecordKind,
    pub external_charge_id: Option<String>,
    pub external_customer_id: String,
    pub external_subscription_id: Option<String>,
    pub purchaser_id: PurchaserId,
    pub organization_id: Option<OrganizationId>,
    pub plan_type: Option<PlanType>,
    pub coupon_code: Option<String>,
    pub amount_cents: i64,
    pub currency: String,
    pub created_at: Timestamp,
    pub details: PaymentDetails,
    pub status: EntryStatus,
    pub refunded_amount_cents: i64,
    pub refund_requested_at: Option<Timestamp>,
    pub canceled_at: Option<Timestamp>,
    pub ended_at: Option<Timestamp>,
    pub note: String,
}

impl LedgerEntry {
    fn build(
        record_kind: RecordKind,
        party: EntryParty,
        amount_cents: i64,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            id: LedgerEntryId::new(),
            record_kind,
            external_charge_id: None,
            external_customer_id: party.external_customer_id,
            external_subscription_id: None,
            purchaser_id: party.purchaser_id,
            organization_id: party.organization_id,
            plan_type: party.plan_type,
            coupon_code: party.coupon_code,
            amount_cents,
            currency: currency.into(),
            created_at: Timestamp::now(),
            details: PaymentDetails::default(),
            status: EntryStatus::Succeeded,
            refunded_amount_cents: 0,
            refund_requested_at: None,
            canceled_at: None,
            ended_at: None,
            note: String::new(),
        }
    }

    /// One-time charge made at checkout.
    pub fn payment_from_checkout(
        party: EntryParty,
        external_charge_id: impl Into<String>,
        amount_cents: i64,
        currency: impl Into<String>,
        details: PaymentDetails,
    ) -> Self {
        let mut entry = Self::build(RecordKind::PaymentFromCheckout, party, amount_cents, currency);
        entry.external_charge_id = Some(external_charge_id.into());
        entry.details = details;
        entry
    }

    /// Gateway-initiated recurring charge.
    pub fn auto_recurring_payment(
        party: EntryParty,
        external_charge_id: impl Into<String>,
        external_subscription_id: Option<String>,
        amount_cents: i64,
        currency: impl Into<String>,
        details: PaymentDetails,
    ) -> Self {
        let mut entry = Self::build(RecordKind::PaymentAutoRecurring, party, amount_cents, currency);
        entry.external_charge_id = Some(external_charge_id.into());
        entry.external_subscription_id = external_subscription_id;
        entry.details = details;
        entry
    }

    /// Subscription created at checkout.
    pub fn subscription_setup(
        party: EntryParty,
        external_subscription_id: impl Into<String>,
        amount_cents: i64,
        currency: impl Into<String>,
        created_at: Timestamp,
    ) -> Self {
        let mut entry = Self::build(RecordKind::SubscriptionSetup, party, amount_cents, currency);
        entry.external_subscription_id = Some(external_subscription_id.into());
        entry.created_at = created_at;
        entry
    }

    pub fn with_created_at(mut self, created_at: Timestamp) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = note.into();
        self
    }

    /// Party of this entry, used to carry plan context onto follow-up charges.
    pub fn party(&self) -> EntryParty {
        EntryParty {
            purchaser_id: self.purchaser_id.clone(),
            external_customer_id: self.external_customer_id.clone(),
            organization_id: self.organization_id.clone(),
            plan_type: self.plan_type,
            coupon_code: self.coupon_code.clone(),
        }
    }

    pub fn is_payment(&self) -> bool {
        self.record_kind.is_payment()
    }

    /// Stamps the cumulative refund the gateway reports as completed.
    ///
    /// The refunded amount never decreases once settled, so a redelivered or
    /// out-of-order refund notification changes nothing and returns `false`.
    pub fn apply_refund(&mut self, refunded_amount_cents: i64, at: Timestamp) -> bool {
        if self.status == EntryStatus::Refunded
            && refunded_amount_cents <= self.refunded_amount_cents
        {
            return false;
        }
        self.refunded_amount_cents = refunded_amount_cents;
        self.status = EntryStatus::Refunded;
        self.note = format!("Refunded on {}", at.as_datetime().format("%Y-%m-%d"));
        true
    }

    /// Marks a purchaser-requested refund the gateway accepted but has not settled.
    pub fn mark_refund_pending(&mut self, refund_amount_cents: i64, at: Timestamp) {
        if self.status == EntryStatus::Refunded {
            return;
        }
        self.refunded_amount_cents = refund_amount_cents;
        self.refund_requested_at = Some(at);
        self.status = EntryStatus::RefundPending;
    }

    /// Stamps cancellation times; fields already set are kept.
    ///
    /// Returns `true` if anything changed.
    pub fn stamp_cancellation(
        &mut self,
        canceled_at: Option<Timestamp>,
        ended_at: Option<Timestamp>,
    ) -> bool {
        let before = (self.canceled_at, self.ended_at);
        self.canceled_at = self.canceled_at.or(canceled_at);
        self.ended_at = self.ended_at.or(ended_at);
        before != (self.canceled_at, self.ended_at)
    }

    /// A payment can be refunded by its purchaser within the refund window.
    pub fn is_refundable_at(&self, now: Timestamp, refund_window_days: i64) -> bool {
        self.is_payment()
            && self.status == EntryStatus::Succeeded
            && now.duration_since(&self.created_at).num_days() < refund_window_days
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn party() -> EntryParty {
        EntryParty {
            purchaser_id: PurchaserId::new("U1").unwrap(),
            external_customer_id: "cus_1".to_string(),
            organization_id: None,
            plan_type: None,
            coupon_code: None,
        }
    }

    fn payment() -> LedgerEntry {
        LedgerEntry::payment_from_checkout(party(), "ch_1", 2000, "usd", PaymentDetails::default())
    }

    #[test]
    fn setup_entry_is_not_a_payment() {
        let setup = LedgerEntry::subscription_setup(party(), "sub_1", 12500, "usd", Timestamp::now());
        assert!(!setup.is_payment());
        assert_eq!(setup.external_charge_id, None);
        assert_eq!(setup.external_subscription_id.as_deref(), Some("sub_1"));
    }

    #[test]
    fn refund_is_applied_once() {
        let mut entry = payment();
        let at = Timestamp::now();

        assert!(entry.apply_refund(2000, at));
        assert!(!entry.apply_refund(2000, at));
        assert_eq!(entry.refunded_amount_cents, 2000);
        assert_eq!(entry.status, EntryStatus::Refunded);
    }

    #[test]
    fn older_partial_refund_never_lowers_the_refunded_amount() {
        let mut entry = payment();
        let at = Timestamp::now();

        assert!(entry.apply_refund(1000, at));
        assert!(entry.apply_refund(2000, at));
        assert!(!entry.apply_refund(1000, at));
        assert_eq!(entry.refunded_amount_cents, 2000);
        assert_eq!(entry.status, EntryStatus::Refunded);
    }

    #[test]
    fn refund_pending_never_downgrades_a_refund() {
        let mut entry = payment();
        entry.apply_refund(2000, Timestamp::now());
        entry.mark_refund_pending(1000, Timestamp::now());

        assert_eq!(entry.status, EntryStatus::Refunded);
        assert_eq!(entry.refunded_amount_cents, 2000);
    }

    #[test]
    fn cancellation_stamps_are_kept_once_set() {
        let mut entry = LedgerEntry::subscription_setup(party(), "sub_1", 500, "usd", Timestamp::now());
        let first = Timestamp::now().minus_days(1);

        assert!(entry.stamp_cancellation(Some(first), None));
        assert!(!entry.stamp_cancellation(Some(Timestamp::now()), None));
        assert_eq!(entry.canceled_at, Some(first));
        assert!(entry.stamp_cancellation(None, Some(Timestamp::now())));
    }

    #[test]
    fn refund_window_excludes_old_and_refunded_entries() {
        let now = Timestamp::now();
        let recent = payment();
        let old = payment().with_created_at(now.minus_days(31));
        let mut refunded = payment();
        refunded.apply_refund(2000, now);

        assert!(recent.is_refundable_at(now, 30));
        assert!(!old.is_refundable_at(now, 30));
        assert!(!refunded.is_refundable_at(now, 30));
    }

    #[test]
    fn record_kind_parses_from_name() {
        assert_eq!(
            "PAYMENT_AUTO_RECURRING".parse::<RecordKind>().unwrap(),
            RecordKind::PaymentAutoRecurring
        );
        assert!("PAYMENT".parse::<RecordKind>().is_err());
    }
}
