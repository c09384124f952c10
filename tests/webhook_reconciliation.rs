//! Integration tests for webhook reconciliation, refunds and history.
//!
//! Deliveries are signed with the harness secret and replayed, reordered
//! or duplicated the way the gateway does in practice.

mod common;

use billing_ledger::application::{
    CheckoutCommand, GetPaymentHistoryQuery, MovePurchaserDataCommand, RequestRefundCommand,
};
use billing_ledger::domain::billing::{
    sign_payload, EntryStatus, LedgerEntry, RecordKind, RefundStatus, WebhookError,
};
use billing_ledger::domain::foundation::{PurchaserId, Timestamp};
use billing_ledger::ports::{
    LedgerRepository, SubscriptionPlanRepository, WebhookEventRepository, WebhookResult,
};
use common::{one_time_checkout, signed_event, Harness};
use serde_json::json;

fn purchaser(id: &str) -> PurchaserId {
    PurchaserId::new(id).unwrap()
}

fn refund_request(purchaser_id: &str, charge_id: &str) -> RequestRefundCommand {
    RequestRefundCommand {
        purchaser_id: purchaser_id.to_string(),
        charge_id: charge_id.to_string(),
    }
}

/// Starts a monthly donation and returns (customer_id, subscription_id).
async fn start_donation(h: &Harness, amount_cents: i64) -> (String, String) {
    let result = h
        .ledger
        .checkout
        .handle(CheckoutCommand {
            is_recurring: true,
            ..one_time_checkout("U1", amount_cents)
        })
        .await;
    assert!(result.success, "donation failed: {:?}", result.status);
    (result.customer_id.unwrap(), result.subscription_id.unwrap())
}

// =============================================================================
// Delivery guarantees
// =============================================================================

#[tokio::test]
async fn tampered_payload_is_unauthorized_and_unrecorded() {
    let h = Harness::new();
    let mut cmd = signed_event("evt_1", "charge.succeeded", json!({"id": "ch_1"}));
    cmd.payload = br#"{"id":"evt_1","type":"charge.succeeded","data":{"object":{"id":"ch_2"}}}"#.to_vec();

    let err = h.ledger.reconcile_webhook.handle(cmd).await.unwrap_err();

    assert!(matches!(err, WebhookError::InvalidSignature));
    assert!(!err.is_retryable());
    assert!(h.events.is_empty().await);
}

#[tokio::test]
async fn stale_signature_timestamp_is_rejected() {
    let h = Harness::new();
    let mut cmd = signed_event("evt_1", "charge.succeeded", json!({"id": "ch_1"}));
    let payload = String::from_utf8(cmd.payload.clone()).unwrap();
    let an_hour_ago = chrono::Utc::now().timestamp() - 3600;
    cmd.signature = sign_payload(common::WEBHOOK_SECRET, an_hour_ago, &payload);

    let err = h.ledger.reconcile_webhook.handle(cmd).await.unwrap_err();

    assert!(matches!(err, WebhookError::TimestampOutOfRange));
}

#[tokio::test]
async fn recurring_charge_delivered_many_times_is_journaled_once() {
    let h = Harness::new();
    let (customer_id, subscription_id) = start_donation(&h, 500).await;
    let charge = json!({"id": "ch_renewal", "customer": customer_id, "amount": 500, "currency": "usd"});

    let mut results = Vec::new();
    for attempt in 0..5 {
        // Redeliveries reuse the event id; a second event for the same charge does not.
        let event_id = if attempt < 3 { "evt_a" } else { "evt_b" };
        results.push(
            h.ledger
                .reconcile_webhook
                .handle(signed_event(event_id, "charge.succeeded", charge.clone()))
                .await
                .unwrap(),
        );
    }

    assert_eq!(results[0], WebhookResult::Processed);
    assert!(results[1..]
        .iter()
        .all(|r| *r == WebhookResult::AlreadyRecorded));
    assert_eq!(h.entries.count_by_charge_id("ch_renewal").await, 1);
    let journal = h
        .entries
        .list_by_subscription_id(&subscription_id)
        .await
        .unwrap();
    assert_eq!(journal.len(), 2);
}

#[tokio::test]
async fn invoice_events_link_charges_and_stamp_the_plan() {
    let h = Harness::new();
    let (customer_id, subscription_id) = start_donation(&h, 700).await;
    let paid_at = chrono::Utc::now().timestamp();

    let created = h
        .ledger
        .reconcile_webhook
        .handle(signed_event(
            "evt_inv_created",
            "invoice.created",
            json!({"id": "in_1", "subscription": subscription_id, "customer": customer_id}),
        ))
        .await
        .unwrap();
    let charged = h
        .ledger
        .reconcile_webhook
        .handle(signed_event(
            "evt_charge",
            "charge.succeeded",
            json!({"id": "ch_inv", "customer": customer_id, "amount": 700, "invoice": "in_1"}),
        ))
        .await
        .unwrap();
    let paid = h
        .ledger
        .reconcile_webhook
        .handle(signed_event(
            "evt_inv_paid",
            "invoice.payment_succeeded",
            json!({"id": "in_1", "status_transitions": {"paid_at": paid_at}}),
        ))
        .await
        .unwrap();

    assert_eq!(
        (created, charged, paid),
        (
            WebhookResult::Processed,
            WebhookResult::Processed,
            WebhookResult::Processed
        )
    );
    let entry = h.entries.find_payment_by_charge_id("ch_inv").await.unwrap().unwrap();
    assert_eq!(entry.record_kind, RecordKind::PaymentAutoRecurring);
    assert_eq!(entry.external_subscription_id.as_deref(), Some(subscription_id.as_str()));
    let plan = h
        .plans
        .find_by_external_subscription_id(&subscription_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(plan.last_charged_at, Timestamp::from_unix_secs(paid_at));
}

#[tokio::test]
async fn subscription_update_without_cancellation_is_ignored() {
    let h = Harness::new();
    let (_, subscription_id) = start_donation(&h, 500).await;

    let result = h
        .ledger
        .reconcile_webhook
        .handle(signed_event(
            "evt_upd",
            "customer.subscription.updated",
            json!({"id": subscription_id, "status": "active"}),
        ))
        .await
        .unwrap();

    assert_eq!(result, WebhookResult::Ignored);
    let record = h.events.find_by_event_id("evt_upd").await.unwrap().unwrap();
    assert_eq!(record.result, WebhookResult::Ignored);
}

// =============================================================================
// Refunds
// =============================================================================

#[tokio::test]
async fn refund_webhook_is_applied_once() {
    let h = Harness::new();
    let checkout = h.ledger.checkout.handle(one_time_checkout("U1", 2000)).await;
    let refunded = json!({"id": "ch_1", "customer": checkout.customer_id, "amount": 2000, "amount_refunded": 2000, "refunded": true});

    let first = h
        .ledger
        .reconcile_webhook
        .handle(signed_event("evt_r1", "charge.refunded", refunded.clone()))
        .await
        .unwrap();
    let second = h
        .ledger
        .reconcile_webhook
        .handle(signed_event("evt_r2", "charge.refunded", refunded))
        .await
        .unwrap();

    assert_eq!(first, WebhookResult::Processed);
    assert_eq!(second, WebhookResult::AlreadyRecorded);
    let entry = h.entries.find_payment_by_charge_id("ch_1").await.unwrap().unwrap();
    assert_eq!(entry.status, EntryStatus::Refunded);
    assert_eq!(entry.refunded_amount_cents, 2000);
}

#[tokio::test]
async fn refund_request_then_webhook_settles_without_second_refund() {
    let h = Harness::new();
    h.ledger.checkout.handle(one_time_checkout("U1", 2000)).await;

    let requested = h.ledger.request_refund.handle(refund_request("U1", "ch_1")).await;
    assert_eq!(requested.status, RefundStatus::RefundPending);

    h.ledger
        .reconcile_webhook
        .handle(signed_event(
            "evt_refund",
            "charge.refunded",
            json!({"id": "ch_1", "amount": 2000, "amount_refunded": 2000}),
        ))
        .await
        .unwrap();
    let repeated = h.ledger.request_refund.handle(refund_request("U1", "ch_1")).await;

    assert_eq!(repeated.status, RefundStatus::AlreadyRefunded);
    assert!(repeated.success);
    assert_eq!(h.gateway.call_count("create_refund"), 1);
}

#[tokio::test]
async fn history_marks_only_recent_payments_refundable() {
    let h = Harness::new();
    h.ledger.checkout.handle(one_time_checkout("U1", 2000)).await;
    let fresh = h.entries.find_payment_by_charge_id("ch_1").await.unwrap().unwrap();
    let old = LedgerEntry::payment_from_checkout(
        fresh.party(),
        "ch_old",
        3000,
        "usd",
        Default::default(),
    )
    .with_created_at(Timestamp::now().minus_days(31));
    h.entries.append(&old).await.unwrap();

    let history = h
        .ledger
        .payment_history
        .handle(GetPaymentHistoryQuery {
            purchaser_id: "U1".to_string(),
        })
        .await
        .unwrap();

    let refundable: Vec<_> = history
        .iter()
        .map(|item| (item.entry.external_charge_id.clone().unwrap(), item.refundable))
        .collect();
    assert_eq!(
        refundable,
        vec![("ch_1".to_string(), true), ("ch_old".to_string(), false)]
    );

    let late = h.ledger.request_refund.handle(refund_request("U1", "ch_old")).await;
    assert_eq!(late.status, RefundStatus::NotRefundable);
}

// =============================================================================
// Account merge
// =============================================================================

#[tokio::test]
async fn merged_purchaser_keeps_receiving_recurring_charges() {
    let h = Harness::new();
    let (customer_id, _) = start_donation(&h, 500).await;

    let moved = h
        .ledger
        .move_purchaser_data
        .handle(MovePurchaserDataCommand {
            from_purchaser_id: "U1".to_string(),
            to_purchaser_id: "U2".to_string(),
        })
        .await
        .unwrap();
    assert!(moved.customer_link_moved);

    h.ledger
        .reconcile_webhook
        .handle(signed_event(
            "evt_after_merge",
            "charge.succeeded",
            json!({"id": "ch_after", "customer": customer_id, "amount": 500}),
        ))
        .await
        .unwrap();

    let entry = h.entries.find_payment_by_charge_id("ch_after").await.unwrap().unwrap();
    assert_eq!(entry.purchaser_id, purchaser("U2"));
    assert!(h
        .entries
        .list_for_purchaser(&purchaser("U1"))
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn merge_into_purchaser_with_own_customer_keeps_recurring_charges() {
    let h = Harness::new();
    h.ledger.checkout.handle(one_time_checkout("U2", 1000)).await;
    let (customer_id, subscription_id) = start_donation(&h, 500).await;

    let moved = h
        .ledger
        .move_purchaser_data
        .handle(MovePurchaserDataCommand {
            from_purchaser_id: "U1".to_string(),
            to_purchaser_id: "U2".to_string(),
        })
        .await
        .unwrap();
    assert!(!moved.customer_link_moved);

    // The gateway keeps billing the old customer, which still maps to U1.
    let delivered = h
        .ledger
        .reconcile_webhook
        .handle(signed_event(
            "evt_after_merge",
            "charge.succeeded",
            json!({"id": "ch_after", "customer": customer_id, "amount": 500}),
        ))
        .await
        .unwrap();

    assert_eq!(delivered, WebhookResult::Processed);
    let entry = h.entries.find_payment_by_charge_id("ch_after").await.unwrap().unwrap();
    assert_eq!(entry.purchaser_id, purchaser("U2"));
    assert_eq!(entry.external_subscription_id.as_deref(), Some(subscription_id.as_str()));
    assert_eq!(entry.record_kind, RecordKind::PaymentAutoRecurring);
}
