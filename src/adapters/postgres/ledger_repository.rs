//! PostgreSQL implementation of LedgerRepository.
//!
//! The partial unique index `ledger_entries_payment_charge_key` makes a
//! second PAYMENT_* row for the same charge a no-op insert.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{db_error, invalid_column, optional_datetime};
use crate::domain::billing::{EntryStatus, LedgerEntry, PaymentDetails, PlanType, RecordKind};
use crate::domain::foundation::{
    DomainError, ErrorCode, LedgerEntryId, OrganizationId, PurchaserId, Timestamp,
};
use crate::ports::{LedgerRepository, SaveResult, SetupLookup};

pub struct PostgresLedgerRepository {
    pool: PgPool,
}

impl PostgresLedgerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct LedgerEntryRow {
    id: Uuid,
    record_kind: String,
    external_charge_id: Option<String>,
    external_customer_id: String,
    external_subscription_id: Option<String>,
    purchaser_id: String,
    organization_id: Option<String>,
    plan_type: Option<String>,
    coupon_code: Option<String>,
    amount_cents: i64,
    currency: String,
    created_at: DateTime<Utc>,
    card_brand: Option<String>,
    card_last4: Option<String>,
    card_exp_month: Option<i32>,
    card_exp_year: Option<i32>,
    network_status: Option<String>,
    failure_message: Option<String>,
    status: String,
    refunded_amount_cents: i64,
    refund_requested_at: Option<DateTime<Utc>>,
    canceled_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    note: String,
}

impl TryFrom<LedgerEntryRow> for LedgerEntry {
    type Error = DomainError;

    fn try_from(row: LedgerEntryRow) -> Result<Self, Self::Error> {
        Ok(LedgerEntry {
            id: LedgerEntryId::from_uuid(row.id),
            record_kind: row
                .record_kind
                .parse::<RecordKind>()
                .map_err(|e| invalid_column("record_kind", e))?,
            external_charge_id: row.external_charge_id,
            external_customer_id: row.external_customer_id,
            external_subscription_id: row.external_subscription_id,
            purchaser_id: PurchaserId::new(row.purchaser_id)
                .map_err(|e| invalid_column("purchaser_id", e))?,
            organization_id: row
                .organization_id
                .map(OrganizationId::new)
                .transpose()
                .map_err(|e| invalid_column("organization_id", e))?,
            plan_type: row
                .plan_type
                .map(|p| p.parse::<PlanType>())
                .transpose()
                .map_err(|e| invalid_column("plan_type", e))?,
            coupon_code: row.coupon_code,
            amount_cents: row.amount_cents,
            currency: row.currency,
            created_at: Timestamp::from_datetime(row.created_at),
            details: PaymentDetails {
                brand: row.card_brand,
                last4: row.card_last4,
                exp_month: row.card_exp_month,
                exp_year: row.card_exp_year,
                network_status: row.network_status,
                failure_message: row.failure_message,
            },
            status: row
                .status
                .parse::<EntryStatus>()
                .map_err(|e| invalid_column("status", e))?,
            refunded_amount_cents: row.refunded_amount_cents,
            refund_requested_at: row.refund_requested_at.map(Timestamp::from_datetime),
            canceled_at: row.canceled_at.map(Timestamp::from_datetime),
            ended_at: row.ended_at.map(Timestamp::from_datetime),
            note: row.note,
        })
    }
}

const SELECT_COLUMNS: &str = r#"
    SELECT id, record_kind, external_charge_id, external_customer_id, external_subscription_id,
           purchaser_id, organization_id, plan_type, coupon_code, amount_cents, currency,
           created_at, card_brand, card_last4, card_exp_month, card_exp_year, network_status,
           failure_message, status, refunded_amount_cents, refund_requested_at, canceled_at,
           ended_at, note
    FROM ledger_entries
"#;

const PAYMENT_KINDS: &str = "('PAYMENT_FROM_CHECKOUT', 'PAYMENT_AUTO_RECURRING')";

fn into_entries(rows: Vec<LedgerEntryRow>) -> Result<Vec<LedgerEntry>, DomainError> {
    rows.into_iter().map(LedgerEntry::try_from).collect()
}

#[async_trait]
impl LedgerRepository for PostgresLedgerRepository {
    async fn append(&self, entry: &LedgerEntry) -> Result<SaveResult, DomainError> {
        let result = sqlx::query(
            r#"
            INSERT INTO ledger_entries (
                id, record_kind, external_charge_id, external_customer_id, external_subscription_id,
                purchaser_id, organization_id, plan_type, coupon_code, amount_cents, currency,
                created_at, card_brand, card_last4, card_exp_month, card_exp_year, network_status,
                failure_message, status, refunded_amount_cents, refund_requested_at, canceled_at,
                ended_at, note
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
                      $17, $18, $19, $20, $21, $22, $23, $24)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(entry.id.as_uuid())
        .bind(entry.record_kind.as_str())
        .bind(&entry.external_charge_id)
        .bind(&entry.external_customer_id)
        .bind(&entry.external_subscription_id)
        .bind(entry.purchaser_id.as_str())
        .bind(entry.organization_id.as_ref().map(|o| o.as_str()))
        .bind(entry.plan_type.map(|p| p.as_str()))
        .bind(&entry.coupon_code)
        .bind(entry.amount_cents)
        .bind(&entry.currency)
        .bind(entry.created_at.as_datetime())
        .bind(&entry.details.brand)
        .bind(&entry.details.last4)
        .bind(entry.details.exp_month)
        .bind(entry.details.exp_year)
        .bind(&entry.details.network_status)
        .bind(&entry.details.failure_message)
        .bind(entry.status.as_str())
        .bind(entry.refunded_amount_cents)
        .bind(optional_datetime(entry.refund_requested_at))
        .bind(optional_datetime(entry.canceled_at))
        .bind(optional_datetime(entry.ended_at))
        .bind(&entry.note)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("append ledger entry", e))?;

        Ok(if result.rows_affected() == 0 {
            SaveResult::AlreadyExists
        } else {
            SaveResult::Inserted
        })
    }

    async fn find_payment_by_charge_id(
        &self,
        external_charge_id: &str,
    ) -> Result<Option<LedgerEntry>, DomainError> {
        let row: Option<LedgerEntryRow> = sqlx::query_as(&format!(
            "{} WHERE external_charge_id = $1 AND record_kind IN {}",
            SELECT_COLUMNS, PAYMENT_KINDS
        ))
        .bind(external_charge_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("find payment by charge id", e))?;

        row.map(LedgerEntry::try_from).transpose()
    }

    async fn find_setup_by_subscription_id(
        &self,
        external_subscription_id: &str,
    ) -> Result<Option<LedgerEntry>, DomainError> {
        let row: Option<LedgerEntryRow> = sqlx::query_as(&format!(
            "{} WHERE external_subscription_id = $1 AND record_kind = 'SUBSCRIPTION_SETUP' \
             ORDER BY created_at DESC LIMIT 1",
            SELECT_COLUMNS
        ))
        .bind(external_subscription_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("find setup by subscription id", e))?;

        row.map(LedgerEntry::try_from).transpose()
    }

    async fn find_latest_setup(
        &self,
        lookup: &SetupLookup,
    ) -> Result<Option<LedgerEntry>, DomainError> {
        let row: Option<LedgerEntryRow> = sqlx::query_as(&format!(
            "{} WHERE record_kind = 'SUBSCRIPTION_SETUP' \
             AND (purchaser_id = $1 OR external_customer_id = $4) \
             AND amount_cents = $2 AND ($3::TEXT IS NULL OR organization_id = $3) \
             ORDER BY created_at DESC LIMIT 1",
            SELECT_COLUMNS
        ))
        .bind(lookup.purchaser_id.as_str())
        .bind(lookup.amount_cents)
        .bind(lookup.organization_id.as_ref().map(|o| o.as_str()))
        .bind(&lookup.external_customer_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("find latest setup entry", e))?;

        row.map(LedgerEntry::try_from).transpose()
    }

    async fn list_by_subscription_id(
        &self,
        external_subscription_id: &str,
    ) -> Result<Vec<LedgerEntry>, DomainError> {
        let rows: Vec<LedgerEntryRow> = sqlx::query_as(&format!(
            "{} WHERE external_subscription_id = $1 ORDER BY created_at ASC",
            SELECT_COLUMNS
        ))
        .bind(external_subscription_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("list entries by subscription", e))?;

        into_entries(rows)
    }

    async fn list_for_purchaser(
        &self,
        purchaser_id: &PurchaserId,
    ) -> Result<Vec<LedgerEntry>, DomainError> {
        let rows: Vec<LedgerEntryRow> = sqlx::query_as(&format!(
            "{} WHERE purchaser_id = $1 ORDER BY created_at DESC",
            SELECT_COLUMNS
        ))
        .bind(purchaser_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("list entries for purchaser", e))?;

        into_entries(rows)
    }

    async fn update(&self, entry: &LedgerEntry) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE ledger_entries SET
                status = $2,
                refunded_amount_cents = $3,
                refund_requested_at = $4,
                canceled_at = $5,
                ended_at = $6,
                note = $7
            WHERE id = $1
            "#,
        )
        .bind(entry.id.as_uuid())
        .bind(entry.status.as_str())
        .bind(entry.refunded_amount_cents)
        .bind(optional_datetime(entry.refund_requested_at))
        .bind(optional_datetime(entry.canceled_at))
        .bind(optional_datetime(entry.ended_at))
        .bind(&entry.note)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("update ledger entry", e))?;

        if result.rows_affected() == 0 {
            return Err(
                DomainError::new(ErrorCode::LedgerEntryNotFound, "Ledger entry not found")
                    .with_detail("ledger_entry_id", entry.id.to_string()),
            );
        }
        Ok(())
    }

    async fn reassign_purchaser(
        &self,
        from: &PurchaserId,
        to: &PurchaserId,
    ) -> Result<u64, DomainError> {
        let result = sqlx::query("UPDATE ledger_entries SET purchaser_id = $2 WHERE purchaser_id = $1")
            .bind(from.as_str())
            .bind(to.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("reassign ledger entries", e))?;

        Ok(result.rows_affected())
    }

    async fn reassign_organization(
        &self,
        from: &OrganizationId,
        to: &OrganizationId,
    ) -> Result<u64, DomainError> {
        let result =
            sqlx::query("UPDATE ledger_entries SET organization_id = $2 WHERE organization_id = $1")
                .bind(from.as_str())
                .bind(to.as_str())
                .execute(&self.pool)
                .await
                .map_err(|e| db_error("reassign ledger entries to organization", e))?;

        Ok(result.rows_affected())
    }
}
