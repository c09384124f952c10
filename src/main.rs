//! Billing ledger maintenance binary.
//!
//! Loads configuration, applies migrations, wires the ledger onto Postgres
//! and the gateway, then runs the retention sweeps.

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use billing_ledger::adapters::postgres::run_migrations;
use billing_ledger::adapters::stripe::StripePaymentGateway;
use billing_ledger::application::{BillingLedger, BillingPorts};
use billing_ledger::config::{AppConfig, LogFormat, RuntimeConfig};
use billing_ledger::domain::foundation::Timestamp;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("loading configuration")?;
    init_tracing(&config.runtime);
    config.validate().context("validating configuration")?;

    tracing::info!(
        environment = ?config.runtime.environment,
        gateway_test_mode = config.payment.is_test_mode(),
        "Starting billing ledger"
    );

    let pool = config
        .database
        .connect()
        .await
        .context("connecting to database")?;
    if config.database.run_migrations {
        run_migrations(&pool).await.context("running migrations")?;
        tracing::info!("Migrations applied");
    }

    let gateway = StripePaymentGateway::new(config.payment.stripe_config())
        .context("building gateway client")?;
    let ledger = BillingLedger::new(
        BillingPorts::postgres(pool, Arc::new(gateway)),
        config.webhook_verifier(),
        config.billing_settings(),
    );

    let pruned = ledger.prune_invoice_cache.handle().await?;
    let cutoff = Timestamp::now()
        .minus_days(config.reconciliation.webhook_record_retention_days)
        .into_datetime();
    let purged = ledger.ports.events.delete_before(cutoff).await?;

    tracing::info!(
        invoice_references_pruned = pruned,
        webhook_records_purged = purged,
        "Retention sweep complete"
    );
    Ok(())
}

fn init_tracing(runtime: &RuntimeConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(runtime.log_level.as_str()));

    let registry = tracing_subscriber::registry().with(filter);
    let result = match runtime.log_format {
        LogFormat::Pretty => registry.with(fmt::layer().with_target(false)).try_init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_current_span(true).with_span_list(true))
            .try_init(),
    };
    result.ok();
}
