//! Application startup and lifecycle management.
//!
//! Wires configuration, the MongoDB-backed store, the gateway and notifier
//! clients, and the services, then runs the overdue scanner schedule until
//! a shutdown signal arrives.

use std::sync::Arc;
use std::time::Duration;

use mongodb::{options::ClientOptions, Client};
use secrecy::ExposeSecret;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::services::{
    InventoryLedger, Notifier, OverdueScanner, PaymentGateway, PaymentOrchestrator,
    RentalLifecycle, StripeClient, TelegramNotifier,
};
use crate::storage::{CarStore, MongoStore, PaymentStore, RentalStore};

pub struct Application {
    config: Config,
    rentals: RentalLifecycle,
    payments: PaymentOrchestrator,
    scanner: Arc<OverdueScanner>,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: Config) -> anyhow::Result<Self> {
        let mut client_options = ClientOptions::parse(config.database.url.expose_secret()).await?;
        client_options.app_name = Some(config.service_name.clone());

        let client = Client::with_options(client_options)?;
        let db = client.database(&config.database.db_name);

        let store = Arc::new(MongoStore::new(&db));
        store.init_indexes().await?;

        let gateway: Arc<dyn PaymentGateway> = Arc::new(StripeClient::new(config.stripe.clone()));
        if config.stripe.is_configured() {
            tracing::info!("stripe client initialized");
        } else {
            tracing::warn!("stripe credentials not configured - payment features will be limited");
        }

        let notifier: Arc<dyn Notifier> = Arc::new(TelegramNotifier::new(config.telegram.clone()));
        if !config.telegram.is_configured() {
            tracing::warn!("telegram credentials not configured - notices will be dropped");
        }

        let cars: Arc<dyn CarStore> = store.clone();
        let rental_store: Arc<dyn RentalStore> = store.clone();
        let payment_store: Arc<dyn PaymentStore> = store.clone();

        let inventory = InventoryLedger::new(cars.clone());
        let rentals = RentalLifecycle::new(
            cars.clone(),
            rental_store.clone(),
            inventory,
            notifier.clone(),
        );
        let payments = PaymentOrchestrator::new(
            rental_store.clone(),
            cars,
            payment_store,
            gateway,
            notifier.clone(),
            config.payments.clone(),
        );
        let scanner = Arc::new(OverdueScanner::new(rental_store, notifier));

        Ok(Self {
            config,
            rentals,
            payments,
            scanner,
        })
    }

    pub fn rentals(&self) -> &RentalLifecycle {
        &self.rentals
    }

    pub fn payments(&self) -> &PaymentOrchestrator {
        &self.payments
    }

    /// Run the overdue scanner schedule until ctrl-c.
    pub async fn run_until_stopped(self) -> anyhow::Result<()> {
        let shutdown = CancellationToken::new();

        if self.config.scanner.enabled {
            let scanner = self.scanner.clone();
            let period = Duration::from_secs(self.config.scanner.interval_seconds);
            let token = shutdown.clone();
            tokio::spawn(async move {
                scanner.run(period, token).await;
            });
            tracing::info!(
                interval_seconds = self.config.scanner.interval_seconds,
                "overdue scanner started"
            );
        } else {
            tracing::info!("overdue scanner disabled by configuration");
        }

        tokio::signal::ctrl_c().await?;
        tracing::info!("shutdown signal received");
        shutdown.cancel();

        Ok(())
    }
}
