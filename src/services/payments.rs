//! Payment orchestration: amount calculation, gateway sessions, and
//! idempotent settlement reconciliation.

use std::sync::Arc;

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

use crate::auth::{self, Caller};
use crate::config::PaymentsConfig;
use crate::error::{AppError, Result};
use crate::models::{Car, NewPayment, Payment, PaymentStatus, PaymentType, Rental};
use crate::services::notifier::{send_best_effort, Notifier};
use crate::services::stripe::{PaymentGateway, SessionRequest};
use crate::storage::{CarStore, PaymentStore, PaymentTransition, RentalStore};

const FINE_MULTIPLIER: Decimal = dec!(1.50);

const PAUSED_PAYMENT_NOTICE: &str = "Payment has been paused, but can be made later.\n\
    Please note that your session will remain active for 24 hours.\n\
    After that time, it will expire.";

#[derive(Clone)]
pub struct PaymentOrchestrator {
    rentals: Arc<dyn RentalStore>,
    cars: Arc<dyn CarStore>,
    payments: Arc<dyn PaymentStore>,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn Notifier>,
    settings: PaymentsConfig,
}

/// Amount owed for a rental: daily fee times whole days between the start
/// and the requested return date, times 1.50 for a fine, rounded half-up
/// to two decimals.
fn calculate_amount(rental: &Rental, car: &Car, payment_type: PaymentType) -> Decimal {
    let total_days = (rental.return_date - rental.rental_date).num_days();
    let mut amount = car.daily_fee * Decimal::from(total_days);
    if payment_type == PaymentType::Fine {
        amount *= FINE_MULTIPLIER;
    }
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

fn created_message(payment: &Payment) -> String {
    format!(
        "New payment created:\n\nPayment ID: {}\nRental ID: {}\nTotal: ${}\nSession ID: {}\nStatus: {}\nType: {}",
        payment.id,
        payment.rental_id,
        payment.amount_to_pay,
        payment.session_id,
        payment.status,
        payment.payment_type
    )
}

fn paid_message(payment: &Payment) -> String {
    format!(
        "Payment paid:\n\nPayment ID: {}\nRental ID: {}\nTotal: ${}\nStatus: {}\nType: {}",
        payment.id,
        payment.rental_id,
        payment.amount_to_pay,
        payment.status,
        payment.payment_type
    )
}

impl PaymentOrchestrator {
    pub fn new(
        rentals: Arc<dyn RentalStore>,
        cars: Arc<dyn CarStore>,
        payments: Arc<dyn PaymentStore>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn Notifier>,
        settings: PaymentsConfig,
    ) -> Self {
        Self {
            rentals,
            cars,
            payments,
            gateway,
            notifier,
            settings,
        }
    }

    /// Opens a hosted payment session for a rental and records the PENDING
    /// payment. Opening another session for an already-settled
    /// (rental, type) pair is a caller error; a still-pending one may be
    /// superseded by a fresh session.
    pub async fn create_payment_session(
        &self,
        rental_id: i64,
        payment_type: PaymentType,
    ) -> Result<Payment> {
        let rental = self
            .rentals
            .find_rental(rental_id)
            .await?
            .ok_or(AppError::NotFound("rental"))?;

        if let Some(existing) = self.payments.find_payment(rental_id, payment_type).await? {
            if existing.status == PaymentStatus::Paid {
                return Err(AppError::AlreadySettled(rental_id));
            }
        }

        let car = self
            .cars
            .find_car(rental.car_id)
            .await?
            .ok_or(AppError::NotFound("car"))?;

        let amount = calculate_amount(&rental, &car, payment_type);
        let request = SessionRequest {
            amount,
            currency: self.settings.currency.clone(),
            product_name: format!("Car Rental ID {rental_id}"),
            success_url: format!(
                "{}/{}?type={}",
                self.settings.success_url, rental_id, payment_type
            ),
            cancel_url: format!("{}/{}", self.settings.cancel_url, rental_id),
        };

        let session = self.gateway.open_session(&request).await?;

        let payment = self
            .payments
            .insert_payment(NewPayment {
                rental_id,
                payment_type,
                amount_to_pay: amount,
                session_id: session.id,
                session_url: session.url,
            })
            .await?;

        send_best_effort(self.notifier.as_ref(), &created_message(&payment)).await;

        tracing::info!(
            payment_id = payment.id,
            rental_id,
            amount = %payment.amount_to_pay,
            payment_type = %payment.payment_type,
            "payment session created"
        );

        Ok(payment)
    }

    /// Lists payments, scoped to the caller's authority.
    pub async fn list_payments(
        &self,
        user_id: Option<i64>,
        caller: &Caller,
    ) -> Result<Vec<Payment>> {
        let scope = auth::resolve_user_scope(user_id, caller)?;
        self.payments.list_payments(scope).await
    }

    /// Reconciles a payment against the gateway's settlement status.
    ///
    /// Safe to call repeatedly: an already-PAID record is returned as-is
    /// without touching the gateway, and concurrent first-time calls are
    /// collapsed by the atomic PENDING -> PAID transition so only the one
    /// that performed the flip notifies.
    pub async fn check_successful_payment(
        &self,
        rental_id: i64,
        payment_type: PaymentType,
    ) -> Result<Payment> {
        let payment = self
            .payments
            .find_payment(rental_id, payment_type)
            .await?
            .ok_or(AppError::NotFound("payment"))?;

        if payment.status == PaymentStatus::Paid {
            return Ok(payment);
        }

        let status = self.gateway.session_status(&payment.session_id).await?;
        if !status.settled {
            return Err(AppError::PaymentNotCompleted);
        }

        match self.payments.mark_paid(payment.id).await? {
            PaymentTransition::Paid(paid) => {
                send_best_effort(self.notifier.as_ref(), &paid_message(&paid)).await;
                tracing::info!(payment_id = paid.id, rental_id, "payment settled");
                Ok(paid)
            }
            PaymentTransition::AlreadyPaid(paid) => Ok(paid),
            PaymentTransition::NotFound => Err(AppError::NotFound("payment")),
        }
    }

    /// Advisory shown when a checkout is abandoned mid-session. Pure read.
    pub fn paused_payment_notice(&self, _rental_id: i64) -> &'static str {
        PAUSED_PAYMENT_NOTICE
    }
}
