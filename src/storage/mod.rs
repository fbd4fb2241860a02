//! Storage abstraction for cars, rentals, and payments.
//!
//! Every invariant-bearing mutation (inventory reserve/release, the
//! ACTIVE -> RETURNED flip, the PENDING -> PAID flip) is a single
//! conditional operation at this boundary, so concurrent callers serialize
//! per entity id and the check-then-act races stay inside one store call.
//! Soft-deleted rows are invisible to every query.

pub mod memory;
pub mod mongo;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::Result;
use crate::models::{
    Car, NewCar, NewPayment, NewRental, Payment, PaymentType, Rental, RentalStatus,
};

pub use memory::InMemoryStore;
pub use mongo::MongoStore;

/// Outcome of a conditional inventory update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InventoryUpdate {
    /// The count changed; `remaining` is the persisted value after the update.
    Updated { remaining: i64 },
    /// The count was already zero, so no unit could be reserved.
    Depleted,
    /// The car does not exist or is soft-deleted.
    NotFound,
}

/// Outcome of the conditional ACTIVE -> RETURNED transition.
#[derive(Debug, Clone, PartialEq)]
pub enum RentalTransition {
    Returned(Rental),
    AlreadyReturned,
    NotFound,
}

/// Outcome of the conditional PENDING -> PAID transition.
#[derive(Debug, Clone, PartialEq)]
pub enum PaymentTransition {
    Paid(Payment),
    /// The flip had already happened; carries the settled record.
    AlreadyPaid(Payment),
    NotFound,
}

#[async_trait]
pub trait CarStore: Send + Sync {
    async fn insert_car(&self, car: NewCar) -> Result<Car>;

    async fn find_car(&self, id: i64) -> Result<Option<Car>>;

    /// Atomically decrements the available count if it is positive.
    async fn reserve_unit(&self, id: i64) -> Result<InventoryUpdate>;

    /// Atomically increments the available count.
    async fn release_unit(&self, id: i64) -> Result<InventoryUpdate>;

    /// Marks the car deleted; it disappears from all subsequent queries.
    async fn soft_delete_car(&self, id: i64) -> Result<bool>;
}

#[async_trait]
pub trait RentalStore: Send + Sync {
    async fn insert_rental(&self, rental: NewRental) -> Result<Rental>;

    async fn find_rental(&self, id: i64) -> Result<Option<Rental>>;

    async fn list_rentals(&self, user_id: Option<i64>, status: RentalStatus)
        -> Result<Vec<Rental>>;

    /// Atomically flips an ACTIVE rental to RETURNED, stamping the actual
    /// return date. The flip is one-way; a second call reports
    /// `AlreadyReturned`.
    async fn complete_rental(&self, id: i64, returned_on: NaiveDate) -> Result<RentalTransition>;

    /// ACTIVE rentals due back within `[from, to]` inclusive.
    async fn find_due_between(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<Rental>>;
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn insert_payment(&self, payment: NewPayment) -> Result<Payment>;

    async fn find_payment(
        &self,
        rental_id: i64,
        payment_type: PaymentType,
    ) -> Result<Option<Payment>>;

    /// Payments visible to the given scope; `None` lists across all users.
    async fn list_payments(&self, user_id: Option<i64>) -> Result<Vec<Payment>>;

    /// Atomically flips a PENDING payment to PAID.
    async fn mark_paid(&self, id: i64) -> Result<PaymentTransition>;
}
