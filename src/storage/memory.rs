//! In-memory store used by tests and embedded callers.
//!
//! `DashMap::get_mut` holds an exclusive guard on the entry for the whole
//! read-check-write, which provides the same per-id atomicity the MongoDB
//! store gets from conditional updates.

use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::NaiveDate;
use dashmap::DashMap;

use crate::error::Result;
use crate::models::{
    Car, NewCar, NewPayment, NewRental, Payment, PaymentStatus, PaymentType, Rental, RentalStatus,
};
use crate::storage::{
    CarStore, InventoryUpdate, PaymentStore, PaymentTransition, RentalStore, RentalTransition,
};

#[derive(Default)]
pub struct InMemoryStore {
    cars: DashMap<i64, Car>,
    rentals: DashMap<i64, Rental>,
    payments: DashMap<i64, Payment>,
    car_seq: AtomicI64,
    rental_seq: AtomicI64,
    payment_seq: AtomicI64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CarStore for InMemoryStore {
    async fn insert_car(&self, car: NewCar) -> Result<Car> {
        let id = self.car_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let car = Car {
            id,
            brand: car.brand,
            model: car.model,
            car_type: car.car_type,
            daily_fee: car.daily_fee,
            inventory: car.inventory,
            is_deleted: false,
        };
        self.cars.insert(id, car.clone());
        Ok(car)
    }

    async fn find_car(&self, id: i64) -> Result<Option<Car>> {
        Ok(self.cars.get(&id).and_then(|entry| {
            let car = entry.value();
            (!car.is_deleted).then(|| car.clone())
        }))
    }

    async fn reserve_unit(&self, id: i64) -> Result<InventoryUpdate> {
        let Some(mut car) = self.cars.get_mut(&id) else {
            return Ok(InventoryUpdate::NotFound);
        };
        if car.is_deleted {
            return Ok(InventoryUpdate::NotFound);
        }
        if car.inventory == 0 {
            return Ok(InventoryUpdate::Depleted);
        }
        car.inventory -= 1;
        Ok(InventoryUpdate::Updated {
            remaining: car.inventory,
        })
    }

    async fn release_unit(&self, id: i64) -> Result<InventoryUpdate> {
        let Some(mut car) = self.cars.get_mut(&id) else {
            return Ok(InventoryUpdate::NotFound);
        };
        if car.is_deleted {
            return Ok(InventoryUpdate::NotFound);
        }
        car.inventory += 1;
        Ok(InventoryUpdate::Updated {
            remaining: car.inventory,
        })
    }

    async fn soft_delete_car(&self, id: i64) -> Result<bool> {
        let Some(mut car) = self.cars.get_mut(&id) else {
            return Ok(false);
        };
        if car.is_deleted {
            return Ok(false);
        }
        car.is_deleted = true;
        Ok(true)
    }
}

#[async_trait]
impl RentalStore for InMemoryStore {
    async fn insert_rental(&self, rental: NewRental) -> Result<Rental> {
        let id = self.rental_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let rental = Rental {
            id,
            car_id: rental.car_id,
            user_id: rental.user_id,
            rental_date: rental.rental_date,
            return_date: rental.return_date,
            actual_return_date: None,
            status: RentalStatus::Active,
            is_deleted: false,
        };
        self.rentals.insert(id, rental.clone());
        Ok(rental)
    }

    async fn find_rental(&self, id: i64) -> Result<Option<Rental>> {
        Ok(self.rentals.get(&id).and_then(|entry| {
            let rental = entry.value();
            (!rental.is_deleted).then(|| rental.clone())
        }))
    }

    async fn list_rentals(
        &self,
        user_id: Option<i64>,
        status: RentalStatus,
    ) -> Result<Vec<Rental>> {
        let mut rentals: Vec<Rental> = self
            .rentals
            .iter()
            .filter(|entry| {
                let rental = entry.value();
                !rental.is_deleted
                    && rental.status == status
                    && user_id.map_or(true, |id| rental.user_id == id)
            })
            .map(|entry| entry.value().clone())
            .collect();
        rentals.sort_by_key(|rental| rental.id);
        Ok(rentals)
    }

    async fn complete_rental(&self, id: i64, returned_on: NaiveDate) -> Result<RentalTransition> {
        let Some(mut rental) = self.rentals.get_mut(&id) else {
            return Ok(RentalTransition::NotFound);
        };
        if rental.is_deleted {
            return Ok(RentalTransition::NotFound);
        }
        if rental.status == RentalStatus::Returned {
            return Ok(RentalTransition::AlreadyReturned);
        }
        rental.status = RentalStatus::Returned;
        rental.actual_return_date = Some(returned_on);
        Ok(RentalTransition::Returned(rental.clone()))
    }

    async fn find_due_between(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<Rental>> {
        let mut rentals: Vec<Rental> = self
            .rentals
            .iter()
            .filter(|entry| {
                let rental = entry.value();
                !rental.is_deleted
                    && rental.status == RentalStatus::Active
                    && rental.return_date >= from
                    && rental.return_date <= to
            })
            .map(|entry| entry.value().clone())
            .collect();
        rentals.sort_by_key(|rental| rental.id);
        Ok(rentals)
    }
}

#[async_trait]
impl PaymentStore for InMemoryStore {
    async fn insert_payment(&self, payment: NewPayment) -> Result<Payment> {
        let id = self.payment_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let payment = Payment {
            id,
            rental_id: payment.rental_id,
            session_id: payment.session_id,
            session_url: payment.session_url,
            amount_to_pay: payment.amount_to_pay,
            status: PaymentStatus::Pending,
            payment_type: payment.payment_type,
            is_deleted: false,
        };
        self.payments.insert(id, payment.clone());
        Ok(payment)
    }

    async fn find_payment(
        &self,
        rental_id: i64,
        payment_type: PaymentType,
    ) -> Result<Option<Payment>> {
        let mut matches: Vec<Payment> = self
            .payments
            .iter()
            .filter(|entry| {
                let payment = entry.value();
                !payment.is_deleted
                    && payment.rental_id == rental_id
                    && payment.payment_type == payment_type
            })
            .map(|entry| entry.value().clone())
            .collect();
        matches.sort_by_key(|payment| payment.id);
        Ok(matches.pop())
    }

    async fn list_payments(&self, user_id: Option<i64>) -> Result<Vec<Payment>> {
        let rental_scope: Option<HashSet<i64>> = user_id.map(|id| {
            self.rentals
                .iter()
                .filter(|entry| !entry.value().is_deleted && entry.value().user_id == id)
                .map(|entry| entry.value().id)
                .collect()
        });

        let mut payments: Vec<Payment> = self
            .payments
            .iter()
            .filter(|entry| {
                let payment = entry.value();
                !payment.is_deleted
                    && rental_scope
                        .as_ref()
                        .map_or(true, |scope| scope.contains(&payment.rental_id))
            })
            .map(|entry| entry.value().clone())
            .collect();
        payments.sort_by_key(|payment| payment.id);
        Ok(payments)
    }

    async fn mark_paid(&self, id: i64) -> Result<PaymentTransition> {
        let Some(mut payment) = self.payments.get_mut(&id) else {
            return Ok(PaymentTransition::NotFound);
        };
        if payment.is_deleted {
            return Ok(PaymentTransition::NotFound);
        }
        if payment.status == PaymentStatus::Paid {
            return Ok(PaymentTransition::AlreadyPaid(payment.clone()));
        }
        payment.status = PaymentStatus::Paid;
        Ok(PaymentTransition::Paid(payment.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sedan(inventory: i64) -> NewCar {
        NewCar {
            brand: "Toyota".to_string(),
            model: "Corolla".to_string(),
            car_type: crate::models::CarType::Sedan,
            daily_fee: dec!(50.00),
            inventory,
        }
    }

    #[tokio::test]
    async fn soft_deleted_car_is_invisible() {
        let store = InMemoryStore::new();
        let car = store.insert_car(sedan(2)).await.unwrap();

        assert!(store.soft_delete_car(car.id).await.unwrap());
        assert!(store.find_car(car.id).await.unwrap().is_none());
        assert_eq!(
            store.reserve_unit(car.id).await.unwrap(),
            InventoryUpdate::NotFound
        );
        assert_eq!(
            store.release_unit(car.id).await.unwrap(),
            InventoryUpdate::NotFound
        );
    }

    #[tokio::test]
    async fn reserve_stops_at_zero() {
        let store = InMemoryStore::new();
        let car = store.insert_car(sedan(1)).await.unwrap();

        assert_eq!(
            store.reserve_unit(car.id).await.unwrap(),
            InventoryUpdate::Updated { remaining: 0 }
        );
        assert_eq!(
            store.reserve_unit(car.id).await.unwrap(),
            InventoryUpdate::Depleted
        );
    }

    #[tokio::test]
    async fn complete_rental_is_one_way() {
        let store = InMemoryStore::new();
        let rental = store
            .insert_rental(NewRental {
                car_id: 1,
                user_id: 1,
                rental_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
                return_date: NaiveDate::from_ymd_opt(2025, 1, 8).unwrap(),
            })
            .await
            .unwrap();

        let returned_on = NaiveDate::from_ymd_opt(2025, 1, 7).unwrap();
        match store.complete_rental(rental.id, returned_on).await.unwrap() {
            RentalTransition::Returned(updated) => {
                assert_eq!(updated.status, RentalStatus::Returned);
                assert_eq!(updated.actual_return_date, Some(returned_on));
            }
            other => panic!("expected Returned, got {other:?}"),
        }
        assert_eq!(
            store.complete_rental(rental.id, returned_on).await.unwrap(),
            RentalTransition::AlreadyReturned
        );
    }

    #[tokio::test]
    async fn mark_paid_reports_prior_settlement() {
        let store = InMemoryStore::new();
        let payment = store
            .insert_payment(NewPayment {
                rental_id: 1,
                payment_type: PaymentType::Payment,
                amount_to_pay: dec!(350.00),
                session_id: "cs_1".to_string(),
                session_url: "https://checkout.example/cs_1".to_string(),
            })
            .await
            .unwrap();

        assert!(matches!(
            store.mark_paid(payment.id).await.unwrap(),
            PaymentTransition::Paid(_)
        ));
        match store.mark_paid(payment.id).await.unwrap() {
            PaymentTransition::AlreadyPaid(settled) => {
                assert_eq!(settled.status, PaymentStatus::Paid)
            }
            other => panic!("expected AlreadyPaid, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn due_window_is_inclusive() {
        let store = InMemoryStore::new();
        let today = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        for offset in 0..3 {
            store
                .insert_rental(NewRental {
                    car_id: 1,
                    user_id: 1,
                    rental_date: today - chrono::Days::new(5),
                    return_date: today + chrono::Days::new(offset),
                })
                .await
                .unwrap();
        }

        let due = store
            .find_due_between(today, today + chrono::Days::new(1))
            .await
            .unwrap();
        assert_eq!(due.len(), 2);
    }
}
