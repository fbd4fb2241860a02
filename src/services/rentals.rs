//! Rental lifecycle: creation, lookup, listing, and return.
//!
//! The only rental state machine is ACTIVE -> RETURNED. Creation couples a
//! reservation to the rental write and compensates the reservation if that
//! write fails; return couples the one-way status flip to a unit release.

use std::sync::Arc;

use chrono::Utc;
use validator::Validate;

use crate::auth::{self, Caller};
use crate::dtos::CreateRentalRequest;
use crate::error::{AppError, Result};
use crate::models::{NewRental, Rental, RentalStatus};
use crate::services::inventory::InventoryLedger;
use crate::services::notifier::{send_best_effort, Notifier};
use crate::storage::{CarStore, RentalStore, RentalTransition};

#[derive(Clone)]
pub struct RentalLifecycle {
    cars: Arc<dyn CarStore>,
    rentals: Arc<dyn RentalStore>,
    inventory: InventoryLedger,
    notifier: Arc<dyn Notifier>,
}

impl RentalLifecycle {
    pub fn new(
        cars: Arc<dyn CarStore>,
        rentals: Arc<dyn RentalStore>,
        inventory: InventoryLedger,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            cars,
            rentals,
            inventory,
            notifier,
        }
    }

    /// Opens a rental for the caller: reserves one unit of the car, then
    /// persists the rental record.
    ///
    /// The reservation happens first; if the rental write fails afterwards,
    /// the unit is released again before the error is surfaced, so a failed
    /// creation never strands inventory.
    pub async fn create_rental(
        &self,
        request: &CreateRentalRequest,
        caller: &Caller,
    ) -> Result<Rental> {
        request.validate()?;

        let mut car = self
            .cars
            .find_car(request.car_id)
            .await?
            .ok_or(AppError::NotFound("car"))?;

        let remaining = self.inventory.reserve_unit(car.id).await?;

        let new_rental = NewRental {
            car_id: car.id,
            user_id: caller.user_id,
            rental_date: Utc::now().date_naive(),
            return_date: request.return_date,
        };

        let rental = match self.rentals.insert_rental(new_rental).await {
            Ok(rental) => rental,
            Err(err) => {
                if let Err(release_err) = self.inventory.release_unit(car.id).await {
                    tracing::error!(
                        car_id = car.id,
                        error = %release_err,
                        "failed to release unit after rental write failure; manual reconciliation required"
                    );
                }
                return Err(err);
            }
        };

        car.inventory = remaining;
        send_best_effort(
            self.notifier.as_ref(),
            &format!("New rental created\n\n{rental}\n\n{car}"),
        )
        .await;

        tracing::info!(
            rental_id = rental.id,
            car_id = car.id,
            user_id = caller.user_id,
            "rental created"
        );

        Ok(rental)
    }

    /// Fetches a rental visible to the caller.
    pub async fn find_rental(&self, rental_id: i64, caller: &Caller) -> Result<Rental> {
        let rental = self
            .rentals
            .find_rental(rental_id)
            .await?
            .ok_or(AppError::NotFound("rental"))?;
        auth::ensure_can_view(&rental, caller)?;
        Ok(rental)
    }

    /// Lists rentals by activity, scoped to the caller's authority.
    pub async fn list_rentals(
        &self,
        user_id: Option<i64>,
        is_active: bool,
        caller: &Caller,
    ) -> Result<Vec<Rental>> {
        let scope = auth::resolve_user_scope(user_id, caller)?;
        let status = if is_active {
            RentalStatus::Active
        } else {
            RentalStatus::Returned
        };
        self.rentals.list_rentals(scope, status).await
    }

    /// Returns a rental: flips ACTIVE -> RETURNED and releases the unit.
    ///
    /// The flip is atomic at the storage layer, so of any number of
    /// concurrent return calls exactly one proceeds to the release; the
    /// rest see `AlreadyReturned`. A release failure after the flip cannot
    /// be rolled back (the transition is one-way) and is logged for manual
    /// reconciliation.
    pub async fn return_rental(&self, rental_id: i64, caller: &Caller) -> Result<Rental> {
        let rental = self
            .rentals
            .find_rental(rental_id)
            .await?
            .ok_or(AppError::NotFound("rental"))?;
        auth::ensure_can_view(&rental, caller)?;

        let returned = match self
            .rentals
            .complete_rental(rental_id, Utc::now().date_naive())
            .await?
        {
            RentalTransition::Returned(rental) => rental,
            RentalTransition::AlreadyReturned => {
                return Err(AppError::AlreadyReturned(rental_id))
            }
            RentalTransition::NotFound => return Err(AppError::NotFound("rental")),
        };

        match self.inventory.release_unit(returned.car_id).await {
            Ok(remaining) => {
                tracing::info!(
                    rental_id,
                    car_id = returned.car_id,
                    remaining,
                    "rental returned"
                );
            }
            Err(err) => {
                tracing::error!(
                    rental_id,
                    car_id = returned.car_id,
                    error = %err,
                    "rental marked returned but unit release failed; manual reconciliation required"
                );
                return Err(err);
            }
        }

        Ok(returned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CarType, NewCar};
    use crate::services::notifier::MockNotifier;
    use crate::storage::InMemoryStore;
    use async_trait::async_trait;
    use chrono::{Days, NaiveDate};
    use rust_decimal_macros::dec;
    use tokio::sync::Barrier;

    struct Fixture {
        store: Arc<InMemoryStore>,
        notifier: Arc<MockNotifier>,
        lifecycle: RentalLifecycle,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let notifier = Arc::new(MockNotifier::new());
        let inventory = InventoryLedger::new(store.clone());
        let lifecycle = RentalLifecycle::new(
            store.clone(),
            store.clone(),
            inventory,
            notifier.clone(),
        );
        Fixture {
            store,
            notifier,
            lifecycle,
        }
    }

    async fn seed_car(store: &InMemoryStore, inventory: i64) -> i64 {
        store
            .insert_car(NewCar {
                brand: "Volkswagen".to_string(),
                model: "Golf".to_string(),
                car_type: CarType::Hatchback,
                daily_fee: dec!(50.00),
                inventory,
            })
            .await
            .unwrap()
            .id
    }

    fn next_week() -> NaiveDate {
        Utc::now().date_naive() + Days::new(7)
    }

    #[tokio::test]
    async fn create_reserves_a_unit_and_notifies() {
        let fx = fixture();
        let car_id = seed_car(&fx.store, 2).await;

        let rental = fx
            .lifecycle
            .create_rental(
                &CreateRentalRequest {
                    car_id,
                    return_date: next_week(),
                },
                &Caller::customer(5),
            )
            .await
            .unwrap();

        assert_eq!(rental.status, RentalStatus::Active);
        assert_eq!(rental.user_id, 5);
        assert_eq!(rental.actual_return_date, None);
        assert_eq!(fx.store.find_car(car_id).await.unwrap().unwrap().inventory, 1);

        let messages = fx.notifier.messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].starts_with("New rental created"));
        assert!(messages[0].contains("Inventory left: 1"));
    }

    #[tokio::test]
    async fn create_fails_without_inventory() {
        let fx = fixture();
        let car_id = seed_car(&fx.store, 0).await;

        let err = fx
            .lifecycle
            .create_rental(
                &CreateRentalRequest {
                    car_id,
                    return_date: next_week(),
                },
                &Caller::customer(5),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::NoInventoryAvailable(_)));
        assert!(fx
            .lifecycle
            .list_rentals(None, true, &Caller::customer(5))
            .await
            .unwrap()
            .is_empty());
        assert_eq!(fx.notifier.sent_count(), 0);
    }

    #[tokio::test]
    async fn create_rejects_past_return_date() {
        let fx = fixture();
        let car_id = seed_car(&fx.store, 1).await;

        let err = fx
            .lifecycle
            .create_rental(
                &CreateRentalRequest {
                    car_id,
                    return_date: Utc::now().date_naive(),
                },
                &Caller::customer(5),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Validation(_)));
        // nothing was reserved
        assert_eq!(fx.store.find_car(car_id).await.unwrap().unwrap().inventory, 1);
    }

    /// Rental store whose writes always fail, for the compensation path.
    struct FailingRentalStore;

    #[async_trait]
    impl RentalStore for FailingRentalStore {
        async fn insert_rental(&self, _rental: NewRental) -> Result<Rental> {
            Err(AppError::Storage(anyhow::anyhow!("write failed")))
        }

        async fn find_rental(&self, _id: i64) -> Result<Option<Rental>> {
            Ok(None)
        }

        async fn list_rentals(
            &self,
            _user_id: Option<i64>,
            _status: RentalStatus,
        ) -> Result<Vec<Rental>> {
            Ok(Vec::new())
        }

        async fn complete_rental(
            &self,
            _id: i64,
            _returned_on: NaiveDate,
        ) -> Result<RentalTransition> {
            Ok(RentalTransition::NotFound)
        }

        async fn find_due_between(
            &self,
            _from: NaiveDate,
            _to: NaiveDate,
        ) -> Result<Vec<Rental>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn failed_rental_write_releases_the_reservation() {
        let store = Arc::new(InMemoryStore::new());
        let car_id = seed_car(&store, 1).await;
        let notifier = Arc::new(MockNotifier::new());
        let lifecycle = RentalLifecycle::new(
            store.clone(),
            Arc::new(FailingRentalStore),
            InventoryLedger::new(store.clone()),
            notifier.clone(),
        );

        let err = lifecycle
            .create_rental(
                &CreateRentalRequest {
                    car_id,
                    return_date: next_week(),
                },
                &Caller::customer(5),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Storage(_)));
        assert_eq!(store.find_car(car_id).await.unwrap().unwrap().inventory, 1);
        assert_eq!(notifier.sent_count(), 0);
    }

    #[tokio::test]
    async fn return_is_guarded_against_repeats() {
        let fx = fixture();
        let car_id = seed_car(&fx.store, 1).await;
        let caller = Caller::customer(5);

        let rental = fx
            .lifecycle
            .create_rental(
                &CreateRentalRequest {
                    car_id,
                    return_date: next_week(),
                },
                &caller,
            )
            .await
            .unwrap();
        assert_eq!(fx.store.find_car(car_id).await.unwrap().unwrap().inventory, 0);

        let returned = fx.lifecycle.return_rental(rental.id, &caller).await.unwrap();
        assert_eq!(returned.status, RentalStatus::Returned);
        assert!(returned.actual_return_date.is_some());
        assert_eq!(fx.store.find_car(car_id).await.unwrap().unwrap().inventory, 1);

        let err = fx
            .lifecycle
            .return_rental(rental.id, &caller)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::AlreadyReturned(_)));
        // no further inventory mutation
        assert_eq!(fx.store.find_car(car_id).await.unwrap().unwrap().inventory, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_returns_release_exactly_one_unit() {
        let fx = fixture();
        let car_id = seed_car(&fx.store, 1).await;
        let caller = Caller::customer(5);

        let rental = fx
            .lifecycle
            .create_rental(
                &CreateRentalRequest {
                    car_id,
                    return_date: next_week(),
                },
                &caller,
            )
            .await
            .unwrap();

        let barrier = Arc::new(Barrier::new(4));
        let mut handles = Vec::new();
        for _ in 0..4 {
            let lifecycle = fx.lifecycle.clone();
            let barrier = barrier.clone();
            let rental_id = rental.id;
            handles.push(tokio::spawn(async move {
                barrier.wait().await;
                lifecycle.return_rental(rental_id, &caller).await
            }));
        }

        let mut successes = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => successes += 1,
                Err(AppError::AlreadyReturned(_)) => {}
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(successes, 1);
        assert_eq!(fx.store.find_car(car_id).await.unwrap().unwrap().inventory, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn last_unit_goes_to_exactly_one_of_two_concurrent_creates() {
        let fx = fixture();
        let car_id = seed_car(&fx.store, 1).await;

        let barrier = Arc::new(Barrier::new(2));
        let mut handles = Vec::new();
        for user_id in [5, 6] {
            let lifecycle = fx.lifecycle.clone();
            let barrier = barrier.clone();
            handles.push(tokio::spawn(async move {
                barrier.wait().await;
                lifecycle
                    .create_rental(
                        &CreateRentalRequest {
                            car_id,
                            return_date: Utc::now().date_naive() + Days::new(7),
                        },
                        &Caller::customer(user_id),
                    )
                    .await
            }));
        }

        let mut created = 0;
        let mut refused = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => created += 1,
                Err(AppError::NoInventoryAvailable(_)) => refused += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!((created, refused), (1, 1));
        assert_eq!(fx.store.find_car(car_id).await.unwrap().unwrap().inventory, 0);
    }

    #[tokio::test]
    async fn lookup_enforces_ownership() {
        let fx = fixture();
        let car_id = seed_car(&fx.store, 1).await;
        let owner = Caller::customer(5);

        let rental = fx
            .lifecycle
            .create_rental(
                &CreateRentalRequest {
                    car_id,
                    return_date: next_week(),
                },
                &owner,
            )
            .await
            .unwrap();

        let err = fx
            .lifecycle
            .find_rental(rental.id, &Caller::customer(6))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));

        assert_eq!(
            fx.lifecycle
                .find_rental(rental.id, &Caller::manager(99))
                .await
                .unwrap()
                .id,
            rental.id
        );
    }

    #[tokio::test]
    async fn listing_scopes_to_the_caller() {
        let fx = fixture();
        let car_id = seed_car(&fx.store, 5).await;
        for user_id in [5, 5, 6] {
            fx.lifecycle
                .create_rental(
                    &CreateRentalRequest {
                        car_id,
                        return_date: next_week(),
                    },
                    &Caller::customer(user_id),
                )
                .await
                .unwrap();
        }

        // explicit foreign user id from a customer
        let err = fx
            .lifecycle
            .list_rentals(Some(6), true, &Caller::customer(5))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        // customer with no explicit id sees only their own
        let own = fx
            .lifecycle
            .list_rentals(None, true, &Caller::customer(5))
            .await
            .unwrap();
        assert_eq!(own.len(), 2);
        assert!(own.iter().all(|rental| rental.user_id == 5));

        // manager sees everything, or a chosen user
        let all = fx
            .lifecycle
            .list_rentals(None, true, &Caller::manager(99))
            .await
            .unwrap();
        assert_eq!(all.len(), 3);
        let scoped = fx
            .lifecycle
            .list_rentals(Some(6), true, &Caller::manager(99))
            .await
            .unwrap();
        assert_eq!(scoped.len(), 1);
    }
}
