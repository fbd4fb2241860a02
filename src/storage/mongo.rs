//! MongoDB-backed store.
//!
//! Conditional transitions are expressed as filtered `find_one_and_update`
//! calls so the check and the write are a single server-side operation:
//! reserve is "decrement where inventory > 0", the return flip is
//! "set RETURNED where status = ACTIVE", settlement is
//! "set PAID where status = PENDING".

use async_trait::async_trait;
use chrono::NaiveDate;
use futures::TryStreamExt;
use mongodb::bson::{doc, Document};
use mongodb::options::{FindOneAndUpdateOptions, FindOptions, IndexOptions, ReturnDocument};
use mongodb::{Collection, Database, IndexModel};

use crate::error::{AppError, Result};
use crate::models::{
    Car, NewCar, NewPayment, NewRental, Payment, PaymentStatus, PaymentType, Rental, RentalStatus,
};
use crate::storage::{
    CarStore, InventoryUpdate, PaymentStore, PaymentTransition, RentalStore, RentalTransition,
};

#[derive(Clone)]
pub struct MongoStore {
    cars: Collection<Car>,
    rentals: Collection<Rental>,
    payments: Collection<Payment>,
    counters: Collection<Document>,
}

impl MongoStore {
    pub fn new(db: &Database) -> Self {
        Self {
            cars: db.collection("cars"),
            rentals: db.collection("rentals"),
            payments: db.collection("payments"),
            counters: db.collection("counters"),
        }
    }

    pub async fn init_indexes(&self) -> Result<()> {
        let rentals_by_user = IndexModel::builder()
            .keys(doc! { "user_id": 1, "status": 1 })
            .options(
                IndexOptions::builder()
                    .name("user_status_rental_idx".to_string())
                    .build(),
            )
            .build();

        let rentals_by_due_date = IndexModel::builder()
            .keys(doc! { "status": 1, "return_date": 1 })
            .options(
                IndexOptions::builder()
                    .name("status_return_date_rental_idx".to_string())
                    .build(),
            )
            .build();

        self.rentals
            .create_indexes([rentals_by_user, rentals_by_due_date], None)
            .await?;

        let payments_by_rental = IndexModel::builder()
            .keys(doc! { "rental_id": 1, "type": 1 })
            .options(
                IndexOptions::builder()
                    .name("rental_type_payment_idx".to_string())
                    .build(),
            )
            .build();

        self.payments
            .create_indexes([payments_by_rental], None)
            .await?;

        tracing::info!("rental service indexes initialized");
        Ok(())
    }

    /// Next value of a named sequence; ids are numeric by contract, so the
    /// usual counters-collection pattern stands in for ObjectId.
    async fn next_id(&self, sequence: &str) -> Result<i64> {
        let options = FindOneAndUpdateOptions::builder()
            .upsert(true)
            .return_document(ReturnDocument::After)
            .build();

        let counter = self
            .counters
            .find_one_and_update(
                doc! { "_id": sequence },
                doc! { "$inc": { "seq": 1_i64 } },
                options,
            )
            .await?
            .ok_or_else(|| {
                AppError::Storage(anyhow::anyhow!("sequence `{sequence}` missing after upsert"))
            })?;

        counter
            .get_i64("seq")
            .map_err(|err| AppError::Storage(anyhow::Error::new(err)))
    }
}

#[async_trait]
impl CarStore for MongoStore {
    async fn insert_car(&self, car: NewCar) -> Result<Car> {
        let car = Car {
            id: self.next_id("cars").await?,
            brand: car.brand,
            model: car.model,
            car_type: car.car_type,
            daily_fee: car.daily_fee,
            inventory: car.inventory,
            is_deleted: false,
        };
        self.cars.insert_one(&car, None).await?;
        Ok(car)
    }

    async fn find_car(&self, id: i64) -> Result<Option<Car>> {
        let car = self
            .cars
            .find_one(doc! { "_id": id, "is_deleted": false }, None)
            .await?;
        Ok(car)
    }

    async fn reserve_unit(&self, id: i64) -> Result<InventoryUpdate> {
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();

        let updated = self
            .cars
            .find_one_and_update(
                doc! { "_id": id, "is_deleted": false, "inventory": { "$gt": 0 } },
                doc! { "$inc": { "inventory": -1_i64 } },
                options,
            )
            .await?;

        match updated {
            Some(car) => Ok(InventoryUpdate::Updated {
                remaining: car.inventory,
            }),
            None => {
                let exists = self.find_car(id).await?.is_some();
                if exists {
                    Ok(InventoryUpdate::Depleted)
                } else {
                    Ok(InventoryUpdate::NotFound)
                }
            }
        }
    }

    async fn release_unit(&self, id: i64) -> Result<InventoryUpdate> {
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();

        let updated = self
            .cars
            .find_one_and_update(
                doc! { "_id": id, "is_deleted": false },
                doc! { "$inc": { "inventory": 1_i64 } },
                options,
            )
            .await?;

        match updated {
            Some(car) => Ok(InventoryUpdate::Updated {
                remaining: car.inventory,
            }),
            None => Ok(InventoryUpdate::NotFound),
        }
    }

    async fn soft_delete_car(&self, id: i64) -> Result<bool> {
        let result = self
            .cars
            .update_one(
                doc! { "_id": id, "is_deleted": false },
                doc! { "$set": { "is_deleted": true } },
                None,
            )
            .await?;
        Ok(result.modified_count == 1)
    }
}

#[async_trait]
impl RentalStore for MongoStore {
    async fn insert_rental(&self, rental: NewRental) -> Result<Rental> {
        let rental = Rental {
            id: self.next_id("rentals").await?,
            car_id: rental.car_id,
            user_id: rental.user_id,
            rental_date: rental.rental_date,
            return_date: rental.return_date,
            actual_return_date: None,
            status: RentalStatus::Active,
            is_deleted: false,
        };
        self.rentals.insert_one(&rental, None).await?;
        Ok(rental)
    }

    async fn find_rental(&self, id: i64) -> Result<Option<Rental>> {
        let rental = self
            .rentals
            .find_one(doc! { "_id": id, "is_deleted": false }, None)
            .await?;
        Ok(rental)
    }

    async fn list_rentals(
        &self,
        user_id: Option<i64>,
        status: RentalStatus,
    ) -> Result<Vec<Rental>> {
        let mut filter = doc! { "is_deleted": false, "status": status.to_string() };
        if let Some(user_id) = user_id {
            filter.insert("user_id", user_id);
        }

        let options = FindOptions::builder().sort(doc! { "_id": 1 }).build();
        let cursor = self.rentals.find(filter, options).await?;
        let rentals: Vec<Rental> = cursor.try_collect().await?;
        Ok(rentals)
    }

    async fn complete_rental(&self, id: i64, returned_on: NaiveDate) -> Result<RentalTransition> {
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();

        let updated = self
            .rentals
            .find_one_and_update(
                doc! {
                    "_id": id,
                    "is_deleted": false,
                    "status": RentalStatus::Active.to_string(),
                },
                doc! {
                    "$set": {
                        "status": RentalStatus::Returned.to_string(),
                        "actual_return_date": returned_on.to_string(),
                    }
                },
                options,
            )
            .await?;

        match updated {
            Some(rental) => Ok(RentalTransition::Returned(rental)),
            None => {
                if self.find_rental(id).await?.is_some() {
                    Ok(RentalTransition::AlreadyReturned)
                } else {
                    Ok(RentalTransition::NotFound)
                }
            }
        }
    }

    async fn find_due_between(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<Rental>> {
        // Dates are persisted as ISO-8601 strings, which order correctly
        // under lexicographic comparison.
        let filter = doc! {
            "is_deleted": false,
            "status": RentalStatus::Active.to_string(),
            "return_date": { "$gte": from.to_string(), "$lte": to.to_string() },
        };

        let options = FindOptions::builder().sort(doc! { "_id": 1 }).build();
        let cursor = self.rentals.find(filter, options).await?;
        let rentals: Vec<Rental> = cursor.try_collect().await?;
        Ok(rentals)
    }
}

#[async_trait]
impl PaymentStore for MongoStore {
    async fn insert_payment(&self, payment: NewPayment) -> Result<Payment> {
        let payment = Payment {
            id: self.next_id("payments").await?,
            rental_id: payment.rental_id,
            session_id: payment.session_id,
            session_url: payment.session_url,
            amount_to_pay: payment.amount_to_pay,
            status: PaymentStatus::Pending,
            payment_type: payment.payment_type,
            is_deleted: false,
        };
        self.payments.insert_one(&payment, None).await?;
        Ok(payment)
    }

    async fn find_payment(
        &self,
        rental_id: i64,
        payment_type: PaymentType,
    ) -> Result<Option<Payment>> {
        let filter = doc! {
            "is_deleted": false,
            "rental_id": rental_id,
            "type": payment_type.to_string(),
        };
        let options = FindOptions::builder()
            .sort(doc! { "_id": -1 })
            .limit(1)
            .build();
        let cursor = self.payments.find(filter, options).await?;
        let mut payments: Vec<Payment> = cursor.try_collect().await?;
        Ok(payments.pop())
    }

    async fn list_payments(&self, user_id: Option<i64>) -> Result<Vec<Payment>> {
        let mut filter = doc! { "is_deleted": false };

        if let Some(user_id) = user_id {
            let cursor = self
                .rentals
                .find(doc! { "is_deleted": false, "user_id": user_id }, None)
                .await?;
            let rentals: Vec<Rental> = cursor.try_collect().await?;
            let rental_ids: Vec<i64> = rentals.into_iter().map(|rental| rental.id).collect();
            filter.insert("rental_id", doc! { "$in": rental_ids });
        }

        let options = FindOptions::builder().sort(doc! { "_id": 1 }).build();
        let cursor = self.payments.find(filter, options).await?;
        let payments: Vec<Payment> = cursor.try_collect().await?;
        Ok(payments)
    }

    async fn mark_paid(&self, id: i64) -> Result<PaymentTransition> {
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();

        let updated = self
            .payments
            .find_one_and_update(
                doc! {
                    "_id": id,
                    "is_deleted": false,
                    "status": PaymentStatus::Pending.to_string(),
                },
                doc! { "$set": { "status": PaymentStatus::Paid.to_string() } },
                options,
            )
            .await?;

        match updated {
            Some(payment) => Ok(PaymentTransition::Paid(payment)),
            None => {
                let existing = self
                    .payments
                    .find_one(doc! { "_id": id, "is_deleted": false }, None)
                    .await?;
                match existing {
                    Some(payment) if payment.status == PaymentStatus::Paid => {
                        Ok(PaymentTransition::AlreadyPaid(payment))
                    }
                    Some(_) => Ok(PaymentTransition::NotFound),
                    None => Ok(PaymentTransition::NotFound),
                }
            }
        }
    }
}
