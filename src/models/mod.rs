use std::fmt;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A car in the fleet. `inventory` is the live available-unit count and is
/// mutated only through the inventory ledger; it never goes negative.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Car {
    #[serde(rename = "_id")]
    pub id: i64,
    pub brand: String,
    pub model: String,
    #[serde(rename = "type")]
    pub car_type: CarType,
    pub daily_fee: Decimal,
    pub inventory: i64,
    pub is_deleted: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CarType {
    Sedan,
    Suv,
    Hatchback,
    Universal,
}

/// Input for inserting a new car; the store assigns the id.
#[derive(Debug, Clone)]
pub struct NewCar {
    pub brand: String,
    pub model: String,
    pub car_type: CarType,
    pub daily_fee: Decimal,
    pub inventory: i64,
}

/// A rental of one unit of a car by one user.
///
/// `actual_return_date` is set if and only if `status` is RETURNED; the
/// status transition ACTIVE -> RETURNED is one-way and the car reference is
/// immutable after creation. Rentals are never physically deleted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Rental {
    #[serde(rename = "_id")]
    pub id: i64,
    pub car_id: i64,
    pub user_id: i64,
    pub rental_date: NaiveDate,
    pub return_date: NaiveDate,
    pub actual_return_date: Option<NaiveDate>,
    pub status: RentalStatus,
    pub is_deleted: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RentalStatus {
    Active,
    Returned,
}

#[derive(Debug, Clone)]
pub struct NewRental {
    pub car_id: i64,
    pub user_id: i64,
    pub rental_date: NaiveDate,
    pub return_date: NaiveDate,
}

/// A payment session opened against a rental. Status flips PENDING -> PAID
/// once and only once, upon confirmed external settlement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Payment {
    #[serde(rename = "_id")]
    pub id: i64,
    pub rental_id: i64,
    pub session_id: String,
    pub session_url: String,
    pub amount_to_pay: Decimal,
    pub status: PaymentStatus,
    #[serde(rename = "type")]
    pub payment_type: PaymentType,
    pub is_deleted: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Paid,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentType {
    Payment,
    Fine,
}

#[derive(Debug, Clone)]
pub struct NewPayment {
    pub rental_id: i64,
    pub payment_type: PaymentType,
    pub amount_to_pay: Decimal,
    pub session_id: String,
    pub session_url: String,
}

impl fmt::Display for CarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CarType::Sedan => "SEDAN",
            CarType::Suv => "SUV",
            CarType::Hatchback => "HATCHBACK",
            CarType::Universal => "UNIVERSAL",
        };
        f.write_str(name)
    }
}

impl fmt::Display for RentalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RentalStatus::Active => "ACTIVE",
            RentalStatus::Returned => "RETURNED",
        };
        f.write_str(name)
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Paid => "PAID",
        };
        f.write_str(name)
    }
}

impl fmt::Display for PaymentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PaymentType::Payment => "PAYMENT",
            PaymentType::Fine => "FINE",
        };
        f.write_str(name)
    }
}

// The Display formats below are the texts forwarded to the notification
// channel, so their shape is part of the outward-facing behavior.

impl fmt::Display for Car {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Car ID: {}\nBrand: {}\nModel: {}\nType: {}\nDaily fee: ${}\nInventory left: {}",
            self.id, self.brand, self.model, self.car_type, self.daily_fee, self.inventory
        )
    }
}

impl fmt::Display for Rental {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total_days = (self.return_date - self.rental_date).num_days();
        write!(
            f,
            "Rental ID: {}\nCar ID: {}\nUser ID: {}\nStart date: {}\nReturn date: {}\nTotal days: {}\nStatus: {}",
            self.id,
            self.car_id,
            self.user_id,
            self.rental_date,
            self.return_date,
            total_days,
            self.status
        )
    }
}
