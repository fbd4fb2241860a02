//! Inventory ledger: the single gate through which a car's available-unit
//! count is changed.

use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::storage::{CarStore, InventoryUpdate};

#[derive(Clone)]
pub struct InventoryLedger {
    cars: Arc<dyn CarStore>,
}

impl InventoryLedger {
    pub fn new(cars: Arc<dyn CarStore>) -> Self {
        Self { cars }
    }

    /// Reserves one unit. The decrement only happens while the persisted
    /// count is positive, so concurrent reservations against the last unit
    /// resolve to exactly one success.
    pub async fn reserve_unit(&self, car_id: i64) -> Result<i64> {
        match self.cars.reserve_unit(car_id).await? {
            InventoryUpdate::Updated { remaining } => {
                tracing::debug!(car_id, remaining, "unit reserved");
                Ok(remaining)
            }
            InventoryUpdate::Depleted => Err(AppError::NoInventoryAvailable(car_id)),
            InventoryUpdate::NotFound => Err(AppError::NotFound("car")),
        }
    }

    /// Releases one unit back into the available count.
    pub async fn release_unit(&self, car_id: i64) -> Result<i64> {
        match self.cars.release_unit(car_id).await? {
            InventoryUpdate::Updated { remaining } => {
                tracing::debug!(car_id, remaining, "unit released");
                Ok(remaining)
            }
            InventoryUpdate::Depleted => Err(AppError::NoInventoryAvailable(car_id)),
            InventoryUpdate::NotFound => Err(AppError::NotFound("car")),
        }
    }
}
