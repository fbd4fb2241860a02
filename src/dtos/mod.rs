use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use validator::{Validate, ValidationError};

/// Request payload for opening a rental.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateRentalRequest {
    #[validate(range(min = 1, message = "car_id must be a positive id"))]
    pub car_id: i64,
    #[validate(custom(function = "validate_future_date"))]
    pub return_date: NaiveDate,
}

fn validate_future_date(date: &NaiveDate) -> Result<(), ValidationError> {
    if *date <= Utc::now().date_naive() {
        let mut error = ValidationError::new("return_date");
        error.message = Some("return date must be strictly in the future".into());
        return Err(error);
    }
    Ok(())
}
