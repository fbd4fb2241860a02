//! Caller context and authorization checks.
//!
//! Identity is resolved outside the engine; every operation receives an
//! explicit [`Caller`] instead of reading ambient session state.

use crate::error::{AppError, Result};
use crate::models::Rental;

/// The authenticated principal on whose behalf an operation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub user_id: i64,
    pub is_manager: bool,
}

impl Caller {
    pub fn customer(user_id: i64) -> Self {
        Self {
            user_id,
            is_manager: false,
        }
    }

    pub fn manager(user_id: i64) -> Self {
        Self {
            user_id,
            is_manager: true,
        }
    }
}

/// A rental is visible to its owning user and to managers.
pub fn ensure_can_view(rental: &Rental, caller: &Caller) -> Result<()> {
    if caller.is_manager || rental.user_id == caller.user_id {
        Ok(())
    } else {
        Err(AppError::Unauthorized(
            "you are not authorized to view this rental".to_string(),
        ))
    }
}

/// Resolves the user scope of a listing request.
///
/// Managers may pass `None` to list across all users or a specific id to
/// scope to that user. Non-managers are always scoped to themselves and may
/// not name another user.
pub fn resolve_user_scope(requested: Option<i64>, caller: &Caller) -> Result<Option<i64>> {
    if caller.is_manager {
        return Ok(requested);
    }

    match requested {
        Some(user_id) if user_id != caller.user_id => Err(AppError::Forbidden(
            "customers are not authorized to specify a user id".to_string(),
        )),
        _ => Ok(Some(caller.user_id)),
    }
}
