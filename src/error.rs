use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

use crate::models::AppointmentStatus;

/// Rule violations surfaced to the client as a readable message.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BookingError {
    #[error("Your account is not enabled yet. The barbershop must approve it before you can book.")]
    AccountDisabled,

    #[error("This slot is no longer available.")]
    SlotUnavailable,

    #[error("You already have a booked appointment in the week from {week_start} to {week_end}.")]
    WeeklyLimit { week_start: String, week_end: String },

    #[error("You cannot have more than one booking on the same day.")]
    SameDay,

    #[error("Please choose a service for this appointment.")]
    ServiceRequired,

    #[error("Only booked appointments can be cancelled (current status: {0}).")]
    NotCancellable(AppointmentStatus),

    #[error("This appointment does not belong to you.")]
    NotOwner,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Booking(#[from] BookingError),

    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Forbidden(&'static str),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("password hashing failed")]
    PasswordHash,
}

pub type AppResult<T> = Result<T, AppError>;

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Booking(BookingError::NotOwner) => StatusCode::FORBIDDEN,
            AppError::Booking(BookingError::SlotUnavailable)
            | AppError::Booking(BookingError::WeeklyLimit { .. })
            | AppError::Booking(BookingError::SameDay)
            | AppError::Booking(BookingError::NotCancellable(_)) => StatusCode::CONFLICT,
            AppError::Booking(_) | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Database(_) | AppError::PasswordHash => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            log::error!("Request failed: {self}");
            return HttpResponse::build(status).json(json!({ "error": "internal error" }));
        }
        HttpResponse::build(status).json(json!({ "error": self.to_string() }))
    }
}

/// Maps a missing row to `NotFound` and everything else to a database error.
pub fn not_found(entity: &'static str) -> impl FnOnce(sqlx::Error) -> AppError {
    move |err| match err {
        sqlx::Error::RowNotFound => AppError::NotFound(entity),
        other => AppError::Database(other),
    }
}
