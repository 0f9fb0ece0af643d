use std::{fmt, str::FromStr};

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MAX_NO_SHOWS: i64 = 3;
pub const LATE_CANCELLATION_MINUTES: i64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Available,
    Booked,
    Cancelled,
    Completed,
    Expired,
}

impl AppointmentStatus {
    pub const ALL: [AppointmentStatus; 5] = [
        AppointmentStatus::Available,
        AppointmentStatus::Booked,
        AppointmentStatus::Cancelled,
        AppointmentStatus::Completed,
        AppointmentStatus::Expired,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Available => "available",
            AppointmentStatus::Booked => "booked",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Expired => "expired",
        }
    }

    /// Statuses that represent a service actually delivered (or about to be).
    pub fn is_performed(&self) -> bool {
        matches!(self, AppointmentStatus::Booked | AppointmentStatus::Completed)
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown appointment status '{0}'")]
pub struct UnknownStatus(pub String);

impl FromStr for AppointmentStatus {
    type Err = UnknownStatus;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        AppointmentStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == value.trim())
            .ok_or_else(|| UnknownStatus(value.to_string()))
    }
}

impl TryFrom<String> for AppointmentStatus {
    type Error = UnknownStatus;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Booked,
    Cancelled,
    LateCancellation,
    Completed,
    AccountDisabled,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Booked => "booked",
            NotificationKind::Cancelled => "cancelled",
            NotificationKind::LateCancellation => "late_cancellation",
            NotificationKind::Completed => "completed",
            NotificationKind::AccountDisabled => "account_disabled",
        }
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct User {
    pub id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub birth_date: Option<NaiveDate>,
    pub registered_at: DateTime<Utc>,
    pub enabled: bool,
    pub no_show_count: i64,
    pub is_staff: bool,
    pub is_superuser: bool,
    #[serde(skip_serializing)]
    pub password_hash: String,
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Barber {
    pub id: String,
    pub name: String,
    pub bio: String,
    pub phone: String,
    pub national_id: String,
    pub photo_url: Option<String>,
    pub display_order: i64,
}

/// A photo of a finished cut shown on the barber's profile.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct BarberWork {
    pub id: String,
    pub barber_id: String,
    pub image_url: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SocialLink {
    pub id: String,
    pub barber_id: String,
    pub url: String,
    pub name: String,
    pub display_order: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Service {
    pub id: String,
    pub name: String,
    pub description: String,
    pub price_cents: i64,
    pub image_url: Option<String>,
    pub display_order: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Course {
    pub id: String,
    pub title: String,
    pub day: String,
    pub time: NaiveTime,
    pub description: String,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub price_cents: i64,
    pub image_url: Option<String>,
    pub display_order: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CarouselImage {
    pub id: String,
    pub image_url: String,
    pub display_order: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Appointment {
    pub id: String,
    pub barber_id: String,
    pub client_id: Option<String>,
    pub service_id: Option<String>,
    pub scheduled_at: DateTime<Utc>,
    #[sqlx(try_from = "String")]
    pub status: AppointmentStatus,
    pub final_price_cents: Option<i64>,
}

/// Appointment joined with the names the dashboards and the archive need.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct AppointmentDetail {
    pub id: String,
    pub barber_id: String,
    pub barber_name: String,
    pub client_id: Option<String>,
    pub client_name: Option<String>,
    pub service_id: Option<String>,
    pub service_name: Option<String>,
    pub service_price_cents: Option<i64>,
    pub scheduled_at: DateTime<Utc>,
    #[sqlx(try_from = "String")]
    pub status: AppointmentStatus,
    pub final_price_cents: Option<i64>,
}

impl AppointmentDetail {
    /// Price charged for the visit: the booking snapshot, else the current service price.
    pub fn price_cents(&self) -> i64 {
        self.final_price_cents
            .or(self.service_price_cents)
            .unwrap_or(0)
    }
}

pub const APPOINTMENT_DETAIL_SELECT: &str = r#"SELECT a.id, a.barber_id, b.name AS barber_name,
                  a.client_id, (u.first_name || ' ' || u.last_name) AS client_name,
                  a.service_id, s.name AS service_name, s.price_cents AS service_price_cents,
                  a.scheduled_at, a.status, a.final_price_cents
           FROM appointments a
           JOIN barbers b ON a.barber_id = b.id
           LEFT JOIN users u ON a.client_id = u.id
           LEFT JOIN services s ON a.service_id = s.id"#;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Notification {
    pub id: String,
    pub appointment_id: Option<String>,
    pub kind: String,
    pub message: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

pub const ARCHIVE_KIND_INDIVIDUAL: &str = "individual";
pub const ARCHIVE_KIND_HISTORY: &str = "history";

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ArchiveFileSummary {
    pub id: String,
    pub file_name: String,
    pub kind: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub period_start: Option<NaiveDate>,
    pub period_end: Option<NaiveDate>,
    pub appointment_count: i64,
    pub size_bytes: i64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ArchiveFileContent {
    pub file_name: String,
    pub content: Vec<u8>,
}

pub fn format_money(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let cents = cents.abs();
    let whole = (cents / 100).to_string();
    let mut grouped = String::new();
    for (index, ch) in whole.chars().enumerate() {
        if index > 0 && (whole.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    format!("{sign}${grouped}.{:02}", cents % 100)
}
