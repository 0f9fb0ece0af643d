//! Staff statistics over the live appointments table.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::{
    catalog::get_barber,
    error::AppResult,
    models::{AppointmentStatus, Barber},
};

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ServiceCount {
    pub service_id: String,
    pub service_name: String,
    pub total: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct BarberIncome {
    pub barber_id: String,
    pub barber_name: String,
    pub completed: i64,
    pub income_cents: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct CountFilter {
    pub barber_id: Option<String>,
    pub service_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BarberSummary {
    pub barber: Barber,
    pub total: i64,
    pub by_status: BTreeMap<String, i64>,
    pub income_cents: i64,
}

/// Most requested services, counting every appointment that names one.
pub async fn top_services(pool: &SqlitePool, limit: i64) -> Result<Vec<ServiceCount>, sqlx::Error> {
    sqlx::query_as::<_, ServiceCount>(
        r#"SELECT s.id AS service_id, s.name AS service_name, COUNT(*) AS total
           FROM appointments a
           JOIN services s ON a.service_id = s.id
           GROUP BY s.id, s.name
           ORDER BY total DESC, s.name
           LIMIT ?"#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await
}

/// Income from completed appointments, using the price snapshot taken at booking.
pub async fn income_by_barber(pool: &SqlitePool) -> Result<Vec<BarberIncome>, sqlx::Error> {
    sqlx::query_as::<_, BarberIncome>(
        r#"SELECT b.id AS barber_id, b.name AS barber_name, COUNT(*) AS completed,
                  COALESCE(SUM(COALESCE(a.final_price_cents, s.price_cents, 0)), 0) AS income_cents
           FROM appointments a
           JOIN barbers b ON a.barber_id = b.id
           LEFT JOIN services s ON a.service_id = s.id
           WHERE a.status = ?
           GROUP BY b.id, b.name
           ORDER BY income_cents DESC, b.name"#,
    )
    .bind(AppointmentStatus::Completed.as_str())
    .fetch_all(pool)
    .await
}

pub async fn count_appointments(pool: &SqlitePool, filter: &CountFilter) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(
        r#"SELECT COUNT(*) FROM appointments
           WHERE (? IS NULL OR barber_id = ?) AND (? IS NULL OR service_id = ?)"#,
    )
    .bind(&filter.barber_id)
    .bind(&filter.barber_id)
    .bind(&filter.service_id)
    .bind(&filter.service_id)
    .fetch_one(pool)
    .await
}

pub async fn barber_summary(pool: &SqlitePool, barber_id: &str) -> AppResult<BarberSummary> {
    let barber = get_barber(pool, barber_id).await?;

    let rows = sqlx::query_as::<_, (String, i64)>(
        "SELECT status, COUNT(*) FROM appointments WHERE barber_id = ? GROUP BY status",
    )
    .bind(&barber.id)
    .fetch_all(pool)
    .await?;

    let mut by_status: BTreeMap<String, i64> = AppointmentStatus::ALL
        .iter()
        .map(|status| (status.to_string(), 0))
        .collect();
    for (status, count) in rows {
        by_status.insert(status, count);
    }

    let income_cents = sqlx::query_scalar::<_, i64>(
        r#"SELECT COALESCE(SUM(COALESCE(a.final_price_cents, s.price_cents, 0)), 0)
           FROM appointments a
           LEFT JOIN services s ON a.service_id = s.id
           WHERE a.barber_id = ? AND a.status = ?"#,
    )
    .bind(&barber.id)
    .bind(AppointmentStatus::Completed.as_str())
    .fetch_one(pool)
    .await?;

    Ok(BarberSummary {
        total: by_status.values().sum(),
        barber,
        by_status,
        income_cents,
    })
}
