//! Appointment lifecycle: booking rules, cancellation penalties, staff status
//! changes and the slot sweeps.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::{
    auth::new_id,
    db::{fetch_appointment_detail, record_notification},
    error::{not_found, AppError, AppResult, BookingError},
    models::{
        AppointmentDetail, AppointmentStatus, Notification, NotificationKind, Service, User,
        APPOINTMENT_DETAIL_SELECT, LATE_CANCELLATION_MINUTES, MAX_NO_SHOWS,
    },
};

const DATE_FORMAT: &str = "%d/%m/%Y";
const DATE_TIME_FORMAT: &str = "%d/%m/%Y %H:%M";
const MAX_SLOT_BATCH_DAYS: i64 = 366;

/// Monday and Sunday of the calendar week containing `date`.
pub fn week_bounds(date: NaiveDate) -> (NaiveDate, NaiveDate) {
    let start = date - Duration::days(i64::from(date.weekday().num_days_from_monday()));
    (start, start + Duration::days(6))
}

pub fn local_date(at: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    at.with_timezone(&offset).date_naive()
}

/// UTC instant of local midnight at the start of `date`.
pub fn local_midnight(date: NaiveDate, offset: FixedOffset) -> DateTime<Utc> {
    let local = date.and_time(NaiveTime::MIN);
    (local - Duration::seconds(i64::from(offset.local_minus_utc()))).and_utc()
}

/// Half-open UTC interval covering `days` local calendar days starting at `start`.
pub fn local_range(
    start: NaiveDate,
    days: i64,
    offset: FixedOffset,
) -> (DateTime<Utc>, DateTime<Utc>) {
    (
        local_midnight(start, offset),
        local_midnight(start + Duration::days(days), offset),
    )
}

fn format_local(at: DateTime<Utc>, offset: FixedOffset) -> String {
    at.with_timezone(&offset).format(DATE_TIME_FORMAT).to_string()
}

#[derive(Debug, Clone, Serialize)]
pub struct BookingOutcome {
    pub appointment: AppointmentDetail,
    #[serde(skip)]
    pub notifications: Vec<Notification>,
}

async fn count_booked_between(
    pool: &SqlitePool,
    client_id: &str,
    except_id: &str,
    (from, until): (DateTime<Utc>, DateTime<Utc>),
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(
        r#"SELECT COUNT(*) FROM appointments
           WHERE client_id = ? AND id <> ? AND status = ? AND scheduled_at >= ? AND scheduled_at < ?"#,
    )
    .bind(client_id)
    .bind(except_id)
    .bind(AppointmentStatus::Booked.as_str())
    .bind(from)
    .bind(until)
    .fetch_one(pool)
    .await
}

/// One booked appointment per local day and per Monday–Sunday week.
/// `appointment_id` itself is not counted.
async fn check_booking_limits(
    pool: &SqlitePool,
    client_id: &str,
    appointment_id: &str,
    scheduled_at: DateTime<Utc>,
    offset: FixedOffset,
) -> AppResult<()> {
    let day = local_date(scheduled_at, offset);
    if count_booked_between(pool, client_id, appointment_id, local_range(day, 1, offset)).await? > 0 {
        return Err(BookingError::SameDay.into());
    }

    let (week_start, week_end) = week_bounds(day);
    let week = local_range(week_start, 7, offset);
    if count_booked_between(pool, client_id, appointment_id, week).await? > 0 {
        return Err(BookingError::WeeklyLimit {
            week_start: week_start.format(DATE_FORMAT).to_string(),
            week_end: week_end.format(DATE_FORMAT).to_string(),
        }
        .into());
    }
    Ok(())
}

/// Turns an available slot into a booking for `client_id`.
///
/// Rejected when the account is disabled, the slot is no longer available,
/// the client already holds a booked appointment that local day, or anywhere
/// in the same Monday–Sunday week. There is no row lock: two clients racing
/// for the same slot both pass the availability check and the last UPDATE wins.
pub async fn book_slot(
    pool: &SqlitePool,
    client_id: &str,
    slot_id: &str,
    service_id: Option<&str>,
    offset: FixedOffset,
) -> AppResult<BookingOutcome> {
    let client = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(client_id)
        .fetch_one(pool)
        .await
        .map_err(not_found("user"))?;
    if !client.enabled {
        return Err(BookingError::AccountDisabled.into());
    }

    let slot = fetch_appointment_detail(pool, slot_id)
        .await?
        .ok_or(AppError::NotFound("appointment"))?;
    if slot.status != AppointmentStatus::Available {
        return Err(BookingError::SlotUnavailable.into());
    }

    check_booking_limits(pool, client_id, &slot.id, slot.scheduled_at, offset).await?;

    let service_id = service_id
        .filter(|id| !id.trim().is_empty())
        .or(slot.service_id.as_deref())
        .ok_or(BookingError::ServiceRequired)?;
    let service = sqlx::query_as::<_, Service>("SELECT * FROM services WHERE id = ?")
        .bind(service_id)
        .fetch_one(pool)
        .await
        .map_err(not_found("service"))?;

    let mut tx = pool.begin().await?;
    sqlx::query(
        r#"UPDATE appointments
           SET client_id = ?, status = ?, service_id = ?, final_price_cents = ?
           WHERE id = ?"#,
    )
    .bind(&client.id)
    .bind(AppointmentStatus::Booked.as_str())
    .bind(&service.id)
    .bind(service.price_cents)
    .bind(&slot.id)
    .execute(&mut *tx)
    .await?;

    let notification = record_notification(
        &mut tx,
        Some(&slot.id),
        NotificationKind::Booked,
        &format!(
            "{} booked {} with {} on {}.",
            client.full_name(),
            service.name,
            slot.barber_name,
            format_local(slot.scheduled_at, offset)
        ),
    )
    .await?;
    tx.commit().await?;

    log::info!("Appointment {} booked by {}", slot.id, client.email);

    let appointment = fetch_appointment_detail(pool, &slot.id)
        .await?
        .ok_or(AppError::NotFound("appointment"))?;
    Ok(BookingOutcome {
        appointment,
        notifications: vec![notification],
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct CancellationOutcome {
    pub appointment_id: String,
    pub late: bool,
    pub no_show_count: i64,
    pub account_disabled: bool,
    #[serde(skip)]
    pub notifications: Vec<Notification>,
}

/// Client-initiated cancellation of a booked appointment.
///
/// With less than an hour to go the client's no-show counter goes up by one;
/// reaching `MAX_NO_SHOWS` disables the account until staff re-enable it.
pub async fn cancel_appointment(
    pool: &SqlitePool,
    client_id: &str,
    appointment_id: &str,
    now: DateTime<Utc>,
    offset: FixedOffset,
) -> AppResult<CancellationOutcome> {
    let appointment = fetch_appointment_detail(pool, appointment_id)
        .await?
        .ok_or(AppError::NotFound("appointment"))?;
    if appointment.client_id.as_deref() != Some(client_id) {
        return Err(BookingError::NotOwner.into());
    }
    if appointment.status != AppointmentStatus::Booked {
        return Err(BookingError::NotCancellable(appointment.status).into());
    }

    let client = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(client_id)
        .fetch_one(pool)
        .await
        .map_err(not_found("user"))?;

    let late = appointment.scheduled_at - now < Duration::minutes(LATE_CANCELLATION_MINUTES);
    let when = format_local(appointment.scheduled_at, offset);

    let mut tx = pool.begin().await?;
    sqlx::query("UPDATE appointments SET status = ? WHERE id = ?")
        .bind(AppointmentStatus::Cancelled.as_str())
        .bind(&appointment.id)
        .execute(&mut *tx)
        .await?;

    let mut notifications = Vec::new();
    let mut no_show_count = client.no_show_count;
    let mut account_disabled = false;

    if late {
        no_show_count = sqlx::query_scalar::<_, i64>(
            r#"UPDATE users SET no_show_count = MIN(no_show_count + 1, ?)
               WHERE id = ?
               RETURNING no_show_count"#,
        )
        .bind(MAX_NO_SHOWS)
        .bind(&client.id)
        .fetch_one(&mut *tx)
        .await?;

        notifications.push(
            record_notification(
                &mut tx,
                Some(&appointment.id),
                NotificationKind::LateCancellation,
                &format!(
                    "Late cancellation: {} cancelled the {} appointment with {} with less than one hour notice (no-shows: {}/{}).",
                    client.full_name(),
                    when,
                    appointment.barber_name,
                    no_show_count,
                    MAX_NO_SHOWS
                ),
            )
            .await?,
        );

        if no_show_count >= MAX_NO_SHOWS {
            sqlx::query("UPDATE users SET enabled = 0 WHERE id = ?")
                .bind(&client.id)
                .execute(&mut *tx)
                .await?;
            // Only reported when this cancellation is what disabled the account.
            account_disabled = client.enabled;
            if account_disabled {
                notifications.push(
                    record_notification(
                        &mut tx,
                        None,
                        NotificationKind::AccountDisabled,
                        &format!(
                            "{} ({}) reached {} late cancellations and was disabled.",
                            client.full_name(),
                            client.email,
                            MAX_NO_SHOWS
                        ),
                    )
                    .await?,
                );
            }
        }
    } else {
        notifications.push(
            record_notification(
                &mut tx,
                Some(&appointment.id),
                NotificationKind::Cancelled,
                &format!(
                    "{} cancelled the {} appointment with {}.",
                    client.full_name(),
                    when,
                    appointment.barber_name
                ),
            )
            .await?,
        );
    }

    tx.commit().await?;

    if late {
        log::warn!(
            "Late cancellation of {} by {} (no-shows: {no_show_count})",
            appointment.id,
            client.email
        );
    }

    Ok(CancellationOutcome {
        appointment_id: appointment.id,
        late,
        no_show_count,
        account_disabled,
        notifications,
    })
}

/// Staff override of an appointment's status. No no-show penalty is applied
/// here; re-booking still honours the client's day and week limits.
pub async fn set_status(
    pool: &SqlitePool,
    appointment_id: &str,
    status: AppointmentStatus,
    offset: FixedOffset,
) -> AppResult<BookingOutcome> {
    let current = fetch_appointment_detail(pool, appointment_id)
        .await?
        .ok_or(AppError::NotFound("appointment"))?;

    if status == AppointmentStatus::Booked && current.status != AppointmentStatus::Booked {
        let Some(client_id) = current.client_id.as_deref() else {
            return Err(AppError::Validation(
                "An appointment without a client cannot be marked as booked.".into(),
            ));
        };
        check_booking_limits(pool, client_id, &current.id, current.scheduled_at, offset).await?;
    }

    let mut tx = pool.begin().await?;
    if status == AppointmentStatus::Available {
        sqlx::query(
            "UPDATE appointments SET status = ?, client_id = NULL, final_price_cents = NULL WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(&current.id)
        .execute(&mut *tx)
        .await?;
    } else {
        sqlx::query("UPDATE appointments SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(&current.id)
            .execute(&mut *tx)
            .await?;
    }

    let mut notifications = Vec::new();
    if status != current.status {
        let when = format_local(current.scheduled_at, offset);
        let client = current
            .client_name
            .clone()
            .unwrap_or_else(|| "No client".to_string());
        let notice = match status {
            AppointmentStatus::Completed => Some((
                NotificationKind::Completed,
                format!("{} completed the {} appointment of {}.", current.barber_name, when, client),
            )),
            AppointmentStatus::Cancelled => Some((
                NotificationKind::Cancelled,
                format!("Staff cancelled the {} appointment of {} with {}.", when, client, current.barber_name),
            )),
            _ => None,
        };
        if let Some((kind, message)) = notice {
            notifications.push(record_notification(&mut tx, Some(&current.id), kind, &message).await?);
        }
    }
    tx.commit().await?;

    let appointment = fetch_appointment_detail(pool, &current.id)
        .await?
        .ok_or(AppError::NotFound("appointment"))?;
    Ok(BookingOutcome {
        appointment,
        notifications,
    })
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlotBatch {
    pub barber_id: String,
    pub service_id: Option<String>,
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub times: Vec<NaiveTime>,
    /// Days to include, Monday = 0. All days when absent.
    pub weekdays: Option<Vec<u32>>,
}

/// Bulk-creates available slots. Slots that already exist for the barber are skipped.
pub async fn create_slots(
    pool: &SqlitePool,
    batch: &SlotBatch,
    offset: FixedOffset,
) -> AppResult<u64> {
    if batch.to < batch.from {
        return Err(AppError::Validation("The end date must not precede the start date.".into()));
    }
    if (batch.to - batch.from).num_days() >= MAX_SLOT_BATCH_DAYS {
        return Err(AppError::Validation("Slots can be created for at most one year at a time.".into()));
    }
    if batch.times.is_empty() {
        return Err(AppError::Validation("At least one time of day is required.".into()));
    }

    sqlx::query_scalar::<_, String>("SELECT id FROM barbers WHERE id = ?")
        .bind(&batch.barber_id)
        .fetch_one(pool)
        .await
        .map_err(not_found("barber"))?;
    if let Some(service_id) = batch.service_id.as_deref() {
        sqlx::query_scalar::<_, String>("SELECT id FROM services WHERE id = ?")
            .bind(service_id)
            .fetch_one(pool)
            .await
            .map_err(not_found("service"))?;
    }

    let mut tx = pool.begin().await?;
    let mut created = 0;
    let mut day = batch.from;
    while day <= batch.to {
        let included = batch
            .weekdays
            .as_ref()
            .map_or(true, |days| days.contains(&day.weekday().num_days_from_monday()));
        if included {
            for time in &batch.times {
                let local = day.and_time(*time);
                let scheduled_at =
                    (local - Duration::seconds(i64::from(offset.local_minus_utc()))).and_utc();
                let result = sqlx::query(
                    r#"INSERT OR IGNORE INTO appointments (id, barber_id, client_id, service_id, scheduled_at, status)
                       VALUES (?, ?, NULL, ?, ?, ?)"#,
                )
                .bind(new_id())
                .bind(&batch.barber_id)
                .bind(&batch.service_id)
                .bind(scheduled_at)
                .bind(AppointmentStatus::Available.as_str())
                .execute(&mut *tx)
                .await?;
                created += result.rows_affected();
            }
        }
        day += Duration::days(1);
    }
    tx.commit().await?;

    log::info!("Created {created} slots for barber {}", batch.barber_id);
    Ok(created)
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewSlot {
    pub barber_id: String,
    pub service_id: Option<String>,
    pub scheduled_at: DateTime<Utc>,
}

pub async fn create_slot(pool: &SqlitePool, slot: &NewSlot) -> AppResult<AppointmentDetail> {
    let id = new_id();
    let result = sqlx::query(
        r#"INSERT INTO appointments (id, barber_id, client_id, service_id, scheduled_at, status)
           VALUES (?, ?, NULL, ?, ?, ?)"#,
    )
    .bind(&id)
    .bind(&slot.barber_id)
    .bind(&slot.service_id)
    .bind(slot.scheduled_at)
    .bind(AppointmentStatus::Available.as_str())
    .execute(pool)
    .await;

    if let Err(sqlx::Error::Database(db)) = &result {
        if db.is_unique_violation() {
            return Err(AppError::Validation(
                "The barber already has a slot at that time.".into(),
            ));
        }
        if db.is_foreign_key_violation() {
            return Err(AppError::Validation("Unknown barber or service.".into()));
        }
    }
    result?;

    fetch_appointment_detail(pool, &id)
        .await?
        .ok_or(AppError::NotFound("appointment"))
}

pub async fn delete_appointment(pool: &SqlitePool, appointment_id: &str) -> AppResult<()> {
    let result = sqlx::query("DELETE FROM appointments WHERE id = ?")
        .bind(appointment_id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("appointment"));
    }
    Ok(())
}

/// Marks past-due available slots as expired. With `dry_run` only reports them.
pub async fn expire_slots(
    pool: &SqlitePool,
    now: DateTime<Utc>,
    dry_run: bool,
) -> Result<Vec<AppointmentDetail>, sqlx::Error> {
    let stale = sqlx::query_as::<_, AppointmentDetail>(&format!(
        "{APPOINTMENT_DETAIL_SELECT} WHERE a.status = ? AND a.scheduled_at < ? ORDER BY a.scheduled_at DESC"
    ))
    .bind(AppointmentStatus::Available.as_str())
    .bind(now)
    .fetch_all(pool)
    .await?;

    if dry_run || stale.is_empty() {
        return Ok(stale);
    }

    let mut tx = pool.begin().await?;
    for slot in &stale {
        sqlx::query("UPDATE appointments SET status = ? WHERE id = ? AND status = ?")
            .bind(AppointmentStatus::Expired.as_str())
            .bind(&slot.id)
            .bind(AppointmentStatus::Available.as_str())
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;

    Ok(stale)
}

/// Re-enables an account and clears its no-show counter.
pub async fn enable_user(pool: &SqlitePool, user_id: &str) -> AppResult<()> {
    let result = sqlx::query("UPDATE users SET enabled = 1, no_show_count = 0 WHERE id = ?")
        .bind(user_id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("user"));
    }
    log::info!("User {user_id} enabled");
    Ok(())
}

pub async fn disable_user(pool: &SqlitePool, user_id: &str) -> AppResult<()> {
    let result = sqlx::query("UPDATE users SET enabled = 0 WHERE id = ?")
        .bind(user_id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("user"));
    }
    log::info!("User {user_id} disabled");
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
pub struct SlotView {
    pub id: String,
    pub time: String,
    pub barber_id: String,
    pub barber_name: String,
    pub service_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DaySlots {
    pub date: NaiveDate,
    pub slots: Vec<SlotView>,
}

/// Upcoming available slots grouped by local day, earliest first.
pub async fn available_slots(
    pool: &SqlitePool,
    barber_id: Option<&str>,
    now: DateTime<Utc>,
    offset: FixedOffset,
) -> Result<Vec<DaySlots>, sqlx::Error> {
    let rows = sqlx::query_as::<_, AppointmentDetail>(&format!(
        r#"{APPOINTMENT_DETAIL_SELECT}
           WHERE a.status = ? AND a.scheduled_at >= ? AND (? IS NULL OR a.barber_id = ?)
           ORDER BY a.scheduled_at, b.display_order, b.name"#
    ))
    .bind(AppointmentStatus::Available.as_str())
    .bind(now)
    .bind(barber_id)
    .bind(barber_id)
    .fetch_all(pool)
    .await?;

    let mut days: BTreeMap<NaiveDate, Vec<SlotView>> = BTreeMap::new();
    for row in rows {
        let local = row.scheduled_at.with_timezone(&offset);
        days.entry(local.date_naive()).or_default().push(SlotView {
            id: row.id,
            time: local.format("%H:%M").to_string(),
            barber_id: row.barber_id,
            barber_name: row.barber_name,
            service_id: row.service_id,
        });
    }

    Ok(days
        .into_iter()
        .map(|(date, slots)| DaySlots { date, slots })
        .collect())
}

pub async fn client_appointments(
    pool: &SqlitePool,
    client_id: &str,
) -> Result<Vec<AppointmentDetail>, sqlx::Error> {
    sqlx::query_as::<_, AppointmentDetail>(&format!(
        "{APPOINTMENT_DETAIL_SELECT} WHERE a.client_id = ? ORDER BY a.scheduled_at DESC"
    ))
    .bind(client_id)
    .fetch_all(pool)
    .await
}

#[derive(Debug, Default, Deserialize)]
pub struct AppointmentFilter {
    pub status: Option<AppointmentStatus>,
    pub barber_id: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

pub async fn list_appointments(
    pool: &SqlitePool,
    filter: &AppointmentFilter,
) -> Result<Vec<AppointmentDetail>, sqlx::Error> {
    sqlx::query_as::<_, AppointmentDetail>(&format!(
        r#"{APPOINTMENT_DETAIL_SELECT}
           WHERE (? IS NULL OR a.status = ?)
             AND (? IS NULL OR a.barber_id = ?)
             AND (? IS NULL OR a.scheduled_at >= ?)
             AND (? IS NULL OR a.scheduled_at < ?)
           ORDER BY a.scheduled_at"#
    ))
    .bind(filter.status.map(|s| s.as_str()))
    .bind(filter.status.map(|s| s.as_str()))
    .bind(&filter.barber_id)
    .bind(&filter.barber_id)
    .bind(filter.from)
    .bind(filter.from)
    .bind(filter.until)
    .bind(filter.until)
    .fetch_all(pool)
    .await
}

#[cfg(test)]
pub(crate) mod fixtures {
    use chrono::{DateTime, NaiveDate, Utc};
    use sqlx::SqlitePool;

    use crate::auth::new_id;

    pub fn at(date: &str, time: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(&format!("{date}T{time}:00Z"))
            .unwrap()
            .with_timezone(&Utc)
    }

    pub async fn user(pool: &SqlitePool, email: &str, enabled: bool, no_shows: i64) -> String {
        let id = new_id();
        sqlx::query(
            r#"INSERT INTO users (id, email, first_name, last_name, phone, birth_date, registered_at,
                                  enabled, no_show_count, is_staff, is_superuser, password_hash)
               VALUES (?, ?, 'Ana', 'Perez', '', ?, ?, ?, ?, 0, 0, 'x')"#,
        )
        .bind(&id)
        .bind(email)
        .bind(NaiveDate::from_ymd_opt(1990, 5, 1))
        .bind(Utc::now())
        .bind(enabled)
        .bind(no_shows)
        .execute(pool)
        .await
        .unwrap();
        id
    }

    pub async fn barber(pool: &SqlitePool, name: &str) -> String {
        let id = new_id();
        sqlx::query("INSERT INTO barbers (id, name, national_id) VALUES (?, ?, ?)")
            .bind(&id)
            .bind(name)
            .bind(new_id())
            .execute(pool)
            .await
            .unwrap();
        id
    }

    pub async fn service(pool: &SqlitePool, name: &str, price_cents: i64) -> String {
        let id = new_id();
        sqlx::query("INSERT INTO services (id, name, price_cents) VALUES (?, ?, ?)")
            .bind(&id)
            .bind(name)
            .bind(price_cents)
            .execute(pool)
            .await
            .unwrap();
        id
    }

    pub async fn slot(
        pool: &SqlitePool,
        barber_id: &str,
        service_id: Option<&str>,
        scheduled_at: DateTime<Utc>,
        status: &str,
        client_id: Option<&str>,
    ) -> String {
        let id = new_id();
        sqlx::query(
            r#"INSERT INTO appointments (id, barber_id, client_id, service_id, scheduled_at, status)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&id)
        .bind(barber_id)
        .bind(client_id)
        .bind(service_id)
        .bind(scheduled_at)
        .bind(status)
        .execute(pool)
        .await
        .unwrap();
        id
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use crate::db::testing;

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    async fn status_of(pool: &SqlitePool, id: &str) -> String {
        sqlx::query_scalar("SELECT status FROM appointments WHERE id = ?")
            .bind(id)
            .fetch_one(pool)
            .await
            .unwrap()
    }

    async fn counter(pool: &SqlitePool, user_id: &str) -> (i64, bool) {
        sqlx::query_as("SELECT no_show_count, enabled FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_one(pool)
            .await
            .unwrap()
    }

    #[test]
    fn week_bounds_are_monday_to_sunday() {
        let mut date = NaiveDate::from_ymd_opt(2028, 12, 1).unwrap();
        let last = NaiveDate::from_ymd_opt(2031, 2, 1).unwrap();
        while date <= last {
            let (start, end) = week_bounds(date);
            assert_eq!(start.weekday(), chrono::Weekday::Mon);
            assert_eq!(end.weekday(), chrono::Weekday::Sun);
            assert_eq!((end - start).num_days(), 6);
            assert!(start <= date && date <= end);
            assert_eq!(week_bounds(start), (start, end));
            assert_eq!(week_bounds(end), (start, end));
            date += Duration::days(1);
        }
    }

    #[test]
    fn week_bounds_cross_year_end() {
        let date = NaiveDate::from_ymd_opt(2030, 1, 1).unwrap();
        assert_eq!(
            week_bounds(date),
            (
                NaiveDate::from_ymd_opt(2029, 12, 31).unwrap(),
                NaiveDate::from_ymd_opt(2030, 1, 6).unwrap()
            )
        );
    }

    #[test]
    fn local_range_respects_offset() {
        let offset = FixedOffset::west_opt(3 * 3600).unwrap();
        let date = NaiveDate::from_ymd_opt(2030, 1, 7).unwrap();
        let (from, until) = local_range(date, 7, offset);
        assert_eq!(from, at("2030-01-07", "03:00"));
        assert_eq!(until, at("2030-01-14", "03:00"));
    }

    #[tokio::test]
    async fn second_booking_in_same_week_is_rejected() {
        let pool = testing::pool().await;
        let client = user(&pool, "ana@test.dev", true, 0).await;
        let barber = barber(&pool, "Leo").await;
        let cut = service(&pool, "Cut", 1500).await;
        let wednesday = slot(&pool, &barber, Some(cut.as_str()), at("2030-01-09", "14:00"), "available", None).await;
        let friday = slot(&pool, &barber, Some(cut.as_str()), at("2030-01-11", "10:00"), "available", None).await;
        let next_monday = slot(&pool, &barber, Some(cut.as_str()), at("2030-01-14", "10:00"), "available", None).await;

        book_slot(&pool, &client, &wednesday, None, utc()).await.unwrap();

        let err = book_slot(&pool, &client, &friday, None, utc()).await.unwrap_err();
        match err {
            AppError::Booking(BookingError::WeeklyLimit { week_start, week_end }) => {
                assert_eq!(week_start, "07/01/2030");
                assert_eq!(week_end, "13/01/2030");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(status_of(&pool, &friday).await, "available");

        book_slot(&pool, &client, &next_monday, None, utc()).await.unwrap();
    }

    #[tokio::test]
    async fn completed_or_cancelled_visits_do_not_block_the_week() {
        let pool = testing::pool().await;
        let client = user(&pool, "ana@test.dev", true, 0).await;
        let barber = barber(&pool, "Leo").await;
        let cut = service(&pool, "Cut", 1500).await;
        let monday = slot(&pool, &barber, Some(cut.as_str()), at("2030-01-07", "10:00"), "available", None).await;
        let thursday = slot(&pool, &barber, Some(cut.as_str()), at("2030-01-10", "10:00"), "available", None).await;

        book_slot(&pool, &client, &monday, None, utc()).await.unwrap();
        set_status(&pool, &monday, AppointmentStatus::Completed, utc()).await.unwrap();

        book_slot(&pool, &client, &thursday, None, utc()).await.unwrap();
        assert_eq!(status_of(&pool, &thursday).await, "booked");
    }

    #[tokio::test]
    async fn same_day_conflict_is_reported_before_the_weekly_one() {
        let pool = testing::pool().await;
        let client = user(&pool, "ana@test.dev", true, 0).await;
        let barber = barber(&pool, "Leo").await;
        let cut = service(&pool, "Cut", 1500).await;
        let morning = slot(&pool, &barber, Some(cut.as_str()), at("2030-01-09", "09:00"), "available", None).await;
        let evening = slot(&pool, &barber, Some(cut.as_str()), at("2030-01-09", "18:00"), "available", None).await;

        book_slot(&pool, &client, &morning, None, utc()).await.unwrap();
        let err = book_slot(&pool, &client, &evening, None, utc()).await.unwrap_err();
        assert!(matches!(err, AppError::Booking(BookingError::SameDay)));
    }

    #[tokio::test]
    async fn week_is_computed_in_shop_local_time() {
        let pool = testing::pool().await;
        let offset = FixedOffset::west_opt(3 * 3600).unwrap();
        let client = user(&pool, "ana@test.dev", true, 0).await;
        let barber = barber(&pool, "Leo").await;
        let cut = service(&pool, "Cut", 1500).await;
        // 02:00 UTC Monday is still Sunday 23:00 locally, so it belongs to the previous week.
        let sunday_night = slot(&pool, &barber, Some(cut.as_str()), at("2030-01-14", "02:00"), "available", None).await;
        let wednesday = slot(&pool, &barber, Some(cut.as_str()), at("2030-01-16", "13:00"), "available", None).await;

        book_slot(&pool, &client, &sunday_night, None, offset).await.unwrap();
        book_slot(&pool, &client, &wednesday, None, offset).await.unwrap();
    }

    #[tokio::test]
    async fn disabled_accounts_and_taken_slots_are_rejected() {
        let pool = testing::pool().await;
        let disabled = user(&pool, "off@test.dev", false, 0).await;
        let other = user(&pool, "other@test.dev", true, 0).await;
        let barber = barber(&pool, "Leo").await;
        let cut = service(&pool, "Cut", 1500).await;
        let free = slot(&pool, &barber, Some(cut.as_str()), at("2030-01-09", "09:00"), "available", None).await;
        let taken = slot(&pool, &barber, Some(cut.as_str()), at("2030-01-09", "10:00"), "booked", Some(disabled.as_str())).await;

        let err = book_slot(&pool, &disabled, &free, None, utc()).await.unwrap_err();
        assert!(matches!(err, AppError::Booking(BookingError::AccountDisabled)));

        let err = book_slot(&pool, &other, &taken, None, utc()).await.unwrap_err();
        assert!(matches!(err, AppError::Booking(BookingError::SlotUnavailable)));

        let err = book_slot(&pool, &other, "missing", None, utc()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound("appointment")));
    }

    #[tokio::test]
    async fn booking_snapshots_the_service_price_and_notifies_staff() {
        let pool = testing::pool().await;
        let client = user(&pool, "ana@test.dev", true, 0).await;
        let barber = barber(&pool, "Leo").await;
        let cut = service(&pool, "Cut", 1500).await;
        let beard = service(&pool, "Beard", 900).await;
        let free = slot(&pool, &barber, Some(cut.as_str()), at("2030-01-09", "09:00"), "available", None).await;

        let outcome = book_slot(&pool, &client, &free, Some(beard.as_str()), utc()).await.unwrap();
        assert_eq!(outcome.appointment.final_price_cents, Some(900));
        assert_eq!(outcome.appointment.service_name.as_deref(), Some("Beard"));
        assert_eq!(outcome.notifications.len(), 1);

        sqlx::query("UPDATE services SET price_cents = 2000 WHERE id = ?")
            .bind(&beard)
            .execute(&pool)
            .await
            .unwrap();
        let detail = fetch_appointment_detail(&pool, &free).await.unwrap().unwrap();
        assert_eq!(detail.price_cents(), 900);
    }

    #[tokio::test]
    async fn slot_without_service_requires_a_choice() {
        let pool = testing::pool().await;
        let client = user(&pool, "ana@test.dev", true, 0).await;
        let barber = barber(&pool, "Leo").await;
        let free = slot(&pool, &barber, None, at("2030-01-09", "09:00"), "available", None).await;

        let err = book_slot(&pool, &client, &free, None, utc()).await.unwrap_err();
        assert!(matches!(err, AppError::Booking(BookingError::ServiceRequired)));
    }

    #[tokio::test]
    async fn early_cancellation_keeps_the_counter() {
        let pool = testing::pool().await;
        let client = user(&pool, "ana@test.dev", true, 1).await;
        let barber = barber(&pool, "Leo").await;
        let cut = service(&pool, "Cut", 1500).await;
        let when = at("2030-01-09", "15:00");
        let booked = slot(&pool, &barber, Some(cut.as_str()), when, "booked", Some(client.as_str())).await;

        let outcome = cancel_appointment(&pool, &client, &booked, when - Duration::hours(1), utc())
            .await
            .unwrap();
        assert!(!outcome.late);
        assert_eq!(outcome.no_show_count, 1);
        assert_eq!(counter(&pool, &client).await, (1, true));
        assert_eq!(status_of(&pool, &booked).await, "cancelled");
        assert_eq!(outcome.notifications.len(), 1);
        assert_eq!(outcome.notifications[0].kind, "cancelled");
    }

    #[tokio::test]
    async fn late_cancellation_increments_by_one() {
        let pool = testing::pool().await;
        let client = user(&pool, "ana@test.dev", true, 0).await;
        let barber = barber(&pool, "Leo").await;
        let cut = service(&pool, "Cut", 1500).await;
        let when = at("2030-01-09", "15:00");
        let booked = slot(&pool, &barber, Some(cut.as_str()), when, "booked", Some(client.as_str())).await;

        let outcome = cancel_appointment(
            &pool,
            &client,
            &booked,
            when - Duration::minutes(59),
            utc(),
        )
        .await
        .unwrap();
        assert!(outcome.late);
        assert!(!outcome.account_disabled);
        assert_eq!(counter(&pool, &client).await, (1, true));
    }

    #[tokio::test]
    async fn third_late_cancellation_disables_the_account() {
        let pool = testing::pool().await;
        let client = user(&pool, "ana@test.dev", true, 2).await;
        let barber = barber(&pool, "Leo").await;
        let cut = service(&pool, "Cut", 1500).await;
        let when = at("2030-01-09", "15:00");
        let booked = slot(&pool, &barber, Some(cut.as_str()), when, "booked", Some(client.as_str())).await;

        let outcome = cancel_appointment(
            &pool,
            &client,
            &booked,
            when - Duration::minutes(45),
            utc(),
        )
        .await
        .unwrap();
        assert!(outcome.late);
        assert!(outcome.account_disabled);
        assert_eq!(outcome.no_show_count, 3);
        assert_eq!(counter(&pool, &client).await, (3, false));

        let referencing: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM notifications WHERE appointment_id = ?")
                .bind(&booked)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(referencing, 1);

        let next = slot(&pool, &barber, Some(cut.as_str()), at("2030-02-01", "10:00"), "available", None).await;
        let err = book_slot(&pool, &client, &next, None, utc()).await.unwrap_err();
        assert!(matches!(err, AppError::Booking(BookingError::AccountDisabled)));
    }

    #[tokio::test]
    async fn enabling_an_account_resets_its_counter() {
        let pool = testing::pool().await;
        let client = user(&pool, "ana@test.dev", false, 3).await;

        enable_user(&pool, &client).await.unwrap();
        assert_eq!(counter(&pool, &client).await, (0, true));

        disable_user(&pool, &client).await.unwrap();
        assert_eq!(counter(&pool, &client).await, (0, false));

        assert!(matches!(
            enable_user(&pool, "missing").await,
            Err(AppError::NotFound("user"))
        ));
    }

    #[tokio::test]
    async fn only_the_owner_can_cancel_a_booked_appointment() {
        let pool = testing::pool().await;
        let owner = user(&pool, "ana@test.dev", true, 0).await;
        let stranger = user(&pool, "bob@test.dev", true, 0).await;
        let barber = barber(&pool, "Leo").await;
        let cut = service(&pool, "Cut", 1500).await;
        let when = at("2030-01-09", "15:00");
        let booked = slot(&pool, &barber, Some(cut.as_str()), when, "booked", Some(owner.as_str())).await;
        let done = slot(&pool, &barber, Some(cut.as_str()), when + Duration::hours(1), "completed", Some(owner.as_str())).await;
        let now = when - Duration::days(1);

        let err = cancel_appointment(&pool, &stranger, &booked, now, utc()).await.unwrap_err();
        assert!(matches!(err, AppError::Booking(BookingError::NotOwner)));

        let err = cancel_appointment(&pool, &owner, &done, now, utc()).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::Booking(BookingError::NotCancellable(AppointmentStatus::Completed))
        ));
    }

    #[tokio::test]
    async fn reopening_a_slot_clears_the_client() {
        let pool = testing::pool().await;
        let client = user(&pool, "ana@test.dev", true, 0).await;
        let barber = barber(&pool, "Leo").await;
        let cut = service(&pool, "Cut", 1500).await;
        let free = slot(&pool, &barber, Some(cut.as_str()), at("2030-01-09", "09:00"), "available", None).await;

        book_slot(&pool, &client, &free, None, utc()).await.unwrap();
        let outcome = set_status(&pool, &free, AppointmentStatus::Available, utc()).await.unwrap();
        assert_eq!(outcome.appointment.client_id, None);
        assert_eq!(outcome.appointment.final_price_cents, None);

        let err = set_status(&pool, &free, AppointmentStatus::Booked, utc()).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn staff_rebooking_honours_the_weekly_limit() {
        let pool = testing::pool().await;
        let client = user(&pool, "ana@test.dev", true, 0).await;
        let barber = barber(&pool, "Leo").await;
        let cut = service(&pool, "Cut", 1500).await;
        let monday = slot(&pool, &barber, Some(cut.as_str()), at("2030-01-07", "10:00"), "available", None).await;
        let monday_late = slot(&pool, &barber, Some(cut.as_str()), at("2030-01-07", "16:00"), "available", None).await;
        let wednesday = slot(&pool, &barber, Some(cut.as_str()), at("2030-01-09", "10:00"), "available", None).await;

        book_slot(&pool, &client, &monday, None, utc()).await.unwrap();
        cancel_appointment(&pool, &client, &monday, at("2030-01-01", "09:00"), utc())
            .await
            .unwrap();
        book_slot(&pool, &client, &wednesday, None, utc()).await.unwrap();

        let err = set_status(&pool, &monday, AppointmentStatus::Booked, utc()).await.unwrap_err();
        assert!(matches!(err, AppError::Booking(BookingError::WeeklyLimit { .. })));
        assert_eq!(status_of(&pool, &monday).await, "cancelled");

        set_status(&pool, &wednesday, AppointmentStatus::Cancelled, utc()).await.unwrap();
        book_slot(&pool, &client, &monday_late, None, utc()).await.unwrap();
        let err = set_status(&pool, &monday, AppointmentStatus::Booked, utc()).await.unwrap_err();
        assert!(matches!(err, AppError::Booking(BookingError::SameDay)));

        set_status(&pool, &monday_late, AppointmentStatus::Completed, utc()).await.unwrap();
        let outcome = set_status(&pool, &monday, AppointmentStatus::Booked, utc()).await.unwrap();
        assert_eq!(outcome.appointment.status, AppointmentStatus::Booked);

        let booked_in_week: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM appointments WHERE client_id = ? AND status = 'booked'",
        )
        .bind(&client)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(booked_in_week, 1);
    }

    #[tokio::test]
    async fn late_cancellation_at_the_cap_keeps_the_counter_at_three() {
        let pool = testing::pool().await;
        let client = user(&pool, "ana@test.dev", false, 3).await;
        let barber = barber(&pool, "Leo").await;
        let cut = service(&pool, "Cut", 1500).await;
        let when = at("2030-01-09", "15:00");
        let booked = slot(&pool, &barber, Some(cut.as_str()), when, "booked", Some(client.as_str())).await;

        let outcome = cancel_appointment(
            &pool,
            &client,
            &booked,
            when - Duration::minutes(10),
            utc(),
        )
        .await
        .unwrap();
        assert!(outcome.late);
        assert_eq!(outcome.no_show_count, 3);
        assert!(!outcome.account_disabled);
        assert_eq!(counter(&pool, &client).await, (3, false));

        let disabled_notices: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM notifications WHERE kind = 'account_disabled'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(disabled_notices, 0);
    }

    #[tokio::test]
    async fn expire_sweep_only_touches_past_available_slots() {
        let pool = testing::pool().await;
        let client = user(&pool, "ana@test.dev", true, 0).await;
        let barber = barber(&pool, "Leo").await;
        let now = at("2030-01-09", "12:00");
        let past_free = slot(&pool, &barber, None, at("2030-01-09", "09:00"), "available", None).await;
        let past_booked = slot(&pool, &barber, None, at("2030-01-09", "10:00"), "booked", Some(client.as_str())).await;
        let future_free = slot(&pool, &barber, None, at("2030-01-09", "15:00"), "available", None).await;

        let preview = expire_slots(&pool, now, true).await.unwrap();
        assert_eq!(preview.len(), 1);
        assert_eq!(status_of(&pool, &past_free).await, "available");

        let expired = expire_slots(&pool, now, false).await.unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(status_of(&pool, &past_free).await, "expired");
        assert_eq!(status_of(&pool, &past_booked).await, "booked");
        assert_eq!(status_of(&pool, &future_free).await, "available");
    }

    #[tokio::test]
    async fn slot_batches_skip_filtered_days_and_duplicates() {
        let pool = testing::pool().await;
        let barber = barber(&pool, "Leo").await;
        let batch = SlotBatch {
            barber_id: barber.clone(),
            service_id: None,
            from: NaiveDate::from_ymd_opt(2030, 1, 7).unwrap(),
            to: NaiveDate::from_ymd_opt(2030, 1, 13).unwrap(),
            times: vec![
                NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
                NaiveTime::from_hms_opt(11, 0, 0).unwrap(),
            ],
            weekdays: Some(vec![0, 2, 4]),
        };

        assert_eq!(create_slots(&pool, &batch, utc()).await.unwrap(), 6);
        assert_eq!(create_slots(&pool, &batch, utc()).await.unwrap(), 0);

        let days = available_slots(&pool, Some(barber.as_str()), at("2030-01-01", "00:00"), utc())
            .await
            .unwrap();
        let dates: Vec<_> = days.iter().map(|d| d.date.to_string()).collect();
        assert_eq!(dates, ["2030-01-07", "2030-01-09", "2030-01-11"]);
        assert!(days.iter().all(|d| d.slots.len() == 2));
        assert_eq!(days[0].slots[0].time, "10:00");
    }

    #[tokio::test]
    async fn slot_batch_validates_its_range() {
        let pool = testing::pool().await;
        let barber = barber(&pool, "Leo").await;
        let batch = SlotBatch {
            barber_id: barber,
            service_id: None,
            from: NaiveDate::from_ymd_opt(2030, 1, 13).unwrap(),
            to: NaiveDate::from_ymd_opt(2030, 1, 7).unwrap(),
            times: vec![NaiveTime::from_hms_opt(10, 0, 0).unwrap()],
            weekdays: None,
        };
        assert!(matches!(
            create_slots(&pool, &batch, utc()).await,
            Err(AppError::Validation(_))
        ));
    }
}
