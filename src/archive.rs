//! Archiving of old appointments into spreadsheets.
//!
//! A run selects appointments older than the retention window, writes an
//! individual workbook (rows, per-barber stats, shop summary), appends the rows
//! to the history workbook, stores both files in `archive_files` and only then
//! deletes the archived rows.

use std::{
    collections::{BTreeMap, BTreeSet, HashSet},
    fs,
    path::{Path, PathBuf},
};

use calamine::{open_workbook, Reader, Xlsx};
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Utc};
use rust_xlsxwriter::{Format, Workbook, Worksheet, XlsxError};
use serde::Serialize;
use sqlx::SqlitePool;
use thiserror::Error;

use crate::{
    auth::new_id,
    error::{not_found, AppResult},
    models::{
        format_money, AppointmentDetail, AppointmentStatus, ArchiveFileContent,
        ArchiveFileSummary, APPOINTMENT_DETAIL_SELECT, ARCHIVE_KIND_HISTORY,
        ARCHIVE_KIND_INDIVIDUAL,
    },
};

pub const HISTORY_FILE_NAME: &str = "appointments_archive_history.xlsx";
pub const DEFAULT_RETENTION_DAYS: i64 = 30;

const ROW_HEADER: [&str; 9] = [
    "ID", "Date", "Time", "Barber", "Client", "Service", "Price", "Status", "Archived at",
];
const STATS_HEADER: [&str; 6] = [
    "Barber",
    "Services performed",
    "Services by type",
    "Money generated",
    "Completed appointments",
    "Active days",
];
const SUMMARY_HEADER: [&str; 3] = ["Metric", "Value", "Detail"];
const DELETE_CHUNK: usize = 500;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("failed to write archive file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to build workbook: {0}")]
    Workbook(#[from] XlsxError),
}

/// Which statuses a run archives.
#[derive(Debug, Clone, Default)]
pub struct StatusSelection {
    pub explicit: Vec<AppointmentStatus>,
    pub include_available: bool,
    pub only_booked: bool,
}

impl StatusSelection {
    /// An explicit list wins, then `only_booked`, then the default set
    /// optionally widened with unbooked slots.
    pub fn resolve(&self) -> Vec<AppointmentStatus> {
        let mut statuses = if !self.explicit.is_empty() {
            self.explicit.clone()
        } else if self.only_booked {
            vec![AppointmentStatus::Booked, AppointmentStatus::Completed]
        } else {
            let mut statuses = vec![
                AppointmentStatus::Booked,
                AppointmentStatus::Completed,
                AppointmentStatus::Cancelled,
            ];
            if self.include_available {
                statuses.push(AppointmentStatus::Available);
                statuses.push(AppointmentStatus::Expired);
            }
            statuses
        };
        statuses.sort();
        statuses.dedup();
        statuses
    }
}

#[derive(Debug, Clone)]
pub struct ArchiveOptions {
    pub days: i64,
    pub statuses: StatusSelection,
    pub dry_run: bool,
}

impl Default for ArchiveOptions {
    fn default() -> Self {
        Self {
            days: DEFAULT_RETENTION_DAYS,
            statuses: StatusSelection::default(),
            dry_run: false,
        }
    }
}

#[derive(Debug)]
pub enum ArchiveReport {
    Nothing {
        cutoff: DateTime<Utc>,
        statuses: Vec<AppointmentStatus>,
    },
    Preview {
        cutoff: DateTime<Utc>,
        statuses: Vec<AppointmentStatus>,
        rows: Vec<AppointmentDetail>,
    },
    Archived(ArchiveSummary),
}

#[derive(Debug)]
pub struct ArchiveSummary {
    pub cutoff: DateTime<Utc>,
    pub statuses: Vec<AppointmentStatus>,
    pub archived: usize,
    pub individual_path: PathBuf,
    pub history_path: PathBuf,
    pub history_recreated: bool,
}

pub async fn select_archivable(
    pool: &SqlitePool,
    cutoff: DateTime<Utc>,
    statuses: &[AppointmentStatus],
) -> Result<Vec<AppointmentDetail>, sqlx::Error> {
    if statuses.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders = vec!["?"; statuses.len()].join(", ");
    let sql = format!(
        "{APPOINTMENT_DETAIL_SELECT} WHERE a.scheduled_at < ? AND a.status IN ({placeholders}) ORDER BY a.scheduled_at, a.id"
    );
    let mut query = sqlx::query_as::<_, AppointmentDetail>(&sql).bind(cutoff);
    for status in statuses {
        query = query.bind(status.as_str());
    }
    query.fetch_all(pool).await
}

/// Runs one archive pass. Files are written before anything is deleted, so a
/// failure at any step leaves the appointments table as it was.
pub async fn run_archive(
    pool: &SqlitePool,
    dir: &Path,
    options: &ArchiveOptions,
    now: DateTime<Utc>,
    offset: FixedOffset,
) -> Result<ArchiveReport, ArchiveError> {
    let statuses = options.statuses.resolve();
    let cutoff = now - Duration::days(options.days);
    let rows = select_archivable(pool, cutoff, &statuses).await?;

    if rows.is_empty() {
        log::info!("No appointments older than {cutoff} to archive");
        return Ok(ArchiveReport::Nothing { cutoff, statuses });
    }
    if options.dry_run {
        return Ok(ArchiveReport::Preview {
            cutoff,
            statuses,
            rows,
        });
    }

    fs::create_dir_all(dir)?;
    let local_now = now.with_timezone(&offset);
    let archived_at = local_now.format("%Y-%m-%d %H:%M:%S").to_string();
    let table = archive_rows(&rows, &archived_at, offset);

    let file_name = format!(
        "{}--{}--{}--{}-appointments.xlsx",
        now.timestamp(),
        local_now.format("%d-%m-%Y"),
        local_now.format("%H-%M-%S"),
        rows.len()
    );
    let individual = build_individual_workbook(&table, &rows, offset)?;
    let individual_path = dir.join(&file_name);
    fs::write(&individual_path, &individual)?;

    let history_path = dir.join(HISTORY_FILE_NAME);
    let (mut history_rows, history_recreated) = read_history(&history_path);
    history_rows.extend(table);
    let history = build_history_workbook(&history_rows)?;
    fs::write(&history_path, &history)?;

    let period_start = rows.first().map(|row| row.scheduled_at.with_timezone(&offset).date_naive());
    let period_end = rows.last().map(|row| row.scheduled_at.with_timezone(&offset).date_naive());
    let status_list = statuses
        .iter()
        .map(|status| status.as_str())
        .collect::<Vec<_>>()
        .join(", ");

    let mut tx = pool.begin().await?;
    sqlx::query(
        r#"INSERT INTO archive_files
           (id, file_name, kind, description, created_at, period_start, period_end,
            appointment_count, size_bytes, content)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(new_id())
    .bind(&file_name)
    .bind(ARCHIVE_KIND_INDIVIDUAL)
    .bind(format!(
        "{} appointments older than {} days ({status_list})",
        rows.len(),
        options.days
    ))
    .bind(now)
    .bind(period_start)
    .bind(period_end)
    .bind(rows.len() as i64)
    .bind(individual.len() as i64)
    .bind(&individual)
    .execute(&mut *tx)
    .await?;

    sqlx::query("DELETE FROM archive_files WHERE kind = ?")
        .bind(ARCHIVE_KIND_HISTORY)
        .execute(&mut *tx)
        .await?;
    sqlx::query(
        r#"INSERT INTO archive_files
           (id, file_name, kind, description, created_at, period_start, period_end,
            appointment_count, size_bytes, content)
           VALUES (?, ?, ?, ?, ?, NULL, NULL, ?, ?, ?)"#,
    )
    .bind(new_id())
    .bind(HISTORY_FILE_NAME)
    .bind(ARCHIVE_KIND_HISTORY)
    .bind("Every archived appointment")
    .bind(now)
    .bind(history_rows.len() as i64)
    .bind(history.len() as i64)
    .bind(&history)
    .execute(&mut *tx)
    .await?;

    let ids: Vec<&str> = rows.iter().map(|row| row.id.as_str()).collect();
    for chunk in ids.chunks(DELETE_CHUNK) {
        let placeholders = vec!["?"; chunk.len()].join(", ");
        let sql = format!("DELETE FROM appointments WHERE id IN ({placeholders})");
        let mut query = sqlx::query(&sql);
        for id in chunk {
            query = query.bind(*id);
        }
        query.execute(&mut *tx).await?;
    }
    tx.commit().await?;

    log::info!(
        "Archived {} appointments into {}",
        rows.len(),
        individual_path.display()
    );

    Ok(ArchiveReport::Archived(ArchiveSummary {
        cutoff,
        statuses,
        archived: rows.len(),
        individual_path,
        history_path,
        history_recreated,
    }))
}

fn archive_rows(
    rows: &[AppointmentDetail],
    archived_at: &str,
    offset: FixedOffset,
) -> Vec<Vec<String>> {
    rows.iter()
        .map(|row| {
            let local = row.scheduled_at.with_timezone(&offset);
            vec![
                row.id.clone(),
                local.format("%Y-%m-%d").to_string(),
                local.format("%H:%M").to_string(),
                row.barber_name.clone(),
                row.client_name.clone().unwrap_or_else(|| "No client".into()),
                row.service_name.clone().unwrap_or_else(|| "No service".into()),
                format_money(row.price_cents()),
                row.status.to_string(),
                archived_at.to_string(),
            ]
        })
        .collect()
}

/// Reads the data rows of an existing history workbook. A missing file yields
/// no rows; an unreadable one is logged and replaced (second value `true`).
fn read_history(path: &Path) -> (Vec<Vec<String>>, bool) {
    if !path.exists() {
        return (Vec::new(), false);
    }

    let range = open_workbook::<Xlsx<_>, _>(path)
        .map_err(|err| err.to_string())
        .and_then(|mut workbook| match workbook.worksheet_range_at(0) {
            Some(range) => range.map_err(|err| err.to_string()),
            None => Err("workbook has no sheets".to_string()),
        });

    match range {
        Ok(range) => {
            let rows = range
                .rows()
                .skip(1)
                .map(|row| row.iter().map(|cell| cell.to_string()).collect::<Vec<_>>())
                .filter(|row: &Vec<String>| row.iter().any(|cell| !cell.is_empty()))
                .collect();
            (rows, false)
        }
        Err(err) => {
            log::warn!(
                "History workbook {} is unreadable ({err}); recreating it",
                path.display()
            );
            (Vec::new(), true)
        }
    }
}

fn write_table(
    sheet: &mut Worksheet,
    header: &[&str],
    rows: &[Vec<String>],
    bold: &Format,
) -> Result<(), XlsxError> {
    let mut widths: Vec<usize> = header.iter().map(|title| title.chars().count()).collect();
    for (col, title) in header.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, *title, bold)?;
    }
    for (index, row) in rows.iter().enumerate() {
        for (col, value) in row.iter().enumerate() {
            sheet.write_string(index as u32 + 1, col as u16, value)?;
            if let Some(width) = widths.get_mut(col) {
                *width = (*width).max(value.chars().count());
            }
        }
    }
    for (col, width) in widths.into_iter().enumerate() {
        sheet.set_column_width(col as u16, ((width + 2) as f64 * 1.2).min(50.0))?;
    }
    Ok(())
}

fn build_individual_workbook(
    table: &[Vec<String>],
    rows: &[AppointmentDetail],
    offset: FixedOffset,
) -> Result<Vec<u8>, XlsxError> {
    let bold = Format::new().set_bold();
    let mut workbook = Workbook::new();

    let sheet = workbook.add_worksheet();
    sheet.set_name("Archived")?;
    write_table(sheet, &ROW_HEADER, table, &bold)?;

    let stats = barber_stats(rows, offset);
    if !stats.is_empty() {
        let sheet = workbook.add_worksheet();
        sheet.set_name("Barber stats")?;
        let stats_rows: Vec<Vec<String>> = stats.iter().map(BarberStats::to_row).collect();
        write_table(sheet, &STATS_HEADER, &stats_rows, &bold)?;
    }

    let summary = shop_summary(rows, offset);
    let sheet = workbook.add_worksheet();
    sheet.set_name("Shop summary")?;
    write_table(sheet, &SUMMARY_HEADER, &summary.to_rows(), &bold)?;

    workbook.save_to_buffer()
}

fn build_history_workbook(rows: &[Vec<String>]) -> Result<Vec<u8>, XlsxError> {
    let bold = Format::new().set_bold();
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name("History")?;
    write_table(sheet, &ROW_HEADER, rows, &bold)?;
    workbook.save_to_buffer()
}

fn count_list(counts: &BTreeMap<String, usize>) -> String {
    if counts.is_empty() {
        return "None".to_string();
    }
    counts
        .iter()
        .map(|(name, count)| format!("{name}: {count}"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BarberStats {
    pub barber: String,
    pub services_performed: usize,
    pub services_by_type: BTreeMap<String, usize>,
    pub money_cents: i64,
    pub active_days: usize,
}

impl BarberStats {
    fn to_row(&self) -> Vec<String> {
        vec![
            self.barber.clone(),
            self.services_performed.to_string(),
            count_list(&self.services_by_type),
            format_money(self.money_cents),
            self.services_performed.to_string(),
            self.active_days.to_string(),
        ]
    }
}

/// Per-barber totals over booked or completed rows, highest earner first.
/// Barbers whose rows were all unperformed still appear with zeros.
pub fn barber_stats(rows: &[AppointmentDetail], offset: FixedOffset) -> Vec<BarberStats> {
    let mut by_barber: BTreeMap<&str, (BarberStats, HashSet<NaiveDate>)> = BTreeMap::new();

    for row in rows {
        let (stats, days) = by_barber.entry(row.barber_name.as_str()).or_insert_with(|| {
            (
                BarberStats {
                    barber: row.barber_name.clone(),
                    services_performed: 0,
                    services_by_type: BTreeMap::new(),
                    money_cents: 0,
                    active_days: 0,
                },
                HashSet::new(),
            )
        });
        if !row.status.is_performed() {
            continue;
        }
        stats.services_performed += 1;
        stats.money_cents += row.price_cents();
        if let Some(service) = &row.service_name {
            *stats.services_by_type.entry(service.clone()).or_default() += 1;
        }
        days.insert(row.scheduled_at.with_timezone(&offset).date_naive());
    }

    let mut stats: Vec<BarberStats> = by_barber
        .into_values()
        .map(|(mut stats, days)| {
            stats.active_days = days.len();
            stats
        })
        .collect();
    stats.sort_by(|a, b| {
        b.money_cents
            .cmp(&a.money_cents)
            .then_with(|| a.barber.cmp(&b.barber))
    });
    stats
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ShopSummary {
    pub total_services: usize,
    pub total_money_cents: i64,
    pub services_by_type: BTreeMap<String, usize>,
    pub active_barbers: BTreeSet<String>,
    pub unique_clients: usize,
    pub active_days: usize,
    pub first_day: Option<NaiveDate>,
    pub last_day: Option<NaiveDate>,
    pub total_records: usize,
    pub by_status: BTreeMap<String, usize>,
}

impl ShopSummary {
    pub fn average_cents(&self) -> Option<i64> {
        (self.total_services > 0).then(|| self.total_money_cents / self.total_services as i64)
    }

    pub fn period(&self) -> String {
        match (self.first_day, self.last_day) {
            (Some(first), Some(last)) if first == last => first.format("%d/%m/%Y").to_string(),
            (Some(first), Some(last)) => {
                format!("{} to {}", first.format("%d/%m/%Y"), last.format("%d/%m/%Y"))
            }
            _ => String::new(),
        }
    }

    fn per(&self, count: usize) -> String {
        if count == 0 {
            return "N/A".to_string();
        }
        format!("{:.1}", self.total_services as f64 / count as f64)
    }

    fn to_rows(&self) -> Vec<Vec<String>> {
        let barbers = if self.active_barbers.is_empty() {
            "None".to_string()
        } else {
            self.active_barbers.iter().cloned().collect::<Vec<_>>().join(", ")
        };
        vec![
            vec![
                "Services performed".into(),
                format!("{} services", self.total_services),
                count_list(&self.services_by_type),
            ],
            vec![
                "Money generated".into(),
                format_money(self.total_money_cents),
                self.average_cents().map_or("N/A".into(), |avg| {
                    format!("Average per service: {}", format_money(avg))
                }),
            ],
            vec![
                "Active barbers".into(),
                format!("{} barbers", self.active_barbers.len()),
                barbers,
            ],
            vec![
                "Clients served".into(),
                format!("{} unique clients", self.unique_clients),
                format!("Services per client: {}", self.per(self.unique_clients)),
            ],
            vec![
                "Active days".into(),
                format!("{} days", self.active_days),
                format!("Services per day: {}", self.per(self.active_days)),
            ],
            vec![
                "Archived period".into(),
                self.period(),
                format!("Records processed: {}", self.total_records),
            ],
            vec![
                "Status distribution".into(),
                format!("{} statuses", self.by_status.len()),
                count_list(&self.by_status),
            ],
        ]
    }
}

pub fn shop_summary(rows: &[AppointmentDetail], offset: FixedOffset) -> ShopSummary {
    let mut summary = ShopSummary {
        total_records: rows.len(),
        ..ShopSummary::default()
    };
    let mut clients = HashSet::new();
    let mut days = HashSet::new();

    for row in rows {
        *summary.by_status.entry(row.status.to_string()).or_default() += 1;

        let day = row.scheduled_at.with_timezone(&offset).date_naive();
        summary.first_day = Some(summary.first_day.map_or(day, |first| first.min(day)));
        summary.last_day = Some(summary.last_day.map_or(day, |last| last.max(day)));

        if !row.status.is_performed() {
            continue;
        }
        summary.total_services += 1;
        summary.total_money_cents += row.price_cents();
        if let Some(service) = &row.service_name {
            *summary.services_by_type.entry(service.clone()).or_default() += 1;
        }
        summary.active_barbers.insert(row.barber_name.clone());
        if let Some(client) = &row.client_id {
            clients.insert(client.clone());
        }
        days.insert(day);
    }

    summary.unique_clients = clients.len();
    summary.active_days = days.len();
    summary
}

pub async fn list_archive_files(pool: &SqlitePool) -> Result<Vec<ArchiveFileSummary>, sqlx::Error> {
    sqlx::query_as::<_, ArchiveFileSummary>(
        r#"SELECT id, file_name, kind, description, created_at, period_start, period_end,
                  appointment_count, size_bytes
           FROM archive_files
           ORDER BY created_at DESC, kind DESC"#,
    )
    .fetch_all(pool)
    .await
}

pub async fn get_archive_file(pool: &SqlitePool, id: &str) -> AppResult<ArchiveFileContent> {
    sqlx::query_as::<_, ArchiveFileContent>(
        "SELECT file_name, content FROM archive_files WHERE id = ?",
    )
    .bind(id)
    .fetch_one(pool)
    .await
    .map_err(not_found("archive file"))
}

#[cfg(test)]
mod tests {
    use calamine::{open_workbook, Reader, Xlsx};

    use super::*;
    use crate::{
        booking::fixtures::{at, barber, service, slot, user},
        db::testing,
    };

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    fn detail(barber: &str, client: Option<&str>, service: &str, day: &str, status: AppointmentStatus, price: i64) -> AppointmentDetail {
        AppointmentDetail {
            id: new_id(),
            barber_id: barber.to_lowercase(),
            barber_name: barber.to_string(),
            client_id: client.map(str::to_string),
            client_name: client.map(str::to_string),
            service_id: None,
            service_name: Some(service.to_string()),
            service_price_cents: Some(price),
            scheduled_at: at(day, "10:00"),
            status,
            final_price_cents: None,
        }
    }

    fn sheet_rows(path: &Path, sheet: &str) -> Vec<Vec<String>> {
        let mut workbook: Xlsx<_> = open_workbook(path).unwrap();
        let range = workbook.worksheet_range(sheet).unwrap();
        range
            .rows()
            .map(|row| row.iter().map(|cell| cell.to_string()).collect())
            .collect()
    }

    async fn appointment_count(pool: &SqlitePool) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM appointments")
            .fetch_one(pool)
            .await
            .unwrap()
    }

    #[test]
    fn status_selection_precedence() {
        use AppointmentStatus::*;

        assert_eq!(StatusSelection::default().resolve(), [Booked, Cancelled, Completed]);
        let wide = StatusSelection {
            include_available: true,
            ..StatusSelection::default()
        };
        assert_eq!(wide.resolve(), [Available, Booked, Cancelled, Completed, Expired]);
        let booked = StatusSelection {
            only_booked: true,
            include_available: true,
            ..StatusSelection::default()
        };
        assert_eq!(booked.resolve(), [Booked, Completed]);
        let explicit = StatusSelection {
            explicit: vec![Expired, Expired],
            only_booked: true,
            ..StatusSelection::default()
        };
        assert_eq!(explicit.resolve(), [Expired]);
    }

    #[test]
    fn barber_stats_count_only_performed_visits() {
        use AppointmentStatus::*;

        let rows = vec![
            detail("Leo", Some("ana"), "Cut", "2030-01-07", Completed, 1500),
            detail("Leo", Some("bob"), "Cut", "2030-01-07", Booked, 1500),
            detail("Leo", Some("ana"), "Beard", "2030-01-08", Cancelled, 900),
            detail("Max", Some("cid"), "Beard", "2030-01-09", Completed, 900),
            detail("Tom", None, "Cut", "2030-01-09", Available, 1500),
        ];

        let stats = barber_stats(&rows, utc());
        assert_eq!(stats.len(), 3);
        assert_eq!(stats[0].barber, "Leo");
        assert_eq!(stats[0].services_performed, 2);
        assert_eq!(stats[0].money_cents, 3000);
        assert_eq!(stats[0].active_days, 1);
        assert_eq!(stats[0].services_by_type.get("Cut"), Some(&2));
        assert_eq!(stats[1].barber, "Max");
        assert_eq!(stats[2].barber, "Tom");
        assert_eq!(stats[2].services_performed, 0);

        let summary = shop_summary(&rows, utc());
        assert_eq!(summary.total_services, 3);
        assert_eq!(summary.total_money_cents, 3900);
        assert_eq!(summary.average_cents(), Some(1300));
        assert_eq!(summary.unique_clients, 3);
        assert_eq!(summary.active_days, 2);
        assert_eq!(summary.active_barbers.len(), 2);
        assert_eq!(summary.total_records, 5);
        assert_eq!(summary.period(), "07/01/2030 to 09/01/2030");
        assert_eq!(summary.by_status.get("cancelled"), Some(&1));
    }

    #[test]
    fn empty_summary_has_no_average() {
        let summary = shop_summary(&[], utc());
        assert_eq!(summary.average_cents(), None);
        assert_eq!(summary.period(), "");
        assert_eq!(summary.to_rows().len(), 7);
    }

    #[tokio::test]
    async fn archive_moves_matching_rows_into_workbooks() {
        let pool = testing::pool().await;
        let dir = tempfile::tempdir().unwrap();
        let client = user(&pool, "ana@test.dev", true, 0).await;
        let leo = barber(&pool, "Leo").await;
        let cut = service(&pool, "Cut", 1500).await;

        let old_booked = slot(&pool, &leo, Some(cut.as_str()), at("2030-01-02", "10:00"), "booked", Some(client.as_str())).await;
        let old_done = slot(&pool, &leo, Some(cut.as_str()), at("2030-01-03", "10:00"), "completed", Some(client.as_str())).await;
        let old_cancelled = slot(&pool, &leo, Some(cut.as_str()), at("2030-01-04", "10:00"), "cancelled", Some(client.as_str())).await;
        let old_free = slot(&pool, &leo, Some(cut.as_str()), at("2030-01-05", "10:00"), "available", None).await;
        let recent = slot(&pool, &leo, Some(cut.as_str()), at("2030-02-20", "10:00"), "booked", Some(client.as_str())).await;
        sqlx::query(
            "INSERT INTO notifications (id, appointment_id, kind, message, read, created_at) VALUES ('n1', ?, 'booked', 'x', 0, ?)",
        )
        .bind(&old_booked)
        .bind(at("2030-01-01", "09:00"))
        .execute(&pool)
        .await
        .unwrap();

        let now = at("2030-02-25", "12:00");
        let report = run_archive(&pool, dir.path(), &ArchiveOptions::default(), now, utc())
            .await
            .unwrap();
        let summary = match report {
            ArchiveReport::Archived(summary) => summary,
            other => panic!("unexpected report: {other:?}"),
        };
        assert_eq!(summary.archived, 3);
        assert!(!summary.history_recreated);

        let remaining: Vec<String> = sqlx::query_scalar("SELECT id FROM appointments ORDER BY scheduled_at")
            .fetch_all(&pool)
            .await
            .unwrap();
        assert_eq!(remaining, [old_free.clone(), recent.clone()]);

        let archived = sheet_rows(&summary.individual_path, "Archived");
        assert_eq!(archived[0], ROW_HEADER.map(String::from).to_vec());
        let ids: Vec<&str> = archived[1..].iter().map(|row| row[0].as_str()).collect();
        assert_eq!(ids, [old_booked.as_str(), old_done.as_str(), old_cancelled.as_str()]);
        assert_eq!(archived[1][6], "$15.00");
        assert_eq!(sheet_rows(&summary.individual_path, "Barber stats")[1][1], "2");
        assert!(summary
            .individual_path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .ends_with("--25-02-2030--12-00-00--3-appointments.xlsx"));

        let history = sheet_rows(&summary.history_path, "History");
        assert_eq!(history.len(), 4);

        let files = list_archive_files(&pool).await.unwrap();
        assert_eq!(files.len(), 2);
        let individual = files.iter().find(|f| f.kind == ARCHIVE_KIND_INDIVIDUAL).unwrap();
        assert_eq!(individual.appointment_count, 3);
        assert_eq!(individual.period_start, NaiveDate::from_ymd_opt(2030, 1, 2));
        let stored = get_archive_file(&pool, &individual.id).await.unwrap();
        assert_eq!(stored.content, fs::read(&summary.individual_path).unwrap());

        let orphaned: Option<String> = sqlx::query_scalar("SELECT appointment_id FROM notifications WHERE id = 'n1'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(orphaned, None);
    }

    #[tokio::test]
    async fn history_accumulates_across_runs() {
        let pool = testing::pool().await;
        let dir = tempfile::tempdir().unwrap();
        let client = user(&pool, "ana@test.dev", true, 0).await;
        let leo = barber(&pool, "Leo").await;

        slot(&pool, &leo, None, at("2030-01-02", "10:00"), "completed", Some(client.as_str())).await;
        let first = run_archive(&pool, dir.path(), &ArchiveOptions::default(), at("2030-03-01", "08:00"), utc())
            .await
            .unwrap();
        assert!(matches!(first, ArchiveReport::Archived(_)));

        slot(&pool, &leo, None, at("2030-02-02", "10:00"), "completed", Some(client.as_str())).await;
        slot(&pool, &leo, None, at("2030-02-03", "10:00"), "booked", Some(client.as_str())).await;
        let second = run_archive(&pool, dir.path(), &ArchiveOptions::default(), at("2030-03-10", "08:00"), utc())
            .await
            .unwrap();
        let ArchiveReport::Archived(summary) = second else {
            panic!("second run archived nothing");
        };
        assert_eq!(summary.archived, 2);

        let history = sheet_rows(&summary.history_path, "History");
        assert_eq!(history.len(), 4);

        let files = list_archive_files(&pool).await.unwrap();
        let kinds: Vec<&str> = files.iter().map(|f| f.kind.as_str()).collect();
        assert_eq!(kinds.iter().filter(|k| **k == ARCHIVE_KIND_HISTORY).count(), 1);
        assert_eq!(kinds.iter().filter(|k| **k == ARCHIVE_KIND_INDIVIDUAL).count(), 2);
    }

    #[tokio::test]
    async fn unreadable_history_is_recreated() {
        let pool = testing::pool().await;
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(HISTORY_FILE_NAME), b"not a workbook").unwrap();
        let client = user(&pool, "ana@test.dev", true, 0).await;
        let leo = barber(&pool, "Leo").await;
        slot(&pool, &leo, None, at("2030-01-02", "10:00"), "completed", Some(client.as_str())).await;

        let report = run_archive(&pool, dir.path(), &ArchiveOptions::default(), at("2030-03-01", "08:00"), utc())
            .await
            .unwrap();
        let ArchiveReport::Archived(summary) = report else {
            panic!("nothing archived");
        };
        assert!(summary.history_recreated);
        assert_eq!(sheet_rows(&summary.history_path, "History").len(), 2);
    }

    #[tokio::test]
    async fn dry_run_changes_nothing() {
        let pool = testing::pool().await;
        let dir = tempfile::tempdir().unwrap();
        let client = user(&pool, "ana@test.dev", true, 0).await;
        let leo = barber(&pool, "Leo").await;
        slot(&pool, &leo, None, at("2030-01-02", "10:00"), "completed", Some(client.as_str())).await;

        let options = ArchiveOptions {
            dry_run: true,
            ..ArchiveOptions::default()
        };
        let report = run_archive(&pool, dir.path(), &options, at("2030-03-01", "08:00"), utc())
            .await
            .unwrap();
        match report {
            ArchiveReport::Preview { rows, .. } => assert_eq!(rows.len(), 1),
            other => panic!("unexpected report: {other:?}"),
        }
        assert_eq!(appointment_count(&pool).await, 1);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
        assert!(list_archive_files(&pool).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn nothing_to_archive_writes_no_files() {
        let pool = testing::pool().await;
        let dir = tempfile::tempdir().unwrap();
        let leo = barber(&pool, "Leo").await;
        slot(&pool, &leo, None, at("2030-01-02", "10:00"), "available", None).await;

        let report = run_archive(&pool, dir.path(), &ArchiveOptions::default(), at("2030-03-01", "08:00"), utc())
            .await
            .unwrap();
        assert!(matches!(report, ArchiveReport::Nothing { .. }));
        assert_eq!(appointment_count(&pool).await, 1);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
