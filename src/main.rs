use std::{path::PathBuf, sync::Arc};

use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use sqlx::SqlitePool;

use barbershop::{
    archive::{run_archive, ArchiveOptions, ArchiveReport, StatusSelection},
    assets::{audit_orphans, CloudinaryHost, DisabledHost, ImageHost},
    booking::expire_slots,
    config::AppConfig,
    db,
    models::AppointmentStatus,
    routes,
    state::AppState,
};

#[derive(Parser)]
#[command(name = "barbershop")]
#[command(about = "Barbershop booking service")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server (default)
    Serve,
    /// Create the configured superuser if it does not exist
    CreateSuperuser,
    /// Mark past-due available slots as expired
    ExpireSlots {
        /// Only list the slots that would expire
        #[arg(long)]
        dry_run: bool,
    },
    /// Move old appointments into spreadsheets and delete them
    Archive {
        /// Archive appointments older than this many days
        #[arg(long, value_parser = clap::value_parser!(i64).range(0..))]
        days: Option<i64>,
        /// Statuses to archive (comma-separated)
        #[arg(long, value_delimiter = ',')]
        statuses: Vec<AppointmentStatus>,
        /// Also archive available and expired slots
        #[arg(long)]
        include_available: bool,
        /// Only archive booked and completed appointments
        #[arg(long)]
        only_booked: bool,
        /// Show what would be archived without writing or deleting
        #[arg(long)]
        dry_run: bool,
        /// Output directory for the workbooks
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// Find images on the host that no record references
    AuditAssets {
        /// Delete the orphaned images
        #[arg(long)]
        delete: bool,
    },
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = AppConfig::from_env()?;
    let pool = open_database(&config).await?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(pool, config).await,
        Commands::CreateSuperuser => {
            if db::create_superuser(&pool, &config.superuser).await? {
                println!("Superuser {} created", config.superuser.email);
            } else {
                println!("Superuser {} already exists", config.superuser.email);
            }
            Ok(())
        }
        Commands::ExpireSlots { dry_run } => {
            let slots = expire_slots(&pool, Utc::now(), dry_run).await?;
            let verb = if dry_run { "Would expire" } else { "Expired" };
            println!("{verb} {} slots", slots.len());
            for slot in &slots {
                println!("  {} {} {}", slot.id, slot.scheduled_at, slot.barber_name);
            }
            Ok(())
        }
        Commands::Archive {
            days,
            statuses,
            include_available,
            only_booked,
            dry_run,
            dir,
        } => {
            let mut options = ArchiveOptions {
                statuses: StatusSelection {
                    explicit: statuses,
                    include_available,
                    only_booked,
                },
                dry_run,
                ..ArchiveOptions::default()
            };
            if let Some(days) = days {
                options.days = days;
            }
            let dir = dir.unwrap_or_else(|| config.archive_dir.clone());
            let report =
                run_archive(&pool, &dir, &options, Utc::now(), config.local_offset()).await?;
            print_archive_report(&report);
            Ok(())
        }
        Commands::AuditAssets { delete } => {
            if !config.image_host.enabled() {
                anyhow::bail!("image host credentials are not configured");
            }
            let host = CloudinaryHost::new(config.image_host.clone());
            let report = audit_orphans(&pool, &host, delete).await?;
            println!(
                "{} remote images, {} in use, {} orphaned",
                report.total,
                report.in_use,
                report.orphans.len()
            );
            for image in &report.orphans {
                println!("  {} {} ({} bytes)", image.public_id, image.secure_url, image.bytes);
            }
            if delete {
                println!("Deleted {} orphans", report.deleted);
            }
            Ok(())
        }
    }
}

async fn open_database(config: &AppConfig) -> anyhow::Result<SqlitePool> {
    db::ensure_sqlite_dir(&config.database_url)
        .with_context(|| format!("creating directory for {}", config.database_url))?;
    let pool = db::connect(&config.database_url, 5).await?;
    db::run_migrations(&pool).await?;
    Ok(pool)
}

async fn serve(pool: SqlitePool, config: AppConfig) -> anyhow::Result<()> {
    if db::create_superuser(&pool, &config.superuser).await? {
        log::info!("Created superuser {}", config.superuser.email);
    }

    let assets: Arc<dyn ImageHost> = if config.image_host.enabled() {
        Arc::new(CloudinaryHost::new(config.image_host.clone()))
    } else {
        log::warn!("Image host not configured; replaced images will not be deleted remotely");
        Arc::new(DisabledHost)
    };

    let address = format!("0.0.0.0:{}", config.port);
    let state = AppState::new(pool, assets, config);
    log::info!("Starting barbershop on http://{address}");

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .wrap(middleware::Logger::default())
            .configure(routes::configure)
    })
    .bind(address)?
    .run()
    .await?;

    Ok(())
}

fn print_archive_report(report: &ArchiveReport) {
    let list = |statuses: &[AppointmentStatus]| {
        statuses
            .iter()
            .map(AppointmentStatus::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    };
    match report {
        ArchiveReport::Nothing { cutoff, statuses } => {
            println!("Nothing to archive before {cutoff} ({})", list(statuses));
        }
        ArchiveReport::Preview {
            cutoff,
            statuses,
            rows,
        } => {
            println!(
                "Dry run: {} appointments before {cutoff} ({}) would be archived",
                rows.len(),
                list(statuses)
            );
            for row in rows {
                println!(
                    "  {} {} {} {}",
                    row.id,
                    row.scheduled_at,
                    row.barber_name,
                    row.status
                );
            }
        }
        ArchiveReport::Archived(summary) => {
            println!(
                "Archived {} appointments before {} ({})",
                summary.archived,
                summary.cutoff,
                list(&summary.statuses)
            );
            println!("  individual: {}", summary.individual_path.display());
            println!("  history:    {}", summary.history_path.display());
            if summary.history_recreated {
                println!("  history workbook was unreadable and has been recreated");
            }
        }
    }
}
