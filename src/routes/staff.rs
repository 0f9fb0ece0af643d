use actix_web::{http::header, web, HttpResponse};
use actix_web_httpauth::middleware::HttpAuthentication;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use crate::{
    archive::{get_archive_file, list_archive_files},
    auth::{staff_validator, AuthUser},
    booking::{
        create_slots, disable_user, enable_user, expire_slots, list_appointments, set_status,
        AppointmentFilter, SlotBatch,
    },
    catalog::{
        self, BarberInput, BarberPatch, CarouselInput, CarouselPatch, CourseInput, CoursePatch,
        ProductInput, ProductPatch, ServiceInput, ServicePatch, SocialLinkInput, WorkInput,
    },
    db::{list_notifications, mark_all_notifications_read, mark_notification_read},
    error::{AppError, AppResult},
    models::AppointmentStatus,
    reports::{self, CountFilter},
    routes::events::stream_notifications,
    state::AppState,
    users::check_can_manage,
};

const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

#[derive(Deserialize)]
struct StatusChange {
    status: AppointmentStatus,
}

#[derive(Deserialize)]
struct ExpireQuery {
    #[serde(default)]
    dry_run: bool,
}

#[derive(Deserialize)]
struct NotificationQuery {
    #[serde(default)]
    unread: bool,
    limit: Option<i64>,
}

#[derive(Deserialize)]
struct TopQuery {
    limit: Option<i64>,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/staff")
            .wrap(HttpAuthentication::basic(staff_validator))
            .service(web::resource("/events").route(web::get().to(stream_notifications)))
            .service(web::resource("/slots").route(web::post().to(add_slots)))
            .service(web::resource("/slots/expire").route(web::post().to(expire)))
            .service(web::resource("/appointments").route(web::get().to(appointments)))
            .service(web::resource("/appointments/{id}/status").route(web::post().to(change_status)))
            .service(web::resource("/users/{id}/enable").route(web::post().to(enable)))
            .service(web::resource("/users/{id}/disable").route(web::post().to(disable)))
            .service(web::resource("/notifications").route(web::get().to(notifications)))
            .service(web::resource("/notifications/read-all").route(web::post().to(read_all)))
            .service(web::resource("/notifications/{id}/read").route(web::post().to(read_one)))
            .service(web::resource("/reports/top-services").route(web::get().to(top_services)))
            .service(web::resource("/reports/income").route(web::get().to(income)))
            .service(web::resource("/reports/count").route(web::get().to(count)))
            .service(web::resource("/reports/barbers/{id}").route(web::get().to(barber_report)))
            .service(web::resource("/archive/files").route(web::get().to(archive_files)))
            .service(web::resource("/archive/files/{id}").route(web::get().to(download_archive)))
            .service(web::resource("/barbers").route(web::post().to(create_barber)))
            .service(
                web::resource("/barbers/{id}")
                    .route(web::patch().to(update_barber))
                    .route(web::delete().to(delete_barber)),
            )
            .service(web::resource("/barbers/{id}/works").route(web::post().to(add_work)))
            .service(web::resource("/works/{id}").route(web::delete().to(delete_work)))
            .service(web::resource("/barbers/{id}/social-links").route(web::post().to(add_link)))
            .service(
                web::resource("/barbers/{id}/social-links/order").route(web::put().to(reorder_links)),
            )
            .service(
                web::resource("/barbers/{id}/social-links/{link_id}")
                    .route(web::delete().to(delete_link)),
            )
            .service(web::resource("/services").route(web::post().to(create_service)))
            .service(
                web::resource("/services/{id}")
                    .route(web::patch().to(update_service))
                    .route(web::delete().to(delete_service)),
            )
            .service(web::resource("/courses").route(web::post().to(create_course)))
            .service(
                web::resource("/courses/{id}")
                    .route(web::patch().to(update_course))
                    .route(web::delete().to(delete_course)),
            )
            .service(web::resource("/products").route(web::post().to(create_product)))
            .service(
                web::resource("/products/{id}")
                    .route(web::patch().to(update_product))
                    .route(web::delete().to(delete_product)),
            )
            .service(web::resource("/carousel").route(web::post().to(create_carousel)))
            .service(
                web::resource("/carousel/{id}")
                    .route(web::patch().to(update_carousel))
                    .route(web::delete().to(delete_carousel)),
            ),
    );
}

async fn add_slots(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    payload: web::Json<SlotBatch>,
) -> AppResult<HttpResponse> {
    let created = create_slots(&state.db, &payload, state.config.local_offset()).await?;
    log::info!("{} added {created} slots", auth.email);
    Ok(HttpResponse::Created().json(json!({ "created": created })))
}

async fn expire(
    state: web::Data<AppState>,
    query: web::Query<ExpireQuery>,
) -> AppResult<HttpResponse> {
    let slots = expire_slots(&state.db, Utc::now(), query.dry_run).await?;
    Ok(HttpResponse::Ok().json(json!({
        "dry_run": query.dry_run,
        "expired": slots.len(),
        "slots": slots,
    })))
}

async fn appointments(
    state: web::Data<AppState>,
    query: web::Query<AppointmentFilter>,
) -> AppResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(list_appointments(&state.db, &query).await?))
}

async fn change_status(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<String>,
    payload: web::Json<StatusChange>,
) -> AppResult<HttpResponse> {
    let outcome = set_status(
        &state.db,
        &path.into_inner(),
        payload.status,
        state.config.local_offset(),
    )
    .await?;
    log::info!(
        "{} set appointment {} to {}",
        auth.email,
        outcome.appointment.id,
        payload.status
    );
    state.publish(&outcome.notifications);
    Ok(HttpResponse::Ok().json(outcome.appointment))
}

async fn enable(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let id = path.into_inner();
    check_can_manage(&state.db, &auth, &id).await?;
    enable_user(&state.db, &id).await?;
    Ok(HttpResponse::NoContent().finish())
}

async fn disable(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let id = path.into_inner();
    check_can_manage(&state.db, &auth, &id).await?;
    disable_user(&state.db, &id).await?;
    Ok(HttpResponse::NoContent().finish())
}

async fn notifications(
    state: web::Data<AppState>,
    query: web::Query<NotificationQuery>,
) -> AppResult<HttpResponse> {
    let limit = query.limit.unwrap_or(50).clamp(1, 500);
    Ok(HttpResponse::Ok().json(list_notifications(&state.db, query.unread, limit).await?))
}

async fn read_one(state: web::Data<AppState>, path: web::Path<String>) -> AppResult<HttpResponse> {
    if !mark_notification_read(&state.db, &path.into_inner()).await? {
        return Err(AppError::NotFound("notification"));
    }
    Ok(HttpResponse::NoContent().finish())
}

async fn read_all(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    let updated = mark_all_notifications_read(&state.db).await?;
    Ok(HttpResponse::Ok().json(json!({ "updated": updated })))
}

async fn top_services(
    state: web::Data<AppState>,
    query: web::Query<TopQuery>,
) -> AppResult<HttpResponse> {
    let limit = query.limit.unwrap_or(5).clamp(1, 100);
    Ok(HttpResponse::Ok().json(reports::top_services(&state.db, limit).await?))
}

async fn income(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(reports::income_by_barber(&state.db).await?))
}

async fn count(
    state: web::Data<AppState>,
    query: web::Query<CountFilter>,
) -> AppResult<HttpResponse> {
    let total = reports::count_appointments(&state.db, &query).await?;
    Ok(HttpResponse::Ok().json(json!({ "total": total })))
}

async fn barber_report(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(reports::barber_summary(&state.db, &path.into_inner()).await?))
}

async fn archive_files(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(list_archive_files(&state.db).await?))
}

async fn download_archive(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let file = get_archive_file(&state.db, &path.into_inner()).await?;
    Ok(HttpResponse::Ok()
        .insert_header((header::CONTENT_TYPE, XLSX_MIME))
        .insert_header((
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", file.file_name),
        ))
        .body(file.content))
}

async fn create_barber(
    state: web::Data<AppState>,
    payload: web::Json<BarberInput>,
) -> AppResult<HttpResponse> {
    Ok(HttpResponse::Created().json(catalog::create_barber(&state.db, payload.into_inner()).await?))
}

async fn update_barber(
    state: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<BarberPatch>,
) -> AppResult<HttpResponse> {
    let barber =
        catalog::update_barber(&state.db, state.assets.as_ref(), &path.into_inner(), payload.into_inner())
            .await?;
    Ok(HttpResponse::Ok().json(barber))
}

async fn delete_barber(state: web::Data<AppState>, path: web::Path<String>) -> AppResult<HttpResponse> {
    catalog::delete_barber(&state.db, state.assets.as_ref(), &path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

async fn add_work(
    state: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<WorkInput>,
) -> AppResult<HttpResponse> {
    let work = catalog::add_barber_work(&state.db, &path.into_inner(), payload.into_inner()).await?;
    Ok(HttpResponse::Created().json(work))
}

async fn delete_work(state: web::Data<AppState>, path: web::Path<String>) -> AppResult<HttpResponse> {
    catalog::delete_barber_work(&state.db, state.assets.as_ref(), &path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

async fn add_link(
    state: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<SocialLinkInput>,
) -> AppResult<HttpResponse> {
    let link = catalog::add_social_link(&state.db, &path.into_inner(), payload.into_inner()).await?;
    Ok(HttpResponse::Created().json(link))
}

async fn reorder_links(
    state: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<Vec<String>>,
) -> AppResult<HttpResponse> {
    let links = catalog::reorder_social_links(&state.db, &path.into_inner(), &payload).await?;
    Ok(HttpResponse::Ok().json(links))
}

async fn delete_link(
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
) -> AppResult<HttpResponse> {
    let (barber_id, link_id) = path.into_inner();
    catalog::delete_social_link(&state.db, &barber_id, &link_id).await?;
    Ok(HttpResponse::NoContent().finish())
}

pub(crate) async fn create_service(
    state: web::Data<AppState>,
    payload: web::Json<ServiceInput>,
) -> AppResult<HttpResponse> {
    Ok(HttpResponse::Created().json(catalog::create_service(&state.db, payload.into_inner()).await?))
}

pub(crate) async fn update_service(
    state: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<ServicePatch>,
) -> AppResult<HttpResponse> {
    let service =
        catalog::update_service(&state.db, state.assets.as_ref(), &path.into_inner(), payload.into_inner())
            .await?;
    Ok(HttpResponse::Ok().json(service))
}

pub(crate) async fn delete_service(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    catalog::delete_service(&state.db, state.assets.as_ref(), &path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

async fn create_course(
    state: web::Data<AppState>,
    payload: web::Json<CourseInput>,
) -> AppResult<HttpResponse> {
    Ok(HttpResponse::Created().json(catalog::create_course(&state.db, payload.into_inner()).await?))
}

async fn update_course(
    state: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<CoursePatch>,
) -> AppResult<HttpResponse> {
    let course =
        catalog::update_course(&state.db, state.assets.as_ref(), &path.into_inner(), payload.into_inner())
            .await?;
    Ok(HttpResponse::Ok().json(course))
}

async fn delete_course(state: web::Data<AppState>, path: web::Path<String>) -> AppResult<HttpResponse> {
    catalog::delete_course(&state.db, state.assets.as_ref(), &path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

pub(crate) async fn create_product(
    state: web::Data<AppState>,
    payload: web::Json<ProductInput>,
) -> AppResult<HttpResponse> {
    Ok(HttpResponse::Created().json(catalog::create_product(&state.db, payload.into_inner()).await?))
}

pub(crate) async fn update_product(
    state: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<ProductPatch>,
) -> AppResult<HttpResponse> {
    let product =
        catalog::update_product(&state.db, state.assets.as_ref(), &path.into_inner(), payload.into_inner())
            .await?;
    Ok(HttpResponse::Ok().json(product))
}

pub(crate) async fn delete_product(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    catalog::delete_product(&state.db, state.assets.as_ref(), &path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

async fn create_carousel(
    state: web::Data<AppState>,
    payload: web::Json<CarouselInput>,
) -> AppResult<HttpResponse> {
    let image = catalog::create_carousel_image(&state.db, payload.into_inner()).await?;
    Ok(HttpResponse::Created().json(image))
}

async fn update_carousel(
    state: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<CarouselPatch>,
) -> AppResult<HttpResponse> {
    let image = catalog::update_carousel_image(
        &state.db,
        state.assets.as_ref(),
        &path.into_inner(),
        payload.into_inner(),
    )
    .await?;
    Ok(HttpResponse::Ok().json(image))
}

async fn delete_carousel(state: web::Data<AppState>, path: web::Path<String>) -> AppResult<HttpResponse> {
    catalog::delete_carousel_image(&state.db, state.assets.as_ref(), &path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}
