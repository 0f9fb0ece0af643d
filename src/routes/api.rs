use actix_web::{web, HttpResponse};
use actix_web_httpauth::middleware::HttpAuthentication;
use serde::Deserialize;

use crate::{
    auth::{staff_validator, AuthUser},
    booking::{create_slot, delete_appointment, list_appointments, set_status, AppointmentFilter, NewSlot},
    catalog,
    db::fetch_appointment_detail,
    error::{AppError, AppResult},
    models::AppointmentStatus,
    routes::staff::{
        create_product, create_service, delete_product, delete_service, update_product,
        update_service,
    },
    state::AppState,
    users::{self, NewUser, UserPatch},
};

#[derive(Deserialize)]
struct AppointmentPatch {
    status: AppointmentStatus,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .wrap(HttpAuthentication::basic(staff_validator))
            .service(
                web::resource("/users")
                    .route(web::get().to(list_users))
                    .route(web::post().to(create_user)),
            )
            .service(
                web::resource("/users/{id}")
                    .route(web::get().to(get_user))
                    .route(web::patch().to(update_user))
                    .route(web::delete().to(delete_user)),
            )
            .service(
                web::resource("/services")
                    .route(web::get().to(list_services))
                    .route(web::post().to(create_service)),
            )
            .service(
                web::resource("/services/{id}")
                    .route(web::get().to(get_service))
                    .route(web::patch().to(update_service))
                    .route(web::delete().to(delete_service)),
            )
            .service(
                web::resource("/products")
                    .route(web::get().to(list_products))
                    .route(web::post().to(create_product)),
            )
            .service(
                web::resource("/products/{id}")
                    .route(web::get().to(get_product))
                    .route(web::patch().to(update_product))
                    .route(web::delete().to(delete_product)),
            )
            .service(
                web::resource("/appointments")
                    .route(web::get().to(list_all_appointments))
                    .route(web::post().to(create_appointment)),
            )
            .service(
                web::resource("/appointments/{id}")
                    .route(web::get().to(get_appointment))
                    .route(web::patch().to(update_appointment))
                    .route(web::delete().to(remove_appointment)),
            ),
    );
}

async fn list_users(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(users::list_users(&state.db).await?))
}

async fn create_user(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    payload: web::Json<NewUser>,
) -> AppResult<HttpResponse> {
    let user = users::create_user(&state.db, &auth, payload.into_inner()).await?;
    log::info!("{} created user {}", auth.email, user.email);
    Ok(HttpResponse::Created().json(user))
}

async fn get_user(state: web::Data<AppState>, path: web::Path<String>) -> AppResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(users::get_user(&state.db, &path.into_inner()).await?))
}

async fn update_user(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<String>,
    payload: web::Json<UserPatch>,
) -> AppResult<HttpResponse> {
    let user =
        users::update_user(&state.db, &auth, &path.into_inner(), payload.into_inner()).await?;
    Ok(HttpResponse::Ok().json(user))
}

async fn delete_user(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let id = path.into_inner();
    users::delete_user(&state.db, &auth, &id).await?;
    log::info!("{} deleted user {id}", auth.email);
    Ok(HttpResponse::NoContent().finish())
}

async fn list_services(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(catalog::list_services(&state.db).await?))
}

async fn get_service(state: web::Data<AppState>, path: web::Path<String>) -> AppResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(catalog::get_service(&state.db, &path.into_inner()).await?))
}

async fn list_products(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(catalog::list_products(&state.db).await?))
}

async fn get_product(state: web::Data<AppState>, path: web::Path<String>) -> AppResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(catalog::get_product(&state.db, &path.into_inner()).await?))
}

async fn list_all_appointments(
    state: web::Data<AppState>,
    query: web::Query<AppointmentFilter>,
) -> AppResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(list_appointments(&state.db, &query).await?))
}

async fn create_appointment(
    state: web::Data<AppState>,
    payload: web::Json<NewSlot>,
) -> AppResult<HttpResponse> {
    Ok(HttpResponse::Created().json(create_slot(&state.db, &payload).await?))
}

async fn get_appointment(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let appointment = fetch_appointment_detail(&state.db, &path.into_inner())
        .await?
        .ok_or(AppError::NotFound("appointment"))?;
    Ok(HttpResponse::Ok().json(appointment))
}

async fn update_appointment(
    state: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<AppointmentPatch>,
) -> AppResult<HttpResponse> {
    let outcome = set_status(
        &state.db,
        &path.into_inner(),
        payload.status,
        state.config.local_offset(),
    )
    .await?;
    state.publish(&outcome.notifications);
    Ok(HttpResponse::Ok().json(outcome.appointment))
}

async fn remove_appointment(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    delete_appointment(&state.db, &path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}
