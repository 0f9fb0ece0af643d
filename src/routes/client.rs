use actix_web::{web, HttpResponse};
use actix_web_httpauth::middleware::HttpAuthentication;
use chrono::Utc;
use serde::Deserialize;

use crate::{
    auth::{client_validator, AuthUser},
    booking::{book_slot, cancel_appointment, client_appointments},
    error::AppResult,
    state::AppState,
    users::{get_user, update_profile, ProfilePatch},
};

#[derive(Default, Deserialize)]
struct BookRequest {
    service_id: Option<String>,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/me")
            .wrap(HttpAuthentication::basic(client_validator))
            .service(
                web::resource("")
                    .route(web::get().to(profile))
                    .route(web::patch().to(edit_profile)),
            )
            .service(web::resource("/appointments").route(web::get().to(appointments)))
            .service(web::resource("/appointments/{id}/book").route(web::post().to(book)))
            .service(web::resource("/appointments/{id}/cancel").route(web::post().to(cancel))),
    );
}

async fn profile(state: web::Data<AppState>, auth: web::ReqData<AuthUser>) -> AppResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(get_user(&state.db, &auth.id).await?))
}

async fn edit_profile(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    payload: web::Json<ProfilePatch>,
) -> AppResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(update_profile(&state.db, &auth.id, payload.into_inner()).await?))
}

async fn appointments(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
) -> AppResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(client_appointments(&state.db, &auth.id).await?))
}

async fn book(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<String>,
    payload: Option<web::Json<BookRequest>>,
) -> AppResult<HttpResponse> {
    let request = payload.map(web::Json::into_inner).unwrap_or_default();
    let outcome = book_slot(
        &state.db,
        &auth.id,
        &path.into_inner(),
        request.service_id.as_deref(),
        state.config.local_offset(),
    )
    .await?;
    state.publish(&outcome.notifications);
    Ok(HttpResponse::Ok().json(outcome.appointment))
}

async fn cancel(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let outcome = cancel_appointment(
        &state.db,
        &auth.id,
        &path.into_inner(),
        Utc::now(),
        state.config.local_offset(),
    )
    .await?;
    state.publish(&outcome.notifications);
    Ok(HttpResponse::Ok().json(outcome))
}
