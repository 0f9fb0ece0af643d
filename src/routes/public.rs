use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use crate::{
    booking::available_slots,
    catalog,
    error::AppResult,
    state::AppState,
    users::{register, NewUser},
};

#[derive(Deserialize)]
struct SlotQuery {
    barber_id: Option<String>,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/health").route(web::get().to(health)))
        .service(web::resource("/barbers").route(web::get().to(barbers)))
        .service(web::resource("/barbers/{id}").route(web::get().to(barber_profile)))
        .service(web::resource("/services").route(web::get().to(services)))
        .service(web::resource("/products").route(web::get().to(products)))
        .service(web::resource("/courses").route(web::get().to(courses)))
        .service(web::resource("/carousel").route(web::get().to(carousel)))
        .service(web::resource("/slots").route(web::get().to(slots)))
        .service(web::resource("/register").route(web::post().to(sign_up)));
}

async fn health(state: web::Data<AppState>) -> HttpResponse {
    match sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(&state.db).await {
        Ok(_) => HttpResponse::Ok().json(json!({ "status": "ok" })),
        Err(err) => {
            log::error!("Health check failed: {err}");
            HttpResponse::ServiceUnavailable().json(json!({ "status": "unavailable" }))
        }
    }
}

async fn barbers(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(catalog::list_barbers(&state.db).await?))
}

async fn barber_profile(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(catalog::barber_profile(&state.db, &path.into_inner()).await?))
}

async fn services(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(catalog::list_services(&state.db).await?))
}

async fn products(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(catalog::list_products(&state.db).await?))
}

async fn courses(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(catalog::list_courses(&state.db).await?))
}

async fn carousel(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(catalog::list_carousel(&state.db).await?))
}

async fn slots(
    state: web::Data<AppState>,
    query: web::Query<SlotQuery>,
) -> AppResult<HttpResponse> {
    let barber_id = query.barber_id.as_deref().filter(|id| !id.trim().is_empty());
    let days = available_slots(&state.db, barber_id, Utc::now(), state.config.local_offset()).await?;
    Ok(HttpResponse::Ok().json(days))
}

async fn sign_up(state: web::Data<AppState>, payload: web::Json<NewUser>) -> AppResult<HttpResponse> {
    let user = register(&state.db, payload.into_inner()).await?;
    Ok(HttpResponse::Created().json(json!({
        "user": user,
        "message": "Account created. The barbershop will enable it before you can book."
    })))
}
