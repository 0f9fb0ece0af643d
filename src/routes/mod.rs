use actix_web::web;

pub mod api;
pub mod client;
pub mod events;
pub mod public;
pub mod staff;

/// Registers every scope on an app.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.configure(public::configure)
        .configure(client::configure)
        .configure(staff::configure)
        .configure(api::configure);
}
