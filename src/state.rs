use std::sync::Arc;

use serde::Serialize;
use sqlx::SqlitePool;
use tokio::sync::broadcast;

use crate::{assets::ImageHost, config::AppConfig, models::Notification};

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub events: broadcast::Sender<ServerEvent>,
    pub assets: Arc<dyn ImageHost>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(db: SqlitePool, assets: Arc<dyn ImageHost>, config: AppConfig) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            db,
            events,
            assets,
            config: Arc::new(config),
        }
    }

    /// Pushes freshly created notifications to connected staff dashboards.
    pub fn publish(&self, notifications: &[Notification]) {
        for notification in notifications {
            // No subscribers is the common case outside the dashboard.
            let _ = self.events.send(ServerEvent::from_notification(notification));
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct ServerEvent {
    pub kind: String,
    pub notification_id: String,
    pub appointment_id: Option<String>,
    pub message: String,
    pub created_at: String,
}

impl ServerEvent {
    pub fn from_notification(notification: &Notification) -> Self {
        Self {
            kind: notification.kind.clone(),
            notification_id: notification.id.clone(),
            appointment_id: notification.appointment_id.clone(),
            message: notification.message.clone(),
            created_at: notification.created_at.to_rfc3339(),
        }
    }
}
