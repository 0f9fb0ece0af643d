//! Remote image hosting: public-id parsing, the Cloudinary client and the
//! orphan audit.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use sqlx::SqlitePool;
use thiserror::Error;

use crate::config::ImageHostConfig;

const API_BASE: &str = "https://api.cloudinary.com/v1_1";
const MAX_RESULTS: u32 = 500;

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("image host is not configured")]
    Disabled,

    #[error("image host request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("image host answered {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteImage {
    pub public_id: String,
    pub secure_url: String,
    #[serde(default)]
    pub bytes: u64,
    #[serde(default)]
    pub format: String,
}

#[async_trait]
pub trait ImageHost: Send + Sync {
    /// Deletes one asset. `Ok(false)` when the host did not delete anything.
    async fn destroy(&self, public_id: &str) -> Result<bool, AssetError>;

    async fn list_resources(&self) -> Result<Vec<RemoteImage>, AssetError>;
}

/// Public id of a Cloudinary delivery URL, e.g.
/// `https://res.cloudinary.com/demo/image/upload/v1712/barbers/leo.jpg` -> `barbers/leo`.
pub fn extract_public_id(url: &str) -> Option<String> {
    if !url.contains("cloudinary.com") {
        return None;
    }
    let (_, path) = url.split_once("/upload/")?;
    let path = path.split(['?', '#']).next().unwrap_or(path);

    let path = match path.split_once('/') {
        Some((version, rest))
            if version.len() > 1
                && version.starts_with('v')
                && version[1..].chars().all(|c| c.is_ascii_digit()) =>
        {
            rest
        }
        _ => path,
    };

    let (dir, file) = match path.rsplit_once('/') {
        Some((dir, file)) => (Some(dir), file),
        None => (None, path),
    };
    let stem = file.rsplit_once('.').map_or(file, |(stem, _)| stem);
    if stem.is_empty() {
        return None;
    }

    Some(match dir {
        Some(dir) => format!("{dir}/{stem}"),
        None => stem.to_string(),
    })
}

/// Cloudinary request signature: SHA-1 over the sorted `key=value` pairs joined
/// with `&`, followed by the API secret.
pub fn sign_params(params: &[(&str, String)], secret: &str) -> String {
    let mut sorted: Vec<_> = params.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    let joined = sorted
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&");

    let mut hasher = Sha1::new();
    hasher.update(joined.as_bytes());
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

pub struct CloudinaryHost {
    client: reqwest::Client,
    config: ImageHostConfig,
}

impl CloudinaryHost {
    pub fn new(config: ImageHostConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{API_BASE}/{}/{path}", self.config.cloud_name)
    }
}

#[derive(Deserialize)]
struct DestroyResponse {
    result: String,
}

#[derive(Deserialize)]
struct ResourcePage {
    #[serde(default)]
    resources: Vec<RemoteImage>,
    next_cursor: Option<String>,
}

#[async_trait]
impl ImageHost for CloudinaryHost {
    async fn destroy(&self, public_id: &str) -> Result<bool, AssetError> {
        let timestamp = Utc::now().timestamp().to_string();
        let signature = sign_params(
            &[
                ("public_id", public_id.to_string()),
                ("timestamp", timestamp.clone()),
            ],
            &self.config.api_secret,
        );

        let response = self
            .client
            .post(self.endpoint("image/destroy"))
            .form(&[
                ("public_id", public_id),
                ("timestamp", timestamp.as_str()),
                ("api_key", self.config.api_key.as_str()),
                ("signature", signature.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AssetError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let body: DestroyResponse = response.json().await?;
        Ok(body.result == "ok")
    }

    async fn list_resources(&self) -> Result<Vec<RemoteImage>, AssetError> {
        let mut images = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let mut request = self
                .client
                .get(self.endpoint("resources/image/upload"))
                .basic_auth(&self.config.api_key, Some(&self.config.api_secret))
                .query(&[("max_results", MAX_RESULTS.to_string())]);
            if let Some(next) = &cursor {
                request = request.query(&[("next_cursor", next)]);
            }

            let response = request.send().await?;
            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(AssetError::Rejected {
                    status: status.as_u16(),
                    body,
                });
            }

            let page: ResourcePage = response.json().await?;
            images.extend(page.resources);
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        Ok(images)
    }
}

/// Stand-in used when no image host credentials are configured.
pub struct DisabledHost;

#[async_trait]
impl ImageHost for DisabledHost {
    async fn destroy(&self, public_id: &str) -> Result<bool, AssetError> {
        log::debug!("Image host disabled, keeping remote asset {public_id}");
        Ok(false)
    }

    async fn list_resources(&self) -> Result<Vec<RemoteImage>, AssetError> {
        Err(AssetError::Disabled)
    }
}

/// Best-effort removal of the remote copy of `url`. Never fails the caller.
pub async fn release_image(host: &dyn ImageHost, url: Option<&str>) -> bool {
    let Some(url) = url.filter(|url| !url.trim().is_empty()) else {
        return false;
    };
    let Some(public_id) = extract_public_id(url) else {
        log::debug!("Not a hosted image, nothing to release: {url}");
        return false;
    };

    match host.destroy(&public_id).await {
        Ok(true) => {
            log::info!("Released remote image {public_id}");
            true
        }
        Ok(false) => {
            log::warn!("Image host did not delete {public_id}");
            false
        }
        Err(err) => {
            log::error!("Failed to release remote image {public_id}: {err}");
            false
        }
    }
}

/// Every image URL still referenced by a catalog row.
pub async fn referenced_image_urls(pool: &SqlitePool) -> Result<HashSet<String>, sqlx::Error> {
    let urls = sqlx::query_scalar::<_, String>(
        r#"SELECT photo_url FROM barbers WHERE photo_url IS NOT NULL
           UNION SELECT image_url FROM services WHERE image_url IS NOT NULL
           UNION SELECT image_url FROM courses WHERE image_url IS NOT NULL
           UNION SELECT image_url FROM products WHERE image_url IS NOT NULL
           UNION SELECT image_url FROM carousel_images
           UNION SELECT image_url FROM barber_works"#,
    )
    .fetch_all(pool)
    .await?;
    Ok(urls.into_iter().collect())
}

#[derive(Debug, Default, Serialize)]
pub struct AuditReport {
    pub total: usize,
    pub in_use: usize,
    pub orphans: Vec<RemoteImage>,
    pub deleted: usize,
}

/// Compares the remote library against stored URLs. With `delete` the orphans
/// are destroyed one by one; individual failures are logged and skipped.
pub async fn audit_orphans(
    pool: &SqlitePool,
    host: &dyn ImageHost,
    delete: bool,
) -> Result<AuditReport, AssetError> {
    let urls = referenced_image_urls(pool).await?;
    let referenced_ids: HashSet<String> =
        urls.iter().filter_map(|url| extract_public_id(url)).collect();

    let resources = host.list_resources().await?;
    let mut report = AuditReport {
        total: resources.len(),
        ..AuditReport::default()
    };

    for image in resources {
        if urls.contains(&image.secure_url) || referenced_ids.contains(&image.public_id) {
            report.in_use += 1;
        } else {
            report.orphans.push(image);
        }
    }

    if delete {
        for image in &report.orphans {
            match host.destroy(&image.public_id).await {
                Ok(true) => report.deleted += 1,
                Ok(false) => log::warn!("Orphan {} was not deleted", image.public_id),
                Err(err) => log::error!("Failed to delete orphan {}: {err}", image.public_id),
            }
        }
    }

    log::info!(
        "Asset audit: {} remote, {} in use, {} orphaned, {} deleted",
        report.total,
        report.in_use,
        report.orphans.len(),
        report.deleted
    );
    Ok(report)
}
