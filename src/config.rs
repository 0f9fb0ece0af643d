use std::{env, path::PathBuf};

use chrono::FixedOffset;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub port: u16,
    pub utc_offset: FixedOffset,
    pub archive_dir: PathBuf,
    pub superuser: SuperuserConfig,
    pub image_host: ImageHostConfig,
}

#[derive(Clone, Debug)]
pub struct SuperuserConfig {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Clone, Debug, Default)]
pub struct ImageHostConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
}

impl ImageHostConfig {
    pub fn enabled(&self) -> bool {
        !(self.cloud_name.trim().is_empty()
            || self.api_key.trim().is_empty()
            || self.api_secret.trim().is_empty())
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let port = match env::var("PORT") {
            Ok(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
                key: "PORT",
                value,
            })?,
            Err(_) => 8080,
        };

        let offset = var_or("SHOP_UTC_OFFSET", "-03:00");
        let utc_offset = parse_utc_offset(&offset).ok_or(ConfigError::Invalid {
            key: "SHOP_UTC_OFFSET",
            value: offset,
        })?;

        Ok(Self {
            database_url: var_or("DATABASE_URL", "sqlite://./data/barbershop.db"),
            port,
            utc_offset,
            archive_dir: PathBuf::from(var_or("ARCHIVE_DIR", "./media/archived_appointments")),
            superuser: SuperuserConfig {
                email: var_or("SUPERUSER_EMAIL", "admin@barbershop.local"),
                password: var_or("SUPERUSER_PASSWORD", "admin"),
                first_name: var_or("SUPERUSER_FIRST_NAME", "Admin"),
                last_name: var_or("SUPERUSER_LAST_NAME", "Barbershop"),
            },
            image_host: ImageHostConfig {
                cloud_name: var_or("CLOUDINARY_CLOUD_NAME", ""),
                api_key: var_or("CLOUDINARY_API_KEY", ""),
                api_secret: var_or("CLOUDINARY_API_SECRET", ""),
            },
        })
    }

    pub fn local_offset(&self) -> FixedOffset {
        self.utc_offset
    }
}

fn var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parses `+HH:MM`, `-HH:MM`, `+HH` or `Z`.
pub fn parse_utc_offset(value: &str) -> Option<FixedOffset> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("z") || value.eq_ignore_ascii_case("utc") {
        return FixedOffset::east_opt(0);
    }
    let (sign, rest) = match value.chars().next()? {
        '+' => (1, &value[1..]),
        '-' => (-1, &value[1..]),
        _ => return None,
    };
    let (hours, minutes) = match rest.split_once(':') {
        Some((h, m)) => (h.parse::<i32>().ok()?, m.parse::<i32>().ok()?),
        None => (rest.parse::<i32>().ok()?, 0),
    };
    if hours > 14 || minutes > 59 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_offsets() {
        let seconds = |value: &str| parse_utc_offset(value).map(|o| o.local_minus_utc());
        assert_eq!(seconds("-03:00"), Some(-3 * 3600));
        assert_eq!(seconds("+05:30"), Some(5 * 3600 + 1800));
        assert_eq!(seconds("+02"), Some(2 * 3600));
        assert_eq!(seconds("Z"), Some(0));
        assert_eq!(parse_utc_offset("03:00"), None);
        assert_eq!(parse_utc_offset("+25:00"), None);
    }

    #[test]
    fn image_host_requires_all_credentials() {
        let mut config = ImageHostConfig {
            cloud_name: "shop".into(),
            api_key: "key".into(),
            api_secret: String::new(),
        };
        assert!(!config.enabled());
        config.api_secret = "secret".into();
        assert!(config.enabled());
    }
}
