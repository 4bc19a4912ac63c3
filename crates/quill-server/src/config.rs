use std::path::PathBuf;

use anyhow::{Context, Result, bail};

use quill_api::uploads::DEFAULT_MAX_IMAGE_BYTES;

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me-to-a-random-string", "dev-secret-change-me"];

#[derive(Clone)]
pub struct Config {
    pub jwt_secret: String,
    pub token_ttl_hours: i64,
    pub db_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub upload_dir: PathBuf,
    pub max_image_bytes: usize,
    pub admin: Option<AdminSeed>,
}

/// Out-of-band admin account, created at boot if missing.
#[derive(Clone)]
pub struct AdminSeed {
    pub email: String,
    pub password: String,
    pub name: String,
}

impl std::fmt::Debug for AdminSeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminSeed")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let jwt_secret = get("QUILL_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("QUILL_JWT_SECRET is unset or still a placeholder");
        }

        let token_ttl_hours: i64 = parse_or(&get, "QUILL_TOKEN_TTL_HOURS", 24)?;
        if token_ttl_hours <= 0 {
            bail!("QUILL_TOKEN_TTL_HOURS must be positive");
        }

        let admin = match (get("QUILL_ADMIN_EMAIL"), get("QUILL_ADMIN_PASSWORD")) {
            (Some(email), Some(password)) => Some(AdminSeed {
                email,
                password,
                name: get("QUILL_ADMIN_NAME").unwrap_or_else(|| "Administrator".into()),
            }),
            (None, None) => None,
            _ => bail!("QUILL_ADMIN_EMAIL and QUILL_ADMIN_PASSWORD must be set together"),
        };

        Ok(Self {
            jwt_secret,
            token_ttl_hours,
            db_path: get("QUILL_DB_PATH").unwrap_or_else(|| "quill.db".into()).into(),
            host: get("QUILL_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse_or(&get, "QUILL_PORT", 3000)?,
            upload_dir: get("QUILL_UPLOAD_DIR").unwrap_or_else(|| "./uploads".into()).into(),
            max_image_bytes: parse_or(&get, "QUILL_MAX_IMAGE_BYTES", DEFAULT_MAX_IMAGE_BYTES)?,
            admin,
        })
    }
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match get(key) {
        Some(raw) => raw.trim().parse().with_context(|| format!("invalid {key}: {raw:?}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let cfg = config(&[("QUILL_JWT_SECRET", "s3cr3t")]).unwrap();
        assert_eq!(cfg.token_ttl_hours, 24);
        assert_eq!(cfg.port, 3000);
        assert_eq!(cfg.db_path, PathBuf::from("quill.db"));
        assert_eq!(cfg.max_image_bytes, DEFAULT_MAX_IMAGE_BYTES);
        assert!(cfg.admin.is_none());
    }

    #[test]
    fn test_secret_is_required() {
        assert!(config(&[]).is_err());
        assert!(config(&[("QUILL_JWT_SECRET", "dev-secret-change-me")]).is_err());
    }

    #[test]
    fn test_bad_numbers_are_errors() {
        assert!(config(&[("QUILL_JWT_SECRET", "s"), ("QUILL_PORT", "http")]).is_err());
        assert!(config(&[("QUILL_JWT_SECRET", "s"), ("QUILL_TOKEN_TTL_HOURS", "0")]).is_err());
    }

    #[test]
    fn test_admin_seed_needs_email_and_password() {
        assert!(config(&[("QUILL_JWT_SECRET", "s"), ("QUILL_ADMIN_EMAIL", "r@x.com")]).is_err());

        let cfg = config(&[
            ("QUILL_JWT_SECRET", "s"),
            ("QUILL_ADMIN_EMAIL", "r@x.com"),
            ("QUILL_ADMIN_PASSWORD", "rootpass"),
        ])
        .unwrap();
        let admin = cfg.admin.unwrap();
        assert_eq!(admin.name, "Administrator");
        assert!(!format!("{admin:?}").contains("rootpass"));
    }
}
