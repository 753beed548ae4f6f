use anyhow::{Context, bail};

/// Secrets that ship in sample `.env` files and must never reach production.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me",
    "change-me-to-a-random-string",
    "dev-secret-change-me",
];

const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminBootstrap {
    pub username: String,
    pub password: String,
    pub email: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub secret_key: String,
    pub db_path: String,
    pub host: String,
    pub port: u16,
    pub max_upload_bytes: usize,
    pub secure_cookies: bool,
    pub admin: Option<AdminBootstrap>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let secret_key = var("VAULT_SECRET_KEY").unwrap_or_default();
        if secret_key.trim().is_empty() || PLACEHOLDER_SECRETS.contains(&secret_key.as_str()) {
            bail!("VAULT_SECRET_KEY is unset or still a placeholder; set it in .env and restart");
        }

        let port = match var("VAULT_PORT") {
            Some(v) => v.parse().with_context(|| format!("invalid VAULT_PORT '{v}'"))?,
            None => 8000,
        };
        let max_upload_bytes = match var("VAULT_MAX_UPLOAD_BYTES") {
            Some(v) => v
                .parse()
                .with_context(|| format!("invalid VAULT_MAX_UPLOAD_BYTES '{v}'"))?,
            None => DEFAULT_MAX_UPLOAD_BYTES,
        };
        let secure_cookies = var("VAULT_SECURE_COOKIES")
            .is_some_and(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"));

        let admin = match (var("VAULT_ADMIN_USERNAME"), var("VAULT_ADMIN_PASSWORD")) {
            (Some(username), Some(password)) if !username.is_empty() && !password.is_empty() => {
                let email = var("VAULT_ADMIN_EMAIL").unwrap_or_default();
                Some(AdminBootstrap { username, password, email })
            }
            (Some(_), _) | (_, Some(_)) => {
                bail!("VAULT_ADMIN_USERNAME and VAULT_ADMIN_PASSWORD must be set together")
            }
            _ => None,
        };

        Ok(Self {
            secret_key,
            db_path: var("VAULT_DB_PATH").unwrap_or_else(|| "vault.db".into()),
            host: var("VAULT_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            max_upload_bytes,
            secure_cookies,
            admin,
        })
    }
}
