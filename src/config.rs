use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
}

/// Which [`TraineeStore`](crate::trainees::store::TraineeStore) backs the app.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImportConfig {
    pub max_bytes: usize,
    /// Plaintext used for rows that carry no password; hashed per import.
    pub default_password: String,
    pub write_concurrency: usize,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            max_bytes: 2 * 1024 * 1024,
            default_password: "ChangeMe123!".into(),
            write_concurrency: 8,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdminSeed {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub store_backend: StoreBackend,
    pub database_url: Option<String>,
    pub jwt: JwtConfig,
    pub import: ImportConfig,
    pub admin_seed: Option<AdminSeed>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let store_backend = match std::env::var("STORE_BACKEND").as_deref() {
            Ok("memory") => StoreBackend::Memory,
            Ok("postgres") | Err(_) => StoreBackend::Postgres,
            Ok(other) => anyhow::bail!("unknown STORE_BACKEND {other:?}"),
        };

        let database_url = std::env::var("DATABASE_URL").ok();
        if store_backend == StoreBackend::Postgres && database_url.is_none() {
            anyhow::bail!("DATABASE_URL must be set when STORE_BACKEND=postgres");
        }

        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET").context("JWT_SECRET must be set")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "trainee-portal".into()),
            audience: std::env::var("JWT_AUDIENCE")
                .unwrap_or_else(|_| "trainee-portal-users".into()),
        };

        let defaults = ImportConfig::default();
        let import = ImportConfig {
            max_bytes: env_parse("IMPORT_MAX_BYTES").unwrap_or(defaults.max_bytes),
            default_password: std::env::var("IMPORT_DEFAULT_PASSWORD")
                .unwrap_or(defaults.default_password),
            write_concurrency: env_parse("IMPORT_WRITE_CONCURRENCY")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.write_concurrency),
        };

        let admin_seed = match (std::env::var("ADMIN_EMAIL"), std::env::var("ADMIN_PASSWORD")) {
            (Ok(email), Ok(password)) => Some(AdminSeed { email, password }),
            _ => None,
        };

        Ok(Self {
            store_backend,
            database_url,
            jwt,
            import,
            admin_seed,
        })
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse::<T>().ok())
}
