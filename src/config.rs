use anyhow::Context;
use serde::Deserialize;

/// How session tokens issued by the identity provider are verified.
#[derive(Debug, Clone, Deserialize)]
pub struct IdentityConfig {
    pub public_key_pem: Option<String>, // RS256 PEM, preferred when set
    pub secret: Option<String>,         // HS256 shared secret
    pub issuer: Option<String>,
    pub audience: Option<String>,
    pub leeway_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub enum StoreBackend {
    Postgres {
        database_url: String,
        max_connections: u32,
    },
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub store: StoreBackend,
    pub identity: IdentityConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary variable source.
    pub fn from_lookup<F>(var: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let store = match var("PROFILE_STORE").as_deref().unwrap_or("postgres") {
            "postgres" => StoreBackend::Postgres {
                database_url: var("DATABASE_URL").context("DATABASE_URL is not set")?,
                max_connections: var("DATABASE_MAX_CONNECTIONS")
                    .and_then(|v| v.parse::<u32>().ok())
                    .unwrap_or(10),
            },
            "memory" => StoreBackend::Memory,
            other => anyhow::bail!("unknown PROFILE_STORE `{other}` (expected postgres or memory)"),
        };

        let identity = IdentityConfig {
            public_key_pem: var("IDP_JWT_PUBLIC_KEY").filter(|v| !v.trim().is_empty()),
            secret: var("IDP_JWT_SECRET").filter(|v| !v.is_empty()),
            issuer: var("IDP_JWT_ISSUER").filter(|v| !v.is_empty()),
            audience: var("IDP_JWT_AUDIENCE").filter(|v| !v.is_empty()),
            leeway_secs: var("IDP_JWT_LEEWAY_SECS")
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(60),
        };
        if identity.public_key_pem.is_none() && identity.secret.is_none() {
            anyhow::bail!("either IDP_JWT_PUBLIC_KEY or IDP_JWT_SECRET must be set");
        }

        Ok(Self {
            host: var("APP_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: var("APP_PORT")
                .map(|v| v.parse::<u16>())
                .transpose()
                .context("APP_PORT is not a valid port")?
                .unwrap_or(8080),
            store,
            identity,
        })
    }
}
