use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefreshConfig {
    pub validity_days: i64,
    pub cookie_secure: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
    pub refresh: RefreshConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "planora".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "planora-users".into()),
            ttl_minutes: std::env::var("JWT_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(60),
        };
        let refresh = RefreshConfig {
            validity_days: std::env::var("REFRESH_VALIDITY_DAYS")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(14),
            // Opt-out for local HTTP development only.
            cookie_secure: std::env::var("REFRESH_COOKIE_SECURE")
                .map(|v| v != "false")
                .unwrap_or(true),
        };
        Ok(Self {
            database_url,
            jwt,
            refresh,
        })
    }
}
