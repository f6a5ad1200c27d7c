use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub access_ttl_minutes: i64,
    pub refresh_ttl_days: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    pub api_url: String,
    pub api_key: String,
    pub from_name: String,
    pub from_address: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub environment: String,
    pub frontend_url: String,
    pub jwt: JwtConfig,
    pub email: EmailConfig,
    pub disable_rate_limit: bool,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let environment = std::env::var("APP_ENV").unwrap_or_else(|_| "development".into());
        let frontend_url =
            std::env::var("FRONTEND_URL").unwrap_or_else(|_| "http://localhost:5173".into());
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "inkpost".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "inkpost-users".into()),
            access_ttl_minutes: std::env::var("JWT_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(60),
            refresh_ttl_days: std::env::var("JWT_REFRESH_TTL_DAYS")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(7),
        };
        let email = EmailConfig {
            api_url: std::env::var("EMAIL_API_URL")
                .unwrap_or_else(|_| "http://localhost:8025/api/send".into()),
            api_key: std::env::var("EMAIL_API_KEY").unwrap_or_default(),
            from_name: std::env::var("EMAIL_FROM_NAME").unwrap_or_else(|_| "Inkpost".into()),
            from_address: std::env::var("EMAIL_FROM")
                .unwrap_or_else(|_| "no-reply@inkpost.local".into()),
        };
        let disable_rate_limit = std::env::var("DISABLE_RATE_LIMIT")
            .map(|v| v == "true")
            .unwrap_or(false);
        Ok(Self {
            database_url,
            environment,
            frontend_url,
            jwt,
            email,
            disable_rate_limit,
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}
