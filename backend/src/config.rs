use std::env;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl SameSite {
    pub fn as_str(&self) -> &'static str {
        match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        }
    }
}

impl FromStr for SameSite {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "strict" => Ok(SameSite::Strict),
            "lax" => Ok(SameSite::Lax),
            "none" => Ok(SameSite::None),
            _ => Err(anyhow::anyhow!("Unknown SameSite mode: {s}")),
        }
    }
}

/// Token, lockout and hashing parameters consumed by the auth core.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub access_secret: String,
    pub refresh_secret: String,
    pub access_expiry_seconds: u64,
    pub refresh_expiry_days: u64,
    pub issuer: String,
    pub lockout_threshold: u32,
    pub lockout_duration_minutes: u64,
    pub bcrypt_cost: u32,
}

#[derive(Debug, Clone)]
pub struct CookieConfig {
    pub domain: Option<String>,
    pub secure: bool,
    pub same_site: SameSite,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub auth_requests: u64,
    pub window_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub auth: AuthConfig,
    pub cookie: CookieConfig,
    pub rate_limit: RateLimitConfig,
    pub cors_origins: Vec<String>,
    pub audit_queue_capacity: usize,
    pub log_json: bool,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let config = Self {
            database_url: required("DATABASE_URL")?,
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".into())
                .parse()?,
            auth: AuthConfig {
                access_secret: required("JWT_ACCESS_SECRET")?,
                refresh_secret: required("JWT_REFRESH_SECRET")?,
                access_expiry_seconds: env::var("JWT_ACCESS_EXPIRY_SECONDS")
                    .unwrap_or_else(|_| "900".into())
                    .parse()?,
                refresh_expiry_days: env::var("JWT_REFRESH_EXPIRY_DAYS")
                    .unwrap_or_else(|_| "7".into())
                    .parse()?,
                issuer: env::var("JWT_ISSUER").unwrap_or_else(|_| "landing-cms-api".into()),
                lockout_threshold: env::var("LOCKOUT_THRESHOLD")
                    .unwrap_or_else(|_| "5".into())
                    .parse()?,
                lockout_duration_minutes: env::var("LOCKOUT_DURATION_MINUTES")
                    .unwrap_or_else(|_| "15".into())
                    .parse()?,
                bcrypt_cost: env::var("BCRYPT_COST")
                    .unwrap_or_else(|_| "12".into())
                    .parse()?,
            },
            cookie: CookieConfig {
                domain: env::var("COOKIE_DOMAIN").ok().filter(|s| !s.is_empty()),
                secure: env::var("COOKIE_SECURE")
                    .unwrap_or_else(|_| "false".into())
                    .parse()?,
                same_site: env::var("COOKIE_SAME_SITE")
                    .unwrap_or_else(|_| "strict".into())
                    .parse()?,
            },
            rate_limit: RateLimitConfig {
                enabled: env::var("RATE_LIMIT_ENABLED")
                    .unwrap_or_else(|_| "true".into())
                    .parse()?,
                auth_requests: env::var("RATE_LIMIT_AUTH_REQUESTS")
                    .unwrap_or_else(|_| "5".into())
                    .parse()?,
                window_seconds: env::var("RATE_LIMIT_WINDOW_SECONDS")
                    .unwrap_or_else(|_| "60".into())
                    .parse()?,
            },
            cors_origins: env::var("CORS_ORIGINS")
                .unwrap_or_else(|_| "http://localhost:3000".into())
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            audit_queue_capacity: env::var("AUDIT_QUEUE_CAPACITY")
                .unwrap_or_else(|_| "1024".into())
                .parse()?,
            log_json: env::var("LOG_FORMAT")
                .map(|v| v.eq_ignore_ascii_case("json"))
                .unwrap_or(false),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.auth.validate()?;
        if self.audit_queue_capacity == 0 {
            anyhow::bail!("AUDIT_QUEUE_CAPACITY must be greater than zero");
        }
        if self.rate_limit.enabled && (self.rate_limit.auth_requests == 0 || self.rate_limit.window_seconds == 0) {
            anyhow::bail!("RATE_LIMIT_AUTH_REQUESTS and RATE_LIMIT_WINDOW_SECONDS must be greater than zero");
        }
        Ok(())
    }
}

// One day, one year and one week.
const MAX_ACCESS_EXPIRY_SECONDS: u64 = 86_400;
const MAX_REFRESH_EXPIRY_DAYS: u64 = 365;
const MAX_LOCKOUT_DURATION_MINUTES: u64 = 10_080;

impl AuthConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.access_secret.is_empty() {
            anyhow::bail!("JWT_ACCESS_SECRET must not be empty");
        }
        if self.refresh_secret.is_empty() {
            anyhow::bail!("JWT_REFRESH_SECRET must not be empty");
        }
        // An access token must never verify as a refresh token and vice versa.
        if self.access_secret == self.refresh_secret {
            anyhow::bail!("JWT_ACCESS_SECRET and JWT_REFRESH_SECRET must be different");
        }
        if self.access_expiry_seconds == 0 || self.refresh_expiry_days == 0 {
            anyhow::bail!("Token expiries must be greater than zero");
        }
        if self.access_expiry_seconds > MAX_ACCESS_EXPIRY_SECONDS {
            anyhow::bail!(
                "JWT_ACCESS_EXPIRY_SECONDS must be at most {MAX_ACCESS_EXPIRY_SECONDS}, got {}",
                self.access_expiry_seconds
            );
        }
        if self.refresh_expiry_days > MAX_REFRESH_EXPIRY_DAYS {
            anyhow::bail!(
                "JWT_REFRESH_EXPIRY_DAYS must be at most {MAX_REFRESH_EXPIRY_DAYS}, got {}",
                self.refresh_expiry_days
            );
        }
        if self.lockout_duration_minutes > MAX_LOCKOUT_DURATION_MINUTES {
            anyhow::bail!(
                "LOCKOUT_DURATION_MINUTES must be at most {MAX_LOCKOUT_DURATION_MINUTES}, got {}",
                self.lockout_duration_minutes
            );
        }
        if self.lockout_threshold == 0 {
            anyhow::bail!("LOCKOUT_THRESHOLD must be greater than zero");
        }
        if !(4..=31).contains(&self.bcrypt_cost) {
            anyhow::bail!("BCRYPT_COST must be between 4 and 31, got {}", self.bcrypt_cost);
        }
        Ok(())
    }
}

fn required(key: &str) -> anyhow::Result<String> {
    env::var(key).map_err(|_| anyhow::anyhow!("Missing required env var: {}", key))
}

#[cfg(test)]
pub(crate) fn test_auth_config() -> AuthConfig {
    AuthConfig {
        access_secret: "test-access-secret".into(),
        refresh_secret: "test-refresh-secret".into(),
        access_expiry_seconds: 900,
        refresh_expiry_days: 7,
        issuer: "landing-cms-api".into(),
        lockout_threshold: 5,
        lockout_duration_minutes: 15,
        bcrypt_cost: 4,
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        database_url: "postgres://localhost/landing_cms_test".into(),
        host: "127.0.0.1".into(),
        port: 0,
        auth: test_auth_config(),
        cookie: CookieConfig {
            domain: None,
            secure: false,
            same_site: SameSite::Strict,
        },
        rate_limit: RateLimitConfig {
            enabled: false,
            auth_requests: 5,
            window_seconds: 60,
        },
        cors_origins: Vec::new(),
        audit_queue_capacity: 64,
        log_json: false,
    }
}
