use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use anyhow::{Context, Result};

use crate::media::CloudinaryConfig;
use crate::rate_limit::RateLimitConfig;

const DEFAULT_TOKEN_DAYS: i64 = 7;
const DEFAULT_PORT: u16 = 5000;
const DEFAULT_CLIENT_URL: &str = "http://localhost:5173";
const DEFAULT_MEDIA_FOLDER: &str = "blog-website";
const RATE_WINDOW_SECS: u64 = 15 * 60;
const GENERAL_RATE_LIMIT: u32 = 100;
const AUTH_RATE_LIMIT_DEV: u32 = 50;
const AUTH_RATE_LIMIT_PROD: u32 = 5;

/// Per-IP budgets: one for every `/api` route, a tighter one for `/api/auth`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimits {
    pub general: RateLimitConfig,
    pub auth: RateLimitConfig,
    /// Take the client address from `X-Forwarded-For`.
    pub trust_forwarded: bool,
}

impl RateLimits {
    pub fn new(general: u32, auth: u32, window_secs: u64) -> Self {
        RateLimits {
            general: RateLimitConfig::new(general, window_secs),
            auth: RateLimitConfig::new(auth, window_secs),
            trust_forwarded: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub token_ttl: time::Duration,
    pub bind_addr: SocketAddr,
    /// Marks the session cookie `Secure`; on in production.
    pub secure_cookies: bool,
    pub client_url: String,
    pub cloudinary: Option<CloudinaryConfig>,
    pub rate_limits: RateLimits,
}

impl Config {
    pub fn new(database_url: impl Into<String>, jwt_secret: impl Into<String>) -> Self {
        Config {
            database_url: database_url.into(),
            jwt_secret: jwt_secret.into(),
            token_ttl: time::Duration::days(DEFAULT_TOKEN_DAYS),
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), DEFAULT_PORT),
            secure_cookies: false,
            client_url: DEFAULT_CLIENT_URL.to_owned(),
            cloudinary: None,
            rate_limits: RateLimits::new(GENERAL_RATE_LIMIT, AUTH_RATE_LIMIT_DEV, RATE_WINDOW_SECS),
        }
    }

    pub fn from_env() -> Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let jwt_secret = std::env::var("JWT_SECRET").context("JWT_SECRET must be set")?;
        let mut config = Config::new(database_url, jwt_secret);

        if let Some(days) = optional_var("JWT_EXPIRY_DAYS") {
            let days: i64 = days
                .parse()
                .with_context(|| format!("JWT_EXPIRY_DAYS is not a number: {days}"))?;
            config.token_ttl = time::Duration::days(days);
        }

        let host: IpAddr = match optional_var("HOST") {
            Some(host) => host
                .parse()
                .with_context(|| format!("HOST is not an IP address: {host}"))?,
            None => config.bind_addr.ip(),
        };
        let port: u16 = match optional_var("PORT") {
            Some(port) => port
                .parse()
                .with_context(|| format!("PORT is not a valid port: {port}"))?,
            None => DEFAULT_PORT,
        };
        config.bind_addr = SocketAddr::new(host, port);

        config.secure_cookies = optional_var("APP_ENV")
            .map(|env| is_production(&env))
            .unwrap_or(false);

        let window_secs = parsed_var("RATE_LIMIT_WINDOW_SECS")?.unwrap_or(RATE_WINDOW_SECS);
        let default_auth = if config.secure_cookies {
            AUTH_RATE_LIMIT_PROD
        } else {
            AUTH_RATE_LIMIT_DEV
        };
        config.rate_limits = RateLimits::new(
            parsed_var("RATE_LIMIT_MAX")?.unwrap_or(GENERAL_RATE_LIMIT),
            parsed_var("AUTH_RATE_LIMIT_MAX")?.unwrap_or(default_auth),
            window_secs,
        );
        config.rate_limits.trust_forwarded = optional_var("TRUST_PROXY")
            .map(|value| matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        if let Some(client_url) = optional_var("CLIENT_URL") {
            config.client_url = client_url;
        }

        config.cloudinary = match (
            optional_var("CLOUDINARY_CLOUD_NAME"),
            optional_var("CLOUDINARY_API_KEY"),
            optional_var("CLOUDINARY_API_SECRET"),
        ) {
            (Some(cloud_name), Some(api_key), Some(api_secret)) => Some(CloudinaryConfig {
                cloud_name,
                api_key,
                api_secret,
                folder: optional_var("CLOUDINARY_FOLDER")
                    .unwrap_or_else(|| DEFAULT_MEDIA_FOLDER.to_owned()),
            }),
            _ => None,
        };

        Ok(config)
    }
}

fn optional_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn parsed_var<T>(name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    optional_var(name)
        .map(|value| {
            value
                .parse::<T>()
                .with_context(|| format!("{name} is not a valid number: {value}"))
        })
        .transpose()
}

fn is_production(env: &str) -> bool {
    env.eq_ignore_ascii_case("production") || env.eq_ignore_ascii_case("prod")
}
