/// Chat API configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port the HTTP server binds to.
    pub port: u16,
    /// Secret used to verify client bearer tokens (HS256).
    pub jwt_secret: String,
    /// Optional PostgreSQL connection string. When absent the server
    /// runs on in-memory stores.
    pub database_url: Option<String>,
    /// Media-relay application id baked into issued call tokens.
    pub rtc_app_id: String,
    /// Media-relay signing certificate for call tokens.
    pub rtc_app_certificate: String,
    /// TTL for issued call tokens in seconds.
    pub rtc_token_ttl_secs: u64,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Panics with a descriptive message if a required variable is missing.
    pub fn from_env() -> Self {
        Self {
            port: std::env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(4000),
            jwt_secret: required_var("JWT_SECRET"),
            database_url: std::env::var("DATABASE_URL").ok().filter(|s| !s.is_empty()),
            rtc_app_id: required_var("RTC_APP_ID"),
            rtc_app_certificate: required_var("RTC_APP_CERTIFICATE"),
            rtc_token_ttl_secs: std::env::var("RTC_TOKEN_TTL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3600),
        }
    }
}

fn required_var(name: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| panic!("{name} env var is required"))
}
