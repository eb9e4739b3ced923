/// Chat API configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port the HTTP server binds to.
    pub port: u16,
    /// Optional path to a JSON snapshot of the subscriber list. When
    /// unset the directory starts empty and every connect is treated as
    /// a non-subscriber.
    pub subscribers_file: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            port: std::env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(4003),
            subscribers_file: std::env::var("SUBSCRIBERS_FILE")
                .ok()
                .filter(|s| !s.is_empty()),
        }
    }
}
