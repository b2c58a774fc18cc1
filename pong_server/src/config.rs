use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Authoritative real-time Pong server")]
pub struct Config {
    /// Address to bind the HTTP/WebSocket listener on.
    #[arg(long, env = "PONG_ADDR", default_value = "0.0.0.0:3000")]
    pub addr: String,

    /// Redis connection string for the cross-instance matchmaking queue.
    /// When absent the queue is kept in-process (single-instance mode).
    #[arg(long, env = "REDIS_URL")]
    pub redis_url: Option<String>,

    /// Base tick interval in milliseconds.
    #[arg(long, env = "PONG_TICK_MS", default_value_t = 33)]
    pub tick_ms: u64,

    /// Minimum interval between motion-only client syncs, in milliseconds.
    #[arg(long, env = "PONG_CLIENT_SYNC_MS", default_value_t = 100)]
    pub client_sync_ms: u64,

    /// Comma-separated CORS allow-list. Empty permits any origin.
    #[arg(long, env = "PONG_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_parse() {
        let config = Config::parse_from(["pong_server"]);
        assert_eq!(config.addr, "0.0.0.0:3000");
        assert_eq!(config.tick_ms, 33);
        assert_eq!(config.client_sync_ms, 100);
        assert!(config.cors_origins.is_empty());
    }

    #[test]
    fn cors_origins_split_on_commas() {
        let config = Config::parse_from([
            "pong_server",
            "--cors-origins",
            "https://a.example,https://b.example",
        ]);
        assert_eq!(
            config.cors_origins,
            vec!["https://a.example", "https://b.example"]
        );
    }
}
