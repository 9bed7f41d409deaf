use std::time::Duration;

use clap::builder::TypedValueParser as _;
use clap::Parser;
use dotenvy::dotenv;
use log::LevelFilter;

/// Runtime configuration, populated from CLI arguments and environment
/// variables (in that precedence), with a `.env` file loaded first.
#[derive(Clone, Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// A list of full CORS origin URLs that are allowed to receive server responses.
    #[arg(
        long,
        env,
        value_delimiter = ',',
        use_value_delimiter = true,
        default_value = "http://localhost:3000,https://localhost:3000"
    )]
    pub allowed_origins: Vec<String>,

    /// The host interface to listen for incoming connections
    #[arg(short, long, env, default_value = "127.0.0.1")]
    pub interface: String,

    /// The host TCP port to listen for incoming connections
    #[arg(short, long, env, default_value_t = 4000)]
    pub port: u16,

    /// Seconds of idle time before a keep-alive comment is written to an
    /// open event stream (0 disables keep-alive)
    #[arg(long, env, default_value_t = 15)]
    pub sse_keep_alive_secs: u64,

    /// Maximum frames queued behind an in-flight write, per connection
    /// (0 = unbounded, matching a consumer that is merely slow)
    #[arg(long, env, default_value_t = 0)]
    pub sse_max_pending: usize,

    /// Capacity of the frame channel between a connection's writer and the
    /// HTTP response body
    #[arg(long, env, default_value_t = 4)]
    pub sse_write_buffer: usize,

    /// Offer the deflate content-coding to clients that advertise it
    #[arg(long, env, default_value_t = true, action = clap::ArgAction::Set)]
    pub sse_deflate: bool,

    /// Set the log level verbosity threshold (level) to control what gets displayed on console output
    #[arg(
        short,
        long,
        env,
        default_value_t = LevelFilter::Info,
        value_parser = clap::builder::PossibleValuesParser::new(["OFF", "ERROR", "WARN", "INFO", "DEBUG", "TRACE"])
            .map(|s| s.parse::<LevelFilter>().unwrap()),
        )]
    pub log_level_filter: LevelFilter,
}

impl Config {
    /// Load `.env` (if present) and parse CLI/environment arguments.
    pub fn from_env_and_args() -> Self {
        dotenv().ok();
        Self::parse()
    }

    /// The `host:port` string the server binds to.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.interface, self.port)
    }

    /// Per-connection keep-alive period; 0 disables.
    pub fn sse_keep_alive(&self) -> Option<Duration> {
        match self.sse_keep_alive_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Per-connection queue bound; 0 means unbounded.
    pub fn sse_max_pending(&self) -> Option<usize> {
        match self.sse_max_pending {
            0 => None,
            limit => Some(limit),
        }
    }

    /// Handler configuration derived from the SSE-related settings.
    pub fn sse_handler_config(&self) -> sse::HandlerConfig {
        sse::HandlerConfig {
            connection: sse::ConnectionConfig {
                keep_alive: self.sse_keep_alive(),
                max_pending: self.sse_max_pending(),
            },
            write_buffer: self.sse_write_buffer.max(1),
            deflate: self.sse_deflate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        let mut argv = vec!["eventstream"];
        argv.extend_from_slice(args);
        Config::try_parse_from(argv).expect("valid arguments")
    }

    #[test]
    fn test_defaults() {
        let config = parse(&[]);
        assert_eq!(config.server_addr(), "127.0.0.1:4000");
        assert_eq!(config.sse_keep_alive(), Some(Duration::from_secs(15)));
        assert_eq!(config.sse_max_pending(), None);
        assert!(config.sse_deflate);
        assert_eq!(config.log_level_filter, LevelFilter::Info);
    }

    #[test]
    fn test_zero_disables_keep_alive_and_queue_bound() {
        let config = parse(&["--sse-keep-alive-secs", "0", "--sse-max-pending", "0"]);
        assert_eq!(config.sse_keep_alive(), None);
        assert_eq!(config.sse_max_pending(), None);
    }

    #[test]
    fn test_queue_bound_propagates_to_handler_config() {
        let config = parse(&["--sse-max-pending", "64", "--sse-write-buffer", "8"]);
        let handler = config.sse_handler_config();
        assert_eq!(handler.connection.max_pending, Some(64));
        assert_eq!(handler.write_buffer, 8);
    }

    #[test]
    fn test_write_buffer_never_zero() {
        let config = parse(&["--sse-write-buffer", "0"]);
        assert_eq!(config.sse_handler_config().write_buffer, 1);
    }

    #[test]
    fn test_allowed_origins_split_on_commas() {
        let config = parse(&["--allowed-origins", "https://a.example,https://b.example"]);
        assert_eq!(
            config.allowed_origins,
            vec!["https://a.example", "https://b.example"]
        );
    }
}
