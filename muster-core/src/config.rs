//! resolver client configs

pub mod cli {
    //! Parse from either cli or env var

    /// default registry ensemble authority
    pub static DEFAULT_ENSEMBLE: &str = "localhost:4222";
    /// default log level. Can use this argument or MUSTER_LOG env var
    pub const DEFAULT_MUSTER_LOG: &str = "info";

    pub use clap::Parser;

    #[derive(Parser, Debug, Clone, PartialEq, Eq)]
    #[clap(author, name = "muster", bin_name = "muster", about, long_about = None)]
    /// parses from cli & environment var
    pub struct Config {
        /// resolution target, e.g. muster://localhost:4222. The authority
        /// names the registry ensemble, not a server instance
        #[clap(value_parser)]
        pub target: Option<String>,
        /// announce mode: register this host:port entry under the service
        /// path instead of resolving
        #[clap(long, env, value_parser)]
        pub announce: Option<String>,
        /// set the log level. All valid RUST_LOG arguments are accepted
        #[clap(long, env, value_parser, default_value = DEFAULT_MUSTER_LOG)]
        pub muster_log: String,
    }
}

pub mod trace {
    //! tracing configuration
    use anyhow::Result;
    use tracing_subscriber::{
        filter::EnvFilter,
        fmt::{
            self,
            format::{Format, PrettyFields},
        },
        prelude::__tracing_subscriber_SubscriberExt,
        util::SubscriberInitExt,
    };

    /// log as "json" or "standard" (unstructured)
    static DEFAULT_LOG_FORMAT: &str = "standard";

    /// Logging output configuration
    #[derive(Debug)]
    pub struct Config {
        /// formatting to apply to logs
        pub log_frmt: String,
    }

    impl Config {
        /// Install the global subscriber. Log level comes from `muster_log`,
        /// output format from the LOG_FORMAT env var
        pub fn parse(muster_log: &str) -> Result<Self> {
            let log_frmt =
                std::env::var("LOG_FORMAT").unwrap_or_else(|_| DEFAULT_LOG_FORMAT.to_string());

            let filter =
                EnvFilter::try_new(muster_log).or_else(|_| EnvFilter::try_new("info"))?;

            match &log_frmt[..] {
                "json" => {
                    tracing_subscriber::registry()
                        .with(filter)
                        .with(fmt::layer().json())
                        .init();
                }
                "pretty" => {
                    tracing_subscriber::registry()
                        .with(filter)
                        .with(
                            fmt::layer()
                                .event_format(
                                    Format::default().pretty().with_source_location(false),
                                )
                                .fmt_fields(PrettyFields::new()),
                        )
                        .init();
                }
                _ => {
                    tracing_subscriber::registry()
                        .with(filter)
                        .with(fmt::layer())
                        .init();
                }
            }

            Ok(Self { log_frmt })
        }
    }
}
