use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use clap::{error::ErrorKind, ArgGroup, CommandFactory, Parser, ValueEnum};
use rdkafka::ClientConfig;

use crate::constants::{
    DEFAULT_FETCH_TIMEOUT_SECS, DEFAULT_HTTP_HOST, DEFAULT_HTTP_PORT,
    DEFAULT_THROUGHPUT_RATE_WINDOW_SECS, DEFAULT_THROUGHPUT_WINDOW_SECS,
};

/// Command Line Interface, defined via the declarative,
/// `derive` based functionality of the `clap` crate.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(group(
    ArgGroup::new("logging_flags")
        .required(false)
        .multiple(false)
        .args(["verbose", "quiet"]),
))]
pub struct Cli {
    // ------------------------------------------------------------------ Kafka Client configuration
    /// Initial Kafka Brokers to connect to (format: 'HOST:PORT,...').
    ///
    /// Equivalent to '--kafka-conf=bootstrap.servers:host:port,...'.
    #[arg(short, long = "brokers", value_name = "BOOTSTRAP_BROKERS")]
    pub bootstrap_brokers: String,

    /// Client identifier used by the internal Kafka Clients.
    ///
    /// Equivalent to '--kafka-conf=client.id:my-client-id'.
    #[arg(long = "client-id", value_name = "CLIENT_ID", default_value = env!("CARGO_PKG_NAME"))]
    pub client_id: String,

    /// Additional configuration used by the internal Kafka Clients (format: 'CONF_KEY:CONF_VAL').
    ///
    /// To set multiple configurations keys, use this argument multiple times.
    /// See: https://github.com/edenhill/librdkafka/blob/master/CONFIGURATION.md.
    #[arg(
        long = "kafka-conf",
        value_name = "CONF_KEY:CONF_VAL",
        value_parser = kv_clap_value_parser,
        verbatim_doc_comment
    )]
    pub kafka_config: Vec<KVPair>,

    /// SASL mechanism used to authenticate with the Brokers.
    ///
    /// Requires '--sasl-username' and '--sasl-password'.
    #[arg(
        long = "sasl-mechanism",
        value_enum,
        requires = "sasl_username",
        requires = "sasl_password"
    )]
    pub sasl_mechanism: Option<SaslMechanism>,

    /// SASL username.
    #[arg(long = "sasl-username", value_name = "USERNAME", requires = "sasl_mechanism")]
    pub sasl_username: Option<String>,

    /// SASL password.
    #[arg(
        long = "sasl-password",
        value_name = "PASSWORD",
        env = "KOMMANDER_SASL_PASSWORD",
        hide_env_values = true,
        requires = "sasl_mechanism"
    )]
    pub sasl_password: Option<String>,

    /// Connect to the Brokers over TLS.
    ///
    /// Certificates and keys can be configured via '--kafka-conf=ssl.*:...'.
    #[arg(long, verbatim_doc_comment)]
    pub tls: bool,

    /// Override identifier of the monitored Kafka Cluster.
    ///
    /// If set, it replaces the value `cluster.id` from the Brokers' metadata.
    /// This can be useful when `cluster.id` is not actually set.
    #[arg(long = "cluster-id", value_name = "CLUSTER_ID")]
    pub cluster_id: Option<String>,

    /// How long (seconds) to wait for the cluster to answer a single request.
    #[arg(
        long = "fetch-timeout",
        value_name = "SECONDS",
        default_value = DEFAULT_FETCH_TIMEOUT_SECS,
        value_parser = seconds_clap_value_parser
    )]
    pub fetch_timeout: Duration,

    // ------------------------------------------------------------------------------ Throughput
    /// Rolling window (seconds) over which produced and consumed records are counted.
    ///
    /// Offsets observed longer ago than this are discarded.
    #[arg(
        long = "throughput-window",
        value_name = "SECONDS",
        default_value = DEFAULT_THROUGHPUT_WINDOW_SECS,
        value_parser = seconds_clap_value_parser,
        verbatim_doc_comment
    )]
    pub throughput_window: Duration,

    /// Shorter window (seconds) used to compute produced and consumed rates.
    ///
    /// Must not be longer than '--throughput-window'.
    #[arg(
        long = "throughput-rate-window",
        value_name = "SECONDS",
        default_value = DEFAULT_THROUGHPUT_RATE_WINDOW_SECS,
        value_parser = seconds_clap_value_parser,
        verbatim_doc_comment
    )]
    pub throughput_rate_window: Duration,

    // ------------------------------------------------------------------------------------ HTTP
    /// Host address to listen on for HTTP requests.
    ///
    /// Supports both IPv4 and IPv6 addresses.
    #[arg(long, default_value = DEFAULT_HTTP_HOST, verbatim_doc_comment)]
    pub host: IpAddr,

    /// Port to listen on for HTTP requests.
    #[arg(long, default_value = DEFAULT_HTTP_PORT, verbatim_doc_comment)]
    pub port: u16,

    /// Verbose logging.
    ///
    /// * none    = 'WARN'
    /// * '-v'    = 'INFO'
    /// * '-vv'   = 'DEBUG'
    /// * '-vvv'  = 'TRACE'
    ///
    /// Alternatively, set environment variable 'KOMMANDER_LOG=(ERROR|WARN|INFO|DEBUG|TRACE|OFF)'.
    #[arg(short, long, action = clap::ArgAction::Count, verbatim_doc_comment)]
    pub verbose: u8,

    /// Quiet logging.
    ///
    /// * none    = 'WARN'
    /// * '-q'    = 'ERROR'
    /// * '-qq'   = 'OFF'
    ///
    /// Alternatively, set environment variable 'KOMMANDER_LOG=(ERROR|WARN|INFO|DEBUG|TRACE|OFF)'.
    #[arg(short, long, action = clap::ArgAction::Count, verbatim_doc_comment)]
    pub quiet: u8,
}

/// SASL mechanisms supported when authenticating with the Brokers.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaslMechanism {
    #[value(name = "PLAIN")]
    Plain,
    #[value(name = "SCRAM-SHA-256")]
    ScramSha256,
    #[value(name = "SCRAM-SHA-512")]
    ScramSha512,
}

impl SaslMechanism {
    fn as_kafka_conf(&self) -> &'static str {
        match self {
            SaslMechanism::Plain => "PLAIN",
            SaslMechanism::ScramSha256 => "SCRAM-SHA-256",
            SaslMechanism::ScramSha512 => "SCRAM-SHA-512",
        }
    }
}

impl Cli {
    /// Parse the command line, exiting with a usage error if arguments are inconsistent.
    pub fn parse_and_validate() -> Self {
        let cli = Self::parse();

        if let Err(msg) = cli.validate() {
            Self::command().error(ErrorKind::ArgumentConflict, msg).exit();
        }

        cli
    }

    fn validate(&self) -> Result<(), String> {
        if self.throughput_rate_window > self.throughput_window {
            return Err(format!(
                "'--throughput-rate-window' ({}s) can't be longer than '--throughput-window' ({}s)",
                self.throughput_rate_window.as_secs(),
                self.throughput_window.as_secs()
            ));
        }

        Ok(())
    }

    pub fn verbosity_level(&self) -> i8 {
        self.verbose as i8 - self.quiet as i8
    }

    pub fn listen_on(&self) -> SocketAddr {
        SocketAddr::from((self.host, self.port))
    }

    pub fn build_client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", self.bootstrap_brokers.clone())
            .set("client.id", self.client_id.clone());

        let security_protocol = match (self.sasl_mechanism.is_some(), self.tls) {
            (true, true) => Some("SASL_SSL"),
            (true, false) => Some("SASL_PLAINTEXT"),
            (false, true) => Some("SSL"),
            (false, false) => None,
        };
        if let Some(protocol) = security_protocol {
            config.set("security.protocol", protocol);
        }
        if let Some(mechanism) = &self.sasl_mechanism {
            config.set("sasl.mechanism", mechanism.as_kafka_conf());
        }
        if let Some(username) = &self.sasl_username {
            config.set("sasl.username", username.clone());
        }
        if let Some(password) = &self.sasl_password {
            config.set("sasl.password", password.clone());
        }

        // Explicit configuration wins over the one derived from the other arguments
        for cfg in &self.kafka_config {
            config.set(cfg.0.clone(), cfg.1.clone());
        }

        trace!("Created:\n{:#?}", config);
        config
    }
}

/// A simple (key,value) pair of `String`s, useful to be parsed from arguments via [`kv_clap_value_parser`].
pub type KVPair = (String, String);

/// To be used as [`clap::value_parser`] function to create [`KVPair`] values.
fn kv_clap_value_parser(kv: &str) -> Result<KVPair, String> {
    let (k, v) = match kv.split_once(':') {
        None => {
            return Err("Should have 'K:V' format".to_string());
        },
        Some((k, v)) => (k, v),
    };

    Ok((k.to_string(), v.to_string()))
}

fn seconds_clap_value_parser(secs_str: &str) -> Result<Duration, String> {
    let secs = secs_str.parse::<u64>().map_err(|e| format!("Unable to parse {secs_str}: {e}"))?;

    if secs == 0 {
        return Err("Duration should be at least 1 second".to_string());
    }

    Ok(Duration::from_secs(secs))
}
