//! `usenet-speedtest` command line.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use usenet_speedtest::{Config, RangePolicy, Speedtest, StartPolicy};

/// Host and optional port given as `host[:port]`
#[derive(Clone, Debug, PartialEq, Eq)]
struct ServerArg {
    host: String,
    port: Option<u16>,
}

/// Parse `host`, `host:port` or `[v6addr]:port`
fn parse_server(s: &str) -> Result<ServerArg, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("server must not be empty".to_string());
    }

    let bare_ipv6 = s.matches(':').count() > 1 && !s.starts_with('[');
    if bare_ipv6 {
        return Ok(ServerArg {
            host: s.to_string(),
            port: None,
        });
    }

    match s.rsplit_once(':') {
        Some((host, port)) if !port.is_empty() => {
            let port: u16 = port
                .parse()
                .map_err(|e| format!("Invalid port number: {}", e))?;
            if port == 0 {
                return Err("Invalid port: 0".to_string());
            }
            if host.is_empty() {
                return Err("server host must not be empty".to_string());
            }
            Ok(ServerArg {
                host: host.to_string(),
                port: Some(port),
            })
        }
        Some(_) => Err("missing port after ':'".to_string()),
        None => Ok(ServerArg {
            host: s.to_string(),
            port: None,
        }),
    }
}

/// Measure how fast a Usenet server delivers articles over parallel connections
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server to test as host[:port] (overrides config file)
    #[arg(short, long, env = "NNTP_SERVER", value_parser = parse_server)]
    server: Option<ServerArg>,

    /// Username for AUTHINFO
    #[arg(short, long, env = "NNTP_USERNAME")]
    user: Option<String>,

    /// Password for AUTHINFO
    #[arg(short, long, env = "NNTP_PASSWORD", hide_env_values = true)]
    pass: Option<String>,

    /// Accept any server certificate (self-signed or otherwise unverified)
    #[arg(long, env = "NNTP_INSECURE_TLS")]
    insecure_tls: bool,

    /// Log every article and connection event
    #[arg(short, long, env = "NNTP_VERBOSE")]
    verbose: bool,

    /// Number of parallel connections
    #[arg(short = 'n', long, env = "NNTP_CONNECTIONS")]
    conns: Option<usize>,

    /// Number of articles to fetch after the group midpoint
    #[arg(short, long, env = "NNTP_ARTICLES")]
    arts: Option<u64>,

    /// Newsgroup to read from
    #[arg(short, long, env = "NNTP_GROUP")]
    group: Option<String>,

    /// JSON configuration file
    #[arg(short, long, env = "NNTP_CONFIG")]
    config: Option<PathBuf>,

    /// Fail instead of clamping when the range runs past the last article
    #[arg(long, env = "NNTP_STRICT_RANGE")]
    strict_range: bool,

    /// Keep going with the connections that opened if some fail
    #[arg(long, env = "NNTP_DEGRADE")]
    degrade: bool,

    /// Print the report as JSON
    #[arg(long, env = "NNTP_JSON")]
    json: bool,

    /// Log progress every N seconds while articles are outstanding
    #[arg(long, env = "NNTP_PROGRESS")]
    progress: Option<u64>,
}

impl Args {
    /// Load the config file (or defaults) and lay the command line over it
    fn to_config(&self) -> usenet_speedtest::Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_json_file(path)?,
            None => Config::default(),
        };

        if let Some(server) = &self.server {
            config.server.host = server.host.clone();
            if let Some(port) = server.port {
                config.server.port = port;
            }
        }
        if let Some(user) = &self.user {
            config.server.username = Some(user.clone());
        }
        if let Some(pass) = &self.pass {
            config.server.password = Some(pass.clone());
        }
        if self.insecure_tls {
            config.server.allow_insecure_tls = true;
        }
        if let Some(conns) = self.conns {
            config.benchmark.connections = conns;
        }
        if let Some(arts) = self.arts {
            config.benchmark.articles = arts;
        }
        if let Some(group) = &self.group {
            config.benchmark.group = group.clone();
        }
        if self.strict_range {
            config.benchmark.range_policy = RangePolicy::Strict;
        }
        if self.degrade {
            config.benchmark.start_policy = StartPolicy::Degrade;
        }
        if let Some(secs) = self.progress.filter(|&s| s > 0) {
            config.benchmark.progress_interval = Some(Duration::from_secs(secs));
        }

        Ok(config)
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_error(error: &usenet_speedtest::Error) {
    eprintln!("error: {error}");
    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        eprintln!("  caused by: {cause}");
        source = cause.source();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env before clap reads the environment
    let dotenv = dotenvy::dotenv();

    let args = Args::parse();
    init_tracing(args.verbose);

    if let Ok(path) = dotenv {
        tracing::debug!(path = %path.display(), "Loaded environment file");
    }

    let result = async {
        let config = args.to_config()?;
        let report = Speedtest::new(config)?.run().await?;
        if args.json {
            println!("{}", report.to_json()?);
        } else {
            println!("{report}");
        }
        Ok::<_, usenet_speedtest::Error>(())
    }
    .await;

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::debug!(error = ?e, "Speedtest failed");
            print_error(&e);
            ExitCode::FAILURE
        }
    }
}
