use clap::{Args, Parser, Subcommand};
use h2csmuggler::http::tls::{TlsConfig, TlsVersion};
use h2csmuggler::http::{HttpResponse, Method};
use h2csmuggler::net;
use h2csmuggler::smuggle::{Exchange, ExchangeResult, ProbeConfig, SmuggleTransport, SneakyProxy, UpgradeDirector};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Header added to upgrade requests unless `--no-debug-header` is given
const DEBUG_HEADER: (&str, &str) = ("X-Debug", "Upgrade Request");

#[derive(Parser)]
#[command(name = "h2c-probe")]
#[command(about = "Tunnel requests past HTTP/1.1 proxies through h2c upgrades", long_about = None)]
struct Cli {
    /// Log more (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send one upgrade request and print the response
    Probe {
        /// Upstream host:port
        authority: String,

        /// Request path
        #[arg(short, long, default_value = "/")]
        path: String,

        /// Request method
        #[arg(short = 'X', long, default_value = "GET")]
        method: String,

        /// Extra header as "Name: value", repeatable
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,

        /// Request body
        #[arg(short, long)]
        data: Option<String>,

        /// Don't add the X-Debug header
        #[arg(long)]
        no_debug_header: bool,

        /// Connect and I/O timeout in seconds
        #[arg(long, default_value_t = 10)]
        timeout: u64,

        #[command(flatten)]
        tls: TlsArgs,
    },
    /// Run a reverse proxy that forwards every request through an h2c upgrade
    Proxy {
        /// Address to listen on
        #[arg(short, long, default_value = "0.0.0.0:8000")]
        listen: String,

        /// Upstream host:port
        #[arg(short, long)]
        upstream: String,

        /// Upstream connect and I/O timeout in seconds
        #[arg(long, default_value_t = 10)]
        timeout: u64,

        #[command(flatten)]
        tls: TlsArgs,
    },
}

#[derive(Args)]
struct TlsArgs {
    /// Connect to the upstream over TLS
    #[arg(long)]
    tls: bool,

    /// Skip upstream certificate and hostname verification
    #[arg(long)]
    insecure: bool,

    /// SNI name, defaults to the upstream host
    #[arg(long)]
    servername: Option<String>,

    /// CA certificates (PEM)
    #[arg(long)]
    ca_file: Option<PathBuf>,

    /// Client certificate (PEM)
    #[arg(long)]
    cert_file: Option<PathBuf>,

    /// Client key (PEM), defaults to the certificate file
    #[arg(long)]
    key_file: Option<PathBuf>,

    /// Lowest TLS version to accept, e.g. TLSv1.2
    #[arg(long)]
    tls_min: Option<String>,

    /// Highest TLS version to accept
    #[arg(long)]
    tls_max: Option<String>,

    /// ALPN protocols to offer, comma separated
    #[arg(long, value_delimiter = ',')]
    alpn: Vec<String>,
}

impl TlsArgs {
    fn enabled(&self) -> bool {
        self.tls
            || self.ca_file.is_some()
            || self.cert_file.is_some()
            || self.tls_min.is_some()
            || self.tls_max.is_some()
            || !self.alpn.is_empty()
    }

    fn build(&self, authority: &str) -> Result<Option<TlsConfig>, Box<dyn std::error::Error>> {
        if !self.enabled() {
            return Ok(None);
        }

        let servername = self
            .servername
            .clone()
            .unwrap_or_else(|| net::host(authority).to_string());
        let mut builder = TlsConfig::client()
            .servername(servername)
            .verify_peer(!self.insecure);
        if let Some(ca) = &self.ca_file {
            builder = builder.ca_file(ca);
        }
        if let Some(cert) = &self.cert_file {
            builder = builder.cert_file(cert);
        }
        if let Some(key) = &self.key_file {
            builder = builder.key_file(key);
        }
        if self.tls_min.is_some() || self.tls_max.is_some() {
            let min = match &self.tls_min {
                Some(v) => v.parse::<TlsVersion>()?,
                None => TlsVersion::Tls10,
            };
            let max = match &self.tls_max {
                Some(v) => v.parse::<TlsVersion>()?,
                None => TlsVersion::Tls13,
            };
            builder = builder.version_range(min, max);
        }
        if !self.alpn.is_empty() {
            let protocols: Vec<&str> = self.alpn.iter().map(String::as_str).collect();
            builder = builder.alpn(&protocols);
        }

        Ok(Some(builder.build()?))
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let default_filter = match cli.verbose {
        0 => "h2csmuggler=info,h2c_probe=info",
        1 => "h2csmuggler=debug,h2c_probe=debug",
        _ => "h2csmuggler=trace,h2c_probe=trace",
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Probe {
            authority,
            path,
            method,
            headers,
            data,
            no_debug_header,
            timeout,
            tls,
        } => {
            let timeout = Some(Duration::from_secs(timeout));
            let mut builder = ProbeConfig::builder()
                .authority(authority.as_str())
                .path(path)
                .method(method.to_ascii_uppercase().parse::<Method>()?)
                .connect_timeout(timeout)
                .io_timeout(timeout);
            if !no_debug_header {
                builder = builder.header(DEBUG_HEADER.0, DEBUG_HEADER.1);
            }
            for header in &headers {
                let (name, value) = parse_header_arg(header)?;
                builder = builder.header(name, value);
            }
            if let Some(data) = data {
                builder = builder.body(data.into_bytes());
            }
            if let Some(tls) = tls.build(&authority)? {
                builder = builder.tls(tls);
            }

            let result = Exchange::new(builder.build()?).run()?;
            print_result(result)?;
        }
        Commands::Proxy {
            listen,
            upstream,
            timeout,
            tls,
        } => {
            let timeout = Some(Duration::from_secs(timeout));
            let mut builder = ProbeConfig::builder()
                .authority(upstream.as_str())
                .connect_timeout(timeout)
                .io_timeout(timeout);
            if let Some(tls) = tls.build(&upstream)? {
                builder = builder.tls(tls);
            }
            let config = builder.build()?;

            let director = UpgradeDirector::new(config.authority())
                .settings(config.upgrade_settings().clone())
                .header(DEBUG_HEADER.0, DEBUG_HEADER.1);
            let mut proxy = SneakyProxy::bind(&listen, director, SmuggleTransport::new(config))?;
            proxy.set_io_timeout(timeout);
            proxy.serve()?;
        }
    }

    Ok(())
}

fn parse_header_arg(arg: &str) -> Result<(&str, &str), String> {
    match arg.split_once(':') {
        Some((name, value)) if !name.trim().is_empty() => Ok((name.trim(), value.trim())),
        _ => Err(format!("Header must look like \"Name: value\": {}", arg)),
    }
}

fn print_result(result: ExchangeResult) -> std::io::Result<()> {
    if let ExchangeResult::Http2(response) = &result {
        if response.is_partial() {
            eprintln!("Partial response: {}", response.reason());
        }
    } else {
        eprintln!("Upgrade refused, HTTP/1.1 response follows");
    }

    print_response(&result.into_http_response())
}

fn print_response(response: &HttpResponse) -> std::io::Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    writeln!(
        out,
        "{} {} {}",
        response.version().as_str(),
        response.status().code(),
        response.reason()
    )?;
    for (name, value) in response.headers().iter() {
        writeln!(out, "{}: {}", name, value)?;
    }
    writeln!(out)?;
    out.write_all(response.body())?;
    if !response.body().ends_with(b"\n") && !response.body().is_empty() {
        writeln!(out)?;
    }
    out.flush()
}
