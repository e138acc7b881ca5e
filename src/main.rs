use axum_server::tls_rustls::RustlsConfig;
use humantime::format_duration;
use selfsigned::{
    make_provider, router, server_config, shutdown_signal, CertificateOptions, HostArgument,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Example https server with a self-signed certificate
#[derive(Parser, Debug)]
#[command(version = env!("CARGO_APP_VERSION"), name = "selfsigned", about, long_about = None)]
struct Args {
    /// Server port
    #[arg(long, env, default_value = "8080")]
    port: u16,
    /// Hosts for certificate generation, comma separated names or IPs
    #[arg(long, env, default_value = "example.org")]
    host: String,
    /// RSA key size, used together with valid-for
    #[arg(long, env, default_value = "2048")]
    key_bits: usize,
    /// Mark the certificate as CA, used together with valid-for
    #[arg(long, env, default_value_t = true, action = clap::ArgAction::Set)]
    ca: bool,
    /// Certificate validity. Without it the certificate is valid only at startup
    #[arg(long, env, value_parser = humantime::parse_duration)]
    valid_for: Option<Duration>,
}

fn host_argument(args: &Args) -> anyhow::Result<HostArgument> {
    let Some(valid_for) = args.valid_for else {
        tracing::warn!("No validity given, certificate expires immediately");
        return Ok(HostArgument::from(args.host.as_str()));
    };
    tracing::info!(valid_for = format_duration(valid_for).to_string(), "cfg");
    Ok(HostArgument::Options(CertificateOptions {
        key_bits: args.key_bits,
        hosts: selfsigned::model::options::parse_hosts(&args.host)?,
        is_certificate_authority: args.ca,
        valid_from: time::OffsetDateTime::now_utc(),
        valid_duration: time::Duration::try_from(valid_for)?,
    }))
}

async fn main_int(args: Args) -> anyhow::Result<()> {
    log::info!("Starting selfsigned");
    tracing::info!(version = env!("CARGO_APP_VERSION"));
    tracing::info!(port = args.port, "cfg");
    tracing::info!(host = %args.host, "cfg");

    let provider = make_provider(host_argument(&args)?)?;
    if let Err(e) = provider.get_certificate(None) {
        return Err(anyhow::anyhow!("no certificate: {}", e));
    }

    tracing::trace!("Configuring Rustls");
    let mut tls = server_config(provider);
    tls.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];
    let cfg = RustlsConfig::from_config(Arc::new(tls));
    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));

    let handle = axum_server::Handle::new();
    let shutdown_future = shutdown_signal_handle(handle.clone());
    tokio::spawn(shutdown_future);

    tracing::info!(addr = format!("{}", addr), "listening");
    axum_server::bind_rustls(addr, cfg)
        .handle(handle)
        .serve(router().into_make_service())
        .await?;

    tracing::info!("Bye");
    Ok(())
}

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::Layer::default().compact())
        .init();
    let args = Args::parse();
    if let Err(e) = main_int(args).await {
        log::error!("{}", e);
        return Err(e);
    }
    Ok(())
}

async fn shutdown_signal_handle(handle: axum_server::Handle) {
    shutdown_signal().await;
    tracing::trace!("Received termination signal shutting down");
    handle.graceful_shutdown(Some(Duration::from_secs(10)));
}
