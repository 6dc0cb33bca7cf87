use clap::Parser;
use pomotask::infrastructure::error::InfraError;
use pomotask::infrastructure::http_api::{serve, ApiState};
use std::net::{Ipv4Addr, SocketAddr};
use tokio::net::TcpListener;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "pomotask-api", version, about = "PomoTask task and cycle sync API")]
struct Args {
    /// Listen address, e.g. 127.0.0.1:3000. Overrides --port.
    #[arg(long)]
    listen: Option<SocketAddr>,

    /// Port to bind on all interfaces when --listen is not given.
    #[arg(long, env = "PORT", default_value_t = 3000)]
    port: u16,

    /// Log level (env-filter syntax).
    #[arg(long, default_value = "info")]
    log: String,
}

impl Args {
    fn listen_address(&self) -> SocketAddr {
        self.listen
            .unwrap_or_else(|| SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.port)))
    }
}

#[tokio::main]
async fn main() -> Result<(), InfraError> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let address = args.listen_address();
    info!(listen = %address, "pomotask api starting");
    let listener = TcpListener::bind(address).await?;
    serve(listener, ApiState::new(), shutdown_signal()).await
}

async fn shutdown_signal() {
    let _ = signal::ctrl_c().await;
    info!("shutdown requested");
}
