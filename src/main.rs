use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use ffconvert::web::start_web_server;
use ffconvert::{Config, ConversionService};

#[derive(Parser, Debug)]
#[command(name = "ffconvert", version, about = "Media conversion server backed by ffmpeg")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long)]
    host: Option<String>,

    #[arg(short, long)]
    port: Option<u16>,

    #[arg(short, long)]
    verbose: bool,
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "ffconvert=debug,actix_web=info"
    } else {
        "ffconvert=info,actix_web=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    let mut config = Config::load(cli.config.as_deref()).map_err(|err| {
        error!("{err}");
        std::io::Error::new(std::io::ErrorKind::InvalidInput, err.to_string())
    })?;
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }

    info!(
        ffmpeg = %config.ffmpeg_path.display(),
        uploads = %config.upload_dir.display(),
        output = %config.output_dir.display(),
        workers = config.worker_count(),
        "Loaded configuration"
    );

    let retention = config.job_retention();
    let service = ConversionService::new(config);

    if !service.dispatcher().transcoder().is_available().await {
        warn!("FFmpeg is not available, conversions will fail until it is installed");
    }

    if let Some(max_age) = retention {
        let sweeper = service.clone();
        let period = max_age.min(Duration::from_secs(60)).max(Duration::from_secs(1));
        actix_web::rt::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                let removed = sweeper.purge_expired().await;
                if removed > 0 {
                    info!("Removed {removed} expired jobs");
                }
            }
        });
    }

    let served = start_web_server(service.clone()).await;

    // queued jobs are failed rather than left pending
    service.dispatcher().shutdown();
    info!("Server stopped");

    served
}
