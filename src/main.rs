use clap::{Parser, Subcommand};
use std::path::PathBuf;
use anyhow::{anyhow, Context};
use tracing::info;
use tracing_subscriber::EnvFilter;

use response_map::config::AppConfig;
use response_map::dashboard::DashboardController;
use response_map::headless::{HeadlessLoader, HeadlessPage};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the overview bootstrap headlessly and report what lands on the map
    Inspect {
        #[arg(short, long, value_name = "FILE", default_value = "console.toml")]
        config: PathBuf,
        /// Write both marker layers as a GeoJSON FeatureCollection
        #[arg(short, long, value_name = "FILE")]
        geojson: Option<PathBuf>,
    },
    /// Serve the console pages and the snapshot
    Serve {
        #[arg(short, long, value_name = "FILE", default_value = "console.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Inspect { config, geojson } => {
            let app_config = AppConfig::load_or_default(config)?;
            let page = HeadlessPage::with_loader(HeadlessLoader::new(app_config.viewport));

            let dashboard = DashboardController::new(&page, &app_config)
                .bootstrap()
                .await
                .map_err(|e| anyhow!("App failed to start: {e}"))?;

            let map = dashboard.map();
            let camera = map.engine().camera();
            info!(
                incidents = map.marker_count(map.incident_layer()),
                assets = map.marker_count(map.asset_layer()),
                queue = dashboard.snapshot().dispatch_queue.len(),
                center_lon = camera.center.x(),
                center_lat = camera.center.y(),
                zoom = camera.zoom,
                "map plotted"
            );

            if let Some(out) = geojson {
                let mut collection = map.engine().layer_geojson(map.incident_layer());
                collection
                    .features
                    .extend(map.engine().layer_geojson(map.asset_layer()).features);
                let json = serde_json::to_string_pretty(&collection)?;
                std::fs::write(out, json)
                    .with_context(|| format!("Failed to write GeoJSON: {:?}", out))?;
                info!(path = %out.display(), "layers exported");
            }
        }
        Commands::Serve { config } => {
            let app_config = AppConfig::load_or_default(config)?;
            response_map::server::start_server(app_config).await?;
        }
    }

    Ok(())
}
