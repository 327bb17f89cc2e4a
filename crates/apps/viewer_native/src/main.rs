use std::time::Duration;

use catalog::{Location, all_locations, find_by_source};
use clap::{Parser, Subcommand, ValueEnum};
use engine::RecordingEngineFactory;
use foundation::time::DateKey;
use layers::{LayerKind, LayerRequest, Thresholds, legend_for};
use tracing::info;
use tracing_subscriber::EnvFilter;
use viewer::{ViewerConfig, ViewerSession};

#[derive(Parser, Debug)]
#[command(author, version, about = "Headless driver for the wildfire footprint map")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum Layer {
    Footprint,
    Pm25,
}

impl From<Layer> for LayerKind {
    fn from(layer: Layer) -> Self {
        match layer {
            Layer::Footprint => LayerKind::Footprint,
            Layer::Pm25 => LayerKind::Pm25,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List catalog locations as JSON
    Locations,

    /// Print the source and layer definitions for one location
    Layers {
        /// Tileset id of the location (see `locations`)
        #[arg(long)]
        source: String,

        #[arg(long, value_enum, default_value = "footprint")]
        layer: Layer,

        /// Date as YYYYMMDD or YYYY-MM-DD
        #[arg(long, default_value = "20160801")]
        date: String,
    },

    /// Print the legend for a layer at a threshold
    Legend {
        #[arg(long, value_enum, default_value = "footprint")]
        layer: Layer,

        #[arg(long)]
        threshold: Option<f64>,
    },

    /// Select a location, play the animation and print view snapshots
    Play {
        #[arg(long)]
        source: String,

        #[arg(long, value_enum, default_value = "footprint")]
        layer: Layer,

        /// Number of days to advance
        #[arg(long, default_value_t = 3)]
        days: u32,

        /// Override the tick interval in milliseconds
        #[arg(long)]
        tick_ms: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = ViewerConfig::from_env();

    match args.command {
        Command::Locations => {
            println!("{}", serde_json::to_string_pretty(all_locations())?);
        }
        Command::Layers {
            source,
            layer,
            date,
        } => {
            let location = lookup(&source)?;
            let date = DateKey::parse_any(&date).ok_or_else(|| format!("bad date: {date}"))?;
            let request = LayerRequest {
                location: location.clone(),
                active: layer.into(),
                thresholds: config.thresholds,
                date,
            };
            let out = serde_json::json!({
                "source": request.source(),
                "layers": request.layers(),
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        Command::Legend { layer, threshold } => {
            let kind = LayerKind::from(layer);
            let mut thresholds = Thresholds::default();
            if let Some(value) = threshold {
                thresholds.set(kind, value);
            }
            println!("{}", serde_json::to_string_pretty(&legend_for(kind, &thresholds))?);
        }
        Command::Play {
            source,
            layer,
            days,
            tick_ms,
        } => {
            let location = lookup(&source)?;
            let mut config = config;
            if let Some(ms) = tick_ms.filter(|ms| *ms > 0) {
                config.tick_interval = Duration::from_millis(ms);
            }
            play(config, location, layer.into(), days).await?;
        }
    }
    Ok(())
}

fn lookup(source: &str) -> Result<&'static Location, String> {
    find_by_source(source).ok_or_else(|| format!("unknown location: {source}"))
}

async fn play(
    config: ViewerConfig,
    location: &Location,
    kind: LayerKind,
    days: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    let interval = config.tick_interval;
    let mut factory = RecordingEngineFactory::preloaded();
    let mut session = ViewerSession::mount(config, &mut factory)?;

    session.select_location(location);
    session.set_layer_kind(kind);
    let change = session.toggle_animation();
    info!(?change, days, "playing");
    println!("{}", serde_json::to_string(&session.view())?);

    // Sample between ticks.
    tokio::time::sleep(interval / 2).await;
    for _ in 0..days {
        tokio::time::sleep(interval).await;
        println!("{}", serde_json::to_string(&session.view())?);
    }

    session.toggle_animation();
    info!(metrics = %serde_json::to_string(&session.metrics())?, "playback finished");
    session.unmount();
    Ok(())
}
