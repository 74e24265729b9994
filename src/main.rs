mod aggregate;
mod collection;
mod config;
mod gpx;
mod gradient;
mod heatmap;
mod render;
mod stats;
mod strava;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};

use crate::collection::{Collection, Stamp};

#[derive(Parser)]
#[command(
    name = "trailheat",
    about = "Personal GPS activity heatmap pipeline"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a directory of GPX files into a fresh collection
    Import {
        /// Directory containing GPX files
        gpx_dir: String,

        /// Collection file to write
        #[arg(short, long, default_value = config::DEFAULT_COLLECTION)]
        collection: String,
    },

    /// Fetch new Strava activities and merge them into the collection
    Sync {
        /// Collection file to update
        #[arg(short, long, default_value = config::DEFAULT_COLLECTION)]
        collection: String,

        /// How many recent activities to examine
        #[arg(short, long, default_value_t = config::ACTIVITY_PAGE_SIZE)]
        limit: u32,
    },

    /// Generate summary statistics from the collection
    Stats {
        /// Collection file to read
        #[arg(short, long, default_value = config::DEFAULT_COLLECTION)]
        collection: String,

        /// Output JSON file path
        #[arg(short, long, default_value = config::DEFAULT_STATS)]
        output: String,
    },

    /// Render the interactive heatmap page
    Heatmap {
        /// Collection file to read
        #[arg(short, long, default_value = config::DEFAULT_COLLECTION)]
        collection: String,

        /// Output HTML file path
        #[arg(short, long, default_value = config::DEFAULT_HEATMAP)]
        output: String,

        /// Color scheme for the heat layer
        #[arg(short, long, default_value = "classic")]
        gradient: ColorScheme,

        /// Opacity floor for the heat layer
        #[arg(long, default_value_t = config::DEFAULT_MIN_OPACITY)]
        min_opacity: f64,

        /// Heat point radius in pixels
        #[arg(long, default_value_t = config::DEFAULT_POINT_RADIUS)]
        radius: u32,

        /// Heat blur radius in pixels
        #[arg(long, default_value_t = config::DEFAULT_BLUR)]
        blur: u32,
    },

    /// Render the static heatmap image
    Render {
        /// Collection file to read
        #[arg(short, long, default_value = config::DEFAULT_COLLECTION)]
        collection: String,

        /// Output PNG file path
        #[arg(short, long, default_value = config::DEFAULT_STATIC)]
        output: String,

        /// Color scheme for the density colormap
        #[arg(short, long, default_value = "classic")]
        gradient: ColorScheme,

        /// Histogram resolution (bins per axis)
        #[arg(long, default_value_t = config::DEFAULT_BINS)]
        bins: usize,

        /// Gaussian blur sigma, in bins
        #[arg(long, default_value_t = config::DEFAULT_SIGMA)]
        sigma: f64,
    },

    /// Sync new activities, then regenerate stats and both heatmaps
    Update {
        /// Collection file to update
        #[arg(short, long, default_value = config::DEFAULT_COLLECTION)]
        collection: String,

        /// How many recent activities to examine
        #[arg(short, long, default_value_t = config::ACTIVITY_PAGE_SIZE)]
        limit: u32,

        /// Color scheme for both renderers
        #[arg(short, long, default_value = "classic")]
        gradient: ColorScheme,
    },
}

#[derive(Clone, ValueEnum)]
enum ColorScheme {
    Classic,
    Heat,
    Purple,
    Green,
}

fn resolve_gradient(scheme: &ColorScheme) -> gradient::Gradient {
    match scheme {
        ColorScheme::Classic => gradient::Gradient::classic(),
        ColorScheme::Heat => gradient::Gradient::heat(),
        ColorScheme::Purple => gradient::Gradient::purple(),
        ColorScheme::Green => gradient::Gradient::green(),
    }
}

fn build_client() -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .user_agent("trailheat/0.1")
        .build()?)
}

fn do_import(gpx_dir: &str, collection_path: &str) -> Result<()> {
    let tracks = gpx::import_directory(gpx_dir)?;
    if tracks.is_empty() {
        eprintln!("Nothing imported — collection left untouched");
        return Ok(());
    }

    let mut collection = Collection::empty();
    let outcome = aggregate::merge(&mut collection, tracks);
    collection.refresh_metadata(Stamp::Generated);
    collection.save(collection_path)?;

    eprintln!(
        "Saved {} activities ({} points) to {collection_path}",
        collection.metadata.total_activities,
        collection.metadata.total_points,
    );
    if outcome.dropped > 0 {
        eprintln!("Dropped {} invalid tracks", outcome.dropped);
    }
    Ok(())
}

async fn do_sync(collection_path: &str, limit: u32) -> Result<()> {
    let client = build_client()?;
    let mut provider = strava::TokenProvider::from_env_or_files()?;
    let token = provider.access_token(&client).await?;

    let mut collection = Collection::load_or_empty(collection_path)?;
    let since = aggregate::latest_timestamp(&collection);

    eprintln!("Fetching new activities from Strava...");
    if let Some(t) = since {
        eprintln!("Looking for activities after {}", t.format("%Y-%m-%d %H:%M:%S"));
    }

    let activities = strava::list_activities(&client, &token, limit).await?;
    let candidates: Vec<_> = activities
        .into_iter()
        .filter(|a| a.has_gps())
        .filter(|a| match (&since, aggregate::parse_time(&a.start_date)) {
            (Some(latest), Some(t)) => t > *latest,
            (Some(_), None) => false,
            (None, _) => true,
        })
        .collect();

    if candidates.is_empty() {
        eprintln!("No new activities found");
        return Ok(());
    }
    eprintln!("Found {} new activities", candidates.len());

    let mut new_tracks = Vec::new();
    for (i, activity) in candidates.iter().enumerate() {
        eprintln!(
            "Processing {}/{}: {}",
            i + 1,
            candidates.len(),
            activity.name,
        );

        let streams = match strava::fetch_streams(&client, &token, activity.id).await {
            Ok(Some(streams)) => streams,
            Ok(None) => {
                eprintln!("  Warning: no GPS stream available — skipping");
                continue;
            }
            Err(e) => {
                eprintln!("  Warning: stream fetch failed: {e:#} — skipping");
                continue;
            }
        };

        match strava::to_track(activity, &streams) {
            Some(track) => {
                eprintln!("  Added {} GPS points", track.points.len());
                new_tracks.push(track);
            }
            None => eprintln!("  Warning: empty GPS stream — skipping"),
        }
    }

    let outcome = aggregate::merge(&mut collection, new_tracks);
    collection.refresh_metadata(Stamp::Updated);
    collection.save(collection_path)?;

    eprintln!(
        "Added {} new activities to {collection_path} ({} total, {} points)",
        outcome.added,
        collection.metadata.total_activities,
        collection.metadata.total_points,
    );
    if outcome.replaced > 0 {
        eprintln!("Replaced {} existing activities", outcome.replaced);
    }
    Ok(())
}

fn do_stats(collection_path: &str, output: &str) -> Result<()> {
    let collection = Collection::load(collection_path)?;
    match stats::summarize(&collection) {
        Some(summary) => {
            stats::print(&summary);
            stats::save(&summary, output)?;
        }
        None => eprintln!("No activities with GPS points in {collection_path} — no stats generated"),
    }
    Ok(())
}

fn do_heatmap(
    collection_path: &str,
    output: &str,
    scheme: &ColorScheme,
    min_opacity: f64,
    radius: u32,
    blur: u32,
) -> Result<()> {
    let collection = Collection::load(collection_path)?;
    let opts = heatmap::HeatmapOptions {
        gradient: resolve_gradient(scheme),
        min_opacity,
        radius,
        blur,
    };
    heatmap::generate(&collection, &opts, output)?;
    Ok(())
}

fn do_render(
    collection_path: &str,
    output: &str,
    scheme: &ColorScheme,
    bins: usize,
    sigma: f64,
) -> Result<()> {
    let collection = Collection::load(collection_path)?;
    let opts = render::RenderOptions {
        gradient: resolve_gradient(scheme),
        bins,
        sigma,
    };
    render::generate(&collection, &opts, output)?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Import {
            gpx_dir,
            collection,
        } => {
            do_import(&gpx_dir, &collection)?;
        }

        Commands::Sync { collection, limit } => {
            do_sync(&collection, limit).await?;
        }

        Commands::Stats { collection, output } => {
            do_stats(&collection, &output)?;
        }

        Commands::Heatmap {
            collection,
            output,
            gradient,
            min_opacity,
            radius,
            blur,
        } => {
            do_heatmap(&collection, &output, &gradient, min_opacity, radius, blur)?;
        }

        Commands::Render {
            collection,
            output,
            gradient,
            bins,
            sigma,
        } => {
            do_render(&collection, &output, &gradient, bins, sigma)?;
        }

        Commands::Update {
            collection,
            limit,
            gradient,
        } => {
            do_sync(&collection, limit).await?;
            do_stats(&collection, config::DEFAULT_STATS)?;
            do_heatmap(
                &collection,
                config::DEFAULT_HEATMAP,
                &gradient,
                config::DEFAULT_MIN_OPACITY,
                config::DEFAULT_POINT_RADIUS,
                config::DEFAULT_BLUR,
            )?;
            do_render(
                &collection,
                config::DEFAULT_STATIC,
                &gradient,
                config::DEFAULT_BINS,
                config::DEFAULT_SIGMA,
            )?;
        }
    }

    Ok(())
}
