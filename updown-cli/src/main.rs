use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use updown::CacheScope;

mod commands;

/// ASTER GDEM elevation CLI tool
#[derive(Parser)]
#[command(name = "updown")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory containing ASTGTMV003_*_dem.tif tiles or their .zip archives
    #[arg(short, long, env = "UPDOWN_DATA_DIR", global = true)]
    data_dir: Option<PathBuf>,

    /// Keep opened tiles for one batch or for the whole run
    #[arg(
        long,
        env = "UPDOWN_CACHE_SCOPE",
        default_value = "batch",
        global = true
    )]
    cache_scope: CacheScope,

    /// Maximum tiles kept with process scope
    #[arg(
        short,
        long,
        env = "UPDOWN_CACHE_SIZE",
        default_value = "16",
        global = true
    )]
    cache_size: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Query elevation for a single coordinate
    Query {
        /// Longitude in decimal degrees
        #[arg(long, allow_hyphen_values = true)]
        lng: f64,

        /// Latitude in decimal degrees
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        /// Use bilinear interpolation for sub-pixel accuracy
        #[arg(short, long)]
        interpolate: bool,

        /// Output result as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Process elevation for multiple coordinates from a file
    Batch {
        /// Input file (CSV or GeoJSON)
        input: PathBuf,

        /// Output file (same format as input if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Column name for latitude (CSV only)
        #[arg(long, default_value = "lat")]
        lat_col: String,

        /// Column name for longitude (CSV only)
        #[arg(long, default_value = "lng")]
        lng_col: String,

        /// Use bilinear interpolation
        #[arg(short, long)]
        interpolate: bool,

        /// Rows resolved per batch (CSV only)
        #[arg(long, default_value = "10000")]
        chunk_size: usize,
    },

    /// Display information about an ASTER GDEM tile
    Info {
        /// Path to a _dem.tif file, or tile name (e.g., N36E025)
        #[arg(required_unless_present_all = ["lng", "lat"])]
        tile: Option<String>,

        /// Specify tile by longitude instead of filename
        #[arg(long, conflicts_with = "tile", requires = "lat", allow_hyphen_values = true)]
        lng: Option<f64>,

        /// Specify tile by latitude instead of filename
        #[arg(long, conflicts_with = "tile", requires = "lng", allow_hyphen_values = true)]
        lat: Option<f64>,
    },

    /// List available ASTER GDEM tiles
    List,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = commands::ServiceSettings {
        data_dir: cli.data_dir,
        cache_scope: cli.cache_scope,
        cache_size: cli.cache_size,
    };

    match cli.command {
        Commands::Query {
            lng,
            lat,
            interpolate,
            json,
        } => commands::query::run(settings, lng, lat, interpolate, json),
        Commands::Batch {
            input,
            output,
            lat_col,
            lng_col,
            interpolate,
            chunk_size,
        } => commands::batch::run(
            settings,
            input,
            output,
            commands::batch::CsvColumns { lat_col, lng_col },
            interpolate,
            chunk_size,
        ),
        Commands::Info { tile, lng, lat } => {
            commands::info::run(settings.data_dir, tile, lng.zip(lat))
        }
        Commands::List => commands::list::run(settings.data_dir),
    }
}
