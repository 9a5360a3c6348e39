//! Basic example demonstrating updown library usage.
//!
//! Run with: cargo run --example basic -- /path/to/aster/tiles

use std::env;

use updown::{ElevationError, ElevationService, Point, ResolveOptions};

#[tokio::main]
async fn main() -> Result<(), ElevationError> {
    // Get data directory from command line
    let data_dir = env::args().nth(1).unwrap_or_else(|| {
        eprintln!("Usage: cargo run --example basic -- /path/to/aster/tiles");
        std::process::exit(1);
    });

    let service = ElevationService::new(&data_dir);

    // A few summits, resolved as one batch
    let locations = [
        ("Mount Olympus, Greece", Point::new(22.3583, 40.0859)),
        ("Mount Kilimanjaro, Tanzania", Point::new(37.3556, -3.0674)),
        ("Aconcagua, Argentina", Point::new(-70.0109, -32.6532)),
    ];
    let points: Vec<Point> = locations.iter().map(|(_, p)| *p).collect();

    for (label, options) in [
        ("nearest sample", ResolveOptions::default()),
        ("bilinear", ResolveOptions::interpolated()),
    ] {
        println!("Elevation queries ({}):", label);
        println!("{:-<50}", "");

        match service.resolve_batch(&points, options).await {
            Ok(batch) => {
                for ((name, _), result) in locations.iter().zip(&batch.results) {
                    println!("{}: {}m", name, result.elev);
                }
                println!(
                    "({} tiles, {} distinct pixels)\n",
                    batch.stats.tiles, batch.stats.pixels
                );
            }
            Err(ElevationError::TileNotFound { file_name, points }) => {
                println!(
                    "{} not available locally (needed by points {:?})\n",
                    file_name, points
                );
            }
            Err(e) => return Err(e),
        }
    }

    Ok(())
}
