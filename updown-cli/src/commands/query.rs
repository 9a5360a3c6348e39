use anyhow::{Context, Result};
use serde::Serialize;
use updown::{Point, ResolveOptions};

use super::ServiceSettings;

#[derive(Serialize)]
struct ElevationResponse {
    lng: f64,
    lat: f64,
    elev: f64,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    interpolated: bool,
}

pub fn run(
    settings: ServiceSettings,
    lng: f64,
    lat: f64,
    interpolate: bool,
    json: bool,
) -> Result<()> {
    let service = settings.build()?;
    let options = ResolveOptions {
        interpolate,
        ..ResolveOptions::default()
    };

    let elev = super::runtime()?
        .block_on(service.elevation(Point::new(lng, lat), options))
        .context("Failed to get elevation")?;

    if json {
        let response = ElevationResponse {
            lng,
            lat,
            elev,
            interpolated: interpolate,
        };
        println!("{}", serde_json::to_string(&response)?);
    } else {
        println!("{}", elev);
    }

    Ok(())
}
