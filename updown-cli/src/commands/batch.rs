use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tokio::runtime::Runtime;
use updown::{ElevationService, Point, ResolveOptions};

use super::ServiceSettings;

/// Header names of the coordinate columns in a CSV input.
pub struct CsvColumns {
    pub lat_col: String,
    pub lng_col: String,
}

pub fn run(
    settings: ServiceSettings,
    input: PathBuf,
    output: Option<PathBuf>,
    columns: CsvColumns,
    interpolate: bool,
    chunk_size: usize,
) -> Result<()> {
    if chunk_size == 0 {
        bail!("--chunk-size must be at least 1");
    }

    let service = settings.build()?;
    let runtime = super::runtime()?;
    let options = ResolveOptions {
        interpolate,
        ..ResolveOptions::default()
    };

    // Detect file format
    let extension = input
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    match extension.as_str() {
        "csv" => process_csv(
            &runtime, &service, &input, output, &columns, options, chunk_size,
        ),
        "geojson" | "json" => process_geojson(&runtime, &service, &input, output, options),
        _ => bail!(
            "Unsupported file format: {}. Use .csv or .geojson",
            extension
        ),
    }
}

fn process_csv(
    runtime: &Runtime,
    service: &ElevationService,
    input: &Path,
    output: Option<PathBuf>,
    columns: &CsvColumns,
    options: ResolveOptions,
    chunk_size: usize,
) -> Result<()> {
    let file = File::open(input).context("Failed to open input file")?;
    let mut reader = csv::Reader::from_reader(BufReader::new(file));

    // Find column indices
    let headers = reader.headers()?.clone();
    let lat_idx = headers
        .iter()
        .position(|h| h == columns.lat_col)
        .with_context(|| format!("Column '{}' not found in CSV", columns.lat_col))?;
    let lng_idx = headers
        .iter()
        .position(|h| h == columns.lng_col)
        .with_context(|| format!("Column '{}' not found in CSV", columns.lng_col))?;

    let records: Vec<csv::StringRecord> = reader.records().collect::<Result<_, _>>()?;
    let points = records
        .iter()
        .enumerate()
        .map(|(i, record)| {
            parse_point(record, lng_idx, lat_idx).with_context(|| format!("Row {}", i + 1))
        })
        .collect::<Result<Vec<_>>>()?;

    let pb = ProgressBar::new(points.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
            )?
            .progress_chars("#>-"),
    );

    // Prepare output
    let output_path = output.unwrap_or_else(|| default_output(input, "csv"));
    let output_file = File::create(&output_path).context("Failed to create output file")?;
    let mut writer = csv::Writer::from_writer(BufWriter::new(output_file));

    // Write header
    let mut new_headers: Vec<&str> = headers.iter().collect();
    new_headers.push("elevation");
    writer.write_record(&new_headers)?;

    // One batch per chunk
    for (chunk_index, (chunk, rows)) in points
        .chunks(chunk_size)
        .zip(records.chunks(chunk_size))
        .enumerate()
    {
        let batch = runtime
            .block_on(service.resolve_batch(chunk, options))
            .with_context(|| {
                format!(
                    "Failed to resolve rows {}..{}",
                    chunk_index * chunk_size + 1,
                    chunk_index * chunk_size + chunk.len()
                )
            })?;

        for (record, result) in rows.iter().zip(&batch.results) {
            let elevation = result.elev.to_string();
            let mut new_record: Vec<&str> = record.iter().collect();
            new_record.push(&elevation);
            writer.write_record(&new_record)?;
        }

        pb.inc(chunk.len() as u64);
    }

    pb.finish_with_message("done");
    writer.flush()?;

    println!("Output written to: {}", output_path.display());
    Ok(())
}

fn parse_point(record: &csv::StringRecord, lng_idx: usize, lat_idx: usize) -> Result<Point> {
    let lng: f64 = record
        .get(lng_idx)
        .context("Missing longitude")?
        .trim()
        .parse()
        .context("Invalid longitude")?;
    let lat: f64 = record
        .get(lat_idx)
        .context("Missing latitude")?
        .trim()
        .parse()
        .context("Invalid latitude")?;
    Ok(Point::new(lng, lat))
}

fn process_geojson(
    runtime: &Runtime,
    service: &ElevationService,
    input: &Path,
    output: Option<PathBuf>,
    options: ResolveOptions,
) -> Result<()> {
    let file = File::open(input).context("Failed to open input file")?;
    let reader = BufReader::new(file);

    let geojson: geojson::GeoJson =
        serde_json::from_reader(reader).context("Failed to parse GeoJSON")?;

    let pb = ProgressBar::new_spinner();
    pb.set_message("resolving positions");

    let result = runtime
        .block_on(updown::geojson::add_elevations_to_geojson(
            service, geojson, options,
        ))
        .context("Failed to add elevations")?;

    pb.finish_with_message("done");

    // Write output
    let output_path = output.unwrap_or_else(|| default_output(input, "geojson"));
    let output_file = File::create(&output_path).context("Failed to create output file")?;
    let mut writer = BufWriter::new(output_file);
    serde_json::to_writer_pretty(&mut writer, &result)?;
    writer.flush()?;

    println!("Output written to: {}", output_path.display());
    Ok(())
}

/// `<stem>_elevation.<extension>` next to the input.
fn default_output(input: &Path, extension: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    input.with_file_name(format!("{}_elevation.{}", stem, extension))
}
