//! The `writeResultsToFile` diagnostic side channel.
//!
//! Layout of `results.out`:
//!
//! ```text
//! 19/10/2026 14:03:27:041
//! {"interpolate":false,"writeResultsToFile":true}
//! 25.5,36.5,812
//! -3.2,-5.9,96.4
//! ```

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::Serialize;
use updown::ElevationResult;

pub const RESULTS_FILE_NAME: &str = "results.out";

/// Local time as `dd/mm/yyyy hh:mm:ss:ms`.
pub fn format_timestamp(now: &DateTime<Local>) -> String {
    now.format("%d/%m/%Y %H:%M:%S:%3f").to_string()
}

/// Write `results.out` into `dir`, replacing any previous file.
///
/// Returns the path written.
pub fn write_results<O: Serialize>(
    dir: &Path,
    options: &O,
    results: &[ElevationResult],
) -> csv::Result<PathBuf> {
    write_results_at(dir, options, results, &Local::now())
}

fn write_results_at<O: Serialize>(
    dir: &Path,
    options: &O,
    results: &[ElevationResult],
    now: &DateTime<Local>,
) -> csv::Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(RESULTS_FILE_NAME);

    let options =
        serde_json::to_string(options).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    let mut out = BufWriter::new(File::create(&path)?);
    writeln!(out, "{}", format_timestamp(now))?;
    writeln!(out, "{}", options)?;

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(out);
    for result in results {
        writer.write_record([
            result.lng.to_string(),
            result.lat.to_string(),
            result.elev.to_string(),
        ])?;
    }
    writer.flush()?;

    Ok(path)
}
