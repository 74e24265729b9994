use anyhow::{Context, Result};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::collection::{GeoPoint, Track, TrackSource};

/// Import every `*.gpx` file under `dir`, one track per file. A file
/// that fails to parse or carries no points is reported and skipped;
/// the import keeps going.
pub fn import_directory(dir: &str) -> Result<Vec<Track>> {
    let dir_path = Path::new(dir);
    if !dir_path.exists() {
        anyhow::bail!("GPX directory '{dir}' does not exist");
    }

    let mut entries: Vec<_> = std::fs::read_dir(dir_path)
        .with_context(|| format!("Failed to read directory {dir}"))?
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "gpx"))
        .collect();
    entries.sort_by_key(|e| e.file_name());

    if entries.is_empty() {
        eprintln!("No GPX files found in {dir}");
        return Ok(Vec::new());
    }

    eprintln!("Found {} GPX files", entries.len());

    let mut tracks = Vec::new();
    let mut failed = 0_usize;
    let mut total_points = 0_usize;

    for (i, entry) in entries.iter().enumerate() {
        if (i + 1) % 10 == 0 {
            eprintln!("Processed {}/{} files...", i + 1, entries.len());
        }

        let path = entry.path();
        match parse_file(&path) {
            Ok(Some(track)) => {
                total_points += track.points.len();
                tracks.push(track);
            }
            Ok(None) => {
                failed += 1;
                eprintln!("Warning: no track points in {}", path.display());
            }
            Err(e) => {
                failed += 1;
                eprintln!("Warning: failed to parse {}: {e:#}", path.display());
            }
        }
    }

    eprintln!(
        "Imported {} of {} files ({failed} failed), {total_points} GPS points",
        tracks.len(),
        entries.len(),
    );
    Ok(tracks)
}

fn parse_file(path: &Path) -> Result<Option<Track>> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let reader = BufReader::new(file);
    let gpx_data =
        gpx::read(reader).with_context(|| format!("Failed to parse {}", path.display()))?;

    let mut points = Vec::new();
    for track in &gpx_data.tracks {
        for segment in &track.segments {
            for wpt in &segment.points {
                points.push(GeoPoint {
                    lat: wpt.point().y(),
                    lon: wpt.point().x(),
                    ele: wpt.elevation.unwrap_or(0.0),
                });
            }
        }
    }

    if points.is_empty() {
        return Ok(None);
    }

    let file_name = path
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();

    let name = gpx_data
        .tracks
        .first()
        .and_then(|t| t.name.clone())
        .unwrap_or_else(|| file_name.clone());

    // Activity start = timestamp of the very first point, when present.
    let start_time = gpx_data
        .tracks
        .first()
        .and_then(|t| t.segments.first())
        .and_then(|s| s.points.first())
        .and_then(|p| p.time)
        .and_then(|t| t.format().ok());

    Ok(Some(Track {
        name,
        start_time,
        activity_type: None,
        distance_m: None,
        source: TrackSource::File(file_name),
        points,
    }))
}
