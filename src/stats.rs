use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::aggregate::parse_time;
use crate::collection::Collection;

#[derive(Debug, Serialize)]
pub struct Stats {
    pub generated: String,
    pub total_activities: usize,
    pub total_gps_points: usize,
    pub total_distance_km: Option<f64>,
    pub activity_types: HashMap<String, usize>,
    pub date_range: Option<DateRange>,
    pub last_activity: Option<LastActivity>,
    pub center: Center,
}

#[derive(Debug, Serialize)]
pub struct DateRange {
    pub first: String,
    pub last: String,
}

#[derive(Debug, Serialize)]
pub struct LastActivity {
    pub name: String,
    #[serde(rename = "type")]
    pub activity_type: String,
    pub date: String,
    pub distance_km: f64,
}

#[derive(Debug, Serialize)]
pub struct Center {
    pub lat: f64,
    pub lon: f64,
}

/// Derive the summary from the collection. `None` when there is nothing
/// to summarize (no features, or no feature has any points).
pub fn summarize(collection: &Collection) -> Option<Stats> {
    let features = &collection.features;
    if features.is_empty() {
        return None;
    }

    let total_gps_points = collection.total_points();
    if total_gps_points == 0 {
        return None;
    }

    let mut activity_types: HashMap<String, usize> = HashMap::new();
    for f in features {
        *activity_types
            .entry(f.properties.activity_type_or_default().to_string())
            .or_insert(0) += 1;
    }

    // Zero-distance activities still count, they just contribute nothing.
    let total_distance: f64 = features
        .iter()
        .map(|f| f.properties.distance_or_zero())
        .filter(|d| *d > 0.0)
        .sum();
    let total_distance_km = (total_distance > 0.0).then(|| round_to(total_distance / 1000.0, 1));

    let timed: Vec<_> = features
        .iter()
        .filter_map(|f| {
            f.properties
                .time
                .as_deref()
                .and_then(parse_time)
                .map(|t| (f, t))
        })
        .collect();

    let date_range = {
        let first = timed.iter().map(|(_, t)| *t).min();
        let last = timed.iter().map(|(_, t)| *t).max();
        first.zip(last).map(|(first, last)| DateRange {
            first: first.format("%Y-%m-%d").to_string(),
            last: last.format("%Y-%m-%d").to_string(),
        })
    };

    let last_activity = timed
        .iter()
        .max_by_key(|(_, t)| *t)
        .map(|(f, t)| LastActivity {
            name: f.properties.name.clone(),
            activity_type: f.properties.activity_type_or_default().to_string(),
            date: t.format("%Y-%m-%d").to_string(),
            distance_km: round_to(f.properties.distance_or_zero() / 1000.0, 1),
        });

    // Point-weighted centroid: every coordinate of every feature counts
    // equally, so longer tracks pull the center toward themselves.
    let (mut lat_sum, mut lon_sum) = (0.0, 0.0);
    for p in collection.points() {
        lat_sum += p.lat;
        lon_sum += p.lon;
    }
    let n = total_gps_points as f64;
    let center = Center {
        lat: round_to(lat_sum / n, 4),
        lon: round_to(lon_sum / n, 4),
    };

    Some(Stats {
        generated: chrono::Local::now().to_rfc3339(),
        total_activities: features.len(),
        total_gps_points,
        total_distance_km,
        activity_types,
        date_range,
        last_activity,
        center,
    })
}

pub fn save(stats: &Stats, output: &str) -> Result<()> {
    if let Some(parent) = Path::new(output).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(stats).context("Failed to serialize stats")?;
    fs::write(output, json).with_context(|| format!("Failed to write {output}"))?;
    eprintln!("Stats saved to {output}");
    Ok(())
}

pub fn print(stats: &Stats) {
    eprintln!("\n{}", "=".repeat(60));
    eprintln!("Activity Statistics");
    eprintln!("{}", "=".repeat(60));
    eprintln!("Total Activities: {}", stats.total_activities);
    eprintln!("Total GPS Points: {}", stats.total_gps_points);

    if let Some(km) = stats.total_distance_km {
        eprintln!("Total Distance: {km} km");
    }

    if let Some(range) = &stats.date_range {
        eprintln!("\nDate Range: {} to {}", range.first, range.last);
    }

    if let Some(last) = &stats.last_activity {
        eprintln!(
            "Last Activity: {} ({}, {}, {} km)",
            last.name, last.activity_type, last.date, last.distance_km,
        );
    }

    eprintln!("\nActivity Types:");
    let mut types: Vec<_> = stats.activity_types.iter().collect();
    types.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
    for (label, count) in types {
        eprintln!("  {label}: {count}");
    }

    eprintln!("\nMap Center: {}, {}", stats.center.lat, stats.center.lon);
    eprintln!("{}", "=".repeat(60));
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10_f64.powi(places);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::merge;
    use crate::collection::{GeoPoint, Track, TrackSource};

    fn track(id: u64, points: usize, distance: f64, time: Option<&str>) -> Track {
        Track {
            name: format!("Activity {id}"),
            start_time: time.map(|t| t.to_string()),
            activity_type: Some("Run".to_string()),
            distance_m: Some(distance),
            source: TrackSource::Activity(id),
            points: (0..points)
                .map(|i| GeoPoint {
                    lat: 61.0 + i as f64 * 0.001,
                    lon: -149.0,
                    ele: 0.0,
                })
                .collect(),
        }
    }

    #[test]
    fn totals_and_distance() {
        let mut collection = Collection::empty();
        merge(
            &mut collection,
            vec![
                track(1, 10, 1000.0, Some("2024-01-01T00:00:00Z")),
                track(2, 5, 0.0, Some("2024-06-15T00:00:00Z")),
            ],
        );

        let stats = summarize(&collection).unwrap();
        assert_eq!(stats.total_activities, 2);
        assert_eq!(stats.total_gps_points, 15);
        assert_eq!(stats.total_distance_km, Some(1.0));
        assert_eq!(stats.activity_types.get("Run"), Some(&2));

        let range = stats.date_range.unwrap();
        assert_eq!(range.first, "2024-01-01");
        assert_eq!(range.last, "2024-06-15");

        let last = stats.last_activity.unwrap();
        assert_eq!(last.name, "Activity 2");
        assert_eq!(last.distance_km, 0.0);
    }

    #[test]
    fn distance_absent_when_all_zero() {
        let mut collection = Collection::empty();
        merge(&mut collection, vec![track(1, 3, 0.0, None)]);

        let stats = summarize(&collection).unwrap();
        assert_eq!(stats.total_distance_km, None);
        assert!(stats.date_range.is_none());
        assert!(stats.last_activity.is_none());

        let json = serde_json::to_value(&stats).unwrap();
        assert!(json["total_distance_km"].is_null());
    }

    #[test]
    fn center_is_point_weighted() {
        let mut big = track(1, 0, 0.0, None);
        big.points = vec![
            GeoPoint { lat: 59.0, lon: -151.0, ele: 0.0 },
            GeoPoint { lat: 61.0, lon: -149.0, ele: 0.0 },
        ];
        let mut small = track(2, 0, 0.0, None);
        small.points = vec![GeoPoint { lat: 62.0, lon: -148.0, ele: 0.0 }];

        let mut collection = Collection::empty();
        merge(&mut collection, vec![big, small]);

        let stats = summarize(&collection).unwrap();
        // (59 + 61 + 62) / 3, not the average of per-track centers.
        assert_eq!(stats.center.lat, round_to(182.0 / 3.0, 4));
        assert_eq!(stats.center.lon, round_to(-448.0 / 3.0, 4));
    }

    #[test]
    fn empty_collection_has_no_summary() {
        assert!(summarize(&Collection::empty()).is_none());
    }

    #[test]
    fn unknown_type_default() {
        let mut t = track(1, 2, 0.0, None);
        t.activity_type = None;
        let mut collection = Collection::empty();
        merge(&mut collection, vec![t]);

        let stats = summarize(&collection).unwrap();
        assert_eq!(stats.activity_types.get("Unknown"), Some(&1));
    }
}
