use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// One GPS fix. Elevation is 0 when the source carries none.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
    pub ele: f64,
}

/// Where a track came from; doubles as its de-duplication key.
#[derive(Debug, Clone)]
pub enum TrackSource {
    /// GPX file name, extension included.
    File(String),
    /// Remote activity id.
    Activity(u64),
}

impl TrackSource {
    pub fn id(&self) -> String {
        match self {
            Self::File(name) => name.clone(),
            Self::Activity(id) => id.to_string(),
        }
    }
}

/// One physical activity, as produced by a source adapter.
#[derive(Debug, Clone)]
pub struct Track {
    pub name: String,
    pub start_time: Option<String>,
    pub activity_type: Option<String>,
    pub distance_m: Option<f64>,
    pub source: TrackSource,
    pub points: Vec<GeoPoint>,
}

impl Track {
    pub fn id(&self) -> String {
        self.source.id()
    }

    pub fn into_feature(self) -> Feature {
        let coordinates: Vec<[f64; 3]> =
            self.points.iter().map(|p| [p.lon, p.lat, p.ele]).collect();
        let (source_file, activity_id) = match self.source {
            TrackSource::File(name) => (Some(name), None),
            TrackSource::Activity(id) => (None, Some(id)),
        };
        Feature {
            feature_type: "Feature".to_string(),
            properties: Properties {
                name: self.name,
                time: self.start_time,
                activity_type: self.activity_type,
                distance: self.distance_m,
                source_file,
                activity_id,
                point_count: coordinates.len(),
            },
            geometry: Geometry {
                geometry_type: "LineString".to_string(),
                coordinates,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feature {
    #[serde(rename = "type")]
    pub feature_type: String,
    pub properties: Properties,
    pub geometry: Geometry,
}

impl Feature {
    /// De-duplication key: the source file name or the activity id.
    pub fn track_id(&self) -> String {
        match (&self.properties.source_file, self.properties.activity_id) {
            (Some(name), _) => name.clone(),
            (None, Some(id)) => id.to_string(),
            (None, None) => self.properties.name.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Properties {
    pub name: String,
    pub time: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub activity_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity_id: Option<u64>,
    pub point_count: usize,
}

impl Properties {
    pub fn activity_type_or_default(&self) -> &str {
        self.activity_type.as_deref().unwrap_or("Unknown")
    }

    pub fn distance_or_zero(&self) -> f64 {
        self.distance.unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Geometry {
    #[serde(rename = "type")]
    pub geometry_type: String,
    /// [lon, lat, elevation] triples, GeoJSON order.
    pub coordinates: Vec<[f64; 3]>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
    #[serde(default)]
    pub total_activities: usize,
    #[serde(default)]
    pub total_points: usize,
}

/// Which metadata timestamp a save refreshes: a fresh import stamps
/// `generated`, an incremental update stamps `last_updated`.
#[derive(Debug, Clone, Copy)]
pub enum Stamp {
    Generated,
    Updated,
}

/// The persisted aggregate of all tracks, stored as a GeoJSON
/// FeatureCollection. Feature order is insertion order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collection {
    #[serde(rename = "type")]
    pub collection_type: String,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub features: Vec<Feature>,
}

impl Collection {
    pub fn empty() -> Self {
        Self {
            collection_type: "FeatureCollection".to_string(),
            metadata: Metadata::default(),
            features: Vec::new(),
        }
    }

    pub fn load(path: &str) -> Result<Self> {
        if !Path::new(path).exists() {
            anyhow::bail!("Collection file '{path}' not found. Run 'trailheat import' first.");
        }
        let data = fs::read_to_string(path).with_context(|| format!("Failed to read {path}"))?;
        serde_json::from_str(&data).with_context(|| format!("Failed to parse {path}"))
    }

    pub fn load_or_empty(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            Self::load(path)
        } else {
            Ok(Self::empty())
        }
    }

    /// Recompute the stored totals and stamp the requested timestamp.
    pub fn refresh_metadata(&mut self, stamp: Stamp) {
        self.metadata.total_activities = self.features.len();
        self.metadata.total_points = self.total_points();
        let now = chrono::Local::now().to_rfc3339();
        match stamp {
            Stamp::Generated => {
                self.metadata.generated = Some(now);
                self.metadata.last_updated = None;
            }
            Stamp::Updated => {
                self.metadata.last_updated = Some(now);
                self.metadata.generated = None;
            }
        }
    }

    pub fn save(&self, path: &str) -> Result<()> {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(self).context("Failed to serialize collection")?;
        fs::write(path, json).with_context(|| format!("Failed to write {path}"))?;
        Ok(())
    }

    pub fn total_points(&self) -> usize {
        self.features
            .iter()
            .map(|f| f.geometry.coordinates.len())
            .sum()
    }

    /// Every point of every feature, in insertion order, back in
    /// (lat, lon, ele) form.
    pub fn points(&self) -> impl Iterator<Item = GeoPoint> + '_ {
        self.features.iter().flat_map(|f| {
            f.geometry
                .coordinates
                .iter()
                .map(|&[lon, lat, ele]| GeoPoint { lat, lon, ele })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_track() -> Track {
        Track {
            name: "Morning Run".to_string(),
            start_time: Some("2024-06-15T08:30:00Z".to_string()),
            activity_type: None,
            distance_m: None,
            source: TrackSource::File("run.gpx".to_string()),
            points: vec![GeoPoint {
                lat: 61.2,
                lon: -149.9,
                ele: 50.0,
            }],
        }
    }

    #[test]
    fn feature_coordinates_are_lon_lat_ele() {
        let feature = sample_track().into_feature();
        assert_eq!(feature.geometry.coordinates, vec![[-149.9, 61.2, 50.0]]);
        assert_eq!(feature.properties.point_count, 1);
    }

    #[test]
    fn gpx_feature_omits_type_and_distance() {
        let feature = sample_track().into_feature();
        let json = serde_json::to_value(&feature).unwrap();
        let props = &json["properties"];
        assert!(props.get("type").is_none());
        assert!(props.get("distance").is_none());
        assert_eq!(props["source_file"], "run.gpx");
        assert!(props.get("activity_id").is_none());
    }

    #[test]
    fn api_feature_carries_activity_id() {
        let mut track = sample_track();
        track.source = TrackSource::Activity(12345);
        track.activity_type = Some("Run".to_string());
        track.distance_m = Some(5000.0);
        let feature = track.into_feature();
        assert_eq!(feature.track_id(), "12345");
        let json = serde_json::to_value(&feature).unwrap();
        assert_eq!(json["properties"]["activity_id"], 12345);
        assert_eq!(json["properties"]["type"], "Run");
    }

    #[test]
    fn missing_time_serializes_as_null() {
        let mut track = sample_track();
        track.start_time = None;
        let json = serde_json::to_value(&track.into_feature()).unwrap();
        assert!(json["properties"]["time"].is_null());
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("activities.geojson");
        let path = path.to_str().unwrap();

        let mut collection = Collection::empty();
        collection.features.push(sample_track().into_feature());
        collection.refresh_metadata(Stamp::Generated);
        collection.save(path).unwrap();

        let loaded = Collection::load(path).unwrap();
        assert_eq!(loaded.collection_type, "FeatureCollection");
        assert_eq!(loaded.features.len(), 1);
        assert_eq!(loaded.metadata.total_activities, 1);
        assert_eq!(loaded.metadata.total_points, 1);
        assert!(loaded.metadata.generated.is_some());
        assert!(loaded.metadata.last_updated.is_none());

        let point = loaded.points().next().unwrap();
        assert_eq!(point.lat, 61.2);
        assert_eq!(point.lon, -149.9);
        assert_eq!(point.ele, 50.0);
    }

    #[test]
    fn load_missing_file_is_an_error() {
        let err = Collection::load("does-not-exist.geojson").unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn update_stamp_replaces_generated() {
        let mut collection = Collection::empty();
        collection.refresh_metadata(Stamp::Generated);
        assert!(collection.metadata.generated.is_some());
        collection.refresh_metadata(Stamp::Updated);
        assert!(collection.metadata.generated.is_none());
        assert!(collection.metadata.last_updated.is_some());
    }
}
