use chrono::{DateTime, FixedOffset};

use crate::collection::{Collection, Track};

#[derive(Debug, Default, PartialEq)]
pub struct MergeOutcome {
    pub added: usize,
    pub replaced: usize,
    pub dropped: usize,
}

pub fn parse_time(s: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(s).ok()
}

/// The incremental-update low-water mark: the newest parseable `time`
/// across all stored features. Features without one are ignored.
pub fn latest_timestamp(collection: &Collection) -> Option<DateTime<FixedOffset>> {
    collection
        .features
        .iter()
        .filter_map(|f| f.properties.time.as_deref().and_then(parse_time))
        .max()
}

/// Merge new tracks into the collection, in input order.
///
/// A track whose id matches an existing feature replaces that feature
/// in place; otherwise it is appended. Merging the same track twice
/// therefore never duplicates it. A track that fails its invariant
/// checks is dropped with a warning and the rest keep going.
pub fn merge(collection: &mut Collection, tracks: Vec<Track>) -> MergeOutcome {
    let mut outcome = MergeOutcome::default();

    for track in tracks {
        if let Err(reason) = validate(&track) {
            eprintln!("Warning: dropping '{}' — {reason}", track.id());
            outcome.dropped += 1;
            continue;
        }

        let id = track.id();
        let feature = track.into_feature();
        match collection
            .features
            .iter()
            .position(|f| f.track_id() == id)
        {
            Some(pos) => {
                collection.features[pos] = feature;
                outcome.replaced += 1;
            }
            None => {
                collection.features.push(feature);
                outcome.added += 1;
            }
        }
    }

    outcome
}

fn validate(track: &Track) -> Result<(), &'static str> {
    if track.points.is_empty() {
        return Err("no points");
    }
    for p in &track.points {
        if !p.lat.is_finite() || !p.lon.is_finite() {
            return Err("non-finite coordinate");
        }
        if !(-90.0..=90.0).contains(&p.lat) || !(-180.0..=180.0).contains(&p.lon) {
            return Err("coordinate out of range");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::{GeoPoint, TrackSource};

    fn track(id: &str, time: Option<&str>, points: &[(f64, f64)]) -> Track {
        Track {
            name: id.to_string(),
            start_time: time.map(|t| t.to_string()),
            activity_type: None,
            distance_m: None,
            source: TrackSource::File(id.to_string()),
            points: points
                .iter()
                .map(|&(lat, lon)| GeoPoint { lat, lon, ele: 0.0 })
                .collect(),
        }
    }

    #[test]
    fn merging_nothing_is_a_noop() {
        let mut collection = Collection::empty();
        merge(&mut collection, vec![track("a.gpx", None, &[(61.0, -149.0)])]);
        let before = serde_json::to_string(&collection).unwrap();

        let outcome = merge(&mut collection, vec![]);
        assert_eq!(outcome, MergeOutcome::default());
        assert_eq!(serde_json::to_string(&collection).unwrap(), before);
    }

    #[test]
    fn merge_is_idempotent_per_id() {
        let mut collection = Collection::empty();
        merge(&mut collection, vec![track("a.gpx", None, &[(61.0, -149.0)])]);
        let outcome = merge(
            &mut collection,
            vec![track("a.gpx", None, &[(61.0, -149.0), (61.1, -149.1)])],
        );

        assert_eq!(outcome.replaced, 1);
        assert_eq!(collection.features.len(), 1);
        // Replace-on-match: the newer content wins.
        assert_eq!(collection.features[0].geometry.coordinates.len(), 2);
    }

    #[test]
    fn invalid_tracks_are_dropped_without_aborting() {
        let mut collection = Collection::empty();
        let outcome = merge(
            &mut collection,
            vec![
                track("good.gpx", None, &[(61.0, -149.0)]),
                track("empty.gpx", None, &[]),
                track("bad.gpx", None, &[(95.0, -149.0)]),
                track("also-good.gpx", None, &[(60.0, -150.0)]),
            ],
        );

        assert_eq!(outcome.added, 2);
        assert_eq!(outcome.dropped, 2);
        assert_eq!(collection.features.len(), 2);
    }

    #[test]
    fn latest_timestamp_ignores_untimed_features() {
        let mut collection = Collection::empty();
        merge(
            &mut collection,
            vec![
                track("a.gpx", Some("2024-01-01T00:00:00Z"), &[(61.0, -149.0)]),
                track("b.gpx", Some("2024-06-15T12:00:00Z"), &[(61.0, -149.0)]),
                track("c.gpx", None, &[(61.0, -149.0)]),
            ],
        );

        let latest = latest_timestamp(&collection).unwrap();
        assert_eq!(latest, parse_time("2024-06-15T12:00:00Z").unwrap());
    }

    #[test]
    fn latest_timestamp_absent_when_nothing_is_timed() {
        let mut collection = Collection::empty();
        merge(&mut collection, vec![track("a.gpx", None, &[(61.0, -149.0)])]);
        assert!(latest_timestamp(&collection).is_none());
    }
}
