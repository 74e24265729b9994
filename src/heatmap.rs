use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use crate::collection::{Collection, GeoPoint};
use crate::config::*;
use crate::gradient::Gradient;

pub struct HeatmapOptions {
    pub gradient: Gradient,
    pub min_opacity: f64,
    pub radius: u32,
    pub blur: u32,
}

const MOBILE_FIX_MARKER: &str = "// mobile-resize-fix";

const MOBILE_FIX_SCRIPT: &str = r#"<script>
// mobile-resize-fix
(function () {
    function invalidateMapSize() {
        if (window.map && typeof map.invalidateSize === "function") {
            setTimeout(function () { map.invalidateSize(); }, 100);
        }
    }
    window.addEventListener("resize", invalidateMapSize);
    window.addEventListener("orientationchange", function () {
        setTimeout(invalidateMapSize, 200);
    });
    window.addEventListener("load", function () {
        setTimeout(invalidateMapSize, 500);
    });
    window.addEventListener("message", function (e) {
        if (e.data === "resize") {
            invalidateMapSize();
        }
    });
})();
</script>
"#;

/// Write the interactive heatmap page. Returns false when the collection
/// has no points (nothing rendered, not an error).
pub fn generate(collection: &Collection, opts: &HeatmapOptions, output: &str) -> Result<bool> {
    let points: Vec<GeoPoint> = collection.points().collect();
    if points.is_empty() {
        eprintln!("No GPS points in the collection — nothing to render");
        return Ok(false);
    }
    eprintln!(
        "Loaded {} GPS points from {} activities",
        points.len(),
        collection.features.len(),
    );

    let (lat, lon) = centroid(&points).unwrap_or((FALLBACK_CENTER_LAT, FALLBACK_CENTER_LON));
    eprintln!("Map center: {lat:.4}, {lon:.4}");

    let html = build_document(&points, lat, lon, opts);
    let html = inject_before_anchor(html, MOBILE_FIX_MARKER, MOBILE_FIX_SCRIPT, "</body>");

    if let Some(parent) = Path::new(output).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(output, html).with_context(|| format!("Failed to write {output}"))?;
    eprintln!("Heatmap saved to {output}");
    Ok(true)
}

fn centroid(points: &[GeoPoint]) -> Option<(f64, f64)> {
    let n = points.len() as f64;
    let lat = points.iter().map(|p| p.lat).sum::<f64>() / n;
    let lon = points.iter().map(|p| p.lon).sum::<f64>() / n;
    (lat.is_finite() && lon.is_finite()).then_some((lat, lon))
}

fn build_document(points: &[GeoPoint], lat: f64, lon: f64, opts: &HeatmapOptions) -> String {
    let mut coords = String::with_capacity(points.len() * 24);
    for p in points {
        if !coords.is_empty() {
            coords.push(',');
        }
        coords.push_str(&format!("[{},{}]", p.lat, p.lon));
    }

    let mut html = String::with_capacity(coords.len() + 2048);
    html.push_str(concat!(
        "<!DOCTYPE html>\n<html>\n<head>\n",
        "<meta charset=\"utf-8\"/>\n",
        "<meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\"/>\n",
        "<title>Activity Heatmap</title>\n",
        "<link rel=\"stylesheet\" href=\"https://unpkg.com/leaflet@1.9.4/dist/leaflet.css\"/>\n",
        "<script src=\"https://unpkg.com/leaflet@1.9.4/dist/leaflet.js\"></script>\n",
        "<script src=\"https://unpkg.com/leaflet.heat@0.2.0/dist/leaflet-heat.js\"></script>\n",
        "<style>html, body, #map { height: 100%; margin: 0; }</style>\n",
        "</head>\n<body>\n<div id=\"map\"></div>\n<script>\n",
    ));
    html.push_str(&format!(
        "var map = L.map(\"map\").setView([{lat}, {lon}], {DEFAULT_ZOOM});\n"
    ));
    html.push_str(concat!(
        "var osm = L.tileLayer(\"https://tile.openstreetmap.org/{z}/{x}/{y}.png\", ",
        "{attribution: \"&copy; OpenStreetMap contributors\"}).addTo(map);\n",
        "var light = L.tileLayer(\"https://{s}.basemaps.cartocdn.com/light_all/{z}/{x}/{y}.png\", ",
        "{attribution: \"&copy; CARTO\"});\n",
        "var dark = L.tileLayer(\"https://{s}.basemaps.cartocdn.com/dark_all/{z}/{x}/{y}.png\", ",
        "{attribution: \"&copy; CARTO\"});\n",
    ));
    html.push_str(&format!("var points = [{coords}];\n"));
    html.push_str(&format!(
        "L.heatLayer(points, {{minOpacity: {}, maxZoom: {HEAT_MAX_ZOOM}, radius: {}, blur: {}, gradient: {}}}).addTo(map);\n",
        opts.min_opacity,
        opts.radius,
        opts.blur,
        opts.gradient.leaflet_object(),
    ));
    html.push_str(
        "L.control.layers({\"OpenStreetMap\": osm, \"Light Map\": light, \"Dark Map\": dark}).addTo(map);\n",
    );
    html.push_str("</script>\n</body>\n</html>\n");
    html
}

/// Insert `fragment` immediately before the first `anchor`. A document
/// already containing `marker` is returned unchanged, as is one without
/// the anchor (reported, never corrupted).
pub fn inject_before_anchor(html: String, marker: &str, fragment: &str, anchor: &str) -> String {
    if html.contains(marker) {
        return html;
    }
    if !html.contains(anchor) {
        eprintln!("Warning: anchor '{anchor}' not found — skipping injection");
        return html;
    }
    html.replacen(anchor, &format!("{fragment}{anchor}"), 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::merge;
    use crate::collection::{Track, TrackSource};

    fn options() -> HeatmapOptions {
        HeatmapOptions {
            gradient: Gradient::classic(),
            min_opacity: DEFAULT_MIN_OPACITY,
            radius: DEFAULT_POINT_RADIUS,
            blur: DEFAULT_BLUR,
        }
    }

    fn one_track_collection() -> Collection {
        let mut collection = Collection::empty();
        merge(
            &mut collection,
            vec![Track {
                name: "Run".to_string(),
                start_time: None,
                activity_type: None,
                distance_m: None,
                source: TrackSource::File("run.gpx".to_string()),
                points: vec![
                    GeoPoint { lat: 61.2, lon: -149.9, ele: 0.0 },
                    GeoPoint { lat: 61.3, lon: -149.8, ele: 0.0 },
                ],
            }],
        );
        collection
    }

    #[test]
    fn empty_collection_is_a_no_data_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("heatmap.html");
        let rendered = generate(
            &Collection::empty(),
            &options(),
            output.to_str().unwrap(),
        )
        .unwrap();
        assert!(!rendered);
        assert!(!output.exists());
    }

    #[test]
    fn document_embeds_points_and_heat_layer() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("heatmap.html");
        let rendered =
            generate(&one_track_collection(), &options(), output.to_str().unwrap()).unwrap();
        assert!(rendered);

        let html = std::fs::read_to_string(&output).unwrap();
        assert!(html.contains("[61.2,-149.9]"));
        assert!(html.contains("L.heatLayer"));
        assert!(html.contains("minOpacity: 0.4"));
        assert!(html.contains("0.3: \"#00FFFF\""));
        // The mobile fix rode along exactly once, before </body>.
        assert_eq!(html.matches(MOBILE_FIX_MARKER).count(), 1);
        assert!(html.rfind(MOBILE_FIX_MARKER).unwrap() < html.rfind("</body>").unwrap());
    }

    #[test]
    fn injection_is_idempotent() {
        let doc = "<html><body>content</body></html>".to_string();
        let once = inject_before_anchor(doc, MOBILE_FIX_MARKER, MOBILE_FIX_SCRIPT, "</body>");
        let twice =
            inject_before_anchor(once.clone(), MOBILE_FIX_MARKER, MOBILE_FIX_SCRIPT, "</body>");
        assert_eq!(once, twice);
        assert_eq!(twice.matches(MOBILE_FIX_MARKER).count(), 1);
    }

    #[test]
    fn injection_without_anchor_leaves_the_document_alone() {
        let doc = "<html><body>no closing tag".to_string();
        let result =
            inject_before_anchor(doc.clone(), MOBILE_FIX_MARKER, MOBILE_FIX_SCRIPT, "</body>");
        assert_eq!(result, doc);
    }

    #[test]
    fn centroid_requires_finite_coordinates() {
        let finite = vec![
            GeoPoint { lat: 60.0, lon: -150.0, ele: 0.0 },
            GeoPoint { lat: 62.0, lon: -148.0, ele: 0.0 },
        ];
        assert_eq!(centroid(&finite), Some((61.0, -149.0)));

        let broken = vec![GeoPoint { lat: f64::NAN, lon: -150.0, ele: 0.0 }];
        assert!(centroid(&broken).is_none());
    }
}
