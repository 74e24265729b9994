use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::collection::{GeoPoint, Track, TrackSource};
use crate::config::*;

#[derive(Debug, Serialize, Deserialize)]
struct TokenPair {
    access_token: String,
    refresh_token: String,
}

#[derive(Deserialize)]
struct ClientConfig {
    client_id: String,
    client_secret: String,
}

/// Explicit credential provider for the Strava API. Holds the client
/// credentials and the current refresh token; exchanging the refresh
/// token is the only way this tool obtains an access token.
pub struct TokenProvider {
    client_id: String,
    client_secret: String,
    refresh_token: String,
}

impl TokenProvider {
    /// Environment variables win; `config.json` and `strava_tokens.json`
    /// in the working directory are the fallback.
    pub fn from_env_or_files() -> Result<Self> {
        let mut client_id = std::env::var("STRAVA_CLIENT_ID").ok();
        let mut client_secret = std::env::var("STRAVA_CLIENT_SECRET").ok();
        let mut refresh_token = std::env::var("STRAVA_REFRESH_TOKEN").ok();

        if (client_id.is_none() || client_secret.is_none())
            && Path::new(CLIENT_CONFIG_FILE).exists()
        {
            let data = fs::read_to_string(CLIENT_CONFIG_FILE)
                .with_context(|| format!("Failed to read {CLIENT_CONFIG_FILE}"))?;
            let cfg: ClientConfig = serde_json::from_str(&data)
                .with_context(|| format!("Failed to parse {CLIENT_CONFIG_FILE}"))?;
            client_id.get_or_insert(cfg.client_id);
            client_secret.get_or_insert(cfg.client_secret);
        }

        if refresh_token.is_none() && Path::new(TOKENS_FILE).exists() {
            let data = fs::read_to_string(TOKENS_FILE)
                .with_context(|| format!("Failed to read {TOKENS_FILE}"))?;
            let tokens: TokenPair = serde_json::from_str(&data)
                .with_context(|| format!("Failed to parse {TOKENS_FILE}"))?;
            refresh_token = Some(tokens.refresh_token);
        }

        match (client_id, client_secret, refresh_token) {
            (Some(client_id), Some(client_secret), Some(refresh_token)) => Ok(Self {
                client_id,
                client_secret,
                refresh_token,
            }),
            _ => anyhow::bail!(
                "Missing Strava credentials. Set STRAVA_CLIENT_ID, STRAVA_CLIENT_SECRET and \
                 STRAVA_REFRESH_TOKEN, or provide {CLIENT_CONFIG_FILE} and {TOKENS_FILE}."
            ),
        }
    }

    /// Exchange the refresh token for a fresh access token. The rotated
    /// token pair is persisted back to the tokens file.
    pub async fn access_token(&mut self, client: &reqwest::Client) -> Result<String> {
        let resp = client
            .post(STRAVA_TOKEN_URL)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("grant_type", "refresh_token"),
                ("refresh_token", self.refresh_token.as_str()),
            ])
            .send()
            .await
            .context("Failed to reach the Strava token endpoint")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Token refresh failed with {status}: {body}");
        }

        let pair: TokenPair = resp
            .json()
            .await
            .context("Failed to parse the token response")?;
        self.refresh_token = pair.refresh_token.clone();
        self.persist(&pair)?;
        eprintln!("Refreshed Strava access token");
        Ok(pair.access_token)
    }

    fn persist(&self, pair: &TokenPair) -> Result<()> {
        let json = serde_json::to_string_pretty(pair)?;
        fs::write(TOKENS_FILE, json).with_context(|| format!("Failed to write {TOKENS_FILE}"))
    }
}

#[derive(Debug, Deserialize)]
pub struct SummaryActivity {
    pub id: u64,
    pub name: String,
    pub start_date: String,
    #[serde(rename = "type", default)]
    pub activity_type: Option<String>,
    #[serde(default)]
    pub distance: f64,
    #[serde(default)]
    map: Option<ActivityMap>,
}

#[derive(Debug, Deserialize)]
struct ActivityMap {
    #[serde(default)]
    summary_polyline: Option<String>,
}

impl SummaryActivity {
    /// Only activities whose summary exposes a path carry GPS streams.
    pub fn has_gps(&self) -> bool {
        self.map
            .as_ref()
            .and_then(|m| m.summary_polyline.as_deref())
            .is_some_and(|p| !p.is_empty())
    }
}

#[derive(Debug, Deserialize)]
pub struct StreamSet {
    #[serde(default)]
    latlng: Option<Stream<[f64; 2]>>,
    #[serde(default)]
    altitude: Option<Stream<f64>>,
}

#[derive(Debug, Deserialize)]
struct Stream<T> {
    data: Vec<T>,
}

/// List the athlete's most recent activities. A failure here is fatal
/// for the sync run.
pub async fn list_activities(
    client: &reqwest::Client,
    token: &str,
    limit: u32,
) -> Result<Vec<SummaryActivity>> {
    let resp = client
        .get(format!("{STRAVA_API_BASE}/athlete/activities"))
        .bearer_auth(token)
        .query(&[("per_page", limit)])
        .send()
        .await
        .context("Failed to list activities")?;

    if !resp.status().is_success() {
        anyhow::bail!("Activity listing failed with {}", resp.status());
    }

    resp.json()
        .await
        .context("Failed to parse the activity list")
}

/// Fetch the GPS streams for one activity. `None` when the API declines
/// (no streams for that activity); the caller skips it and moves on.
pub async fn fetch_streams(
    client: &reqwest::Client,
    token: &str,
    activity_id: u64,
) -> Result<Option<StreamSet>> {
    let resp = client
        .get(format!("{STRAVA_API_BASE}/activities/{activity_id}/streams"))
        .bearer_auth(token)
        .query(&[("keys", "latlng,altitude"), ("key_by_type", "true")])
        .send()
        .await
        .with_context(|| format!("Failed to fetch streams for activity {activity_id}"))?;

    if !resp.status().is_success() {
        return Ok(None);
    }

    let streams = resp
        .json()
        .await
        .with_context(|| format!("Failed to parse streams for activity {activity_id}"))?;
    Ok(Some(streams))
}

/// Zip the latlng and altitude streams into a track. `None` when the
/// stream set yields no coordinates.
pub fn to_track(activity: &SummaryActivity, streams: &StreamSet) -> Option<Track> {
    let latlng = streams.latlng.as_ref()?;
    let altitude = streams
        .altitude
        .as_ref()
        .map(|s| s.data.as_slice())
        .unwrap_or(&[]);

    let points: Vec<GeoPoint> = latlng
        .data
        .iter()
        .enumerate()
        .map(|(i, &[lat, lon])| GeoPoint {
            lat,
            lon,
            ele: altitude.get(i).copied().unwrap_or(0.0),
        })
        .collect();

    if points.is_empty() {
        return None;
    }

    Some(Track {
        name: activity.name.clone(),
        start_time: Some(activity.start_date.clone()),
        activity_type: activity.activity_type.clone(),
        distance_m: Some(activity.distance),
        source: TrackSource::Activity(activity.id),
        points,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn activity(json: &str) -> SummaryActivity {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn gps_gate_requires_a_nonempty_polyline() {
        let with = activity(
            r#"{"id": 1, "name": "Run", "start_date": "2024-06-15T10:00:00Z",
                "type": "Run", "distance": 5000.0,
                "map": {"summary_polyline": "abc123"}}"#,
        );
        assert!(with.has_gps());

        let empty = activity(
            r#"{"id": 2, "name": "Treadmill", "start_date": "2024-06-15T10:00:00Z",
                "map": {"summary_polyline": ""}}"#,
        );
        assert!(!empty.has_gps());

        let missing = activity(r#"{"id": 3, "name": "Yoga", "start_date": "2024-06-15T10:00:00Z"}"#);
        assert!(!missing.has_gps());
    }

    #[test]
    fn streams_zip_with_short_altitude() {
        let streams: StreamSet = serde_json::from_str(
            r#"{"latlng": {"data": [[61.2, -149.9], [61.21, -149.91], [61.22, -149.92]]},
                "altitude": {"data": [50.0, 52.0]}}"#,
        )
        .unwrap();
        let act = activity(
            r#"{"id": 7, "name": "Run", "start_date": "2024-06-15T10:00:00Z",
                "type": "Run", "distance": 1234.5}"#,
        );

        let track = to_track(&act, &streams).unwrap();
        assert_eq!(track.id(), "7");
        assert_eq!(track.points.len(), 3);
        assert_eq!(track.points[0].lat, 61.2);
        assert_eq!(track.points[0].lon, -149.9);
        assert_eq!(track.points[0].ele, 50.0);
        // Altitude stream runs out: elevation falls back to 0.
        assert_eq!(track.points[2].ele, 0.0);
        assert_eq!(track.distance_m, Some(1234.5));
    }

    #[test]
    fn missing_latlng_stream_yields_no_track() {
        let streams: StreamSet =
            serde_json::from_str(r#"{"altitude": {"data": [1.0, 2.0]}}"#).unwrap();
        let act =
            activity(r#"{"id": 9, "name": "Swim", "start_date": "2024-06-15T10:00:00Z"}"#);
        assert!(to_track(&act, &streams).is_none());
    }
}
