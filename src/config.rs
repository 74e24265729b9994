/// Fallback map center when the collection yields no usable centroid
/// (Anchorage, AK).
pub const FALLBACK_CENTER_LAT: f64 = 61.2027;
pub const FALLBACK_CENTER_LON: f64 = -149.8691;
pub const DEFAULT_ZOOM: u32 = 11;

pub const DEFAULT_MIN_OPACITY: f64 = 0.4;
pub const DEFAULT_POINT_RADIUS: u32 = 2;
pub const DEFAULT_BLUR: u32 = 1;
pub const HEAT_MAX_ZOOM: u32 = 18;

pub const DEFAULT_BINS: usize = 200;
pub const DEFAULT_SIGMA: f64 = 1.5;
pub const BBOX_PADDING: f64 = 0.1;

pub const DEFAULT_COLLECTION: &str = "activities.geojson";
pub const DEFAULT_STATS: &str = "stats.json";
pub const DEFAULT_HEATMAP: &str = "heatmap.html";
pub const DEFAULT_STATIC: &str = "heatmap_static.png";

pub const STRAVA_API_BASE: &str = "https://www.strava.com/api/v3";
pub const STRAVA_TOKEN_URL: &str = "https://www.strava.com/oauth/token";
pub const ACTIVITY_PAGE_SIZE: u32 = 100;

pub const CLIENT_CONFIG_FILE: &str = "config.json";
pub const TOKENS_FILE: &str = "strava_tokens.json";
