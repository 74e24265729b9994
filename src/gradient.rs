/// A piecewise color ramp: stop positions in [0, 1] mapped to hex colors.
/// Shared between the interactive heat layer and the static colormap.
#[derive(Debug, Clone, Copy)]
pub struct Gradient {
    pub name: &'static str,
    pub stops: &'static [(f64, &'static str)],
}

impl Gradient {
    pub fn classic() -> Self {
        Self {
            name: "classic",
            stops: &[
                (0.0, "#0000FF"),
                (0.3, "#00FFFF"),
                (0.5, "#00FF00"),
                (0.7, "#FFFF00"),
                (1.0, "#FF0000"),
            ],
        }
    }

    pub fn heat() -> Self {
        Self {
            name: "heat",
            stops: &[
                (0.0, "#000080"),
                (0.25, "#0000FF"),
                (0.5, "#FF0000"),
                (0.75, "#FFA500"),
                (1.0, "#FFFF00"),
            ],
        }
    }

    pub fn purple() -> Self {
        Self {
            name: "purple",
            stops: &[(0.0, "#800080"), (0.5, "#EE82EE"), (1.0, "#FFC0CB")],
        }
    }

    pub fn green() -> Self {
        Self {
            name: "green",
            stops: &[(0.0, "#006400"), (0.5, "#00FF00"), (1.0, "#FFFF00")],
        }
    }

    /// Linear interpolation between the surrounding stops, clamped to
    /// the ramp's ends.
    pub fn sample(&self, t: f64) -> (u8, u8, u8) {
        let t = t.clamp(0.0, 1.0);
        let stops = self.stops;

        if t <= stops[0].0 {
            return parse_hex(stops[0].1).unwrap_or((255, 255, 255));
        }
        for w in stops.windows(2) {
            let (p0, c0) = w[0];
            let (p1, c1) = w[1];
            if t <= p1 {
                let local = if p1 > p0 { (t - p0) / (p1 - p0) } else { 1.0 };
                let start = parse_hex(c0).unwrap_or((255, 255, 255));
                let end = parse_hex(c1).unwrap_or((255, 255, 255));
                return (
                    lerp_u8(start.0, end.0, local),
                    lerp_u8(start.1, end.1, local),
                    lerp_u8(start.2, end.2, local),
                );
            }
        }
        parse_hex(stops[stops.len() - 1].1).unwrap_or((255, 255, 255))
    }

    /// The `{position: "color"}` object literal the Leaflet heat layer
    /// expects.
    pub fn leaflet_object(&self) -> String {
        let entries: Vec<String> = self
            .stops
            .iter()
            .map(|(pos, color)| format!("{pos}: \"{color}\""))
            .collect();
        format!("{{{}}}", entries.join(", "))
    }
}

fn parse_hex(hex: &str) -> Option<(u8, u8, u8)> {
    let value = hex.trim_start_matches('#');
    if value.len() != 6 {
        return None;
    }
    let r = u8::from_str_radix(&value[0..2], 16).ok()?;
    let g = u8::from_str_radix(&value[2..4], 16).ok()?;
    let b = u8::from_str_radix(&value[4..6], 16).ok()?;
    Some((r, g, b))
}

fn lerp_u8(start: u8, end: u8, t: f64) -> u8 {
    let value = start as f64 + (end as f64 - start as f64) * t;
    value.round().clamp(0.0, 255.0) as u8
}
