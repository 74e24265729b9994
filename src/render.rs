use anyhow::{Context, Result};
use geo_types::{Coord, Rect};
use image::{Rgba, RgbaImage, imageops};
use std::fs;
use std::path::Path;

use crate::collection::{Collection, GeoPoint};
use crate::config::BBOX_PADDING;
use crate::gradient::Gradient;

pub struct RenderOptions {
    pub gradient: Gradient,
    pub bins: usize,
    pub sigma: f64,
}

const IMG_WIDTH: u32 = 1800;
const IMG_HEIGHT: u32 = 1500;
const MARGIN_LEFT: u32 = 120;
const MARGIN_RIGHT: u32 = 50;
const MARGIN_TOP: u32 = 100;
const MARGIN_BOTTOM: u32 = 110;
const HEAT_ALPHA: f64 = 0.7;

/// Write the static heatmap PNG. Returns false when the collection has
/// no points (nothing rendered, not an error).
pub fn generate(collection: &Collection, opts: &RenderOptions, output: &str) -> Result<bool> {
    let points: Vec<GeoPoint> = collection.points().collect();
    if points.is_empty() {
        eprintln!("No GPS points in the collection — nothing to render");
        return Ok(false);
    }
    eprintln!("Loaded {} GPS points", points.len());

    let bounds = padded_extent(&points, BBOX_PADDING);
    let mut grid = histogram2d(&points, &bounds, opts.bins);
    if opts.sigma > 0.0 {
        gaussian_blur(&mut grid, opts.bins, opts.sigma);
    }

    let heat = colorize(&grid, opts.bins, &opts.gradient);

    let plot_w = IMG_WIDTH - MARGIN_LEFT - MARGIN_RIGHT;
    let plot_h = IMG_HEIGHT - MARGIN_TOP - MARGIN_BOTTOM;
    let scaled = imageops::resize(&heat, plot_w, plot_h, imageops::FilterType::Triangle);

    let mut canvas = RgbaImage::from_pixel(IMG_WIDTH, IMG_HEIGHT, Rgba([255, 255, 255, 255]));
    imageops::overlay(&mut canvas, &scaled, MARGIN_LEFT as i64, MARGIN_TOP as i64);

    let svg_content = build_annotation_svg(&bounds, points.len());
    let overlay = rasterize_svg(&svg_content)?;
    let composite = composite_images(&canvas, &overlay);

    let out = Path::new(output);
    if let Some(parent) = out.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    composite
        .save(out)
        .with_context(|| format!("Failed to save PNG to {output}"))?;

    eprintln!("Static heatmap saved to {output}");
    Ok(true)
}

/// Data extent expanded by `padding` of each axis range. A degenerate
/// extent (all fixes at one spot) gets a nominal span so the histogram
/// still has area.
fn padded_extent(points: &[GeoPoint], padding: f64) -> Rect<f64> {
    let mut min_lat = f64::INFINITY;
    let mut max_lat = f64::NEG_INFINITY;
    let mut min_lon = f64::INFINITY;
    let mut max_lon = f64::NEG_INFINITY;
    for p in points {
        min_lat = min_lat.min(p.lat);
        max_lat = max_lat.max(p.lat);
        min_lon = min_lon.min(p.lon);
        max_lon = max_lon.max(p.lon);
    }

    let lat_range = (max_lat - min_lat).max(1e-4);
    let lon_range = (max_lon - min_lon).max(1e-4);

    Rect::new(
        Coord {
            x: min_lon - lon_range * padding,
            y: min_lat - lat_range * padding,
        },
        Coord {
            x: max_lon + lon_range * padding,
            y: max_lat + lat_range * padding,
        },
    )
}

/// Bin counts over the extent, row-major with row 0 at the southern
/// edge. Points on the outer edge land in the last bin.
fn histogram2d(points: &[GeoPoint], bounds: &Rect<f64>, bins: usize) -> Vec<f64> {
    let mut grid = vec![0.0; bins * bins];
    let width = bounds.width();
    let height = bounds.height();

    for p in points {
        let fx = (p.lon - bounds.min().x) / width;
        let fy = (p.lat - bounds.min().y) / height;
        if !(0.0..=1.0).contains(&fx) || !(0.0..=1.0).contains(&fy) {
            continue;
        }
        let col = ((fx * bins as f64) as usize).min(bins - 1);
        let row = ((fy * bins as f64) as usize).min(bins - 1);
        grid[row * bins + col] += 1.0;
    }

    grid
}

/// Separable Gaussian over the bin grid, edges reflected.
fn gaussian_blur(grid: &mut [f64], bins: usize, sigma: f64) {
    let radius = (sigma * 3.0).ceil() as i64;
    let mut kernel = Vec::with_capacity((2 * radius + 1) as usize);
    for i in -radius..=radius {
        kernel.push((-((i * i) as f64) / (2.0 * sigma * sigma)).exp());
    }
    let sum: f64 = kernel.iter().sum();
    for k in &mut kernel {
        *k /= sum;
    }

    let n = bins as i64;
    let reflect = |mut i: i64| -> usize {
        if i < 0 {
            i = -i - 1;
        }
        if i >= n {
            i = 2 * n - 1 - i;
        }
        i.clamp(0, n - 1) as usize
    };

    let mut tmp = vec![0.0; grid.len()];
    for row in 0..bins {
        for col in 0..bins {
            let mut acc = 0.0;
            for (k, weight) in kernel.iter().enumerate() {
                let src = reflect(col as i64 + k as i64 - radius);
                acc += grid[row * bins + src] * weight;
            }
            tmp[row * bins + col] = acc;
        }
    }
    for row in 0..bins {
        for col in 0..bins {
            let mut acc = 0.0;
            for (k, weight) in kernel.iter().enumerate() {
                let src = reflect(row as i64 + k as i64 - radius);
                acc += tmp[src * bins + col] * weight;
            }
            grid[row * bins + col] = acc;
        }
    }
}

/// Map normalized bin densities through the gradient at 0.7 alpha over
/// white. Image row 0 is the northern edge.
fn colorize(grid: &[f64], bins: usize, gradient: &Gradient) -> RgbaImage {
    let max = grid.iter().cloned().fold(0.0_f64, f64::max);
    let mut img = RgbaImage::new(bins as u32, bins as u32);

    for y in 0..bins {
        let grid_row = bins - 1 - y;
        for x in 0..bins {
            let v = grid[grid_row * bins + x];
            let t = if max > 0.0 { v / max } else { 0.0 };
            let (r, g, b) = gradient.sample(t);
            img.put_pixel(
                x as u32,
                y as u32,
                Rgba([blend_to_white(r), blend_to_white(g), blend_to_white(b), 255]),
            );
        }
    }

    img
}

fn blend_to_white(c: u8) -> u8 {
    (c as f64 * HEAT_ALPHA + 255.0 * (1.0 - HEAT_ALPHA)).round() as u8
}

fn build_annotation_svg(bounds: &Rect<f64>, point_count: usize) -> String {
    let w = IMG_WIDTH;
    let h = IMG_HEIGHT;
    let plot_x = MARGIN_LEFT;
    let plot_y = MARGIN_TOP;
    let plot_w = w - MARGIN_LEFT - MARGIN_RIGHT;
    let plot_h = h - MARGIN_TOP - MARGIN_BOTTOM;

    let mut svg = format!(
        r##"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"##,
    );

    // Title
    svg.push_str(&format!(
        r##"<text x="{}" y="60" font-family="sans-serif" font-size="34" fill="black" font-weight="bold" text-anchor="middle">Activity Heatmap</text>"##,
        w / 2,
    ));

    // Plot frame
    svg.push_str(&format!(
        r##"<rect x="{plot_x}" y="{plot_y}" width="{plot_w}" height="{plot_h}" fill="none" stroke="#666666" stroke-width="1"/>"##,
    ));

    // Longitude gridlines and ticks
    let (start, step) = tick_axis(bounds.min().x, bounds.max().x);
    let decimals = tick_decimals(step);
    let mut v = start;
    while v <= bounds.max().x + step * 1e-6 {
        let px = plot_x as f64 + (v - bounds.min().x) / bounds.width() * plot_w as f64;
        svg.push_str(&format!(
            r##"<line x1="{px:.1}" y1="{plot_y}" x2="{px:.1}" y2="{}" stroke="#808080" stroke-width="0.5" stroke-opacity="0.3" stroke-dasharray="6 4"/>"##,
            plot_y + plot_h,
        ));
        svg.push_str(&format!(
            r##"<text x="{px:.1}" y="{}" font-family="sans-serif" font-size="18" fill="black" text-anchor="middle">{v:.decimals$}</text>"##,
            plot_y + plot_h + 32,
        ));
        v += step;
    }

    // Latitude gridlines and ticks
    let (start, step) = tick_axis(bounds.min().y, bounds.max().y);
    let decimals = tick_decimals(step);
    let mut v = start;
    while v <= bounds.max().y + step * 1e-6 {
        let py =
            plot_y as f64 + (bounds.max().y - v) / bounds.height() * plot_h as f64;
        svg.push_str(&format!(
            r##"<line x1="{plot_x}" y1="{py:.1}" x2="{}" y2="{py:.1}" stroke="#808080" stroke-width="0.5" stroke-opacity="0.3" stroke-dasharray="6 4"/>"##,
            plot_x + plot_w,
        ));
        svg.push_str(&format!(
            r##"<text x="{}" y="{}" font-family="sans-serif" font-size="18" fill="black" text-anchor="end">{v:.decimals$}</text>"##,
            plot_x - 10,
            py + 6.0,
        ));
        v += step;
    }

    // Axis labels
    svg.push_str(&format!(
        r##"<text x="{}" y="{}" font-family="sans-serif" font-size="22" fill="black" text-anchor="middle">Longitude</text>"##,
        plot_x + plot_w / 2,
        h - 30,
    ));
    let cy = plot_y + plot_h / 2;
    svg.push_str(&format!(
        r##"<text x="40" y="{cy}" font-family="sans-serif" font-size="22" fill="black" text-anchor="middle" transform="rotate(-90 40 {cy})">Latitude</text>"##,
    ));

    // Point-count annotation
    let label = format!("{point_count} GPS points");
    let box_w = 30 + 11 * label.len() as u32;
    svg.push_str(&format!(
        r##"<rect x="{}" y="{}" width="{box_w}" height="40" rx="8" fill="white" fill-opacity="0.8" stroke="#999999"/>"##,
        plot_x + 15,
        plot_y + 15,
    ));
    svg.push_str(&format!(
        r##"<text x="{}" y="{}" font-family="sans-serif" font-size="20" fill="black">{label}</text>"##,
        plot_x + 30,
        plot_y + 42,
    ));

    svg.push_str("</svg>");
    svg
}

fn tick_axis(min: f64, max: f64) -> (f64, f64) {
    let raw = (max - min) / 6.0;
    let mag = 10_f64.powf(raw.log10().floor());
    let norm = raw / mag;
    let step = if norm < 1.5 {
        mag
    } else if norm < 3.0 {
        2.0 * mag
    } else if norm < 7.0 {
        5.0 * mag
    } else {
        10.0 * mag
    };
    let start = (min / step).ceil() * step;
    (start, step)
}

fn tick_decimals(step: f64) -> usize {
    (-(step.log10().floor())).max(0.0) as usize
}

fn rasterize_svg(svg_content: &str) -> Result<resvg::tiny_skia::Pixmap> {
    let mut opts = resvg::usvg::Options::default();
    opts.fontdb_mut().load_system_fonts();
    let tree =
        resvg::usvg::Tree::from_str(svg_content, &opts).context("Failed to parse SVG overlay")?;

    let size = tree.size();
    let mut pixmap = resvg::tiny_skia::Pixmap::new(size.width() as u32, size.height() as u32)
        .context("Failed to create pixmap")?;

    resvg::render(
        &tree,
        resvg::tiny_skia::Transform::default(),
        &mut pixmap.as_mut(),
    );
    Ok(pixmap)
}

fn composite_images(
    background: &RgbaImage,
    overlay: &resvg::tiny_skia::Pixmap,
) -> RgbaImage {
    let mut composite = background.clone();
    let overlay_data = overlay.data();
    let w = composite.width().min(overlay.width());
    let h = composite.height().min(overlay.height());

    for y in 0..h {
        for x in 0..w {
            let idx = (y * overlay.width() + x) as usize * 4;
            let sa = overlay_data[idx + 3] as u32;
            if sa == 0 {
                continue;
            }

            let sr = overlay_data[idx] as u32;
            let sg = overlay_data[idx + 1] as u32;
            let sb = overlay_data[idx + 2] as u32;

            let dst = composite.get_pixel(x, y);
            let inv_sa = 255 - sa;

            composite.put_pixel(
                x,
                y,
                Rgba([
                    (sr + dst[0] as u32 * inv_sa / 255).min(255) as u8,
                    (sg + dst[1] as u32 * inv_sa / 255).min(255) as u8,
                    (sb + dst[2] as u32 * inv_sa / 255).min(255) as u8,
                    (sa + dst[3] as u32 * inv_sa / 255).min(255) as u8,
                ]),
            );
        }
    }

    composite
}
