#![cfg(feature = "web")]
//! PNG rendering of resolved charts with plotters.
//!
//! Charts are drawn into an in-memory RGB buffer and encoded with `image`,
//! so nothing touches the filesystem.

use crate::chart::{ChartKind, ChartView, DONUT_CAPTION, Mark, format_tick, group_number};
use crate::error::{AnalysisError, Result};
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use std::f64::consts::PI;
use std::io::Cursor;

type Canvas<'a> = DrawingArea<BitMapBackend<'a>, Shift>;

/// Largest width or height accepted for an image, in pixels.
pub const MAX_IMAGE_SIDE: u32 = 4096;

/// Configuration options for chart images
#[derive(Clone, Debug)]
pub struct RenderOptions {
    /// Width of the image in pixels
    pub width: u32,

    /// Height of the image in pixels
    pub height: u32,

    /// Caption drawn above the chart; falls back to the view's title
    pub title: Option<String>,

    /// Draw captions, tick labels and slice labels. Text needs a system
    /// font; without one only the marks can be drawn.
    pub labels: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            title: None,
            labels: true,
        }
    }
}

fn render_err(e: impl std::fmt::Display) -> AnalysisError {
    AnalysisError::Render(e.to_string())
}

/// Parse a `#rrggbb` palette entry.
pub fn hex_color(hex: &str) -> RGBColor {
    let hex = hex.trim_start_matches('#');
    let channel = |i: usize| {
        hex.get(i..i + 2)
            .and_then(|c| u8::from_str_radix(c, 16).ok())
            .unwrap_or(0)
    };
    RGBColor(channel(0), channel(2), channel(4))
}

/// Renders a chart to PNG bytes
///
/// # Examples
/// ```no_run
/// use instant_analysis::aggregate::ChartData;
/// use instant_analysis::chart::ChartView;
/// use instant_analysis::render::{RenderOptions, render_png};
/// use instant_analysis::suggest::ChartParameters;
///
/// let data: ChartData = serde_json::from_str(
///     r#"{"data":[{"Región":"Centro","Ventas":3000}],"columns":["Región","Ventas"]}"#,
/// ).unwrap();
/// let state = ChartView::build("bar", &ChartParameters::new("Región"), &data);
/// let png = render_png(state.view().unwrap(), &RenderOptions::default()).unwrap();
/// std::fs::write("ventas.png", png).unwrap();
/// ```
pub fn render_png(view: &ChartView, options: &RenderOptions) -> Result<Vec<u8>> {
    let invalid_size = || {
        AnalysisError::Render(format!(
            "invalid image size {}x{}",
            options.width, options.height
        ))
    };
    let side = 1..=MAX_IMAGE_SIDE;
    if !side.contains(&options.width) || !side.contains(&options.height) {
        return Err(invalid_size());
    }
    let len = (options.width as usize)
        .checked_mul(options.height as usize)
        .and_then(|pixels| pixels.checked_mul(3))
        .ok_or_else(invalid_size)?;

    let mut buffer = vec![0u8; len];
    {
        let root = BitMapBackend::with_buffer(&mut buffer, (options.width, options.height))
            .into_drawing_area();
        root.fill(&WHITE).map_err(render_err)?;

        let title = options.title.as_ref().or(view.title.as_ref());
        let area = match title {
            Some(title) if options.labels => root
                .titled(title, ("sans-serif", 24).into_font())
                .map_err(render_err)?,
            _ => root.clone(),
        };

        match view.kind {
            ChartKind::Pie | ChartKind::Donut => draw_pie(&area, view, options)?,
            ChartKind::RadialBar => draw_radial(&area, view)?,
            ChartKind::Radar => draw_radar(&area, view, options)?,
            ChartKind::Scatter => draw_scatter(&area, view, options)?,
            _ => draw_cartesian(&area, view, options)?,
        }

        root.present().map_err(render_err)?;
    }

    encode_png(buffer, options.width, options.height)
}

fn encode_png(buffer: Vec<u8>, width: u32, height: u32) -> Result<Vec<u8>> {
    let image = image::RgbImage::from_raw(width, height, buffer)
        .ok_or_else(|| AnalysisError::Render("image buffer has the wrong size".into()))?;
    let mut png = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut png), image::ImageOutputFormat::Png)
        .map_err(render_err)?;
    Ok(png)
}

/// Value range padded so flat or single-point data still gets an axis.
fn padded_range(values: impl Iterator<Item = f64>, include_zero: bool) -> (f64, f64) {
    let (mut lo, mut hi) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    if !lo.is_finite() || !hi.is_finite() {
        return (0.0, 1.0);
    }
    if include_zero {
        lo = lo.min(0.0);
        hi = hi.max(0.0);
    }
    if (hi - lo).abs() < f64::EPSILON {
        hi = lo + 1.0;
    }
    let pad = (hi - lo) * 0.05;
    (if include_zero && lo == 0.0 { 0.0 } else { lo - pad }, hi + pad)
}

/// Bars, lines and areas over categorical x positions.
fn draw_cartesian(area: &Canvas, view: &ChartView, options: &RenderOptions) -> Result<()> {
    let labels = view.x_labels();
    let values = view.y_values();
    let n = values.len() as f64;
    let (y_lo, y_hi) = padded_range(values.iter().copied(), true);

    let mut builder = ChartBuilder::on(area);
    builder.margin(10);
    if options.labels {
        builder.x_label_area_size(40).y_label_area_size(70);
    }
    let mut chart = builder
        .build_cartesian_2d(-0.5..n - 0.5, y_lo..y_hi)
        .map_err(render_err)?;

    if options.labels {
        let y_key = view.y_key.as_str();
        let y_currency = view.y_ticks_currency;
        chart
            .configure_mesh()
            .disable_x_mesh()
            .x_labels(labels.len() + 1)
            .x_label_formatter(&|v| category_label(&labels, *v))
            .y_label_formatter(&|v| tick_label(*v, y_key, y_currency))
            .x_desc(view.x_key.as_str())
            .y_desc(view.y_key.as_str())
            .draw()
            .map_err(render_err)?;
    }

    let half_width = if view.kind == ChartKind::Histogram { 0.5 } else { 0.4 };
    for series in &view.series {
        let color = hex_color(series.color);
        let points = values.iter().enumerate().map(|(i, v)| (i as f64, *v));
        match series.mark {
            Mark::Line => {
                chart
                    .draw_series(LineSeries::new(points.clone(), color.stroke_width(2)))
                    .map_err(render_err)?;
                chart
                    .draw_series(points.map(|p| Circle::new(p, 3, color.filled())))
                    .map_err(render_err)?;
            }
            Mark::Area => {
                chart
                    .draw_series(
                        AreaSeries::new(points, 0.0, color.mix(0.3)).border_style(color),
                    )
                    .map_err(render_err)?;
            }
            _ => {
                chart
                    .draw_series(points.map(|(x, y)| {
                        Rectangle::new(
                            [(x - half_width, 0.0), (x + half_width, y)],
                            color.filled(),
                        )
                    }))
                    .map_err(render_err)?;
            }
        }
    }
    Ok(())
}

fn tick_label(value: f64, column: &str, currency: bool) -> String {
    if currency {
        format_tick(value, column)
    } else {
        group_number(value, 2)
    }
}

fn category_label(labels: &[String], position: f64) -> String {
    let index = position.round();
    if (position - index).abs() > 1e-6 || index < 0.0 {
        return String::new();
    }
    labels.get(index as usize).cloned().unwrap_or_default()
}

/// Points over numeric axes; rows without a numeric x use their position.
fn draw_scatter(area: &Canvas, view: &ChartView, options: &RenderOptions) -> Result<()> {
    let ys = view.y_values();
    let points: Vec<(f64, f64)> = view
        .x_values()
        .into_iter()
        .enumerate()
        .map(|(i, x)| x.unwrap_or(i as f64))
        .zip(ys)
        .collect();
    let (x_lo, x_hi) = padded_range(points.iter().map(|p| p.0), false);
    let (y_lo, y_hi) = padded_range(points.iter().map(|p| p.1), false);

    let mut builder = ChartBuilder::on(area);
    builder.margin(10);
    if options.labels {
        builder.x_label_area_size(40).y_label_area_size(70);
    }
    let mut chart = builder
        .build_cartesian_2d(x_lo..x_hi, y_lo..y_hi)
        .map_err(render_err)?;

    if options.labels {
        let (x_key, y_key) = (view.x_key.as_str(), view.y_key.as_str());
        let (x_currency, y_currency) = (view.x_ticks_currency, view.y_ticks_currency);
        chart
            .configure_mesh()
            .x_label_formatter(&|v| tick_label(*v, x_key, x_currency))
            .y_label_formatter(&|v| tick_label(*v, y_key, y_currency))
            .x_desc(x_key)
            .y_desc(y_key)
            .draw()
            .map_err(render_err)?;
    }

    let color = view
        .series
        .first()
        .map(|s| hex_color(s.color))
        .unwrap_or(BLUE);
    chart
        .draw_series(
            points
                .iter()
                .map(|&p| Circle::new(p, 5, color.mix(0.8).filled())),
        )
        .map_err(render_err)?;
    Ok(())
}

/// Outline of an annular sector in pixel coordinates. Angles are in
/// radians, clockwise from twelve o'clock.
fn ring_segment(
    center: (i32, i32),
    inner: f64,
    outer: f64,
    start: f64,
    end: f64,
) -> Vec<(i32, i32)> {
    let steps = (((end - start).abs() / (PI / 90.0)).ceil() as usize).max(2);
    let at = |radius: f64, angle: f64| {
        (
            center.0 + (radius * angle.sin()).round() as i32,
            center.1 - (radius * angle.cos()).round() as i32,
        )
    };
    let mut points: Vec<(i32, i32)> = (0..=steps)
        .map(|s| at(outer, start + (end - start) * s as f64 / steps as f64))
        .collect();
    if inner <= 0.0 {
        points.push(center);
    } else {
        points.extend(
            (0..=steps)
                .rev()
                .map(|s| at(inner, start + (end - start) * s as f64 / steps as f64)),
        );
    }
    points
}

fn circle_geometry(area: &Canvas) -> ((i32, i32), f64) {
    let (w, h) = area.dim_in_pixel();
    let center = (w as i32 / 2, h as i32 / 2);
    let radius = (w.min(h) as f64 / 2.0) * 0.75;
    (center, radius)
}

fn draw_pie(area: &Canvas, view: &ChartView, options: &RenderOptions) -> Result<()> {
    let (center, radius) = circle_geometry(area);
    let inner = if view.kind == ChartKind::Donut {
        radius * 0.5
    } else {
        0.0
    };

    let mut start = 0.0;
    for slice in &view.slices {
        let sweep = slice.percent * 2.0 * PI;
        if sweep <= 0.0 {
            continue;
        }
        let color = hex_color(slice.color);
        area.draw(&Polygon::new(
            ring_segment(center, inner, radius, start, start + sweep),
            color.filled(),
        ))
        .map_err(render_err)?;

        if options.labels {
            let middle = start + sweep / 2.0;
            let anchor = (
                center.0 + ((radius + 14.0) * middle.sin()) as i32,
                center.1 - ((radius + 14.0) * middle.cos()) as i32,
            );
            let pos = if middle <= PI {
                Pos::new(HPos::Left, VPos::Center)
            } else {
                Pos::new(HPos::Right, VPos::Center)
            };
            area.draw(&Text::new(
                slice.label.clone(),
                anchor,
                ("sans-serif", 14).into_font().color(&BLACK).pos(pos),
            ))
            .map_err(render_err)?;
        }
        start += sweep;
    }

    if let (Some(centre), true) = (&view.center, options.labels) {
        let style = ("sans-serif", 28)
            .into_font()
            .color(&BLACK)
            .pos(Pos::new(HPos::Center, VPos::Bottom));
        area.draw(&Text::new(centre.value.to_string(), center, style))
            .map_err(render_err)?;
        let caption = ("sans-serif", 14)
            .into_font()
            .color(&BLACK)
            .pos(Pos::new(HPos::Center, VPos::Top));
        area.draw(&Text::new(DONUT_CAPTION, (center.0, center.1 + 4), caption))
            .map_err(render_err)?;
    }
    Ok(())
}

/// One concentric ring per slice, swept in proportion to the largest value.
fn draw_radial(area: &Canvas, view: &ChartView) -> Result<()> {
    let (center, radius) = circle_geometry(area);
    let max = view
        .slices
        .iter()
        .map(|s| s.value.abs())
        .fold(0.0, f64::max);
    if max <= 0.0 || view.slices.is_empty() {
        return Ok(());
    }

    let inner_limit = radius * 0.2;
    let band = (radius - inner_limit) / view.slices.len() as f64;
    for (i, slice) in view.slices.iter().enumerate() {
        let outer = radius - band * i as f64;
        let inner = outer - band * 0.8;
        let sweep = slice.value.abs() / max * 2.0 * PI * 0.999;
        if sweep <= 0.0 {
            continue;
        }
        area.draw(&Polygon::new(
            ring_segment(center, inner, outer, 0.0, sweep),
            hex_color(slice.color).filled(),
        ))
        .map_err(render_err)?;
    }
    Ok(())
}

/// A filled polygon over one spoke per category.
fn draw_radar(area: &Canvas, view: &ChartView, options: &RenderOptions) -> Result<()> {
    let (center, radius) = circle_geometry(area);
    let values = view.y_values();
    let labels = view.x_labels();
    if values.is_empty() {
        return Ok(());
    }
    let max = values.iter().copied().fold(0.0, f64::max).max(f64::EPSILON);
    let step = 2.0 * PI / values.len() as f64;
    let at = |r: f64, i: usize| {
        let angle = step * i as f64;
        (
            center.0 + (r * angle.sin()).round() as i32,
            center.1 - (r * angle.cos()).round() as i32,
        )
    };

    let grid = RGBColor(200, 200, 200);
    for ring in 1..=4 {
        let r = radius * ring as f64 / 4.0;
        let mut outline: Vec<(i32, i32)> = (0..values.len()).map(|i| at(r, i)).collect();
        outline.push(at(r, 0));
        area.draw(&PathElement::new(outline, grid))
            .map_err(render_err)?;
    }
    for (i, label) in labels.iter().enumerate() {
        area.draw(&PathElement::new(vec![center, at(radius, i)], grid))
            .map_err(render_err)?;
        if options.labels {
            area.draw(&Text::new(
                label.clone(),
                at(radius + 12.0, i),
                ("sans-serif", 13)
                    .into_font()
                    .color(&BLACK)
                    .pos(Pos::new(HPos::Center, VPos::Center)),
            ))
            .map_err(render_err)?;
        }
    }

    let color = view
        .series
        .first()
        .map(|s| hex_color(s.color))
        .unwrap_or(BLUE);
    let shape: Vec<(i32, i32)> = values
        .iter()
        .enumerate()
        .map(|(i, v)| at(radius * v.max(0.0) / max, i))
        .collect();
    area.draw(&Polygon::new(shape.clone(), color.mix(0.4).filled()))
        .map_err(render_err)?;
    let mut border = shape;
    if let Some(first) = border.first().copied() {
        border.push(first);
    }
    area.draw(&PathElement::new(border, color.stroke_width(2)))
        .map_err(render_err)?;
    Ok(())
}
