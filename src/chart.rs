//! Turning materialized chart data into a render-ready chart description.
//!
//! Every chart goes through the same steps before it is drawn:
//!
//! 1. the type tag is mapped onto a [`ChartKind`], unknown tags falling back
//!    to a bar chart with a warning;
//! 2. the x and y fields are resolved with [`resolve_axes`];
//! 3. the rows are cut to the first [`DISPLAY_LIMIT`] records, in server order;
//! 4. colours, currency formatting and the per-kind extras (pie labels,
//!    donut centre, scatter tooltips) are attached.

use crate::aggregate::{ChartData, ChartRequest};
use crate::dataset::Record;
use crate::error::AnalysisError;
use crate::suggest::ChartParameters;
use serde::Serialize;

/// Maximum number of records a chart shows.
pub const DISPLAY_LIMIT: usize = 15;

/// Y field used when no column can serve as one.
pub const FALLBACK_Y: &str = "count";

/// Message shown when a chart has nothing to draw.
pub const NO_DATA_MESSAGE: &str = "No hay datos disponibles para esta visualización";

/// Caption under the category count in the middle of a donut.
pub const DONUT_CAPTION: &str = "categorías";

pub const PALETTE: [&str; 12] = [
    "#2196f3", "#9c27b0", "#e91e63", "#7c4dff", "#ff4081", "#00bcd4", "#ba68c8", "#f06292",
    "#42a5f5", "#ab47bc", "#ec407a", "#64b5f6",
];

/// Column-name fragments (Spanish and English) that mark money columns.
pub const CURRENCY_TOKENS: [&str; 16] = [
    "precio", "price", "salario", "salary", "pago", "payment", "venta", "sale", "ingreso",
    "income", "costo", "cost", "valor", "value", "monto", "amount",
];

/// Scatter tooltips skip fields whose names contain one of these.
const TOOLTIP_SKIP_TOKENS: [&str; 3] = ["id", "timestamp", "date"];

/// At most this many extra fields appear in a scatter tooltip.
const TOOLTIP_EXTRA_FIELDS: usize = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    Bar,
    Line,
    Pie,
    Donut,
    Scatter,
    Area,
    Histogram,
    Radar,
    RadialBar,
    Composed,
}

impl ChartKind {
    /// Map a type tag onto a kind, ignoring case. `None` for unknown tags.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim().to_lowercase().as_str() {
            "bar" | "column" => Some(ChartKind::Bar),
            "line" => Some(ChartKind::Line),
            "pie" => Some(ChartKind::Pie),
            "donut" => Some(ChartKind::Donut),
            "scatter" => Some(ChartKind::Scatter),
            "area" => Some(ChartKind::Area),
            "histogram" => Some(ChartKind::Histogram),
            "radar" => Some(ChartKind::Radar),
            "radialbar" | "radial" => Some(ChartKind::RadialBar),
            "composed" | "combo" | "mixed" => Some(ChartKind::Composed),
            _ => None,
        }
    }

    pub fn is_circular(&self) -> bool {
        matches!(self, ChartKind::Pie | ChartKind::Donut | ChartKind::RadialBar)
    }
}

/// The mark a series is drawn with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Mark {
    Bar,
    Line,
    Area,
    Point,
    Slice,
    RadarArea,
    RadialBar,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Series {
    /// Record field holding the series values.
    pub key: String,
    /// Legend name.
    pub name: String,
    pub mark: Mark,
    pub color: &'static str,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Slice {
    pub name: String,
    pub value: f64,
    /// Share of the displayed total, between 0 and 1
    pub percent: f64,
    pub label: String,
    pub color: &'static str,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CenterLabel {
    pub value: usize,
    pub caption: &'static str,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TooltipEntry {
    pub field: String,
    pub text: String,
}

/// The resolved x and y fields of a chart.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Axes {
    pub x: String,
    pub y: String,
}

/// Everything a renderer needs to draw one chart.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChartView {
    pub kind: ChartKind,
    /// The tag the chart was requested with.
    pub chart_type: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub x_key: String,
    pub y_key: String,
    pub rows: Vec<Record>,
    pub series: Vec<Series>,
    pub warning: Option<String>,
    /// Axis ticks are printed as money.
    pub x_ticks_currency: bool,
    pub y_ticks_currency: bool,
    /// Pie, donut and radial bar segments.
    pub slices: Vec<Slice>,
    pub center: Option<CenterLabel>,
    /// Per-row tooltip contents for scatter charts.
    pub tooltips: Vec<Vec<TooltipEntry>>,
}

/// What a chart panel shows.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ChartState {
    NoData { message: String },
    Error { message: String },
    Ready(ChartView),
}

impl ChartState {
    /// Resolve a chart from the outcome of its data request.
    pub fn from_result(
        request: &ChartRequest,
        result: Result<&ChartData, &AnalysisError>,
    ) -> Self {
        match result {
            Ok(data) => ChartView::build(
                request.chart_type.as_deref().unwrap_or("bar"),
                &request.parameters,
                data,
            ),
            Err(err) => ChartState::Error {
                message: error_message(err),
            },
        }
    }

    /// Attach the suggestion title and description shown above the chart.
    pub fn with_text(mut self, title: Option<String>, description: Option<String>) -> Self {
        if let ChartState::Ready(view) = &mut self {
            view.title = title.filter(|t| !t.trim().is_empty());
            view.description = description.filter(|d| !d.trim().is_empty());
        }
        self
    }

    pub fn view(&self) -> Option<&ChartView> {
        match self {
            ChartState::Ready(view) => Some(view),
            _ => None,
        }
    }
}

/// Text shown in place of a chart whose data request failed.
pub fn error_message(err: &AnalysisError) -> String {
    match err {
        AnalysisError::UnknownColumn(col) => {
            format!("La columna \"{}\" no existe en el archivo", col)
        }
        AnalysisError::FileNotFound(_) => {
            "El archivo ya no está disponible; vuelve a subirlo".to_string()
        }
        other => format!("Error al obtener los datos: {}", other),
    }
}

/// Pick the x and y fields for a chart.
///
/// * x is the requested field, else the first column.
/// * y is the requested field, else the first column other than x, else
///   [`FALLBACK_Y`].
/// * If the first record lacks y, y becomes the first column other than x
///   that the first record has, else the second column, else
///   [`FALLBACK_Y`].
///
/// Empty requested names count as not requested.
pub fn resolve_axes(
    columns: &[String],
    first: Option<&Record>,
    x_axis: Option<&str>,
    y_axis: Option<&str>,
) -> Axes {
    let requested = |name: Option<&str>| name.filter(|n| !n.is_empty()).map(str::to_string);
    let has = |col: &str| first.is_some_and(|rec| rec.contains_key(col));

    let x = requested(x_axis)
        .or_else(|| columns.first().cloned())
        .unwrap_or_default();

    let mut y = requested(y_axis)
        .or_else(|| columns.iter().find(|c| **c != x).cloned())
        .unwrap_or_else(|| FALLBACK_Y.to_string());

    if !has(y.as_str()) {
        y = columns
            .iter()
            .find(|c| **c != x && has(c.as_str()))
            .or_else(|| columns.get(1))
            .cloned()
            .unwrap_or_else(|| FALLBACK_Y.to_string());
    }

    Axes { x, y }
}

/// The records a chart actually shows: the first [`DISPLAY_LIMIT`], in
/// the order the server returned them.
pub fn display_window(data: &[Record]) -> &[Record] {
    &data[..data.len().min(DISPLAY_LIMIT)]
}

/// True when the column name looks like it holds money.
pub fn is_currency_column(column: &str) -> bool {
    let lower = column.to_lowercase();
    CURRENCY_TOKENS.iter().any(|token| lower.contains(token))
}

/// Format a value for a tooltip. Numbers in money columns get a `$` prefix
/// and thousands separators with up to two decimals; anything else is
/// printed as is.
pub fn format_value(value: &serde_json::Value, column: &str) -> String {
    match value.as_f64() {
        Some(n) if is_currency_column(column) => format!("${}", group_number(n, 2)),
        _ => plain_text(value),
    }
}

/// Format an axis tick. Money columns use up to three decimals, the
/// default precision of locale number formatting.
pub fn format_tick(value: f64, column: &str) -> String {
    if is_currency_column(column) {
        format!("${}", group_number(value, 3))
    } else {
        plain_number(value)
    }
}

/// Fixed-point text for a non-negative finite number with exactly `digits`
/// decimals. Halves round away from zero on the shortest decimal form, so
/// `0.125` gives `0.13` where `{:.2}` would give `0.12`.
fn fixed_half_up(value: f64, digits: usize) -> String {
    // Display for f64 never switches to exponent notation.
    let shortest = value.to_string();
    let (int_part, frac_part) = shortest.split_once('.').unwrap_or((&shortest, ""));

    let mut kept: Vec<char> = int_part
        .chars()
        .chain(frac_part.chars().chain(std::iter::repeat('0')).take(digits))
        .collect();
    if frac_part.chars().nth(digits).is_some_and(|d| d >= '5') {
        let mut carry = true;
        for d in kept.iter_mut().rev() {
            if *d == '9' {
                *d = '0';
            } else {
                *d = char::from(*d as u8 + 1);
                carry = false;
                break;
            }
        }
        if carry {
            kept.insert(0, '1');
        }
    }

    let split = kept.len() - digits;
    let whole: String = kept[..split].iter().collect();
    if digits == 0 {
        whole
    } else {
        let fraction: String = kept[split..].iter().collect();
        format!("{}.{}", whole, fraction)
    }
}

/// en-US digit grouping with at most `max_fraction` decimals and no
/// trailing zeros.
pub fn group_number(value: f64, max_fraction: usize) -> String {
    if !value.is_finite() {
        return plain_number(value);
    }
    let fixed = fixed_half_up(value.abs(), max_fraction);
    let (int_part, frac_part) = match fixed.split_once('.') {
        Some((i, f)) => (i, f.trim_end_matches('0')),
        None => (fixed.as_str(), ""),
    };

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, digit) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let negative = value < 0.0 && fixed.chars().any(|c| c.is_ascii_digit() && c != '0');
    let sign = if negative { "-" } else { "" };
    if frac_part.is_empty() {
        format!("{}{}", sign, grouped)
    } else {
        format!("{}{}.{}", sign, grouped, frac_part)
    }
}

fn plain_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e21 {
        format!("{}", value as i128)
    } else {
        value.to_string()
    }
}

fn plain_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => i.to_string(),
            (None, Some(f)) => plain_number(f),
            _ => n.to_string(),
        },
        other => other.to_string(),
    }
}

/// Fields shown when hovering a scatter point: x, y, then up to two other
/// scalar fields whose names do not look like ids or dates.
pub fn scatter_tooltip(record: &Record, x: &str, y: &str) -> Vec<TooltipEntry> {
    let extras = record
        .iter()
        .filter(|(key, value)| {
            let lower = key.to_lowercase();
            key.as_str() != x
                && key.as_str() != y
                && !(value.is_null() || value.is_object() || value.is_array())
                && !TOOLTIP_SKIP_TOKENS.iter().any(|t| lower.contains(t))
        })
        .map(|(key, _)| key.as_str())
        .take(TOOLTIP_EXTRA_FIELDS);

    [x, y]
        .into_iter()
        .chain(extras)
        .map(|field| TooltipEntry {
            field: field.to_string(),
            text: format_value(record.get(field).unwrap_or(&serde_json::Value::Null), field),
        })
        .collect()
}

/// Pie labels read `name: pct%` with the percentage of the displayed total.
fn pie_slices(rows: &[Record], x: &str, y: &str) -> Vec<Slice> {
    let values: Vec<f64> = rows
        .iter()
        .map(|r| r.get(y).and_then(|v| v.as_f64()).unwrap_or(0.0).max(0.0))
        .collect();
    let total: f64 = values.iter().sum();

    rows.iter()
        .zip(values)
        .enumerate()
        .map(|(i, (rec, value))| {
            let name = plain_text(rec.get(x).unwrap_or(&serde_json::Value::Null));
            let percent = if total > 0.0 { value / total } else { 0.0 };
            Slice {
                label: format!("{}: {}%", name, fixed_half_up(percent * 100.0, 0)),
                name,
                value,
                percent,
                color: PALETTE[i % PALETTE.len()],
            }
        })
        .collect()
}

fn make_series(key: &str, name: &str, mark: Mark, color: usize) -> Series {
    Series {
        key: key.to_string(),
        name: name.to_string(),
        mark,
        color: PALETTE[color],
    }
}

impl ChartView {
    /// Resolve the chart for one suggestion from its materialized data.
    pub fn build(chart_type: &str, parameters: &ChartParameters, data: &ChartData) -> ChartState {
        if data.data.is_empty() {
            return ChartState::NoData {
                message: NO_DATA_MESSAGE.to_string(),
            };
        }

        let axes = resolve_axes(
            &data.columns,
            data.data.first(),
            Some(parameters.x_axis.as_str()),
            parameters.y_axis.as_deref(),
        );
        let rows = display_window(&data.data).to_vec();
        let (x, y) = (axes.x.as_str(), axes.y.as_str());

        let (kind, warning) = match ChartKind::from_tag(chart_type) {
            Some(kind) => (kind, None),
            None => {
                log::debug!("unrecognised chart type {:?}, drawing bars", chart_type);
                (
                    ChartKind::Bar,
                    Some(format!(
                        "Tipo \"{}\" no reconocido, mostrando como gráfico de barras",
                        chart_type
                    )),
                )
            }
        };

        let bar_color = if warning.is_some() { 9 } else { 0 };
        let series = match kind {
            ChartKind::Bar => vec![make_series(y, y, Mark::Bar, bar_color)],
            ChartKind::Line => vec![make_series(y, y, Mark::Line, 1)],
            ChartKind::Scatter => vec![make_series(y, &format!("{} vs {}", x, y), Mark::Point, 2)],
            ChartKind::Area => vec![make_series(y, y, Mark::Area, 3)],
            ChartKind::Histogram => vec![make_series(y, y, Mark::Bar, 4)],
            ChartKind::Radar => vec![make_series(y, y, Mark::RadarArea, 6)],
            ChartKind::Composed => vec![
                make_series(y, y, Mark::Bar, 7),
                make_series(y, y, Mark::Line, 8),
            ],
            ChartKind::Pie | ChartKind::Donut => vec![make_series(y, x, Mark::Slice, 0)],
            ChartKind::RadialBar => vec![make_series(y, y, Mark::RadialBar, 0)],
        };

        let (x_ticks_currency, y_ticks_currency) = match kind {
            ChartKind::Bar | ChartKind::Line | ChartKind::Composed => {
                (false, is_currency_column(y))
            }
            ChartKind::Scatter => (is_currency_column(x), is_currency_column(y)),
            ChartKind::Histogram => (is_currency_column(x), false),
            _ => (false, false),
        };

        let slices = if kind.is_circular() {
            pie_slices(&rows, x, y)
        } else {
            Vec::new()
        };

        let center = (kind == ChartKind::Donut).then(|| CenterLabel {
            value: rows.len(),
            caption: DONUT_CAPTION,
        });

        let tooltips = if kind == ChartKind::Scatter {
            rows.iter().map(|r| scatter_tooltip(r, x, y)).collect()
        } else {
            Vec::new()
        };

        ChartState::Ready(ChartView {
            kind,
            chart_type: chart_type.to_string(),
            title: None,
            description: None,
            x_key: axes.x.clone(),
            y_key: axes.y.clone(),
            rows,
            series,
            warning,
            x_ticks_currency,
            y_ticks_currency,
            slices,
            center,
            tooltips,
        })
    }

    /// Numeric y values of the displayed rows; missing or non-numeric
    /// values read as zero.
    pub fn y_values(&self) -> Vec<f64> {
        self.rows
            .iter()
            .map(|r| r.get(&self.y_key).and_then(|v| v.as_f64()).unwrap_or(0.0))
            .collect()
    }

    /// Category labels along the x axis.
    pub fn x_labels(&self) -> Vec<String> {
        self.rows
            .iter()
            .map(|r| plain_text(r.get(&self.x_key).unwrap_or(&serde_json::Value::Null)))
            .collect()
    }

    /// Numeric x values, for charts with a continuous x axis.
    pub fn x_values(&self) -> Vec<Option<f64>> {
        self.rows
            .iter()
            .map(|r| r.get(&self.x_key).and_then(|v| v.as_f64()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn rec(value: serde_json::Value) -> Record {
        value.as_object().unwrap().clone()
    }

    fn data(columns: &[&str], rows: Vec<serde_json::Value>) -> ChartData {
        ChartData {
            data: rows.into_iter().map(rec).collect(),
            columns: cols(columns),
        }
    }

    #[test]
    fn axes_default_to_column_order() {
        let first = rec(json!({"Región": "Centro", "Ventas": 3000}));
        let axes = resolve_axes(&cols(&["Región", "Ventas"]), Some(&first), None, None);
        assert_eq!(axes.x, "Región");
        assert_eq!(axes.y, "Ventas");
    }

    #[test]
    fn requested_axes_win_when_present() {
        let first = rec(json!({"a": 1, "b": 2, "c": 3}));
        let axes = resolve_axes(&cols(&["a", "b", "c"]), Some(&first), Some("c"), Some("a"));
        assert_eq!((axes.x.as_str(), axes.y.as_str()), ("c", "a"));
    }

    #[test]
    fn empty_requests_are_ignored() {
        let first = rec(json!({"a": 1, "b": 2}));
        let axes = resolve_axes(&cols(&["a", "b"]), Some(&first), Some(""), Some(""));
        assert_eq!((axes.x.as_str(), axes.y.as_str()), ("a", "b"));
    }

    #[test]
    fn single_column_falls_back_to_count_label() {
        let first = rec(json!({"a": 1}));
        let axes = resolve_axes(&cols(&["a"]), Some(&first), None, None);
        assert_eq!(axes.y, FALLBACK_Y);
    }

    #[test]
    fn y_missing_from_first_record_is_re_resolved() {
        // Requested y not in the record: first other column the record has.
        let first = rec(json!({"Región": "Centro", "count": 4}));
        let axes = resolve_axes(
            &cols(&["Región", "count"]),
            Some(&first),
            Some("Región"),
            Some("Ventas"),
        );
        assert_eq!(axes.y, "count");

        // No other column is in the record: second column.
        let first = rec(json!({"x": 1}));
        let axes = resolve_axes(&cols(&["x", "y", "z"]), Some(&first), None, Some("w"));
        assert_eq!(axes.y, "y");

        // Nothing at all: the fallback label.
        let axes = resolve_axes(&cols(&["x"]), Some(&first), None, Some("w"));
        assert_eq!(axes.y, FALLBACK_Y);
    }

    #[test]
    fn second_column_fallback_may_repeat_x() {
        let first = rec(json!({"b": 1}));
        let axes = resolve_axes(&cols(&["a", "b"]), Some(&first), Some("b"), None);
        assert_eq!(axes.x, "b");
        assert_eq!(axes.y, "b");
    }

    #[test]
    fn window_keeps_first_fifteen_in_order() {
        let rows: Vec<Record> = (0..20).map(|i| rec(json!({"i": i}))).collect();
        let shown = display_window(&rows);
        assert_eq!(shown.len(), DISPLAY_LIMIT);
        assert_eq!(shown[0]["i"], 0);
        assert_eq!(shown[14]["i"], 14);
        assert_eq!(display_window(&rows[..3]).len(), 3);
    }

    #[test]
    fn currency_columns_match_in_both_languages() {
        for name in ["Precio unitario", "SALARY", "Ventas", "total_amount", "Monto", "Valor"] {
            assert!(is_currency_column(name), "{}", name);
        }
        for name in ["Región", "Unidades", "Fecha"] {
            assert!(!is_currency_column(name), "{}", name);
        }
    }

    #[test]
    fn currency_values_are_grouped_and_prefixed() {
        assert_eq!(format_value(&json!(1234567.891), "Ventas"), "$1,234,567.89");
        assert_eq!(format_value(&json!(3000), "Ventas"), "$3,000");
        assert_eq!(format_value(&json!(12.5), "price"), "$12.5");
        assert_eq!(format_value(&json!(999), "cost"), "$999");
        assert_eq!(format_value(&json!(-1500.25), "cost"), "$-1,500.25");
    }

    #[test]
    fn halves_round_away_from_zero() {
        assert_eq!(format_value(&json!(1234.125), "Ventas"), "$1,234.13");
        assert_eq!(format_value(&json!(0.125), "Ventas"), "$0.13");
        assert_eq!(format_value(&json!(-0.125), "Ventas"), "$-0.13");
        assert_eq!(format_value(&json!(999.995), "Ventas"), "$1,000");
        assert_eq!(fixed_half_up(12.5, 0), "13");
        assert_eq!(fixed_half_up(99.5, 0), "100");
        assert_eq!(fixed_half_up(0.0, 2), "0.00");
    }

    #[test]
    fn other_values_pass_through() {
        assert_eq!(format_value(&json!(1234567), "Unidades"), "1234567");
        assert_eq!(format_value(&json!("n/a"), "Ventas"), "n/a");
        assert_eq!(format_value(&json!(2.5), "ratio"), "2.5");
        assert_eq!(format_value(&json!(null), "Ventas"), "");
    }

    #[test]
    fn ticks_use_three_decimals() {
        assert_eq!(format_tick(1234.5678, "Ventas"), "$1,234.568");
        assert_eq!(format_tick(2000.0, "Unidades"), "2000");
    }

    #[test]
    fn unknown_tag_renders_as_bar_with_warning() {
        let d = data(&["a", "b"], vec![json!({"a": "x", "b": 1})]);
        let state = ChartView::build("Waterfall", &ChartParameters::new("a"), &d);
        let view = state.view().unwrap();
        assert_eq!(view.kind, ChartKind::Bar);
        assert_eq!(view.series[0].color, PALETTE[9]);
        assert_eq!(
            view.warning.as_deref(),
            Some("Tipo \"Waterfall\" no reconocido, mostrando como gráfico de barras")
        );
    }

    #[test]
    fn tags_are_case_insensitive_with_aliases() {
        assert_eq!(ChartKind::from_tag("COLUMN"), Some(ChartKind::Bar));
        assert_eq!(ChartKind::from_tag("Radial"), Some(ChartKind::RadialBar));
        assert_eq!(ChartKind::from_tag("combo"), Some(ChartKind::Composed));
        assert_eq!(ChartKind::from_tag("mixed"), Some(ChartKind::Composed));
        assert_eq!(ChartKind::from_tag("box"), None);
    }

    #[test]
    fn empty_data_has_nothing_to_show() {
        let d = data(&["a", "b"], vec![]);
        let state = ChartView::build("bar", &ChartParameters::new("a"), &d);
        assert_eq!(
            state,
            ChartState::NoData {
                message: NO_DATA_MESSAGE.to_string()
            }
        );
    }

    #[test]
    fn series_colours_follow_the_kind() {
        let d = data(&["a", "b"], vec![json!({"a": "x", "b": 1})]);
        let params = ChartParameters::new("a").with_y("b");
        let colour = |tag: &str| {
            ChartView::build(tag, &params, &d)
                .view()
                .unwrap()
                .series
                .iter()
                .map(|s| s.color)
                .collect::<Vec<_>>()
        };
        assert_eq!(colour("bar"), vec![PALETTE[0]]);
        assert_eq!(colour("line"), vec![PALETTE[1]]);
        assert_eq!(colour("scatter"), vec![PALETTE[2]]);
        assert_eq!(colour("area"), vec![PALETTE[3]]);
        assert_eq!(colour("histogram"), vec![PALETTE[4]]);
        assert_eq!(colour("radar"), vec![PALETTE[6]]);
        assert_eq!(colour("composed"), vec![PALETTE[7], PALETTE[8]]);
    }

    #[test]
    fn pie_labels_and_donut_centre() {
        let d = data(
            &["Región", "Ventas"],
            vec![
                json!({"Región": "Centro", "Ventas": 3000}),
                json!({"Región": "Norte", "Ventas": 2500}),
                json!({"Región": "Sur", "Ventas": 1500}),
            ],
        );
        let params = ChartParameters::new("Región").with_y("Ventas");
        let state = ChartView::build("donut", &params, &d);
        let view = state.view().unwrap();
        let labels: Vec<&str> = view.slices.iter().map(|s| s.label.as_str()).collect();
        assert_eq!(labels, vec!["Centro: 43%", "Norte: 36%", "Sur: 21%"]);
        assert_eq!(view.slices[1].color, PALETTE[1]);
        assert_eq!(
            view.center,
            Some(CenterLabel {
                value: 3,
                caption: DONUT_CAPTION
            })
        );

        let pie = ChartView::build("pie", &params, &d);
        assert!(pie.view().unwrap().center.is_none());
    }

    #[test]
    fn equal_pie_shares_round_up() {
        let rows = (0..8).map(|i| json!({"k": i, "v": 1})).collect();
        let d = data(&["k", "v"], rows);
        let state = ChartView::build("pie", &ChartParameters::new("k"), &d);
        let view = state.view().unwrap();
        assert_eq!(view.slices.len(), 8);
        assert_eq!(view.slices[0].label, "0: 13%");
        assert_eq!(view.slices[0].percent, 0.125);
    }

    #[test]
    fn pie_slices_cycle_the_palette() {
        let rows = (0..14).map(|i| json!({"k": i, "v": 1})).collect();
        let d = data(&["k", "v"], rows);
        let state = ChartView::build("pie", &ChartParameters::new("k"), &d);
        let view = state.view().unwrap();
        assert_eq!(view.slices.len(), 14);
        assert_eq!(view.slices[12].color, PALETTE[0]);
        assert_eq!(view.slices[13].color, PALETTE[1]);
    }

    #[test]
    fn scatter_tooltips_pick_relevant_fields() {
        let d = data(
            &["Precio", "Unidades"],
            vec![json!({
                "id": 7,
                "Precio": 1250.5,
                "Unidades": 3,
                "Fecha": "2024-01-01",
                "order_date": "2024-01-01",
                "Vendedor": "Ana",
                "Tags": ["a"],
                "Región": "Sur",
                "Canal": "web"
            })],
        );
        let params = ChartParameters::new("Precio").with_y("Unidades");
        let state = ChartView::build("scatter", &params, &d);
        let view = state.view().unwrap();
        assert_eq!(view.series[0].name, "Precio vs Unidades");
        assert!(view.x_ticks_currency);
        assert!(!view.y_ticks_currency);

        let fields: Vec<(&str, &str)> = view.tooltips[0]
            .iter()
            .map(|e| (e.field.as_str(), e.text.as_str()))
            .collect();
        assert_eq!(
            fields,
            vec![
                ("Precio", "$1,250.5"),
                ("Unidades", "3"),
                ("Fecha", "2024-01-01"),
                ("Vendedor", "Ana"),
            ]
        );
    }

    #[test]
    fn only_fifteen_rows_reach_the_view() {
        let rows = (0..40).map(|i| json!({"k": i, "v": i})).collect();
        let d = data(&["k", "v"], rows);
        let state = ChartView::build("line", &ChartParameters::new("k"), &d);
        let view = state.view().unwrap();
        assert_eq!(view.rows.len(), DISPLAY_LIMIT);
        assert_eq!(view.y_values()[14], 14.0);
    }

    #[test]
    fn failed_requests_become_error_state() {
        let req = ChartRequest::new(ChartParameters::new("Zona"), Some("bar"));
        let err = AnalysisError::UnknownColumn("Zona".into());
        let state = ChartState::from_result(&req, Err(&err));
        assert_eq!(
            state,
            ChartState::Error {
                message: "La columna \"Zona\" no existe en el archivo".into()
            }
        );
    }

    #[test]
    fn state_serializes_with_tag() {
        let d = data(&["a", "b"], vec![json!({"a": "x", "b": 1})]);
        let state = ChartView::build("bar", &ChartParameters::new("a"), &d)
            .with_text(Some("Ventas".into()), Some("".into()));
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["state"], "ready");
        assert_eq!(json["kind"], "bar");
        assert_eq!(json["title"], "Ventas");
        assert!(json["description"].is_null());

        let empty = serde_json::to_value(ChartView::build(
            "bar",
            &ChartParameters::new("a"),
            &data(&["a"], vec![]),
        ))
        .unwrap();
        assert_eq!(empty["state"], "no_data");
    }
}
