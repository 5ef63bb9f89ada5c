use crate::dataset::{Dataset, Record};
use crate::error::{AnalysisError, Result};
use crate::suggest::ChartParameters;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Column name used for row counts.
pub const COUNT_COLUMN: &str = "count";

const HISTOGRAM_BINS: usize = 10;

/// A parameter set plus the chart type it is destined for. The chart type
/// matters for shapes that are not a plain group-by (scatter, histogram).
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChartRequest {
    #[serde(flatten)]
    pub parameters: ChartParameters,
    #[serde(default)]
    pub chart_type: Option<String>,
}

impl ChartRequest {
    pub fn new(parameters: ChartParameters, chart_type: Option<&str>) -> Self {
        ChartRequest {
            parameters,
            chart_type: chart_type.map(str::to_string),
        }
    }

    /// Which aggregation the chart type needs. Unknown and missing types
    /// are grouped, like bars.
    pub fn shape(&self) -> Shape {
        let tag = self.chart_type.as_deref().unwrap_or("bar").trim();
        if tag.eq_ignore_ascii_case("scatter") {
            Shape::Scatter
        } else if tag.eq_ignore_ascii_case("histogram") {
            Shape::Histogram
        } else {
            Shape::Grouped
        }
    }
}

/// The aggregation a chart is built from. Every chart type other than
/// scatter and histogram plots group-by rows.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Shape {
    Grouped,
    Scatter,
    Histogram,
}

impl Shape {
    pub fn as_str(self) -> &'static str {
        match self {
            Shape::Grouped => "grouped",
            Shape::Scatter => "scatter",
            Shape::Histogram => "histogram",
        }
    }
}

/// Aggregated rows ready to plot, plus the columns relevant to the chart.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChartData {
    pub data: Vec<Record>,
    pub columns: Vec<String>,
}

/// How grouped values are folded into one number.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AggFunc {
    Sum,
    Mean,
    Count,
    Min,
    Max,
    Median,
}

impl AggFunc {
    /// Parse an aggregation name; a missing name means `sum`.
    pub fn parse(name: Option<&str>) -> Result<Self> {
        let Some(name) = name else {
            return Ok(AggFunc::Sum);
        };
        match name.trim().to_lowercase().as_str() {
            "" | "sum" => Ok(AggFunc::Sum),
            "mean" | "avg" | "average" => Ok(AggFunc::Mean),
            "count" | "size" => Ok(AggFunc::Count),
            "min" => Ok(AggFunc::Min),
            "max" => Ok(AggFunc::Max),
            "median" => Ok(AggFunc::Median),
            other => Err(AnalysisError::parse(format!(
                "unknown aggregation: {}",
                other
            ))),
        }
    }

    fn apply(&self, values: &[f64], non_null: usize) -> Option<f64> {
        match self {
            AggFunc::Count => Some(non_null as f64),
            _ if values.is_empty() => None,
            AggFunc::Sum => Some(values.iter().sum()),
            AggFunc::Mean => Some(values.iter().sum::<f64>() / values.len() as f64),
            AggFunc::Min => values.iter().copied().reduce(f64::min),
            AggFunc::Max => values.iter().copied().reduce(f64::max),
            AggFunc::Median => {
                let mut sorted = values.to_vec();
                sorted.sort_by(|a, b| a.total_cmp(b));
                Some(crate::summary::quantile(&sorted, 0.5))
            }
        }
    }

    /// Value used for a group/series combination with no rows.
    fn empty_value(&self) -> serde_json::Value {
        match self {
            AggFunc::Sum | AggFunc::Count => serde_json::Value::from(0),
            _ => serde_json::Value::Null,
        }
    }
}

/// Materialize the data for one chart.
///
/// Scatter charts get the raw rows whose x and y are both numeric;
/// histograms bin a numeric x; box plots and every other type are a
/// group-by on x with y folded by `agg_func`. Row order follows the order
/// in which x values first appear in the file.
pub fn aggregate_for_chart(dataset: &Dataset, request: &ChartRequest) -> Result<ChartData> {
    let params = &request.parameters;
    require_column(dataset, &params.x_axis)?;
    if let Some(y) = &params.y_axis {
        require_column(dataset, y)?;
    }
    if let Some(hue) = &params.hue {
        require_column(dataset, hue)?;
    }

    match request.shape() {
        Shape::Scatter => scatter_rows(dataset, params),
        Shape::Histogram => histogram_rows(dataset, params),
        Shape::Grouped => grouped_rows(dataset, params),
    }
}

fn require_column(dataset: &Dataset, name: &str) -> Result<usize> {
    dataset
        .column_index(name)
        .ok_or_else(|| AnalysisError::UnknownColumn(name.to_string()))
}

fn scatter_rows(dataset: &Dataset, params: &ChartParameters) -> Result<ChartData> {
    let y = params
        .y_axis
        .as_deref()
        .ok_or_else(|| AnalysisError::parse("scatter charts need a y_axis"))?;
    let xi = require_column(dataset, &params.x_axis)?;
    let yi = require_column(dataset, y)?;

    let data = (0..dataset.len())
        .filter(|&i| {
            let row = &dataset.rows[i];
            row[xi].as_f64().is_some() && row[yi].as_f64().is_some()
        })
        .filter_map(|i| dataset.record(i))
        .collect();

    let mut columns = vec![params.x_axis.clone(), y.to_string()];
    if let Some(hue) = &params.hue {
        columns.push(hue.clone());
    }
    Ok(ChartData { data, columns })
}

fn histogram_rows(dataset: &Dataset, params: &ChartParameters) -> Result<ChartData> {
    let xi = require_column(dataset, &params.x_axis)?;
    let values: Vec<f64> = dataset.rows.iter().filter_map(|r| r[xi].as_f64()).collect();
    let columns = vec![params.x_axis.clone(), COUNT_COLUMN.to_string()];

    if values.is_empty() {
        // Text columns: a histogram degenerates into a count per value.
        return grouped_rows(
            dataset,
            &ChartParameters::new(params.x_axis.clone()).with_agg("count"),
        );
    }

    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let bins = if min == max { 1 } else { HISTOGRAM_BINS };
    let width = (max - min) / bins as f64;

    let mut counts = vec![0usize; bins];
    for v in &values {
        let idx = if width == 0.0 {
            0
        } else {
            (((v - min) / width) as usize).min(bins - 1)
        };
        counts[idx] += 1;
    }

    let data = counts
        .iter()
        .enumerate()
        .map(|(i, count)| {
            let lo = min + width * i as f64;
            let hi = if i + 1 == bins { max } else { lo + width };
            let mut rec = Record::new();
            rec.insert(
                params.x_axis.clone(),
                serde_json::Value::String(format!("{} - {}", short_number(lo), short_number(hi))),
            );
            rec.insert(COUNT_COLUMN.to_string(), serde_json::Value::from(*count));
            rec
        })
        .collect();

    Ok(ChartData { data, columns })
}

#[derive(Default)]
struct Bucket {
    values: Vec<f64>,
    non_null: usize,
}

fn grouped_rows(dataset: &Dataset, params: &ChartParameters) -> Result<ChartData> {
    let xi = require_column(dataset, &params.x_axis)?;
    let yi = params
        .y_axis
        .as_deref()
        .map(|y| require_column(dataset, y))
        .transpose()?;
    let hi = params
        .hue
        .as_deref()
        .map(|h| require_column(dataset, h))
        .transpose()?;

    let mut agg = AggFunc::parse(params.agg_func.as_deref())?;
    let y_name = match (yi, &params.y_axis) {
        (Some(idx), Some(name)) => {
            let numeric = dataset.rows.iter().any(|r| r[idx].as_f64().is_some());
            if !numeric && agg != AggFunc::Count {
                log::debug!("column {} is not numeric, counting instead", name);
                agg = AggFunc::Count;
            }
            name.clone()
        }
        _ => {
            agg = AggFunc::Count;
            COUNT_COLUMN.to_string()
        }
    };

    // Groups and series keep first-seen order.
    let mut group_order: Vec<(String, serde_json::Value)> = Vec::new();
    let mut group_index: HashMap<String, usize> = HashMap::new();
    let mut series_order: Vec<String> = Vec::new();
    let mut buckets: HashMap<(usize, String), Bucket> = HashMap::new();

    for row in &dataset.rows {
        let x = &row[xi];
        if x.is_null() {
            continue;
        }
        let label = x.label();
        let group = *group_index.entry(label.clone()).or_insert_with(|| {
            group_order.push((label, x.to_json()));
            group_order.len() - 1
        });

        let series = match hi {
            Some(h) => {
                let name = row[h].label();
                if !series_order.contains(&name) {
                    series_order.push(name.clone());
                }
                name
            }
            None => y_name.clone(),
        };

        let bucket = buckets.entry((group, series)).or_default();
        match yi {
            Some(idx) => {
                let y = &row[idx];
                if !y.is_null() {
                    bucket.non_null += 1;
                }
                if let Some(v) = y.as_f64() {
                    bucket.values.push(v);
                }
            }
            None => bucket.non_null += 1,
        }
    }

    if hi.is_none() {
        series_order.push(y_name.clone());
    }

    let data = group_order
        .iter()
        .enumerate()
        .map(|(g, (_, x_value))| {
            let mut rec = Record::new();
            rec.insert(params.x_axis.clone(), x_value.clone());
            for series in &series_order {
                let value = buckets
                    .get(&(g, series.clone()))
                    .and_then(|b| agg.apply(&b.values, b.non_null))
                    .map(json_number)
                    .unwrap_or_else(|| agg.empty_value());
                rec.insert(series.clone(), value);
            }
            rec
        })
        .collect();

    let mut columns = vec![params.x_axis.clone()];
    columns.extend(series_order);
    Ok(ChartData { data, columns })
}

/// Whole numbers are emitted as JSON integers.
fn json_number(f: f64) -> serde_json::Value {
    if f.fract() == 0.0 && f.abs() < 9.0e15 {
        serde_json::Value::from(f as i64)
    } else {
        serde_json::Number::from_f64(f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null)
    }
}

fn short_number(f: f64) -> String {
    let s = format!("{:.2}", f);
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}
