use crate::dataset::{Dataset, Value};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::fmt::Write;

lazy_static! {
    static ref DATE_REGEX: Regex = Regex::new(
        r"^(\d{4}-\d{2}-\d{2}([T ]\d{2}:\d{2}(:\d{2})?)?|\d{1,2}/\d{1,2}/\d{4})$"
    )
    .unwrap();
}

/// Column dtype names, spelled the way dataframe libraries report them.
pub const DTYPE_INT: &str = "int64";
pub const DTYPE_FLOAT: &str = "float64";
pub const DTYPE_BOOL: &str = "bool";
pub const DTYPE_DATETIME: &str = "datetime64";
pub const DTYPE_OBJECT: &str = "object";

/// Summary of an uploaded table: column names and types plus descriptive
/// statistics. This is the context handed to the suggestion engine.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DataFrameSummary {
    pub columns: Vec<String>,
    pub dtypes: BTreeMap<String, String>,
    pub describe: BTreeMap<String, serde_json::Value>,
    pub info: String,
}

impl DataFrameSummary {
    pub fn dtype(&self, column: &str) -> Option<&str> {
        self.dtypes.get(column).map(String::as_str)
    }

    pub fn is_numeric(&self, column: &str) -> bool {
        matches!(self.dtype(column), Some(DTYPE_INT) | Some(DTYPE_FLOAT))
    }

    pub fn is_datetime(&self, column: &str) -> bool {
        self.dtype(column) == Some(DTYPE_DATETIME)
    }

    /// Columns that read as categories: text or boolean.
    pub fn is_categorical(&self, column: &str) -> bool {
        matches!(self.dtype(column), Some(DTYPE_OBJECT) | Some(DTYPE_BOOL))
    }

    /// Number of distinct values recorded for a categorical column.
    pub fn unique_count(&self, column: &str) -> Option<u64> {
        self.describe.get(column)?.get("unique")?.as_u64()
    }
}

/// Build the summary of a dataset.
pub fn summarize(dataset: &Dataset) -> DataFrameSummary {
    let mut dtypes = BTreeMap::new();
    let mut describe = BTreeMap::new();

    for (idx, name) in dataset.columns.iter().enumerate() {
        let values: Vec<&Value> = dataset.rows.iter().map(|row| &row[idx]).collect();
        let dtype = infer_dtype(&values);
        let stats = if dtype == DTYPE_INT || dtype == DTYPE_FLOAT {
            describe_numeric(&values)
        } else {
            describe_categorical(&values)
        };
        dtypes.insert(name.clone(), dtype.to_string());
        describe.insert(name.clone(), stats);
    }

    let info = info_text(dataset, &dtypes);

    DataFrameSummary {
        columns: dataset.columns.clone(),
        dtypes,
        describe,
        info,
    }
}

/// Infer a column dtype from its non-null values.
///
/// A column of only nulls is `object`. Integers mixed with floats widen to
/// `float64`; any other mix is `object`.
pub fn infer_dtype(values: &[&Value]) -> &'static str {
    let mut ints = 0;
    let mut floats = 0;
    let mut bools = 0;
    let mut dates = 0;
    let mut texts = 0;

    for value in values {
        match value {
            Value::Null => {}
            Value::Int(_) => ints += 1,
            Value::Float(_) => floats += 1,
            Value::Bool(_) => bools += 1,
            Value::Text(s) if DATE_REGEX.is_match(s) => dates += 1,
            Value::Text(_) => texts += 1,
        }
    }

    let total = ints + floats + bools + dates + texts;
    if total == 0 {
        DTYPE_OBJECT
    } else if ints == total {
        DTYPE_INT
    } else if ints + floats == total {
        DTYPE_FLOAT
    } else if bools == total {
        DTYPE_BOOL
    } else if dates == total {
        DTYPE_DATETIME
    } else {
        DTYPE_OBJECT
    }
}

fn describe_numeric(values: &[&Value]) -> serde_json::Value {
    let mut nums: Vec<f64> = values.iter().filter_map(|v| v.as_f64()).collect();
    let count = nums.len();
    if count == 0 {
        return json!({ "count": 0 });
    }

    nums.sort_by(|a, b| a.total_cmp(b));
    let mean = nums.iter().sum::<f64>() / count as f64;
    let std = if count > 1 {
        let var = nums.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (count - 1) as f64;
        Some(var.sqrt())
    } else {
        None
    };

    json!({
        "count": count,
        "mean": mean,
        "std": std,
        "min": nums[0],
        "25%": quantile(&nums, 0.25),
        "50%": quantile(&nums, 0.5),
        "75%": quantile(&nums, 0.75),
        "max": nums[count - 1],
    })
}

fn describe_categorical(values: &[&Value]) -> serde_json::Value {
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut order: Vec<String> = Vec::new();
    let mut count = 0;

    for value in values.iter().filter(|v| !v.is_null()) {
        count += 1;
        let label = value.label();
        let entry = counts.entry(label.clone()).or_insert(0);
        if *entry == 0 {
            order.push(label);
        }
        *entry += 1;
    }

    // Ties go to the value seen first.
    let mut top: Option<(&String, usize)> = None;
    for label in &order {
        let freq = counts[label];
        if top.is_none_or(|(_, best)| freq > best) {
            top = Some((label, freq));
        }
    }

    json!({
        "count": count,
        "unique": order.len(),
        "top": top.map(|(label, _)| label.clone()),
        "freq": top.map(|(_, freq)| freq),
    })
}

/// Linear-interpolated quantile of sorted data.
pub fn quantile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let pos = (sorted.len() - 1) as f64 * q;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let frac = pos - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * frac
}

fn info_text(dataset: &Dataset, dtypes: &BTreeMap<String, String>) -> String {
    let mut out = String::new();
    let rows = dataset.len();
    let _ = writeln!(out, "<class 'DataFrame'>");
    if rows == 0 {
        let _ = writeln!(out, "RangeIndex: 0 entries");
    } else {
        let _ = writeln!(out, "RangeIndex: {} entries, 0 to {}", rows, rows - 1);
    }
    let _ = writeln!(out, "Data columns (total {} columns):", dataset.columns.len());
    let _ = writeln!(out, " #   Column  Non-Null Count  Dtype");
    for (idx, name) in dataset.columns.iter().enumerate() {
        let non_null = dataset.rows.iter().filter(|row| !row[idx].is_null()).count();
        let dtype = dtypes.get(name).map(String::as_str).unwrap_or(DTYPE_OBJECT);
        let _ = writeln!(out, " {:<3} {}  {} non-null  {}", idx, name, non_null, dtype);
    }
    out
}
