use serde::{Deserialize, Serialize};

/// A single row of chart data as it travels over the wire.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// A scalar cell value read from an uploaded file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    /// Interpret a raw text cell. Numbers and booleans are recognised,
    /// everything else is kept as text.
    pub fn parse_cell(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Value::Null;
        }
        if trimmed.eq_ignore_ascii_case("true") {
            return Value::Bool(true);
        }
        if trimmed.eq_ignore_ascii_case("false") {
            return Value::Bool(false);
        }
        if let Ok(i) = trimmed.parse::<i64>() {
            return Value::Int(i);
        }
        match trimmed.parse::<f64>() {
            Ok(f) if f.is_finite() => Value::Float(f),
            _ => Value::Text(trimmed.to_string()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric view of the value. Booleans and text are not numeric.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Key used when grouping rows by this value.
    pub fn label(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Text(s) => s.clone(),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Text(s) => serde_json::Value::String(s.clone()),
        }
    }
}

/// An uploaded table: a header row and the data rows below it.
///
/// Every row holds exactly `columns.len()` values; the loaders pad or
/// truncate ragged input before building a `Dataset`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl Dataset {
    pub fn new(columns: Vec<String>) -> Self {
        Dataset {
            columns,
            rows: Vec::new(),
        }
    }

    /// Append a row, padding with nulls or dropping extra cells so the row
    /// matches the header width.
    pub fn push_row(&mut self, mut row: Vec<Value>) {
        row.resize(self.columns.len(), Value::Null);
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// The values of one column, top to bottom.
    pub fn column(&self, name: &str) -> Option<Vec<&Value>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|row| &row[idx]).collect())
    }

    /// Row `i` as a JSON object keyed by column name.
    pub fn record(&self, i: usize) -> Option<Record> {
        let row = self.rows.get(i)?;
        Some(
            self.columns
                .iter()
                .zip(row.iter())
                .map(|(name, value)| (name.clone(), value.to_json()))
                .collect(),
        )
    }
}

/// Make header names unique and non-empty the way dataframe readers do:
/// blanks become `Unnamed: N`, repeats get a `.1`, `.2`, ... suffix.
pub fn normalize_headers(raw: Vec<String>) -> Vec<String> {
    let mut seen: Vec<String> = Vec::with_capacity(raw.len());
    for (i, name) in raw.into_iter().enumerate() {
        let base = match name.trim() {
            "" => format!("Unnamed: {}", i),
            trimmed => trimmed.to_string(),
        };
        let mut candidate = base.clone();
        let mut n = 1;
        while seen.contains(&candidate) {
            candidate = format!("{}.{}", base, n);
            n += 1;
        }
        seen.push(candidate);
    }
    seen
}
