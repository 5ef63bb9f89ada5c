use crate::dataset::{Dataset, Value, normalize_headers};
use crate::error::{AnalysisError, Result};
use std::fs;
use std::path::Path;

/// Load a dataset from a CSV file on disk
///
/// The first line is the header. Fields may be quoted, with `""` standing
/// for a literal quote inside a quoted field. Files exported with a
/// semicolon separator are recognised from the header line.
///
/// # Arguments
/// * `filepath` - Path to the CSV file to load
///
/// # Returns
/// * `Result<Dataset>` - The loaded table or an error
///
/// # Examples
/// ```no_run
/// use instant_analysis::loader::from_csv;
///
/// match from_csv("ventas.csv") {
///     Ok(ds) => println!("Loaded {} rows", ds.len()),
///     Err(e) => eprintln!("Error loading CSV: {}", e),
/// }
/// ```
pub fn from_csv(filepath: impl AsRef<Path>) -> Result<Dataset> {
    let path = filepath.as_ref();
    let bytes = fs::read(path).map_err(|e| AnalysisError::io(path, e))?;
    from_csv_bytes(&bytes)
}

/// Parse CSV content already held in memory (an upload body, for instance).
pub fn from_csv_bytes(bytes: &[u8]) -> Result<Dataset> {
    let text = String::from_utf8_lossy(bytes);
    let text = text.trim_start_matches('\u{feff}');

    let mut records = split_records(text)
        .into_iter()
        .filter(|record| !record.trim().is_empty());

    let header_line = records.next().ok_or(AnalysisError::EmptyFile)?;
    let delimiter = detect_delimiter(header_line);

    let columns = normalize_headers(parse_csv_row(header_line, delimiter));
    let mut dataset = Dataset::new(columns);

    for record in records {
        let row = parse_csv_row(record, delimiter)
            .iter()
            .map(|field| Value::parse_cell(field))
            .collect();
        dataset.push_row(row);
    }

    Ok(dataset)
}

/// Load a dataset from an Excel workbook
///
/// Only the first worksheet is read; its first row is the header.
///
/// # Examples
/// ```no_run
/// use instant_analysis::loader::from_excel;
///
/// match from_excel("ventas.xlsx") {
///     Ok(ds) => println!("Loaded {} rows", ds.len()),
///     Err(e) => eprintln!("Error loading Excel: {}", e),
/// }
/// ```
#[cfg(feature = "web")]
pub fn from_excel(filepath: impl AsRef<Path>) -> Result<Dataset> {
    let path = filepath.as_ref();
    let bytes = fs::read(path).map_err(|e| AnalysisError::io(path, e))?;
    from_excel_bytes(&bytes)
}

/// Parse an xlsx/xls workbook held in memory.
#[cfg(feature = "web")]
pub fn from_excel_bytes(bytes: &[u8]) -> Result<Dataset> {
    use calamine::{Reader, open_workbook_auto_from_rs};
    use std::io::Cursor;

    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
        .map_err(|e| AnalysisError::parse(e.to_string()))?;

    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| AnalysisError::parse("No sheets found in Excel file"))?;

    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| AnalysisError::parse(e.to_string()))?;

    let mut rows = range.rows();
    let header = rows.next().ok_or(AnalysisError::EmptyFile)?;
    let columns = normalize_headers(
        header
            .iter()
            .map(|cell| excel_value(cell).label())
            .collect(),
    );

    let mut dataset = Dataset::new(columns);
    for row in rows {
        let values: Vec<Value> = row.iter().map(excel_value).collect();
        if values.iter().all(Value::is_null) {
            continue;
        }
        dataset.push_row(values);
    }

    Ok(dataset)
}

#[cfg(feature = "web")]
fn excel_value(cell: &calamine::Data) -> Value {
    use calamine::Data;

    match cell {
        Data::Int(i) => Value::Int(*i),
        Data::Float(f) => {
            // Whole floats come back from xlsx for integer cells.
            if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
                Value::Int(*f as i64)
            } else {
                Value::Float(*f)
            }
        }
        Data::Bool(b) => Value::Bool(*b),
        Data::String(s) => Value::parse_cell(s),
        Data::DateTime(dt) => excel_serial_to_text(dt.as_f64())
            .map(Value::Text)
            .unwrap_or(Value::Float(dt.as_f64())),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Value::Text(s.clone()),
        Data::Error(_) | Data::Empty => Value::Null,
    }
}

/// Excel stores dates as days since 1899-12-30.
///
/// Serials outside chrono's calendar give `None` and the caller keeps the
/// raw number.
#[cfg(feature = "web")]
fn excel_serial_to_text(serial: f64) -> Option<String> {
    use chrono::{Duration, NaiveDate};

    let seconds = (serial * 86_400.0).round();
    if !seconds.is_finite() || seconds.abs() >= i64::MAX as f64 {
        return None;
    }
    let seconds = seconds as i64;
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let moment = epoch.checked_add_signed(Duration::try_seconds(seconds)?)?;
    if seconds % 86_400 == 0 {
        Some(moment.format("%Y-%m-%d").to_string())
    } else {
        Some(moment.format("%Y-%m-%dT%H:%M:%S").to_string())
    }
}

fn detect_delimiter(header: &str) -> char {
    let commas = header.matches(',').count();
    let semicolons = header.matches(';').count();
    if semicolons > commas { ';' } else { ',' }
}

// Split CSV text into records. A line break inside a quoted field belongs
// to the field, so records are not the same as lines.
fn split_records(text: &str) -> Vec<&str> {
    let mut records = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;

    for (i, c) in text.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            '\n' if !in_quotes => {
                records.push(text[start..i].trim_end_matches('\r'));
                start = i + 1;
            }
            _ => {}
        }
    }
    if start < text.len() {
        records.push(text[start..].trim_end_matches('\r'));
    }
    records
}

// Parse a CSV row into a vector of strings
fn parse_csv_row(line: &str, delimiter: char) -> Vec<String> {
    let mut result = Vec::new();
    let mut current_field = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' => {
                if in_quotes && chars.peek() == Some(&'"') {
                    // Doubled quote inside a quoted field
                    current_field.push('"');
                    chars.next();
                } else {
                    in_quotes = !in_quotes;
                }
            }
            c if c == delimiter && !in_quotes => {
                result.push(std::mem::take(&mut current_field));
            }
            _ => current_field.push(c),
        }
    }

    result.push(current_field);
    result
}

/// Detect file type and load appropriate format
///
/// # Examples
/// ```no_run
/// use instant_analysis::loader::load_dataset;
///
/// match load_dataset("data.csv") {
///     Ok(ds) => println!("Loaded {} columns", ds.columns.len()),
///     Err(e) => eprintln!("Error loading file: {}", e),
/// }
/// ```
pub fn load_dataset(filepath: impl AsRef<Path>) -> Result<Dataset> {
    let path = filepath.as_ref();
    let bytes = fs::read(path).map_err(|e| AnalysisError::io(path, e))?;
    let name = path.to_string_lossy();
    load_bytes(&name, &bytes)
}

/// Load an uploaded file, picking the parser from the file name.
pub fn load_bytes(filename: &str, bytes: &[u8]) -> Result<Dataset> {
    if bytes.is_empty() {
        return Err(AnalysisError::EmptyFile);
    }

    match file_extension(filename).as_deref() {
        Some("csv") => from_csv_bytes(bytes),
        #[cfg(feature = "web")]
        Some("xlsx") | Some("xls") => from_excel_bytes(bytes),
        #[cfg(not(feature = "web"))]
        Some("xlsx") | Some("xls") => Err(AnalysisError::UnsupportedFormat(
            "Excel support requires the 'web' feature".into(),
        )),
        Some(ext) => Err(AnalysisError::UnsupportedFormat(ext.to_string())),
        None => Err(AnalysisError::MissingExtension),
    }
}

/// Lower-cased extension of a file name, if any.
pub fn file_extension(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
}
