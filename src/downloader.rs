use crate::aggregate::ChartData;
use crate::error::{AnalysisError, Result};

/// Convert chart data to CSV format
///
/// The header row is `columns`; each record contributes one line with its
/// values in column order. Fields containing commas, quotes or newlines are
/// quoted, with inner quotes doubled.
///
/// # Examples
/// ```
/// use instant_analysis::aggregate::ChartData;
/// use instant_analysis::downloader::to_csv;
///
/// let data = ChartData { data: vec![], columns: vec!["Región".into(), "Ventas".into()] };
/// assert_eq!(to_csv(&data), "Región,Ventas\n");
/// ```
pub fn to_csv(chart: &ChartData) -> String {
    let mut csv_content = String::new();

    let header: Vec<String> = chart.columns.iter().map(|c| escape_field(c)).collect();
    csv_content.push_str(&header.join(","));
    csv_content.push('\n');

    for record in &chart.data {
        let line: Vec<String> = chart
            .columns
            .iter()
            .map(|col| escape_field(&cell_text(record.get(col))))
            .collect();
        csv_content.push_str(&line.join(","));
        csv_content.push('\n');
    }

    csv_content
}

fn escape_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn cell_text(value: Option<&serde_json::Value>) -> String {
    match value {
        None | Some(serde_json::Value::Null) => String::new(),
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Convert chart data to XLSX format
///
/// Numbers are written as numeric cells, booleans as booleans and
/// everything else as text, below a header row.
///
/// # Examples
/// ```
/// use instant_analysis::aggregate::ChartData;
/// use instant_analysis::downloader::to_xlsx;
///
/// let data = ChartData { data: vec![], columns: vec!["x".into()] };
/// let bytes = to_xlsx(&data).unwrap();
/// assert_eq!(&bytes[..2], b"PK");
/// ```
pub fn to_xlsx(chart: &ChartData) -> Result<Vec<u8>> {
    use rust_xlsxwriter::{Format, Workbook};

    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    let bold = Format::new().set_bold();
    let export_err = |e: rust_xlsxwriter::XlsxError| AnalysisError::Export(e.to_string());

    for (c, name) in chart.columns.iter().enumerate() {
        worksheet
            .write_string_with_format(0, c as u16, name, &bold)
            .map_err(export_err)?;
    }

    for (r, record) in chart.data.iter().enumerate() {
        let row = (r + 1) as u32;
        for (c, name) in chart.columns.iter().enumerate() {
            let col = c as u16;
            match record.get(name) {
                None | Some(serde_json::Value::Null) => {}
                Some(serde_json::Value::Number(n)) => {
                    if let Some(f) = n.as_f64() {
                        worksheet.write_number(row, col, f).map_err(export_err)?;
                    }
                }
                Some(serde_json::Value::Bool(b)) => {
                    worksheet.write_boolean(row, col, *b).map_err(export_err)?;
                }
                Some(other) => {
                    worksheet
                        .write_string(row, col, cell_text(Some(other)))
                        .map_err(export_err)?;
                }
            }
        }
    }

    workbook.save_to_buffer().map_err(export_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn chart() -> ChartData {
        ChartData {
            data: vec![
                json!({"Región": "Centro, CDMX", "Ventas": 3000}),
                json!({"Región": "Sur \"A\"", "Ventas": 1500.5}),
                json!({"Región": "Norte"}),
            ]
            .into_iter()
            .map(|v| v.as_object().unwrap().clone())
            .collect(),
            columns: vec!["Región".into(), "Ventas".into()],
        }
    }

    #[test]
    fn csv_escapes_and_keeps_column_order() {
        assert_eq!(
            to_csv(&chart()),
            "Región,Ventas\n\"Centro, CDMX\",3000\n\"Sur \"\"A\"\"\",1500.5\nNorte,\n"
        );
    }

    #[test]
    fn xlsx_is_a_zip_archive() {
        let bytes = to_xlsx(&chart()).unwrap();
        assert!(bytes.len() > 100);
        assert_eq!(&bytes[..2], b"PK");
    }
}
