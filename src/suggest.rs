use crate::error::{AnalysisError, Result};
use crate::summary::DataFrameSummary;
use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// Field bindings used to materialize a chart, e.g. `{"x_axis": "Región",
/// "y_axis": "Ventas"}`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChartParameters {
    pub x_axis: String,
    #[serde(default)]
    pub y_axis: Option<String>,
    /// Optional grouping column; each distinct value becomes a series.
    #[serde(default)]
    pub hue: Option<String>,
    /// Aggregation name: sum, mean, count, min, max, median.
    #[serde(default)]
    pub agg_func: Option<String>,
}

impl ChartParameters {
    pub fn new(x_axis: impl Into<String>) -> Self {
        ChartParameters {
            x_axis: x_axis.into(),
            ..Default::default()
        }
    }

    pub fn with_y(mut self, y_axis: impl Into<String>) -> Self {
        self.y_axis = Some(y_axis.into());
        self
    }

    pub fn with_agg(mut self, agg_func: impl Into<String>) -> Self {
        self.agg_func = Some(agg_func.into());
        self
    }

    pub fn with_hue(mut self, hue: impl Into<String>) -> Self {
        self.hue = Some(hue.into());
        self
    }
}

/// A proposed chart: what to draw and why it is worth looking at.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChartSuggestion {
    pub title: String,
    /// bar, line, pie, scatter, ...
    pub chart_type: String,
    pub parameters: ChartParameters,
    pub insight: String,
}

impl ChartSuggestion {
    pub fn new(
        title: impl Into<String>,
        chart_type: impl Into<String>,
        parameters: ChartParameters,
        insight: impl Into<String>,
    ) -> Self {
        ChartSuggestion {
            title: title.into(),
            chart_type: chart_type.into(),
            parameters,
            insight: insight.into(),
        }
    }

    /// Reject suggestions missing the fields a chart needs.
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(AnalysisError::InvalidSuggestion("empty title".into()));
        }
        if self.chart_type.trim().is_empty() {
            return Err(AnalysisError::InvalidSuggestion(format!(
                "'{}' has no chart type",
                self.title
            )));
        }
        if self.parameters.x_axis.trim().is_empty() {
            return Err(AnalysisError::InvalidSuggestion(format!(
                "'{}' has no x axis",
                self.title
            )));
        }
        Ok(())
    }

    /// True when every column the suggestion binds exists in the summary.
    pub fn fits(&self, summary: &DataFrameSummary) -> bool {
        let p = &self.parameters;
        std::iter::once(Some(&p.x_axis))
            .chain([p.y_axis.as_ref(), p.hue.as_ref()])
            .flatten()
            .all(|col| summary.columns.contains(col))
    }
}

/// Anything able to turn a table summary into chart suggestions.
pub trait SuggestionEngine: Send + Sync {
    fn suggest(&self, summary: &DataFrameSummary) -> Result<Vec<ChartSuggestion>>;
}

/// Rule-based suggestions derived from column types.
#[derive(Clone, Debug)]
pub struct HeuristicEngine {
    pub max_suggestions: usize,
}

impl Default for HeuristicEngine {
    fn default() -> Self {
        HeuristicEngine { max_suggestions: 6 }
    }
}

/// Categories above this count make a pie chart unreadable.
const PIE_MAX_CATEGORIES: u64 = 8;

impl SuggestionEngine for HeuristicEngine {
    fn suggest(&self, summary: &DataFrameSummary) -> Result<Vec<ChartSuggestion>> {
        let numeric: Vec<&String> = summary
            .columns
            .iter()
            .filter(|c| summary.is_numeric(c))
            .collect();
        let categorical: Vec<&String> = summary
            .columns
            .iter()
            .filter(|c| summary.is_categorical(c))
            .collect();
        let dates: Vec<&String> = summary
            .columns
            .iter()
            .filter(|c| summary.is_datetime(c))
            .collect();

        let mut out = Vec::new();

        if let (Some(cat), Some(num)) = (categorical.first(), numeric.first()) {
            let unique = summary.unique_count(cat).unwrap_or(0);
            out.push(ChartSuggestion::new(
                format!("{} por {}", num, cat),
                "bar",
                ChartParameters::new(cat.as_str()).with_y(num.as_str()).with_agg("sum"),
                format!(
                    "Compara el total de {} entre las {} categorías de {}.",
                    num, unique, cat
                ),
            ));
            if unique > 0 && unique <= PIE_MAX_CATEGORIES {
                out.push(ChartSuggestion::new(
                    format!("Distribución de {} por {}", num, cat),
                    "pie",
                    ChartParameters::new(cat.as_str()).with_y(num.as_str()).with_agg("sum"),
                    format!("Muestra qué parte del total de {} aporta cada {}.", num, cat),
                ));
            }
        }

        if let (Some(date), Some(num)) = (dates.first(), numeric.first()) {
            out.push(ChartSuggestion::new(
                format!("Tendencia de {}", num),
                "line",
                ChartParameters::new(date.as_str()).with_y(num.as_str()).with_agg("sum"),
                format!("Evolución de {} a lo largo de {}.", num, date),
            ));
        }

        if numeric.len() >= 2 {
            let (a, b) = (numeric[0], numeric[1]);
            out.push(ChartSuggestion::new(
                format!("{} vs {}", a, b),
                "scatter",
                ChartParameters::new(a.as_str()).with_y(b.as_str()),
                format!("Revela si existe relación entre {} y {}.", a, b),
            ));
        }

        if let Some(num) = numeric.first() {
            out.push(ChartSuggestion::new(
                format!("Distribución de {}", num),
                "histogram",
                ChartParameters::new(num.as_str()),
                numeric_insight(summary, num),
            ));
        }

        if numeric.is_empty() {
            for cat in categorical.iter().take(2) {
                out.push(ChartSuggestion::new(
                    format!("Conteo por {}", cat),
                    "bar",
                    ChartParameters::new(cat.as_str()).with_agg("count"),
                    format!("Número de registros para cada valor de {}.", cat),
                ));
            }
        }

        if out.is_empty() {
            log::info!("no chartable columns found, returning sample suggestions");
            return Ok(sample_suggestions());
        }

        out.truncate(self.max_suggestions);
        Ok(out)
    }
}

fn numeric_insight(summary: &DataFrameSummary, column: &str) -> String {
    let stats = summary.describe.get(column);
    let field = |key: &str| stats.and_then(|s| s.get(key)).and_then(|v| v.as_f64());
    match (field("min"), field("max"), field("mean")) {
        (Some(min), Some(max), Some(mean)) => format!(
            "{} va de {} a {}, con una media de {:.2}.",
            column, min, max, mean
        ),
        _ => format!("Cómo se reparten los valores de {}.", column),
    }
}

/// Demonstration suggestions for a sales table.
pub fn sample_suggestions() -> Vec<ChartSuggestion> {
    vec![
        ChartSuggestion::new(
            "Ventas por Región",
            "bar",
            ChartParameters::new("Región").with_y("Ventas"),
            "La región Centro presenta el mayor volumen de ventas.",
        ),
        ChartSuggestion::new(
            "Tendencia de ventas",
            "line",
            ChartParameters::new("Fecha").with_y("Ventas"),
            "Las ventas van en aumento durante el año.",
        ),
        ChartSuggestion::new(
            "Ventas totales",
            "pie",
            ChartParameters::new("Región").with_y("Ventas"),
            "La mayor proporción corresponde a la región Norte.",
        ),
    ]
}

/// Build a prompt asking a language model for chart suggestions.
pub fn build_prompt(summary: &DataFrameSummary) -> String {
    let mut prompt = String::new();
    let _ = writeln!(
        prompt,
        "You are a data analyst. Suggest charts for a table with these columns:"
    );
    for column in &summary.columns {
        let dtype = summary.dtype(column).unwrap_or("object");
        let stats = summary
            .describe
            .get(column)
            .map(|s| s.to_string())
            .unwrap_or_default();
        let _ = writeln!(prompt, "- {} ({}): {}", column, dtype, stats);
    }
    let _ = writeln!(prompt);
    let _ = writeln!(prompt, "{}", summary.info.trim_end());
    let _ = writeln!(prompt);
    let _ = write!(
        prompt,
        "Answer with a JSON array only. Each element must have the keys \
         \"title\", \"chart_type\" (bar, line, pie, donut, scatter, area, histogram, \
         radar, radialbar or composed), \"parameters\" (with \"x_axis\" and optionally \
         \"y_axis\", \"hue\", \"agg_func\") and \"insight\". Use only the column names listed above."
    );
    prompt
}

/// Extract suggestions from a model reply.
///
/// The reply may wrap the JSON array in prose or a code fence; the outermost
/// `[...]` is parsed. Entries that fail validation are dropped.
pub fn parse_suggestions(reply: &str) -> Result<Vec<ChartSuggestion>> {
    let start = reply
        .find('[')
        .ok_or_else(|| AnalysisError::parse("reply contains no JSON array"))?;
    let end = reply
        .rfind(']')
        .filter(|end| *end > start)
        .ok_or_else(|| AnalysisError::parse("reply contains an unterminated JSON array"))?;

    let raw: Vec<serde_json::Value> = serde_json::from_str(&reply[start..=end])?;
    let suggestions = raw
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<ChartSuggestion>(item) {
            Ok(s) => match s.validate() {
                Ok(()) => Some(s),
                Err(e) => {
                    log::warn!("dropping suggestion: {}", e);
                    None
                }
            },
            Err(e) => {
                log::warn!("dropping malformed suggestion: {}", e);
                None
            }
        })
        .collect();
    Ok(suggestions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::from_csv_bytes;
    use crate::summary::summarize;

    fn sales_summary() -> DataFrameSummary {
        let ds = from_csv_bytes(
            "Región,Ventas,Fecha,Unidades\n\
             Centro,3000,2024-01-01,10\n\
             Norte,2500,2024-02-01,8\n\
             Sur,1500,2024-03-01,5\n"
                .as_bytes(),
        )
        .unwrap();
        summarize(&ds)
    }

    #[test]
    fn heuristics_cover_the_column_mix() {
        let suggestions = HeuristicEngine::default().suggest(&sales_summary()).unwrap();
        let kinds: Vec<&str> = suggestions.iter().map(|s| s.chart_type.as_str()).collect();
        assert_eq!(kinds, vec!["bar", "pie", "line", "scatter", "histogram"]);

        let bar = &suggestions[0];
        assert_eq!(bar.title, "Ventas por Región");
        assert_eq!(bar.parameters.x_axis, "Región");
        assert_eq!(bar.parameters.y_axis.as_deref(), Some("Ventas"));
        assert_eq!(bar.parameters.agg_func.as_deref(), Some("sum"));
        assert!(suggestions.iter().all(|s| s.fits(&sales_summary())));
    }

    #[test]
    fn suggestions_are_capped() {
        let engine = HeuristicEngine { max_suggestions: 2 };
        assert_eq!(engine.suggest(&sales_summary()).unwrap().len(), 2);
    }

    #[test]
    fn text_only_tables_get_count_charts() {
        let ds = from_csv_bytes(b"ciudad\nLima\nQuito\n").unwrap();
        let suggestions = HeuristicEngine::default().suggest(&summarize(&ds)).unwrap();
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].parameters.agg_func.as_deref(), Some("count"));
        assert!(suggestions[0].parameters.y_axis.is_none());
    }

    #[test]
    fn empty_summary_falls_back_to_samples() {
        let suggestions = HeuristicEngine::default()
            .suggest(&DataFrameSummary::default())
            .unwrap();
        assert_eq!(suggestions, sample_suggestions());
    }

    #[test]
    fn prompt_mentions_columns_and_format() {
        let prompt = build_prompt(&sales_summary());
        assert!(prompt.contains("- Ventas (int64)"));
        assert!(prompt.contains("\"chart_type\""));
    }

    #[test]
    fn parse_reply_inside_code_fence() {
        let reply = "Here you go:\n```json\n[\
            {\"title\": \"Ventas\", \"chart_type\": \"bar\", \
             \"parameters\": {\"x_axis\": \"Región\", \"y_axis\": \"Ventas\"}, \
             \"insight\": \"Centro lidera.\"},\
            {\"title\": \"\", \"chart_type\": \"bar\", \
             \"parameters\": {\"x_axis\": \"Región\"}, \"insight\": \"x\"},\
            {\"oops\": true}\
        ]\n```";
        let parsed = parse_suggestions(reply).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].parameters.hue, None);
    }

    #[test]
    fn parse_reply_without_array_fails() {
        assert!(parse_suggestions("no charts today").is_err());
        assert!(parse_suggestions("] backwards [").is_err());
    }
}
