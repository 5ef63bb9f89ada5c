#![cfg(not(tarpaulin_include))]
use clap::Parser;
use instant_analysis::aggregate::{ChartRequest, aggregate_for_chart};
use instant_analysis::chart::ChartState;
use instant_analysis::loader::{load_bytes, load_dataset};
use instant_analysis::render::{RenderOptions, render_png};
use instant_analysis::suggest::{HeuristicEngine, SuggestionEngine};
use instant_analysis::summary::summarize;
use std::path::PathBuf;

const SAMPLE: &str = "Región,Ventas,Fecha,Unidades
Centro,3000,2024-01-01,30
Norte,2500,2024-02-01,21
Sur,1500,2024-03-01,17
Centro,1200,2024-04-01,11
Norte,900,2024-05-01,8
";

/// Render every suggested chart for a table to PNG files.
#[derive(Parser, Debug)]
#[command(name = "chart_preview", version, about, long_about = None)]
struct Args {
    /// CSV or Excel file; a small sales table is used when omitted
    input: Option<PathBuf>,

    /// Directory the images are written to
    #[arg(short, long, default_value = "chart_output")]
    output: PathBuf,

    #[arg(long, default_value_t = 800)]
    width: u32,

    #[arg(long, default_value_t = 600)]
    height: u32,

    #[arg(long, default_value_t = 6)]
    max_suggestions: usize,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let dataset = match &args.input {
        Some(path) => load_dataset(path)?,
        None => load_bytes("ventas.csv", SAMPLE.as_bytes())?,
    };
    let summary = summarize(&dataset);
    let engine = HeuristicEngine {
        max_suggestions: args.max_suggestions,
    };
    let suggestions = engine.suggest(&summary)?;

    std::fs::create_dir_all(&args.output)?;
    for (i, suggestion) in suggestions.iter().enumerate() {
        let request = ChartRequest::new(
            suggestion.parameters.clone(),
            Some(suggestion.chart_type.as_str()),
        );
        let data = aggregate_for_chart(&dataset, &request);
        let state = ChartState::from_result(&request, data.as_ref())
            .with_text(Some(suggestion.title.clone()), Some(suggestion.insight.clone()));

        let view = match state {
            ChartState::Ready(view) => view,
            ChartState::NoData { message } | ChartState::Error { message } => {
                log::warn!("skipping '{}': {}", suggestion.title, message);
                continue;
            }
        };
        if let Some(warning) = &view.warning {
            log::warn!("{}", warning);
        }

        let options = RenderOptions {
            width: args.width,
            height: args.height,
            ..RenderOptions::default()
        };
        let png = render_png(&view, &options)?;
        let path = args
            .output
            .join(format!("{:02}_{}.png", i + 1, suggestion.chart_type));
        std::fs::write(&path, png)?;
        println!("Created {} chart at {}", suggestion.chart_type, path.display());
    }

    Ok(())
}
