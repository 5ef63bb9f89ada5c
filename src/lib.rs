/*!
# Instant Analysis

Upload a CSV or Excel table and get a set of charts that are worth looking at,
built in Rust.

## Overview

A file goes through a short pipeline: it is parsed into a [`dataset::Dataset`],
summarised the way a dataframe library would describe it, handed to a
suggestion engine that proposes charts, and each chosen chart is aggregated
and resolved into a render-ready view. Views can be returned as JSON for a
browser client or drawn to PNG on the server.

## Architecture

### Data Layer
- **loader**: CSV (comma or semicolon, quoted fields, BOM) and Excel reading
- **dataset**: typed cell values, header normalisation
- **summary**: dtypes, `describe` statistics and an `info` report per column

### Analysis Layer
- **suggest**: chart suggestions from column types, plus prompt building and
  reply parsing for language-model engines behind the `SuggestionEngine` trait
- **aggregate**: group-by with sum, mean, count, min, max and median; hue
  pivots, scatter points and histogram bins
- **chart**: axis resolution, the 15-row display window, currency formatting,
  palette colours and the per-type extras (pie labels, donut centre, scatter
  tooltips)

### Persistence Layer
- **store**: uploaded files by id, with cached chart data
- **dashboard**: saved charts, persisted with gzip compression and bincode
- **downloader**: chart data export to CSV and XLSX

### Web Layer (feature `web`)
- **render**: PNG images with plotters
- **config**: command line and environment settings
- **app**: routing, error responses and the server loop

## REST API Endpoints

- `POST /upload`, `POST /analyze` - Parse an upload, summarise it, suggest charts
- `POST /suggest` - Suggestions for a summary
- `POST /chart-data`, `/chart-view`, `/chart-image` - Aggregated data, resolved view, PNG
- `POST /chart-data/export?format=csv|xlsx` - Download chart data
- `GET /files`, `DELETE /files/{id}` - Uploaded files
- `GET|POST /dashboard`, `DELETE /dashboard/{index}` - Saved charts
- `GET /dashboard/export`, `POST /dashboard/import` - Dashboard snapshots
*/

pub mod aggregate;
pub mod chart;
pub mod dashboard;
pub mod dataset;
pub mod downloader;
pub mod error;
pub mod loader;
pub mod store;
pub mod suggest;
pub mod summary;

#[cfg(feature = "web")]
pub mod app;
#[cfg(feature = "web")]
pub mod config;
#[cfg(feature = "web")]
pub mod render;

pub use error::{AnalysisError, Result};
