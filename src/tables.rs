//!
//! tabularium table model
//! ----------------------
//! `Table` wraps a Polars DataFrame and exposes only the coarse shape the
//! orchestrator is allowed to see: row/column counts and a per-column kind
//! (numeric / categorical / temporal). `ParsedTables` is the parser result,
//! either a single table or an ordered list of named sheets. `AutoParser` is
//! the shipped `TabularParser`: CSV and Parquet decoding dispatched on the
//! declared file name. The spreadsheet binary format itself stays an external
//! collaborator behind the same trait.

use std::io::Cursor;

use anyhow::{anyhow, Context, Result};
use polars::prelude::*;
use serde::Serialize;

use crate::sources::TabularParser;

/// Coarse column classification; the only thing the core may know about a
/// column's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Numeric,
    Categorical,
    Temporal,
}

fn kind_of(dt: &DataType) -> ColumnKind {
    match dt {
        DataType::Date | DataType::Datetime(_, _) | DataType::Time | DataType::Duration(_) => {
            ColumnKind::Temporal
        }
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64
        | DataType::Float32
        | DataType::Float64 => ColumnKind::Numeric,
        _ => ColumnKind::Categorical,
    }
}

/// Per-column profile entry. Mean/median/std are filled for numeric columns
/// only, delegated to the dataframe values.
#[derive(Debug, Clone, Serialize)]
pub struct ColumnProfile {
    pub name: String,
    pub kind: ColumnKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub median: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub std: Option<f64>,
}

/// Shape summary of one table: dimensions plus per-column profiles.
#[derive(Debug, Clone, Serialize)]
pub struct TableProfile {
    pub rows: usize,
    pub cols: usize,
    pub columns: Vec<ColumnProfile>,
}

/// Opaque rectangular data. The frame itself is reachable for presentation
/// layers; the core only ever reads counts and kinds.
#[derive(Debug, Clone)]
pub struct Table {
    df: DataFrame,
}

impl Table {
    pub fn new(df: DataFrame) -> Self {
        Self { df }
    }

    pub fn rows(&self) -> usize {
        self.df.height()
    }

    pub fn cols(&self) -> usize {
        self.df.width()
    }

    /// Handle to the underlying frame for the presentation layer.
    pub fn frame(&self) -> &DataFrame {
        &self.df
    }

    pub fn column_kinds(&self) -> Vec<(String, ColumnKind)> {
        self.df
            .get_columns()
            .iter()
            .map(|c| (c.name().to_string(), kind_of(c.dtype())))
            .collect()
    }

    pub fn profile(&self) -> TableProfile {
        let mut columns = Vec::with_capacity(self.df.width());
        for col in self.df.get_columns() {
            let kind = kind_of(col.dtype());
            let summary = if kind == ColumnKind::Numeric {
                numeric_summary(col.as_materialized_series())
            } else {
                None
            };
            let (mean, median, std) = match summary {
                Some((m, md, sd)) => (Some(m), Some(md), Some(sd)),
                None => (None, None, None),
            };
            columns.push(ColumnProfile { name: col.name().to_string(), kind, mean, median, std });
        }
        TableProfile { rows: self.rows(), cols: self.cols(), columns }
    }
}

// Mean/median/std over the non-null values of a numeric series, cast to f64.
fn numeric_summary(s: &Series) -> Option<(f64, f64, f64)> {
    let cast = s.cast(&DataType::Float64).ok()?;
    let ca = cast.f64().ok()?;
    let mean = ca.mean()?;
    let mut vals: Vec<f64> = ca.into_no_null_iter().collect();
    if vals.is_empty() {
        return None;
    }
    vals.sort_by(|a, b| a.total_cmp(b));
    let mid = vals.len() / 2;
    let median = if vals.len() % 2 == 0 { (vals[mid - 1] + vals[mid]) / 2.0 } else { vals[mid] };
    let var = vals.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / vals.len() as f64;
    Some((mean, median, var.sqrt()))
}

/// Parser output: one table, or named sheets in the parser's reported order.
#[derive(Debug, Clone)]
pub enum ParsedTables {
    Single(Table),
    Sheets(Vec<(String, Table)>),
}

impl ParsedTables {
    pub fn table_count(&self) -> usize {
        match self {
            ParsedTables::Single(_) => 1,
            ParsedTables::Sheets(sheets) => sheets.len(),
        }
    }

    pub fn sheet_names(&self) -> Vec<&str> {
        match self {
            ParsedTables::Single(_) => Vec::new(),
            ParsedTables::Sheets(sheets) => sheets.iter().map(|(n, _)| n.as_str()).collect(),
        }
    }
}

/// Shipped parser: dispatches on the declared name's extension. CSV and
/// Parquet both decode to a single table; other formats are rejected.
#[derive(Debug, Default)]
pub struct AutoParser;

impl TabularParser for AutoParser {
    fn parse(&self, bytes: &[u8], declared_name: &str) -> Result<ParsedTables> {
        let lower = declared_name.to_ascii_lowercase();
        if lower.ends_with(".csv") {
            let df = CsvReadOptions::default()
                .with_has_header(true)
                .into_reader_with_file_handle(Cursor::new(bytes.to_vec()))
                .finish()
                .with_context(|| format!("decoding csv content of '{}'", declared_name))?;
            Ok(ParsedTables::Single(Table::new(df)))
        } else if lower.ends_with(".parquet") {
            let df = ParquetReader::new(Cursor::new(bytes.to_vec()))
                .finish()
                .with_context(|| format!("decoding parquet content of '{}'", declared_name))?;
            Ok(ParsedTables::Single(Table::new(df)))
        } else {
            Err(anyhow!("unsupported table format: '{}'", declared_name))
        }
    }
}
