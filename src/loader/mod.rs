//! CSV loader: uploaded bytes → dated rows with raw amount text.

use crate::cleaner::{decode_text, join_aliases, parse_date, resolve_column};
use crate::config::{ColumnConfig, LoaderConfig, MissingColumnPolicy};
use crate::error::{ForecastError, Result};
use crate::models::{ColumnMatch, RawRecord, RawRow, SkipCounts};
use tracing::{debug, info, warn};

pub struct SeriesLoader<'a> {
    columns: &'a ColumnConfig,
    loader: &'a LoaderConfig,
}

impl<'a> SeriesLoader<'a> {
    pub fn new(columns: &'a ColumnConfig, loader: &'a LoaderConfig) -> Self {
        Self { columns, loader }
    }

    /// Parse a CSV upload into dated rows.
    ///
    /// Rows with a missing or unparseable date are skipped and counted; the
    /// amount cell is kept as text for the normalizer.
    pub fn load(&self, bytes: &[u8]) -> Result<RawRecord> {
        let text = decode_text(bytes);

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(text.as_bytes());

        let headers = reader.headers()?.clone();
        let header_names: Vec<&str> = headers.iter().collect();
        let (columns, date_idx, amount_idx) = self.match_columns(&header_names)?;

        let mut rows = Vec::new();
        let mut skipped = SkipCounts::default();
        let mut total_rows = 0usize;

        for (i, result) in reader.records().enumerate() {
            let line = i + 1;
            total_rows += 1;

            let record = match result {
                Ok(r) => r,
                Err(e) => {
                    warn!("Row {}: {}", line, e);
                    skipped.malformed += 1;
                    continue;
                }
            };

            let raw_date = record.get(date_idx).unwrap_or_default();
            let Some(date) = parse_date(raw_date, &self.loader.date_formats) else {
                debug!("Row {}: unparseable date {:?}, skipped", line, raw_date);
                skipped.bad_date += 1;
                continue;
            };

            rows.push(RawRow {
                line,
                date,
                value: record.get(amount_idx).unwrap_or_default().to_string(),
            });
        }

        if rows.is_empty() {
            return Err(ForecastError::EmptyDataset { total: total_rows });
        }

        info!(
            "Loaded {} of {} rows ({} bad dates, {} malformed)",
            rows.len(),
            total_rows,
            skipped.bad_date,
            skipped.malformed
        );

        Ok(RawRecord {
            rows,
            columns,
            skipped,
            total_rows,
        })
    }

    fn match_columns(&self, headers: &[&str]) -> Result<(ColumnMatch, usize, usize)> {
        let required = |role: &'static str, aliases: &[String]| {
            resolve_column(headers, aliases).ok_or_else(|| ForecastError::Schema {
                role,
                aliases: join_aliases(aliases),
            })
        };
        let date_idx = required("date", &self.columns.date)?;
        let amount_idx = required("amount", &self.columns.amount)?;

        let optional = |aliases: &[String]| {
            resolve_column(headers, aliases).map(|i| headers[i].to_string())
        };
        let columns = ColumnMatch {
            date: headers[date_idx].to_string(),
            amount: headers[amount_idx].to_string(),
            quantity: optional(&self.columns.quantity),
            cost: optional(&self.columns.cost),
        };

        if columns.quantity.is_none() && columns.cost.is_none() {
            match self.columns.missing_optional {
                MissingColumnPolicy::Degrade => {
                    warn!("Both quantity and cost columns are missing; continuing with sales only")
                }
                MissingColumnPolicy::Reject => {
                    let mut tried = self.columns.quantity.clone();
                    tried.extend(self.columns.cost.iter().cloned());
                    return Err(ForecastError::Schema {
                        role: "quantity/cost",
                        aliases: join_aliases(&tried),
                    });
                }
            }
        }

        if !columns.has_profit_columns() {
            debug!("Profit columns incomplete: qty={:?} cost={:?}", columns.quantity, columns.cost);
        }
        debug!(
            "Columns: date={:?} amount={:?} qty={:?} cost={:?}",
            columns.date, columns.amount, columns.quantity, columns.cost
        );
        Ok((columns, date_idx, amount_idx))
    }
}
