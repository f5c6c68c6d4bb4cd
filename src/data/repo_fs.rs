//! Filesystem-backed loader for delimited text tables.
//!
//! Source files come from several exports with different encodings, so each
//! file is decoded under an ordered list of encodings until one both decodes
//! and parses as a rectangular table.

use std::fs;
use std::path::Path;

use csv::{ReaderBuilder, Trim};
use tracing::{debug, info};

use crate::common::config::DataCfg;
use crate::common::error::{PricingError, PricingResult};

use super::domain::{RawTable, TableRepo, TextEncoding};

/// Reads tables from the local filesystem with encoding fallback.
pub struct FsTableRepo {
    encodings: Vec<TextEncoding>,
    delimiter: u8,
}

impl FsTableRepo {
    pub fn new(cfg: &DataCfg) -> Self {
        Self {
            encodings: cfg.encodings.clone(),
            delimiter: cfg.delimiter,
        }
    }

    fn parse(&self, text: &str) -> Result<RawTable, csv::Error> {
        let mut reader = ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(true)
            .trim(Trim::All)
            .from_reader(text.as_bytes());
        let headers = reader.headers()?.iter().map(str::to_string).collect();
        let records = reader
            .records()
            .map(|rec| rec.map(|r| r.iter().map(str::to_string).collect()))
            .collect::<Result<Vec<Vec<String>>, _>>()?;
        Ok(RawTable { headers, records })
    }
}

impl TableRepo for FsTableRepo {
    fn load_table(&self, path: &Path) -> PricingResult<RawTable> {
        let bytes = fs::read(path).map_err(|err| PricingError::DataLoad {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;

        for encoding in &self.encodings {
            let Some(text) = encoding.decode(&bytes) else {
                debug!(path = %path.display(), %encoding, "decode failed");
                continue;
            };
            match self.parse(&text) {
                Ok(table) => {
                    info!(
                        path = %path.display(),
                        %encoding,
                        rows = table.len(),
                        columns = table.headers.len(),
                        "table loaded"
                    );
                    return Ok(table);
                }
                Err(err) => {
                    debug!(path = %path.display(), %encoding, error = %err, "parse failed");
                }
            }
        }

        let tried: Vec<&str> = self.encodings.iter().map(|e| e.label()).collect();
        Err(PricingError::DataLoad {
            path: path.to_path_buf(),
            reason: format!("no encoding succeeded (tried {})", tried.join(", ")),
        })
    }
}
