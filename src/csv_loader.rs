// CSV loading: turns the uploaded file into `Row` records.
//
// The file must have a header row containing `Category 1`, `Category 2`
// and `Plu`. Header matching ignores case and surrounding whitespace;
// other columns are ignored.

use crate::error::{ImportError, Result};
use csv::StringRecord;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

pub const CATEGORY_1_COLUMN: &str = "Category 1";
pub const CATEGORY_2_COLUMN: &str = "Category 2";
pub const PLU_COLUMN: &str = "Plu";

/// Example file handed out by the `template` command.
pub const TEMPLATE_CSV: &str = "\
Category 1,Category 2,Plu
Food,Burgers,BURG-001
Food,Burgers,BURG-002
Food,Sides,FRIES-01
Drinks,Soft Drinks,COLA-330
Drinks,Soft Drinks,LEMON-330
Drinks,Hot Drinks,COFFEE-01
";

/// One line of the CSV. All fields are trimmed and non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub category1: String,
    pub category2: String,
    pub plu: String,
}

impl Row {
    pub fn new(category1: &str, category2: &str, plu: &str) -> Self {
        Row {
            category1: category1.to_string(),
            category2: category2.to_string(),
            plu: plu.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LoadOptions {
    /// When false, a row with an empty required field fails the load.
    pub skip_incomplete_rows: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        LoadOptions {
            skip_incomplete_rows: true,
        }
    }
}

/// Column positions of the required fields.
struct Columns {
    category1: usize,
    category2: usize,
    plu: usize,
}

impl Columns {
    fn resolve(headers: &StringRecord) -> Result<Self> {
        let find = |name: &str| {
            headers.iter().position(|h| {
                h.trim_start_matches('\u{feff}')
                    .trim()
                    .eq_ignore_ascii_case(name)
            })
        };

        let category1 = find(CATEGORY_1_COLUMN);
        let category2 = find(CATEGORY_2_COLUMN);
        let plu = find(PLU_COLUMN);

        match (category1, category2, plu) {
            (Some(category1), Some(category2), Some(plu)) => Ok(Columns {
                category1,
                category2,
                plu,
            }),
            _ => {
                let missing: Vec<&str> = [
                    (CATEGORY_1_COLUMN, category1),
                    (CATEGORY_2_COLUMN, category2),
                    (PLU_COLUMN, plu),
                ]
                .iter()
                .filter(|(_, idx)| idx.is_none())
                .map(|(name, _)| *name)
                .collect();
                Err(ImportError::Parse(format!(
                    "missing required column(s): {}",
                    missing.join(", ")
                )))
            }
        }
    }
}

/// Parse rows from any reader, in file order.
pub fn load_rows<R: Read>(reader: R, options: LoadOptions) -> Result<Vec<Row>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = reader
        .headers()
        .map_err(|e| ImportError::Parse(format!("failed to read header row: {}", e)))?
        .clone();
    let columns = Columns::resolve(&headers)?;

    let mut rows = Vec::new();
    let mut skipped = 0usize;
    for (idx, record) in reader.records().enumerate() {
        // records() starts after the header, lines are 1-based
        let line = idx + 2;
        let record = record.map_err(|e| ImportError::Parse(format!("line {}: {}", line, e)))?;

        let field = |i: usize| record.get(i).map(str::trim).unwrap_or("");
        let (category1, category2, plu) = (
            field(columns.category1),
            field(columns.category2),
            field(columns.plu),
        );

        if category1.is_empty() || category2.is_empty() || plu.is_empty() {
            if options.skip_incomplete_rows {
                skipped += 1;
                tracing::debug!(line, "skipping row with empty required field");
                continue;
            }
            return Err(ImportError::Parse(format!(
                "line {}: '{}', '{}' and '{}' must all be filled in",
                line, CATEGORY_1_COLUMN, CATEGORY_2_COLUMN, PLU_COLUMN
            )));
        }

        rows.push(Row::new(category1, category2, plu));
    }

    if skipped > 0 {
        tracing::info!(skipped, "skipped incomplete CSV rows");
    }
    Ok(rows)
}

pub fn load_path(path: &Path, options: LoadOptions) -> Result<Vec<Row>> {
    let file = File::open(path)?;
    load_rows(file, options)
}

/// Where the CSV for a run comes from.
///
/// Stdin is copied into a temporary file first, which is removed when the
/// source is dropped, whether or not the import succeeded.
pub enum CsvSource {
    File(PathBuf),
    Spooled(NamedTempFile),
}

impl CsvSource {
    /// `-` means standard input.
    pub fn open(arg: &str) -> Result<Self> {
        if arg == "-" {
            Self::spool(io::stdin().lock())
        } else {
            Ok(CsvSource::File(PathBuf::from(arg)))
        }
    }

    pub fn spool<R: Read>(mut reader: R) -> Result<Self> {
        let mut tmp = tempfile::Builder::new()
            .prefix("catalog-import-")
            .suffix(".csv")
            .tempfile()?;
        io::copy(&mut reader, &mut tmp)?;
        Ok(CsvSource::Spooled(tmp))
    }

    pub fn path(&self) -> &Path {
        match self {
            CsvSource::File(path) => path,
            CsvSource::Spooled(tmp) => tmp.path(),
        }
    }
}
