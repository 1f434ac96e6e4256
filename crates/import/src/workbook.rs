use calamine::{open_workbook_auto, Data, Reader};
use chrono::NaiveDate;
use pressline_core::excel_serial_to_date;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const SPREADSHEET_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xlsb", "xls", "ods"];
pub const CSV_EXTENSION: &str = "csv";

#[derive(Debug, Clone, PartialEq, Default)]
pub enum CellValue {
    #[default]
    Empty,
    Text(String),
    Number(f64),
    Date(NaiveDate),
}

impl CellValue {
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Text form of the cell. Whole numbers print without a fraction so a
    /// part number typed as `1073874` stays `1073874`.
    pub fn to_text(&self) -> Option<String> {
        match self {
            CellValue::Empty => None,
            CellValue::Text(s) => {
                let t = s.trim();
                (!t.is_empty()).then(|| t.to_string())
            }
            CellValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
                Some(format!("{}", *n as i64))
            }
            CellValue::Number(n) => Some(n.to_string()),
            CellValue::Date(d) => Some(d.to_string()),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_text().unwrap_or_default())
    }
}

pub(crate) static EMPTY_CELL: CellValue = CellValue::Empty;

/// One sheet's cells, row-major, in absolute 0-indexed sheet coordinates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawGrid {
    rows: Vec<Vec<CellValue>>,
}

impl RawGrid {
    pub fn new(rows: Vec<Vec<CellValue>>) -> Self {
        Self { rows }
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    /// Out-of-range coordinates read as empty.
    pub fn get(&self, row: usize, col: usize) -> &CellValue {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .unwrap_or(&EMPTY_CELL)
    }

    pub fn row(&self, row: usize) -> &[CellValue] {
        self.rows.get(row).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("File not found: {0}")]
    NotFound(PathBuf),
    #[error("Unsupported file type: '{0}'")]
    Unsupported(String),
    #[error("Unreadable workbook {path}: {message}")]
    Corrupt { path: PathBuf, message: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct Workbook {
    path: PathBuf,
    sheets: Vec<(String, RawGrid)>,
    /// Sheets the container listed but that could not be read (chart sheets,
    /// damaged parts). `(sheet, reason)`.
    pub unreadable_sheets: Vec<(String, String)>,
}

impl Workbook {
    pub fn from_sheets(path: impl Into<PathBuf>, sheets: Vec<(String, RawGrid)>) -> Self {
        Self {
            path: path.into(),
            sheets,
            unreadable_sheets: Vec::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn sheet(&self, name: &str) -> Option<&RawGrid> {
        self.sheets
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, grid)| grid)
    }
}

pub fn is_supported(path: &Path) -> bool {
    extension_of(path).is_some_and(|ext| ext == CSV_EXTENSION || SPREADSHEET_EXTENSIONS.contains(&ext.as_str()))
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
}

/// Open a spreadsheet or CSV file and expose every sheet as a `RawGrid`.
pub fn load(path: &Path) -> Result<Workbook, LoadError> {
    if !path.is_file() {
        return Err(LoadError::NotFound(path.to_path_buf()));
    }
    let ext = extension_of(path).unwrap_or_default();
    if ext == CSV_EXTENSION {
        load_csv(path)
    } else if SPREADSHEET_EXTENSIONS.contains(&ext.as_str()) {
        load_spreadsheet(path)
    } else {
        Err(LoadError::Unsupported(ext))
    }
}

fn load_spreadsheet(path: &Path) -> Result<Workbook, LoadError> {
    let mut workbook = open_workbook_auto(path).map_err(|e| LoadError::Corrupt {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let mut sheets = Vec::new();
    let mut unreadable_sheets = Vec::new();
    for name in workbook.sheet_names().to_vec() {
        match workbook.worksheet_range(&name) {
            Ok(range) => {
                let (row0, col0) = range
                    .start()
                    .map(|(r, c)| (r as usize, c as usize))
                    .unwrap_or((0, 0));
                let mut rows: Vec<Vec<CellValue>> = vec![Vec::new(); row0];
                for row in range.rows() {
                    let mut cells = vec![CellValue::Empty; col0];
                    cells.extend(row.iter().map(convert_cell));
                    rows.push(cells);
                }
                sheets.push((name, RawGrid::new(rows)));
            }
            Err(e) => {
                tracing::warn!("Skipping sheet '{}' in {}: {e}", name, path.display());
                unreadable_sheets.push((name, e.to_string()));
            }
        }
    }

    if sheets.is_empty() && !unreadable_sheets.is_empty() {
        return Err(LoadError::Corrupt {
            path: path.to_path_buf(),
            message: "no readable sheets".to_string(),
        });
    }

    Ok(Workbook {
        path: path.to_path_buf(),
        sheets,
        unreadable_sheets,
    })
}

fn convert_cell(cell: &Data) -> CellValue {
    match cell {
        Data::Empty => CellValue::Empty,
        Data::String(s) if s.trim().is_empty() => CellValue::Empty,
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Float(f) => CellValue::Number(*f),
        Data::Bool(b) => CellValue::Text(if *b { "TRUE" } else { "FALSE" }.to_string()),
        Data::DateTime(dt) => excel_serial_to_date(dt.as_f64())
            .map(CellValue::Date)
            .unwrap_or(CellValue::Number(dt.as_f64())),
        Data::DateTimeIso(s) => s
            .get(..10)
            .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
            .map(CellValue::Date)
            .unwrap_or_else(|| CellValue::Text(s.clone())),
        Data::DurationIso(s) => CellValue::Text(s.clone()),
        Data::Error(e) => CellValue::Text(e.to_string()),
    }
}

fn load_csv(path: &Path) -> Result<Workbook, LoadError> {
    let corrupt = |e: csv::Error| LoadError::Corrupt {
        path: path.to_path_buf(),
        message: e.to_string(),
    };
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .map_err(corrupt)?;

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result.map_err(corrupt)?;
        rows.push(record.iter().map(csv_cell).collect());
    }

    let sheet = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("Sheet1")
        .to_string();
    Ok(Workbook::from_sheets(path, vec![(sheet, RawGrid::new(rows))]))
}

fn csv_cell(field: &str) -> CellValue {
    let t = field.trim();
    if t.is_empty() {
        CellValue::Empty
    } else if let Ok(n) = t.parse::<f64>() {
        CellValue::Number(n)
    } else {
        CellValue::Text(t.to_string())
    }
}
