use crate::error::DataSourceError;
use calamine::{Data, Reader, open_workbook_auto};
use std::fmt;
use std::path::Path;

/// One cell of a raw inventory table, before any column-specific coercion.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

static EMPTY_CELL: CellValue = CellValue::Empty;

impl CellValue {
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Empty => Ok(()),
            CellValue::Text(s) => f.write_str(s),
            CellValue::Int(i) => write!(f, "{}", i),
            // Spreadsheets store every number as a float; keep "101" looking like "101"
            CellValue::Float(x) if x.is_finite() && x.fract() == 0.0 && x.abs() < 1e15 => {
                write!(f, "{}", *x as i64)
            }
            CellValue::Float(x) if x.is_finite() => write!(f, "{}", x),
            CellValue::Float(_) => Ok(()),
            CellValue::Bool(true) => f.write_str("TRUE"),
            CellValue::Bool(false) => f.write_str("FALSE"),
        }
    }
}

impl From<&Data> for CellValue {
    fn from(data: &Data) -> Self {
        match data {
            Data::Empty | Data::Error(_) => CellValue::Empty,
            Data::Int(i) => CellValue::Int(*i),
            Data::Float(x) => CellValue::Float(*x),
            Data::Bool(b) => CellValue::Bool(*b),
            Data::String(s) => CellValue::Text(s.clone()),
            other => {
                let text = other.to_string();
                if text.is_empty() {
                    CellValue::Empty
                } else {
                    CellValue::Text(text)
                }
            }
        }
    }
}

impl From<&str> for CellValue {
    fn from(field: &str) -> Self {
        if field.is_empty() {
            CellValue::Empty
        } else {
            CellValue::Text(field.to_string())
        }
    }
}

/// A header row plus data rows, exactly as read from the source file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl RawTable {
    /// Find a column by header name, ignoring surrounding whitespace and case.
    /// The first matching column wins.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(name))
    }

    /// Cell at `row`/`col`, or an empty cell when the row is short.
    pub fn cell(&self, row: usize, col: usize) -> &CellValue {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .unwrap_or(&EMPTY_CELL)
    }
}

/// Load a table from a CSV file
///
/// The first record is the header row. Rows may have differing lengths;
/// missing trailing cells read as empty. Invalid UTF-8 inside a field is
/// replaced with U+FFFD rather than failing the load.
///
/// # Arguments
/// * `filepath` - Path to the CSV file to load
///
/// # Returns
/// * `Result<RawTable, DataSourceError>` - The loaded table or an error
pub fn from_csv(filepath: impl AsRef<Path>) -> Result<RawTable, DataSourceError> {
    let path = filepath.as_ref();
    let csv_error = |source| DataSourceError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(csv_error)?;

    let headers = reader
        .byte_headers()
        .map_err(csv_error)?
        .iter()
        .map(|field| String::from_utf8_lossy(field).into_owned())
        .collect();

    let mut rows = Vec::new();
    for record in reader.byte_records() {
        let record = record.map_err(csv_error)?;
        let row: Vec<CellValue> = record
            .iter()
            .map(|field| CellValue::from(String::from_utf8_lossy(field).as_ref()))
            .collect();
        if !row.iter().all(CellValue::is_empty) {
            rows.push(row);
        }
    }

    Ok(RawTable { headers, rows })
}

/// Load a table from the first worksheet of an Excel/ODS workbook
///
/// # Arguments
/// * `filepath` - Path to the workbook to load
///
/// # Returns
/// * `Result<RawTable, DataSourceError>` - The loaded table or an error
pub fn from_excel(filepath: impl AsRef<Path>) -> Result<RawTable, DataSourceError> {
    let path = filepath.as_ref();
    let workbook_error = |source| DataSourceError::Workbook {
        path: path.to_path_buf(),
        source,
    };

    let mut workbook = open_workbook_auto(path).map_err(workbook_error)?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| DataSourceError::NoWorksheet(path.to_path_buf()))?
        .map_err(workbook_error)?;

    let mut rows = range.rows();
    let headers = match rows.next() {
        Some(header_row) => header_row
            .iter()
            .map(|cell| CellValue::from(cell).to_string())
            .collect(),
        None => return Ok(RawTable::default()),
    };

    let rows = rows
        .map(|row| row.iter().map(CellValue::from).collect::<Vec<_>>())
        .filter(|row| !row.iter().all(CellValue::is_empty))
        .collect();

    Ok(RawTable { headers, rows })
}

/// Detect file type and load appropriate format
///
/// This function examines the file extension and calls the appropriate loader
/// for CSV or spreadsheet workbooks.
///
/// # Arguments
/// * `filepath` - Path to the file to load
///
/// # Returns
/// * `Result<RawTable, DataSourceError>` - The loaded table or an error
///
/// # Examples
/// ```no_run
/// use grocerz::loader::read_table;
///
/// match read_table("data/inventory.xlsx") {
///     Ok(table) => println!("Loaded {} rows", table.rows.len()),
///     Err(e) => eprintln!("Error loading inventory: {}", e),
/// }
/// ```
pub fn read_table(filepath: impl AsRef<Path>) -> Result<RawTable, DataSourceError> {
    let path = filepath.as_ref();
    if !path.is_file() {
        return Err(DataSourceError::NotFound(path.to_path_buf()));
    }

    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase());

    match extension.as_deref() {
        Some("csv") => from_csv(path),
        Some("xlsx") | Some("xlsm") | Some("xlsb") | Some("xls") | Some("ods") => from_excel(path),
        _ => Err(DataSourceError::UnsupportedFormat(path.to_path_buf())),
    }
}
