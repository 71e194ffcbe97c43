// External crates
use log::{debug, info};
use polars::prelude::*;
use std::fs::File;
use std::path::Path;

// Internal modules
use crate::constants::{DISK_ID_COLUMN, LABEL_COLUMN, STEP_COLUMN};

/// Map a header onto the standard column name, if it is a known alias
fn standard_column_name(column_name: &str) -> Option<&'static str> {
    let name = match column_name.trim().to_lowercase().as_str() {
        "disk_id" | "disk" | "serial_number" | "serial" | "drive" | "drive_id" => DISK_ID_COLUMN,
        "step" | "date" | "day" | "time" | "timestamp" | "datetime" => STEP_COLUMN,
        "failure" | "failed" | "label" | "target" => LABEL_COLUMN,
        _ => return None,
    };
    Some(name)
}

/// Rename known header aliases (case-insensitive) to `disk_id`, `step` and `failure`
pub fn standardize_columns(df: DataFrame) -> PolarsResult<DataFrame> {
    let mut rename_columns = Vec::new();
    for column_name in df.get_column_names() {
        if let Some(standard_name) = standard_column_name(column_name) {
            if column_name.as_str() != standard_name {
                rename_columns.push((column_name.to_string(), standard_name));
            }
        }
    }

    if rename_columns.is_empty() {
        return Ok(df);
    }
    debug!("Columns to rename: {:?}", rename_columns);

    let mut df = df;
    for (old_name, new_name) in rename_columns {
        df.rename(&old_name, new_name.into())?;
    }
    debug!("DataFrame columns after renaming: {:?}", df.get_column_names());
    Ok(df)
}

/// Read a disk time-series CSV file with standardized column names
///
/// The frame must contain a disk identifier and a failure label; an ordering
/// column is optional.
pub fn read_disk_csv<P: AsRef<Path>>(file_path: P) -> PolarsResult<DataFrame> {
    let path = file_path.as_ref();
    info!("Loading data from: {}", path.display());

    let file = File::open(path)?;
    let df = CsvReader::new(file).finish()?;
    let df = standardize_columns(df)?;

    for required in [DISK_ID_COLUMN, LABEL_COLUMN] {
        if df.column(required).is_err() {
            return Err(PolarsError::ColumnNotFound(
                format!("Required column {} not found", required).into(),
            ));
        }
    }
    Ok(df)
}

/// Write a DataFrame to CSV, creating parent directories as needed
pub fn write_csv<P: AsRef<Path>>(df: &mut DataFrame, file_path: P) -> PolarsResult<()> {
    let path = file_path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let mut file = File::create(path)?;
    CsvWriter::new(&mut file).finish(df)?;
    info!("Wrote {} rows to {}", df.height(), path.display());
    Ok(())
}
