use anyhow::{Context, Result};
use itertools::Itertools;
use storage_explorer::explorer::navigation::normalize_path;
use storage_explorer::explorer::{BatchReport, ColumnItem, Outcome};
use storage_explorer::store::Bucket;
use storage_explorer::{ObjectStore, StorageExplorer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Left,
    Right,
}

/// Prints `rows` under `columns` (header, alignment). Widths count chars
/// and trailing spaces are dropped.
pub fn print_table<const N: usize>(columns: &[(&str, Align); N], rows: &[[String; N]]) {
    let mut widths = columns.map(|(header, _)| header.chars().count());
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let render = |cells: [&str; N]| {
        let line = cells
            .iter()
            .zip(columns)
            .zip(widths)
            .map(|((cell, (_, align)), width)| match align {
                Align::Left => format!("{:<width$}", cell),
                Align::Right => format!("{:>width$}", cell),
            })
            .join("  ");
        println!("{}", line.trim_end());
    };
    render(columns.map(|(header, _)| header));
    for row in rows {
        render(std::array::from_fn(|i| row[i].as_str()));
    }
}

/// Splits a path into its folder segments.
pub fn segments(path: &str) -> Vec<String> {
    let path = normalize_path(path);
    if path.is_empty() {
        Vec::new()
    } else {
        path.split('/').map(str::to_string).collect()
    }
}

/// Selects the bucket named `name` (or with that id).
pub async fn open_bucket<S: ObjectStore>(
    explorer: &StorageExplorer<S>,
    name: &str,
) -> Result<Bucket> {
    let bucket = explorer
        .list_buckets()
        .await?
        .into_iter()
        .find(|b| b.name == name || b.id == name)
        .with_context(|| format!("Bucket not found: {}", name))?;
    explorer.open_bucket(&bucket).await?;
    Ok(bucket)
}

/// Opens every folder along `path` and returns the index of the column that
/// lists the last one.
pub async fn open_folder<S: ObjectStore>(
    explorer: &StorageExplorer<S>,
    bucket: &str,
    path: &str,
) -> Result<usize> {
    open_bucket(explorer, bucket).await?;
    let folders = segments(path);
    explorer.fetch_folders_by_path(&folders, "", false).await?;
    let column_index = folders.len();
    while explorer.snapshot().columns[column_index].has_more_items {
        explorer
            .fetch_more_folder_contents(column_index, "")
            .await?;
    }
    Ok(column_index)
}

/// Opens the parent of `path` and picks the entry it names.
pub async fn locate<S: ObjectStore>(
    explorer: &StorageExplorer<S>,
    bucket: &str,
    path: &str,
) -> Result<ColumnItem> {
    let mut folders = segments(path);
    let name = folders
        .pop()
        .with_context(|| format!("Not a file or folder path: {:?}", path))?;
    let column_index = open_folder(explorer, bucket, &folders.join("/")).await?;
    let state = explorer.snapshot();
    let item = state.columns[column_index]
        .find(&name)
        .cloned()
        .with_context(|| format!("No such file or folder: {}/{}", bucket, path))?;
    Ok(ColumnItem::new(item, column_index))
}

pub fn print_report(what: &str, report: &BatchReport) {
    match report.outcome() {
        Outcome::Nothing => println!("{}: nothing to do", what),
        Outcome::Success => println!("{}: {} succeeded", what, report.success_count),
        Outcome::Partial | Outcome::Failure => {
            println!(
                "{}: {} of {} failed",
                what,
                report.fail_count,
                report.total()
            );
            for e in &report.errors {
                println!("  {}: {}", e.path, e.message);
            }
        }
    }
}

pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1000.0 && unit + 1 < UNITS.len() {
        size /= 1000.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", size, UNITS[unit])
    }
}
