use anyhow::Result;
use storage_explorer::{ObjectStore, StorageExplorer};

use crate::common::{Align, human_size, print_table};

pub async fn run<S: ObjectStore>(explorer: &StorageExplorer<S>) -> Result<()> {
    let rows: Vec<[String; 5]> = explorer
        .list_buckets()
        .await?
        .into_iter()
        .map(|b| {
            [
                b.name,
                b.id,
                if b.public { "public" } else { "private" }.to_string(),
                b.file_size_limit
                    .map(human_size)
                    .unwrap_or_else(|| "-".to_string()),
                b.created_at
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| "-".to_string()),
            ]
        })
        .collect();
    print_table(
        &[
            ("Name", Align::Left),
            ("Id", Align::Left),
            ("Access", Align::Left),
            ("Size Limit", Align::Right),
            ("Created", Align::Left),
        ],
        &rows,
    );
    Ok(())
}
