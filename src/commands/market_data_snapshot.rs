use anyhow::{anyhow, Result};
use std::path::Path;
use tokio::fs;

pub async fn ensure_market_data_file(path: &Path) -> Result<()> {
    if fs::metadata(path).await.is_ok() {
        return Ok(());
    }

    Err(anyhow!(
        "Market data snapshot not found at {}. Generate it with `export-market-data` or drop `--data-file` to read from the database.",
        path.display()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_snapshot_names_the_export_command() {
        let err = ensure_market_data_file(Path::new("/nonexistent/market-data.bin"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("export-market-data"));
    }
}
