use crate::context::AppContext;
use anyhow::Result;
use log::info;

pub async fn run(app: &AppContext) -> Result<()> {
    info!("Applying database schema");
    let db = app.database().await?;
    db.apply_schema().await?;
    Ok(())
}
