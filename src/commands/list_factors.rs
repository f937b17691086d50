use crate::factors::{FactorOptions, FactorRegistry};
use anyhow::Result;
use log::info;

pub fn run() -> Result<()> {
    let registry = FactorRegistry::with_builtin();
    for name in registry.list() {
        let factor = registry.create(name, &FactorOptions::default())?;
        info!(
            "{}: {} (needs {} days of history) {}",
            name,
            factor.name(),
            factor.min_history(),
            factor.params()
        );
    }
    Ok(())
}
