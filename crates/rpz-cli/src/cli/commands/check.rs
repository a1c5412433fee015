//! `rpzd check-config` - validate config and load every source once.

use anyhow::Result;
use rpz_srv::sources::loader;
use rpz_srv::ServerConfig;
use std::fmt::Write;

pub fn execute(config: &ServerConfig) -> Result<()> {
    println!("{}", summarize(config)?);
    Ok(())
}

/// Validate `config`, load its sources and describe what was found.
pub fn summarize(config: &ServerConfig) -> Result<String> {
    config.validate()?;
    let registry = loader::build_registry(config, chrono::Utc::now().timestamp())?;

    let mut out = format!("zone {} ({} lists)\n", config.zone.name, config.lists.len());
    for s in registry.summaries() {
        writeln!(
            out,
            "  {}/{}: {} names ({:?}, {:?})",
            s.list_type, s.name, s.names, s.format, s.datasource
        )?;
    }
    out.push_str("configuration OK");
    Ok(out)
}
