// ABOUTME: CLI config command - print the effective configuration, optionally saving it

use anyhow::Result;

use super::ConfigArgs;
use crate::config::AppConfig;

/// Execute the config command
pub fn execute(args: ConfigArgs, config: &AppConfig) -> Result<()> {
    print!("{}", config.to_toml()?);

    if args.write {
        let path = config.save()?;
        eprintln!("Wrote {}", path.display());
    }
    Ok(())
}
