//! Show command

use crate::config::{load_config, to_yaml, RunArgs};
use crate::error::Result;

/// Print the composed configuration; output is not affected by `--quiet`
pub fn run_show(args: RunArgs) -> Result<()> {
    let config = load_config(&args.config_path, &args.config_name, &args.overrides)?;
    print!("{}", to_yaml(&config)?);
    Ok(())
}
