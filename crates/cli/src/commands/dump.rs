//! `dump` command implementation.

use anyhow::{Context, Result};
use validation::dump_raw_file;

use super::Verdict;
use crate::cli::DumpArgs;

/// Execute the `dump` command; a file whose scan stopped early fails
pub fn run_dump(args: &DumpArgs) -> Result<Verdict> {
    let dump = dump_raw_file(&args.raw_file)
        .with_context(|| format!("failed to read {}", args.raw_file.display()))?;

    if args.json {
        let json = serde_json::to_string_pretty(&dump).context("failed to serialize dump")?;
        println!("{json}");
    } else {
        print!("{}", dump.render(args.all));
    }
    Ok(Verdict::from_passed(dump.error.is_none()))
}
