//! Join command implementation.

use crate::cli::JoinArgs;
use crate::error::{CliError, Result};
use crate::join::{join_folder, JoinOptions};
use crate::output::Formatter;

/// Execute the join command.
pub fn execute_join(args: JoinArgs, formatter: &Formatter) -> Result<()> {
    if args.file.contains(['/', '\\']) {
        return Err(CliError::InvalidInput(
            "--file must be a plain file name".to_string(),
        ));
    }

    let options = JoinOptions {
        separator: !args.no_separator,
        include_metadata: args.include_metadata,
    };
    let report = join_folder(&args.output, &args.file, &options)?;

    println!("{}", formatter.format_join(&report)?);
    Ok(())
}
