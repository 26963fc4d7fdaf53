use crate::commands::CommandResult;
use crate::error::CliError;

pub fn render(result: &CommandResult, pretty: bool) -> Result<(), CliError> {
    let payload = if pretty {
        serde_json::to_string_pretty(&result.data)?
    } else {
        serde_json::to_string(&result.data)?
    };
    println!("{payload}");

    for warning in &result.warnings {
        eprintln!("warning: {warning}");
    }
    Ok(())
}
