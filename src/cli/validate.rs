use super::commands::ValidateArgs;
use crate::config::parse_config;
use crate::errors::RestackError;

pub async fn handle_validate(args: ValidateArgs) -> Result<(), RestackError> {
    let config = parse_config(&args.file).await?;
    println!("Configuration is valid: {}", args.file.display());
    println!("  database:     {}", config.database.path.display());
    println!("  scan budget:  {}s", config.scan.budget_secs);
    println!("  zap ports:    {}-{}", config.zap.port_range_start, config.zap.port_range_end);
    Ok(())
}
