//! `signpost validate` — check an identity config file without starting.

use crate::cli::ValidateArgs;
use crate::config;
use crate::error::GatewayError;

pub async fn execute(args: &ValidateArgs) -> Result<(), GatewayError> {
    let set = config::load(&args.config).await?;

    let named = set.named().count();
    println!(
        "\u{2713} {} is valid ({named} named identit{}, plus default)",
        args.config.display(),
        if named == 1 { "y" } else { "ies" }
    );
    Ok(())
}
