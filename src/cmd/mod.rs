//! Subcommand dispatch and execution.
//!
//! The [`dispatch`] function routes the parsed CLI to the appropriate
//! subcommand handler: [`run`], [`validate`], or [`health`]. Each handler
//! lives in its own submodule.

pub mod health;
pub mod run;
pub mod validate;

use crate::cli::{Cli, Commands};
use crate::error::GatewayError;

pub async fn dispatch(cli: Cli) -> Result<(), GatewayError> {
    match cli.command {
        Some(Commands::Run(args)) => run::execute(*args).await,
        Some(Commands::Validate(ref args)) => validate::execute(args).await,
        Some(Commands::Health(args)) => health::execute(args).await,
        None => {
            print_welcome();
            Ok(())
        }
    }
}

fn print_welcome() {
    let version = env!("CARGO_PKG_VERSION");
    println!(
        "\n  signpost v{version} \u{2014} AWS SigV4 request-signing reverse proxy\n\n  \
         No command provided. To get started:\n\n    \
         signpost run                             Resolve signing targets from Host\n    \
         signpost run --name s3 --region us-east-1\n    \
         signpost run --identities signpost.yaml  Multiple signing identities\n    \
         signpost --help                          See all commands and options\n"
    );
}
