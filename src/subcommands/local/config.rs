//! `config` subcommand.

use crate::{config::PkConfig, ctx::PkContext, errors::PkResult};
use clap::Args;
use inquire::Confirm;

/// CLI arguments for the `config` subcommand.
#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct ConfigCmd;

impl ConfigCmd {
    /// Run the `config` subcommand: print the repo configuration and offer
    /// an in-editor edit.
    pub fn run(self, ctx: PkContext<'_>) -> PkResult<()> {
        let rendered = toml::to_string_pretty(&ctx.config)?;
        println!("Current configuration:\n\n{rendered}");

        if Confirm::new("Edit the configuration? (default: no)")
            .with_default(false)
            .prompt()?
        {
            let edited = inquire::Editor::new("Edit .pancake/config")
                .with_file_extension(".toml")
                .with_predefined_text(&rendered)
                .prompt()?;
            let config: PkConfig = toml::from_str(&edited)?;
            config.save(&ctx.repo_root)?;
            println!("Configuration updated.");
        }
        Ok(())
    }
}
