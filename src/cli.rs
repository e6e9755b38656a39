//! The CLI for `pk`.

use crate::{
    config::{GlobalConfig, PkConfig},
    ctx::PkContext,
    errors::{PkError, PkResult},
    git,
    subcommands::Subcommands,
};
use clap::{
    builder::styling::{AnsiColor, Color, Style},
    ArgAction, Parser,
};

const ABOUT: &str =
    "pk is a CLI application for managing stacked pull requests locally and on GitHub.";

/// The CLI application for `pk`.
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(about = ABOUT, version, styles = cli_styles(), arg_required_else_help(true))]
pub struct Cli {
    /// Verbosity level (0-4)
    #[arg(short, action = ArgAction::Count)]
    pub v: u8,
    /// The subcommand to run
    #[clap(subcommand)]
    pub subcommand: Subcommands,
}

impl Cli {
    /// Run the CLI application with the given arguments.
    pub async fn run(self) -> PkResult<()> {
        // Global defaults feed the prompt/pager environment; the per-repo
        // config stays authoritative for everything stack-related.
        let global = GlobalConfig::load()?;
        if let Some(editor) = &global.editor {
            if std::env::var_os("EDITOR").is_none() {
                std::env::set_var("EDITOR", editor);
            }
        }
        if let Some(pager) = &global.pager {
            if std::env::var_os("PAGER").is_none() {
                std::env::set_var("PAGER", pager);
            }
        }

        let repo = git::active_repository().ok_or(PkError::NotAGitRepository)?;

        // `init` is the one verb that runs before any state exists.
        let subcommand = match self.subcommand {
            Subcommands::Init(cmd) => return cmd.run(&repo),
            other => other,
        };

        let repo_root = repo
            .workdir()
            .ok_or_else(|| PkError::Fatal("bare repositories are not supported".to_string()))?
            .to_path_buf();
        let config = PkConfig::load(&repo_root)?;

        let context = if subcommand.recovers_from_corrupt_metadata() {
            PkContext::load_or_recover(config, &repo)?
        } else {
            PkContext::load(config, &repo)?
        };

        subcommand.run(context).await
    }
}

/// Styles for the CLI application.
const fn cli_styles() -> clap::builder::Styles {
    clap::builder::Styles::styled()
        .usage(
            Style::new()
                .bold()
                .underline()
                .fg_color(Some(Color::Ansi(AnsiColor::Yellow))),
        )
        .header(
            Style::new()
                .bold()
                .underline()
                .fg_color(Some(Color::Ansi(AnsiColor::Yellow))),
        )
        .literal(Style::new().fg_color(Some(Color::Ansi(AnsiColor::Green))))
        .invalid(
            Style::new()
                .bold()
                .fg_color(Some(Color::Ansi(AnsiColor::Red))),
        )
        .error(
            Style::new()
                .bold()
                .fg_color(Some(Color::Ansi(AnsiColor::Red))),
        )
        .valid(
            Style::new()
                .bold()
                .underline()
                .fg_color(Some(Color::Ansi(AnsiColor::Green))),
        )
        .placeholder(Style::new().fg_color(Some(Color::Ansi(AnsiColor::White))))
}
