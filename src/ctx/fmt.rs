//! Contains the formatting logic for the [PkContext] struct.

use super::PkContext;
use crate::{
    config,
    constants::{
        BOTTOM_LEFT_BOX, COLORS, EMPTY_CIRCLE, FILLED_CIRCLE, HORIZONTAL_BOX, LEFT_FORK_BOX,
        VERTICAL_BOX,
    },
    errors::{PkError, PkResult},
    git::RepositoryExt,
};
use nu_ansi_term::Color;
use std::fmt::{Display, Write};

impl<'a> PkContext<'a> {
    /// Gathers an in-order list of [DisplayBranch]es, containing the log-line
    /// and branch name.
    ///
    /// This function is particularly useful when creating prompts with
    /// [inquire::Select].
    pub fn display_branches(&self) -> PkResult<Vec<DisplayBranch>> {
        let branches = self.tree.branch_order();

        let mut buf = String::new();
        self.write_tree(&mut buf)?;
        let log_lines = buf.trim_end().lines().collect::<Vec<_>>();

        if branches.len() != log_lines.len() {
            return Err(PkError::Fatal(format!(
                "mismatch between branches and log-lines: {} branches, {} log-lines",
                branches.len(),
                log_lines.len()
            )));
        }

        Ok(branches
            .into_iter()
            .zip(log_lines)
            .map(|(branch, log_line)| DisplayBranch {
                display_value: log_line.to_string(),
                branch_name: branch,
            })
            .collect())
    }

    /// Prints the tree of branches contained within the [PkContext].
    pub fn print_tree(&self) -> PkResult<()> {
        let mut buf = String::new();
        self.write_tree(&mut buf)?;
        print!("{buf}");
        Ok(())
    }

    /// Prints the condensed `bottom <- top` path form of every stack.
    pub fn print_short(&self) -> PkResult<()> {
        let mut paths = Vec::new();
        self.collect_paths(&self.tree.trunk_name, Vec::new(), &mut paths);
        for (idx, path) in paths.iter().enumerate() {
            let color = COLORS[idx % COLORS.len()];
            let line = path
                .iter()
                .map(|name| paint(color, name))
                .collect::<Vec<_>>()
                .join(&format!(" {} ", paint(color, "<-")));
            println!("{line}");
        }
        Ok(())
    }

    fn collect_paths(&self, branch: &str, mut current: Vec<String>, out: &mut Vec<Vec<String>>) {
        current.push(branch.to_string());
        let children = self.tree.children(branch);
        if children.is_empty() {
            if current.len() > 1 {
                out.push(current);
            }
            return;
        }
        for child in children {
            self.collect_paths(child, current.clone(), out);
        }
    }

    /// Writes the tree of branches contained within the [PkContext] to the
    /// given [Write]r.
    pub fn write_tree<W: Write>(&self, w: &mut W) -> PkResult<()> {
        let trunk_name = self.tree.trunk_name.clone();
        self.write_tree_recursive(w, &trunk_name, 0, "", "", true)
    }

    /// Writes the tree of branches to the given writer recursively.
    fn write_tree_recursive<W: Write>(
        &self,
        w: &mut W,
        branch: &str,
        depth: usize,
        prefix: &str,
        connection: &str,
        is_parent_last_child: bool,
    ) -> PkResult<()> {
        let checked_out = self.repository.current_branch_name().unwrap_or_default();
        let current = self.tree.require(branch)?;

        let checked_out_icon = if branch == checked_out {
            FILLED_CIRCLE
        } else {
            EMPTY_CIRCLE
        };
        let rendered_branch = paint(
            COLORS[depth % COLORS.len()],
            &format!("{connection}{checked_out_icon} {branch}"),
        );
        let branch_metadata = {
            let needs_restack = if self.needs_restack(branch) {
                " (needs restack)"
            } else {
                ""
            };
            let pull_request = current
                .pr
                .as_ref()
                .and_then(|_| self.pr_url(branch))
                .map(|url| format!(" ({})", paint_italic(Color::Cyan, &url)))
                .unwrap_or_default();
            format!("{needs_restack}{pull_request}")
        };

        writeln!(w, "{prefix}{rendered_branch}{branch_metadata}")
            .map_err(|err| PkError::Fatal(err.to_string()))?;

        let children = self.tree.children(branch);
        let mut iter = children.iter().peekable();
        while let Some(child) = iter.next() {
            let is_last_child = iter.peek().is_none();
            let connection = format!(
                "{}{}",
                if is_last_child { BOTTOM_LEFT_BOX } else { LEFT_FORK_BOX },
                HORIZONTAL_BOX
            );

            let prefix = if depth > 0 {
                let color = COLORS[depth % COLORS.len()];
                if is_parent_last_child {
                    format!("{prefix}  ")
                } else {
                    format!("{prefix}{} ", paint(color, &VERTICAL_BOX.to_string()))
                }
            } else {
                prefix.to_string()
            };

            self.write_tree_recursive(
                w,
                child,
                depth + 1,
                prefix.as_str(),
                connection.as_str(),
                is_last_child,
            )?;
        }

        Ok(())
    }
}

fn paint(color: Color, text: &str) -> String {
    if config::color_disabled() {
        text.to_string()
    } else {
        color.paint(text).to_string()
    }
}

fn paint_italic(color: Color, text: &str) -> String {
    if config::color_disabled() {
        text.to_string()
    } else {
        color.italic().paint(text).to_string()
    }
}

/// A pair of a log-line and a branch name, which implements [Display].
#[derive(Debug)]
pub struct DisplayBranch {
    /// The log-line to display.
    pub(crate) display_value: String,
    /// The branch name corresponding to the log-line.
    pub(crate) branch_name: String,
}

impl Display for DisplayBranch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_value)
    }
}
