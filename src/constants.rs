//! Constants for the `pk` application.

use nu_ansi_term::Color;

/// Directory under the repository root that holds all pancake state.
pub(crate) const PANCAKE_DIR: &str = ".pancake";

/// Per-repository TOML configuration file, inside [PANCAKE_DIR].
pub(crate) const CONFIG_FILE_NAME: &str = "config";

/// The stack metadata file, inside [PANCAKE_DIR].
pub(crate) const STACKS_FILE_NAME: &str = "stacks.json";

/// The metadata lock file, inside [PANCAKE_DIR].
pub(crate) const LOCK_FILE_NAME: &str = "lock";

/// The operation journal, inside [PANCAKE_DIR].
pub(crate) const JOURNAL_FILE_NAME: &str = "journal.log";

/// The notes ref that mirrors parent pointers into the object database.
pub(crate) const NOTES_REF: &str = "refs/notes/pancake";

/// Default maximum stack depth above trunk.
pub(crate) const DEFAULT_MAX_DEPTH: usize = 10;

/// Default per-call forge timeout, in seconds.
pub(crate) const DEFAULT_FORGE_TIMEOUT_SECS: u64 = 30;

pub(crate) const COLORS: [Color; 6] = [
    Color::Blue,
    Color::Cyan,
    Color::Green,
    Color::Red,
    Color::Yellow,
    Color::Purple,
];

pub(crate) const FILLED_CIRCLE: char = '●';
pub(crate) const EMPTY_CIRCLE: char = '○';
pub(crate) const BOTTOM_LEFT_BOX: char = '└';
pub(crate) const LEFT_FORK_BOX: char = '├';
pub(crate) const VERTICAL_BOX: char = '│';
pub(crate) const HORIZONTAL_BOX: char = '─';
