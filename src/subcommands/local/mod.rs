//! Subcommands operating on the local repository only.

mod init;
pub use init::InitCmd;

mod commit;
pub use commit::{AmendCmd, CommitCmd};

mod config;
pub use config::ConfigCmd;

mod undo;
pub use undo::{RedoCmd, UndoCmd};
