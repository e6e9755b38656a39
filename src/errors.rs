//! Error types for the `pk` application.

use nu_ansi_term::Color;
use thiserror::Error;

/// Result alias for fallible `pk` operations.
pub type PkResult<T> = Result<T, PkError>;

#[derive(Error, Debug)]
pub enum PkError {
    /// Another `pk` process holds the metadata lock.
    #[error("Another `pk` process is already running (lock held by pid {pid}). Retry once it finishes.")]
    Busy { pid: u32 },
    /// The stack tree disagrees with the repository or the remote; refuse to proceed.
    #[error("Stack state is inconsistent: {details}\nRun `pk stack --repair` to reconcile.")]
    StackInconsistent { details: String },
    /// A rebase conflict left the operation suspended.
    #[error("Conflicts while rebasing `{}`. Resolve them, then run `{}` (or `{}`).", Color::Blue.paint(.branch), Color::Green.paint(format!("pk {} --continue", .command)), Color::Red.paint(format!("pk {} --abort", .command)))]
    NeedsResolution { branch: String, command: String },
    /// A push-with-lease failed because the remote moved.
    #[error("Remote branch `{}` has new commits. Run `pk pull` and resolve before retrying.", Color::Blue.paint(.0))]
    RemoteDiverged(String),
    /// A ref the metadata expects does not exist locally.
    #[error("Branch ref `{}` is missing from the local repository.", Color::Blue.paint(.0))]
    RefMissing(String),
    /// The working tree has uncommitted changes that block the operation.
    #[error("The working tree has uncommitted changes. Commit or stash them first.")]
    WorkingTreeDirty,
    /// A tracked branch has lost its local ref outside of any operation.
    #[error("Branch `{}` is tracked but its local ref is gone. Delete it with `pk bd {}` or restore the ref.", Color::Blue.paint(.0), .0)]
    OrphanBranch(String),
    /// The stack would exceed the configured maximum depth.
    #[error("Stack depth limit ({max}) exceeded.")]
    DepthExceeded { max: usize },
    /// A fuzzy branch pattern matched more than one branch.
    #[error("Pattern `{pattern}` is ambiguous: {}", .matches.join(", "))]
    AmbiguousMatch {
        pattern: String,
        matches: Vec<String>,
    },
    /// The forge API could not be reached.
    #[error("Could not reach the forge: {0}")]
    ForgeUnreachable(String),
    /// The forge rejected our credentials.
    #[error("Forge authentication failed. Set `api_token` in .pancake/config or export GITHUB_TOKEN.")]
    ForgeAuth,
    /// The metadata file exists but cannot be parsed.
    #[error("Metadata file is corrupt: {0}\n`pk stack --repair` can rebuild it from git notes.")]
    MetadataCorrupt(String),
    /// Pancake has not been initialized in this repository.
    #[error("Pancake is not initialized. Run `pk init` first.")]
    NotInitialized,
    /// The current directory is not inside a git repository.
    #[error("Not within a git repository.")]
    NotAGitRepository,
    /// The branch is not tracked by `pk`.
    #[error("Branch `{}` is not tracked. Adopt it with `pk init` or create branches with `pk bc`.", Color::Blue.paint(.0))]
    BranchNotTracked(String),
    /// A branch with this name already exists.
    #[error("Branch `{}` already exists.", Color::Blue.paint(.0))]
    BranchExists(String),
    /// The trunk branch cannot be mutated through stack operations.
    #[error("Cannot {0} the trunk branch.")]
    TrunkImmutable(&'static str),
    /// User input failed validation.
    #[error("{0}")]
    InvalidInput(String),
    /// Unrecoverable error from a lower layer, surfaced verbatim.
    #[error("Fatal: {0}")]
    Fatal(String),
    /// A [git2::Error] occurred.
    #[error("libgit2 error: {0}")]
    Git2(#[from] git2::Error),
    /// An [std::io::Error] occurred.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// A [serde_json::Error] occurred.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    /// A TOML deserialization error occurred.
    #[error("toml error: {0}")]
    TomlDe(#[from] toml::de::Error),
    /// A TOML serialization error occurred.
    #[error("toml error: {0}")]
    TomlSer(#[from] toml::ser::Error),
    /// An [inquire::InquireError] occurred.
    #[error("inquire error: {0}")]
    Inquire(#[from] inquire::InquireError),
    /// An [anyhow::Error] occurred.
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl PkError {
    /// The process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NeedsResolution { .. } => 3,
            Self::Busy { .. } => 4,
            Self::StackInconsistent { .. } | Self::OrphanBranch(_) => 5,
            Self::RemoteDiverged(_) => 6,
            Self::DepthExceeded { .. }
            | Self::AmbiguousMatch { .. }
            | Self::BranchNotTracked(_)
            | Self::BranchExists(_)
            | Self::TrunkImmutable(_)
            | Self::InvalidInput(_)
            | Self::NotInitialized
            | Self::NotAGitRepository => 2,
            _ => 1,
        }
    }
}

impl From<octocrab::Error> for PkError {
    fn from(err: octocrab::Error) -> Self {
        match &err {
            octocrab::Error::GitHub { source, .. } => {
                let status = source.status_code.as_u16();
                if status == 401 || status == 403 {
                    Self::ForgeAuth
                } else {
                    Self::ForgeUnreachable(source.message.clone())
                }
            }
            _ => Self::ForgeUnreachable(err.to_string()),
        }
    }
}
