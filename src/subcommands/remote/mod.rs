//! Subcommands pertaining to remote stack management.

mod submit;
pub use submit::SubmitCmd;

mod pr;
pub use pr::PrCmd;

mod land;
pub use land::LandCmd;

mod push;
pub use push::PushCmd;

mod pull;
pub use pull::PullCmd;

mod fetch;
pub use fetch::FetchCmd;
