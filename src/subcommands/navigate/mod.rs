//! Subcommands for moving around the stack.

mod checkout;
pub use checkout::CheckoutCmd;

mod direction;
pub use direction::{BottomCmd, DownCmd, TopCmd, UpCmd};
