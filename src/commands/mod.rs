//! CLI commands implementation

pub mod check;
pub mod init;
pub mod process;
pub mod status;
pub mod tasks;

pub use check::*;
pub use init::*;
pub use process::*;
pub use status::*;
pub use tasks::*;
