// ACL Node
//
// Hosts the ACL subsystem on a single node: loads the configuration, sets up
// logging, bootstraps the first management token when asked to, and keeps
// expired one-time tokens from piling up.

pub mod config;
pub mod error;
pub mod logging;
pub mod node;

pub use config::Config;
pub use error::{NodeError, Result};
pub use node::Node;
