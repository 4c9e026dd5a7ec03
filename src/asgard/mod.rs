//! Asgard REST API: clusters, autoscaling groups and their tasks.
//!
//! Every call carries the API token as the `asgardApiToken` query parameter.
//! Each operation retries only the failure kinds listed for it.

mod client;
mod deploy;
mod error;
mod types;

pub use client::Asgard;
pub use deploy::{ClusteredAsgs, DeployInfo, RedBlackOutcome};
pub use error::{AsgardError, AsgardErrorKind};
pub use types::{AsgGroup, AsgInfo, AsgSummary, DeleteOptions, Task};
