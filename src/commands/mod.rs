//! Entry points behind each subcommand.
//!
//! Each command loads [`config::Config`] from the runtime, builds the service
//! client it needs and reports success as a `bool` or an error.

mod asg;
pub mod config;
mod deploy;
mod pr_branch;
mod pr_status;

pub use asg::{delete_asg, disable_asg, enable_asg};
pub use deploy::{deploy_asg, read_deploy_info, rollback_asg, write_deploy_info};
pub use pr_branch::{check_pr_against_branch, is_base};
pub use pr_status::{
    StatusQuery, Target, check, check_pr_tests_status, poll, poll_pr_tests_status,
};
