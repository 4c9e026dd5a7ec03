use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tubular::asgard::DeleteOptions;
use tubular::commands::{self, StatusQuery, Target};
use tubular::github::{DEFAULT_EXCLUDE_CONTEXTS, RepoId};

/// tubular - deployment pipeline helpers
///
/// Checks GitHub pull request validations and manages Asgard autoscaling
/// groups. Every remote call is retried according to the RETRY_* environment
/// variables (RETRY_MAX_ATTEMPTS, RETRY_DELAY_SECONDS, RETRY_MAX_TIME_SECONDS,
/// RETRY_BACKOFF_FACTOR, RETRY_JITTER_SECONDS), which can be overridden per
/// service with RETRY_GITHUB_* and RETRY_ASGARD_*. Set
/// TUBULAR_RETRY_ENABLED=false to disable retries.
///
/// If the GITHUB_TOKEN environment variable is set, it will be used for authentication.
#[derive(Parser, Debug)]
#[command(author, version = env!("TUBULAR_VERSION"), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// GitHub API URL (defaults to https://api.github.com)
    #[arg(long, env = "GITHUB_API_URL", value_name = "URL", global = true)]
    github_api_url: Option<String>,

    /// Asgard endpoint including the region, e.g. http://asgard:8091/us-east-1
    #[arg(long, env = "ASGARD_API_ENDPOINTS", value_name = "URL", global = true)]
    asgard_url: Option<String>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Check the combined test status of a PR or commit once
    CheckPrTestsStatus(StatusArgs),

    /// Poll the combined test status of a PR or commit until it settles
    PollPrTestsStatus(StatusArgs),

    /// Check whether a PR is against the given branch
    CheckPrAgainstBranch(BranchArgs),

    /// Enable an autoscaling group
    EnableAsg(AsgArgs),

    /// Disable an autoscaling group
    DisableAsg(AsgArgs),

    /// Delete an autoscaling group
    DeleteAsg(DeleteArgs),

    /// Deploy an AMI as new ASGs with a red/black swap
    DeployAsg(DeployArgs),

    /// Roll back to the ASGs recorded by a previous deploy
    RollbackAsg(RollbackArgs),
}

#[derive(clap::Args, Debug)]
struct RepoArgs {
    /// Org from the GitHub repository URL https://github.com/<org>/<repo>
    #[arg(long, default_value = "edx")]
    org: String,

    /// Repo name from the GitHub repository URL https://github.com/<org>/<repo>,
    /// or `org/repo` to override --org
    #[arg(long)]
    repo: String,
}

impl RepoArgs {
    fn repo_id(&self) -> Result<RepoId> {
        if self.repo.contains('/') {
            self.repo.parse()
        } else {
            Ok(RepoId::new(&self.org, &self.repo))
        }
    }
}

#[derive(clap::Args, Debug)]
struct StatusArgs {
    #[command(flatten)]
    repo: RepoArgs,

    /// Pull request number to check
    #[arg(long, alias = "pr_number", conflicts_with = "commit_hash")]
    pr_number: Option<u64>,

    /// Commit hash to check
    #[arg(long, alias = "commit_hash")]
    commit_hash: Option<String>,

    /// Regex of validation contexts to include even when excluded
    #[arg(long)]
    include_contexts: Option<String>,

    /// Regex of validation contexts to exclude from the status check
    #[arg(long, default_value = DEFAULT_EXCLUDE_CONTEXTS)]
    exclude_contexts: String,
}

impl StatusArgs {
    fn into_query(self) -> Result<StatusQuery> {
        Ok(StatusQuery {
            repo: self.repo.repo_id()?,
            target: Target::from_args(self.pr_number, self.commit_hash)?,
            include_contexts: self.include_contexts,
            exclude_contexts: Some(self.exclude_contexts),
        })
    }
}

#[derive(clap::Args, Debug)]
struct BranchArgs {
    #[command(flatten)]
    repo: RepoArgs,

    /// Pull request number to check
    #[arg(long, alias = "pr_number")]
    pr_number: u64,

    /// Branch to check as the base of the PR
    #[arg(long, alias = "branch_name")]
    branch: String,
}

#[derive(clap::Args, Debug)]
struct AsgArgs {
    /// Name of the autoscaling group
    #[arg(long, alias = "asg_name", env = "ASG_NAME")]
    asg: String,
}

#[derive(clap::Args, Debug)]
struct DeleteArgs {
    #[command(flatten)]
    asg: AsgArgs,

    /// Delete the ASG even if it is enabled
    #[arg(long)]
    allow_active: bool,

    /// Delete the ASG even if it is the last one in its cluster
    #[arg(long)]
    allow_last: bool,

    /// Return as soon as deletion has started
    #[arg(long)]
    no_wait: bool,
}

impl DeleteArgs {
    fn options(&self) -> DeleteOptions {
        DeleteOptions {
            fail_if_active: !self.allow_active,
            fail_if_last: !self.allow_last,
            wait_for_deletion: !self.no_wait,
        }
    }
}

#[derive(clap::Args, Debug)]
struct DeployArgs {
    /// The AMI to deploy
    #[arg(long, alias = "ami_id", env = "AMI_ID")]
    ami_id: String,

    /// Existing ASGs whose clusters receive the new ASGs
    #[arg(long = "asg", value_name = "ASG", required = true, value_delimiter = ',')]
    asgs: Vec<String>,

    /// Write the deploy record here instead of stdout
    #[arg(long, alias = "out_file")]
    out_file: Option<PathBuf>,

    /// Don't actually deploy
    #[arg(long, alias = "dry_run", env = "DRY_RUN")]
    dry_run: bool,
}

#[derive(clap::Args, Debug)]
struct RollbackArgs {
    /// Deploy record listing current_asgs, disabled_asgs and ami_id
    #[arg(long, alias = "config_file", env = "CONFIG_FILE")]
    config_file: PathBuf,

    /// Write the rollback record here instead of stdout
    #[arg(long, alias = "out_file")]
    out_file: Option<PathBuf>,

    /// Don't actually roll back
    #[arg(long, alias = "dry_run", env = "DRY_RUN")]
    dry_run: bool,
}

fn exit_code(success: bool) -> ExitCode {
    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    let runtime = tubular::runtime::RealRuntime;

    let success = match cli.command {
        Commands::CheckPrTestsStatus(args) => {
            commands::check_pr_tests_status(&runtime, args.into_query()?, cli.github_api_url)
                .await?
        }
        Commands::PollPrTestsStatus(args) => {
            commands::poll_pr_tests_status(&runtime, args.into_query()?, cli.github_api_url)
                .await?
        }
        Commands::CheckPrAgainstBranch(args) => {
            commands::check_pr_against_branch(
                &runtime,
                args.repo.repo_id()?,
                args.pr_number,
                &args.branch,
                cli.github_api_url,
            )
            .await?
        }
        Commands::EnableAsg(args) => {
            commands::enable_asg(&runtime, &args.asg, cli.asgard_url).await?;
            true
        }
        Commands::DisableAsg(args) => {
            commands::disable_asg(&runtime, &args.asg, cli.asgard_url).await?;
            true
        }
        Commands::DeleteAsg(args) => {
            let options = args.options();
            commands::delete_asg(&runtime, &args.asg.asg, options, cli.asgard_url).await?;
            true
        }
        Commands::DeployAsg(args) if args.dry_run => {
            println!("Would have triggered a deploy of {}", args.ami_id);
            true
        }
        Commands::DeployAsg(args) => {
            commands::deploy_asg(
                &runtime,
                &args.ami_id,
                &args.asgs,
                args.out_file.as_deref(),
                cli.asgard_url,
            )
            .await?;
            true
        }
        Commands::RollbackAsg(args) if args.dry_run => {
            let plan = commands::read_deploy_info(&runtime, &args.config_file)?;
            println!(
                "Would have triggered a rollback of {}",
                plan.ami_id.as_deref().unwrap_or("none")
            );
            true
        }
        Commands::RollbackAsg(args) => {
            commands::rollback_asg(
                &runtime,
                &args.config_file,
                args.out_file.as_deref(),
                cli.asgard_url,
            )
            .await?;
            true
        }
    };
    Ok(exit_code(success))
}
