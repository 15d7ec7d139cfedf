pub mod cli;
pub mod control;
pub mod propose;
pub mod serve;

use ghostgate_core::api::{AppConfig, CliError};

use cli::{Args, Commands};

/// Runs one subcommand and returns the process exit code.
pub async fn dispatch(args: Args, cfg: AppConfig) -> Result<i32, CliError> {
    let base_url = args.control_url.unwrap_or_else(|| cfg.control_url());
    let client = || control::client_for(&base_url, cfg.control.request_timeout_ms);

    match args.command {
        Commands::Serve(serve_args) => serve::handle_serve(serve_args, cfg.clone()).await?,
        Commands::Propose(propose_args) => {
            return propose::handle_propose(propose_args, &cfg).await
        }
        Commands::Pending => control::handle_pending(&client()?).await?,
        Commands::History => control::handle_history(&client()?).await?,
        Commands::Approve { id } => control::handle_decide(&client()?, id, true).await?,
        Commands::Reject { id } => control::handle_decide(&client()?, id, false).await?,
        Commands::Policy(policy_args) => control::handle_policy(&client()?, policy_args).await?,
        Commands::Session(action) => control::handle_session(&client()?, action).await?,
        Commands::Watch => control::handle_watch(&client()?).await?,
        Commands::Shutdown => control::handle_shutdown(&client()?).await?,
    }
    Ok(0)
}
