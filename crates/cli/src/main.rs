//! agentkit CLI: run one memory-backed, optionally routed turn.
//!
//! ```text
//! agentkit --prompt base.txt --message "Is invoice 123 paid?" \
//!          --router prompts/router.md --session alice --verbose
//! ```

use agentkit_agent::{RouteRequest, TurnRequest};
use agentkit_config::AppConfig;
use clap::Parser;
use std::path::PathBuf;

mod app;
mod scripts;

#[derive(Parser, Debug)]
#[command(
    name = "agentkit",
    about = "agentkit: memory-backed, tool-using, routed LLM turns",
    version
)]
struct Cli {
    /// Pinned context file, sent first in every prompt
    #[arg(short, long)]
    prompt: PathBuf,

    /// The user message
    #[arg(short, long)]
    message: String,

    /// Conversation id; a fresh UUID when omitted
    #[arg(short, long, env = "AGENTKIT_SESSION")]
    session: Option<String>,

    /// Router instructions; sibling files are the candidate prompts
    #[arg(short, long)]
    router: Option<PathBuf>,

    /// Extra system prompt, repeatable
    #[arg(long = "system", value_name = "TEXT")]
    system: Vec<String>,

    /// Print the JSON trace instead of the reply
    #[arg(short, long)]
    verbose: bool,

    /// Config file (default: ~/.agentkit/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

impl Cli {
    fn route_request(self) -> RouteRequest {
        let session = self
            .session
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let mut turn = TurnRequest::new(session, self.prompt, self.message).with_verbose(self.verbose);
        for extra in self.system {
            turn = turn.with_system_prompt(extra);
        }

        let request = RouteRequest::new(turn);
        match self.router {
            Some(path) => request.with_router(path),
            None => request,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = match &cli.config {
        Some(path) => AppConfig::load_with_env(path)?,
        None => AppConfig::load()?,
    };

    let router = app::build_router(&config).await?;
    let reply = router.respond(cli.route_request()).await?;
    println!("{reply}");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn flags_build_a_routed_request() {
        let cli = Cli::try_parse_from([
            "agentkit",
            "--prompt",
            "base.txt",
            "--message",
            "hi",
            "--session",
            "alice",
            "--router",
            "prompts/router.md",
            "--system",
            "be brief",
            "--system",
            "answer in English",
            "--verbose",
        ])
        .unwrap();

        let request = cli.route_request();
        assert_eq!(request.router_path, Some(PathBuf::from("prompts/router.md")));
        assert_eq!(request.turn.session_id, "alice");
        assert_eq!(request.turn.prompt_path, PathBuf::from("base.txt"));
        assert_eq!(request.turn.extra_system, vec!["be brief", "answer in English"]);
        assert!(request.turn.verbose);
    }

    #[test]
    fn missing_session_gets_a_uuid() {
        let cli =
            Cli::try_parse_from(["agentkit", "-p", "base.txt", "-m", "hi"]).unwrap();
        let request = cli.route_request();
        assert!(request.router_path.is_none());
        assert!(uuid::Uuid::parse_str(&request.turn.session_id).is_ok());
    }

    #[test]
    fn prompt_and_message_are_required() {
        assert!(Cli::try_parse_from(["agentkit", "--message", "hi"]).is_err());
        assert!(Cli::try_parse_from(["agentkit", "--prompt", "base.txt"]).is_err());
    }
}
