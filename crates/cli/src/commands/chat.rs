//! Chat command handler.
//!
//! A line-oriented conversation: every stdin line is one run on the same thread.

use super::ask::print_response;
use clap::Args;
use ragloop_agent::{Agent, AskRequest};
use ragloop_core::{config::AppConfig, AppResult};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Interactive conversation over stdin
#[derive(Args, Debug)]
pub struct ChatCommand {
    /// Conversation thread id (default: a new thread)
    #[arg(short, long)]
    pub thread: Option<String>,
}

impl ChatCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        config.validate()?;
        let agent = Agent::from_config(config)?;

        let thread_id = self
            .thread
            .clone()
            .unwrap_or_else(|| format!("chat-{}", uuid::Uuid::new_v4()));
        eprintln!("Thread: {} (type 'exit' to quit)", thread_id);

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            print!("> ");
            std::io::stdout().flush()?;

            let Some(line) = lines.next_line().await? else {
                break;
            };
            let question = line.trim();

            if question.is_empty() {
                continue;
            }
            if matches!(question, "exit" | "quit") {
                break;
            }

            // A failed run ends that turn only
            match agent.ask(AskRequest::new(question, thread_id.as_str())).await {
                Ok(response) => print_response(&response),
                Err(e) => eprintln!("Error: {}", e),
            }
            println!();
        }

        Ok(())
    }
}
