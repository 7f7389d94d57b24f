//! Ask command handler.
//!
//! Runs one question through the corrective retrieval loop.

use clap::Args;
use ragloop_agent::{Agent, AskRequest, AskResponse};
use ragloop_core::{config::AppConfig, AppResult};

/// Thread used when none is given.
pub const DEFAULT_THREAD: &str = "default";

/// Ask one question on a conversation thread
#[derive(Args, Debug)]
pub struct AskCommand {
    /// The question to ask
    pub question: String,

    /// Conversation thread id
    #[arg(short, long, default_value = DEFAULT_THREAD)]
    pub thread: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl AskCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        config.validate()?;
        let agent = Agent::from_config(config)?;

        let response = agent
            .ask(AskRequest::new(self.question.clone(), self.thread.clone()))
            .await?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&response)?);
        } else {
            print_response(&response);
        }

        Ok(())
    }
}

pub fn print_response(response: &AskResponse) {
    println!("{}", response.answer);
    println!();

    let sources = match response.metadata.sources_count {
        0 => "no supporting documents".to_string(),
        1 => "1 supporting document".to_string(),
        n => format!("{} supporting documents", n),
    };
    println!("({}, {} retries)", sources, response.metadata.retries);
}
