//! Thread command handler.

use clap::{Args, Subcommand};
use ragloop_agent::{CheckpointStore, SqliteCheckpointStore};
use ragloop_core::{config::AppConfig, AppError, AppResult};

/// Inspect or clear conversation threads
#[derive(Args, Debug)]
pub struct ThreadCommand {
    #[command(subcommand)]
    pub action: ThreadAction,
}

#[derive(Subcommand, Debug)]
pub enum ThreadAction {
    /// Print a thread's messages and its last run
    Show {
        /// Thread id
        id: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a thread's checkpoint
    Clear {
        /// Thread id
        id: String,
    },
}

impl ThreadCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        let store = SqliteCheckpointStore::open(&config.checkpoint_path())?;

        match &self.action {
            ThreadAction::Show { id, json } => {
                let checkpoint = store
                    .load(id)
                    .await?
                    .ok_or_else(|| AppError::Agent(format!("Unknown thread: {}", id)))?;

                if *json {
                    println!("{}", serde_json::to_string_pretty(&checkpoint)?);
                    return Ok(());
                }

                println!("Thread {} (updated {})", id, checkpoint.updated_at.to_rfc3339());
                for turn in &checkpoint.messages {
                    println!("{}: {}", turn.role.as_str(), turn.text);
                }

                let last = &checkpoint.last_run;
                println!();
                println!(
                    "Last run: retries {}, sources {}, final query {:?}",
                    last.retry_count, last.sources_count, last.question
                );
                Ok(())
            }
            ThreadAction::Clear { id } => {
                if store.delete(id).await? {
                    println!("Thread '{}' cleared", id);
                } else {
                    println!("Thread '{}' not found", id);
                }
                Ok(())
            }
        }
    }
}
