//! Knowledge command handler.
//!
//! Manages the workspace fragment store.

use clap::{Args, Subcommand};
use ragloop_core::{config::AppConfig, AppResult};
use ragloop_knowledge::{import_file, open_store, FragmentStore};
use std::path::PathBuf;

/// Document store management
#[derive(Args, Debug)]
pub struct KnowledgeCommand {
    #[command(subcommand)]
    pub action: KnowledgeAction,
}

#[derive(Subcommand, Debug)]
pub enum KnowledgeAction {
    /// Import pre-partitioned elements from a JSONL file
    Import(KnowledgeImportCommand),
    /// Show store statistics
    Stats(KnowledgeStatsCommand),
    /// Delete every stored document
    Clean(KnowledgeCleanCommand),
}

/// Import a JSONL file as one document
#[derive(Args, Debug)]
pub struct KnowledgeImportCommand {
    /// JSONL file with one `{text, page?, kind?}` element per line
    pub file: PathBuf,

    /// Source name shown in citations (default: file name)
    #[arg(long)]
    pub source: Option<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl KnowledgeImportCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Importing {:?}", self.file);

        let store = open_store(config)?;
        let stats = import_file(&store, &self.file, self.source.as_deref()).await?;

        if self.json {
            let output = serde_json::json!({
                "parentId": stats.parent_id,
                "source": stats.source,
                "fragmentsCount": stats.fragments_count,
                "skippedLines": stats.skipped_lines,
                "durationSecs": stats.duration_secs,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else {
            println!(
                "Imported '{}' ({} fragments, {} blank lines skipped) in {:.2}s",
                stats.source, stats.fragments_count, stats.skipped_lines, stats.duration_secs
            );
        }

        Ok(())
    }
}

/// Show store statistics
#[derive(Args, Debug)]
pub struct KnowledgeStatsCommand {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl KnowledgeStatsCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        let store = open_store(config)?;
        let stats = store.stats().await?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&stats)?);
        } else {
            println!("Store: {:?}", config.fragment_store_path());
            println!("  Documents: {}", stats.documents_count);
            println!("  Fragments: {}", stats.fragments_count);
            for doc in &stats.documents {
                println!(
                    "  - {} ({} fragments, imported {})",
                    doc.source,
                    doc.fragment_count,
                    doc.imported_at.format("%Y-%m-%d %H:%M")
                );
            }
        }

        Ok(())
    }
}

/// Delete every stored document
#[derive(Args, Debug)]
pub struct KnowledgeCleanCommand {}

impl KnowledgeCleanCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        let store = open_store(config)?;
        store.clear()?;

        println!("Document store cleaned");
        Ok(())
    }
}

impl KnowledgeCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        match &self.action {
            KnowledgeAction::Import(cmd) => cmd.execute(config).await,
            KnowledgeAction::Stats(cmd) => cmd.execute(config).await,
            KnowledgeAction::Clean(cmd) => cmd.execute(config).await,
        }
    }
}
