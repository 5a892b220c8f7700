//! Quest management CLI commands.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use serde::Deserialize;

use crate::adapters::sqlite::SqliteQuestRepository;
use crate::cli::commands::open_database;
use crate::cli::output::{output, table, truncate, CommandOutput};
use crate::domain::models::{Config, Quest, TriggerConfig};
use crate::services::{ImportMode, ImportResult, QuestRegistry};

#[derive(Args, Debug)]
pub struct QuestArgs {
    #[command(subcommand)]
    pub command: QuestCommands,
}

#[derive(Subcommand, Debug)]
pub enum QuestCommands {
    /// List all quests
    List {
        /// Only show enabled quests
        #[arg(long)]
        enabled_only: bool,
    },
    /// Show a quest definition
    Show {
        title: String,
    },
    /// Import quests from a YAML file
    Import {
        file: PathBuf,

        /// Replace quests whose title already exists
        #[arg(long)]
        replace: bool,
    },
    /// Enable a quest
    Enable {
        title: String,
    },
    /// Disable a quest
    Disable {
        title: String,
    },
    /// Delete a quest
    Delete {
        title: String,
    },
}

#[derive(Debug, serde::Serialize)]
pub struct QuestRow {
    pub title: String,
    pub trigger: String,
    pub target: String,
    pub conditions: usize,
    pub commands: usize,
    pub enabled: bool,
}

impl From<&Quest> for QuestRow {
    fn from(quest: &Quest) -> Self {
        let target = match &quest.trigger {
            TriggerConfig::ReplyToPost { post_uri, .. } | TriggerConfig::Poll { post_uri, .. } => {
                post_uri.clone()
            }
            TriggerConfig::NetworkPhrase { phrases } => phrases
                .iter()
                .map(|p| p.phrase.as_str())
                .collect::<Vec<_>>()
                .join(", "),
            TriggerConfig::PartnerCompletion { collection, .. } => collection.clone(),
        };
        Self {
            title: quest.title.clone(),
            trigger: quest.trigger_type().to_string(),
            target,
            conditions: quest.conditions.iter().filter(|c| !c.disabled).count(),
            commands: quest.commands.len(),
            enabled: quest.enabled,
        }
    }
}

#[derive(Debug, serde::Serialize)]
pub struct QuestListOutput {
    pub quests: Vec<QuestRow>,
    pub total: usize,
}

impl CommandOutput for QuestListOutput {
    fn to_human(&self) -> String {
        if self.quests.is_empty() {
            return "No quests found.".to_string();
        }
        let mut t = table(&["TITLE", "TRIGGER", "TARGET", "CONDITIONS", "COMMANDS", "ENABLED"]);
        for q in &self.quests {
            t.add_row(vec![
                truncate(&q.title, 30),
                q.trigger.clone(),
                truncate(&q.target, 50),
                q.conditions.to_string(),
                q.commands.to_string(),
                if q.enabled { "yes" } else { "no" }.to_string(),
            ]);
        }
        format!("Found {} quest(s):\n{t}", self.total)
    }
}

#[derive(Debug, serde::Serialize)]
pub struct QuestDetailOutput {
    pub quest: Quest,
}

impl CommandOutput for QuestDetailOutput {
    fn to_human(&self) -> String {
        let q = &self.quest;
        let mut lines = vec![
            format!("Quest: {}", q.title),
            format!("ID: {}", q.id),
            format!("Trigger: {}", q.trigger_type()),
            format!("Enabled: {}", q.enabled),
            format!("Operator: {:?}", q.condition_operator),
        ];
        if !q.description.is_empty() {
            lines.push(format!("Description: {}", q.description));
        }

        lines.push("\nConditions:".to_string());
        for (i, c) in q.conditions.iter().enumerate() {
            let mut flags = Vec::new();
            if let Some(op) = c.operator {
                flags.push(format!("{op:?}").to_uppercase());
            }
            if c.once_only {
                flags.push("once".to_string());
            }
            if c.disabled {
                flags.push("disabled".to_string());
            }
            lines.push(format!("  [{i}] {}({}) {}", c.name, c.args.join(", "), flags.join(" ")));
        }

        lines.push("\nCommands:".to_string());
        for c in &q.commands {
            lines.push(format!("  - {}({})", c.name, c.args.join(", ")));
        }
        lines.join("\n")
    }
}

#[derive(Debug, serde::Serialize)]
pub struct ImportedQuest {
    pub title: String,
    pub result: String,
}

#[derive(Debug, serde::Serialize)]
pub struct ImportOutput {
    pub imported: Vec<ImportedQuest>,
    pub failed: Vec<ImportedQuest>,
}

impl CommandOutput for ImportOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![format!(
            "Imported {} quest(s), {} failed",
            self.imported.len(),
            self.failed.len()
        )];
        for q in &self.imported {
            lines.push(format!("  {} {}", q.result, q.title));
        }
        for q in &self.failed {
            lines.push(format!("  failed {}: {}", q.title, q.result));
        }
        lines.join("\n")
    }
}

#[derive(Debug, serde::Serialize)]
pub struct QuestActionOutput {
    pub success: bool,
    pub message: String,
}

impl CommandOutput for QuestActionOutput {
    fn to_human(&self) -> String {
        self.message.clone()
    }
}

/// Accepted quest file layouts.
#[derive(Deserialize)]
#[serde(untagged)]
enum QuestFile {
    Wrapped { quests: Vec<Quest> },
    Many(Vec<Quest>),
    One(Box<Quest>),
}

/// Parse a quest file: a single quest, a list, or a `quests:` list.
pub fn parse_quest_file(contents: &str) -> Result<Vec<Quest>> {
    let file: QuestFile = serde_yaml::from_str(contents).context("Invalid quest file")?;
    Ok(match file {
        QuestFile::Wrapped { quests } | QuestFile::Many(quests) => quests,
        QuestFile::One(quest) => vec![*quest],
    })
}

pub async fn execute(args: QuestArgs, config: Config, json_mode: bool) -> Result<()> {
    let pool = open_database(&config).await?;
    let registry = QuestRegistry::new(Arc::new(SqliteQuestRepository::new(pool)));

    match args.command {
        QuestCommands::List { enabled_only } => {
            let quests = if enabled_only {
                registry.list_enabled().await?
            } else {
                registry.list().await?
            };
            let out = QuestListOutput {
                total: quests.len(),
                quests: quests.iter().map(QuestRow::from).collect(),
            };
            output(&out, json_mode);
        }

        QuestCommands::Show { title } => {
            let quest = registry.get(&title).await?;
            output(&QuestDetailOutput { quest }, json_mode);
        }

        QuestCommands::Import { file, replace } => {
            let contents = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let mode = if replace {
                ImportMode::Replace
            } else {
                ImportMode::CreateOnly
            };

            let mut out = ImportOutput {
                imported: Vec::new(),
                failed: Vec::new(),
            };
            for quest in parse_quest_file(&contents)? {
                let title = quest.title.clone();
                match registry.import(quest, mode).await {
                    Ok(result) => out.imported.push(ImportedQuest {
                        title,
                        result: match result {
                            ImportResult::Created => "created",
                            ImportResult::Replaced => "replaced",
                        }
                        .to_string(),
                    }),
                    Err(e) => out.failed.push(ImportedQuest {
                        title,
                        result: e.to_string(),
                    }),
                }
            }
            output(&out, json_mode);
        }

        QuestCommands::Enable { title } => {
            registry.enable(&title).await?;
            output(
                &QuestActionOutput {
                    success: true,
                    message: format!("Quest enabled: {title}"),
                },
                json_mode,
            );
        }

        QuestCommands::Disable { title } => {
            registry.disable(&title).await?;
            output(
                &QuestActionOutput {
                    success: true,
                    message: format!("Quest disabled: {title}"),
                },
                json_mode,
            );
        }

        QuestCommands::Delete { title } => {
            registry.delete(&title).await?;
            output(
                &QuestActionOutput {
                    success: true,
                    message: format!("Quest deleted: {title}"),
                },
                json_mode,
            );
        }
    }

    Ok(())
}
