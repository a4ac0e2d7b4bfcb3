//! Command-line front end
//!
//! One invocation runs one manager operation against one scope, after an
//! initial load. Output lines are returned rather than printed so `main`
//! decides where they go.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use drag_reorder::{reorder_by_drop, DropTarget};
use serde_json::Value;
use site_store::domain::Entity;
use site_store::{OrderedRecord, Payload, RecordId};
use thiserror::Error;

use crate::app::AppError;
use crate::manager::{AssetCleanup, ManagerError, MoveOutcome, PositionedCollectionManager};

pub const DEFAULT_CONFIG: &str = "site-admin.json";

/// Site Admin - manage ordered site content from the terminal
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file (JSON); defaults apply when it does not exist
    #[arg(short, long, env = "SITE_ADMIN_CONFIG", default_value = DEFAULT_CONFIG)]
    pub config: PathBuf,

    /// Use a throwaway in-memory store instead of the configured backend
    #[arg(long)]
    pub memory: bool,

    /// Custom log directory (overrides the config file)
    #[arg(long, env = "SITE_ADMIN_LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    /// Configured scope name, e.g. grid_images
    pub scope: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Show records in display order
    List,
    /// Append a record at the end
    Add {
        /// key=value; values parse as JSON, falling back to a string
        #[arg(short, long = "field", value_parser = parse_field)]
        fields: Vec<(String, Value)>,
    },
    /// Swap a record with the one before it
    Up { id: String },
    /// Swap a record with the one after it
    Down { id: String },
    /// Give every record a new position, in the order listed
    Reorder {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Move one record next to another, or to the end
    Move {
        id: String,
        #[arg(long, conflicts_with_all = ["after", "end"])]
        before: Option<String>,
        #[arg(long, conflicts_with = "end")]
        after: Option<String>,
        #[arg(long)]
        end: bool,
    },
    Delete { id: String },
    /// Change cosmetic fields; the position field is ignored
    Edit {
        id: String,
        #[arg(short, long = "field", value_parser = parse_field, required = true)]
        fields: Vec<(String, Value)>,
    },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::List => "list",
            Command::Add { .. } => "add",
            Command::Up { .. } => "up",
            Command::Down { .. } => "down",
            Command::Reorder { .. } => "reorder",
            Command::Move { .. } => "move",
            Command::Delete { .. } => "delete",
            Command::Edit { .. } => "edit",
        }
    }
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    App(#[from] AppError),
    #[error(transparent)]
    Manager(#[from] ManagerError),
    #[error("no record {0} in this scope")]
    UnknownRecord(String),
    #[error("move needs one of --before, --after or --end")]
    MissingTarget,
}

pub fn parse_field(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got {:?}", raw))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in {:?}", raw));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

fn to_payload(fields: &[(String, Value)]) -> Payload {
    fields.iter().cloned().collect()
}

fn format_record(record: &OrderedRecord) -> String {
    format!(
        "{:>5}  {:<12} {}",
        record.position,
        record.id,
        Value::Object(record.payload.clone())
    )
}

fn locate(manager: &PositionedCollectionManager, id: &str) -> Result<(usize, OrderedRecord), CliError> {
    manager
        .find(&RecordId::from(id))
        .ok_or_else(|| CliError::UnknownRecord(id.to_string()))
}

fn move_message(outcome: MoveOutcome, id: &str, direction: &str) -> String {
    match outcome {
        MoveOutcome::Moved => format!("moved {} {}", id, direction),
        MoveOutcome::AtBoundary => format!("{} is already at the {}", id, if direction == "up" { "top" } else { "bottom" }),
    }
}

/// Run one command against a freshly loaded manager
pub async fn execute(manager: &PositionedCollectionManager, command: &Command) -> Result<Vec<String>, CliError> {
    manager.load().await?;

    let lines = match command {
        Command::List => {
            let mut lines: Vec<String> = manager.snapshot().iter().map(format_record).collect();
            for (position, ids) in manager.position_conflicts() {
                let ids: Vec<String> = ids.iter().map(ToString::to_string).collect();
                lines.push(format!("warning: position {} shared by {}", position, ids.join(", ")));
            }
            lines
        }
        Command::Add { fields } => {
            let created = manager.append(to_payload(fields)).await?;
            vec![format!("added {} at position {}", created.id, created.position)]
        }
        Command::Up { id } => {
            let (index, record) = locate(manager, id)?;
            let outcome = manager.move_up(&record, index).await?;
            vec![move_message(outcome, id, "up")]
        }
        Command::Down { id } => {
            let (index, record) = locate(manager, id)?;
            let outcome = manager.move_down(&record, index).await?;
            vec![move_message(outcome, id, "down")]
        }
        Command::Reorder { ids } => {
            let order = ids
                .iter()
                .map(|id| locate(manager, id).map(|(_, record)| record))
                .collect::<Result<Vec<_>, _>>()?;
            manager.bulk_reorder(&order).await?;
            vec![format!("reordered {} records", order.len())]
        }
        Command::Move { id, before, after, end } => {
            let target = match (before, after, end) {
                (Some(other), _, _) => DropTarget::Before(RecordId::from(other.as_str())),
                (_, Some(other), _) => DropTarget::After(RecordId::from(other.as_str())),
                (_, _, true) => DropTarget::End,
                _ => return Err(CliError::MissingTarget),
            };
            let (_, record) = locate(manager, id)?;
            match reorder_by_drop(&manager.snapshot(), &record.id, &target, Entity::id) {
                Some(order) => {
                    manager.bulk_reorder(&order).await?;
                    vec![format!("moved {}", id)]
                }
                None => vec![format!("{} stays where it is", id)],
            }
        }
        Command::Delete { id } => {
            let (_, record) = locate(manager, id)?;
            let mut lines = vec![format!("deleted {}", id)];
            match manager.delete(&record).await? {
                AssetCleanup::NotApplicable => {}
                AssetCleanup::Removed { bucket, path } => lines.push(format!("removed {}/{}", bucket, path)),
                AssetCleanup::Orphaned { reason } => lines.push(format!("warning: asset left behind: {}", reason)),
            }
            lines
        }
        Command::Edit { id, fields } => {
            let (_, record) = locate(manager, id)?;
            manager.edit(&record.id, to_payload(fields)).await?;
            vec![format!("updated {}", id)]
        }
    };

    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use serde_json::json;
    use site_store::repository::MemoryRecordStore;
    use site_store::Scope;

    use crate::notify::ChannelNotifier;

    async fn seeded() -> (Arc<MemoryRecordStore>, PositionedCollectionManager) {
        let scope = Scope::new("grid_images").with_start_position(1);
        let store = Arc::new(MemoryRecordStore::new());
        store
            .seed(
                &scope,
                vec![
                    OrderedRecord::new("a", 1),
                    OrderedRecord::new("b", 2),
                    OrderedRecord::new("c", 3),
                ],
            )
            .await;
        let (notifier, _rx) = ChannelNotifier::channel();
        let manager = PositionedCollectionManager::new(scope, store.clone(), Arc::new(notifier)).unwrap();
        (store, manager)
    }

    fn order(manager: &PositionedCollectionManager) -> Vec<String> {
        manager.snapshot().iter().map(|r| r.id.to_string()).collect()
    }

    #[test]
    fn test_parse_field() {
        assert_eq!(parse_field("n=3").unwrap(), ("n".to_string(), json!(3)));
        assert_eq!(parse_field("title=Hello").unwrap(), ("title".to_string(), json!("Hello")));
        assert_eq!(parse_field("tags=[\"x\"]").unwrap(), ("tags".to_string(), json!(["x"])));
        assert_eq!(parse_field("empty=").unwrap(), ("empty".to_string(), json!("")));
        assert!(parse_field("novalue").is_err());
        assert!(parse_field("=3").is_err());
    }

    #[test]
    fn test_cli_parses_move() {
        let cli = Cli::try_parse_from(["site-admin", "grid_images", "move", "c", "--before", "a"]).unwrap();
        assert_eq!(cli.scope, "grid_images");
        assert_eq!(
            cli.command,
            Command::Move { id: "c".into(), before: Some("a".into()), after: None, end: false }
        );
        assert!(Cli::try_parse_from(["site-admin", "grid_images", "move", "c", "--before", "a", "--end"]).is_err());
        assert!(Cli::try_parse_from(["site-admin", "grid_images", "reorder"]).is_err());
    }

    #[tokio::test]
    async fn test_move_before_reorders_whole_list() {
        let (_store, manager) = seeded().await;
        let command = Command::Move { id: "c".into(), before: Some("a".into()), after: None, end: false };

        execute(&manager, &command).await.unwrap();

        assert_eq!(order(&manager), vec!["c", "a", "b"]);
        let positions: Vec<i32> = manager.snapshot().iter().map(|r| r.position).collect();
        assert_eq!(positions, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_move_without_change_sends_nothing() {
        let (store, manager) = seeded().await;
        let command = Command::Move { id: "c".into(), before: None, after: None, end: true };

        let lines = execute(&manager, &command).await.unwrap();

        assert_eq!(lines, vec!["c stays where it is"]);
        assert!(store.calls(site_store::repository::StoreOp::Update).await.is_empty());
    }

    #[tokio::test]
    async fn test_up_at_top_reports_boundary() {
        let (_store, manager) = seeded().await;
        let lines = execute(&manager, &Command::Up { id: "a".into() }).await.unwrap();
        assert_eq!(lines, vec!["a is already at the top"]);
    }

    #[tokio::test]
    async fn test_unknown_record() {
        let (_store, manager) = seeded().await;
        let err = execute(&manager, &Command::Delete { id: "zz".into() }).await.unwrap_err();
        assert!(matches!(err, CliError::UnknownRecord(id) if id == "zz"));
    }

    #[tokio::test]
    async fn test_add_then_list() {
        let (_store, manager) = seeded().await;
        let add = Command::Add { fields: vec![("title".into(), json!("new"))] };

        let lines = execute(&manager, &add).await.unwrap();
        assert!(lines[0].ends_with("at position 4"));

        let listed = execute(&manager, &Command::List).await.unwrap();
        assert_eq!(listed.len(), 4);
        assert!(listed[3].contains("\"title\":\"new\""));
    }
}
