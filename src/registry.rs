//! Automation definitions and the registry interface.
//!
//! The registry is an external collaborator to the pipeline: the runner only
//! reads definitions. Create/edit/delete live elsewhere. Two implementations
//! are provided — an in-memory map (tests, embedding) and a read-only JSON
//! file loader (standalone binary).

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::RegistryError;

/// Destination kind for an automation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutomationType {
    /// Ordinary chat — send directly, no permission check.
    Chat,
    /// Broadcast channel — requires posting rights.
    Channel,
}

/// Whether an automation is eligible to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutomationStatus {
    Active,
    Paused,
}

/// A standing automation definition: destination, generation prompt, trigger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Automation {
    pub id: String,
    /// Destination address on the transport.
    pub chat_id: String,
    /// Display label for logs and history entries.
    pub chat_name: String,
    /// Generation instructions for stage 1.
    pub system_prompt: String,
    /// Optional extra trigger instruction appended to the stage-1 prompt.
    #[serde(default)]
    pub scheduled_prompt: Option<String>,
    pub automation_type: AutomationType,
    pub status: AutomationStatus,
    /// Cron expression. Required for channel automations.
    #[serde(default)]
    pub schedule: Option<String>,
    /// Base name for this automation's history log files.
    pub log_file: String,
}

impl Automation {
    /// Validate the definition.
    ///
    /// Channel automations must carry a schedule, and any schedule present
    /// must be a parseable cron expression. Enforced at load time, not per
    /// run.
    pub fn validate(&self) -> Result<(), RegistryError> {
        if self.automation_type == AutomationType::Channel && self.schedule.is_none() {
            return Err(RegistryError::Invalid {
                id: self.id.clone(),
                reason: "channel automations require a schedule".to_string(),
            });
        }
        if let Some(ref schedule) = self.schedule
            && let Err(e) = cron::Schedule::from_str(schedule)
        {
            return Err(RegistryError::Invalid {
                id: self.id.clone(),
                reason: format!("invalid cron schedule '{schedule}': {e}"),
            });
        }
        if self.log_file.trim().is_empty() {
            return Err(RegistryError::Invalid {
                id: self.id.clone(),
                reason: "log_file must not be empty".to_string(),
            });
        }
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.status == AutomationStatus::Active
    }
}

/// Read-only view of automation definitions.
#[async_trait]
pub trait AutomationRegistry: Send + Sync {
    /// Look up a single automation by id.
    async fn get(&self, id: &str) -> Result<Option<Automation>, RegistryError>;

    /// List all automations (used by the scheduler).
    async fn list(&self) -> Result<Vec<Automation>, RegistryError>;
}

/// In-memory registry.
#[derive(Default)]
pub struct InMemoryRegistry {
    automations: RwLock<HashMap<String, Automation>>,
}

impl InMemoryRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn insert(&self, automation: Automation) -> Result<(), RegistryError> {
        automation.validate()?;
        self.automations
            .write()
            .await
            .insert(automation.id.clone(), automation);
        Ok(())
    }
}

#[async_trait]
impl AutomationRegistry for InMemoryRegistry {
    async fn get(&self, id: &str) -> Result<Option<Automation>, RegistryError> {
        Ok(self.automations.read().await.get(id).cloned())
    }

    async fn list(&self) -> Result<Vec<Automation>, RegistryError> {
        Ok(self.automations.read().await.values().cloned().collect())
    }
}

/// Registry backed by a JSON file holding an array of automations.
///
/// The file is re-read on every lookup so external edits are picked up
/// without a restart. Invalid definitions fail the whole load — a registry
/// with a broken entry is a configuration error, not something to paper over.
pub struct JsonFileRegistry {
    path: PathBuf,
}

impl JsonFileRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn load(&self) -> Result<Vec<Automation>, RegistryError> {
        let raw = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            RegistryError::Load(format!("cannot read {}: {e}", self.path.display()))
        })?;
        let automations: Vec<Automation> = serde_json::from_str(&raw)?;
        for automation in &automations {
            automation.validate()?;
        }
        Ok(automations)
    }
}

#[async_trait]
impl AutomationRegistry for JsonFileRegistry {
    async fn get(&self, id: &str) -> Result<Option<Automation>, RegistryError> {
        Ok(self.load().await?.into_iter().find(|a| a.id == id))
    }

    async fn list(&self) -> Result<Vec<Automation>, RegistryError> {
        self.load().await
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{channel_automation, chat_automation};
    use super::*;

    #[test]
    fn channel_without_schedule_is_invalid() {
        let automation = Automation {
            schedule: None,
            ..channel_automation("a1")
        };
        assert!(matches!(
            automation.validate(),
            Err(RegistryError::Invalid { .. })
        ));
    }

    #[test]
    fn chat_without_schedule_is_valid() {
        assert!(chat_automation("a1").validate().is_ok());
    }

    #[test]
    fn bad_cron_is_invalid() {
        let automation = Automation {
            schedule: Some("not a cron".to_string()),
            ..chat_automation("a1")
        };
        assert!(automation.validate().is_err());
    }

    #[test]
    fn empty_log_file_is_invalid() {
        let automation = Automation {
            log_file: "  ".to_string(),
            ..chat_automation("a1")
        };
        assert!(automation.validate().is_err());
    }

    #[tokio::test]
    async fn in_memory_get_and_list() {
        let registry = InMemoryRegistry::new();
        registry.insert(chat_automation("a1")).await.unwrap();
        registry.insert(channel_automation("a2")).await.unwrap();

        let found = registry.get("a1").await.unwrap();
        assert_eq!(found.unwrap().id, "a1");
        assert!(registry.get("missing").await.unwrap().is_none());
        assert_eq!(registry.list().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn in_memory_rejects_invalid() {
        let registry = InMemoryRegistry::new();
        let bad = Automation {
            schedule: None,
            ..channel_automation("a1")
        };
        assert!(registry.insert(bad).await.is_err());
    }

    #[tokio::test]
    async fn json_file_registry_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("automations.json");
        let automations = vec![chat_automation("a1"), channel_automation("a2")];
        tokio::fs::write(&path, serde_json::to_string_pretty(&automations).unwrap())
            .await
            .unwrap();

        let registry = JsonFileRegistry::new(&path);
        assert_eq!(registry.list().await.unwrap().len(), 2);
        assert_eq!(registry.get("a2").await.unwrap().unwrap().id, "a2");
    }

    #[tokio::test]
    async fn json_file_registry_missing_file() {
        let registry = JsonFileRegistry::new("/definitely/not/here.json");
        assert!(matches!(
            registry.list().await,
            Err(RegistryError::Load(_))
        ));
    }
}
