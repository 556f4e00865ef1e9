//! TOML-based PromptRepository implementation

use std::path::PathBuf;

use duet_core::error::{DuetError, Result};
use duet_core::prompt::{PromptRepository, RoleId, RolePrompt, RolePrompts};
use serde::{Deserialize, Serialize};

use crate::paths::DuetPaths;
use crate::storage::AtomicFile;

/// On-disk shape of `prompts.toml`. A missing key means "use the default".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct PromptsFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role_a: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role_b: Option<String>,
}

impl PromptsFile {
    fn slot(&mut self, role: RoleId) -> &mut Option<String> {
        match role {
            RoleId::A => &mut self.role_a,
            RoleId::B => &mut self.role_b,
        }
    }

    fn into_prompts(self) -> RolePrompts {
        let resolve = |role: RoleId, text: Option<String>| match text {
            Some(text) => RolePrompt::new(role, text),
            None => RolePrompt::default_for(role),
        };
        RolePrompts {
            a: resolve(RoleId::A, self.role_a),
            b: resolve(RoleId::B, self.role_b),
        }
    }
}

/// Stores the two role prompts in `prompts.toml`.
pub struct TomlPromptRepository {
    file: AtomicFile<PromptsFile>,
}

impl TomlPromptRepository {
    pub fn new(paths: &DuetPaths) -> Self {
        Self::with_path(paths.prompts_file())
    }

    /// Creates a repository with a custom path (for testing)
    pub fn with_path(path: PathBuf) -> Self {
        Self {
            file: AtomicFile::toml(path),
        }
    }

    async fn update_slot(&self, role: RoleId, text: Option<String>) -> Result<()> {
        let file = self.file.clone();
        tokio::task::spawn_blocking(move || {
            file.update(PromptsFile::default(), |prompts| {
                *prompts.slot(role) = text;
                Ok(())
            })
        })
        .await
        .map_err(|e| DuetError::internal(format!("Prompt task failed: {}", e)))??;
        Ok(())
    }
}

#[async_trait::async_trait]
impl PromptRepository for TomlPromptRepository {
    async fn load(&self) -> Result<RolePrompts> {
        let file = self.file.clone();
        let stored = tokio::task::spawn_blocking(move || file.load())
            .await
            .map_err(|e| DuetError::internal(format!("Prompt task failed: {}", e)))??;
        Ok(stored.unwrap_or_default().into_prompts())
    }

    async fn save(&self, prompt: &RolePrompt) -> Result<()> {
        self.update_slot(prompt.role_id, Some(prompt.system_text.clone()))
            .await?;
        tracing::info!("[Prompts] Saved prompt for role {}", prompt.role_id);
        Ok(())
    }

    async fn reset(&self, role: RoleId) -> Result<()> {
        self.update_slot(role, None).await?;
        tracing::info!("[Prompts] Reset role {} to default", role);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_file_yields_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let repo = TomlPromptRepository::with_path(temp_dir.path().join("prompts.toml"));

        assert_eq!(repo.load().await.unwrap(), RolePrompts::default());
    }

    #[tokio::test]
    async fn test_save_and_reset_are_per_role() {
        let temp_dir = TempDir::new().unwrap();
        let repo = TomlPromptRepository::with_path(temp_dir.path().join("prompts.toml"));

        repo.save(&RolePrompt::new(RoleId::A, "Talk about travel."))
            .await
            .unwrap();
        repo.save(&RolePrompt::new(RoleId::B, "Fix grammar only."))
            .await
            .unwrap();
        repo.reset(RoleId::B).await.unwrap();

        let prompts = repo.load().await.unwrap();
        assert_eq!(prompts.a.system_text, "Talk about travel.");
        assert_eq!(prompts.b.system_text, RoleId::B.default_prompt());
    }
}
