use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Commands a pack asks to run around an `up`, grouped by phase and keyed
/// by task name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Tasks {
    #[serde(rename = "pre-up", default)]
    pub pre_up: BTreeMap<String, String>,
    #[serde(rename = "post-deploy", default)]
    pub post_deploy: BTreeMap<String, String>,
    #[serde(default)]
    pub cleanup: BTreeMap<String, String>,
}

impl Tasks {
    pub fn parse(text: &str) -> anyhow::Result<Self> {
        let tasks: Tasks = toml::from_str(text)
            .map_err(|e| anyhow::anyhow!("Failed to parse tasks: {}", e.message()))?;
        if let Some((name, _)) = tasks.all().find(|(_, cmd)| cmd.trim().is_empty()) {
            anyhow::bail!("Task '{}' has an empty command", name);
        }
        Ok(tasks)
    }

    pub fn is_empty(&self) -> bool {
        self.pre_up.is_empty() && self.post_deploy.is_empty() && self.cleanup.is_empty()
    }

    fn all(&self) -> impl Iterator<Item = (&String, &String)> {
        self.pre_up
            .iter()
            .chain(&self.post_deploy)
            .chain(&self.cleanup)
    }
}
