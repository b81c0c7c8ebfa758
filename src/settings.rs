use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, sync::RwLock};

/// Planning and auto-start preferences a session is built and run with.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct FocusSettings {
    /// Seconds of the whole session, breaks included.
    pub total_focus_duration: u64,
    pub break_duration: u64,
    pub auto_start_breaks: bool,
    /// Upper bound on the number of breaks in a plan.
    pub breaks_number: u32,
}

impl Default for FocusSettings {
    fn default() -> Self {
        Self {
            total_focus_duration: 25 * 60,
            break_duration: 5 * 60,
            auto_start_breaks: true,
            breaks_number: 4,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct UserSettings {
    #[serde(default)]
    focus: FocusSettings,
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<UserSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                log::warn!(
                    "Ignoring unreadable settings at {}: {err}",
                    path.display()
                );
                UserSettings::default()
            })
        } else {
            UserSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn focus(&self) -> FocusSettings {
        match self.data.read() {
            Ok(guard) => guard.focus,
            Err(poisoned) => poisoned.into_inner().focus,
        }
    }

    pub fn update_focus(&self, settings: FocusSettings) -> Result<()> {
        let mut guard = match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.focus = settings;
        self.persist(&guard)
    }

    pub fn reload(&self) -> Result<()> {
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read settings from {}", self.path.display()))?;
        let data: UserSettings = serde_json::from_str(&contents)?;
        let mut guard = match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = data;
        Ok(())
    }

    fn persist(&self, data: &UserSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("settings.json")).unwrap();
        assert_eq!(store.focus(), FocusSettings::default());
    }

    #[test]
    fn updates_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let store = SettingsStore::new(path.clone()).unwrap();

        let settings = FocusSettings {
            total_focus_duration: 90 * 60,
            break_duration: 10 * 60,
            auto_start_breaks: false,
            breaks_number: 2,
        };
        store.update_focus(settings).unwrap();

        let reopened = SettingsStore::new(path).unwrap();
        assert_eq!(reopened.focus(), settings);
    }

    #[test]
    fn garbage_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{not json").unwrap();

        let store = SettingsStore::new(path).unwrap();
        assert_eq!(store.focus(), FocusSettings::default());
        assert!(store.reload().is_err());
    }

    #[test]
    fn partial_file_fills_missing_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"focus":{"breakDuration":120}}"#).unwrap();

        let store = SettingsStore::new(path).unwrap();
        let focus = store.focus();
        assert_eq!(focus.break_duration, 120);
        assert_eq!(focus.breaks_number, 4);
    }
}
