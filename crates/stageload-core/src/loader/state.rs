use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};

use crate::error::LoadError;

/// One of the four ordered visibility phases of a loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Shell,
    Critical,
    Secondary,
    Background,
}

impl Stage {
    pub const ALL: [Stage; 4] = [
        Stage::Shell,
        Stage::Critical,
        Stage::Secondary,
        Stage::Background,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Shell => "shell",
            Stage::Critical => "critical",
            Stage::Secondary => "secondary",
            Stage::Background => "background",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Per-stage pending flags. `true` means the stage is still loading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct LoadingState {
    pub shell: bool,
    pub critical: bool,
    pub secondary: bool,
    pub background: bool,
}

impl Default for LoadingState {
    fn default() -> Self {
        Self {
            shell: true,
            critical: true,
            secondary: true,
            background: true,
        }
    }
}

impl LoadingState {
    pub fn is_pending(&self, stage: Stage) -> bool {
        match stage {
            Stage::Shell => self.shell,
            Stage::Critical => self.critical,
            Stage::Secondary => self.secondary,
            Stage::Background => self.background,
        }
    }

    /// Mark `stage` done. Returns whether the flag changed.
    pub fn clear(&mut self, stage: Stage) -> bool {
        self.set(stage, false)
    }

    /// Mark `stage` pending again. Returns whether the flag changed.
    pub fn set_pending(&mut self, stage: Stage) -> bool {
        self.set(stage, true)
    }

    pub fn all_clear(&self) -> bool {
        Stage::ALL.iter().all(|stage| !self.is_pending(*stage))
    }

    fn set(&mut self, stage: Stage, pending: bool) -> bool {
        let flag = match stage {
            Stage::Shell => &mut self.shell,
            Stage::Critical => &mut self.critical,
            Stage::Secondary => &mut self.secondary,
            Stage::Background => &mut self.background,
        };
        let changed = *flag != pending;
        *flag = pending;
        changed
    }
}

/// What a consumer sees of a mounted loader at one point in time.
#[derive(Debug, Clone, Serialize)]
pub struct LoadSnapshot<T> {
    pub data: Option<T>,
    pub loading: LoadingState,
    #[serde(serialize_with = "serialize_error")]
    pub error: Option<Arc<LoadError>>,
    pub is_stale: bool,
    /// Wall-clock time the displayed data was fetched.
    pub fetched_at: Option<DateTime<Utc>>,
}

impl<T> LoadSnapshot<T> {
    pub(crate) fn pending() -> Self {
        Self {
            data: None,
            loading: LoadingState::default(),
            error: None,
            is_stale: false,
            fetched_at: None,
        }
    }

    pub fn has_data(&self) -> bool {
        self.data.is_some()
    }
}

fn serialize_error<S: Serializer>(
    error: &Option<Arc<LoadError>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match error {
        Some(e) => serializer.serialize_some(&e.to_string()),
        None => serializer.serialize_none(),
    }
}
