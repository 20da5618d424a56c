use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::DispatchError;

/// Which copies of a backup an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServerTier {
    Local,
    Remote,
    All,
}

impl ServerTier {
    /// An empty tier means both sides.
    pub fn parse(raw: &str) -> Result<Self, DispatchError> {
        match raw {
            "local" => Ok(ServerTier::Local),
            "remote" => Ok(ServerTier::Remote),
            "all" | "" => Ok(ServerTier::All),
            other => Err(DispatchError::UnknownTier(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ServerTier::Local => "local",
            ServerTier::Remote => "remote",
            ServerTier::All => "all",
        }
    }
}

impl std::fmt::Display for ServerTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Addressing layout of HTTP routes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressScheme {
    /// `/create/{backup_name}`
    #[default]
    Named,
    /// `/create/{backup_type}/{backup_name}`
    Kinded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    ServerTier,
    BackupKind,
    BackupName,
    DiffFrom,
    Format,
}

impl Field {
    /// Name of the HTTP path parameter carrying this field.
    pub fn param(&self) -> &'static str {
        match self {
            Field::ServerTier => "server_type",
            Field::BackupKind => "backup_type",
            Field::BackupName => "backup_name",
            Field::DiffFrom => "diff_from",
            Field::Format => "format",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Field::ServerTier => "server type",
            Field::BackupKind => "backup type",
            Field::BackupName => "backup name",
            Field::DiffFrom => "diff-from backup name",
            Field::Format => "format",
        }
    }
}

/// One position in a positional or path grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub field: Field,
    pub required: bool,
}

impl Slot {
    pub const fn required(field: Field) -> Self {
        Self {
            field,
            required: true,
        }
    }

    pub const fn optional(field: Field) -> Self {
        Self {
            field,
            required: false,
        }
    }
}

/// Raw, unvalidated addressing strings as a transport extracted them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    pub server_tier: String,
    pub backup_kind: String,
    pub backup_name: String,
    pub diff_from: String,
    pub format: String,
}

impl Params {
    pub fn get(&self, field: Field) -> &str {
        match field {
            Field::ServerTier => &self.server_tier,
            Field::BackupKind => &self.backup_kind,
            Field::BackupName => &self.backup_name,
            Field::DiffFrom => &self.diff_from,
            Field::Format => &self.format,
        }
    }

    pub fn set(&mut self, field: Field, value: impl Into<String>) {
        let value = value.into();
        match field {
            Field::ServerTier => self.server_tier = value,
            Field::BackupKind => self.backup_kind = value,
            Field::BackupName => self.backup_name = value,
            Field::DiffFrom => self.diff_from = value,
            Field::Format => self.format = value,
        }
    }

    /// Assigns positional values to slots. Required slots are always filled;
    /// surplus values fill optional slots left to right.
    pub fn from_positionals(slots: &[Slot], values: &[String]) -> Result<Self, DispatchError> {
        if let Some(extra) = values.get(slots.len()) {
            return Err(DispatchError::usage(format!("unexpected argument '{extra}'")));
        }

        let required: Vec<&Slot> = slots.iter().filter(|s| s.required).collect();
        if let Some(missing) = required.get(values.len()) {
            return Err(DispatchError::usage(format!(
                "{} must be defined",
                missing.field.label()
            )));
        }

        let mut optional_budget = values.len() - required.len();
        let mut values = values.iter();
        let mut params = Params::default();
        for slot in slots {
            if !slot.required {
                if optional_budget == 0 {
                    continue;
                }
                optional_budget -= 1;
            }
            if let Some(value) = values.next() {
                params.set(slot.field, value.as_str());
            }
        }
        Ok(params)
    }

    /// Reads path parameters by their template names. Absent parameters stay empty.
    pub fn from_path(slots: &[Slot], path: &HashMap<String, String>) -> Self {
        let mut params = Params::default();
        for slot in slots {
            if let Some(value) = path.get(slot.field.param()) {
                params.set(slot.field, value.as_str());
            }
        }
        params
    }
}

/// Validated target of an operation. Empty strings mean "absent".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Address {
    pub server_tier: Option<ServerTier>,
    pub backup_kind: String,
    pub backup_name: String,
    pub diff_from: String,
}

impl Address {
    pub fn tier(&self) -> ServerTier {
        self.server_tier.unwrap_or(ServerTier::All)
    }
}

/// Operation flags passed through to the engine unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Options {
    pub tables: String,
    pub schema: bool,
    pub data: bool,
    pub format: String,
}
