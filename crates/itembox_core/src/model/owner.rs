//! Item ownership references.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// The single owner an item belongs to.
///
/// Portal warehouses are buildings and reuse `Building`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum OwnerRef {
    User(i64),
    Building(i64),
    BankCell(i64),
}

impl OwnerRef {
    /// Storage label of the owner kind.
    pub fn kind_str(self) -> &'static str {
        match self {
            Self::User(_) => "user",
            Self::Building(_) => "building",
            Self::BankCell(_) => "bank_cell",
        }
    }

    pub fn id(self) -> i64 {
        match self {
            Self::User(id) | Self::Building(id) | Self::BankCell(id) => id,
        }
    }

    /// Rebuilds an owner from its storage label and id.
    pub fn from_parts(kind: &str, id: i64) -> Option<Self> {
        match kind {
            "user" => Some(Self::User(id)),
            "building" => Some(Self::Building(id)),
            "bank_cell" => Some(Self::BankCell(id)),
            _ => None,
        }
    }
}

impl Display for OwnerRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind_str(), self.id())
    }
}
