use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};

use crate::constants::SYSTEM_ACTOR;

/// The identity performing an operation.
///
/// Passed explicitly into every mutating call; the engine never looks up a
/// "current user" on its own.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Actor {
    pub name: String,
    pub is_system: bool,
}

impl Actor {
    pub fn user(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_system: false,
        }
    }

    pub fn system() -> Self {
        Self {
            name: SYSTEM_ACTOR.to_string(),
            is_system: true,
        }
    }
}

impl Display for Actor {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(&self.name)
    }
}
