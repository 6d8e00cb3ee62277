use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Number of hex characters of the random token kept in a key.
const KEY_TOKEN_LEN: usize = 12;

/// The cacheable computation families a handle key can refer to.
///
/// The kind is carried as a printable prefix on the key itself
/// (`composite_9f3ac2e41b07`) so error messages stay human-readable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandleKind {
    Composite,
    Index,
    Model,
    Render,
}

impl HandleKind {
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Composite => "composite",
            Self::Index => "idx",
            Self::Model => "model",
            Self::Render => "render",
        }
    }
}

/// Opaque registry key. Callers only ever hold the key string, never a
/// reference to the handle it names.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HandleKey(String);

impl HandleKey {
    /// Mint a fresh key: kind prefix plus a random 128-bit token rendered
    /// as a short hex string. Global uniqueness is enforced by the
    /// registry, which re-mints on the (vanishingly rare) collision.
    pub fn mint(kind: HandleKind) -> Self {
        let token = Uuid::new_v4().simple().to_string();
        Self(format!("{}_{}", kind.prefix(), &token[..KEY_TOKEN_LEN]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The kind prefix of the key, if it carries a recognized one.
    pub fn kind(&self) -> Option<HandleKind> {
        let prefix = self.0.split('_').next()?;
        match prefix {
            "composite" => Some(HandleKind::Composite),
            "idx" => Some(HandleKind::Index),
            "model" => Some(HandleKind::Model),
            "render" => Some(HandleKind::Render),
            _ => None,
        }
    }
}

impl fmt::Display for HandleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for HandleKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for HandleKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}
