//! Player identification by byte signatures.
//!
//! A [`SignatureDatabase`] is loaded once and shared read-only. Each player
//! owns one or more alternative patterns; the player is reported when any
//! alternative matches.

pub mod parser;
pub mod pattern;

pub use parser::parse_signatures;
pub use pattern::{Matcher, SignaturePattern};

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// A named player with its alternative patterns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSignature {
    /// Player name as written in the database
    pub name: String,
    /// Alternative patterns, tried in order
    pub patterns: Vec<SignaturePattern>,
}

impl PlayerSignature {
    /// Create a player with no patterns yet.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            patterns: Vec::new(),
        }
    }

    /// Add an alternative pattern.
    pub fn with_pattern(mut self, pattern: SignaturePattern) -> Self {
        self.patterns.push(pattern);
        self
    }

    /// Whether any alternative matches `buffer`.
    pub fn matches(&self, buffer: &[u8]) -> bool {
        self.patterns.iter().any(|p| p.matches(buffer))
    }
}

/// Immutable collection of player signatures.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureDatabase {
    players: Vec<PlayerSignature>,
}

impl SignatureDatabase {
    /// Build a database from already-parsed players.
    pub fn new(players: Vec<PlayerSignature>) -> Self {
        Self { players }
    }

    /// Parse the plain-text database format.
    pub fn parse(text: &str) -> Result<Self> {
        Ok(Self::new(parse_signatures(text)?))
    }

    /// Read and parse a database file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    /// Registered players.
    pub fn players(&self) -> &[PlayerSignature] {
        &self.players
    }

    /// Number of registered players.
    pub fn len(&self) -> usize {
        self.players.len()
    }

    /// Whether the database holds no players.
    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Names of every player whose signature occurs in `buffer`.
    ///
    /// Each player is reported at most once, in database order.
    pub fn identify(&self, buffer: &[u8]) -> Vec<String> {
        let found: Vec<String> = self
            .players
            .iter()
            .filter(|p| p.matches(buffer))
            .map(|p| p.name.clone())
            .collect();
        debug!(matches = found.len(), "signature scan complete");
        found
    }

    /// First matching player, if any.
    pub fn identify_first(&self, buffer: &[u8]) -> Option<&str> {
        self.players
            .iter()
            .find(|p| p.matches(buffer))
            .map(|p| p.name.as_str())
    }
}
