//! Player-specific table layouts.
//!
//! When a player has been identified by signature and its table layout is
//! known, tables are carved at fixed offsets from the load address instead
//! of being located heuristically.
//!
//! Layouts are plain JSON:
//!
//! ```json
//! { "players": [ { "player": "Some_Player",
//!     "tables": [ { "role": "wave", "offset": 2304, "entry_count": 64, "entry_size": 2 } ] } ] }
//! ```

use crate::error::Result;
use crate::types::{ExtractedTable, MemoryImage, TableRole};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Confidence of a table carved from a known layout.
pub const LAYOUT_CONFIDENCE: f64 = 0.95;

/// One table position inside a player's data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableLayout {
    /// Semantic role
    pub role: TableRole,
    /// Offset from the load address
    pub offset: u16,
    /// Number of entries
    pub entry_count: usize,
    /// Bytes per entry
    pub entry_size: usize,
}

/// Known layout for one player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerLayout {
    /// Player name as reported by the signature database
    pub player: String,
    /// Table positions
    pub tables: Vec<TableLayout>,
}

impl PlayerLayout {
    /// Carve every listed table that fits inside `image`.
    pub fn carve(&self, image: &MemoryImage) -> Vec<ExtractedTable> {
        self.tables
            .iter()
            .filter_map(|t| {
                let address = image.load_address().checked_add(t.offset)?;
                ExtractedTable::carve(
                    image,
                    t.role,
                    address,
                    t.entry_count,
                    t.entry_size,
                    LAYOUT_CONFIDENCE,
                    format!("{} layout at +${:04X}", self.player, t.offset),
                )
            })
            .collect()
    }
}

/// Collection of known player layouts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutRegistry {
    /// Registered layouts
    pub players: Vec<PlayerLayout>,
}

impl LayoutRegistry {
    /// Parse a registry from JSON text.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read a registry from a JSON file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Layout for the first of `players` that has one.
    pub fn layout_for<'a, S: AsRef<str>>(&'a self, players: &[S]) -> Option<&'a PlayerLayout> {
        players.iter().find_map(|name| {
            self.players
                .iter()
                .find(|layout| layout.player.eq_ignore_ascii_case(name.as_ref()))
        })
    }
}
