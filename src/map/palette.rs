//! Legend: maps cluster states to colours, glyphs and priority ranks.
//!
//! The priority rank is the aggregator's tie-break. Higher ranks are more
//! "interesting" and win any cell they appear in, so a single fragmented
//! cluster is never hidden behind a majority of free ones.

use crate::error::PaletteError;
use crate::models::{CellState, ClusterState};
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct Rgb(pub u8, pub u8, pub u8);

/// What a surface needs to draw one cell.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Swatch {
    pub color: Rgb,
    pub glyph: char,
}

/// Swatch used for out-of-range cells (the "unused map block" colour).
pub const BLANK_SWATCH: Swatch = Swatch {
    color: Rgb(178, 175, 168),
    glyph: ' ',
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegendEntry {
    pub state: ClusterState,
    pub color: Rgb,
    pub glyph: char,
    pub label: String,
    pub priority: u8,
}

impl LegendEntry {
    pub fn swatch(&self) -> Swatch {
        Swatch {
            color: self.color,
            glyph: self.glyph,
        }
    }
}

#[derive(Deserialize, Serialize)]
struct LegendFile {
    entries: Vec<LegendEntry>,
}

/// Immutable legend table. Built once at startup and shared by reference.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Palette {
    /// Indexed by `ClusterState::index()`.
    entries: Vec<LegendEntry>,
    top_rank: u8,
}

impl Palette {
    /// The built-in legend. Colours follow the classic defragmenter map.
    pub fn standard() -> Self {
        let entry = |state, color, glyph, label: &str, priority| LegendEntry {
            state,
            color,
            glyph,
            label: label.to_string(),
            priority,
        };
        let entries = vec![
            entry(ClusterState::Free, Rgb(255, 255, 255), '░', "Free space", 0),
            entry(ClusterState::Busy, Rgb(0, 96, 255), '•', "Unfragmented", 1),
            entry(ClusterState::Fragmented, Rgb(255, 0, 0), '•', "Fragmented", 7),
            entry(ClusterState::Directory, Rgb(255, 255, 0), 'd', "Directories", 3),
            entry(ClusterState::Compressed, Rgb(185, 185, 0), 'c', "Compressed", 2),
            entry(ClusterState::Unmovable, Rgb(0, 215, 32), 'X', "Unmovable", 5),
            entry(ClusterState::MftZone, Rgb(211, 0, 255), 'm', "MFT zone", 6),
            entry(ClusterState::Unusable, Rgb(128, 0, 0), 'B', "Bad clusters", 8),
            entry(ClusterState::Unknown, Rgb(128, 128, 128), '?', "Unknown", 4),
        ];
        // The table above is complete and uniquely ranked.
        Self::build(entries)
    }

    /// Build a palette from legend entries, in any order.
    ///
    /// Every state must appear exactly once and priorities must be unique so
    /// that the aggregation order is total.
    pub fn from_entries(entries: Vec<LegendEntry>) -> Result<Self, PaletteError> {
        let mut slots: Vec<Option<LegendEntry>> = vec![None; ClusterState::COUNT];
        let mut seen_ranks = Vec::with_capacity(entries.len());
        for entry in entries {
            if seen_ranks.contains(&entry.priority) {
                return Err(PaletteError::DuplicatePriority(entry.priority));
            }
            seen_ranks.push(entry.priority);
            let slot = &mut slots[entry.state.index()];
            if slot.is_some() {
                return Err(PaletteError::DuplicateState(entry.state));
            }
            *slot = Some(entry);
        }
        let mut ordered = Vec::with_capacity(ClusterState::COUNT);
        for (state, slot) in ClusterState::ALL.iter().zip(slots) {
            ordered.push(slot.ok_or(PaletteError::MissingState(*state))?);
        }
        Ok(Self::build(ordered))
    }

    /// Load a legend from JSON: `{"entries": [{"state": "free", ...}, ...]}`.
    pub fn from_json_reader<R: Read>(reader: R) -> Result<Self, PaletteError> {
        let file: LegendFile = serde_json::from_reader(reader)?;
        Self::from_entries(file.entries)
    }

    pub fn load(path: &Path) -> Result<Self, PaletteError> {
        let file = std::fs::File::open(path)?;
        Self::from_json_reader(std::io::BufReader::new(file))
    }

    /// Serialise the legend in the format `load` accepts.
    pub fn to_json(&self) -> Result<String, PaletteError> {
        let file = LegendFile {
            entries: self.entries.clone(),
        };
        Ok(serde_json::to_string_pretty(&file)?)
    }

    fn build(entries: Vec<LegendEntry>) -> Self {
        let top_rank = entries.iter().map(|e| e.priority).max().unwrap_or(0);
        Self { entries, top_rank }
    }

    pub fn entry(&self, state: ClusterState) -> &LegendEntry {
        &self.entries[state.index()]
    }

    pub fn rank(&self, state: ClusterState) -> u8 {
        self.entries[state.index()].priority
    }

    /// Highest rank in the table; a run reaching it cannot be outranked.
    pub fn top_rank(&self) -> u8 {
        self.top_rank
    }

    pub fn outranks(&self, a: ClusterState, b: ClusterState) -> bool {
        self.rank(a) > self.rank(b)
    }

    pub fn swatch(&self, cell: CellState) -> Swatch {
        match cell {
            CellState::Cluster(state) => self.entry(state).swatch(),
            CellState::OutOfRange => BLANK_SWATCH,
        }
    }

    /// Legend entries from most to least important, for display.
    pub fn by_priority(&self) -> Vec<&LegendEntry> {
        let mut entries: Vec<&LegendEntry> = self.entries.iter().collect();
        entries.sort_by(|a, b| b.priority.cmp(&a.priority));
        entries
    }
}

impl Default for Palette {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_palette_is_valid() {
        let standard = Palette::standard();
        let rebuilt = Palette::from_entries(standard.entries.clone()).unwrap();
        assert_eq!(standard, rebuilt);
        assert_eq!(standard.top_rank(), 8);
    }

    #[test]
    fn test_interesting_states_outrank_busy_and_free() {
        let palette = Palette::standard();
        for state in [
            ClusterState::Unusable,
            ClusterState::MftZone,
            ClusterState::Fragmented,
        ] {
            assert!(palette.outranks(state, ClusterState::Busy));
        }
        assert!(palette.outranks(ClusterState::Busy, ClusterState::Free));
    }

    #[test]
    fn test_out_of_range_is_not_free() {
        let palette = Palette::standard();
        assert_eq!(palette.swatch(CellState::OutOfRange), BLANK_SWATCH);
        assert_ne!(
            palette.swatch(CellState::OutOfRange),
            palette.swatch(CellState::Cluster(ClusterState::Free))
        );
    }

    #[test]
    fn test_missing_state_rejected() {
        let mut entries = Palette::standard().entries;
        entries.retain(|e| e.state != ClusterState::Unknown);
        assert!(matches!(
            Palette::from_entries(entries),
            Err(PaletteError::MissingState(ClusterState::Unknown))
        ));
    }

    #[test]
    fn test_duplicate_priority_rejected() {
        let mut entries = Palette::standard().entries;
        entries[ClusterState::Busy.index()].priority = 0;
        assert!(matches!(
            Palette::from_entries(entries),
            Err(PaletteError::DuplicatePriority(0))
        ));
    }

    #[test]
    fn test_duplicate_state_rejected() {
        let mut entries = Palette::standard().entries;
        let mut extra = entries[0].clone();
        extra.priority = 42;
        entries.push(extra);
        assert!(matches!(
            Palette::from_entries(entries),
            Err(PaletteError::DuplicateState(ClusterState::Free))
        ));
    }

    #[test]
    fn test_json_round_trip_keeps_order() {
        let palette = Palette::standard();
        let json = palette.to_json().unwrap();
        let loaded = Palette::from_json_reader(json.as_bytes()).unwrap();
        assert_eq!(palette, loaded);
    }

    #[test]
    fn test_by_priority_starts_with_top_rank() {
        let palette = Palette::standard();
        let legend = palette.by_priority();
        assert_eq!(legend.len(), ClusterState::COUNT);
        assert_eq!(legend[0].state, ClusterState::Unusable);
        assert_eq!(legend[legend.len() - 1].state, ClusterState::Free);
    }
}
