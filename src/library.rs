// Pattern and chord providers
// Read-only lookups handed to the engine at construction

use crate::chord::definition::{ChordDefinition, ScaleDegree};
use crate::config::read_document;
use crate::error::EngineResult;
use crate::sequencer::pattern::{Pattern, PatternKind, PatternRow};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Source of patterns by name
pub trait PatternLibrary: Send + Sync {
    fn pattern(&self, name: &str) -> Option<Arc<Pattern>>;
    fn pattern_names(&self) -> Vec<String>;
}

/// Source of chord definitions by name
pub trait ChordLibrary: Send + Sync {
    fn chord(&self, name: &str) -> Option<Arc<ChordDefinition>>;
    fn chord_names(&self) -> Vec<String>;
}

/// Serialized form of a library
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryFile {
    pub patterns: Vec<Pattern>,
    pub chords: Vec<ChordDefinition>,
}

/// Library held in memory; later entries replace earlier ones by name
#[derive(Debug, Clone, Default)]
pub struct InMemoryLibrary {
    patterns: HashMap<String, Arc<Pattern>>,
    chords: HashMap<String, Arc<ChordDefinition>>,
}

impl InMemoryLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pattern(mut self, pattern: Pattern) -> Self {
        self.insert_pattern(pattern);
        self
    }

    pub fn with_chord(mut self, chord: ChordDefinition) -> Self {
        self.insert_chord(chord);
        self
    }

    pub fn insert_pattern(&mut self, pattern: Pattern) {
        self.patterns
            .insert(pattern.name.clone(), Arc::new(pattern));
    }

    pub fn insert_chord(&mut self, chord: ChordDefinition) {
        self.chords.insert(chord.name.clone(), Arc::new(chord));
    }

    pub fn from_file(file: LibraryFile) -> Self {
        let mut library = Self::new();
        for pattern in file.patterns {
            library.insert_pattern(pattern);
        }
        for chord in file.chords {
            library.insert_chord(chord);
        }
        library
    }

    pub fn from_json_str(json: &str) -> EngineResult<Self> {
        let file: LibraryFile = serde_json::from_str(json)?;
        Ok(Self::from_file(file))
    }

    pub fn from_ron_str(ron: &str) -> EngineResult<Self> {
        let file: LibraryFile = ron::from_str(ron)?;
        Ok(Self::from_file(file))
    }

    /// Load a `.json` or `.ron` library file
    pub fn from_path(path: &Path) -> EngineResult<Self> {
        Ok(Self::from_file(read_document(path)?))
    }

    /// A small starter set: two grooves, two strums and a few open chords
    pub fn builtin() -> Self {
        Self::new()
            .with_pattern(
                Pattern::new("Rock", PatternKind::Percussion, 2, 8)
                    .with_row(PatternRow::from_hits(36, "x...x..."))
                    .with_row(PatternRow::from_hits(38, "..x...x."))
                    .with_row(PatternRow::from_hits(42, "xoxoxoxo")),
            )
            .with_pattern(
                Pattern::new("Four on the floor", PatternKind::Percussion, 4, 16)
                    .with_row(PatternRow::from_hits(36, "x...x...x...x..."))
                    .with_row(PatternRow::from_hits(39, "....x.......x..."))
                    .with_row(PatternRow::from_hits(42, "..x...x...x...x.")),
            )
            .with_pattern(
                Pattern::new("Down strum", PatternKind::Strum, 1, 4)
                    .with_row(PatternRow::from_hits(0, "x..."))
                    .with_row(PatternRow::from_hits(1, "x..."))
                    .with_row(PatternRow::from_hits(2, "x..."))
                    .with_row(PatternRow::from_hits(3, "x..."))
                    .with_row(PatternRow::from_hits(4, "x..."))
                    .with_row(PatternRow::from_hits(5, "x...")),
            )
            .with_pattern(
                Pattern::new("Travis", PatternKind::Strum, 2, 8)
                    .with_row(PatternRow::from_hits(0, "x...x..."))
                    .with_row(PatternRow::from_hits(1, "..x...x."))
                    .with_row(PatternRow::from_hits(3, ".x...o.."))
                    .with_row(PatternRow::from_hits(4, "...x...o")),
            )
            .with_chord(ChordDefinition::frets(
                "C",
                &[None, Some(3), Some(2), Some(0), Some(1), Some(0)],
            ))
            .with_chord(ChordDefinition::frets(
                "G",
                &[Some(3), Some(2), Some(0), Some(0), Some(0), Some(3)],
            ))
            .with_chord(ChordDefinition::frets(
                "Am",
                &[None, Some(0), Some(2), Some(2), Some(1), Some(0)],
            ))
            .with_chord(ChordDefinition::frets(
                "F",
                &[Some(1), Some(3), Some(3), Some(2), Some(1), Some(1)],
            ))
            .with_chord(ChordDefinition::degrees(
                "I",
                &[
                    Some(ScaleDegree::new(1)),
                    Some(ScaleDegree::new(5)),
                    Some(ScaleDegree::new(8)),
                    Some(ScaleDegree::new(10)),
                    Some(ScaleDegree::new(12)),
                    Some(ScaleDegree::new(15)),
                ],
            ))
    }
}

impl PatternLibrary for InMemoryLibrary {
    fn pattern(&self, name: &str) -> Option<Arc<Pattern>> {
        self.patterns.get(name).cloned()
    }

    fn pattern_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.patterns.keys().cloned().collect();
        names.sort();
        names
    }
}

impl ChordLibrary for InMemoryLibrary {
    fn chord(&self, name: &str) -> Option<Arc<ChordDefinition>> {
        self.chords.get(name).cloned()
    }

    fn chord_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.chords.keys().cloned().collect();
        names.sort();
        names
    }
}
