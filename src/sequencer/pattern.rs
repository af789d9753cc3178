// Pattern - Step grid for percussion loops and strum/pick articulation
// A pattern is immutable once handed to playback; swaps replace the whole Arc

use serde::{Deserialize, Serialize};

/// What the rows of a pattern address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PatternKind {
    /// Rows target MIDI drum notes
    #[default]
    Percussion,
    /// Rows target instrument strings (0 = lowest string)
    Strum,
}

/// One instrument or string lane of the grid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternRow {
    /// Drum note (percussion) or string index (strum)
    pub target: u8,
    /// `None` = off, `Some(level)` = on with dynamics level 0.0..=1.0
    pub steps: Vec<Option<f32>>,
}

impl PatternRow {
    pub fn new(target: u8, length: usize) -> Self {
        Self {
            target,
            steps: vec![None; length],
        }
    }

    /// Build a row from a hit string: `x` = full hit, `o` = soft hit,
    /// anything else is a rest. "x.o." -> on, off, soft, off
    pub fn from_hits(target: u8, hits: &str) -> Self {
        let steps = hits
            .chars()
            .map(|c| match c {
                'x' | 'X' => Some(1.0),
                'o' | 'O' => Some(0.6),
                _ => None,
            })
            .collect();
        Self { target, steps }
    }

    /// Dynamics level at `step`, `None` if the step is off or out of range
    pub fn level(&self, step: usize) -> Option<f32> {
        self.steps
            .get(step)
            .copied()
            .flatten()
            .map(|level| level.clamp(0.0, 1.0))
    }
}

/// A step pattern
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub name: String,
    #[serde(default)]
    pub kind: PatternKind,
    /// Steps per beat
    pub resolution: u32,
    /// Number of steps in one iteration
    pub length: u32,
    pub rows: Vec<PatternRow>,
}

/// An active cell of the grid
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepHit {
    pub step: u32,
    pub target: u8,
    pub level: f32,
}

impl Pattern {
    /// Create an empty pattern; resolution and length are at least 1
    pub fn new(name: impl Into<String>, kind: PatternKind, resolution: u32, length: u32) -> Self {
        Self {
            name: name.into(),
            kind,
            resolution: resolution.max(1),
            length: length.max(1),
            rows: Vec::new(),
        }
    }

    /// Add a row, resized to the pattern length
    pub fn with_row(mut self, mut row: PatternRow) -> Self {
        row.steps.resize(self.length as usize, None);
        self.rows.push(row);
        self
    }

    /// Every active cell, ordered by step then row
    pub fn hits(&self) -> Vec<StepHit> {
        let mut hits: Vec<StepHit> = self
            .rows
            .iter()
            .flat_map(|row| {
                (0..self.length).filter_map(move |step| {
                    row.level(step as usize).map(|level| StepHit {
                        step,
                        target: row.target,
                        level,
                    })
                })
            })
            .collect();
        hits.sort_by_key(|hit| (hit.step, hit.target));
        hits
    }

    pub fn is_empty(&self) -> bool {
        self.rows
            .iter()
            .all(|row| (0..self.length as usize).all(|step| row.level(step).is_none()))
    }
}
