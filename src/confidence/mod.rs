//! Extraction confidence scoring.
//!
//! Nine components are scored independently on a 0-100 scale from explicit
//! factor tables, then combined into one weighted overall score. A
//! component that could not be computed is left out of the weighted
//! average instead of counting as zero.

pub mod scorers;
pub mod validation;

use crate::extract::ExtractionResult;
use crate::types::TableRole;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub use validation::{
    ExtractionQualityMetrics, ExtractionValidator, IssueCategory, Severity, ValidationIssue,
};

/// Value reported by [`ExtractionConfidence::to_map`] for a component that
/// was not computed.
pub const NOT_COMPUTED: f64 = -1.0;

/// Named factor weights for one component; weights sum to 100.
pub type FactorWeights = &'static [(&'static str, f64)];

/// Scored aspects of an extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    /// Instrument table
    Instruments,
    /// Wave programs
    Wave,
    /// Pulse programs
    Pulse,
    /// Filter programs
    Filter,
    /// Sequence/orderlist structure
    Orderlist,
    /// Sequence commands
    Commands,
    /// Tempo setting
    Tempo,
    /// Arpeggio/command table
    Arpeggio,
    /// Note content of sequences
    Notes,
}

impl Component {
    /// Every component, in report order.
    pub const ALL: [Component; 9] = [
        Component::Instruments,
        Component::Wave,
        Component::Pulse,
        Component::Filter,
        Component::Orderlist,
        Component::Commands,
        Component::Tempo,
        Component::Arpeggio,
        Component::Notes,
    ];

    /// Lowercase component name.
    pub fn name(self) -> &'static str {
        match self {
            Component::Instruments => "instruments",
            Component::Wave => "wave",
            Component::Pulse => "pulse",
            Component::Filter => "filter",
            Component::Orderlist => "orderlist",
            Component::Commands => "commands",
            Component::Tempo => "tempo",
            Component::Arpeggio => "arpeggio",
            Component::Notes => "notes",
        }
    }

    /// Weight in the overall score; all weights sum to 100.
    pub fn weight(self) -> f64 {
        match self {
            Component::Instruments => 20.0,
            Component::Wave | Component::Orderlist => 15.0,
            Component::Pulse | Component::Filter | Component::Commands | Component::Notes => 10.0,
            Component::Tempo | Component::Arpeggio => 5.0,
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Score of one component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentScore {
    /// Component name
    pub name: String,
    /// Score in [0, 100]; `None` when not computed
    pub score: Option<f64>,
    /// Factor values in [0, 1]
    pub factors: BTreeMap<String, f64>,
    /// Free-text notes
    pub notes: Vec<String>,
}

impl ComponentScore {
    /// Start an uncomputed score.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            score: None,
            factors: BTreeMap::new(),
            notes: Vec::new(),
        }
    }

    /// Record a factor value, clamped to [0, 1].
    pub fn add_factor(&mut self, name: &str, value: f64) -> &mut Self {
        self.factors.insert(name.to_string(), value.clamp(0.0, 1.0));
        self
    }

    /// Attach a note.
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    /// Compute the score from the recorded factors.
    ///
    /// Factors listed in `weights` but never recorded count as zero.
    pub fn finish(mut self, weights: FactorWeights) -> Self {
        let total: f64 = weights
            .iter()
            .map(|(name, weight)| weight * self.factors.get(*name).copied().unwrap_or(0.0))
            .sum();
        self.score = Some(total.clamp(0.0, 100.0));
        self
    }

    /// Whether the score was computed.
    pub fn is_computed(&self) -> bool {
        self.score.is_some()
    }
}

/// Weighted combination of every component score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionConfidence {
    /// Component scores keyed by component
    pub components: BTreeMap<Component, ComponentScore>,
    /// Weighted overall score in [0, 100]
    pub overall: f64,
}

impl ExtractionConfidence {
    /// Build from component scores, computing the overall score.
    pub fn new(components: BTreeMap<Component, ComponentScore>) -> Self {
        let mut confidence = Self {
            components,
            overall: 0.0,
        };
        confidence.overall = confidence.weighted_overall();
        confidence
    }

    /// Score every component of an extraction.
    pub fn from_extraction(extraction: &ExtractionResult) -> Self {
        let sequence = extraction.table(TableRole::Sequence);
        let components = Component::ALL
            .into_iter()
            .map(|c| {
                let score = match c {
                    Component::Instruments => {
                        scorers::instruments(extraction.table(TableRole::Instrument))
                    }
                    Component::Wave => scorers::wave(extraction.table(TableRole::Wave)),
                    Component::Pulse => scorers::effect(c, extraction.table(TableRole::Pulse)),
                    Component::Filter => scorers::effect(c, extraction.table(TableRole::Filter)),
                    Component::Orderlist => scorers::orderlist(sequence),
                    Component::Commands => scorers::commands(sequence),
                    Component::Tempo => scorers::tempo(extraction.tempo.as_ref()),
                    Component::Arpeggio => scorers::arpeggio(extraction.table(TableRole::Command)),
                    Component::Notes => scorers::notes(sequence),
                };
                (c, score)
            })
            .collect();
        Self::new(components)
    }

    /// Overall score in [0, 100].
    pub fn overall(&self) -> f64 {
        self.overall
    }

    /// Components that were computed.
    pub fn computed(&self) -> usize {
        self.components.values().filter(|s| s.is_computed()).count()
    }

    fn weighted_overall(&self) -> f64 {
        let (sum, weight) = self
            .components
            .iter()
            .filter_map(|(c, s)| s.score.map(|score| (score * c.weight(), c.weight())))
            .fold((0.0, 0.0), |(sum, weight), (s, w)| (sum + s, weight + w));
        if weight == 0.0 {
            0.0
        } else {
            (sum / weight).clamp(0.0, 100.0)
        }
    }

    /// Flat form: `overall` plus one key per component.
    ///
    /// Uncomputed components map to [`NOT_COMPUTED`].
    pub fn to_map(&self) -> BTreeMap<String, f64> {
        let mut map = BTreeMap::new();
        map.insert("overall".to_string(), self.overall);
        for (c, score) in &self.components {
            map.insert(c.name().to_string(), score.score.unwrap_or(NOT_COMPUTED));
        }
        map
    }

    /// Flat form as JSON.
    pub fn to_json(&self) -> crate::error::Result<String> {
        Ok(serde_json::to_string(&self.to_map())?)
    }

    /// Multi-line human-readable report.
    pub fn format_report(&self) -> String {
        let mut out = format!(
            "Extraction confidence: {:.1}% ({}/{} components)\n",
            self.overall,
            self.computed(),
            self.components.len()
        );
        for (c, score) in &self.components {
            match score.score {
                Some(s) => out.push_str(&format!(
                    "  {:<12} {:>5.1}  (weight {:>2})\n",
                    c.name(),
                    s,
                    c.weight()
                )),
                None => out.push_str(&format!(
                    "  {:<12}   n/a  (weight {:>2})\n",
                    c.name(),
                    c.weight()
                )),
            }
            for note in &score.notes {
                out.push_str(&format!("      - {note}\n"));
            }
        }
        out
    }
}

impl fmt::Display for ExtractionConfidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.1}% ({}/{} components)",
            self.overall,
            self.computed(),
            self.components.len()
        )
    }
}
