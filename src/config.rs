//! Project configuration.
//!
//! A [`ProjectConfig`] is the serializable description of everything an
//! analysis needs: the feature system with its value metrics and weights,
//! the segment inventory, contextual sound classes, and the aligner and
//! inducer settings. [`ProjectConfig::build`] validates it and assembles a
//! ready-to-use [`Project`].
//!
//! # Defaults
//!
//! The built-in project (see [`ProjectConfig::builtin`]) carries an IPA
//! inventory with the ALINE salience weights: place 40, manner 50, voice 5,
//! nasal 10, lateral 10, height 10, backness 10, round 2.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::features::{FeatureDistance, FeatureSystem, SegmentType};
use crate::pairwise::AlignmentMode;
use crate::phonetic::Aline;
use crate::segment::{SegmentPool, SoundClass};
use crate::segmenter::Segmenter;

const BUILTIN_PROJECT: &str = include_str!("default_project.json");

/// Fixed ALINE scoring constants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlineScores {
    /// Score of a perfect substitution. Default: 3500
    pub max_substitution: i32,
    /// Score of a perfect expansion or compression. Default: 4500
    pub max_expansion_compression: i32,
    /// Cost of an insertion or deletion. Default: 1000
    pub indel_cost: i32,
    /// Penalty applied per vowel taking part in an operation. Default: 0
    pub vowel_cost: i32,
    /// Bonus for a correspondence of probability 1. Default: 800
    pub max_sound_change: i32,
}

impl Default for AlineScores {
    fn default() -> Self {
        Self {
            max_substitution: 3500,
            max_expansion_compression: 4500,
            indel_cost: 1000,
            vowel_cost: 0,
            max_sound_change: 800,
        }
    }
}

/// Word aligner settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignerSettings {
    /// Default: `Global`
    pub mode: AlignmentMode,
    /// Allow one-to-two and two-to-one columns. Default: false
    pub expansion_compression: bool,
    /// Bias scores with a variety pair's learned sound changes. Default: true
    pub sound_change_scoring: bool,
    pub scores: AlineScores,
}

impl Default for AlignerSettings {
    fn default() -> Self {
        Self {
            mode: AlignmentMode::Global,
            expansion_compression: false,
            sound_change_scoring: true,
            scores: AlineScores::default(),
        }
    }
}

impl AlignerSettings {
    pub fn with_mode(mut self, mode: AlignmentMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_expansion_compression(mut self, enabled: bool) -> Self {
        self.expansion_compression = enabled;
        self
    }

    pub fn with_sound_change_scoring(mut self, enabled: bool) -> Self {
        self.sound_change_scoring = enabled;
        self
    }
}

/// EM sound change inducer settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InducerSettings {
    /// Minimum normalized score for a word pair to count as cognate.
    /// Default: 0.7
    pub alignment_threshold: f64,
    /// Default: 15
    pub max_iterations: usize,
    /// Largest probability change still treated as converged. Default: 1e-4
    pub convergence_epsilon: f64,
}

impl Default for InducerSettings {
    fn default() -> Self {
        Self {
            alignment_threshold: 0.7,
            max_iterations: 15,
            convergence_epsilon: 1e-4,
        }
    }
}

impl InducerSettings {
    pub fn with_alignment_threshold(mut self, threshold: f64) -> Self {
        self.alignment_threshold = threshold;
        self
    }

    pub fn with_max_iterations(mut self, iterations: usize) -> Self {
        self.max_iterations = iterations;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolConfig {
    pub name: String,
    /// Position on the feature's numeric scale; required for relevant features.
    #[serde(default)]
    pub metric: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureConfig {
    pub name: String,
    pub symbols: Vec<SymbolConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SoundClassConfig {
    Natural {
        name: String,
        segment_type: SegmentType,
        #[serde(default)]
        features: Vec<String>,
    },
    Unnatural {
        name: String,
        segments: Vec<String>,
    },
}

impl SoundClassConfig {
    pub fn name(&self) -> &str {
        match self {
            SoundClassConfig::Natural { name, .. } | SoundClassConfig::Unnatural { name, .. } => name,
        }
    }
}

/// Serializable project description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub features: Vec<FeatureConfig>,
    pub weights: BTreeMap<String, i32>,
    pub relevant_consonant_features: Vec<String>,
    pub relevant_vowel_features: Vec<String>,
    /// Segment symbol to feature symbols.
    pub consonants: BTreeMap<String, Vec<String>>,
    pub vowels: BTreeMap<String, Vec<String>>,
    /// Diacritic to the feature symbols it overrides.
    #[serde(default)]
    pub modifiers: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub joiners: Vec<String>,
    #[serde(default)]
    pub boundaries: Vec<String>,
    #[serde(default)]
    pub ignored: Vec<String>,
    #[serde(default)]
    pub sound_classes: Vec<SoundClassConfig>,
    #[serde(default)]
    pub aligner: AlignerSettings,
    #[serde(default)]
    pub inducer: InducerSettings,
}

impl ProjectConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// The built-in IPA project.
    pub fn builtin() -> Result<Self, ConfigError> {
        Self::from_json(BUILTIN_PROJECT)
    }

    fn feature_system(&self) -> Result<FeatureSystem, ConfigError> {
        let mut system = FeatureSystem::new();
        for feature in &self.features {
            system.add_feature(&feature.name, feature.symbols.iter().map(|s| s.name.clone()))?;
        }
        Ok(system)
    }

    fn feature_distance(&self, system: Arc<FeatureSystem>) -> Result<FeatureDistance, ConfigError> {
        fn names(v: &[String]) -> Vec<&str> {
            v.iter().map(String::as_str).collect()
        }
        let weights: Vec<(&str, i32)> = self.weights.iter().map(|(f, &w)| (f.as_str(), w)).collect();
        let metrics: Vec<(&str, i32)> = self
            .features
            .iter()
            .flat_map(|f| &f.symbols)
            .filter_map(|s| s.metric.map(|m| (s.name.as_str(), m)))
            .collect();
        FeatureDistance::new(
            system,
            &names(&self.relevant_consonant_features),
            &names(&self.relevant_vowel_features),
            &weights,
            &metrics,
        )
    }

    fn segmenter(&self, system: &FeatureSystem, pool: Arc<SegmentPool>) -> Result<Segmenter, ConfigError> {
        let mut segmenter = Segmenter::new(pool);
        for (kind, inventory) in [
            (SegmentType::Consonant, &self.consonants),
            (SegmentType::Vowel, &self.vowels),
        ] {
            for (symbol, features) in inventory {
                segmenter.add_base(symbol, system.feature_struct(kind, features.as_slice())?)?;
            }
        }
        for (symbol, features) in &self.modifiers {
            segmenter.add_modifier(symbol, system.feature_struct(SegmentType::Consonant, features.as_slice())?);
        }
        self.joiners.iter().for_each(|s| segmenter.add_joiner(s));
        self.boundaries.iter().for_each(|s| segmenter.add_boundary(s));
        self.ignored.iter().for_each(|s| segmenter.add_ignored(s));
        Ok(segmenter)
    }

    fn sound_classes(&self, system: &FeatureSystem) -> Result<Vec<SoundClass>, ConfigError> {
        let mut classes: Vec<SoundClass> = Vec::with_capacity(self.sound_classes.len());
        for config in &self.sound_classes {
            let invalid = |reason: &str| ConfigError::InvalidSoundClass {
                name: config.name().to_string(),
                reason: reason.to_string(),
            };
            if config.name().is_empty() {
                return Err(invalid("empty name"));
            }
            if classes.iter().any(|c| &**c.name() == config.name()) {
                return Err(invalid("duplicate name"));
            }
            let class = match config {
                SoundClassConfig::Natural {
                    name,
                    segment_type,
                    features,
                } => SoundClass::natural(name, system.feature_struct(*segment_type, features.as_slice())?),
                SoundClassConfig::Unnatural { name, segments } => {
                    if segments.is_empty() {
                        return Err(invalid("no segments"));
                    }
                    SoundClass::unnatural(name, segments.iter().cloned())
                }
            };
            classes.push(class);
        }
        Ok(classes)
    }

    /// Validate and assemble the project.
    pub fn build(&self) -> Result<Project, ConfigError> {
        let system = Arc::new(self.feature_system()?);
        let distance = self.feature_distance(Arc::clone(&system))?;
        let pool = Arc::new(SegmentPool::new());
        let segmenter = self.segmenter(&system, Arc::clone(&pool))?;
        let classes = self.sound_classes(&system)?;

        tracing::info!(
            features = system.feature_count(),
            segments = self.consonants.len() + self.vowels.len(),
            sound_classes = classes.len(),
            mode = ?self.aligner.mode,
            "project assembled"
        );

        Ok(Project {
            pool,
            segmenter,
            aline: Aline::new(distance, classes, self.aligner.clone()),
            inducer: self.inducer.clone(),
        })
    }
}

/// Assembled project: shared segment pool, segmenter, aligner and inducer
/// settings.
#[derive(Debug)]
pub struct Project {
    pub pool: Arc<SegmentPool>,
    pub segmenter: Segmenter,
    pub aline: Aline,
    pub inducer: InducerSettings,
}

impl Project {
    /// Assemble the built-in IPA project.
    pub fn builtin() -> Result<Self, ConfigError> {
        ProjectConfig::builtin()?.build()
    }
}
