//! Phonological feature system and the ALINE feature distance (Delta).
//!
//! A [`FeatureSystem`] names the symbolic features (place, manner, voice, ...)
//! and their possible symbols. A [`FeatureStruct`] assigns each feature a set
//! of symbols: one symbol for plain segments, several for multi-valued
//! segments such as tie-barred clusters. [`FeatureDistance`] turns two feature
//! structures into the integer Delta consumed by the scorer.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Broad segment type; decides which feature set Delta compares.
///
/// Only real segments carry a type. Word boundaries in sound change
/// contexts are [`Environment::Boundary`](crate::segment::Environment::Boundary)
/// and an empty correspondence is [`Ngram::Empty`](crate::segment::Ngram::Empty).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentType {
    Consonant,
    Vowel,
}

/// Index of a feature inside its [`FeatureSystem`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FeatureId(u16);

impl FeatureId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index of a feature symbol inside its [`FeatureSystem`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolId(u16);

impl SymbolId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone)]
struct Feature {
    name: String,
    symbols: Vec<SymbolId>,
}

#[derive(Debug, Clone)]
struct Symbol {
    name: String,
    feature: FeatureId,
}

/// Registry of symbolic features and their symbols.
///
/// Symbol names are global: `voice+` and `nasal+` are distinct symbols of
/// distinct features.
#[derive(Debug, Clone, Default)]
pub struct FeatureSystem {
    features: Vec<Feature>,
    symbols: Vec<Symbol>,
    feature_index: FxHashMap<String, FeatureId>,
    symbol_index: FxHashMap<String, SymbolId>,
}

impl FeatureSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a feature with its ordered symbols.
    pub fn add_feature<I, S>(&mut self, name: &str, symbols: I) -> Result<FeatureId, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if self.feature_index.contains_key(name) {
            return Err(ConfigError::DuplicateFeature(name.to_string()));
        }
        let id = u16::try_from(self.features.len())
            .map(FeatureId)
            .map_err(|_| ConfigError::TooManyFeatures(name.to_string()))?;
        let mut ids = Vec::new();
        for symbol in symbols {
            let symbol = symbol.into();
            if self.symbol_index.contains_key(&symbol) {
                return Err(ConfigError::DuplicateSymbol(symbol));
            }
            let Ok(sid) = u16::try_from(self.symbols.len()).map(SymbolId) else {
                return Err(ConfigError::TooManySymbols(symbol));
            };
            self.symbol_index.insert(symbol.clone(), sid);
            self.symbols.push(Symbol {
                name: symbol,
                feature: id,
            });
            ids.push(sid);
        }
        self.feature_index.insert(name.to_string(), id);
        self.features.push(Feature {
            name: name.to_string(),
            symbols: ids,
        });
        Ok(id)
    }

    pub fn feature(&self, name: &str) -> Result<FeatureId, ConfigError> {
        self.feature_index
            .get(name)
            .copied()
            .ok_or_else(|| ConfigError::UnknownFeature(name.to_string()))
    }

    pub fn symbol(&self, name: &str) -> Result<SymbolId, ConfigError> {
        self.symbol_index
            .get(name)
            .copied()
            .ok_or_else(|| ConfigError::UnknownSymbol(name.to_string()))
    }

    pub fn feature_name(&self, feature: FeatureId) -> &str {
        &self.features[feature.index()].name
    }

    pub fn symbol_name(&self, symbol: SymbolId) -> &str {
        &self.symbols[symbol.index()].name
    }

    /// Feature a symbol belongs to.
    pub fn feature_of(&self, symbol: SymbolId) -> FeatureId {
        self.symbols[symbol.index()].feature
    }

    /// All possible symbols of a feature, in declaration order.
    pub fn possible_symbols(&self, feature: FeatureId) -> &[SymbolId] {
        &self.features[feature.index()].symbols
    }

    pub fn feature_count(&self) -> usize {
        self.features.len()
    }

    pub fn symbol_count(&self) -> usize {
        self.symbols.len()
    }

    /// Build a feature structure from symbol names. Several symbols of the
    /// same feature make that feature multi-valued.
    pub fn feature_struct<S: AsRef<str>>(
        &self,
        kind: SegmentType,
        symbols: &[S],
    ) -> Result<FeatureStruct, ConfigError> {
        let mut fs = FeatureStruct::new(kind);
        for name in symbols {
            let symbol = self.symbol(name.as_ref())?;
            fs.add(self.feature_of(symbol), symbol);
        }
        Ok(fs)
    }
}

/// Feature values of a segment: segment type plus a symbol set per feature.
///
/// Symbol sets are kept sorted and deduplicated so that equal structures hash
/// equally; this is what the segment pool keys on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FeatureStruct {
    kind: SegmentType,
    values: BTreeMap<FeatureId, Vec<SymbolId>>,
}

impl FeatureStruct {
    pub fn new(kind: SegmentType) -> Self {
        Self {
            kind,
            values: BTreeMap::new(),
        }
    }

    pub fn kind(&self) -> SegmentType {
        self.kind
    }

    /// Symbols of a feature, `None` when the feature is unspecified.
    pub fn values(&self, feature: FeatureId) -> Option<&[SymbolId]> {
        self.values.get(&feature).map(Vec::as_slice)
    }

    pub fn features(&self) -> impl Iterator<Item = (FeatureId, &[SymbolId])> {
        self.values.iter().map(|(&f, v)| (f, v.as_slice()))
    }

    /// Add a symbol to a feature's value set.
    pub fn add(&mut self, feature: FeatureId, symbol: SymbolId) {
        let set = self.values.entry(feature).or_default();
        if let Err(pos) = set.binary_search(&symbol) {
            set.insert(pos, symbol);
        }
    }

    /// Replace a feature's value set.
    pub fn set(&mut self, feature: FeatureId, mut symbols: Vec<SymbolId>) {
        symbols.sort_unstable();
        symbols.dedup();
        if symbols.is_empty() {
            self.values.remove(&feature);
        } else {
            self.values.insert(feature, symbols);
        }
    }

    /// Copy of `self` where every feature specified by `overrides` takes the
    /// overriding values. The segment type is kept.
    pub fn overridden_by(&self, overrides: &FeatureStruct) -> FeatureStruct {
        let mut fs = self.clone();
        for (feature, symbols) in overrides.features() {
            fs.set(feature, symbols.to_vec());
        }
        fs
    }

    /// Union of two structures, as used for tie-barred clusters. The result
    /// is a vowel only when both sides are vowels.
    pub fn union(&self, other: &FeatureStruct) -> FeatureStruct {
        let kind = if self.kind == SegmentType::Vowel && other.kind == SegmentType::Vowel {
            SegmentType::Vowel
        } else {
            SegmentType::Consonant
        };
        let mut fs = FeatureStruct {
            kind,
            values: self.values.clone(),
        };
        for (feature, symbols) in other.features() {
            for &symbol in symbols {
                fs.add(feature, symbol);
            }
        }
        fs
    }

    /// True when every feature constrained by `constraint` is either
    /// unspecified here or shares at least one symbol with it.
    pub fn is_unifiable_with(&self, constraint: &FeatureStruct) -> bool {
        constraint.features().all(|(feature, wanted)| match self.values(feature) {
            Some(have) => have.iter().any(|s| wanted.contains(s)),
            None => true,
        })
    }
}

/// ALINE feature distance.
///
/// Holds the relevant consonant and vowel feature lists, per-feature salience
/// weights and per-symbol value metrics. Construction validates that every
/// relevant feature is weighted and every symbol of a relevant feature has a
/// metric, so [`FeatureDistance::delta`] never fails.
#[derive(Debug, Clone)]
pub struct FeatureDistance {
    system: Arc<FeatureSystem>,
    consonant_features: Vec<FeatureId>,
    vowel_features: Vec<FeatureId>,
    weights: Vec<i32>,
    metrics: Vec<i32>,
}

impl FeatureDistance {
    pub fn new(
        system: Arc<FeatureSystem>,
        consonant_features: &[&str],
        vowel_features: &[&str],
        weights: &[(&str, i32)],
        metrics: &[(&str, i32)],
    ) -> Result<Self, ConfigError> {
        let mut weight_table = vec![None; system.feature_count()];
        for &(name, weight) in weights {
            weight_table[system.feature(name)?.index()] = Some(weight);
        }
        let mut metric_table = vec![None; system.symbol_count()];
        for &(name, metric) in metrics {
            metric_table[system.symbol(name)?.index()] = Some(metric);
        }

        let resolve = |names: &[&str]| -> Result<Vec<FeatureId>, ConfigError> {
            names.iter().map(|name| system.feature(name)).collect()
        };
        let consonant_features = resolve(consonant_features)?;
        let vowel_features = resolve(vowel_features)?;

        for &feature in consonant_features.iter().chain(&vowel_features) {
            if weight_table[feature.index()].is_none() {
                return Err(ConfigError::MissingWeight(
                    system.feature_name(feature).to_string(),
                ));
            }
            for &symbol in system.possible_symbols(feature) {
                if metric_table[symbol.index()].is_none() {
                    return Err(ConfigError::MissingMetric {
                        feature: system.feature_name(feature).to_string(),
                        symbol: system.symbol_name(symbol).to_string(),
                    });
                }
            }
        }

        Ok(Self {
            consonant_features,
            vowel_features,
            weights: weight_table.into_iter().map(|w| w.unwrap_or(0)).collect(),
            metrics: metric_table.into_iter().map(|m| m.unwrap_or(0)).collect(),
            system,
        })
    }

    pub fn feature_system(&self) -> &Arc<FeatureSystem> {
        &self.system
    }

    /// Weighted feature distance between two feature structures.
    ///
    /// Vowel features are compared when both sides are vowels, consonant
    /// features otherwise.
    pub fn delta(&self, fs1: &FeatureStruct, fs2: &FeatureStruct) -> i32 {
        let features = if fs1.kind() == SegmentType::Vowel && fs2.kind() == SegmentType::Vowel {
            &self.vowel_features
        } else {
            &self.consonant_features
        };
        features
            .iter()
            .map(|&feature| self.diff(fs1, fs2, feature) * self.weights[feature.index()])
            .sum()
    }

    fn diff(&self, fs1: &FeatureStruct, fs2: &FeatureStruct, feature: FeatureId) -> i32 {
        let (values1, values2) = match (fs1.values(feature), fs2.values(feature)) {
            (None, None) => return 0,
            (v1, v2) => {
                let all = self.system.possible_symbols(feature);
                (v1.unwrap_or(all), v2.unwrap_or(all))
            }
        };
        match values1.len().cmp(&values2.len()) {
            Ordering::Greater => self.spread(values1, values2),
            Ordering::Less => self.spread(values2, values1),
            Ordering::Equal => self.spread(values1, values2).max(self.spread(values2, values1)),
        }
    }

    /// Mean over `from` of the closest metric distance into `to`, rounded
    /// half to even.
    fn spread(&self, from: &[SymbolId], to: &[SymbolId]) -> i32 {
        if from.is_empty() {
            return 0;
        }
        let total: i32 = from
            .iter()
            .map(|&s| {
                let m = self.metrics[s.index()];
                to.iter()
                    .map(|&t| (m - self.metrics[t.index()]).abs())
                    .min()
                    .unwrap_or(0)
            })
            .sum();
        (total as f64 / from.len() as f64).round_ties_even() as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Feature setup used by the ALINE reference tests.
    pub(crate) fn fixture() -> FeatureDistance {
        let mut system = FeatureSystem::new();
        system
            .add_feature(
                "place",
                ["bilabial", "labiodental", "dental", "alveolar", "retroflex", "palato-alveolar", "palatal", "velar", "uvular", "pharyngeal", "glottal"],
            )
            .unwrap();
        system
            .add_feature(
                "manner",
                ["stop", "affricate", "fricative", "approximant", "trill", "flap", "close-vowel", "mid-vowel", "open-vowel"],
            )
            .unwrap();
        system.add_feature("voice", ["voice+", "voice-"]).unwrap();
        system
            .add_feature("height", ["close", "near-close", "close-mid", "mid", "open-mid", "near-open", "open"])
            .unwrap();
        system
            .add_feature("backness", ["front", "near-front", "central", "near-back", "back"])
            .unwrap();
        system.add_feature("round", ["round+", "round-"]).unwrap();

        FeatureDistance::new(
            Arc::new(system),
            &["place", "manner", "voice"],
            &["height", "backness", "round"],
            &[("place", 40), ("manner", 50), ("voice", 5), ("height", 10), ("backness", 10), ("round", 2)],
            &[
                ("bilabial", 100), ("labiodental", 90), ("dental", 80), ("alveolar", 70),
                ("retroflex", 60), ("palato-alveolar", 50), ("palatal", 40), ("velar", 30),
                ("uvular", 20), ("pharyngeal", 10), ("glottal", 0),
                ("stop", 100), ("affricate", 95), ("fricative", 90), ("approximant", 80),
                ("trill", 60), ("flap", 50), ("close-vowel", 30), ("mid-vowel", 15), ("open-vowel", 0),
                ("voice+", 100), ("voice-", 0),
                ("close", 100), ("near-close", 85), ("close-mid", 65), ("mid", 50),
                ("open-mid", 35), ("near-open", 15), ("open", 0),
                ("front", 100), ("near-front", 80), ("central", 50), ("near-back", 20), ("back", 0),
                ("round+", 100), ("round-", 0),
            ],
        )
        .unwrap()
    }

    fn fs(distance: &FeatureDistance, kind: SegmentType, symbols: &[&str]) -> FeatureStruct {
        distance.feature_system().feature_struct(kind, symbols).unwrap()
    }

    #[test]
    fn test_delta_consonants() {
        let d = fixture();
        let c = SegmentType::Consonant;
        let p = fs(&d, c, &["bilabial", "stop", "voice-"]);
        assert_eq!(d.delta(&p, &p), 0);
        assert_eq!(d.delta(&p, &fs(&d, c, &["labiodental", "stop", "voice-"])), 400);
        assert_eq!(d.delta(&p, &fs(&d, c, &["labiodental", "affricate", "voice-"])), 650);
        assert_eq!(d.delta(&p, &fs(&d, c, &["labiodental", "fricative", "voice+"])), 1400);
    }

    #[test]
    fn test_delta_clusters() {
        let d = fixture();
        let c = SegmentType::Consonant;
        let cluster = fs(&d, c, &["bilabial", "alveolar", "stop", "voice-"]);
        assert_eq!(d.delta(&cluster, &cluster), 0);
        // unspecified voice counts as every voice value
        let no_voice = fs(&d, c, &["bilabial", "alveolar", "stop"]);
        assert_eq!(d.delta(&cluster, &no_voice), 250);
        let other = fs(&d, c, &["bilabial", "palatal", "stop", "voice-"]);
        assert_eq!(d.delta(&cluster, &other), 600);
        assert_eq!(d.delta(&other, &cluster), 600);
    }

    #[test]
    fn test_delta_vowels() {
        let d = fixture();
        let v = SegmentType::Vowel;
        let i = fs(&d, v, &["close", "front", "round-"]);
        assert_eq!(d.delta(&i, &i), 0);
        assert_eq!(d.delta(&i, &fs(&d, v, &["close", "front", "round+"])), 200);
    }

    #[test]
    fn test_delta_vowel_against_consonant() {
        let d = fixture();
        let vowel = fs(&d, SegmentType::Vowel, &["velar", "close-vowel", "voice+", "close", "back", "round+"]);
        let stop = fs(&d, SegmentType::Consonant, &["velar", "stop", "voice+"]);
        assert_eq!(d.delta(&vowel, &stop), 3500);
    }

    #[test]
    fn test_missing_weight_is_rejected() {
        let mut system = FeatureSystem::new();
        system.add_feature("voice", ["voice+", "voice-"]).unwrap();
        let err = FeatureDistance::new(
            Arc::new(system),
            &["voice"],
            &[],
            &[],
            &[("voice+", 100), ("voice-", 0)],
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::MissingWeight(ref f) if f == "voice"));
    }

    #[test]
    fn test_feature_system_capacity() {
        let mut system = FeatureSystem::new();
        let last = system
            .add_feature("wide", (0..=usize::from(u16::MAX)).map(|i| format!("s{i}")))
            .unwrap();
        assert_eq!(system.symbol("s65535").unwrap().index(), 65535);
        let err = system.add_feature("overflow", ["extra"]).unwrap_err();
        assert!(matches!(err, ConfigError::TooManySymbols(ref s) if s == "extra"));
        assert_eq!(last.index(), 0);

        let mut system = FeatureSystem::new();
        for i in 0..=usize::from(u16::MAX) {
            system.add_feature(&format!("f{i}"), Vec::<String>::new()).unwrap();
        }
        let err = system.add_feature("f65536", Vec::<String>::new()).unwrap_err();
        assert!(matches!(err, ConfigError::TooManyFeatures(ref f) if f == "f65536"));
    }

    #[test]
    fn test_missing_metric_is_rejected() {
        let mut system = FeatureSystem::new();
        system.add_feature("voice", ["voice+", "voice-"]).unwrap();
        let err = FeatureDistance::new(Arc::new(system), &["voice"], &[], &[("voice", 5)], &[("voice+", 100)])
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingMetric { ref symbol, .. } if symbol == "voice-"));
    }

    #[test]
    fn test_union_and_unification() {
        let d = fixture();
        let c = SegmentType::Consonant;
        let t = fs(&d, c, &["alveolar", "stop", "voice-"]);
        let s = fs(&d, c, &["alveolar", "fricative", "voice-"]);
        let ts = t.union(&s);
        let manner = d.feature_system().feature("manner").unwrap();
        assert_eq!(ts.values(manner).map(<[SymbolId]>::len), Some(2));

        let voiceless = fs(&d, c, &["voice-"]);
        assert!(ts.is_unifiable_with(&voiceless));
        assert!(!ts.is_unifiable_with(&fs(&d, c, &["voice+"])));
        assert!(fs(&d, c, &["stop"]).is_unifiable_with(&voiceless));
    }
}
