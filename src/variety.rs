//! Words, varieties and the variety-pair state the inducer works on.

use std::ops::Range;
use std::sync::Arc;

use ahash::AHashSet;

use crate::inducer::{Induction, InductionReport};
use crate::pairwise::Sequence;
use crate::segment::{Ngram, Segment, SoundContext};
use crate::statistics::{ConditionalFrequencyDistribution, ConditionalProbabilityDistribution};

/// A transcribed word: its segments and the stem span that gets aligned.
/// Segments outside the stem are prefix and suffix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Word {
    str_rep: String,
    meaning: String,
    segments: Vec<Segment>,
    stem: Range<usize>,
}

impl Word {
    pub fn new(str_rep: impl Into<String>, meaning: impl Into<String>, segments: Vec<Segment>) -> Self {
        let stem = 0..segments.len();
        Self {
            str_rep: str_rep.into(),
            meaning: meaning.into(),
            segments,
            stem,
        }
    }

    /// Word whose aligned span is `stem`.
    ///
    /// # Panics
    /// When `stem` is not within the segments.
    pub fn with_stem(
        str_rep: impl Into<String>,
        meaning: impl Into<String>,
        segments: Vec<Segment>,
        stem: Range<usize>,
    ) -> Self {
        assert!(
            stem.start <= stem.end && stem.end <= segments.len(),
            "stem {stem:?} out of range for {} segments",
            segments.len()
        );
        Self {
            str_rep: str_rep.into(),
            meaning: meaning.into(),
            segments,
            stem,
        }
    }

    pub fn str_rep(&self) -> &str {
        &self.str_rep
    }

    pub fn meaning(&self) -> &str {
        &self.meaning
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn stem(&self) -> Range<usize> {
        self.stem.clone()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

impl Sequence for Word {
    fn len(&self) -> usize {
        self.segments.len()
    }
}

/// A named word list.
#[derive(Debug, Clone, Default)]
pub struct Variety {
    pub name: String,
    words: Vec<Arc<Word>>,
}

impl Variety {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            words: Vec::new(),
        }
    }

    pub fn add_word(&mut self, word: Word) {
        self.words.push(Arc::new(word));
    }

    pub fn words(&self) -> &[Arc<Word>] {
        &self.words
    }

    /// Whether `word` is one of this variety's words (by identity).
    pub fn contains(&self, word: &Word) -> bool {
        self.words.iter().any(|w| std::ptr::eq(w.as_ref(), word))
    }

    pub fn words_for<'a>(&'a self, meaning: &'a str) -> impl Iterator<Item = &'a Arc<Word>> + 'a {
        self.words.iter().filter(move |w| w.meaning() == meaning)
    }

    /// Number of distinct segments used by the variety's words.
    pub fn segment_count(&self) -> usize {
        self.words
            .iter()
            .flat_map(|w| w.segments())
            .collect::<AHashSet<_>>()
            .len()
    }
}

/// Two words with the same meaning, one from each variety.
#[derive(Debug, Clone)]
pub struct WordPair {
    pub word1: Arc<Word>,
    pub word2: Arc<Word>,
    pub phonetic_similarity_score: f64,
    pub cognate_predicted: bool,
}

impl WordPair {
    pub fn new(word1: Arc<Word>, word2: Arc<Word>) -> Self {
        Self {
            word1,
            word2,
            phonetic_similarity_score: 0.0,
            cognate_predicted: false,
        }
    }
}

/// Learned correspondence probabilities `P(corr | context)`, oriented from
/// the first variety of a pair to the second.
#[derive(Debug, Clone, Default)]
pub struct SoundChangeModel {
    pub distribution: ConditionalProbabilityDistribution<SoundContext, Ngram>,
    /// Probability used for contexts the distribution has never seen.
    pub default_probability: f64,
}

impl SoundChangeModel {
    pub fn new(
        distribution: ConditionalProbabilityDistribution<SoundContext, Ngram>,
        default_probability: f64,
    ) -> Self {
        Self {
            distribution,
            default_probability,
        }
    }

    pub fn probability(&self, lhs: &SoundContext, corr: &Ngram) -> f64 {
        self.distribution
            .get(lhs)
            .map_or(self.default_probability, |pd| pd.probability(corr))
    }

    /// Best probability any correspondence of `lhs` reaches.
    pub fn max_probability(&self, lhs: &SoundContext) -> f64 {
        self.distribution
            .get(lhs)
            .and_then(|pd| pd.max_probability())
            .unwrap_or(self.default_probability)
    }

    /// Best probability of `corr` under any context.
    pub fn max_probability_of(&self, corr: &Ngram) -> f64 {
        self.distribution
            .iter()
            .map(|(_, pd)| pd.probability(corr))
            .reduce(f64::max)
            .unwrap_or(0.0)
    }
}

/// Pairing of two varieties with everything the inducer learns about them.
#[derive(Debug, Clone)]
pub struct VarietyPair {
    pub variety1: Arc<Variety>,
    pub variety2: Arc<Variety>,
    pub word_pairs: Vec<WordPair>,
    pub sound_change: Option<SoundChangeModel>,
    pub sound_change_frequencies: ConditionalFrequencyDistribution<SoundContext, Ngram>,
    pub phonetic_similarity_score: f64,
    pub lexical_similarity_score: f64,
    pub induction: Option<InductionReport>,
}

impl VarietyPair {
    /// Pair every word of `variety1` with the first word of `variety2` that
    /// shares its meaning.
    pub fn new(variety1: Arc<Variety>, variety2: Arc<Variety>) -> Self {
        let word_pairs = variety1
            .words()
            .iter()
            .filter_map(|w1| {
                variety2
                    .words_for(w1.meaning())
                    .next()
                    .map(|w2| WordPair::new(Arc::clone(w1), Arc::clone(w2)))
            })
            .collect();
        Self::with_word_pairs(variety1, variety2, word_pairs)
    }

    pub fn with_word_pairs(variety1: Arc<Variety>, variety2: Arc<Variety>, word_pairs: Vec<WordPair>) -> Self {
        Self {
            variety1,
            variety2,
            word_pairs,
            sound_change: None,
            sound_change_frequencies: ConditionalFrequencyDistribution::new(),
            phonetic_similarity_score: 0.0,
            lexical_similarity_score: 0.0,
            induction: None,
        }
    }

    /// Commit the outcome of an induction run.
    pub fn apply(&mut self, induction: Induction) {
        for (pair, (score, cognate)) in self.word_pairs.iter_mut().zip(induction.word_pair_scores) {
            pair.phonetic_similarity_score = score;
            pair.cognate_predicted = cognate;
        }
        self.sound_change = induction.model;
        self.sound_change_frequencies = induction.frequencies;
        self.phonetic_similarity_score = induction.phonetic_similarity_score;
        self.lexical_similarity_score = induction.lexical_similarity_score;
        self.induction = Some(induction.report);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util;

    #[test]
    fn test_pairs_words_by_meaning() {
        let project = test_util::project();
        let v1 = test_util::variety(&project, "v1", &[("one", "pat"), ("two", "tum"), ("three", "sap")]);
        let v2 = test_util::variety(&project, "v2", &[("two", "tun"), ("one", "fat"), ("one", "bat")]);
        let pair = VarietyPair::new(Arc::new(v1), Arc::new(v2));

        let words: Vec<(&str, &str)> = pair
            .word_pairs
            .iter()
            .map(|wp| (wp.word1.str_rep(), wp.word2.str_rep()))
            .collect();
        assert_eq!(words, vec![("pat", "fat"), ("tum", "tun")]);
        assert_eq!(pair.variety2.segment_count(), 6);
    }
}
