//! Word-level ALINE aligner with batch scoring.

use ndarray::Array2;
use rayon::prelude::*;

use crate::config::AlignerSettings;
use crate::error::AlignmentError;
use crate::features::{FeatureDistance, FeatureStruct};
use crate::multiple;
use crate::pairwise::{Alignments, PairwiseAlignmentAlgorithm};
use crate::scorer::AlineScorer;
use crate::segment::SoundClass;
use crate::types::Alignment;
use crate::variety::{SoundChangeModel, VarietyPair, Word, WordPair};

/// ALINE word aligner: feature distance, sound classes and settings.
#[derive(Debug)]
pub struct Aline {
    distance: FeatureDistance,
    classes: Vec<SoundClass>,
    settings: AlignerSettings,
}

impl Aline {
    pub fn new(distance: FeatureDistance, classes: Vec<SoundClass>, settings: AlignerSettings) -> Self {
        Self {
            distance,
            classes,
            settings,
        }
    }

    pub fn settings(&self) -> &AlignerSettings {
        &self.settings
    }

    pub fn sound_classes(&self) -> &[SoundClass] {
        &self.classes
    }

    pub fn distance(&self) -> &FeatureDistance {
        &self.distance
    }

    /// Weighted feature distance between two feature structures.
    pub fn delta(&self, fs1: &FeatureStruct, fs2: &FeatureStruct) -> i32 {
        self.distance.delta(fs1, fs2)
    }

    pub fn scorer<'a>(&'a self, model: Option<&'a SoundChangeModel>) -> AlineScorer<'a> {
        AlineScorer::new(&self.distance, &self.settings.scores, &self.classes, model)
    }

    /// Align the stems of two words without a sound change model.
    pub fn compute<'a>(&'a self, word1: &'a Word, word2: &'a Word) -> WordAlignerResult<'a> {
        self.compute_with_model(word1, word2, None)
    }

    /// Align the stems of two words, biasing scores with `model` when sound
    /// change scoring is enabled. `word1` must belong to the variety the
    /// model conditions on; use [`compute_in_pair`](Self::compute_in_pair)
    /// when the order is not known.
    pub fn compute_with_model<'a>(
        &'a self,
        word1: &'a Word,
        word2: &'a Word,
        model: Option<&'a SoundChangeModel>,
    ) -> WordAlignerResult<'a> {
        self.compute_oriented(word1, word2, model, false)
    }

    fn compute_oriented<'a>(
        &'a self,
        word1: &'a Word,
        word2: &'a Word,
        model: Option<&'a SoundChangeModel>,
        reversed: bool,
    ) -> WordAlignerResult<'a> {
        let model = model.filter(|_| self.settings.sound_change_scoring);
        let scorer = self.scorer(model).reversed(reversed);
        let mut algorithm = PairwiseAlignmentAlgorithm::new(scorer, word1, word2)
            .with_ranges(word1.stem(), word2.stem())
            .with_mode(self.settings.mode)
            .with_expansion_compression(self.settings.expansion_compression);
        algorithm.compute();
        WordAlignerResult { algorithm }
    }

    /// Align a word pair of `pair` using the pair's learned sound changes.
    pub fn compute_pair<'a>(&'a self, pair: &'a VarietyPair, word_pair: &'a WordPair) -> WordAlignerResult<'a> {
        self.compute_in_pair(pair, &word_pair.word1, &word_pair.word2)
    }

    /// Align two words of `pair` given in either order. The pair's model is
    /// read with whichever word belongs to `pair.variety1` as the context
    /// side; the result keeps the order the words were given in.
    pub fn compute_in_pair<'a>(&'a self, pair: &'a VarietyPair, word1: &'a Word, word2: &'a Word) -> WordAlignerResult<'a> {
        let reversed = !pair.variety1.contains(word1) && pair.variety1.contains(word2);
        self.compute_oriented(word1, word2, pair.sound_change.as_ref(), reversed)
    }

    /// Progressive multiple alignment of whole words.
    pub fn multiple_alignment(&self, words: &[&Word]) -> Result<Alignment, AlignmentError> {
        multiple::align(&self.scorer(None), words)
    }

    /// Normalized score of each pair's best alignment (parallel).
    pub fn batch_normalized_scores(&self, pairs: &[(&Word, &Word)]) -> Vec<f64> {
        pairs
            .par_iter()
            .map(|(word1, word2)| self.compute(word1, word2).best_normalized_score())
            .collect()
    }

    /// Pairwise similarity matrix over `words`; symmetric with 1.0 on the
    /// diagonal.
    pub fn similarity_matrix(&self, words: &[&Word]) -> Array2<f64> {
        let n = words.len();
        let mut matrix = Array2::<f64>::zeros((n, n));

        for i in 0..n {
            matrix[[i, i]] = 1.0;
        }

        // Compute upper triangle (parallel)
        let pairs: Vec<_> = (0..n)
            .flat_map(|i| (i + 1..n).map(move |j| (i, j)))
            .collect();

        let similarities: Vec<_> = pairs
            .par_iter()
            .map(|&(i, j)| self.compute(words[i], words[j]).best_normalized_score())
            .collect();

        for (&(i, j), sim) in pairs.iter().zip(similarities) {
            matrix[[i, j]] = sim;
            matrix[[j, i]] = sim;
        }

        matrix
    }
}

/// Computed alignment of two words.
pub struct WordAlignerResult<'a> {
    algorithm: PairwiseAlignmentAlgorithm<'a, Word, Word, AlineScorer<'a>>,
}

impl<'a> WordAlignerResult<'a> {
    pub fn best_raw_score(&self) -> i32 {
        self.algorithm.best_raw_score()
    }

    /// Optimal alignments, one per end cell reaching the best score.
    pub fn alignments(&self) -> Alignments<'_, 'a, Word, Word, AlineScorer<'a>> {
        self.algorithm.alignments()
    }

    /// Alignments scoring at least `trunc(margin * best_raw_score)`.
    pub fn alignments_within(&self, margin: f64) -> Alignments<'_, 'a, Word, Word, AlineScorer<'a>> {
        self.algorithm.alignments_within(margin)
    }

    pub fn best_alignment(&self) -> Option<Alignment> {
        self.alignments().next()
    }

    fn best_normalized_score(&self) -> f64 {
        self.best_alignment().map_or(0.0, |a| a.normalized_score())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pairwise::AlignmentMode;
    use crate::test_util;

    fn render(alignment: &Alignment, word1: &Word, word2: &Word) -> String {
        alignment.render(&[word1.segments(), word2.segments()])
    }

    #[test]
    fn test_identical_single_vowel() {
        let project = test_util::project();
        let a = test_util::word(&project, "a");
        let result = project.aline.compute(&a, &a);
        assert_eq!(result.best_raw_score(), 3500);
        let alignments: Vec<Alignment> = result.alignments().collect();
        assert_eq!(alignments.len(), 1);
        assert_eq!(alignments[0].normalized_score(), 1.0);
    }

    #[test]
    fn test_chair_apple() {
        let project = test_util::project();
        let chair = test_util::word(&project, "chair");
        let apple = test_util::word(&project, "apple");

        let result = project.aline.compute(&chair, &apple);
        assert_eq!(result.best_raw_score(), 650);
        let alignments: Vec<Alignment> = result.alignments().collect();
        assert_eq!(alignments.len(), 1);
        assert_eq!(
            render(&alignments[0], &chair, &apple),
            "|c h a - - - i r|\n|- - a p p l e -|"
        );
        assert!((alignments[0].normalized_score() - 650.0 / 17500.0).abs() < 1e-12);

        let reversed = project.aline.compute(&apple, &chair);
        assert_eq!(reversed.best_raw_score(), 650);
    }

    #[test]
    fn test_edit_editable() {
        let project = test_util::project();
        let edit = test_util::word(&project, "edit");
        let editable = test_util::word(&project, "editable");
        let result = project.aline.compute(&edit, &editable);
        assert_eq!(result.best_raw_score(), 10000);
        let best = result.best_alignment().unwrap();
        assert_eq!(render(&best, &edit, &editable), "|e d i t - - - -|\n|e d i t a b l e|");
        assert_eq!(result.alignments().count(), 1);
    }

    #[test]
    fn test_ipa_transcriptions() {
        let project = test_util::project();
        let edit = test_util::word(&project, "ɛdɪt");
        let editable = test_util::word(&project, "ɛdɪtəbl̩");
        let result = project.aline.compute(&edit, &editable);
        assert_eq!(result.best_raw_score(), 11000);
        let best = result.best_alignment().unwrap();
        assert_eq!(render(&best, &edit, &editable), "|ɛ d ɪ t - - -|\n|ɛ d ɪ t ə b l̩|");
        assert!((best.normalized_score() - 11000.0 / 24500.0).abs() < 1e-12);
    }

    #[test]
    fn test_similar_words_score_high() {
        let project = test_util::project();
        let chair = test_util::word(&project, "chair");
        let cheer = test_util::word(&project, "cheer");
        let result = project.aline.compute(&chair, &cheer);
        assert_eq!(result.best_raw_score(), 16500);
        let best = result.best_alignment().unwrap();
        assert!((best.normalized_score() - 16500.0 / 17500.0).abs() < 1e-12);
    }

    #[test]
    fn test_expansion_compression_keeps_single_best() {
        let mut config = crate::config::ProjectConfig::builtin().unwrap();
        config.aligner = AlignerSettings::default().with_expansion_compression(true);
        let project = config.build().unwrap();
        let chair = test_util::word(&project, "chair");
        let apple = test_util::word(&project, "apple");
        let result = project.aline.compute(&chair, &apple);
        assert_eq!(result.alignments().count(), 1);
    }

    #[test]
    fn test_stem_limits_alignment() {
        let project = test_util::project();
        let prefixed = project.segmenter.word("un|pat|", "x").unwrap();
        let plain = test_util::word(&project, "pat");
        let best = project.aline.compute(&prefixed, &plain).best_alignment().unwrap();
        assert_eq!(render(&best, &prefixed, &plain), "un |p a t|\n|p a t|");
        assert_eq!(best.raw_score(), 10500);
    }

    #[test]
    fn test_model_ignored_when_disabled() {
        let mut config = crate::config::ProjectConfig::builtin().unwrap();
        config.aligner = AlignerSettings::default()
            .with_mode(AlignmentMode::Global)
            .with_sound_change_scoring(false);
        let project = config.build().unwrap();
        let car = test_util::word(&project, "car");
        let bar = test_util::word(&project, "bar");
        let model = SoundChangeModel::new(Default::default(), 1.0);
        let with = project.aline.compute_with_model(&car, &bar, Some(&model));
        let without = project.aline.compute(&car, &bar);
        assert_eq!(with.best_raw_score(), without.best_raw_score());
    }

    #[test]
    fn test_compute_in_pair_either_order() {
        use crate::segment::{Ngram, SoundContext};
        use crate::statistics::{ConditionalFrequencyDistribution, ConditionalProbabilityDistribution, ProbabilityDistribution};
        use std::sync::Arc;

        let project = test_util::project();
        let v1 = Arc::new(test_util::variety(&project, "v1", &[("one", "car")]));
        let v2 = Arc::new(test_util::variety(&project, "v2", &[("one", "bar")]));
        let (car, bar) = (v1.words()[0].clone(), v2.words()[0].clone());

        let mut cfd = ConditionalFrequencyDistribution::new();
        let lhs = SoundContext::at(
            project.aline.sound_classes(),
            car.segments(),
            0,
            Ngram::from(car.segments()[0].clone()),
        );
        cfd.increment(lhs, Ngram::from(bar.segments()[0].clone()));
        let mut pair = VarietyPair::new(v1, v2);
        pair.sound_change = Some(SoundChangeModel::new(
            ConditionalProbabilityDistribution::from_frequencies(&cfd, ProbabilityDistribution::max_likelihood),
            0.0,
        ));

        let forward = project.aline.compute_in_pair(&pair, &car, &bar);
        let backward = project.aline.compute_in_pair(&pair, &bar, &car);
        assert_eq!(forward.best_raw_score(), 8400);
        assert_eq!(backward.best_raw_score(), 8400);
        assert_eq!(project.aline.compute(&bar, &car).best_raw_score(), 7600);

        let best = backward.best_alignment().unwrap();
        assert_eq!(render(&best, &bar, &car), "|b a r|\n|c a r|");
        assert_eq!(project.aline.compute_pair(&pair, &pair.word_pairs[0]).best_raw_score(), 8400);
    }

    #[test]
    fn test_similarity_matrix() {
        let project = test_util::project();
        let words: Vec<Word> = ["chair", "cheer", "apple"]
            .iter()
            .map(|w| test_util::word(&project, w))
            .collect();
        let refs: Vec<&Word> = words.iter().collect();
        let matrix = project.aline.similarity_matrix(&refs);

        assert_eq!(matrix.shape(), &[3, 3]);
        for i in 0..3 {
            assert_eq!(matrix[[i, i]], 1.0);
            for j in 0..3 {
                assert_eq!(matrix[[i, j]], matrix[[j, i]]);
            }
        }
        assert!(matrix[[0, 1]] > matrix[[0, 2]]);

        let batch = project.aline.batch_normalized_scores(&[(refs[0], refs[1]), (refs[0], refs[2])]);
        assert_eq!(batch, vec![matrix[[0, 1]], matrix[[0, 2]]]);
    }
}
