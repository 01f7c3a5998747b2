//! Expectation-maximization sound change induction.
//!
//! Each iteration re-aligns every word pair of a variety pair with the
//! current model (E), counts the correspondences of the pairs judged
//! cognate, and turns the counts into Witten-Bell smoothed probabilities
//! (M). The loop stops when a new model matches the previous one or after
//! the configured number of iterations.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::InducerSettings;
use crate::phonetic::Aline;
use crate::segment::{Ngram, SoundContext};
use crate::statistics::{ConditionalFrequencyDistribution, ConditionalProbabilityDistribution, ProbabilityDistribution};
use crate::types::Alignment;
use crate::variety::{SoundChangeModel, VarietyPair, Word};

/// How an induction run ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InductionReport {
    pub iterations: usize,
    /// False when the iteration cap was reached first.
    pub converged: bool,
    /// Mean phonetic similarity of the pair after each E step.
    pub similarity_history: Vec<f64>,
}

/// Outcome of inducing sound changes for one variety pair, not yet
/// committed to it (see [`VarietyPair::apply`]).
#[derive(Debug, Clone)]
pub struct Induction {
    pub model: Option<SoundChangeModel>,
    /// Correspondence counts of the last E step.
    pub frequencies: ConditionalFrequencyDistribution<SoundContext, Ngram>,
    /// `(phonetic similarity, cognate predicted)` per word pair, in order.
    pub word_pair_scores: Vec<(f64, bool)>,
    pub phonetic_similarity_score: f64,
    pub lexical_similarity_score: f64,
    pub report: InductionReport,
}

#[derive(Debug, Default)]
struct Expectation {
    frequencies: ConditionalFrequencyDistribution<SoundContext, Ngram>,
    word_pair_scores: Vec<(f64, bool)>,
    phonetic_similarity_score: f64,
    lexical_similarity_score: f64,
}

/// Per word pair result of an E step.
struct Observation {
    score: f64,
    cognate: bool,
    correspondences: Vec<(SoundContext, Ngram)>,
}

pub struct EmSoundChangeInducer<'a> {
    aline: &'a Aline,
    settings: InducerSettings,
}

impl<'a> EmSoundChangeInducer<'a> {
    pub fn new(aline: &'a Aline, settings: InducerSettings) -> Self {
        Self { aline, settings }
    }

    pub fn settings(&self) -> &InducerSettings {
        &self.settings
    }

    /// Run EM on `pair` and commit the result.
    pub fn process(&self, pair: &mut VarietyPair) -> InductionReport {
        let induction = self.induce(pair);
        let report = induction.report.clone();
        pair.apply(induction);
        report
    }

    /// Run EM on `pair` without modifying it. The first iteration aligns
    /// without a model; any model already stored on the pair is ignored.
    pub fn induce(&self, pair: &VarietyPair) -> Induction {
        let vocabulary = self.vocabulary_size(pair);
        let mut model: Option<SoundChangeModel> = None;
        let mut expectation = Expectation::default();
        let mut history = Vec::with_capacity(self.settings.max_iterations);
        let mut converged = false;

        for iteration in 1..=self.settings.max_iterations {
            expectation = self.expectation(pair, model.as_ref());
            history.push(expectation.phonetic_similarity_score);

            let candidate = self.maximization(&expectation.frequencies, vocabulary);
            converged = model
                .as_ref()
                .is_some_and(|previous| self.same_distribution(previous, &candidate));

            tracing::debug!(
                iteration,
                cognates = expectation.word_pair_scores.iter().filter(|(_, c)| *c).count(),
                similarity = expectation.phonetic_similarity_score,
                conditions = candidate.distribution.len(),
                converged,
                "EM iteration"
            );

            if converged {
                break;
            }
            model = Some(candidate);
        }

        let report = InductionReport {
            iterations: history.len(),
            converged,
            similarity_history: history,
        };
        tracing::debug!(
            variety1 = %pair.variety1.name,
            variety2 = %pair.variety2.name,
            iterations = report.iterations,
            converged = report.converged,
            "sound change induction finished"
        );

        Induction {
            model,
            frequencies: expectation.frequencies,
            word_pair_scores: expectation.word_pair_scores,
            phonetic_similarity_score: expectation.phonetic_similarity_score,
            lexical_similarity_score: expectation.lexical_similarity_score,
            report,
        }
    }

    /// Number of correspondences a source context can produce: every
    /// segment of variety 2, the empty n-gram and, with expansions and
    /// compressions, every segment bigram.
    fn vocabulary_size(&self, pair: &VarietyPair) -> usize {
        let segments = pair.variety2.segment_count();
        if self.aline.settings().expansion_compression {
            segments * segments + segments + 1
        } else {
            segments + 1
        }
    }

    fn expectation(&self, pair: &VarietyPair, model: Option<&SoundChangeModel>) -> Expectation {
        let observations: Vec<Observation> = pair
            .word_pairs
            .par_iter()
            .map(|word_pair| self.observe(&word_pair.word1, &word_pair.word2, model))
            .collect();

        let mut frequencies = ConditionalFrequencyDistribution::new();
        let mut word_pair_scores = Vec::with_capacity(observations.len());
        let mut total = 0.0;
        let mut cognates = 0usize;
        for observation in observations {
            for (lhs, corr) in observation.correspondences {
                frequencies.increment(lhs, corr);
            }
            total += observation.score;
            cognates += usize::from(observation.cognate);
            word_pair_scores.push((observation.score, observation.cognate));
        }

        let (phonetic_similarity_score, lexical_similarity_score) = if word_pair_scores.is_empty() {
            (0.0, 0.0)
        } else {
            let n = word_pair_scores.len() as f64;
            (total / n, cognates as f64 / n)
        };
        Expectation {
            frequencies,
            word_pair_scores,
            phonetic_similarity_score,
            lexical_similarity_score,
        }
    }

    fn observe(&self, word1: &Word, word2: &Word, model: Option<&SoundChangeModel>) -> Observation {
        let Some(alignment) = self.aline.compute_with_model(word1, word2, model).best_alignment() else {
            return Observation {
                score: 0.0,
                cognate: false,
                correspondences: Vec::new(),
            };
        };
        let score = alignment.normalized_score();
        let cognate = score >= self.settings.alignment_threshold;
        let correspondences = if cognate {
            self.correspondences(&alignment, word1, word2)
        } else {
            Vec::new()
        };
        Observation {
            score,
            cognate,
            correspondences,
        }
    }

    /// Context of every word1 column and the word2 n-gram it maps to.
    fn correspondences(&self, alignment: &Alignment, word1: &Word, word2: &Word) -> Vec<(SoundContext, Ngram)> {
        let classes = self.aline.sound_classes();
        let (row1, row2) = (&alignment.rows()[0], &alignment.rows()[1]);
        row1.cells
            .iter()
            .zip(&row2.cells)
            .map(|(c1, c2)| {
                let target = Ngram::from_slice(&word1.segments()[c1.range()]);
                let lhs = SoundContext::at(classes, word1.segments(), c1.start, target);
                (lhs, Ngram::from_slice(&word2.segments()[c2.range()]))
            })
            .collect()
    }

    fn maximization(
        &self,
        frequencies: &ConditionalFrequencyDistribution<SoundContext, Ngram>,
        vocabulary: usize,
    ) -> SoundChangeModel {
        let distribution = ConditionalProbabilityDistribution::from_frequencies(frequencies, |fd| {
            ProbabilityDistribution::witten_bell(fd, vocabulary)
        });
        SoundChangeModel::new(distribution, 1.0 / vocabulary as f64)
    }

    /// Same conditions, same observed samples per condition, and every
    /// probability within the convergence epsilon.
    fn same_distribution(&self, old: &SoundChangeModel, new: &SoundChangeModel) -> bool {
        let epsilon = self.settings.convergence_epsilon;
        old.distribution.len() == new.distribution.len()
            && new.distribution.iter().all(|(lhs, pd)| {
                old.distribution.get(lhs).is_some_and(|old_pd| {
                    old_pd.sample_count() == pd.sample_count()
                        && pd
                            .samples()
                            .all(|corr| (pd.probability(corr) - old_pd.probability(corr)).abs() <= epsilon)
                })
            })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::test_util;

    fn pair(project: &crate::config::Project, words1: &[(&str, &str)], words2: &[(&str, &str)]) -> VarietyPair {
        let v1 = test_util::variety(project, "v1", words1);
        let v2 = test_util::variety(project, "v2", words2);
        VarietyPair::new(Arc::new(v1), Arc::new(v2))
    }

    #[test]
    fn test_identical_varieties_converge() {
        let project = test_util::project();
        let words = [("one", "pat"), ("two", "tin"), ("three", "mus")];
        let mut pair = pair(&project, &words, &words);
        let inducer = EmSoundChangeInducer::new(&project.aline, project.inducer.clone());

        let report = inducer.process(&mut pair);
        assert!(report.converged);
        assert!(report.iterations >= 2 && report.iterations <= 15);
        assert_eq!(report.similarity_history.len(), report.iterations);
        assert_eq!(pair.lexical_similarity_score, 1.0);
        assert!(pair.word_pairs.iter().all(|wp| wp.cognate_predicted));
        assert!(pair.sound_change.is_some());
        assert_eq!(pair.induction.as_ref(), Some(&report));
    }

    #[test]
    fn test_model_learns_regular_correspondence() {
        let project = test_util::project();
        let mut pair = pair(
            &project,
            &[("a", "pat"), ("b", "pin"), ("c", "pul")],
            &[("a", "fat"), ("b", "fin"), ("c", "ful")],
        );
        let inducer = EmSoundChangeInducer::new(&project.aline, project.inducer.clone());
        inducer.process(&mut pair);

        let p = pair.variety1.words()[0].segments()[0].clone();
        let f = pair.variety2.words()[0].segments()[0].clone();
        let model = pair.sound_change.as_ref().unwrap();
        let classes = project.aline.sound_classes();
        let lhs = SoundContext::at(classes, pair.variety1.words()[0].segments(), 0, Ngram::from(p.clone()));
        let learned = model.probability(&lhs, &Ngram::from(f));
        assert!(learned > model.probability(&lhs, &Ngram::from(p)));
        assert!(learned > model.default_probability);
    }

    #[test]
    fn test_dissimilar_words_are_not_counted() {
        let project = test_util::project();
        let pair = pair(&project, &[("a", "pat"), ("b", "ki")], &[("a", "pat"), ("b", "lomu")]);
        let inducer = EmSoundChangeInducer::new(&project.aline, project.inducer.clone());
        let induction = inducer.induce(&pair);

        assert_eq!(induction.word_pair_scores.len(), 2);
        assert!(induction.word_pair_scores[0].1);
        assert!(!induction.word_pair_scores[1].1);
        assert_eq!(induction.lexical_similarity_score, 0.5);
        // only the three columns of pat/pat were counted
        let counted: u32 = induction.frequencies.iter().map(|(_, fd)| fd.sample_outcome_count()).sum();
        assert_eq!(counted, 3);
        // inducing leaves the pair untouched
        assert!(pair.sound_change.is_none());
    }

    #[test]
    fn test_iteration_cap() {
        let project = test_util::project();
        let words = [("one", "pat")];
        let pair = pair(&project, &words, &words);
        let settings = InducerSettings::default().with_max_iterations(1);
        let induction = EmSoundChangeInducer::new(&project.aline, settings).induce(&pair);
        assert_eq!(induction.report.iterations, 1);
        assert!(!induction.report.converged);
        assert!(induction.model.is_some());
    }

    #[test]
    fn test_empty_pair() {
        let project = test_util::project();
        let pair = pair(&project, &[], &[]);
        let induction = EmSoundChangeInducer::new(&project.aline, project.inducer.clone()).induce(&pair);
        assert_eq!(induction.phonetic_similarity_score, 0.0);
        assert_eq!(induction.lexical_similarity_score, 0.0);
        assert!(induction.report.converged);
    }
}
