//! Scoring seam between the alignment engine and the phonetics.
//!
//! [`AlignmentScorer`] is all the dynamic program knows about its
//! sequences. [`AlineScorer`] is the ALINE implementation over [`Word`]s,
//! optionally biased by a learned [`SoundChangeModel`].

use crate::config::AlineScores;
use crate::features::FeatureDistance;
use crate::segment::{Ngram, Segment, SoundClass, SoundContext};
use crate::variety::{SoundChangeModel, Word};

/// Scores for the five alignment operations plus the per-position maxima
/// used to normalize raw scores.
///
/// Positions are indices into the full sequences. `None` on the
/// non-consuming side of an indel means "before the first position".
pub trait AlignmentScorer<S1: ?Sized, S2: ?Sized> {
    fn deletion_score(&self, seq1: &S1, p: usize, seq2: &S2, q: Option<usize>) -> i32;

    fn insertion_score(&self, seq1: &S1, p: Option<usize>, seq2: &S2, q: usize) -> i32;

    fn substitution_score(&self, seq1: &S1, p: usize, seq2: &S2, q: usize) -> i32;

    /// One position of `seq1` against two of `seq2`.
    ///
    /// # Panics
    /// The default implementation panics; scorers that support expansions
    /// override it.
    fn expansion_score(&self, _seq1: &S1, _p: usize, _seq2: &S2, _q1: usize, _q2: usize) -> i32 {
        panic!("this scorer does not support expansions")
    }

    /// Two positions of `seq1` against one of `seq2`.
    ///
    /// # Panics
    /// The default implementation panics; scorers that support compressions
    /// override it.
    fn compression_score(&self, _seq1: &S1, _p1: usize, _p2: usize, _seq2: &S2, _q: usize) -> i32 {
        panic!("this scorer does not support compressions")
    }

    fn max_score1(&self, seq1: &S1, p: usize, seq2: &S2) -> i32;

    fn max_score2(&self, seq1: &S1, seq2: &S2, q: usize) -> i32;
}

impl<S1, S2, Sc> AlignmentScorer<S1, S2> for &Sc
where
    S1: ?Sized,
    S2: ?Sized,
    Sc: AlignmentScorer<S1, S2> + ?Sized,
{
    fn deletion_score(&self, seq1: &S1, p: usize, seq2: &S2, q: Option<usize>) -> i32 {
        (**self).deletion_score(seq1, p, seq2, q)
    }

    fn insertion_score(&self, seq1: &S1, p: Option<usize>, seq2: &S2, q: usize) -> i32 {
        (**self).insertion_score(seq1, p, seq2, q)
    }

    fn substitution_score(&self, seq1: &S1, p: usize, seq2: &S2, q: usize) -> i32 {
        (**self).substitution_score(seq1, p, seq2, q)
    }

    fn expansion_score(&self, seq1: &S1, p: usize, seq2: &S2, q1: usize, q2: usize) -> i32 {
        (**self).expansion_score(seq1, p, seq2, q1, q2)
    }

    fn compression_score(&self, seq1: &S1, p1: usize, p2: usize, seq2: &S2, q: usize) -> i32 {
        (**self).compression_score(seq1, p1, p2, seq2, q)
    }

    fn max_score1(&self, seq1: &S1, p: usize, seq2: &S2) -> i32 {
        (**self).max_score1(seq1, p, seq2)
    }

    fn max_score2(&self, seq1: &S1, seq2: &S2, q: usize) -> i32 {
        (**self).max_score2(seq1, seq2, q)
    }
}

/// ALINE scorer.
///
/// The sound change model, when given, is read as `P(n-gram of the second
/// variety | context in the first variety)`. By default `seq1` is the first
/// variety's word; [`reversed`](Self::reversed) flips that for word pairs
/// passed in the other order.
#[derive(Clone, Copy)]
pub struct AlineScorer<'a> {
    distance: &'a FeatureDistance,
    scores: &'a AlineScores,
    classes: &'a [SoundClass],
    model: Option<&'a SoundChangeModel>,
    reversed: bool,
}

impl<'a> AlineScorer<'a> {
    pub fn new(
        distance: &'a FeatureDistance,
        scores: &'a AlineScores,
        classes: &'a [SoundClass],
        model: Option<&'a SoundChangeModel>,
    ) -> Self {
        Self {
            distance,
            scores,
            classes,
            model,
            reversed: false,
        }
    }

    /// Read the model with `seq2` as the first variety's word.
    pub fn reversed(mut self, reversed: bool) -> Self {
        self.reversed = reversed;
        self
    }

    fn delta(&self, a: &Segment, b: &Segment) -> i32 {
        self.distance.delta(a.feature_struct(), b.feature_struct())
    }

    fn vowel_cost(&self, segment: &Segment) -> i32 {
        if segment.is_vowel() {
            self.scores.vowel_cost
        } else {
            0
        }
    }

    fn max_score(&self, segment: &Segment) -> i32 {
        self.scores.max_substitution - 2 * self.vowel_cost(segment)
    }

    fn weight(&self, probability: f64) -> i32 {
        (self.scores.max_sound_change as f64 * probability) as i32
    }

    /// Sound change bonus for `target` (starting at `start` in `word1`, or the
    /// gap before `start`) corresponding to `corr`. `word1` is the first
    /// variety's word.
    fn sound_change_score(&self, word1: &Word, start: usize, target: Ngram, corr: Ngram) -> i32 {
        let Some(model) = self.model else {
            return 0;
        };
        let lhs = SoundContext::at(self.classes, word1.segments(), start, target);
        self.weight(model.probability(&lhs, &corr))
    }
}

impl AlignmentScorer<Word, Word> for AlineScorer<'_> {
    fn deletion_score(&self, seq1: &Word, p: usize, seq2: &Word, q: Option<usize>) -> i32 {
        let segment = Ngram::from(seq1.segments()[p].clone());
        let bonus = if self.reversed {
            self.sound_change_score(seq2, q.map_or(0, |q| q + 1), Ngram::Empty, segment)
        } else {
            self.sound_change_score(seq1, p, segment, Ngram::Empty)
        };
        -self.scores.indel_cost + bonus
    }

    fn insertion_score(&self, seq1: &Word, p: Option<usize>, seq2: &Word, q: usize) -> i32 {
        let segment = Ngram::from(seq2.segments()[q].clone());
        let bonus = if self.reversed {
            self.sound_change_score(seq2, q, segment, Ngram::Empty)
        } else {
            self.sound_change_score(seq1, p.map_or(0, |p| p + 1), Ngram::Empty, segment)
        };
        -self.scores.indel_cost + bonus
    }

    fn substitution_score(&self, seq1: &Word, p: usize, seq2: &Word, q: usize) -> i32 {
        let (a, b) = (&seq1.segments()[p], &seq2.segments()[q]);
        let bonus = if self.reversed {
            self.sound_change_score(seq2, q, Ngram::from(b.clone()), Ngram::from(a.clone()))
        } else {
            self.sound_change_score(seq1, p, Ngram::from(a.clone()), Ngram::from(b.clone()))
        };
        self.scores.max_substitution - (self.delta(a, b) + self.vowel_cost(a) + self.vowel_cost(b)) + bonus
    }

    fn expansion_score(&self, seq1: &Word, p: usize, seq2: &Word, q1: usize, q2: usize) -> i32 {
        let a = &seq1.segments()[p];
        let (b1, b2) = (&seq2.segments()[q1], &seq2.segments()[q2]);
        let pair = Ngram::from_slice(&seq2.segments()[q1..=q2]);
        let bonus = if self.reversed {
            self.sound_change_score(seq2, q1, pair, Ngram::from(a.clone()))
        } else {
            self.sound_change_score(seq1, p, Ngram::from(a.clone()), pair)
        };
        self.scores.max_expansion_compression
            - (self.delta(a, b1)
                + self.delta(a, b2)
                + self.vowel_cost(a)
                + self.vowel_cost(b1).max(self.vowel_cost(b2)))
            + bonus
    }

    fn compression_score(&self, seq1: &Word, p1: usize, p2: usize, seq2: &Word, q: usize) -> i32 {
        let (a1, a2) = (&seq1.segments()[p1], &seq1.segments()[p2]);
        let b = &seq2.segments()[q];
        let pair = Ngram::from_slice(&seq1.segments()[p1..=p2]);
        let bonus = if self.reversed {
            self.sound_change_score(seq2, q, Ngram::from(b.clone()), pair)
        } else {
            self.sound_change_score(seq1, p1, pair, Ngram::from(b.clone()))
        };
        self.scores.max_expansion_compression
            - (self.delta(a1, b)
                + self.delta(a2, b)
                + self.vowel_cost(b)
                + self.vowel_cost(a1).max(self.vowel_cost(a2)))
            + bonus
    }

    fn max_score1(&self, seq1: &Word, p: usize, _seq2: &Word) -> i32 {
        let segment = &seq1.segments()[p];
        self.max_score(segment) + self.max_bonus(seq1, p, !self.reversed)
    }

    fn max_score2(&self, _seq1: &Word, seq2: &Word, q: usize) -> i32 {
        let segment = &seq2.segments()[q];
        self.max_score(segment) + self.max_bonus(seq2, q, self.reversed)
    }
}

impl AlineScorer<'_> {
    /// Best possible bonus at `word[p]`, read as a context when `word` is the
    /// first variety's, otherwise as a correspondence.
    fn max_bonus(&self, word: &Word, p: usize, first_variety: bool) -> i32 {
        let Some(model) = self.model else {
            return 0;
        };
        let segment = Ngram::from(word.segments()[p].clone());
        let probability = if first_variety {
            model.max_probability(&SoundContext::at(self.classes, word.segments(), p, segment))
        } else {
            model.max_probability_of(&segment)
        };
        self.weight(probability)
    }
}
