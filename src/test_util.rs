//! Shared fixtures for unit tests.

use crate::config::Project;
use crate::scorer::AlignmentScorer;
use crate::variety::{Variety, Word};

pub fn project() -> Project {
    Project::builtin().unwrap()
}

pub fn word(project: &Project, text: &str) -> Word {
    project.segmenter.word(text, text).unwrap()
}

pub fn variety(project: &Project, name: &str, words: &[(&str, &str)]) -> Variety {
    let mut variety = Variety::new(name);
    for (meaning, text) in words {
        variety.add_word(project.segmenter.word(text, meaning).unwrap());
    }
    variety
}

pub fn chars(text: &str) -> Vec<char> {
    text.chars().collect()
}

/// Toy scorer over characters: identical 100, same vowel/consonant class 0,
/// otherwise -100; indels -50; expansions and compressions of one repeated
/// character 80, otherwise -150.
pub struct CharScorer;

fn is_vowel(c: char) -> bool {
    "aeiou".contains(c)
}

fn char_substitution(a: char, b: char) -> i32 {
    if a == b {
        100
    } else if is_vowel(a) == is_vowel(b) {
        0
    } else {
        -100
    }
}

fn char_expansion(a: char, b1: char, b2: char) -> i32 {
    if a == b1 && a == b2 {
        80
    } else {
        -150
    }
}

impl AlignmentScorer<[char], [char]> for CharScorer {
    fn deletion_score(&self, _: &[char], _: usize, _: &[char], _: Option<usize>) -> i32 {
        -50
    }

    fn insertion_score(&self, _: &[char], _: Option<usize>, _: &[char], _: usize) -> i32 {
        -50
    }

    fn substitution_score(&self, seq1: &[char], p: usize, seq2: &[char], q: usize) -> i32 {
        char_substitution(seq1[p], seq2[q])
    }

    fn expansion_score(&self, seq1: &[char], p: usize, seq2: &[char], q1: usize, q2: usize) -> i32 {
        char_expansion(seq1[p], seq2[q1], seq2[q2])
    }

    fn compression_score(&self, seq1: &[char], p1: usize, p2: usize, seq2: &[char], q: usize) -> i32 {
        char_expansion(seq2[q], seq1[p1], seq1[p2])
    }

    fn max_score1(&self, _: &[char], _: usize, _: &[char]) -> i32 {
        100
    }

    fn max_score2(&self, _: &[char], _: &[char], _: usize) -> i32 {
        100
    }
}

/// Plain string scorer: identical 100, anything else 0, indels -100. Has no
/// expansions or compressions.
pub struct StringScorer;

impl AlignmentScorer<[char], [char]> for StringScorer {
    fn deletion_score(&self, _: &[char], _: usize, _: &[char], _: Option<usize>) -> i32 {
        -100
    }

    fn insertion_score(&self, _: &[char], _: Option<usize>, _: &[char], _: usize) -> i32 {
        -100
    }

    fn substitution_score(&self, seq1: &[char], p: usize, seq2: &[char], q: usize) -> i32 {
        if seq1[p] == seq2[q] {
            100
        } else {
            0
        }
    }

    fn max_score1(&self, _: &[char], _: usize, _: &[char]) -> i32 {
        100
    }

    fn max_score2(&self, _: &[char], _: &[char], _: usize) -> i32 {
        100
    }
}
