//! Pairwise alignment dynamic program.
//!
//! Fills an integer similarity matrix over two sequence ranges using five
//! operations (substitution, insertion, deletion and, when enabled,
//! expansion and compression), then enumerates optimal or near-optimal
//! alignments by traceback. The traceback is an explicit-stack depth-first
//! search exposed as a lazy iterator, so callers can stop early with
//! `take(n)` when a generous margin would produce many alignments.

use std::ops::Range;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::scorer::AlignmentScorer;
use crate::types::{Alignment, AlignmentCell, AlignmentRow};

/// Anything with a length that a scorer knows how to index.
pub trait Sequence {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Sequence for [T] {
    fn len(&self) -> usize {
        <[T]>::len(self)
    }
}

impl<T> Sequence for Vec<T> {
    fn len(&self) -> usize {
        Vec::len(self)
    }
}

/// Which parts of the sequences must take part in the alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlignmentMode {
    /// Both sequences end to end.
    #[default]
    Global,
    /// Free leading and trailing gaps.
    SemiGlobal,
    /// Ends at the final cell, may start anywhere.
    HalfLocal,
    /// Best-scoring pair of sub-spans.
    Local,
}

impl AlignmentMode {
    fn floors_at_zero(self) -> bool {
        matches!(self, AlignmentMode::Local | AlignmentMode::HalfLocal)
    }
}

/// Pairwise aligner over `seq1[range1]` and `seq2[range2]`.
///
/// Call [`compute`](Self::compute) once, then read the best raw score and
/// enumerate alignments as often as needed.
pub struct PairwiseAlignmentAlgorithm<'a, S1: ?Sized, S2: ?Sized, Sc> {
    scorer: Sc,
    seq1: &'a S1,
    seq2: &'a S2,
    range1: Range<usize>,
    range2: Range<usize>,
    mode: AlignmentMode,
    expansion_compression: bool,
    sim: Array2<i32>,
    best_raw_score: i32,
    computed: bool,
}

#[derive(Debug, Clone, Copy)]
enum Op {
    Substitution,
    Insertion,
    Expansion,
    Deletion,
    Compression,
}

/// Traceback steps in the order they are tried at every cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Substitution,
    Insertion,
    Expansion,
    Deletion,
    Compression,
    Restart,
    Done,
}

impl Step {
    fn following(self) -> Step {
        match self {
            Step::Substitution => Step::Insertion,
            Step::Insertion => Step::Expansion,
            Step::Expansion => Step::Deletion,
            Step::Deletion => Step::Compression,
            Step::Compression => Step::Restart,
            Step::Restart | Step::Done => Step::Done,
        }
    }
}

#[derive(Debug, Clone)]
struct Frame {
    i: usize,
    j: usize,
    /// Score accumulated from the end cell down to this cell.
    score: i32,
    next: Step,
    /// Operation leading to the frame above this one on the stack.
    taken: Option<Op>,
}

impl Frame {
    fn new(i: usize, j: usize, score: i32) -> Self {
        Self {
            i,
            j,
            score,
            next: Step::Substitution,
            taken: None,
        }
    }
}

enum Advance {
    Descend(Frame),
    Restart,
    Exhausted,
}

impl<'a, S1, S2, Sc> PairwiseAlignmentAlgorithm<'a, S1, S2, Sc>
where
    S1: Sequence + ?Sized,
    S2: Sequence + ?Sized,
    Sc: AlignmentScorer<S1, S2>,
{
    pub fn new(scorer: Sc, seq1: &'a S1, seq2: &'a S2) -> Self {
        let (len1, len2) = (seq1.len(), seq2.len());
        Self {
            scorer,
            seq1,
            seq2,
            range1: 0..len1,
            range2: 0..len2,
            mode: AlignmentMode::Global,
            expansion_compression: false,
            sim: Array2::zeros((len1 + 1, len2 + 1)),
            best_raw_score: 0,
            computed: false,
        }
    }

    /// Restrict the aligned spans; items outside become prefix and suffix.
    ///
    /// # Panics
    /// When a range is out of bounds.
    pub fn with_ranges(mut self, range1: Range<usize>, range2: Range<usize>) -> Self {
        assert!(range1.start <= range1.end && range1.end <= self.seq1.len(), "range1 out of bounds");
        assert!(range2.start <= range2.end && range2.end <= self.seq2.len(), "range2 out of bounds");
        self.sim = Array2::zeros((range1.len() + 1, range2.len() + 1));
        self.range1 = range1;
        self.range2 = range2;
        self.computed = false;
        self
    }

    pub fn with_mode(mut self, mode: AlignmentMode) -> Self {
        self.mode = mode;
        self.computed = false;
        self
    }

    pub fn with_expansion_compression(mut self, enabled: bool) -> Self {
        self.expansion_compression = enabled;
        self.computed = false;
        self
    }

    pub fn mode(&self) -> AlignmentMode {
        self.mode
    }

    pub fn expansion_compression(&self) -> bool {
        self.expansion_compression
    }

    pub fn scorer(&self) -> &Sc {
        &self.scorer
    }

    /// Position in `seq1` consumed by matrix row `i` (1-based).
    #[inline]
    fn pos1(&self, i: usize) -> usize {
        self.range1.start + i - 1
    }

    #[inline]
    fn pos2(&self, j: usize) -> usize {
        self.range2.start + j - 1
    }

    /// Last `seq1` position at or before matrix row `i`, counting the
    /// unaligned prefix.
    #[inline]
    fn before1(&self, i: usize) -> Option<usize> {
        (self.range1.start + i).checked_sub(1)
    }

    #[inline]
    fn before2(&self, j: usize) -> Option<usize> {
        (self.range2.start + j).checked_sub(1)
    }

    fn deletion(&self, i: usize, j: usize) -> i32 {
        self.scorer
            .deletion_score(self.seq1, self.pos1(i), self.seq2, self.before2(j))
    }

    fn insertion(&self, i: usize, j: usize) -> i32 {
        self.scorer
            .insertion_score(self.seq1, self.before1(i), self.seq2, self.pos2(j))
    }

    fn substitution(&self, i: usize, j: usize) -> i32 {
        self.scorer
            .substitution_score(self.seq1, self.pos1(i), self.seq2, self.pos2(j))
    }

    fn expansion(&self, i: usize, j: usize) -> i32 {
        self.scorer.expansion_score(
            self.seq1,
            self.pos1(i),
            self.seq2,
            self.pos2(j - 1),
            self.pos2(j),
        )
    }

    fn compression(&self, i: usize, j: usize) -> i32 {
        self.scorer.compression_score(
            self.seq1,
            self.pos1(i - 1),
            self.pos1(i),
            self.seq2,
            self.pos2(j),
        )
    }

    /// Fill the similarity matrix and record the best raw score.
    pub fn compute(&mut self) {
        let (n, m) = (self.range1.len(), self.range2.len());
        let mut sim = Array2::<i32>::zeros((n + 1, m + 1));

        if self.mode == AlignmentMode::Global {
            for i in 1..=n {
                sim[[i, 0]] = sim[[i - 1, 0]] + self.deletion(i, 0);
            }
            for j in 1..=m {
                sim[[0, j]] = sim[[0, j - 1]] + self.insertion(0, j);
            }
        }

        let mut max_score: Option<i32> = None;
        for i in 1..=n {
            for j in 1..=m {
                let mut best = (sim[[i - 1, j]] + self.deletion(i, j))
                    .max(sim[[i, j - 1]] + self.insertion(i, j))
                    .max(sim[[i - 1, j - 1]] + self.substitution(i, j));
                if self.expansion_compression {
                    if j >= 2 {
                        best = best.max(sim[[i - 1, j - 2]] + self.expansion(i, j));
                    }
                    if i >= 2 {
                        best = best.max(sim[[i - 2, j - 1]] + self.compression(i, j));
                    }
                }
                if self.mode.floors_at_zero() {
                    best = best.max(0);
                }
                sim[[i, j]] = best;

                let counts = self.mode != AlignmentMode::SemiGlobal || i == n || j == m;
                if counts && max_score.map_or(true, |max| best > max) {
                    max_score = Some(best);
                }
            }
        }

        self.best_raw_score = match self.mode {
            AlignmentMode::Global | AlignmentMode::HalfLocal => sim[[n, m]],
            AlignmentMode::SemiGlobal | AlignmentMode::Local => max_score.unwrap_or(0),
        };
        self.sim = sim;
        self.computed = true;
    }

    /// Best raw score; for `Global` and `HalfLocal` the final cell, otherwise
    /// the matrix maximum over the cells the mode allows alignments to end in.
    pub fn best_raw_score(&self) -> i32 {
        self.assert_computed();
        self.best_raw_score
    }

    /// Best-scoring alignments: the first traceback path from every end cell
    /// reaching the best raw score.
    pub fn alignments(&self) -> Alignments<'_, 'a, S1, S2, Sc> {
        self.assert_computed();
        Alignments::new(self, self.best_raw_score, false)
    }

    /// Every alignment scoring at least `trunc(margin * best_raw_score)`.
    ///
    /// The number of alignments can grow exponentially with the margin;
    /// bound it with `take`.
    pub fn alignments_within(&self, margin: f64) -> Alignments<'_, 'a, S1, S2, Sc> {
        self.assert_computed();
        let threshold = (margin * self.best_raw_score as f64) as i32;
        Alignments::new(self, threshold, true)
    }

    fn assert_computed(&self) {
        assert!(self.computed, "compute() must run before reading alignments");
    }

    fn end_cells(&self) -> Vec<(usize, usize)> {
        let (n, m) = (self.range1.len(), self.range2.len());
        match self.mode {
            AlignmentMode::Global | AlignmentMode::HalfLocal => vec![(n, m)],
            _ if n == 0 || m == 0 => Vec::new(),
            AlignmentMode::SemiGlobal => (1..=n)
                .map(|i| (i, m))
                .chain((1..m).map(|j| (n, j)))
                .collect(),
            AlignmentMode::Local => (1..=n)
                .flat_map(|i| (1..=m).map(move |j| (i, j)))
                .collect(),
        }
    }

    fn is_start(&self, i: usize, j: usize) -> bool {
        (self.mode != AlignmentMode::Global && (i == 0 || j == 0)) || (i == 0 && j == 0)
    }

    /// Try the remaining steps of `frame` in order.
    fn advance(&self, frame: &mut Frame, threshold: i32) -> Advance {
        let (i, j, score) = (frame.i, frame.j, frame.score);
        let sim = &self.sim;
        loop {
            let step = frame.next;
            frame.next = step.following();
            let descend = match step {
                Step::Substitution if i > 0 && j > 0 => {
                    let op = self.substitution(i, j);
                    (sim[[i - 1, j - 1]] + op + score >= threshold)
                        .then(|| (Op::Substitution, Frame::new(i - 1, j - 1, score + op)))
                }
                Step::Insertion if j > 0 => {
                    let op = self.insertion(i, j);
                    (i == 0 || sim[[i, j - 1]] + op + score >= threshold)
                        .then(|| (Op::Insertion, Frame::new(i, j - 1, score + op)))
                }
                Step::Expansion if self.expansion_compression && i > 0 && j >= 2 => {
                    let op = self.expansion(i, j);
                    (sim[[i - 1, j - 2]] + op + score >= threshold)
                        .then(|| (Op::Expansion, Frame::new(i - 1, j - 2, score + op)))
                }
                Step::Deletion if i > 0 => {
                    let op = self.deletion(i, j);
                    (j == 0 || sim[[i - 1, j]] + op + score >= threshold)
                        .then(|| (Op::Deletion, Frame::new(i - 1, j, score + op)))
                }
                Step::Compression if self.expansion_compression && i >= 2 && j > 0 => {
                    let op = self.compression(i, j);
                    (sim[[i - 2, j - 1]] + op + score >= threshold)
                        .then(|| (Op::Compression, Frame::new(i - 2, j - 1, score + op)))
                }
                Step::Restart if self.mode.floors_at_zero() && sim[[i, j]] == 0 => {
                    return Advance::Restart;
                }
                Step::Done => return Advance::Exhausted,
                _ => None,
            };
            if let Some((op, child)) = descend {
                frame.taken = Some(op);
                return Advance::Descend(child);
            }
        }
    }

    /// Cells contributed by `op` taken at matrix cell `(i, j)`.
    fn cells(&self, op: Op, i: usize, j: usize) -> (AlignmentCell, AlignmentCell) {
        let (s1, s2) = (self.range1.start, self.range2.start);
        match op {
            Op::Substitution => (AlignmentCell::span(s1 + i - 1, 1), AlignmentCell::span(s2 + j - 1, 1)),
            Op::Insertion => (AlignmentCell::gap(s1 + i), AlignmentCell::span(s2 + j - 1, 1)),
            Op::Expansion => (AlignmentCell::span(s1 + i - 1, 1), AlignmentCell::span(s2 + j - 2, 2)),
            Op::Deletion => (AlignmentCell::span(s1 + i - 1, 1), AlignmentCell::gap(s2 + j)),
            Op::Compression => (AlignmentCell::span(s1 + i - 2, 2), AlignmentCell::span(s2 + j - 1, 1)),
        }
    }

    /// Build the alignment described by the stack; the top frame is the
    /// start cell, the bottom frame the end cell.
    fn build(&self, stack: &[Frame]) -> Alignment {
        let (start, end) = match (stack.last(), stack.first()) {
            (Some(start), Some(end)) => (start, end),
            _ => unreachable!("alignment built from an empty traceback"),
        };
        let mut cells1 = Vec::with_capacity(stack.len());
        let mut cells2 = Vec::with_capacity(stack.len());
        for frame in stack.iter().rev().skip(1) {
            if let Some(op) = frame.taken {
                let (c1, c2) = self.cells(op, frame.i, frame.j);
                cells1.push(c1);
                cells2.push(c2);
            }
        }

        let start1 = self.range1.start + start.i;
        let start2 = self.range2.start + start.j;
        let end1 = self.range1.start + end.i;
        let end2 = self.range2.start + end.j;
        let score = start.score;
        let normalized = self.normalized_score(start1..end1, start2..end2, score);
        Alignment::new(
            vec![
                AlignmentRow {
                    prefix: 0..start1,
                    cells: cells1,
                    suffix: end1..self.seq1.len(),
                },
                AlignmentRow {
                    prefix: 0..start2,
                    cells: cells2,
                    suffix: end2..self.seq2.len(),
                },
            ],
            score,
            normalized,
        )
    }

    /// `score` over the larger of the two sequences' maximum achievable
    /// scores, clamped to [0, 1]. Positions outside the aligned spans count
    /// half.
    fn normalized_score(&self, span1: Range<usize>, span2: Range<usize>, score: i32) -> f64 {
        let max1: i32 = (0..self.seq1.len())
            .map(|p| {
                let s = self.scorer.max_score1(self.seq1, p, self.seq2);
                if span1.contains(&p) { s } else { s / 2 }
            })
            .sum();
        let max2: i32 = (0..self.seq2.len())
            .map(|q| {
                let s = self.scorer.max_score2(self.seq1, self.seq2, q);
                if span2.contains(&q) { s } else { s / 2 }
            })
            .sum();
        let max = max1.max(max2);
        if max <= 0 {
            return 0.0;
        }
        (score as f64 / max as f64).clamp(0.0, 1.0)
    }
}

/// Lazy traceback over a computed [`PairwiseAlignmentAlgorithm`].
///
/// Paths are produced in depth-first order with operations tried as
/// substitution, insertion, expansion, deletion, compression; in best-only
/// mode each end cell contributes its first path.
pub struct Alignments<'r, 'a, S1: ?Sized, S2: ?Sized, Sc> {
    algorithm: &'r PairwiseAlignmentAlgorithm<'a, S1, S2, Sc>,
    threshold: i32,
    all: bool,
    ends: std::vec::IntoIter<(usize, usize)>,
    stack: Vec<Frame>,
}

impl<'r, 'a, S1, S2, Sc> Alignments<'r, 'a, S1, S2, Sc>
where
    S1: Sequence + ?Sized,
    S2: Sequence + ?Sized,
    Sc: AlignmentScorer<S1, S2>,
{
    fn new(algorithm: &'r PairwiseAlignmentAlgorithm<'a, S1, S2, Sc>, threshold: i32, all: bool) -> Self {
        Self {
            algorithm,
            threshold,
            all,
            ends: algorithm.end_cells().into_iter(),
            stack: Vec::new(),
        }
    }

    fn emit(&mut self) -> Alignment {
        let alignment = self.algorithm.build(&self.stack);
        self.stack.pop();
        if !self.all {
            self.stack.clear();
        }
        alignment
    }
}

impl<'r, 'a, S1, S2, Sc> Iterator for Alignments<'r, 'a, S1, S2, Sc>
where
    S1: Sequence + ?Sized,
    S2: Sequence + ?Sized,
    Sc: AlignmentScorer<S1, S2>,
{
    type Item = Alignment;

    fn next(&mut self) -> Option<Alignment> {
        let algorithm = self.algorithm;
        loop {
            let Some(top) = self.stack.len().checked_sub(1) else {
                let (i, j) = self.ends.next()?;
                if algorithm.sim[[i, j]] >= self.threshold {
                    self.stack.push(Frame::new(i, j, 0));
                }
                continue;
            };

            let (i, j) = (self.stack[top].i, self.stack[top].j);
            if algorithm.is_start(i, j) {
                return Some(self.emit());
            }
            match algorithm.advance(&mut self.stack[top], self.threshold) {
                Advance::Descend(child) => self.stack.push(child),
                Advance::Restart => return Some(self.emit()),
                Advance::Exhausted => {
                    self.stack.pop();
                }
            }
        }
    }
}
