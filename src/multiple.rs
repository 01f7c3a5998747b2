//! Progressive multiple sequence alignment along a guide tree.
//!
//! Pairwise distances (one minus the normalized global score) are joined
//! into a neighbor-joining tree, which is rooted at its midpoint. Profiles
//! are then merged bottom-up: every node folds its own sequence and its
//! children's profiles left to right. Two profiles are scored as the
//! weighted mean of the pairwise scores of their rows, so any
//! [`AlignmentScorer`] over single sequences works unchanged.

use petgraph::graph::NodeIndex;

use crate::cluster::{self, RootedTree};
use crate::error::AlignmentError;
use crate::pairwise::{PairwiseAlignmentAlgorithm, Sequence};
use crate::scorer::AlignmentScorer;
use crate::types::{Alignment, AlignmentCell, AlignmentRow};

/// Column view of a partial multiple alignment: for every column, the
/// position each row contributes, or `None` for a gap.
#[derive(Debug, Clone)]
pub struct Profile {
    /// Input index of each row.
    rows: Vec<usize>,
    weights: Vec<f64>,
    columns: Vec<Vec<Option<usize>>>,
    /// `last[r][c]`: last position of row `r` at or before column `c`.
    last: Vec<Vec<Option<usize>>>,
}

impl Profile {
    fn leaf(row: usize, weight: f64, len: usize) -> Self {
        Self::from_columns(vec![row], vec![weight], (0..len).map(|p| vec![Some(p)]).collect())
    }

    fn from_columns(rows: Vec<usize>, weights: Vec<f64>, columns: Vec<Vec<Option<usize>>>) -> Self {
        let last = (0..rows.len())
            .map(|r| {
                columns
                    .iter()
                    .scan(None, |last, column| {
                        *last = column[r].or(*last);
                        Some(*last)
                    })
                    .collect()
            })
            .collect();
        Self {
            rows,
            weights,
            columns,
            last,
        }
    }

    pub fn rows(&self) -> &[usize] {
        &self.rows
    }

    pub fn columns(&self) -> &[Vec<Option<usize>>] {
        &self.columns
    }

    fn last_position(&self, row: usize, column: Option<usize>) -> Option<usize> {
        column.and_then(|c| self.last[row][c])
    }

    fn column_or_gap(&self, cell: &AlignmentCell) -> Vec<Option<usize>> {
        if cell.is_gap() {
            vec![None; self.rows.len()]
        } else {
            self.columns[cell.start].clone()
        }
    }

    /// Stack `other` below this profile along a pairwise alignment of the
    /// two (this profile in row 0).
    fn merge(self, other: Profile, alignment: &Alignment) -> Profile {
        let (row1, row2) = (&alignment.rows()[0], &alignment.rows()[1]);
        let columns = row1
            .cells
            .iter()
            .zip(&row2.cells)
            .map(|(c1, c2)| {
                let mut column = self.column_or_gap(c1);
                column.extend(other.column_or_gap(c2));
                column
            })
            .collect();
        let rows = self.rows.into_iter().chain(other.rows).collect();
        let weights = self.weights.into_iter().chain(other.weights).collect();
        Profile::from_columns(rows, weights, columns)
    }

    /// Alignment rows in input order.
    fn into_rows<S: Sequence + ?Sized>(self, sequences: &[&S]) -> Vec<AlignmentRow> {
        let mut slots = vec![0; self.rows.len()];
        for (slot, &row) in self.rows.iter().enumerate() {
            slots[row] = slot;
        }
        slots
            .iter()
            .zip(sequences)
            .map(|(&slot, sequence)| {
                let mut next = 0;
                let cells = self
                    .columns
                    .iter()
                    .map(|column| match column[slot] {
                        Some(p) => {
                            next = p + 1;
                            AlignmentCell::span(p, 1)
                        }
                        None => AlignmentCell::gap(next),
                    })
                    .collect();
                let len = sequence.len();
                AlignmentRow {
                    prefix: 0..0,
                    cells,
                    suffix: len..len,
                }
            })
            .collect()
    }
}

impl Sequence for Profile {
    fn len(&self) -> usize {
        self.columns.len()
    }
}

/// Scores two profiles through a pairwise scorer over their sequences.
pub struct ProfileScorer<'a, S: ?Sized, Sc> {
    inner: &'a Sc,
    sequences: &'a [&'a S],
}

fn weighted_mean(total: f64, weight: f64) -> i32 {
    if weight > 0.0 {
        (total / weight).round() as i32
    } else {
        0
    }
}

impl<'a, S, Sc> ProfileScorer<'a, S, Sc>
where
    S: Sequence + ?Sized,
    Sc: AlignmentScorer<S, S>,
{
    pub fn new(inner: &'a Sc, sequences: &'a [&'a S]) -> Self {
        Self { inner, sequences }
    }

    /// Weighted mean over the row pairs of `column1` and `column2` (`None`
    /// for a gap column). A gap row is scored as an indel after its last
    /// position at or before the context column; gap pairs are skipped.
    fn column_pair(
        &self,
        p1: &Profile,
        (column1, context1): (Option<usize>, Option<usize>),
        p2: &Profile,
        (column2, context2): (Option<usize>, Option<usize>),
    ) -> i32 {
        let (mut total, mut weight) = (0.0, 0.0);
        for (a, &row1) in p1.rows.iter().enumerate() {
            let seq1 = self.sequences[row1];
            let pa = column1.and_then(|c| p1.columns[c][a]);
            for (b, &row2) in p2.rows.iter().enumerate() {
                let seq2 = self.sequences[row2];
                let qb = column2.and_then(|c| p2.columns[c][b]);
                let score = match (pa, qb) {
                    (Some(pa), Some(qb)) => self.inner.substitution_score(seq1, pa, seq2, qb),
                    (Some(pa), None) => self.inner.deletion_score(seq1, pa, seq2, p2.last_position(b, context2)),
                    (None, Some(qb)) => self.inner.insertion_score(seq1, p1.last_position(a, context1), seq2, qb),
                    (None, None) => continue,
                };
                let w = p1.weights[a] * p2.weights[b];
                total += w * f64::from(score);
                weight += w;
            }
        }
        weighted_mean(total, weight)
    }

    fn align(&self, p1: &Profile, p2: &Profile) -> Alignment {
        let mut algorithm = PairwiseAlignmentAlgorithm::new(self, p1, p2);
        algorithm.compute();
        // a global alignment always has a path from the final cell
        let Some(step) = algorithm.alignments().next() else {
            unreachable!("global alignment produced no traceback");
        };
        step
    }
}

impl<S, Sc> AlignmentScorer<Profile, Profile> for ProfileScorer<'_, S, Sc>
where
    S: Sequence + ?Sized,
    Sc: AlignmentScorer<S, S>,
{
    fn deletion_score(&self, p1: &Profile, p: usize, p2: &Profile, q: Option<usize>) -> i32 {
        self.column_pair(p1, (Some(p), None), p2, (None, q))
    }

    fn insertion_score(&self, p1: &Profile, p: Option<usize>, p2: &Profile, q: usize) -> i32 {
        self.column_pair(p1, (None, p), p2, (Some(q), None))
    }

    fn substitution_score(&self, p1: &Profile, p: usize, p2: &Profile, q: usize) -> i32 {
        self.column_pair(p1, (Some(p), Some(p)), p2, (Some(q), Some(q)))
    }

    fn max_score1(&self, p1: &Profile, p: usize, p2: &Profile) -> i32 {
        let (mut total, mut weight) = (0.0, 0.0);
        for (a, &row1) in p1.rows.iter().enumerate() {
            let Some(pa) = p1.columns[p][a] else {
                continue;
            };
            for (b, &row2) in p2.rows.iter().enumerate() {
                let w = p1.weights[a] * p2.weights[b];
                total += w * f64::from(self.inner.max_score1(self.sequences[row1], pa, self.sequences[row2]));
                weight += w;
            }
        }
        weighted_mean(total, weight)
    }

    fn max_score2(&self, p1: &Profile, p2: &Profile, q: usize) -> i32 {
        let (mut total, mut weight) = (0.0, 0.0);
        for (b, &row2) in p2.rows.iter().enumerate() {
            let Some(qb) = p2.columns[q][b] else {
                continue;
            };
            for (a, &row1) in p1.rows.iter().enumerate() {
                let w = p1.weights[a] * p2.weights[b];
                total += w * f64::from(self.inner.max_score2(self.sequences[row1], self.sequences[row2], qb));
                weight += w;
            }
        }
        weighted_mean(total, weight)
    }
}

/// One minus the normalized score of the best global alignment.
fn distance<S, Sc>(scorer: &Sc, seq1: &S, seq2: &S) -> f64
where
    S: Sequence + ?Sized,
    Sc: AlignmentScorer<S, S>,
{
    let mut algorithm = PairwiseAlignmentAlgorithm::new(scorer, seq1, seq2);
    algorithm.compute();
    algorithm.alignments().next().map_or(1.0, |a| 1.0 - a.normalized_score())
}

/// Each row starts at weight 1 and gains, along its path from the root,
/// every branch length shared out among the rows below that branch.
fn assign_weights(tree: &RootedTree<usize>, node: NodeIndex, weight: f64, weights: &mut [f64]) {
    if let Some(row) = tree.graph[node] {
        weights[row] = weight;
    }
    for (child, len) in tree.children(node) {
        let shared = len / tree.item_count(child).max(1) as f64;
        assign_weights(tree, child, weight + shared, weights);
    }
}

/// Profile of the subtree at `node`; every merge performed overwrites
/// `last_step`, so the root's final merge is left there.
fn merge_subtree<S, Sc>(
    scorer: &ProfileScorer<'_, S, Sc>,
    tree: &RootedTree<usize>,
    node: NodeIndex,
    weights: &[f64],
    last_step: &mut Option<Alignment>,
) -> Option<Profile>
where
    S: Sequence + ?Sized,
    Sc: AlignmentScorer<S, S>,
{
    let own = tree.graph[node].map(|row| Profile::leaf(row, weights[row], scorer.sequences[row].len()));
    let children: Vec<Profile> = tree
        .children(node)
        .into_iter()
        .filter_map(|(child, _)| merge_subtree(scorer, tree, child, weights, last_step))
        .collect();
    own.into_iter().chain(children).reduce(|acc, next| {
        let step = scorer.align(&acc, &next);
        let merged = acc.merge(next, &step);
        *last_step = Some(step);
        merged
    })
}

/// Align `sequences` along a guide tree built from their pairwise
/// distances. Rows come back in input order.
///
/// Every step is a global alignment without expansions or compressions; the
/// returned scores are those of the final merge at the root.
pub fn align<S, Sc>(scorer: &Sc, sequences: &[&S]) -> Result<Alignment, AlignmentError>
where
    S: Sequence + ?Sized + Sync,
    Sc: AlignmentScorer<S, S> + Sync,
{
    if sequences.len() < 2 {
        return Err(AlignmentError::TooFewSequences(sequences.len()));
    }

    let indices: Vec<usize> = (0..sequences.len()).collect();
    let unrooted = cluster::neighbor_joining(&indices, |&i, &j| distance(scorer, sequences[i], sequences[j]));
    let tree = cluster::midpoint_root(&unrooted);
    tracing::trace!(
        sequences = sequences.len(),
        nodes = tree.graph.node_count(),
        "built guide tree"
    );

    let mut weights = vec![1.0; sequences.len()];
    let mut last_step = None;
    let profile_scorer = ProfileScorer::new(scorer, sequences);
    let profile = tree.root.and_then(|root| {
        assign_weights(&tree, root, 1.0, &mut weights);
        merge_subtree(&profile_scorer, &tree, root, &weights, &mut last_step)
    });
    // a tree over two or more sequences merges at least once
    let (Some(profile), Some(step)) = (profile, last_step) else {
        unreachable!("guide tree produced no merge");
    };

    Ok(Alignment::new(
        profile.into_rows(sequences),
        step.raw_score(),
        step.normalized_score(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{self, chars, CharScorer, StringScorer};

    fn msa<Sc>(scorer: &Sc, words: &[&str]) -> (Vec<Vec<char>>, Alignment)
    where
        Sc: AlignmentScorer<[char], [char]> + Sync,
    {
        let seqs: Vec<Vec<char>> = words.iter().map(|w| chars(w)).collect();
        let refs: Vec<&[char]> = seqs.iter().map(Vec::as_slice).collect();
        let alignment = align(scorer, &refs).unwrap();
        (seqs, alignment)
    }

    fn rendered(seqs: &[Vec<char>], alignment: &Alignment) -> String {
        let refs: Vec<&[char]> = seqs.iter().map(Vec::as_slice).collect();
        alignment.render(&refs)
    }

    fn assert_aligned(words: &[&str], expected: &[&str]) {
        let (seqs, alignment) = msa(&StringScorer, words);
        let expected: Vec<String> = expected.iter().map(|row| format!("|{row}|")).collect();
        assert_eq!(rendered(&seqs, &alignment), expected.join("\n"), "aligning {words:?}");
    }

    #[test]
    fn test_guide_tree_alignment() {
        let (seqs, alignment) = msa(&CharScorer, &["bar", "bart", "ba"]);
        assert_eq!(rendered(&seqs, &alignment), "|b a r -|\n|b a r t|\n|b a - -|");
        assert_eq!(alignment.raw_score(), 100);
        assert!((alignment.normalized_score() - 0.25).abs() < 1e-12);
        assert_eq!(alignment.row_count(), 3);
    }

    #[test]
    fn test_merge_order_follows_distances() {
        assert_aligned(&["car", "bar"], &["c a r", "b a r"]);
        assert_aligned(&["car", "bark"], &["c a r -", "b a r k"]);
        assert_aligned(&["car", "bar", "carp"], &["c a r -", "b a r -", "c a r p"]);
        assert_aligned(&["car", "bar", "star"], &["- c a r", "- b a r", "s t a r"]);
        assert_aligned(&["car", "bar", "stare"], &["- c a r -", "- b a r -", "s t a r e"]);
        assert_aligned(
            &["scar", "car", "bar", "stare"],
            &["s c a r -", "- c a r -", "- b a r -", "s t a r e"],
        );
        assert_aligned(
            &["sane", "scar", "car", "bar", "stare"],
            &["s - a n e", "s c a r -", "- c a r -", "- b a r -", "s t a r e"],
        );
    }

    #[test]
    fn test_distant_word_joins_late() {
        // input order would align "she" against "sane"/"scar" first
        assert_aligned(
            &["sane", "scar", "she", "car", "bar", "stare"],
            &[
                "s - a n e",
                "s c a r -",
                "s - - h e",
                "- c a r -",
                "- b a r -",
                "s t a r e",
            ],
        );
    }

    #[test]
    fn test_gap_rows_score_as_insertions() {
        let (seqs, alignment) = msa(&CharScorer, &["bart", "ar", "bat"]);
        assert_eq!(rendered(&seqs, &alignment), "|b a r t|\n|- a r -|\n|b a - t|");
        assert_eq!(alignment.raw_score(), 23);
    }

    #[test]
    fn test_empty_sequences_become_gap_rows() {
        let (seqs, alignment) = msa(&CharScorer, &["ab", "", "b"]);
        assert_eq!(rendered(&seqs, &alignment), "|a b|\n|- -|\n|- b|");
        assert!(alignment.rows()[1].cells.iter().all(AlignmentCell::is_gap));

        let (seqs, alignment) = msa(&CharScorer, &["", "ab"]);
        assert_eq!(rendered(&seqs, &alignment), "|- -|\n|a b|");
        assert_eq!(alignment.raw_score(), -100);

        let (seqs, alignment) = msa(&CharScorer, &["car", "", "bar"]);
        assert_eq!(rendered(&seqs, &alignment), "|c a r|\n|- - -|\n|b a r|");
        assert_eq!(alignment.raw_score(), -150);
        assert_aligned(&["car", "", "bar"], &["c a r", "- - -", "b a r"]);
    }

    #[test]
    fn test_too_few_sequences() {
        let a = chars("abc");
        assert_eq!(
            align(&CharScorer, &[a.as_slice()]),
            Err(AlignmentError::TooFewSequences(1))
        );
        let none: [&[char]; 0] = [];
        assert_eq!(align(&CharScorer, &none), Err(AlignmentError::TooFewSequences(0)));
    }

    #[test]
    fn test_word_alignment() {
        let project = test_util::project();
        let words: Vec<_> = ["pat", "pad", "pat"].iter().map(|w| test_util::word(&project, w)).collect();
        let refs: Vec<_> = words.iter().collect();
        let alignment = project.aline.multiple_alignment(&refs).unwrap();
        assert_eq!(alignment.row_count(), 3);
        assert_eq!(alignment.column_count(), 3);
        assert_eq!(alignment.raw_score(), 10000);
        for row in alignment.rows() {
            assert!(row.cells.iter().all(|c| !c.is_gap()));
        }
        assert!(project.aline.multiple_alignment(&refs[..1]).is_err());

        let words: Vec<_> = ["pat", "pad", "at"].iter().map(|w| test_util::word(&project, w)).collect();
        let refs: Vec<_> = words.iter().collect();
        let alignment = project.aline.multiple_alignment(&refs).unwrap();
        assert_eq!(alignment.raw_score(), 5745);
        assert!((alignment.normalized_score() - 5745.0 / 10500.0).abs() < 1e-9);
        assert!(alignment.rows()[2].cells[0].is_gap());
    }
}
