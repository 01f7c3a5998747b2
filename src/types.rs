//! Shared data structures: alignments and cognate-network records.

use std::fmt::{Display, Write};
use std::ops::Range;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

/// Edge in similarity/cognate graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarityEdge {
    pub source: String,
    pub target: String,
    pub weight: OrderedFloat<f64>,
}

impl SimilarityEdge {
    pub fn new(source: String, target: String, weight: f64) -> Self {
        Self {
            source,
            target,
            weight: OrderedFloat(weight),
        }
    }
}

/// Kind of a pairwise alignment column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EditOp {
    Match,
    Substitute,
    Insert,
    Delete,
    Expand,
    Compress,
}

/// Span of a sequence occupying one alignment column. A zero-length span is
/// a gap; its `start` is the position of the item following the gap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AlignmentCell {
    pub start: usize,
    pub len: usize,
}

impl AlignmentCell {
    pub fn span(start: usize, len: usize) -> Self {
        Self { start, len }
    }

    pub fn gap(at: usize) -> Self {
        Self { start: at, len: 0 }
    }

    pub fn is_gap(&self) -> bool {
        self.len == 0
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.start + self.len
    }
}

/// One sequence's view of an alignment: unaligned prefix, aligned cells,
/// unaligned suffix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignmentRow {
    pub prefix: Range<usize>,
    pub cells: Vec<AlignmentCell>,
    pub suffix: Range<usize>,
}

/// Alignment of two or more sequences. Every row has the same number of
/// cells (columns).
#[derive(Debug, Clone, PartialEq)]
pub struct Alignment {
    rows: Vec<AlignmentRow>,
    raw_score: i32,
    normalized_score: f64,
}

impl Alignment {
    /// # Panics
    /// When the rows disagree on the column count.
    pub fn new(rows: Vec<AlignmentRow>, raw_score: i32, normalized_score: f64) -> Self {
        if let Some(first) = rows.first() {
            assert!(
                rows.iter().all(|r| r.cells.len() == first.cells.len()),
                "alignment rows must have equal column counts"
            );
        }
        Self {
            rows,
            raw_score,
            normalized_score,
        }
    }

    pub fn rows(&self) -> &[AlignmentRow] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.rows.first().map_or(0, |r| r.cells.len())
    }

    pub fn cell(&self, row: usize, column: usize) -> AlignmentCell {
        self.rows[row].cells[column]
    }

    pub fn raw_score(&self) -> i32 {
        self.raw_score
    }

    /// Raw score relative to the best achievable, in [0, 1].
    pub fn normalized_score(&self) -> f64 {
        self.normalized_score
    }

    /// Aligned item slices per column of a pairwise alignment.
    pub fn correspondences<'s, T>(&self, seq1: &'s [T], seq2: &'s [T]) -> Vec<(&'s [T], &'s [T])> {
        self.rows[0]
            .cells
            .iter()
            .zip(&self.rows[1].cells)
            .map(|(c1, c2)| (&seq1[c1.range()], &seq2[c2.range()]))
            .collect()
    }

    /// Classify each column of a pairwise alignment.
    pub fn edit_ops<T: PartialEq>(&self, seq1: &[T], seq2: &[T]) -> Vec<EditOp> {
        self.correspondences(seq1, seq2)
            .into_iter()
            .map(|(a, b)| match (a.len(), b.len()) {
                (0, _) => EditOp::Insert,
                (_, 0) => EditOp::Delete,
                (1, 2) => EditOp::Expand,
                (2, 1) => EditOp::Compress,
                _ if a == b => EditOp::Match,
                _ => EditOp::Substitute,
            })
            .collect()
    }

    /// Text rendering, one line per row: `pre |a b - c| suf`.
    pub fn render<T: Display>(&self, sequences: &[&[T]]) -> String {
        let mut out = String::new();
        for (index, (row, seq)) in self.rows.iter().zip(sequences).enumerate() {
            if index > 0 {
                out.push('\n');
            }
            let concat = |range: Range<usize>| {
                seq[range].iter().fold(String::new(), |mut s, item| {
                    let _ = write!(s, "{item}");
                    s
                })
            };
            let prefix = concat(row.prefix.clone());
            if !prefix.is_empty() {
                out.push_str(&prefix);
                out.push(' ');
            }
            out.push('|');
            let cells: Vec<String> = row
                .cells
                .iter()
                .map(|c| if c.is_gap() { "-".to_string() } else { concat(c.range()) })
                .collect();
            out.push_str(&cells.join(" "));
            out.push('|');
            let suffix = concat(row.suffix.clone());
            if !suffix.is_empty() {
                out.push(' ');
                out.push_str(&suffix);
            }
        }
        out
    }
}

/// Connected component (cognate set)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CognateSet {
    pub id: usize,
    pub members: Vec<String>,
    pub size: usize,
}

impl CognateSet {
    pub fn new(id: usize, members: Vec<String>) -> Self {
        let size = members.len();
        Self { id, members, size }
    }
}
