//! LangViz Align: phonetic alignment kernel for comparative linguistics.
//!
//! Provides:
//! - ALINE feature distance and scoring over segmented IPA words
//! - Pairwise alignment (global, semi-global, half-local, local) with
//!   expansions, compressions and near-optimal traceback
//! - EM induction of sound correspondences between varieties
//! - Progressive multiple alignment
//! - Parallel batch drivers and clustering of the resulting scores
//!
//! ```no_run
//! use langviz_align::Project;
//!
//! let project = Project::builtin()?;
//! let chair = project.segmenter.word("chair", "chair")?;
//! let apple = project.segmenter.word("apple", "apple")?;
//! let result = project.aline.compute(&chair, &apple);
//! assert_eq!(result.best_raw_score(), 650);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod cluster;
pub mod config;
pub mod error;
pub mod features;
pub mod inducer;
pub mod multiple;
pub mod pairwise;
pub mod phonetic;
pub mod pipeline;
pub mod scorer;
pub mod segment;
pub mod segmenter;
pub mod statistics;
pub mod types;
pub mod variety;

#[cfg(test)]
mod test_util;

pub use cluster::{cognate_sets, flat_upgma, upgma_tree, Dendrogram};
pub use config::{AlignerSettings, AlineScores, InducerSettings, Project, ProjectConfig};
pub use error::{AlignmentError, ConfigError, SegmentationError};
pub use features::{FeatureDistance, FeatureStruct, FeatureSystem, SegmentType};
pub use inducer::{EmSoundChangeInducer, Induction, InductionReport};
pub use pairwise::{AlignmentMode, PairwiseAlignmentAlgorithm, Sequence};
pub use phonetic::{Aline, WordAlignerResult};
pub use pipeline::{induce_all, variety_pairs, CancellationToken, PipelineSummary};
pub use scorer::{AlignmentScorer, AlineScorer};
pub use segment::{Ngram, Segment, SegmentPool, SoundClass, SoundContext};
pub use segmenter::Segmenter;
pub use types::{Alignment, AlignmentCell, AlignmentRow, CognateSet, EditOp, SimilarityEdge};
pub use variety::{SoundChangeModel, Variety, VarietyPair, Word, WordPair};
