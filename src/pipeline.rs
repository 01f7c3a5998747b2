//! Parallel driver: sound change induction over many variety pairs.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::inducer::EmSoundChangeInducer;
use crate::variety::{Variety, VarietyPair};

/// Cooperative cancellation flag shared between a driver and its caller.
///
/// Checked between work items only; a variety pair that has started is
/// always finished and committed.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSummary {
    pub processed: usize,
    /// Pairs left untouched because the run was cancelled.
    pub skipped: usize,
}

/// Every unordered pair of `varieties`, in input order.
pub fn variety_pairs(varieties: &[Arc<Variety>]) -> Vec<VarietyPair> {
    let n = varieties.len();
    (0..n)
        .flat_map(|i| (i + 1..n).map(move |j| (i, j)))
        .map(|(i, j)| VarietyPair::new(Arc::clone(&varieties[i]), Arc::clone(&varieties[j])))
        .collect()
}

/// Induce sound changes for every pair in parallel, one task per pair.
///
/// Each pair's result is computed off to the side and committed in one step,
/// so a cancelled run leaves every pair either fully processed or untouched.
pub fn induce_all(
    inducer: &EmSoundChangeInducer<'_>,
    pairs: &mut [VarietyPair],
    token: &CancellationToken,
) -> PipelineSummary {
    let total = pairs.len();
    let processed = AtomicUsize::new(0);
    tracing::info!(pairs = total, "sound change induction started");

    pairs.par_iter_mut().for_each(|pair| {
        if token.is_cancelled() {
            return;
        }
        let induction = inducer.induce(pair);
        pair.apply(induction);
        let done = processed.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::debug!(
            variety1 = %pair.variety1.name,
            variety2 = %pair.variety2.name,
            done,
            total,
            "variety pair processed"
        );
    });

    let processed = processed.into_inner();
    let summary = PipelineSummary {
        processed,
        skipped: total - processed,
    };
    if token.is_cancelled() {
        tracing::warn!(processed = summary.processed, skipped = summary.skipped, "sound change induction cancelled");
    } else {
        tracing::info!(processed = summary.processed, "sound change induction finished");
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util;

    fn varieties(project: &crate::config::Project) -> Vec<Arc<Variety>> {
        let lists: [&[(&str, &str)]; 3] = [
            &[("one", "pat"), ("two", "min")],
            &[("one", "fat"), ("two", "min")],
            &[("one", "pad"), ("two", "mun")],
        ];
        lists
            .iter()
            .enumerate()
            .map(|(i, words)| Arc::new(test_util::variety(project, &format!("v{i}"), words)))
            .collect()
    }

    #[test]
    fn test_all_pairs_processed() {
        let project = test_util::project();
        let mut pairs = variety_pairs(&varieties(&project));
        assert_eq!(pairs.len(), 3);
        assert_eq!((pairs[2].variety1.name.as_str(), pairs[2].variety2.name.as_str()), ("v1", "v2"));

        let inducer = EmSoundChangeInducer::new(&project.aline, project.inducer.clone());
        let summary = induce_all(&inducer, &mut pairs, &CancellationToken::new());
        assert_eq!(summary, PipelineSummary { processed: 3, skipped: 0 });
        assert!(pairs.iter().all(|p| p.induction.is_some() && p.phonetic_similarity_score > 0.0));
    }

    #[test]
    fn test_cancelled_run_leaves_pairs_untouched() {
        let project = test_util::project();
        let mut pairs = variety_pairs(&varieties(&project));
        let token = CancellationToken::new();
        let observer = token.clone();
        token.cancel();
        assert!(observer.is_cancelled());

        let inducer = EmSoundChangeInducer::new(&project.aline, project.inducer.clone());
        let summary = induce_all(&inducer, &mut pairs, &observer);
        assert_eq!(summary, PipelineSummary { processed: 0, skipped: 3 });
        assert!(pairs.iter().all(|p| p.induction.is_none() && p.sound_change.is_none()));
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let project = test_util::project();
        let inducer = EmSoundChangeInducer::new(&project.aline, project.inducer.clone());
        let mut parallel = variety_pairs(&varieties(&project));
        induce_all(&inducer, &mut parallel, &CancellationToken::new());

        for pair in &parallel {
            let mut sequential = VarietyPair::new(Arc::clone(&pair.variety1), Arc::clone(&pair.variety2));
            inducer.process(&mut sequential);
            assert_eq!(sequential.phonetic_similarity_score, pair.phonetic_similarity_score);
            assert_eq!(sequential.induction, pair.induction);
        }
    }
}
