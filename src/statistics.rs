//! Frequency counts and smoothed probability distributions.

use std::hash::Hash;

use ahash::AHashMap;

/// Sample counts.
#[derive(Debug, Clone)]
pub struct FrequencyDistribution<T> {
    counts: AHashMap<T, u32>,
    total: u32,
}

impl<T> Default for FrequencyDistribution<T> {
    fn default() -> Self {
        Self {
            counts: AHashMap::new(),
            total: 0,
        }
    }
}

impl<T: Eq + Hash> FrequencyDistribution<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&mut self, sample: T) {
        self.increment_by(sample, 1);
    }

    pub fn increment_by(&mut self, sample: T, count: u32) {
        *self.counts.entry(sample).or_insert(0) += count;
        self.total += count;
    }

    pub fn count(&self, sample: &T) -> u32 {
        self.counts.get(sample).copied().unwrap_or(0)
    }

    /// Total number of observations (N).
    pub fn sample_outcome_count(&self) -> u32 {
        self.total
    }

    /// Distinct observed samples (T).
    pub fn observed_sample_count(&self) -> usize {
        self.counts.len()
    }

    pub fn observed_samples(&self) -> impl Iterator<Item = &T> {
        self.counts.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&T, u32)> {
        self.counts.iter().map(|(s, &c)| (s, c))
    }
}

/// Frequency distributions keyed by a condition.
#[derive(Debug, Clone)]
pub struct ConditionalFrequencyDistribution<C, T> {
    conditions: AHashMap<C, FrequencyDistribution<T>>,
}

impl<C, T> Default for ConditionalFrequencyDistribution<C, T> {
    fn default() -> Self {
        Self {
            conditions: AHashMap::new(),
        }
    }
}

impl<C: Eq + Hash, T: Eq + Hash> ConditionalFrequencyDistribution<C, T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&mut self, condition: C, sample: T) {
        self.conditions.entry(condition).or_default().increment(sample);
    }

    pub fn get(&self, condition: &C) -> Option<&FrequencyDistribution<T>> {
        self.conditions.get(condition)
    }

    pub fn conditions(&self) -> impl Iterator<Item = &C> {
        self.conditions.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&C, &FrequencyDistribution<T>)> {
        self.conditions.iter()
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }
}

/// Probabilities of observed samples plus the probability shared by every
/// unseen sample.
#[derive(Debug, Clone)]
pub struct ProbabilityDistribution<T> {
    probabilities: AHashMap<T, f64>,
    unseen: f64,
}

impl<T: Eq + Hash + Clone> ProbabilityDistribution<T> {
    /// Witten-Bell smoothing over a vocabulary of `vocabulary_size` samples.
    ///
    /// Observed: `c / (N + T)`. Each unseen sample: `T / ((N + T)(V - T))`.
    pub fn witten_bell(fd: &FrequencyDistribution<T>, vocabulary_size: usize) -> Self {
        let n = fd.sample_outcome_count() as f64;
        let t = fd.observed_sample_count();
        if fd.sample_outcome_count() == 0 {
            let uniform = if vocabulary_size > 0 {
                1.0 / vocabulary_size as f64
            } else {
                0.0
            };
            return Self {
                probabilities: AHashMap::new(),
                unseen: uniform,
            };
        }
        let denominator = n + t as f64;
        let probabilities = fd
            .iter()
            .map(|(sample, count)| (sample.clone(), count as f64 / denominator))
            .collect();
        let unseen = if vocabulary_size > t {
            t as f64 / (denominator * (vocabulary_size - t) as f64)
        } else {
            0.0
        };
        Self {
            probabilities,
            unseen,
        }
    }

    /// Relative frequencies, nothing reserved for unseen samples.
    pub fn max_likelihood(fd: &FrequencyDistribution<T>) -> Self {
        let n = fd.sample_outcome_count() as f64;
        let probabilities = fd
            .iter()
            .map(|(sample, count)| (sample.clone(), count as f64 / n))
            .collect();
        Self {
            probabilities,
            unseen: 0.0,
        }
    }

    pub fn probability(&self, sample: &T) -> f64 {
        self.probabilities.get(sample).copied().unwrap_or(self.unseen)
    }

    pub fn unseen_probability(&self) -> f64 {
        self.unseen
    }

    pub fn samples(&self) -> impl Iterator<Item = &T> {
        self.probabilities.keys()
    }

    pub fn sample_count(&self) -> usize {
        self.probabilities.len()
    }

    /// Highest probability among observed samples.
    pub fn max_probability(&self) -> Option<f64> {
        self.probabilities.values().copied().reduce(f64::max)
    }
}

/// Probability distributions keyed by a condition.
#[derive(Debug, Clone)]
pub struct ConditionalProbabilityDistribution<C, T> {
    distributions: AHashMap<C, ProbabilityDistribution<T>>,
}

impl<C, T> Default for ConditionalProbabilityDistribution<C, T> {
    fn default() -> Self {
        Self {
            distributions: AHashMap::new(),
        }
    }
}

impl<C: Eq + Hash + Clone, T: Eq + Hash + Clone> ConditionalProbabilityDistribution<C, T> {
    /// Build one distribution per condition of `cfd`.
    pub fn from_frequencies<F>(cfd: &ConditionalFrequencyDistribution<C, T>, mut build: F) -> Self
    where
        F: FnMut(&FrequencyDistribution<T>) -> ProbabilityDistribution<T>,
    {
        Self {
            distributions: cfd.iter().map(|(c, fd)| (c.clone(), build(fd))).collect(),
        }
    }

    pub fn get(&self, condition: &C) -> Option<&ProbabilityDistribution<T>> {
        self.distributions.get(condition)
    }

    pub fn conditions(&self) -> impl Iterator<Item = &C> {
        self.distributions.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&C, &ProbabilityDistribution<T>)> {
        self.distributions.iter()
    }

    pub fn len(&self) -> usize {
        self.distributions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.distributions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_witten_bell() {
        let mut fd = FrequencyDistribution::new();
        fd.increment_by("b", 3);
        fd.increment("p");
        // N = 4, T = 2, V = 6
        let pd = ProbabilityDistribution::witten_bell(&fd, 6);
        assert!((pd.probability(&"b") - 0.5).abs() < 1e-12);
        assert!((pd.probability(&"p") - 1.0 / 6.0).abs() < 1e-12);
        assert!((pd.probability(&"x") - 2.0 / 24.0).abs() < 1e-12);

        let total = pd.probability(&"b") + pd.probability(&"p") + 4.0 * pd.unseen_probability();
        assert!((total - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_witten_bell_saturated_vocabulary() {
        let mut fd = FrequencyDistribution::new();
        fd.increment("a");
        fd.increment("b");
        let pd = ProbabilityDistribution::witten_bell(&fd, 2);
        assert_eq!(pd.unseen_probability(), 0.0);
        assert!((pd.probability(&"a") - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_max_likelihood() {
        let mut fd = FrequencyDistribution::new();
        fd.increment_by(1u8, 3);
        fd.increment(2u8);
        let pd = ProbabilityDistribution::max_likelihood(&fd);
        assert_eq!(pd.probability(&1), 0.75);
        assert_eq!(pd.probability(&3), 0.0);
        assert_eq!(pd.max_probability(), Some(0.75));
    }

    #[test]
    fn test_conditional_distribution() {
        let mut cfd = ConditionalFrequencyDistribution::new();
        cfd.increment("k", "g");
        cfd.increment("k", "g");
        cfd.increment("t", "d");
        assert_eq!(cfd.len(), 2);
        assert_eq!(cfd.get(&"k").map(|fd| fd.count(&"g")), Some(2));

        let cpd = ConditionalProbabilityDistribution::from_frequencies(&cfd, ProbabilityDistribution::max_likelihood);
        assert_eq!(cpd.get(&"t").map(|pd| pd.probability(&"d")), Some(1.0));
        assert!(cpd.get(&"p").is_none());
    }
}
