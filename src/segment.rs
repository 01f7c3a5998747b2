//! Segments, the shared segment pool, n-grams and sound contexts.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use ahash::{AHashMap, AHashSet};
use parking_lot::RwLock;

use crate::features::{FeatureStruct, SegmentType};

/// Symbol an unnatural class uses for the word boundary.
pub const BOUNDARY_SYMBOL: &str = "#";

#[derive(Debug)]
struct SegmentData {
    str_rep: String,
    fs: FeatureStruct,
}

/// Immutable phonetic segment: string representation plus feature values.
///
/// Cloning is cheap. Segments handed out by a [`SegmentPool`] are shared, so
/// equality short-circuits on identity before comparing values.
#[derive(Clone)]
pub struct Segment(Arc<SegmentData>);

impl Segment {
    pub fn new(str_rep: impl Into<String>, fs: FeatureStruct) -> Self {
        Self(Arc::new(SegmentData {
            str_rep: str_rep.into(),
            fs,
        }))
    }

    pub fn str_rep(&self) -> &str {
        &self.0.str_rep
    }

    pub fn feature_struct(&self) -> &FeatureStruct {
        &self.0.fs
    }

    pub fn kind(&self) -> SegmentType {
        self.0.fs.kind()
    }

    pub fn is_vowel(&self) -> bool {
        self.kind() == SegmentType::Vowel
    }
}

impl PartialEq for Segment {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
            || (self.0.str_rep == other.0.str_rep && self.0.fs == other.0.fs)
    }
}

impl Eq for Segment {}

impl Hash for Segment {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.str_rep.hash(state);
    }
}

impl fmt::Debug for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Segment({})", self.0.str_rep)
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.str_rep)
    }
}

/// Thread-safe interning table: equal (string, features) pairs map to one
/// shared [`Segment`]. Append-only.
#[derive(Debug, Default)]
pub struct SegmentPool {
    segments: RwLock<AHashMap<(String, FeatureStruct), Segment>>,
}

impl SegmentPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the pooled segment for `(str_rep, fs)`, creating it on first use.
    pub fn get_or_create(&self, str_rep: &str, fs: &FeatureStruct) -> Segment {
        let key = (str_rep.to_string(), fs.clone());
        if let Some(segment) = self.segments.read().get(&key) {
            return segment.clone();
        }
        let mut segments = self.segments.write();
        segments
            .entry(key)
            .or_insert_with(|| Segment::new(str_rep, fs.clone()))
            .clone()
    }

    pub fn len(&self) -> usize {
        self.segments.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Sequence of zero, one or two segments. The empty n-gram stands for a gap.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Ngram {
    #[default]
    Empty,
    Unigram(Segment),
    Bigram(Segment, Segment),
}

impl Ngram {
    /// Build from a slice of at most two segments.
    pub fn from_slice(segments: &[Segment]) -> Self {
        match segments {
            [] => Ngram::Empty,
            [a] => Ngram::Unigram(a.clone()),
            [a, b] => Ngram::Bigram(a.clone(), b.clone()),
            _ => panic!("n-grams hold at most two segments, got {}", segments.len()),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Ngram::Empty => 0,
            Ngram::Unigram(_) => 1,
            Ngram::Bigram(..) => 2,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Ngram::Empty)
    }

    pub fn first(&self) -> Option<&Segment> {
        match self {
            Ngram::Empty => None,
            Ngram::Unigram(a) | Ngram::Bigram(a, _) => Some(a),
        }
    }
}

impl From<Segment> for Ngram {
    fn from(segment: Segment) -> Self {
        Ngram::Unigram(segment)
    }
}

impl fmt::Display for Ngram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ngram::Empty => f.write_str("-"),
            Ngram::Unigram(a) => write!(f, "{a}"),
            Ngram::Bigram(a, b) => write!(f, "{a}{b}"),
        }
    }
}

/// What sits at a position next to a target: a segment or the word boundary.
#[derive(Debug, Clone, Copy)]
pub enum Environment<'a> {
    Boundary,
    Segment(&'a Segment),
}

impl<'a> Environment<'a> {
    /// Environment at a (possibly out-of-range) index of a segment sequence.
    pub fn at(segments: &'a [Segment], index: isize) -> Self {
        if index < 0 {
            return Environment::Boundary;
        }
        segments
            .get(index as usize)
            .map_or(Environment::Boundary, Environment::Segment)
    }
}

#[derive(Debug, Clone)]
enum ClassKind {
    Natural(FeatureStruct),
    Unnatural(AHashSet<String>),
}

/// Named set of segments used to condition sound changes.
#[derive(Debug, Clone)]
pub struct SoundClass {
    name: Arc<str>,
    kind: ClassKind,
}

impl SoundClass {
    /// Class of every segment of `constraint`'s type unifiable with its
    /// feature values.
    pub fn natural(name: &str, constraint: FeatureStruct) -> Self {
        Self {
            name: Arc::from(name),
            kind: ClassKind::Natural(constraint),
        }
    }

    /// Class listing segments by string; [`BOUNDARY_SYMBOL`] matches the word
    /// boundary.
    pub fn unnatural<I, S>(name: &str, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: Arc::from(name),
            kind: ClassKind::Unnatural(members.into_iter().map(Into::into).collect()),
        }
    }

    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    pub fn matches(&self, env: Environment<'_>) -> bool {
        match (&self.kind, env) {
            (ClassKind::Natural(_), Environment::Boundary) => false,
            (ClassKind::Natural(constraint), Environment::Segment(segment)) => {
                let fs = segment.feature_struct();
                fs.kind() == constraint.kind() && fs.is_unifiable_with(constraint)
            }
            (ClassKind::Unnatural(members), Environment::Boundary) => {
                members.contains(BOUNDARY_SYMBOL)
            }
            (ClassKind::Unnatural(members), Environment::Segment(segment)) => {
                members.contains(segment.str_rep())
            }
        }
    }
}

/// Name of the first class in `classes` matching `env`.
pub fn matching_class(classes: &[SoundClass], env: Environment<'_>) -> Option<Arc<str>> {
    classes
        .iter()
        .find(|class| class.matches(env))
        .map(|class| class.name.clone())
}

/// Left-hand side of a sound correspondence: the target n-gram of the source
/// word and the classes of its neighbours.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SoundContext {
    pub left: Option<Arc<str>>,
    pub target: Ngram,
    pub right: Option<Arc<str>>,
}

impl SoundContext {
    pub fn new(left: Option<Arc<str>>, target: Ngram, right: Option<Arc<str>>) -> Self {
        Self {
            left,
            target,
            right,
        }
    }

    /// Context of `target` spanning `start..start + target.len()` in
    /// `segments`. For an empty target, `start` is the index of the segment
    /// following the gap.
    pub fn at(classes: &[SoundClass], segments: &[Segment], start: usize, target: Ngram) -> Self {
        let left = matching_class(classes, Environment::at(segments, start as isize - 1));
        let right = matching_class(
            classes,
            Environment::at(segments, (start + target.len()) as isize),
        );
        Self::new(left, target, right)
    }
}

impl fmt::Display for SoundContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.target)?;
        if self.left.is_some() || self.right.is_some() {
            write!(
                f,
                " / {}_{}",
                self.left.as_deref().unwrap_or(""),
                self.right.as_deref().unwrap_or("")
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util;
    use std::thread;

    #[test]
    fn test_pool_interns_equal_segments() {
        let pool = Arc::new(SegmentPool::new());
        let fs = FeatureStruct::new(SegmentType::Vowel);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let pool = Arc::clone(&pool);
                let fs = fs.clone();
                thread::spawn(move || pool.get_or_create("a", &fs))
            })
            .collect();
        let segments: Vec<Segment> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(pool.len(), 1);
        assert!(segments.windows(2).all(|w| Arc::ptr_eq(&w[0].0, &w[1].0)));

        pool.get_or_create("a", &FeatureStruct::new(SegmentType::Consonant));
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_ngram_display() {
        let a = Segment::new("t", FeatureStruct::new(SegmentType::Consonant));
        let b = Segment::new("s", FeatureStruct::new(SegmentType::Consonant));
        assert_eq!(Ngram::Empty.to_string(), "-");
        assert_eq!(Ngram::from_slice(&[a.clone(), b]).to_string(), "ts");
        assert_eq!(Ngram::from(a).len(), 1);
    }

    #[test]
    fn test_sound_classes() {
        let project = test_util::project();
        let word = project.segmenter.segment("ana").unwrap();
        let classes = project.aline.sound_classes();

        let at = |i: isize| matching_class(classes, Environment::at(&word, i)).map(|n| n.to_string());
        assert_eq!(at(-1).as_deref(), Some("Word boundary"));
        assert_eq!(at(0).as_deref(), Some("Vowel"));
        assert_eq!(at(1).as_deref(), Some("Nasal"));
        assert_eq!(at(3).as_deref(), Some("Word boundary"));

        let ctx = SoundContext::at(classes, &word, 1, Ngram::from(word[1].clone()));
        assert_eq!(ctx.to_string(), "n / Vowel_Vowel");
        let gap = SoundContext::at(classes, &word, 0, Ngram::Empty);
        assert_eq!(gap.to_string(), "- / Word boundary_Vowel");
    }
}
