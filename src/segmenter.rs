//! Transcription segmentation.
//!
//! Splits IPA strings into extended grapheme clusters and maps each cluster
//! to a pooled [`Segment`]. Combining diacritics ride along in the cluster of
//! their base; free-standing modifier letters attach to the previous segment.

use std::sync::Arc;

use ahash::{AHashMap, AHashSet};
use unicode_segmentation::UnicodeSegmentation;

use crate::error::{ConfigError, SegmentationError};
use crate::features::FeatureStruct;
use crate::segment::{Segment, SegmentPool};
use crate::variety::Word;

/// Marks the stem inside a transcription: `un|do|ne`.
const STEM_MARKER: char = '|';

#[derive(Debug)]
pub struct Segmenter {
    pool: Arc<SegmentPool>,
    bases: AHashMap<String, FeatureStruct>,
    modifiers: AHashMap<String, FeatureStruct>,
    joiners: AHashSet<String>,
    boundaries: AHashSet<String>,
    ignored: AHashSet<String>,
}

/// Segment under construction.
struct Pending {
    str_rep: String,
    fs: FeatureStruct,
}

impl Segmenter {
    pub fn new(pool: Arc<SegmentPool>) -> Self {
        Self {
            pool,
            bases: AHashMap::new(),
            modifiers: AHashMap::new(),
            joiners: AHashSet::new(),
            boundaries: AHashSet::new(),
            ignored: AHashSet::new(),
        }
    }

    pub fn pool(&self) -> &Arc<SegmentPool> {
        &self.pool
    }

    /// Register a consonant or vowel symbol.
    pub fn add_base(&mut self, symbol: &str, fs: FeatureStruct) -> Result<(), ConfigError> {
        if self.bases.insert(symbol.to_string(), fs).is_some() {
            return Err(ConfigError::DuplicateSegment(symbol.to_string()));
        }
        Ok(())
    }

    /// Register a diacritic; its feature values override the base's.
    pub fn add_modifier(&mut self, symbol: &str, overrides: FeatureStruct) {
        self.modifiers.insert(symbol.to_string(), overrides);
    }

    pub fn add_joiner(&mut self, symbol: &str) {
        self.joiners.insert(symbol.to_string());
    }

    pub fn add_boundary(&mut self, symbol: &str) {
        self.boundaries.insert(symbol.to_string());
    }

    pub fn add_ignored(&mut self, symbol: &str) {
        self.ignored.insert(symbol.to_string());
    }

    /// Segment a transcription.
    pub fn segment(&self, text: &str) -> Result<Vec<Segment>, SegmentationError> {
        let mut segments = Vec::new();
        let mut current: Option<Pending> = None;
        let mut joining = false;

        for grapheme in text.graphemes(true) {
            if self.ignored.contains(grapheme) || self.boundaries.contains(grapheme) {
                if joining {
                    return Err(SegmentationError::DanglingJoiner(text.to_string()));
                }
                continue;
            }

            if let Some(overrides) = self.modifiers.get(grapheme) {
                let Some(pending) = current.as_mut() else {
                    return Err(SegmentationError::DanglingModifier {
                        text: text.to_string(),
                        symbol: grapheme.to_string(),
                    });
                };
                pending.str_rep.push_str(grapheme);
                pending.fs = pending.fs.overridden_by(overrides);
                continue;
            }

            if self.joiners.contains(grapheme) {
                let Some(pending) = current.as_mut() else {
                    return Err(SegmentationError::DanglingModifier {
                        text: text.to_string(),
                        symbol: grapheme.to_string(),
                    });
                };
                pending.str_rep.push_str(grapheme);
                joining = true;
                continue;
            }

            let (next, joins) = self.read_cluster(text, grapheme)?;
            if joining {
                // joining is only set while a segment is pending
                if let Some(pending) = current.as_mut() {
                    pending.str_rep.push_str(&next.str_rep);
                    pending.fs = pending.fs.union(&next.fs);
                }
            } else if let Some(done) = current.replace(next) {
                segments.push(self.pool.get_or_create(&done.str_rep, &done.fs));
            }
            joining = joins;
        }

        if joining {
            return Err(SegmentationError::DanglingJoiner(text.to_string()));
        }
        if let Some(done) = current {
            segments.push(self.pool.get_or_create(&done.str_rep, &done.fs));
        }
        Ok(segments)
    }

    /// Read one grapheme: a base symbol followed by combining marks. Returns
    /// the segment and whether the grapheme ends in a joiner.
    fn read_cluster(&self, text: &str, grapheme: &str) -> Result<(Pending, bool), SegmentationError> {
        let unknown = || SegmentationError::UnknownSymbol {
            text: text.to_string(),
            symbol: grapheme.to_string(),
        };

        // longest known prefix is the base
        let (base_len, base_fs) = grapheme
            .char_indices()
            .map(|(i, c)| i + c.len_utf8())
            .rev()
            .find_map(|end| self.bases.get(&grapheme[..end]).map(|fs| (end, fs)))
            .ok_or_else(unknown)?;

        let mut pending = Pending {
            str_rep: grapheme[..base_len].to_string(),
            fs: base_fs.clone(),
        };
        let mut joins = false;
        for (i, c) in grapheme[base_len..].char_indices() {
            let mark = &grapheme[base_len + i..base_len + i + c.len_utf8()];
            if joins {
                // a joiner must close the grapheme
                return Err(unknown());
            }
            if self.joiners.contains(mark) {
                joins = true;
            } else if let Some(overrides) = self.modifiers.get(mark) {
                pending.fs = pending.fs.overridden_by(overrides);
            } else {
                return Err(unknown());
            }
            pending.str_rep.push_str(mark);
        }
        Ok((pending, joins))
    }

    /// Segment a word, honouring `prefix|stem|suffix` markup.
    pub fn word(&self, text: &str, meaning: &str) -> Result<Word, SegmentationError> {
        let parts: Vec<&str> = text.split(STEM_MARKER).collect();
        match parts.as_slice() {
            [whole] => Ok(Word::new(*whole, meaning, self.segment(whole)?)),
            [prefix, stem, suffix] => {
                let mut segments = self.segment(prefix)?;
                let start = segments.len();
                segments.extend(self.segment(stem)?);
                let end = segments.len();
                segments.extend(self.segment(suffix)?);
                let str_rep: String = parts.concat();
                Ok(Word::with_stem(str_rep, meaning, segments, start..end))
            }
            _ => Err(SegmentationError::UnbalancedStem(text.to_string())),
        }
    }
}
