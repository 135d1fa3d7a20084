use crate::error::{RecommenderError, Result};
use std::collections::HashMap;

/// Bidirectional external id <-> dense ordinal mapping.
///
/// Ordinals are `0..len()` with no gaps and are never reused.
#[derive(Debug, Clone, Default)]
pub struct IdMapper {
    ordinals: HashMap<i64, usize>,
    ids: Vec<i64>,
    max_id: Option<i64>,
}

impl IdMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign ordinals in the iteration order of `ids`, skipping duplicates.
    pub fn from_ids(ids: impl IntoIterator<Item = i64>) -> Self {
        let mut mapper = Self::new();
        for id in ids {
            mapper.insert(id);
        }
        mapper
    }

    /// Ordinal for `id`, allocating the next one if unseen.
    pub fn insert(&mut self, id: i64) -> usize {
        if let Some(&ordinal) = self.ordinals.get(&id) {
            return ordinal;
        }
        let ordinal = self.ids.len();
        self.ids.push(id);
        self.ordinals.insert(id, ordinal);
        self.max_id = Some(self.max_id.map_or(id, |max| max.max(id)));
        ordinal
    }

    pub fn ordinal(&self, id: i64) -> Option<usize> {
        self.ordinals.get(&id).copied()
    }

    pub fn id(&self, ordinal: usize) -> Option<i64> {
        self.ids.get(ordinal).copied()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Smallest id greater than every id handed out so far.
    pub fn next_id(&self) -> Result<i64> {
        match self.max_id {
            None => Ok(0),
            Some(max) => max.checked_add(1).ok_or_else(|| {
                RecommenderError::InvalidInput(format!("no user id left after {}", max))
            }),
        }
    }
}
