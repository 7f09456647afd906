use std::collections::VecDeque;

use crate::{ModelGraphError, Result};

/// Linear undo/redo history with a movable pointer.
///
/// `position` is the index of the most recent applied entry; `None` means the
/// pointer sits before the first entry. Pushing discards everything after the
/// pointer.
#[derive(Debug, Clone)]
pub struct Journal<T> {
    entries: VecDeque<T>,
    position: Option<usize>,
    /// 0 keeps every entry.
    max_entries: usize,
}

impl<T> Default for Journal<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Journal<T> {
    pub fn new() -> Self {
        Self::with_capacity_limit(0)
    }

    pub fn with_capacity_limit(max_entries: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            position: None,
            max_entries,
        }
    }

    pub fn push(&mut self, entry: T) {
        let keep = self.position.map(|p| p + 1).unwrap_or(0);
        self.entries.truncate(keep);
        self.entries.push_back(entry);

        if self.max_entries > 0 && self.entries.len() > self.max_entries {
            self.entries.pop_front();
        }
        self.position = Some(self.entries.len() - 1);
    }

    /// Entry under the pointer.
    pub fn peek(&self) -> Option<&T> {
        self.position.and_then(|p| self.entries.get(p))
    }

    /// Entry `go_forward` would move to.
    pub fn peek_next(&self) -> Option<&T> {
        self.entries.get(self.position.map(|p| p + 1).unwrap_or(0))
    }

    pub fn can_go_back(&self) -> bool {
        self.peek().is_some()
    }

    pub fn can_go_forward(&self) -> bool {
        let next = self.position.map(|p| p + 1).unwrap_or(0);
        next < self.entries.len()
    }

    pub fn go_back(&mut self) -> Result<()> {
        match self.position {
            Some(0) => {
                self.position = None;
                Ok(())
            }
            Some(p) => {
                self.position = Some(p - 1);
                Ok(())
            }
            None => Err(ModelGraphError::Journal(
                "cannot go back past the first entry".to_string(),
            )),
        }
    }

    pub fn go_forward(&mut self) -> Result<()> {
        if !self.can_go_forward() {
            return Err(ModelGraphError::Journal(
                "cannot go forward past the last entry".to_string(),
            ));
        }
        self.position = Some(self.position.map(|p| p + 1).unwrap_or(0));
        Ok(())
    }

    /// True when the pointer does not reference an entry.
    pub fn is_out_of_range(&self) -> bool {
        self.peek().is_none()
    }

    pub fn position(&self) -> Option<usize> {
        self.position
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.position = None;
    }
}
