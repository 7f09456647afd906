use serde::{Deserialize, Serialize};

use crate::{ModelGraphError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CollectionAction {
    Add,
    Remove,
    Replace,
    Move,
    Reset,
}

/// A single structural change to an ordered list.
///
/// Holds enough to apply the change again or to invert it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionChange<T> {
    pub action: CollectionAction,
    pub old_items: Vec<T>,
    pub new_items: Vec<T>,
    pub old_index: Option<usize>,
    pub new_index: Option<usize>,
}

impl<T: Clone> CollectionChange<T> {
    pub fn added(index: usize, items: Vec<T>) -> Self {
        Self {
            action: CollectionAction::Add,
            old_items: Vec::new(),
            new_items: items,
            old_index: None,
            new_index: Some(index),
        }
    }

    pub fn removed(index: usize, items: Vec<T>) -> Self {
        Self {
            action: CollectionAction::Remove,
            old_items: items,
            new_items: Vec::new(),
            old_index: Some(index),
            new_index: None,
        }
    }

    pub fn replaced(index: usize, old: T, new: T) -> Self {
        Self {
            action: CollectionAction::Replace,
            old_items: vec![old],
            new_items: vec![new],
            old_index: Some(index),
            new_index: Some(index),
        }
    }

    pub fn moved(item: T, from: usize, to: usize) -> Self {
        Self {
            action: CollectionAction::Move,
            old_items: vec![item.clone()],
            new_items: vec![item],
            old_index: Some(from),
            new_index: Some(to),
        }
    }

    /// The list was cleared; `items` is everything it held.
    pub fn reset(items: Vec<T>) -> Self {
        Self {
            action: CollectionAction::Reset,
            old_items: items,
            new_items: Vec::new(),
            old_index: None,
            new_index: None,
        }
    }

    /// The change that undoes this one.
    pub fn inverse(&self) -> Self {
        match self.action {
            CollectionAction::Add => {
                Self::removed(self.new_index.unwrap_or(0), self.new_items.clone())
            }
            CollectionAction::Remove => {
                Self::added(self.old_index.unwrap_or(0), self.old_items.clone())
            }
            CollectionAction::Replace => Self {
                action: CollectionAction::Replace,
                old_items: self.new_items.clone(),
                new_items: self.old_items.clone(),
                old_index: self.new_index,
                new_index: self.old_index,
            },
            CollectionAction::Move => Self {
                action: CollectionAction::Move,
                old_items: self.new_items.clone(),
                new_items: self.old_items.clone(),
                old_index: self.new_index,
                new_index: self.old_index,
            },
            CollectionAction::Reset => Self::added(0, self.old_items.clone()),
        }
    }
}

/// Ordered list that reports every mutation as a `CollectionChange`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservableList<T> {
    items: Vec<T>,
}

impl<T> Default for ObservableList<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T> From<Vec<T>> for ObservableList<T> {
    fn from(items: Vec<T>) -> Self {
        Self { items }
    }
}

fn out_of_range(op: &str, index: usize, len: usize) -> ModelGraphError {
    ModelGraphError::Collection(format!("{} index {} out of range (len {})", op, index, len))
}

impl<T: Clone + PartialEq> ObservableList<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    pub fn contains(&self, item: &T) -> bool {
        self.items.contains(item)
    }

    pub fn push(&mut self, item: T) -> CollectionChange<T> {
        let index = self.items.len();
        self.items.push(item.clone());
        CollectionChange::added(index, vec![item])
    }

    pub fn insert(&mut self, index: usize, item: T) -> Result<CollectionChange<T>> {
        if index > self.items.len() {
            return Err(out_of_range("insert", index, self.items.len()));
        }
        self.items.insert(index, item.clone());
        Ok(CollectionChange::added(index, vec![item]))
    }

    /// Appends all `items` as one change. Returns `None` for an empty batch.
    pub fn extend(&mut self, items: Vec<T>) -> Option<CollectionChange<T>> {
        if items.is_empty() {
            return None;
        }
        let index = self.items.len();
        self.items.extend(items.iter().cloned());
        Some(CollectionChange::added(index, items))
    }

    pub fn remove_at(&mut self, index: usize) -> Result<CollectionChange<T>> {
        if index >= self.items.len() {
            return Err(out_of_range("remove", index, self.items.len()));
        }
        let item = self.items.remove(index);
        Ok(CollectionChange::removed(index, vec![item]))
    }

    /// Removes the first occurrence of `item`. `None` when absent.
    pub fn remove(&mut self, item: &T) -> Option<CollectionChange<T>> {
        let index = self.items.iter().position(|i| i == item)?;
        let removed = self.items.remove(index);
        Some(CollectionChange::removed(index, vec![removed]))
    }

    pub fn replace(&mut self, index: usize, item: T) -> Result<CollectionChange<T>> {
        let len = self.items.len();
        let slot = self
            .items
            .get_mut(index)
            .ok_or_else(|| out_of_range("replace", index, len))?;
        let old = std::mem::replace(slot, item.clone());
        Ok(CollectionChange::replaced(index, old, item))
    }

    pub fn move_item(&mut self, from: usize, to: usize) -> Result<CollectionChange<T>> {
        let len = self.items.len();
        if from >= len {
            return Err(out_of_range("move", from, len));
        }
        if to >= len {
            return Err(out_of_range("move", to, len));
        }
        let item = self.items.remove(from);
        self.items.insert(to, item.clone());
        Ok(CollectionChange::moved(item, from, to))
    }

    pub fn clear(&mut self) -> CollectionChange<T> {
        CollectionChange::reset(std::mem::take(&mut self.items))
    }

    /// Re-applies a recorded change. Fails if the list no longer matches it.
    pub fn apply(&mut self, change: &CollectionChange<T>) -> Result<()> {
        match change.action {
            CollectionAction::Add => {
                let index = change.new_index.unwrap_or(self.items.len());
                if index > self.items.len() {
                    return Err(out_of_range("add", index, self.items.len()));
                }
                for (offset, item) in change.new_items.iter().enumerate() {
                    self.items.insert(index + offset, item.clone());
                }
            }
            CollectionAction::Remove => {
                let index = change.old_index.unwrap_or(0);
                self.expect_items(index, &change.old_items)?;
                self.items.drain(index..index + change.old_items.len());
            }
            CollectionAction::Replace => {
                let index = change.old_index.unwrap_or(0);
                self.expect_items(index, &change.old_items)?;
                for (offset, item) in change.new_items.iter().enumerate() {
                    self.items[index + offset] = item.clone();
                }
            }
            CollectionAction::Move => {
                let from = change.old_index.unwrap_or(0);
                let to = change.new_index.unwrap_or(0);
                self.expect_items(from, &change.old_items)?;
                if to >= self.items.len() {
                    return Err(out_of_range("move", to, self.items.len()));
                }
                let item = self.items.remove(from);
                self.items.insert(to, item);
            }
            CollectionAction::Reset => {
                if self.items != change.old_items {
                    return Err(ModelGraphError::Collection(
                        "reset does not match current contents".to_string(),
                    ));
                }
                self.items.clear();
            }
        }
        Ok(())
    }

    /// Applies the inverse of `change` and returns it.
    pub fn revert(&mut self, change: &CollectionChange<T>) -> Result<CollectionChange<T>> {
        let inverse = change.inverse();
        self.apply(&inverse)?;
        Ok(inverse)
    }

    /// Re-applies a recorded change against contents that may have drifted
    /// since it was recorded. Never fails.
    ///
    /// Recorded positions are used while they still hold the recorded items;
    /// otherwise items are located by value and indices are clamped to the
    /// current length. Items that can no longer be found are skipped.
    pub fn replay(&mut self, change: &CollectionChange<T>) {
        match change.action {
            CollectionAction::Add => {
                let index = change
                    .new_index
                    .unwrap_or(self.items.len())
                    .min(self.items.len());
                for (offset, item) in change.new_items.iter().enumerate() {
                    self.items.insert(index + offset, item.clone());
                }
            }
            CollectionAction::Remove => {
                let index = change.old_index.unwrap_or(0);
                if self.matches_at(index, &change.old_items) {
                    self.items.drain(index..index + change.old_items.len());
                } else {
                    for item in &change.old_items {
                        if let Some(pos) = self.items.iter().position(|i| i == item) {
                            self.items.remove(pos);
                        }
                    }
                }
            }
            CollectionAction::Replace => {
                let index = change.old_index.unwrap_or(0);
                for (offset, (old, new)) in change.old_items.iter().zip(&change.new_items).enumerate() {
                    let at = index + offset;
                    let pos = if self.items.get(at) == Some(old) {
                        Some(at)
                    } else {
                        self.items.iter().position(|i| i == old)
                    };
                    if let Some(pos) = pos {
                        self.items[pos] = new.clone();
                    }
                }
            }
            CollectionAction::Move => {
                let from = change.old_index.unwrap_or(0);
                let Some(item) = change.old_items.first() else {
                    return;
                };
                let pos = if self.items.get(from) == Some(item) {
                    Some(from)
                } else {
                    self.items.iter().position(|i| i == item)
                };
                if let Some(pos) = pos {
                    let moved = self.items.remove(pos);
                    let to = change.new_index.unwrap_or(0).min(self.items.len());
                    self.items.insert(to, moved);
                }
            }
            CollectionAction::Reset => self.items.clear(),
        }
    }

    fn matches_at(&self, index: usize, expected: &[T]) -> bool {
        let end = index + expected.len();
        end <= self.items.len() && self.items[index..end] == *expected
    }

    fn expect_items(&self, index: usize, expected: &[T]) -> Result<()> {
        let end = index + expected.len();
        if end > self.items.len() {
            return Err(out_of_range("apply", index, self.items.len()));
        }
        if self.items[index..end] != *expected {
            return Err(ModelGraphError::Collection(format!(
                "items at index {} do not match the recorded change",
                index
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn revert_restores_each_action() {
        let mut list: ObservableList<i32> = vec![1, 2, 3].into();
        let snapshot = list.clone();

        let changes = vec![
            list.push(4),
            list.insert(0, 0).unwrap(),
            list.remove_at(2).unwrap(),
            list.replace(1, 10).unwrap(),
            list.move_item(0, 3).unwrap(),
            list.clear(),
        ];
        assert!(list.is_empty());

        for change in changes.iter().rev() {
            list.revert(change).unwrap();
        }
        assert_eq!(list, snapshot);

        for change in &changes {
            list.apply(change).unwrap();
        }
        assert!(list.is_empty());
    }

    #[test]
    fn move_reports_both_indices() {
        let mut list: ObservableList<&str> = vec!["a", "b", "c"].into();
        let change = list.move_item(0, 2).unwrap();
        assert_eq!(list.items(), &["b", "c", "a"]);
        assert_eq!(change.old_index, Some(0));
        assert_eq!(change.new_index, Some(2));
        assert_eq!(change.inverse().old_index, Some(2));
    }

    #[test]
    fn replay_tolerates_drifted_contents() {
        let mut list: ObservableList<&str> = vec!["a"].into();
        let added = list.push("b");
        list.insert(0, "z").unwrap();

        // "b" moved from index 1 to 2, so the inverse falls back to a search by value.
        list.replay(&added.inverse());
        assert_eq!(list.items(), &["z", "a"]);

        list.replay(&added);
        assert_eq!(list.items(), &["z", "b", "a"]);

        let stale = CollectionChange::added(10, vec!["c"]);
        list.replay(&stale);
        assert_eq!(list.items(), &["z", "b", "a", "c"]);

        list.replay(&CollectionChange::removed(0, vec!["missing"]));
        list.replay(&CollectionChange::replaced(0, "a", "A"));
        list.replay(&CollectionChange::moved("c", 3, 0));
        assert_eq!(list.items(), &["c", "z", "b", "A"]);
    }

    #[test]
    fn mismatched_apply_fails() {
        let mut list: ObservableList<i32> = vec![1, 2].into();
        let stale = CollectionChange::removed(0, vec![5]);
        assert!(list.apply(&stale).is_err());
        assert!(list.remove_at(5).is_err());
        assert!(list.remove(&9).is_none());
        assert!(list.extend(Vec::new()).is_none());
    }
}
