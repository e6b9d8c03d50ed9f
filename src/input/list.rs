//! Ordered list with change notifications
//!
//! Presentation code mirrors the list by applying the same
//! insert/remove positions it receives on the channel. Changes carry the
//! item, so a mirror stays exact even when it lags behind the list.

use std::sync::mpsc;

/// Position-carrying change of an [`ObservableList`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListChange<T> {
    Inserted(usize, T),
    Removed(usize, T),
}

impl<T> ListChange<T> {
    pub fn position(&self) -> usize {
        match self {
            ListChange::Inserted(position, _) | ListChange::Removed(position, _) => *position,
        }
    }

    pub fn item(&self) -> &T {
        match self {
            ListChange::Inserted(_, item) | ListChange::Removed(_, item) => item,
        }
    }
}

pub struct ObservableList<T: Clone> {
    items: Vec<T>,
    listeners: Vec<mpsc::Sender<ListChange<T>>>,
}

impl<T: Clone> ObservableList<T> {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            listeners: Vec::new(),
        }
    }

    /// Subscribe to future changes
    pub fn subscribe(&mut self) -> mpsc::Receiver<ListChange<T>> {
        let (tx, rx) = mpsc::channel();
        self.listeners.push(tx);
        rx
    }

    pub fn push(&mut self, item: T) {
        self.items.push(item.clone());
        self.notify(ListChange::Inserted(self.items.len() - 1, item));
    }

    pub fn remove(&mut self, position: usize) -> T {
        let item = self.items.remove(position);
        self.notify(ListChange::Removed(position, item.clone()));
        item
    }

    pub fn position(&self, pred: impl Fn(&T) -> bool) -> Option<usize> {
        self.items.iter().position(pred)
    }

    /// Remove the first item matching `pred`
    pub fn remove_where(&mut self, pred: impl Fn(&T) -> bool) -> Option<T> {
        let position = self.position(pred)?;
        Some(self.remove(position))
    }

    pub fn get(&self, position: usize) -> Option<&T> {
        self.items.get(position)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn notify(&mut self, change: ListChange<T>) {
        // Drop listeners whose receiver is gone
        self.listeners.retain(|tx| tx.send(change.clone()).is_ok());
    }
}

impl<T: Clone> Default for ObservableList<T> {
    fn default() -> Self {
        Self::new()
    }
}
