use serde::{Deserialize, Serialize};

/// Array used as a ring-buffered history.
///
/// Records are kept most-recent-first. Every push truncates the array to a
/// cap, dropping the oldest entries from the tail. Serializes as a plain
/// JSON array.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CappedLog<T>(Vec<T>);

impl<T> CappedLog<T> {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Wrap records that are already most-recent-first.
    pub fn from_vec(records: Vec<T>) -> Self {
        Self(records)
    }

    /// Prepend `record` and truncate to `cap`. Returns the dropped records,
    /// newest first.
    pub fn push_front(&mut self, record: T, cap: usize) -> Vec<T> {
        self.0.insert(0, record);
        self.truncate(cap)
    }

    /// Prepend `records` in the order given, so the last one ends up first,
    /// then truncate to `cap`.
    pub fn extend_front<I>(&mut self, records: I, cap: usize) -> Vec<T>
    where
        I: IntoIterator<Item = T>,
    {
        let mut incoming: Vec<T> = records.into_iter().collect();
        incoming.reverse();
        incoming.append(&mut self.0);
        self.0 = incoming;
        self.truncate(cap)
    }

    /// Drop everything past `cap`.
    pub fn truncate(&mut self, cap: usize) -> Vec<T> {
        if self.0.len() > cap {
            self.0.split_off(cap)
        } else {
            Vec::new()
        }
    }

    /// Most recent record.
    pub fn latest(&self) -> Option<&T> {
        self.0.first()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.0.iter()
    }

    /// Records matching `pred`, most recent first.
    pub fn filter<P>(&self, mut pred: P) -> Vec<&T>
    where
        P: FnMut(&T) -> bool,
    {
        self.0.iter().filter(|r| pred(r)).collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn as_slice(&self) -> &[T] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<T> {
        self.0
    }
}

impl<T> Default for CappedLog<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, T> IntoIterator for &'a CappedLog<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
