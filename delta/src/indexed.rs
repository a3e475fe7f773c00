//! Index-addressed merges into ordered collections.

/// Field-by-field merge of a partial update into an existing value.
pub trait Merge {
    /// Folds `incoming` into `self`.
    fn merge(&mut self, incoming: Self);
}

/// A fragment that may declare its position in a parent collection.
pub trait Indexed {
    /// Target position, or `None` to append.
    fn index(&self) -> Option<usize>;
}

/// What [`merge_at`] or [`insert_at`] did with an incoming element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// No incoming element.
    Skipped,
    /// Pushed to the end because it declared no index.
    Appended(usize),
    /// Placed as a new element at its declared index.
    Inserted(usize),
    /// Merged into the element already at its declared index.
    Merged(usize),
    /// The declared index was past the end; `gap` placeholder elements were
    /// added before the new element.
    Padded { index: usize, gap: usize },
}

impl MergeOutcome {
    /// Position of the element that was touched.
    pub fn position(&self) -> Option<usize> {
        match *self {
            MergeOutcome::Skipped => None,
            MergeOutcome::Appended(i) | MergeOutcome::Inserted(i) | MergeOutcome::Merged(i) => {
                Some(i)
            }
            MergeOutcome::Padded { index, .. } => Some(index),
        }
    }

    /// Returns true if a new element was created.
    pub fn is_new(&self) -> bool {
        matches!(
            self,
            MergeOutcome::Appended(_) | MergeOutcome::Inserted(_) | MergeOutcome::Padded { .. }
        )
    }

    /// Returns true if placeholders were added to reach the index.
    pub fn is_gap(&self) -> bool {
        matches!(self, MergeOutcome::Padded { .. })
    }
}

/// Inserts or merges `incoming` by its declared index.
///
/// - no index: appended;
/// - index within bounds: merged in place, the length does not change;
/// - index equal to the length: pushed as a new element;
/// - index past the length: the gap is filled with `T::default()`
///   placeholders before pushing, reported as [`MergeOutcome::Padded`].
pub fn merge_at<T>(items: &mut Vec<T>, incoming: Option<T>) -> MergeOutcome
where
    T: Indexed + Merge + Default,
{
    let Some(incoming) = incoming else {
        return MergeOutcome::Skipped;
    };

    match incoming.index() {
        None => {
            items.push(incoming);
            MergeOutcome::Appended(items.len() - 1)
        }
        Some(index) if index < items.len() => {
            items[index].merge(incoming);
            MergeOutcome::Merged(index)
        }
        Some(index) => {
            let gap = pad_to(items, index);
            items.push(incoming);
            if gap > 0 {
                MergeOutcome::Padded { index, gap }
            } else {
                MergeOutcome::Inserted(index)
            }
        }
    }
}

/// Inserts `item` at `index`, shifting later elements.
///
/// This is the creation path: a slot that is announced as new never merges
/// into whatever currently sits at that index.
pub fn insert_at<T: Default>(items: &mut Vec<T>, index: usize, item: T) -> MergeOutcome {
    if index <= items.len() {
        items.insert(index, item);
        return MergeOutcome::Inserted(index);
    }
    let gap = pad_to(items, index);
    items.push(item);
    MergeOutcome::Padded { index, gap }
}

fn pad_to<T: Default>(items: &mut Vec<T>, index: usize) -> usize {
    let gap = index.saturating_sub(items.len());
    if gap > 0 {
        items.resize_with(index, T::default);
    }
    gap
}
