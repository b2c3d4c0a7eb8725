//! Dense 1-based ordering of sibling groups.
//!
//! Every sibling group in the tree is stored as a `Vec` sorted by position,
//! so `items[i].position == i + 1` at all times. All position shifting in
//! the crate goes through the functions in this module.

use crate::error::{EntityKind, Result, TreeError};
use crate::id::EntityId;
use crate::model::{Content, Lesson, Module, Question, QuestionOption};

/// A node that lives in an ordered sibling group.
pub trait Positioned {
    /// Kind reported in errors about this group.
    const KIND: EntityKind;

    /// Identifier of the node.
    fn id(&self) -> &EntityId;

    /// Current 1-based position.
    fn position(&self) -> u32;

    /// Overwrites the position.
    fn set_position(&mut self, position: u32);
}

macro_rules! impl_positioned {
    ($ty:ty, $kind:expr) => {
        impl Positioned for $ty {
            const KIND: EntityKind = $kind;

            fn id(&self) -> &EntityId {
                &self.id
            }

            fn position(&self) -> u32 {
                self.position
            }

            fn set_position(&mut self, position: u32) {
                self.position = position;
            }
        }
    };
}

impl_positioned!(Module, EntityKind::Module);
impl_positioned!(Lesson, EntityKind::Lesson);
impl_positioned!(Content, EntityKind::Content);
impl_positioned!(Question, EntityKind::Question);
impl_positioned!(QuestionOption, EntityKind::Option);

/// Converts a 0-based index into a 1-based position.
fn position_at(index: usize) -> u32 {
    u32::try_from(index + 1).unwrap_or(u32::MAX)
}

/// Rewrites positions so they read `1..=n` in storage order.
pub fn renumber<T: Positioned>(items: &mut [T]) {
    for (index, item) in items.iter_mut().enumerate() {
        item.set_position(position_at(index));
    }
}

/// Sorts by stored position (stable) and renumbers densely.
///
/// Returns `true` if any position changed.
pub fn normalize<T: Positioned>(items: &mut [T]) -> bool {
    if is_dense(items) {
        return false;
    }
    items.sort_by_key(Positioned::position);
    renumber(items);
    true
}

/// Returns `true` if positions read exactly `1..=n` in storage order.
pub fn is_dense<T: Positioned>(items: &[T]) -> bool {
    items
        .iter()
        .enumerate()
        .all(|(index, item)| item.position() == position_at(index))
}

/// Fails with [`TreeError::InvalidOrdering`] unless the group is dense.
pub fn ensure_dense<T: Positioned>(items: &[T], container: &EntityId) -> Result<()> {
    if is_dense(items) {
        return Ok(());
    }
    Err(TreeError::InvalidOrdering {
        kind: T::KIND,
        container: container.to_string(),
        positions: items.iter().map(Positioned::position).collect(),
    })
}

/// Returns the storage index of `id`.
pub fn index_of<T: Positioned>(items: &[T], id: &EntityId) -> Result<usize> {
    items
        .iter()
        .position(|item| item.id() == id)
        .ok_or_else(|| TreeError::not_found(T::KIND, id))
}

/// Looks up a node by id.
pub fn find<'a, T: Positioned>(items: &'a [T], id: &EntityId) -> Result<&'a T> {
    let index = index_of(items, id)?;
    Ok(&items[index])
}

/// Looks up a node by id for mutation.
pub fn find_mut<'a, T: Positioned>(items: &'a mut [T], id: &EntityId) -> Result<&'a mut T> {
    let index = index_of(items, id)?;
    Ok(&mut items[index])
}

/// Inserts `item` right after the sibling at `after` and returns its new position.
///
/// `None` appends, `Some(0)` inserts at the front. Later siblings shift by +1.
pub fn insert_after<T: Positioned>(items: &mut Vec<T>, after: Option<u32>, item: T) -> Result<u32> {
    let index = match after {
        None => items.len(),
        Some(after) => {
            let index = after as usize;
            if index > items.len() {
                return Err(TreeError::out_of_range(T::KIND, after, items.len()));
            }
            index
        }
    };
    items.insert(index, item);
    renumber(items);
    Ok(position_at(index))
}

/// Moves the sibling `id` to `position`, closing the old gap and opening the new slot.
///
/// `position` must lie in `[1, items.len()]`.
pub fn move_to<T: Positioned>(items: &mut Vec<T>, id: &EntityId, position: u32) -> Result<()> {
    if position == 0 || position as usize > items.len() {
        return Err(TreeError::out_of_range(T::KIND, position, items.len()));
    }
    let from = index_of(items, id)?;
    let to = position as usize - 1;
    if from != to {
        let item = items.remove(from);
        items.insert(to, item);
        renumber(items);
    }
    Ok(())
}

/// Removes the sibling `id`, shifting later siblings by -1.
pub fn remove<T: Positioned>(items: &mut Vec<T>, id: &EntityId) -> Result<T> {
    let index = index_of(items, id)?;
    let item = items.remove(index);
    renumber(items);
    Ok(item)
}
