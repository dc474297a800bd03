#[cfg(test)]
mod arena_test;

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// Generation-checked handle into an [`Arena`].
///
/// A handle stays valid only while the entry it was issued for is alive. Once
/// the entry is removed, the slot's generation is bumped and every stale
/// handle to it resolves to `None`, even after the slot is reused.
pub struct Index<T> {
    slot: u32,
    generation: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Index<T> {
    fn new(slot: u32, generation: u32) -> Self {
        Self {
            slot,
            generation,
            _marker: PhantomData,
        }
    }

    pub fn slot(&self) -> u32 {
        self.slot
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl<T> Clone for Index<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Index<T> {}

impl<T> PartialEq for Index<T> {
    fn eq(&self, other: &Self) -> bool {
        self.slot == other.slot && self.generation == other.generation
    }
}

impl<T> Eq for Index<T> {}

impl<T> Hash for Index<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.slot.hash(state);
        self.generation.hash(state);
    }
}

impl<T> PartialOrd for Index<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Index<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.slot, self.generation).cmp(&(other.slot, other.generation))
    }
}

impl<T> fmt::Debug for Index<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.slot, self.generation)
    }
}

impl<T> fmt::Display for Index<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.slot, self.generation)
    }
}

#[derive(Debug)]
enum Entry<T> {
    Occupied { generation: u32, value: T },
    Vacant { generation: u32, next_free: Option<u32> },
}

/// Slot storage that hands out [`Index`] handles.
#[derive(Debug)]
pub struct Arena<T> {
    entries: Vec<Entry<T>>,
    free_head: Option<u32>,
    len: usize,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self {
            entries: vec![],
            free_head: None,
            len: 0,
        }
    }
}

impl<T> Arena<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Stores value, reusing a vacant slot if there is one.
    pub fn insert(&mut self, value: T) -> Index<T> {
        self.len += 1;

        if let Some(slot) = self.free_head {
            if let Some(Entry::Vacant {
                generation,
                next_free,
            }) = self.entries.get(slot as usize)
            {
                let (generation, next_free) = (*generation, *next_free);
                self.free_head = next_free;
                self.entries[slot as usize] = Entry::Occupied { generation, value };
                return Index::new(slot, generation);
            }
        }

        let slot = self.entries.len() as u32;
        self.entries.push(Entry::Occupied {
            generation: 0,
            value,
        });
        Index::new(slot, 0)
    }

    /// Removes the entry and invalidates every handle to it.
    pub fn remove(&mut self, index: Index<T>) -> Option<T> {
        let entry = self.entries.get_mut(index.slot as usize)?;
        match entry {
            Entry::Occupied { generation, .. } if *generation == index.generation => {}
            _ => return None,
        }

        let vacant = Entry::Vacant {
            generation: index.generation.wrapping_add(1),
            next_free: self.free_head,
        };
        let old = std::mem::replace(entry, vacant);
        self.free_head = Some(index.slot);
        self.len -= 1;

        match old {
            Entry::Occupied { value, .. } => Some(value),
            Entry::Vacant { .. } => None,
        }
    }

    pub fn contains(&self, index: Index<T>) -> bool {
        self.get(index).is_some()
    }

    pub fn get(&self, index: Index<T>) -> Option<&T> {
        match self.entries.get(index.slot as usize)? {
            Entry::Occupied { generation, value } if *generation == index.generation => Some(value),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, index: Index<T>) -> Option<&mut T> {
        match self.entries.get_mut(index.slot as usize)? {
            Entry::Occupied { generation, value } if *generation == index.generation => Some(value),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Index<T>, &T)> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(slot, entry)| match entry {
                Entry::Occupied { generation, value } => {
                    Some((Index::new(slot as u32, *generation), value))
                }
                Entry::Vacant { .. } => None,
            })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Index<T>, &mut T)> {
        self.entries
            .iter_mut()
            .enumerate()
            .filter_map(|(slot, entry)| match entry {
                Entry::Occupied { generation, value } => {
                    Some((Index::new(slot as u32, *generation), value))
                }
                Entry::Vacant { .. } => None,
            })
    }

    /// Removes every entry. Handles issued before the call stay invalid
    /// after their slots are reused.
    pub fn clear(&mut self) {
        let mut free_head = None;
        for (slot, entry) in self.entries.iter_mut().enumerate().rev() {
            let generation = match entry {
                Entry::Occupied { generation, .. } => generation.wrapping_add(1),
                Entry::Vacant { generation, .. } => *generation,
            };
            *entry = Entry::Vacant {
                generation,
                next_free: free_head,
            };
            free_head = Some(slot as u32);
        }
        self.free_head = free_head;
        self.len = 0;
    }
}
