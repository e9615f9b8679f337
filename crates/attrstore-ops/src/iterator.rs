//! Entry-key producers for operation inputs.
//!
//! Each input of an operation is walked by one [`EntryIterator`]. The
//! pipeline assigns every iterator an [`IteratorRole`] when it plans the
//! run, and only ever advances the iterators whose role says so.

use std::sync::Arc;

use attrstore_types::EntryKey;

/// How the pipeline drives one input's iterator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IteratorRole {
    /// Advanced once per row. Input 0 is always `Owned`.
    Owned,
    /// Same key sequence as input 0; reads input 0's current key and is
    /// never advanced itself.
    AliasOfPrimary,
    /// Broadcast or constant; never advanced.
    Repeat,
}

/// Sequence of entry keys backing one operation input.
#[derive(Debug, Clone)]
pub enum EntryIterator {
    /// Explicit per-entity key array.
    Index {
        keys: Arc<[EntryKey]>,
        position: usize,
        broadcast: bool,
    },
    /// Snapshot of an attribute's locally bound entry keys, ascending.
    Attribute {
        keys: Arc<[EntryKey]>,
        position: usize,
        broadcast: bool,
    },
    /// Yields `EntryKey::INVALID` forever, so reads see the default value.
    Constant,
}

impl EntryIterator {
    #[must_use]
    pub fn over_index(keys: Arc<[EntryKey]>, broadcast: bool) -> Self {
        Self::Index {
            keys,
            position: 0,
            broadcast,
        }
    }

    #[must_use]
    pub fn over_attribute(keys: Vec<EntryKey>, broadcast: bool) -> Self {
        Self::Attribute {
            keys: keys.into(),
            position: 0,
            broadcast,
        }
    }

    /// Number of keys backing the iterator; 0 for a constant.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Index { keys, .. } | Self::Attribute { keys, .. } => keys.len(),
            Self::Constant => 0,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Repeat iterators stay on their first key.
    #[must_use]
    pub fn is_repeat(&self) -> bool {
        match self {
            Self::Index { broadcast, .. } | Self::Attribute { broadcast, .. } => *broadcast,
            Self::Constant => true,
        }
    }

    /// A repeat iterator never ends; the primary input bounds the pass.
    #[must_use]
    pub fn is_end(&self) -> bool {
        match self {
            Self::Index {
                keys,
                position,
                broadcast,
            }
            | Self::Attribute {
                keys,
                position,
                broadcast,
            } => !*broadcast && *position >= keys.len(),
            Self::Constant => false,
        }
    }

    /// Key at the current position, `EntryKey::INVALID` past the end.
    #[must_use]
    pub fn current(&self) -> EntryKey {
        match self {
            Self::Index { keys, position, .. } | Self::Attribute { keys, position, .. } => {
                keys.get(*position).copied().unwrap_or(EntryKey::INVALID)
            }
            Self::Constant => EntryKey::INVALID,
        }
    }

    /// Step to the next key. No-op on repeat iterators.
    pub fn advance(&mut self) {
        match self {
            Self::Index {
                position,
                broadcast: false,
                ..
            }
            | Self::Attribute {
                position,
                broadcast: false,
                ..
            } => *position += 1,
            _ => {}
        }
    }

    /// Fresh copy positioned at the first key.
    #[must_use]
    pub fn rewound(&self) -> Self {
        match self {
            Self::Index { keys, broadcast, .. } => Self::Index {
                keys: Arc::clone(keys),
                position: 0,
                broadcast: *broadcast,
            },
            Self::Attribute { keys, broadcast, .. } => Self::Attribute {
                keys: Arc::clone(keys),
                position: 0,
                broadcast: *broadcast,
            },
            Self::Constant => Self::Constant,
        }
    }
}

/// Walk `rows` rows in lock-step and hand `f` the row index plus one key
/// per input.
///
/// `plan[0]` is the primary. Aliases read the primary's key; repeat
/// iterators are never advanced.
pub fn walk_lockstep(
    plan: &[(EntryIterator, IteratorRole)],
    rows: usize,
    mut f: impl FnMut(usize, &[EntryKey]),
) {
    let mut iters: Vec<_> = plan.iter().map(|(it, role)| (it.rewound(), *role)).collect();
    let mut keys = vec![EntryKey::INVALID; iters.len()];
    for row in 0..rows {
        if iters.first().is_some_and(|(primary, _)| primary.is_end()) {
            break;
        }
        let primary_key = iters.first().map_or(EntryKey::INVALID, |(it, _)| it.current());
        for (slot, (it, role)) in keys.iter_mut().zip(&iters) {
            *slot = match role {
                IteratorRole::AliasOfPrimary => primary_key,
                IteratorRole::Owned | IteratorRole::Repeat => it.current(),
            };
        }
        f(row, &keys);
        for (it, role) in &mut iters {
            if *role == IteratorRole::Owned {
                it.advance();
            }
        }
    }
}
