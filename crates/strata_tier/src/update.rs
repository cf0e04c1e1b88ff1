// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::CacheItem;

/// A value transformation applied by an update.
///
/// The function receives the current value and returns the replacement, or `None` to abort
/// the update. It may run more than once when concurrent writers cause version conflicts,
/// so it should be free of side effects.
pub type UpdateFn<'a, V> = dyn Fn(&V) -> Option<V> + Send + Sync + 'a;

/// The terminal state of an update attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UpdateState {
    /// The new value was written.
    Success,
    /// Version conflicts persisted beyond the retry budget.
    TooManyRetries,
    /// There was no item to update.
    ItemDidNotExist,
    /// The update function declined to produce a value.
    FactoryReturnedNull,
}

impl UpdateState {
    /// Returns the state as a static string, suitable for logs and metric attributes.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::TooManyRetries => "too_many_retries",
            Self::ItemDidNotExist => "item_did_not_exist",
            Self::FactoryReturnedNull => "factory_returned_null",
        }
    }
}

/// The outcome of [`CacheBackend::update`](crate::CacheBackend::update).
///
/// Only a [`UpdateState::Success`] result carries an item, and the item always holds the
/// value that was written.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpdateItemResult<V> {
    state: UpdateState,
    item: Option<CacheItem<V>>,
    version_conflict_occurred: bool,
    number_of_tries_needed: u32,
}

impl<V> UpdateItemResult<V> {
    /// A successful update that wrote `item`.
    #[must_use]
    pub fn success(item: CacheItem<V>, version_conflict_occurred: bool, number_of_tries_needed: u32) -> Self {
        Self {
            state: UpdateState::Success,
            item: Some(item),
            version_conflict_occurred,
            number_of_tries_needed,
        }
    }

    /// An update that gave up after `number_of_tries_needed` conflicting attempts.
    #[must_use]
    pub fn too_many_retries(number_of_tries_needed: u32) -> Self {
        Self {
            state: UpdateState::TooManyRetries,
            item: None,
            version_conflict_occurred: true,
            number_of_tries_needed,
        }
    }

    /// An update of an absent item.
    #[must_use]
    pub fn item_did_not_exist() -> Self {
        Self {
            state: UpdateState::ItemDidNotExist,
            item: None,
            version_conflict_occurred: false,
            number_of_tries_needed: 1,
        }
    }

    /// An update whose function returned `None`.
    #[must_use]
    pub fn factory_returned_null(version_conflict_occurred: bool, number_of_tries_needed: u32) -> Self {
        Self {
            state: UpdateState::FactoryReturnedNull,
            item: None,
            version_conflict_occurred,
            number_of_tries_needed,
        }
    }

    /// Returns the terminal state.
    #[must_use]
    pub fn state(&self) -> UpdateState {
        self.state
    }

    /// Returns the written item for a successful update.
    #[must_use]
    pub fn item(&self) -> Option<&CacheItem<V>> {
        self.item.as_ref()
    }

    /// Consumes the result and returns the written item, if any.
    #[must_use]
    pub fn into_item(self) -> Option<CacheItem<V>> {
        self.item
    }

    /// Returns `true` if at least one attempt hit a version conflict.
    #[must_use]
    pub fn version_conflict_occurred(&self) -> bool {
        self.version_conflict_occurred
    }

    /// Returns the number of attempts made.
    #[must_use]
    pub fn number_of_tries_needed(&self) -> u32 {
        self.number_of_tries_needed
    }
}
