//! Settlement reads
//!
//! After an operation settles, the authoritative representation is fetched
//! and merged into the canonical state. The service may return collections in
//! any order, so list-valued sub-resources are put back into the caller's
//! order by natural key. Elements the caller never declared (added
//! out-of-band) keep their remote order after the known ones.

use std::collections::HashMap;

use crate::error::{Error, Result};

/// Why a resource is being read
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadPurpose {
    /// Refreshing known state; a missing resource is an error the caller must handle
    Refresh,
    /// Checking existence before a delete; a missing resource is already deleted
    DeletePrecheck,
}

/// Caller order of a list-valued sub-resource, keyed by region name (or
/// another natural key such as CIDR text)
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RegionOrder {
    index: HashMap<String, usize>,
}

impl RegionOrder {
    /// Build from keys in caller order. Repeated keys keep their first position.
    pub fn from_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut index = HashMap::new();
        for key in keys {
            let next = index.len();
            index.entry(key.into()).or_insert(next);
        }
        Self { index }
    }

    pub fn position(&self, key: &str) -> Option<usize> {
        self.index.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Reorder `items` to caller order; unknown keys follow in their original order
    pub fn apply<T, F>(&self, items: Vec<T>, key: F) -> Vec<T>
    where
        F: Fn(&T) -> &str,
    {
        self.apply_by(items, |item| self.position(key(item)))
    }

    /// Like [`RegionOrder::apply`], with a caller-supplied position lookup
    pub fn apply_by<T, F>(&self, items: Vec<T>, position: F) -> Vec<T>
    where
        F: Fn(&T) -> Option<usize>,
    {
        let mut keyed: Vec<((u8, usize), T)> = items
            .into_iter()
            .enumerate()
            .map(|(remote_idx, item)| {
                let rank = match position(&item) {
                    Some(pos) => (0, pos),
                    None => (1, remote_idx),
                };
                (rank, item)
            })
            .collect();
        keyed.sort_by_key(|(rank, _)| *rank);
        keyed.into_iter().map(|(_, item)| item).collect()
    }
}

/// Map a missing resource according to the read purpose
pub fn settle_missing<T>(
    result: Result<T>,
    purpose: ReadPurpose,
    resource: &'static str,
    id: &str,
) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_not_found() => match purpose {
            ReadPurpose::Refresh => Err(Error::NotFoundError {
                resource,
                id: id.to_string(),
            }),
            ReadPurpose::DeletePrecheck => Ok(None),
        },
        Err(e) => Err(e),
    }
}
