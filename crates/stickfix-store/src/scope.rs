//! Scope resolution: which records a caller reads from and writes to.
//!
//! | Caller state          | Read scope             | Write target |
//! |-----------------------|------------------------|--------------|
//! | private record        | own record             | own record   |
//! | public record         | public + own record    | public       |
//! | no record             | public                 | public       |
//!
//! Resolving a scope never creates records.

use crate::user::{PUBLIC_USER_ID, Registry, UserRecord};

/// Routing decision for one caller against the current registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    caller_id: String,
    private: bool,
    has_record: bool,
}

impl Scope {
    /// Resolve the scope of `caller_id`.
    ///
    /// A caller without a record is treated as public.
    pub fn resolve(registry: &Registry, caller_id: &str) -> Self {
        let record = registry.get(caller_id);
        Self {
            caller_id: caller_id.to_string(),
            private: record.is_some_and(|r| r.private_mode),
            has_record: record.is_some(),
        }
    }

    pub fn caller_id(&self) -> &str {
        &self.caller_id
    }

    /// Whether reads and writes stay inside the caller's own record.
    pub fn is_private(&self) -> bool {
        self.private
    }

    /// Whether the caller already has a record of its own.
    pub fn has_record(&self) -> bool {
        self.has_record
    }

    /// Record that holds the caller's flags and result cache: its own record,
    /// or the public pseudo-user for callers without one.
    pub fn home_id(&self) -> &str {
        if self.has_record {
            &self.caller_id
        } else {
            PUBLIC_USER_ID
        }
    }

    /// Ids of the records consulted for reads, public first.
    pub fn read_ids(&self) -> Vec<&str> {
        if self.private {
            return vec![self.caller_id.as_str()];
        }
        let mut ids = vec![PUBLIC_USER_ID];
        if self.has_record && self.caller_id != PUBLIC_USER_ID {
            ids.push(self.caller_id.as_str());
        }
        ids
    }

    /// Records consulted for reads that currently exist.
    pub fn read_records<'r>(&self, registry: &'r Registry) -> Vec<&'r UserRecord> {
        self.read_ids()
            .into_iter()
            .filter_map(|id| registry.get(id))
            .collect()
    }

    /// Id of the record that stickers are added to or removed from.
    pub fn write_target(&self) -> &str {
        if self.private {
            &self.caller_id
        } else {
            PUBLIC_USER_ID
        }
    }

    /// Record whose tags seed the default answer to an empty query.
    pub fn default_tag_source(&self) -> &str {
        self.write_target()
    }
}
