use std::fmt;

use uuid::Uuid;

/// Kinds of records that receive system-allocated ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Analysis,
    Donor,
    Specimen,
    Sample,
    File,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Analysis => "analysis",
            Self::Donor => "donor",
            Self::Specimen => "specimen",
            Self::Sample => "sample",
            Self::File => "file",
        };
        f.write_str(s)
    }
}

/// Source of ids for new records. Callers never choose ids themselves.
pub trait IdAllocator: Send + Sync {
    fn new_id(&self, kind: EntityKind) -> String;
}

/// Time-ordered UUIDv7 ids, unique across kinds.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidAllocator;

impl IdAllocator for UuidAllocator {
    fn new_id(&self, _kind: EntityKind) -> String {
        Uuid::now_v7().to_string()
    }
}
