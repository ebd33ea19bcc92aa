mod resolver;

pub use resolver::{CompositeEntity, CompositeEntityResolver, ResolvedSample, lock_order};
