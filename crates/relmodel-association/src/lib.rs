//! Association engine for relmodel.
//!
//! Given an owner model, one of its declared relationships and one or more
//! owner instances, the engine:
//!
//! - builds the conditions selecting the related rows ([`conditions`]),
//! - appends, replaces, deletes and clears related values while keeping
//!   foreign keys and join-table rows consistent,
//! - mirrors every persisted change in the owners' relationship fields
//!   ([`sync`]).
//!
//! The entry point is [`Association::bind`]. A handle remembers the first
//! error it ran into; every later call on it returns that error without
//! touching storage.

/// Unwrap an executor `Outcome`, returning early from the enclosing
/// `Outcome<_, AssociationError>` function on anything but `Ok`.
macro_rules! try_exec {
    ($outcome:expr) => {
        match $outcome {
            asupersync::Outcome::Ok(v) => v,
            asupersync::Outcome::Err(e) => {
                return asupersync::Outcome::Err($crate::error::AssociationError::from(e));
            }
            asupersync::Outcome::Cancelled(r) => return asupersync::Outcome::Cancelled(r),
            asupersync::Outcome::Panicked(p) => return asupersync::Outcome::Panicked(p),
        }
    };
}

/// Unwrap a `Result`, returning its error as `Outcome::Err`.
macro_rules! try_res {
    ($result:expr) => {
        match $result {
            Ok(v) => v,
            Err(e) => {
                return asupersync::Outcome::Err($crate::error::AssociationError::from(e));
            }
        }
    };
}

pub mod association;
pub mod conditions;
pub mod config;
pub mod error;
pub mod keys;
pub mod owners;
mod save;
pub mod sync;

pub use association::Association;
pub use conditions::{Scope, join_table_scope, owner_scope};
pub use config::AssociationConfig;
pub use error::AssociationError;
pub use keys::{
    IdentityMap, entity_key, identity_key, identity_values, to_excluded_values, to_query_values,
};
pub use owners::OwnerSet;
