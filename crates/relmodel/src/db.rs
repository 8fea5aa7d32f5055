//! The `Db` entry point.

use relmodel_association::{Association, AssociationConfig, OwnerSet};
use relmodel_core::{Connection, Model};
use relmodel_query::{Dialect, Executor, SqlExecutor};
use std::fmt;

/// An executor plus the association configuration shared by every handle
/// created from it.
#[derive(Debug)]
pub struct Db<E> {
    executor: E,
    config: AssociationConfig,
}

impl<E: Executor> Db<E> {
    pub fn new(executor: E) -> Self {
        Self::with_config(executor, AssociationConfig::default())
    }

    pub fn with_config(executor: E, config: AssociationConfig) -> Self {
        tracing::debug!(
            full_save_associations = config.full_save_associations,
            "Creating association database handle"
        );
        Self { executor, config }
    }

    pub fn config(&self) -> &AssociationConfig {
        &self.config
    }

    /// Bind the relationship `name` of one owner.
    pub fn association<'a, M>(&'a self, owner: &'a mut M, name: &str) -> Association<'a, M, E>
    where
        M: Model + Clone + fmt::Debug,
    {
        self.bind(OwnerSet::One(owner), name)
    }

    /// Bind the relationship `name` of several owners at once.
    ///
    /// Operations taking values then expect one value per owner, in order.
    pub fn association_many<'a, M>(
        &'a self,
        owners: &'a mut [M],
        name: &str,
    ) -> Association<'a, M, E>
    where
        M: Model + Clone + fmt::Debug,
    {
        self.bind(OwnerSet::Many(owners), name)
    }

    fn bind<'a, M>(&'a self, owners: OwnerSet<'a, M>, name: &str) -> Association<'a, M, E>
    where
        M: Model + Clone + fmt::Debug,
    {
        Association::bind(&self.executor, owners, name).with_config(self.config.clone())
    }
}

impl<C: Connection> Db<SqlExecutor<C>> {
    /// Run associations over a connection, rendering SQL for `dialect`.
    pub fn connect(conn: C, dialect: Dialect) -> Self {
        Self::new(SqlExecutor::new(conn).with_dialect(dialect))
    }
}
