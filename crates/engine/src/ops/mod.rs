use sea_orm::DatabaseConnection;

use crate::ResultEngine;

mod status;
mod sync;

pub use status::ImportTotals;
pub use sync::{CancelFlag, FailureExample, RunReport, SyncOptions, SyncScope};

/// The synchronization engine: owns the target-ledger database and
/// drives migration runs against an upstream source.
#[derive(Debug)]
pub struct Engine {
    database: DatabaseConnection,
}

impl Engine {
    /// Return a builder for `Engine`. Help to build the struct.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    pub(crate) fn database(&self) -> &DatabaseConnection {
        &self.database
    }
}

/// The builder for `Engine`
#[derive(Default)]
pub struct EngineBuilder {
    database: DatabaseConnection,
}

impl EngineBuilder {
    /// Pass the required database
    pub fn database(mut self, db: DatabaseConnection) -> EngineBuilder {
        self.database = db;
        self
    }

    /// Construct `Engine`
    pub async fn build(self) -> ResultEngine<Engine> {
        Ok(Engine {
            database: self.database,
        })
    }
}
