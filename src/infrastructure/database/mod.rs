//! SQLite persistence via SeaORM.

use sea_orm::{ConnectOptions, Database as SeaDatabase, DatabaseConnection, DbErr};
use sea_orm_migration::MigratorTrait;
use std::path::Path;
use std::time::Duration;
use tracing::info;

pub mod entities;
pub mod migration;

/// Shared pool settings for every connection this crate opens.
fn connect_options(url: String) -> ConnectOptions {
    let mut opt = ConnectOptions::new(url);
    opt.max_connections(10)
        .min_connections(2)
        .connect_timeout(Duration::from_secs(8))
        .idle_timeout(Duration::from_secs(8))
        .sqlx_logging(false); // query logging goes through tracing
    opt
}

/// Handle to the engine's SQLite database
pub struct Database {
    conn: DatabaseConnection,
}

impl Database {
    /// Create a fresh database file at `path`, including any missing
    /// parent directories.
    pub async fn create(path: &Path) -> Result<Self, DbErr> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| DbErr::Custom(format!("Failed to create directory: {}", e)))?;
        }

        let url = format!("sqlite://{}?mode=rwc", path.display());
        let conn = SeaDatabase::connect(connect_options(url)).await?;

        info!("Created new database at {:?}", path);

        Ok(Self { conn })
    }

    /// Open an existing database file, failing if it is missing.
    pub async fn open(path: &Path) -> Result<Self, DbErr> {
        if !path.exists() {
            return Err(DbErr::Custom(format!(
                "Database does not exist: {}",
                path.display()
            )));
        }

        let url = format!("sqlite://{}", path.display());
        let conn = SeaDatabase::connect(connect_options(url)).await?;

        info!("Opened database at {:?}", path);

        Ok(Self { conn })
    }

    /// Open the database at `path`, creating it if necessary
    pub async fn open_or_create(path: &Path) -> Result<Self, DbErr> {
        if path.exists() {
            Self::open(path).await
        } else {
            Self::create(path).await
        }
    }

    /// Bring the schema up to date.
    pub async fn migrate(&self) -> Result<(), DbErr> {
        migration::Migrator::up(&self.conn, None).await?;
        info!("Database migrations completed");
        Ok(())
    }

    pub fn conn(&self) -> &DatabaseConnection {
        &self.conn
    }
}
