pub mod commands;
pub mod config;
pub mod database;
pub mod params;
#[cfg(test)]
pub mod testutils;

pub use ceiba;

use crate::{
    config::Config,
    database::{
        sqlite::{FreshDbOptions, SqliteDb, SqliteDbError},
        DatabaseInterface,
    },
    params::ProtocolParameters,
};

use std::{error, fmt, fs, io, path, sync};

#[derive(Debug, Clone)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{}-dev", self.major, self.minor)
    }
}

pub const VERSION: Version = Version { major: 0, minor: 1 };

#[derive(Debug)]
pub enum StartupError {
    Io(io::Error),
    DefaultDataDirNotFound,
    DatadirCreation(path::PathBuf, io::Error),
    Database(SqliteDbError),
}

impl fmt::Display for StartupError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "{}", e),
            Self::DefaultDataDirNotFound => write!(
                f,
                "No data directory was specified and a default path could not be determined for this platform."
            ),
            Self::DatadirCreation(dir_path, e) => write!(
                f,
                "Could not create data directory at '{}': '{}'", dir_path.display(), e
            ),
            Self::Database(e) => write!(f, "Error initializing database: '{}'.", e),
        }
    }
}

impl error::Error for StartupError {}

impl From<io::Error> for StartupError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<SqliteDbError> for StartupError {
    fn from(e: SqliteDbError) -> Self {
        Self::Database(e)
    }
}

// Connect to the SQLite database, creating it if starting fresh, and do
// some sanity checks.
fn setup_sqlite(data_dir: &path::Path, fresh_data_dir: bool) -> Result<SqliteDb, StartupError> {
    let db_path = data_dir.join("ceibad.sqlite3");
    let options = if fresh_data_dir {
        Some(FreshDbOptions::default())
    } else {
        None
    };
    let sqlite = SqliteDb::new(db_path, options)?;
    sqlite.sanity_check()?;
    log::info!("Database initialized and checked.");

    Ok(sqlite)
}

/// The handle to a started Ceiba daemon: access to the commands interface.
pub struct DaemonHandle {
    pub control: DaemonControl,
}

impl DaemonHandle {
    /// Start the daemon: set up the data directory and the database, then
    /// hand out the commands interface.
    pub fn start(config: Config) -> Result<DaemonHandle, StartupError> {
        let data_dir = config
            .data_dir
            .clone()
            .or_else(config::config_folder_path)
            .ok_or(StartupError::DefaultDataDirNotFound)?;
        let fresh_data_dir = !data_dir.as_path().exists();
        if fresh_data_dir {
            fs::create_dir_all(&data_dir)
                .map_err(|e| StartupError::DatadirCreation(data_dir.clone(), e))?;
            log::info!("Created a new data directory at '{}'.", data_dir.display());
        }

        let db = setup_sqlite(&data_dir, fresh_data_dir)?;
        let control = DaemonControl::new(config, sync::Arc::new(sync::Mutex::new(db)));

        Ok(DaemonHandle { control })
    }
}

/// The handle on the daemon state exposing all the commands.
pub struct DaemonControl {
    config: Config,
    db: sync::Arc<sync::Mutex<dyn DatabaseInterface>>,
}

impl DaemonControl {
    pub(crate) fn new(
        config: Config,
        db: sync::Arc<sync::Mutex<dyn DatabaseInterface>>,
    ) -> DaemonControl {
        DaemonControl { config, db }
    }

    /// The configuration the daemon was started with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    // The selection parameters the migration engine works against.
    fn params(&self) -> &ProtocolParameters {
        &self.config.protocol
    }
}
