use shop_engine::ShopError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
    #[error("An error occurred on the backend of the server. {0}")]
    BackendError(String),
    #[error("Database error. {0}")]
    DatabaseError(#[from] sqlx::Error),
    #[error("Could not migrate the database. {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
}

impl From<ShopError> for ServerError {
    fn from(e: ShopError) -> Self {
        Self::BackendError(e.to_string())
    }
}
