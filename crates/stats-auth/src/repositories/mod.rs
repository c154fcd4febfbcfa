//! Repository layer for the health authority directory.

pub mod health_authorities;

pub use health_authorities::{
    mock::MockHealthAuthorityDirectory, DirectoryError, HealthAuthorityDirectory,
    PgHealthAuthorityDirectory,
};
