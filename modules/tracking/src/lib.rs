#![forbid(clippy::unwrap_used, unsafe_code, clippy::expect_used, clippy::panic)]

pub mod entities;
pub mod error;
pub mod events;
pub mod services;
pub mod store;

pub use error::TrackingError;

pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
