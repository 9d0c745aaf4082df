pub mod error;
pub mod migrations;
pub mod ops;
pub mod projection;
pub mod schema;

pub use error::CheckpointSqlError;
