/// Database model definitions.
pub mod models;
/// Room, membership, message and question persistence.
pub mod room_store;
/// Storage abstraction layer for database operations.
pub mod storage;
