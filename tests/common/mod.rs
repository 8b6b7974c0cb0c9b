pub mod database;
pub mod entities;
pub mod listeners;

#[allow(unused_imports)]
pub use database::{cleanup_database, factory, setup_database};
#[allow(unused_imports)]
pub use entities::{Customer, LedgerEntry};
#[allow(unused_imports)]
pub use listeners::{FailingListener, RecordingListener};
