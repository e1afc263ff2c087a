//! # wagate-store
//!
//! Durable session records (SQLite or in-memory) and the report query used
//! by the inbound auto-reply.

pub mod memory;
pub mod report;
pub mod sessions;


pub use memory::MemorySessionStore;
pub use report::SqlReportSource;
pub use sessions::SqliteSessionStore;
