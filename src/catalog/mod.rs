/// Course Catalog Layer
///
/// Course definitions, their SQLite persistence and the lock-free in-memory
/// registry that serves public reads:
/// - Type definitions (Course, CourseInput)
/// - SQLite persistence with sqlx
/// - Snapshot registry using ArcSwap

// Course type definitions and input validation
pub mod types;

// SQLite persistence for courses
pub mod storage;

// Hot-reload registry using ArcSwap for lock-free reads
pub mod registry;

pub use registry::CatalogRegistry;
pub use storage::CourseStorage;
pub use types::{Course, CourseInput};
