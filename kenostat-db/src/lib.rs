pub mod db;
pub mod history;
pub mod models;
pub mod store;
mod writer;

pub use rusqlite;
pub use writer::WriterPhase;
