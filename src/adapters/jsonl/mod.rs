//! JSON-lines file destination
//!
//! Each destination is one `<directory>/<destination>.jsonl` file holding one
//! normalized record per line.

pub mod sink;

pub use sink::JsonlSink;
