//! Input side of the loader: finding files, reading gzip lines, and
//! parsing them into records.

pub mod discovery;
pub mod parser;
pub mod reader;

pub use discovery::discover_files;
pub use parser::{AppsInstalled, parse_line};
pub use reader::{GzipLineReader, LineStream};
