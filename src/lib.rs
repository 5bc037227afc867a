pub mod archive;
pub mod audit;
pub mod cli;
pub mod config;
pub mod scanner;
pub mod scrubber;
pub mod table;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use scanner::{DatasetFile, Scanner};
pub use scrubber::{ScrubResult, Scrubber};
pub use table::Table;
