pub mod header;
pub mod block;
pub mod file;
pub mod family;
pub mod info;

pub use header::{BlockHeader, FormatError, MagicOverrides, flags};
pub use block::{DataBlock, EncodeError};
pub use file::{FileError, FileOptions, Uf2File};
pub use family::Family;
pub use info::FileSummary;
