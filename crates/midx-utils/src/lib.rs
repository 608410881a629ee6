pub mod error;
pub mod path;
pub mod reader;
pub mod tempfile;

// Re-export core types at crate root for convenience
pub use bstr::{BStr, BString, ByteSlice, ByteVec};
pub use error::UtilError;
pub use path::NormalPath;
pub use reader::ByteReader;

pub type Result<T> = std::result::Result<T, UtilError>;
