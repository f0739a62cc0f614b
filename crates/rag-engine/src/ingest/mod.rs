pub mod chunker;
pub mod parser;
pub mod scanner;

pub use chunker::{chunk_text, Chunk};
pub use parser::{parse_file, ParsedDocument};
pub use scanner::{scan, IngestItem, Modality, SymlinkPolicy};
