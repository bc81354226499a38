//! Chunked upload assembly.

pub mod assembler;
pub mod session;

pub use assembler::{ChunkOutcome, ChunkUpload, UploadAssembler, UploadError, XLSX_MIME};
pub use session::{UploadSession, UploadedPart};
