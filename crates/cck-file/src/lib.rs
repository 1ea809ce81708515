pub mod fs;
pub mod signed;

mod meta;

pub use fs::FsFileService;
pub use signed::{SignedOperation, SignedUrlClaims};
