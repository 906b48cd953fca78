pub mod records;
pub mod types;

pub use records::*;
pub use types::*;
