//! BFT safety predicates: block headers, contradiction detection and punishment windows.

pub mod slashing;
pub mod types;
