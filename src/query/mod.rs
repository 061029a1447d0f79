pub mod filter;

pub use filter::{DateWindow, LeadFilter, SqlParams};
