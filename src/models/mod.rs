pub mod job;
pub mod search;
