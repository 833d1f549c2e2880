pub mod job;

pub use job::{DatePosted, JobPosting, SearchFilters};
