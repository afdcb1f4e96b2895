pub mod report;
pub mod summary;
