pub mod pdf;
pub mod report;
