pub mod analytics;
pub mod core;
pub mod students;
pub mod subjects;
pub mod tryouts;
