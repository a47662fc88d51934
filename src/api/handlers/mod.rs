pub mod attendance;
pub mod auth;
pub mod classes;
pub mod reports;
pub mod sections;
pub mod students;
