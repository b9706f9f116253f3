pub mod auth;
pub mod dashboard;
pub mod health;
pub mod patients;
pub mod predict;
pub mod profile;
pub mod report;
pub mod scans;
