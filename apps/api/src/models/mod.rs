pub mod application;
pub mod catalog;
pub mod generation;
pub mod pattern;
pub mod performance;
pub mod platform;
pub mod upload;
pub mod user;
