pub mod adapter;
pub mod credentials;
pub mod errors;
pub mod handlers;
pub mod service;
pub mod transport;
