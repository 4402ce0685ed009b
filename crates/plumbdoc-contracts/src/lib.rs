pub mod auth;
pub mod documents;
pub mod events;
pub mod models;
pub mod pricing;
pub mod session;
pub mod store;
