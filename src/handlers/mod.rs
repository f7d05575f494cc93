pub mod accounts;
pub mod app;
pub mod auth;
pub mod devices;
pub mod events;
pub mod health;
