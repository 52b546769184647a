pub mod handlers;
pub mod models;
pub mod notifications;
pub mod repository;
pub mod router;
pub mod services;
