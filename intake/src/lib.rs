pub mod api;
pub mod config;
pub mod endpoint;
pub mod limiters;
pub mod normalize;
pub mod payment;
pub mod prometheus;
pub mod redis;
pub mod router;
pub mod rsvp;
pub mod server;
pub mod stores;
pub mod time;
pub mod validation;
