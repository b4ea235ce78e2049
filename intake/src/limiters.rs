pub mod client;
pub mod window;
