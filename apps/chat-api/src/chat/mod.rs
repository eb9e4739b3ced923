pub mod delivery;
pub mod events;
pub mod handler;
pub mod registry;
pub mod server;
pub mod stats;
pub mod store;
