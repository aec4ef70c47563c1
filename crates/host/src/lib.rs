// stackboard-host library
// Persistence service, REST API and sync channel server

// Configuration
pub mod config;

// Broadcast hub and the single writer in front of the backend
pub mod hub;
pub mod service;

// REST API
pub mod api;

// Sync channel server
pub mod ws;

// Listener startup
pub mod server;

pub use server::RunningHost;
