pub mod api;
pub mod cli;
pub mod device;
pub mod error;
pub mod mesh;
pub mod settings;
pub mod transport;
