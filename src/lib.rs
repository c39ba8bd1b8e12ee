pub mod config;
pub mod document;
pub mod error;
pub mod images;
pub mod indexing;
pub mod maintenance;
pub mod model;
pub mod orchestrator;
pub mod posts;
pub mod publish;
pub mod related;
pub mod slug;
pub mod text;
pub mod throttle;
pub mod topics;
