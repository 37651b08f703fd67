pub mod auth;
pub mod documents;
pub mod embeddings;
pub mod generation;
pub mod liveness;
pub mod readiness;
pub mod settings;
pub mod workspaces;
