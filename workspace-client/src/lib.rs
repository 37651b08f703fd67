#![allow(clippy::missing_docs_in_private_items)]

pub mod client;
pub mod credential;
pub mod documents;
pub mod embeddings;
pub mod generation;
pub mod types;
pub mod workspace;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use client::{ClientFactory, Upstream, UpstreamClient, DEFAULT_TIMEOUT};
pub use credential::{Credential, CredentialResolver};
pub use documents::DocumentService;
pub use embeddings::EmbeddingBinder;
pub use generation::{generation_timeout, GenerationProxy, GenerationSettings};
pub use workspace::WorkspaceManager;
