use common::error::AppError;
use serde_json::Value;
use tracing::info;

use crate::{
    client::{Upstream, UpstreamClient},
    types::EmbeddingUpdate,
    workspace::{fetch_existing, workspace_path},
};

/// Adds and removes document references in a workspace's embedding index.
#[derive(Clone)]
pub struct EmbeddingBinder {
    upstream: Upstream,
}

impl EmbeddingBinder {
    pub fn new(upstream: Upstream) -> Self {
        Self { upstream }
    }

    pub async fn bind(&self, slug: &str, document_path: &str) -> Result<Value, AppError> {
        info!(slug, document_path, "binding document to workspace");
        self.update_embeddings(slug, &EmbeddingUpdate::add(document_path))
            .await
    }

    /// Resolves `document_id` to the location the upstream indexes by, then
    /// removes that location from the workspace. A document that is not bound
    /// yields `NotFound` and no update is sent.
    pub async fn unbind(&self, slug: &str, document_id: &str) -> Result<Value, AppError> {
        let client = self.upstream.connect(None).await?;
        let workspace = fetch_existing(&client, slug).await?;

        let document = workspace.find_document(document_id).ok_or_else(|| {
            AppError::NotFound(format!("document {document_id} in workspace {slug}"))
        })?;

        info!(
            slug,
            document_id,
            location = %document.location,
            "unbinding document from workspace"
        );
        send_update(&client, slug, &EmbeddingUpdate::delete(&document.location)).await
    }

    /// Raw add/delete passthrough.
    pub async fn update_embeddings(
        &self,
        slug: &str,
        update: &EmbeddingUpdate,
    ) -> Result<Value, AppError> {
        let client = self.upstream.connect(None).await?;
        send_update(&client, slug, update).await
    }
}

async fn send_update(
    client: &UpstreamClient,
    slug: &str,
    update: &EmbeddingUpdate,
) -> Result<Value, AppError> {
    let path = format!("{}/update-embeddings", workspace_path(slug));
    client
        .execute("update_embeddings", client.post(&path).json(update))
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeUpstream, TEST_API_KEY};

    async fn binder(fake: &FakeUpstream) -> EmbeddingBinder {
        EmbeddingBinder::new(fake.upstream_with_key(Some(TEST_API_KEY)).await)
    }

    #[tokio::test]
    async fn bind_sends_a_single_add() {
        let fake = FakeUpstream::start().await;
        fake.state.insert_workspace("demo");
        let binder = binder(&fake).await;

        binder
            .bind("demo", "custom-documents/a.json")
            .await
            .expect("bind");

        assert_eq!(
            fake.state.embedding_updates(),
            vec![EmbeddingUpdate::add("custom-documents/a.json")]
        );
        assert_eq!(fake.state.document_locations("demo"), vec!["custom-documents/a.json"]);
    }

    #[tokio::test]
    async fn unbind_deletes_by_location_not_id() {
        let fake = FakeUpstream::start().await;
        fake.state.insert_workspace("demo");
        let document_id = fake.state.insert_document("demo", "notes.txt", "custom-documents/notes.json");
        let binder = binder(&fake).await;

        binder.unbind("demo", &document_id).await.expect("unbind");

        assert_eq!(
            fake.state.embedding_updates(),
            vec![EmbeddingUpdate::delete("custom-documents/notes.json")]
        );
        assert!(fake.state.document_locations("demo").is_empty());
    }

    #[tokio::test]
    async fn unbinding_unknown_document_is_not_found_and_sends_nothing() {
        let fake = FakeUpstream::start().await;
        fake.state.insert_workspace("demo");
        fake.state.insert_document("demo", "notes.txt", "custom-documents/notes.json");
        let binder = binder(&fake).await;

        let err = binder
            .unbind("demo", "not-bound")
            .await
            .expect_err("unknown id");

        assert!(matches!(err, AppError::NotFound(msg) if msg.contains("not-bound")));
        assert!(fake.state.embedding_updates().is_empty());
    }

    #[tokio::test]
    async fn unbinding_from_missing_workspace_is_not_found() {
        let fake = FakeUpstream::start().await;
        let binder = binder(&fake).await;

        let err = binder.unbind("ghost", "1").await.expect_err("no workspace");

        assert!(matches!(err, AppError::NotFound(msg) if msg.contains("ghost")));
        assert!(fake.state.embedding_updates().is_empty());
    }

    #[tokio::test]
    async fn raw_update_is_passed_through_unchanged() {
        let fake = FakeUpstream::start().await;
        fake.state.insert_workspace("demo");
        fake.state.insert_document("demo", "old.txt", "custom-documents/old.json");
        let binder = binder(&fake).await;

        let update = EmbeddingUpdate {
            adds: vec!["custom-documents/new.json".into()],
            deletes: vec!["custom-documents/old.json".into()],
        };
        binder
            .update_embeddings("demo", &update)
            .await
            .expect("update");

        assert_eq!(fake.state.embedding_updates(), vec![update]);
        assert_eq!(
            fake.state.document_locations("demo"),
            vec!["custom-documents/new.json"]
        );
    }
}
