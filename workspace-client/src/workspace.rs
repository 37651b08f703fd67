use common::error::AppError;
use serde_json::Value;
use state_machines::core::GuardError;
use tracing::{info, warn};

use crate::{
    client::{Upstream, UpstreamClient},
    types::{workspace_from_envelope, NewWorkspace, Workspace},
};

/// Outcome of looking a slug up on the upstream service.
pub(crate) enum Lookup {
    Found(Workspace),
    Missing,
}

/// Outcome of asking the upstream to create a workspace.
enum Creation {
    Created(Workspace),
    /// Someone else created it first; the body told us which slug to fetch.
    Conflict { slug: String },
}

mod ensure {
    use state_machines::state_machine;

    // No event leaves `Refetch` except to a terminal state, so the conflict
    // path re-fetches exactly once.
    state_machine! {
        name: EnsureMachine,
        initial: Lookup,
        states: [Lookup, Create, Refetch, Done, Failed],
        events {
            found { transition: { from: Lookup, to: Done } }
            missing { transition: { from: Lookup, to: Create } }
            created { transition: { from: Create, to: Done } }
            conflict { transition: { from: Create, to: Refetch } }
            refetched { transition: { from: Refetch, to: Done } }
            abort {
                transition: { from: Lookup, to: Failed }
                transition: { from: Create, to: Failed }
                transition: { from: Refetch, to: Failed }
            }
        }
    }

    pub(super) fn lookup() -> EnsureMachine<(), Lookup> {
        EnsureMachine::new(())
    }
}

fn map_guard_error(event: &str, guard: &GuardError) -> AppError {
    AppError::InternalError(format!(
        "invalid workspace ensure transition during {event}: {guard:?}"
    ))
}

/// Get-or-create and lookup of named workspaces. Holds no workspace state;
/// the upstream service is the source of truth on every call.
#[derive(Clone)]
pub struct WorkspaceManager {
    upstream: Upstream,
}

impl WorkspaceManager {
    pub fn new(upstream: Upstream) -> Self {
        Self { upstream }
    }

    pub async fn ensure_exists(&self, slug: &str) -> Result<Workspace, AppError> {
        let client = self.upstream.connect(None).await?;
        let machine = ensure::lookup();

        let machine = match lookup(&client, slug).await {
            Ok(Lookup::Found(workspace)) => {
                machine
                    .found()
                    .map_err(|(_, guard)| map_guard_error("found", &guard))?;
                return Ok(workspace);
            }
            Ok(Lookup::Missing) => machine
                .missing()
                .map_err(|(_, guard)| map_guard_error("missing", &guard))?,
            Err(err) => {
                let _failed = machine.abort();
                return Err(err);
            }
        };

        let (machine, existing) = match create(&client, slug).await {
            Ok(Creation::Created(workspace)) => {
                machine
                    .created()
                    .map_err(|(_, guard)| map_guard_error("created", &guard))?;
                info!(slug, "workspace created");
                return Ok(workspace);
            }
            Ok(Creation::Conflict { slug: existing }) => {
                info!(slug, existing = %existing, "workspace created concurrently, re-fetching");
                (
                    machine
                        .conflict()
                        .map_err(|(_, guard)| map_guard_error("conflict", &guard))?,
                    existing,
                )
            }
            Err(err) => {
                let _failed = machine.abort();
                return Err(err);
            }
        };

        match lookup(&client, &existing).await {
            Ok(Lookup::Found(workspace)) => {
                machine
                    .refetched()
                    .map_err(|(_, guard)| map_guard_error("refetched", &guard))?;
                Ok(workspace)
            }
            Ok(Lookup::Missing) => {
                let _failed = machine.abort();
                warn!(slug = %existing, "workspace vanished after a create conflict");
                Err(AppError::Conflict { slug: existing })
            }
            Err(err) => {
                let _failed = machine.abort();
                Err(err)
            }
        }
    }

    pub async fn get(&self, slug: &str) -> Result<Workspace, AppError> {
        let client = self.upstream.connect(None).await?;
        fetch_existing(&client, slug).await
    }

    /// Raw `GET /api/v1/workspace/{slug}` body, for callers that want the
    /// upstream shape untouched.
    pub async fn raw(&self, slug: &str) -> Result<Value, AppError> {
        let client = self.upstream.connect(None).await?;
        client
            .execute("workspace_info", client.get(&workspace_path(slug)))
            .await
    }

    pub async fn list(&self) -> Result<Value, AppError> {
        let client = self.upstream.connect(None).await?;
        client
            .execute("list_workspaces", client.get("/api/v1/workspaces"))
            .await
    }
}

/// Slugs arrive already percent-decoded from the inbound path, so they are
/// encoded again before going upstream.
pub(crate) fn workspace_path(slug: &str) -> String {
    format!("/api/v1/workspace/{}", urlencoding::encode(slug))
}

pub(crate) async fn lookup(client: &UpstreamClient, slug: &str) -> Result<Lookup, AppError> {
    match client
        .execute("get_workspace", client.get(&workspace_path(slug)))
        .await
    {
        Ok(body) => Ok(workspace_from_envelope(&body)?
            .map_or(Lookup::Missing, Lookup::Found)),
        Err(err) if err.upstream_status() == Some(404) => Ok(Lookup::Missing),
        Err(err) => Err(err),
    }
}

pub(crate) async fn fetch_existing(
    client: &UpstreamClient,
    slug: &str,
) -> Result<Workspace, AppError> {
    match lookup(client, slug).await? {
        Lookup::Found(workspace) => Ok(workspace),
        Lookup::Missing => Err(AppError::NotFound(format!("workspace {slug}"))),
    }
}

async fn create(client: &UpstreamClient, slug: &str) -> Result<Creation, AppError> {
    let request = client
        .post("/api/v1/workspace/new")
        .json(&NewWorkspace { name: slug });

    match client.execute("create_workspace", request).await {
        Ok(body) => workspace_from_envelope(&body)?
            .map(Creation::Created)
            .ok_or_else(|| {
                AppError::InternalError(format!(
                    "upstream created workspace {slug} but returned no workspace object"
                ))
            }),
        Err(AppError::Upstream { status: 409, body }) => {
            match body.get("slug").and_then(Value::as_str) {
                Some(existing) => Ok(Creation::Conflict {
                    slug: existing.to_string(),
                }),
                None => Err(AppError::Upstream { status: 409, body }),
            }
        }
        Err(err) => Err(err),
    }
}
