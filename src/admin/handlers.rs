use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

use crate::admin::AdminState;
use crate::deploy::{
    Application, ApplicationStatus, BackupEntry, DeploySource, DeploymentError, DeploymentManager,
};
use crate::statistics::{floor_minute, now_millis, HttpStatsEntry, WsStatsEntry, MINUTE_MS};

/// Minutes reported when a stats query omits `start`.
const DEFAULT_WINDOW_MINUTES: u64 = 60;

/// Longest range a single stats query may span.
const MAX_QUERY_MINUTES: u64 = 7 * 24 * 60;

#[derive(Debug, Error)]
pub enum AdminError {
    #[error(transparent)]
    Deployment(#[from] DeploymentError),

    #[error("deployment task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("{0}")]
    BadRequest(String),
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Deployment(e) => match e {
                DeploymentError::AlreadyExists(_) => StatusCode::CONFLICT,
                DeploymentError::NotFound(_) | DeploymentError::NoBackup(_) => {
                    StatusCode::NOT_FOUND
                }
                DeploymentError::InvalidName(_)
                | DeploymentError::InvalidArchive { .. }
                | DeploymentError::BuildFailure { .. } => StatusCode::BAD_REQUEST,
                DeploymentError::Io { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        };
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

/// Run a filesystem-bound manager operation off the async workers.
async fn blocking<T, F>(manager: &Arc<DeploymentManager>, op: F) -> Result<T, AdminError>
where
    T: Send + 'static,
    F: FnOnce(&DeploymentManager) -> Result<T, DeploymentError> + Send + 'static,
{
    let manager = Arc::clone(manager);
    Ok(tokio::task::spawn_blocking(move || op(&manager)).await??)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub uptime_secs: u64,
    pub applications: usize,
    pub published: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployedVersion {
    pub name: String,
    pub version: u64,
    pub published_at: u64,
    pub source: &'static str,
}

impl From<&Application> for DeployedVersion {
    fn from(application: &Application) -> Self {
        Self {
            name: application.name().to_string(),
            version: application.version(),
            published_at: application.published_at(),
            source: application.source().kind(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Archive,
    Directory,
}

#[derive(Debug, Deserialize)]
pub struct PublishRequest {
    pub source: PathBuf,
    pub kind: SourceKind,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRequest {
    pub base_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
pub struct StatsRange {
    pub start: Option<u64>,
    pub end: Option<u64>,
}

impl StatsRange {
    /// Resolve to `(start, end)`, defaulting to the last hour.
    fn resolve(&self) -> Result<(u64, u64), AdminError> {
        let end = self.end.unwrap_or_else(now_millis);
        let start = self.start.unwrap_or_else(|| {
            floor_minute(end).saturating_sub((DEFAULT_WINDOW_MINUTES - 1) * MINUTE_MS)
        });
        let minutes = floor_minute(end).saturating_sub(floor_minute(start)) / MINUTE_MS;
        if minutes >= MAX_QUERY_MINUTES {
            return Err(AdminError::BadRequest(format!(
                "range spans {} minutes, at most {} allowed",
                minutes + 1,
                MAX_QUERY_MINUTES
            )));
        }
        Ok((start, end))
    }
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    let statuses = state.manager.statuses();
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        uptime_secs: state.started_at.elapsed().as_secs(),
        applications: statuses.len(),
        published: statuses.iter().filter(|s| s.published).count(),
    })
}

pub async fn get_applications(State(state): State<AdminState>) -> Json<Vec<ApplicationStatus>> {
    Json(state.manager.statuses())
}

pub async fn get_backups(
    State(state): State<AdminState>,
    Path(name): Path<String>,
) -> Result<Json<Vec<BackupEntry>>, AdminError> {
    let backups = blocking(&state.manager, move |manager| manager.backups(&name)).await?;
    Ok(Json(backups))
}

pub async fn get_http_stats(
    State(state): State<AdminState>,
    Query(range): Query<StatsRange>,
) -> Result<Json<Vec<HttpStatsEntry>>, AdminError> {
    let (start, end) = range.resolve()?;
    Ok(Json(state.http_stats.get_entries(start, end)))
}

pub async fn get_websocket_stats(
    State(state): State<AdminState>,
    Query(range): Query<StatsRange>,
) -> Result<Json<Vec<WsStatsEntry>>, AdminError> {
    let (start, end) = range.resolve()?;
    Ok(Json(state.ws_stats.get_entries(start, end)))
}

pub async fn create_application(
    State(state): State<AdminState>,
    Path(name): Path<String>,
    body: Option<Json<CreateRequest>>,
) -> Result<impl IntoResponse, AdminError> {
    let Json(request) = body.unwrap_or_default();
    blocking(&state.manager, move |manager| {
        manager.create_application(&name, request.base_dir)
    })
    .await?;
    Ok(StatusCode::CREATED)
}

pub async fn publish(
    State(state): State<AdminState>,
    Path(name): Path<String>,
    Json(request): Json<PublishRequest>,
) -> Result<Json<DeployedVersion>, AdminError> {
    let source = match request.kind {
        SourceKind::Archive => DeploySource::Archive(request.source),
        SourceKind::Directory => DeploySource::Directory(request.source),
    };
    let application =
        blocking(&state.manager, move |manager| manager.publish_source(&name, source)).await?;
    Ok(Json(DeployedVersion::from(application.as_ref())))
}

pub async fn rollback(
    State(state): State<AdminState>,
    Path(name): Path<String>,
) -> Result<Json<DeployedVersion>, AdminError> {
    let application = blocking(&state.manager, move |manager| manager.rollback(&name)).await?;
    Ok(Json(DeployedVersion::from(application.as_ref())))
}

pub async fn unpublish(
    State(state): State<AdminState>,
    Path(name): Path<String>,
) -> Result<Json<serde_json::Value>, AdminError> {
    let response_name = name.clone();
    let previous = blocking(&state.manager, move |manager| manager.unpublish(&name)).await?;
    Ok(Json(serde_json::json!({
        "name": response_name,
        "previousVersion": previous.map(|a| a.version()),
    })))
}

pub async fn delete_application(
    State(state): State<AdminState>,
    Path(name): Path<String>,
) -> Result<StatusCode, AdminError> {
    blocking(&state.manager, move |manager| manager.delete(&name)).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        let status = |e: DeploymentError| AdminError::from(e).into_response().status();
        assert_eq!(status(DeploymentError::AlreadyExists("a".into())), StatusCode::CONFLICT);
        assert_eq!(status(DeploymentError::NotFound("a".into())), StatusCode::NOT_FOUND);
        assert_eq!(status(DeploymentError::NoBackup("a".into())), StatusCode::NOT_FOUND);
        assert_eq!(status(DeploymentError::build("a", "bad")), StatusCode::BAD_REQUEST);
        assert_eq!(
            status(DeploymentError::io(
                "copy archive",
                std::io::Error::new(std::io::ErrorKind::Other, "disk full")
            )),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_stats_range_defaults_to_last_hour() {
        let range = StatsRange {
            start: None,
            end: Some(10 * 60 * MINUTE_MS + 5),
        };
        let (start, end) = range.resolve().unwrap();
        assert_eq!(end, 10 * 60 * MINUTE_MS + 5);
        assert_eq!(start, 9 * 60 * MINUTE_MS + MINUTE_MS);
    }

    #[test]
    fn test_stats_range_is_bounded() {
        let range = StatsRange {
            start: Some(0),
            end: Some(MAX_QUERY_MINUTES * MINUTE_MS),
        };
        assert!(matches!(range.resolve(), Err(AdminError::BadRequest(_))));
    }
}
