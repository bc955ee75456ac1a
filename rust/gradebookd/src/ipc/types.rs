use std::path::PathBuf;

use serde::Deserialize;

use crate::auth::Session;
use crate::store::GradebookStore;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

#[derive(Default)]
pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub store: Option<GradebookStore>,
    pub session: Session,
}

/// Built by the session gate for every authenticated request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub user: String,
}
