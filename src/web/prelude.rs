pub(crate) use super::AppState;
pub(crate) use super::forms::JobFields;
pub(crate) use crate::db::entities::generation_history::{self, CallKind, Caller};
pub(crate) use crate::error::RelayError;
pub(crate) use crate::upstream::{JobReference, JobStatus};
pub(crate) use axum::Json;
pub(crate) use axum::extract::{Query, State};
pub(crate) use serde::{Deserialize, Serialize};
pub(crate) use tracing::{debug, instrument};
