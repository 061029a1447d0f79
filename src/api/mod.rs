use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dashboard::{compute_dashboard, DashboardOptions, DashboardQuery, DashboardResponse};
use crate::error::Error;
use crate::model::Caller;
use crate::query::DateWindow;
use crate::storage::Database;

pub const SERVER_ERROR_MESSAGE: &str = "Server error while fetching dashboard data";

/// Body of a dashboard request. Both dates are optional ISO strings.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardRequest {
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
}

/// Status code and JSON body, ready for whatever transport carries them.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

#[derive(Debug, Serialize)]
struct Failure<'a> {
    success: bool,
    message: &'a str,
}

/// Errors surfaced by the dashboard endpoint.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Invalid date range: {0}")]
    InvalidDateRange(String),

    #[error("{}", SERVER_ERROR_MESSAGE)]
    Internal(#[source] Error),
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        match e {
            Error::InvalidDate(detail) => ApiError::InvalidDateRange(detail),
            other => ApiError::Internal(other),
        }
    }
}

impl ApiError {
    pub fn status(&self) -> u16 {
        match self {
            ApiError::InvalidDateRange(_) => 400,
            ApiError::Internal(_) => 500,
        }
    }

    pub fn into_response(self) -> ApiResponse {
        if let ApiError::Internal(cause) = &self {
            log::error!("Dashboard request failed: {cause}");
        }
        let message = self.to_string();
        ApiResponse {
            status: self.status(),
            body: serde_json::to_value(Failure {
                success: false,
                message: &message,
            })
            .unwrap_or(Value::Null),
        }
    }
}

/// Serve a dashboard request for an authenticated caller.
pub async fn handle_dashboard(
    db: &Database,
    caller: &Caller,
    request: &DashboardRequest,
) -> ApiResponse {
    respond(dashboard_body(db, caller, request, None).await)
}

/// Same as [`handle_dashboard`] with trailing windows anchored at `now`.
pub async fn handle_dashboard_at(
    db: &Database,
    caller: &Caller,
    request: &DashboardRequest,
    now: NaiveDateTime,
) -> ApiResponse {
    respond(dashboard_body(db, caller, request, Some(now)).await)
}

fn respond(result: Result<Value, ApiError>) -> ApiResponse {
    match result {
        Ok(body) => ApiResponse { status: 200, body },
        Err(e) => e.into_response(),
    }
}

/// Validate the request and compute the dashboard it asks for.
///
/// `as_of` anchors the trailing windows; the UTC system clock is used when unset.
pub async fn load_dashboard(
    db: &Database,
    caller: &Caller,
    request: &DashboardRequest,
    as_of: Option<NaiveDateTime>,
) -> Result<DashboardResponse, Error> {
    let window =
        DateWindow::from_inputs(request.start_date.as_deref(), request.end_date.as_deref())?;
    let mut query = DashboardQuery::new(caller.clone()).window(window);
    if let Some(now) = as_of {
        query = query.as_of(now);
    }
    let options = DashboardOptions::load(db).await?;
    compute_dashboard(db, &query, &options).await
}

async fn dashboard_body(
    db: &Database,
    caller: &Caller,
    request: &DashboardRequest,
    as_of: Option<NaiveDateTime>,
) -> Result<Value, ApiError> {
    let dashboard = load_dashboard(db, caller, request, as_of).await?;
    serde_json::to_value(dashboard).map_err(|e| ApiError::Internal(e.into()))
}
