pub mod api;
pub mod dashboard;
pub mod date_util;
pub mod error;
pub mod metrics;
pub mod model;
pub mod query;
pub mod snapshot;
pub mod storage;

#[cfg(test)]
mod fixtures;

pub use api::{handle_dashboard, load_dashboard, ApiError, ApiResponse, DashboardRequest};
pub use dashboard::{
    compute_dashboard, BusinessInsights, DashboardOptions, DashboardQuery, DashboardResponse,
};
pub use error::{Error, Result};
pub use model::{Caller, LeadStatus, Role};
pub use query::{DateWindow, LeadFilter};
pub use snapshot::{ImportReport, ImportStatus, Snapshot};
pub use storage::Database;

// Re-export repository types needed by the binary crate, but not the module itself
pub use storage::repository::StoreCounts;

use std::path::Path;

use storage::repository;

/// Main entry point for the lead dashboard.
pub struct LeadDesk {
    db: Database,
}

impl LeadDesk {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Access the database (for direct queries in the CLI).
    pub fn db(&self) -> &Database {
        &self.db
    }

    // ── Identity ─────────────────────────────────────────────────

    /// Look up a manager or worker by id or email.
    pub async fn resolve_caller(&self, identifier: &str) -> Result<Caller> {
        let id = identifier.to_string();
        let found = self
            .db
            .reader()
            .call(move |conn| repository::resolve_caller(conn, &id))
            .await?;
        found.ok_or_else(|| {
            Error::NotFound(format!("no manager or worker matches '{identifier}'"))
        })
    }

    // ── Dashboard ────────────────────────────────────────────────

    /// Compute the dashboard for `caller`, validating the request dates.
    pub async fn dashboard(
        &self,
        caller: &Caller,
        request: &DashboardRequest,
    ) -> Result<DashboardResponse> {
        api::load_dashboard(&self.db, caller, request, None).await
    }

    /// Serve the dashboard as a status + JSON envelope.
    pub async fn dashboard_response(
        &self,
        caller: &Caller,
        request: &DashboardRequest,
    ) -> ApiResponse {
        handle_dashboard(&self.db, caller, request).await
    }

    // ── Import ───────────────────────────────────────────────────

    pub async fn import(&self, path: impl AsRef<Path>) -> Result<Vec<ImportReport>> {
        snapshot::import_file(&self.db, path).await
    }

    // ── Config ───────────────────────────────────────────────────

    pub async fn config_get(&self, key: &str) -> Result<Option<String>> {
        let key = key.to_string();
        Ok(self
            .db
            .reader()
            .call(move |conn| repository::get_config(conn, &key))
            .await?)
    }

    pub async fn config_set(&self, key: &str, value: &str) -> Result<()> {
        let key = key.to_string();
        let value = value.to_string();
        self.db
            .writer()
            .call(move |conn| repository::set_config(conn, &key, &value))
            .await?;
        Ok(())
    }

    pub async fn config_list(&self) -> Result<Vec<(String, String)>> {
        Ok(self.db.reader().call(|conn| repository::list_config(conn)).await?)
    }

    // ── Status ───────────────────────────────────────────────────

    pub async fn status(&self) -> Result<StoreCounts> {
        Ok(self.db.reader().call(|conn| repository::store_counts(conn)).await?)
    }
}
