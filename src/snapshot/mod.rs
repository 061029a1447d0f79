//! Loading CRM exports into the store.
//!
//! A snapshot is a JSON document with one array per entity. Records are
//! validated and written one at a time; a bad record is reported and skipped
//! without aborting the rest of the import.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use rusqlite::{Connection, Transaction};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{
    Assignment, Campaign, Category, Conversation, Lead, Manager, Notification, Worker,
};
use crate::storage::{repository, Database};

static RE_EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap());
static RE_COLOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#(?:[0-9a-fA-F]{3}|[0-9a-fA-F]{6})$").unwrap());

/// An export of every CRM collection.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Snapshot {
    pub managers: Vec<Manager>,
    pub workers: Vec<Worker>,
    pub categories: Vec<Category>,
    pub leads: Vec<Lead>,
    pub assignments: Vec<Assignment>,
    pub conversations: Vec<Conversation>,
    pub campaigns: Vec<Campaign>,
    pub notifications: Vec<Notification>,
}

impl Snapshot {
    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Other(format!("cannot read {}: {e}", path.display())))?;
        Self::from_json(&raw)
    }
}

/// Outcome of importing one entity collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ImportStatus {
    Success,
    PartialFailure,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    pub entity: &'static str,
    pub status: ImportStatus,
    pub imported: u64,
    /// Records already present and left untouched.
    pub skipped: u64,
    pub failed: u64,
    pub errors: Vec<String>,
}

impl ImportReport {
    fn new(entity: &'static str) -> Self {
        Self {
            entity,
            status: ImportStatus::Success,
            imported: 0,
            skipped: 0,
            failed: 0,
            errors: Vec::new(),
        }
    }

    fn finish(mut self) -> Self {
        self.status = if self.failed == 0 {
            ImportStatus::Success
        } else if self.imported > 0 || self.skipped > 0 {
            ImportStatus::PartialFailure
        } else {
            ImportStatus::Failed
        };
        self
    }
}

enum Outcome {
    Imported,
    Skipped,
}

/// Import a snapshot file into the store.
pub async fn import_file(db: &Database, path: impl AsRef<Path>) -> Result<Vec<ImportReport>> {
    let snapshot = Snapshot::load(path)?;
    import_snapshot(db, snapshot).await
}

/// Write every record of the snapshot, dependencies first.
pub async fn import_snapshot(db: &Database, snapshot: Snapshot) -> Result<Vec<ImportReport>> {
    let reports = db
        .writer()
        .call(move |conn| {
            let mut tx = conn.transaction()?;
            let reports = vec![
                import_each(
                    &mut tx,
                    "managers",
                    &snapshot.managers,
                    |m| m.id.clone(),
                    write_manager,
                )?,
                import_each(
                    &mut tx,
                    "workers",
                    &snapshot.workers,
                    |w| w.id.clone(),
                    write_worker,
                )?,
                import_each(
                    &mut tx,
                    "categories",
                    &snapshot.categories,
                    |c| c.id.clone(),
                    write_category,
                )?,
                import_each(
                    &mut tx,
                    "leads",
                    &snapshot.leads,
                    |l| l.id.clone(),
                    write_lead,
                )?,
                import_each(
                    &mut tx,
                    "assignments",
                    &snapshot.assignments,
                    |a| format!("{}:{}", a.assigned_to, a.leads.join(",")),
                    write_assignment,
                )?,
                import_each(
                    &mut tx,
                    "conversations",
                    &snapshot.conversations,
                    |c| c.id.clone(),
                    write_conversation,
                )?,
                import_each(
                    &mut tx,
                    "campaigns",
                    &snapshot.campaigns,
                    |c| c.id.clone(),
                    write_campaign,
                )?,
                import_each(
                    &mut tx,
                    "notifications",
                    &snapshot.notifications,
                    |n| n.id.clone(),
                    write_notification,
                )?,
            ];
            tx.commit()?;
            Ok::<Vec<ImportReport>, rusqlite::Error>(reports)
        })
        .await?;

    for report in &reports {
        if report.failed > 0 {
            log::warn!(
                "Imported {} {} with {} failure(s)",
                report.imported,
                report.entity,
                report.failed
            );
        } else {
            log::info!("Imported {} {}", report.imported, report.entity);
        }
    }
    Ok(reports)
}

/// Write each record under its own savepoint so a failure leaves no partial rows.
fn import_each<T>(
    tx: &mut Transaction<'_>,
    entity: &'static str,
    records: &[T],
    id_of: impl Fn(&T) -> String,
    write: impl Fn(&Connection, &T) -> Result<Outcome>,
) -> Result<ImportReport, rusqlite::Error> {
    let mut report = ImportReport::new(entity);
    for record in records {
        let sp = tx.savepoint()?;
        match write(&*sp, record) {
            Ok(outcome) => {
                sp.commit()?;
                match outcome {
                    Outcome::Imported => report.imported += 1,
                    Outcome::Skipped => report.skipped += 1,
                }
            }
            Err(e) => {
                let id = id_of(record);
                log::debug!("Skipping {entity} record {id}: {e}");
                report.failed += 1;
                report.errors.push(format!("{id}: {e}"));
            }
        }
    }
    Ok(report.finish())
}

fn invalid(entity: &'static str, id: &str, message: impl Into<String>) -> Error {
    Error::InvalidRecord {
        entity,
        id: id.to_string(),
        message: message.into(),
    }
}

fn require(entity: &'static str, id: &str, field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(invalid(entity, id, format!("{field} is required")));
    }
    Ok(())
}

fn check_email(entity: &'static str, id: &str, email: &str) -> Result<()> {
    if !RE_EMAIL.is_match(email.trim()) {
        return Err(invalid(entity, id, format!("invalid email '{email}'")));
    }
    Ok(())
}

fn write_manager(conn: &Connection, m: &Manager) -> Result<Outcome> {
    require("manager", &m.id, "id", &m.id)?;
    require("manager", &m.id, "name", &m.name)?;
    check_email("manager", &m.id, &m.email)?;
    repository::upsert_manager(conn, m)?;
    Ok(Outcome::Imported)
}

fn write_worker(conn: &Connection, w: &Worker) -> Result<Outcome> {
    require("worker", &w.id, "id", &w.id)?;
    require("worker", &w.id, "name", &w.name)?;
    check_email("worker", &w.id, &w.email)?;
    repository::upsert_worker(conn, w)?;
    Ok(Outcome::Imported)
}

fn write_category(conn: &Connection, c: &Category) -> Result<Outcome> {
    require("category", &c.id, "id", &c.id)?;
    require("category", &c.id, "title", &c.title)?;
    if !RE_COLOR.is_match(&c.color) {
        return Err(invalid("category", &c.id, format!("invalid color '{}'", c.color)));
    }
    repository::upsert_category(conn, c)?;
    Ok(Outcome::Imported)
}

fn write_lead(conn: &Connection, l: &Lead) -> Result<Outcome> {
    require("lead", &l.id, "id", &l.id)?;
    require("lead", &l.id, "name", &l.name)?;
    let email = l.email.as_deref().filter(|e| !e.trim().is_empty());
    let phone = l.phone_number.as_deref().filter(|p| !p.trim().is_empty());
    if email.is_none() && phone.is_none() {
        return Err(invalid("lead", &l.id, "email or phone number is required"));
    }
    if let Some(email) = email {
        check_email("lead", &l.id, email)?;
    }
    repository::upsert_lead(conn, l)?;
    Ok(Outcome::Imported)
}

fn write_assignment(conn: &Connection, a: &Assignment) -> Result<Outcome> {
    match repository::assign_leads(conn, a) {
        Ok(_) => Ok(Outcome::Imported),
        // Already recorded by an earlier import
        Err(Error::Conflict(_)) => Ok(Outcome::Skipped),
        Err(e) => Err(e),
    }
}

fn write_conversation(conn: &Connection, c: &Conversation) -> Result<Outcome> {
    require("conversation", &c.id, "id", &c.id)?;
    require("conversation", &c.id, "conclusion", &c.conclusion)?;
    if repository::conversation_exists(conn, &c.id)? {
        return Ok(Outcome::Skipped);
    }
    repository::record_conversation(conn, c)?;
    Ok(Outcome::Imported)
}

fn write_campaign(conn: &Connection, c: &Campaign) -> Result<Outcome> {
    require("campaign", &c.id, "id", &c.id)?;
    require("campaign", &c.id, "title", &c.title)?;
    if c.opened > c.delivered {
        return Err(invalid(
            "campaign",
            &c.id,
            format!("opened ({}) exceeds delivered ({})", c.opened, c.delivered),
        ));
    }
    repository::upsert_campaign(conn, c)?;
    Ok(Outcome::Imported)
}

fn write_notification(conn: &Connection, n: &Notification) -> Result<Outcome> {
    require("notification", &n.id, "id", &n.id)?;
    require("notification", &n.id, "recipient", &n.recipient)?;
    require("notification", &n.id, "title", &n.title)?;
    repository::upsert_notification(conn, n)?;
    Ok(Outcome::Imported)
}
