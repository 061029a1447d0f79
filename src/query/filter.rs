use chrono::{NaiveDateTime, NaiveTime};
use rusqlite::types::ToSql;

use crate::date_util::{end_of_day, format_ts, parse_timestamp};
use crate::error::{Error, Result};
use crate::model::{Caller, Role};

/// Positional SQL parameters, numbered in the order they are pushed.
#[derive(Default)]
pub struct SqlParams {
    values: Vec<Box<dyn ToSql>>,
}

impl SqlParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a value and return its `?N` placeholder.
    pub fn push(&mut self, value: impl ToSql + 'static) -> String {
        self.values.push(Box::new(value));
        format!("?{}", self.values.len())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn as_refs(&self) -> Vec<&dyn ToSql> {
        self.values.iter().map(|p| p.as_ref()).collect()
    }
}

/// Inclusive creation-time window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl DateWindow {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Result<Self> {
        if start > end {
            return Err(Error::InvalidDate(format!(
                "start {} is after end {}",
                format_ts(start),
                format_ts(end)
            )));
        }
        Ok(Self { start, end })
    }

    /// Build a window from raw request values.
    ///
    /// Both values present: `[start 00:00:00, end 23:59:59]`. Only one
    /// present: no window. Any supplied value must parse.
    pub fn from_inputs(start: Option<&str>, end: Option<&str>) -> Result<Option<Self>> {
        let start = start
            .filter(|s| !s.trim().is_empty())
            .map(parse_timestamp)
            .transpose()?;
        let end = end
            .filter(|s| !s.trim().is_empty())
            .map(parse_timestamp)
            .transpose()?;

        match (start, end) {
            (Some(start), Some(end)) => {
                let start = start.date().and_time(NaiveTime::MIN);
                Ok(Some(Self::new(start, end_of_day(end.date()))?))
            }
            (None, None) => Ok(None),
            (start, end) => {
                log::debug!(
                    "Ignoring one-sided date window (start={:?}, end={:?})",
                    start.map(format_ts),
                    end.map(format_ts)
                );
                Ok(None)
            }
        }
    }

    /// `column BETWEEN start AND end`.
    pub fn clause(&self, column: &str, params: &mut SqlParams) -> String {
        let start = params.push(format_ts(self.start));
        let end = params.push(format_ts(self.end));
        format!("{column} >= {start} AND {column} <= {end}")
    }
}

/// Role-scoped, date-windowed predicate over leads.
///
/// Every dashboard metric renders the same predicate so managers see all
/// active leads and workers see only the leads assigned to them.
#[derive(Debug, Clone)]
pub struct LeadFilter {
    caller: Caller,
    window: Option<DateWindow>,
}

impl LeadFilter {
    pub fn new(caller: Caller) -> Self {
        Self {
            caller,
            window: None,
        }
    }

    pub fn window(mut self, window: Option<DateWindow>) -> Self {
        self.window = window;
        self
    }

    pub fn caller(&self) -> &Caller {
        &self.caller
    }

    pub fn date_window(&self) -> Option<&DateWindow> {
        self.window.as_ref()
    }

    /// Same caller scope with the date window removed.
    pub fn scope_only(&self) -> Self {
        Self::new(self.caller.clone())
    }

    /// Ownership restriction on lead alias `alias`, if the role has one.
    pub fn scope_clause(&self, alias: &str, params: &mut SqlParams) -> Option<String> {
        match self.caller.role {
            Role::Manager => None,
            Role::Worker => {
                let worker = params.push(self.caller.id.clone());
                Some(format!(
                    "EXISTS (SELECT 1 FROM bridge_assignment_leads bal \
                     JOIN fact_assignments a ON a.assignment_id = bal.assignment_id \
                     WHERE bal.lead_id = {alias}.lead_id AND a.assigned_to = {worker})"
                ))
            }
        }
    }

    /// Full predicate on lead alias `alias`: active, in scope, in window.
    pub fn predicate(&self, alias: &str, params: &mut SqlParams) -> String {
        let mut wheres = vec![format!("{alias}.is_deleted = 0")];
        if let Some(scope) = self.scope_clause(alias, params) {
            wheres.push(scope);
        }
        if let Some(window) = &self.window {
            wheres.push(window.clause(&format!("{alias}.created_at"), params));
        }
        wheres.join(" AND ")
    }
}
