//! Case lifecycle and case reports.
//!
//! Open cases live in the `CASE` partition keyed by transaction id. Closing a
//! case moves it to `CLOSED_CASE` in one atomic replace. Reports live in
//! `CASE_REPORT` under `{transaction_id}#{uuid}`, so the reports of one
//! transaction share a sort-key prefix.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use super::{from_attributes, require, to_attributes, PageParams};
use crate::config::PaginationConfig;
use crate::error::{Error, Result};
use crate::keys::{
    case_key, case_report_key, case_report_prefix, closed_case_key, CASE_PARTITION,
    CASE_REPORT_PARTITION, CLOSED_CASE_PARTITION,
};
use crate::pagination::{PageEnvelope, Paginator};
use crate::storage::{
    Attributes, ExpectedAttribute, Record, RecordKey, RecordStore, SortCondition, StorageError,
};
use crate::utils::time::now_rfc3339;

/// Workflow state of a case.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CaseStatus {
    #[default]
    Open,
    InProgress,
    Closed,
}

impl CaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaseStatus::Open => "OPEN",
            CaseStatus::InProgress => "IN_PROGRESS",
            CaseStatus::Closed => "CLOSED",
        }
    }

    /// OPEN → IN_PROGRESS | CLOSED, IN_PROGRESS → CLOSED.
    pub fn can_transition_to(&self, next: CaseStatus) -> bool {
        matches!(
            (self, next),
            (CaseStatus::Open, CaseStatus::InProgress)
                | (CaseStatus::Open, CaseStatus::Closed)
                | (CaseStatus::InProgress, CaseStatus::Closed)
        )
    }
}

impl fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CaseStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "OPEN" => Ok(CaseStatus::Open),
            "IN_PROGRESS" => Ok(CaseStatus::InProgress),
            "CLOSED" => Ok(CaseStatus::Closed),
            other => Err(Error::invalid(format!(
                "unknown case status '{}', expected OPEN | IN_PROGRESS | CLOSED",
                other
            ))),
        }
    }
}

/// An open or closed case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Case {
    #[serde(skip_deserializing)]
    pub transaction_id: String,
    #[serde(default)]
    pub status: CaseStatus,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub assigned_to: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<String>,
}

impl Case {
    fn from_record(record: Record) -> Result<Self> {
        let mut case: Case = from_attributes(record.attributes)?;
        case.transaction_id = record.key.sort_key;
        Ok(case)
    }
}

/// Input of [`CaseService::create_case`].
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct NewCase {
    pub transaction_id: String,
    #[serde(default)]
    pub assigned_to: Option<Value>,
    #[serde(default)]
    pub status: Option<CaseStatus>,
}

/// Optional narrowing of case listings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CaseFilter {
    pub status: Option<CaseStatus>,
    pub transaction_id: Option<String>,
}

/// A free-text report attached to a transaction's case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseReport {
    /// Full sort key, `{transaction_id}#{uuid}`.
    #[serde(skip_deserializing)]
    pub report_id: String,
    #[serde(skip_deserializing)]
    pub transaction_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub report: String,
    #[serde(default)]
    pub assigned_by: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl CaseReport {
    fn from_record(record: Record) -> Result<Self> {
        let mut report: CaseReport = from_attributes(record.attributes)?;
        report.transaction_id = record
            .key
            .sort_key
            .split_once('#')
            .map(|(txn, _)| txn.to_string())
            .unwrap_or_default();
        report.report_id = record.key.sort_key;
        Ok(report)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct NewReport {
    pub transaction_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub report: Option<String>,
    #[serde(default)]
    pub assigned_by: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportChanges {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<String>,
}

/// Case and case-report operations.
pub struct CaseService {
    store: Arc<dyn RecordStore>,
    paginator: Paginator,
    pagination: PaginationConfig,
}

impl CaseService {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self::with_pagination(store, PaginationConfig::default())
    }

    pub fn with_pagination(store: Arc<dyn RecordStore>, pagination: PaginationConfig) -> Self {
        Self {
            paginator: Paginator::new(store.clone())
                .with_default_per_page(pagination.default_per_page)
                .with_max_per_page(pagination.max_per_page),
            store,
            pagination,
        }
    }

    /// Open a case for a transaction. Status defaults to OPEN.
    ///
    /// Writing an existing transaction id overwrites that case.
    pub async fn create_case(&self, new_case: NewCase) -> Result<Case> {
        require("transaction_id", &new_case.transaction_id)?;

        let case = Case {
            transaction_id: new_case.transaction_id,
            status: new_case.status.unwrap_or_default(),
            assigned_to: new_case.assigned_to.unwrap_or(Value::Null),
            created_at: Some(now_rfc3339()),
            updated_at: None,
            closed_at: None,
        };
        self.store
            .put(Record::new(case_key(&case.transaction_id), case_attributes(&case)?))
            .await?;

        info!(transaction_id = %case.transaction_id, status = %case.status, "Case created");
        Ok(case)
    }

    pub async fn get_case(&self, transaction_id: &str) -> Result<Case> {
        require("transaction_id", transaction_id)?;
        match self.store.get(&case_key(transaction_id).into()).await? {
            Some(record) if record.get("report").is_none() => Case::from_record(record),
            _ => Err(Error::not_found(format!("case {}", transaction_id))),
        }
    }

    /// Move a case along the status workflow.
    ///
    /// The write only lands if the status is still the one just read; a
    /// concurrent change surfaces as `InvalidTransition`. Moving to CLOSED
    /// closes the case.
    pub async fn update_status(&self, transaction_id: &str, status: CaseStatus) -> Result<Case> {
        let current = self.get_case(transaction_id).await?;
        let rejected = || Error::InvalidTransition {
            from: current.status.to_string(),
            to: status.to_string(),
        };

        if !current.status.can_transition_to(status) {
            return Err(rejected());
        }
        if status == CaseStatus::Closed {
            return self.close_case(transaction_id).await;
        }

        let mut changes = Attributes::new();
        changes.insert("status".to_string(), json!(status.as_str()));
        changes.insert("updated_at".to_string(), json!(now_rfc3339()));
        let expected = ExpectedAttribute::new("status", current.status.as_str());

        match self
            .store
            .update_if(&case_key(transaction_id).into(), changes, &expected)
            .await
        {
            Ok(record) => {
                info!(transaction_id = %transaction_id, from = %current.status, to = %status, "Case status updated");
                Case::from_record(record)
            }
            Err(StorageError::ConditionFailed { .. }) => Err(rejected()),
            Err(e) => Err(e.into()),
        }
    }

    /// Assign a case to an investigator.
    pub async fn assign_case(&self, transaction_id: &str, assigned_to: Value) -> Result<Case> {
        let current = self.get_case(transaction_id).await?;

        let mut changes = Attributes::new();
        changes.insert("assigned_to".to_string(), assigned_to);
        changes.insert("updated_at".to_string(), json!(now_rfc3339()));
        let expected = ExpectedAttribute::new("status", current.status.as_str());

        let record = self
            .store
            .update_if(&case_key(transaction_id).into(), changes, &expected)
            .await?;
        debug!(transaction_id = %transaction_id, "Case assigned");
        Case::from_record(record)
    }

    /// Move a case from `CASE` to `CLOSED_CASE`, stamping `closed_at`.
    pub async fn close_case(&self, transaction_id: &str) -> Result<Case> {
        let current = self.get_case(transaction_id).await?;

        let closed = Case {
            status: CaseStatus::Closed,
            updated_at: None,
            closed_at: Some(now_rfc3339()),
            ..current
        };
        self.store
            .replace(
                &case_key(transaction_id).into(),
                Record::new(closed_case_key(transaction_id), case_attributes(&closed)?),
            )
            .await?;

        info!(transaction_id = %transaction_id, "Case closed");
        Ok(closed)
    }

    /// Page through open cases that have an assignee.
    pub async fn open_cases(
        &self,
        filter: &CaseFilter,
        params: &PageParams,
    ) -> Result<PageEnvelope<Case>> {
        self.list_cases(CASE_PARTITION, filter, params).await
    }

    /// Page through closed cases that have an assignee.
    pub async fn closed_cases(
        &self,
        filter: &CaseFilter,
        params: &PageParams,
    ) -> Result<PageEnvelope<Case>> {
        self.list_cases(CLOSED_CASE_PARTITION, filter, params).await
    }

    async fn list_cases(
        &self,
        partition: &str,
        filter: &CaseFilter,
        params: &PageParams,
    ) -> Result<PageEnvelope<Case>> {
        let condition = match &filter.transaction_id {
            Some(id) if !id.is_empty() => SortCondition::Equals(id.clone()),
            _ => SortCondition::All,
        };
        let request = params.request(
            partition,
            condition,
            &self.pagination,
            self.pagination.overfetch_factor,
        );
        let status = filter.status;

        let page = self
            .paginator
            .fetch_page(&request, move |record: &Record| is_listed_case(record, status))
            .await?;
        page.try_into_envelope(Case::from_record)
    }

    /// Attach a report to a transaction. Returns the stored report.
    pub async fn create_report(&self, new_report: NewReport) -> Result<CaseReport> {
        require("transaction_id", &new_report.transaction_id)?;

        let key: RecordKey =
            case_report_key(&new_report.transaction_id, &Uuid::new_v4().to_string()).into();
        let report = CaseReport {
            report_id: key.sort_key.clone(),
            transaction_id: new_report.transaction_id,
            title: new_report.title.unwrap_or_default(),
            report: new_report.report.unwrap_or_default(),
            assigned_by: new_report.assigned_by.unwrap_or_else(|| json!({})),
            created_at: Some(now_rfc3339()),
            updated_at: None,
        };

        let mut attributes = to_attributes(&report)?;
        attributes.remove("report_id");
        attributes.remove("transaction_id");
        self.store.put(Record::new(key, attributes)).await?;

        info!(report_id = %report.report_id, "Case report created");
        Ok(report)
    }

    /// Update a report's title and/or body.
    pub async fn edit_report(&self, report_id: &str, changes: ReportChanges) -> Result<CaseReport> {
        require("report_id", report_id)?;
        if changes.title.is_none() && changes.report.is_none() {
            return Err(Error::invalid(
                "at least one field (title or report) must be provided",
            ));
        }

        let key = RecordKey::new(CASE_REPORT_PARTITION, report_id);
        if self.store.get(&key).await?.is_none() {
            return Err(Error::not_found(format!("report {}", report_id)));
        }

        let mut attributes = to_attributes(&changes)?;
        attributes.insert("updated_at".to_string(), json!(now_rfc3339()));
        let record = self.store.update(&key, attributes).await?;
        CaseReport::from_record(record)
    }

    pub async fn delete_report(&self, report_id: &str) -> Result<()> {
        require("report_id", report_id)?;
        let key = RecordKey::new(CASE_REPORT_PARTITION, report_id);
        if self.store.get(&key).await?.is_none() {
            return Err(Error::not_found(format!("report {}", report_id)));
        }
        self.store.delete(&key).await?;
        info!(report_id = %report_id, "Case report deleted");
        Ok(())
    }

    /// Page through reports, newest sort key first, optionally for one transaction.
    pub async fn list_reports(
        &self,
        transaction_id: Option<&str>,
        params: &PageParams,
    ) -> Result<PageEnvelope<CaseReport>> {
        let condition = match transaction_id {
            Some(txn) if !txn.is_empty() => SortCondition::BeginsWith(case_report_prefix(txn)),
            _ => SortCondition::All,
        };
        let request = params.request(
            CASE_REPORT_PARTITION,
            condition,
            &self.pagination,
            self.pagination.overfetch_factor,
        );
        let page = self.paginator.fetch_unfiltered(&request).await?;
        page.try_into_envelope(CaseReport::from_record)
    }
}

fn case_attributes(case: &Case) -> Result<Attributes> {
    let mut attributes = to_attributes(case)?;
    attributes.remove("transaction_id");
    Ok(attributes)
}

/// Listings skip stray report rows and unassigned cases.
fn is_listed_case(record: &Record, status: Option<CaseStatus>) -> bool {
    if record.get("report").is_some() || !is_assigned(record.get("assigned_to")) {
        return false;
    }
    status.map_or(true, |s| record.get_str("status") == Some(s.as_str()))
}

fn is_assigned(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) | Some(Value::Bool(false)) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Object(map)) => !map.is_empty(),
        Some(Value::Array(items)) => !items.is_empty(),
        Some(_) => true,
    }
}
