use std::fmt;

use serde::{Deserialize, Serialize};

use crate::date_util::day_key;
use crate::error::{Error, Result};
use crate::query::period::DateRange;

/// Record kinds the dataset can count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Job,
    Application,
    User,
    Certificate,
}

impl EntityType {
    pub fn table(&self) -> &'static str {
        match self {
            EntityType::Job => "jobs",
            EntityType::Application => "applications",
            EntityType::User => "users",
            EntityType::Certificate => "certificates",
        }
    }

    /// Column holding the tenant id for `scope`, or `None` when this
    /// entity cannot be restricted that way.
    fn scope_column(&self, scope: &Scope) -> Option<&'static str> {
        match (self, scope) {
            (EntityType::Job, Scope::Company(_)) => Some("company_id"),
            (EntityType::Application, Scope::Company(_)) => Some("company_id"),
            (EntityType::Application, Scope::Candidate(_)) => Some("candidate_id"),
            (EntityType::Certificate, Scope::Candidate(_)) => Some("candidate_id"),
            _ => None,
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

/// Tenant boundary a query is confined to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Scope {
    Global,
    Company(String),
    Candidate(String),
}

impl Scope {
    fn id(&self) -> Option<&str> {
        match self {
            Scope::Global => None,
            Scope::Company(id) | Scope::Candidate(id) => Some(id.as_str()),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Global => f.write_str("global"),
            Scope::Company(id) => write!(f, "company:{id}"),
            Scope::Candidate(id) => write!(f, "candidate:{id}"),
        }
    }
}

/// Account role stored on user records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Admin,
    Employer,
    JobSeeker,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin => "admin",
            UserRole::Employer => "employer",
            UserRole::JobSeeker => "job_seeker",
        }
    }
}

/// Conjunction of predicates applied to one entity: tenant scope, status
/// membership (empty matches any status) and an optional user role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricFilter {
    scope: Scope,
    statuses: Vec<String>,
    role: Option<UserRole>,
}

impl MetricFilter {
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn statuses(&self) -> &[String] {
        &self.statuses
    }

    pub fn role(&self) -> Option<UserRole> {
        self.role
    }
}

/// A count over one entity, restricted to a tenant scope and a date range.
///
/// The scope is fixed when the query is built. Retargeting with
/// [`MetricQuery::with_range`] keeps every predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricQuery {
    entity: EntityType,
    filter: MetricFilter,
    range: DateRange,
}

impl MetricQuery {
    pub fn builder(entity: EntityType, scope: Scope) -> MetricQueryBuilder {
        MetricQueryBuilder {
            entity,
            scope,
            statuses: Vec::new(),
            role: None,
        }
    }

    pub fn entity(&self) -> EntityType {
        self.entity
    }

    pub fn filter(&self) -> &MetricFilter {
        &self.filter
    }

    pub fn range(&self) -> &DateRange {
        &self.range
    }

    /// The same query over another window.
    pub fn with_range(&self, range: DateRange) -> Self {
        Self {
            entity: self.entity,
            filter: self.filter.clone(),
            range,
        }
    }
}

/// Builder for [`MetricQuery`]; validation happens in [`build`](Self::build).
#[derive(Debug, Clone)]
pub struct MetricQueryBuilder {
    entity: EntityType,
    scope: Scope,
    statuses: Vec<String>,
    role: Option<UserRole>,
}

impl MetricQueryBuilder {
    pub fn status(mut self, status: &str) -> Self {
        self.statuses.push(status.to_string());
        self
    }

    pub fn statuses<I, S>(mut self, statuses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.statuses
            .extend(statuses.into_iter().map(|s| s.as_ref().to_string()));
        self
    }

    pub fn role(mut self, role: UserRole) -> Self {
        self.role = Some(role);
        self
    }

    pub fn build(self, range: DateRange) -> Result<MetricQuery> {
        if self.scope != Scope::Global && self.entity.scope_column(&self.scope).is_none() {
            return Err(Error::InvalidQuery(format!(
                "{} cannot be scoped to {}",
                self.entity, self.scope
            )));
        }
        if self.role.is_some() && self.entity != EntityType::User {
            return Err(Error::InvalidQuery(format!(
                "role filter does not apply to {}",
                self.entity
            )));
        }
        Ok(MetricQuery {
            entity: self.entity,
            filter: MetricFilter {
                scope: self.scope,
                statuses: self.statuses,
                role: self.role,
            },
            range,
        })
    }
}

/// Render the WHERE clause shared by plain and grouped counts.
///
/// Parameters are positional; the date bounds are always `?1`/`?2`. Day
/// keys compare exactly because ranges cover whole days.
pub fn where_clause(
    entity: EntityType,
    filter: &MetricFilter,
    range: &DateRange,
) -> Result<(String, Vec<String>)> {
    let mut clauses = vec![
        "created_date_key >= ?1".to_string(),
        "created_date_key <= ?2".to_string(),
    ];
    let mut params = vec![day_key(range.start_date()), day_key(range.end_date())];

    if let Some(id) = filter.scope.id() {
        let column = entity.scope_column(&filter.scope).ok_or_else(|| {
            Error::InvalidQuery(format!("{entity} cannot be scoped to {}", filter.scope))
        })?;
        params.push(id.to_string());
        clauses.push(format!("{column} = ?{}", params.len()));
    }

    if !filter.statuses.is_empty() {
        let first = params.len() + 1;
        let placeholders = (first..first + filter.statuses.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(",");
        params.extend(filter.statuses.iter().cloned());
        clauses.push(format!("status IN ({placeholders})"));
    }

    if let Some(role) = filter.role {
        params.push(role.as_str().to_string());
        clauses.push(format!("role = ?{}", params.len()));
    }

    Ok((clauses.join(" AND "), params))
}

/// `SELECT COUNT(*)` for a query.
pub fn count_sql(
    entity: EntityType,
    filter: &MetricFilter,
    range: &DateRange,
) -> Result<(String, Vec<String>)> {
    let (clause, params) = where_clause(entity, filter, range)?;
    Ok((
        format!("SELECT COUNT(*) FROM {} WHERE {clause}", entity.table()),
        params,
    ))
}

/// Per-day counts for a query, one row per day that has any match.
pub fn grouped_count_sql(
    entity: EntityType,
    filter: &MetricFilter,
    range: &DateRange,
) -> Result<(String, Vec<String>)> {
    let (clause, params) = where_clause(entity, filter, range)?;
    Ok((
        format!(
            "SELECT created_date_key, COUNT(*) FROM {} WHERE {clause} GROUP BY created_date_key ORDER BY created_date_key",
            entity.table()
        ),
        params,
    ))
}
