//! Period-over-period insights for the dashboards.
//!
//! One composer serves every role. A role only contributes its tenant
//! scope and its metric set, see [`InsightProfile::for_role`].

pub mod request;

pub use request::{
    admin_insights, employer_insights, insights_for, job_seeker_insights, InsightRequest,
};

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::time::Instant;

use futures::future::try_join_all;
use serde::Serialize;

use crate::config::InsightConfig;
use crate::error::{Error, Result};
use crate::metrics::series::bucketize;
use crate::metrics::{collect, ChartPoint, MetricChange};
use crate::provider::DatasetProvider;
use crate::query::builder::{EntityType, MetricQuery, Scope, UserRole};
use crate::query::period::{resolve, ComparisonMode, DateRange, RequestedRange, ResolvedPeriod};

/// One named metric on a dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricSpec {
    /// Key in the payload, camelCase.
    pub name: &'static str,
    pub entity: EntityType,
    /// Accepted statuses; empty counts every status.
    pub statuses: &'static [&'static str],
    pub role: Option<UserRole>,
    /// Whether a day series is produced for the current window.
    pub charted: bool,
}

impl MetricSpec {
    fn query(&self, scope: &Scope, range: DateRange) -> Result<MetricQuery> {
        let mut builder = MetricQuery::builder(self.entity, scope.clone()).statuses(self.statuses);
        if let Some(role) = self.role {
            builder = builder.role(role);
        }
        builder.build(range).map_err(|e| match e {
            Error::InvalidQuery(msg) => Error::InvalidQuery(format!("{}: {msg}", self.name)),
            other => other,
        })
    }
}

pub const ADMIN_METRICS: &[MetricSpec] = &[
    MetricSpec {
        name: "jobsPublished",
        entity: EntityType::Job,
        statuses: &["published"],
        role: None,
        charted: true,
    },
    MetricSpec {
        name: "applicationsReceived",
        entity: EntityType::Application,
        statuses: &[],
        role: None,
        charted: true,
    },
    MetricSpec {
        name: "newJobSeekers",
        entity: EntityType::User,
        statuses: &[],
        role: Some(UserRole::JobSeeker),
        charted: true,
    },
    MetricSpec {
        name: "newEmployers",
        entity: EntityType::User,
        statuses: &[],
        role: Some(UserRole::Employer),
        charted: false,
    },
    MetricSpec {
        name: "certificatesIssued",
        entity: EntityType::Certificate,
        statuses: &["issued"],
        role: None,
        charted: false,
    },
];

pub const EMPLOYER_METRICS: &[MetricSpec] = &[
    MetricSpec {
        name: "jobsPublished",
        entity: EntityType::Job,
        statuses: &["published"],
        role: None,
        charted: true,
    },
    MetricSpec {
        name: "applicationsReceived",
        entity: EntityType::Application,
        statuses: &[],
        role: None,
        charted: true,
    },
    MetricSpec {
        name: "candidatesShortlisted",
        entity: EntityType::Application,
        statuses: &["shortlisted", "interview"],
        role: None,
        charted: false,
    },
    MetricSpec {
        name: "candidatesHired",
        entity: EntityType::Application,
        statuses: &["hired"],
        role: None,
        charted: false,
    },
];

pub const JOB_SEEKER_METRICS: &[MetricSpec] = &[
    MetricSpec {
        name: "applicationsSubmitted",
        entity: EntityType::Application,
        statuses: &[],
        role: None,
        charted: true,
    },
    MetricSpec {
        name: "interviewsScheduled",
        entity: EntityType::Application,
        statuses: &["interview"],
        role: None,
        charted: false,
    },
    MetricSpec {
        name: "offersReceived",
        entity: EntityType::Application,
        statuses: &["hired"],
        role: None,
        charted: false,
    },
    MetricSpec {
        name: "certificatesEarned",
        entity: EntityType::Certificate,
        statuses: &["issued"],
        role: None,
        charted: false,
    },
];

/// The dashboard a request is for, with the tenant already resolved by
/// the caller's session layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsightRole {
    Admin,
    Employer { company_id: String },
    JobSeeker { candidate_id: String },
}

impl InsightRole {
    pub fn scope(&self) -> Scope {
        match self {
            InsightRole::Admin => Scope::Global,
            InsightRole::Employer { company_id } => Scope::Company(company_id.clone()),
            InsightRole::JobSeeker { candidate_id } => Scope::Candidate(candidate_id.clone()),
        }
    }

    pub fn metrics(&self) -> &'static [MetricSpec] {
        match self {
            InsightRole::Admin => ADMIN_METRICS,
            InsightRole::Employer { .. } => EMPLOYER_METRICS,
            InsightRole::JobSeeker { .. } => JOB_SEEKER_METRICS,
        }
    }
}

impl fmt::Display for InsightRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InsightRole::Admin => f.write_str("admin"),
            InsightRole::Employer { company_id } => write!(f, "employer:{company_id}"),
            InsightRole::JobSeeker { candidate_id } => write!(f, "job_seeker:{candidate_id}"),
        }
    }
}

/// Scope plus metric set: everything that differs between dashboards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsightProfile {
    pub scope: Scope,
    pub metrics: Vec<MetricSpec>,
}

impl InsightProfile {
    pub fn for_role(role: &InsightRole) -> Self {
        Self {
            scope: role.scope(),
            metrics: role.metrics().to_vec(),
        }
    }
}

/// Response body of an insights endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InsightPayload {
    pub period: ResolvedPeriod,
    pub metrics: BTreeMap<String, MetricChange>,
    pub series: BTreeMap<String, Vec<ChartPoint>>,
}

struct MetricPlan {
    name: &'static str,
    current: MetricQuery,
    previous: MetricQuery,
    charted: bool,
}

/// Build the payload for one request.
///
/// Input errors surface before any read. Every count and series is then
/// read concurrently; the first failed or timed-out read aborts the rest
/// and the request fails with [`Error::UpstreamUnavailable`].
///
/// A charted metric's current count is the sum of its series, so the two
/// always agree; only uncharted metrics issue a separate current count.
pub async fn compose(
    provider: &dyn DatasetProvider,
    profile: &InsightProfile,
    requested: &RequestedRange,
    mode: ComparisonMode,
    config: &InsightConfig,
) -> Result<InsightPayload> {
    let period = resolve(requested, mode)?;
    let days = period.current.day_count();
    if days > i64::from(config.max_range_days) {
        return Err(Error::InvalidRange(format!(
            "{} spans {days} days, more than the {} allowed",
            period.current, config.max_range_days
        )));
    }
    let plans = plan(profile, &period)?;
    let started = Instant::now();

    let count_queries: Vec<MetricQuery> = plans
        .iter()
        .flat_map(|plan| {
            let current = (!plan.charted).then(|| plan.current.clone());
            current.into_iter().chain([plan.previous.clone()])
        })
        .collect();

    let query_timeout = config.query_timeout;
    let strategy = config.bucket_strategy;
    let series = try_join_all(plans.iter().filter(|plan| plan.charted).map(|plan| {
        bucketize(provider, &plan.current, &period.current, strategy, query_timeout)
    }));
    let fan_out = async {
        futures::try_join!(collect(provider, &count_queries, query_timeout), series)
    };

    let (counts, series) = match tokio::time::timeout(config.aggregate_timeout, fan_out).await {
        Ok(results) => results?,
        Err(_) => {
            log::error!(
                "Insights for {} timed out after {:?}",
                profile.scope,
                config.aggregate_timeout
            );
            return Err(Error::UpstreamUnavailable);
        }
    };

    let mut payload = InsightPayload {
        period,
        metrics: BTreeMap::new(),
        series: BTreeMap::new(),
    };
    let mut counts = counts.into_iter().map(|r| r.count);
    let mut series = series.into_iter();
    for plan in &plans {
        let (current, points) = if plan.charted {
            let points = series.next().ok_or(Error::UpstreamUnavailable)?;
            (points.iter().map(|p| p.count).sum::<u64>(), Some(points))
        } else {
            (counts.next().ok_or(Error::UpstreamUnavailable)?, None)
        };
        let previous = counts.next().ok_or(Error::UpstreamUnavailable)?;
        payload
            .metrics
            .insert(plan.name.to_string(), MetricChange::new(current, previous));
        if let Some(points) = points {
            payload.series.insert(plan.name.to_string(), points);
        }
    }

    log::info!(
        "Composed {} metrics for {} ({}, {mode}) from {} reads in {:?}",
        payload.metrics.len(),
        profile.scope,
        period.current,
        count_queries.len() + payload.series.len(),
        started.elapsed()
    );
    Ok(payload)
}

fn plan(profile: &InsightProfile, period: &ResolvedPeriod) -> Result<Vec<MetricPlan>> {
    let mut seen = HashSet::new();
    profile
        .metrics
        .iter()
        .map(|spec| {
            if !seen.insert(spec.name) {
                return Err(Error::InvalidQuery(format!(
                    "metric '{}' is listed twice",
                    spec.name
                )));
            }
            let current = spec.query(&profile.scope, period.current)?;
            let previous = current.with_range(period.previous);
            Ok(MetricPlan {
                name: spec.name,
                current,
                previous,
                charted: spec.charted,
            })
        })
        .collect()
}
