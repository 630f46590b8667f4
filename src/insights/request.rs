//! Request parameters as dashboard clients send them.

use chrono::{Datelike, NaiveDate};
use serde::Deserialize;

use crate::config::InsightConfig;
use crate::date_util::{day_key, parse_day};
use crate::error::{Error, Result};
use crate::provider::DatasetProvider;
use crate::query::period::{ComparisonMode, RequestedRange};

use super::{compose, InsightPayload, InsightProfile, InsightRole};

/// Query parameters of an insights endpoint.
///
/// Either `rangeStart` and `rangeEnd` or `year` and `month` select the
/// period; the explicit range wins when both are present. With neither,
/// the calendar month containing `today` is used.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsightRequest {
    pub range_start: Option<String>,
    pub range_end: Option<String>,
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub comparison_mode: Option<String>,
}

impl InsightRequest {
    /// A request for an already parsed period.
    pub fn for_range(range: RequestedRange) -> Self {
        match range {
            RequestedRange::Explicit { start, end } => Self {
                range_start: Some(day_key(start)),
                range_end: Some(day_key(end)),
                ..Self::default()
            },
            RequestedRange::Month { year, month } => Self {
                year: Some(year),
                month: Some(month),
                ..Self::default()
            },
        }
    }

    pub fn comparison_mode(&self) -> Result<ComparisonMode> {
        match self.comparison_mode.as_deref() {
            None => Ok(ComparisonMode::default()),
            Some(mode) => ComparisonMode::parse(mode),
        }
    }

    pub fn requested_range(&self, today: NaiveDate) -> Result<RequestedRange> {
        match (self.range_start.as_deref(), self.range_end.as_deref()) {
            (Some(start), Some(end)) => {
                if self.year.is_some() || self.month.is_some() {
                    log::debug!("Explicit range given; ignoring year/month");
                }
                let start = parse_day(start)
                    .ok_or_else(|| Error::InvalidRange(format!("invalid rangeStart: {start}")))?;
                let end = parse_day(end)
                    .ok_or_else(|| Error::InvalidRange(format!("invalid rangeEnd: {end}")))?;
                return RequestedRange::explicit(start, end);
            }
            (Some(_), None) => {
                return Err(Error::InvalidRange("rangeStart given without rangeEnd".into()))
            }
            (None, Some(_)) => {
                return Err(Error::InvalidRange("rangeEnd given without rangeStart".into()))
            }
            (None, None) => {}
        }

        match (self.year, self.month) {
            (Some(year), Some(month)) => RequestedRange::month(year, month),
            (None, None) => RequestedRange::month(today.year(), today.month()),
            (Some(_), None) => Err(Error::InvalidRange("year given without month".into())),
            (None, Some(_)) => Err(Error::InvalidRange("month given without year".into())),
        }
    }

    /// Validate the request. The mode is checked before the range.
    pub fn to_period(&self, today: NaiveDate) -> Result<(RequestedRange, ComparisonMode)> {
        let mode = self.comparison_mode()?;
        let range = self.requested_range(today)?;
        Ok((range, mode))
    }
}

/// Payload for `role`, reading through `provider`.
pub async fn insights_for(
    provider: &dyn DatasetProvider,
    config: &InsightConfig,
    role: &InsightRole,
    request: &InsightRequest,
    today: NaiveDate,
) -> Result<InsightPayload> {
    let tenant = match role {
        InsightRole::Admin => None,
        InsightRole::Employer { company_id } => Some(company_id),
        InsightRole::JobSeeker { candidate_id } => Some(candidate_id),
    };
    if tenant.is_some_and(|id| id.trim().is_empty()) {
        return Err(Error::InvalidQuery(format!("{role} needs a tenant id")));
    }
    let (range, mode) = request.to_period(today)?;
    log::debug!("Insights requested for {role}: {range} ({mode})");
    compose(provider, &InsightProfile::for_role(role), &range, mode, config).await
}

/// Platform-wide dashboard.
pub async fn admin_insights(
    provider: &dyn DatasetProvider,
    config: &InsightConfig,
    request: &InsightRequest,
    today: NaiveDate,
) -> Result<InsightPayload> {
    insights_for(provider, config, &InsightRole::Admin, request, today).await
}

/// Dashboard for one company. `company_id` comes from the caller's session.
pub async fn employer_insights(
    provider: &dyn DatasetProvider,
    config: &InsightConfig,
    company_id: &str,
    request: &InsightRequest,
    today: NaiveDate,
) -> Result<InsightPayload> {
    let role = InsightRole::Employer { company_id: company_id.to_string() };
    insights_for(provider, config, &role, request, today).await
}

/// Dashboard for one candidate. `candidate_id` comes from the caller's session.
pub async fn job_seeker_insights(
    provider: &dyn DatasetProvider,
    config: &InsightConfig,
    candidate_id: &str,
    request: &InsightRequest,
    today: NaiveDate,
) -> Result<InsightPayload> {
    let role = InsightRole::JobSeeker { candidate_id: candidate_id.to_string() };
    insights_for(provider, config, &role, request, today).await
}
