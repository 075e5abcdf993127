use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};

use crate::api::errors::not_found;
use crate::api::models::{PeriodQuery, RangeQuery, ReportList};
use crate::api::AppState;
use crate::db::gateway::{current_month, today};
use crate::errors::RestackError;
use crate::models::SessionId;

pub async fn get_report(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, RestackError> {
    match state.store.get_report(&SessionId::from_existing(id.clone())).await? {
        Some(report) => Ok(Json(report).into_response()),
        None => Ok(not_found("Report", &id)),
    }
}

fn parse_bound(raw: &str) -> Result<DateTime<Utc>, RestackError> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map(|d| d.and_time(NaiveTime::MIN).and_utc())
        .map_err(|_| RestackError::Config(format!("'{}' is neither an RFC 3339 timestamp nor a YYYY-MM-DD date", raw)))
}

pub async fn list_reports(
    State(state): State<AppState>,
    Query(range): Query<RangeQuery>,
) -> Result<Json<ReportList>, RestackError> {
    let start = parse_bound(&range.start)?;
    let end = parse_bound(&range.end)?;
    if start >= end {
        return Err(RestackError::Config("start must be before end".into()));
    }
    Ok(Json(state.store.reports_between(start, end).await?.into()))
}

pub async fn reports_for_period(
    State(state): State<AppState>,
    Path(period): Path<String>,
    Query(q): Query<PeriodQuery>,
) -> Result<Json<ReportList>, RestackError> {
    let (this_year, this_month) = current_month();
    let reports = match period.as_str() {
        "week" => state.store.reports_in_week(q.date.unwrap_or_else(today)).await?,
        "month" => {
            state
                .store
                .reports_in_month(q.year.unwrap_or(this_year), q.month.unwrap_or(this_month))
                .await?
        }
        "year" => state.store.reports_in_year(q.year.unwrap_or(this_year)).await?,
        other => return Err(RestackError::Config(format!("Unknown period '{}', expected week, month or year", other))),
    };
    Ok(Json(reports.into()))
}
