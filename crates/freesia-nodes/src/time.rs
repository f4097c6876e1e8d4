use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, NaiveDateTime, Timelike, Utc, Weekday};
use chrono_tz::{OffsetComponents, Tz};
use serde_json::{Value, json};

use freesia_node::{NodeContext, NodeError, NodeHandler, NodeInputs, OutputMap};

use crate::params::{i64_param, str_param};

/// Timezone-aware time node.
///
/// Yields the current (or `base_time`) instant in the requested timezone,
/// optionally shifted (`add_time`/`subtract_time`), snapped
/// (`start_of`/`end_of`), or moved to the nearest requested weekday.
pub struct TimeHandler;

#[async_trait]
impl NodeHandler for TimeHandler {
  async fn execute(
    &self,
    _ctx: &NodeContext,
    params: &OutputMap,
    _inputs: &NodeInputs,
  ) -> Result<Value, NodeError> {
    let tz_name = str_param(params, "timezone").unwrap_or("UTC");
    let tz: Tz = tz_name
      .parse()
      .map_err(|_| NodeError::handler("parse", format!("unknown timezone '{}'", tz_name)))?;

    let base = match str_param(params, "base_time") {
      Some(s) => parse_base(s, tz)?,
      None => Utc::now().with_timezone(&tz),
    };

    let operation = str_param(params, "operation").unwrap_or("now");
    let amount = i64_param(params, "amount").unwrap_or(1);
    let unit = str_param(params, "unit").unwrap_or("day");

    let dt = match operation {
      "now" => base,
      "add_time" => shift(base, amount, unit)?,
      "subtract_time" => shift(base, -amount, unit)?,
      "start_of" => snap(base, unit, tz, SnapEdge::Start)?,
      "end_of" => snap(base, unit, tz, SnapEdge::End)?,
      "next_weekday" => step_weekday(base, weekday_param(params)?, 1),
      "previous_weekday" => step_weekday(base, weekday_param(params)?, -1),
      other => {
        return Err(NodeError::handler(
          "parse",
          format!("unknown time operation '{}'", other),
        ));
      }
    };

    let format = str_param(params, "format").unwrap_or("%Y-%m-%d %H:%M:%S");
    Ok(render(&dt, tz, format))
  }
}

fn parse_base(s: &str, tz: Tz) -> Result<DateTime<Tz>, NodeError> {
  if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
    return Ok(dt.with_timezone(&tz));
  }
  if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
    return local(naive, tz);
  }
  if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
    if let Some(naive) = date.and_hms_opt(0, 0, 0) {
      return local(naive, tz);
    }
  }
  Err(NodeError::handler(
    "parse",
    format!("unparseable base_time '{}'", s),
  ))
}

/// Interpret a naive timestamp in the run's timezone.
fn local(naive: NaiveDateTime, tz: Tz) -> Result<DateTime<Tz>, NodeError> {
  naive
    .and_local_timezone(tz)
    .earliest()
    .ok_or_else(|| NodeError::handler("parse", format!("nonexistent local time {}", naive)))
}

fn shift(dt: DateTime<Tz>, amount: i64, unit: &str) -> Result<DateTime<Tz>, NodeError> {
  let shifted = match unit {
    "second" => Some(dt + Duration::seconds(amount)),
    "minute" => Some(dt + Duration::minutes(amount)),
    "hour" => Some(dt + Duration::hours(amount)),
    "day" => Some(dt + Duration::days(amount)),
    "week" => Some(dt + Duration::weeks(amount)),
    "month" => shift_months(dt, amount),
    "year" => shift_months(dt, amount.saturating_mul(12)),
    "business_day" => Some(shift_business_days(dt, amount)),
    other => {
      return Err(NodeError::handler(
        "parse",
        format!("unknown time unit '{}'", other),
      ));
    }
  };
  shifted.ok_or_else(|| NodeError::handler("parse", "time shift out of range".to_string()))
}

fn shift_months(dt: DateTime<Tz>, amount: i64) -> Option<DateTime<Tz>> {
  if amount >= 0 {
    dt.checked_add_months(Months::new(amount as u32))
  } else {
    dt.checked_sub_months(Months::new(amount.unsigned_abs() as u32))
  }
}

/// Step one calendar day at a time, counting only weekdays.
fn shift_business_days(mut dt: DateTime<Tz>, amount: i64) -> DateTime<Tz> {
  let step = if amount >= 0 { 1 } else { -1 };
  let mut remaining = amount.abs();
  while remaining > 0 {
    dt = dt + Duration::days(step);
    if !matches!(dt.weekday(), Weekday::Sat | Weekday::Sun) {
      remaining -= 1;
    }
  }
  dt
}

#[derive(Clone, Copy)]
enum SnapEdge {
  Start,
  End,
}

fn snap(dt: DateTime<Tz>, unit: &str, tz: Tz, edge: SnapEdge) -> Result<DateTime<Tz>, NodeError> {
  let date = dt.date_naive();
  let start_date = match unit {
    "day" => Some(date),
    "week" => Some(date - Duration::days(date.weekday().num_days_from_monday() as i64)),
    "month" => date.with_day(1),
    "quarter" => date
      .with_day(1)
      .and_then(|d| d.with_month((date.month0() / 3) * 3 + 1)),
    "year" => NaiveDate::from_ymd_opt(date.year(), 1, 1),
    other => {
      return Err(NodeError::handler(
        "parse",
        format!("unknown period unit '{}'", other),
      ));
    }
  }
  .ok_or_else(|| NodeError::handler("parse", "period start out of range".to_string()))?;

  let naive = match edge {
    SnapEdge::Start => start_date.and_hms_opt(0, 0, 0),
    SnapEdge::End => {
      let end_date = match unit {
        "day" => Some(start_date),
        "week" => Some(start_date + Duration::days(6)),
        "month" => start_date.checked_add_months(Months::new(1)).and_then(|d| d.pred_opt()),
        "quarter" => start_date.checked_add_months(Months::new(3)).and_then(|d| d.pred_opt()),
        _ => NaiveDate::from_ymd_opt(date.year(), 12, 31),
      };
      end_date.and_then(|d| d.and_hms_opt(23, 59, 59))
    }
  }
  .ok_or_else(|| NodeError::handler("parse", "period edge out of range".to_string()))?;

  local(naive, tz)
}

fn weekday_param(params: &OutputMap) -> Result<Weekday, NodeError> {
  let name = str_param(params, "weekday").ok_or_else(|| {
    NodeError::handler("parse", "weekday operation requires 'weekday'".to_string())
  })?;
  name
    .parse()
    .map_err(|_| NodeError::handler("parse", format!("unknown weekday '{}'", name)))
}

fn step_weekday(dt: DateTime<Tz>, target: Weekday, direction: i64) -> DateTime<Tz> {
  let mut candidate = dt;
  loop {
    candidate = candidate + Duration::days(direction);
    if candidate.weekday() == target {
      return candidate;
    }
  }
}

fn render(dt: &DateTime<Tz>, tz: Tz, format: &str) -> Value {
  let iso = dt.to_rfc3339();
  let is_dst = dt.offset().dst_offset() > Duration::zero();

  json!({
    "output": iso.clone(),
    "iso": iso,
    "timestamp": dt.timestamp(),
    "year": dt.year(),
    "month": dt.month(),
    "day": dt.day(),
    "hour": dt.hour(),
    "minute": dt.minute(),
    "second": dt.second(),
    "timezone": tz.name(),
    "day_of_week": dt.format("%A").to_string(),
    "month_name": dt.format("%B").to_string(),
    "utc_offset": dt.format("%:z").to_string(),
    "is_dst": is_dst,
    "custom_formatted": dt.format(format).to_string(),
  })
}
