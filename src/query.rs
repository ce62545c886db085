//! Assembles [`Stats`] from stored requests and serves the read operations
//! the dashboard and query RPCs need.

use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration as ChronoDuration, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;

use crate::cache::StatsCache;
use crate::domain::{Period, Plan, Request, Stats};
use crate::storage::{StorageError, StorageEngine};
use crate::timezone::resolve_local;

/// `{dailyCost, monthlyCost, dailyPlanUsagePct, monthlyPlanUsagePct}`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UsageVariables {
    pub daily_cost: f64,
    pub monthly_cost: f64,
    pub daily_plan_usage_pct: i64,
    pub monthly_plan_usage_pct: i64,
}

pub struct QueryCore {
    storage: Arc<dyn StorageEngine>,
    cache: Arc<dyn StatsCache>,
}

impl QueryCore {
    pub fn new(storage: Arc<dyn StorageEngine>, cache: Arc<dyn StatsCache>) -> Self {
        Self { storage, cache }
    }

    /// Consults the cache first; on miss, aggregates over storage and
    /// populates the cache before returning.
    pub async fn calculate_stats(&self, period: Period) -> Result<Stats, StorageError> {
        if let Some(stats) = self.cache.get(period).await {
            return Ok(stats);
        }
        let requests = self.storage.find_by_period(period, 0, 0).await?;
        let stats = Stats::from_requests(period, &requests);
        self.cache.set(period, stats).await;
        Ok(stats)
    }

    /// Delegates straight to storage; `limit == 0` means unbounded. The
    /// dashboard-display default of 100 is the caller's concern, applied
    /// before calling in.
    pub async fn get_filtered_api_requests(
        &self,
        period: Period,
        limit: u64,
        offset: u64,
    ) -> Result<(Vec<Request>, u64), StorageError> {
        let requests = self.storage.find_by_period(period, limit, offset).await?;
        let total = self.storage.count_by_period(period).await?;
        Ok((requests, total))
    }

    /// One [`Stats`] per civil day in `timezone`, covering the last
    /// `last_n` days ending today. A day with no requests yields a zero
    /// `Stats` bound to its own `Period`.
    pub async fn list_usage_by_day(
        &self,
        last_n: u32,
        timezone: Tz,
    ) -> Result<Vec<Stats>, StorageError> {
        let today_local = Utc::now().with_timezone(&timezone).date_naive();
        let mut out = Vec::with_capacity(last_n as usize);
        for offset in (0..last_n).rev() {
            let day = today_local - ChronoDuration::days(offset as i64);
            let day_naive = NaiveDate::from_ymd_opt(day.year(), day.month(), day.day())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .expect("a date derived from an existing NaiveDate is always valid");
            let start_utc = resolve_local(timezone, day_naive);
            let end_utc = start_utc + ChronoDuration::days(1);
            let period = Period::new(start_utc, end_utc);
            out.push(self.calculate_stats(period).await?);
        }
        Ok(out)
    }

    /// `{dailyCost, monthlyCost, dailyPlanUsagePct, monthlyPlanUsagePct}`.
    /// A `Plan::unset` (or zero-budget) plan always yields 0% for both.
    pub async fn get_usage_variables(
        &self,
        plan: &Plan,
        timezone: Tz,
        now: DateTime<Utc>,
    ) -> Result<UsageVariables, StorageError> {
        let local_now = now.with_timezone(&timezone);
        let today = local_now.date_naive();

        let day_naive = NaiveDate::from_ymd_opt(today.year(), today.month(), today.day())
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .expect("a date derived from an existing NaiveDate is always valid");
        let day_start = resolve_local(timezone, day_naive);
        // Period end is exclusive; a request stamped exactly `now` must still
        // count toward today's/this month's figures.
        let period_end = now + ChronoDuration::nanoseconds(1);
        let day_period = Period::new(day_start, period_end);

        let month_start_naive = NaiveDate::from_ymd_opt(today.year(), today.month(), 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .expect("year/month from an existing civil date with day=1 are always valid");
        let month_start = resolve_local(timezone, month_start_naive);
        let month_period = Period::new(month_start, period_end);

        let daily_stats = self.calculate_stats(day_period).await?;
        let monthly_stats = self.calculate_stats(month_period).await?;

        let daily_cost = daily_stats.total_cost().amount;
        let monthly_cost = monthly_stats.total_cost().amount;

        let (daily_pct, monthly_pct) = if plan.is_unset() || plan.monthly_budget_usd <= 0.0 {
            (0, 0)
        } else {
            let days_in_month = days_in_month(today.year(), today.month());
            let daily_budget = plan.monthly_budget_usd / days_in_month as f64;
            let daily_pct = ((daily_cost / daily_budget) * 100.0) as i64;
            let monthly_pct = ((monthly_cost / plan.monthly_budget_usd) * 100.0) as i64;
            (daily_pct, monthly_pct)
        };

        Ok(UsageVariables {
            daily_cost,
            monthly_cost,
            daily_plan_usage_pct: daily_pct,
            monthly_plan_usage_pct: monthly_pct,
        })
    }
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    let first_of_next = chrono::NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .expect("month+1 in range always yields a valid date");
    let first_of_this =
        chrono::NaiveDate::from_ymd_opt(year, month, 1).expect("caller supplies a valid month");
    (first_of_next - first_of_this).num_days() as u32
}
