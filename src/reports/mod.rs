/// Admin reporting
///
/// Read-only aggregates over courses, users, enquiries and enrollments.
/// Month windows are half-open `[start, next month)` ranges compared as
/// stored timestamp text.

use crate::{
    accounts::User,
    database::encode_ts,
    error::{AppError, AppResult},
};
use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use serde::Serialize;
use sqlx::{sqlite::SqlitePool, Row};

const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub totals: Totals,
    pub current_month: PeriodTotals,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Totals {
    pub courses: i64,
    pub students: i64,
    pub enrollments: i64,
    pub pending_enquiries: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodTotals {
    pub enrollments: i64,
    pub revenue: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Period {
    pub month: u32,
    pub year: i32,
    pub month_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlySummary {
    pub total_enrollments: i64,
    pub total_revenue: i64,
    pub unique_students: i64,
    pub average_revenue_per_enrollment: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseStat {
    pub course_id: String,
    pub title: String,
    pub enrollments: i64,
    pub total_revenue: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyReport {
    pub period: Period,
    pub summary: MonthlySummary,
    pub course_stats: Vec<CourseStat>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthStat {
    pub month: u32,
    pub enrollments: i64,
    pub revenue: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearlyOverview {
    pub year: i32,
    pub totals: PeriodTotals,
    pub monthly_stats: Vec<MonthStat>,
}

/// `[start of month, start of next month)` as stored timestamp text
fn month_window(year: i32, month: u32) -> AppResult<(String, String)> {
    if !(1..=12).contains(&month) {
        return Err(AppError::Validation("Month must be between 1 and 12".to_string()));
    }
    let start = month_start(year, month)?;
    let end = if month == 12 { month_start(year + 1, 1)? } else { month_start(year, month + 1)? };
    Ok((encode_ts(&start), encode_ts(&end)))
}

fn year_window(year: i32) -> AppResult<(String, String)> {
    Ok((encode_ts(&month_start(year, 1)?), encode_ts(&month_start(year + 1, 1)?)))
}

fn month_start(year: i32, month: u32) -> AppResult<DateTime<Utc>> {
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
        .ok_or_else(|| AppError::Validation(format!("Invalid period {year}-{month}")))
}

fn require_admin(actor: &User) -> AppResult<()> {
    if actor.is_admin() {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!("user {} requested an admin report", actor.id)))
    }
}

#[derive(Debug, Clone)]
pub struct ReportService {
    pool: SqlitePool,
}

impl ReportService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn dashboard_stats(&self, actor: &User, now: DateTime<Utc>) -> AppResult<DashboardStats> {
        require_admin(actor)?;

        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM courses) AS courses,
                (SELECT COUNT(*) FROM users WHERE role = 'user') AS students,
                (SELECT COUNT(*) FROM enrollments) AS enrollments,
                (SELECT COUNT(*) FROM enquiries WHERE status IN ('new', 'contacted')) AS pending
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        let (start, end) = month_window(now.year(), now.month())?;
        let current_month = self.period_totals(&start, &end).await?;

        Ok(DashboardStats {
            totals: Totals {
                courses: row.try_get("courses")?,
                students: row.try_get("students")?,
                enrollments: row.try_get("enrollments")?,
                pending_enquiries: row.try_get("pending")?,
            },
            current_month,
        })
    }

    pub async fn monthly_enrollment(&self, actor: &User, year: i32, month: u32) -> AppResult<MonthlyReport> {
        require_admin(actor)?;
        let (start, end) = month_window(year, month)?;

        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS total, COALESCE(SUM(amount_paid), 0) AS revenue,
                   COUNT(DISTINCT user_id) AS students
            FROM enrollments
            WHERE created_at >= ? AND created_at < ?
            "#,
        )
        .bind(&start)
        .bind(&end)
        .fetch_one(&self.pool)
        .await?;
        let total: i64 = row.try_get("total")?;
        let revenue: i64 = row.try_get("revenue")?;

        let course_rows = sqlx::query(
            r#"
            SELECT e.course_id AS course_id, COALESCE(c.title, '') AS title,
                   COUNT(*) AS enrollments, COALESCE(SUM(e.amount_paid), 0) AS revenue
            FROM enrollments e
            LEFT JOIN courses c ON c.id = e.course_id
            WHERE e.created_at >= ? AND e.created_at < ?
            GROUP BY e.course_id
            ORDER BY enrollments DESC, revenue DESC, title
            "#,
        )
        .bind(&start)
        .bind(&end)
        .fetch_all(&self.pool)
        .await?;

        let course_stats = course_rows
            .iter()
            .map(|row| {
                Ok(CourseStat {
                    course_id: row.try_get("course_id")?,
                    title: row.try_get("title")?,
                    enrollments: row.try_get("enrollments")?,
                    total_revenue: row.try_get("revenue")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()?;

        let average = if total > 0 {
            (revenue as f64 / total as f64 * 100.0).round() / 100.0
        } else {
            0.0
        };

        Ok(MonthlyReport {
            period: Period {
                month,
                year,
                month_name: MONTH_NAMES[(month - 1) as usize].to_string(),
            },
            summary: MonthlySummary {
                total_enrollments: total,
                total_revenue: revenue,
                unique_students: row.try_get("students")?,
                average_revenue_per_enrollment: average,
            },
            course_stats,
        })
    }

    /// Per-month totals for one year; months without enrollments are omitted
    pub async fn yearly_overview(&self, actor: &User, year: i32) -> AppResult<YearlyOverview> {
        require_admin(actor)?;
        let (start, end) = year_window(year)?;

        let rows = sqlx::query(
            r#"
            SELECT CAST(substr(created_at, 6, 2) AS INTEGER) AS month,
                   COUNT(*) AS enrollments, COALESCE(SUM(amount_paid), 0) AS revenue
            FROM enrollments
            WHERE created_at >= ? AND created_at < ?
            GROUP BY month
            ORDER BY month
            "#,
        )
        .bind(&start)
        .bind(&end)
        .fetch_all(&self.pool)
        .await?;

        let monthly_stats = rows
            .iter()
            .map(|row| {
                let month: i64 = row.try_get("month")?;
                Ok(MonthStat {
                    month: month as u32,
                    enrollments: row.try_get("enrollments")?,
                    revenue: row.try_get("revenue")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()?;

        let totals = PeriodTotals {
            enrollments: monthly_stats.iter().map(|m| m.enrollments).sum(),
            revenue: monthly_stats.iter().map(|m| m.revenue).sum(),
        };

        Ok(YearlyOverview { year, totals, monthly_stats })
    }

    async fn period_totals(&self, start: &str, end: &str) -> AppResult<PeriodTotals> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS total, COALESCE(SUM(amount_paid), 0) AS revenue \
             FROM enrollments WHERE created_at >= ? AND created_at < ?",
        )
        .bind(start)
        .bind(end)
        .fetch_one(&self.pool)
        .await?;

        Ok(PeriodTotals {
            enrollments: row.try_get("total")?,
            revenue: row.try_get("revenue")?,
        })
    }
}
