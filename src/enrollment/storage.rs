/// SQLite persistence for enquiries and enrollments
///
/// Every status write is a compare-and-swap on the status (and token) the
/// caller read, so concurrent admins or concurrent redemptions cannot both
/// win. Redemption's claim runs as the first statement of its transaction
/// so the write lock is taken before anything else is read.

use crate::{
    database::{decode_ts, encode_ts},
    enrollment::types::{Enquiry, EnquiryStatus, Enrollment, PaymentMethod},
    error::{AppError, AppResult},
};
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqlitePool, SqliteRow},
    Row, SqliteConnection,
};

const ENQUIRY_COLUMNS: &str = "id, name, email, phone, course_id, course_title, message, status, \
     admin_notes, payment_token, payment_token_expires_at, created_at, updated_at";

const ENROLLMENT_COLUMNS: &str =
    "id, user_id, course_id, enquiry_id, progress, payment_method, amount_paid, created_at, updated_at";

/// Conditional status write
#[derive(Debug, Clone)]
pub struct StatusWrite<'a> {
    pub enquiry_id: &'a str,
    pub expected_status: EnquiryStatus,
    /// Token the caller saw; the write fails if it changed meanwhile
    pub expected_token: Option<&'a str>,
    pub new_status: EnquiryStatus,
    pub admin_notes: Option<&'a str>,
    /// Catalog course (id, title) to link
    pub course: Option<(&'a str, &'a str)>,
    /// New token and expiry, when one is being minted
    pub new_token: Option<(&'a str, DateTime<Utc>)>,
    pub now: DateTime<Utc>,
}

/// Enquiry fields captured by a successful token claim
#[derive(Debug, Clone)]
pub struct ClaimedEnquiry {
    pub id: String,
    pub name: String,
    pub email: String,
    pub course_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct WorkflowStorage {
    pool: SqlitePool,
}

impl WorkflowStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn insert_enquiry(&self, enquiry: &Enquiry) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO enquiries (id, name, email, phone, course_id, course_title, message, status,
                                   admin_notes, payment_token, payment_token_expires_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&enquiry.id)
        .bind(&enquiry.name)
        .bind(&enquiry.email)
        .bind(&enquiry.phone)
        .bind(&enquiry.course_id)
        .bind(&enquiry.course_title)
        .bind(&enquiry.message)
        .bind(enquiry.status.as_str())
        .bind(&enquiry.admin_notes)
        .bind(&enquiry.payment_token)
        .bind(enquiry.payment_token_expires_at.as_ref().map(encode_ts))
        .bind(encode_ts(&enquiry.created_at))
        .bind(encode_ts(&enquiry.updated_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_enquiry(&self, id: &str) -> AppResult<Option<Enquiry>> {
        let row = sqlx::query(&format!("SELECT {ENQUIRY_COLUMNS} FROM enquiries WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(enquiry_from_row).transpose()?)
    }

    /// Enquiries newest first, optionally filtered by status
    pub async fn list_enquiries(&self, status: Option<EnquiryStatus>) -> AppResult<Vec<Enquiry>> {
        let rows = match status {
            Some(status) => {
                sqlx::query(&format!(
                    "SELECT {ENQUIRY_COLUMNS} FROM enquiries WHERE status = ? ORDER BY created_at DESC, id"
                ))
                .bind(status.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!("SELECT {ENQUIRY_COLUMNS} FROM enquiries ORDER BY created_at DESC, id"))
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        Ok(rows.iter().map(enquiry_from_row).collect::<Result<Vec<_>, _>>()?)
    }

    pub async fn find_by_payment_token(&self, token: &str) -> AppResult<Option<Enquiry>> {
        let row = sqlx::query(&format!("SELECT {ENQUIRY_COLUMNS} FROM enquiries WHERE payment_token = ?"))
            .bind(token)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(enquiry_from_row).transpose()?)
    }

    /// Apply a status change only if status and token are still what the caller read.
    /// Returns false when another writer got there first.
    pub async fn compare_and_set_status(&self, write: &StatusWrite<'_>) -> AppResult<bool> {
        let (new_token, new_expiry) = match write.new_token {
            Some((token, expires_at)) => (Some(token), Some(encode_ts(&expires_at))),
            None => (None, None),
        };

        let (course_id, course_title) = match write.course {
            Some((id, title)) => (Some(id), Some(title)),
            None => (None, None),
        };

        let result = sqlx::query(
            r#"
            UPDATE enquiries
            SET status = ?,
                admin_notes = COALESCE(?, admin_notes),
                course_id = COALESCE(?, course_id),
                course_title = COALESCE(?, course_title),
                payment_token = COALESCE(?, payment_token),
                payment_token_expires_at = COALESCE(?, payment_token_expires_at),
                updated_at = ?
            WHERE id = ? AND status = ? AND payment_token IS ?
            "#,
        )
        .bind(write.new_status.as_str())
        .bind(write.admin_notes)
        .bind(course_id)
        .bind(course_title)
        .bind(new_token)
        .bind(new_expiry)
        .bind(encode_ts(&write.now))
        .bind(write.enquiry_id)
        .bind(write.expected_status.as_str())
        .bind(write.expected_token)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Atomically move a redeemable enquiry to `enrolled`.
    ///
    /// This is the token invalidation: afterwards the token no longer
    /// matches a payable enquiry. None means the token is unknown, expired,
    /// already redeemed, closed, or was just claimed by someone else.
    pub async fn claim_payment_token(
        conn: &mut SqliteConnection,
        token: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Option<ClaimedEnquiry>> {
        let now = encode_ts(&now);
        let row = sqlx::query(
            r#"
            UPDATE enquiries
            SET status = 'enrolled', updated_at = ?1
            WHERE payment_token = ?2
              AND status IN ('approved', 'payment_sent')
              AND payment_token_expires_at > ?1
            RETURNING id, name, email, course_id
            "#,
        )
        .bind(&now)
        .bind(token)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| {
            // SQLITE_BUSY / SQLITE_BUSY_SNAPSHOT: another redemption holds the write lock
            let busy = matches!(&e, sqlx::Error::Database(db) if db.code().is_some_and(|code| code == "5" || code == "517"));
            if busy {
                AppError::Conflict("Payment is already being processed".to_string())
            } else {
                AppError::from(e)
            }
        })?;

        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(ClaimedEnquiry {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            email: row.try_get("email")?,
            course_id: row.try_get("course_id")?,
        }))
    }

    /// Current fee of a course, read inside the redemption transaction
    pub async fn course_fee(conn: &mut SqliteConnection, course_id: &str) -> AppResult<Option<i64>> {
        let fee = sqlx::query_scalar("SELECT fee FROM courses WHERE id = ?")
            .bind(course_id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(fee)
    }

    pub async fn insert_enrollment(conn: &mut SqliteConnection, enrollment: &Enrollment) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO enrollments (id, user_id, course_id, enquiry_id, progress, payment_method,
                                     amount_paid, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&enrollment.id)
        .bind(&enrollment.user_id)
        .bind(&enrollment.course_id)
        .bind(&enrollment.enquiry_id)
        .bind(enrollment.progress)
        .bind(enrollment.payment_method.as_str())
        .bind(enrollment.amount_paid)
        .bind(encode_ts(&enrollment.created_at))
        .bind(encode_ts(&enrollment.updated_at))
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    pub async fn get_enrollment(&self, id: &str) -> AppResult<Option<Enrollment>> {
        let row = sqlx::query(&format!("SELECT {ENROLLMENT_COLUMNS} FROM enrollments WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(enrollment_from_row).transpose()?)
    }

    /// A user's enrollments, newest first
    pub async fn list_user_enrollments(&self, user_id: &str) -> AppResult<Vec<Enrollment>> {
        let rows = sqlx::query(&format!(
            "SELECT {ENROLLMENT_COLUMNS} FROM enrollments WHERE user_id = ? ORDER BY created_at DESC, id"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(enrollment_from_row).collect::<Result<Vec<_>, _>>()?)
    }

    pub async fn count_enrollments_for_enquiry(&self, enquiry_id: &str) -> AppResult<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM enrollments WHERE enquiry_id = ?")
            .bind(enquiry_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Store new progress; false when the enrollment does not exist
    pub async fn update_progress(&self, id: &str, progress: i64, now: DateTime<Utc>) -> AppResult<bool> {
        let result = sqlx::query("UPDATE enrollments SET progress = ?, updated_at = ? WHERE id = ?")
            .bind(progress)
            .bind(encode_ts(&now))
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }
}

fn enquiry_from_row(row: &SqliteRow) -> Result<Enquiry, sqlx::Error> {
    let status: String = row.try_get("status")?;
    let expires_at: Option<String> = row.try_get("payment_token_expires_at")?;
    Ok(Enquiry {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        phone: row.try_get("phone")?,
        course_id: row.try_get("course_id")?,
        course_title: row.try_get("course_title")?,
        message: row.try_get("message")?,
        status: status.parse().map_err(|e: String| sqlx::Error::Decode(e.into()))?,
        admin_notes: row.try_get("admin_notes")?,
        payment_token: row.try_get("payment_token")?,
        payment_token_expires_at: expires_at.as_deref().map(decode_ts).transpose()?,
        created_at: decode_ts(row.try_get("created_at")?)?,
        updated_at: decode_ts(row.try_get("updated_at")?)?,
    })
}

fn enrollment_from_row(row: &SqliteRow) -> Result<Enrollment, sqlx::Error> {
    let method: String = row.try_get("payment_method")?;
    let progress: i64 = row.try_get("progress")?;
    Ok(Enrollment {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        course_id: row.try_get("course_id")?,
        enquiry_id: row.try_get("enquiry_id")?,
        progress,
        completed: progress >= 100,
        payment_method: method
            .parse::<PaymentMethod>()
            .map_err(|e| sqlx::Error::Decode(e.into()))?,
        amount_paid: row.try_get("amount_paid")?,
        created_at: decode_ts(row.try_get("created_at")?)?,
        updated_at: decode_ts(row.try_get("updated_at")?)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        catalog::{CourseInput, CourseStorage},
        database::Database,
    };
    use chrono::Duration;

    struct Fixture {
        storage: WorkflowStorage,
        course_id: String,
    }

    async fn fixture() -> Fixture {
        let db = Database::in_memory().await.unwrap();
        let course = CourseStorage::new(db.pool().clone())
            .create_course(&CourseInput { title: "Data Science".to_string(), fee: 45000, ..Default::default() })
            .await
            .unwrap();
        Fixture { storage: WorkflowStorage::new(db.pool().clone()), course_id: course.id }
    }

    fn enquiry(course_id: &str, status: EnquiryStatus, token: Option<(&str, DateTime<Utc>)>) -> Enquiry {
        let now = Utc::now();
        Enquiry {
            id: uuid::Uuid::new_v4().to_string(),
            name: "Asha".to_string(),
            email: "asha@example.com".to_string(),
            phone: String::new(),
            course_id: Some(course_id.to_string()),
            course_title: "Data Science".to_string(),
            message: String::new(),
            status,
            admin_notes: String::new(),
            payment_token: token.map(|(t, _)| t.to_string()),
            payment_token_expires_at: token.map(|(_, e)| e),
            created_at: now,
            updated_at: now,
        }
    }

    fn write<'a>(id: &'a str, from: EnquiryStatus, to: EnquiryStatus) -> StatusWrite<'a> {
        StatusWrite {
            enquiry_id: id,
            expected_status: from,
            expected_token: None,
            new_status: to,
            admin_notes: None,
            course: None,
            new_token: None,
            now: Utc::now(),
        }
    }

    #[tokio::test]
    async fn status_write_only_applies_to_the_status_read() {
        let f = fixture().await;
        let e = enquiry(&f.course_id, EnquiryStatus::New, None);
        f.storage.insert_enquiry(&e).await.unwrap();

        let first = StatusWrite { admin_notes: Some("called"), ..write(&e.id, EnquiryStatus::New, EnquiryStatus::Contacted) };
        assert!(f.storage.compare_and_set_status(&first).await.unwrap());
        // Same expectation again loses: the row is no longer `new`
        assert!(!f.storage.compare_and_set_status(&write(&e.id, EnquiryStatus::New, EnquiryStatus::Closed)).await.unwrap());

        let stored = f.storage.get_enquiry(&e.id).await.unwrap().unwrap();
        assert_eq!(stored.status, EnquiryStatus::Contacted);
        assert_eq!(stored.admin_notes, "called");
    }

    #[tokio::test]
    async fn status_write_keeps_notes_and_token_when_absent() {
        let f = fixture().await;
        let e = enquiry(&f.course_id, EnquiryStatus::New, None);
        f.storage.insert_enquiry(&e).await.unwrap();
        let expires = Utc::now() + Duration::hours(1);

        let approve = StatusWrite {
            admin_notes: Some("call back"),
            new_token: Some(("tok-1", expires)),
            ..write(&e.id, EnquiryStatus::New, EnquiryStatus::Approved)
        };
        assert!(f.storage.compare_and_set_status(&approve).await.unwrap());

        // A writer that read no token must not overwrite the one just bound
        assert!(!f.storage.compare_and_set_status(&write(&e.id, EnquiryStatus::Approved, EnquiryStatus::PaymentSent)).await.unwrap());

        let sent = StatusWrite {
            expected_token: Some("tok-1"),
            ..write(&e.id, EnquiryStatus::Approved, EnquiryStatus::PaymentSent)
        };
        assert!(f.storage.compare_and_set_status(&sent).await.unwrap());

        let stored = f.storage.get_enquiry(&e.id).await.unwrap().unwrap();
        assert_eq!(stored.status, EnquiryStatus::PaymentSent);
        assert_eq!(stored.admin_notes, "call back");
        assert_eq!(stored.payment_token.as_deref(), Some("tok-1"));
        assert_eq!(f.storage.find_by_payment_token("tok-1").await.unwrap().unwrap().id, e.id);
    }

    #[tokio::test]
    async fn token_can_be_claimed_once() {
        let f = fixture().await;
        let e = enquiry(&f.course_id, EnquiryStatus::Approved, Some(("tok-2", Utc::now() + Duration::hours(1))));
        f.storage.insert_enquiry(&e).await.unwrap();

        let mut conn = f.storage.pool().acquire().await.unwrap();
        let claimed = WorkflowStorage::claim_payment_token(&mut conn, "tok-2", Utc::now()).await.unwrap();
        assert_eq!(claimed.unwrap().id, e.id);
        assert!(WorkflowStorage::claim_payment_token(&mut conn, "tok-2", Utc::now()).await.unwrap().is_none());
        assert!(WorkflowStorage::claim_payment_token(&mut conn, "unknown", Utc::now()).await.unwrap().is_none());
        drop(conn);

        let stored = f.storage.get_enquiry(&e.id).await.unwrap().unwrap();
        assert_eq!(stored.status, EnquiryStatus::Enrolled);
    }

    #[tokio::test]
    async fn expired_token_cannot_be_claimed() {
        let f = fixture().await;
        let e = enquiry(&f.course_id, EnquiryStatus::PaymentSent, Some(("tok-3", Utc::now() - Duration::minutes(1))));
        f.storage.insert_enquiry(&e).await.unwrap();

        let mut conn = f.storage.pool().acquire().await.unwrap();
        assert!(WorkflowStorage::claim_payment_token(&mut conn, "tok-3", Utc::now()).await.unwrap().is_none());
        drop(conn);

        let stored = f.storage.get_enquiry(&e.id).await.unwrap().unwrap();
        assert_eq!(stored.status, EnquiryStatus::PaymentSent);
    }

    #[tokio::test]
    async fn one_enrollment_per_enquiry() {
        let f = fixture().await;
        let e = enquiry(&f.course_id, EnquiryStatus::Enrolled, None);
        f.storage.insert_enquiry(&e).await.unwrap();
        sqlx::query("INSERT INTO users (id, name, email, email_verified, role, created_at) VALUES ('u1', 'Asha', 'asha@example.com', 1, 'user', '2026-01-01T00:00:00.000000Z')")
            .execute(f.storage.pool())
            .await
            .unwrap();

        let now = Utc::now();
        let enrollment = |id: &str| Enrollment {
            id: id.to_string(),
            user_id: "u1".to_string(),
            course_id: f.course_id.clone(),
            enquiry_id: Some(e.id.clone()),
            progress: 0,
            completed: false,
            payment_method: PaymentMethod::Upi,
            amount_paid: 45000,
            created_at: now,
            updated_at: now,
        };

        let mut conn = f.storage.pool().acquire().await.unwrap();
        WorkflowStorage::insert_enrollment(&mut conn, &enrollment("en-1")).await.unwrap();
        assert!(WorkflowStorage::insert_enrollment(&mut conn, &enrollment("en-2")).await.is_err());
        drop(conn);

        assert_eq!(f.storage.count_enrollments_for_enquiry(&e.id).await.unwrap(), 1);
        assert!(f.storage.update_progress("en-1", 70, Utc::now()).await.unwrap());
        assert!(!f.storage.update_progress("en-404", 70, Utc::now()).await.unwrap());
        let stored = f.storage.get_enrollment("en-1").await.unwrap().unwrap();
        assert_eq!(stored.progress, 70);
        assert!(!stored.completed);
    }
}
