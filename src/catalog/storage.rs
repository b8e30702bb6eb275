/// SQLite persistence layer for the course catalog

use crate::{
    catalog::types::{Course, CourseInput},
    database::{decode_ts, encode_ts},
    error::{AppError, AppResult},
};
use chrono::Utc;
use sqlx::{
    sqlite::{SqlitePool, SqliteRow},
    Row,
};
use std::collections::HashMap;

const COURSE_COLUMNS: &str =
    "id, title, description, category, level, duration, fee, instructor, created_at, updated_at";

#[derive(Debug, Clone)]
pub struct CourseStorage {
    pool: SqlitePool,
}

impl CourseStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a new course with a fresh id
    pub async fn create_course(&self, input: &CourseInput) -> AppResult<Course> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = encode_ts(&Utc::now());

        sqlx::query(
            r#"
            INSERT INTO courses (id, title, description, category, level, duration, fee, instructor, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&input.title)
        .bind(&input.description)
        .bind(&input.category)
        .bind(&input.level)
        .bind(&input.duration)
        .bind(input.fee)
        .bind(&input.instructor)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        self.get_course(&id)
            .await?
            .ok_or_else(|| AppError::Internal(format!("Course {id} vanished after insert")))
    }

    /// Replace the editable fields of a course. Returns None when the id is unknown.
    pub async fn update_course(&self, id: &str, input: &CourseInput) -> AppResult<Option<Course>> {
        let result = sqlx::query(
            r#"
            UPDATE courses
            SET title = ?, description = ?, category = ?, level = ?, duration = ?,
                fee = ?, instructor = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&input.title)
        .bind(&input.description)
        .bind(&input.category)
        .bind(&input.level)
        .bind(&input.duration)
        .bind(input.fee)
        .bind(&input.instructor)
        .bind(encode_ts(&Utc::now()))
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_course(id).await
    }

    pub async fn get_course(&self, id: &str) -> AppResult<Option<Course>> {
        let row = sqlx::query(&format!("SELECT {COURSE_COLUMNS} FROM courses WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(course_from_row).transpose()?)
    }

    /// Load all courses for registry initialization
    pub async fn load_all_courses(&self) -> AppResult<HashMap<String, Course>> {
        let rows = sqlx::query(&format!("SELECT {COURSE_COLUMNS} FROM courses"))
            .fetch_all(&self.pool)
            .await?;

        let mut courses = HashMap::new();
        for row in rows {
            let course = course_from_row(&row)?;
            courses.insert(course.id.clone(), course);
        }
        Ok(courses)
    }

    /// Number of enquiries and enrollments pointing at a course
    pub async fn count_references(&self, id: &str) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT (SELECT COUNT(*) FROM enquiries WHERE course_id = ?1)
                 + (SELECT COUNT(*) FROM enrollments WHERE course_id = ?1)
            "#,
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    /// Rows that gained a reference after the caller's count still block the delete
    pub async fn delete_course(&self, id: &str) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM courses WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await;

        match result {
            Ok(done) => Ok(done.rows_affected() > 0),
            Err(sqlx::Error::Database(e)) if e.is_foreign_key_violation() => Err(AppError::Conflict(
                "Course has enquiries or enrollments and cannot be deleted".to_string(),
            )),
            Err(e) => Err(e.into()),
        }
    }
}

fn course_from_row(row: &SqliteRow) -> Result<Course, sqlx::Error> {
    Ok(Course {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        category: row.try_get("category")?,
        level: row.try_get("level")?,
        duration: row.try_get("duration")?,
        fee: row.try_get("fee")?,
        instructor: row.try_get("instructor")?,
        created_at: decode_ts(row.try_get("created_at")?)?,
        updated_at: decode_ts(row.try_get("updated_at")?)?,
    })
}
