/// Hot-reload course registry using ArcSwap
///
/// Public catalog reads (course list, course detail, title resolution for
/// free-text enquiries) are served from an in-memory snapshot. Each admin
/// mutation reloads the affected course from storage and swaps the whole
/// map pointer, so readers never block.

use crate::catalog::{
    storage::CourseStorage,
    types::{Course, CourseInput},
};
use crate::error::{AppError, AppResult};
use arc_swap::ArcSwap;
use std::{collections::HashMap, sync::Arc};

#[derive(Debug)]
pub struct CatalogRegistry {
    /// Key: course_id
    courses: ArcSwap<HashMap<String, Course>>,
    storage: CourseStorage,
}

impl CatalogRegistry {
    pub fn new(storage: CourseStorage) -> Self {
        Self {
            courses: ArcSwap::new(Arc::new(HashMap::new())),
            storage,
        }
    }

    /// Populate the snapshot from storage (startup)
    pub async fn init_from_storage(&self) -> AppResult<()> {
        let courses = self.storage.load_all_courses().await?;
        self.courses.store(Arc::new(courses));

        tracing::info!("📚 Initialized course catalog with {} courses", self.courses.load().len());
        Ok(())
    }

    /// Re-read one course from storage and swap it into the snapshot
    async fn reload_course(&self, course_id: &str) -> AppResult<Course> {
        let course = self
            .storage
            .get_course(course_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Course".to_string()))?;

        // Retries when another mutation swapped first
        self.courses.rcu(|current| {
            let mut next = (**current).clone();
            next.insert(course_id.to_string(), course.clone());
            next
        });

        tracing::debug!("🔄 Reloaded course into catalog: {}", course_id);
        Ok(course)
    }

    fn evict(&self, course_id: &str) {
        if !self.courses.load().contains_key(course_id) {
            return;
        }
        self.courses.rcu(|current| {
            let mut next = (**current).clone();
            next.remove(course_id);
            next
        });
    }

    pub async fn create_course(&self, input: CourseInput) -> AppResult<Course> {
        let input = input.normalized()?;
        let created = self.storage.create_course(&input).await?;
        let course = self.reload_course(&created.id).await?;
        tracing::info!("📘 Created course: {} ({})", course.id, course.title);
        Ok(course)
    }

    pub async fn update_course(&self, course_id: &str, input: CourseInput) -> AppResult<Course> {
        let input = input.normalized()?;
        if self.storage.update_course(course_id, &input).await?.is_none() {
            return Err(AppError::NotFound("Course".to_string()));
        }
        let course = self.reload_course(course_id).await?;
        tracing::info!("📘 Updated course: {} ({})", course.id, course.title);
        Ok(course)
    }

    /// Delete a course that nothing references yet
    pub async fn delete_course(&self, course_id: &str) -> AppResult<()> {
        if self.storage.count_references(course_id).await? > 0 {
            return Err(AppError::Conflict(
                "Course has enquiries or enrollments and cannot be deleted".to_string(),
            ));
        }
        if !self.storage.delete_course(course_id).await? {
            return Err(AppError::NotFound("Course".to_string()));
        }
        self.evict(course_id);
        tracing::info!("🗑️ Deleted course: {}", course_id);
        Ok(())
    }

    /// Lock-free lookup by id
    pub fn get_course(&self, course_id: &str) -> Option<Course> {
        self.courses.load().get(course_id).cloned()
    }

    /// All courses, newest first
    pub fn list_courses(&self) -> Vec<Course> {
        let mut courses: Vec<Course> = self.courses.load().values().cloned().collect();
        courses.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.title.cmp(&b.title)));
        courses
    }

    /// Case-insensitive exact title match
    pub fn find_by_title(&self, title: &str) -> Option<Course> {
        let wanted = title.trim().to_lowercase();
        if wanted.is_empty() {
            return None;
        }
        self.courses
            .load()
            .values()
            .find(|course| course.title.to_lowercase() == wanted)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.courses.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.courses.load().is_empty()
    }
}
