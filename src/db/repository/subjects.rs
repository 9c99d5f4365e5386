//! Subject queries.

use std::collections::HashMap;

use diesel::prelude::*;
use tracing::{debug, info, instrument};

use super::StudyRepository;
use crate::db::{DbError, NewSubject, Subject, schema};

impl StudyRepository {
    /// Creates a subject.
    ///
    /// # Errors
    ///
    /// Returns a conflict [`DbError`] if the name is taken (case-insensitive).
    #[instrument(skip(self, subject))]
    pub fn create_subject(&self, subject: NewSubject) -> Result<Subject, DbError> {
        let mut conn = self.connection()?;
        let created = diesel::insert_into(schema::subjects::table)
            .values(&subject)
            .returning(Subject::as_returning())
            .get_result(&mut conn)?;
        info!(subject_id = created.id(), name = %created.name(), "Subject created");
        Ok(created)
    }

    /// Gets a subject by id.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self))]
    pub fn get_subject(&self, subject_id: i32) -> Result<Option<Subject>, DbError> {
        let mut conn = self.connection()?;
        let subject = schema::subjects::table
            .find(subject_id)
            .select(Subject::as_select())
            .first(&mut conn)
            .optional()?;
        Ok(subject)
    }

    /// Lists all subjects alphabetically.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self))]
    pub fn list_subjects(&self) -> Result<Vec<Subject>, DbError> {
        let mut conn = self.connection()?;
        let subjects = schema::subjects::table
            .order(schema::subjects::name.asc())
            .select(Subject::as_select())
            .load(&mut conn)?;
        debug!(count = subjects.len(), "Subjects loaded");
        Ok(subjects)
    }

    /// Loads every subject whose id is in `ids`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self, ids), fields(count = ids.len()))]
    pub fn subjects_by_ids(&self, ids: &[i32]) -> Result<Vec<Subject>, DbError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.connection()?;
        let subjects = schema::subjects::table
            .filter(schema::subjects::id.eq_any(ids))
            .select(Subject::as_select())
            .load(&mut conn)?;
        Ok(subjects)
    }

    /// Counts non-hidden reviewers per subject.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self))]
    pub fn visible_reviewer_counts(&self) -> Result<HashMap<i32, i64>, DbError> {
        let mut conn = self.connection()?;
        let subject_ids = schema::reviewers::table
            .filter(schema::reviewers::hidden.eq(false))
            .select(schema::reviewers::subject_id)
            .load::<i32>(&mut conn)?;

        let mut counts = HashMap::new();
        for subject_id in subject_ids {
            *counts.entry(subject_id).or_insert(0) += 1;
        }
        debug!(subjects = counts.len(), "Reviewer counts computed");
        Ok(counts)
    }

    /// Deletes a subject that has no reviewers.
    ///
    /// # Errors
    ///
    /// Returns a not-found [`DbError`] if the subject does not exist, or a
    /// conflict if reviewers still reference it.
    #[instrument(skip(self))]
    pub fn delete_subject(&self, subject_id: i32) -> Result<(), DbError> {
        let mut conn = self.connection()?;
        conn.transaction::<_, DbError, _>(|conn| {
            let in_use: i64 = schema::reviewers::table
                .filter(schema::reviewers::subject_id.eq(subject_id))
                .count()
                .get_result(conn)?;
            if in_use > 0 {
                return Err(DbError::conflict(format!(
                    "Subject {} still has {} reviewer(s)",
                    subject_id, in_use
                )));
            }
            let rows = diesel::delete(schema::subjects::table.find(subject_id)).execute(conn)?;
            if rows == 0 {
                return Err(DbError::not_found(format!("Subject {} not found", subject_id)));
            }
            Ok(())
        })?;
        info!(subject_id, "Subject deleted");
        Ok(())
    }
}
