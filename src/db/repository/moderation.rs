//! Reports, warnings, audit log, and the transactional moderation executor.

use diesel::prelude::*;
use diesel::sqlite::Sqlite;
use tracing::{debug, info, instrument, warn};

use super::StudyRepository;
use crate::db::{
    DbError, ModerationEffect, ModerationLogEntry, ModerationPlan, NewModerationLogEntry,
    NewReport, NewWarning, Report, ReportStatus, TargetKind, Warning, schema,
};

impl StudyRepository {
    /// Files a report.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self, report))]
    pub fn create_report(&self, report: NewReport) -> Result<Report, DbError> {
        let mut conn = self.connection()?;
        let stored = diesel::insert_into(schema::reports::table)
            .values(&report)
            .returning(Report::as_returning())
            .get_result(&mut conn)?;
        info!(
            report_id = stored.id(),
            target_type = %stored.target_type(),
            target_id = stored.target_id(),
            "Report filed"
        );
        Ok(stored)
    }

    /// Gets a report by id.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self))]
    pub fn get_report(&self, report_id: i32) -> Result<Option<Report>, DbError> {
        let mut conn = self.connection()?;
        let report = schema::reports::table
            .find(report_id)
            .select(Report::as_select())
            .first(&mut conn)
            .optional()?;
        Ok(report)
    }

    /// Whether `reporter_id` already has a pending report on the target.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self))]
    pub fn has_pending_report(
        &self,
        reporter_id: i32,
        target: TargetKind,
        target_id: i32,
    ) -> Result<bool, DbError> {
        use crate::db::schema::reports::dsl;
        let mut conn = self.connection()?;
        let count: i64 = dsl::reports
            .filter(dsl::reporter_id.eq(reporter_id))
            .filter(dsl::target_type.eq(target.to_db_string()))
            .filter(dsl::target_id.eq(target_id))
            .filter(dsl::status.eq(ReportStatus::Pending.to_db_string()))
            .count()
            .get_result(&mut conn)?;
        Ok(count > 0)
    }

    /// Lists reports, oldest first, optionally restricted to one status.
    /// Returns the page and the total number of matches.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self))]
    pub fn list_reports(
        &self,
        status: Option<ReportStatus>,
        offset: i64,
        limit: i64,
    ) -> Result<(Vec<Report>, i64), DbError> {
        use crate::db::schema::reports::dsl;
        let mut conn = self.connection()?;

        let filtered = || -> schema::reports::BoxedQuery<'static, Sqlite> {
            let mut query = dsl::reports.into_boxed();
            if let Some(status) = status {
                query = query.filter(dsl::status.eq(status.to_db_string()));
            }
            query
        };

        let total: i64 = filtered().count().get_result(&mut conn)?;
        let reports = filtered()
            .order(dsl::id.asc())
            .offset(offset)
            .limit(limit)
            .select(Report::as_select())
            .load(&mut conn)?;

        info!(total, count = reports.len(), "Reports loaded");
        Ok((reports, total))
    }

    /// Warnings issued to a user, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self))]
    pub fn warnings_for(&self, user_id: i32) -> Result<Vec<Warning>, DbError> {
        use crate::db::schema::warnings::dsl;
        let mut conn = self.connection()?;
        let warnings = dsl::warnings
            .filter(dsl::user_id.eq(user_id))
            .order(dsl::id.desc())
            .select(Warning::as_select())
            .load(&mut conn)?;
        Ok(warnings)
    }

    /// Most recent audit entries, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self))]
    pub fn moderation_log(&self, limit: i64) -> Result<Vec<ModerationLogEntry>, DbError> {
        use crate::db::schema::moderation_log::dsl;
        let mut conn = self.connection()?;
        let entries = dsl::moderation_log
            .order(dsl::id.desc())
            .limit(limit)
            .select(ModerationLogEntry::as_select())
            .load(&mut conn)?;
        Ok(entries)
    }

    /// Appends an audit entry outside of a report resolution (e.g. lifting a
    /// sanction or restoring content).
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self, entry))]
    pub fn record_moderation(&self, entry: NewModerationLogEntry) -> Result<(), DbError> {
        let mut conn = self.connection()?;
        diesel::insert_into(schema::moderation_log::table)
            .values(&entry)
            .execute(&mut conn)?;
        Ok(())
    }

    /// Executes a moderation plan atomically: applies the effect, closes the
    /// report (and sibling reports when requested) and writes the audit entry.
    ///
    /// # Errors
    ///
    /// Returns a conflict [`DbError`] if the report is no longer pending, or a
    /// not-found error if the target content is gone for content effects.
    #[instrument(skip(self, plan), fields(report_id = plan.report_id, action = %plan.action))]
    pub fn apply_moderation(&self, plan: &ModerationPlan) -> Result<Report, DbError> {
        let mut conn = self.connection()?;
        let report = conn.transaction::<_, DbError, _>(|conn| {
            use crate::db::schema::reports::dsl as r;

            let current_status: String = r::reports
                .find(plan.report_id)
                .select(r::status)
                .first(conn)
                .optional()?
                .ok_or_else(|| DbError::not_found(format!("Report {} not found", plan.report_id)))?;
            if current_status != ReportStatus::Pending.to_db_string() {
                return Err(DbError::conflict(format!(
                    "Report {} is already {}",
                    plan.report_id, current_status
                )));
            }

            apply_effect(conn, plan)?;

            let status = plan.report_status.to_db_string();
            let action = plan.action.to_db_string();
            let resolved = diesel::update(r::reports.find(plan.report_id))
                .set((
                    r::status.eq(status),
                    r::resolved_by.eq(Some(plan.actor_id)),
                    r::resolution_action.eq(Some(action)),
                    r::resolution_note.eq(plan.note.clone()),
                    r::resolved_at.eq(Some(plan.decided_at)),
                ))
                .returning(Report::as_returning())
                .get_result(conn)?;

            if plan.resolve_siblings {
                let siblings = diesel::update(
                    r::reports
                        .filter(r::target_type.eq(plan.target.to_db_string()))
                        .filter(r::target_id.eq(plan.target_id))
                        .filter(r::status.eq(ReportStatus::Pending.to_db_string())),
                )
                .set((
                    r::status.eq(status),
                    r::resolved_by.eq(Some(plan.actor_id)),
                    r::resolution_action.eq(Some(action)),
                    r::resolution_note.eq(plan.note.clone()),
                    r::resolved_at.eq(Some(plan.decided_at)),
                ))
                .execute(conn)?;
                debug!(siblings, "Sibling reports closed");
            }

            let entry = NewModerationLogEntry::new(
                Some(plan.report_id),
                plan.actor_id,
                action.to_string(),
                plan.target.to_db_string().to_string(),
                plan.target_id,
                Some(plan.target_user_id),
                plan.duration_hours,
                plan.note.clone(),
                plan.decided_at,
            );
            diesel::insert_into(schema::moderation_log::table)
                .values(&entry)
                .execute(conn)?;

            Ok(resolved)
        })?;

        info!(
            report_id = report.id(),
            status = %report.status(),
            "Moderation action applied"
        );
        Ok(report)
    }
}

/// Applies the state change of a plan inside an open transaction.
fn apply_effect(conn: &mut SqliteConnection, plan: &ModerationPlan) -> Result<(), DbError> {
    use crate::db::schema::users::dsl as u;

    match &plan.effect {
        ModerationEffect::None => {}
        ModerationEffect::DeleteContent => {
            let rows = match plan.target {
                TargetKind::Reviewer => {
                    diesel::delete(schema::reviewers::table.find(plan.target_id)).execute(conn)?
                }
                TargetKind::Message => {
                    diesel::delete(schema::messages::table.find(plan.target_id)).execute(conn)?
                }
            };
            if rows == 0 {
                warn!(target = %plan.target, target_id = plan.target_id, "Delete target missing");
                return Err(DbError::not_found(format!(
                    "{} {} no longer exists",
                    plan.target, plan.target_id
                )));
            }
        }
        ModerationEffect::HideContent => {
            let rows = match plan.target {
                TargetKind::Reviewer => diesel::update(schema::reviewers::table.find(plan.target_id))
                    .set(schema::reviewers::hidden.eq(true))
                    .execute(conn)?,
                TargetKind::Message => diesel::update(schema::messages::table.find(plan.target_id))
                    .set(schema::messages::hidden.eq(true))
                    .execute(conn)?,
            };
            if rows == 0 {
                warn!(target = %plan.target, target_id = plan.target_id, "Hide target missing");
                return Err(DbError::not_found(format!(
                    "{} {} no longer exists",
                    plan.target, plan.target_id
                )));
            }
        }
        ModerationEffect::Warn { note } => {
            let warning = NewWarning::new(
                plan.target_user_id,
                Some(plan.report_id),
                note.clone(),
                plan.actor_id,
                plan.decided_at,
            );
            diesel::insert_into(schema::warnings::table)
                .values(&warning)
                .execute(conn)?;
            diesel::update(u::users.find(plan.target_user_id))
                .set(u::warning_count.eq(u::warning_count + 1))
                .execute(conn)?;
        }
        ModerationEffect::Mute { until } => {
            diesel::update(u::users.find(plan.target_user_id))
                .set(u::muted_until.eq(Some(*until)))
                .execute(conn)?;
        }
        ModerationEffect::Suspend { until } => {
            diesel::update(u::users.find(plan.target_user_id))
                .set(u::suspended_until.eq(Some(*until)))
                .execute(conn)?;
        }
        ModerationEffect::Ban { until } => {
            diesel::update(u::users.find(plan.target_user_id))
                .set((u::banned.eq(true), u::banned_until.eq(*until)))
                .execute(conn)?;
            let revoked = diesel::delete(
                schema::sessions::table.filter(schema::sessions::user_id.eq(plan.target_user_id)),
            )
            .execute(conn)?;
            debug!(revoked, "Sessions revoked for banned user");
        }
    }
    Ok(())
}
