//! Reviewer and flashcard queries.

use std::collections::HashMap;

use chrono::NaiveDateTime;
use derive_setters::Setters;
use diesel::prelude::*;
use diesel::sqlite::Sqlite;
use tracing::{debug, info, instrument};

use super::{StudyRepository, like_pattern};
use crate::db::{
    DbError, Flashcard, FlashcardInput, NewFlashcard, NewReviewer, Reviewer, ReviewerChanges,
    schema,
};

/// Criteria for listing reviewers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Setters)]
#[setters(prefix = "with_", strip_option)]
pub struct ReviewerFilter {
    /// Only reviewers in this subject.
    pub subject_id: Option<i32>,
    /// Only reviewers by this author.
    pub author_id: Option<i32>,
    /// Substring matched against title and excerpt.
    pub query: Option<String>,
    /// Include reviewers hidden by moderation.
    #[setters(skip)]
    pub include_hidden: bool,
}

impl ReviewerFilter {
    /// Returns the filter with hidden reviewers included or excluded.
    pub fn including_hidden(mut self, include: bool) -> Self {
        self.include_hidden = include;
        self
    }

    fn boxed(&self) -> schema::reviewers::BoxedQuery<'static, Sqlite> {
        use crate::db::schema::reviewers::dsl;

        let mut query = dsl::reviewers.into_boxed();
        if let Some(subject_id) = self.subject_id {
            query = query.filter(dsl::subject_id.eq(subject_id));
        }
        if let Some(author_id) = self.author_id {
            query = query.filter(dsl::author_id.eq(author_id));
        }
        if let Some(needle) = self.query.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
            let pattern = like_pattern(needle);
            query = query.filter(
                dsl::title
                    .like(pattern.clone())
                    .escape('\\')
                    .or(dsl::excerpt.like(pattern).escape('\\')),
            );
        }
        if !self.include_hidden {
            query = query.filter(dsl::hidden.eq(false));
        }
        query
    }
}

fn new_flashcards(reviewer_id: i32, cards: Vec<FlashcardInput>) -> Vec<NewFlashcard> {
    cards
        .into_iter()
        .enumerate()
        .map(|(position, card)| NewFlashcard::new(reviewer_id, position as i32, card.front, card.back))
        .collect()
}

fn load_flashcards(conn: &mut SqliteConnection, reviewer_id: i32) -> Result<Vec<Flashcard>, DbError> {
    let cards = schema::flashcards::table
        .filter(schema::flashcards::reviewer_id.eq(reviewer_id))
        .order(schema::flashcards::position.asc())
        .select(Flashcard::as_select())
        .load(conn)?;
    Ok(cards)
}

impl StudyRepository {
    /// Creates a reviewer and its flashcards in one transaction.
    ///
    /// # Errors
    ///
    /// Returns a conflict [`DbError`] if the subject or author does not exist.
    #[instrument(skip(self, reviewer, cards), fields(author_id = reviewer.author_id(), cards = cards.len()))]
    pub fn create_reviewer(
        &self,
        reviewer: NewReviewer,
        cards: Vec<FlashcardInput>,
    ) -> Result<(Reviewer, Vec<Flashcard>), DbError> {
        let mut conn = self.connection()?;
        let (created, flashcards) = conn.transaction::<_, DbError, _>(|conn| {
            let created = diesel::insert_into(schema::reviewers::table)
                .values(&reviewer)
                .returning(Reviewer::as_returning())
                .get_result(conn)?;

            let rows = new_flashcards(*created.id(), cards);
            if !rows.is_empty() {
                diesel::insert_into(schema::flashcards::table)
                    .values(&rows)
                    .execute(conn)?;
            }
            let flashcards = load_flashcards(conn, *created.id())?;
            Ok((created, flashcards))
        })?;

        info!(reviewer_id = created.id(), cards = flashcards.len(), "Reviewer created");
        Ok((created, flashcards))
    }

    /// Gets a reviewer by id.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self))]
    pub fn get_reviewer(&self, reviewer_id: i32) -> Result<Option<Reviewer>, DbError> {
        let mut conn = self.connection()?;
        let reviewer = schema::reviewers::table
            .find(reviewer_id)
            .select(Reviewer::as_select())
            .first(&mut conn)
            .optional()?;
        Ok(reviewer)
    }

    /// Lists reviewers matching `filter`, newest first. Returns the page and
    /// the total number of matches.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self))]
    pub fn list_reviewers(
        &self,
        filter: &ReviewerFilter,
        offset: i64,
        limit: i64,
    ) -> Result<(Vec<Reviewer>, i64), DbError> {
        use crate::db::schema::reviewers::dsl;
        let mut conn = self.connection()?;

        let total: i64 = filter.boxed().count().get_result(&mut conn)?;
        let reviewers = filter
            .boxed()
            .order((dsl::created_at.desc(), dsl::id.desc()))
            .offset(offset)
            .limit(limit)
            .select(Reviewer::as_select())
            .load(&mut conn)?;

        info!(total, count = reviewers.len(), "Reviewers loaded");
        Ok((reviewers, total))
    }

    /// Flashcards of a reviewer in display order.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self))]
    pub fn flashcards_for(&self, reviewer_id: i32) -> Result<Vec<Flashcard>, DbError> {
        let mut conn = self.connection()?;
        load_flashcards(&mut conn, reviewer_id)
    }

    /// Number of flashcards per reviewer for the given reviewer ids.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self, reviewer_ids), fields(count = reviewer_ids.len()))]
    pub fn flashcard_counts(&self, reviewer_ids: &[i32]) -> Result<HashMap<i32, i64>, DbError> {
        if reviewer_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let mut conn = self.connection()?;
        let owners = schema::flashcards::table
            .filter(schema::flashcards::reviewer_id.eq_any(reviewer_ids))
            .select(schema::flashcards::reviewer_id)
            .load::<i32>(&mut conn)?;

        let mut counts = HashMap::new();
        for reviewer_id in owners {
            *counts.entry(reviewer_id).or_insert(0) += 1;
        }
        Ok(counts)
    }

    /// Applies field changes and, when `cards` is `Some`, replaces all flashcards.
    ///
    /// # Errors
    ///
    /// Returns a not-found [`DbError`] if the reviewer does not exist.
    #[instrument(skip(self, changes, cards))]
    pub fn update_reviewer(
        &self,
        reviewer_id: i32,
        changes: &ReviewerChanges,
        cards: Option<Vec<FlashcardInput>>,
    ) -> Result<(Reviewer, Vec<Flashcard>), DbError> {
        let mut conn = self.connection()?;
        let result = conn.transaction::<_, DbError, _>(|conn| {
            let updated = diesel::update(schema::reviewers::table.find(reviewer_id))
                .set(changes)
                .returning(Reviewer::as_returning())
                .get_result(conn)?;

            if let Some(cards) = cards {
                diesel::delete(
                    schema::flashcards::table
                        .filter(schema::flashcards::reviewer_id.eq(reviewer_id)),
                )
                .execute(conn)?;
                let rows = new_flashcards(reviewer_id, cards);
                if !rows.is_empty() {
                    diesel::insert_into(schema::flashcards::table)
                        .values(&rows)
                        .execute(conn)?;
                }
            }
            let flashcards = load_flashcards(conn, reviewer_id)?;
            Ok((updated, flashcards))
        })?;

        info!(reviewer_id, cards = result.1.len(), "Reviewer updated");
        Ok(result)
    }

    /// Deletes a reviewer (flashcards cascade). Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self))]
    pub fn delete_reviewer(&self, reviewer_id: i32) -> Result<bool, DbError> {
        let mut conn = self.connection()?;
        let rows = diesel::delete(schema::reviewers::table.find(reviewer_id)).execute(&mut conn)?;
        info!(reviewer_id, rows, "Reviewer deleted");
        Ok(rows > 0)
    }

    /// Sets the moderation `hidden` flag on a reviewer.
    ///
    /// # Errors
    ///
    /// Returns a not-found [`DbError`] if the reviewer does not exist.
    #[instrument(skip(self))]
    pub fn set_reviewer_hidden(
        &self,
        reviewer_id: i32,
        hidden: bool,
        now: NaiveDateTime,
    ) -> Result<Reviewer, DbError> {
        use crate::db::schema::reviewers::dsl;
        let mut conn = self.connection()?;
        let reviewer = diesel::update(dsl::reviewers.find(reviewer_id))
            .set((dsl::hidden.eq(hidden), dsl::updated_at.eq(now)))
            .returning(Reviewer::as_returning())
            .get_result(&mut conn)?;
        debug!(reviewer_id, hidden, "Reviewer visibility changed");
        Ok(reviewer)
    }
}
