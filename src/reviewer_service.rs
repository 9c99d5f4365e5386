//! Subjects, reviewers and flashcards business logic.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::config::AppConfig;
use crate::content::ExcerptBuilder;
use crate::error::AppError;
use crate::pagination::{Page, PageRequest};
use crate::views::{FlashcardView, ReviewerDetail, ReviewerSummary, SubjectView};
use crate::{
    Flashcard, FlashcardInput, NewReviewer, NewSubject, Reviewer, ReviewerChanges,
    ReviewerFilter, Role, StudyRepository, User, utc_now,
};

const SUBJECT_NAME_MAX: usize = 100;
const SUBJECT_DESCRIPTION_MAX: usize = 500;
const TITLE_MAX: usize = 200;
const CONTENT_MAX: usize = 200_000;
const FLASHCARDS_MAX: usize = 200;
const FLASHCARD_SIDE_MAX: usize = 1000;

/// Fields for a new reviewer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewerDraft {
    /// Subject the reviewer belongs to.
    pub subject_id: i32,
    /// Title.
    pub title: String,
    /// Rich-text (HTML) content.
    #[serde(default)]
    pub content: String,
    /// Flashcards in display order.
    #[serde(default)]
    pub flashcards: Vec<FlashcardInput>,
}

/// Partial update of a reviewer. Absent fields stay unchanged; a present
/// `flashcards` list replaces every card.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReviewerEdit {
    /// New subject.
    #[serde(default)]
    pub subject_id: Option<i32>,
    /// New title.
    #[serde(default)]
    pub title: Option<String>,
    /// New content.
    #[serde(default)]
    pub content: Option<String>,
    /// Replacement flashcards.
    #[serde(default)]
    pub flashcards: Option<Vec<FlashcardInput>>,
}

/// Service layer for study content.
#[derive(Debug, Clone)]
pub struct ReviewerService {
    repository: StudyRepository,
    excerpts: ExcerptBuilder,
    default_per_page: i64,
    max_per_page: i64,
}

impl ReviewerService {
    /// Creates the service.
    ///
    /// # Errors
    ///
    /// Returns [`AppError`] if the excerpt patterns fail to compile.
    #[instrument(skip_all)]
    pub fn new(repository: StudyRepository, config: &AppConfig) -> Result<Self, AppError> {
        let excerpts = ExcerptBuilder::new()
            .map_err(|e| AppError::internal(format!("Excerpt patterns invalid: {}", e)))?;
        info!("Creating ReviewerService");
        Ok(Self {
            repository,
            excerpts,
            default_per_page: *config.reviewers().default_per_page(),
            max_per_page: *config.reviewers().max_per_page(),
        })
    }

    /// Normalises client paging input against the configured sizes.
    pub fn page_request(&self, page: Option<i64>, per_page: Option<i64>) -> PageRequest {
        PageRequest::resolve(page, per_page, self.default_per_page, self.max_per_page)
    }

    /// Every subject with its visible reviewer count, by name.
    ///
    /// # Errors
    ///
    /// Returns [`AppError`] on database failure.
    #[instrument(skip(self))]
    pub fn list_subjects(&self) -> Result<Vec<SubjectView>, AppError> {
        let counts = self.repository.visible_reviewer_counts()?;
        let subjects = self.repository.list_subjects()?;
        Ok(subjects
            .iter()
            .map(|s| SubjectView::new(s, counts.get(s.id()).copied().unwrap_or(0)))
            .collect())
    }

    /// One subject with its visible reviewer count.
    ///
    /// # Errors
    ///
    /// Returns not found for unknown ids.
    #[instrument(skip(self))]
    pub fn get_subject(&self, subject_id: i32) -> Result<SubjectView, AppError> {
        let subject = self
            .repository
            .get_subject(subject_id)?
            .ok_or_else(|| AppError::not_found(format!("Subject {} not found", subject_id)))?;
        let counts = self.repository.visible_reviewer_counts()?;
        Ok(SubjectView::new(
            &subject,
            counts.get(&subject_id).copied().unwrap_or(0),
        ))
    }

    /// Creates a subject.
    ///
    /// # Errors
    ///
    /// Returns forbidden for suspended users, a validation error for bad names
    /// and a conflict if the name exists (case-insensitively).
    #[instrument(skip(self, author, description), fields(author_id = author.id()))]
    pub fn create_subject(
        &self,
        author: &User,
        name: &str,
        description: Option<String>,
    ) -> Result<SubjectView, AppError> {
        ensure_can_post(author)?;
        let name = name.trim();
        let len = name.chars().count();
        if len == 0 || len > SUBJECT_NAME_MAX {
            return Err(AppError::validation(format!(
                "Subject name must be 1-{} characters",
                SUBJECT_NAME_MAX
            )));
        }
        let description = description.unwrap_or_default().trim().to_string();
        if description.chars().count() > SUBJECT_DESCRIPTION_MAX {
            return Err(AppError::validation(format!(
                "Subject description must be at most {} characters",
                SUBJECT_DESCRIPTION_MAX
            )));
        }

        let subject = self
            .repository
            .create_subject(NewSubject::new(
                name.to_string(),
                description,
                Some(*author.id()),
                utc_now(),
            ))
            .map_err(|e| match AppError::from(e) {
                AppError::Conflict { .. } => {
                    AppError::conflict(format!("Subject '{}' already exists", name))
                }
                other => other,
            })?;
        info!(subject_id = subject.id(), "Subject created");
        Ok(SubjectView::new(&subject, 0))
    }

    /// Deletes an empty subject.
    ///
    /// # Errors
    ///
    /// Returns forbidden unless the actor is an admin, and a conflict while
    /// reviewers still use the subject.
    #[instrument(skip(self, actor), fields(actor_id = actor.id()))]
    pub fn delete_subject(&self, actor: &User, subject_id: i32) -> Result<(), AppError> {
        if actor.role() != Role::Admin {
            return Err(AppError::forbidden("Only admins can delete subjects"));
        }
        self.repository.delete_subject(subject_id)?;
        Ok(())
    }

    /// Lists reviewers newest first.
    ///
    /// Hidden reviewers appear only for staff, or for authors listing their
    /// own reviewers.
    ///
    /// # Errors
    ///
    /// Returns [`AppError`] on database failure.
    #[instrument(skip(self, viewer), fields(viewer_id = viewer.map(|v| *v.id())))]
    pub fn list_reviewers(
        &self,
        filter: ReviewerFilter,
        page: PageRequest,
        viewer: Option<&User>,
    ) -> Result<Page<ReviewerSummary>, AppError> {
        let include_hidden = viewer.is_some_and(|v| {
            v.role().is_staff() || filter.author_id.is_some_and(|author| author == *v.id())
        });
        let filter = filter.including_hidden(include_hidden);
        let (reviewers, total) =
            self.repository
                .list_reviewers(&filter, page.offset(), page.per_page)?;
        let items = self.summaries(&reviewers)?;
        debug!(total, count = items.len(), "Reviewer page built");
        Ok(Page::new(items, page, total))
    }

    /// Full reviewer with flashcards.
    ///
    /// # Errors
    ///
    /// Returns not found for unknown ids and for hidden reviewers the viewer
    /// may not see.
    #[instrument(skip(self, viewer), fields(viewer_id = viewer.map(|v| *v.id())))]
    pub fn get_reviewer(
        &self,
        reviewer_id: i32,
        viewer: Option<&User>,
    ) -> Result<ReviewerDetail, AppError> {
        let reviewer = self.visible_reviewer(reviewer_id, viewer)?;
        let cards = self.repository.flashcards_for(reviewer_id)?;
        self.detail(reviewer, &cards)
    }

    /// Flashcards of a visible reviewer.
    ///
    /// # Errors
    ///
    /// Same visibility rules as [`ReviewerService::get_reviewer`].
    #[instrument(skip(self, viewer))]
    pub fn flashcards(
        &self,
        reviewer_id: i32,
        viewer: Option<&User>,
    ) -> Result<Vec<FlashcardView>, AppError> {
        self.visible_reviewer(reviewer_id, viewer)?;
        let cards = self.repository.flashcards_for(reviewer_id)?;
        Ok(cards.iter().map(FlashcardView::from).collect())
    }

    /// Publishes a reviewer.
    ///
    /// # Errors
    ///
    /// Returns forbidden for suspended users, a validation error for bad input
    /// and not found if the subject does not exist.
    #[instrument(skip(self, author, draft), fields(author_id = author.id(), subject_id = draft.subject_id))]
    pub fn create_reviewer(
        &self,
        author: &User,
        draft: ReviewerDraft,
    ) -> Result<ReviewerDetail, AppError> {
        ensure_can_post(author)?;
        let title = validate_title(&draft.title)?;
        validate_content(&draft.content)?;
        let cards = validate_flashcards(draft.flashcards)?;
        self.ensure_subject(draft.subject_id)?;

        let now = utc_now();
        let excerpt = self.excerpts.excerpt(&draft.content);
        let (reviewer, cards) = self.repository.create_reviewer(
            NewReviewer::new(
                draft.subject_id,
                *author.id(),
                title,
                draft.content,
                excerpt,
                now,
                now,
            ),
            cards,
        )?;
        info!(reviewer_id = reviewer.id(), "Reviewer published");
        self.detail(reviewer, &cards)
    }

    /// Edits a reviewer. Only the author may edit.
    ///
    /// # Errors
    ///
    /// Returns forbidden for other users and suspended authors, and a
    /// validation error for bad input.
    #[instrument(skip(self, actor, edit), fields(actor_id = actor.id()))]
    pub fn update_reviewer(
        &self,
        actor: &User,
        reviewer_id: i32,
        edit: ReviewerEdit,
    ) -> Result<ReviewerDetail, AppError> {
        let existing = self.load_reviewer(reviewer_id)?;
        if existing.author_id() != actor.id() {
            if *existing.hidden() && !actor.role().is_staff() {
                return Err(AppError::not_found(format!("Reviewer {} not found", reviewer_id)));
            }
            return Err(AppError::forbidden("Only the author can edit this reviewer"));
        }
        ensure_can_post(actor)?;

        let mut changes = ReviewerChanges {
            updated_at: Some(utc_now()),
            ..Default::default()
        };
        if let Some(subject_id) = edit.subject_id {
            self.ensure_subject(subject_id)?;
            changes.subject_id = Some(subject_id);
        }
        if let Some(title) = edit.title {
            changes.title = Some(validate_title(&title)?);
        }
        if let Some(content) = edit.content {
            validate_content(&content)?;
            changes.excerpt = Some(self.excerpts.excerpt(&content));
            changes.content = Some(content);
        }
        let cards = edit.flashcards.map(validate_flashcards).transpose()?;

        let (reviewer, cards) = self
            .repository
            .update_reviewer(reviewer_id, &changes, cards)?;
        self.detail(reviewer, &cards)
    }

    /// Deletes a reviewer. Allowed for the author and staff.
    ///
    /// # Errors
    ///
    /// Returns not found for hidden reviewers the actor may not see, and
    /// forbidden for anyone else.
    #[instrument(skip(self, actor), fields(actor_id = actor.id()))]
    pub fn delete_reviewer(&self, actor: &User, reviewer_id: i32) -> Result<(), AppError> {
        let existing = self.visible_reviewer(reviewer_id, Some(actor))?;
        let is_author = existing.author_id() == actor.id();
        if !is_author && !actor.role().is_staff() {
            return Err(AppError::forbidden("Only the author or staff can delete this reviewer"));
        }
        self.repository.delete_reviewer(reviewer_id)?;
        info!(reviewer_id, by_staff = !is_author, "Reviewer removed");
        Ok(())
    }

    fn load_reviewer(&self, reviewer_id: i32) -> Result<Reviewer, AppError> {
        self.repository
            .get_reviewer(reviewer_id)?
            .ok_or_else(|| AppError::not_found(format!("Reviewer {} not found", reviewer_id)))
    }

    fn visible_reviewer(
        &self,
        reviewer_id: i32,
        viewer: Option<&User>,
    ) -> Result<Reviewer, AppError> {
        let reviewer = self.load_reviewer(reviewer_id)?;
        let may_see = !*reviewer.hidden()
            || viewer.is_some_and(|v| v.role().is_staff() || v.id() == reviewer.author_id());
        if !may_see {
            return Err(AppError::not_found(format!("Reviewer {} not found", reviewer_id)));
        }
        Ok(reviewer)
    }

    fn ensure_subject(&self, subject_id: i32) -> Result<(), AppError> {
        if self.repository.get_subject(subject_id)?.is_none() {
            return Err(AppError::not_found(format!("Subject {} not found", subject_id)));
        }
        Ok(())
    }

    fn detail(&self, reviewer: Reviewer, cards: &[Flashcard]) -> Result<ReviewerDetail, AppError> {
        let mut summaries = self.summaries(std::slice::from_ref(&reviewer))?;
        let summary = summaries
            .pop()
            .ok_or_else(|| AppError::internal("Reviewer summary missing"))?;
        Ok(ReviewerDetail {
            summary,
            content: reviewer.content().clone(),
            flashcards: cards.iter().map(FlashcardView::from).collect(),
        })
    }

    fn summaries(&self, reviewers: &[Reviewer]) -> Result<Vec<ReviewerSummary>, AppError> {
        let ids: Vec<i32> = reviewers.iter().map(|r| *r.id()).collect();
        let subject_ids: Vec<i32> = reviewers.iter().map(|r| *r.subject_id()).collect();
        let author_ids: Vec<i32> = reviewers.iter().map(|r| *r.author_id()).collect();

        let counts = self.repository.flashcard_counts(&ids)?;
        let subjects: HashMap<i32, String> = self
            .repository
            .subjects_by_ids(&subject_ids)?
            .into_iter()
            .map(|s| (*s.id(), s.name().clone()))
            .collect();
        let authors: HashMap<i32, String> = self
            .repository
            .users_by_ids(&author_ids)?
            .into_iter()
            .map(|u| (*u.id(), u.username().clone()))
            .collect();

        Ok(reviewers
            .iter()
            .map(|r| ReviewerSummary {
                id: *r.id(),
                title: r.title().clone(),
                excerpt: r.excerpt().clone(),
                subject_id: *r.subject_id(),
                subject_name: subjects.get(r.subject_id()).cloned().unwrap_or_default(),
                author_id: *r.author_id(),
                author_username: authors.get(r.author_id()).cloned().unwrap_or_default(),
                flashcard_count: counts.get(r.id()).copied().unwrap_or(0),
                hidden: *r.hidden(),
                created_at: *r.created_at(),
                updated_at: *r.updated_at(),
            })
            .collect())
    }
}

fn ensure_can_post(user: &User) -> Result<(), AppError> {
    if user.is_suspended_at(utc_now()) {
        return Err(AppError::forbidden("Your account is suspended from posting"));
    }
    Ok(())
}

fn validate_title(raw: &str) -> Result<String, AppError> {
    let title = raw.trim();
    let len = title.chars().count();
    if len == 0 || len > TITLE_MAX {
        return Err(AppError::validation(format!(
            "Title must be 1-{} characters",
            TITLE_MAX
        )));
    }
    Ok(title.to_string())
}

fn validate_content(content: &str) -> Result<(), AppError> {
    if content.chars().count() > CONTENT_MAX {
        return Err(AppError::validation(format!(
            "Content must be at most {} characters",
            CONTENT_MAX
        )));
    }
    Ok(())
}

fn validate_flashcards(cards: Vec<FlashcardInput>) -> Result<Vec<FlashcardInput>, AppError> {
    if cards.len() > FLASHCARDS_MAX {
        return Err(AppError::validation(format!(
            "A reviewer can have at most {} flashcards",
            FLASHCARDS_MAX
        )));
    }
    cards
        .into_iter()
        .enumerate()
        .map(|(index, card)| {
            let front = card.front.trim().to_string();
            let back = card.back.trim().to_string();
            let ok = |side: &str| (1..=FLASHCARD_SIDE_MAX).contains(&side.chars().count());
            if !ok(&front) || !ok(&back) {
                return Err(AppError::validation(format!(
                    "Flashcard {} sides must be 1-{} characters",
                    index + 1,
                    FLASHCARD_SIDE_MAX
                )));
            }
            Ok(FlashcardInput::new(front, back))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn titles_are_trimmed_and_bounded() {
        assert_eq!(validate_title("  Cells  ").expect("valid"), "Cells");
        assert!(validate_title("   ").is_err());
        assert!(validate_title(&"t".repeat(TITLE_MAX + 1)).is_err());
    }

    #[test]
    fn flashcards_need_both_sides() {
        let cards = vec![FlashcardInput::new("Q".into(), " A ".into())];
        let cleaned = validate_flashcards(cards).expect("valid");
        assert_eq!(cleaned[0].back, "A");

        let blank = vec![FlashcardInput::new("Q".into(), "  ".into())];
        assert!(validate_flashcards(blank).is_err());
    }

    #[test]
    fn too_many_flashcards_rejected() {
        let cards = vec![FlashcardInput::new("q".into(), "a".into()); FLASHCARDS_MAX + 1];
        assert!(validate_flashcards(cards).is_err());
    }
}
