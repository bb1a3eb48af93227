//! Session orchestration for one authenticated student.
//!
//! The coordinator owns no session data itself. Every operation receives the
//! explicit [`Session`] value it acts on, which keeps the UI free to hold the
//! single active session wherever it likes.

use crate::image_catalog;
use crate::loads::{build_load_records, resolve_latest_loads};
use crate::models::{Direction, LoadInput, Student};
use crate::pager::PlanPager;
use crate::store::TrainingStore;
use crate::view_model::{ViewModel, build_view_model};
use chrono::{NaiveDate, Utc};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Why a login attempt did not produce a student.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoginError {
    #[error("Please enter your credential.")]
    EmptyCredential,
    #[error("Invalid credential. Check it and try again.")]
    InvalidCredential,
    #[error("Could not reach the training store: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
    Saved { count: usize },
    /// No load was filled in; the store was not called.
    NothingToSave,
    Failed(String),
}

/// What the plan screen shows.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanView {
    Plan(ViewModel),
    /// The student has no plans at all.
    Empty,
}

/// Everything the presentation layer needs about a logged-in session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub student: Student,
    pub view: PlanView,
    /// Set when part of the data could not be fetched.
    pub notice: Option<String>,
}

/// The single active session: who is logged in, which plan is shown and the
/// view last built for it.
#[derive(Debug, Clone)]
pub struct Session {
    student: Student,
    pager: PlanPager,
    view: PlanView,
    notice: Option<String>,
}

impl Session {
    pub fn student(&self) -> &Student {
        &self.student
    }

    pub fn view(&self) -> &PlanView {
        &self.view
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            student: self.student.clone(),
            view: self.view.clone(),
            notice: self.notice.clone(),
        }
    }
}

/// Session-level state as seen by the UI.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum SessionState {
    #[default]
    LoggedOut,
    Authenticating,
    LoggedIn(SessionSnapshot),
    LoginFailed(LoginError),
}

impl SessionState {
    pub fn begin_login(&mut self) {
        if matches!(self, SessionState::LoggedOut | SessionState::LoginFailed(_)) {
            *self = SessionState::Authenticating;
        }
    }

    pub fn finish_login(&mut self, result: Result<SessionSnapshot, LoginError>) {
        *self = match result {
            Ok(snapshot) => SessionState::LoggedIn(snapshot),
            Err(e) => SessionState::LoginFailed(e),
        };
    }

    /// Replace the shown session after navigation or a refresh.
    ///
    /// Ignored unless logged in.
    pub fn refresh(&mut self, snapshot: SessionSnapshot) {
        if let SessionState::LoggedIn(current) = self {
            *current = snapshot;
        }
    }

    pub fn logout(&mut self) {
        *self = SessionState::LoggedOut;
    }

    pub fn snapshot(&self) -> Option<&SessionSnapshot> {
        match self {
            SessionState::LoggedIn(s) => Some(s),
            _ => None,
        }
    }
}

/// Credentials are matched trimmed and uppercased.
pub fn normalize_credential(raw: &str) -> String {
    raw.trim().to_uppercase()
}

type ImageLookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

pub struct SessionCoordinator<S> {
    store: S,
    image_lookup: ImageLookup,
}

impl<S: TrainingStore> SessionCoordinator<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            image_lookup: Box::new(image_catalog::lookup),
        }
    }

    pub fn with_image_lookup<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.image_lookup = Box::new(lookup);
        self
    }

    pub async fn authenticate(&self, raw_credential: &str) -> Result<Student, LoginError> {
        let credential = normalize_credential(raw_credential);
        if credential.is_empty() {
            return Err(LoginError::EmptyCredential);
        }
        match self.store.find_student_by_credential(&credential).await {
            Ok(Some(student)) => {
                log::info!("Student {} authenticated", student.id);
                Ok(student)
            }
            Ok(None) => {
                log::info!("Unknown credential");
                Err(LoginError::InvalidCredential)
            }
            Err(e) => {
                log::error!("Credential lookup failed: {e}");
                Err(LoginError::Unavailable(e.to_string()))
            }
        }
    }

    /// Re-establish a persisted session without asking for the credential.
    pub async fn resume(&self, student_id: &str) -> Result<Student, LoginError> {
        match self.store.find_student_by_id(student_id).await {
            Ok(Some(student)) => Ok(student),
            Ok(None) => {
                log::warn!("Persisted student {student_id} no longer exists");
                Err(LoginError::InvalidCredential)
            }
            Err(e) => {
                log::error!("Session resume failed: {e}");
                Err(LoginError::Unavailable(e.to_string()))
            }
        }
    }

    /// Fetch the student's plans and build the view of the newest one.
    ///
    /// A failed plan fetch is logged and yields the empty state with a
    /// notice; the session stays usable.
    pub async fn load_for_student(&self, student: Student) -> Session {
        let (plans, plans_notice) = match self.store.list_plans(&student.id).await {
            Ok(plans) => {
                log::info!("Loaded {} plans for student {}", plans.len(), student.id);
                (plans, None)
            }
            Err(e) => {
                log::error!("Failed to fetch plans for student {}: {e}", student.id);
                (Vec::new(), Some(format!("Could not load your training plans: {e}")))
            }
        };
        let pager = PlanPager::new(plans);
        let (view, history_notice) = self.render_active(&student, &pager).await;
        Session {
            student,
            pager,
            view,
            notice: plans_notice.or(history_notice),
        }
    }

    /// Move to the previous or next plan and rebuild its view.
    ///
    /// Each plan may list different exercises, so its load history is fetched
    /// again. At either end of the list nothing changes.
    pub async fn navigate<'s>(&self, session: &'s mut Session, direction: Direction) -> &'s PlanView {
        let moved = match direction {
            Direction::Previous => session.pager.go_previous(),
            Direction::Next => session.pager.go_next(),
        };
        if moved {
            let (view, notice) = self.render_active(&session.student, &session.pager).await;
            session.view = view;
            session.notice = notice;
        }
        &session.view
    }

    /// Store today's loads for the session's student.
    pub async fn save_loads(&self, session: &Session, inputs: &[LoadInput]) -> SaveOutcome {
        self.save_loads_on(session, inputs, Utc::now().date_naive()).await
    }

    pub async fn save_loads_on(&self, session: &Session, inputs: &[LoadInput], day: NaiveDate) -> SaveOutcome {
        let records = build_load_records(&session.student.id, inputs, day);
        if records.is_empty() {
            return SaveOutcome::NothingToSave;
        }
        match self.store.upsert_load_entries(&records).await {
            Ok(()) => {
                log::info!("Saved {} loads for student {}", records.len(), session.student.id);
                SaveOutcome::Saved { count: records.len() }
            }
            Err(e) => {
                log::error!("Failed to save loads: {e}");
                SaveOutcome::Failed(e.to_string())
            }
        }
    }

    async fn render_active(&self, student: &Student, pager: &PlanPager) -> (PlanView, Option<String>) {
        let Some(plan) = pager.active() else {
            return (PlanView::Empty, None);
        };

        let mut seen = HashSet::new();
        let names: Vec<String> = plan
            .exercises
            .iter()
            .filter(|e| seen.insert(e.name.as_str()))
            .map(|e| e.name.clone())
            .collect();

        let mut notice = None;
        let loads = if names.is_empty() {
            HashMap::new()
        } else {
            match self.store.list_load_entries(&student.id, &names).await {
                Ok(entries) => resolve_latest_loads(&entries),
                Err(e) => {
                    log::warn!("Failed to fetch load history for plan {}: {e}", plan.id);
                    notice = Some(format!("Could not load your previous loads: {e}"));
                    HashMap::new()
                }
            }
        };

        let view = build_view_model(plan, pager.navigation(), &loads, self.image_lookup.as_ref());
        (PlanView::Plan(view), notice)
    }
}
