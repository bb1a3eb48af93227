//! Background executor for session operations.
//!
//! The UI thread never waits on the store. Commands go to a dedicated thread
//! running a current-thread tokio runtime, which handles them strictly one
//! after another and answers with events the UI polls every frame.

use crate::models::{Direction, LoadInput};
use crate::session::{LoginError, SaveOutcome, Session, SessionCoordinator, SessionSnapshot};
use crate::store::TrainingStore;
use std::collections::HashSet;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Login(String),
    Resume(String),
    Navigate(Direction),
    /// Refetch plans and history for the logged-in student.
    Refresh,
    Save(Vec<LoadInput>),
    Logout,
}

impl Command {
    fn replaces_view(&self) -> bool {
        !matches!(self, Command::Save(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    LoggedIn(SessionSnapshot),
    LoginFailed(LoginError),
    ResumeFailed(LoginError),
    ViewChanged(SessionSnapshot),
    SaveFinished(SaveOutcome),
    LoggedOut,
}

impl Event {
    fn replaces_view(&self) -> bool {
        !matches!(self, Event::SaveFinished(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub ticket: u64,
    pub event: Event,
}

/// Decides which replies are still current.
///
/// Only the most recently issued view-changing request may change the view;
/// replies to older ones are dropped.
#[derive(Debug, Default)]
pub struct RequestTracker {
    next_ticket: u64,
    latest_view: u64,
    in_flight: HashSet<u64>,
}

impl RequestTracker {
    pub fn issue(&mut self, command: &Command) -> u64 {
        self.next_ticket += 1;
        let ticket = self.next_ticket;
        if command.replaces_view() {
            self.latest_view = ticket;
        }
        self.in_flight.insert(ticket);
        ticket
    }

    /// Returns `true` if the reply should be applied.
    pub fn accept(&mut self, reply: &Reply) -> bool {
        self.in_flight.remove(&reply.ticket);
        !reply.event.replaces_view() || reply.ticket >= self.latest_view
    }

    pub fn is_busy(&self) -> bool {
        !self.in_flight.is_empty()
    }
}

pub struct WorkerHandle {
    commands: mpsc::UnboundedSender<(u64, Command)>,
    replies: mpsc::UnboundedReceiver<Reply>,
    tracker: RequestTracker,
}

impl WorkerHandle {
    /// Start the worker thread. `notify` runs after every reply, typically to
    /// request a repaint.
    pub fn spawn<S, N>(coordinator: SessionCoordinator<S>, notify: N) -> std::io::Result<Self>
    where
        S: TrainingStore + Send + 'static,
        N: Fn() + Send + 'static,
    {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (reply_tx, reply_rx) = mpsc::unbounded_channel();
        std::thread::Builder::new()
            .name("session-worker".into())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(e) => {
                        log::error!("Failed to start session runtime: {e}");
                        return;
                    }
                };
                runtime.block_on(run(coordinator, command_rx, reply_tx, notify));
                log::debug!("Session worker stopped");
            })?;
        Ok(Self {
            commands: command_tx,
            replies: reply_rx,
            tracker: RequestTracker::default(),
        })
    }

    /// Queue a command. Returns `None` if the worker is gone.
    pub fn send(&mut self, command: Command) -> Option<u64> {
        let ticket = self.tracker.issue(&command);
        match self.commands.send((ticket, command)) {
            Ok(()) => Some(ticket),
            Err(_) => {
                log::error!("Session worker is not running");
                self.tracker.in_flight.remove(&ticket);
                None
            }
        }
    }

    /// Next reply that is still current, without blocking.
    pub fn try_recv(&mut self) -> Option<Reply> {
        loop {
            match self.replies.try_recv() {
                Ok(reply) if self.tracker.accept(&reply) => return Some(reply),
                Ok(reply) => log::debug!("Dropping superseded reply {}", reply.ticket),
                Err(TryRecvError::Empty) => return None,
                Err(TryRecvError::Disconnected) => {
                    self.tracker.in_flight.clear();
                    return None;
                }
            }
        }
    }

    pub fn is_busy(&self) -> bool {
        self.tracker.is_busy()
    }

    #[cfg(test)]
    fn recv_blocking(&mut self) -> Option<Reply> {
        while let Some(reply) = self.replies.blocking_recv() {
            if self.tracker.accept(&reply) {
                return Some(reply);
            }
        }
        None
    }
}

async fn run<S, N>(
    coordinator: SessionCoordinator<S>,
    mut commands: mpsc::UnboundedReceiver<(u64, Command)>,
    replies: mpsc::UnboundedSender<Reply>,
    notify: N,
) where
    S: TrainingStore,
    N: Fn(),
{
    let mut session: Option<Session> = None;
    while let Some((ticket, command)) = commands.recv().await {
        let event = handle(&coordinator, &mut session, command).await;
        if replies.send(Reply { ticket, event }).is_err() {
            break;
        }
        notify();
    }
}

async fn handle<S: TrainingStore>(
    coordinator: &SessionCoordinator<S>,
    session: &mut Option<Session>,
    command: Command,
) -> Event {
    match command {
        Command::Login(credential) => match coordinator.authenticate(&credential).await {
            Ok(student) => {
                let loaded = coordinator.load_for_student(student).await;
                let snapshot = loaded.snapshot();
                *session = Some(loaded);
                Event::LoggedIn(snapshot)
            }
            Err(e) => {
                *session = None;
                Event::LoginFailed(e)
            }
        },
        Command::Resume(student_id) => match coordinator.resume(&student_id).await {
            Ok(student) => {
                let loaded = coordinator.load_for_student(student).await;
                let snapshot = loaded.snapshot();
                *session = Some(loaded);
                Event::LoggedIn(snapshot)
            }
            Err(e) => {
                *session = None;
                Event::ResumeFailed(e)
            }
        },
        Command::Navigate(direction) => match session.as_mut() {
            Some(active) => {
                coordinator.navigate(active, direction).await;
                Event::ViewChanged(active.snapshot())
            }
            None => Event::LoggedOut,
        },
        Command::Refresh => match session.take() {
            Some(active) => {
                let reloaded = coordinator.load_for_student(active.student().clone()).await;
                let snapshot = reloaded.snapshot();
                *session = Some(reloaded);
                Event::ViewChanged(snapshot)
            }
            None => Event::LoggedOut,
        },
        Command::Save(inputs) => match session.as_ref() {
            Some(active) => Event::SaveFinished(coordinator.save_loads(active, &inputs).await),
            None => Event::SaveFinished(SaveOutcome::Failed("No active session".into())),
        },
        Command::Logout => {
            *session = None;
            Event::LoggedOut
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::PlanView;
    use crate::session::tests::{FakeStore, two_plan_store};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn plan_id(event: &Event) -> Option<String> {
        match event {
            Event::LoggedIn(s) | Event::ViewChanged(s) => match &s.view {
                PlanView::Plan(vm) => Some(vm.plan.id.clone()),
                PlanView::Empty => None,
            },
            _ => None,
        }
    }

    fn spawn(store: FakeStore) -> (WorkerHandle, Arc<AtomicUsize>) {
        let repaints = Arc::new(AtomicUsize::new(0));
        let counter = repaints.clone();
        let coordinator = SessionCoordinator::new(store).with_image_lookup(|_| None);
        let handle = WorkerHandle::spawn(coordinator, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        (handle, repaints)
    }

    #[test]
    fn stale_view_replies_are_dropped() {
        let mut tracker = RequestTracker::default();
        let first = tracker.issue(&Command::Navigate(Direction::Next));
        let save = tracker.issue(&Command::Save(Vec::new()));
        let second = tracker.issue(&Command::Navigate(Direction::Previous));
        assert!(tracker.is_busy());

        let stale = Reply {
            ticket: first,
            event: Event::LoggedOut,
        };
        assert!(!tracker.accept(&stale));

        let saved = Reply {
            ticket: save,
            event: Event::SaveFinished(SaveOutcome::NothingToSave),
        };
        assert!(tracker.accept(&saved));

        let current = Reply {
            ticket: second,
            event: Event::LoggedOut,
        };
        assert!(tracker.accept(&current));
        assert!(!tracker.is_busy());
    }

    #[test]
    fn logout_supersedes_pending_login() {
        let mut tracker = RequestTracker::default();
        let login = tracker.issue(&Command::Login("ABC".into()));
        let logout = tracker.issue(&Command::Logout);
        assert!(logout > login);
        let late_login = Reply {
            ticket: login,
            event: Event::LoginFailed(LoginError::InvalidCredential),
        };
        assert!(!tracker.accept(&late_login));
    }

    #[test]
    fn worker_runs_a_session_end_to_end() {
        let (mut worker, repaints) = spawn(two_plan_store());

        worker.send(Command::Login("abc123".into())).unwrap();
        let reply = worker.recv_blocking().unwrap();
        assert_eq!(plan_id(&reply.event).as_deref(), Some("P2"));

        worker.send(Command::Navigate(Direction::Next)).unwrap();
        let reply = worker.recv_blocking().unwrap();
        assert_eq!(plan_id(&reply.event).as_deref(), Some("P1"));

        worker.send(Command::Save(vec![LoadInput::new("Squat", "abc")])).unwrap();
        let reply = worker.recv_blocking().unwrap();
        assert_eq!(reply.event, Event::SaveFinished(SaveOutcome::NothingToSave));

        worker.send(Command::Refresh).unwrap();
        let reply = worker.recv_blocking().unwrap();
        assert_eq!(plan_id(&reply.event).as_deref(), Some("P2"));

        worker.send(Command::Logout).unwrap();
        assert_eq!(worker.recv_blocking().unwrap().event, Event::LoggedOut);
        assert!(!worker.is_busy());

        worker.send(Command::Navigate(Direction::Next)).unwrap();
        assert_eq!(worker.recv_blocking().unwrap().event, Event::LoggedOut);
        assert!(repaints.load(Ordering::SeqCst) >= 5);
    }

    #[test]
    fn only_last_navigation_is_delivered() {
        let (mut worker, _) = spawn(two_plan_store());
        worker.send(Command::Login("ABC123".into())).unwrap();
        worker.recv_blocking().unwrap();

        worker.send(Command::Navigate(Direction::Next)).unwrap();
        let last = worker.send(Command::Navigate(Direction::Previous)).unwrap();
        let reply = worker.recv_blocking().unwrap();
        assert_eq!(reply.ticket, last);
        assert_eq!(plan_id(&reply.event).as_deref(), Some("P2"));
        assert!(!worker.is_busy());
    }

    #[test]
    fn bad_credential_and_failed_resume() {
        let (mut worker, _) = spawn(two_plan_store());
        worker.send(Command::Login("nope".into())).unwrap();
        assert_eq!(
            worker.recv_blocking().unwrap().event,
            Event::LoginFailed(LoginError::InvalidCredential)
        );

        worker.send(Command::Resume("missing".into())).unwrap();
        assert_eq!(
            worker.recv_blocking().unwrap().event,
            Event::ResumeFailed(LoginError::InvalidCredential)
        );

        worker.send(Command::Save(vec![LoadInput::new("Bench", "80")])).unwrap();
        assert!(matches!(
            worker.recv_blocking().unwrap().event,
            Event::SaveFinished(SaveOutcome::Failed(_))
        ));
    }
}
