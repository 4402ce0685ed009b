use crate::auth;
use crate::documents::DocumentKind;
use crate::store::LocalStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum View {
    Login,
    Dashboard,
    Form(DocumentKind),
    Generating(DocumentKind),
    Preview { kind: DocumentKind, id: String },
    History,
    Settings,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    LoggedIn,
    LoggedOut,
    OpenForm(DocumentKind),
    Submit,
    GenerationSucceeded { id: String },
    GenerationFailed,
    OpenHistory,
    OpenDocument { kind: DocumentKind, id: String },
    DocumentDeleted,
    OpenSettings,
    Back,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot handle {event:?} while in {view:?}")]
pub struct TransitionError {
    pub view: View,
    pub event: AppEvent,
}

/// Front-end navigation state. Views change only through [`AppState::apply`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppState {
    view: View,
    alert: Option<String>,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            view: View::Login,
            alert: None,
        }
    }
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts on the dashboard when a kept session flag is stored.
    pub fn restore(store: &LocalStore) -> anyhow::Result<Self> {
        let mut state = Self::new();
        if auth::session_active(store)? {
            state.view = View::Dashboard;
        }
        Ok(state)
    }

    pub fn view(&self) -> &View {
        &self.view
    }

    pub fn alert(&self) -> Option<&str> {
        self.alert.as_deref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.view != View::Login
    }

    pub fn is_busy(&self) -> bool {
        matches!(self.view, View::Generating(_))
    }

    pub fn apply(&mut self, event: AppEvent) -> Result<&View, TransitionError> {
        let next = match (&self.view, &event) {
            (View::Login, AppEvent::LoggedIn) => View::Dashboard,
            (View::Login, _) => return Err(self.reject(event)),
            (_, AppEvent::LoggedOut) => View::Login,

            (View::Generating(kind), AppEvent::GenerationSucceeded { id }) => View::Preview {
                kind: *kind,
                id: id.clone(),
            },
            (View::Generating(kind), AppEvent::GenerationFailed) => {
                let kind = *kind;
                self.view = View::Form(kind);
                self.alert = Some(kind.failure_alert().to_string());
                return Ok(&self.view);
            }
            (View::Generating(_), _) => return Err(self.reject(event)),

            (View::Form(kind), AppEvent::Submit) => View::Generating(*kind),
            (_, AppEvent::OpenForm(kind)) => View::Form(*kind),
            (_, AppEvent::OpenHistory) => View::History,
            (View::Dashboard | View::History, AppEvent::OpenDocument { kind, id }) => {
                View::Preview {
                    kind: *kind,
                    id: id.clone(),
                }
            }
            (View::Preview { .. }, AppEvent::DocumentDeleted) => View::History,
            (View::Dashboard | View::History, AppEvent::OpenSettings) => View::Settings,
            (_, AppEvent::Back) => View::Dashboard,
            _ => return Err(self.reject(event)),
        };
        self.view = next;
        self.alert = None;
        Ok(&self.view)
    }

    fn reject(&self, event: AppEvent) -> TransitionError {
        TransitionError {
            view: self.view.clone(),
            event,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn logged_in() -> AppState {
        let mut state = AppState::new();
        state.apply(AppEvent::LoggedIn).map(|_| ()).unwrap_or_default();
        state
    }

    #[test]
    fn login_view_only_accepts_login() {
        let mut state = AppState::new();
        assert!(!state.is_authenticated());
        assert!(state.apply(AppEvent::OpenHistory).is_err());
        assert_eq!(state.apply(AppEvent::LoggedIn), Ok(&View::Dashboard));
        assert!(state.is_authenticated());
    }

    #[test]
    fn successful_generation_lands_on_preview() -> anyhow::Result<()> {
        let mut state = logged_in();
        state.apply(AppEvent::OpenForm(DocumentKind::Receipt))?;
        state.apply(AppEvent::Submit)?;
        assert!(state.is_busy());
        let view = state.apply(AppEvent::GenerationSucceeded {
            id: "r1".to_string(),
        })?;
        assert_eq!(
            view,
            &View::Preview {
                kind: DocumentKind::Receipt,
                id: "r1".to_string()
            }
        );
        Ok(())
    }

    #[test]
    fn failed_generation_returns_to_form_with_alert() -> anyhow::Result<()> {
        let mut state = logged_in();
        state.apply(AppEvent::OpenForm(DocumentKind::Quote))?;
        state.apply(AppEvent::Submit)?;
        state.apply(AppEvent::GenerationFailed)?;
        assert_eq!(state.view(), &View::Form(DocumentKind::Quote));
        assert_eq!(state.alert(), Some(DocumentKind::Quote.failure_alert()));

        state.apply(AppEvent::Back)?;
        assert_eq!(state.alert(), None);
        Ok(())
    }

    #[test]
    fn submit_while_generating_is_rejected() -> anyhow::Result<()> {
        let mut state = logged_in();
        state.apply(AppEvent::OpenForm(DocumentKind::Warranty))?;
        state.apply(AppEvent::Submit)?;
        let err = state.apply(AppEvent::Submit).err();
        assert_eq!(
            err.map(|err| err.view),
            Some(View::Generating(DocumentKind::Warranty))
        );
        assert!(state.apply(AppEvent::OpenHistory).is_err());
        Ok(())
    }

    #[test]
    fn history_preview_delete_cycle() -> anyhow::Result<()> {
        let mut state = logged_in();
        state.apply(AppEvent::OpenHistory)?;
        state.apply(AppEvent::OpenDocument {
            kind: DocumentKind::Receipt,
            id: "x".to_string(),
        })?;
        state.apply(AppEvent::DocumentDeleted)?;
        assert_eq!(state.view(), &View::History);
        assert!(state.apply(AppEvent::DocumentDeleted).is_err());
        state.apply(AppEvent::LoggedOut)?;
        assert_eq!(state.view(), &View::Login);
        Ok(())
    }

    #[test]
    fn restore_follows_kept_session_flag() -> anyhow::Result<()> {
        let store = LocalStore::in_memory();
        assert_eq!(AppState::restore(&store)?.view(), &View::Login);
        store.write_json(auth::SESSION_KEY, &true)?;
        assert_eq!(AppState::restore(&store)?.view(), &View::Dashboard);
        Ok(())
    }
}
