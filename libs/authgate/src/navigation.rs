//! Host-application navigation hook.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::routes::route_matches;

/// Signals the host application to move between routes.
///
/// The gateway reads [`current_route`](Self::current_route) to decide
/// whether a 401 belongs to a public page, and calls
/// [`navigate`](Self::navigate) to send the user to the login route when a
/// session cannot be recovered.
pub trait Navigator: Send + Sync {
    /// Path of the location the application is currently showing.
    fn current_route(&self) -> String;

    /// Transition to `route`.
    fn navigate(&self, route: &str);
}

impl<T: Navigator + ?Sized> Navigator for Arc<T> {
    fn current_route(&self) -> String {
        (**self).current_route()
    }

    fn navigate(&self, route: &str) {
        (**self).navigate(route);
    }
}

type NavigateHook = Box<dyn Fn(&str) + Send + Sync>;

/// In-memory [`Navigator`] that records every transition.
///
/// An optional hook runs after each transition; the CLI uses it to report
/// forced redirects.
pub struct HistoryNavigator {
    state: Mutex<History>,
    on_navigate: Option<NavigateHook>,
}

#[derive(Debug)]
struct History {
    current: String,
    visited: Vec<String>,
}

impl HistoryNavigator {
    /// Start at `initial` with an empty history.
    #[must_use]
    pub fn new(initial: impl Into<String>) -> Self {
        Self {
            state: Mutex::new(History {
                current: initial.into(),
                visited: Vec::new(),
            }),
            on_navigate: None,
        }
    }

    #[must_use]
    pub fn on_navigate(mut self, hook: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_navigate = Some(Box::new(hook));
        self
    }

    /// Every route navigated to, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<String> {
        self.state.lock().visited.clone()
    }

    /// How many times `route` was navigated to.
    #[must_use]
    pub fn visits(&self, route: &str) -> usize {
        self.state
            .lock()
            .visited
            .iter()
            .filter(|r| r.as_str() == route)
            .count()
    }
}

impl Default for HistoryNavigator {
    fn default() -> Self {
        Self::new("/")
    }
}

impl fmt::Debug for HistoryNavigator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HistoryNavigator")
            .field("state", &*self.state.lock())
            .field("on_navigate", &self.on_navigate.is_some())
            .finish()
    }
}

impl Navigator for HistoryNavigator {
    fn current_route(&self) -> String {
        self.state.lock().current.clone()
    }

    fn navigate(&self, route: &str) {
        {
            let mut state = self.state.lock();
            state.current = route.to_owned();
            state.visited.push(route.to_owned());
        }
        if let Some(hook) = &self.on_navigate {
            hook(route);
        }
    }
}

/// Navigate to `login_route` unless the application is already on it or
/// below it (`/login?next=/cars`, `/login/reset`).
///
/// Returns `true` when a transition was requested.
pub(crate) fn redirect_to_login(navigator: &dyn Navigator, login_route: &str) -> bool {
    let current = navigator.current_route();
    if route_matches(&current, login_route) {
        tracing::debug!(route = %login_route, "already on login route; not redirecting");
        return false;
    }
    tracing::info!(from = %current, to = %login_route, "redirecting to login");
    navigator.navigate(login_route);
    true
}
