//! Routes that never engage credential refresh.

use crate::config::PublicRoutesConfig;

/// Public navigation pages and request endpoints.
///
/// Both lists hold absolute paths matched per segment: `/login` covers
/// `/login` and `/login/reset` but not `/loginx`. Endpoints are also matched
/// below the API mount path, so with a base URL of `https://host/api` the
/// endpoint `/auth/login` covers `/api/auth/login`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicRoutes {
    pages: Vec<String>,
    endpoints: Vec<String>,
    mount: Option<String>,
}

impl PublicRoutes {
    #[must_use]
    pub fn new(pages: Vec<String>, endpoints: Vec<String>) -> Self {
        Self {
            pages,
            endpoints,
            mount: None,
        }
    }

    /// Match endpoints relative to `mount` as well as from the root.
    #[must_use]
    pub fn with_mount(mut self, mount: impl Into<String>) -> Self {
        let mount = mount.into();
        let trimmed = mount.trim_end_matches('/');
        self.mount = (!trimmed.is_empty()).then(|| trimmed.to_owned());
        self
    }

    #[must_use]
    pub fn pages(&self) -> &[String] {
        &self.pages
    }

    #[must_use]
    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }

    /// Whether the application location `route` is a public page.
    #[must_use]
    pub fn is_public_page(&self, route: &str) -> bool {
        self.pages.iter().any(|page| route_matches(route, page))
    }

    /// Whether a request to `path` must never trigger a refresh.
    #[must_use]
    pub fn is_public_endpoint(&self, path: &str) -> bool {
        let path = strip_query(path);
        let relative = self
            .mount
            .as_deref()
            .and_then(|mount| path.strip_prefix(mount))
            .filter(|rest| rest.starts_with('/'));

        self.endpoints.iter().any(|endpoint| {
            segment_prefix(path, endpoint) || relative.is_some_and(|r| segment_prefix(r, endpoint))
        })
    }
}

impl Default for PublicRoutes {
    fn default() -> Self {
        Self::from(&PublicRoutesConfig::default())
    }
}

impl From<&PublicRoutesConfig> for PublicRoutes {
    fn from(config: &PublicRoutesConfig) -> Self {
        Self::new(config.pages.clone(), config.endpoints.clone())
    }
}

/// Whether `route` is `prefix` or below it, ignoring query and fragment.
#[must_use]
pub fn route_matches(route: &str, prefix: &str) -> bool {
    segment_prefix(strip_query(route), prefix)
}

fn strip_query(path: &str) -> &str {
    path.split(['?', '#']).next().unwrap_or(path)
}

/// `path` equals `prefix` or continues it with a new segment.
fn segment_prefix(path: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return path.starts_with('/');
    }
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}
