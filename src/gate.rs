use crate::session::{DecodeError, Identity, SessionCodec};

/// RouteRules
///
/// The deployment's path lists. Injected into [`PathClassifier`] at construction so
/// each deployment (and each test) can carry its own set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRules {
    /// Exact paths anyone may visit.
    pub public_exact: Vec<String>,
    /// Textual prefixes anyone may visit (static assets, the API, auth pages).
    pub public_prefixes: Vec<String>,
    /// Namespaces that require a session, matched by exact value or `ns/` prefix.
    pub protected_namespaces: Vec<String>,
    /// The protected namespace reserved for brokers and admins.
    pub broker_namespace: String,
    /// Namespace of the sign-in/sign-up pages. Signed-in visitors are bounced out of it.
    pub auth_namespace: String,
    pub login_path: String,
    /// Where a signed-in USER without broker rights is sent.
    pub default_home: String,
    /// Landing page for USER after sign-in.
    pub user_landing: String,
    /// Landing page for BROKER and ADMIN after sign-in.
    pub broker_landing: String,
}

impl Default for RouteRules {
    fn default() -> Self {
        let owned =
            |items: &[&str]| -> Vec<String> { items.iter().map(|s| s.to_string()).collect() };
        Self {
            public_exact: owned(&["/", "/login", "/register", "/verify-email"]),
            public_prefixes: owned(&["/auth", "/assets", "/favicon", "/public", "/api"]),
            protected_namespaces: owned(&["/app", "/broker"]),
            broker_namespace: "/broker".to_string(),
            auth_namespace: "/auth".to_string(),
            login_path: "/auth/login".to_string(),
            default_home: "/properties".to_string(),
            user_landing: "/properties".to_string(),
            broker_landing: "/broker".to_string(),
        }
    }
}

/// Where a path stands before any session is looked at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathClass {
    Public,
    Protected,
    Unclassified,
}

/// True when `path` is `namespace` itself or lies below it (`/app` covers `/app/x`, not `/apple`).
pub fn within(path: &str, namespace: &str) -> bool {
    let namespace = namespace.trim_end_matches('/');
    if namespace.is_empty() {
        return path.starts_with('/');
    }
    match path.strip_prefix(namespace) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// normalize_path
///
/// Canonical form the classifier works on: percent-escapes decoded, `//` runs
/// collapsed, `.` dropped and `..` resolved without climbing above the root. Routing
/// treats `//app/x`, `/%61pp/x` and `/public/../app/x` as `/app/x`, so the gate must too.
pub fn normalize_path(path: &str) -> String {
    let decoded = urlencoding::decode_binary(path.as_bytes());
    let decoded = String::from_utf8_lossy(&decoded);

    let mut segments: Vec<&str> = Vec::new();
    for segment in decoded.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }

    let mut normalized = format!("/{}", segments.join("/"));
    // Keep a trailing slash on non-root paths; `within` already accepts it.
    if decoded.ends_with('/') && normalized.len() > 1 {
        normalized.push('/');
    }
    normalized
}

/// PathClassifier
///
/// Pure function of the path string, taken after [`normalize_path`]. The protected
/// check runs first, so a path under a protected namespace stays protected even when
/// a public prefix also matches it textually (e.g. a public prefix `/app` next to a protected `/app`).
#[derive(Debug, Clone)]
pub struct PathClassifier {
    rules: RouteRules,
}

impl PathClassifier {
    pub fn new(rules: RouteRules) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &RouteRules {
        &self.rules
    }

    pub fn classify(&self, path: &str) -> PathClass {
        let path = normalize_path(path);
        self.classify_normalized(&path)
    }

    fn classify_normalized(&self, path: &str) -> PathClass {
        if self.is_protected(path) {
            PathClass::Protected
        } else if self.is_public(path) {
            PathClass::Public
        } else {
            PathClass::Unclassified
        }
    }

    fn is_protected(&self, path: &str) -> bool {
        self.rules
            .protected_namespaces
            .iter()
            .any(|ns| within(path, ns))
    }

    fn is_public(&self, path: &str) -> bool {
        self.rules.public_exact.iter().any(|p| p == path)
            || self
                .rules
                .public_prefixes
                .iter()
                .any(|prefix| path.starts_with(prefix.as_str()))
    }

    pub fn is_broker_only(&self, path: &str) -> bool {
        within(path, &self.rules.broker_namespace)
    }

    fn is_entry_page(&self, path: &str) -> bool {
        path == "/" || within(path, &self.rules.auth_namespace)
    }
}

/// Outcome of the gate. There is no reject variant: every failure becomes a redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    RedirectTo(String),
}

/// Gate
///
/// Combines path classification with the decoded session. Stateless and
/// side-effect free, so one instance is shared across all requests.
#[derive(Debug, Clone)]
pub struct Gate {
    classifier: PathClassifier,
    codec: SessionCodec,
}

impl Gate {
    pub fn new(rules: RouteRules, codec: SessionCodec) -> Self {
        Self {
            classifier: PathClassifier::new(rules),
            codec,
        }
    }

    pub fn codec(&self) -> &SessionCodec {
        &self.codec
    }

    /// authorize
    ///
    /// - Protected: no usable session → login; USER in the broker area → default home.
    /// - Public: a signed-in visitor hitting `/` or the auth pages goes to their landing page.
    /// - Unclassified: always allowed.
    pub fn authorize(&self, path: &str, raw_cookie: Option<&str>) -> Decision {
        self.authorize_candidates(path, raw_cookie.as_slice())
    }

    /// Same as [`Gate::authorize`] when the request carried several `session` cookies.
    /// The first one that decodes is the session.
    pub fn authorize_candidates(&self, path: &str, raw_cookies: &[&str]) -> Decision {
        let rules = self.classifier.rules();
        let path = normalize_path(path);
        let path = path.as_str();
        match self.classifier.classify_normalized(path) {
            PathClass::Protected => match self.codec.decode_first(raw_cookies) {
                Err(DecodeError::Absent | DecodeError::Malformed) => {
                    Decision::RedirectTo(rules.login_path.clone())
                }
                Ok(identity) => {
                    if self.classifier.is_broker_only(path) && !identity.role.is_broker() {
                        Decision::RedirectTo(rules.default_home.clone())
                    } else {
                        Decision::Allow
                    }
                }
            },
            PathClass::Public => match self.codec.decode_first(raw_cookies) {
                Ok(identity) if self.classifier.is_entry_page(path) => {
                    Decision::RedirectTo(self.landing_for(&identity).to_string())
                }
                _ => Decision::Allow,
            },
            PathClass::Unclassified => Decision::Allow,
        }
    }

    /// The role-appropriate page a signed-in visitor lands on.
    pub fn landing_for(&self, identity: &Identity) -> &str {
        let rules = self.classifier.rules();
        if identity.role.is_broker() {
            &rules.broker_landing
        } else {
            &rules.user_landing
        }
    }
}
