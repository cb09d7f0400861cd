use crate::{Credentials, FileUrl, VfsError};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Whether a scheme needs credentials to access its files
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthenticationType {
    NoAuthentication,
    AuthenticationOptional,
    AuthenticationRequired,
}

/// Which part of a location one set of credentials is valid for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RealmRule {
    /// scheme + host + port
    Root,
    /// scheme + host + port + first path segment (share-based protocols)
    FirstSegment,
}

/// How paths without a `scheme://` prefix, and the scheme's own paths, are parsed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathStyle {
    Url,
    Local,
}

/// Per-scheme policy: standard port, separator, credentials and realm rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemeHandler {
    standard_port: Option<u16>,
    separator: String,
    guest_credentials: Option<Credentials>,
    authentication: AuthenticationType,
    realm: RealmRule,
    path_style: PathStyle,
}

impl Default for SchemeHandler {
    fn default() -> Self {
        Self {
            standard_port: None,
            separator: "/".to_string(),
            guest_credentials: None,
            authentication: AuthenticationType::NoAuthentication,
            realm: RealmRule::Root,
            path_style: PathStyle::Url,
        }
    }
}

impl SchemeHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_standard_port(mut self, port: u16) -> Self {
        self.standard_port = Some(port);
        self
    }

    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    pub fn with_guest_credentials(mut self, credentials: Credentials) -> Self {
        self.guest_credentials = Some(credentials);
        self
    }

    pub fn with_authentication(mut self, authentication: AuthenticationType) -> Self {
        self.authentication = authentication;
        self
    }

    pub fn with_realm(mut self, realm: RealmRule) -> Self {
        self.realm = realm;
        self
    }

    pub fn with_path_style(mut self, path_style: PathStyle) -> Self {
        self.path_style = path_style;
        self
    }

    pub fn standard_port(&self) -> Option<u16> {
        self.standard_port
    }

    pub fn separator(&self) -> &str {
        &self.separator
    }

    pub fn guest_credentials(&self) -> Option<&Credentials> {
        self.guest_credentials.as_ref()
    }

    pub fn authentication(&self) -> AuthenticationType {
        self.authentication
    }

    pub fn realm_rule(&self) -> RealmRule {
        self.realm
    }

    pub fn path_style(&self) -> PathStyle {
        self.path_style
    }

    /// Broadest location sharing the credentials of `url`
    pub fn realm(&self, url: &FileUrl) -> FileUrl {
        let mut realm = url.clone();
        realm.set_credentials(None);
        realm.set_query(None);

        let sep = self.separator.as_str();
        let path = match self.realm {
            RealmRule::Root => sep.to_string(),
            RealmRule::FirstSegment => match url.path().split(sep).find(|s| !s.is_empty()) {
                Some(first) => format!("{sep}{first}{sep}"),
                None => sep.to_string(),
            },
        };
        realm.set_path(&path);
        realm
    }
}

/// Scheme name to handler map. Unknown schemes resolve to a default handler.
pub struct SchemeRegistry {
    handlers: RwLock<HashMap<String, Arc<SchemeHandler>>>,
    fallback: Arc<SchemeHandler>,
}

pub const LOCAL_SCHEME: &str = "file";

static STANDARD_SCHEMES: Lazy<SchemeRegistry> = Lazy::new(SchemeRegistry::standard);

/// Shared read-mostly registry with the built-in schemes, used by [`FileUrl::parse`].
pub fn standard_schemes() -> &'static SchemeRegistry {
    &STANDARD_SCHEMES
}

impl SchemeRegistry {
    /// Registry holding only the `file` scheme
    pub fn new() -> Self {
        let registry = Self {
            handlers: RwLock::new(HashMap::new()),
            fallback: Arc::new(SchemeHandler::default()),
        };
        registry.register(LOCAL_SCHEME, local_handler());
        registry
    }

    /// Registry with every built-in scheme
    pub fn standard() -> Self {
        use AuthenticationType::*;

        let registry = Self::new();
        let anonymous = Credentials::new("anonymous", "someuser@");

        registry.register(
            "ftp",
            SchemeHandler::new()
                .with_standard_port(21)
                .with_authentication(AuthenticationRequired)
                .with_guest_credentials(anonymous),
        );
        registry.register(
            "sftp",
            SchemeHandler::new()
                .with_standard_port(22)
                .with_authentication(AuthenticationRequired),
        );
        registry.register(
            "smb",
            SchemeHandler::new()
                .with_standard_port(445)
                .with_authentication(AuthenticationOptional)
                .with_guest_credentials(Credentials::new("GUEST", ""))
                .with_realm(RealmRule::FirstSegment),
        );
        for (scheme, port) in [("http", 80), ("webdav", 80)] {
            registry.register(
                scheme,
                SchemeHandler::new()
                    .with_standard_port(port)
                    .with_authentication(AuthenticationOptional),
            );
        }
        for scheme in ["https", "webdavs"] {
            registry.register(
                scheme,
                SchemeHandler::new()
                    .with_standard_port(443)
                    .with_authentication(AuthenticationOptional),
            );
        }
        for scheme in ["s3", "vsphere"] {
            registry.register(
                scheme,
                SchemeHandler::new()
                    .with_standard_port(443)
                    .with_authentication(AuthenticationRequired),
            );
        }
        registry.register("nfs", SchemeHandler::new().with_standard_port(2049));
        registry.register(
            "hdfs",
            SchemeHandler::new()
                .with_standard_port(8020)
                .with_authentication(AuthenticationOptional),
        );
        registry
    }

    /// Registers (or replaces) the handler for `scheme`, returning the previous one
    pub fn register(
        &self,
        scheme: &str,
        handler: SchemeHandler,
    ) -> Option<Arc<SchemeHandler>> {
        let mut handlers = self.handlers.write().unwrap_or_else(|e| e.into_inner());
        handlers.insert(scheme.to_ascii_lowercase(), Arc::new(handler))
    }

    pub fn unregister(&self, scheme: &str) -> Option<Arc<SchemeHandler>> {
        let mut handlers = self.handlers.write().unwrap_or_else(|e| e.into_inner());
        handlers.remove(&scheme.to_ascii_lowercase())
    }

    /// Registered handler, if any
    pub fn get(&self, scheme: &str) -> Option<Arc<SchemeHandler>> {
        let handlers = self.handlers.read().unwrap_or_else(|e| e.into_inner());
        handlers.get(&scheme.to_ascii_lowercase()).cloned()
    }

    /// Registered handler, or the default handler for unknown schemes
    pub fn handler(&self, scheme: &str) -> Arc<SchemeHandler> {
        self.get(scheme).unwrap_or_else(|| self.fallback.clone())
    }

    pub fn schemes(&self) -> Vec<String> {
        let handlers = self.handlers.read().unwrap_or_else(|e| e.into_inner());
        let mut names: Vec<String> = handlers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Parses `text` with this registry's handlers
    pub fn parse(&self, text: &str) -> Result<FileUrl, VfsError> {
        crate::url::parse_with(self, text)
    }
}

impl Default for SchemeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn local_handler() -> SchemeHandler {
    SchemeHandler::new()
        .with_separator(std::path::MAIN_SEPARATOR.to_string())
        .with_path_style(PathStyle::Local)
}
