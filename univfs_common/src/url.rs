//! Parsed location of a file: `scheme://[login[:password]@]host[:port][/path][?query]`.
//!
//! A `FileUrl` is a mutable value object. Setters work in place and drop the
//! cached hash. Equality ignores credentials and properties unless asked for
//! them explicitly through [`FileUrl::equals_with`], and tolerates a single
//! trailing separator on the path.

use crate::{standard_schemes, AuthenticationType, PathStyle, SchemeHandler, SchemeRegistry, VfsError};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, OnceLock};

const PASSWORD_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

const MASK_CHAR: char = '*';
const LOCALHOST: &str = "localhost";

/// Login and password attached to a location
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Credentials {
    login: String,
    password: String,
}

impl Credentials {
    pub fn new(login: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            password: password.into(),
        }
    }

    pub fn login(&self) -> &str {
        &self.login
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn is_empty(&self) -> bool {
        self.login.is_empty() && self.password.is_empty()
    }

    pub fn masked_password(&self) -> String {
        std::iter::repeat(MASK_CHAR)
            .take(self.password.chars().count())
            .collect()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("login", &self.login)
            .field("password", &self.masked_password())
            .finish()
    }
}

#[derive(Clone)]
pub struct FileUrl {
    scheme: String,
    host: Option<String>,
    port: Option<u16>,
    path: String,
    filename: Option<String>,
    query: Option<String>,
    credentials: Option<Credentials>,
    properties: BTreeMap<String, String>,
    handler: Arc<SchemeHandler>,
    hash: OnceLock<u64>,
}

impl FileUrl {
    /// Root location of `scheme`, using `handler` for scheme-specific behavior
    pub fn with_handler(scheme: &str, handler: Arc<SchemeHandler>) -> Self {
        let root = handler.separator().to_string();
        Self {
            scheme: scheme.to_string(),
            host: None,
            port: None,
            filename: None,
            path: root,
            query: None,
            credentials: None,
            properties: BTreeMap::new(),
            handler,
            hash: OnceLock::new(),
        }
    }

    /// Root location of `scheme`, with the built-in handler for it
    pub fn for_scheme(scheme: &str) -> Result<Self, VfsError> {
        validate_scheme(scheme, scheme)?;
        Ok(Self::with_handler(scheme, standard_schemes().handler(scheme)))
    }

    /// Parses a URL or a local/UNC path with the built-in scheme handlers
    pub fn parse(text: &str) -> Result<Self, VfsError> {
        parse_with(standard_schemes(), text)
    }

    /// Location of a local path, without touching the file system
    pub fn from_local_path(path: &Path) -> Self {
        let handler = standard_schemes().handler(crate::LOCAL_SCHEME);
        let mut url = Self::with_handler(crate::LOCAL_SCHEME, handler);
        url.host = Some(LOCALHOST.to_string());
        url.set_path(&path.to_string_lossy());
        url
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    pub fn set_host(&mut self, host: Option<&str>) {
        self.host = host.filter(|h| !h.is_empty()).map(str::to_string);
        self.invalidate();
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    pub fn set_port(&mut self, port: Option<u16>) {
        self.port = port;
        self.invalidate();
    }

    pub fn standard_port(&self) -> Option<u16> {
        self.handler.standard_port()
    }

    /// Explicit port, or the scheme's standard port when none is set
    pub fn effective_port(&self) -> Option<u16> {
        self.port.or(self.handler.standard_port())
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Replaces the path, adding the leading separator when missing and
    /// re-deriving the filename.
    pub fn set_path(&mut self, path: &str) {
        let sep = self.handler.separator();
        let path = if path.is_empty() {
            sep.to_string()
        } else if path.starts_with(sep) {
            path.to_string()
        } else {
            format!("{sep}{path}")
        };
        self.filename = derive_filename(&path, sep);
        self.path = path;
        self.invalidate();
    }

    /// Last path segment without trailing separators, `None` at root
    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    pub fn set_query(&mut self, query: Option<&str>) {
        self.query = query.map(str::to_string);
        self.invalidate();
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    pub fn set_credentials(&mut self, credentials: Option<Credentials>) {
        self.credentials = credentials.filter(|c| !c.is_empty());
        self.invalidate();
    }

    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(String::as_str)
    }

    /// Sets an out-of-band property; `None` removes it
    pub fn set_property(&mut self, name: &str, value: Option<&str>) {
        match value {
            Some(value) => {
                self.properties.insert(name.to_string(), value.to_string());
            }
            None => {
                self.properties.remove(name);
            }
        }
        self.invalidate();
    }

    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    pub fn handler(&self) -> &Arc<SchemeHandler> {
        &self.handler
    }

    pub fn separator(&self) -> &str {
        self.handler.separator()
    }

    pub fn guest_credentials(&self) -> Option<&Credentials> {
        self.handler.guest_credentials()
    }

    pub fn authentication_type(&self) -> AuthenticationType {
        self.handler.authentication()
    }

    pub fn is_root(&self) -> bool {
        self.filename.is_none()
    }

    /// Location of the enclosing directory, `None` at root. The query is
    /// never carried over.
    pub fn parent(&self) -> Option<FileUrl> {
        let sep = self.separator();
        let trimmed = self.path.trim_end_matches(sep);
        if trimmed.is_empty() {
            return None;
        }
        let pos = trimmed.rfind(sep)?;
        let parent_path = trimmed[..pos + sep.len()].to_string();

        let mut parent = self.clone();
        parent.query = None;
        parent.set_path(&parent_path);
        Some(parent)
    }

    /// Location of `name` inside this location
    pub fn child(&self, name: &str) -> FileUrl {
        let sep = self.separator();
        let mut child = self.clone();
        child.query = None;
        let path = if self.path.ends_with(sep) {
            format!("{}{}", self.path, name)
        } else {
            format!("{}{}{}", self.path, sep, name)
        };
        child.set_path(&path);
        child
    }

    /// Broadest location sharing this location's credentials. Credentials are
    /// never copied to the realm.
    pub fn realm(&self) -> FileUrl {
        self.handler.realm(self)
    }

    /// Compares the location and, on request, credentials and properties
    pub fn equals_with(
        &self,
        other: &FileUrl,
        compare_credentials: bool,
        compare_properties: bool,
    ) -> bool {
        self.same_location(other)
            && (!compare_credentials || self.credentials == other.credentials)
            && (!compare_properties || self.properties == other.properties)
    }

    /// String form; credentials only when asked, password masked on request
    pub fn to_string_with(&self, include_credentials: bool, mask_password: bool) -> String {
        let mut out = String::with_capacity(self.scheme.len() + self.path.len() + 16);
        out.push_str(&self.scheme);
        out.push_str("://");

        if include_credentials {
            if let Some(credentials) = &self.credentials {
                out.push_str(credentials.login());
                if !credentials.password().is_empty() {
                    out.push(':');
                    if mask_password {
                        out.push_str(&credentials.masked_password());
                    } else {
                        out.extend(utf8_percent_encode(
                            credentials.password(),
                            PASSWORD_ENCODE_SET,
                        ));
                    }
                }
                out.push('@');
            }
        }

        if let Some(host) = &self.host {
            out.push_str(host);
        }
        if let Some(port) = self.port {
            if Some(port) != self.handler.standard_port() {
                out.push(':');
                out.push_str(&port.to_string());
            }
        }

        out.push_str(&self.path);

        if let Some(query) = &self.query {
            out.push('?');
            out.push_str(query);
        }
        out
    }

    fn same_location(&self, other: &FileUrl) -> bool {
        self.scheme.eq_ignore_ascii_case(&other.scheme)
            && eq_ignore_case(self.host.as_deref(), other.host.as_deref())
            && self.effective_port() == other.effective_port()
            && self.comparable_path() == other.comparable_path()
            && self.query == other.query
    }

    /// Path with one trailing separator removed, root excepted
    fn comparable_path(&self) -> &str {
        let sep = self.separator();
        match self.path.strip_suffix(sep) {
            Some(stripped) if !stripped.is_empty() => stripped,
            _ => &self.path,
        }
    }

    fn location_hash(&self) -> u64 {
        *self.hash.get_or_init(|| {
            let mut hasher = DefaultHasher::new();
            self.scheme.to_ascii_lowercase().hash(&mut hasher);
            self.host
                .as_ref()
                .map(|h| h.to_ascii_lowercase())
                .hash(&mut hasher);
            self.effective_port().hash(&mut hasher);
            self.comparable_path().hash(&mut hasher);
            self.query.hash(&mut hasher);
            hasher.finish()
        })
    }

    fn invalidate(&mut self) {
        self.hash = OnceLock::new();
    }
}

impl PartialEq for FileUrl {
    fn eq(&self, other: &Self) -> bool {
        self.same_location(other)
    }
}

impl Eq for FileUrl {}

impl Hash for FileUrl {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.location_hash());
    }
}

impl fmt::Display for FileUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_with(false, false))
    }
}

impl fmt::Debug for FileUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileUrl")
            .field("url", &self.to_string_with(true, true))
            .field("properties", &self.properties)
            .finish()
    }
}

impl FromStr for FileUrl {
    type Err = VfsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FileUrl::parse(s)
    }
}

fn eq_ignore_case(a: Option<&str>, b: Option<&str>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
        (None, None) => true,
        _ => false,
    }
}

fn derive_filename(path: &str, sep: &str) -> Option<String> {
    let trimmed = path.trim_end_matches(sep);
    if trimmed.is_empty() {
        return None;
    }
    trimmed
        .rsplit(sep)
        .next()
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}

fn validate_scheme(scheme: &str, input: &str) -> Result<(), VfsError> {
    let mut chars = scheme.chars();
    match chars.next() {
        None => return Err(VfsError::malformed(input, "empty scheme")),
        Some(c) if !c.is_ascii_alphabetic() => {
            return Err(VfsError::malformed(input, "scheme must start with a letter"))
        }
        _ => {}
    }
    if chars.any(|c| !(c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))) {
        return Err(VfsError::malformed(input, "invalid character in scheme"));
    }
    Ok(())
}

pub(crate) fn parse_with(registry: &SchemeRegistry, text: &str) -> Result<FileUrl, VfsError> {
    let Some(scheme_end) = text.find("://") else {
        return parse_local_path(registry, text);
    };

    let scheme = &text[..scheme_end];
    validate_scheme(scheme, text)?;
    let handler = registry.handler(scheme);
    let sep = handler.separator().to_string();
    let rest = &text[scheme_end + 3..];

    let authority_end = rest
        .find(|c| c == '/' || c == '?')
        .into_iter()
        .chain(rest.find(sep.as_str()))
        .min()
        .unwrap_or(rest.len());
    let authority = &rest[..authority_end];
    let remainder = &rest[authority_end..];

    let mut url = FileUrl::with_handler(scheme, handler.clone());

    let host_port = match authority.rfind('@') {
        Some(at) => {
            let user_info = &authority[..at];
            let (login, password) = match user_info.find(':') {
                Some(colon) => (&user_info[..colon], &user_info[colon + 1..]),
                None => (user_info, ""),
            };
            let password = percent_decode_str(password)
                .decode_utf8()
                .map_err(|_| VfsError::malformed(text, "password is not valid UTF-8"))?;
            url.credentials = Some(Credentials::new(login, password.into_owned()))
                .filter(|c| !c.is_empty());
            &authority[at + 1..]
        }
        None => authority,
    };

    let (host, port) = split_host_port(host_port, text)?;
    url.host = host.filter(|h| !h.is_empty()).map(str::to_string);
    url.port = port;
    if handler.path_style() == PathStyle::Local && url.host.is_none() {
        url.host = Some(LOCALHOST.to_string());
    }

    let (path, query) = match remainder.find('?') {
        Some(q) => (&remainder[..q], Some(&remainder[q + 1..])),
        None => (remainder, None),
    };
    url.query = query.map(str::to_string);
    url.set_path(path);
    Ok(url)
}

fn split_host_port<'a>(
    host_port: &'a str,
    input: &str,
) -> Result<(Option<&'a str>, Option<u16>), VfsError> {
    let (host, port) = if let Some(stripped) = host_port.strip_prefix('[') {
        let close = stripped
            .find(']')
            .ok_or_else(|| VfsError::malformed(input, "unbalanced IPv6 brackets"))?;
        let host = &host_port[..close + 2];
        let after = &stripped[close + 1..];
        let port = match after.strip_prefix(':') {
            Some(port) => Some(port),
            None if after.is_empty() => None,
            None => return Err(VfsError::malformed(input, "garbage after IPv6 host")),
        };
        (host, port)
    } else {
        match host_port.rfind(':') {
            Some(colon) => (&host_port[..colon], Some(&host_port[colon + 1..])),
            None => (host_port, None),
        }
    };

    let port = match port {
        None | Some("") => None,
        Some(port) => Some(
            port.parse::<u16>()
                .map_err(|_| VfsError::malformed(input, format!("invalid port '{port}'")))?,
        ),
    };
    Ok((Some(host), port))
}

/// Bare paths: `~` expansion, relative paths against the current directory,
/// lexical `.`/`..` removal. UNC paths (`\\host\share\...`) become `smb://` URLs.
fn parse_local_path(registry: &SchemeRegistry, text: &str) -> Result<FileUrl, VfsError> {
    if text.is_empty() {
        return Err(VfsError::malformed(text, "empty path"));
    }

    if let Some(unc) = text.strip_prefix("\\\\") {
        if unc.is_empty() {
            return Err(VfsError::malformed(text, "missing UNC host"));
        }
        return parse_with(registry, &format!("smb://{}", unc.replace('\\', "/")));
    }

    let expanded = expand_home(text)?;
    let absolute = if expanded.is_absolute() {
        expanded
    } else {
        std::env::current_dir()?.join(expanded)
    };
    let normalized = normalize_lexically(&absolute);

    let handler = registry.handler(crate::LOCAL_SCHEME);
    let sep = handler.separator().to_string();
    let mut path = normalized.to_string_lossy().into_owned();
    let wants_trailing = text.ends_with('/') || text.ends_with(std::path::MAIN_SEPARATOR);
    if wants_trailing && !path.ends_with(sep.as_str()) {
        path.push_str(&sep);
    }

    let mut url = FileUrl::with_handler(crate::LOCAL_SCHEME, handler);
    url.host = Some(LOCALHOST.to_string());
    url.set_path(&path);
    Ok(url)
}

fn expand_home(text: &str) -> Result<PathBuf, VfsError> {
    let rest = if text == "~" {
        Some("")
    } else {
        text.strip_prefix("~/")
            .or_else(|| text.strip_prefix(&format!("~{}", std::path::MAIN_SEPARATOR)))
    };

    match rest {
        Some(rest) => {
            let dirs = directories::BaseDirs::new()
                .ok_or_else(|| VfsError::malformed(text, "unable to determine home directory"))?;
            Ok(dirs.home_dir().join(rest))
        }
        None => Ok(PathBuf::from(text)),
    }
}

fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
