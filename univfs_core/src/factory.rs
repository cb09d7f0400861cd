//! Scheme registry, file resolution and per-scheme instance pools.

use crate::auth::{Authenticator, CredentialsStore};
use crate::file::FileRef;
use crate::ops::DEFAULT_COPY_BUFFER_SIZE;
use crate::pool::FilePool;
use crate::vfs::archive::{self, ArchiveFormatProvider};
use crate::vfs::local::LocalProtocolProvider;
use dashmap::DashMap;
use std::any::Any;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::{debug, info};
use univfs_common::{
    default_temp_dir, AuthenticationType, FileUrl, SchemeHandler, SchemeRegistry, VfsConfig,
    VfsError, LOCAL_SCHEME,
};

/// Creates files for one scheme.
///
/// `params` are backend specific instantiation parameters; resolution skips
/// the pool whenever they are given.
pub trait ProtocolProvider: Send + Sync {
    fn get_file(
        &self,
        url: &FileUrl,
        params: &[&(dyn Any + Send + Sync)],
    ) -> Result<FileRef, VfsError>;
}

/// Entry point for turning locations into files
pub struct FileFactory {
    schemes: SchemeRegistry,
    protocols: DashMap<String, Arc<dyn ProtocolProvider>>,
    archive_formats: RwLock<Vec<Arc<dyn ArchiveFormatProvider>>>,
    pools: DashMap<String, Arc<FilePool>>,
    authenticator: RwLock<Option<Arc<dyn Authenticator>>>,
    temp_root: PathBuf,
    copy_buffer_size: usize,
}

impl Default for FileFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl FileFactory {
    /// Factory with the built-in schemes and no providers or formats
    pub fn new() -> Self {
        Self {
            schemes: SchemeRegistry::standard(),
            protocols: DashMap::new(),
            archive_formats: RwLock::new(Vec::new()),
            pools: DashMap::new(),
            authenticator: RwLock::new(None),
            temp_root: std::env::temp_dir(),
            copy_buffer_size: DEFAULT_COPY_BUFFER_SIZE,
        }
    }

    /// Factory with the local provider, every built-in archive format and a
    /// credentials store
    pub fn with_defaults() -> Result<Self, VfsError> {
        Self::from_config(&VfsConfig::default())
    }

    pub fn from_config(config: &VfsConfig) -> Result<Self, VfsError> {
        let mut factory = Self::new();
        factory.temp_root = default_temp_dir(config);
        factory.copy_buffer_size = config.copy_buffer_size.max(1);

        factory.register_protocol(LOCAL_SCHEME, Arc::new(LocalProtocolProvider));

        let formats = if config.archive_formats.is_empty() {
            archive::default_formats()?
        } else {
            config
                .archive_formats
                .iter()
                .map(|name| archive::format_by_name(name))
                .collect::<Result<Vec<_>, _>>()?
        };
        for format in formats {
            factory.register_archive_format(format);
        }

        let store = CredentialsStore::from_config(config, &factory.schemes)?;
        factory.set_authenticator(Some(Arc::new(store)));

        info!(
            "File factory ready: {} protocol(s), {} archive format(s)",
            factory.protocols.len(),
            factory.archive_formats().len()
        );
        Ok(factory)
    }

    /// Drops every provider, format, pooled file and the authenticator
    pub fn shutdown(&self) {
        debug!("Shutting down file factory");
        for pool in self.pools.iter() {
            pool.clear();
        }
        self.pools.clear();
        self.protocols.clear();
        self.archive_formats
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        self.set_authenticator(None);
    }

    pub fn schemes(&self) -> &SchemeRegistry {
        &self.schemes
    }

    pub fn register_scheme(
        &self,
        scheme: &str,
        handler: SchemeHandler,
    ) -> Option<Arc<SchemeHandler>> {
        self.schemes.register(scheme, handler)
    }

    pub fn temp_root(&self) -> &Path {
        &self.temp_root
    }

    pub fn copy_buffer_size(&self) -> usize {
        self.copy_buffer_size
    }

    /// Registers `provider` for `scheme`, returning the provider it replaces
    pub fn register_protocol(
        &self,
        scheme: &str,
        provider: Arc<dyn ProtocolProvider>,
    ) -> Option<Arc<dyn ProtocolProvider>> {
        let scheme = scheme.to_ascii_lowercase();
        self.pools
            .entry(scheme.clone())
            .or_insert_with(|| Arc::new(FilePool::new()));
        self.protocols.insert(scheme, provider)
    }

    pub fn unregister_protocol(&self, scheme: &str) -> Option<Arc<dyn ProtocolProvider>> {
        let scheme = scheme.to_ascii_lowercase();
        self.pools.remove(&scheme);
        self.protocols.remove(&scheme).map(|(_, provider)| provider)
    }

    pub fn protocol(&self, scheme: &str) -> Option<Arc<dyn ProtocolProvider>> {
        self.protocols
            .get(&scheme.to_ascii_lowercase())
            .map(|p| p.value().clone())
    }

    pub fn protocols(&self) -> Vec<String> {
        let mut names: Vec<String> = self.protocols.iter().map(|p| p.key().clone()).collect();
        names.sort();
        names
    }

    /// Pool of live files for `scheme`
    pub fn pool(&self, scheme: &str) -> Option<Arc<FilePool>> {
        self.pools
            .get(&scheme.to_ascii_lowercase())
            .map(|p| p.value().clone())
    }

    /// Appends `format`; formats are tested in registration order
    pub fn register_archive_format(&self, format: Arc<dyn ArchiveFormatProvider>) {
        debug!("Registering archive format {}", format.name());
        self.archive_formats
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(format);
    }

    pub fn unregister_archive_format(&self, format: &Arc<dyn ArchiveFormatProvider>) -> bool {
        let mut formats = self.archive_formats.write().unwrap_or_else(|e| e.into_inner());
        let before = formats.len();
        formats.retain(|f| !same_provider(f, format));
        formats.len() != before
    }

    pub fn archive_formats(&self) -> Vec<Arc<dyn ArchiveFormatProvider>> {
        self.archive_formats
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// First registered format matching `filename`
    pub fn archive_format_for(&self, filename: &str) -> Option<Arc<dyn ArchiveFormatProvider>> {
        self.archive_formats
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|f| f.matches(filename))
            .cloned()
    }

    pub fn is_archive_filename(&self, filename: &str) -> bool {
        self.archive_format_for(filename).is_some()
    }

    pub fn set_authenticator(&self, authenticator: Option<Arc<dyn Authenticator>>) {
        *self.authenticator.write().unwrap_or_else(|e| e.into_inner()) = authenticator;
    }

    pub fn authenticator(&self) -> Option<Arc<dyn Authenticator>> {
        self.authenticator
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Parses `text` with this factory's schemes
    pub fn parse(&self, text: &str) -> Result<FileUrl, VfsError> {
        self.schemes.parse(text)
    }

    /// Parses and resolves `text`
    pub fn get_file(&self, text: &str) -> Result<FileRef, VfsError> {
        let url = self.parse(text)?;
        self.resolve(&url, None)
    }

    pub fn resolve(&self, url: &FileUrl, parent: Option<FileRef>) -> Result<FileRef, VfsError> {
        self.resolve_with(url, parent, &[])
    }

    /// Resolves `url`, walking into archives named along its path.
    ///
    /// Every archive-named segment outside an archive is instantiated through
    /// the scheme's provider and wrapped; segments inside an archive are
    /// looked up as entries. Files are pooled per scheme, so resolving the
    /// same location twice yields the same instance while it is alive.
    pub fn resolve_with(
        &self,
        url: &FileUrl,
        parent: Option<FileRef>,
        params: &[&(dyn Any + Send + Sync)],
    ) -> Result<FileRef, VfsError> {
        let provider = self
            .protocol(url.scheme())
            .ok_or_else(|| VfsError::UnknownProtocol(url.scheme().to_string()))?;

        let mut url = url.clone();
        if url.authentication_type() == AuthenticationType::AuthenticationRequired
            && url.credentials().is_none()
        {
            if let Some(authenticator) = self.authenticator() {
                authenticator.authenticate(&mut url)?;
            }
        }

        let pool = self.pools.entry(url.scheme().to_ascii_lowercase()).or_default().clone();

        let file = match params.is_empty().then(|| pool.get(&url)).flatten() {
            Some(file) => {
                debug!("Pool hit for {}", url);
                file
            }
            None => self.walk(&url, provider.as_ref(), &pool, params)?,
        };

        if let Some(parent) = parent {
            file.set_parent(parent);
        }
        Ok(file)
    }

    fn walk(
        &self,
        url: &FileUrl,
        provider: &dyn ProtocolProvider,
        pool: &FilePool,
        params: &[&(dyn Any + Send + Sync)],
    ) -> Result<FileRef, VfsError> {
        let sep = url.separator();
        let path = url.path();
        let end = path.trim_end_matches(sep).len();

        // innermost archive entered so far, and where its path ends
        let mut archive: Option<(FileRef, usize)> = None;
        let mut start = 0;

        while start < end {
            let segment_end = path[start..end].find(sep).map_or(end, |i| start + i);
            let segment = &path[start..segment_end];
            let is_last = segment_end == end;
            start = segment_end + sep.len();

            if segment.is_empty() || !self.is_archive_filename(segment) {
                continue;
            }

            let file = match &archive {
                None => {
                    let (segment_url, segment_params) = if is_last {
                        (url.clone(), params)
                    } else {
                        (prefix_url(url, &path[..segment_end]), &[][..])
                    };
                    self.create_file(&segment_url, provider, pool, segment_params)?
                }
                Some((current, base)) => {
                    let entry = self.entry_in(current, &path[*base..segment_end], sep)?;
                    let entry = self.wrap_if_archive(entry);
                    if is_last {
                        return Ok(pool.insert(url, entry));
                    }
                    if !entry.is_archive() {
                        continue;
                    }
                    pool.insert(&prefix_url(url, &path[..segment_end]), entry)
                }
            };

            if is_last {
                return Ok(file);
            }
            if file.is_archive() {
                archive = Some((file, segment_end));
            }
        }

        match archive {
            None => self.create_file(url, provider, pool, params),
            Some((current, base)) => {
                let entry = self.entry_in(&current, &path[base..end], sep)?;
                Ok(pool.insert(url, entry))
            }
        }
    }

    /// Pooled file for `url`, created and wrapped when not pooled. Files
    /// built from instantiation parameters bypass the pool.
    fn create_file(
        &self,
        url: &FileUrl,
        provider: &dyn ProtocolProvider,
        pool: &FilePool,
        params: &[&(dyn Any + Send + Sync)],
    ) -> Result<FileRef, VfsError> {
        if params.is_empty() {
            if let Some(file) = pool.get(url) {
                return Ok(file);
            }
        }
        let file = self.wrap_if_archive(provider.get_file(url, params)?);
        if !params.is_empty() {
            debug!("Instantiated {} from parameters, not pooled", url);
            return Ok(file);
        }
        Ok(pool.insert(url, file))
    }

    fn entry_in(&self, archive: &FileRef, relative: &str, sep: &str) -> Result<FileRef, VfsError> {
        let relative = relative.replace(sep, "/");
        match archive.as_archive() {
            Some(archive) => archive.entry_file(&relative),
            None => Err(VfsError::archive(archive.url().to_string(), "not an archive")),
        }
    }

    /// Wraps `file` in the first matching archive format. Directories and
    /// files that already are archives are returned unchanged.
    pub fn wrap_if_archive(&self, file: FileRef) -> FileRef {
        if file.is_archive() || file.is_directory() {
            return file;
        }
        match self.archive_format_for(&file.name()) {
            Some(format) => {
                debug!("Wrapping {} as {}", file.url(), format.name());
                format.wrap(file)
            }
            None => file,
        }
    }

    /// Children of `dir`, wrapped when they are archives, with `dir` as parent
    pub fn ls(&self, dir: &FileRef) -> Result<Vec<FileRef>, VfsError> {
        Ok(dir
            .ls()?
            .into_iter()
            .map(|child| {
                let child = self.wrap_if_archive(child);
                child.set_parent(dir.clone());
                child
            })
            .collect())
    }

    /// File in the temp root named `desired` (or a generated name). When that
    /// name is taken, `_<timestamp><random>` is inserted before the extension.
    pub fn temporary_file(&self, desired: Option<&str>) -> Result<FileRef, VfsError> {
        let name = match desired {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => format!("univfs_{}", short_id()),
        };

        let mut path = self.temp_root.join(&name);
        if path.exists() {
            let (base, extension) = split_extension(&name);
            let unique = format!(
                "{}_{}{}{}",
                base,
                chrono::Utc::now().timestamp_millis(),
                short_id(),
                extension
            );
            path = self.temp_root.join(unique);
        }
        self.resolve(&FileUrl::from_local_path(&path), None)
    }
}

impl std::fmt::Debug for FileFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let formats: Vec<String> = self
            .archive_formats()
            .iter()
            .map(|f| f.name().to_string())
            .collect();
        f.debug_struct("FileFactory")
            .field("protocols", &self.protocols())
            .field("archive_formats", &formats)
            .field("temp_root", &self.temp_root)
            .finish()
    }
}

fn same_provider(a: &Arc<dyn ArchiveFormatProvider>, b: &Arc<dyn ArchiveFormatProvider>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

fn prefix_url(url: &FileUrl, path: &str) -> FileUrl {
    let mut prefix = url.clone();
    prefix.set_query(None);
    prefix.set_path(path);
    prefix
}

fn short_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// Splits `name` into base and extension (with its dot). A leading dot
/// does not start an extension.
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(pos) if pos > 0 => name.split_at(pos),
        _ => (name, ""),
    }
}
