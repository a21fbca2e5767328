use std::borrow::Cow;
use std::path::Path;

use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::backend::Capability;
use crate::content_type::{ContentTypeGuesser, MagicContentTypes};
use crate::document::Document;
use crate::error::{Error, Result};
use crate::fingerprint::Fingerprint;
use crate::page::Page;
use crate::registry::BackendRegistry;

/// Opens files into [`Document`]s using the backends of a registry.
pub struct DocumentLoader {
    registry: BackendRegistry,
    content_types: Box<dyn ContentTypeGuesser>,
}

impl DocumentLoader {
    pub fn new(registry: BackendRegistry) -> Self {
        Self {
            registry,
            content_types: Box::new(MagicContentTypes),
        }
    }

    pub fn with_content_types(mut self, guesser: impl ContentTypeGuesser + 'static) -> Self {
        self.content_types = Box::new(guesser);
        self
    }

    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    /// Opens `path` and initializes every page.
    ///
    /// `uri` names where the file originally came from and, when given, provides
    /// the basename. Any failure after the document was allocated tears down what
    /// was built so far before the error is returned.
    #[instrument(skip(self, password), fields(path = %path.display()))]
    pub fn open(&self, path: &Path, uri: Option<&str>, password: Option<&str>) -> Result<Document> {
        if path.as_os_str().is_empty() {
            return Err(Error::InvalidArguments);
        }

        let real_path = path.canonicalize().map_err(|err| {
            warn!(%err, "failed to resolve document path");
            Error::Unknown
        })?;

        let candidates = self.registry.content_types();
        let content_type = self
            .content_types
            .guess(&real_path, &candidates)
            .ok_or_else(|| {
                warn!("no backend claims the content type of this file");
                Error::Unknown
            })?;
        let backend = self.registry.lookup(&content_type).ok_or_else(|| {
            warn!(%content_type, "no backend registered for content type");
            Error::Unknown
        })?;
        debug!(%content_type, backend = backend.name(), "resolved backend");

        let fingerprint = Fingerprint::of_file(&real_path).map_err(|err| {
            warn!(%err, "failed to fingerprint document");
            Error::Unknown
        })?;

        let basename = uri
            .and_then(basename_from_uri)
            .unwrap_or_else(|| basename_from_path(&real_path));

        let mut document = Document::new(
            real_path,
            uri.map(str::to_owned),
            basename,
            fingerprint,
            password.map(str::to_owned),
            backend,
        );

        let functions = *document.backend().functions();
        let open = functions.document_open.ok_or_else(|| {
            warn!("backend cannot open documents");
            Error::NotImplemented
        })?;
        open(&mut document)?;

        for index in 0..document.number_of_pages() {
            let page = init_page(&document, index)?;
            document.push_page(page);
        }

        info!(
            pages = document.number_of_pages(),
            cell_width = document.cell_width(),
            cell_height = document.cell_height(),
            fingerprint = %document.fingerprint(),
            "opened document"
        );
        Ok(document)
    }
}

fn init_page(document: &Document, index: u32) -> Result<Page> {
    let functions = document.backend().functions();
    let init = functions.page_init.ok_or_else(|| {
        warn!(
            missing = Capability::PageInit.name(),
            "backend cannot initialize pages"
        );
        Error::NotImplemented
    })?;

    let mut page = Page::new(index);
    if let Err(err) = init(document, &mut page) {
        warn!(page = index, %err, "failed to initialize page");
        let data = page.take_data();
        if let (Some(clear), Some(data)) = (functions.page_clear, data) {
            if let Err(clear_err) = clear(document, &mut page, Some(data)) {
                warn!(page = index, err = %clear_err, "failed to clear half-initialized page");
            }
        }
        return Err(err);
    }

    debug!(page = index, width = page.width(), height = page.height(), "page ready");
    Ok(page)
}

fn basename_from_uri(uri: &str) -> Option<String> {
    let url = Url::parse(uri).ok()?;
    let segment = url.path_segments()?.filter(|s| !s.is_empty()).last()?;
    let decoded = urlencoding::decode(segment).unwrap_or(Cow::Borrowed(segment));
    Some(decoded.into_owned())
}

fn basename_from_path(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
