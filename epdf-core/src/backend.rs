use std::any::Any;
use std::fmt;
use std::path::Path;

use crate::document::Document;
use crate::error::{Error, Result};
use crate::page::Page;
use crate::render::{ImageId, Rectangle, RenderImage, RenderTarget};

/// Backend-private state attached to a [`Document`] or [`Page`].
///
/// Allocated and released only by the backend that owns it.
pub type BackendData = Box<dyn Any + Send>;

/// Borrowed view of [`BackendData`] handed to query slots.
pub type BackendState<'a> = Option<&'a (dyn Any + Send)>;

pub type DocumentOpenFn = fn(&mut Document) -> Result<()>;
pub type DocumentFreeFn = fn(&mut Document, Option<BackendData>) -> Result<()>;
pub type DocumentSaveAsFn = fn(&Document, BackendState<'_>, &Path) -> Result<()>;
pub type DocumentAttachmentSaveFn = fn(&Document, BackendState<'_>, &str, &Path) -> Result<()>;
pub type PageInitFn = fn(&Document, &mut Page) -> Result<()>;
pub type PageClearFn = fn(&Document, &mut Page, Option<BackendData>) -> Result<()>;
pub type PageRenderFn =
    fn(&Document, &Page, BackendState<'_>, &mut dyn RenderTarget, bool) -> Result<()>;
pub type PageImageGetFn = fn(&Document, &Page, BackendState<'_>, ImageId) -> Result<RenderImage>;
pub type PageGetTextFn = fn(&Document, &Page, BackendState<'_>, Rectangle) -> Result<String>;
pub type PageGetLabelFn = fn(&Document, &Page, BackendState<'_>) -> Result<Option<String>>;

/// Capability table of a backend. Every slot is optional; a missing slot makes the
/// matching operation fail with [`Error::NotImplemented`].
#[derive(Clone, Copy, Default)]
pub struct BackendFunctions {
    pub document_open: Option<DocumentOpenFn>,
    pub document_free: Option<DocumentFreeFn>,
    pub document_save_as: Option<DocumentSaveAsFn>,
    pub document_attachment_save: Option<DocumentAttachmentSaveFn>,
    pub page_init: Option<PageInitFn>,
    pub page_clear: Option<PageClearFn>,
    pub page_render: Option<PageRenderFn>,
    pub page_image_get: Option<PageImageGetFn>,
    pub page_get_text: Option<PageGetTextFn>,
    pub page_get_label: Option<PageGetLabelFn>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Open,
    Free,
    SaveAs,
    AttachmentSave,
    PageInit,
    PageClear,
    Render,
    ImageGet,
    GetText,
    GetLabel,
}

impl Capability {
    pub const ALL: [Capability; 10] = [
        Capability::Open,
        Capability::Free,
        Capability::SaveAs,
        Capability::AttachmentSave,
        Capability::PageInit,
        Capability::PageClear,
        Capability::Render,
        Capability::ImageGet,
        Capability::GetText,
        Capability::GetLabel,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Capability::Open => "open",
            Capability::Free => "free",
            Capability::SaveAs => "save-as",
            Capability::AttachmentSave => "attachment-save",
            Capability::PageInit => "page-init",
            Capability::PageClear => "page-clear",
            Capability::Render => "render",
            Capability::ImageGet => "image-get",
            Capability::GetText => "get-text",
            Capability::GetLabel => "get-label",
        }
    }
}

impl BackendFunctions {
    pub fn supports(&self, capability: Capability) -> bool {
        match capability {
            Capability::Open => self.document_open.is_some(),
            Capability::Free => self.document_free.is_some(),
            Capability::SaveAs => self.document_save_as.is_some(),
            Capability::AttachmentSave => self.document_attachment_save.is_some(),
            Capability::PageInit => self.page_init.is_some(),
            Capability::PageClear => self.page_clear.is_some(),
            Capability::Render => self.page_render.is_some(),
            Capability::ImageGet => self.page_image_get.is_some(),
            Capability::GetText => self.page_get_text.is_some(),
            Capability::GetLabel => self.page_get_label.is_some(),
        }
    }
}

/// A format backend: a name, the content types it claims and its capability table.
pub struct Backend {
    name: String,
    content_types: Vec<String>,
    functions: BackendFunctions,
}

impl Backend {
    pub fn new<I, S>(name: impl Into<String>, content_types: I, functions: BackendFunctions) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            content_types: content_types.into_iter().map(Into::into).collect(),
            functions,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn content_types(&self) -> &[String] {
        &self.content_types
    }

    pub fn handles(&self, content_type: &str) -> bool {
        self.content_types
            .iter()
            .any(|candidate| candidate.eq_ignore_ascii_case(content_type))
    }

    pub fn functions(&self) -> &BackendFunctions {
        &self.functions
    }

    pub fn supports(&self, capability: Capability) -> bool {
        self.functions.supports(capability)
    }

    pub fn capabilities(&self) -> Vec<Capability> {
        Capability::ALL
            .into_iter()
            .filter(|capability| self.supports(*capability))
            .collect()
    }
}

impl fmt::Debug for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Backend")
            .field("name", &self.name)
            .field("content_types", &self.content_types)
            .field("capabilities", &self.capabilities())
            .finish()
    }
}

/// Recovers a backend's own state type. Backends call this on the state they were
/// handed; a missing or foreign payload is reported as invalid arguments.
pub fn downcast_state<T: Any>(state: BackendState<'_>) -> Result<&T> {
    state
        .and_then(|state| state.downcast_ref::<T>())
        .ok_or(Error::InvalidArguments)
}

/// Owned counterpart of [`downcast_state`], used by the free/clear slots.
pub fn downcast_data<T: Any>(data: Option<BackendData>) -> Result<Box<T>> {
    data.ok_or(Error::InvalidArguments)?
        .downcast::<T>()
        .map_err(|_| Error::InvalidArguments)
}
