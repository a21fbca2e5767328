//! In-memory backend for a small line-based format, plus helpers shared by the
//! unit tests. Every state struct it allocates is counted so tests can check that
//! teardown releases everything exactly once.
//!
//! ```text
//! %EPDF-TEST
//! page 612 792
//! password secret
//! fail-page 3
//! attachment notes hello world
//! label 0 i
//! text 0 some words
//! ```

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::backend::{
    downcast_data, downcast_state, Backend, BackendData, BackendFunctions, BackendState,
};
use crate::document::Document;
use crate::error::{Error, Result};
use crate::fingerprint::Fingerprint;
use crate::loader::DocumentLoader;
use crate::page::Page;
use crate::registry::BackendRegistry;
use crate::render::{ImageId, Rectangle, RenderImage, RenderTarget};

pub const TEST_CONTENT_TYPE: &str = "application/x-epdf-test";

const MAGIC: &str = "%EPDF-TEST";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counters {
    pub live_documents: i64,
    pub live_pages: i64,
    pub page_clears: u64,
    pub document_frees: u64,
    pub clear_order_violations: u64,
}

thread_local! {
    static COUNTERS: RefCell<Counters> = RefCell::new(Counters::default());
}

pub fn counters() -> Counters {
    COUNTERS.with(|counters| *counters.borrow())
}

fn bump(update: impl FnOnce(&mut Counters)) {
    COUNTERS.with(|counters| update(&mut counters.borrow_mut()));
}

#[derive(Debug, Default)]
struct TestFile {
    pages: Vec<(f64, f64)>,
    fail_page: Option<u32>,
    password: Option<String>,
    attachments: HashMap<String, String>,
    labels: HashMap<u32, String>,
    texts: HashMap<u32, String>,
}

impl TestFile {
    fn parse(source: &str) -> Result<Self> {
        let mut lines = source.lines();
        if lines.next().map(str::trim) != Some(MAGIC) {
            return Err(Error::Unknown);
        }

        let mut file = TestFile::default();
        for line in lines.map(str::trim).filter(|line| !line.is_empty()) {
            let (keyword, rest) = line.split_once(' ').unwrap_or((line, ""));
            match keyword {
                "page" => {
                    let (width, height) = rest.split_once(' ').ok_or(Error::Unknown)?;
                    file.pages.push((number(width)?, number(height)?));
                }
                "fail-page" => file.fail_page = Some(index(rest)?),
                "password" => file.password = Some(rest.to_owned()),
                "attachment" => {
                    let (name, content) = rest.split_once(' ').unwrap_or((rest, ""));
                    file.attachments.insert(name.to_owned(), content.to_owned());
                }
                "label" => {
                    let (page, label) = rest.split_once(' ').ok_or(Error::Unknown)?;
                    file.labels.insert(index(page)?, label.to_owned());
                }
                "text" => {
                    let (page, text) = rest.split_once(' ').ok_or(Error::Unknown)?;
                    file.texts.insert(index(page)?, text.to_owned());
                }
                _ => return Err(Error::Unknown),
            }
        }
        Ok(file)
    }
}

fn number(value: &str) -> Result<f64> {
    value.trim().parse().map_err(|_| Error::Unknown)
}

fn index(value: &str) -> Result<u32> {
    value.trim().parse().map_err(|_| Error::Unknown)
}

struct TestDocument {
    file: TestFile,
    last_cleared: Cell<Option<u32>>,
}

impl TestDocument {
    fn new(file: TestFile) -> Self {
        bump(|c| c.live_documents += 1);
        Self {
            file,
            last_cleared: Cell::new(None),
        }
    }
}

impl Drop for TestDocument {
    fn drop(&mut self) {
        bump(|c| c.live_documents -= 1);
    }
}

struct TestPage {
    index: u32,
}

impl TestPage {
    fn new(index: u32) -> Self {
        bump(|c| c.live_pages += 1);
        Self { index }
    }
}

impl Drop for TestPage {
    fn drop(&mut self) {
        bump(|c| c.live_pages -= 1);
    }
}

fn document_open(document: &mut Document) -> Result<()> {
    let source = fs::read_to_string(document.path()).map_err(|_| Error::Unknown)?;
    let file = TestFile::parse(&source)?;
    if let Some(required) = &file.password {
        if document.password() != Some(required.as_str()) {
            return Err(Error::InvalidPassword);
        }
    }
    document.set_number_of_pages(file.pages.len() as u32);
    document.set_data(Box::new(TestDocument::new(file)));
    Ok(())
}

fn document_free(_: &mut Document, data: Option<BackendData>) -> Result<()> {
    let state = downcast_data::<TestDocument>(data)?;
    bump(|c| c.document_frees += 1);
    drop(state);
    Ok(())
}

fn document_save_as(document: &Document, _: BackendState<'_>, path: &Path) -> Result<()> {
    fs::copy(document.path(), path).map_err(|_| Error::Unknown)?;
    Ok(())
}

fn document_attachment_save(
    _: &Document,
    state: BackendState<'_>,
    name: &str,
    path: &Path,
) -> Result<()> {
    let state = downcast_state::<TestDocument>(state)?;
    let content = state
        .file
        .attachments
        .get(name)
        .ok_or(Error::InvalidArguments)?;
    fs::write(path, content).map_err(|_| Error::Unknown)
}

fn page_init(document: &Document, page: &mut Page) -> Result<()> {
    let state = downcast_state::<TestDocument>(document.data())?;
    page.set_data(Box::new(TestPage::new(page.index())));
    if state.file.fail_page == Some(page.index()) {
        return Err(Error::Unknown);
    }
    let (width, height) = state
        .file
        .pages
        .get(page.index() as usize)
        .copied()
        .ok_or(Error::Unknown)?;
    page.set_width(width);
    page.set_height(height);
    Ok(())
}

fn page_clear(document: &Document, _: &mut Page, data: Option<BackendData>) -> Result<()> {
    let Some(data) = data else {
        return Ok(());
    };
    let page = downcast_data::<TestPage>(Some(data))?;
    if let Ok(state) = downcast_state::<TestDocument>(document.data()) {
        if state.last_cleared.get().is_some_and(|last| last >= page.index) {
            bump(|c| c.clear_order_violations += 1);
        }
        state.last_cleared.set(Some(page.index));
    }
    bump(|c| c.page_clears += 1);
    Ok(())
}

/// Fills the target with a colour whose red channel is the page index.
fn page_render(
    _: &Document,
    page: &Page,
    state: BackendState<'_>,
    target: &mut dyn RenderTarget,
    _printing: bool,
) -> Result<()> {
    let page_state = downcast_state::<TestPage>(state)?;
    let (width, height) = target.size();
    let pixel = [page_state.index as u8, 0, 0, 255];
    let pixels = pixel.repeat(width as usize * height as usize);
    debug_assert_eq!(page.index(), page_state.index);
    target.draw(&RenderImage::from_rgba(width, height, pixels)?)
}

fn page_image_get(
    _: &Document,
    _: &Page,
    _: BackendState<'_>,
    image: ImageId,
) -> Result<RenderImage> {
    match image {
        ImageId(0) => RenderImage::from_rgba(1, 1, vec![0, 0, 0, 255]),
        _ => Err(Error::InvalidArguments),
    }
}

fn page_get_text(
    document: &Document,
    page: &Page,
    _: BackendState<'_>,
    _: Rectangle,
) -> Result<String> {
    let state = downcast_state::<TestDocument>(document.data())?;
    Ok(state.file.texts.get(&page.index()).cloned().unwrap_or_default())
}

fn page_get_label(
    document: &Document,
    page: &Page,
    _: BackendState<'_>,
) -> Result<Option<String>> {
    let state = downcast_state::<TestDocument>(document.data())?;
    Ok(state.file.labels.get(&page.index()).cloned())
}

pub fn full_functions() -> BackendFunctions {
    BackendFunctions {
        document_open: Some(document_open),
        document_free: Some(document_free),
        document_save_as: Some(document_save_as),
        document_attachment_save: Some(document_attachment_save),
        page_init: Some(page_init),
        page_clear: Some(page_clear),
        page_render: Some(page_render),
        page_image_get: Some(page_image_get),
        page_get_text: Some(page_get_text),
        page_get_label: Some(page_get_label),
    }
}

/// Only what opening and closing needs.
pub fn partial_functions() -> BackendFunctions {
    BackendFunctions {
        document_open: Some(document_open),
        document_free: Some(document_free),
        page_init: Some(page_init),
        page_clear: Some(page_clear),
        ..Default::default()
    }
}

pub fn test_backend() -> Backend {
    Backend::new("test", [TEST_CONTENT_TYPE], full_functions())
}

fn guess_test_content(path: &Path, candidates: &[&str]) -> Option<String> {
    let header = fs::read(path).ok()?;
    let claimed = candidates
        .iter()
        .any(|candidate| candidate.eq_ignore_ascii_case(TEST_CONTENT_TYPE));
    (claimed && header.starts_with(MAGIC.as_bytes())).then(|| TEST_CONTENT_TYPE.to_owned())
}

pub fn test_loader_with(functions: BackendFunctions) -> DocumentLoader {
    let mut registry = BackendRegistry::new();
    registry.register(Backend::new("test", [TEST_CONTENT_TYPE], functions));
    DocumentLoader::new(registry).with_content_types(guess_test_content)
}

pub fn test_loader() -> DocumentLoader {
    test_loader_with(full_functions())
}

pub fn write_test_document(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("{MAGIC}\n{body}")).expect("write test document");
    path
}

/// A document that never went through a backend: no backend state, no pages.
pub fn detached_document() -> Document {
    Document::new(
        PathBuf::from("detached.epdf"),
        None,
        "detached.epdf".to_owned(),
        Fingerprint::default(),
        None,
        Arc::new(test_backend()),
    )
}

/// A detached document with pages of the given `(width, height)` extents.
pub fn document_with_pages(extents: &[(f64, f64)]) -> Document {
    let mut document = detached_document();
    document.set_number_of_pages(extents.len() as u32);
    for (index, &(width, height)) in extents.iter().enumerate() {
        let mut page = Page::new(index as u32);
        page.set_width(width);
        page.set_height(height);
        document.push_page(page);
    }
    document
}
