use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use epdf_core::layout;
use epdf_core::{
    AdjustMode, BackendRegistry, Config, Document, DocumentLoader, FileStateStore, PixelSize,
    Rectangle, RenderImage, StateStore,
};
use serde::Serialize;
use tracing::{debug, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{prelude::*, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "epdf", version, about = "Inspect, lay out and render documents")]
struct Cli {
    /// Configuration file to use instead of the platform default
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Raise log verbosity (-v debug, -vv trace); EPDF_LOG overrides it
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct DocumentArgs {
    /// Document to open
    file: PathBuf,

    /// Password for encrypted documents
    #[arg(long)]
    password: Option<String>,

    /// Where the document originally came from; names the document
    #[arg(long)]
    uri: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print identity, page count and page sizes
    Info {
        #[command(flatten)]
        document: DocumentArgs,
        #[arg(long)]
        json: bool,
    },
    /// Compute grid geometry and remember the resulting view state
    Layout {
        #[command(flatten)]
        document: DocumentArgs,
        #[arg(long)]
        zoom: Option<f64>,
        #[arg(long)]
        ppi: Option<f64>,
        #[arg(long, allow_hyphen_values = true)]
        rotation: Option<i32>,
        /// Pages per row
        #[arg(long)]
        columns: Option<u32>,
        /// Column (1-based) of the first page
        #[arg(long)]
        first_column: Option<u32>,
        #[arg(long)]
        padding: Option<u32>,
        /// Viewport size in pixels, e.g. 1280x800
        #[arg(long, value_parser = parse_view_size)]
        view: Option<(u32, u32)>,
        #[arg(long)]
        adjust: Option<AdjustMode>,
        #[arg(long)]
        json: bool,
    },
    /// Render one page (0-based) to a PNG file
    Render {
        #[command(flatten)]
        document: DocumentArgs,
        #[arg(long)]
        page: u32,
        #[arg(long)]
        out: PathBuf,
        /// Render with print quality
        #[arg(long)]
        print: bool,
    },
    /// Extract the text of a page, optionally inside x0,y0,x1,y1
    Text {
        #[command(flatten)]
        document: DocumentArgs,
        #[arg(long)]
        page: u32,
        #[arg(long, value_parser = parse_rect, allow_hyphen_values = true)]
        rect: Option<Rectangle>,
    },
    /// Print the label of a page
    Label {
        #[command(flatten)]
        document: DocumentArgs,
        #[arg(long)]
        page: u32,
    },
    /// Write a copy of the document
    SaveAs {
        #[command(flatten)]
        document: DocumentArgs,
        out: PathBuf,
    },
    /// Extract an embedded attachment by name
    Attachment {
        #[command(flatten)]
        document: DocumentArgs,
        name: String,
        out: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let _log_guard = init_logging(cli.verbose, cli.log_file.as_deref())?;
    let project_dirs = Config::project_dirs()?;

    let config = match &cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };
    let state_dir = project_dirs.data_local_dir().join("state");
    let store: Arc<dyn StateStore> = Arc::new(FileStateStore::new(state_dir)?);

    let mut registry = BackendRegistry::new();
    epdf_render::register_default_backends(&mut registry);
    let app = App {
        loader: DocumentLoader::new(registry),
        config,
        store,
    };

    app.run(cli.command)
}

struct App {
    loader: DocumentLoader,
    config: Config,
    store: Arc<dyn StateStore>,
}

impl App {
    fn run(&self, command: Command) -> Result<()> {
        match command {
            Command::Info { document, json } => self.info(&document, json),
            Command::Layout {
                document,
                zoom,
                ppi,
                rotation,
                columns,
                first_column,
                padding,
                view,
                adjust,
                json,
            } => {
                let mut doc = self.open(&document)?;
                if let Some(zoom) = zoom {
                    doc.set_zoom(zoom);
                }
                if let Some(ppi) = ppi {
                    doc.set_viewport_ppi(ppi);
                }
                if let Some(rotation) = rotation {
                    doc.set_rotation(rotation);
                }
                if columns.is_some() || first_column.is_some() || padding.is_some() {
                    doc.set_page_layout(
                        padding.unwrap_or(doc.page_padding()),
                        columns.unwrap_or(doc.pages_per_row()),
                        first_column.unwrap_or(doc.first_page_column()),
                    );
                }
                if let Some((width, height)) = view {
                    doc.set_viewport_width(width);
                    doc.set_viewport_height(height);
                }
                if let Some(adjust) = adjust {
                    doc.set_adjust_mode(adjust);
                }
                if let Some(zoom) = doc.apply_adjust_mode() {
                    debug!(zoom, "zoom fitted to viewport");
                }

                let report = LayoutReport::of(&doc);
                print_report(&report, json, |report| {
                    format!(
                        "scale:     {:.4}\nzoom:      {:.4}\nrotation:  {}\ngrid:      {} per row, first column {}, padding {}\ncell:      {}x{}\ndocument:  {}x{}",
                        report.scale,
                        report.zoom,
                        report.rotation,
                        report.pages_per_row,
                        report.first_page_column,
                        report.page_padding,
                        report.cell.width,
                        report.cell.height,
                        report.document.width,
                        report.document.height,
                    )
                })?;

                self.store.save(doc.fingerprint(), &doc.view_state())?;
                close(doc)
            }
            Command::Render {
                document,
                page,
                out,
                print,
            } => {
                let doc = self.open(&document)?;
                let size = layout::page_size(&doc, page)
                    .ok_or_else(|| anyhow!("page {} out of range", page))?;
                if size.width == 0 || size.height == 0 {
                    bail!("page {} has no visible area at the current scale", page);
                }
                let mut target = RenderImage::blank(size.width, size.height);
                backend_call(doc.render_page(page, &mut target, print), "render")?;
                write_png(&target, &out)?;
                println!("{}x{} -> {}", size.width, size.height, out.display());
                close(doc)
            }
            Command::Text {
                document,
                page,
                rect,
            } => {
                let doc = self.open(&document)?;
                let rect = match rect {
                    Some(rect) => rect,
                    None => {
                        let page = doc
                            .page(page)
                            .ok_or_else(|| anyhow!("page {} out of range", page))?;
                        Rectangle::new(0.0, 0.0, page.width(), page.height())
                    }
                };
                let text = backend_call(doc.page_text(page, rect), "text extraction")?;
                println!("{text}");
                close(doc)
            }
            Command::Label { document, page } => {
                let doc = self.open(&document)?;
                match backend_call(doc.page_label(page), "page labels")? {
                    Some(label) => println!("{label}"),
                    None => println!("{}", doc.page_display_number(page)),
                }
                close(doc)
            }
            Command::SaveAs { document, out } => {
                let doc = self.open(&document)?;
                backend_call(doc.save_as(&out), "save-as")?;
                close(doc)
            }
            Command::Attachment {
                document,
                name,
                out,
            } => {
                let doc = self.open(&document)?;
                backend_call(doc.attachment_save(&name, &out), "attachments")
                    .with_context(|| format!("failed to save attachment {:?}", name))?;
                close(doc)
            }
        }
    }

    /// Opens a document with the configured defaults and its remembered view state.
    fn open(&self, args: &DocumentArgs) -> Result<Document> {
        let mut doc = self
            .loader
            .open(&args.file, args.uri.as_deref(), args.password.as_deref())
            .with_context(|| format!("failed to open {:?}", args.file))?;
        self.config.apply(&mut doc);
        match self.store.load(doc.fingerprint()) {
            Ok(Some(state)) => doc.restore_view_state(&state),
            Ok(None) => {}
            Err(err) => warn!(?err, "ignoring unreadable view state"),
        }
        Ok(doc)
    }

    fn info(&self, args: &DocumentArgs, json: bool) -> Result<()> {
        let doc = self.open(args)?;
        let pages = doc
            .pages()
            .iter()
            .map(|page| PageReport {
                index: page.index(),
                width: page.width(),
                height: page.height(),
                label: match doc.page_label(page.index()) {
                    Ok(label) => label,
                    Err(err) => {
                        if !err.is_not_implemented() {
                            warn!(page = page.index(), %err, "failed to read page label");
                        }
                        None
                    }
                },
            })
            .collect();
        let report = InfoReport {
            path: doc.path().to_path_buf(),
            basename: doc.basename().to_owned(),
            fingerprint: doc.fingerprint().to_hex(),
            backend: doc.backend().name().to_owned(),
            capabilities: doc
                .backend()
                .capabilities()
                .iter()
                .map(|capability| capability.name())
                .collect(),
            number_of_pages: doc.number_of_pages(),
            cell_width: doc.cell_width(),
            cell_height: doc.cell_height(),
            pages,
        };

        print_report(&report, json, |report| {
            let mut out = format!(
                "file:         {}\nname:         {}\nfingerprint:  {}\nbackend:      {} ({})\npages:        {}\ncell:         {}x{}",
                report.path.display(),
                report.basename,
                report.fingerprint,
                report.backend,
                report.capabilities.join(", "),
                report.number_of_pages,
                report.cell_width,
                report.cell_height,
            );
            for page in &report.pages {
                out.push_str(&format!(
                    "\n  [{}] {}x{}{}",
                    page.index,
                    page.width,
                    page.height,
                    page.label
                        .as_deref()
                        .map(|label| format!(" \"{label}\""))
                        .unwrap_or_default()
                ));
            }
            out
        })?;
        close(doc)
    }
}

#[derive(Debug, Serialize)]
struct InfoReport {
    path: PathBuf,
    basename: String,
    fingerprint: String,
    backend: String,
    capabilities: Vec<&'static str>,
    number_of_pages: u32,
    cell_width: f64,
    cell_height: f64,
    pages: Vec<PageReport>,
}

#[derive(Debug, Serialize)]
struct PageReport {
    index: u32,
    width: f64,
    height: f64,
    label: Option<String>,
}

#[derive(Debug, Serialize)]
struct LayoutReport {
    scale: f64,
    zoom: f64,
    rotation: u32,
    pages_per_row: u32,
    first_page_column: u32,
    page_padding: u32,
    cell: PixelSize,
    document: PixelSize,
}

impl LayoutReport {
    fn of(doc: &Document) -> Self {
        Self {
            scale: doc.scale(),
            zoom: doc.zoom(),
            rotation: doc.rotation(),
            pages_per_row: doc.pages_per_row(),
            first_page_column: doc.first_page_column(),
            page_padding: doc.page_padding(),
            cell: doc.cell_size(),
            document: doc.document_size(),
        }
    }
}

fn print_report<T: Serialize>(report: &T, json: bool, text: impl FnOnce(&T) -> String) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        println!("{}", text(report));
    }
    Ok(())
}

fn backend_call<T>(result: epdf_core::Result<T>, feature: &str) -> Result<T> {
    match result {
        Ok(value) => Ok(value),
        Err(err) if err.is_not_implemented() => {
            bail!("{feature}: feature not supported by this backend")
        }
        Err(err) => Err(anyhow!(err).context(format!("{feature} failed"))),
    }
}

fn close(doc: Document) -> Result<()> {
    doc.close().context("failed to close document")
}

fn write_png(image: &RenderImage, out: &Path) -> Result<()> {
    let buffer = image::RgbaImage::from_raw(image.width, image.height, image.pixels.clone())
        .ok_or_else(|| anyhow!("rendered bitmap has an unexpected size"))?;
    if let Some(parent) = out.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory {:?}", parent))?;
    }
    buffer
        .save_with_format(out, image::ImageFormat::Png)
        .with_context(|| format!("failed to write {:?}", out))
}

fn parse_view_size(value: &str) -> std::result::Result<(u32, u32), String> {
    let (width, height) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got {value:?}"))?;
    let width = width.trim().parse().map_err(|err| format!("bad width: {err}"))?;
    let height = height.trim().parse().map_err(|err| format!("bad height: {err}"))?;
    Ok((width, height))
}

fn parse_rect(value: &str) -> std::result::Result<Rectangle, String> {
    let coords = value
        .split(',')
        .map(|part| part.trim().parse::<f64>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|err| format!("bad coordinate: {err}"))?;
    match coords.as_slice() {
        [x1, y1, x2, y2] => Ok(Rectangle::new(*x1, *y1, *x2, *y2)),
        _ => Err(format!("expected x0,y0,x1,y1, got {value:?}")),
    }
}

const LOG_ENV: &str = "EPDF_LOG";

fn log_filter(verbose: u8, env: Option<&str>) -> Result<EnvFilter> {
    if let Some(directives) = env.filter(|directives| !directives.trim().is_empty()) {
        return EnvFilter::try_new(directives)
            .with_context(|| format!("invalid {LOG_ENV} directives {directives:?}"));
    }
    let level = match verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    Ok(EnvFilter::builder()
        .with_default_directive(level.into())
        .parse_lossy(""))
}

/// Logs go to stderr; `log_file` adds a plain-text copy written off the main thread.
fn init_logging(verbose: u8, log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = log_filter(verbose, std::env::var(LOG_ENV).ok().as_deref())?;
    let console = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    let (file, guard) = match log_file {
        Some(path) => {
            let dir = path.parent().filter(|dir| !dir.as_os_str().is_empty());
            if let Some(dir) = dir {
                fs::create_dir_all(dir)
                    .with_context(|| format!("failed to create log directory {:?}", dir))?;
            }
            let name = path
                .file_name()
                .ok_or_else(|| anyhow!("log file {:?} has no file name", path))?;
            let appender = tracing_appender::rolling::never(dir.unwrap_or(Path::new(".")), name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init()
        .map_err(|err| anyhow!(err))?;

    Ok(guard)
}
