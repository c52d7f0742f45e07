// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Subcommand implementations. Each one opens the workspace, performs a
// single action, and prints its result to stdout.

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use scanwerk_core::config::AppConfig;
use scanwerk_core::error::{Result, ScanwerkError};
use scanwerk_core::model::Document;
use scanwerk_core::types::{
    DocumentId, ExportConfig, ExportFormat, PageId, PageSizePolicy, PaperSize, Rotation,
    TextLayerMode,
};
use scanwerk_document::crop::suggest_region;
use scanwerk_document::{CropRegion, ImageSource, OcrAdapter, PdfReader, StaticOcr};
use scanwerk_pipeline::{DocumentWorkspace, OpenAiAssistant};
use scanwerk_sync::SqliteCache;

use crate::cli::{Commands, FormatArg};
use crate::data_dir::CACHE_FILE_NAME;

pub async fn run(data_dir: &Path, command: Commands) -> Result<()> {
    let config = AppConfig::load(data_dir)?;
    let cache_path = data_dir.join(CACHE_FILE_NAME);

    match command {
        Commands::Scan {
            image,
            corners,
            rotate,
            ocr_json,
            title,
            document,
        } => {
            let ocr = ocr_adapter(ocr_json.as_deref())?;
            let ws = open_workspace(config, &cache_path, ocr)?;
            scan(&ws, &image, corners.as_deref(), rotate, title, document.as_deref()).await
        }
        Commands::List { query } => {
            let ws = open_workspace(config, &cache_path, no_ocr())?;
            let entries = match query {
                Some(q) => ws.search(&q)?,
                None => ws.list()?,
            };
            for entry in entries {
                println!(
                    "{}  {:<32}  {:>3} page(s)  {:<10}  {}",
                    entry.id,
                    entry.title,
                    entry.page_count,
                    entry.sync_state.label(),
                    entry.modified_at.format("%Y-%m-%d %H:%M")
                );
            }
            Ok(())
        }
        Commands::Show { id } => {
            let ws = open_workspace(config, &cache_path, no_ocr())?;
            let doc = ws.document(parse_document_id(&id)?)?;
            show(&doc);
            Ok(())
        }
        Commands::Rename { id, title } => {
            let ws = open_workspace(config, &cache_path, no_ocr())?;
            ws.rename(parse_document_id(&id)?, &title).await
        }
        Commands::Reorder { id, order } => {
            let ws = open_workspace(config, &cache_path, no_ocr())?;
            ws.reorder_pages(parse_document_id(&id)?, &parse_page_order(&order)?)
                .await
        }
        Commands::Export {
            id,
            out,
            format,
            no_image,
            visible_text,
            paper,
        } => {
            let export = export_config(&config.export, format, no_image, visible_text, paper.as_deref())?;
            let ws = open_workspace(config, &cache_path, no_ocr())?;
            let written = ws
                .export_to_file(parse_document_id(&id)?, export, out.clone())
                .await?;
            println!("wrote {written} bytes to {}", out.display());
            Ok(())
        }
        Commands::Verify { file } => verify(&file),
        Commands::Delete { id } => {
            let ws = open_workspace(config, &cache_path, no_ocr())?;
            ws.delete_document(parse_document_id(&id)?).await
        }
        Commands::Summarize { id } => {
            let assistant = OpenAiAssistant::from_config(&config.assistant)?;
            let ws = open_workspace(config, &cache_path, no_ocr())?
                .with_assistant(Arc::new(assistant));
            let summary = ws.summarize(parse_document_id(&id)?).await?;
            println!("{summary}");
            Ok(())
        }
    }
}

// -- Setup ----------------------------------------------------------------

fn open_workspace(
    config: AppConfig,
    cache_path: &Path,
    ocr: Arc<dyn OcrAdapter>,
) -> Result<DocumentWorkspace> {
    let cache = SqliteCache::open(cache_path)?;
    DocumentWorkspace::open(config, Arc::new(cache), ocr)
}

/// Engine for commands that never recognize anything.
fn no_ocr() -> Arc<dyn OcrAdapter> {
    Arc::new(StaticOcr::default())
}

fn ocr_adapter(recorded: Option<&Path>) -> Result<Arc<dyn OcrAdapter>> {
    if let Some(path) = recorded {
        return Ok(Arc::new(StaticOcr::from_json_file(path)?));
    }

    #[cfg(feature = "ocr")]
    let adapter: Arc<dyn OcrAdapter> = {
        use scanwerk_document::{OcrsAdapter, OcrsConfig};
        Arc::new(OcrsAdapter::load(&OcrsConfig::default())?)
    };

    #[cfg(not(feature = "ocr"))]
    let adapter: Arc<dyn OcrAdapter> = {
        tracing::warn!("built without the ocr feature; pages will have no text unless --ocr-json is given");
        no_ocr()
    };

    Ok(adapter)
}

// -- Parsing --------------------------------------------------------------

fn parse_document_id(s: &str) -> Result<DocumentId> {
    DocumentId::parse(s)
        .ok_or_else(|| ScanwerkError::InvalidOperation(format!("'{s}' is not a document id")))
}

/// `p3,p1,p2` or `3,1,2`.
fn parse_page_order(s: &str) -> Result<Vec<PageId>> {
    s.split(',')
        .map(|part| {
            let part = part.trim();
            part.strip_prefix('p')
                .unwrap_or(part)
                .parse::<u32>()
                .map(PageId)
                .map_err(|_| ScanwerkError::InvalidOperation(format!("'{part}' is not a page id")))
        })
        .collect()
}

fn export_config(
    base: &ExportConfig,
    format: FormatArg,
    no_image: bool,
    visible_text: bool,
    paper: Option<&str>,
) -> Result<ExportConfig> {
    let mut config = base.clone();
    config.format = match format {
        FormatArg::Pdf => ExportFormat::Pdf,
        FormatArg::Text => ExportFormat::PlainText,
    };
    if no_image {
        config.include_original_image = false;
    }
    if visible_text {
        config.text_layer = TextLayerMode::Visible;
    }
    if let Some(keyword) = paper {
        let size = PaperSize::from_keyword(keyword).ok_or_else(|| {
            ScanwerkError::InvalidOperation(format!("unknown paper size '{keyword}'"))
        })?;
        config.page_size = PageSizePolicy::Fixed(size);
    }
    Ok(config)
}

// -- Commands -------------------------------------------------------------

async fn scan(
    ws: &DocumentWorkspace,
    image: &Path,
    corners: Option<&str>,
    rotate: i32,
    title: Option<String>,
    document: Option<&str>,
) -> Result<()> {
    let rotation = Rotation::from_degrees(rotate).ok_or_else(|| {
        ScanwerkError::InvalidOperation(format!("rotation must be a multiple of 90, got {rotate}"))
    })?;
    let raw = ImageSource::open(image)?.rotated(rotation);

    let region = match corners {
        Some(spec) => CropRegion::parse_corners(spec).ok_or_else(|| {
            ScanwerkError::InvalidOperation("--corners needs eight comma-separated numbers".into())
        })?,
        None => suggest_region(&raw).unwrap_or_else(|| {
            let (width, height) = raw.oriented_dimensions();
            info!("no page outline found, using the whole photo");
            CropRegion::full_frame(width, height)
        }),
    };

    let id = match document {
        Some(id) => ws.document(parse_document_id(id)?)?.id,
        None => ws.create_document(title.as_deref().unwrap_or_default()).await?.id,
    };

    let (page, status) = ws.scan_page(id, raw, region, None).await?;
    println!("{id} {page} {}", status.label());
    Ok(())
}

fn show(doc: &Document) {
    println!("{}  {}", doc.id, doc.title());
    println!(
        "owner {}  modified {}  sync {}  hash {}",
        doc.owner,
        doc.modified_at.to_rfc3339(),
        doc.sync.state.label(),
        doc.content_hash()
    );
    if let Some(summary) = doc.summary() {
        println!("summary: {summary}");
    }
    for page in doc.pages() {
        println!(
            "\n[{}] {}x{} {} {}",
            page.id(),
            page.image().width(),
            page.image().height(),
            page.ocr_status().label(),
            page.language()
        );
        let text = page.plain_text();
        if !text.is_empty() {
            println!("{text}");
        }
    }
}

fn verify(file: &Path) -> Result<()> {
    let reader = PdfReader::open(file)?;
    if let Some(date) = reader.creation_date() {
        println!("created {date}");
    }
    for (index, page) in reader.pages()?.iter().enumerate() {
        println!(
            "--- page {} ({:.0}x{:.0} pt, {} image(s){}) ---",
            index + 1,
            page.width_pt,
            page.height_pt,
            page.images,
            if page.invisible_text { ", hidden text" } else { "" }
        );
        println!("{}", page.text);
    }
    Ok(())
}
