/*!
 * Common test utilities for the pdftrans test suite
 */

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Object, Stream, dictionary};
use tempfile::TempDir;

use pdftrans::app_config::Config;
use pdftrans::pdf::{LopdfPrimitive, PdfPrimitive};
use pdftrans::providers::mock::MockBackend;
use pdftrans::providers::{BackendRegistry, TranslationBackend};

pub mod mock_backends;

/// One line of text on a sample page
#[derive(Debug, Clone, Copy)]
pub struct SampleLine<'a> {
    /// Font resource key, `F1` (Helvetica) or `M1` (CMMI10)
    pub font: &'a str,
    pub text: &'a str,
    pub y: i64,
}

pub fn body(text: &str, y: i64) -> SampleLine<'_> {
    SampleLine { font: "F1", text, y }
}

pub fn formula(text: &str, y: i64) -> SampleLine<'_> {
    SampleLine { font: "M1", text, y }
}

/// Routes library logs to the test output, once per process
pub fn init_test_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Creates a temporary directory for test files
pub fn create_temp_dir() -> Result<TempDir> {
    Ok(TempDir::new()?)
}

/// Writes bytes into a file of the given directory
pub fn create_test_file(dir: &Path, filename: &str, content: &[u8]) -> Result<PathBuf> {
    let file_path = dir.join(filename);
    fs::write(&file_path, content)?;
    Ok(file_path)
}

/// Builds a letter-sized PDF, one content stream per page
///
/// Fonts are shared through the page tree's inherited `Resources`: `F1` is
/// Helvetica, `M1` is a Computer Modern math font.
pub fn sample_pdf(pages: &[Vec<SampleLine<'_>>]) -> Vec<u8> {
    let mut doc = lopdf::Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let body_font = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let math_font = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "CMMI10",
    });

    let mut kids = Vec::new();
    for lines in pages {
        let mut operations = Vec::new();
        for line in lines {
            operations.push(Operation::new("BT", vec![]));
            operations.push(Operation::new("Tf", vec![line.font.into(), 12.into()]));
            operations.push(Operation::new("Td", vec![72.into(), line.y.into()]));
            operations.push(Operation::new("Tj", vec![Object::string_literal(line.text)]));
            operations.push(Operation::new("ET", vec![]));
        }
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(Dictionary::new(), content.encode().unwrap()));
        kids.push(Object::Reference(doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        })));
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Resources" => dictionary! {
                "Font" => dictionary! { "F1" => body_font, "M1" => math_font },
            },
        }),
    );
    let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
    doc.trailer.set("Root", catalog_id);

    let mut out = Vec::new();
    doc.save_to(&mut out).unwrap();
    out
}

/// Two pages, each with one sentence and one formula
pub fn paper_pdf() -> Vec<u8> {
    sample_pdf(&[
        vec![body("The energy of a body", 700), formula("E=mc", 600)],
        vec![body("Momentum is conserved", 700), formula("p=mv", 600)],
    ])
}

/// Text of every page as extracted back, runs joined by spaces
pub fn page_texts(bytes: &[u8]) -> Vec<String> {
    let document = LopdfPrimitive::new().extract(bytes).unwrap();
    document
        .pages
        .iter()
        .map(|page| {
            page.runs
                .iter()
                .map(|run| run.text.as_str())
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect()
}

/// Configuration using the mock backend with a memory-only cache
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.source_language = "en".to_string();
    config.target_language = "zh".to_string();
    config.translation.backend = "mock".to_string();
    config.translation.common.thread_count = 2;
    config.translation.common.retry_backoff_ms = 1;
    config.translation.common.max_backoff_ms = 5;
    config.cache.enabled = false;
    config
}

/// Registry whose `mock` backend is the given instance
pub fn registry_with(mock: MockBackend) -> BackendRegistry {
    let mut registry = BackendRegistry::with_builtin();
    registry.register("mock", move |_| Ok(Arc::new(mock.clone()) as Arc<dyn TranslationBackend>));
    registry
}
