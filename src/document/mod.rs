/*!
 * In-memory document model.
 *
 * A `Document` is produced by a `PdfPrimitive`, annotated by the notation
 * guard, filled with translations by the dispatcher and laid out by the
 * layout module before being handed back to the primitive for writing.
 * It can also be exported as Markdown (`markdown`).
 */

pub mod markdown;
pub mod model;
pub mod page_filter;

pub use markdown::{FootnoteMode, export_markdown};
pub use model::{
    Alignment, BoundingBox, ContentRef, Document, FontId, FontKind, FontResource, Page,
    RenderedLine, Rendering, RunStyle, TextRun,
};
pub use page_filter::PageFilter;
