/*!
 * Translation unit construction.
 *
 * Runs are grouped page by page into units of adjacent translatable runs,
 * bounded by the backend batch size. A notation or blank run between two
 * runs ends the current unit, as does a change of writing direction.
 */

use crate::document::Document;

use super::notation::{GuardedText, NotationGuard};

/// A batch of guarded segments sent as one logical translation request
#[derive(Debug, Clone, PartialEq)]
pub struct TranslationUnit {
    /// Position in document order
    pub id: usize,
    /// Zero-based page index
    pub page: usize,
    /// Indices of the runs this unit updates, one per segment
    pub run_indices: Vec<usize>,
    /// Guarded text per run
    pub segments: Vec<GuardedText>,
    /// Source text per run, used as the fallback
    pub originals: Vec<String>,
    pub source_language: String,
    pub target_language: String,
}

impl TranslationUnit {
    /// Guarded texts as sent to a backend
    pub fn texts(&self) -> Vec<String> {
        self.segments.iter().map(|s| s.text.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

/// Build units for every selected page, in document order
pub fn build_units(
    document: &Document,
    guard: &NotationGuard,
    max_batch_size: usize,
    source_language: &str,
    target_language: &str,
) -> Vec<TranslationUnit> {
    let max_batch_size = max_batch_size.max(1);
    let mut units = Vec::new();

    for page in document.pages.iter().filter(|p| p.selected) {
        let mut current: Option<TranslationUnit> = None;
        let mut previous_vertical: Option<bool> = None;

        for (run_index, run) in page.runs.iter().enumerate() {
            if !run.is_translatable() {
                if let Some(unit) = current.take() {
                    units.push(unit);
                }
                previous_vertical = None;
                continue;
            }

            let direction_changed = previous_vertical.is_some_and(|v| v != run.style.vertical);
            let full = current.as_ref().is_some_and(|u| u.len() >= max_batch_size);
            if direction_changed || full {
                if let Some(unit) = current.take() {
                    units.push(unit);
                }
            }
            previous_vertical = Some(run.style.vertical);

            let unit = current.get_or_insert_with(|| TranslationUnit {
                id: 0,
                page: page.index,
                run_indices: Vec::new(),
                segments: Vec::new(),
                originals: Vec::new(),
                source_language: source_language.to_string(),
                target_language: target_language.to_string(),
            });
            unit.run_indices.push(run_index);
            unit.segments.push(guard.guard(&run.text));
            unit.originals.push(run.text.clone());
        }

        if let Some(unit) = current.take() {
            units.push(unit);
        }
    }

    for (id, unit) in units.iter_mut().enumerate() {
        unit.id = id;
    }
    units
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app_config::NotationConfig;
    use crate::document::{BoundingBox, FontId, Page, RunStyle, TextRun};

    fn run(text: &str, notation: bool) -> TextRun {
        let mut run = TextRun::new(text, BoundingBox::default(), FontId::new("F1"), RunStyle::new(10.0));
        run.notation = notation;
        run
    }

    fn document(pages: Vec<Vec<TextRun>>) -> Document {
        let mut doc = Document::default();
        for (index, runs) in pages.into_iter().enumerate() {
            let mut page = Page::new(index, BoundingBox::new(0.0, 0.0, 600.0, 800.0));
            for r in runs {
                page.push_run(r);
            }
            doc.pages.push(page);
        }
        doc
    }

    fn guard() -> NotationGuard {
        NotationGuard::new(&NotationConfig::default()).unwrap()
    }

    #[test]
    fn test_buildUnits_shouldSplitOnNotationAndBatchLimit() {
        let doc = document(vec![vec![
            run("a", false),
            run("b", false),
            run("c", false),
            run("x", true),
            run("d", false),
            run("   ", false),
        ]]);
        let units = build_units(&doc, &guard(), 2, "en", "zh");
        let groups: Vec<Vec<usize>> = units.iter().map(|u| u.run_indices.clone()).collect();
        assert_eq!(groups, vec![vec![0, 1], vec![2], vec![4]]);
        assert_eq!(units.iter().map(|u| u.id).collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn test_buildUnits_shouldNotCrossPagesOrIncludeUnselected() {
        let mut doc = document(vec![
            vec![run("a", false)],
            vec![run("b", false)],
            vec![run("c", false)],
        ]);
        doc.pages[1].selected = false;
        let units = build_units(&doc, &guard(), 8, "en", "zh");
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].page, 0);
        assert_eq!(units[1].page, 2);
    }

    #[test]
    fn test_buildUnits_shouldGuardSegments() {
        let doc = document(vec![vec![run("Let $x$ be", false)]]);
        let units = build_units(&doc, &guard(), 8, "en", "zh");
        assert_eq!(units[0].texts(), vec!["Let {v0} be".to_string()]);
        assert_eq!(units[0].originals, vec!["Let $x$ be".to_string()]);
    }
}
