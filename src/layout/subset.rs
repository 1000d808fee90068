use std::collections::{BTreeMap, BTreeSet};

use crate::document::{Document, FontId};

/// Characters each font still draws once translation is applied
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubsetPlan {
    /// Rewrite the output font program to the used glyphs
    pub enabled: bool,
    /// Id of the font added for translated text
    pub output_font: Option<FontId>,
    used: BTreeMap<FontId, BTreeSet<char>>,
    empty: BTreeSet<char>,
}

impl SubsetPlan {
    /// Collect used characters per font
    ///
    /// Translated runs count towards the output font only; every other run
    /// counts towards the font it was drawn with.
    pub fn build(document: &Document, output_font: &FontId, enabled: bool) -> Self {
        let mut used: BTreeMap<FontId, BTreeSet<char>> = BTreeMap::new();
        for page in &document.pages {
            for run in &page.runs {
                match (&run.rendering, page.selected) {
                    (Some(rendering), true) => {
                        let chars = used.entry(output_font.clone()).or_default();
                        for line in &rendering.lines {
                            chars.extend(line.text.chars().filter(|c| !c.is_control()));
                        }
                    }
                    _ => {
                        used.entry(run.font.clone())
                            .or_default()
                            .extend(run.text.chars().filter(|c| !c.is_control()));
                    }
                }
            }
        }

        Self {
            enabled,
            output_font: Some(output_font.clone()),
            used,
            empty: BTreeSet::new(),
        }
    }

    /// Characters drawn with a font
    pub fn chars_for(&self, font: &FontId) -> &BTreeSet<char> {
        self.used.get(font).unwrap_or(&self.empty)
    }

    /// Characters drawn with the output font
    pub fn output_chars(&self) -> &BTreeSet<char> {
        match &self.output_font {
            Some(id) => self.chars_for(id),
            None => &self.empty,
        }
    }

    /// Fonts with at least one used character
    pub fn fonts(&self) -> impl Iterator<Item = &FontId> {
        self.used.keys()
    }
}
