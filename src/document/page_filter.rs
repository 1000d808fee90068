use std::fmt;
use std::str::FromStr;

use anyhow::{Result, anyhow};

/// Set of 1-based page numbers and ranges, such as `1-3,5`
///
/// An empty filter selects every page. Open ranges are allowed on the right
/// (`4-` selects page 4 onwards).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageFilter {
    /// Inclusive 1-based ranges; `None` as the end means "to the last page"
    ranges: Vec<(usize, Option<usize>)>,
}

impl PageFilter {
    /// Filter selecting every page
    pub fn all() -> Self {
        Self::default()
    }

    pub fn parse(spec: &str) -> Result<Self> {
        let mut ranges = Vec::new();
        for part in spec.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let range = match part.split_once('-') {
                Some((start, end)) => {
                    let start = parse_page(start)?;
                    let end = match end.trim() {
                        "" => None,
                        end => Some(parse_page(end)?),
                    };
                    if end.is_some_and(|e| e < start) {
                        return Err(anyhow!("Invalid page range '{}': end before start", part));
                    }
                    (start, end)
                }
                None => {
                    let page = parse_page(part)?;
                    (page, Some(page))
                }
            };
            ranges.push(range);
        }
        Ok(Self { ranges })
    }

    /// Whether the zero-based page index is selected
    pub fn contains(&self, index: usize) -> bool {
        if self.ranges.is_empty() {
            return true;
        }
        let number = index + 1;
        self.ranges
            .iter()
            .any(|(start, end)| number >= *start && end.is_none_or(|e| number <= e))
    }

    pub fn is_all(&self) -> bool {
        self.ranges.is_empty()
    }
}

fn parse_page(text: &str) -> Result<usize> {
    let page: usize = text
        .trim()
        .parse()
        .map_err(|_| anyhow!("Invalid page number '{}'", text.trim()))?;
    if page == 0 {
        return Err(anyhow!("Page numbers start at 1"));
    }
    Ok(page)
}

impl FromStr for PageFilter {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for PageFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ranges.is_empty() {
            return f.write_str("all");
        }
        let parts: Vec<String> = self
            .ranges
            .iter()
            .map(|(start, end)| match end {
                Some(end) if end == start => start.to_string(),
                Some(end) => format!("{}-{}", start, end),
                None => format!("{}-", start),
            })
            .collect();
        f.write_str(&parts.join(","))
    }
}
