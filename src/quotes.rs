use colored::*;
use rand::seq::SliceRandom;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Shown whenever a category has nothing to offer.
pub const DEFAULT_QUOTE: &str = "You are amazing!";

/// Category-tagged quote list, built once at startup. Lookups are
/// read-only after that, so the catalog can be shared freely.
#[derive(Debug, Default, Clone)]
pub struct QuoteCatalog {
    categories: HashMap<String, Vec<String>>,
}

impl QuoteCatalog {
    /// Load from a `[category]`-header text file. A missing file is not an
    /// error: every pick then falls back to the default quote.
    pub fn load(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(content) => Self::parse(&content),
            Err(_) => {
                println!(
                    "{}",
                    format!(
                        "Warning: {} not found. Default quotes will be used.",
                        path.display()
                    )
                    .yellow()
                );
                Self::default()
            }
        }
    }

    /// Blank lines are ignored. A `[category]` line opens that category and
    /// resets its list. Anything else appends verbatim to the open category;
    /// lines before the first header are discarded.
    pub fn parse(content: &str) -> Self {
        let mut categories: HashMap<String, Vec<String>> = HashMap::new();
        let mut current: Option<String> = None;

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if line.starts_with('[') && line.ends_with(']') {
                let name = line[1..line.len() - 1].to_string();
                categories.insert(name.clone(), Vec::new());
                current = Some(name);
            } else if let Some(category) = &current {
                if let Some(list) = categories.get_mut(category) {
                    list.push(line.to_string());
                }
            }
        }

        Self { categories }
    }

    /// Uniformly random quote for the category, or the fixed default when
    /// the category is unknown or empty. Never panics.
    pub fn pick(&self, category: &str) -> String {
        self.categories
            .get(category)
            .and_then(|list| list.choose(&mut rand::thread_rng()))
            .cloned()
            .unwrap_or_else(|| DEFAULT_QUOTE.to_string())
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn parse_splits_into_categories() {
        let catalog = QuoteCatalog::parse("[happy]\nSmile!\n[sad]\nIt's ok.");
        assert_eq!(catalog.pick("happy"), "Smile!");
        assert_eq!(catalog.pick("sad"), "It's ok.");
        assert_eq!(catalog.pick("angry"), DEFAULT_QUOTE);
    }

    #[test]
    fn pick_is_uniform_over_the_category() {
        let catalog = QuoteCatalog::parse("[neutral]\none\ntwo\nthree");
        let mut seen = HashSet::new();
        let mut counts = [0usize; 3];
        for _ in 0..600 {
            let q = catalog.pick("neutral");
            match q.as_str() {
                "one" => counts[0] += 1,
                "two" => counts[1] += 1,
                "three" => counts[2] += 1,
                other => panic!("unexpected quote {other}"),
            }
            seen.insert(q);
        }
        assert_eq!(seen.len(), 3);
        // Loose uniformity bound: each should land well above zero.
        for c in counts {
            assert!(c > 100, "counts skewed: {counts:?}");
        }
    }

    #[test]
    fn pick_never_panics_on_empty_catalog() {
        let catalog = QuoteCatalog::default();
        assert_eq!(catalog.pick("happy"), DEFAULT_QUOTE);
        assert_eq!(catalog.pick(""), DEFAULT_QUOTE);
    }

    #[test]
    fn lines_before_a_header_are_discarded() {
        let catalog = QuoteCatalog::parse("stray line\n[happy]\nkeep me");
        assert_eq!(catalog.pick("happy"), "keep me");
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn repeated_header_resets_the_category() {
        let catalog = QuoteCatalog::parse("[happy]\nold\n[happy]\nnew");
        assert_eq!(catalog.pick("happy"), "new");
    }

    #[test]
    fn blank_lines_are_ignored() {
        let catalog = QuoteCatalog::parse("\n[sad]\n\n\nonly one\n\n");
        assert_eq!(catalog.pick("sad"), "only one");
    }

    #[test]
    fn empty_category_falls_back() {
        let catalog = QuoteCatalog::parse("[fear]");
        assert_eq!(catalog.pick("fear"), DEFAULT_QUOTE);
    }

    #[test]
    fn missing_file_degrades_to_empty_catalog() {
        let catalog = QuoteCatalog::load(Path::new("does/not/exist.txt"));
        assert!(catalog.is_empty());
        assert_eq!(catalog.pick("happy"), DEFAULT_QUOTE);
    }
}
