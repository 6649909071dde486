use std::collections::HashSet;

/// One project entry scraped from the listing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CatalogItem {
    pub title: String,
    pub description: String,
    pub url: String,
}

/// In-memory project catalog.
///
/// Built once by the scraper at startup, then shared immutably with the
/// search handlers. `insert` enforces URL uniqueness, so a card that shows up
/// on several pagination passes lands in the catalog exactly once.
#[derive(Debug, Default)]
pub struct Catalog {
    items: Vec<CatalogItem>,
    seen_urls: HashSet<String>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit `item` unless an entry with the same URL is already present.
    /// Returns whether the item was admitted.
    pub fn insert(&mut self, item: CatalogItem) -> bool {
        if !self.seen_urls.insert(item.url.clone()) {
            return false;
        }
        self.items.push(item);
        true
    }

    /// First item whose title or description contains `query`, case-insensitive.
    ///
    /// Items keep scrape order, so earlier listing pages win ties.
    pub fn search(&self, query: &str) -> Option<&CatalogItem> {
        let q = query.to_lowercase();
        self.items.iter().find(|item| {
            item.title.to_lowercase().contains(&q) || item.description.to_lowercase().contains(&q)
        })
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[CatalogItem] {
        &self.items
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(url: &str, title: &str, descr: &str) -> CatalogItem {
        CatalogItem {
            title: title.to_string(),
            description: descr.to_string(),
            url: url.to_string(),
        }
    }

    #[test]
    fn insert_rejects_duplicate_urls() {
        let mut catalog = Catalog::new();
        assert!(catalog.insert(item("https://a", "Проект А", "описание")));
        assert!(!catalog.insert(item("https://a", "Проект А (копия)", "другое")));
        assert!(catalog.insert(item("https://b", "Проект Б", "описание")));
        assert_eq!(catalog.len(), 2);
    }

    #[test]
    fn search_is_case_insensitive_over_title_and_description() {
        let mut catalog = Catalog::new();
        catalog.insert(item("https://a", "Курс по Java", "для студентов"));
        catalog.insert(item("https://b", "Хакатон", "Мобильная разработка на Kotlin"));

        assert_eq!(catalog.search("JAVA").map(|i| i.url.as_str()), Some("https://a"));
        assert_eq!(catalog.search("котлин"), None);
        assert_eq!(catalog.search("kotlin").map(|i| i.url.as_str()), Some("https://b"));
    }

    #[test]
    fn search_returns_first_match_in_scrape_order() {
        let mut catalog = Catalog::new();
        catalog.insert(item("https://a", "Стажировка ML", "весна"));
        catalog.insert(item("https://b", "Стажировка ML", "осень"));

        assert_eq!(catalog.search("стажировка").map(|i| i.url.as_str()), Some("https://a"));
    }

    #[test]
    fn search_misses_return_none() {
        let mut catalog = Catalog::new();
        catalog.insert(item("https://a", "Курс", "описание"));
        assert!(catalog.search("блокчейн").is_none());
    }
}
