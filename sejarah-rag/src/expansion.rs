//! Lexical query expansion with a static keyword table.

use indexmap::IndexMap;
use tracing::debug;

use crate::text::clean;

/// Keyword → related phrases for Indonesian independence history.
const DEFAULT_TABLE: &[(&str, &[&str])] = &[
    ("proklamasi", &["proklamasi kemerdekaan", "merdeka", "17 agustus 1945"]),
    ("soekarno", &["sukarno", "presiden pertama", "bung karno"]),
    ("hatta", &["mohammad hatta", "bung hatta", "wakil presiden"]),
    ("belanda", &["hindia belanda", "kolonial", "penjajahan belanda"]),
    ("jepang", &["pendudukan jepang", "dai nippon", "jepang indonesia"]),
    ("agresi", &["agresi militer", "operasi militer", "serangan belanda"]),
    ("revolusi", &["revolusi nasional", "perang kemerdekaan", "perjuangan"]),
];

/// Expands a query into variants by appending phrases related to the
/// keywords it mentions.
///
/// Keys are matched as case-insensitive substrings of the cleaned query, in
/// table order. Phrases are appended as-is; the same phrase may appear more
/// than once when several keys match.
#[derive(Debug, Clone)]
pub struct QueryExpander {
    table: IndexMap<String, Vec<String>>,
}

impl Default for QueryExpander {
    fn default() -> Self {
        Self::with_table(
            DEFAULT_TABLE
                .iter()
                .map(|(key, phrases)| (*key, phrases.iter().map(|p| p.to_string()).collect())),
        )
    }
}

impl QueryExpander {
    /// An expander over the built-in history table.
    pub fn new() -> Self {
        Self::default()
    }

    /// An expander over a custom table. Keys are lower-cased.
    pub fn with_table<K: AsRef<str>>(entries: impl IntoIterator<Item = (K, Vec<String>)>) -> Self {
        let table = entries.into_iter().map(|(k, v)| (k.as_ref().to_lowercase(), v)).collect();
        Self { table }
    }

    /// An expander that never adds variants.
    pub fn disabled() -> Self {
        Self { table: IndexMap::new() }
    }

    /// Keys of the table, in match order.
    pub fn keywords(&self) -> impl Iterator<Item = &str> {
        self.table.keys().map(String::as_str)
    }

    /// Clean `query` and return it followed by the related phrases of every
    /// matching key.
    ///
    /// A query that cleans to the empty string yields no variants.
    pub fn expand(&self, query: &str) -> Vec<String> {
        let cleaned = clean(query);
        if cleaned.is_empty() {
            return Vec::new();
        }
        let lowered = cleaned.to_lowercase();

        let mut variants = vec![cleaned];
        for (keyword, phrases) in &self.table {
            if lowered.contains(keyword.as_str()) {
                variants.extend(phrases.iter().cloned());
            }
        }
        debug!(variant_count = variants.len(), "expanded query");
        variants
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cleaned_query_comes_first() {
        let variants = QueryExpander::new().expand("  Siapa   tokoh @pemuda?  ");
        assert_eq!(variants, vec!["Siapa tokoh pemuda?".to_string()]);
    }

    #[test]
    fn proklamasi_adds_related_phrases() {
        let variants = QueryExpander::new().expand("proklamasi");
        assert_eq!(variants[0], "proklamasi");
        assert!(variants.contains(&"proklamasi kemerdekaan".to_string()));
        assert!(variants.contains(&"17 agustus 1945".to_string()));
        assert_eq!(variants.len(), 4);
    }

    #[test]
    fn matching_is_case_insensitive_substring() {
        let variants = QueryExpander::new().expand("Peran SOEKARNO-Hatta");
        assert_eq!(variants[0], "Peran SOEKARNO-Hatta");
        assert!(variants.contains(&"bung karno".to_string()));
        assert!(variants.contains(&"bung hatta".to_string()));
        assert_eq!(variants.len(), 7);
    }

    #[test]
    fn keeps_duplicates_across_keys() {
        let expander = QueryExpander::with_table([
            ("a", vec!["sama".to_string()]),
            ("b", vec!["sama".to_string()]),
        ]);
        assert_eq!(expander.expand("ab"), vec!["ab", "sama", "sama"]);
    }

    #[test]
    fn empty_query_has_no_variants() {
        assert!(QueryExpander::new().expand(" @#$ ").is_empty());
        assert_eq!(QueryExpander::disabled().expand("proklamasi"), vec!["proklamasi"]);
    }
}
