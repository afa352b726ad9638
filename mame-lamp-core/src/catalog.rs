//! Mapping catalog
//!
//! Holds the signal-name → lamp-bit tables for every known title plus the
//! mandatory default table. A catalog is built once, validated up front and
//! only read afterwards.

use crate::types::{BitIndex, BridgeError, Result};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;

/// Key of the mandatory fallback table in the JSON catalog
pub const DEFAULTS_KEY: &str = "defaults";

/// Default catalog file name
pub const DEFAULT_CATALOG_FILE: &str = "output_map.json";

/// Signal name → lamp bit for a single title
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingTable {
    bits: HashMap<String, BitIndex>,
}

impl MappingTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from (signal, bit) pairs, rejecting bits above 7
    ///
    /// `title` is only used to make the error message useful.
    pub fn from_pairs<I, S>(title: &str, pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, u64)>,
        S: Into<String>,
    {
        let mut bits = HashMap::new();
        for (signal, raw_bit) in pairs {
            let signal = signal.into();
            let bit = u8::try_from(raw_bit)
                .ok()
                .and_then(BitIndex::new)
                .ok_or_else(|| BridgeError::BitOutOfRange {
                    title: title.to_string(),
                    signal: signal.clone(),
                    bit: raw_bit,
                })?;
            bits.insert(signal, bit);
        }
        Ok(Self { bits })
    }

    /// Look up the lamp bit for a signal
    pub fn get(&self, signal: &str) -> Option<BitIndex> {
        self.bits.get(signal).copied()
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }
}

impl fmt::Display for MappingTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Sorted so log lines are stable between runs
        let sorted: BTreeMap<_, _> = self.bits.iter().collect();
        write!(f, "{{")?;
        for (i, (signal, bit)) in sorted.into_iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", signal, bit)?;
        }
        write!(f, "}}")
    }
}

/// All mapping tables known to the bridge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingCatalog {
    defaults: MappingTable,
    titles: HashMap<String, MappingTable>,
}

impl MappingCatalog {
    /// Create a catalog with only a default table
    pub fn new(defaults: MappingTable) -> Self {
        Self {
            defaults,
            titles: HashMap::new(),
        }
    }

    /// Builder method: add a per-title override table
    pub fn with_title(mut self, title: impl Into<String>, table: MappingTable) -> Self {
        self.titles.insert(title.into(), table);
        self
    }

    /// Parse a catalog from its JSON form
    ///
    /// The document must be an object of objects with a `"defaults"` entry,
    /// e.g. `{"defaults": {"Start_lamp": 0}, "outrun": {"Start_lamp": 3}}`.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let raw: HashMap<String, HashMap<String, u64>> = serde_json::from_str(json)?;
        Self::from_raw(raw)
    }

    /// Load and validate a catalog file
    pub fn load(path: &Path) -> Result<Self> {
        log::info!("Loading mapping catalog: {:?}", path);

        let content = std::fs::read_to_string(path)?;
        let catalog = Self::from_json_str(&content)?;

        log::info!(
            "Mapping catalog loaded: {} default signals, {} title overrides",
            catalog.defaults.len(),
            catalog.titles.len()
        );
        Ok(catalog)
    }

    fn from_raw(mut raw: HashMap<String, HashMap<String, u64>>) -> Result<Self> {
        let defaults = raw.remove(DEFAULTS_KEY).ok_or(BridgeError::MissingDefaults)?;
        let defaults = MappingTable::from_pairs(DEFAULTS_KEY, defaults)?;

        let mut titles = HashMap::with_capacity(raw.len());
        for (title, pairs) in raw {
            let table = MappingTable::from_pairs(&title, pairs)?;
            titles.insert(title, table);
        }

        Ok(Self { defaults, titles })
    }

    /// The fallback table
    pub fn defaults(&self) -> &MappingTable {
        &self.defaults
    }

    /// Table for a specific title, if the catalog has one
    pub fn title(&self, title: &str) -> Option<&MappingTable> {
        self.titles.get(title)
    }

    pub fn contains_title(&self, title: &str) -> bool {
        self.titles.contains_key(title)
    }

    /// Names of all titles with an override table
    pub fn titles(&self) -> impl Iterator<Item = &str> {
        self.titles.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_catalog() {
        let json = r#"{
            "defaults": {"Start_lamp": 0, "Brake_lamp": 2},
            "outrun": {"Start_lamp": 3}
        }"#;

        let catalog = MappingCatalog::from_json_str(json).unwrap();
        assert_eq!(catalog.defaults().get("Start_lamp"), BitIndex::new(0));
        assert_eq!(catalog.defaults().get("Brake_lamp"), BitIndex::new(2));
        assert_eq!(catalog.title("outrun").unwrap().get("Start_lamp"), BitIndex::new(3));
        assert!(catalog.title("defaults").is_none());
        assert!(!catalog.contains_title("turbo"));
    }

    #[test]
    fn test_missing_defaults_is_fatal() {
        let result = MappingCatalog::from_json_str(r#"{"outrun": {"Start_lamp": 3}}"#);
        assert!(matches!(result, Err(BridgeError::MissingDefaults)));
    }

    #[test]
    fn test_bit_out_of_range_rejected() {
        let result = MappingCatalog::from_json_str(
            r#"{"defaults": {"Start_lamp": 0}, "outrun": {"Start_lamp": 8}}"#,
        );
        match result {
            Err(BridgeError::BitOutOfRange { title, signal, bit }) => {
                assert_eq!(title, "outrun");
                assert_eq!(signal, "Start_lamp");
                assert_eq!(bit, 8);
            }
            other => panic!("expected BitOutOfRange, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_json() {
        let result = MappingCatalog::from_json_str(r#"{"defaults": {"Start_lamp": "zero"}}"#);
        assert!(matches!(result, Err(BridgeError::CatalogParse(_))));

        let result = MappingCatalog::from_json_str(r#"{"defaults": {"Start_lamp": -1}}"#);
        assert!(matches!(result, Err(BridgeError::CatalogParse(_))));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"defaults": {{"Start_lamp": 0}}, "outrun": {{}}}}"#).unwrap();

        let catalog = MappingCatalog::load(file.path()).unwrap();
        assert_eq!(catalog.defaults().len(), 1);
        assert!(catalog.title("outrun").unwrap().is_empty());
        assert_eq!(catalog.titles().count(), 1);
    }

    #[test]
    fn test_load_missing_file() {
        let result = MappingCatalog::load(Path::new("/nonexistent/output_map.json"));
        assert!(matches!(result, Err(BridgeError::Io(_))));
    }

    #[test]
    fn test_table_display_is_sorted() {
        let table =
            MappingTable::from_pairs("defaults", [("Start_lamp", 0), ("Brake_lamp", 2)]).unwrap();
        assert_eq!(table.to_string(), "{Brake_lamp: 2, Start_lamp: 0}");
    }
}
