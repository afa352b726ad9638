//! Lamp state machine
//!
//! Resolves signal records to lamp bits using the active mapping table and
//! switches tables when MAME announces the running title.

use crate::catalog::{MappingCatalog, MappingTable};
use crate::types::{BitIndex, LampRegister, Record};
use std::fmt;

/// Key MAME sends with the title name when a game starts
pub const CONTROL_KEY: &str = "mame_start";

/// Which catalog table records are currently resolved against
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ActiveMapping {
    #[default]
    Defaults,
    TitleOverride(String),
}

impl fmt::Display for ActiveMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActiveMapping::Defaults => write!(f, "defaults"),
            ActiveMapping::TitleOverride(title) => write!(f, "{}", title),
        }
    }
}

/// Effect of applying one record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
    /// The control record selected a (possibly unchanged) mapping
    MappingSwitched(ActiveMapping),
    BitSet(BitIndex),
    BitCleared(BitIndex),
    /// Unknown signal or a value other than "0"/"1"
    Ignored,
}

/// Lamp register plus the mapping table used to update it
///
/// The catalog is borrowed, so one catalog can back several machines
/// (tests build a fresh machine per case). The register survives mapping
/// switches and stream reconnects; only the process exit discards it.
pub struct LampStateMachine<'a> {
    catalog: &'a MappingCatalog,
    register: LampRegister,
    active: ActiveMapping,
}

impl<'a> LampStateMachine<'a> {
    /// Create a machine with all lamps off and the default table active
    pub fn new(catalog: &'a MappingCatalog) -> Self {
        Self {
            catalog,
            register: LampRegister::new(),
            active: ActiveMapping::Defaults,
        }
    }

    /// Apply a single record
    pub fn apply(&mut self, record: &Record) -> Applied {
        if record.key == CONTROL_KEY {
            return self.select_mapping(&record.value);
        }

        let Some(bit) = self.active_table().get(&record.key) else {
            log::trace!("No lamp mapped for '{}' in {}", record.key, self.active);
            return Applied::Ignored;
        };

        match record.value.as_str() {
            "1" => {
                self.register.set_bit(bit);
                Applied::BitSet(bit)
            }
            "0" => {
                self.register.clear_bit(bit);
                Applied::BitCleared(bit)
            }
            other => {
                log::trace!("Ignoring value '{}' for '{}'", other, record.key);
                Applied::Ignored
            }
        }
    }

    /// Apply records in order, returning how many changed a lamp
    pub fn apply_all<'r, I>(&mut self, records: I) -> usize
    where
        I: IntoIterator<Item = &'r Record>,
    {
        records
            .into_iter()
            .map(|record| self.apply(record))
            .filter(|applied| matches!(applied, Applied::BitSet(_) | Applied::BitCleared(_)))
            .count()
    }

    fn select_mapping(&mut self, title: &str) -> Applied {
        if self.catalog.contains_title(title) {
            self.active = ActiveMapping::TitleOverride(title.to_string());
            log::info!("Special mappings detected for {}: {}", title, self.active_table());
        } else {
            self.active = ActiveMapping::Defaults;
            log::info!("No mappings for '{}', reverted to defaults", title);
        }
        Applied::MappingSwitched(self.active.clone())
    }

    /// Table the next signal record will be resolved against
    pub fn active_table(&self) -> &'a MappingTable {
        match &self.active {
            ActiveMapping::Defaults => self.catalog.defaults(),
            ActiveMapping::TitleOverride(title) => self
                .catalog
                .title(title)
                .unwrap_or_else(|| self.catalog.defaults()),
        }
    }

    pub fn active(&self) -> &ActiveMapping {
        &self.active
    }

    pub fn register(&self) -> LampRegister {
        self.register
    }

    /// Register value ready for the serial controller
    pub fn current_byte(&self) -> u8 {
        self.register.as_byte()
    }
}
