//! Button name to timing code lookup

use std::collections::BTreeMap;
use std::sync::Arc;

use ir_wave::TimingSequence;

/// Immutable table of known buttons, shared by all request handlers
#[derive(Debug, Clone, Default)]
pub struct ButtonTable {
    codes: Arc<BTreeMap<String, Arc<TimingSequence>>>,
}

impl ButtonTable {
    /// Build the table from configured codes
    pub fn new(codes: BTreeMap<String, TimingSequence>) -> Self {
        let codes = codes
            .into_iter()
            .map(|(name, code)| (name, Arc::new(code)))
            .collect();
        Self {
            codes: Arc::new(codes),
        }
    }

    /// Code for `name`
    pub fn get(&self, name: &str) -> Option<Arc<TimingSequence>> {
        self.codes.get(name).cloned()
    }

    /// Whether `name` is a configured button
    pub fn contains(&self, name: &str) -> bool {
        self.codes.contains_key(name)
    }

    /// Button names in sorted order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.codes.keys().map(String::as_str)
    }

    /// Number of buttons
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    /// Whether no buttons are configured
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}
