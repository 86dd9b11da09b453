//! Jutsu catalog: name → reference sign sequence.
//!
//! The verifier uses the catalog to check a run's expected sign count and
//! sequence; unknown jutsu names are verified on proof structure alone.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pipeline::NEUTRAL_LABEL;

/// Longest sign sequence a jutsu may declare.
pub const MAX_SIGNS: usize = 64;

/// Errors raised when registering a jutsu.
#[derive(Debug, Error, PartialEq)]
pub enum CatalogError {
    #[error("jutsu name is empty")]
    EmptyName,

    #[error("jutsu {name}: sign sequence is empty")]
    NoSigns { name: String },

    #[error("jutsu {name}: {count} signs exceeds the limit of {}", MAX_SIGNS)]
    TooManySigns { name: String, count: usize },

    #[error("jutsu {name}: step {step} uses the neutral label")]
    NeutralSign { name: String, step: usize },

    #[error("jutsu {name}: step {step} repeats the previous sign {sign:?}")]
    RepeatedSign {
        name: String,
        step: usize,
        sign: String,
    },
}

/// One jutsu definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Jutsu {
    pub name: String,
    pub signs: Vec<String>,
}

impl Jutsu {
    pub fn new(name: &str, signs: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            signs: signs.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Check the sequence can be performed and recorded.
    ///
    /// Consecutive identical signs are rejected: the recorder only logs a
    /// sign when it differs from the previously recorded one.
    pub fn validate(&self) -> Result<(), CatalogError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(CatalogError::EmptyName);
        }
        if self.signs.is_empty() {
            return Err(CatalogError::NoSigns {
                name: name.to_string(),
            });
        }
        if self.signs.len() > MAX_SIGNS {
            return Err(CatalogError::TooManySigns {
                name: name.to_string(),
                count: self.signs.len(),
            });
        }
        for (i, sign) in self.signs.iter().enumerate() {
            let step = i + 1;
            if sign.trim().is_empty() || sign.eq_ignore_ascii_case(NEUTRAL_LABEL) {
                return Err(CatalogError::NeutralSign {
                    name: name.to_string(),
                    step,
                });
            }
            if i > 0 && self.signs[i - 1].eq_ignore_ascii_case(sign) {
                return Err(CatalogError::RepeatedSign {
                    name: name.to_string(),
                    step,
                    sign: sign.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.signs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signs.is_empty()
    }
}

/// Name-keyed jutsu registry.  Lookups are case-insensitive.
#[derive(Debug, Clone, Default)]
pub struct JutsuCatalog {
    entries: BTreeMap<String, Jutsu>,
}

impl JutsuCatalog {
    /// Empty catalog.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Catalog pre-populated with the standard jutsu.
    pub fn builtin() -> Self {
        let mut catalog = Self::empty();
        for jutsu in [
            Jutsu::new(
                "fireball",
                &["horse", "tiger", "monkey", "boar", "horse", "tiger"],
            ),
            Jutsu::new("shadow_clone", &["ram", "snake", "tiger"]),
            Jutsu::new("chidori", &["ox", "hare", "monkey"]),
            Jutsu::new("summoning", &["boar", "dog", "bird", "monkey", "ram"]),
            Jutsu::new("substitution", &["ram", "boar", "ox", "dog", "snake"]),
            Jutsu::new(
                "phoenix_flower",
                &["rat", "tiger", "dog", "ox", "hare", "tiger"],
            ),
        ] {
            // Built-ins are valid by construction.
            let key = jutsu.name.to_ascii_lowercase();
            catalog.entries.insert(key, jutsu);
        }
        catalog
    }

    /// Register or replace a jutsu.
    pub fn insert(&mut self, jutsu: Jutsu) -> Result<(), CatalogError> {
        jutsu.validate()?;
        let key = jutsu.name.trim().to_ascii_lowercase();
        self.entries.insert(key, jutsu);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Jutsu> {
        self.entries.get(&name.trim().to_ascii_lowercase())
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.entries.values().map(|j| j.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Generate s-expression listing every jutsu.
    pub fn list_sexp(&self) -> String {
        let items: Vec<String> = self
            .entries
            .values()
            .map(|j| {
                let signs: Vec<String> = j.signs.iter().map(|s| format!("\"{}\"", s)).collect();
                format!("(:name \"{}\" :signs ({}))", j.name, signs.join(" "))
            })
            .collect();
        format!("({})", items.join(" "))
    }
}
