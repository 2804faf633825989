//! Series metadata

use crate::error::{Error, Result};
use crate::sql::Relation;
use crate::value::ValueType;
use serde::{Deserialize, Serialize};
use std::sync::{PoisonError, RwLock};

/// Row identifier column of every primary table
pub const RECNUM: &str = "recnum";

/// Version count column of every shadow index
pub const NRECORDS: &str = "nrecords";

/// Whether a series has a shadow index, as last observed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShadowState {
    /// Not probed yet
    #[default]
    Unknown,
    Absent,
    Present,
}

impl ShadowState {
    pub fn from_flag(present: bool) -> Self {
        if present {
            ShadowState::Present
        } else {
            ShadowState::Absent
        }
    }

    /// Resolved state as a flag, `None` while unknown
    pub fn as_flag(&self) -> Option<bool> {
        match self {
            ShadowState::Unknown => None,
            ShadowState::Absent => Some(false),
            ShadowState::Present => Some(true),
        }
    }
}

impl std::fmt::Display for ShadowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ShadowState::Unknown => "unknown",
            ShadowState::Absent => "absent",
            ShadowState::Present => "present",
        };
        write!(f, "{}", s)
    }
}

/// A keyword of a series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: ValueType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default)]
    pub rank: u32,
}

impl Attribute {
    pub fn new(name: &str, ty: ValueType) -> Self {
        Self {
            name: name.trim().to_lowercase(),
            ty,
            unit: None,
            rank: 0,
        }
    }

    pub fn unit(mut self, unit: &str) -> Self {
        self.unit = Some(unit.to_string());
        self
    }
}

/// Check a series, keyword or namespace name
pub(crate) fn valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Check a series name: `namespace.table` or a bare table name
pub(crate) fn valid_series_name(name: &str) -> bool {
    match name.split_once('.') {
        Some((ns, table)) => valid_identifier(ns) && valid_identifier(table),
        None => valid_identifier(name),
    }
}

/// A named schema with an ordered primary-key tuple
///
/// Metadata is immutable once built; only the cached shadow state and
/// trigger observation change.
#[derive(Debug)]
pub struct Series {
    name: String,
    description: String,
    attributes: Vec<Attribute>,
    primary_key: Vec<String>,
    shadow: RwLock<ShadowState>,
    /// Whether the synchronization trigger is installed, `None` until looked up
    sync_trigger: RwLock<Option<bool>>,
}

impl Series {
    /// Build a series, lower-casing names and validating the primary key
    pub fn new(
        name: &str,
        description: &str,
        attributes: Vec<Attribute>,
        primary_key: &[String],
    ) -> Result<Self> {
        let name = name.trim().to_lowercase();
        if !valid_series_name(&name) {
            return Err(Error::InvalidDefinition(format!(
                "'{}' is not a valid series name",
                name
            )));
        }

        let mut attributes: Vec<Attribute> = attributes
            .into_iter()
            .enumerate()
            .map(|(i, mut a)| {
                a.name = a.name.trim().to_lowercase();
                if a.rank == 0 {
                    a.rank = i as u32 + 1;
                }
                a
            })
            .collect();
        attributes.sort_by_key(|a| a.rank);

        for (i, attr) in attributes.iter().enumerate() {
            if !valid_identifier(&attr.name) || attr.name == RECNUM || attr.name == NRECORDS {
                return Err(Error::InvalidDefinition(format!(
                    "'{}' is not a valid keyword name",
                    attr.name
                )));
            }
            if attributes[..i].iter().any(|a| a.name == attr.name) {
                return Err(Error::InvalidDefinition(format!(
                    "keyword '{}' declared twice",
                    attr.name
                )));
            }
        }

        if primary_key.is_empty() {
            return Err(Error::InvalidDefinition(format!(
                "series {} has no primary key",
                name
            )));
        }
        let mut pk: Vec<String> = Vec::with_capacity(primary_key.len());
        for key in primary_key {
            let key = key.trim().to_lowercase();
            if !attributes.iter().any(|a| a.name == key) {
                return Err(Error::InvalidDefinition(format!(
                    "primary key '{}' is not a keyword of {}",
                    key, name
                )));
            }
            if pk.contains(&key) {
                return Err(Error::InvalidDefinition(format!(
                    "primary key '{}' listed twice",
                    key
                )));
            }
            pk.push(key);
        }

        Ok(Self {
            name,
            description: description.to_string(),
            attributes,
            primary_key: pk,
            shadow: RwLock::new(ShadowState::Unknown),
            sync_trigger: RwLock::new(None),
        })
    }

    /// Lower-cased series name
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Keywords in rank order
    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    /// Ordered primary-key attribute names
    pub fn primary_keys(&self) -> &[String] {
        &self.primary_key
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        let name = name.trim().to_lowercase();
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Type of a keyword
    pub fn attribute_type(&self, name: &str) -> Result<ValueType> {
        self.attribute(name)
            .map(|a| a.ty)
            .ok_or_else(|| Error::UnknownAttribute {
                series: self.name.clone(),
                attribute: name.to_string(),
            })
    }

    pub fn is_primary(&self, name: &str) -> bool {
        let name = name.trim().to_lowercase();
        self.primary_key.contains(&name)
    }

    /// Keyword names in rank order
    pub fn column_names(&self) -> Vec<String> {
        self.attributes.iter().map(|a| a.name.clone()).collect()
    }

    /// Columns shared by the primary table and its shadow index
    pub fn shared_columns(&self) -> Vec<String> {
        let mut cols = self.primary_key.clone();
        cols.push(RECNUM.to_string());
        cols
    }

    /// Primary table relation
    pub fn relation(&self) -> Relation {
        Relation::named(self.name.clone())
    }

    /// Canonical shadow index name
    pub fn shadow_name(&self, suffix: &str) -> String {
        format!("{}{}", self.name, suffix)
    }

    pub fn shadow_state(&self) -> ShadowState {
        *self.shadow.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_shadow_state(&self, state: ShadowState) {
        *self.shadow.write().unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// Last observation of the synchronization trigger
    pub fn sync_trigger(&self) -> Option<bool> {
        *self.sync_trigger.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_sync_trigger(&self, installed: Option<bool>) {
        *self.sync_trigger.write().unwrap_or_else(PoisonError::into_inner) = installed;
    }
}
