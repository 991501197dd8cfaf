//! Table layouts and MainData → entity field mappings.
//!
//! The scraped MainData table carries two parties per opposition: the primary
//! party and the opponent. Each entity table (Agents, Proprietors) is derived by
//! projecting both roles through a [`RoleMapping`].

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use serde::{Deserialize, Serialize};

pub const MAIN_DATA_TABLE: &str = "MainData";
/// Identity column of MainData rows.
pub const MAIN_IDENTITY: &str = "Opposition Number";

pub const SCRAPED_DATE: &str = "scraped_date";
pub const PHONE_NUMBER: &str = "PhoneNumber";
pub const LEAD: &str = "Lead";
pub const NOTES: &str = "Notes";

/// User-editable columns that reconciliation never overwrites.
pub const ANNOTATION_FIELDS: [&str; 3] = [PHONE_NUMBER, LEAD, NOTES];

/// Which party of a MainData row is being projected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Primary,
    Opponent,
}

/// MainData column names for one role. `code: None` yields a null code.
#[derive(Debug, Clone, Copy)]
pub struct RoleMapping {
    pub code: Option<&'static str>,
    pub name: &'static str,
    pub address: &'static str,
}

/// Layout of one derived entity table.
#[derive(Debug)]
pub struct EntitySpec {
    pub table: &'static str,
    pub code: &'static str,
    /// Identity column. Homonyms collide: two parties with the same name share a row.
    pub name: &'static str,
    pub address: &'static str,
    pub primary: RoleMapping,
    pub opponent: RoleMapping,
    /// Header label prefix used on export ("Agent Name", ...).
    pub label: &'static str,
}

static AGENTS: EntitySpec = EntitySpec {
    table: "Agents",
    code: "AgentCode",
    name: "AgentName",
    address: "AgentAddress",
    primary: RoleMapping {
        code: Some("Agent Code"),
        name: "Agent Name",
        address: "Agent Address",
    },
    opponent: RoleMapping {
        code: None,
        name: "Opponent Agent Name",
        address: "Opponent Agent Address",
    },
    label: "Agent",
};

static PROPRIETORS: EntitySpec = EntitySpec {
    table: "Proprietors",
    code: "ProprietorCode",
    name: "ProprietorName",
    address: "ProprietorAddress",
    primary: RoleMapping {
        code: Some("Proprietor Code"),
        name: "Proprietor Name",
        address: "Proprietor Address",
    },
    opponent: RoleMapping {
        code: Some("Opponent Code"),
        name: "Opponent Name",
        address: "Opponent Address",
    },
    label: "Proprietor",
};

impl EntitySpec {
    pub fn mapping(&self, role: Role) -> &RoleMapping {
        match role {
            Role::Primary => &self.primary,
            Role::Opponent => &self.opponent,
        }
    }

    /// Stored column order.
    pub fn columns(&self) -> [&'static str; 7] {
        [
            self.code,
            self.name,
            self.address,
            PHONE_NUMBER,
            LEAD,
            NOTES,
            SCRAPED_DATE,
        ]
    }

    /// Fields sourced from the scraped snapshot.
    pub fn structural_fields(&self) -> [&'static str; 4] {
        [self.code, self.name, self.address, SCRAPED_DATE]
    }

    /// `(field, header label)` pairs for CSV export.
    pub fn export_columns(&self) -> Vec<(&'static str, String)> {
        vec![
            (self.name, format!("{} Name", self.label)),
            (self.address, format!("{} Address", self.label)),
            (self.code, format!("{} Code", self.label)),
            (SCRAPED_DATE, "Scraped Date".to_string()),
            (PHONE_NUMBER, PHONE_NUMBER.to_string()),
            (LEAD, LEAD.to_string()),
            (NOTES, NOTES.to_string()),
        ]
    }
}

/// Entity tables derived from MainData.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Agent,
    Proprietor,
}

impl EntityKind {
    pub const ALL: [EntityKind; 2] = [EntityKind::Agent, EntityKind::Proprietor];

    pub fn spec(self) -> &'static EntitySpec {
        match self {
            EntityKind::Agent => &AGENTS,
            EntityKind::Proprietor => &PROPRIETORS,
        }
    }

    pub fn table(self) -> &'static str {
        self.spec().table
    }

    /// Identity column of the entity table.
    pub fn identity_field(self) -> &'static str {
        self.spec().name
    }

    /// Look up the entity kind stored under `table`.
    pub fn from_table(table: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.table() == table)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "agent" | "agents" => Ok(EntityKind::Agent),
            "proprietor" | "proprietors" => Ok(EntityKind::Proprietor),
            other => Err(format!("unknown entity table: {other}")),
        }
    }
}

/// Arrow schema for a generic string table with the given columns, all nullable.
pub fn utf8_schema<S: AsRef<str>>(columns: &[S]) -> SchemaRef {
    let fields: Vec<Field> = columns
        .iter()
        .map(|c| Field::new(c.as_ref(), DataType::Utf8, true))
        .collect();
    Arc::new(Schema::new(fields))
}
