use serde::{Deserialize, Serialize};

use invsync_core::{Entity, EntityKey, EntityKind, PartKey};

use crate::part::PartRef;

/// One line of an assembly's bill of materials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BomLine {
    pub assembly: PartKey,
    pub sub_part: PartRef,
    pub quantity: f64,
    pub note: String,
    pub reference: String,
    pub validated: bool,
    pub active: bool,
    pub optional: bool,
}

impl BomLine {
    pub fn new(assembly: PartKey, sub_part: PartRef, quantity: f64) -> Self {
        Self {
            assembly,
            sub_part,
            quantity,
            note: String::new(),
            reference: String::new(),
            validated: false,
            active: true,
            optional: false,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.quantity.is_finite() || self.quantity <= 0.0 {
            return Err(format!(
                "BOM line {} × {} must have a positive quantity",
                self.quantity, self.sub_part
            ));
        }
        if self.sub_part.name.trim().is_empty() {
            return Err("BOM line without sub-part name".to_string());
        }
        Ok(())
    }
}

impl Entity for BomLine {
    const KIND: EntityKind = EntityKind::BomItem;

    fn key(&self) -> EntityKey {
        EntityKey::bom_line(self.assembly.clone(), self.sub_part.key())
    }
}

/// One entry of an on-disk `.bom.json` list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct BomEntry {
    pub sub_part: PartRef,
    #[serde(default = "default_quantity")]
    pub quantity: f64,
    #[serde(default)]
    pub note: String,
    #[serde(default)]
    pub reference: String,
    #[serde(default)]
    pub validated: bool,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub optional: bool,
}

fn default_quantity() -> f64 {
    1.0
}

fn default_true() -> bool {
    true
}

impl BomEntry {
    pub(crate) fn into_line(self, assembly: PartKey) -> BomLine {
        BomLine {
            assembly,
            sub_part: self.sub_part,
            quantity: self.quantity,
            note: self.note,
            reference: self.reference,
            validated: self.validated,
            active: self.active,
            optional: self.optional,
        }
    }

    pub(crate) fn of(line: &BomLine) -> Self {
        Self {
            sub_part: line.sub_part.clone(),
            quantity: line.quantity,
            note: line.note.clone(),
            reference: line.reference.clone(),
            validated: line.validated,
            active: line.active,
            optional: line.optional,
        }
    }
}
