//! Entity kinds known to the remote server.

use serde::{Deserialize, Serialize};

use crate::id::EntityKey;

/// Remote entity type, each with its own REST collection.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Category,
    Company,
    Address,
    Part,
    BomItem,
    ManufacturerPart,
    SupplierPart,
    PriceBreak,
    ParameterTemplate,
    Parameter,
}

impl EntityKind {
    pub const ALL: [EntityKind; 10] = [
        EntityKind::Category,
        EntityKind::Company,
        EntityKind::Address,
        EntityKind::Part,
        EntityKind::BomItem,
        EntityKind::ManufacturerPart,
        EntityKind::SupplierPart,
        EntityKind::PriceBreak,
        EntityKind::ParameterTemplate,
        EntityKind::Parameter,
    ];

    /// Collection path relative to the server base URL (always ends in `/`).
    pub fn endpoint(self) -> &'static str {
        match self {
            EntityKind::Category => "api/part/category/",
            EntityKind::Company => "api/company/",
            EntityKind::Address => "api/company/address/",
            EntityKind::Part => "api/part/",
            EntityKind::BomItem => "api/bom/",
            EntityKind::ManufacturerPart => "api/company/part/manufacturer/",
            EntityKind::SupplierPart => "api/company/part/",
            EntityKind::PriceBreak => "api/company/price-break/",
            EntityKind::ParameterTemplate => "api/part/parameter/template/",
            EntityKind::Parameter => "api/part/parameter/",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Category => "category",
            EntityKind::Company => "company",
            EntityKind::Address => "address",
            EntityKind::Part => "part",
            EntityKind::BomItem => "bom_item",
            EntityKind::ManufacturerPart => "manufacturer_part",
            EntityKind::SupplierPart => "supplier_part",
            EntityKind::PriceBreak => "price_break",
            EntityKind::ParameterTemplate => "parameter_template",
            EntityKind::Parameter => "parameter",
        }
    }
}

impl core::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A locally authored record that maps onto one remote entity.
pub trait Entity {
    /// Remote collection the record is created in.
    const KIND: EntityKind;

    /// Natural key used to detect whether the record already exists remotely.
    fn key(&self) -> EntityKey;
}
