//! Record → request body translation. Local references arrive already
//! translated into remote ids.

use serde_json::{Value, json};

use invsync_core::RemoteId;
use invsync_records::{Address, BomLine, Category, Company, Part, PriceBreak, SupplierAssociation};
use invsync_remote::Payload;

fn object(value: Value) -> Payload {
    match value {
        Value::Object(map) => map,
        _ => Payload::new(),
    }
}

fn id_or_null(id: Option<RemoteId>) -> Value {
    id.map_or(Value::Null, |id| Value::from(id.get()))
}

pub(crate) fn category(category: &Category, parent: Option<RemoteId>) -> Payload {
    object(json!({
        "name": category.name(),
        "description": category.description,
        "parent": id_or_null(parent),
        "default_keywords": category.default_keywords.as_deref().unwrap_or_default(),
    }))
}

pub(crate) fn company(company: &Company) -> Payload {
    let mut payload = object(json!({
        "name": company.name,
        "description": company.description,
        "website": company.website,
        "phone": company.phone,
        "email": company.email,
        "is_manufacturer": company.is_manufacturer,
        "is_supplier": company.is_supplier,
        "is_customer": company.is_customer,
    }));
    if let Some(currency) = &company.currency {
        payload.insert("currency".to_string(), Value::from(currency.as_str()));
    }
    payload
}

pub(crate) fn address(company: RemoteId, address: &Address) -> Payload {
    object(json!({
        "company": company.get(),
        "title": address.title,
        "line1": address.line1,
        "line2": address.line2,
        "postal_code": address.postal_code,
        "postal_city": address.postal_city,
        "province": address.province,
        "country": address.country,
        "primary": address.primary,
    }))
}

pub(crate) fn part(part: &Part, category: Option<RemoteId>, variant_of: Option<RemoteId>) -> Payload {
    let flags = &part.flags;
    object(json!({
        "name": part.key.name,
        "revision": part.key.revision.as_deref().unwrap_or_default(),
        "IPN": part.ipn.as_deref().unwrap_or_default(),
        "description": part.description,
        "keywords": part.keywords,
        "units": part.units,
        "category": id_or_null(category),
        "variant_of": id_or_null(variant_of),
        "assembly": flags.assembly,
        "component": flags.component,
        "trackable": flags.trackable,
        "purchaseable": flags.purchaseable,
        "salable": flags.salable,
        "virtual": flags.is_virtual,
        "is_template": flags.is_template,
        "active": flags.active,
    }))
}

pub(crate) fn bom_line(line: &BomLine, assembly: RemoteId, sub_part: RemoteId) -> Payload {
    object(json!({
        "part": assembly.get(),
        "sub_part": sub_part.get(),
        "quantity": line.quantity,
        "note": line.note,
        "reference": line.reference,
        "validated": line.validated,
        "active": line.active,
        "optional": line.optional,
    }))
}

pub(crate) fn parameter_template(name: &str) -> Payload {
    object(json!({ "name": name, "units": "" }))
}

pub(crate) fn parameter(part: RemoteId, template: RemoteId, data: &str) -> Payload {
    object(json!({ "part": part.get(), "template": template.get(), "data": data }))
}

pub(crate) fn manufacturer_part(part: RemoteId, manufacturer: RemoteId, mpn: &str) -> Payload {
    object(json!({ "part": part.get(), "manufacturer": manufacturer.get(), "MPN": mpn }))
}

pub(crate) fn supplier_part(
    association: &SupplierAssociation,
    part: RemoteId,
    supplier: RemoteId,
    manufacturer_part: Option<RemoteId>,
) -> Payload {
    object(json!({
        "part": part.get(),
        "supplier": supplier.get(),
        "SKU": association.sku,
        "description": association.description,
        "link": association.link,
        "packaging": association.packaging,
        "manufacturer_part": id_or_null(manufacturer_part),
    }))
}

pub(crate) fn price_break(supplier_part: RemoteId, price: &PriceBreak) -> Payload {
    let mut payload = object(json!({
        "part": supplier_part.get(),
        "quantity": price.quantity,
        "price": price.price,
    }));
    if let Some(currency) = &price.currency {
        payload.insert("price_currency".to_string(), Value::from(currency.as_str()));
    }
    payload
}

#[cfg(test)]
mod tests {
    use super::*;
    use invsync_core::PartKey;

    #[test]
    fn part_payload_uses_server_field_names() {
        let mut part = Part::new(PartKey::new("Leg", Some("B".into())).unwrap()).with_ipn("LEG-B");
        part.flags.is_virtual = true;
        let payload = part_payload_value(&part);
        assert_eq!(payload["IPN"], "LEG-B");
        assert_eq!(payload["revision"], "B");
        assert_eq!(payload["virtual"], true);
        assert_eq!(payload["category"], 3);
        assert_eq!(payload["variant_of"], Value::Null);
    }

    fn part_payload_value(part: &Part) -> Value {
        Value::Object(super::part(part, Some(RemoteId(3)), None))
    }

    #[test]
    fn root_categories_have_null_parent() {
        let root = Category::new("Warehouse1".parse().unwrap()).with_description("Main");
        let payload = category(&root, None);
        assert_eq!(payload["name"], "Warehouse1");
        assert_eq!(payload["parent"], Value::Null);
        assert_eq!(payload["description"], "Main");
    }
}
