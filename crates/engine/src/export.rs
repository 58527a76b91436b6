use serde::Serialize;

use rackline_core::{AttrFilter, AttrValue};
use rackline_storage::View;

use crate::error::EngineError;
use crate::Inventory;

/// JSON-ready dump of one entity and its attributes at a given view.
#[derive(Debug, Clone, Serialize)]
pub struct EntityDump {
    pub name: String,
    pub kind: String,
    pub driver: String,
    pub version: u64,
    pub attrs: Vec<AttrDump>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AttrDump {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subkey: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number: Option<i64>,
    pub datatype: &'static str,
    pub value: serde_json::Value,
}

fn dump_value(inv: &Inventory, value: &AttrValue, view: View) -> Result<serde_json::Value, EngineError> {
    Ok(match value {
        AttrValue::Int(n) => serde_json::json!(n),
        AttrValue::Text(s) => serde_json::json!(s),
        AttrValue::DateTime(ms) => serde_json::json!(ms),
        AttrValue::Relation(id) => match inv.entity(*id, view)? {
            Some(record) => serde_json::json!(record.name),
            None => serde_json::json!(id.as_i64()),
        },
    })
}

pub fn export_entity(inv: &Inventory, name: &str, view: View) -> Result<EntityDump, EngineError> {
    let record = inv
        .get_record(name, view)?
        .ok_or_else(|| EngineError::NotFound(name.to_string()))?;
    let mut attrs = Vec::new();
    for attr in inv.attrs(record.entity_id, &AttrFilter::default(), view)? {
        attrs.push(AttrDump {
            key: attr.key.clone(),
            subkey: attr.subkey.clone(),
            number: attr.number,
            datatype: attr.value.datatype(),
            value: dump_value(inv, &attr.value, view)?,
        });
    }
    Ok(EntityDump {
        name: record.name,
        kind: record.kind,
        driver: record.driver,
        version: record.version.as_u64(),
        attrs,
    })
}

pub fn export_json(inv: &Inventory, name: &str, view: View) -> Result<String, EngineError> {
    let dump = export_entity(inv, name, view)?;
    serde_json::to_string_pretty(&dump).map_err(|e| EngineError::Serialization(e.to_string()))
}
