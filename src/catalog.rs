//! Wire-type catalog: OID to server type name.

use std::collections::HashMap;

use crate::wire::{Oid, oid};

const BUILTIN_TYPES: &[(Oid, &str)] = &[
    (oid::BOOL, "bool"),
    (oid::BYTEA, "bytea"),
    (oid::CHAR, "char"),
    (oid::NAME, "name"),
    (oid::INT8, "int8"),
    (oid::INT2, "int2"),
    (oid::INT4, "int4"),
    (oid::TEXT, "text"),
    (oid::OID, "oid"),
    (oid::XID, "xid"),
    (oid::CID, "cid"),
    (oid::JSON, "json"),
    (oid::FLOAT4, "float4"),
    (oid::FLOAT8, "float8"),
    (oid::UNKNOWN, "unknown"),
    (oid::INT4_ARRAY, "_int4"),
    (oid::TEXT_ARRAY, "_text"),
    (oid::BPCHAR_ARRAY, "_bpchar"),
    (oid::VARCHAR_ARRAY, "_varchar"),
    (oid::BPCHAR, "bpchar"),
    (oid::VARCHAR, "varchar"),
    (oid::DATE, "date"),
    (oid::TIME, "time"),
    (oid::TIMESTAMP, "timestamp"),
    (oid::TIMESTAMPTZ, "timestamptz"),
    (oid::INTERVAL, "interval"),
    (oid::NUMERIC, "numeric"),
    (oid::UUID, "uuid"),
    (oid::JSONB, "jsonb"),
];

/// Maps type OIDs to their `pg_type.typname`.
///
/// `TypeCatalog::default()` knows the built-in types; a session may register
/// extension or user-defined types it discovered on connect.
#[derive(Debug, Clone)]
pub struct TypeCatalog {
    names: HashMap<Oid, String>,
}

impl Default for TypeCatalog {
    fn default() -> Self {
        let names = BUILTIN_TYPES
            .iter()
            .map(|&(oid, name)| (oid, name.to_string()))
            .collect();
        Self { names }
    }
}

impl TypeCatalog {
    /// Register (or rename) a type.
    pub fn register(&mut self, oid: Oid, name: impl Into<String>) {
        self.names.insert(oid, name.into());
    }

    /// The type name for `oid`, if known.
    pub fn name(&self, oid: Oid) -> Option<&str> {
        self.names.get(&oid).map(String::as_str)
    }
}
