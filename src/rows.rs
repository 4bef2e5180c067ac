//! Row cursor over a native row stream.

use std::sync::Arc;

use crate::catalog::TypeCatalog;
use crate::decode::{DecodeRegistry, Decoder};
use crate::error::{Error, Result};
use crate::native::RowStream;
use crate::sql;
use crate::value::{ScanType, Value};
use crate::wire::{FieldDescription, FormatCode, oid};

/// Size of the length header counted in varlena type modifiers.
const VAR_HEADER_SIZE: i32 = 4;

/// Decode plan for one column.
#[derive(Debug, Clone, Copy)]
struct ColumnPlan {
    decoder: Decoder,
    /// Format the server used for this column in this result.
    format: FormatCode,
}

/// Cursor state.
#[derive(Debug)]
enum Plan {
    /// No row decoded yet.
    Unbound,
    /// One decoder per column, chosen on the first row.
    Bound(Vec<ColumnPlan>),
}

/// Rows of one query.
///
/// Created with the first row already fetched, so column metadata is
/// available before the caller asks for any row.
pub struct Rows<R> {
    stream: R,
    catalog: Arc<TypeCatalog>,
    registry: &'static DecodeRegistry,
    columns: Vec<String>,
    /// Result of the fetch done at query time, consumed by the first `next`.
    prefetched: Option<bool>,
    plan: Plan,
    closed: bool,
}

impl<R: RowStream> Rows<R> {
    /// Wrap a stream that has already been advanced once, returning `more`.
    pub(crate) fn new(stream: R, catalog: Arc<TypeCatalog>, more: bool) -> Self {
        let columns = stream
            .field_descriptions()
            .iter()
            .map(|field| field.name.clone())
            .collect();
        Self {
            stream,
            catalog,
            registry: DecodeRegistry::builtin(),
            columns,
            prefetched: Some(more),
            plan: Plan::Unbound,
            closed: false,
        }
    }

    fn field(&self, index: usize) -> Option<&FieldDescription> {
        self.stream.field_descriptions().get(index)
    }

    fn bind(&mut self) {
        if let Plan::Unbound = self.plan {
            let columns = self
                .stream
                .field_descriptions()
                .iter()
                .map(|field| ColumnPlan {
                    decoder: *self.registry.get(field.type_oid),
                    format: field.format,
                })
                .collect();
            self.plan = Plan::Bound(columns);
        }
    }
}

impl<R: RowStream> sql::Rows for Rows<R> {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    fn next(&mut self, dest: &mut [Value]) -> Result<bool> {
        if self.closed {
            return Ok(false);
        }
        if dest.len() < self.columns.len() {
            return Err(Error::InvalidUsage(format!(
                "expected {} destination slots, got {}",
                self.columns.len(),
                dest.len()
            )));
        }
        let more = match self.prefetched.take() {
            Some(more) => more,
            None => self.stream.advance()?,
        };
        if !more {
            return Ok(false);
        }

        self.bind();
        if let Plan::Bound(columns) = &self.plan {
            for (index, (column, slot)) in columns.iter().zip(dest.iter_mut()).enumerate() {
                *slot = column
                    .decoder
                    .decode(column.format, self.stream.raw_value(index))
                    .map_err(|e| Error::scan_field(index, e))?;
            }
        }
        Ok(true)
    }

    fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            self.stream.close();
        }
        Ok(())
    }

    fn column_type_database_type_name(&self, index: usize) -> Option<String> {
        let field = self.field(index)?;
        self.catalog
            .name(field.type_oid)
            .map(|name| name.to_uppercase())
    }

    fn column_type_length(&self, index: usize) -> Option<i64> {
        let field = self.field(index)?;
        match field.type_oid {
            oid::TEXT | oid::BYTEA => Some(i64::MAX),
            oid::VARCHAR | oid::BPCHAR_ARRAY => {
                Some(i64::from(field.type_modifier) - i64::from(VAR_HEADER_SIZE))
            }
            _ => None,
        }
    }

    fn column_type_precision_scale(&self, index: usize) -> Option<(i64, i64)> {
        let field = self.field(index)?;
        if field.type_oid != oid::NUMERIC || field.type_modifier < VAR_HEADER_SIZE {
            return None;
        }
        let modifier = field.type_modifier - VAR_HEADER_SIZE;
        let precision = (modifier >> 16) & 0xffff;
        let scale = modifier & 0xffff;
        Some((i64::from(precision), i64::from(scale)))
    }

    fn column_type_scan_type(&self, index: usize) -> ScanType {
        let Some(field) = self.field(index) else {
            return ScanType::Any;
        };
        match field.type_oid {
            oid::FLOAT8 => ScanType::Float64,
            oid::FLOAT4 => ScanType::Float32,
            oid::INT8 => ScanType::Int64,
            oid::INT4 => ScanType::Int32,
            oid::INT2 => ScanType::Int16,
            oid::VARCHAR | oid::BPCHAR_ARRAY | oid::TEXT => ScanType::String,
            oid::BOOL => ScanType::Bool,
            oid::NUMERIC => ScanType::Float64,
            oid::DATE | oid::TIMESTAMP | oid::TIMESTAMPTZ => ScanType::Timestamp,
            oid::BYTEA => ScanType::Bytes,
            _ => ScanType::Any,
        }
    }
}
