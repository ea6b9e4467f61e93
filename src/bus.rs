//! Process-wide registry of named fields.
//!
//! The bus is filled during a single registration pass, then sealed when the
//! scheduler is built. Handles returned from registration or lookup share the
//! field's storage and stay valid for as long as the process runs.
//!
//! Erased views follow the same access rules as typed handles: only
//! read-write fields can be written without the owner's handle. A ground
//! mirror bus additionally accepts decoded downlink frames into every
//! downlinked field.

use crate::error::{ConfigError, ConfigResult};
use crate::field::{
    Access, AnyField, AnyWritableField, Field, FieldValue, ReadableField, Telemetry, WritableField,
};
use crate::serializer::Serializer;
use std::any::{type_name, Any};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

struct Entry {
    erased: Arc<dyn AnyField>,
    writer: Arc<dyn AnyWritableField>,
    typed: Arc<dyn Any + Send + Sync>,
}

#[derive(Default)]
pub struct StateFieldBus {
    entries: Vec<Entry>,
    index: HashMap<&'static str, usize>,
    sealed: bool,
    mirror: bool,
}

impl StateFieldBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ground-side bus that mirrors flight registrations and is filled from
    /// received downlink frames.
    pub fn ground_mirror() -> Self {
        Self {
            mirror: true,
            ..Self::default()
        }
    }

    pub fn is_mirror(&self) -> bool {
        self.mirror
    }

    /// Adds a field and hands its owner a writable handle. Fails on a
    /// duplicate name or once the bus is sealed.
    pub fn register<T, S>(
        &mut self,
        name: &'static str,
        initial: T,
        serializer: S,
        access: Access,
        telemetry: Telemetry,
    ) -> ConfigResult<WritableField<T>>
    where
        T: FieldValue,
        S: Serializer<T> + 'static,
    {
        if self.sealed {
            return Err(ConfigError::BusSealed(name.to_string()));
        }
        if self.index.contains_key(name) {
            return Err(ConfigError::DuplicateField(name.to_string()));
        }

        let field = Arc::new(Field::new(
            name,
            initial,
            Box::new(serializer),
            access,
            telemetry,
        ));
        debug!(field = name, bits = field.bit_width(), ?access, "registered field");

        self.index.insert(name, self.entries.len());
        self.entries.push(Entry {
            erased: Arc::clone(&field) as Arc<dyn AnyField>,
            writer: Arc::clone(&field) as Arc<dyn AnyWritableField>,
            typed: Arc::clone(&field) as Arc<dyn Any + Send + Sync>,
        });
        Ok(WritableField::new(field))
    }

    /// Registers a downlinked field other tasks may only read.
    pub fn register_readable<T, S>(
        &mut self,
        name: &'static str,
        initial: T,
        serializer: S,
    ) -> ConfigResult<WritableField<T>>
    where
        T: FieldValue,
        S: Serializer<T> + 'static,
    {
        self.register(name, initial, serializer, Access::ReadOnly, Telemetry::Downlinked)
    }

    /// Registers a downlinked field that other tasks and the ground may write.
    pub fn register_readable_writable<T, S>(
        &mut self,
        name: &'static str,
        initial: T,
        serializer: S,
    ) -> ConfigResult<WritableField<T>>
    where
        T: FieldValue,
        S: Serializer<T> + 'static,
    {
        self.register(name, initial, serializer, Access::ReadWrite, Telemetry::Downlinked)
    }

    fn typed<T: FieldValue>(&self, name: &str) -> ConfigResult<Arc<Field<T>>> {
        let entry = self
            .entry(name)
            .ok_or_else(|| ConfigError::MissingField(name.to_string()))?;

        Arc::clone(&entry.typed)
            .downcast::<Field<T>>()
            .map_err(|_| ConfigError::TypeMismatch {
                name: name.to_string(),
                actual: entry.erased.value_type(),
                requested: type_name::<T>(),
            })
    }

    pub fn find_readable<T: FieldValue>(
        &self,
        name: &str,
    ) -> ConfigResult<ReadableField<T>> {
        self.typed(name).map(ReadableField::new)
    }

    /// Only fields registered as [`Access::ReadWrite`] can be found writable.
    pub fn find_writable<T: FieldValue>(
        &self,
        name: &str,
    ) -> ConfigResult<WritableField<T>> {
        let field = self.typed::<T>(name)?;
        if field.access() != Access::ReadWrite {
            return Err(ConfigError::NotWritable(name.to_string()));
        }
        Ok(WritableField::new(field))
    }

    pub fn seal(&mut self) {
        if !self.sealed {
            debug!(fields = self.entries.len(), "bus sealed");
        }
        self.sealed = true;
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn field_names(&self) -> Vec<&'static str> {
        self.entries.iter().map(|e| e.erased.name()).collect()
    }

    fn entry(&self, name: &str) -> Option<&Entry> {
        self.index.get(name).and_then(|&i| self.entries.get(i))
    }

    pub fn field(&self, name: &str) -> Option<Arc<dyn AnyField>> {
        self.entry(name).map(|e| Arc::clone(&e.erased))
    }

    /// Erased write view, `None` for missing or read-only fields.
    pub fn writable_field(&self, name: &str) -> Option<Arc<dyn AnyWritableField>> {
        self.entry(name)
            .filter(|e| e.erased.access() == Access::ReadWrite)
            .map(|e| Arc::clone(&e.writer))
    }

    /// Downlinked fields in registration order.
    pub fn telemetry_fields(&self) -> Vec<Arc<dyn AnyField>> {
        self.entries
            .iter()
            .filter(|e| e.erased.telemetry() == Telemetry::Downlinked)
            .map(|e| Arc::clone(&e.erased))
            .collect()
    }

    /// Ground-writable fields in registration order. Uplink indices are
    /// positions in this list, starting at 1.
    pub fn writable_fields(&self) -> Vec<Arc<dyn AnyWritableField>> {
        self.entries
            .iter()
            .filter(|e| e.erased.access() == Access::ReadWrite)
            .map(|e| Arc::clone(&e.writer))
            .collect()
    }

    /// Write views of the downlinked fields, only on a ground mirror.
    pub(crate) fn mirror_sinks(&self) -> Option<Vec<Arc<dyn AnyWritableField>>> {
        self.mirror.then(|| {
            self.entries
                .iter()
                .filter(|e| e.erased.telemetry() == Telemetry::Downlinked)
                .map(|e| Arc::clone(&e.writer))
                .collect()
        })
    }

    /// Sum of the compact widths of all downlinked fields.
    pub fn telemetry_bits(&self) -> usize {
        self.telemetry_fields().iter().map(|f| f.bit_width()).sum()
    }
}

impl core::fmt::Debug for StateFieldBus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("StateFieldBus")
            .field("fields", &self.field_names())
            .field("sealed", &self.sealed)
            .field("mirror", &self.mirror)
            .finish()
    }
}
