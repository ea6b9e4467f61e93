//! Named, typed value slots and the handles tasks hold on them.

use crate::bitstream::BitStream;
use crate::serializer::Serializer;
use core::fmt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::any::type_name;
use std::sync::{Arc, PoisonError, RwLock};

/// Anything that can live in a field: cloneable, shareable across task
/// threads, and representable as JSON for the debug console.
pub trait FieldValue: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {}

impl<T> FieldValue for T where T: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {}

/// Permission class fixed at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Access {
    ReadOnly,
    ReadWrite,
}

/// Whether a field is part of the downlink frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Telemetry {
    Downlinked,
    Internal,
}

pub struct Field<T> {
    name: &'static str,
    access: Access,
    telemetry: Telemetry,
    value: RwLock<T>,
    serializer: Box<dyn Serializer<T>>,
}

impl<T: FieldValue> Field<T> {
    pub(crate) fn new(
        name: &'static str,
        initial: T,
        serializer: Box<dyn Serializer<T>>,
        access: Access,
        telemetry: Telemetry,
    ) -> Self {
        Self {
            name,
            access,
            telemetry,
            value: RwLock::new(initial),
            serializer,
        }
    }

    // A writer that panicked left the previous complete value behind, so a
    // poisoned lock still guards a valid value.
    fn get(&self) -> T {
        self.value
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set(&self, value: T) {
        *self.value.write().unwrap_or_else(PoisonError::into_inner) = value;
    }

    fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.value.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }
}

/// Type-erased read view used by the bus and the telemetry codec.
pub trait AnyField: Send + Sync {
    fn name(&self) -> &'static str;
    fn access(&self) -> Access;
    fn telemetry(&self) -> Telemetry;
    fn bit_width(&self) -> usize;
    fn value_type(&self) -> &'static str;
    fn pack_into(&self, stream: &mut BitStream<'_>);
    fn value_json(&self) -> serde_json::Value;
}

/// Type-erased write view. The bus hands these out only for
/// [`Access::ReadWrite`] fields, or for every downlinked field of a ground
/// mirror bus.
pub trait AnyWritableField: AnyField {
    fn unpack_from(&self, stream: &mut BitStream<'_>);
    fn set_json(&self, value: serde_json::Value) -> Result<(), serde_json::Error>;
}

impl<T: FieldValue> AnyField for Field<T> {
    fn name(&self) -> &'static str {
        self.name
    }

    fn access(&self) -> Access {
        self.access
    }

    fn telemetry(&self) -> Telemetry {
        self.telemetry
    }

    fn bit_width(&self) -> usize {
        self.serializer.bit_width()
    }

    fn value_type(&self) -> &'static str {
        type_name::<T>()
    }

    fn pack_into(&self, stream: &mut BitStream<'_>) {
        let value = self.get();
        self.serializer.pack(&value, stream);
    }

    fn value_json(&self) -> serde_json::Value {
        serde_json::to_value(self.get()).unwrap_or(serde_json::Value::Null)
    }
}

impl<T: FieldValue> AnyWritableField for Field<T> {
    fn unpack_from(&self, stream: &mut BitStream<'_>) {
        let value = self.serializer.unpack(stream);
        self.set(value);
    }

    fn set_json(&self, value: serde_json::Value) -> Result<(), serde_json::Error> {
        self.set(serde_json::from_value(value)?);
        Ok(())
    }
}

/// Read access to a field. Cheap to clone, valid for the process lifetime.
pub struct ReadableField<T> {
    field: Arc<Field<T>>,
}

impl<T: FieldValue> ReadableField<T> {
    pub(crate) fn new(field: Arc<Field<T>>) -> Self {
        Self { field }
    }

    pub fn name(&self) -> &'static str {
        self.field.name
    }

    pub fn get(&self) -> T {
        self.field.get()
    }
}

/// Read and write access to a field.
pub struct WritableField<T> {
    field: Arc<Field<T>>,
}

impl<T: FieldValue> WritableField<T> {
    pub(crate) fn new(field: Arc<Field<T>>) -> Self {
        Self { field }
    }

    pub fn name(&self) -> &'static str {
        self.field.name
    }

    pub fn get(&self) -> T {
        self.field.get()
    }

    pub fn set(&self, value: T) {
        self.field.set(value);
    }

    /// Read-modify-write under a single write lock. Other readers see either
    /// the old value or the new one, never a mix.
    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        self.field.update(f)
    }

    pub fn readable(&self) -> ReadableField<T> {
        ReadableField::new(Arc::clone(&self.field))
    }
}

impl<T> Clone for ReadableField<T> {
    fn clone(&self) -> Self {
        Self {
            field: Arc::clone(&self.field),
        }
    }
}

impl<T> Clone for WritableField<T> {
    fn clone(&self) -> Self {
        Self {
            field: Arc::clone(&self.field),
        }
    }
}

impl<T> fmt::Debug for ReadableField<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadableField")
            .field("name", &self.field.name)
            .finish()
    }
}

impl<T> fmt::Debug for WritableField<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WritableField")
            .field("name", &self.field.name)
            .finish()
    }
}
