//! Kind-specific configuration payloads and the factories that create them.
//!
//! A declaration never inspects its payload. It only needs to:
//! - assign a mapping of options onto a fresh instance
//! - merge two instances with the second taking precedence
//! - finalize (normalize and fill defaults)
//! - deep-copy
//!
//! Payloads are stored as `Box<dyn ConfigPayload>`. Typed access goes through
//! [`Any`] downcasting.

use serde_json::Value;
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::Result;

/// Option assignments handed to a payload, keyed by option name.
pub type Options = BTreeMap<String, Value>;

/// Trait implemented by every kind-specific configuration type.
pub trait ConfigPayload: fmt::Debug + Send + Sync + 'static {
    /// Assign options onto this instance. Keys the payload does not know are
    /// its own concern; built-in payloads record them and report them from
    /// [`ConfigPayload::validate`].
    fn set_options(&mut self, options: &Options);

    /// Combine `self` (base) with `other` (override). Fields set on `other`
    /// win; fields only set on `self` survive.
    fn merge(&self, other: &dyn ConfigPayload) -> Box<dyn ConfigPayload>;

    /// Normalize and apply defaults.
    fn finalize(&mut self) -> Result<()>;

    /// Human-readable problems with this configuration.
    fn validate(&self) -> Vec<String> {
        Vec::new()
    }

    fn clone_box(&self) -> Box<dyn ConfigPayload>;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl Clone for Box<dyn ConfigPayload> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

impl dyn ConfigPayload {
    pub fn downcast_ref<T: ConfigPayload>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    pub fn downcast_mut<T: ConfigPayload>(&mut self) -> Option<&mut T> {
        self.as_any_mut().downcast_mut::<T>()
    }

    pub fn is<T: ConfigPayload>(&self) -> bool {
        self.as_any().is::<T>()
    }
}

/// Merge helper for payload implementations.
///
/// Downcasts `other` to `T` and combines with `f`. When `other` is a
/// different payload type the override replaces the base wholesale.
pub fn merge_typed<T, F>(base: &T, other: &dyn ConfigPayload, f: F) -> Box<dyn ConfigPayload>
where
    T: ConfigPayload,
    F: FnOnce(&T, &T) -> T,
{
    match other.downcast_ref::<T>() {
        Some(other) => Box::new(f(base, other)),
        None => other.clone_box(),
    }
}

/// Produces fresh, empty payload instances for one kind.
pub trait SchemaFactory: Send + Sync {
    fn instantiate(&self) -> Box<dyn ConfigPayload>;
}

impl<F> SchemaFactory for F
where
    F: Fn() -> Box<dyn ConfigPayload> + Send + Sync,
{
    fn instantiate(&self) -> Box<dyn ConfigPayload> {
        self()
    }
}

/// Factory that instantiates `T::default()`.
pub struct DefaultSchema<T>(PhantomData<fn() -> T>);

impl<T> DefaultSchema<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for DefaultSchema<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ConfigPayload + Default> SchemaFactory for DefaultSchema<T> {
    fn instantiate(&self) -> Box<dyn ConfigPayload> {
        Box::new(T::default())
    }
}

/// Shared factory for `T::default()`.
pub fn schema_of<T: ConfigPayload + Default>() -> Arc<dyn SchemaFactory> {
    Arc::new(DefaultSchema::<T>::new())
}

/// Payload bound to kinds that have no registered schema. Ignores every
/// option and never fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DummyConfig;

impl ConfigPayload for DummyConfig {
    fn set_options(&mut self, _options: &Options) {}

    fn merge(&self, _other: &dyn ConfigPayload) -> Box<dyn ConfigPayload> {
        Box::new(DummyConfig)
    }

    fn finalize(&mut self) -> Result<()> {
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn ConfigPayload> {
        Box::new(*self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Factory for [`DummyConfig`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DummySchema;

impl SchemaFactory for DummySchema {
    fn instantiate(&self) -> Box<dyn ConfigPayload> {
        Box::new(DummyConfig)
    }
}
