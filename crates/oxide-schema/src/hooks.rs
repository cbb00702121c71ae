//! Lifecycle hooks and schema events.
//!
//! Record hooks ([`OnLoad`], [`OnPut`]) run synchronously on every record
//! that passes through the store. Start hooks ([`StartHook`]) are queued
//! while schemas are registered and drained once by
//! [`Catalog::start`](crate::Catalog::start), after the whole catalog has
//! converged.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::Result;
use crate::registry::Catalog;
use crate::schema::SchemaDefinition;
use crate::value::Record;

/// A boxed future that is Send.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Transforms every record loaded from the table.
pub trait OnLoad: Send + Sync {
    /// Adjusts the record in place.
    fn on_load(&self, record: &mut Record);
}

impl<F> OnLoad for F
where
    F: Fn(&mut Record) + Send + Sync,
{
    fn on_load(&self, record: &mut Record) {
        self(record);
    }
}

/// Transforms every record before it is written.
pub trait OnPut: Send + Sync {
    /// Adjusts the record in place.
    fn on_put(&self, record: &mut Record);
}

impl<F> OnPut for F
where
    F: Fn(&mut Record) + Send + Sync,
{
    fn on_put(&self, record: &mut Record) {
        self(record);
    }
}

/// A hook run once at process start (onCreate, onChange, or registered
/// with [`Catalog::on_start`](crate::Catalog::on_start)).
///
/// # Example
///
/// ```
/// use oxide_schema::{BoxFuture, Catalog, StartHook, record};
///
/// struct SeedGroups;
///
/// impl StartHook for SeedGroups {
///     fn run<'a>(&'a self, catalog: &'a Catalog) -> BoxFuture<'a, oxide_schema::Result<()>> {
///         Box::pin(async move {
///             catalog.put_one("UserGroups", &record! { "groupName" => "admin" }).await?;
///             Ok(())
///         })
///     }
/// }
/// ```
pub trait StartHook: Send + Sync {
    /// Runs the hook against the converged catalog.
    fn run<'a>(&'a self, catalog: &'a Catalog) -> BoxFuture<'a, Result<()>>;
}

/// Hooks attached to a schema.
#[derive(Clone, Default)]
pub struct SchemaHooks {
    /// Applied to every loaded record.
    pub on_load: Option<Arc<dyn OnLoad>>,
    /// Applied to every record before it is written.
    pub on_put: Option<Arc<dyn OnPut>>,
    /// Queued when the table is created.
    pub on_create: Option<Arc<dyn StartHook>>,
    /// Queued when the table is altered.
    pub on_change: Option<Arc<dyn StartHook>>,
}

impl fmt::Debug for SchemaHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaHooks")
            .field("on_load", &self.on_load.is_some())
            .field("on_put", &self.on_put.is_some())
            .field("on_create", &self.on_create.is_some())
            .field("on_change", &self.on_change.is_some())
            .finish()
    }
}

/// Event names handlers can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Every start hook has run.
    Ready,
    /// A table is about to be altered.
    BeforeChange,
    /// A table was altered.
    AfterChange,
    /// A row is about to be deleted.
    Remove,
}

/// An event fired by the catalog.
#[derive(Debug, Clone, Copy)]
pub enum SchemaEvent<'a> {
    /// Every start hook has run.
    Ready,
    /// The first statement of a plan is about to be executed.
    BeforeChange {
        /// The schema being reconciled.
        schema: &'a SchemaDefinition,
    },
    /// The whole plan ran and at least one operation was applied.
    AfterChange {
        /// The schema that was reconciled.
        schema: &'a SchemaDefinition,
        /// Number of operations applied.
        applied: usize,
    },
    /// A row matched by `remove` is about to be deleted.
    Remove {
        /// The schema the row belongs to.
        schema: &'a SchemaDefinition,
        /// The row.
        row: &'a Record,
    },
}

impl SchemaEvent<'_> {
    /// Returns the event's kind.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Ready => EventKind::Ready,
            Self::BeforeChange { .. } => EventKind::BeforeChange,
            Self::AfterChange { .. } => EventKind::AfterChange,
            Self::Remove { .. } => EventKind::Remove,
        }
    }
}

/// Event handler.
pub type EventHandler = Arc<dyn Fn(&SchemaEvent<'_>) + Send + Sync>;

/// Dispatches schema events to subscribed handlers, in subscription order.
#[derive(Clone, Default)]
pub struct EventBus {
    handlers: Vec<(EventKind, EventHandler)>,
}

impl EventBus {
    /// Creates an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes a handler to one kind of event.
    pub fn on(&mut self, kind: EventKind, handler: impl Fn(&SchemaEvent<'_>) + Send + Sync + 'static) {
        self.handlers.push((kind, Arc::new(handler)));
    }

    /// Fires an event.
    pub fn fire(&self, event: &SchemaEvent<'_>) {
        let kind = event.kind();
        for (_, handler) in self.handlers.iter().filter(|(k, _)| *k == kind) {
            handler(event);
        }
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}
