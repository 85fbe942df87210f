//! Execution context passed to every hook, plus application metadata.
//!
//! A [`Context`] is created per command execution and shared by that
//! execution's before, action, and after hooks. It carries the resolved
//! command path, the remaining (unparsed) arguments, and the lifecycle
//! [`Position`] marker that tagging instrumentation stamps onto it.
//!
//! The position marker deliberately lives on the per-execution context
//! rather than in the application's shared [`Metadata`] store: two runs
//! against the same application can never observe each other's marker.

use std::any::{Any, TypeId};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::app::App;

/// Lifecycle position of the currently executing hook.
///
/// `Display` renders the wire-level tags `$before`, `$current`, `$after`,
/// which is what position-aware middleware typically logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    /// Running inside the before-hook.
    Before,
    /// Running inside the action itself.
    Current,
    /// Running inside the after-hook.
    After,
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Position::Before => write!(f, "$before"),
            Position::Current => write!(f, "$current"),
            Position::After => write!(f, "$after"),
        }
    }
}

/// Per-execution state handed to every hook invocation.
pub struct Context<'a> {
    app: &'a App,
    command_path: Vec<String>,
    args: Vec<String>,
    position: Cell<Option<Position>>,
}

impl<'a> Context<'a> {
    /// Creates a context for one command execution.
    ///
    /// `command_path` is the resolved chain of command names (empty for the
    /// application root); `args` are the remaining arguments after command
    /// resolution. Mainly useful for integrations and tests; `App::run`
    /// constructs contexts itself.
    pub fn new(app: &'a App, command_path: Vec<String>, args: Vec<String>) -> Self {
        Self {
            app,
            command_path,
            args,
            position: Cell::new(None),
        }
    }

    /// Creates a root context (no command resolved).
    pub fn root(app: &'a App) -> Self {
        Self::new(app, Vec::new(), Vec::new())
    }

    /// The application this execution belongs to.
    pub fn app(&self) -> &'a App {
        self.app
    }

    /// The resolved command chain, outermost first. Empty at the root.
    pub fn command_path(&self) -> &[String] {
        &self.command_path
    }

    /// Name of the innermost resolved command, or `""` at the root.
    pub fn command_name(&self) -> &str {
        self.command_path
            .last()
            .map(String::as_str)
            .unwrap_or_default()
    }

    /// Arguments remaining after command resolution, unparsed.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Stamps the lifecycle position marker for the currently executing
    /// hook. Called by tagging instrumentation immediately before it
    /// invokes the user middleware.
    pub fn tag_position(&self, position: Position) {
        self.position.set(Some(position));
    }

    /// The most recently stamped position marker, or `None` when no tagging
    /// instrumentation ran during this execution.
    pub fn position(&self) -> Option<Position> {
        self.position.get()
    }
}

impl fmt::Debug for Context<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("command_path", &self.command_path)
            .field("args", &self.args)
            .field("position", &self.position.get())
            .finish()
    }
}

/// Application-scoped key-value store for out-of-band signaling.
///
/// Keys are types: each `T` has at most one entry, retrieved by type. This
/// is the framework's generic side channel; values are reference-counted so
/// `get` hands out shared handles without cloning payloads.
#[derive(Default)]
pub struct Metadata {
    entries: RefCell<HashMap<TypeId, Rc<dyn Any>>>,
}

impl Metadata {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a value, replacing any previous entry of the same type.
    pub fn insert<T: 'static>(&self, value: T) {
        self.entries
            .borrow_mut()
            .insert(TypeId::of::<T>(), Rc::new(value));
    }

    /// Retrieves the entry of type `T`, if present.
    pub fn get<T: 'static>(&self) -> Option<Rc<T>> {
        let entry = self.entries.borrow().get(&TypeId::of::<T>()).cloned()?;
        entry.downcast::<T>().ok()
    }

    /// True if an entry of type `T` is present.
    pub fn contains<T: 'static>(&self) -> bool {
        self.entries.borrow().contains_key(&TypeId::of::<T>())
    }

    /// Removes and returns the entry of type `T`, if present.
    pub fn remove<T: 'static>(&self) -> Option<Rc<T>> {
        let entry = self.entries.borrow_mut().remove(&TypeId::of::<T>())?;
        entry.downcast::<T>().ok()
    }
}

impl fmt::Debug for Metadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Metadata")
            .field("entries", &self.entries.borrow().len())
            .finish()
    }
}
