//! # wiretap-app — minimal hierarchical command framework surface
//!
//! A deliberately small command framework: an [`App`] owns a tree of
//! [`Command`]s, each node carrying optional `before` / `action` / `after`
//! lifecycle hooks in shared, identity-bearing [`Slot`]s, plus
//! application-level slots for command-not-found, usage-error, and
//! exit-error handling and process-wide hooks for help and flag rendering.
//!
//! This crate exists to be *instrumented*: every hook lives in a mutable
//! cell that an interception layer (the `wiretap` crate) can capture,
//! replace, and later restore. It does not parse flags — [`Flag`]
//! definitions feed help rendering only — and it is single-threaded by
//! design: slots are `Rc`-shared cells with no locking, and one run or one
//! instrumentation pass touches an application at a time.
//!
//! ## Lifecycle
//!
//! For a resolved command: app-before → cmd-before → action → cmd-after →
//! app-after. An `after` hook always runs once its stage was entered, even
//! when an earlier hook failed, and the first error wins. Hook errors pass
//! through [`App::run`] untouched.

mod app;
mod context;
mod error;
pub mod globals;
mod hooks;
mod slot;

pub use app::{App, Command, Flag};
pub use context::{Context, Metadata, Position};
pub use error::RunError;
pub use hooks::{
    ActionFn, ActionValue, CommandNotFoundFn, ExitErrHandlerFn, FlagEnvHintFn, FlagFileHintFn,
    FlagNamePrefixFn, FlagStringFn, HelpPrinter, HelpPrinterCustom, HookResult, OnUsageErrorFn,
    OpaqueValue, PlainActionFn, TemplateFuncs,
};
pub use slot::{GlobalSlot, Slot, SlotId};
