//! Middleware shapes, one per hook kind.
//!
//! Every middleware receives the wrapped hook's original arguments plus a
//! `next` — the callable that occupied the slot before instrumentation.
//! The middleware decides whether, when, and how many times `next` runs,
//! and may add behavior before and after the call. Chains are synchronous:
//! `next` executes on the caller's stack, with no suspension point inside
//! the engine.
//!
//! Middleware for app-scoped cross-cutting hooks receive an `Option`al
//! `next`, because those slots may legitimately have been empty at wrap
//! time. The process-wide help and flag hooks always hold a value (the
//! framework installs defaults), so their `next` is unconditional.

use std::io::Write;
use std::rc::Rc;

use serde_json::Value;

use wiretap_app::{
    ActionFn, CommandNotFoundFn, Context, ExitErrHandlerFn, Flag, FlagEnvHintFn, FlagFileHintFn,
    FlagNamePrefixFn, FlagStringFn, HelpPrinter, HelpPrinterCustom, HookResult, OnUsageErrorFn,
    TemplateFuncs,
};

/// Middleware around an action hook. Also the shape handed to
/// [`Instrumentation::new`](crate::Instrumentation::new).
pub type InstrumentFn = Rc<dyn Fn(&Context<'_>, ActionFn) -> HookResult>;

/// Middleware around a before hook. Same shape as [`InstrumentFn`]; kept
/// as its own alias so configuration reads by hook kind.
pub type InstrumentBeforeFn = Rc<dyn Fn(&Context<'_>, ActionFn) -> HookResult>;

/// Middleware around an after hook.
pub type InstrumentAfterFn = Rc<dyn Fn(&Context<'_>, ActionFn) -> HookResult>;

/// Middleware around the process-wide help printer.
pub type InstrumentHelpPrinter = Rc<dyn Fn(&mut dyn Write, &str, &Value, HelpPrinter)>;

/// Middleware around the process-wide custom-template help printer.
pub type InstrumentHelpPrinterCustom =
    Rc<dyn Fn(&mut dyn Write, &str, &Value, &TemplateFuncs, HelpPrinterCustom)>;

/// Middleware around the command-not-found handler.
pub type InstrumentCommandNotFoundFn =
    Rc<dyn Fn(&Context<'_>, &str, Option<CommandNotFoundFn>)>;

/// Middleware around the usage-error handler.
pub type InstrumentOnUsageErrorFn =
    Rc<dyn Fn(&Context<'_>, &anyhow::Error, bool, Option<OnUsageErrorFn>) -> HookResult>;

/// Middleware around the exit-error handler.
pub type InstrumentExitErrHandlerFn =
    Rc<dyn Fn(&Context<'_>, &anyhow::Error, Option<ExitErrHandlerFn>)>;

/// Middleware around the flag stringer.
pub type InstrumentFlagStringFn = Rc<dyn Fn(&Flag, FlagStringFn) -> String>;

/// Middleware around the flag name prefixer.
pub type InstrumentFlagNamePrefixFn = Rc<dyn Fn(&str, &str, FlagNamePrefixFn) -> String>;

/// Middleware around the flag env hinter.
pub type InstrumentFlagEnvHintFn = Rc<dyn Fn(&str, &str, FlagEnvHintFn) -> String>;

/// Middleware around the flag file hinter.
pub type InstrumentFlagFileHintFn = Rc<dyn Fn(&str, &str, FlagFileHintFn) -> String>;
