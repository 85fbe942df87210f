//! # wiretap — hook interception and restoration for CLI applications
//!
//! `wiretap` instruments applications built on the [`wiretap-app`] command
//! framework: it locates every lifecycle hook reachable from an
//! application's command tree, wraps each one in user-supplied middleware
//! with chain-of-responsibility (`next`) semantics, and can put every
//! original hook back exactly as it found it — including the process-wide
//! help and flag-formatting hooks it may have overridden.
//!
//! The engine guarantees:
//!
//! - **Idempotent wrapping.** A slot is wrapped at most once per pass, no
//!   matter how many handles alias it. Empty slots are never touched.
//! - **Exact restoration.** Restoration reinstalls the value recorded at
//!   wrap time, not whatever currently occupies the slot, and clears its
//!   bookkeeping so a second restore is a no-op.
//! - **Opaque pass-through.** Errors from user hooks and from the
//!   application's run are never interpreted, wrapped, or suppressed.
//!
//! # Example
//!
//! ```
//! use wiretap::{inject_and_run, Instrumentation};
//! use wiretap::{App, Command};
//!
//! let app = App::new("demo").command(Command::new("exec").action(|_ctx| {
//!     println!("  Execute(exec)");
//!     Ok(())
//! }));
//!
//! let instrumentation = Instrumentation::new(|ctx, next| {
//!     println!("BeforeHook({})", ctx.command_name());
//!     let result = next(ctx);
//!     println!("AfterHook({})", ctx.command_name());
//!     result
//! });
//!
//! inject_and_run(&app, ["demo", "exec"], instrumentation).unwrap();
//! ```
//!
//! To run one middleware in all three lifecycle positions and know which
//! one is executing, configure
//! [`position_tagging`](Instrumentation::position_tagging) and ask
//! [`taint_position`] inside the middleware.
//!
//! # Concurrency
//!
//! Single-threaded, cooperative: one instrumentation pass at a time per
//! application, no internal locking. Concurrent `inject` calls on one
//! application, or concurrent runs sharing one application, are
//! unsupported by construction. Middleware chains are synchronous call
//! stacks; `next` may be invoked zero, one, or (unusually) several times,
//! at the middleware's discretion.
//!
//! [`wiretap-app`]: wiretap_app

mod config;
mod engine;
mod hooks;

pub use config::{taint_position, Instrumentation};
pub use engine::{InstrumentError, Restore};
pub use hooks::{
    InstrumentAfterFn, InstrumentBeforeFn, InstrumentCommandNotFoundFn,
    InstrumentExitErrHandlerFn, InstrumentFlagEnvHintFn, InstrumentFlagFileHintFn,
    InstrumentFlagNamePrefixFn, InstrumentFlagStringFn, InstrumentFn, InstrumentHelpPrinter,
    InstrumentHelpPrinterCustom, InstrumentOnUsageErrorFn,
};

// Re-export the instrumented framework surface so callers need one crate.
pub use wiretap_app::{
    globals, ActionFn, ActionValue, App, Command, Context, Flag, HookResult, Metadata,
    OpaqueValue, PlainActionFn, Position, RunError, Slot, SlotId,
};

use engine::Transformer;

/// Instruments the application and returns the restore handle.
///
/// Wraps every populated before/action/after slot reachable from the
/// application's command tree with the configured middleware, and patches
/// every cross-cutting hook that has middleware configured. The returned
/// [`Restore`] undoes all of it — explicitly via [`Restore::restore`], or
/// implicitly when dropped.
///
/// # Errors
///
/// Fails with [`InstrumentError::InvalidActionType`] when an action slot
/// holds an extension payload. A failed wrap rolls back everything already
/// wrapped, leaving the application untouched.
pub fn inject(app: &App, instrumentation: Instrumentation) -> Result<Restore, InstrumentError> {
    let mut transformer = Transformer::new(instrumentation);
    match transformer.wrap(app) {
        Ok(()) => Ok(Restore::new(transformer)),
        Err(err) => {
            transformer.restore();
            Err(err)
        }
    }
}

/// Instruments the application, runs it, and restores.
///
/// Restoration is guaranteed on every exit path — normal return, an error
/// from the application's run, or a panic in a user hook — because the
/// [`Restore`] handle restores on drop. The run's result passes through
/// untouched.
pub fn inject_and_run<I, S>(
    app: &App,
    args: I,
    instrumentation: Instrumentation,
) -> anyhow::Result<()>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let _restore = inject(app, instrumentation)?;
    app.run(args)
}
