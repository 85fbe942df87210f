//! The interception engine: wrap pass and restoration.
//!
//! A [`Transformer`] performs exactly one wrap pass over an application:
//! it patches every configured cross-cutting hook (process-wide help and
//! flag hooks first, then the app-scoped handlers), then walks the command
//! tree depth-first — subcommands before each command's own hooks — and
//! wraps every populated before/action/after slot that has configured
//! middleware. Everything it changes is recorded in an undo log keyed by
//! slot identity, so:
//!
//! - a slot reachable twice (aliased handles, overlapping walks) is
//!   wrapped once;
//! - an empty slot is never touched and stays empty;
//! - restoration puts back exactly the value recorded at wrap time.
//!
//! The caller gets the undo log back as a [`Restore`] guard. Dropping it
//! restores; calling [`Restore::restore`] early also restores; doing both
//! is safe because restoration clears all bookkeeping, action-like maps
//! and cross-cutting captures alike, making the second pass a no-op.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use thiserror::Error;

use wiretap_app::globals;
use wiretap_app::{
    ActionFn, ActionValue, App, Command, CommandNotFoundFn, ExitErrHandlerFn, FlagEnvHintFn,
    FlagFileHintFn, FlagNamePrefixFn, FlagStringFn, GlobalSlot, HelpPrinter, HelpPrinterCustom,
    OnUsageErrorFn, Slot, SlotId,
};

use crate::config::Instrumentation;

/// Errors surfaced by the wrap pass.
#[derive(Debug, Error)]
pub enum InstrumentError {
    /// An action slot held a value the engine cannot chain through. Carries
    /// the concrete type name of the unexpected value. The offending slot
    /// is left untouched and the whole pass is rolled back.
    #[error("invalid action type: {type_name}")]
    InvalidActionType { type_name: &'static str },
}

/// Captured original for one process-wide hook: the slot handle plus the
/// value it held before the pass.
type GlobalCapture<T> = Option<(GlobalSlot<T>, T)>;

/// Captured original for one app-scoped cross-cutting hook. The original
/// may itself be absent; an empty slot still gets a wrapper installed (the
/// middleware sees `None` as its `next`) and is emptied again on restore.
type SlotCapture<T> = Option<(Slot<T>, Option<T>)>;

/// Flat undo record for the cross-cutting hooks, one field per kind.
#[derive(Default)]
struct CrossOverrides {
    help_printer: GlobalCapture<HelpPrinter>,
    help_printer_custom: GlobalCapture<HelpPrinterCustom>,
    flag_string: GlobalCapture<FlagStringFn>,
    flag_name_prefix: GlobalCapture<FlagNamePrefixFn>,
    flag_env_hint: GlobalCapture<FlagEnvHintFn>,
    flag_file_hint: GlobalCapture<FlagFileHintFn>,
    command_not_found: SlotCapture<CommandNotFoundFn>,
    on_usage_error: SlotCapture<OnUsageErrorFn>,
    exit_err_handler: SlotCapture<ExitErrHandlerFn>,
}

/// One wrap pass worth of state: configuration plus undo logs.
///
/// The three action-like maps are kept separate — before, action, and
/// after slots share a structural shape but must never be cross-confused.
/// `BTreeMap` keyed by [`SlotId`] gives idempotency checks and a
/// deterministic (creation-ordered) restoration order.
pub(crate) struct Transformer {
    config: Instrumentation,
    overridden_before: BTreeMap<SlotId, (Slot<ActionFn>, ActionFn)>,
    overridden_action: BTreeMap<SlotId, (Slot<ActionValue>, ActionValue)>,
    overridden_after: BTreeMap<SlotId, (Slot<ActionFn>, ActionFn)>,
    cross: CrossOverrides,
}

impl Transformer {
    pub(crate) fn new(config: Instrumentation) -> Self {
        Self {
            config,
            overridden_before: BTreeMap::new(),
            overridden_action: BTreeMap::new(),
            overridden_after: BTreeMap::new(),
            cross: CrossOverrides::default(),
        }
    }

    /// The wrap pass. On error the caller is expected to invoke
    /// [`restore`](Self::restore) to roll back the partial pass.
    pub(crate) fn wrap(&mut self, app: &App) -> Result<(), InstrumentError> {
        self.wrap_globals();
        self.wrap_app_handlers(app);

        self.wrap_before(&app.before);
        self.wrap_action(&app.action)?;
        self.wrap_after(&app.after);

        self.wrap_commands(&app.commands)
    }

    fn wrap_commands(&mut self, commands: &[Command]) -> Result<(), InstrumentError> {
        for cmd in commands {
            self.wrap_commands(&cmd.subcommands)?;
            self.wrap_before(&cmd.before);
            self.wrap_action(&cmd.action)?;
            self.wrap_after(&cmd.after);
        }
        Ok(())
    }

    fn wrap_before(&mut self, slot: &Slot<ActionFn>) {
        let Some(middleware) = self.config.before.clone() else {
            return;
        };
        let Some(original) = slot.get() else {
            return;
        };
        if self.overridden_before.contains_key(&slot.id()) {
            return;
        }

        self.overridden_before
            .insert(slot.id(), (slot.clone(), original.clone()));
        slot.set(Some(Rc::new(move |ctx| middleware(ctx, original.clone()))));
    }

    fn wrap_after(&mut self, slot: &Slot<ActionFn>) {
        let Some(middleware) = self.config.after.clone() else {
            return;
        };
        let Some(original) = slot.get() else {
            return;
        };
        if self.overridden_after.contains_key(&slot.id()) {
            return;
        }

        self.overridden_after
            .insert(slot.id(), (slot.clone(), original.clone()));
        slot.set(Some(Rc::new(move |ctx| middleware(ctx, original.clone()))));
    }

    /// Wraps an action slot, normalizing either accepted callable
    /// representation to the chained closure shape before storing the
    /// wrapper back. Extension payloads abort the pass.
    fn wrap_action(&mut self, slot: &Slot<ActionValue>) -> Result<(), InstrumentError> {
        let Some(original) = slot.get() else {
            return Ok(());
        };
        if self.overridden_action.contains_key(&slot.id()) {
            return Ok(());
        }

        let next: ActionFn = match &original {
            ActionValue::Plain(f) => Rc::new(*f),
            ActionValue::Closure(f) => f.clone(),
            ActionValue::Extension(value) => {
                return Err(InstrumentError::InvalidActionType {
                    type_name: value.type_name(),
                });
            }
        };

        self.overridden_action
            .insert(slot.id(), (slot.clone(), original));
        let middleware = self.config.action.clone();
        slot.set(Some(ActionValue::Closure(Rc::new(move |ctx| {
            middleware(ctx, next.clone())
        }))));
        Ok(())
    }

    /// Patches the six process-wide hooks that have configured middleware,
    /// capturing the current value first.
    fn wrap_globals(&mut self) {
        if let Some(middleware) = self.config.help_printer.clone() {
            if self.cross.help_printer.is_none() {
                let slot = globals::help_printer();
                let original = slot.get();
                self.cross.help_printer = Some((slot.clone(), original.clone()));
                slot.set(Rc::new(move |w, templ, data| {
                    middleware(w, templ, data, original.clone())
                }));
            }
        }
        if let Some(middleware) = self.config.help_printer_custom.clone() {
            if self.cross.help_printer_custom.is_none() {
                let slot = globals::help_printer_custom();
                let original = slot.get();
                self.cross.help_printer_custom = Some((slot.clone(), original.clone()));
                slot.set(Rc::new(move |w, templ, data, funcs| {
                    middleware(w, templ, data, funcs, original.clone())
                }));
            }
        }
        if let Some(middleware) = self.config.flag_string.clone() {
            if self.cross.flag_string.is_none() {
                let slot = globals::flag_stringer();
                let original = slot.get();
                self.cross.flag_string = Some((slot.clone(), original.clone()));
                slot.set(Rc::new(move |flag| middleware(flag, original.clone())));
            }
        }
        if let Some(middleware) = self.config.flag_name_prefix.clone() {
            if self.cross.flag_name_prefix.is_none() {
                let slot = globals::flag_name_prefixer();
                let original = slot.get();
                self.cross.flag_name_prefix = Some((slot.clone(), original.clone()));
                slot.set(Rc::new(move |full_name, placeholder| {
                    middleware(full_name, placeholder, original.clone())
                }));
            }
        }
        if let Some(middleware) = self.config.flag_env_hint.clone() {
            if self.cross.flag_env_hint.is_none() {
                let slot = globals::flag_env_hinter();
                let original = slot.get();
                self.cross.flag_env_hint = Some((slot.clone(), original.clone()));
                slot.set(Rc::new(move |env_var, line| {
                    middleware(env_var, line, original.clone())
                }));
            }
        }
        if let Some(middleware) = self.config.flag_file_hint.clone() {
            if self.cross.flag_file_hint.is_none() {
                let slot = globals::flag_file_hinter();
                let original = slot.get();
                self.cross.flag_file_hint = Some((slot.clone(), original.clone()));
                slot.set(Rc::new(move |file_path, line| {
                    middleware(file_path, line, original.clone())
                }));
            }
        }
    }

    /// Patches the three app-scoped cross-cutting handlers. Unlike the
    /// action-like slots, these get a wrapper installed even when empty —
    /// the middleware receives the (possibly absent) original as `next`.
    fn wrap_app_handlers(&mut self, app: &App) {
        if let Some(middleware) = self.config.command_not_found.clone() {
            if self.cross.command_not_found.is_none() {
                let slot = app.command_not_found.clone();
                let original = slot.get();
                self.cross.command_not_found = Some((slot.clone(), original.clone()));
                slot.set(Some(Rc::new(move |ctx, name| {
                    middleware(ctx, name, original.clone())
                })));
            }
        }
        if let Some(middleware) = self.config.on_usage_error.clone() {
            if self.cross.on_usage_error.is_none() {
                let slot = app.on_usage_error.clone();
                let original = slot.get();
                self.cross.on_usage_error = Some((slot.clone(), original.clone()));
                slot.set(Some(Rc::new(move |ctx, err, is_subcommand| {
                    middleware(ctx, err, is_subcommand, original.clone())
                })));
            }
        }
        if let Some(middleware) = self.config.exit_err_handler.clone() {
            if self.cross.exit_err_handler.is_none() {
                let slot = app.exit_err_handler.clone();
                let original = slot.get();
                self.cross.exit_err_handler = Some((slot.clone(), original.clone()));
                slot.set(Some(Rc::new(move |ctx, err| {
                    middleware(ctx, err, original.clone())
                })));
            }
        }
    }

    /// Writes every recorded original back and clears all bookkeeping.
    /// Safe to call any number of times; after the first call there is
    /// nothing left to undo.
    pub(crate) fn restore(&mut self) {
        for (_, (slot, original)) in std::mem::take(&mut self.overridden_before) {
            slot.set(Some(original));
        }
        for (_, (slot, original)) in std::mem::take(&mut self.overridden_action) {
            slot.set(Some(original));
        }
        for (_, (slot, original)) in std::mem::take(&mut self.overridden_after) {
            slot.set(Some(original));
        }

        if let Some((slot, original)) = self.cross.help_printer.take() {
            slot.set(original);
        }
        if let Some((slot, original)) = self.cross.help_printer_custom.take() {
            slot.set(original);
        }
        if let Some((slot, original)) = self.cross.flag_string.take() {
            slot.set(original);
        }
        if let Some((slot, original)) = self.cross.flag_name_prefix.take() {
            slot.set(original);
        }
        if let Some((slot, original)) = self.cross.flag_env_hint.take() {
            slot.set(original);
        }
        if let Some((slot, original)) = self.cross.flag_file_hint.take() {
            slot.set(original);
        }
        if let Some((slot, original)) = self.cross.command_not_found.take() {
            slot.set(original);
        }
        if let Some((slot, original)) = self.cross.on_usage_error.take() {
            slot.set(original);
        }
        if let Some((slot, original)) = self.cross.exit_err_handler.take() {
            slot.set(original);
        }
    }

    fn wrapped_counts(&self) -> (usize, usize, usize) {
        (
            self.overridden_before.len(),
            self.overridden_action.len(),
            self.overridden_after.len(),
        )
    }
}

/// Handle that undoes one wrap pass.
///
/// Returned by [`inject`](crate::inject). Restoration runs when
/// [`restore`](Self::restore) is called or when the handle drops,
/// whichever comes first; the later of the two is a no-op. Dropping the
/// handle is what gives [`inject_and_run`](crate::inject_and_run) its
/// guaranteed-release behavior on every exit path, including panics in
/// user hooks.
pub struct Restore {
    transformer: Transformer,
}

impl Restore {
    pub(crate) fn new(transformer: Transformer) -> Self {
        Self { transformer }
    }

    /// Puts every wrapped hook back to its pre-instrumentation value.
    pub fn restore(&mut self) {
        self.transformer.restore();
    }
}

impl Drop for Restore {
    fn drop(&mut self) {
        self.transformer.restore();
    }
}

impl fmt::Debug for Restore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (before, action, after) = self.transformer.wrapped_counts();
        f.debug_struct("Restore")
            .field("wrapped_before", &before)
            .field("wrapped_action", &action)
            .field("wrapped_after", &after)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Instrumentation;
    use std::cell::RefCell;
    use wiretap_app::Context;

    fn passthrough() -> Instrumentation {
        Instrumentation::new(|ctx, next| next(ctx))
            .before(|ctx, next| next(ctx))
            .after(|ctx, next| next(ctx))
    }

    #[test]
    fn test_empty_slots_are_skipped() {
        let app = App::new("demo").command(Command::new("bare"));
        let mut transformer = Transformer::new(passthrough());
        transformer.wrap(&app).unwrap();

        assert_eq!(transformer.wrapped_counts(), (0, 0, 0));
        assert!(app.commands[0].before.is_empty());
        assert!(app.commands[0].action.is_empty());

        // Restore over empty bookkeeping must not blow up.
        transformer.restore();
    }

    #[test]
    fn test_wrap_records_one_entry_per_slot() {
        let app = App::new("demo").command(
            Command::new("exec")
                .before(|_| Ok(()))
                .action(|_| Ok(()))
                .after(|_| Ok(())),
        );
        let mut transformer = Transformer::new(passthrough());
        transformer.wrap(&app).unwrap();

        assert_eq!(transformer.wrapped_counts(), (1, 1, 1));
    }

    #[test]
    fn test_aliased_slot_wraps_once() {
        let shared = Slot::new(Rc::new(|_: &Context<'_>| Ok(())) as ActionFn);
        let mut first = Command::new("first").action(|_| Ok(()));
        first.before = shared.clone();
        let mut second = Command::new("second").action(|_| Ok(()));
        second.before = shared.clone();

        let app = App::new("demo").command(first).command(second);
        let mut transformer = Transformer::new(passthrough());
        transformer.wrap(&app).unwrap();

        let (before, _, _) = transformer.wrapped_counts();
        assert_eq!(before, 1);
    }

    #[test]
    fn test_double_wrap_is_idempotent() {
        let counter = Rc::new(RefCell::new(0u32));
        let counted = counter.clone();

        let app = App::new("demo").command(Command::new("exec").action(|_| Ok(())));
        let mut transformer = Transformer::new(Instrumentation::new(move |ctx, next| {
            *counted.borrow_mut() += 1;
            next(ctx)
        }));
        transformer.wrap(&app).unwrap();
        transformer.wrap(&app).unwrap();

        app.run(["demo", "exec"]).unwrap();
        assert_eq!(*counter.borrow(), 1, "middleware must fire exactly once");
    }

    #[test]
    fn test_restore_puts_back_the_recorded_value() {
        let original: ActionFn = Rc::new(|_| Ok(()));
        let app = App::new("demo");
        app.before.set(Some(original.clone()));

        let mut transformer = Transformer::new(passthrough());
        transformer.wrap(&app).unwrap();

        let wrapped = app.before.get().expect("wrapped hook present");
        assert!(!Rc::ptr_eq(&wrapped, &original), "slot must hold the wrapper");

        transformer.restore();
        let restored = app.before.get().expect("restored hook present");
        assert!(Rc::ptr_eq(&restored, &original));
    }

    #[test]
    fn test_restore_keeps_plain_action_representation() {
        fn plain(_: &Context<'_>) -> wiretap_app::HookResult {
            Ok(())
        }

        let app = App::new("demo").command(Command::new("exec").plain_action(plain));
        let mut transformer = Transformer::new(passthrough());
        transformer.wrap(&app).unwrap();
        transformer.restore();

        match app.commands[0].action.get() {
            Some(ActionValue::Plain(f)) => assert_eq!(f, plain as wiretap_app::PlainActionFn),
            other => panic!("expected plain action back, got {other:?}"),
        }
    }

    #[test]
    fn test_extension_action_aborts_with_type_name() {
        let app = App::new("demo")
            .command(Command::new("exec").action_value(ActionValue::extension(42u32)));

        let mut transformer = Transformer::new(passthrough());
        let err = transformer.wrap(&app).unwrap_err();
        assert!(err.to_string().contains("u32"), "got: {err}");

        // The offending slot keeps its value.
        match app.commands[0].action.get() {
            Some(ActionValue::Extension(value)) => {
                assert_eq!(value.downcast_ref::<u32>(), Some(&42));
            }
            other => panic!("slot must be untouched, got {other:?}"),
        }
    }

    #[test]
    fn test_double_restore_is_noop() {
        let original: ActionFn = Rc::new(|_| Ok(()));
        let app = App::new("demo");
        app.before.set(Some(original.clone()));

        let mut transformer = Transformer::new(passthrough());
        transformer.wrap(&app).unwrap();
        transformer.restore();

        // Install something new; a second restore must not clobber it.
        let replacement: ActionFn = Rc::new(|_| Ok(()));
        app.before.set(Some(replacement.clone()));
        transformer.restore();

        let current = app.before.get().expect("hook present");
        assert!(Rc::ptr_eq(&current, &replacement));
    }

    #[test]
    fn test_double_restore_is_noop_for_globals() {
        let mut transformer = Transformer::new(
            Instrumentation::new(|ctx, next| next(ctx))
                .flag_env_hint(|env, line, next| next(env, line)),
        );
        let app = App::new("demo");
        transformer.wrap(&app).unwrap();
        transformer.restore();

        // A fresh value installed after restore must survive a second
        // restore; a stale first-pass capture re-applied here would
        // clobber it.
        let marker: FlagEnvHintFn = Rc::new(|_, line| format!("{line}?"));
        let hinter = globals::flag_env_hinter();
        hinter.set(marker.clone());
        transformer.restore();
        assert!(Rc::ptr_eq(&hinter.get(), &marker));

        globals::reset();
    }

    #[test]
    fn test_restore_reinstalls_empty_cross_cutting_slot() {
        let app = App::new("demo");
        let mut transformer = Transformer::new(
            Instrumentation::new(|ctx, next| next(ctx)).command_not_found(|_, _, _| {}),
        );
        transformer.wrap(&app).unwrap();
        assert!(!app.command_not_found.is_empty(), "wrapper installed");

        transformer.restore();
        assert!(app.command_not_found.is_empty(), "original was empty");
    }
}
