//! Instrumentation configuration.
//!
//! [`Instrumentation`] accumulates "what to wrap with what": at most one
//! middleware per hook kind, collected through chaining builder options.
//! Applying the same option twice overwrites the prior value — last wins,
//! options are never additive. The finished value is consumed by
//! [`inject`](crate::inject) and is immutable for the duration of that
//! wrap pass.

use std::rc::Rc;

use wiretap_app::{Context, Position};

use crate::hooks::{
    InstrumentAfterFn, InstrumentBeforeFn, InstrumentCommandNotFoundFn,
    InstrumentExitErrHandlerFn, InstrumentFlagEnvHintFn, InstrumentFlagFileHintFn,
    InstrumentFlagNamePrefixFn, InstrumentFlagStringFn, InstrumentFn, InstrumentHelpPrinter,
    InstrumentHelpPrinterCustom, InstrumentOnUsageErrorFn,
};

/// Accumulator of middleware, one optional entry per hook kind.
///
/// The user function handed to [`new`](Self::new) becomes the action
/// middleware; [`position_tagging`](Self::position_tagging) can derive
/// before/after middleware from that same function so one closure serves
/// all three lifecycle positions.
pub struct Instrumentation {
    user: InstrumentFn,
    pub(crate) action: InstrumentFn,
    pub(crate) before: Option<InstrumentBeforeFn>,
    pub(crate) after: Option<InstrumentAfterFn>,
    pub(crate) help_printer: Option<InstrumentHelpPrinter>,
    pub(crate) help_printer_custom: Option<InstrumentHelpPrinterCustom>,
    pub(crate) command_not_found: Option<InstrumentCommandNotFoundFn>,
    pub(crate) on_usage_error: Option<InstrumentOnUsageErrorFn>,
    pub(crate) exit_err_handler: Option<InstrumentExitErrHandlerFn>,
    pub(crate) flag_string: Option<InstrumentFlagStringFn>,
    pub(crate) flag_name_prefix: Option<InstrumentFlagNamePrefixFn>,
    pub(crate) flag_env_hint: Option<InstrumentFlagEnvHintFn>,
    pub(crate) flag_file_hint: Option<InstrumentFlagFileHintFn>,
}

impl Instrumentation {
    /// Creates a configuration from the user middleware, installed as the
    /// action middleware.
    pub fn new(
        user: impl Fn(&Context<'_>, wiretap_app::ActionFn) -> wiretap_app::HookResult + 'static,
    ) -> Self {
        let user: InstrumentFn = Rc::new(user);
        Self {
            action: user.clone(),
            user,
            before: None,
            after: None,
            help_printer: None,
            help_printer_custom: None,
            command_not_found: None,
            on_usage_error: None,
            exit_err_handler: None,
            flag_string: None,
            flag_name_prefix: None,
            flag_env_hint: None,
            flag_file_hint: None,
        }
    }

    /// Middleware for before hooks.
    pub fn before(
        mut self,
        f: impl Fn(&Context<'_>, wiretap_app::ActionFn) -> wiretap_app::HookResult + 'static,
    ) -> Self {
        self.before = Some(Rc::new(f));
        self
    }

    /// Middleware for after hooks.
    pub fn after(
        mut self,
        f: impl Fn(&Context<'_>, wiretap_app::ActionFn) -> wiretap_app::HookResult + 'static,
    ) -> Self {
        self.after = Some(Rc::new(f));
        self
    }

    /// Middleware for the process-wide help printer.
    pub fn help_printer(
        mut self,
        f: impl Fn(&mut dyn std::io::Write, &str, &serde_json::Value, wiretap_app::HelpPrinter)
            + 'static,
    ) -> Self {
        self.help_printer = Some(Rc::new(f));
        self
    }

    /// Middleware for the process-wide custom-template help printer.
    pub fn help_printer_custom(
        mut self,
        f: impl Fn(
                &mut dyn std::io::Write,
                &str,
                &serde_json::Value,
                &wiretap_app::TemplateFuncs,
                wiretap_app::HelpPrinterCustom,
            ) + 'static,
    ) -> Self {
        self.help_printer_custom = Some(Rc::new(f));
        self
    }

    /// Middleware for the command-not-found handler.
    pub fn command_not_found(
        mut self,
        f: impl Fn(&Context<'_>, &str, Option<wiretap_app::CommandNotFoundFn>) + 'static,
    ) -> Self {
        self.command_not_found = Some(Rc::new(f));
        self
    }

    /// Middleware for the usage-error handler.
    pub fn on_usage_error(
        mut self,
        f: impl Fn(
                &Context<'_>,
                &anyhow::Error,
                bool,
                Option<wiretap_app::OnUsageErrorFn>,
            ) -> wiretap_app::HookResult
            + 'static,
    ) -> Self {
        self.on_usage_error = Some(Rc::new(f));
        self
    }

    /// Middleware for the exit-error handler.
    pub fn exit_err_handler(
        mut self,
        f: impl Fn(&Context<'_>, &anyhow::Error, Option<wiretap_app::ExitErrHandlerFn>) + 'static,
    ) -> Self {
        self.exit_err_handler = Some(Rc::new(f));
        self
    }

    /// Middleware for the flag stringer.
    pub fn flag_string(
        mut self,
        f: impl Fn(&wiretap_app::Flag, wiretap_app::FlagStringFn) -> String + 'static,
    ) -> Self {
        self.flag_string = Some(Rc::new(f));
        self
    }

    /// Middleware for the flag name prefixer.
    pub fn flag_name_prefix(
        mut self,
        f: impl Fn(&str, &str, wiretap_app::FlagNamePrefixFn) -> String + 'static,
    ) -> Self {
        self.flag_name_prefix = Some(Rc::new(f));
        self
    }

    /// Middleware for the flag env hinter.
    pub fn flag_env_hint(
        mut self,
        f: impl Fn(&str, &str, wiretap_app::FlagEnvHintFn) -> String + 'static,
    ) -> Self {
        self.flag_env_hint = Some(Rc::new(f));
        self
    }

    /// Middleware for the flag file hinter.
    pub fn flag_file_hint(
        mut self,
        f: impl Fn(&str, &str, wiretap_app::FlagFileHintFn) -> String + 'static,
    ) -> Self {
        self.flag_file_hint = Some(Rc::new(f));
        self
    }

    /// Derives before/after middleware from the user function and stamps
    /// lifecycle position markers.
    ///
    /// For each listed tag (`Position::Before`, `Position::After`) the user
    /// function is installed as that hook kind's middleware, prefixed by a
    /// [`Context::tag_position`] stamp. The action middleware is re-derived
    /// unconditionally and stamps `Position::Current`. A shared user
    /// function can then ask [`taint_position`] which lifecycle stage it is
    /// currently wrapping.
    ///
    /// Overwrites any middleware previously set via [`before`](Self::before)
    /// or [`after`](Self::after) for the listed tags — last option wins.
    ///
    /// # Panics
    ///
    /// Panics when `tags` contains `Position::Current`: only the before and
    /// after positions can be tagged, and a bad tag list is a programmer
    /// error caught at configuration time, never deferred to the wrap pass.
    pub fn position_tagging(mut self, tags: &[Position]) -> Self {
        for tag in tags {
            assert!(
                matches!(tag, Position::Before | Position::After),
                "invalid tagging position {tag}: must be one of $before, $after",
            );
        }
        for tag in tags {
            let user = self.user.clone();
            match tag {
                Position::Before => {
                    self.before = Some(Rc::new(move |ctx: &Context<'_>, next| {
                        ctx.tag_position(Position::Before);
                        user(ctx, next)
                    }));
                }
                Position::After => {
                    self.after = Some(Rc::new(move |ctx: &Context<'_>, next| {
                        ctx.tag_position(Position::After);
                        user(ctx, next)
                    }));
                }
                Position::Current => unreachable!("rejected above"),
            }
        }
        let user = self.user.clone();
        self.action = Rc::new(move |ctx: &Context<'_>, next| {
            ctx.tag_position(Position::Current);
            user(ctx, next)
        });
        self
    }
}

/// Looks up the lifecycle position stamped by tagging middleware for the
/// current execution.
///
/// Returns `None` when no tagging middleware ran during this execution —
/// in particular when [`Instrumentation::position_tagging`] was never
/// configured, which is a caller contract violation rather than a
/// legitimate empty tag (the position enum has no empty value).
pub fn taint_position(ctx: &Context<'_>) -> Option<Position> {
    ctx.position()
}
