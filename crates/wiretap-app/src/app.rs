//! Application and command tree.
//!
//! An [`App`] is a tree of [`Command`]s. Every node carries optional
//! `before`, `action`, and `after` hook slots; the application additionally
//! carries slots for command-not-found, usage-error, and exit-error
//! handling, a [`Metadata`] store, and an output writer. Help rendering
//! goes through the process-wide hooks in [`globals`](crate::globals).
//!
//! # Lifecycle contract
//!
//! For a resolved command: app-before → cmd-before → action → cmd-after →
//! app-after. An `after` hook always runs once its stage was entered, even
//! when an earlier hook failed; the first error wins. The framework does
//! not parse flags — [`Flag`] definitions exist for help rendering only,
//! and a `-`-prefixed token where a command is expected is a usage error.
//!
//! # Single-threaded design
//!
//! One run or one instrumentation pass touches an application at a time.
//! Hook slots are `Rc`-shared cells with no locking; concurrent use is
//! unsupported by construction.

use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;

use serde_json::{json, Value};

use crate::context::{Context, Metadata};
use crate::error::RunError;
use crate::globals;
use crate::hooks::{
    ActionFn, ActionValue, CommandNotFoundFn, ExitErrHandlerFn, HookResult, OnUsageErrorFn,
    PlainActionFn,
};
use crate::slot::Slot;

const APP_HELP_TEMPLATE: &str = "NAME:\n   {name} - {usage}\n\nCOMMANDS:\n{commands}\n\nOPTIONS:\n{flags}\n";

const COMMAND_HELP_TEMPLATE: &str = "NAME:\n   {name} - {usage}\n\nOPTIONS:\n{flags}\n";

/// A flag definition, used for help rendering only.
#[derive(Debug, Clone, Default)]
pub struct Flag {
    pub name: String,
    pub placeholder: String,
    pub usage: String,
    pub env_var: String,
    pub file_path: String,
}

impl Flag {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = placeholder.into();
        self
    }

    pub fn usage(mut self, usage: impl Into<String>) -> Self {
        self.usage = usage.into();
        self
    }

    pub fn env_var(mut self, env_var: impl Into<String>) -> Self {
        self.env_var = env_var.into();
        self
    }

    pub fn file_path(mut self, file_path: impl Into<String>) -> Self {
        self.file_path = file_path.into();
        self
    }
}

/// One node of the command tree.
#[derive(Debug, Default)]
pub struct Command {
    pub name: String,
    pub usage: String,
    pub flags: Vec<Flag>,
    pub before: Slot<ActionFn>,
    pub action: Slot<ActionValue>,
    pub after: Slot<ActionFn>,
    pub subcommands: Vec<Command>,
}

impl Command {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn usage(mut self, usage: impl Into<String>) -> Self {
        self.usage = usage.into();
        self
    }

    pub fn flag(mut self, flag: Flag) -> Self {
        self.flags.push(flag);
        self
    }

    pub fn subcommand(mut self, command: Command) -> Self {
        self.subcommands.push(command);
        self
    }

    /// Installs the before hook.
    pub fn before(self, f: impl Fn(&Context<'_>) -> HookResult + 'static) -> Self {
        self.before.set(Some(Rc::new(f)));
        self
    }

    /// Installs the action as a counted closure.
    pub fn action(self, f: impl Fn(&Context<'_>) -> HookResult + 'static) -> Self {
        self.action.set(Some(ActionValue::closure(f)));
        self
    }

    /// Installs the action as a plain function pointer.
    pub fn plain_action(self, f: PlainActionFn) -> Self {
        self.action.set(Some(ActionValue::Plain(f)));
        self
    }

    /// Installs a raw action value, including extension payloads.
    pub fn action_value(self, value: ActionValue) -> Self {
        self.action.set(Some(value));
        self
    }

    /// Installs the after hook.
    pub fn after(self, f: impl Fn(&Context<'_>) -> HookResult + 'static) -> Self {
        self.after.set(Some(Rc::new(f)));
        self
    }
}

/// The application: root of the command tree plus cross-cutting hook slots.
pub struct App {
    pub name: String,
    pub usage: String,
    pub flags: Vec<Flag>,
    pub commands: Vec<Command>,
    pub before: Slot<ActionFn>,
    pub action: Slot<ActionValue>,
    pub after: Slot<ActionFn>,
    pub command_not_found: Slot<CommandNotFoundFn>,
    pub on_usage_error: Slot<OnUsageErrorFn>,
    pub exit_err_handler: Slot<ExitErrHandlerFn>,
    pub metadata: Metadata,
    writer: Rc<RefCell<Box<dyn Write>>>,
}

impl App {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            usage: String::new(),
            flags: Vec::new(),
            commands: Vec::new(),
            before: Slot::empty(),
            action: Slot::empty(),
            after: Slot::empty(),
            command_not_found: Slot::empty(),
            on_usage_error: Slot::empty(),
            exit_err_handler: Slot::empty(),
            metadata: Metadata::new(),
            writer: Rc::new(RefCell::new(Box::new(io::stdout()))),
        }
    }

    pub fn usage(mut self, usage: impl Into<String>) -> Self {
        self.usage = usage.into();
        self
    }

    pub fn flag(mut self, flag: Flag) -> Self {
        self.flags.push(flag);
        self
    }

    pub fn command(mut self, command: Command) -> Self {
        self.commands.push(command);
        self
    }

    /// Installs the application-level before hook.
    pub fn before(self, f: impl Fn(&Context<'_>) -> HookResult + 'static) -> Self {
        self.before.set(Some(Rc::new(f)));
        self
    }

    /// Installs the root action, run when no command is named. Defaults to
    /// printing application help.
    pub fn action(self, f: impl Fn(&Context<'_>) -> HookResult + 'static) -> Self {
        self.action.set(Some(ActionValue::closure(f)));
        self
    }

    /// Installs the application-level after hook.
    pub fn after(self, f: impl Fn(&Context<'_>) -> HookResult + 'static) -> Self {
        self.after.set(Some(Rc::new(f)));
        self
    }

    /// Installs the handler invoked when command resolution fails.
    pub fn command_not_found(self, f: impl Fn(&Context<'_>, &str) + 'static) -> Self {
        self.command_not_found.set(Some(Rc::new(f)));
        self
    }

    /// Installs the usage-error handler; its return value replaces the
    /// original error.
    pub fn on_usage_error(
        self,
        f: impl Fn(&Context<'_>, &anyhow::Error, bool) -> HookResult + 'static,
    ) -> Self {
        self.on_usage_error.set(Some(Rc::new(f)));
        self
    }

    /// Installs the handler offered every error before `run` returns it.
    pub fn exit_err_handler(self, f: impl Fn(&Context<'_>, &anyhow::Error) + 'static) -> Self {
        self.exit_err_handler.set(Some(Rc::new(f)));
        self
    }

    /// Redirects help output (defaults to stdout).
    pub fn writer(self, w: impl Write + 'static) -> Self {
        *self.writer.borrow_mut() = Box::new(w);
        self
    }

    /// Runs the application.
    ///
    /// `args[0]` is the program name. The next tokens resolve a command
    /// chain through [`Command::subcommands`]; everything after the deepest
    /// match is handed to the hooks via [`Context::args`]. With no command
    /// (or `help` / `-h` / `--help`) the root hooks run, the root action
    /// defaulting to help output.
    pub fn run<I, S>(&self, args: I) -> anyhow::Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let args: Vec<String> = args.into_iter().map(Into::into).collect();
        let (ctx, result) = self.dispatch(&args);
        if let Err(err) = &result {
            if let Some(handler) = self.exit_err_handler.get() {
                handler(&ctx, err);
            }
        }
        result
    }

    fn dispatch<'a>(&'a self, args: &[String]) -> (Context<'a>, anyhow::Result<()>) {
        if args.is_empty() {
            let ctx = Context::root(self);
            let result = self.usage_error(&ctx, RunError::EmptyArguments, false);
            return (ctx, result);
        }

        let rest = &args[1..];
        match rest.first().map(String::as_str) {
            None | Some("help") | Some("-h") | Some("--help") => {
                let ctx = Context::root(self);
                let result = self.execute_root(&ctx);
                (ctx, result)
            }
            Some(first) if first.starts_with('-') => {
                let ctx = Context::root(self);
                let result = self.usage_error(&ctx, RunError::UnexpectedFlag(first.into()), false);
                (ctx, result)
            }
            Some(first) => match find_command(&self.commands, first) {
                None => {
                    let ctx = Context::root(self);
                    let result = match self.command_not_found.get() {
                        Some(handler) => {
                            handler(&ctx, first);
                            Ok(())
                        }
                        None => Err(RunError::CommandNotFound(first.into()).into()),
                    };
                    (ctx, result)
                }
                Some(root_cmd) => {
                    let (cmd, path, remaining) = descend(root_cmd, &rest[1..]);
                    let ctx = Context::new(self, path, remaining);
                    let result = match ctx.args().first() {
                        Some(arg) if arg.starts_with('-') => {
                            let err = RunError::UnexpectedFlag(arg.clone());
                            self.usage_error(&ctx, err, true)
                        }
                        _ => self.execute_command(&ctx, cmd),
                    };
                    (ctx, result)
                }
            },
        }
    }

    /// Root execution: app-level before → action (default: help) → after.
    fn execute_root(&self, ctx: &Context<'_>) -> anyhow::Result<()> {
        let mut result = self.run_hook(&self.before, ctx);
        if result.is_ok() {
            result = match self.action.get() {
                Some(action) => action.invoke(ctx),
                None => self.print_help(),
            };
        }
        let after = self.run_hook(&self.after, ctx);
        result.and(after)
    }

    fn execute_command(&self, ctx: &Context<'_>, cmd: &Command) -> anyhow::Result<()> {
        let mut result = self.run_hook(&self.before, ctx);
        let mut cmd_after = Ok(());
        if result.is_ok() {
            result = self.run_hook(&cmd.before, ctx);
            if result.is_ok() {
                result = match cmd.action.get() {
                    Some(action) => action.invoke(ctx),
                    None => self.print_command_help(cmd),
                };
            }
            // The command's after hook runs once the command stage was
            // entered, regardless of before/action failure.
            cmd_after = self.run_hook(&cmd.after, ctx);
        }
        let app_after = self.run_hook(&self.after, ctx);
        result.and(cmd_after).and(app_after)
    }

    fn run_hook(&self, slot: &Slot<ActionFn>, ctx: &Context<'_>) -> HookResult {
        match slot.get() {
            Some(hook) => hook(ctx),
            None => Ok(()),
        }
    }

    fn usage_error(
        &self,
        ctx: &Context<'_>,
        err: RunError,
        is_subcommand: bool,
    ) -> anyhow::Result<()> {
        let err = anyhow::Error::new(err);
        match self.on_usage_error.get() {
            Some(handler) => handler(ctx, &err, is_subcommand),
            None => Err(err),
        }
    }

    /// Prints application help through the process-wide help printer.
    pub fn print_help(&self) -> anyhow::Result<()> {
        let data = json!({
            "name": self.name,
            "usage": self.usage,
            "commands": self
                .commands
                .iter()
                .map(|c| format!("   {}\t{}", c.name, c.usage))
                .collect::<Vec<_>>(),
            "flags": self.flag_lines(&self.flags),
        });
        let printer = globals::help_printer().get();
        let mut writer = self.writer.borrow_mut();
        printer(&mut **writer, APP_HELP_TEMPLATE, &data);
        Ok(())
    }

    /// Prints help for one command through the process-wide help printer.
    pub fn print_command_help(&self, cmd: &Command) -> anyhow::Result<()> {
        let data = json!({
            "name": cmd.name,
            "usage": cmd.usage,
            "flags": self.flag_lines(&cmd.flags),
        });
        let printer = globals::help_printer().get();
        let mut writer = self.writer.borrow_mut();
        printer(&mut **writer, COMMAND_HELP_TEMPLATE, &data);
        Ok(())
    }

    fn flag_lines(&self, flags: &[Flag]) -> Vec<String> {
        let stringer = globals::flag_stringer().get();
        flags.iter().map(|f| format!("   {}", stringer(f))).collect()
    }
}

fn find_command<'a>(commands: &'a [Command], name: &str) -> Option<&'a Command> {
    commands.iter().find(|c| c.name == name)
}

/// Walks the subcommand chain as far as the argument tokens match,
/// returning the deepest command, the resolved path, and the leftover
/// arguments.
fn descend<'a>(mut cmd: &'a Command, args: &[String]) -> (&'a Command, Vec<String>, Vec<String>) {
    let mut path = vec![cmd.name.clone()];
    let mut index = 0;
    while let Some(next) = args
        .get(index)
        .and_then(|name| find_command(&cmd.subcommands, name))
    {
        cmd = next;
        path.push(cmd.name.clone());
        index += 1;
    }
    (cmd, path, args[index..].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn log_handle() -> (Rc<RefCell<Vec<String>>>, impl Fn(&str)) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let writer = log.clone();
        (log, move |entry: &str| {
            writer.borrow_mut().push(entry.to_string())
        })
    }

    /// Shared buffer implementing `Write`, for capturing help output.
    #[derive(Clone, Default)]
    struct SharedBuf(Rc<RefCell<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuf {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.borrow()).into_owned()
        }
    }

    #[test]
    fn test_lifecycle_order() {
        let (log, push) = log_handle();
        let push = Rc::new(push);

        let mk = |tag: &'static str, push: Rc<dyn Fn(&str)>| {
            move |_: &Context<'_>| {
                push(tag);
                Ok(())
            }
        };

        let app = App::new("demo").command(
            Command::new("exec")
                .before(mk("before", push.clone()))
                .action(mk("action", push.clone()))
                .after(mk("after", push.clone())),
        );

        app.run(["demo", "exec"]).unwrap();
        assert_eq!(*log.borrow(), ["before", "action", "after"]);
    }

    #[test]
    fn test_after_runs_when_action_fails() {
        let (log, push) = log_handle();
        let push = Rc::new(push);
        let push_action = push.clone();
        let push_after = push.clone();

        let app = App::new("demo").command(
            Command::new("exec")
                .action(move |_| {
                    push_action("action");
                    anyhow::bail!("boom")
                })
                .after(move |_| {
                    push_after("after");
                    Ok(())
                }),
        );

        let err = app.run(["demo", "exec"]).unwrap_err();
        assert_eq!(err.to_string(), "boom");
        assert_eq!(*log.borrow(), ["action", "after"]);
    }

    #[test]
    fn test_before_failure_skips_action_but_not_afters() {
        let (log, push) = log_handle();
        let push = Rc::new(push);
        let push_before = push.clone();
        let push_action = push.clone();
        let push_after = push.clone();

        let app = App::new("demo").command(
            Command::new("exec")
                .before(move |_| {
                    push_before("before");
                    anyhow::bail!("denied")
                })
                .action(move |_| {
                    push_action("action");
                    Ok(())
                })
                .after(move |_| {
                    push_after("after");
                    Ok(())
                }),
        );

        let err = app.run(["demo", "exec"]).unwrap_err();
        assert_eq!(err.to_string(), "denied");
        assert_eq!(*log.borrow(), ["before", "after"]);
    }

    #[test]
    fn test_subcommand_resolution() {
        let (log, push) = log_handle();
        let push = Rc::new(push);
        let push_migrate = push.clone();

        let app = App::new("demo").command(
            Command::new("db").subcommand(Command::new("migrate").action(move |ctx| {
                push_migrate(&format!("{}:{}", ctx.command_name(), ctx.args().join(",")));
                Ok(())
            })),
        );

        app.run(["demo", "db", "migrate", "up"]).unwrap();
        assert_eq!(*log.borrow(), ["migrate:up"]);
    }

    #[test]
    fn test_command_not_found_hook() {
        let (log, push) = log_handle();
        let push = Rc::new(push);
        let push_missing = push.clone();

        let app = App::new("demo").command_not_found(move |_, name| {
            push_missing(&format!("missing:{name}"));
        });

        app.run(["demo", "frobnicate"]).unwrap();
        assert_eq!(*log.borrow(), ["missing:frobnicate"]);
    }

    #[test]
    fn test_command_not_found_without_hook_errors() {
        let app = App::new("demo");
        let err = app.run(["demo", "frobnicate"]).unwrap_err();
        assert!(err.to_string().contains("command not found"));
    }

    #[test]
    fn test_usage_error_hook_replaces_error() {
        let app = App::new("demo").on_usage_error(|_, err, is_sub| {
            assert!(!is_sub);
            assert!(err.to_string().contains("--bogus"));
            Ok(())
        });

        app.run(["demo", "--bogus"]).unwrap();
    }

    #[test]
    fn test_usage_error_after_command_is_subcommand_scoped() {
        let app = App::new("demo")
            .command(Command::new("exec").action(|_| Ok(())))
            .on_usage_error(|_, _, is_sub| {
                assert!(is_sub);
                anyhow::bail!("usage")
            });

        let err = app.run(["demo", "exec", "--bogus"]).unwrap_err();
        assert_eq!(err.to_string(), "usage");
    }

    #[test]
    fn test_exit_err_handler_sees_final_error() {
        let (log, push) = log_handle();
        let push = Rc::new(push);
        let push_exit = push.clone();

        let app = App::new("demo")
            .command(Command::new("exec").action(|_| anyhow::bail!("boom")))
            .exit_err_handler(move |ctx, err| {
                push_exit(&format!("exit:{}:{}", ctx.command_name(), err));
            });

        assert!(app.run(["demo", "exec"]).is_err());
        assert_eq!(*log.borrow(), ["exit:exec:boom"]);
    }

    #[test]
    fn test_help_renders_commands_and_flags() {
        let buf = SharedBuf::default();
        let app = App::new("demo")
            .usage("a demo app")
            .flag(Flag::new("config").placeholder("PATH").usage("config file"))
            .command(Command::new("list").usage("list things"))
            .writer(buf.clone());

        app.run(["demo", "help"]).unwrap();
        let out = buf.contents();
        assert!(out.contains("demo - a demo app"), "got: {out}");
        assert!(out.contains("list\tlist things"), "got: {out}");
        assert!(out.contains("--config PATH\tconfig file"), "got: {out}");
    }

    #[test]
    fn test_empty_action_prints_command_help() {
        let buf = SharedBuf::default();
        let app = App::new("demo")
            .command(Command::new("list").usage("list things"))
            .writer(buf.clone());

        app.run(["demo", "list"]).unwrap();
        assert!(buf.contents().contains("list - list things"));
    }

    #[test]
    fn test_extension_action_fails_at_run_time() {
        let app = App::new("demo")
            .command(Command::new("exec").action_value(ActionValue::extension("not callable")));

        let err = app.run(["demo", "exec"]).unwrap_err();
        assert!(err.to_string().contains("non-callable"), "got: {err}");
    }

    #[test]
    fn test_metadata_reachable_from_hooks() {
        struct Invocations(u32);

        let app = App::new("demo").command(Command::new("exec").action(|ctx| {
            ctx.app().metadata.insert(Invocations(1));
            Ok(())
        }));

        app.run(["demo", "exec"]).unwrap();
        assert_eq!(app.metadata.get::<Invocations>().map(|i| i.0), Some(1));
    }
}
