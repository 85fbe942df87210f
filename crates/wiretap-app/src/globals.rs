//! Process-wide help and flag-formatting hooks.
//!
//! These six hooks are not owned by any one application: every [`App`] on
//! the current thread renders help through them. They are held in
//! thread-local [`GlobalSlot`]s, initialized with working defaults on first
//! access, and replaceable at runtime. Instrumentation layers that override
//! them must capture the current value first and put it back when done;
//! [`reset`] reinstalls the defaults outright.
//!
//! Precondition: at most one active instrumentation pass may override these
//! slots at a time. The framework is single-threaded and cooperative; the
//! slots are per-thread state with no internal locking.
//!
//! [`App`]: crate::App

use std::io::Write;
use std::rc::Rc;

use serde_json::Value;

use crate::hooks::{
    FlagEnvHintFn, FlagFileHintFn, FlagNamePrefixFn, FlagStringFn, HelpPrinter, HelpPrinterCustom,
    TemplateFuncs,
};
use crate::slot::GlobalSlot;

struct Globals {
    help_printer: GlobalSlot<HelpPrinter>,
    help_printer_custom: GlobalSlot<HelpPrinterCustom>,
    flag_stringer: GlobalSlot<FlagStringFn>,
    flag_name_prefixer: GlobalSlot<FlagNamePrefixFn>,
    flag_env_hinter: GlobalSlot<FlagEnvHintFn>,
    flag_file_hinter: GlobalSlot<FlagFileHintFn>,
}

impl Globals {
    fn with_defaults() -> Self {
        Self {
            help_printer: GlobalSlot::new(Rc::new(default_help_printer) as HelpPrinter),
            help_printer_custom: GlobalSlot::new(
                Rc::new(default_help_printer_custom) as HelpPrinterCustom
            ),
            flag_stringer: GlobalSlot::new(Rc::new(default_flag_string) as FlagStringFn),
            flag_name_prefixer: GlobalSlot::new(
                Rc::new(default_flag_name_prefix) as FlagNamePrefixFn
            ),
            flag_env_hinter: GlobalSlot::new(Rc::new(default_flag_env_hint) as FlagEnvHintFn),
            flag_file_hinter: GlobalSlot::new(Rc::new(default_flag_file_hint) as FlagFileHintFn),
        }
    }
}

thread_local! {
    static GLOBALS: Globals = Globals::with_defaults();
}

/// Handle to the process-wide help printer slot.
pub fn help_printer() -> GlobalSlot<HelpPrinter> {
    GLOBALS.with(|g| g.help_printer.clone())
}

/// Handle to the process-wide custom-template help printer slot.
pub fn help_printer_custom() -> GlobalSlot<HelpPrinterCustom> {
    GLOBALS.with(|g| g.help_printer_custom.clone())
}

/// Handle to the process-wide flag stringer slot.
pub fn flag_stringer() -> GlobalSlot<FlagStringFn> {
    GLOBALS.with(|g| g.flag_stringer.clone())
}

/// Handle to the process-wide flag name prefixer slot.
pub fn flag_name_prefixer() -> GlobalSlot<FlagNamePrefixFn> {
    GLOBALS.with(|g| g.flag_name_prefixer.clone())
}

/// Handle to the process-wide flag env-hint slot.
pub fn flag_env_hinter() -> GlobalSlot<FlagEnvHintFn> {
    GLOBALS.with(|g| g.flag_env_hinter.clone())
}

/// Handle to the process-wide flag file-hint slot.
pub fn flag_file_hinter() -> GlobalSlot<FlagFileHintFn> {
    GLOBALS.with(|g| g.flag_file_hinter.clone())
}

/// Reinstalls the default implementations in every global slot.
pub fn reset() {
    GLOBALS.with(|g| {
        g.help_printer.set(Rc::new(default_help_printer));
        g.help_printer_custom.set(Rc::new(default_help_printer_custom));
        g.flag_stringer.set(Rc::new(default_flag_string));
        g.flag_name_prefixer.set(Rc::new(default_flag_name_prefix));
        g.flag_env_hinter.set(Rc::new(default_flag_env_hint));
        g.flag_file_hinter.set(Rc::new(default_flag_file_hint));
    });
}

/// The default help printer delegates to the current custom printer with an
/// empty function map, so overriding the custom printer also affects plain
/// help rendering.
fn default_help_printer(w: &mut dyn Write, templ: &str, data: &Value) {
    let custom = help_printer_custom().get();
    custom(w, templ, data, &TemplateFuncs::new());
}

/// Renders a template by `{key}` substitution from the top-level data
/// object. String values substitute verbatim; arrays of strings join
/// line-wise; other values substitute as JSON.
fn default_help_printer_custom(w: &mut dyn Write, templ: &str, data: &Value, _funcs: &TemplateFuncs) {
    let mut out = templ.to_string();
    if let Some(object) = data.as_object() {
        for (key, value) in object {
            let rendered = match value {
                Value::String(s) => s.clone(),
                Value::Array(items) => items
                    .iter()
                    .map(|item| match item {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect::<Vec<_>>()
                    .join("\n"),
                other => other.to_string(),
            };
            out = out.replace(&format!("{{{key}}}"), &rendered);
        }
    }
    let _ = w.write_all(out.as_bytes());
}

/// Renders a flag as one help line, threading it through the name-prefix,
/// env-hint, and file-hint hooks currently installed.
fn default_flag_string(flag: &crate::app::Flag) -> String {
    let prefixer = flag_name_prefixer().get();
    let mut line = format!("{}\t{}", prefixer(&flag.name, &flag.placeholder), flag.usage);
    line = flag_env_hinter().get()(&flag.env_var, &line);
    line = flag_file_hinter().get()(&flag.file_path, &line);
    line
}

fn default_flag_name_prefix(full_name: &str, placeholder: &str) -> String {
    if placeholder.is_empty() {
        format!("--{full_name}")
    } else {
        format!("--{full_name} {placeholder}")
    }
}

fn default_flag_env_hint(env_var: &str, line: &str) -> String {
    if env_var.is_empty() {
        line.to_string()
    } else {
        format!("{line} [${env_var}]")
    }
}

fn default_flag_file_hint(file_path: &str, line: &str) -> String {
    if file_path.is_empty() {
        line.to_string()
    } else {
        format!("{line} [{file_path}]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::Flag;
    use serde_json::json;

    #[test]
    fn test_default_template_substitution() {
        let mut buf = Vec::new();
        let printer = help_printer().get();
        printer(
            &mut buf,
            "NAME:\n   {name}\n\nCOMMANDS:\n{commands}\n",
            &json!({"name": "demo", "commands": ["   list", "   add"]}),
        );
        let out = String::from_utf8(buf).unwrap();
        assert_eq!(out, "NAME:\n   demo\n\nCOMMANDS:\n   list\n   add\n");
    }

    #[test]
    fn test_default_flag_string_composes_hints() {
        let flag = Flag::new("config")
            .placeholder("PATH")
            .usage("config file to load")
            .env_var("DEMO_CONFIG")
            .file_path("~/.demo");
        let line = flag_stringer().get()(&flag);
        assert_eq!(
            line,
            "--config PATH\tconfig file to load [$DEMO_CONFIG] [~/.demo]"
        );
    }

    #[test]
    fn test_overriding_prefixer_affects_flag_string() {
        let prefixer = flag_name_prefixer();
        let original = prefixer.replace(Rc::new(|name: &str, _: &str| format!("-{name}")));

        let flag = Flag::new("verbose").usage("talk more");
        let line = flag_stringer().get()(&flag);
        assert_eq!(line, "-verbose\ttalk more");

        prefixer.set(original);
    }

    #[test]
    fn test_reset_reinstalls_defaults() {
        flag_env_hinter().set(Rc::new(|_: &str, line: &str| format!("{line}!!")));
        reset();

        let flag = Flag::new("quiet").usage("talk less");
        assert_eq!(flag_stringer().get()(&flag), "--quiet\ttalk less");
    }
}
