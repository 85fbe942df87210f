//! Callable shapes for lifecycle and cross-cutting hooks.
//!
//! Before, action, and after hooks all share one signature: they receive
//! the execution [`Context`] and return a [`HookResult`]. The framework
//! never interprets hook errors; they pass through `run` untouched.
//!
//! The action slot is special: it accepts two structurally identical but
//! differently typed callable representations (a plain function pointer and
//! a counted closure), modeled as the closed [`ActionValue`] variant. A
//! third variant carries opaque extension payloads that the dispatcher
//! cannot call; anything that chains through actions must reject it with a
//! typed error instead of guessing.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::io::Write;
use std::rc::Rc;

use serde_json::Value;

use crate::context::Context;
use crate::error::RunError;

/// Result type shared by every fallible hook.
pub type HookResult = anyhow::Result<()>;

/// The shared shape of before/action/after hooks: a counted closure over
/// the execution context.
pub type ActionFn = Rc<dyn Fn(&Context<'_>) -> HookResult>;

/// The framework-native action shape: a plain function pointer.
pub type PlainActionFn = fn(&Context<'_>) -> HookResult;

/// An opaque payload stored in an action slot by an integration that
/// dispatches actions itself. Carries its concrete type name so callers
/// that cannot handle it can say what they found.
#[derive(Clone)]
pub struct OpaqueValue {
    type_name: &'static str,
    value: Rc<dyn Any>,
}

impl OpaqueValue {
    /// Wraps an arbitrary value, recording its type name for diagnostics.
    pub fn new<T: 'static>(value: T) -> Self {
        Self {
            type_name: std::any::type_name::<T>(),
            value: Rc::new(value),
        }
    }

    /// The concrete type name of the wrapped value.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Borrows the wrapped value if it is a `T`.
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.value.downcast_ref()
    }
}

impl fmt::Debug for OpaqueValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpaqueValue")
            .field("type_name", &self.type_name)
            .finish()
    }
}

/// Value stored in a command's action slot.
///
/// `Plain` and `Closure` are the two accepted callable representations;
/// both normalize to the same calling convention. `Extension` is not
/// callable by the dispatcher.
#[derive(Clone)]
pub enum ActionValue {
    /// A plain function pointer, the framework's native action shape.
    Plain(PlainActionFn),
    /// A counted closure, as installed by builders and instrumentation
    /// layers.
    Closure(ActionFn),
    /// An opaque extension payload; rejected wherever a callable is
    /// required.
    Extension(OpaqueValue),
}

impl ActionValue {
    /// Wraps a closure.
    pub fn closure(f: impl Fn(&Context<'_>) -> HookResult + 'static) -> Self {
        ActionValue::Closure(Rc::new(f))
    }

    /// Wraps a plain function pointer.
    pub fn plain(f: PlainActionFn) -> Self {
        ActionValue::Plain(f)
    }

    /// Wraps an opaque extension payload.
    pub fn extension<T: 'static>(value: T) -> Self {
        ActionValue::Extension(OpaqueValue::new(value))
    }

    /// A human-readable name for the stored representation, used in
    /// diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            ActionValue::Plain(_) => "fn(&Context) -> HookResult",
            ActionValue::Closure(_) => "Rc<dyn Fn(&Context) -> HookResult>",
            ActionValue::Extension(v) => v.type_name(),
        }
    }

    /// Invokes the stored callable.
    ///
    /// Fails with [`RunError::ExtensionAction`] when the slot holds an
    /// extension payload.
    pub fn invoke(&self, ctx: &Context<'_>) -> HookResult {
        match self {
            ActionValue::Plain(f) => f(ctx),
            ActionValue::Closure(f) => f(ctx),
            ActionValue::Extension(v) => Err(RunError::ExtensionAction(v.type_name()).into()),
        }
    }
}

impl fmt::Debug for ActionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionValue::Plain(_) => f.write_str("ActionValue::Plain"),
            ActionValue::Closure(_) => f.write_str("ActionValue::Closure"),
            ActionValue::Extension(v) => write!(f, "ActionValue::Extension({})", v.type_name()),
        }
    }
}

/// Prints help for the application or a command: writer, template, data.
pub type HelpPrinter = Rc<dyn Fn(&mut dyn Write, &str, &Value)>;

/// Named template functions made available to custom help printers.
pub type TemplateFuncs = HashMap<String, Rc<dyn Fn(&[Value]) -> String>>;

/// Prints help with custom template functions.
pub type HelpPrinterCustom = Rc<dyn Fn(&mut dyn Write, &str, &Value, &TemplateFuncs)>;

/// Invoked when command resolution fails; receives the unknown name.
pub type CommandNotFoundFn = Rc<dyn Fn(&Context<'_>, &str)>;

/// Invoked on a usage error; its return value replaces the original error.
/// The flag reports whether a command had already been resolved.
pub type OnUsageErrorFn = Rc<dyn Fn(&Context<'_>, &anyhow::Error, bool) -> HookResult>;

/// Invoked with the final error of a run before `run` returns it.
pub type ExitErrHandlerFn = Rc<dyn Fn(&Context<'_>, &anyhow::Error)>;

/// Renders a flag as a single help line.
pub type FlagStringFn = Rc<dyn Fn(&crate::app::Flag) -> String>;

/// Builds the prefix text for a flag's full name: `(full_name, placeholder)`.
pub type FlagNamePrefixFn = Rc<dyn Fn(&str, &str) -> String>;

/// Annotates a flag help line with environment variable details:
/// `(env_var, line)`.
pub type FlagEnvHintFn = Rc<dyn Fn(&str, &str) -> String>;

/// Annotates a flag help line with file details: `(file_path, line)`.
pub type FlagFileHintFn = Rc<dyn Fn(&str, &str) -> String>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::App;

    #[test]
    fn test_action_value_invokes_both_callable_shapes() {
        fn plain(_: &Context<'_>) -> HookResult {
            Ok(())
        }

        let app = App::new("demo");
        let ctx = Context::root(&app);

        assert!(ActionValue::plain(plain).invoke(&ctx).is_ok());
        assert!(ActionValue::closure(|_| Ok(())).invoke(&ctx).is_ok());
    }

    #[test]
    fn test_extension_action_is_not_callable() {
        let app = App::new("demo");
        let ctx = Context::root(&app);

        let value = ActionValue::extension(42u32);
        let err = value.invoke(&ctx).unwrap_err();
        assert!(err.to_string().contains("u32"), "got: {err}");
    }

    #[test]
    fn test_opaque_value_downcast() {
        let opaque = OpaqueValue::new("payload");
        assert!(opaque.type_name().contains("str"));
        assert_eq!(opaque.downcast_ref::<&str>(), Some(&"payload"));
        assert!(opaque.downcast_ref::<u32>().is_none());
    }
}
