//! Command table entries

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use carbon_types::TypeInfo;

use super::callable::{Callable, InvokeError, InvokeFn, Overload};
use super::{CommandDispatcher, DispatchError};
use crate::any::Boxable;
use crate::boxed::{var, BoxedValue};

/// Guard evaluated before a command runs
pub type Precondition = Arc<dyn Fn() -> bool + Send + Sync>;

/// Hook evaluated after a command succeeds
pub type Postcondition = Arc<dyn Fn() + Send + Sync>;

/// Named parameter with an optional default
#[derive(Clone, Debug)]
pub struct Arg {
    name: String,
    default: Option<BoxedValue>,
}

impl Arg {
    /// Required parameter
    pub fn new(name: impl Into<String>) -> Self {
        Arg {
            name: name.into(),
            default: None,
        }
    }

    /// Parameter filled with `value` when the caller omits it
    pub fn with_default<T: Boxable>(name: impl Into<String>, value: T) -> Self {
        Arg {
            name: name.into(),
            default: Some(var(value)),
        }
    }

    /// Parameter name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Default value, if any
    pub fn default_value(&self) -> Option<&BoxedValue> {
        self.default.as_ref()
    }
}

/// Call counters of a timed command
#[derive(Debug, Default)]
pub struct CommandStats {
    calls: AtomicU64,
    total_nanos: AtomicU64,
    last_nanos: AtomicU64,
}

impl CommandStats {
    fn record(&self, elapsed: Duration) {
        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.total_nanos.fetch_add(nanos, Ordering::Relaxed);
        self.last_nanos.store(nanos, Ordering::Relaxed);
    }

    /// Completed calls
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    /// Sum of execution times
    pub fn total_time(&self) -> Duration {
        Duration::from_nanos(self.total_nanos.load(Ordering::Relaxed))
    }

    /// Execution time of the most recent call
    pub fn last_time(&self) -> Duration {
        Duration::from_nanos(self.last_nanos.load(Ordering::Relaxed))
    }

    /// Mean execution time
    pub fn average_time(&self) -> Duration {
        match self.calls() {
            0 => Duration::ZERO,
            n => self.total_time() / u32::try_from(n).unwrap_or(u32::MAX),
        }
    }

    pub(crate) fn wrap(self: &Arc<Self>, invoke: InvokeFn) -> InvokeFn {
        let stats = Arc::clone(self);
        Arc::new(move |args: &[BoxedValue]| {
            let start = Instant::now();
            let result = invoke(args);
            stats.record(start.elapsed());
            result
        })
    }
}

/// Registered signature of one overload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    /// Parameter type names
    pub params: Vec<String>,
    /// Return type name
    pub ret: String,
    /// Structural signature hash
    pub hash: u64,
}

impl From<&Overload> for Signature {
    fn from(ov: &Overload) -> Self {
        Signature {
            params: ov.params().iter().map(TypeInfo::short_name).collect(),
            ret: ov.return_type().short_name(),
            hash: ov.hash(),
        }
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}) -> {}", self.params.join(", "), self.ret)
    }
}

/// One command table entry; alias keys hold copies of the primary entry
#[derive(Clone)]
pub(crate) struct Command {
    pub(crate) name: String,
    pub(crate) overloads: Vec<Overload>,
    pub(crate) description: String,
    pub(crate) aliases: Vec<String>,
    pub(crate) precondition: Option<Precondition>,
    pub(crate) postcondition: Option<Postcondition>,
    pub(crate) args: Vec<Arg>,
    pub(crate) stats: Option<Arc<CommandStats>>,
}

impl Command {
    pub(crate) fn new(name: &str) -> Self {
        Command {
            name: name.to_string(),
            overloads: Vec::new(),
            description: String::new(),
            aliases: Vec::new(),
            precondition: None,
            postcondition: None,
            args: Vec::new(),
            stats: None,
        }
    }

    /// Fill omitted trailing arguments from defaults
    pub(crate) fn complete_args(&self, args: &mut Vec<BoxedValue>) -> Result<(), DispatchError> {
        for arg in self.args.iter().skip(args.len()) {
            match &arg.default {
                Some(default) => args.push(default.clone()),
                None => {
                    return Err(DispatchError::MissingArgument {
                        command: self.name.clone(),
                        argument: arg.name.clone(),
                    })
                }
            }
        }
        Ok(())
    }
}

/// Optional attributes of a registration
#[derive(Default, Clone)]
pub(crate) struct CommandAttrs {
    pub(crate) group: Option<String>,
    pub(crate) description: Option<String>,
    pub(crate) args: Vec<Arg>,
    pub(crate) precondition: Option<Precondition>,
    pub(crate) postcondition: Option<Postcondition>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) timed: bool,
}

/// Fluent registration of one overload.
///
/// ```ignore
/// dispatcher
///     .command("increment")
///     .group("math")
///     .arg(Arg::with_default("a", 42i32))
///     .def(|a: i32| a + 1)?;
/// ```
#[must_use = "a command builder does nothing until `def` is called"]
pub struct CommandBuilder<'a> {
    dispatcher: &'a CommandDispatcher,
    name: String,
    attrs: CommandAttrs,
}

impl<'a> CommandBuilder<'a> {
    pub(crate) fn new(dispatcher: &'a CommandDispatcher, name: &str) -> Self {
        CommandBuilder {
            dispatcher,
            name: name.to_string(),
            attrs: CommandAttrs::default(),
        }
    }

    /// Group tag
    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.attrs.group = Some(group.into());
        self
    }

    /// Free-text description
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.attrs.description = Some(description.into());
        self
    }

    /// Append a named parameter
    pub fn arg(mut self, arg: Arg) -> Self {
        self.attrs.args.push(arg);
        self
    }

    /// Replace the named parameters
    pub fn args(mut self, args: impl IntoIterator<Item = Arg>) -> Self {
        self.attrs.args = args.into_iter().collect();
        self
    }

    /// Guard that must return `true` for the command to run
    pub fn precondition(mut self, f: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        self.attrs.precondition = Some(Arc::new(f));
        self
    }

    /// Hook run after each successful call
    pub fn postcondition(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.attrs.postcondition = Some(Arc::new(f));
        self
    }

    /// Wall-clock budget per call
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.attrs.timeout = Some(timeout);
        self
    }

    /// Record call statistics
    pub fn timed(mut self) -> Self {
        self.attrs.timed = true;
        self
    }

    /// Register a native callable
    pub fn def<Args, F: Callable<Args>>(self, f: F) -> Result<(), DispatchError> {
        self.dispatcher
            .register(&self.name, f.into_overload(), self.attrs)
    }

    /// Register an erased callable with an explicit signature
    pub fn def_raw<F>(self, params: Vec<TypeInfo>, ret: TypeInfo, f: F) -> Result<(), DispatchError>
    where
        F: Fn(&[BoxedValue]) -> Result<BoxedValue, InvokeError> + Send + Sync + 'static,
    {
        self.dispatcher
            .register(&self.name, Overload::new(params, ret, Arc::new(f)), self.attrs)
    }
}

/// Values that can be passed as a dispatch argument list
pub trait IntoArgs {
    /// Box the arguments
    fn into_args(self) -> Vec<BoxedValue>;
}

impl IntoArgs for Vec<BoxedValue> {
    fn into_args(self) -> Vec<BoxedValue> {
        self
    }
}

impl IntoArgs for &[BoxedValue] {
    fn into_args(self) -> Vec<BoxedValue> {
        self.to_vec()
    }
}

impl IntoArgs for () {
    fn into_args(self) -> Vec<BoxedValue> {
        Vec::new()
    }
}

macro_rules! impl_into_args {
    ($($ty:ident $idx:tt),+) => {
        impl<$($ty: Boxable),+> IntoArgs for ($($ty,)+) {
            fn into_args(self) -> Vec<BoxedValue> {
                vec![$(var(self.$idx)),+]
            }
        }
    };
}

impl_into_args!(A0 0);
impl_into_args!(A0 0, A1 1);
impl_into_args!(A0 0, A1 1, A2 2);
impl_into_args!(A0 0, A1 1, A2 2, A3 3);
impl_into_args!(A0 0, A1 1, A2 2, A3 3, A4 4);
impl_into_args!(A0 0, A1 1, A2 2, A3 3, A4 4, A5 5);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complete_args() {
        let mut cmd = Command::new("scale");
        cmd.args = vec![Arg::new("x"), Arg::with_default("factor", 2i32)];

        let mut args = vec![var(5i32)];
        cmd.complete_args(&mut args).unwrap();
        assert_eq!(args.len(), 2);
        assert_eq!(args[1].try_cast::<i32>(), Some(2));

        let mut none = Vec::new();
        assert!(matches!(
            cmd.complete_args(&mut none),
            Err(DispatchError::MissingArgument { argument, .. }) if argument == "x"
        ));

        let mut extra = vec![var(1i32), var(2i32), var(3i32)];
        cmd.complete_args(&mut extra).unwrap();
        assert_eq!(extra.len(), 3);
    }

    #[test]
    fn test_stats() {
        let stats = Arc::new(CommandStats::default());
        assert_eq!(stats.average_time(), Duration::ZERO);
        stats.record(Duration::from_millis(4));
        stats.record(Duration::from_millis(2));
        assert_eq!(stats.calls(), 2);
        assert_eq!(stats.total_time(), Duration::from_millis(6));
        assert_eq!(stats.last_time(), Duration::from_millis(2));
        assert_eq!(stats.average_time(), Duration::from_millis(3));
    }

    #[test]
    fn test_into_args() {
        assert!(().into_args().is_empty());
        let args = (1i32, String::from("a")).into_args();
        assert_eq!(args[1].try_cast::<String>().unwrap(), "a");
        let single = (true,).into_args();
        assert_eq!(single.len(), 1);
    }

    #[test]
    fn test_signature_display() {
        let ov = (|a: i32, b: i32| a + b).into_overload();
        let sig = Signature::from(&ov);
        assert_eq!(sig.to_string(), "(i32, i32) -> i32");
    }
}
