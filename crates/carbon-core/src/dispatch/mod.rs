//! Command dispatcher
//!
//! A [`CommandDispatcher`] maps command names to overload sets and resolves
//! each call at runtime:
//!
//! 1. name lookup (direct key, then alias sets, else `UnknownCommand` with an
//!    optional "did you mean" suggestion that is never executed)
//! 2. missing trailing arguments completed from named-argument defaults
//! 3. precondition
//! 4. execution, raced against the command timeout on a fresh thread when one
//!    is configured
//! 5. overload selection: a single overload is called directly; with several,
//!    the structural hash of the argument types must match one of them,
//!    otherwise registered conversions are tried when enabled
//! 6. postcondition
//!
//! The command table is guarded by one `parking_lot::RwLock`. Dispatch clones
//! the entry out of the table and runs with no lock held.
//!
//! A timed-out call is abandoned, not interrupted: the worker thread runs to
//! completion and its result is dropped.

mod callable;
mod command;

pub use callable::{
    argument_hash, signature_hash, Callable, InvokeError, InvokeFn, Method, MethodFn, MethodMut,
    MethodOverload, Overload,
};
pub use command::{Arg, CommandBuilder, CommandStats, IntoArgs, Postcondition, Precondition, Signature};

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::{bounded, RecvTimeoutError};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::{debug, trace, warn};

use crate::any::{BadAnyCast, Boxable};
use crate::boxed::BoxedValue;
use crate::convert::TypeConversions;
use crate::options::DispatcherOptions;
use command::{Command, CommandAttrs};

/// Dispatch failures
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DispatchError {
    /// Name not found directly or through aliases
    #[error(
        "Unknown command: {name}{}",
        .suggestion.as_ref().map(|s| format!(" (did you mean '{s}'?)")).unwrap_or_default()
    )]
    UnknownCommand {
        /// Requested name
        name: String,
        /// Closest registered name, if any
        suggestion: Option<String>,
    },

    /// A required argument was neither supplied nor defaulted
    #[error("Missing argument '{argument}' for command {command}")]
    MissingArgument {
        /// Command name
        command: String,
        /// Parameter name
        argument: String,
    },

    /// The selected overload takes a different number of arguments
    #[error("Command {command} expects {expected} arguments, got {got}")]
    ArgumentCount {
        /// Command name
        command: String,
        /// Declared parameter count
        expected: usize,
        /// Supplied argument count
        got: usize,
    },

    /// The precondition returned false
    #[error("Precondition failed for command {command}")]
    PreconditionFailed {
        /// Command name
        command: String,
    },

    /// The timeout elapsed before the call completed
    #[error("Command {command} timed out after {timeout:?}")]
    Timeout {
        /// Command name
        command: String,
        /// Configured budget
        timeout: Duration,
    },

    /// No overload matches the argument types
    #[error("No matching overload found for command {command} with arguments {signature}")]
    NoMatchingOverload {
        /// Command name
        command: String,
        /// Argument type names
        signature: String,
    },

    /// An argument cast failed inside the selected overload
    #[error("Cast failure in command {command} (overload {hash}): {source}")]
    CastFailure {
        /// Command name
        command: String,
        /// Hash of the overload that was invoked, as 16 hex digits
        hash: String,
        /// Underlying failure
        source: InvokeError,
    },

    /// An overload with the same signature is already registered
    #[error("Command {command} already has an overload {signature}")]
    DuplicateOverload {
        /// Command name
        command: String,
        /// Rejected signature
        signature: String,
    },

    /// The alias names the command itself or another registered entry
    #[error("Alias '{alias}' for command {command} conflicts with an existing entry")]
    AliasConflict {
        /// Command being aliased
        command: String,
        /// Rejected alias
        alias: String,
    },

    /// The result could not be cast to the requested type
    #[error("Unexpected result type from command {command}: {source}")]
    ResultType {
        /// Command name
        command: String,
        /// Underlying failure
        source: BadAnyCast,
    },

    /// The callable itself failed
    #[error("Command {command} failed: {message}")]
    Failed {
        /// Command name
        command: String,
        /// Failure description
        message: String,
    },
}

#[derive(Default)]
struct Table {
    commands: FxHashMap<String, Command>,
    groups: FxHashMap<String, String>,
    timeouts: FxHashMap<String, Duration>,
}

impl Table {
    fn find(&self, name: &str) -> Option<&Command> {
        self.commands.get(name).or_else(|| {
            self.commands
                .values()
                .find(|cmd| cmd.aliases.iter().any(|a| a == name))
        })
    }

    fn keys_of(&self, primary: &str) -> Vec<String> {
        self.commands
            .iter()
            .filter(|(_, cmd)| cmd.name == primary)
            .map(|(key, _)| key.clone())
            .collect()
    }

    fn suggest(&self, name: &str, max_distance: usize) -> Option<String> {
        let lower = name.to_lowercase();
        self.commands
            .keys()
            .map(|key| {
                let d = if key.to_lowercase() == lower {
                    0
                } else {
                    edit_distance(key, name)
                };
                (d, key)
            })
            .filter(|(d, _)| *d <= max_distance)
            .min_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(b.1)))
            .map(|(_, key)| key.clone())
    }
}

fn edit_distance(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut cur = vec![0; b.len() + 1];
    for (i, ca) in a.chars().enumerate() {
        cur[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            cur[j + 1] = (prev[j + 1] + 1).min(cur[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    prev[b.len()]
}

/// Named-command registry with runtime overload resolution
pub struct CommandDispatcher {
    table: RwLock<Table>,
    caster: Option<Arc<TypeConversions>>,
    options: DispatcherOptions,
}

impl CommandDispatcher {
    /// Dispatcher using `caster` for conversion fallback
    pub fn new(caster: Arc<TypeConversions>) -> Self {
        Self::with_options(Some(caster), DispatcherOptions::default())
    }

    /// Dispatcher with exact matching only
    pub fn without_conversions() -> Self {
        Self::with_options(None, DispatcherOptions::default())
    }

    /// Dispatcher with explicit options
    pub fn with_options(caster: Option<Arc<TypeConversions>>, options: DispatcherOptions) -> Self {
        CommandDispatcher {
            table: RwLock::new(Table::default()),
            caster,
            options,
        }
    }

    /// Active options
    pub fn options(&self) -> &DispatcherOptions {
        &self.options
    }

    /// Attached conversion engine
    pub fn caster(&self) -> Option<&Arc<TypeConversions>> {
        self.caster.as_ref()
    }

    // ------------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------------

    /// Start a fluent registration under `name`
    pub fn command(&self, name: &str) -> CommandBuilder<'_> {
        CommandBuilder::new(self, name)
    }

    /// Register `f` under `name`; an existing name gains another overload.
    ///
    /// An empty `group` leaves the group membership unchanged.
    pub fn def<Args, F: Callable<Args>>(
        &self,
        name: &str,
        group: &str,
        description: &str,
        f: F,
    ) -> Result<(), DispatchError> {
        self.builder(name, group, description).def(f)
    }

    /// [`def`](Self::def) with call statistics, read through [`command_stats`](Self::command_stats)
    pub fn def_timed<Args, F: Callable<Args>>(
        &self,
        name: &str,
        group: &str,
        description: &str,
        f: F,
    ) -> Result<(), DispatchError> {
        self.builder(name, group, description).timed().def(f)
    }

    fn builder(&self, name: &str, group: &str, description: &str) -> CommandBuilder<'_> {
        let mut b = self.command(name).description(description);
        if !group.is_empty() {
            b = b.group(group);
        }
        b
    }

    pub(crate) fn register(
        &self,
        name: &str,
        overload: Overload,
        attrs: CommandAttrs,
    ) -> Result<(), DispatchError> {
        let mut table = self.table.write();
        let primary = table
            .commands
            .get(name)
            .map_or_else(|| name.to_string(), |cmd| cmd.name.clone());

        let mut cmd = table
            .commands
            .get(&primary)
            .cloned()
            .unwrap_or_else(|| Command::new(&primary));

        if cmd.overloads.iter().any(|ov| ov.hash() == overload.hash()) {
            return Err(DispatchError::DuplicateOverload {
                command: primary,
                signature: Signature::from(&overload).to_string(),
            });
        }

        let overload = if attrs.timed {
            let stats = Arc::clone(cmd.stats.get_or_insert_with(Default::default));
            overload.map_invoke(|invoke| stats.wrap(invoke))
        } else {
            overload
        };
        debug!(command = %primary, overloads = cmd.overloads.len() + 1, signature = ?overload, "registered overload");
        cmd.overloads.push(overload);

        if let Some(description) = attrs.description.filter(|d| !d.is_empty()) {
            cmd.description = description;
        }
        if !attrs.args.is_empty() {
            cmd.args = attrs.args;
        }
        if attrs.precondition.is_some() {
            cmd.precondition = attrs.precondition;
        }
        if attrs.postcondition.is_some() {
            cmd.postcondition = attrs.postcondition;
        }

        let keys = {
            let mut keys = table.keys_of(&primary);
            if keys.is_empty() {
                keys.push(primary.clone());
            }
            keys
        };
        for key in &keys {
            table.commands.insert(key.clone(), cmd.clone());
            if let Some(group) = &attrs.group {
                table.groups.insert(key.clone(), group.clone());
            }
        }
        if let Some(timeout) = attrs.timeout {
            table.timeouts.insert(primary, timeout);
        }
        Ok(())
    }

    /// Duplicate `name`'s entry under `alias`, mirroring its group
    pub fn add_alias(&self, name: &str, alias: &str) -> Result<(), DispatchError> {
        let mut table = self.table.write();
        let primary = table
            .find(name)
            .map(|cmd| cmd.name.clone())
            .ok_or_else(|| DispatchError::UnknownCommand {
                name: name.to_string(),
                suggestion: None,
            })?;

        let taken_elsewhere = table
            .commands
            .get(alias)
            .is_some_and(|cmd| cmd.name != primary);
        if alias == primary || taken_elsewhere {
            return Err(DispatchError::AliasConflict {
                command: primary,
                alias: alias.to_string(),
            });
        }

        for key in table.keys_of(&primary) {
            if let Some(cmd) = table.commands.get_mut(&key) {
                if !cmd.aliases.iter().any(|a| a == alias) {
                    cmd.aliases.push(alias.to_string());
                }
            }
        }
        if let Some(cmd) = table.commands.get(&primary).cloned() {
            table.commands.insert(alias.to_string(), cmd);
        }
        if let Some(group) = table.groups.get(&primary).cloned() {
            table.groups.insert(alias.to_string(), group);
        }
        debug!(command = %primary, alias, "registered alias");
        Ok(())
    }

    /// Put `name` into `group`
    pub fn add_group(&self, name: &str, group: &str) -> Result<(), DispatchError> {
        let mut table = self.table.write();
        if !table.commands.contains_key(name) {
            return Err(DispatchError::UnknownCommand {
                name: name.to_string(),
                suggestion: None,
            });
        }
        table.groups.insert(name.to_string(), group.to_string());
        Ok(())
    }

    /// Set the wall-clock budget of `name`
    pub fn set_timeout(&self, name: &str, timeout: Duration) -> Result<(), DispatchError> {
        let mut table = self.table.write();
        if table.find(name).is_none() {
            return Err(DispatchError::UnknownCommand {
                name: name.to_string(),
                suggestion: None,
            });
        }
        table.timeouts.insert(name.to_string(), timeout);
        Ok(())
    }

    /// Remove a command with its aliases, group memberships and timeouts
    pub fn remove_command(&self, name: &str) -> bool {
        let mut table = self.table.write();
        let Some(primary) = table.find(name).map(|cmd| cmd.name.clone()) else {
            return false;
        };
        for key in table.keys_of(&primary) {
            table.commands.remove(&key);
            table.groups.remove(&key);
            table.timeouts.remove(&key);
        }
        debug!(command = %primary, "removed command");
        true
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    /// Check for a command or alias
    pub fn has(&self, name: &str) -> bool {
        self.table.read().find(name).is_some()
    }

    /// Sorted names tagged with `group`
    pub fn get_commands_in_group(&self, group: &str) -> Vec<String> {
        let table = self.table.read();
        let mut names: Vec<String> = table
            .groups
            .iter()
            .filter(|(_, g)| g.as_str() == group)
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Description of `name`
    pub fn get_command_description(&self, name: &str) -> Option<String> {
        self.table.read().find(name).map(|cmd| cmd.description.clone())
    }

    /// Aliases of `name`
    pub fn get_command_aliases(&self, name: &str) -> Vec<String> {
        self.table
            .read()
            .find(name)
            .map(|cmd| cmd.aliases.clone())
            .unwrap_or_default()
    }

    /// Every registered name and alias, sorted and deduplicated
    pub fn get_all_commands(&self) -> Vec<String> {
        let table = self.table.read();
        let mut names: Vec<String> = table
            .commands
            .iter()
            .flat_map(|(key, cmd)| std::iter::once(key.clone()).chain(cmd.aliases.iter().cloned()))
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Signatures of `name`'s overloads in registration order
    pub fn command_signatures(&self, name: &str) -> Vec<Signature> {
        self.table
            .read()
            .find(name)
            .map(|cmd| cmd.overloads.iter().map(Signature::from).collect())
            .unwrap_or_default()
    }

    /// Call statistics of a timed command
    pub fn command_stats(&self, name: &str) -> Option<Arc<CommandStats>> {
        self.table.read().find(name).and_then(|cmd| cmd.stats.clone())
    }

    /// Effective timeout of `name`
    pub fn timeout_of(&self, name: &str) -> Option<Duration> {
        let table = self.table.read();
        let primary = table.find(name).map(|cmd| cmd.name.as_str());
        table
            .timeouts
            .get(name)
            .or_else(|| primary.and_then(|p| table.timeouts.get(p)))
            .copied()
            .or_else(|| self.options.default_timeout())
    }

    // ------------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------------

    /// Call `name` with native arguments
    pub fn dispatch(&self, name: &str, args: impl IntoArgs) -> Result<BoxedValue, DispatchError> {
        self.dispatch_boxed(name, args.into_args())
    }

    /// Call `name` and cast the result to `R`
    pub fn dispatch_as<R: Boxable>(&self, name: &str, args: impl IntoArgs) -> Result<R, DispatchError> {
        self.dispatch(name, args)?
            .cast::<R>()
            .map_err(|source| DispatchError::ResultType {
                command: name.to_string(),
                source,
            })
    }

    /// Call `name` with boxed arguments
    pub fn dispatch_boxed(&self, name: &str, mut args: Vec<BoxedValue>) -> Result<BoxedValue, DispatchError> {
        let (command, timeout) = self.resolve(name)?;

        command.complete_args(&mut args)?;

        if let Some(pre) = &command.precondition {
            if !pre() {
                return Err(DispatchError::PreconditionFailed {
                    command: command.name.clone(),
                });
            }
        }

        let caster = self.fallback_caster();
        let result = match timeout {
            Some(timeout) => run_with_timeout(command.clone(), args, caster, timeout)?,
            None => invoke(&command, &args, caster.as_deref())?,
        };

        if let Some(post) = &command.postcondition {
            if catch_unwind(AssertUnwindSafe(|| post())).is_err() {
                warn!(command = %command.name, "postcondition panicked");
            }
        }
        Ok(result)
    }

    fn fallback_caster(&self) -> Option<Arc<TypeConversions>> {
        if self.options.conversion_fallback {
            self.caster.clone()
        } else {
            None
        }
    }

    fn resolve(&self, name: &str) -> Result<(Command, Option<Duration>), DispatchError> {
        let table = self.table.read();
        let Some(command) = table.find(name) else {
            let suggestion = if self.options.suggest_similar {
                table.suggest(name, self.options.max_suggestion_distance)
            } else {
                None
            };
            return Err(DispatchError::UnknownCommand {
                name: name.to_string(),
                suggestion,
            });
        };
        let timeout = table
            .timeouts
            .get(name)
            .or_else(|| table.timeouts.get(&command.name))
            .copied()
            .or_else(|| self.options.default_timeout());
        Ok((command.clone(), timeout))
    }
}

impl Default for CommandDispatcher {
    fn default() -> Self {
        Self::without_conversions()
    }
}

impl fmt::Debug for CommandDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let table = self.table.read();
        f.debug_struct("CommandDispatcher")
            .field("commands", &table.commands.len())
            .field("groups", &table.groups.len())
            .field("timeouts", &table.timeouts.len())
            .field("options", &self.options)
            .finish()
    }
}

fn run_with_timeout(
    command: Command,
    args: Vec<BoxedValue>,
    caster: Option<Arc<TypeConversions>>,
    timeout: Duration,
) -> Result<BoxedValue, DispatchError> {
    let name = command.name.clone();
    let (tx, rx) = bounded(1);
    std::thread::Builder::new()
        .name(format!("carbon-dispatch-{name}"))
        .spawn(move || {
            // The receiver is gone once the caller has given up.
            let _ = tx.send(invoke(&command, &args, caster.as_deref()));
        })
        .map_err(|e| DispatchError::Failed {
            command: name.clone(),
            message: format!("failed to spawn worker: {e}"),
        })?;

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => {
            warn!(command = %name, ?timeout, "dispatch timed out");
            Err(DispatchError::Timeout {
                command: name,
                timeout,
            })
        }
        Err(RecvTimeoutError::Disconnected) => Err(DispatchError::Failed {
            command: name,
            message: "worker panicked".to_string(),
        }),
    }
}

fn invoke(
    command: &Command,
    args: &[BoxedValue],
    caster: Option<&TypeConversions>,
) -> Result<BoxedValue, DispatchError> {
    let (overload, args) = select_overload(command, args, caster)?;
    trace!(command = %command.name, overload = ?overload, "invoking");
    overload
        .call(&args)
        .map_err(|e| map_invoke_error(&command.name, overload, e))
}

fn select_overload<'c>(
    command: &'c Command,
    args: &[BoxedValue],
    caster: Option<&TypeConversions>,
) -> Result<(&'c Overload, Vec<BoxedValue>), DispatchError> {
    if let [single] = command.overloads.as_slice() {
        if !single.accepts(args) {
            if let Some(coerced) = caster.and_then(|c| coerce(single, args, c)) {
                trace!(command = %command.name, "single overload via conversion");
                return Ok((single, coerced));
            }
        }
        return Ok((single, args.to_vec()));
    }

    let hash = argument_hash(args);
    if let Some(ov) = command.overloads.iter().find(|ov| ov.hash() == hash) {
        return Ok((ov, args.to_vec()));
    }

    if let Some(caster) = caster {
        for ov in command.overloads.iter().filter(|ov| ov.arity() == args.len()) {
            if let Some(coerced) = coerce(ov, args, caster) {
                trace!(command = %command.name, overload = ?ov, "overload via conversion");
                return Ok((ov, coerced));
            }
        }
    }

    let signature: Vec<String> = args.iter().map(BoxedValue::type_name).collect();
    Err(DispatchError::NoMatchingOverload {
        command: command.name.clone(),
        signature: format!("({})", signature.join(", ")),
    })
}

fn coerce(overload: &Overload, args: &[BoxedValue], caster: &TypeConversions) -> Option<Vec<BoxedValue>> {
    if overload.arity() != args.len() {
        return None;
    }
    overload
        .params()
        .iter()
        .zip(args)
        .map(|(param, arg)| {
            if arg.is_type(param) {
                Some(arg.clone())
            } else {
                caster.convert_boxed(arg, param).ok()
            }
        })
        .collect()
}

fn map_invoke_error(command: &str, overload: &Overload, err: InvokeError) -> DispatchError {
    match err {
        InvokeError::Arity { expected, got } => DispatchError::ArgumentCount {
            command: command.to_string(),
            expected,
            got,
        },
        InvokeError::Failed(message) => DispatchError::Failed {
            command: command.to_string(),
            message,
        },
        source => DispatchError::CastFailure {
            command: command.to_string(),
            hash: format!("{:016x}", overload.hash()),
            source,
        },
    }
}

/// Dispatch with native arguments boxed in place.
///
/// ```ignore
/// let sum = dispatch!(dispatcher, "add", 3i32, 4i32)?;
/// ```
#[macro_export]
macro_rules! dispatch {
    ($dispatcher:expr, $name:expr $(, $arg:expr)* $(,)?) => {
        $dispatcher.dispatch_boxed($name, vec![$($crate::boxed::var($arg)),*])
    };
}
