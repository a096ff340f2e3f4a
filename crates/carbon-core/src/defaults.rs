//! Default constants for dispatcher configuration.

/// Default execution budget for commands without their own timeout (none).
pub const DEFAULT_TIMEOUT_MS: Option<u64> = None;

/// Conversion-assisted overload fallback is on when a conversion engine is attached.
pub const DEFAULT_CONVERSION_FALLBACK: bool = true;

/// "Did you mean" suggestions for unknown commands.
pub const DEFAULT_SUGGEST_SIMILAR: bool = true;

/// Largest edit distance at which a command name is offered as a suggestion.
pub const DEFAULT_MAX_SUGGESTION_DISTANCE: usize = 2;

/// Upper bound accepted for `max_suggestion_distance`.
pub const MAX_SUGGESTION_DISTANCE_LIMIT: usize = 16;
