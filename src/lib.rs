//! Convert `.env` files to JSON or env listings and back.
//!
//! Input goes through three passes before anything reads a value:
//! control characters are escaped line by line ([`normalize`]), physical
//! lines are regrouped into one `KEY="..."` record per key ([`reassemble`]),
//! and `${...}` placeholders are guarded so they are never expanded
//! by accident ([`PlaceholderGuard`]). The resulting text is projected onto
//! an ordered [`EnvMapping`] and rendered by a [`Formatter`].
//!
//! [`JsonDotEnv`] ties the passes together and implements the
//! `list`/`keys`/`get`/`set`/`unset` commands.

mod config;
mod error;
mod expand;
mod format;
mod guard;
mod model;
mod normalize;
mod parser;
mod reassemble;
mod session;
mod store;

pub use config::{Config, STDIO_SENTINEL, Source, Target};
pub use error::{Error, ParseError, ParseErrorKind, exit_code};
pub use expand::expand;
pub use format::{Formatter, needs_quotes, quote_value};
pub use guard::{EscapeTable, PlaceholderGuard};
pub use model::{EnvMapping, Entry, OutputFormat, QuotePolicy, SubstitutionMode, is_identifier};
pub use normalize::{is_control, normalize, normalize_newlines};
pub use parser::project;
pub use reassemble::{Line, LineKind, LogicalRecord, Reassembler, State, Step, reassemble, records, transition};
pub use session::{JsonDotEnv, Output, parse_assignments};
pub use store::{WorkingCopy, persist};
