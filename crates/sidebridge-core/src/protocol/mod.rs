//! Wire protocol spoken by the worker on its stdout.
//!
//! Each output line is either plain diagnostic text or
//! `<TAG><separator><payload>`, where the payload is a JSON literal or,
//! for a few tags, a raw string. This module frames the byte stream into
//! lines and turns each line into a typed outcome.

mod command;
mod framer;
mod parser;
mod tag;
mod types;

pub use command::WorkerCommand;
pub use framer::{CompleteLines, DEFAULT_MAX_LINE_LEN, LineFramer};
pub use parser::{Classified, RouteOutcome, TaggedCommand, classify, decode, route_line};
pub use tag::{PayloadKind, Tag, channels};
pub use types::*;
