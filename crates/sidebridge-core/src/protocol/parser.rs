//! Classification and decoding of single worker output lines.
//!
//! Tolerant reader: plain text is passed through as a log line, unknown
//! tags and malformed payloads are reported as outcomes and never abort
//! the stream.

use std::path::PathBuf;

use serde::de::{DeserializeOwned, IgnoredAny};

use super::tag::{PayloadKind, Tag};
use super::types::ChannelEvent;
use crate::error::{Error, Result};

/// A line carrying a tag prefix and a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaggedCommand<'a> {
    /// Normalised tag text, not yet checked against the tag table.
    pub tag: &'a str,
    pub payload: &'a str,
}

/// What a single line turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classified<'a> {
    /// Plain diagnostic output.
    Plain(&'a str),
    Tagged(TaggedCommand<'a>),
}

/// Result of routing one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Forward to the generic log channel.
    Log(String),
    /// Deliver to the event's channel.
    Event(ChannelEvent),
    /// Tag not in the table; line dropped.
    Unmapped { tag: String },
    /// Payload failed to decode; line dropped.
    Malformed { tag: Tag, reason: String },
}

/// Split a line into tag and payload.
///
/// Raw-payload tags are matched as a prefix first, since their payload
/// (a path) may contain brackets. Otherwise the earliest `[` or `{`
/// starts the payload and everything before it is the tag.
pub fn classify(line: &str) -> Classified<'_> {
    let trimmed = line.trim();
    for tag in Tag::ALL {
        if tag.payload_kind() != PayloadKind::Raw {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix(tag.as_str())
            && let Some(payload) = rest.strip_prefix(':')
        {
            return Classified::Tagged(TaggedCommand {
                tag: tag.as_str(),
                payload: payload.trim(),
            });
        }
    }

    match trimmed.find(['[', '{']) {
        Some(idx) => Classified::Tagged(TaggedCommand {
            tag: normalize_tag(&trimmed[..idx]),
            payload: &trimmed[idx..],
        }),
        None => Classified::Plain(trimmed),
    }
}

fn normalize_tag(raw: &str) -> &str {
    raw.trim().trim_end_matches(':').trim_end()
}

/// Decode a payload according to `tag`'s schema.
pub fn decode(tag: Tag, payload: &str) -> Result<ChannelEvent> {
    match tag {
        Tag::Rooms => decode_json(tag, payload).map(ChannelEvent::RoomsUpdated),
        Tag::MyRooms => decode_json(tag, payload).map(ChannelEvent::MyRoomsUpdated),
        Tag::Users => decode_json(tag, payload).map(ChannelEvent::UsersUpdated),
        Tag::Connected => {
            decode_json::<IgnoredAny>(tag, payload).map(|_| ChannelEvent::ConnectionSuccess)
        }
        Tag::Status => decode_json(tag, payload).map(ChannelEvent::ConnectionStatus),
        Tag::Msg => decode_json(tag, payload).map(ChannelEvent::MessageReceived),
        Tag::FileReady => {
            let path = payload.trim();
            if path.is_empty() {
                return Err(Error::Decode {
                    tag: tag.as_str(),
                    reason: "empty path".to_string(),
                });
            }
            Ok(ChannelEvent::SongReceived(PathBuf::from(path)))
        }
    }
}

fn decode_json<T: DeserializeOwned>(tag: Tag, payload: &str) -> Result<T> {
    serde_json::from_str(payload).map_err(|e| Error::Decode {
        tag: tag.as_str(),
        reason: e.to_string(),
    })
}

/// Classify, look up and decode one line.
pub fn route_line(line: &str) -> RouteOutcome {
    match classify(line) {
        Classified::Plain(text) => RouteOutcome::Log(text.to_string()),
        Classified::Tagged(cmd) => {
            let Some(tag) = Tag::from_wire(cmd.tag) else {
                return RouteOutcome::Unmapped {
                    tag: cmd.tag.to_string(),
                };
            };
            match decode(tag, cmd.payload) {
                Ok(event) => RouteOutcome::Event(event),
                Err(e) => RouteOutcome::Malformed {
                    tag,
                    reason: e.to_string(),
                },
            }
        }
    }
}
