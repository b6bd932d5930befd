//! The closed set of tags the worker prefixes structured lines with.

/// Channel names, as exposed to subscribers.
pub mod channels {
    pub const ROOMS_UPDATED: &str = "rooms-updated";
    pub const MYROOMS_UPDATED: &str = "myrooms-updated";
    pub const USERS_UPDATED: &str = "users-updated";
    pub const CONNECTION_SUCCESS: &str = "connection-success";
    pub const CONNECTION_STATUS: &str = "connection-status";
    pub const MESSAGE_RECEIVED: &str = "message-received";
    pub const SONG_RECEIVED: &str = "song-received";
    pub const WORKER_LOG: &str = "worker-log";
    pub const WORKER_LIFECYCLE: &str = "worker-finished";
    pub const DIAGNOSTIC: &str = "diagnostic";
}

/// How a tag's payload is encoded on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    /// A JSON literal starting with `[` or `{`.
    Structured,
    /// The raw remainder of the line (a file path).
    Raw,
}

/// Known line tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    Rooms,
    MyRooms,
    Users,
    Connected,
    Status,
    Msg,
    FileReady,
}

impl Tag {
    pub const ALL: [Self; 7] = [
        Self::Rooms,
        Self::MyRooms,
        Self::Users,
        Self::Connected,
        Self::Status,
        Self::Msg,
        Self::FileReady,
    ];

    /// Tag text without its trailing delimiter.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Rooms => "CMD:ROOMS",
            Self::MyRooms => "CMD:MYROOMS",
            Self::Users => "CMD:USERS",
            Self::Connected => "CMD:CONNECTED",
            Self::Status => "CMD:STATUS",
            Self::Msg => "CMD:MSG",
            Self::FileReady => "STATUS:FILE_READY",
        }
    }

    /// Channel that receives this tag's events.
    pub const fn channel(self) -> &'static str {
        match self {
            Self::Rooms => channels::ROOMS_UPDATED,
            Self::MyRooms => channels::MYROOMS_UPDATED,
            Self::Users => channels::USERS_UPDATED,
            Self::Connected => channels::CONNECTION_SUCCESS,
            Self::Status => channels::CONNECTION_STATUS,
            Self::Msg => channels::MESSAGE_RECEIVED,
            Self::FileReady => channels::SONG_RECEIVED,
        }
    }

    pub const fn payload_kind(self) -> PayloadKind {
        match self {
            Self::FileReady => PayloadKind::Raw,
            _ => PayloadKind::Structured,
        }
    }

    /// Look up a normalised tag (whitespace and trailing `:` removed).
    pub fn from_wire(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == tag)
    }
}

impl std::fmt::Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_round_trip() {
        for tag in Tag::ALL {
            assert_eq!(Tag::from_wire(tag.as_str()), Some(tag));
        }
    }

    #[test]
    fn lookup_is_case_sensitive() {
        assert_eq!(Tag::from_wire("cmd:rooms"), None);
        assert_eq!(Tag::from_wire("CMD:ROOMS:"), None);
    }

    #[test]
    fn only_file_ready_is_raw() {
        let raw: Vec<Tag> = Tag::ALL
            .into_iter()
            .filter(|t| t.payload_kind() == PayloadKind::Raw)
            .collect();
        assert_eq!(raw, vec![Tag::FileReady]);
    }
}
