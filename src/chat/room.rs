use std::{fmt, sync::LazyLock};

use regex::Regex;

use crate::ChatError;

static ROOM_NAME: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_-]+$").expect("room name pattern"));

/// A club's chat room. Only the club id is stored; the external name
/// (`club_<id>`) and the fan-out group (`chat_club_<id>`) are derived from it,
/// so `club_007` and `club_7` land in the same group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RoomId {
    club_id: i64,
}

impl RoomId {
    pub fn for_club(club_id: i64) -> RoomId {
        RoomId { club_id }
    }

    pub fn parse(room_name: &str) -> Result<RoomId, ChatError> {
        let invalid = || ChatError::InvalidRoom(room_name.to_owned());

        if !ROOM_NAME.is_match(room_name) {
            return Err(invalid());
        }

        let suffix = room_name.strip_prefix("club_").ok_or_else(invalid)?;
        if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }

        match suffix.parse::<i64>() {
            Ok(club_id) if club_id > 0 => Ok(RoomId { club_id }),
            _ => Err(invalid()),
        }
    }

    pub fn club_id(&self) -> i64 {
        self.club_id
    }

    pub fn group(&self) -> String {
        format!("chat_{self}")
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "club_{}", self.club_id)
    }
}
