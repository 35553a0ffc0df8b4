use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::constants::{MAIN_LIST_MAX_LEN, SECONDARY_LIST_MAX_LEN};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind}: {value}")]
pub struct ParseTagError {
    kind: &'static str,
    value: String,
}

impl ParseTagError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// The named partition a level is ranked on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListTag {
    Main,
    Unrated,
    Platformer,
    Challenge,
}

impl ListTag {
    pub const ALL: [ListTag; 4] = [
        ListTag::Main,
        ListTag::Unrated,
        ListTag::Platformer,
        ListTag::Challenge,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ListTag::Main => "main",
            ListTag::Unrated => "unrated",
            ListTag::Platformer => "platformer",
            ListTag::Challenge => "challenge",
        }
    }

    /// Levels placed past this length are dropped after every insert or move.
    pub fn max_len(&self) -> i32 {
        match self {
            ListTag::Main => MAIN_LIST_MAX_LEN,
            _ => SECONDARY_LIST_MAX_LEN,
        }
    }

    /// Only the main list feeds player scores.
    pub fn is_scored(&self) -> bool {
        matches!(self, ListTag::Main)
    }
}

impl fmt::Display for ListTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ListTag {
    type Err = ParseTagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ListTag::ALL
            .into_iter()
            .find(|tag| tag.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParseTagError::new("list", s))
    }
}

impl TryFrom<String> for ListTag {
    type Error = ParseTagError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Admin,
    Moderator,
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Moderator => "MODERATOR",
            Role::User => "USER",
        }
    }

    pub fn can_review(&self) -> bool {
        matches!(self, Role::Admin | Role::Moderator)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ParseTagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ADMIN" => Ok(Role::Admin),
            "MODERATOR" => Ok(Role::Moderator),
            "USER" | "" => Ok(Role::User),
            _ => Err(ParseTagError::new("role", s)),
        }
    }
}

impl TryFrom<String> for Role {
    type Error = ParseTagError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Kind of an audited list change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Add,
    Remove,
    Move,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Add => "ADD",
            ChangeKind::Remove => "REMOVE",
            ChangeKind::Move => "MOVE",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeKind {
    type Err = ParseTagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ADD" => Ok(ChangeKind::Add),
            "REMOVE" => Ok(ChangeKind::Remove),
            "MOVE" => Ok(ChangeKind::Move),
            _ => Err(ParseTagError::new("change kind", s)),
        }
    }
}

impl TryFrom<String> for ChangeKind {
    type Error = ParseTagError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
