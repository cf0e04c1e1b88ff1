// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Backplane message and its wire format.
//!
//! A message is one line of colon separated tokens:
//!
//! | Action        | Tokens                                               |
//! |---------------|------------------------------------------------------|
//! | `Clear`       | `owner:2`                                            |
//! | `ClearRegion` | `owner:3:region`                                     |
//! | `Changed`     | `owner:0:change:key` or `owner:0:change:key:region`  |
//! | `Removed`     | `owner:1:key` or `owner:1:key:region`                |
//!
//! Keys and regions are base64 encoded so they may contain the delimiter; the change
//! action is written by name.

use std::fmt::Display;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use strata_tier::{Error, Result};

const DELIMITER: char = ':';

/// What happened to the cache of the publishing manager.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BackplaneAction {
    /// An item was added, written or updated.
    Changed = 0,
    /// An item was removed.
    Removed = 1,
    /// Every item was removed.
    Clear = 2,
    /// Every item in a region was removed.
    ClearRegion = 3,
}

impl BackplaneAction {
    fn from_token(token: &str) -> Result<Self> {
        match token {
            "0" => Ok(Self::Changed),
            "1" => Ok(Self::Removed),
            "2" => Ok(Self::Clear),
            "3" => Ok(Self::ClearRegion),
            other => Err(Error::deserialization(format!("unknown backplane action '{other}'"))),
        }
    }
}

/// The kind of write behind a [`BackplaneAction::Changed`] message.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ChangeAction {
    /// Not a change message.
    #[default]
    Invalid,
    /// The item was added.
    Add,
    /// The item was written.
    Put,
    /// The item was updated.
    Update,
}

impl ChangeAction {
    /// Returns the name used on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Invalid => "Invalid",
            Self::Add => "Add",
            Self::Put => "Put",
            Self::Update => "Update",
        }
    }

    fn from_token(token: &str) -> Result<Self> {
        match token {
            "Invalid" => Ok(Self::Invalid),
            "Add" => Ok(Self::Add),
            "Put" => Ok(Self::Put),
            "Update" => Ok(Self::Update),
            other => Err(Error::deserialization(format!("unknown change action '{other}'"))),
        }
    }
}

/// A notification exchanged between cache managers.
///
/// # Examples
///
/// ```
/// use strata::{BackplaneMessage, ChangeAction};
///
/// let message = BackplaneMessage::changed("node-1", "user:42", Some("profiles"), ChangeAction::Put);
/// let wire = message.serialize();
///
/// assert_eq!(BackplaneMessage::deserialize(&wire)?, message);
/// # Ok::<(), strata::Error>(())
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BackplaneMessage {
    owner_identity: String,
    action: BackplaneAction,
    change_action: ChangeAction,
    key: Option<String>,
    region: Option<String>,
}

impl BackplaneMessage {
    /// Creates a message announcing a changed item.
    #[must_use]
    pub fn changed(owner: impl Into<String>, key: impl Into<String>, region: Option<&str>, change_action: ChangeAction) -> Self {
        Self {
            owner_identity: owner.into(),
            action: BackplaneAction::Changed,
            change_action,
            key: Some(key.into()),
            region: region.map(str::to_owned),
        }
    }

    /// Creates a message announcing a removed item.
    #[must_use]
    pub fn removed(owner: impl Into<String>, key: impl Into<String>, region: Option<&str>) -> Self {
        Self {
            owner_identity: owner.into(),
            action: BackplaneAction::Removed,
            change_action: ChangeAction::Invalid,
            key: Some(key.into()),
            region: region.map(str::to_owned),
        }
    }

    /// Creates a message announcing a full clear.
    #[must_use]
    pub fn clear(owner: impl Into<String>) -> Self {
        Self {
            owner_identity: owner.into(),
            action: BackplaneAction::Clear,
            change_action: ChangeAction::Invalid,
            key: None,
            region: None,
        }
    }

    /// Creates a message announcing a cleared region.
    #[must_use]
    pub fn clear_region(owner: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            owner_identity: owner.into(),
            action: BackplaneAction::ClearRegion,
            change_action: ChangeAction::Invalid,
            key: None,
            region: Some(region.into()),
        }
    }

    /// Returns the identity of the publishing manager.
    #[must_use]
    pub fn owner_identity(&self) -> &str {
        &self.owner_identity
    }

    /// Returns the action.
    #[must_use]
    pub fn action(&self) -> BackplaneAction {
        self.action
    }

    /// Returns the change kind; [`ChangeAction::Invalid`] unless the action is `Changed`.
    #[must_use]
    pub fn change_action(&self) -> ChangeAction {
        self.change_action
    }

    /// Returns the key, present for `Changed` and `Removed`.
    #[must_use]
    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    /// Returns the region, if any.
    #[must_use]
    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }

    /// Encodes the message in its wire format.
    #[must_use]
    pub fn serialize(&self) -> String {
        let mut tokens = vec![self.owner_identity.clone(), (self.action as u8).to_string()];
        if self.action == BackplaneAction::Changed {
            tokens.push(self.change_action.as_str().to_owned());
        }
        tokens.extend(self.key.iter().map(|key| STANDARD.encode(key)));
        tokens.extend(self.region.iter().map(|region| STANDARD.encode(region)));
        tokens.join(&DELIMITER.to_string())
    }

    /// Decodes a message from its wire format.
    ///
    /// # Errors
    ///
    /// Returns a deserialization error if the token count does not fit the action, or if a
    /// token is not valid for its position.
    pub fn deserialize(message: &str) -> Result<Self> {
        let tokens: Vec<&str> = message.split(DELIMITER).collect();
        let malformed = || Error::deserialization(format!("malformed backplane message '{message}'"));

        let (owner, action) = match tokens.as_slice() {
            [owner, action, ..] if !owner.is_empty() => (*owner, BackplaneAction::from_token(action)?),
            _ => return Err(malformed()),
        };

        match (action, &tokens[2..]) {
            (BackplaneAction::Clear, []) => Ok(Self::clear(owner)),
            (BackplaneAction::ClearRegion, [region]) => Ok(Self::clear_region(owner, decode(region)?)),
            (BackplaneAction::Changed, [change, key, region @ ..]) if region.len() <= 1 => {
                let region = region.first().map(|r| decode(r)).transpose()?;
                Ok(Self::changed(owner, decode(key)?, region.as_deref(), ChangeAction::from_token(change)?))
            }
            (BackplaneAction::Removed, [key, region @ ..]) if region.len() <= 1 => {
                let region = region.first().map(|r| decode(r)).transpose()?;
                Ok(Self::removed(owner, decode(key)?, region.as_deref()))
            }
            _ => Err(malformed()),
        }
    }
}

impl Display for BackplaneMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.serialize())
    }
}

fn decode(token: &str) -> Result<String> {
    let bytes = STANDARD
        .decode(token)
        .map_err(|e| Error::deserialization(format!("invalid base64 token '{token}': {e}")))?;
    String::from_utf8(bytes).map_err(|e| Error::deserialization(format!("token '{token}' is not UTF-8: {e}")))
}
