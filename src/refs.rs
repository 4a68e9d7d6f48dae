//! Classification of ref updates.

use crate::error::{EventcError, Result};

pub const ZERO_ID: &str = "0000000000000000000000000000000000000000";

const BRANCH_PREFIX: &str = "refs/heads/";
const TAG_PREFIX: &str = "refs/tags/";

/// An all-zero id stands for a ref that did not exist (or no longer does).
pub fn is_zero_id(id: &str) -> bool {
    !id.is_empty() && id.bytes().all(|b| b == b'0')
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefKind {
    Branch(String),
    Tag(String),
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefChange {
    Create,
    Update,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefUpdate {
    pub ref_name: String,
    pub old_id: String,
    pub new_id: String,
}

impl RefUpdate {
    pub fn new(
        ref_name: impl Into<String>,
        old_id: impl Into<String>,
        new_id: impl Into<String>,
    ) -> Self {
        Self {
            ref_name: ref_name.into(),
            old_id: old_id.into(),
            new_id: new_id.into(),
        }
    }

    /// Parses one `<old> <new> <ref>` line of post-receive input.
    pub fn parse_line(line: &str) -> Result<Self> {
        let mut fields = line.split_whitespace();
        match (fields.next(), fields.next(), fields.next(), fields.next()) {
            (Some(old_id), Some(new_id), Some(ref_name), None) => {
                Ok(Self::new(ref_name, old_id, new_id))
            }
            _ => Err(EventcError::MalformedInput(format!(
                "expected '<old> <new> <ref>', got '{}'",
                line
            ))),
        }
    }

    pub fn kind(&self) -> RefKind {
        if let Some(branch) = self.ref_name.strip_prefix(BRANCH_PREFIX) {
            RefKind::Branch(branch.to_string())
        } else if let Some(tag) = self.ref_name.strip_prefix(TAG_PREFIX) {
            RefKind::Tag(tag.to_string())
        } else {
            RefKind::Other
        }
    }

    /// `None` when both ids are zero, which describes nothing.
    pub fn change(&self) -> Option<RefChange> {
        match (is_zero_id(&self.old_id), is_zero_id(&self.new_id)) {
            (true, true) => None,
            (true, false) => Some(RefChange::Create),
            (false, true) => Some(RefChange::Delete),
            (false, false) => Some(RefChange::Update),
        }
    }

    /// Lower bound of the pushed range; `None` when the ref is new.
    pub fn exclude_id(&self) -> Option<&str> {
        (!is_zero_id(&self.old_id)).then_some(self.old_id.as_str())
    }
}
