use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::trailer::{Message, Trailer};

fn is_zero(n: &i64) -> bool {
    *n == 0
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub text: String,
    pub done: bool,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub priority: i64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub estimate_minutes: i64,
}

impl Task {
    /// First line of the text, trimmed.
    pub fn short(&self) -> &str {
        Message::parse(&self.text).title()
    }

    /// Text after the title line with any trailer block removed.
    pub fn details(&self) -> String {
        Message::parse(&self.text).details()
    }

    pub fn trailers(&self) -> Vec<Trailer> {
        Message::parse(&self.text).trailers()
    }

    /// Lines inside the trailer block that are not `Key: Value`.
    pub fn trailer_drops(&self) -> Vec<String> {
        Message::parse(&self.text)
            .drops()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    pub fn status(&self) -> StatusFilter {
        if self.done {
            StatusFilter::Closed
        } else {
            StatusFilter::Open
        }
    }
}

/// Creation request. Normalized before the id is derived.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskInput {
    pub text: String,
    pub tags: Vec<String>,
    pub priority: i64,
    pub estimate_minutes: i64,
}

impl TaskInput {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }
}

/// Sparse patch for `Store::update`. `None` leaves a field alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateSet {
    pub text: Option<String>,
    pub done: Option<bool>,
    pub tags: Option<Vec<String>>,
    pub priority: Option<i64>,
    pub estimate_minutes: Option<i64>,
}

impl UpdateSet {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFilter {
    Open,
    Closed,
}

impl StatusFilter {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
        }
    }

    pub fn matches(self, task: &Task) -> bool {
        match self {
            Self::Open => !task.done,
            Self::Closed => task.done,
        }
    }
}

impl FromStr for StatusFilter {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, StoreError> {
        match s {
            "open" => Ok(Self::Open),
            "closed" => Ok(Self::Closed),
            _ => Err(StoreError::InvalidInput(format!(
                "invalid status '{s}': must be open or closed"
            ))),
        }
    }
}

impl fmt::Display for StatusFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
