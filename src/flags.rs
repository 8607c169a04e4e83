//! Row flags: the tri-state annotation and its wire representations.
//!
//! In memory the flag is `Option<Flag>`; the three indicator booleans exist
//! only at the store boundary and the display tokens ("◯", "?", "✗") only at
//! the API and CSV boundaries.

use serde::{Deserialize, Serialize};

use crate::errors::AppError;

pub const COL_ID: &str = "trivium-id";
pub const COL_FLAG_OK: &str = "trivium-flag-ok";
pub const COL_FLAG_QUESTION: &str = "trivium-flag-question";
pub const COL_FLAG_NG: &str = "trivium-flag-ng";
pub const COL_MEMO: &str = "trivium-memo";

/// Leading marker on a column name that means "hide this column by default".
pub const HIDDEN_MARKER: char = '-';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Flag {
    Ok,
    Question,
    NotGood,
}

impl Flag {
    /// Display token used by the API and the frontend.
    pub fn token(self) -> &'static str {
        match self {
            Flag::Ok => "◯",
            Flag::Question => "?",
            Flag::NotGood => "✗",
        }
    }

    /// Parse an API flag value. Empty string is the none state; anything
    /// outside the four tokens is a validation error.
    pub fn from_token(token: &str) -> Result<Option<Flag>, AppError> {
        match token {
            "" => Ok(None),
            "◯" => Ok(Some(Flag::Ok)),
            "?" => Ok(Some(Flag::Question)),
            "✗" => Ok(Some(Flag::NotGood)),
            other => Err(AppError::validation(format!(
                "unknown flag value: {other:?}"
            ))),
        }
    }

    /// Store representation: (flag_ok, flag_question, flag_ng).
    pub fn to_indicators(flag: Option<Flag>) -> (bool, bool, bool) {
        match flag {
            Some(Flag::Ok) => (true, false, false),
            Some(Flag::Question) => (false, true, false),
            Some(Flag::NotGood) => (false, false, true),
            None => (false, false, false),
        }
    }

    /// Inverse of [`Flag::to_indicators`]. All-false is the none state, which
    /// the query engine treats identically to "never annotated".
    pub fn from_indicators(ok: bool, question: bool, ng: bool) -> Option<Flag> {
        if ok {
            Some(Flag::Ok)
        } else if question {
            Some(Flag::Question)
        } else if ng {
            Some(Flag::NotGood)
        } else {
            None
        }
    }
}

/// One token of the `flag_filter` query parameter. Tokens are OR-combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagFilter {
    NoFlag,
    Is(Flag),
}

impl FlagFilter {
    pub fn parse(token: &str) -> Result<FlagFilter, AppError> {
        match token {
            "No Flag" => Ok(FlagFilter::NoFlag),
            "◯" => Ok(FlagFilter::Is(Flag::Ok)),
            "?" => Ok(FlagFilter::Is(Flag::Question)),
            "✗" => Ok(FlagFilter::Is(Flag::NotGood)),
            other => Err(AppError::validation(format!(
                "unknown flag filter: {other:?}"
            ))),
        }
    }

    pub fn matches(self, flag: Option<Flag>) -> bool {
        match self {
            FlagFilter::NoFlag => flag.is_none(),
            FlagFilter::Is(wanted) => flag == Some(wanted),
        }
    }
}

/// Sparse per-row annotation: flag state plus memo.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlagEntry {
    pub flag: Option<Flag>,
    pub memo: String,
}

impl FlagEntry {
    /// API token for the flag, empty string for none.
    pub fn flag_token(&self) -> &'static str {
        self.flag.map(Flag::token).unwrap_or("")
    }
}
