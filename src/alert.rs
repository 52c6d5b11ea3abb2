//! Alert construction
//!
//! An [`Alert`] is one notification event. Its origin label and description
//! go into the root message as fixed fields; every caller-supplied
//! title/value pair becomes a separate threaded reply.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::NotifyError;

/// Alert severity, selects the destination channel and the display color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warn,
    Success,
}

impl Severity {
    /// Name of the embed field carrying the origin label
    pub fn origin_field(&self) -> &'static str {
        match self {
            Severity::Error => "ErrorAt",
            Severity::Warn => "WarnAt",
            Severity::Success => "SuccessAt",
        }
    }

    /// RGB color as an integer (Discord embeds take this form)
    pub fn color(&self) -> u32 {
        match self {
            Severity::Error => 0xFF0000,
            Severity::Warn => 0xFCEEA7,
            Severity::Success => 0x36A64F,
        }
    }

    /// RGB color as `#RRGGBB` (Slack attachments take this form)
    pub fn hex_color(&self) -> String {
        format!("#{:06X}", self.color())
    }

    pub(crate) fn emoji(&self) -> &'static str {
        match self {
            Severity::Error => "🔴",
            Severity::Warn => "🟡",
            Severity::Success => "🟢",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Severity::Error => "Error",
            Severity::Warn => "Warn",
            Severity::Success => "Success",
        };
        f.write_str(name)
    }
}

/// A title/value pair delivered as its own threaded reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailField {
    pub title: String,
    pub value: String,
}

impl DetailField {
    pub fn new(title: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            value: value.into(),
        }
    }
}

/// One notification, ready for delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub severity: Severity,
    pub origin_label: String,
    pub description: String,
    pub primary_text: String,
    pub detail_fields: Vec<DetailField>,
}

impl Alert {
    /// Build an alert from a flat `title, value, title, value, ...` list
    ///
    /// Fails with [`NotifyError::OddFieldCount`] when the list has an odd
    /// length. Pairs keep their input order.
    pub fn build<S: AsRef<str>>(
        severity: Severity,
        origin_label: impl Into<String>,
        description: impl Into<String>,
        primary_text: impl Into<String>,
        fields: &[S],
    ) -> Result<Self, NotifyError> {
        if fields.len() % 2 != 0 {
            return Err(NotifyError::OddFieldCount(fields.len()));
        }

        let detail_fields = fields
            .chunks_exact(2)
            .map(|pair| DetailField::new(pair[0].as_ref(), pair[1].as_ref()))
            .collect();

        Ok(Self {
            severity,
            origin_label: origin_label.into(),
            description: description.into(),
            primary_text: primary_text.into(),
            detail_fields,
        })
    }

    /// Fixed fields embedded in the root message, ahead of any detail field
    pub fn primary_fields(&self) -> Vec<DetailField> {
        vec![
            DetailField::new(self.severity.origin_field(), &self.origin_label),
            DetailField::new("Description", &self.description),
        ]
    }
}
