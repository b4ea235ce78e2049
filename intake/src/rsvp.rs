use tracing::instrument;

use crate::normalize::SubmissionFields;
use crate::prometheus::report_row_written;
use crate::stores::{Row, RowStore, Sheet, StoreError};
use crate::validation::{
    is_real_email, parse_guest_count, sanitize_text, validate_email, MAX_NAME_CHARS,
};

pub const RSVP_HEADER: [&str; 4] = ["Date", "GuestName", "GuestEmail", "GuestCount"];
const EMAIL_COLUMN: usize = 2;
const UNKNOWN_GUEST: &str = "Unknown Guest";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RsvpRecord {
    pub timestamp: String,
    pub guest_name: String,
    pub guest_email: String,
    pub guest_count: u8,
}

impl RsvpRecord {
    pub fn from_fields(fields: &SubmissionFields, timestamp: String) -> Self {
        let guest_name = sanitize_text(fields.get("GuestName").unwrap_or_default(), MAX_NAME_CHARS);

        RsvpRecord {
            timestamp,
            guest_name: if guest_name.is_empty() {
                UNKNOWN_GUEST.to_owned()
            } else {
                guest_name
            },
            guest_email: validate_email(fields.get("GuestEmail")),
            guest_count: parse_guest_count(fields.get("GuestCount")),
        }
    }

    pub fn to_row(&self) -> Row {
        vec![
            self.timestamp.clone(),
            self.guest_name.clone(),
            self.guest_email.clone(),
            self.guest_count.to_string(),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RsvpOutcome {
    Created,
    Updated,
}

impl RsvpOutcome {
    pub fn message(&self) -> &'static str {
        match self {
            RsvpOutcome::Created => "Thank you for submitting the invitation",
            RsvpOutcome::Updated => "RSVP updated successfully",
        }
    }
}

/// Appends the RSVP, or overwrites the earlier row of the same guest when the
/// submission carries a real email address. Sentinel emails never match.
#[instrument(skip_all, fields(sheet = %sheet.name))]
pub async fn record(
    store: &(dyn RowStore + Send + Sync),
    sheet: &Sheet,
    rsvp: &RsvpRecord,
) -> Result<RsvpOutcome, StoreError> {
    if is_real_email(&rsvp.guest_email) {
        let column = sheet
            .header
            .iter()
            .position(|name| name == "GuestEmail")
            .unwrap_or(EMAIL_COLUMN);
        let rows = store.read_rows(sheet).await?;
        let existing = rows.iter().position(|row| {
            row.get(column)
                .is_some_and(|email| email.trim().eq_ignore_ascii_case(&rsvp.guest_email))
        });

        if let Some(index) = existing {
            store.overwrite_row(sheet, index, rsvp.to_row()).await?;
            report_row_written(&sheet.name, "overwrite");
            tracing::debug!(index, "updated existing rsvp");
            return Ok(RsvpOutcome::Updated);
        }
    }

    store.append_row(sheet, rsvp.to_row()).await?;
    report_row_written(&sheet.name, "append");
    Ok(RsvpOutcome::Created)
}
