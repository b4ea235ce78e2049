use tracing::instrument;
use uuid::Uuid;

use crate::api::IntakeError;
use crate::normalize::SubmissionFields;
use crate::prometheus::{report_row_written, report_slip_size};
use crate::stores::{BlobStore, Row, RowStore, Sheet};
use crate::validation::{
    format_amount, parse_amount, sanitize_text, validate_email, Slip, MAX_ACCOUNT_NUMBER_CHARS,
    MAX_MESSAGE_CHARS, MAX_NAME_CHARS,
};

pub const PAYMENT_HEADER: [&str; 7] = [
    "Date",
    "PayerName",
    "PayerEmail",
    "Amount",
    "Message",
    "AccountNumber",
    "SlipUrl",
];

#[derive(Debug, Clone, PartialEq)]
pub struct PaymentRecord {
    pub timestamp: String,
    pub payer_name: String,
    pub payer_email: String,
    pub amount: Option<f64>,
    pub message: String,
    pub account_number: String,
    pub slip_url: String,
}

/// A validated payment, with its slip not yet stored.
#[derive(Debug)]
pub struct PaymentSubmission {
    pub record: PaymentRecord,
    pub slip: Option<Slip>,
}

impl PaymentSubmission {
    /// Validates every field before anything is written, so a rejected
    /// submission leaves no orphan slip behind.
    pub fn from_fields(
        fields: &SubmissionFields,
        timestamp: String,
    ) -> Result<PaymentSubmission, IntakeError> {
        let payer_name = sanitize_text(fields.get("payerName").unwrap_or_default(), MAX_NAME_CHARS);
        if payer_name.is_empty() {
            return Err(IntakeError::MissingPayerName);
        }

        let amount = parse_amount(fields.get("amount"))?;
        let slip = fields
            .get("slipDataUrl")
            .map(|data_url| Slip::from_data_url(data_url, fields.get("slipName")))
            .transpose()?;

        let record = PaymentRecord {
            timestamp,
            payer_name,
            payer_email: validate_email(fields.get("payerEmail")),
            amount,
            message: sanitize_text(fields.get("message").unwrap_or_default(), MAX_MESSAGE_CHARS),
            account_number: sanitize_text(
                fields.get("accountNumber").unwrap_or_default(),
                MAX_ACCOUNT_NUMBER_CHARS,
            ),
            slip_url: String::new(),
        };

        Ok(PaymentSubmission { record, slip })
    }
}

impl PaymentRecord {
    pub fn to_row(&self) -> Row {
        vec![
            self.timestamp.clone(),
            self.payer_name.clone(),
            self.payer_email.clone(),
            self.amount.map(format_amount).unwrap_or_default(),
            self.message.clone(),
            self.account_number.clone(),
            self.slip_url.clone(),
        ]
    }
}

/// Unique blob name for a slip, so two uploads named `receipt.jpg` never collide.
pub fn slip_blob_name(slip: &Slip) -> String {
    format!("{}-{}", Uuid::now_v7(), slip.file_name())
}

/// Stores the slip if any, then appends the payment row. Returns the slip URL.
#[instrument(skip_all, fields(sheet = %sheet.name, has_slip = submission.slip.is_some()))]
pub async fn record(
    rows: &(dyn RowStore + Send + Sync),
    blobs: &(dyn BlobStore + Send + Sync),
    sheet: &Sheet,
    submission: PaymentSubmission,
) -> Result<Option<String>, IntakeError> {
    let PaymentSubmission { mut record, slip } = submission;

    let slip_url = match slip {
        Some(slip) => {
            let name = slip_blob_name(&slip);
            report_slip_size(slip.bytes.len());
            let url = blobs.store(slip.bytes, slip.kind.mime(), &name).await?;
            tracing::debug!(url = %url, "stored payment slip");
            Some(url)
        }
        None => None,
    };

    record.slip_url = slip_url.clone().unwrap_or_default();
    rows.append_row(sheet, record.to_row()).await?;
    report_row_written(&sheet.name, "append");

    Ok(slip_url)
}
