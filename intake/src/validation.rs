//! Cleaning and validation of submitted form fields.
//!
//! Free text is truncated, then stripped of markup and of the characters that could
//! break out of a spreadsheet cell or an HTML attribute when the rows are displayed.
//! Optional fields degrade to sentinel values instead of failing the submission,
//! except for amounts and slips, which reject it.

use std::error::Error;
use std::fmt::Display;

use base64::Engine;
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

pub const MAX_NAME_CHARS: usize = 100;
pub const MAX_EMAIL_CHARS: usize = 100;
pub const MAX_MESSAGE_CHARS: usize = 500;
pub const MAX_ACCOUNT_NUMBER_CHARS: usize = 50;
pub const MAX_SLIP_NAME_CHARS: usize = 100;

pub const MIN_GUEST_COUNT: u8 = 1;
pub const MAX_GUEST_COUNT: u8 = 20;
pub const MAX_AMOUNT: f64 = 10_000_000.0;
pub const MAX_SLIP_BYTES: usize = 5 * 1024 * 1024;

pub const NO_EMAIL: &str = "No Email";
pub const INVALID_EMAIL: &str = "Invalid Email";

const BLOCKED_CHARS: &[char] = &['<', '>', '"', '\'', '`', '\\'];

static TAG_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").unwrap());
static EMAIL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^[^\s@<>"'`\\]+@[^\s@<>"'`\\]+\.[^\s@<>"'`\\]+$"#).unwrap()
});

/// Truncate to `max_chars` characters, then drop tags, blocked characters and
/// control characters. Line breaks and tabs become spaces.
pub fn sanitize_text(input: &str, max_chars: usize) -> String {
    let truncated: String = input.trim().chars().take(max_chars).collect();
    let untagged = TAG_REGEX.replace_all(&truncated, "");

    untagged
        .chars()
        .map(|c| if c.is_control() && c.is_whitespace() { ' ' } else { c })
        .filter(|c| !BLOCKED_CHARS.contains(c) && !c.is_control())
        .collect::<String>()
        .trim()
        .to_string()
}

/// Returns the normalized address, [`NO_EMAIL`] when none was given, or
/// [`INVALID_EMAIL`] when the value does not look like an address.
pub fn validate_email(input: Option<&str>) -> String {
    let email = input.map(str::trim).unwrap_or_default();

    if email.is_empty() || email == NO_EMAIL {
        return String::from(NO_EMAIL);
    }
    if email.chars().count() > MAX_EMAIL_CHARS
        || email.chars().any(char::is_control)
        || !EMAIL_REGEX.is_match(email)
    {
        return String::from(INVALID_EMAIL);
    }

    email.to_lowercase()
}

/// Whether a stored email identifies a guest, as opposed to a sentinel.
pub fn is_real_email(email: &str) -> bool {
    email != NO_EMAIL && email != INVALID_EMAIL && !email.is_empty()
}

/// Out of range or unparseable counts are coerced to one guest.
pub fn parse_guest_count(input: Option<&str>) -> u8 {
    input
        .and_then(|value| value.trim().parse::<i64>().ok())
        .filter(|count| (i64::from(MIN_GUEST_COUNT)..=i64::from(MAX_GUEST_COUNT)).contains(count))
        .and_then(|count| u8::try_from(count).ok())
        .unwrap_or(MIN_GUEST_COUNT)
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum InvalidAmount {
    #[error("not a number")]
    NotANumber,
    #[error("must not be negative")]
    Negative,
    #[error("must not exceed 10000000")]
    TooLarge,
}

/// The amount is optional, but a present amount must be a number in `[0, MAX_AMOUNT]`.
pub fn parse_amount(input: Option<&str>) -> Result<Option<f64>, InvalidAmount> {
    let value = match input.map(str::trim) {
        None | Some("") => return Ok(None),
        Some(value) => value,
    };

    let amount: f64 = value.parse().map_err(|_| InvalidAmount::NotANumber)?;
    if !amount.is_finite() {
        return Err(InvalidAmount::NotANumber);
    }
    if amount < 0.0 {
        return Err(InvalidAmount::Negative);
    }
    if amount > MAX_AMOUNT {
        return Err(InvalidAmount::TooLarge);
    }

    // -0 parses fine and is in range, store it as 0
    Ok(Some(amount.abs()))
}

/// Cell rendering of an amount: at most two decimals, no trailing zeros.
pub fn format_amount(amount: f64) -> String {
    let fixed = format!("{:.2}", amount);
    fixed
        .trim_end_matches('0')
        .trim_end_matches('.')
        .to_owned()
}

/// Slip content types we accept.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SlipType {
    Jpeg,
    Png,
    Gif,
    Webp,
    Pdf,
}

impl SlipType {
    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime {
            "image/jpeg" | "image/jpg" => Some(SlipType::Jpeg),
            "image/png" => Some(SlipType::Png),
            "image/gif" => Some(SlipType::Gif),
            "image/webp" => Some(SlipType::Webp),
            "application/pdf" => Some(SlipType::Pdf),
            _ => None,
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            SlipType::Jpeg => "image/jpeg",
            SlipType::Png => "image/png",
            SlipType::Gif => "image/gif",
            SlipType::Webp => "image/webp",
            SlipType::Pdf => "application/pdf",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            SlipType::Jpeg => "jpg",
            SlipType::Png => "png",
            SlipType::Gif => "gif",
            SlipType::Webp => "webp",
            SlipType::Pdf => "pdf",
        }
    }

    pub fn matches_extension(&self, extension: &str) -> bool {
        extension.eq_ignore_ascii_case(self.extension())
            || (*self == SlipType::Jpeg && extension.eq_ignore_ascii_case("jpeg"))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum InvalidSlipReason {
    NotDataUrl,
    NotBase64,
    Empty,
    UnsupportedType(String),
    TooLarge,
}

impl InvalidSlipReason {
    pub fn reason(&self) -> &str {
        match *self {
            Self::NotDataUrl => "not_data_url",
            Self::NotBase64 => "not_base64",
            Self::Empty => "empty",
            Self::UnsupportedType(_) => "unsupported_type",
            Self::TooLarge => "too_large",
        }
    }
}

impl Display for InvalidSlipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::NotDataUrl => write!(f, "expected a base64 data url"),
            Self::NotBase64 => write!(f, "payload is not valid base64"),
            Self::Empty => write!(f, "file is empty"),
            Self::UnsupportedType(mime) => write!(
                f,
                "file type {mime} is not allowed, use jpeg, png, gif, webp or pdf"
            ),
            Self::TooLarge => write!(f, "file is larger than {} bytes", MAX_SLIP_BYTES),
        }
    }
}

impl Error for InvalidSlipReason {
    fn description(&self) -> &str {
        self.reason()
    }
}

/// A decoded payment slip, ready to be handed to the blob store.
#[derive(Debug)]
pub struct Slip {
    pub kind: SlipType,
    pub bytes: Vec<u8>,
    pub name: String,
}

impl Slip {
    /// Parse a `data:<mime>;base64,<payload>` url. The size limit is enforced on the
    /// encoded length first, so oversized payloads are never decoded.
    pub fn from_data_url(data_url: &str, name: Option<&str>) -> Result<Slip, InvalidSlipReason> {
        let (header, payload) = data_url
            .trim()
            .strip_prefix("data:")
            .and_then(|rest| rest.split_once(','))
            .ok_or(InvalidSlipReason::NotDataUrl)?;

        let mut params = header.split(';').map(str::trim);
        let mime = params.next().unwrap_or_default().to_ascii_lowercase();
        if !params.any(|param| param.eq_ignore_ascii_case("base64")) {
            return Err(InvalidSlipReason::NotDataUrl);
        }

        // Unescaped '+' turns into a space when the url travels form-encoded
        let payload: String = payload
            .chars()
            .filter(|c| *c != '\n' && *c != '\r')
            .map(|c| if c == ' ' { '+' } else { c })
            .collect();

        let padding = payload.bytes().rev().take_while(|b| *b == b'=').count();
        let decoded_estimate = (payload.len() * 3 / 4).saturating_sub(padding.min(2));
        if decoded_estimate > MAX_SLIP_BYTES {
            return Err(InvalidSlipReason::TooLarge);
        }

        let kind =
            SlipType::from_mime(&mime).ok_or(InvalidSlipReason::UnsupportedType(mime.clone()))?;

        let bytes = base64::engine::general_purpose::STANDARD
            .decode(payload.as_bytes())
            .map_err(|_| InvalidSlipReason::NotBase64)?;
        if bytes.is_empty() {
            return Err(InvalidSlipReason::Empty);
        }
        if bytes.len() > MAX_SLIP_BYTES {
            return Err(InvalidSlipReason::TooLarge);
        }

        let name = sanitize_text(name.unwrap_or_default(), MAX_SLIP_NAME_CHARS);
        let name = if name.is_empty() {
            String::from("slip")
        } else {
            name
        };

        Ok(Slip { kind, bytes, name })
    }

    /// Slip name with path separators removed and the extension matching its type.
    pub fn file_name(&self) -> String {
        let base: String = self
            .name
            .chars()
            .map(|c| if c == '/' || c.is_whitespace() { '_' } else { c })
            .collect();
        let has_extension = base
            .rsplit_once('.')
            .is_some_and(|(stem, ext)| !stem.is_empty() && self.kind.matches_extension(ext));
        if has_extension {
            base
        } else {
            format!("{}.{}", base, self.kind.extension())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;

    fn data_url(mime: &str, bytes: &[u8]) -> String {
        format!(
            "data:{mime};base64,{}",
            base64::engine::general_purpose::STANDARD.encode(bytes)
        )
    }

    #[test]
    fn sanitize_strips_tags_and_blocked_characters() {
        assert_eq!(
            sanitize_text("  <b>Jane</b> \"Doe\" `x` \\o/ ", 100),
            "Jane Doe x o/"
        );
        assert_eq!(sanitize_text("<script>alert('x')</script>", 100), "alert(x)");
        assert_eq!(sanitize_text("null\0byte", 100), "nullbyte");
    }

    #[test]
    fn sanitize_keeps_line_breaks_as_spaces() {
        assert_eq!(sanitize_text("Congrats\nJane", 100), "Congrats Jane");
        assert_eq!(sanitize_text("a\r\nb\tc", 100), "a  b c");
        assert_eq!(sanitize_text("line\n", 100), "line");
    }

    #[test]
    fn sanitize_truncates_before_cleaning() {
        // The tag is cut in half by the truncation, its opening bracket still goes
        assert_eq!(sanitize_text("abc<script>", 6), "abcsc");
        assert_eq!(sanitize_text(&"é".repeat(150), 100).chars().count(), 100);
    }

    #[test]
    fn optional_email_sentinel() {
        assert_eq!(validate_email(None), NO_EMAIL);
        assert_eq!(validate_email(Some("")), NO_EMAIL);
        assert_eq!(validate_email(Some("   ")), NO_EMAIL);
        assert_eq!(validate_email(Some("No Email")), NO_EMAIL);
    }

    #[test]
    fn malformed_emails_are_flagged() {
        for email in [
            "plainaddress",
            "two@@example.com",
            "a@b@example.com",
            "missing@tld",
            "spaces in@example.com",
            "quote'@example.com",
            "<jane>@example.com",
            "ja\0ne@example.com",
            "jane@exa\u{7f}mple.com",
        ] {
            assert_eq!(validate_email(Some(email)), INVALID_EMAIL, "{email}");
        }

        let too_long = format!("{}@example.com", "a".repeat(100));
        assert_eq!(validate_email(Some(&too_long)), INVALID_EMAIL);
    }

    #[test]
    fn valid_emails_are_normalized() {
        assert_eq!(
            validate_email(Some(" Jane.Doe@Example.com ")),
            "jane.doe@example.com"
        );
        assert_eq!(validate_email(Some("a@b.co.th")), "a@b.co.th");
        assert!(is_real_email("a@b.co"));
        assert!(!is_real_email(NO_EMAIL));
        assert!(!is_real_email(INVALID_EMAIL));
    }

    #[test]
    fn guest_count_is_coerced() {
        assert_eq!(parse_guest_count(Some("3")), 3);
        assert_eq!(parse_guest_count(Some(" 20 ")), 20);
        assert_eq!(parse_guest_count(Some("1")), 1);
        for invalid in ["0", "21", "-4", "two", "2.5", "", "99999999999999999999"] {
            assert_eq!(parse_guest_count(Some(invalid)), 1, "{invalid}");
        }
        assert_eq!(parse_guest_count(None), 1);
    }

    #[test]
    fn amount_bounds() {
        assert_eq!(parse_amount(None), Ok(None));
        assert_eq!(parse_amount(Some("  ")), Ok(None));
        assert_eq!(parse_amount(Some("0")), Ok(Some(0.0)));
        assert_eq!(parse_amount(Some("-0")), Ok(Some(0.0)));
        assert_eq!(parse_amount(Some("1500.50")), Ok(Some(1500.5)));
        assert_eq!(parse_amount(Some("10000000")), Ok(Some(10_000_000.0)));

        assert_eq!(parse_amount(Some("10000000.01")), Err(InvalidAmount::TooLarge));
        assert_eq!(parse_amount(Some("-1")), Err(InvalidAmount::Negative));
        assert_eq!(parse_amount(Some("abc")), Err(InvalidAmount::NotANumber));
        assert_eq!(parse_amount(Some("NaN")), Err(InvalidAmount::NotANumber));
        assert_eq!(parse_amount(Some("inf")), Err(InvalidAmount::NotANumber));
        assert_eq!(parse_amount(Some("1,000")), Err(InvalidAmount::NotANumber));
    }

    #[test]
    fn amounts_render_with_bounded_precision() {
        assert_eq!(format_amount(1500.5), "1500.5");
        assert_eq!(format_amount(10_000_000.0), "10000000");
        assert_eq!(format_amount(0.0), "0");
        assert_eq!(format_amount(12.346), "12.35");
        assert_eq!(format_amount(0.1 + 0.2), "0.3");

        let tiny = parse_amount(Some("1e-300")).unwrap().unwrap();
        assert_eq!(format_amount(tiny), "0");
    }

    #[test]
    fn slip_accepts_allowed_types() {
        for (mime, kind) in [
            ("image/jpeg", SlipType::Jpeg),
            ("image/jpg", SlipType::Jpeg),
            ("image/png", SlipType::Png),
            ("image/gif", SlipType::Gif),
            ("image/webp", SlipType::Webp),
            ("application/pdf", SlipType::Pdf),
        ] {
            let slip = Slip::from_data_url(&data_url(mime, b"receipt"), Some("slip")).unwrap();
            assert_eq!(slip.kind, kind);
            assert_eq!(slip.bytes, b"receipt");
        }
    }

    #[test]
    fn slip_rejects_other_types() {
        let slip = Slip::from_data_url(&data_url("text/html", b"<html>"), None);
        assert_eq!(
            slip.unwrap_err(),
            InvalidSlipReason::UnsupportedType(String::from("text/html"))
        );
    }

    #[test]
    fn slip_rejects_oversized_payloads_whatever_the_type() {
        let big = vec![0u8; MAX_SLIP_BYTES + 1];
        for mime in ["image/png", "application/zip"] {
            let slip = Slip::from_data_url(&data_url(mime, &big), None);
            assert_eq!(slip.unwrap_err(), InvalidSlipReason::TooLarge, "{mime}");
        }

        let exactly = vec![0u8; MAX_SLIP_BYTES];
        assert!(Slip::from_data_url(&data_url("image/png", &exactly), None).is_ok());
    }

    #[test]
    fn slip_rejects_malformed_urls() {
        assert_eq!(
            Slip::from_data_url("https://example.com/a.png", None).unwrap_err(),
            InvalidSlipReason::NotDataUrl
        );
        assert_eq!(
            Slip::from_data_url("data:image/png,raw", None).unwrap_err(),
            InvalidSlipReason::NotDataUrl
        );
        assert_eq!(
            Slip::from_data_url("data:image/png;base64,!!!!", None).unwrap_err(),
            InvalidSlipReason::NotBase64
        );
        assert_eq!(
            Slip::from_data_url("data:image/png;base64,", None).unwrap_err(),
            InvalidSlipReason::Empty
        );
    }

    #[test]
    fn slip_survives_form_encoded_plus_signs() {
        // 0xfb 0xff encodes to "+/8=", which a lax client sends with a raw '+'
        let slip = Slip::from_data_url("data:image/png;base64, /8=", None).unwrap();
        assert_eq!(slip.bytes, vec![0xfb, 0xff]);
    }

    #[test]
    fn slip_file_names() {
        let slip = Slip::from_data_url(&data_url("image/png", b"x"), Some("my receipt.png"))
            .unwrap();
        assert_eq!(slip.file_name(), "my_receipt.png");

        let slip = Slip::from_data_url(&data_url("application/pdf", b"x"), Some("../../etc"))
            .unwrap();
        assert_eq!(slip.file_name(), ".._.._etc.pdf");

        let slip = Slip::from_data_url(&data_url("image/jpeg", b"x"), None).unwrap();
        assert_eq!(slip.file_name(), "slip.jpg");

        let slip = Slip::from_data_url(&data_url("image/jpg", b"x"), Some("IMG_01.JPEG")).unwrap();
        assert_eq!(slip.file_name(), "IMG_01.JPEG");
    }
}
