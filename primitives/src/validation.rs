///////////////////////////////////////////////////////////////////////////////
//
//  Copyright 2022-2025 Parknet Network <dev@parknet.network>
//
//  Licensed under the Apache License, Version 2.0 (the "License");
//  you may not use this file except in compliance with the License.
//  You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
//  Unless required by applicable law or agreed to in writing, software
//  distributed under the License is distributed on an "AS IS" BASIS,
//  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//  See the License for the specific language governing permissions and
//  limitations under the License.
//
///////////////////////////////////////////////////////////////////////////////
//! Input shape validators.
//!
//! Byte-level equivalents of the operator-console input rules. Values are
//! validated as raw bytes; callers map a `false` to the matching pallet
//! error variant.

use sp_std::vec::Vec;

use crate::{MembershipNumber, MembershipPin, OtpCode};

/// Longest accepted free-text value after sanitization.
pub const MAX_TEXT_LEN: usize = 1000;

/// Longest accepted email address.
pub const MAX_EMAIL_LEN: usize = 255;

/// Longest accepted person name.
pub const MAX_NAME_LEN: usize = 100;

/// Largest page size a paginated query serves.
pub const MAX_PAGE_LIMIT: u32 = 100;

fn all_digits(s: &[u8]) -> bool {
    !s.is_empty() && s.iter().all(u8::is_ascii_digit)
}

/// Indian mobile number: ten digits, first in `6..=9`.
pub fn phone(s: &[u8]) -> bool {
    s.len() == 10 && (b'6'..=b'9').contains(&s[0]) && all_digits(&s[1..])
}

/// Email: single `@`, non-empty local part, dotted domain, at most 255 bytes.
pub fn email(s: &[u8]) -> bool {
    if s.len() > MAX_EMAIL_LEN || s.iter().any(|c| c.is_ascii_whitespace()) {
        return false;
    }
    let mut parts = s.split(|c| *c == b'@');
    let (local, domain) = match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) => (local, domain),
        _ => return false,
    };
    if local.is_empty() || domain.is_empty() {
        return false;
    }
    // The domain needs an inner dot: not the first byte, and with at least
    // one byte following it.
    domain.len() >= 3 && domain[1..domain.len() - 1].contains(&b'.')
}

/// Person name: letters and spaces, at most 100 bytes.
pub fn person_name(s: &[u8]) -> bool {
    !s.is_empty()
        && s.len() <= MAX_NAME_LEN
        && s.iter().all(|c| c.is_ascii_alphabetic() || *c == b' ')
}

/// Registration plate shape `[A-Z]{2}\d{1,2}[A-Z]{1,2}\d{4}`, uppercase.
pub fn vehicle_plate(s: &[u8]) -> bool {
    let upper = |c: &u8| c.is_ascii_uppercase();
    let digit = |c: &u8| c.is_ascii_digit();

    let mut rest = s;
    if rest.len() < 2 || !rest[..2].iter().all(upper) {
        return false;
    }
    rest = &rest[2..];

    let digits = rest.iter().take_while(|c| digit(c)).count();
    if !(1..=2).contains(&digits) {
        return false;
    }
    rest = &rest[digits..];

    let letters = rest.iter().take_while(|c| upper(c)).count();
    if !(1..=2).contains(&letters) {
        return false;
    }
    rest = &rest[letters..];

    rest.len() == 4 && rest.iter().all(digit)
}

/// Uppercase a plate and check its shape; `None` when malformed.
pub fn normalize_plate(s: &[u8]) -> Option<Vec<u8>> {
    let normalized: Vec<u8> = s
        .iter()
        .filter(|c| !c.is_ascii_whitespace())
        .map(u8::to_ascii_uppercase)
        .collect();
    vehicle_plate(&normalized).then_some(normalized)
}

/// Machine code `M\d{3}`, unique per site.
pub fn machine_code(s: &[u8]) -> bool {
    s.len() == 4 && s[0] == b'M' && all_digits(&s[1..])
}

/// Human site code `SITE\d{3,6}`.
pub fn site_code(s: &[u8]) -> bool {
    s.len() >= 7 && s.len() <= 10 && &s[..4] == b"SITE" && all_digits(&s[4..])
}

/// Operator id `OP\d{3,6}`.
pub fn operator_id(s: &[u8]) -> bool {
    s.len() >= 5 && s.len() <= 8 && &s[..2] == b"OP" && all_digits(&s[2..])
}

/// Postal pincode: six digits, no leading zero.
pub fn pincode(s: &[u8]) -> bool {
    s.len() == 6 && (b'1'..=b'9').contains(&s[0]) && all_digits(&s[1..])
}

/// Six decimal digit OTP, leading digit non-zero.
pub fn otp_code(code: OtpCode) -> bool {
    (100_000..=999_999).contains(&code)
}

/// Six decimal digit membership number, leading digit non-zero.
pub fn membership_number(number: MembershipNumber) -> bool {
    (100_000..=999_999).contains(&number)
}

/// Four decimal digit membership PIN, leading digit non-zero.
pub fn membership_pin(pin: MembershipPin) -> bool {
    (1_000..=9_999).contains(&pin)
}

/// Trim surrounding whitespace, strip angle brackets and quotes, cap length.
pub fn sanitize(s: &[u8]) -> Vec<u8> {
    let trimmed: Vec<u8> = s
        .iter()
        .filter(|c| !matches!(**c, b'<' | b'>' | b'\'' | b'"'))
        .copied()
        .collect();
    let start = trimmed
        .iter()
        .position(|c| !c.is_ascii_whitespace())
        .unwrap_or(trimmed.len());
    let end = trimmed
        .iter()
        .rposition(|c| !c.is_ascii_whitespace())
        .map(|i| i + 1)
        .unwrap_or(start);
    trimmed[start..end].iter().take(MAX_TEXT_LEN).copied().collect()
}

/// Case-insensitive substring check; the needle must already be lowercase.
pub fn contains_ci(haystack: &[u8], needle: &[u8]) -> bool {
    if needle.is_empty() || needle.len() > haystack.len() {
        return needle.is_empty();
    }
    let lowered = haystack.to_ascii_lowercase();
    lowered.windows(needle.len()).any(|window| window == needle)
}

/// Clamped pagination window for list queries.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Pagination {
    /// One-based page number.
    pub page: u32,
    /// Page size, `1..=100`.
    pub limit: u32,
}

impl Pagination {
    /// Build a window from raw query values, falling back to page 1 and the
    /// controller's default page size.
    pub fn new(page: Option<u32>, limit: Option<u32>, default_limit: u32) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit.unwrap_or(default_limit).clamp(1, MAX_PAGE_LIMIT),
        }
    }

    /// Number of records skipped before this page.
    pub fn offset(&self) -> usize {
        (self.page as usize - 1) * self.limit as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phone_requires_indian_mobile_shape() {
        assert!(phone(b"9876543210"));
        assert!(phone(b"6000000000"));
        assert!(!phone(b"5876543210"));
        assert!(!phone(b"98765432101"));
        assert!(!phone(b"98765 4321"));
    }

    #[test]
    fn email_shapes() {
        assert!(email(b"ops@parknet.network"));
        assert!(email(b"a@b.c"));
        assert!(!email(b"a@b"));
        assert!(!email(b"a@.b"));
        assert!(!email(b"@b.c"));
        assert!(!email(b"a b@c.d"));
        assert!(!email(b"a@b@c.d"));
    }

    #[test]
    fn plate_shapes() {
        assert!(vehicle_plate(b"KA01AB1001"));
        assert!(vehicle_plate(b"KA5M1234"));
        assert!(!vehicle_plate(b"ka01ab1001"));
        assert!(!vehicle_plate(b"K01AB1001"));
        assert!(!vehicle_plate(b"KA01ABC1001"));
        assert!(!vehicle_plate(b"KA01AB101"));
    }

    #[test]
    fn plate_normalization_uppercases() {
        assert_eq!(normalize_plate(b"ka05mh1234"), Some(b"KA05MH1234".to_vec()));
        assert_eq!(normalize_plate(b"ka05 mh 1234"), Some(b"KA05MH1234".to_vec()));
        assert_eq!(normalize_plate(b"not a plate"), None);
    }

    #[test]
    fn code_shapes() {
        assert!(machine_code(b"M001"));
        assert!(!machine_code(b"M1"));
        assert!(!machine_code(b"X001"));

        assert!(site_code(b"SITE001"));
        assert!(site_code(b"SITE123456"));
        assert!(!site_code(b"SITE12"));
        assert!(!site_code(b"SITE1234567"));

        assert!(operator_id(b"OP001"));
        assert!(operator_id(b"OP123456"));
        assert!(!operator_id(b"OP12"));

        assert!(pincode(b"560001"));
        assert!(!pincode(b"060001"));
    }

    #[test]
    fn numeric_credentials() {
        assert!(otp_code(482_913));
        assert!(!otp_code(99_999));
        assert!(membership_number(100_000));
        assert!(!membership_number(1_000_000));
        assert!(membership_pin(1_000));
        assert!(!membership_pin(999));
    }

    #[test]
    fn sanitize_strips_markup_and_trims() {
        assert_eq!(sanitize(b"  <b>'hi'</b>  "), b"bhi/b".to_vec());
        assert_eq!(sanitize(b"plain note"), b"plain note".to_vec());

        let long = [b'x'; 2000];
        assert_eq!(sanitize(&long).len(), MAX_TEXT_LEN);
    }

    #[test]
    fn pagination_clamps() {
        let p = Pagination::new(None, None, 20);
        assert_eq!((p.page, p.limit), (1, 20));
        assert_eq!(p.offset(), 0);

        let p = Pagination::new(Some(0), Some(500), 10);
        assert_eq!((p.page, p.limit), (1, 100));

        let p = Pagination::new(Some(3), Some(10), 10);
        assert_eq!(p.offset(), 20);
    }
}
