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
//! Human-facing identifier builders.
//!
//! All builders are pure functions of the injected clock moment or entropy
//! seed, so callers (and tests) fully control the produced values.

use crate::{MembershipPin, Moment, OtpCode, VehicleClass};

/// Length of a booking number: `BK` + class prefix + 8 digits.
pub const BOOKING_NUMBER_LEN: usize = 12;

/// Length of a customer code: `CUST` + 6 digits.
pub const CUSTOMER_CODE_LEN: usize = 10;

/// Last `N` decimal digits of `value` as zero-padded ASCII.
fn last_digits<const N: usize>(mut value: u64) -> [u8; N] {
    let mut out = [b'0'; N];
    for slot in out.iter_mut().rev() {
        *slot = b'0' + (value % 10) as u8;
        value /= 10;
    }
    out
}

/// Booking number issued at session creation, e.g. `BKTW38152000`.
pub fn booking_number(class: VehicleClass, now: Moment) -> [u8; BOOKING_NUMBER_LEN] {
    let mut out = [0u8; BOOKING_NUMBER_LEN];
    out[..2].copy_from_slice(b"BK");
    out[2..4].copy_from_slice(match class {
        VehicleClass::TwoWheeler => b"TW",
        VehicleClass::FourWheeler => b"FW",
    });
    out[4..].copy_from_slice(&last_digits::<8>(now));
    out
}

/// Customer code assigned on first registration, e.g. `CUST152000`.
pub fn customer_code(now: Moment) -> [u8; CUSTOMER_CODE_LEN] {
    let mut out = [0u8; CUSTOMER_CODE_LEN];
    out[..4].copy_from_slice(b"CUST");
    out[4..].copy_from_slice(&last_digits::<6>(now));
    out
}

/// Six decimal digits, first digit non-zero. Used for membership numbers
/// and retrieval OTPs.
pub fn six_digit_code(seed: u64) -> OtpCode {
    100_000 + (seed % 900_000) as u32
}

/// Four decimal digits, first digit non-zero.
pub fn four_digit_pin(seed: u64) -> MembershipPin {
    1_000 + (seed % 9_000) as u16
}

/// Decimal rendering of a six digit code, for display and search.
pub fn six_digit_bytes(code: OtpCode) -> [u8; 6] {
    last_digits::<6>(code as u64)
}
