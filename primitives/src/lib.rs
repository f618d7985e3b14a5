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
//! Low-level types used throughout the Parknet code.

#![warn(missing_docs)]
#![cfg_attr(not(feature = "std"), no_std)]

use codec::{Decode, Encode};
use scale_info::TypeInfo;
use sp_runtime::RuntimeDebug;

pub mod ids;
pub mod validation;

/// A timestamp: milliseconds since the unix epoch.
pub type Moment = u64;

/// Monetary amount recorded on payment blocks, in the smallest currency unit.
pub type Balance = u128;

/// Storage key of a parking site.
pub type SiteId = u32;

/// Storage key of a parking machine.
pub type MachineId = u32;

/// Storage key of a customer record.
pub type CustomerId = u32;

/// Storage key of a parking session.
pub type BookingId = u32;

/// Stable sub-id of a vehicle embedded in a customer record.
pub type VehicleId = u32;

/// Storage key of a membership payment ledger row.
pub type PaymentId = u64;

/// Stable number of a pallet (tray) within its machine.
pub type PalletNumber = u16;

/// Slot within a pallet distinguishing co-located two-wheelers, `1..=6`.
pub type Position = u8;

/// Six decimal digit one-time retrieval code.
pub type OtpCode = u32;

/// Six decimal digit membership credential.
pub type MembershipNumber = u32;

/// Four decimal digit membership PIN.
pub type MembershipPin = u16;

/// One minute of wall-clock time in milliseconds.
pub const MINUTE_MS: Moment = 60 * 1000;

/// One hour of wall-clock time in milliseconds.
pub const HOUR_MS: Moment = 60 * MINUTE_MS;

/// One day of wall-clock time in milliseconds.
pub const DAY_MS: Moment = 24 * HOUR_MS;

/// Membership term unit. The chain clock has no calendar, a month is
/// accounted as 30 days.
pub const MONTH_MS: Moment = 30 * DAY_MS;

/// Highest pallet position a two-wheeler pallet can assign.
pub const MAX_POSITIONS: Position = 6;

/// Puzzle machines arrange pallets four to a floor.
pub const PUZZLE_PALLETS_PER_FLOOR: u16 = 4;

/// Vehicle class a machine or pallet position serves.
#[derive(PartialEq, Eq, Clone, Copy, Encode, Decode, TypeInfo, RuntimeDebug)]
#[cfg_attr(feature = "std", derive(serde::Serialize, serde::Deserialize))]
pub enum VehicleClass {
    /// Motorcycles and scooters.
    TwoWheeler,
    /// Cars.
    FourWheeler,
}

/// Kinematic type of a parking machine.
#[derive(PartialEq, Eq, Clone, Copy, Encode, Decode, TypeInfo, RuntimeDebug)]
#[cfg_attr(feature = "std", derive(serde::Serialize, serde::Deserialize))]
pub enum KinematicType {
    /// Vertical rotary carousel.
    Rotary,
    /// Horizontal puzzle grid.
    Puzzle,
}

/// How a customer paid at the kiosk. Amounts are recorded, settlement
/// happens off-chain.
#[derive(PartialEq, Eq, Clone, Copy, Encode, Decode, TypeInfo, RuntimeDebug)]
#[cfg_attr(feature = "std", derive(serde::Serialize, serde::Deserialize))]
pub enum PaymentMethod {
    /// Cash at the counter.
    Cash,
    /// Card terminal.
    Card,
    /// UPI transfer.
    Upi,
    /// Covered by a membership entitlement.
    Membership,
}

/// Settlement state of a recorded payment.
#[derive(PartialEq, Eq, Clone, Copy, Encode, Decode, TypeInfo, RuntimeDebug)]
#[cfg_attr(feature = "std", derive(serde::Serialize, serde::Deserialize))]
pub enum PaymentStatus {
    /// Awaiting confirmation.
    Pending,
    /// Captured.
    Completed,
    /// Declined or aborted.
    Failed,
    /// Returned to the customer.
    Refunded,
}

/// How many vehicles one pallet hosts for the given machine geometry.
///
/// Four-wheeler pallets always carry a single car; two-wheeler rotary
/// pallets rack six bikes, two-wheeler puzzle pallets three.
pub const fn vehicles_per_pallet(kinematic: KinematicType, class: VehicleClass) -> u8 {
    match (kinematic, class) {
        (_, VehicleClass::FourWheeler) => 1,
        (KinematicType::Rotary, VehicleClass::TwoWheeler) => 6,
        (KinematicType::Puzzle, VehicleClass::TwoWheeler) => 3,
    }
}

/// Pallet number for the `index`-th pallet (zero-based) of a puzzle machine:
/// `101..104, 201..204, ...`, four per floor, floor-major.
pub const fn puzzle_pallet_number(index: u16) -> PalletNumber {
    let floor = index / PUZZLE_PALLETS_PER_FLOOR + 1;
    let slot = index % PUZZLE_PALLETS_PER_FLOOR + 1;
    floor * 100 + slot
}

/// Weekday of a moment, `0 = Monday .. 6 = Sunday`. The epoch fell on a
/// Thursday.
pub const fn weekday(now: Moment) -> usize {
    ((now / DAY_MS + 3) % 7) as usize
}

/// Minutes elapsed since midnight of the moment's day.
pub const fn minutes_of_day(now: Moment) -> u16 {
    ((now % DAY_MS) / MINUTE_MS) as u16
}
