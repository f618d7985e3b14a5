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
//! Parknet booking engine runtime module.
//!
//! A booking is one parking session: customer, vehicle and pallet from
//! start to completion or cancellation, guarded by a time-bound retrieval
//! OTP. The booking record is the source of operational truth; pallet
//! occupancy is driven best-effort through the machine engine and never
//! rolls a session back — operators must be able to record sessions even
//! when the physical mechanism rejects an operation.
//!
//! Bookings keep denormalized copies of the customer name, phone, machine
//! code and pallet number so that history survives renames and removals.

#![cfg_attr(not(feature = "std"), no_std)]

use codec::{Decode, Encode};
use scale_info::TypeInfo;
use sp_runtime::RuntimeDebug;
use sp_std::prelude::*;

use pallet_parknet_machines::AllocationError;
use parknet_primitives::{
    Balance, BookingId, CustomerId, MembershipNumber, Moment, OtpCode, PalletNumber, PaymentMethod,
    PaymentStatus, SiteId, VehicleClass, HOUR_MS, MINUTE_MS,
};

pub mod weights;

pub use pallet::*;
pub use weights::WeightInfo;

/// Lifecycle status of a parking session.
#[derive(PartialEq, Eq, Clone, Copy, Encode, Decode, TypeInfo, RuntimeDebug)]
#[cfg_attr(feature = "std", derive(serde::Serialize, serde::Deserialize))]
pub enum BookingStatus {
    /// Vehicle parked, session running.
    Active,
    /// Closed with payment capture.
    Completed,
    /// Closed without payment.
    Cancelled,
    /// Reserved; no automatic driver transitions sessions here.
    Expired,
}

impl BookingStatus {
    /// Completed and cancelled sessions accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::Completed | BookingStatus::Cancelled)
    }
}

/// The retrieval OTP block of a session.
#[derive(PartialEq, Eq, Clone, Encode, Decode, TypeInfo, RuntimeDebug)]
pub struct OtpBlock {
    /// Six digit code, unique among outstanding OTPs.
    pub code: OtpCode,
    /// Issue timestamp.
    pub issued_at: Moment,
    /// Absolute expiry; redemption at or past this moment fails.
    pub expires_at: Moment,
    /// Consumed flag; an OTP redeems exactly once.
    pub used: bool,
    /// Redemption timestamp.
    pub used_at: Option<Moment>,
}

/// Payment captured on completion. Settlement happens at the kiosk; the
/// chain records the capture.
#[derive(PartialEq, Eq, Clone, Encode, Decode, TypeInfo, RuntimeDebug)]
pub struct PaymentRecord {
    /// Amount captured.
    pub amount: Balance,
    /// Kiosk payment method.
    pub method: PaymentMethod,
    /// Settlement state.
    pub status: PaymentStatus,
    /// External transaction reference, if any.
    pub reference: Option<Vec<u8>>,
    /// Capture timestamp.
    pub paid_at: Moment,
    /// Membership charged, when the method is membership.
    pub membership: Option<MembershipNumber>,
}

/// One granted extension of a session.
#[derive(PartialEq, Eq, Clone, Encode, Decode, TypeInfo, RuntimeDebug)]
pub struct Extension {
    /// When the extension was granted.
    pub at: Moment,
    /// Extra hours granted.
    pub hours: u32,
    /// Extra minutes granted.
    pub minutes: u32,
    /// Supervisor-stated reason.
    pub reason: Vec<u8>,
}

/// A parking session record.
#[derive(PartialEq, Eq, Clone, Encode, Decode, TypeInfo, RuntimeDebug)]
pub struct Booking<AccountId> {
    /// Human booking number, `BK{TW|FW}` + epoch tail.
    pub number: Vec<u8>,
    /// Owning customer.
    pub customer: CustomerId,
    /// Denormalized customer name at booking time.
    pub customer_name: Vec<u8>,
    /// Denormalized customer phone.
    pub phone: Vec<u8>,
    /// Uppercase vehicle plate.
    pub vehicle: Vec<u8>,
    /// Vehicle class.
    pub vehicle_class: VehicleClass,
    /// Denormalized machine code, value not reference.
    pub machine_code: Vec<u8>,
    /// Denormalized pallet number, value not reference.
    pub pallet_number: PalletNumber,
    /// Site the session was taken at.
    pub site: SiteId,
    /// Lifecycle status.
    pub status: BookingStatus,
    /// Session start.
    pub start: Moment,
    /// Session end, set on completion or cancellation.
    pub end: Option<Moment>,
    /// Retrieval OTP.
    pub otp: OtpBlock,
    /// Payment captured on completion.
    pub payment: Option<PaymentRecord>,
    /// Free-text notes, sanitized.
    pub notes: Vec<u8>,
    /// Granted extensions, oldest first.
    pub extensions: Vec<Extension>,
    /// Operator who took the session.
    pub created_by: AccountId,
    /// Operator of the last update.
    pub updated_by: Option<AccountId>,
    /// Operator who completed the session.
    pub completed_by: Option<AccountId>,
}

impl<AccountId> Booking<AccountId> {
    /// Session duration split into hours and minutes; running sessions
    /// measure up to `now`.
    pub fn duration(&self, now: Moment) -> (u32, u32) {
        let ms = self.end.unwrap_or(now).saturating_sub(self.start);
        ((ms / HOUR_MS) as u32, ((ms % HOUR_MS) / MINUTE_MS) as u32)
    }
}

/// Filters for the booking list query; unset fields match everything.
#[derive(Clone, Default, RuntimeDebug)]
pub struct BookingFilter {
    /// Scope to one site.
    pub site: Option<SiteId>,
    /// Scope to one status.
    pub status: Option<BookingStatus>,
    /// Scope to one machine code.
    pub machine_code: Option<Vec<u8>>,
    /// Scope to one plate.
    pub vehicle: Option<Vec<u8>>,
    /// Sessions started at or after this moment.
    pub date_from: Option<Moment>,
    /// Sessions started at or before this moment.
    pub date_to: Option<Moment>,
    /// Free-text needle over name, phone, plate, booking number and OTP.
    pub search: Option<Vec<u8>>,
}

/// Booking search scope.
#[derive(PartialEq, Eq, Clone, Copy, Encode, Decode, TypeInfo, RuntimeDebug)]
pub enum SearchMode {
    Vehicle,
    Pallet,
    Otp,
    Customer,
    Phone,
    All,
}

/// Aggregates for a reporting window.
#[derive(PartialEq, Eq, Clone, Copy, Default, Encode, Decode, TypeInfo, RuntimeDebug)]
pub struct BookingStats {
    /// Sessions started in the window.
    pub total: u32,
    /// Still active.
    pub active: u32,
    /// Completed.
    pub completed: u32,
    /// Cancelled.
    pub cancelled: u32,
    /// Expired.
    pub expired: u32,
    /// Revenue over completed sessions.
    pub revenue: Balance,
}

#[frame_support::pallet]
pub mod pallet {
    use super::*;
    use frame_support::{
        pallet_prelude::*,
        traits::{Randomness, Time},
    };
    use frame_system::pallet_prelude::*;
    use pallet_parknet_customers::{CustomerRegistry, MembershipValidator};
    use pallet_parknet_machines::PalletAllocator;
    use pallet_parknet_sites::SiteScope;
    use parknet_primitives::{ids, validation, MembershipPin};

    /// Hard cap on booking search results.
    pub const SEARCH_RESULT_CAP: usize = 50;

    /// Default page size of the booking list.
    pub const DEFAULT_PAGE_LIMIT: u32 = 20;

    #[pallet::config]
    pub trait Config: frame_system::Config {
        /// Current time source.
        type Time: Time<Moment = Moment>;
        /// Entropy for OTP draws.
        type Randomness: Randomness<Self::Hash, BlockNumberFor<Self>>;
        /// Authorization envelope.
        type Sites: SiteScope<Self::AccountId>;
        /// Pallet occupancy driver; every call is best-effort.
        type Machines: PalletAllocator;
        /// Customer store.
        type Customers: CustomerRegistry + MembershipValidator;
        /// The overarching event type.
        type RuntimeEvent: From<Event<Self>> + IsType<<Self as frame_system::Config>::RuntimeEvent>;
        /// How long a retrieval OTP stays redeemable.
        #[pallet::constant]
        type OtpTtl: Get<Moment>;
        /// OTP draws before giving up on a free code.
        #[pallet::constant]
        type OtpRetries: Get<u32>;
        /// Extrinsic weights.
        type WeightInfo: WeightInfo;
    }

    #[pallet::error]
    pub enum Error<T> {
        /// No booking with this id.
        BookingNotFound,
        /// The session is not active.
        BookingNotActive,
        /// The session already reached a terminal status.
        BookingAlreadyTerminal,
        /// No outstanding OTP matches, or it was used or has lapsed.
        InvalidOrExpiredOtp,
        /// Caller has no site context: none given, none assigned.
        NoSiteContext,
        /// Phone number is not a ten digit mobile number.
        InvalidPhone,
        /// Customer name rejected.
        InvalidName,
        /// Registration plate shape rejected.
        InvalidPlate,
        /// Machine code does not match `M` + 3 digits.
        InvalidMachineCode,
        /// Pallet number must be positive.
        InvalidPalletNumber,
        /// Extension must add time.
        EmptyExtension,
        /// Membership credentials missing, mismatched or not covering the
        /// vehicle class.
        InvalidMembership,
        /// No free OTP code found within the retry budget.
        IdentifierSpaceExhausted,
        /// Caller is not scoped for this operation.
        NotAuthorized,
    }

    #[pallet::event]
    #[pallet::generate_deposit(pub(super) fn deposit_event)]
    pub enum Event<T: Config> {
        /// New session taken: [id, number, customer, new_customer,
        /// customer_renamed].
        BookingCreated(BookingId, Vec<u8>, CustomerId, bool, bool),
        /// A pallet side-effect was refused and logged: [id, reason].
        PalletSideEffectFailed(BookingId, AllocationError),
        /// OTP redeemed; the vehicle identity is the retrieval
        /// instruction: [id, machine_code, pallet_number].
        OtpVerified(BookingId, Vec<u8>, PalletNumber),
        /// Fresh OTP issued: [id].
        OtpRegenerated(BookingId),
        /// Session completed: [id, amount, operator].
        BookingCompleted(BookingId, Balance, T::AccountId),
        /// Session cancelled: [id].
        BookingCancelled(BookingId),
        /// Session extended: [id, hours, minutes].
        BookingExtended(BookingId, u32, u32),
        /// Session attributes updated: [id].
        BookingUpdated(BookingId),
    }

    #[pallet::storage]
    #[pallet::getter(fn booking)]
    /// Session records.
    pub(super) type BookingOf<T: Config> =
        StorageMap<_, Twox64Concat, BookingId, Booking<T::AccountId>>;

    #[pallet::storage]
    #[pallet::getter(fn next_booking_id)]
    /// Next free session id.
    pub(super) type NextBookingId<T: Config> = StorageValue<_, BookingId, ValueQuery>;

    #[pallet::storage]
    #[pallet::getter(fn booking_by_otp)]
    /// Outstanding OTP codes of active sessions.
    pub(super) type ActiveOtps<T: Config> = StorageMap<_, Twox64Concat, OtpCode, BookingId>;

    #[pallet::storage]
    /// Monotonic salt for OTP draws.
    pub(super) type OtpNonce<T: Config> = StorageValue<_, u64, ValueQuery>;

    #[pallet::pallet]
    #[pallet::without_storage_info]
    pub struct Pallet<T>(PhantomData<T>);

    #[pallet::hooks]
    impl<T: Config> Hooks<BlockNumberFor<T>> for Pallet<T> {}

    #[pallet::call]
    impl<T: Config> Pallet<T> {
        /// Take a new parking session.
        ///
        /// Without an explicit `site` the caller's primary site is used.
        /// The machine and pallet are recorded as values and deliberately
        /// not checked against the machine registry: overbooking is allowed
        /// for operational recovery, the pallet engine refuses on its own
        /// and the refusal is logged, never fatal.
        #[pallet::weight(T::WeightInfo::create_booking())]
        #[pallet::call_index(0)]
        pub fn create_booking(
            origin: OriginFor<T>,
            site: Option<SiteId>,
            customer_name: Vec<u8>,
            phone: Vec<u8>,
            vehicle: Vec<u8>,
            vehicle_class: VehicleClass,
            machine_code: Vec<u8>,
            pallet_number: PalletNumber,
            email: Option<Vec<u8>>,
            notes: Option<Vec<u8>>,
        ) -> DispatchResultWithPostInfo {
            let sender = ensure_signed(origin)?;
            let site = site
                .or_else(|| T::Sites::default_site(&sender))
                .ok_or(Error::<T>::NoSiteContext)?;
            ensure!(T::Sites::can_operate(&sender, site), Error::<T>::NotAuthorized);

            ensure!(validation::phone(&phone), Error::<T>::InvalidPhone);
            ensure!(
                validation::machine_code(&machine_code),
                Error::<T>::InvalidMachineCode
            );
            ensure!(pallet_number >= 1, Error::<T>::InvalidPalletNumber);
            let vehicle =
                validation::normalize_plate(&vehicle).ok_or(Error::<T>::InvalidPlate)?;
            let customer_name = validation::sanitize(&customer_name);
            ensure!(!customer_name.is_empty(), Error::<T>::InvalidName);

            let link = T::Customers::resolve_or_create(
                &phone,
                &customer_name,
                email.as_deref(),
                &vehicle,
                vehicle_class,
            )?;

            let now = T::Time::now();
            let id = <NextBookingId<T>>::get();
            let number = ids::booking_number(vehicle_class, now).to_vec();
            let otp = Self::fresh_otp(id)?;
            <ActiveOtps<T>>::insert(otp.code, id);
            <NextBookingId<T>>::put(id + 1);
            <BookingOf<T>>::insert(
                id,
                Booking {
                    number: number.clone(),
                    customer: link.customer,
                    customer_name: customer_name.clone(),
                    phone,
                    vehicle: vehicle.clone(),
                    vehicle_class,
                    machine_code: machine_code.clone(),
                    pallet_number,
                    site,
                    status: BookingStatus::Active,
                    start: now,
                    end: None,
                    otp,
                    payment: None,
                    notes: notes.map(|n| validation::sanitize(&n)).unwrap_or_default(),
                    extensions: Vec::new(),
                    created_by: sender,
                    updated_by: None,
                    completed_by: None,
                },
            );

            // Best-effort occupy side-effect; the booking stands either way.
            if let Err(reason) =
                T::Machines::occupy(site, &machine_code, pallet_number, id, &vehicle, None)
            {
                log::warn!(
                    target: "runtime::bookings",
                    "booking {id}: pallet occupy refused: {reason:?}",
                );
                Self::deposit_event(Event::PalletSideEffectFailed(id, reason));
            }
            T::Customers::note_booking(link.customer, now);

            Self::deposit_event(Event::BookingCreated(
                id,
                number,
                link.customer,
                link.is_new,
                link.name_updated,
            ));
            Ok(().into())
        }

        /// Redeem a retrieval OTP. The matching active session is returned
        /// through the event; a code redeems exactly once and lapses at its
        /// expiry moment.
        #[pallet::weight(T::WeightInfo::verify_otp())]
        #[pallet::call_index(1)]
        pub fn verify_otp(origin: OriginFor<T>, code: OtpCode) -> DispatchResultWithPostInfo {
            let sender = ensure_signed(origin)?;
            ensure!(T::Sites::is_staff(&sender), Error::<T>::NotAuthorized);
            ensure!(validation::otp_code(code), Error::<T>::InvalidOrExpiredOtp);

            let id = Self::booking_by_otp(code).ok_or(Error::<T>::InvalidOrExpiredOtp)?;
            let now = T::Time::now();
            let (machine_code, pallet_number) =
                <BookingOf<T>>::try_mutate(id, |record| {
                    let record = record.as_mut().ok_or(Error::<T>::BookingNotFound)?;
                    ensure!(
                        record.status == BookingStatus::Active
                            && record.otp.code == code
                            && !record.otp.used
                            && record.otp.expires_at > now,
                        Error::<T>::InvalidOrExpiredOtp
                    );
                    record.otp.used = true;
                    record.otp.used_at = Some(now);
                    Ok::<_, DispatchError>((record.machine_code.clone(), record.pallet_number))
                })?;
            <ActiveOtps<T>>::remove(code);

            Self::deposit_event(Event::OtpVerified(id, machine_code, pallet_number));
            Ok(().into())
        }

        /// Replace a session's OTP with a fresh time-bound one.
        #[pallet::weight(T::WeightInfo::regenerate_otp())]
        #[pallet::call_index(2)]
        pub fn regenerate_otp(
            origin: OriginFor<T>,
            booking: BookingId,
        ) -> DispatchResultWithPostInfo {
            let sender = ensure_signed(origin)?;
            let otp = Self::fresh_otp(booking)?;
            <BookingOf<T>>::try_mutate(booking, |record| -> DispatchResult {
                let record = record.as_mut().ok_or(Error::<T>::BookingNotFound)?;
                ensure!(
                    T::Sites::can_operate(&sender, record.site),
                    Error::<T>::NotAuthorized
                );
                ensure!(
                    record.status == BookingStatus::Active,
                    Error::<T>::BookingNotActive
                );
                Self::retire_otp(record);
                <ActiveOtps<T>>::insert(otp.code, booking);
                record.otp = otp.clone();
                record.updated_by = Some(sender.clone());
                Ok(())
            })?;

            Self::deposit_event(Event::OtpRegenerated(booking));
            Ok(().into())
        }

        /// Complete an active session, capturing the payment when one is
        /// presented. Releases the pallet occupant best-effort.
        #[pallet::weight(T::WeightInfo::complete_booking())]
        #[pallet::call_index(3)]
        pub fn complete_booking(
            origin: OriginFor<T>,
            booking: BookingId,
            amount: Option<Balance>,
            method: Option<PaymentMethod>,
            reference: Option<Vec<u8>>,
            membership_number: Option<MembershipNumber>,
            membership_pin: Option<MembershipPin>,
        ) -> DispatchResultWithPostInfo {
            let sender = ensure_signed(origin)?;
            let now = T::Time::now();

            let (customer, paid) = <BookingOf<T>>::try_mutate(booking, |record| {
                let record = record.as_mut().ok_or(Error::<T>::BookingNotFound)?;
                ensure!(
                    T::Sites::can_operate(&sender, record.site),
                    Error::<T>::NotAuthorized
                );
                ensure!(
                    record.status == BookingStatus::Active,
                    Error::<T>::BookingNotActive
                );

                let mut paid = 0;
                if let Some(method) = method {
                    if method == PaymentMethod::Membership {
                        let number =
                            membership_number.ok_or(Error::<T>::InvalidMembership)?;
                        let pin = membership_pin.ok_or(Error::<T>::InvalidMembership)?;
                        T::Customers::validate(number, pin, Some(record.vehicle_class), now)
                            .ok_or(Error::<T>::InvalidMembership)?;
                    }
                    paid = amount.unwrap_or_default();
                    record.payment = Some(PaymentRecord {
                        amount: paid,
                        method,
                        status: PaymentStatus::Completed,
                        reference: reference.clone(),
                        paid_at: now,
                        membership: membership_number
                            .filter(|_| method == PaymentMethod::Membership),
                    });
                }

                record.status = BookingStatus::Completed;
                record.end = Some(now);
                record.completed_by = Some(sender.clone());
                Self::retire_otp(record);
                Ok::<_, DispatchError>((record.customer, paid))
            })?;

            Self::release_side_effect(booking, ReleaseKey::Vehicle);
            T::Customers::note_completed(customer, paid);

            Self::deposit_event(Event::BookingCompleted(booking, paid, sender));
            Ok(().into())
        }

        /// Cancel a session that has not terminated. No payment is taken;
        /// the pallet occupant is released best-effort.
        #[pallet::weight(T::WeightInfo::cancel_booking())]
        #[pallet::call_index(4)]
        pub fn cancel_booking(
            origin: OriginFor<T>,
            booking: BookingId,
            reason: Option<Vec<u8>>,
        ) -> DispatchResultWithPostInfo {
            let sender = ensure_signed(origin)?;
            <BookingOf<T>>::try_mutate(booking, |record| -> DispatchResult {
                let record = record.as_mut().ok_or(Error::<T>::BookingNotFound)?;
                ensure!(
                    T::Sites::can_operate(&sender, record.site),
                    Error::<T>::NotAuthorized
                );
                ensure!(
                    !record.status.is_terminal(),
                    Error::<T>::BookingAlreadyTerminal
                );

                record.status = BookingStatus::Cancelled;
                record.end = Some(T::Time::now());
                record.updated_by = Some(sender.clone());
                if let Some(reason) = reason {
                    let reason = validation::sanitize(&reason);
                    if !reason.is_empty() {
                        if !record.notes.is_empty() {
                            record.notes.extend_from_slice(b"; ");
                        }
                        record.notes.extend_from_slice(&reason);
                    }
                }
                Self::retire_otp(record);
                Ok(())
            })?;

            Self::release_side_effect(booking, ReleaseKey::Booking);

            Self::deposit_event(Event::BookingCancelled(booking));
            Ok(().into())
        }

        /// Grant extra time on an active session. Requires supervisor scope
        /// at the session's site. The OTP expiry is deliberately untouched.
        #[pallet::weight(T::WeightInfo::extend_booking())]
        #[pallet::call_index(5)]
        pub fn extend_booking(
            origin: OriginFor<T>,
            booking: BookingId,
            hours: u32,
            minutes: u32,
            reason: Option<Vec<u8>>,
        ) -> DispatchResultWithPostInfo {
            let sender = ensure_signed(origin)?;
            ensure!(hours > 0 || minutes > 0, Error::<T>::EmptyExtension);

            <BookingOf<T>>::try_mutate(booking, |record| -> DispatchResult {
                let record = record.as_mut().ok_or(Error::<T>::BookingNotFound)?;
                ensure!(
                    T::Sites::can_supervise(&sender, record.site),
                    Error::<T>::NotAuthorized
                );
                ensure!(
                    record.status == BookingStatus::Active,
                    Error::<T>::BookingNotActive
                );
                record.extensions.push(Extension {
                    at: T::Time::now(),
                    hours,
                    minutes,
                    reason: reason.map(|r| validation::sanitize(&r)).unwrap_or_default(),
                });
                record.updated_by = Some(sender.clone());
                Ok(())
            })?;

            Self::deposit_event(Event::BookingExtended(booking, hours, minutes));
            Ok(().into())
        }

        /// Update notes or the vehicle class of an active session.
        #[pallet::weight(T::WeightInfo::update_booking())]
        #[pallet::call_index(6)]
        pub fn update_booking(
            origin: OriginFor<T>,
            booking: BookingId,
            notes: Option<Vec<u8>>,
            vehicle_class: Option<VehicleClass>,
        ) -> DispatchResultWithPostInfo {
            let sender = ensure_signed(origin)?;
            <BookingOf<T>>::try_mutate(booking, |record| -> DispatchResult {
                let record = record.as_mut().ok_or(Error::<T>::BookingNotFound)?;
                ensure!(
                    T::Sites::can_operate(&sender, record.site),
                    Error::<T>::NotAuthorized
                );
                ensure!(
                    record.status == BookingStatus::Active,
                    Error::<T>::BookingNotActive
                );
                if let Some(notes) = notes {
                    record.notes = validation::sanitize(&notes);
                }
                if let Some(vehicle_class) = vehicle_class {
                    record.vehicle_class = vehicle_class;
                }
                record.updated_by = Some(sender.clone());
                Ok(())
            })?;

            Self::deposit_event(Event::BookingUpdated(booking));
            Ok(().into())
        }
    }

    /// Which identity the pallet release is keyed by.
    enum ReleaseKey {
        /// Release by session id.
        Booking,
        /// Release by vehicle plate.
        Vehicle,
    }

    impl<T: Config> Pallet<T> {
        /// Draw an OTP no outstanding session uses.
        fn fresh_otp(booking: BookingId) -> Result<OtpBlock, Error<T>> {
            let now = T::Time::now();
            for _ in 0..T::OtpRetries::get() {
                let nonce = <OtpNonce<T>>::mutate(|n| {
                    *n += 1;
                    *n
                });
                let (hash, _) = T::Randomness::random(&(b"otp", booking, nonce).encode());
                let bytes = hash.as_ref();
                let mut seed = [0u8; 8];
                let take = bytes.len().min(8);
                seed[..take].copy_from_slice(&bytes[..take]);
                let code = ids::six_digit_code(u64::from_le_bytes(seed));
                if !<ActiveOtps<T>>::contains_key(code) {
                    return Ok(OtpBlock {
                        code,
                        issued_at: now,
                        expires_at: now + T::OtpTtl::get(),
                        used: false,
                        used_at: None,
                    });
                }
            }
            Err(Error::<T>::IdentifierSpaceExhausted)
        }

        /// Drop the outstanding-OTP index entry of a session's current OTP.
        fn retire_otp(record: &Booking<T::AccountId>) {
            if !record.otp.used {
                <ActiveOtps<T>>::remove(record.otp.code);
            }
        }

        /// Best-effort pallet release on a terminal transition; refusals are
        /// logged and surfaced as an event, never an error.
        fn release_side_effect(booking: BookingId, key: ReleaseKey) {
            let Some(record) = Self::booking(booking) else { return };
            let result = match key {
                ReleaseKey::Booking => T::Machines::release_booking(
                    record.site,
                    &record.machine_code,
                    record.pallet_number,
                    booking,
                ),
                ReleaseKey::Vehicle => T::Machines::release_vehicle(
                    record.site,
                    &record.machine_code,
                    record.pallet_number,
                    &record.vehicle,
                ),
            };
            if let Err(reason) = result {
                log::warn!(
                    target: "runtime::bookings",
                    "booking {booking}: pallet release refused: {reason:?}",
                );
                Self::deposit_event(Event::PalletSideEffectFailed(booking, reason));
            }
        }

        /// Whether the filter matches a session.
        fn filter_matches(filter: &BookingFilter, record: &Booking<T::AccountId>) -> bool {
            filter.site.map_or(true, |s| record.site == s)
                && filter.status.map_or(true, |s| record.status == s)
                && filter
                    .machine_code
                    .as_ref()
                    .map_or(true, |c| &record.machine_code == c)
                && filter
                    .vehicle
                    .as_ref()
                    .map_or(true, |v| record.vehicle == v.to_ascii_uppercase())
                && filter.date_from.map_or(true, |from| record.start >= from)
                && filter.date_to.map_or(true, |to| record.start <= to)
                && filter.search.as_ref().map_or(true, |needle| {
                    let needle = needle.to_ascii_lowercase();
                    validation::contains_ci(&record.customer_name, &needle)
                        || validation::contains_ci(&record.phone, &needle)
                        || validation::contains_ci(&record.vehicle, &needle)
                        || validation::contains_ci(&record.number, &needle)
                        || validation::contains_ci(&ids::six_digit_bytes(record.otp.code), &needle)
                })
        }

        /// Filtered booking list, newest first, with the total match count
        /// for the pagination envelope.
        pub fn list(
            filter: &BookingFilter,
            page: validation::Pagination,
        ) -> (Vec<(BookingId, Booking<T::AccountId>)>, u32) {
            let mut matches: Vec<_> = <BookingOf<T>>::iter()
                .filter(|(_, b)| Self::filter_matches(filter, b))
                .collect();
            matches.sort_by(|(_, a), (_, b)| b.start.cmp(&a.start));
            let total = matches.len() as u32;
            (
                matches
                    .into_iter()
                    .skip(page.offset())
                    .take(page.limit as usize)
                    .collect(),
                total,
            )
        }

        /// Substring search across sessions, capped at fifty results.
        pub fn search(query: &[u8], mode: SearchMode) -> Vec<(BookingId, Booking<T::AccountId>)> {
            if query.is_empty() {
                return Vec::new();
            }
            let needle = query.to_ascii_lowercase();
            <BookingOf<T>>::iter()
                .filter(|(_, b)| match mode {
                    SearchMode::Vehicle => validation::contains_ci(&b.vehicle, &needle),
                    SearchMode::Pallet => parse_number(query)
                        .map_or(false, |n| b.pallet_number as u32 == n),
                    SearchMode::Otp => {
                        validation::contains_ci(&ids::six_digit_bytes(b.otp.code), &needle)
                    }
                    SearchMode::Customer => validation::contains_ci(&b.customer_name, &needle),
                    SearchMode::Phone => validation::contains_ci(&b.phone, &needle),
                    SearchMode::All => {
                        validation::contains_ci(&b.vehicle, &needle)
                            || validation::contains_ci(&b.customer_name, &needle)
                            || validation::contains_ci(&b.phone, &needle)
                            || validation::contains_ci(&b.number, &needle)
                            || validation::contains_ci(
                                &ids::six_digit_bytes(b.otp.code),
                                &needle,
                            )
                    }
                })
                .take(SEARCH_RESULT_CAP)
                .collect()
        }

        /// Sessions taken on one machine code, optionally status-scoped.
        pub fn by_machine(
            machine_code: &[u8],
            status: Option<BookingStatus>,
        ) -> Vec<(BookingId, Booking<T::AccountId>)> {
            <BookingOf<T>>::iter()
                .filter(|(_, b)| {
                    b.machine_code == machine_code && status.map_or(true, |s| b.status == s)
                })
                .collect()
        }

        /// Sessions for one plate.
        pub fn by_vehicle(plate: &[u8]) -> Vec<(BookingId, Booking<T::AccountId>)> {
            let plate = plate.to_ascii_uppercase();
            <BookingOf<T>>::iter()
                .filter(|(_, b)| b.vehicle == plate)
                .collect()
        }

        /// All currently active sessions.
        pub fn active() -> Vec<(BookingId, Booking<T::AccountId>)> {
            <BookingOf<T>>::iter()
                .filter(|(_, b)| b.status == BookingStatus::Active)
                .collect()
        }

        /// Counters and completed revenue over sessions started in
        /// `[from, to]`.
        pub fn stats(from: Moment, to: Moment) -> BookingStats {
            let mut out = BookingStats::default();
            for (_, b) in <BookingOf<T>>::iter() {
                if b.start < from || b.start > to {
                    continue;
                }
                out.total += 1;
                match b.status {
                    BookingStatus::Active => out.active += 1,
                    BookingStatus::Completed => {
                        out.completed += 1;
                        if let Some(payment) = &b.payment {
                            out.revenue = out.revenue.saturating_add(payment.amount);
                        }
                    }
                    BookingStatus::Cancelled => out.cancelled += 1,
                    BookingStatus::Expired => out.expired += 1,
                }
            }
            out
        }
    }

    /// Parse an ASCII decimal number.
    fn parse_number(s: &[u8]) -> Option<u32> {
        if s.is_empty() || !s.iter().all(u8::is_ascii_digit) {
            return None;
        }
        s.iter()
            .try_fold(0u32, |acc, d| {
                acc.checked_mul(10)?.checked_add((d - b'0') as u32)
            })
    }

    impl<T: Config> pallet_parknet_sites::SiteBookings for Pallet<T> {
        fn active_count(site: SiteId) -> u32 {
            <BookingOf<T>>::iter()
                .filter(|(_, b)| b.site == site && b.status == BookingStatus::Active)
                .count() as u32
        }

        fn purge_site(site: SiteId) -> u32 {
            let mut purged = 0;
            <BookingOf<T>>::translate(|_, record: Booking<T::AccountId>| {
                if record.site == site {
                    if !record.otp.used {
                        <ActiveOtps<T>>::remove(record.otp.code);
                    }
                    purged += 1;
                    None
                } else {
                    Some(record)
                }
            });
            purged
        }

        fn totals(site: SiteId, day_start: Moment) -> pallet_parknet_sites::BookingTotals {
            let mut out = pallet_parknet_sites::BookingTotals::default();
            for (_, b) in <BookingOf<T>>::iter() {
                if b.site != site {
                    continue;
                }
                out.total += 1;
                if b.start >= day_start {
                    out.today += 1;
                }
                if b.status == BookingStatus::Active {
                    out.active += 1;
                }
                if b.status == BookingStatus::Completed {
                    if let Some(payment) = &b.payment {
                        out.revenue_total = out.revenue_total.saturating_add(payment.amount);
                        if payment.paid_at >= day_start {
                            out.revenue_today =
                                out.revenue_today.saturating_add(payment.amount);
                        }
                    }
                }
            }
            out
        }
    }

    impl<T: Config> pallet_parknet_customers::BookingGuard for Pallet<T> {
        fn has_active_for_plate(plate: &[u8]) -> bool {
            let plate = plate.to_ascii_uppercase();
            <BookingOf<T>>::iter()
                .any(|(_, b)| b.status == BookingStatus::Active && b.vehicle == plate)
        }

        fn has_active_for_customer(customer: CustomerId) -> bool {
            <BookingOf<T>>::iter()
                .any(|(_, b)| b.status == BookingStatus::Active && b.customer == customer)
        }
    }
}

#[cfg(test)]
mod mock;
