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
//! Parknet customer and membership runtime module.
//!
//! A customer is a phone-number identity with an embedded vehicle list and
//! at most one membership block. Memberships entitle one or both vehicle
//! classes until an expiry date and are validated by a six digit number and
//! a four digit PIN. Every issuance and renewal appends a row to an
//! append-only payment ledger.

#![cfg_attr(not(feature = "std"), no_std)]

use codec::{Decode, Encode};
use scale_info::TypeInfo;
use sp_runtime::{DispatchError, RuntimeDebug};
use sp_std::prelude::*;

use parknet_primitives::{
    Balance, CustomerId, MembershipNumber, MembershipPin, Moment, PaymentId, PaymentMethod,
    PaymentStatus, VehicleClass, VehicleId, MONTH_MS,
};

pub mod weights;

pub use pallet::*;
pub use weights::WeightInfo;

/// Lifecycle status of a customer record.
#[derive(PartialEq, Eq, Clone, Copy, Encode, Decode, TypeInfo, RuntimeDebug)]
#[cfg_attr(feature = "std", derive(serde::Serialize, serde::Deserialize))]
pub enum CustomerStatus {
    /// In good standing.
    Active,
    /// Soft-deleted.
    Inactive,
    /// Barred by an administrator.
    Blocked,
}

/// Commercial membership plan.
#[derive(PartialEq, Eq, Clone, Copy, Encode, Decode, TypeInfo, RuntimeDebug)]
#[cfg_attr(feature = "std", derive(serde::Serialize, serde::Deserialize))]
pub enum MembershipKind {
    Monthly,
    Quarterly,
    Yearly,
    Premium,
}

impl MembershipKind {
    /// Default fee charged when the caller does not override the amount.
    pub fn default_fee(&self) -> Balance {
        match self {
            MembershipKind::Monthly => 500,
            MembershipKind::Quarterly => 1_200,
            MembershipKind::Yearly => 4_000,
            MembershipKind::Premium => 6_000,
        }
    }
}

/// A vehicle embedded in a customer record, addressed by a stable sub-id.
#[derive(PartialEq, Eq, Clone, Encode, Decode, TypeInfo, RuntimeDebug)]
pub struct Vehicle {
    /// Stable sub-id within the customer.
    pub id: VehicleId,
    /// Uppercase registration plate.
    pub plate: Vec<u8>,
    /// Vehicle class.
    pub class: VehicleClass,
    /// Manufacturer, free text.
    pub make: Vec<u8>,
    /// Model, free text.
    pub model: Vec<u8>,
    /// Colour, free text.
    pub color: Vec<u8>,
    /// Soft-delete flag.
    pub active: bool,
    /// When the vehicle was attached.
    pub added_at: Moment,
}

/// The customer-level membership block.
#[derive(PartialEq, Eq, Clone, Encode, Decode, TypeInfo, RuntimeDebug)]
pub struct Membership {
    /// Six digit credential, unique among active memberships.
    pub number: MembershipNumber,
    /// Four digit PIN validated together with the number.
    pub pin: MembershipPin,
    /// Plan.
    pub kind: MembershipKind,
    /// Vehicle classes the membership entitles.
    pub covered: Vec<VehicleClass>,
    /// Issue timestamp.
    pub issued_at: Moment,
    /// Expiry timestamp.
    pub expires_at: Moment,
    /// Term the customer paid for, in months.
    pub term_months: u32,
    /// Deactivation flag; expiry is derived on read, never stored.
    pub active: bool,
}

impl Membership {
    /// Active and not expired at the given moment.
    pub fn is_current(&self, now: Moment) -> bool {
        self.active && self.expires_at > now
    }

    /// Whether the membership entitles the vehicle class right now.
    pub fn covers(&self, class: VehicleClass, now: Moment) -> bool {
        self.is_current(now) && self.covered.contains(&class)
    }
}

/// Rolling counters maintained by the booking engine.
#[derive(PartialEq, Eq, Clone, Copy, Default, Encode, Decode, TypeInfo, RuntimeDebug)]
pub struct CustomerStats {
    /// Sessions ever taken.
    pub total_bookings: u32,
    /// Amount paid over completed sessions.
    pub total_amount: Balance,
    /// Start of the most recent session.
    pub last_booking_at: Option<Moment>,
}

/// A customer record.
#[derive(PartialEq, Eq, Clone, Encode, Decode, TypeInfo, RuntimeDebug)]
pub struct Customer {
    /// Auto code, `CUST` + 6 digits.
    pub code: Vec<u8>,
    /// Given name.
    pub first_name: Vec<u8>,
    /// Family name, may be empty.
    pub last_name: Vec<u8>,
    /// Primary identity: ten digit mobile number, unique among active
    /// customers.
    pub phone: Vec<u8>,
    /// Optional contact email.
    pub email: Option<Vec<u8>>,
    /// Embedded vehicles.
    pub vehicles: Vec<Vehicle>,
    /// Next free vehicle sub-id.
    pub next_vehicle_id: VehicleId,
    /// At most one membership block.
    pub membership: Option<Membership>,
    /// Booking counters.
    pub stats: CustomerStats,
    /// Lifecycle status.
    pub status: CustomerStatus,
    /// Registration timestamp.
    pub created_at: Moment,
    /// Soft-delete stamp and reason.
    pub deleted: Option<(Moment, Vec<u8>)>,
}

impl Customer {
    /// `first last`, or just the first name when the family name is empty.
    pub fn full_name(&self) -> Vec<u8> {
        let mut name = self.first_name.clone();
        if !self.last_name.is_empty() {
            name.push(b' ');
            name.extend_from_slice(&self.last_name);
        }
        name
    }

    /// Active vehicle with the given plate.
    pub fn active_vehicle(&self, plate: &[u8]) -> Option<&Vehicle> {
        self.vehicles
            .iter()
            .find(|v| v.active && v.plate == plate)
    }
}

/// One row of the append-only membership payment ledger. Rows are never
/// mutated once written.
#[derive(PartialEq, Eq, Clone, Encode, Decode, TypeInfo, RuntimeDebug)]
pub struct MembershipPayment<AccountId> {
    /// Paying customer.
    pub customer: CustomerId,
    /// Denormalized customer name.
    pub customer_name: Vec<u8>,
    /// Denormalized customer phone.
    pub phone: Vec<u8>,
    /// Credential the payment bought or renewed.
    pub membership_number: MembershipNumber,
    /// Plan.
    pub kind: MembershipKind,
    /// Amount captured.
    pub amount: Balance,
    /// Kiosk payment method.
    pub method: PaymentMethod,
    /// External transaction reference, if any.
    pub reference: Option<Vec<u8>>,
    /// Entitlement start.
    pub start: Moment,
    /// Entitlement expiry.
    pub expiry: Moment,
    /// Term in months.
    pub term_months: u32,
    /// Vehicle classes bought.
    pub covered: Vec<VehicleClass>,
    /// Settlement state; completed rows are immutable.
    pub status: PaymentStatus,
    /// Operator who captured the payment; `None` for the public purchase
    /// path.
    pub created_by: Option<AccountId>,
    /// Capture timestamp.
    pub created_at: Moment,
}

/// Booking facts the customer store needs before destructive operations.
pub trait BookingGuard {
    /// An active session exists for the plate.
    fn has_active_for_plate(plate: &[u8]) -> bool;
    /// An active session exists for the customer.
    fn has_active_for_customer(customer: CustomerId) -> bool;
}

impl BookingGuard for () {
    fn has_active_for_plate(_: &[u8]) -> bool {
        false
    }
    fn has_active_for_customer(_: CustomerId) -> bool {
        false
    }
}

/// Membership credential check used by the booking engine on payment
/// capture.
pub trait MembershipValidator {
    /// Customer holding the matching, current membership; `None` when the
    /// tuple mismatches, the membership lapsed, or the class (when given)
    /// is not covered. Callers never learn which factor failed.
    fn validate(
        number: MembershipNumber,
        pin: MembershipPin,
        class: Option<VehicleClass>,
        now: Moment,
    ) -> Option<CustomerId>;
}

/// Outcome of resolving a booking's customer by phone.
#[derive(PartialEq, Eq, Clone, Encode, Decode, TypeInfo, RuntimeDebug)]
pub struct CustomerLink {
    /// The resolved record.
    pub customer: CustomerId,
    /// A record was created for this booking.
    pub is_new: bool,
    /// The operator-provided name overwrote the stored one.
    pub name_updated: bool,
}

/// Customer store surface the booking engine drives.
pub trait CustomerRegistry {
    /// Find the active customer by phone, or create one; the provided name
    /// is operator-authoritative and overwrites a differing stored name.
    /// The plate is attached when missing.
    fn resolve_or_create(
        phone: &[u8],
        name: &[u8],
        email: Option<&[u8]>,
        plate: &[u8],
        class: VehicleClass,
    ) -> Result<CustomerLink, DispatchError>;

    /// Bump session counters on booking creation.
    fn note_booking(customer: CustomerId, now: Moment);

    /// Bump amount counters on booking completion.
    fn note_completed(customer: CustomerId, amount: Balance);
}

#[frame_support::pallet]
pub mod pallet {
    use super::*;
    use frame_support::{
        pallet_prelude::*,
        traits::{Randomness, Time},
    };
    use frame_system::pallet_prelude::*;
    use pallet_parknet_sites::SiteScope;
    use parknet_primitives::{ids, validation};

    /// Hard cap on customer search results.
    pub const SEARCH_RESULT_CAP: usize = 50;

    /// Shortest accepted search query.
    pub const MIN_QUERY_LEN: usize = 2;

    #[pallet::config]
    pub trait Config: frame_system::Config {
        /// Current time source.
        type Time: Time<Moment = Moment>;
        /// Entropy for membership credential draws.
        type Randomness: Randomness<Self::Hash, BlockNumberFor<Self>>;
        /// Authorization envelope.
        type Sites: SiteScope<Self::AccountId>;
        /// Booking engine facts for destructive guards.
        type Bookings: BookingGuard;
        /// The overarching event type.
        type RuntimeEvent: From<Event<Self>> + IsType<<Self as frame_system::Config>::RuntimeEvent>;
        /// Credential draws before giving up on a free membership number.
        #[pallet::constant]
        type CredentialRetries: Get<u32>;
        /// Extrinsic weights.
        type WeightInfo: WeightInfo;
    }

    #[pallet::error]
    pub enum Error<T> {
        /// No customer with this id.
        CustomerNotFound,
        /// Another active customer already uses this phone number.
        DuplicatePhone,
        /// Phone number is not a ten digit mobile number.
        InvalidPhone,
        /// Name must be letters and spaces, at most 100 bytes.
        InvalidName,
        /// Email shape rejected.
        InvalidEmail,
        /// Registration plate shape rejected.
        InvalidPlate,
        /// The plate is already attached and active for this customer.
        DuplicateVehicle,
        /// No vehicle with this sub-id.
        VehicleNotFound,
        /// An active session exists for this plate.
        VehicleHasActiveBooking,
        /// An active session exists for this customer.
        CustomerHasActiveBooking,
        /// The customer record is not active.
        CustomerInactive,
        /// Requested coverage is already entitled by the current membership.
        AlreadyCovered,
        /// The customer holds no membership block.
        NoMembership,
        /// Coverage list is empty.
        InvalidCoverage,
        /// Term must be at least one month.
        InvalidTerm,
        /// No free membership number found within the retry budget.
        IdentifierSpaceExhausted,
        /// Caller is not scoped for this operation.
        NotAuthorized,
    }

    #[pallet::event]
    #[pallet::generate_deposit(pub(super) fn deposit_event)]
    pub enum Event<T: Config> {
        /// New customer registered: [id, code].
        CustomerCreated(CustomerId, Vec<u8>),
        /// Customer record changed: [id].
        CustomerUpdated(CustomerId),
        /// Customer soft-deleted: [id, operator].
        CustomerDeactivated(CustomerId, T::AccountId),
        /// Vehicle attached: [customer, vehicle].
        VehicleAdded(CustomerId, VehicleId),
        /// Vehicle soft-deleted: [customer, vehicle].
        VehicleRemoved(CustomerId, VehicleId),
        /// Fresh membership credentials issued: [customer, number].
        MembershipIssued(CustomerId, MembershipNumber),
        /// Coverage extended in place, expiry kept: [customer, number].
        MembershipExtended(CustomerId, MembershipNumber),
        /// Membership deactivated: [customer].
        MembershipDeactivated(CustomerId),
        /// Ledger row appended: [payment, customer, amount].
        MembershipPaymentRecorded(PaymentId, CustomerId, Balance),
    }

    #[pallet::storage]
    #[pallet::getter(fn customer)]
    /// Customer records.
    pub(super) type Customers<T: Config> = StorageMap<_, Twox64Concat, CustomerId, Customer>;

    #[pallet::storage]
    #[pallet::getter(fn next_customer_id)]
    /// Next free customer id.
    pub(super) type NextCustomerId<T: Config> = StorageValue<_, CustomerId, ValueQuery>;

    #[pallet::storage]
    /// Phone uniqueness index over active customers.
    pub(super) type PhoneIndex<T: Config> = StorageMap<_, Blake2_128Concat, Vec<u8>, CustomerId>;

    #[pallet::storage]
    #[pallet::getter(fn customer_by_membership)]
    /// Membership number uniqueness index over active memberships.
    pub(super) type MembershipIndex<T: Config> =
        StorageMap<_, Twox64Concat, MembershipNumber, CustomerId>;

    #[pallet::storage]
    #[pallet::getter(fn membership_payment)]
    /// Append-only membership payment ledger.
    pub(super) type Ledger<T: Config> =
        StorageMap<_, Twox64Concat, PaymentId, MembershipPayment<T::AccountId>>;

    #[pallet::storage]
    #[pallet::getter(fn next_payment_id)]
    /// Next free ledger row id.
    pub(super) type NextPaymentId<T: Config> = StorageValue<_, PaymentId, ValueQuery>;

    #[pallet::storage]
    /// Monotonic salt for credential draws; keeps draws distinct within one
    /// block and across reissues.
    pub(super) type CredentialNonce<T: Config> = StorageValue<_, u64, ValueQuery>;

    #[pallet::pallet]
    #[pallet::without_storage_info]
    pub struct Pallet<T>(PhantomData<T>);

    #[pallet::hooks]
    impl<T: Config> Hooks<BlockNumberFor<T>> for Pallet<T> {}

    #[pallet::call]
    impl<T: Config> Pallet<T> {
        /// Register a customer with an optional initial vehicle list.
        #[pallet::weight(T::WeightInfo::create_customer())]
        #[pallet::call_index(0)]
        pub fn create_customer(
            origin: OriginFor<T>,
            first_name: Vec<u8>,
            last_name: Vec<u8>,
            phone: Vec<u8>,
            email: Option<Vec<u8>>,
            vehicles: Vec<(Vec<u8>, VehicleClass)>,
        ) -> DispatchResultWithPostInfo {
            let sender = ensure_signed(origin)?;
            ensure!(T::Sites::is_staff(&sender), Error::<T>::NotAuthorized);

            let id = Self::insert_customer(first_name, last_name, phone, email, vehicles)?;
            let code = Self::customer(id).map(|c| c.code).unwrap_or_default();
            Self::deposit_event(Event::CustomerCreated(id, code));
            Ok(().into())
        }

        /// Attach a vehicle to a customer.
        #[pallet::weight(T::WeightInfo::add_vehicle())]
        #[pallet::call_index(1)]
        pub fn add_vehicle(
            origin: OriginFor<T>,
            customer: CustomerId,
            plate: Vec<u8>,
            class: VehicleClass,
            make: Vec<u8>,
            model: Vec<u8>,
            color: Vec<u8>,
        ) -> DispatchResultWithPostInfo {
            let sender = ensure_signed(origin)?;
            ensure!(T::Sites::is_staff(&sender), Error::<T>::NotAuthorized);

            let plate = validation::normalize_plate(&plate).ok_or(Error::<T>::InvalidPlate)?;
            let vehicle_id = <Customers<T>>::try_mutate(customer, |record| {
                let record = record.as_mut().ok_or(Error::<T>::CustomerNotFound)?;
                ensure!(
                    record.status == CustomerStatus::Active,
                    Error::<T>::CustomerInactive
                );
                ensure!(
                    record.active_vehicle(&plate).is_none(),
                    Error::<T>::DuplicateVehicle
                );
                let vehicle_id = record.next_vehicle_id;
                record.next_vehicle_id += 1;
                record.vehicles.push(Vehicle {
                    id: vehicle_id,
                    plate,
                    class,
                    make: validation::sanitize(&make),
                    model: validation::sanitize(&model),
                    color: validation::sanitize(&color),
                    active: true,
                    added_at: T::Time::now(),
                });
                Ok::<_, DispatchError>(vehicle_id)
            })?;

            Self::deposit_event(Event::VehicleAdded(customer, vehicle_id));
            Ok(().into())
        }

        /// Soft-delete a vehicle. Refused while a session for its plate is
        /// active.
        #[pallet::weight(T::WeightInfo::remove_vehicle())]
        #[pallet::call_index(2)]
        pub fn remove_vehicle(
            origin: OriginFor<T>,
            customer: CustomerId,
            vehicle: VehicleId,
        ) -> DispatchResultWithPostInfo {
            let sender = ensure_signed(origin)?;
            ensure!(T::Sites::is_staff(&sender), Error::<T>::NotAuthorized);

            <Customers<T>>::try_mutate(customer, |record| -> DispatchResult {
                let record = record.as_mut().ok_or(Error::<T>::CustomerNotFound)?;
                let entry = record
                    .vehicles
                    .iter_mut()
                    .find(|v| v.id == vehicle && v.active)
                    .ok_or(Error::<T>::VehicleNotFound)?;
                ensure!(
                    !T::Bookings::has_active_for_plate(&entry.plate),
                    Error::<T>::VehicleHasActiveBooking
                );
                entry.active = false;
                Ok(())
            })?;

            Self::deposit_event(Event::VehicleRemoved(customer, vehicle));
            Ok(().into())
        }

        /// Soft-delete a customer. Refused while any of their sessions is
        /// active. The phone number is freed for reuse.
        #[pallet::weight(T::WeightInfo::deactivate_customer())]
        #[pallet::call_index(3)]
        pub fn deactivate_customer(
            origin: OriginFor<T>,
            customer: CustomerId,
            reason: Vec<u8>,
        ) -> DispatchResultWithPostInfo {
            let sender = ensure_signed(origin)?;
            ensure!(T::Sites::is_staff(&sender), Error::<T>::NotAuthorized);
            ensure!(
                !T::Bookings::has_active_for_customer(customer),
                Error::<T>::CustomerHasActiveBooking
            );

            <Customers<T>>::try_mutate(customer, |record| -> DispatchResult {
                let record = record.as_mut().ok_or(Error::<T>::CustomerNotFound)?;
                ensure!(
                    record.status == CustomerStatus::Active,
                    Error::<T>::CustomerInactive
                );
                record.status = CustomerStatus::Inactive;
                record.deleted = Some((T::Time::now(), validation::sanitize(&reason)));
                <PhoneIndex<T>>::remove(&record.phone);
                Ok(())
            })?;

            Self::deposit_event(Event::CustomerDeactivated(customer, sender));
            Ok(().into())
        }

        /// Issue, renew or extend a membership and record the payment.
        ///
        /// A request whose coverage is a subset of a current membership is
        /// refused; a proper superset extends coverage in place and keeps
        /// the expiry; anything else issues fresh credentials.
        #[pallet::weight(T::WeightInfo::create_membership())]
        #[pallet::call_index(4)]
        pub fn create_membership(
            origin: OriginFor<T>,
            customer: CustomerId,
            kind: MembershipKind,
            term_months: u32,
            covered: Vec<VehicleClass>,
            amount: Option<Balance>,
            method: PaymentMethod,
            reference: Option<Vec<u8>>,
        ) -> DispatchResultWithPostInfo {
            let sender = ensure_signed(origin)?;
            ensure!(T::Sites::is_staff(&sender), Error::<T>::NotAuthorized);

            Self::issue_membership(
                customer,
                kind,
                term_months,
                covered,
                amount,
                method,
                reference,
                Some(sender),
            )?;
            Ok(().into())
        }

        /// Customer-facing membership purchase: resolves or registers the
        /// customer by phone, then issues like `create_membership`, without
        /// an operator audit trail.
        #[pallet::weight(T::WeightInfo::purchase_membership())]
        #[pallet::call_index(5)]
        pub fn purchase_membership(
            origin: OriginFor<T>,
            phone: Vec<u8>,
            first_name: Vec<u8>,
            last_name: Vec<u8>,
            kind: MembershipKind,
            term_months: u32,
            covered: Vec<VehicleClass>,
            amount: Option<Balance>,
            method: PaymentMethod,
            reference: Option<Vec<u8>>,
        ) -> DispatchResultWithPostInfo {
            let _ = ensure_signed(origin)?;

            let customer = match Self::customer_by_phone(&phone) {
                Some(id) => id,
                None => Self::insert_customer(first_name, last_name, phone, None, Vec::new())?,
            };
            Self::issue_membership(
                customer,
                kind,
                term_months,
                covered,
                amount,
                method,
                reference,
                None,
            )?;
            Ok(().into())
        }

        /// Deactivate a membership; ledger rows are untouched.
        #[pallet::weight(T::WeightInfo::deactivate_membership())]
        #[pallet::call_index(6)]
        pub fn deactivate_membership(
            origin: OriginFor<T>,
            customer: CustomerId,
        ) -> DispatchResultWithPostInfo {
            let sender = ensure_signed(origin)?;
            ensure!(T::Sites::is_staff(&sender), Error::<T>::NotAuthorized);

            <Customers<T>>::try_mutate(customer, |record| -> DispatchResult {
                let record = record.as_mut().ok_or(Error::<T>::CustomerNotFound)?;
                let membership = record.membership.as_mut().ok_or(Error::<T>::NoMembership)?;
                membership.active = false;
                <MembershipIndex<T>>::remove(membership.number);
                Ok(())
            })?;

            Self::deposit_event(Event::MembershipDeactivated(customer));
            Ok(().into())
        }
    }

    impl<T: Config> Pallet<T> {
        /// Active customer id for a phone number.
        pub fn customer_by_phone(phone: &[u8]) -> Option<CustomerId> {
            <PhoneIndex<T>>::get(phone.to_vec())
        }

        fn insert_customer(
            first_name: Vec<u8>,
            last_name: Vec<u8>,
            phone: Vec<u8>,
            email: Option<Vec<u8>>,
            vehicles: Vec<(Vec<u8>, VehicleClass)>,
        ) -> Result<CustomerId, DispatchError> {
            ensure!(validation::phone(&phone), Error::<T>::InvalidPhone);
            ensure!(
                validation::person_name(&first_name)
                    && (last_name.is_empty() || validation::person_name(&last_name)),
                Error::<T>::InvalidName
            );
            if let Some(email) = &email {
                ensure!(validation::email(email), Error::<T>::InvalidEmail);
            }
            ensure!(
                !<PhoneIndex<T>>::contains_key(&phone),
                Error::<T>::DuplicatePhone
            );

            let now = T::Time::now();
            let mut record = Customer {
                code: ids::customer_code(now).to_vec(),
                first_name,
                last_name,
                phone: phone.clone(),
                email,
                vehicles: Vec::new(),
                next_vehicle_id: 0,
                membership: None,
                stats: Default::default(),
                status: CustomerStatus::Active,
                created_at: now,
                deleted: None,
            };
            for (plate, class) in vehicles {
                let plate =
                    validation::normalize_plate(&plate).ok_or(Error::<T>::InvalidPlate)?;
                if record.active_vehicle(&plate).is_some() {
                    continue;
                }
                let id = record.next_vehicle_id;
                record.next_vehicle_id += 1;
                record.vehicles.push(Vehicle {
                    id,
                    plate,
                    class,
                    make: Vec::new(),
                    model: Vec::new(),
                    color: Vec::new(),
                    active: true,
                    added_at: now,
                });
            }

            let id = <NextCustomerId<T>>::get();
            <NextCustomerId<T>>::put(id + 1);
            <PhoneIndex<T>>::insert(&phone, id);
            <Customers<T>>::insert(id, record);
            Ok(id)
        }

        /// Draw entropy for credential generation. The stored nonce keeps
        /// every draw distinct, within a block and across reissues.
        fn credential_seed(customer: CustomerId, salt: &[u8]) -> u64 {
            let nonce = <CredentialNonce<T>>::mutate(|n| {
                *n += 1;
                *n
            });
            let (hash, _) = T::Randomness::random(&(salt, customer, nonce).encode());
            let bytes = hash.as_ref();
            let mut seed = [0u8; 8];
            let take = bytes.len().min(8);
            seed[..take].copy_from_slice(&bytes[..take]);
            u64::from_le_bytes(seed)
        }

        /// A six digit membership number no active membership uses.
        fn free_membership_number(customer: CustomerId) -> Result<MembershipNumber, Error<T>> {
            for _ in 0..T::CredentialRetries::get() {
                let number = ids::six_digit_code(Self::credential_seed(customer, b"member"));
                if !<MembershipIndex<T>>::contains_key(number) {
                    return Ok(number);
                }
            }
            Err(Error::<T>::IdentifierSpaceExhausted)
        }

        #[allow(clippy::too_many_arguments)]
        fn issue_membership(
            customer: CustomerId,
            kind: MembershipKind,
            term_months: u32,
            covered: Vec<VehicleClass>,
            amount: Option<Balance>,
            method: PaymentMethod,
            reference: Option<Vec<u8>>,
            actor: Option<T::AccountId>,
        ) -> DispatchResult {
            ensure!(!covered.is_empty(), Error::<T>::InvalidCoverage);
            ensure!(term_months >= 1, Error::<T>::InvalidTerm);
            let now = T::Time::now();

            let (number, start, expiry, resulting) =
                <Customers<T>>::try_mutate(customer, |record| {
                    let record = record.as_mut().ok_or(Error::<T>::CustomerNotFound)?;
                    ensure!(
                        record.status == CustomerStatus::Active,
                        Error::<T>::CustomerInactive
                    );

                    if let Some(current) =
                        record.membership.as_mut().filter(|m| m.is_current(now))
                    {
                        let subset = covered.iter().all(|c| current.covered.contains(c));
                        ensure!(!subset, Error::<T>::AlreadyCovered);

                        // A request adding classes widens coverage in place;
                        // credentials and expiry are kept.
                        for class in &covered {
                            if !current.covered.contains(class) {
                                current.covered.push(*class);
                            }
                        }
                        let out = (
                            current.number,
                            current.issued_at,
                            current.expires_at,
                            current.covered.clone(),
                        );
                        Self::deposit_event(Event::MembershipExtended(customer, current.number));
                        return Ok::<_, DispatchError>(out);
                    }

                    if let Some(old) = &record.membership {
                        // The index entry may already have been reused after
                        // a deactivation; only drop our own mapping.
                        if <MembershipIndex<T>>::get(old.number) == Some(customer) {
                            <MembershipIndex<T>>::remove(old.number);
                        }
                    }
                    let number = Self::free_membership_number(customer)?;
                    let pin = ids::four_digit_pin(Self::credential_seed(customer, b"pin"));
                    let expires_at = now + term_months as Moment * MONTH_MS;
                    record.membership = Some(Membership {
                        number,
                        pin,
                        kind,
                        covered: covered.clone(),
                        issued_at: now,
                        expires_at,
                        term_months,
                        active: true,
                    });
                    <MembershipIndex<T>>::insert(number, customer);
                    Self::deposit_event(Event::MembershipIssued(customer, number));
                    Ok((number, now, expires_at, covered.clone()))
                })?;

            let record = Self::customer(customer).ok_or(Error::<T>::CustomerNotFound)?;
            let amount = amount.unwrap_or_else(|| kind.default_fee());
            let payment_id = <NextPaymentId<T>>::get();
            <NextPaymentId<T>>::put(payment_id + 1);
            <Ledger<T>>::insert(
                payment_id,
                MembershipPayment {
                    customer,
                    customer_name: record.full_name(),
                    phone: record.phone.clone(),
                    membership_number: number,
                    kind,
                    amount,
                    method,
                    reference,
                    start,
                    expiry,
                    term_months,
                    covered: resulting,
                    status: PaymentStatus::Completed,
                    created_by: actor,
                    created_at: now,
                },
            );
            Self::deposit_event(Event::MembershipPaymentRecorded(payment_id, customer, amount));
            Ok(())
        }

        /// Case-insensitive substring search over customers. Queries shorter
        /// than two bytes return nothing; results cap at fifty.
        pub fn search(query: &[u8], mode: SearchMode) -> Vec<(CustomerId, Customer)> {
            if query.len() < MIN_QUERY_LEN {
                return Vec::new();
            }
            let needle = query.to_ascii_lowercase();
            <Customers<T>>::iter()
                .filter(|(_, c)| {
                    let phone = matches!(mode, SearchMode::Phone | SearchMode::All)
                        && validation::contains_ci(&c.phone, &needle);
                    let name = matches!(mode, SearchMode::Name | SearchMode::All)
                        && validation::contains_ci(&c.full_name(), &needle);
                    let vehicle = matches!(mode, SearchMode::Vehicle | SearchMode::All)
                        && c.vehicles
                            .iter()
                            .any(|v| v.active && validation::contains_ci(&v.plate, &needle));
                    phone || name || vehicle
                })
                .take(SEARCH_RESULT_CAP)
                .collect()
        }
    }

    /// Customer search scope.
    #[derive(PartialEq, Eq, Clone, Copy, Encode, Decode, TypeInfo, RuntimeDebug)]
    pub enum SearchMode {
        Phone,
        Name,
        Vehicle,
        All,
    }

    impl<T: Config> MembershipValidator for Pallet<T> {
        fn validate(
            number: MembershipNumber,
            pin: MembershipPin,
            class: Option<VehicleClass>,
            now: Moment,
        ) -> Option<CustomerId> {
            let customer = <MembershipIndex<T>>::get(number)?;
            let record = Self::customer(customer)?;
            if record.status != CustomerStatus::Active {
                return None;
            }
            let membership = record.membership.as_ref()?;
            let valid = membership.number == number
                && membership.pin == pin
                && membership.is_current(now)
                && class.map_or(true, |c| membership.covered.contains(&c));
            valid.then_some(customer)
        }
    }

    impl<T: Config> CustomerRegistry for Pallet<T> {
        fn resolve_or_create(
            phone: &[u8],
            name: &[u8],
            email: Option<&[u8]>,
            plate: &[u8],
            class: VehicleClass,
        ) -> Result<CustomerLink, DispatchError> {
            let plate = validation::normalize_plate(plate).ok_or(Error::<T>::InvalidPlate)?;
            let (first_name, last_name) = split_name(name);
            ensure!(validation::person_name(&first_name), Error::<T>::InvalidName);

            let mut provided = first_name.clone();
            if !last_name.is_empty() {
                provided.push(b' ');
                provided.extend_from_slice(&last_name);
            }

            if let Some(customer) = Self::customer_by_phone(phone) {
                let mut name_updated = false;
                <Customers<T>>::try_mutate(customer, |record| -> DispatchResult {
                    let record = record.as_mut().ok_or(Error::<T>::CustomerNotFound)?;
                    if record.full_name() != provided {
                        // The operator at the console is authoritative for
                        // the customer's name.
                        record.first_name = first_name.clone();
                        record.last_name = last_name.clone();
                        name_updated = true;
                    }
                    if record.active_vehicle(&plate).is_none() {
                        let id = record.next_vehicle_id;
                        record.next_vehicle_id += 1;
                        record.vehicles.push(Vehicle {
                            id,
                            plate: plate.clone(),
                            class,
                            make: Vec::new(),
                            model: Vec::new(),
                            color: Vec::new(),
                            active: true,
                            added_at: T::Time::now(),
                        });
                    }
                    Ok(())
                })?;
                if name_updated {
                    Self::deposit_event(Event::CustomerUpdated(customer));
                }
                return Ok(CustomerLink {
                    customer,
                    is_new: false,
                    name_updated,
                });
            }

            let customer = Self::insert_customer(
                first_name,
                last_name,
                phone.to_vec(),
                email.map(|e| e.to_vec()),
                Vec::from([(plate, class)]),
            )?;
            Self::deposit_event(Event::CustomerCreated(
                customer,
                Self::customer(customer).map(|c| c.code).unwrap_or_default(),
            ));
            Ok(CustomerLink {
                customer,
                is_new: true,
                name_updated: false,
            })
        }

        fn note_booking(customer: CustomerId, now: Moment) {
            <Customers<T>>::mutate(customer, |record| {
                if let Some(record) = record {
                    record.stats.total_bookings += 1;
                    record.stats.last_booking_at = Some(now);
                }
            });
        }

        fn note_completed(customer: CustomerId, amount: Balance) {
            <Customers<T>>::mutate(customer, |record| {
                if let Some(record) = record {
                    record.stats.total_amount =
                        record.stats.total_amount.saturating_add(amount);
                }
            });
        }
    }

    /// Split a full name at the first space: `"Asha Rao"` becomes
    /// `("Asha", "Rao")`, a single word keeps the family name empty.
    fn split_name(name: &[u8]) -> (Vec<u8>, Vec<u8>) {
        let name = validation::sanitize(name);
        match name.iter().position(|c| *c == b' ') {
            Some(at) => (name[..at].to_vec(), name[at + 1..].to_vec()),
            None => (name, Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests;
