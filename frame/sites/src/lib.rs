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
//! Parknet site registry runtime module.
//!
//! Keeps the registry of parking sites and the operator accounts working
//! them. Every other Parknet module scopes its operations to a site through
//! the [`SiteScope`] trait implemented here: admins bypass scoping, other
//! roles act only on sites they are assigned to.

#![cfg_attr(not(feature = "std"), no_std)]

use codec::{Decode, Encode};
use scale_info::TypeInfo;
use sp_runtime::{Permill, RuntimeDebug};
use sp_std::prelude::*;

use parknet_primitives::{minutes_of_day, weekday, Balance, Moment, SiteId, VehicleClass, HOUR_MS};

pub mod weights;

pub use pallet::*;
pub use weights::WeightInfo;

/// Lifecycle status of a site.
#[derive(PartialEq, Eq, Clone, Copy, Encode, Decode, TypeInfo, RuntimeDebug)]
#[cfg_attr(feature = "std", derive(serde::Serialize, serde::Deserialize))]
pub enum SiteStatus {
    /// Open for business.
    Active,
    /// Soft-deactivated, no new bookings.
    Inactive,
    /// Temporarily closed for service.
    Maintenance,
    /// Announced but not yet operational.
    UnderConstruction,
}

/// Global role of an operator account.
#[derive(PartialEq, Eq, Clone, Copy, Encode, Decode, TypeInfo, RuntimeDebug)]
#[cfg_attr(feature = "std", derive(serde::Serialize, serde::Deserialize))]
pub enum Role {
    /// Network administrator, bypasses site scoping.
    Admin,
    /// Shift supervisor.
    Supervisor,
    /// Console operator.
    Operator,
}

/// Site-level role carried by an assignment; overrides the global role for
/// operations scoped to that site.
#[derive(PartialEq, Eq, Clone, Copy, Encode, Decode, TypeInfo, RuntimeDebug)]
#[cfg_attr(feature = "std", derive(serde::Serialize, serde::Deserialize))]
pub enum SiteRole {
    /// Full control of the site.
    SiteAdmin,
    /// Supervises the site.
    Supervisor,
    /// Operates the site consoles.
    Operator,
}

/// Account status of an operator.
#[derive(PartialEq, Eq, Clone, Copy, Encode, Decode, TypeInfo, RuntimeDebug)]
#[cfg_attr(feature = "std", derive(serde::Serialize, serde::Deserialize))]
pub enum OperatorStatus {
    /// May act.
    Active,
    /// Left the network.
    Inactive,
    /// Temporarily barred.
    Suspended,
}

/// Fine-grained permission attached to a site assignment.
#[derive(PartialEq, Eq, Clone, Copy, Encode, Decode, TypeInfo, RuntimeDebug)]
#[cfg_attr(feature = "std", derive(serde::Serialize, serde::Deserialize))]
pub enum Permission {
    ManageBookings,
    ManageMachines,
    ManageCustomers,
    ViewReports,
    ManageOperators,
}

/// Opening window for one weekday, minutes since local midnight.
#[derive(PartialEq, Eq, Clone, Copy, Encode, Decode, TypeInfo, RuntimeDebug)]
#[cfg_attr(feature = "std", derive(serde::Serialize, serde::Deserialize))]
pub struct DayHours {
    /// Whether the site opens at all this day.
    pub open: bool,
    /// Opening time.
    pub opens_at: u16,
    /// Closing time.
    pub closes_at: u16,
}

impl Default for DayHours {
    fn default() -> Self {
        // Around the clock.
        Self {
            open: true,
            opens_at: 0,
            closes_at: 24 * 60,
        }
    }
}

/// Tariff for one vehicle class.
#[derive(PartialEq, Eq, Clone, Copy, Default, Encode, Decode, TypeInfo, RuntimeDebug)]
#[cfg_attr(feature = "std", derive(serde::Serialize, serde::Deserialize))]
pub struct RatePlan {
    /// Charge per started hour.
    pub base_rate: Balance,
    /// Floor for any completed session.
    pub minimum_charge: Balance,
}

/// Site pricing block; machines may carry an override.
#[derive(PartialEq, Eq, Clone, Copy, Default, Encode, Decode, TypeInfo, RuntimeDebug)]
#[cfg_attr(feature = "std", derive(serde::Serialize, serde::Deserialize))]
pub struct PricingPolicy {
    /// Two-wheeler tariff.
    pub two_wheeler: RatePlan,
    /// Four-wheeler tariff.
    pub four_wheeler: RatePlan,
    /// Extra fraction charged inside the peak window.
    pub peak_surcharge: Permill,
    /// Peak window start, minutes since midnight.
    pub peak_start: u16,
    /// Peak window end, minutes since midnight.
    pub peak_end: u16,
}

impl PricingPolicy {
    /// Tariff for the given vehicle class.
    pub fn plan(&self, class: VehicleClass) -> &RatePlan {
        match class {
            VehicleClass::TwoWheeler => &self.two_wheeler,
            VehicleClass::FourWheeler => &self.four_wheeler,
        }
    }

    /// Whether the minute-of-day falls inside the peak window. A window with
    /// `start > end` wraps over midnight.
    pub fn is_peak(&self, minute: u16) -> bool {
        if self.peak_start == self.peak_end {
            false
        } else if self.peak_start < self.peak_end {
            (self.peak_start..self.peak_end).contains(&minute)
        } else {
            minute >= self.peak_start || minute < self.peak_end
        }
    }

    /// Charge for a session of `duration_ms`, started at `started_minute` of
    /// the day. Every started hour is billed.
    pub fn charge(&self, class: VehicleClass, duration_ms: Moment, started_minute: u16) -> Balance {
        let plan = self.plan(class);
        let hours = ((duration_ms + HOUR_MS - 1) / HOUR_MS).max(1);
        let mut amount = plan.base_rate.saturating_mul(hours as Balance);
        if self.is_peak(started_minute) {
            amount = amount.saturating_add(self.peak_surcharge * amount);
        }
        amount.max(plan.minimum_charge)
    }
}

/// Geodetic coordinates in microdegrees.
#[derive(PartialEq, Eq, Clone, Copy, Encode, Decode, TypeInfo, RuntimeDebug)]
#[cfg_attr(feature = "std", derive(serde::Serialize, serde::Deserialize))]
pub struct GeoPoint {
    pub latitude: i32,
    pub longitude: i32,
}

/// Postal address of a site.
#[derive(PartialEq, Eq, Clone, Default, Encode, Decode, TypeInfo, RuntimeDebug)]
#[cfg_attr(feature = "std", derive(serde::Serialize, serde::Deserialize))]
pub struct PostalAddress {
    pub line: Vec<u8>,
    pub city: Vec<u8>,
    pub state: Vec<u8>,
    /// Six digit postal code, leading digit non-zero.
    pub pincode: Vec<u8>,
}

/// A parking site record.
#[derive(PartialEq, Eq, Clone, Encode, Decode, TypeInfo, RuntimeDebug)]
pub struct Site {
    /// Human code, `SITE` followed by 3-6 digits, globally unique.
    pub code: Vec<u8>,
    /// Display name.
    pub name: Vec<u8>,
    /// Postal address.
    pub address: PostalAddress,
    /// Optional coordinates.
    pub location: Option<GeoPoint>,
    /// Opening windows, Monday first.
    pub hours: [DayHours; 7],
    /// Default pricing for machines at this site.
    pub pricing: PricingPolicy,
    /// Operator-declared machine count, advisory.
    pub declared_machines: u32,
    /// Operator-declared vehicle capacity, advisory. The authoritative
    /// capacity is the sum over the site's machine pallets.
    pub declared_capacity: u32,
    /// Lifecycle status.
    pub status: SiteStatus,
    /// Registration timestamp.
    pub created_at: Moment,
}

impl Site {
    /// Whether the site is open at the given moment.
    pub fn is_open(&self, now: Moment) -> bool {
        let day = &self.hours[weekday(now)];
        let minute = minutes_of_day(now);
        day.open && (day.opens_at..day.closes_at).contains(&minute)
    }
}

/// One site a user works, with the role they hold there.
#[derive(PartialEq, Eq, Clone, Encode, Decode, TypeInfo, RuntimeDebug)]
pub struct SiteAssignment {
    /// The site.
    pub site: SiteId,
    /// Role held at this site.
    pub role: SiteRole,
    /// Extra permissions granted at this site.
    pub permissions: Vec<Permission>,
}

/// An operator account record.
#[derive(PartialEq, Eq, Clone, Encode, Decode, TypeInfo, RuntimeDebug)]
pub struct Operator {
    /// Human id, `OP` followed by 3-6 digits, globally unique.
    pub operator_id: Vec<u8>,
    /// Display name.
    pub name: Vec<u8>,
    /// Global role.
    pub role: Role,
    /// Account status.
    pub status: OperatorStatus,
    /// Sites this operator works.
    pub assignments: Vec<SiteAssignment>,
    /// Default site for operations without an explicit site context.
    pub primary_site: Option<SiteId>,
    /// Registration timestamp.
    pub registered_at: Moment,
}

impl Operator {
    /// Whether the account may act at all.
    pub fn is_active(&self) -> bool {
        self.status == OperatorStatus::Active
    }

    /// Assignment record for the given site.
    pub fn assignment(&self, site: SiteId) -> Option<&SiteAssignment> {
        self.assignments.iter().find(|a| a.site == site)
    }

    /// Whether the site is in the operator's scope: assigned or primary.
    pub fn covers(&self, site: SiteId) -> bool {
        self.primary_site == Some(site) || self.assignment(site).is_some()
    }

    /// Site used when the caller gives no explicit site context.
    pub fn default_site(&self) -> Option<SiteId> {
        self.primary_site
            .or_else(|| self.assignments.first().map(|a| a.site))
    }
}

/// Booking counters a site statistics query aggregates.
#[derive(PartialEq, Eq, Clone, Copy, Default, Encode, Decode, TypeInfo, RuntimeDebug)]
pub struct BookingTotals {
    /// All bookings ever taken at the site.
    pub total: u32,
    /// Bookings started since local midnight.
    pub today: u32,
    /// Currently active sessions.
    pub active: u32,
    /// Revenue over all completed bookings.
    pub revenue_total: Balance,
    /// Revenue over bookings completed since local midnight.
    pub revenue_today: Balance,
}

/// On-demand statistics for one site.
#[derive(PartialEq, Eq, Clone, Copy, Default, Encode, Decode, TypeInfo, RuntimeDebug)]
pub struct SiteStatistics {
    /// Machines bound to the site.
    pub machines_total: u32,
    /// Machines with a live heartbeat.
    pub machines_online: u32,
    /// Booking counters.
    pub bookings: BookingTotals,
}

/// Authorization envelope every Parknet module applies before touching
/// site-scoped state.
pub trait SiteScope<AccountId> {
    /// The account holds the global admin role.
    fn is_admin(who: &AccountId) -> bool;
    /// The account is an active operator of any role. Site-independent
    /// resources (customers, memberships) require no more.
    fn is_staff(who: &AccountId) -> bool;
    /// The account may read resources of the site.
    fn can_access(who: &AccountId, site: SiteId) -> bool;
    /// The account may mutate bookings and machines of the site.
    fn can_operate(who: &AccountId, site: SiteId) -> bool;
    /// The account supervises the site (booking extensions and the like).
    fn can_supervise(who: &AccountId, site: SiteId) -> bool;
    /// The account administers the site itself.
    fn can_manage(who: &AccountId, site: SiteId) -> bool;
    /// Site used for the account when no explicit context is given.
    fn default_site(who: &AccountId) -> Option<SiteId>;
    /// The site exists.
    fn site_exists(site: SiteId) -> bool;
    /// The site exists and is active.
    fn site_active(site: SiteId) -> bool;
}

/// Facts the site registry needs from the machine engine.
pub trait SiteMachines {
    /// Machines at the site: `(total, online at the given moment)`.
    fn machine_count(site: SiteId, now: Moment) -> (u32, u32);
    /// Vehicles currently parked across the site's machines.
    fn occupied_count(site: SiteId) -> u32;
    /// Force every machine of the site offline; returns how many changed.
    fn force_offline(site: SiteId, now: Moment) -> u32;
    /// Remove every machine of the site; returns how many were dropped.
    fn purge_site(site: SiteId) -> u32;
}

impl SiteMachines for () {
    fn machine_count(_: SiteId, _: Moment) -> (u32, u32) {
        (0, 0)
    }
    fn occupied_count(_: SiteId) -> u32 {
        0
    }
    fn force_offline(_: SiteId, _: Moment) -> u32 {
        0
    }
    fn purge_site(_: SiteId) -> u32 {
        0
    }
}

/// Facts the site registry needs from the booking engine.
pub trait SiteBookings {
    /// Currently active sessions at the site.
    fn active_count(site: SiteId) -> u32;
    /// Remove every booking of the site; returns how many were dropped.
    fn purge_site(site: SiteId) -> u32;
    /// Aggregate booking counters; `day_start` is local midnight.
    fn totals(site: SiteId, day_start: Moment) -> BookingTotals;
}

impl SiteBookings for () {
    fn active_count(_: SiteId) -> u32 {
        0
    }
    fn purge_site(_: SiteId) -> u32 {
        0
    }
    fn totals(_: SiteId, _: Moment) -> BookingTotals {
        Default::default()
    }
}

#[frame_support::pallet]
pub mod pallet {
    use super::*;
    use frame_support::{pallet_prelude::*, traits::Time};
    use frame_system::pallet_prelude::*;
    use parknet_primitives::{validation, DAY_MS};

    #[pallet::config]
    pub trait Config: frame_system::Config {
        /// Current time source.
        type Time: Time<Moment = Moment>;
        /// Machine engine collaborator.
        type Machines: SiteMachines;
        /// Booking engine collaborator.
        type Bookings: SiteBookings;
        /// The overarching event type.
        type RuntimeEvent: From<Event<Self>> + IsType<<Self as frame_system::Config>::RuntimeEvent>;
        /// Extrinsic weights.
        type WeightInfo: WeightInfo;
    }

    #[pallet::error]
    pub enum Error<T> {
        /// No site with this id.
        SiteNotFound,
        /// Site code does not match `SITE` + 3-6 digits.
        InvalidSiteCode,
        /// Site name is empty or oversized.
        InvalidSiteName,
        /// Postal pincode is malformed.
        InvalidPincode,
        /// Another site already uses this code.
        DuplicateSiteCode,
        /// The site still has active bookings.
        SiteHasActiveBookings,
        /// The site still owns machines or bookings and `force` was not given.
        SiteNotEmpty,
        /// The requested status change is not a soft transition.
        InvalidStatusChange,
        /// Caller is not scoped for this operation.
        NotAuthorized,
        /// No operator record for this account.
        OperatorNotFound,
        /// Operator id does not match `OP` + 3-6 digits.
        InvalidOperatorId,
        /// Operator name must be letters and spaces, at most 100 bytes.
        InvalidOperatorName,
        /// Another account already uses this operator id.
        DuplicateOperatorId,
        /// The operator is not assigned to this site.
        OperatorNotAssigned,
    }

    #[pallet::event]
    #[pallet::generate_deposit(pub(super) fn deposit_event)]
    pub enum Event<T: Config> {
        /// New site registered: [id, code].
        SiteCreated(SiteId, Vec<u8>),
        /// Site attributes updated: [id].
        SiteUpdated(SiteId),
        /// Site soft status changed: [id, status].
        SiteStatusChanged(SiteId, SiteStatus),
        /// Site deactivated, machines forced offline: [id, machines].
        SiteDeactivated(SiteId, u32),
        /// Site removed with its machines and bookings: [id, machines, bookings].
        SiteRemoved(SiteId, u32, u32),
        /// New operator account registered: [account, role].
        OperatorRegistered(T::AccountId, Role),
        /// Operator account status changed: [account, status].
        OperatorStatusChanged(T::AccountId, OperatorStatus),
        /// Operator assigned to a site: [account, site, role].
        OperatorAssigned(T::AccountId, SiteId, SiteRole),
        /// Operator assignment removed: [account, site].
        OperatorUnassigned(T::AccountId, SiteId),
    }

    #[pallet::storage]
    #[pallet::getter(fn site)]
    /// Site registry.
    pub(super) type Sites<T: Config> = StorageMap<_, Twox64Concat, SiteId, Site>;

    #[pallet::storage]
    #[pallet::getter(fn next_site_id)]
    /// Next free site id.
    pub(super) type NextSiteId<T: Config> = StorageValue<_, SiteId, ValueQuery>;

    #[pallet::storage]
    #[pallet::getter(fn site_by_code)]
    /// Site code uniqueness index.
    pub(super) type SiteCodes<T: Config> = StorageMap<_, Blake2_128Concat, Vec<u8>, SiteId>;

    #[pallet::storage]
    #[pallet::getter(fn operator)]
    /// Operator accounts.
    pub(super) type Operators<T: Config> =
        StorageMap<_, Twox64Concat, T::AccountId, Operator>;

    #[pallet::storage]
    #[pallet::getter(fn account_by_operator_id)]
    /// Operator id uniqueness index.
    pub(super) type OperatorIds<T: Config> =
        StorageMap<_, Blake2_128Concat, Vec<u8>, T::AccountId>;

    #[pallet::pallet]
    #[pallet::without_storage_info]
    pub struct Pallet<T>(PhantomData<T>);

    #[pallet::hooks]
    impl<T: Config> Hooks<BlockNumberFor<T>> for Pallet<T> {}

    #[pallet::call]
    impl<T: Config> Pallet<T> {
        /// Register a new site.
        ///
        /// The dispatch origin must be root or a network admin.
        #[pallet::weight(T::WeightInfo::create_site())]
        #[pallet::call_index(0)]
        pub fn create_site(
            origin: OriginFor<T>,
            code: Vec<u8>,
            name: Vec<u8>,
            address: PostalAddress,
            location: Option<GeoPoint>,
            hours: [DayHours; 7],
            pricing: PricingPolicy,
            declared_machines: u32,
            declared_capacity: u32,
        ) -> DispatchResultWithPostInfo {
            Self::ensure_admin_or_root(origin)?;

            ensure!(validation::site_code(&code), Error::<T>::InvalidSiteCode);
            ensure!(
                validation::pincode(&address.pincode),
                Error::<T>::InvalidPincode
            );
            ensure!(
                !<SiteCodes<T>>::contains_key(&code),
                Error::<T>::DuplicateSiteCode
            );
            let name = validation::sanitize(&name);
            ensure!(!name.is_empty(), Error::<T>::InvalidSiteName);

            let id = <NextSiteId<T>>::get();
            <NextSiteId<T>>::put(id + 1);
            <SiteCodes<T>>::insert(&code, id);
            <Sites<T>>::insert(
                id,
                Site {
                    code: code.clone(),
                    name,
                    address,
                    location,
                    hours,
                    pricing,
                    declared_machines,
                    declared_capacity,
                    status: SiteStatus::Active,
                    created_at: T::Time::now(),
                },
            );

            Self::deposit_event(Event::SiteCreated(id, code));
            Ok(().into())
        }

        /// Update site attributes. Fields left `None` are kept.
        ///
        /// The dispatch origin must be an admin or hold a site-admin or
        /// supervisor role at the site.
        #[pallet::weight(T::WeightInfo::update_site())]
        #[pallet::call_index(1)]
        pub fn update_site(
            origin: OriginFor<T>,
            site: SiteId,
            name: Option<Vec<u8>>,
            address: Option<PostalAddress>,
            location: Option<GeoPoint>,
            hours: Option<[DayHours; 7]>,
            pricing: Option<PricingPolicy>,
            declared_machines: Option<u32>,
            declared_capacity: Option<u32>,
        ) -> DispatchResultWithPostInfo {
            let sender = ensure_signed(origin)?;
            ensure!(Self::can_manage(&sender, site), Error::<T>::NotAuthorized);

            let mut record = Self::site(site).ok_or(Error::<T>::SiteNotFound)?;
            if let Some(name) = name {
                let name = validation::sanitize(&name);
                ensure!(!name.is_empty(), Error::<T>::InvalidSiteName);
                record.name = name;
            }
            if let Some(address) = address {
                ensure!(
                    validation::pincode(&address.pincode),
                    Error::<T>::InvalidPincode
                );
                record.address = address;
            }
            if let Some(location) = location {
                record.location = Some(location);
            }
            if let Some(hours) = hours {
                record.hours = hours;
            }
            if let Some(pricing) = pricing {
                record.pricing = pricing;
            }
            if let Some(declared_machines) = declared_machines {
                record.declared_machines = declared_machines;
            }
            if let Some(declared_capacity) = declared_capacity {
                record.declared_capacity = declared_capacity;
            }
            <Sites<T>>::insert(site, record);

            Self::deposit_event(Event::SiteUpdated(site));
            Ok(().into())
        }

        /// Move a site between the soft statuses `Active`, `Maintenance` and
        /// `UnderConstruction`. Deactivation has its own guarded call.
        #[pallet::weight(T::WeightInfo::set_site_status())]
        #[pallet::call_index(2)]
        pub fn set_site_status(
            origin: OriginFor<T>,
            site: SiteId,
            status: SiteStatus,
        ) -> DispatchResultWithPostInfo {
            let sender = ensure_signed(origin)?;
            ensure!(Self::can_manage(&sender, site), Error::<T>::NotAuthorized);
            ensure!(
                status != SiteStatus::Inactive,
                Error::<T>::InvalidStatusChange
            );

            <Sites<T>>::try_mutate(site, |record| -> DispatchResult {
                let record = record.as_mut().ok_or(Error::<T>::SiteNotFound)?;
                record.status = status;
                Ok(())
            })?;

            Self::deposit_event(Event::SiteStatusChanged(site, status));
            Ok(().into())
        }

        /// Soft-deactivate a site once every booking at it is terminal.
        /// All machines of the site are forced offline.
        #[pallet::weight(T::WeightInfo::deactivate_site())]
        #[pallet::call_index(3)]
        pub fn deactivate_site(origin: OriginFor<T>, site: SiteId) -> DispatchResultWithPostInfo {
            let sender = ensure_signed(origin)?;
            ensure!(Self::can_manage(&sender, site), Error::<T>::NotAuthorized);
            ensure!(
                T::Bookings::active_count(site) == 0,
                Error::<T>::SiteHasActiveBookings
            );

            <Sites<T>>::try_mutate(site, |record| -> DispatchResult {
                let record = record.as_mut().ok_or(Error::<T>::SiteNotFound)?;
                record.status = SiteStatus::Inactive;
                Ok(())
            })?;
            let offlined = T::Machines::force_offline(site, T::Time::now());

            Self::deposit_event(Event::SiteDeactivated(site, offlined));
            Ok(().into())
        }

        /// Permanently remove a site. Without `force` the site must own no
        /// machines and no bookings; with `force` both are dropped. Either
        /// way the site is stripped from all operator assignments.
        ///
        /// The dispatch origin must be root or a network admin.
        #[pallet::weight(T::WeightInfo::delete_site())]
        #[pallet::call_index(4)]
        pub fn delete_site(
            origin: OriginFor<T>,
            site: SiteId,
            force: bool,
        ) -> DispatchResultWithPostInfo {
            Self::ensure_admin_or_root(origin)?;

            let record = Self::site(site).ok_or(Error::<T>::SiteNotFound)?;
            let now = T::Time::now();
            let (machines, _) = T::Machines::machine_count(site, now);
            let bookings_active = T::Bookings::active_count(site);
            if !force {
                ensure!(machines == 0 && bookings_active == 0, Error::<T>::SiteNotEmpty);
            }

            let machines_purged = T::Machines::purge_site(site);
            let bookings_purged = T::Bookings::purge_site(site);
            if machines_purged > 0 || bookings_purged > 0 {
                log::warn!(
                    target: "runtime::sites",
                    "force-deleting site {site}: dropped {machines_purged} machines, {bookings_purged} bookings",
                );
            }

            <SiteCodes<T>>::remove(&record.code);
            <Sites<T>>::remove(site);
            <Operators<T>>::translate(|_, mut operator: Operator| {
                operator.assignments.retain(|a| a.site != site);
                if operator.primary_site == Some(site) {
                    operator.primary_site = operator.assignments.first().map(|a| a.site);
                }
                Some(operator)
            });

            Self::deposit_event(Event::SiteRemoved(site, machines_purged, bookings_purged));
            Ok(().into())
        }

        /// Register an operator account.
        ///
        /// The dispatch origin must be root or a network admin.
        #[pallet::weight(T::WeightInfo::register_operator())]
        #[pallet::call_index(5)]
        pub fn register_operator(
            origin: OriginFor<T>,
            account: T::AccountId,
            operator_id: Vec<u8>,
            name: Vec<u8>,
            role: Role,
        ) -> DispatchResultWithPostInfo {
            Self::ensure_admin_or_root(origin)?;

            ensure!(
                validation::operator_id(&operator_id),
                Error::<T>::InvalidOperatorId
            );
            ensure!(
                validation::person_name(&name),
                Error::<T>::InvalidOperatorName
            );
            ensure!(
                !<OperatorIds<T>>::contains_key(&operator_id),
                Error::<T>::DuplicateOperatorId
            );

            <OperatorIds<T>>::insert(&operator_id, &account);
            <Operators<T>>::insert(
                &account,
                Operator {
                    operator_id,
                    name,
                    role,
                    status: OperatorStatus::Active,
                    assignments: Vec::new(),
                    primary_site: None,
                    registered_at: T::Time::now(),
                },
            );

            Self::deposit_event(Event::OperatorRegistered(account, role));
            Ok(().into())
        }

        /// Change an operator account status.
        ///
        /// The dispatch origin must be root or a network admin.
        #[pallet::weight(T::WeightInfo::set_operator_status())]
        #[pallet::call_index(6)]
        pub fn set_operator_status(
            origin: OriginFor<T>,
            account: T::AccountId,
            status: OperatorStatus,
        ) -> DispatchResultWithPostInfo {
            Self::ensure_admin_or_root(origin)?;

            <Operators<T>>::try_mutate(&account, |record| -> DispatchResult {
                let record = record.as_mut().ok_or(Error::<T>::OperatorNotFound)?;
                record.status = status;
                Ok(())
            })?;

            Self::deposit_event(Event::OperatorStatusChanged(account, status));
            Ok(().into())
        }

        /// Assign an operator to a site, or update an existing assignment in
        /// place. The first assignment becomes the operator's primary site.
        #[pallet::weight(T::WeightInfo::assign_operator())]
        #[pallet::call_index(7)]
        pub fn assign_operator(
            origin: OriginFor<T>,
            account: T::AccountId,
            site: SiteId,
            role: SiteRole,
            permissions: Vec<Permission>,
        ) -> DispatchResultWithPostInfo {
            let sender = ensure_signed(origin)?;
            ensure!(Self::can_manage(&sender, site), Error::<T>::NotAuthorized);
            ensure!(<Sites<T>>::contains_key(site), Error::<T>::SiteNotFound);

            <Operators<T>>::try_mutate(&account, |record| -> DispatchResult {
                let record = record.as_mut().ok_or(Error::<T>::OperatorNotFound)?;
                match record.assignments.iter_mut().find(|a| a.site == site) {
                    Some(assignment) => {
                        assignment.role = role;
                        assignment.permissions = permissions.clone();
                    }
                    None => record.assignments.push(SiteAssignment {
                        site,
                        role,
                        permissions: permissions.clone(),
                    }),
                }
                if record.primary_site.is_none() {
                    record.primary_site = Some(site);
                }
                Ok(())
            })?;

            Self::deposit_event(Event::OperatorAssigned(account, site, role));
            Ok(().into())
        }

        /// Remove an operator's site assignment. A matching primary site
        /// falls back to the first remaining assignment.
        #[pallet::weight(T::WeightInfo::unassign_operator())]
        #[pallet::call_index(8)]
        pub fn unassign_operator(
            origin: OriginFor<T>,
            account: T::AccountId,
            site: SiteId,
        ) -> DispatchResultWithPostInfo {
            let sender = ensure_signed(origin)?;
            ensure!(Self::can_manage(&sender, site), Error::<T>::NotAuthorized);

            <Operators<T>>::try_mutate(&account, |record| -> DispatchResult {
                let record = record.as_mut().ok_or(Error::<T>::OperatorNotFound)?;
                let before = record.assignments.len();
                record.assignments.retain(|a| a.site != site);
                ensure!(
                    record.assignments.len() < before,
                    Error::<T>::OperatorNotAssigned
                );
                if record.primary_site == Some(site) {
                    record.primary_site = record.assignments.first().map(|a| a.site);
                }
                Ok(())
            })?;

            Self::deposit_event(Event::OperatorUnassigned(account, site));
            Ok(().into())
        }
    }

    impl<T: Config> Pallet<T> {
        /// Root, or a signed account holding the global admin role.
        fn ensure_admin_or_root(origin: OriginFor<T>) -> DispatchResult {
            if let Some(who) = frame_system::ensure_signed_or_root(origin)? {
                ensure!(
                    <Self as SiteScope<T::AccountId>>::is_admin(&who),
                    Error::<T>::NotAuthorized
                );
            }
            Ok(())
        }

        /// Active operator record for the account.
        fn active_operator(who: &T::AccountId) -> Option<Operator> {
            Self::operator(who).filter(Operator::is_active)
        }

        /// On-demand counters for one site.
        pub fn site_statistics(site: SiteId) -> Option<SiteStatistics> {
            Self::site(site)?;
            let now = T::Time::now();
            let day_start = now - now % DAY_MS;
            let (machines_total, machines_online) = T::Machines::machine_count(site, now);
            Some(SiteStatistics {
                machines_total,
                machines_online,
                bookings: T::Bookings::totals(site, day_start),
            })
        }
    }

    impl<T: Config> SiteScope<T::AccountId> for Pallet<T> {
        fn is_admin(who: &T::AccountId) -> bool {
            Self::active_operator(who).map_or(false, |op| op.role == Role::Admin)
        }

        fn is_staff(who: &T::AccountId) -> bool {
            Self::active_operator(who).is_some()
        }

        fn can_access(who: &T::AccountId, site: SiteId) -> bool {
            Self::active_operator(who)
                .map_or(false, |op| op.role == Role::Admin || op.covers(site))
        }

        fn can_operate(who: &T::AccountId, site: SiteId) -> bool {
            // Every global role may work bookings and machines, scoped to
            // the operator's sites.
            Self::can_access(who, site)
        }

        fn can_supervise(who: &T::AccountId, site: SiteId) -> bool {
            Self::active_operator(who).map_or(false, |op| {
                op.role == Role::Admin
                    || (op.covers(site)
                        && (op.role == Role::Supervisor
                            || op.assignment(site).map_or(false, |a| {
                                matches!(a.role, SiteRole::SiteAdmin | SiteRole::Supervisor)
                            })))
            })
        }

        fn can_manage(who: &T::AccountId, site: SiteId) -> bool {
            Self::active_operator(who).map_or(false, |op| {
                op.role == Role::Admin
                    || op.assignment(site).map_or(false, |a| {
                        matches!(a.role, SiteRole::SiteAdmin | SiteRole::Supervisor)
                    })
            })
        }

        fn default_site(who: &T::AccountId) -> Option<SiteId> {
            Self::active_operator(who).and_then(|op| op.default_site())
        }

        fn site_exists(site: SiteId) -> bool {
            <Sites<T>>::contains_key(site)
        }

        fn site_active(site: SiteId) -> bool {
            Self::site(site).map_or(false, |s| s.status == SiteStatus::Active)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{self as sites};
    use frame_support::{assert_err, assert_ok, parameter_types};
    use sp_runtime::{traits::IdentityLookup, BuildStorage, DispatchError};
    use std::cell::RefCell;

    type Block = frame_system::mocking::MockBlock<Runtime>;

    frame_support::construct_runtime!(
        pub enum Runtime {
            System: frame_system,
            Timestamp: pallet_timestamp,
            Sites: sites,
        }
    );

    parameter_types! {
        pub const BlockHashCount: u64 = 250;
    }

    impl frame_system::Config for Runtime {
        type RuntimeOrigin = RuntimeOrigin;
        type RuntimeCall = RuntimeCall;
        type Nonce = u64;
        type Block = Block;
        type Hash = sp_core::H256;
        type Hashing = sp_runtime::traits::BlakeTwo256;
        type AccountId = u64;
        type Lookup = IdentityLookup<Self::AccountId>;
        type RuntimeEvent = RuntimeEvent;
        type BlockHashCount = BlockHashCount;
        type Version = ();
        type PalletInfo = PalletInfo;
        type AccountData = ();
        type OnNewAccount = ();
        type OnKilledAccount = ();
        type DbWeight = ();
        type BaseCallFilter = frame_support::traits::Everything;
        type SystemWeightInfo = ();
        type BlockWeights = ();
        type BlockLength = ();
        type SS58Prefix = ();
        type OnSetCode = ();
        type MaxConsumers = frame_support::traits::ConstU32<16>;
    }

    impl pallet_timestamp::Config for Runtime {
        type Moment = u64;
        type OnTimestampSet = ();
        type MinimumPeriod = ();
        type WeightInfo = ();
    }

    thread_local! {
        static ACTIVE_BOOKINGS: RefCell<u32> = RefCell::new(0);
        static MACHINES: RefCell<u32> = RefCell::new(0);
    }

    pub struct TestMachines;
    impl SiteMachines for TestMachines {
        fn machine_count(_: SiteId, _: Moment) -> (u32, u32) {
            (MACHINES.with(|m| *m.borrow()), 0)
        }
        fn occupied_count(_: SiteId) -> u32 {
            0
        }
        fn force_offline(_: SiteId, _: Moment) -> u32 {
            MACHINES.with(|m| *m.borrow())
        }
        fn purge_site(_: SiteId) -> u32 {
            MACHINES.with(|m| m.replace(0))
        }
    }

    pub struct TestBookings;
    impl SiteBookings for TestBookings {
        fn active_count(_: SiteId) -> u32 {
            ACTIVE_BOOKINGS.with(|b| *b.borrow())
        }
        fn purge_site(_: SiteId) -> u32 {
            ACTIVE_BOOKINGS.with(|b| b.replace(0))
        }
        fn totals(_: SiteId, _: Moment) -> BookingTotals {
            BookingTotals {
                active: ACTIVE_BOOKINGS.with(|b| *b.borrow()),
                ..Default::default()
            }
        }
    }

    impl Config for Runtime {
        type Time = Timestamp;
        type Machines = TestMachines;
        type Bookings = TestBookings;
        type RuntimeEvent = RuntimeEvent;
        type WeightInfo = ();
    }

    const ADMIN: u64 = 1;
    const SUPERVISOR: u64 = 2;
    const OPERATOR: u64 = 3;
    const OUTSIDER: u64 = 4;

    fn new_test_ext() -> sp_io::TestExternalities {
        ACTIVE_BOOKINGS.with(|b| *b.borrow_mut() = 0);
        MACHINES.with(|m| *m.borrow_mut() = 0);
        let storage = frame_system::GenesisConfig::<Runtime>::default()
            .build_storage()
            .unwrap();
        storage.into()
    }

    fn register_staff() {
        assert_ok!(Sites::register_operator(
            RuntimeOrigin::root(),
            ADMIN,
            b"OP001".to_vec(),
            b"Asha Rao".to_vec(),
            Role::Admin,
        ));
        assert_ok!(Sites::register_operator(
            RuntimeOrigin::signed(ADMIN),
            SUPERVISOR,
            b"OP002".to_vec(),
            b"Vikram Shetty".to_vec(),
            Role::Supervisor,
        ));
        assert_ok!(Sites::register_operator(
            RuntimeOrigin::signed(ADMIN),
            OPERATOR,
            b"OP003".to_vec(),
            b"Neha Kulkarni".to_vec(),
            Role::Operator,
        ));
    }

    fn create_site(code: &[u8]) -> SiteId {
        let id = Sites::next_site_id();
        assert_ok!(Sites::create_site(
            RuntimeOrigin::signed(ADMIN),
            code.to_vec(),
            b"Indiranagar Tower".to_vec(),
            PostalAddress {
                line: b"100 Feet Road".to_vec(),
                city: b"Bengaluru".to_vec(),
                state: b"Karnataka".to_vec(),
                pincode: b"560038".to_vec(),
            },
            None,
            Default::default(),
            Default::default(),
            2,
            16,
        ));
        id
    }

    #[test]
    fn test_register_operator() {
        new_test_ext().execute_with(|| {
            assert_err!(
                Sites::register_operator(
                    RuntimeOrigin::signed(OUTSIDER),
                    ADMIN,
                    b"OP001".to_vec(),
                    b"Asha Rao".to_vec(),
                    Role::Admin,
                ),
                Error::<Runtime>::NotAuthorized
            );
            register_staff();
            assert_eq!(Sites::operator(ADMIN).unwrap().role, Role::Admin);
            assert_eq!(Sites::account_by_operator_id(b"OP002".to_vec()), Some(SUPERVISOR));

            assert_err!(
                Sites::register_operator(
                    RuntimeOrigin::signed(ADMIN),
                    OUTSIDER,
                    b"OP001".to_vec(),
                    b"Dup Id".to_vec(),
                    Role::Operator,
                ),
                Error::<Runtime>::DuplicateOperatorId
            );
            assert_err!(
                Sites::register_operator(
                    RuntimeOrigin::signed(ADMIN),
                    OUTSIDER,
                    b"OPX".to_vec(),
                    b"Bad Id".to_vec(),
                    Role::Operator,
                ),
                Error::<Runtime>::InvalidOperatorId
            );
        })
    }

    #[test]
    fn test_create_site() {
        new_test_ext().execute_with(|| {
            register_staff();
            let site = create_site(b"SITE001");
            let record = Sites::site(site).unwrap();
            assert_eq!(record.code, b"SITE001".to_vec());
            assert_eq!(record.status, SiteStatus::Active);
            assert_eq!(Sites::site_by_code(b"SITE001".to_vec()), Some(site));

            assert_err!(
                Sites::create_site(
                    RuntimeOrigin::signed(ADMIN),
                    b"SITE001".to_vec(),
                    b"Twin".to_vec(),
                    PostalAddress {
                        pincode: b"560038".to_vec(),
                        ..Default::default()
                    },
                    None,
                    Default::default(),
                    Default::default(),
                    1,
                    1,
                ),
                Error::<Runtime>::DuplicateSiteCode
            );
            assert_err!(
                Sites::create_site(
                    RuntimeOrigin::signed(ADMIN),
                    b"LOT9".to_vec(),
                    b"Bad Code".to_vec(),
                    PostalAddress {
                        pincode: b"560038".to_vec(),
                        ..Default::default()
                    },
                    None,
                    Default::default(),
                    Default::default(),
                    1,
                    1,
                ),
                Error::<Runtime>::InvalidSiteCode
            );
        })
    }

    #[test]
    fn test_bad_origin() {
        new_test_ext().execute_with(|| {
            assert_err!(
                Sites::register_operator(
                    RuntimeOrigin::none(),
                    ADMIN,
                    b"OP001".to_vec(),
                    b"Asha Rao".to_vec(),
                    Role::Admin,
                ),
                DispatchError::BadOrigin
            );
        })
    }

    #[test]
    fn test_assignment_scoping() {
        new_test_ext().execute_with(|| {
            register_staff();
            let site = create_site(b"SITE001");
            let other = create_site(b"SITE002");

            assert_ok!(Sites::assign_operator(
                RuntimeOrigin::signed(ADMIN),
                OPERATOR,
                site,
                SiteRole::Operator,
                vec![Permission::ManageBookings],
            ));

            // First assignment becomes the primary site.
            assert_eq!(Sites::operator(OPERATOR).unwrap().primary_site, Some(site));
            assert_eq!(Sites::default_site(&OPERATOR), Some(site));

            assert!(Sites::can_operate(&OPERATOR, site));
            assert!(!Sites::can_operate(&OPERATOR, other));
            assert!(!Sites::can_supervise(&OPERATOR, site));
            assert!(!Sites::can_manage(&OPERATOR, site));
            assert!(Sites::can_operate(&ADMIN, other));
            assert!(!Sites::can_operate(&OUTSIDER, site));

            // Re-assignment is idempotent and updates the role in place.
            assert_ok!(Sites::assign_operator(
                RuntimeOrigin::signed(ADMIN),
                OPERATOR,
                site,
                SiteRole::Supervisor,
                vec![],
            ));
            let record = Sites::operator(OPERATOR).unwrap();
            assert_eq!(record.assignments.len(), 1);
            assert_eq!(record.assignments[0].role, SiteRole::Supervisor);
            assert!(Sites::can_supervise(&OPERATOR, site));
            assert!(Sites::can_manage(&OPERATOR, site));

            // A suspended account loses all scope.
            assert_ok!(Sites::set_operator_status(
                RuntimeOrigin::signed(ADMIN),
                OPERATOR,
                OperatorStatus::Suspended,
            ));
            assert!(!Sites::can_operate(&OPERATOR, site));
        })
    }

    #[test]
    fn test_global_supervisor_scope() {
        new_test_ext().execute_with(|| {
            register_staff();
            let site = create_site(b"SITE001");
            assert_ok!(Sites::assign_operator(
                RuntimeOrigin::signed(ADMIN),
                SUPERVISOR,
                site,
                SiteRole::Operator,
                vec![],
            ));
            // Global supervisor role supervises assigned sites even with a
            // plain operator site role.
            assert!(Sites::can_supervise(&SUPERVISOR, site));
            // But site administration still needs a site-level role.
            assert!(!Sites::can_manage(&SUPERVISOR, site));
        })
    }

    #[test]
    fn test_unassign_falls_back_primary() {
        new_test_ext().execute_with(|| {
            register_staff();
            let first = create_site(b"SITE001");
            let second = create_site(b"SITE002");
            for site in [first, second] {
                assert_ok!(Sites::assign_operator(
                    RuntimeOrigin::signed(ADMIN),
                    OPERATOR,
                    site,
                    SiteRole::Operator,
                    vec![],
                ));
            }
            assert_eq!(Sites::operator(OPERATOR).unwrap().primary_site, Some(first));

            assert_ok!(Sites::unassign_operator(
                RuntimeOrigin::signed(ADMIN),
                OPERATOR,
                first
            ));
            assert_eq!(Sites::operator(OPERATOR).unwrap().primary_site, Some(second));

            assert_err!(
                Sites::unassign_operator(RuntimeOrigin::signed(ADMIN), OPERATOR, first),
                Error::<Runtime>::OperatorNotAssigned
            );
        })
    }

    #[test]
    fn test_deactivate_guarded_by_active_bookings() {
        new_test_ext().execute_with(|| {
            register_staff();
            let site = create_site(b"SITE001");

            ACTIVE_BOOKINGS.with(|b| *b.borrow_mut() = 3);
            assert_err!(
                Sites::deactivate_site(RuntimeOrigin::signed(ADMIN), site),
                Error::<Runtime>::SiteHasActiveBookings
            );

            ACTIVE_BOOKINGS.with(|b| *b.borrow_mut() = 0);
            MACHINES.with(|m| *m.borrow_mut() = 2);
            assert_ok!(Sites::deactivate_site(RuntimeOrigin::signed(ADMIN), site));
            assert_eq!(Sites::site(site).unwrap().status, SiteStatus::Inactive);
            assert!(!Sites::site_active(site));
        })
    }

    #[test]
    fn test_delete_site() {
        new_test_ext().execute_with(|| {
            register_staff();
            let site = create_site(b"SITE001");
            assert_ok!(Sites::assign_operator(
                RuntimeOrigin::signed(ADMIN),
                OPERATOR,
                site,
                SiteRole::Operator,
                vec![],
            ));

            MACHINES.with(|m| *m.borrow_mut() = 2);
            assert_err!(
                Sites::delete_site(RuntimeOrigin::signed(ADMIN), site, false),
                Error::<Runtime>::SiteNotEmpty
            );

            assert_ok!(Sites::delete_site(RuntimeOrigin::signed(ADMIN), site, true));
            assert_eq!(Sites::site(site), None);
            assert_eq!(Sites::site_by_code(b"SITE001".to_vec()), None);
            // Assignment and primary site reference are stripped.
            let record = Sites::operator(OPERATOR).unwrap();
            assert!(record.assignments.is_empty());
            assert_eq!(record.primary_site, None);
            // The code is free for reuse.
            create_site(b"SITE001");
        })
    }

    #[test]
    fn test_status_change_rejects_inactive() {
        new_test_ext().execute_with(|| {
            register_staff();
            let site = create_site(b"SITE001");
            assert_ok!(Sites::set_site_status(
                RuntimeOrigin::signed(ADMIN),
                site,
                SiteStatus::Maintenance
            ));
            assert_eq!(Sites::site(site).unwrap().status, SiteStatus::Maintenance);
            assert_err!(
                Sites::set_site_status(RuntimeOrigin::signed(ADMIN), site, SiteStatus::Inactive),
                Error::<Runtime>::InvalidStatusChange
            );
        })
    }

    #[test]
    fn test_pricing_charge() {
        let pricing = PricingPolicy {
            two_wheeler: RatePlan {
                base_rate: 20,
                minimum_charge: 30,
            },
            four_wheeler: RatePlan {
                base_rate: 50,
                minimum_charge: 80,
            },
            peak_surcharge: Permill::from_percent(50),
            peak_start: 9 * 60,
            peak_end: 12 * 60,
        };

        // A started hour is billed in full, floored at the minimum charge.
        assert_eq!(pricing.charge(VehicleClass::TwoWheeler, HOUR_MS / 2, 0), 30);
        assert_eq!(pricing.charge(VehicleClass::TwoWheeler, 2 * HOUR_MS, 0), 40);
        assert_eq!(
            pricing.charge(VehicleClass::FourWheeler, 3 * HOUR_MS + 1, 0),
            200
        );
        // Peak start applies the surcharge.
        assert_eq!(
            pricing.charge(VehicleClass::FourWheeler, HOUR_MS, 10 * 60),
            80.max(50 + 25)
        );
        assert!(pricing.is_peak(9 * 60));
        assert!(!pricing.is_peak(12 * 60));

        // Overnight window wraps midnight.
        let night = PricingPolicy {
            peak_start: 22 * 60,
            peak_end: 6 * 60,
            ..pricing
        };
        assert!(night.is_peak(23 * 60));
        assert!(night.is_peak(5 * 60));
        assert!(!night.is_peak(12 * 60));
    }

    #[test]
    fn test_site_open_hours() {
        let mut site = Site {
            code: b"SITE001".to_vec(),
            name: b"Indiranagar Tower".to_vec(),
            address: Default::default(),
            location: None,
            hours: Default::default(),
            pricing: Default::default(),
            declared_machines: 0,
            declared_capacity: 0,
            status: SiteStatus::Active,
            created_at: 0,
        };
        // Thursday the 1st of January 1970, 10:00.
        let thursday_morning = 10 * HOUR_MS;
        assert!(site.is_open(thursday_morning));

        site.hours[3] = DayHours {
            open: true,
            opens_at: 11 * 60,
            closes_at: 20 * 60,
        };
        assert!(!site.is_open(thursday_morning));
        assert!(site.is_open(thursday_morning + 2 * HOUR_MS));

        site.hours[3].open = false;
        assert!(!site.is_open(thursday_morning + 2 * HOUR_MS));
    }

    #[test]
    fn test_site_statistics() {
        new_test_ext().execute_with(|| {
            register_staff();
            let site = create_site(b"SITE001");
            MACHINES.with(|m| *m.borrow_mut() = 2);
            ACTIVE_BOOKINGS.with(|b| *b.borrow_mut() = 5);

            let stats = Sites::site_statistics(site).unwrap();
            assert_eq!(stats.machines_total, 2);
            assert_eq!(stats.bookings.active, 5);
            assert_eq!(Sites::site_statistics(99), None);
        })
    }
}
