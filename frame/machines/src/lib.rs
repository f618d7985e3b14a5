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
//! Parknet machine and pallet engine runtime module.
//!
//! Each machine owns an array of pallets (trays); each pallet hosts one to
//! six vehicles in distinct positions, depending on the machine's kinematic
//! type and target vehicle class. This module is the only writer of pallet
//! occupancy: the booking engine drives it through [`PalletAllocator`] and
//! treats failures as reconcilable (the booking record stays authoritative).

#![cfg_attr(not(feature = "std"), no_std)]

use codec::{Decode, Encode};
use scale_info::TypeInfo;
use sp_runtime::RuntimeDebug;
use sp_std::prelude::*;

use pallet_parknet_sites::{DayHours, PricingPolicy};
use parknet_primitives::{
    puzzle_pallet_number, validation, vehicles_per_pallet, BookingId, KinematicType, MachineId,
    Moment, PalletNumber, Position, SiteId, VehicleClass, MAX_POSITIONS, MINUTE_MS,
};

pub mod weights;

pub use pallet::*;
pub use weights::WeightInfo;

/// A machine controller is considered live while its last heartbeat is
/// younger than this.
pub const HEARTBEAT_TTL_MS: Moment = 5 * MINUTE_MS;

/// Lifecycle status of a machine.
#[derive(PartialEq, Eq, Clone, Copy, Encode, Decode, TypeInfo, RuntimeDebug)]
#[cfg_attr(feature = "std", derive(serde::Serialize, serde::Deserialize))]
pub enum MachineStatus {
    /// Accepting operations.
    Online,
    /// Switched off.
    Offline,
    /// Under service.
    Maintenance,
    /// Controller reported a fault.
    Error,
}

/// Status of a single pallet.
#[derive(PartialEq, Eq, Clone, Copy, Encode, Decode, TypeInfo, RuntimeDebug)]
#[cfg_attr(feature = "std", derive(serde::Serialize, serde::Deserialize))]
pub enum PalletStatus {
    /// Has at least one free position.
    Available,
    /// Every position is taken.
    Occupied,
    /// Operator-declared unsafe.
    Maintenance,
    /// Administratively withheld.
    Blocked,
}

/// Link state reported by the machine controller.
#[derive(PartialEq, Eq, Clone, Copy, Encode, Decode, TypeInfo, RuntimeDebug)]
#[cfg_attr(feature = "std", derive(serde::Serialize, serde::Deserialize))]
pub enum ConnectionStatus {
    /// Heartbeats arriving.
    Connected,
    /// Link lost.
    Disconnected,
    /// Never seen.
    Unknown,
}

/// Why a pallet operation was refused. The booking engine logs these
/// without failing the session it records.
#[derive(PartialEq, Eq, Clone, Copy, Encode, Decode, TypeInfo, RuntimeDebug)]
pub enum AllocationError {
    /// No machine with this code at the site.
    MachineNotFound,
    /// The machine is not online.
    MachineOffline,
    /// No pallet matches the lookup key.
    PalletNotFound,
    /// The pallet is declared unsafe.
    PalletMaintenance,
    /// Every position of the pallet is taken.
    PalletFull,
    /// The requested position is already occupied.
    PositionTaken,
    /// The requested position is outside `1..=6`.
    InvalidPosition,
    /// No occupant matches the booking or plate.
    OccupantNotFound,
}

/// One vehicle standing on a pallet.
#[derive(PartialEq, Eq, Clone, Encode, Decode, TypeInfo, RuntimeDebug)]
pub struct Occupant {
    /// Session that parked the vehicle.
    pub booking: BookingId,
    /// Uppercase registration plate.
    pub vehicle: Vec<u8>,
    /// Position within the pallet, `1..=6`.
    pub position: Position,
    /// When the vehicle was parked.
    pub since: Moment,
}

/// A tray within a parking machine.
#[derive(PartialEq, Eq, Clone, Encode, Decode, TypeInfo, RuntimeDebug)]
pub struct ParkingPallet {
    /// Stable number; rotary machines count `1..N`, puzzle machines
    /// `101..104, 201..204, ...` floor-major.
    pub number: PalletNumber,
    /// Optional operator-given name, usable as a lookup key.
    pub custom_name: Option<Vec<u8>>,
    /// Current status.
    pub status: PalletStatus,
    /// Vehicles this pallet hosts when full.
    pub vehicle_capacity: u8,
    /// Vehicles currently on the pallet.
    pub current_occupancy: u8,
    /// Current occupants.
    pub occupants: Vec<Occupant>,
    /// Since when the pallet has been non-empty.
    pub occupied_since: Option<Moment>,
    /// Last maintenance declaration.
    pub last_maintenance: Option<Moment>,
    /// Notes from the last maintenance declaration.
    pub maintenance_notes: Vec<u8>,
}

impl ParkingPallet {
    fn new(number: PalletNumber, vehicle_capacity: u8) -> Self {
        Self {
            number,
            custom_name: None,
            status: PalletStatus::Available,
            vehicle_capacity,
            current_occupancy: 0,
            occupants: Vec::new(),
            occupied_since: None,
            last_maintenance: None,
            maintenance_notes: Vec::new(),
        }
    }

    /// Whether the key addresses this pallet, by number or custom name.
    pub fn matches(&self, key: &PalletKey) -> bool {
        match key {
            PalletKey::Number(number) => self.number == *number,
            PalletKey::Name(name) => self.custom_name.as_deref() == Some(name.as_slice()),
        }
    }

    /// Whether the pallet can take one more vehicle.
    pub fn has_room(&self) -> bool {
        self.status != PalletStatus::Maintenance && self.current_occupancy < self.vehicle_capacity
    }

    fn position_free(&self, position: Position) -> bool {
        !self.occupants.iter().any(|o| o.position == position)
    }

    /// Park a vehicle. Four-wheeler pallets pin the position to 1; for
    /// two-wheelers a missing position picks the lowest free slot.
    pub fn occupy(
        &mut self,
        booking: BookingId,
        vehicle: Vec<u8>,
        position: Option<Position>,
        class: VehicleClass,
        now: Moment,
    ) -> Result<Position, AllocationError> {
        if self.status == PalletStatus::Maintenance {
            return Err(AllocationError::PalletMaintenance);
        }
        if self.current_occupancy >= self.vehicle_capacity {
            return Err(AllocationError::PalletFull);
        }

        let position = match (class, position) {
            (VehicleClass::FourWheeler, _) => 1,
            (VehicleClass::TwoWheeler, Some(position)) => {
                if !(1..=MAX_POSITIONS).contains(&position) {
                    return Err(AllocationError::InvalidPosition);
                }
                if !self.position_free(position) {
                    return Err(AllocationError::PositionTaken);
                }
                position
            }
            (VehicleClass::TwoWheeler, None) => (1..=MAX_POSITIONS)
                .find(|p| self.position_free(*p))
                .ok_or(AllocationError::PalletFull)?,
        };

        self.occupants.push(Occupant {
            booking,
            vehicle,
            position,
            since: now,
        });
        self.current_occupancy += 1;
        if self.current_occupancy == 1 {
            self.occupied_since = Some(now);
        }
        if self.current_occupancy == self.vehicle_capacity {
            self.status = PalletStatus::Occupied;
        }
        Ok(position)
    }

    /// Remove the occupant parked by the given session.
    pub fn release_booking(&mut self, booking: BookingId) -> Result<Occupant, AllocationError> {
        let index = self
            .occupants
            .iter()
            .position(|o| o.booking == booking)
            .ok_or(AllocationError::OccupantNotFound)?;
        Ok(self.take_occupant(index))
    }

    /// Remove the occupant with the given plate (uppercase match).
    pub fn release_vehicle(&mut self, vehicle: &[u8]) -> Result<Occupant, AllocationError> {
        let index = self
            .occupants
            .iter()
            .position(|o| o.vehicle == vehicle)
            .ok_or(AllocationError::OccupantNotFound)?;
        Ok(self.take_occupant(index))
    }

    fn take_occupant(&mut self, index: usize) -> Occupant {
        let occupant = self.occupants.remove(index);
        self.current_occupancy = self.occupants.len() as u8;
        if self.current_occupancy == 0 {
            self.occupied_since = None;
        }
        if self.status == PalletStatus::Occupied {
            self.status = PalletStatus::Available;
        }
        occupant
    }
}

/// Lookup key for a pallet: its number, or its operator-given name.
#[derive(PartialEq, Eq, Clone, Encode, Decode, TypeInfo, RuntimeDebug)]
pub enum PalletKey {
    /// Address by stable number.
    Number(PalletNumber),
    /// Address by custom name.
    Name(Vec<u8>),
}

/// Physical envelope a machine accepts.
#[derive(PartialEq, Eq, Clone, Default, Encode, Decode, TypeInfo, RuntimeDebug)]
#[cfg_attr(feature = "std", derive(serde::Serialize, serde::Deserialize))]
pub struct MachineSpecs {
    /// Maximum vehicle length, millimetres.
    pub max_length_mm: u32,
    /// Maximum vehicle width, millimetres.
    pub max_width_mm: u32,
    /// Maximum vehicle height, millimetres.
    pub max_height_mm: u32,
    /// Maximum vehicle weight, kilograms.
    pub max_weight_kg: u32,
    /// Vehicle classes the machine serves.
    pub supported_classes: Vec<VehicleClass>,
}

/// Aggregate counters derived on every save. `total` is the
/// operator-declared nominal pallet count and never recomputed.
#[derive(PartialEq, Eq, Clone, Copy, Default, Encode, Decode, TypeInfo, RuntimeDebug)]
pub struct CapacityAggregate {
    /// Declared pallet count.
    pub total: u32,
    /// Free vehicle positions over available pallets.
    pub available: u32,
    /// Vehicles standing on occupied pallets.
    pub occupied: u32,
    /// Pallets under maintenance.
    pub maintenance: u32,
}

/// Controller integration block.
#[derive(PartialEq, Eq, Clone, Encode, Decode, TypeInfo, RuntimeDebug)]
pub struct Heartbeat {
    /// Last heartbeat seen.
    pub last_heartbeat: Option<Moment>,
    /// Firmware version reported by the controller.
    pub firmware: Vec<u8>,
    /// Derived link state.
    pub connection: ConnectionStatus,
}

impl Default for Heartbeat {
    fn default() -> Self {
        Self {
            last_heartbeat: None,
            firmware: Vec::new(),
            connection: ConnectionStatus::Unknown,
        }
    }
}

/// One line of machine service history.
#[derive(PartialEq, Eq, Clone, Encode, Decode, TypeInfo, RuntimeDebug)]
pub struct ServiceEntry {
    /// When the entry was recorded.
    pub at: Moment,
    /// What happened.
    pub note: Vec<u8>,
}

/// A mechanical parking machine bound to one site.
#[derive(PartialEq, Eq, Clone, Encode, Decode, TypeInfo, RuntimeDebug)]
pub struct Machine {
    /// Human code `M` + 3 digits, unique within the site.
    pub code: Vec<u8>,
    /// Owning site.
    pub site: SiteId,
    /// Kinematic type.
    pub kinematic: KinematicType,
    /// Target vehicle class.
    pub vehicle_class: VehicleClass,
    /// Lifecycle status.
    pub status: MachineStatus,
    /// Physical envelope.
    pub specs: MachineSpecs,
    /// Derived counters.
    pub capacity: CapacityAggregate,
    /// The pallet array.
    pub pallets: Vec<ParkingPallet>,
    /// Pricing override; `None` falls back to the site policy.
    pub pricing: Option<PricingPolicy>,
    /// Operating-hours override; `None` falls back to the site hours.
    pub hours: Option<[DayHours; 7]>,
    /// Controller integration.
    pub integration: Heartbeat,
    /// Service history, newest last.
    pub service_log: Vec<ServiceEntry>,
    /// Next scheduled service, if any.
    pub next_service_due: Option<Moment>,
    /// Registration timestamp.
    pub created_at: Moment,
}

impl Machine {
    /// Vehicles one pallet of this machine hosts.
    pub fn pallet_capacity(&self) -> u8 {
        vehicles_per_pallet(self.kinematic, self.vehicle_class)
    }

    /// Generate the pallet array: exactly `capacity.total` pallets, numbered
    /// per kinematic type. Puzzle numbering leaves the last floor
    /// under-filled when the total is not a multiple of four.
    fn init_pallets(&mut self) {
        let capacity = self.pallet_capacity();
        self.pallets = (0..self.capacity.total)
            .map(|i| {
                let number = match self.kinematic {
                    KinematicType::Rotary => i as PalletNumber + 1,
                    KinematicType::Puzzle => puzzle_pallet_number(i as u16),
                };
                ParkingPallet::new(number, capacity)
            })
            .collect();
    }

    /// Pallet addressed by the key.
    pub fn pallet(&self, key: &PalletKey) -> Option<&ParkingPallet> {
        self.pallets.iter().find(|p| p.matches(key))
    }

    fn pallet_mut(&mut self, key: &PalletKey) -> Option<&mut ParkingPallet> {
        self.pallets.iter_mut().find(|p| p.matches(key))
    }

    /// Vehicles currently standing in the machine.
    pub fn occupancy(&self) -> u32 {
        self.pallets
            .iter()
            .map(|p| p.current_occupancy as u32)
            .sum()
    }

    /// Whether the controller heartbeat is younger than five minutes.
    pub fn is_live(&self, now: Moment) -> bool {
        self.integration
            .last_heartbeat
            .map_or(false, |at| now.saturating_sub(at) <= HEARTBEAT_TTL_MS)
    }

    /// Whether some pallet can take a vehicle right now.
    pub fn has_room(&self) -> bool {
        self.pallets.iter().any(ParkingPallet::has_room)
    }

    /// Recompute the derived aggregate counters.
    pub fn recompute_capacity(&mut self) {
        let mut available = 0u32;
        let mut occupied = 0u32;
        let mut maintenance = 0u32;
        for pallet in &self.pallets {
            match pallet.status {
                PalletStatus::Maintenance => maintenance += 1,
                PalletStatus::Occupied => occupied += pallet.current_occupancy as u32,
                PalletStatus::Available => {
                    available += (pallet.vehicle_capacity - pallet.current_occupancy) as u32
                }
                PalletStatus::Blocked => {}
            }
        }
        self.capacity.available = available;
        self.capacity.occupied = occupied;
        self.capacity.maintenance = maintenance;
    }

    /// Rewrite per-pallet capacity after a kinematic or class change.
    /// Occupants beyond the new capacity are dropped; returns how many.
    fn rewrite_pallet_capacity(&mut self) -> u32 {
        let capacity = self.pallet_capacity();
        let mut truncated = 0u32;
        for pallet in &mut self.pallets {
            pallet.vehicle_capacity = capacity;
            if pallet.current_occupancy > capacity {
                truncated += (pallet.current_occupancy - capacity) as u32;
                pallet.occupants.truncate(capacity as usize);
                pallet.current_occupancy = capacity;
            }
            if pallet.status != PalletStatus::Maintenance && pallet.status != PalletStatus::Blocked
            {
                pallet.status = if pallet.current_occupancy == capacity {
                    PalletStatus::Occupied
                } else {
                    PalletStatus::Available
                };
            }
        }
        truncated
    }
}

/// Pallet occupancy driver used by the booking engine. Keys are the
/// denormalized identifiers a booking carries: site, machine code, pallet
/// number.
pub trait PalletAllocator {
    /// Park a vehicle; returns the assigned position.
    fn occupy(
        site: SiteId,
        machine_code: &[u8],
        pallet: PalletNumber,
        booking: BookingId,
        vehicle: &[u8],
        position: Option<Position>,
    ) -> Result<Position, AllocationError>;

    /// Release the occupant parked by the session.
    fn release_booking(
        site: SiteId,
        machine_code: &[u8],
        pallet: PalletNumber,
        booking: BookingId,
    ) -> Result<(), AllocationError>;

    /// Release the occupant with the given plate.
    fn release_vehicle(
        site: SiteId,
        machine_code: &[u8],
        pallet: PalletNumber,
        vehicle: &[u8],
    ) -> Result<(), AllocationError>;
}

#[frame_support::pallet]
pub mod pallet {
    use super::*;
    use frame_support::{pallet_prelude::*, traits::Time};
    use frame_system::pallet_prelude::*;
    use pallet_parknet_sites::SiteScope;

    #[pallet::config]
    pub trait Config: frame_system::Config {
        /// Current time source.
        type Time: Time<Moment = Moment>;
        /// Authorization envelope.
        type Sites: SiteScope<Self::AccountId>;
        /// The overarching event type.
        type RuntimeEvent: From<Event<Self>> + IsType<<Self as frame_system::Config>::RuntimeEvent>;
        /// Hard cap on the pallet array of one machine.
        #[pallet::constant]
        type MaxPalletsPerMachine: Get<u32>;
        /// Extrinsic weights.
        type WeightInfo: WeightInfo;
    }

    #[pallet::error]
    pub enum Error<T> {
        /// No machine with this id.
        MachineNotFound,
        /// The machine is not online.
        MachineOffline,
        /// No pallet matches the lookup key.
        PalletNotFound,
        /// The pallet is declared unsafe.
        PalletMaintenance,
        /// Every position of the pallet is taken.
        PalletFull,
        /// The requested position is already occupied.
        PositionTaken,
        /// The requested position is outside `1..=6`.
        InvalidPosition,
        /// No occupant matches the booking or plate.
        OccupantNotFound,
        /// The pallet is not under maintenance.
        PalletNotInMaintenance,
        /// The machine still has vehicles standing in it.
        MachineOccupied,
        /// Machine code does not match `M` + 3 digits.
        InvalidMachineCode,
        /// Another machine at the site already uses this code.
        DuplicateMachineCode,
        /// Declared pallet count exceeds the configured bound.
        TooManyPallets,
        /// No site with this id.
        SiteNotFound,
        /// Caller is not scoped for this operation.
        NotAuthorized,
    }

    impl<T> From<AllocationError> for Error<T> {
        fn from(e: AllocationError) -> Self {
            match e {
                AllocationError::MachineNotFound => Error::<T>::MachineNotFound,
                AllocationError::MachineOffline => Error::<T>::MachineOffline,
                AllocationError::PalletNotFound => Error::<T>::PalletNotFound,
                AllocationError::PalletMaintenance => Error::<T>::PalletMaintenance,
                AllocationError::PalletFull => Error::<T>::PalletFull,
                AllocationError::PositionTaken => Error::<T>::PositionTaken,
                AllocationError::InvalidPosition => Error::<T>::InvalidPosition,
                AllocationError::OccupantNotFound => Error::<T>::OccupantNotFound,
            }
        }
    }

    #[pallet::event]
    #[pallet::generate_deposit(pub(super) fn deposit_event)]
    pub enum Event<T: Config> {
        /// New machine registered: [id, site, code].
        MachineRegistered(MachineId, SiteId, Vec<u8>),
        /// Machine attributes updated: [id].
        MachineUpdated(MachineId),
        /// Machine status changed: [id, status].
        MachineStatusChanged(MachineId, MachineStatus),
        /// Machine removed from the registry: [id].
        MachineRemoved(MachineId),
        /// Vehicle parked: [machine, pallet, booking, position].
        PalletOccupied(MachineId, PalletNumber, BookingId, Position),
        /// Session occupant released: [machine, pallet, booking].
        PalletReleased(MachineId, PalletNumber, BookingId),
        /// Plate occupant released: [machine, pallet, plate].
        VehicleReleased(MachineId, PalletNumber, Vec<u8>),
        /// Pallet declared under maintenance: [machine, pallet, operator].
        PalletMaintenanceSet(MachineId, PalletNumber, T::AccountId),
        /// Maintenance declared while vehicles stand on the pallet:
        /// [machine, pallet, occupancy].
        PalletMaintenanceWithOccupants(MachineId, PalletNumber, u8),
        /// Maintenance cleared: [machine, pallet].
        PalletMaintenanceCleared(MachineId, PalletNumber),
        /// A capacity rewrite dropped occupant records: [machine, count].
        OccupantsTruncated(MachineId, u32),
        /// Controller heartbeat received: [machine].
        HeartbeatReceived(MachineId),
        /// Service visit scheduled: [machine, due].
        ServiceScheduled(MachineId, Moment),
    }

    #[pallet::storage]
    #[pallet::getter(fn machine)]
    /// Machine registry.
    pub(super) type Machines<T: Config> = StorageMap<_, Twox64Concat, MachineId, Machine>;

    #[pallet::storage]
    #[pallet::getter(fn next_machine_id)]
    /// Next free machine id.
    pub(super) type NextMachineId<T: Config> = StorageValue<_, MachineId, ValueQuery>;

    #[pallet::storage]
    #[pallet::getter(fn machine_by_code)]
    /// Per-site machine code index.
    pub(super) type MachineCodes<T: Config> =
        StorageMap<_, Blake2_128Concat, (SiteId, Vec<u8>), MachineId>;

    #[pallet::pallet]
    #[pallet::without_storage_info]
    pub struct Pallet<T>(PhantomData<T>);

    #[pallet::hooks]
    impl<T: Config> Hooks<BlockNumberFor<T>> for Pallet<T> {}

    #[pallet::call]
    impl<T: Config> Pallet<T> {
        /// Register a machine at a site. The pallet array is generated
        /// immediately: `total_pallets` pallets numbered `1..N` for rotary
        /// machines, floor-major `101..` for puzzle machines.
        #[pallet::weight(T::WeightInfo::register_machine())]
        #[pallet::call_index(0)]
        pub fn register_machine(
            origin: OriginFor<T>,
            site: SiteId,
            code: Vec<u8>,
            kinematic: KinematicType,
            vehicle_class: VehicleClass,
            total_pallets: u32,
            specs: MachineSpecs,
            pricing: Option<PricingPolicy>,
        ) -> DispatchResultWithPostInfo {
            let sender = ensure_signed(origin)?;
            ensure!(
                T::Sites::is_admin(&sender) || T::Sites::can_manage(&sender, site),
                Error::<T>::NotAuthorized
            );
            ensure!(T::Sites::site_exists(site), Error::<T>::SiteNotFound);
            ensure!(validation::machine_code(&code), Error::<T>::InvalidMachineCode);
            ensure!(
                !<MachineCodes<T>>::contains_key((site, &code)),
                Error::<T>::DuplicateMachineCode
            );
            ensure!(
                total_pallets <= T::MaxPalletsPerMachine::get(),
                Error::<T>::TooManyPallets
            );

            let mut machine = Machine {
                code: code.clone(),
                site,
                kinematic,
                vehicle_class,
                status: MachineStatus::Online,
                specs,
                capacity: CapacityAggregate {
                    total: total_pallets,
                    ..Default::default()
                },
                pallets: Vec::new(),
                pricing,
                hours: None,
                integration: Default::default(),
                service_log: Vec::new(),
                next_service_due: None,
                created_at: T::Time::now(),
            };
            if machine.specs.supported_classes.is_empty() {
                machine.specs.supported_classes = Vec::from([vehicle_class]);
            }
            machine.init_pallets();
            machine.recompute_capacity();

            let id = <NextMachineId<T>>::get();
            <NextMachineId<T>>::put(id + 1);
            <MachineCodes<T>>::insert((site, &code), id);
            <Machines<T>>::insert(id, machine);

            Self::deposit_event(Event::MachineRegistered(id, site, code));
            Ok(().into())
        }

        /// Update machine attributes. Changing the kinematic type or target
        /// class rewrites every pallet's vehicle capacity; occupants beyond
        /// the new capacity are dropped with a warning.
        #[pallet::weight(T::WeightInfo::update_machine())]
        #[pallet::call_index(1)]
        pub fn update_machine(
            origin: OriginFor<T>,
            machine: MachineId,
            kinematic: Option<KinematicType>,
            vehicle_class: Option<VehicleClass>,
            specs: Option<MachineSpecs>,
            pricing: Option<PricingPolicy>,
            hours: Option<[DayHours; 7]>,
        ) -> DispatchResultWithPostInfo {
            let sender = ensure_signed(origin)?;
            let mut record = Self::machine(machine).ok_or(Error::<T>::MachineNotFound)?;
            ensure!(
                T::Sites::is_admin(&sender) || T::Sites::can_manage(&sender, record.site),
                Error::<T>::NotAuthorized
            );

            let geometry_changed = kinematic.map_or(false, |k| k != record.kinematic)
                || vehicle_class.map_or(false, |c| c != record.vehicle_class);
            if let Some(kinematic) = kinematic {
                record.kinematic = kinematic;
            }
            if let Some(vehicle_class) = vehicle_class {
                record.vehicle_class = vehicle_class;
            }
            if let Some(specs) = specs {
                record.specs = specs;
            }
            if let Some(pricing) = pricing {
                record.pricing = Some(pricing);
            }
            if let Some(hours) = hours {
                record.hours = Some(hours);
            }

            if geometry_changed {
                let truncated = record.rewrite_pallet_capacity();
                if truncated > 0 {
                    log::warn!(
                        target: "runtime::machines",
                        "machine {machine}: geometry change dropped {truncated} occupant records",
                    );
                    Self::deposit_event(Event::OccupantsTruncated(machine, truncated));
                }
            }
            record.recompute_capacity();
            <Machines<T>>::insert(machine, record);

            Self::deposit_event(Event::MachineUpdated(machine));
            Ok(().into())
        }

        /// Transition a machine between status values. Deactivating to
        /// `Offline` requires zero occupancy across all pallets; the fault
        /// states `Maintenance` and `Error` stay reachable with vehicles
        /// standing inside.
        #[pallet::weight(T::WeightInfo::set_machine_status())]
        #[pallet::call_index(2)]
        pub fn set_machine_status(
            origin: OriginFor<T>,
            machine: MachineId,
            status: MachineStatus,
        ) -> DispatchResultWithPostInfo {
            let sender = ensure_signed(origin)?;
            <Machines<T>>::try_mutate(machine, |record| -> DispatchResult {
                let record = record.as_mut().ok_or(Error::<T>::MachineNotFound)?;
                ensure!(
                    T::Sites::can_operate(&sender, record.site),
                    Error::<T>::NotAuthorized
                );
                ensure!(
                    status != MachineStatus::Offline || record.occupancy() == 0,
                    Error::<T>::MachineOccupied
                );
                record.status = status;
                Ok(())
            })?;

            Self::deposit_event(Event::MachineStatusChanged(machine, status));
            Ok(().into())
        }

        /// Remove a machine from the registry. Refused while any vehicle
        /// stands in it.
        #[pallet::weight(T::WeightInfo::remove_machine())]
        #[pallet::call_index(3)]
        pub fn remove_machine(
            origin: OriginFor<T>,
            machine: MachineId,
        ) -> DispatchResultWithPostInfo {
            let sender = ensure_signed(origin)?;
            let record = Self::machine(machine).ok_or(Error::<T>::MachineNotFound)?;
            ensure!(
                T::Sites::is_admin(&sender) || T::Sites::can_manage(&sender, record.site),
                Error::<T>::NotAuthorized
            );
            ensure!(record.occupancy() == 0, Error::<T>::MachineOccupied);

            <MachineCodes<T>>::remove((record.site, &record.code));
            <Machines<T>>::remove(machine);

            Self::deposit_event(Event::MachineRemoved(machine));
            Ok(().into())
        }

        /// Park a vehicle on a pallet. The pallet may be addressed by
        /// number or custom name.
        #[pallet::weight(T::WeightInfo::occupy_pallet())]
        #[pallet::call_index(4)]
        pub fn occupy_pallet(
            origin: OriginFor<T>,
            machine: MachineId,
            key: PalletKey,
            booking: BookingId,
            vehicle: Vec<u8>,
            position: Option<Position>,
        ) -> DispatchResultWithPostInfo {
            let sender = ensure_signed(origin)?;
            let (number, position) = Self::with_machine(machine, &sender, |record, now| {
                ensure!(
                    record.status == MachineStatus::Online,
                    Error::<T>::MachineOffline
                );
                let class = record.vehicle_class;
                let vehicle = vehicle.to_ascii_uppercase();
                let pallet = record
                    .pallet_mut(&key)
                    .ok_or(Error::<T>::PalletNotFound)?;
                let position = pallet
                    .occupy(booking, vehicle, position, class, now)
                    .map_err(Error::<T>::from)?;
                Ok((pallet.number, position))
            })?;

            Self::deposit_event(Event::PalletOccupied(machine, number, booking, position));
            Ok(().into())
        }

        /// Release the occupant a session parked.
        #[pallet::weight(T::WeightInfo::release_pallet())]
        #[pallet::call_index(5)]
        pub fn release_pallet(
            origin: OriginFor<T>,
            machine: MachineId,
            key: PalletKey,
            booking: BookingId,
        ) -> DispatchResultWithPostInfo {
            let sender = ensure_signed(origin)?;
            let number = Self::with_machine(machine, &sender, |record, _| {
                let pallet = record
                    .pallet_mut(&key)
                    .ok_or(Error::<T>::PalletNotFound)?;
                pallet.release_booking(booking).map_err(Error::<T>::from)?;
                Ok(pallet.number)
            })?;

            Self::deposit_event(Event::PalletReleased(machine, number, booking));
            Ok(().into())
        }

        /// Release the occupant with the given plate.
        #[pallet::weight(T::WeightInfo::release_vehicle())]
        #[pallet::call_index(6)]
        pub fn release_vehicle(
            origin: OriginFor<T>,
            machine: MachineId,
            key: PalletKey,
            vehicle: Vec<u8>,
        ) -> DispatchResultWithPostInfo {
            let sender = ensure_signed(origin)?;
            let vehicle = vehicle.to_ascii_uppercase();
            let number = Self::with_machine(machine, &sender, |record, _| {
                let pallet = record
                    .pallet_mut(&key)
                    .ok_or(Error::<T>::PalletNotFound)?;
                pallet.release_vehicle(&vehicle).map_err(Error::<T>::from)?;
                Ok(pallet.number)
            })?;

            Self::deposit_event(Event::VehicleReleased(machine, number, vehicle));
            Ok(().into())
        }

        /// Declare a pallet unsafe. Occupants are kept; the operator is
        /// warned when the pallet is not empty.
        #[pallet::weight(T::WeightInfo::set_pallet_maintenance())]
        #[pallet::call_index(7)]
        pub fn set_pallet_maintenance(
            origin: OriginFor<T>,
            machine: MachineId,
            pallet_number: PalletNumber,
            notes: Vec<u8>,
        ) -> DispatchResultWithPostInfo {
            let sender = ensure_signed(origin)?;
            let notes = validation::sanitize(&notes);
            let occupancy = Self::with_machine(machine, &sender, |record, now| {
                let pallet = record
                    .pallet_mut(&PalletKey::Number(pallet_number))
                    .ok_or(Error::<T>::PalletNotFound)?;
                pallet.status = PalletStatus::Maintenance;
                pallet.last_maintenance = Some(now);
                pallet.maintenance_notes = notes.clone();
                let occupancy = pallet.current_occupancy;
                record.service_log.push(ServiceEntry {
                    at: now,
                    note: notes.clone(),
                });
                Ok(occupancy)
            })?;

            if occupancy > 0 {
                log::warn!(
                    target: "runtime::machines",
                    "machine {machine} pallet {pallet_number}: maintenance declared with {occupancy} vehicles standing",
                );
                Self::deposit_event(Event::PalletMaintenanceWithOccupants(
                    machine,
                    pallet_number,
                    occupancy,
                ));
            }
            Self::deposit_event(Event::PalletMaintenanceSet(machine, pallet_number, sender));
            Ok(().into())
        }

        /// Clear a maintenance declaration; the pallet returns to
        /// `Available` (or `Occupied` when already full).
        #[pallet::weight(T::WeightInfo::clear_pallet_maintenance())]
        #[pallet::call_index(8)]
        pub fn clear_pallet_maintenance(
            origin: OriginFor<T>,
            machine: MachineId,
            pallet_number: PalletNumber,
        ) -> DispatchResultWithPostInfo {
            let sender = ensure_signed(origin)?;
            Self::with_machine(machine, &sender, |record, _| {
                let pallet = record
                    .pallet_mut(&PalletKey::Number(pallet_number))
                    .ok_or(Error::<T>::PalletNotFound)?;
                ensure!(
                    pallet.status == PalletStatus::Maintenance,
                    Error::<T>::PalletNotInMaintenance
                );
                pallet.status = if pallet.current_occupancy == pallet.vehicle_capacity {
                    PalletStatus::Occupied
                } else {
                    PalletStatus::Available
                };
                Ok(())
            })?;

            Self::deposit_event(Event::PalletMaintenanceCleared(machine, pallet_number));
            Ok(().into())
        }

        /// Give a pallet an operator-facing name usable as a lookup key.
        #[pallet::weight(T::WeightInfo::set_pallet_name())]
        #[pallet::call_index(9)]
        pub fn set_pallet_name(
            origin: OriginFor<T>,
            machine: MachineId,
            pallet_number: PalletNumber,
            name: Option<Vec<u8>>,
        ) -> DispatchResultWithPostInfo {
            let sender = ensure_signed(origin)?;
            Self::with_machine(machine, &sender, |record, _| {
                let pallet = record
                    .pallet_mut(&PalletKey::Number(pallet_number))
                    .ok_or(Error::<T>::PalletNotFound)?;
                pallet.custom_name = name.as_ref().map(|n| validation::sanitize(n));
                Ok(())
            })?;
            Ok(().into())
        }

        /// Record a controller heartbeat.
        #[pallet::weight(T::WeightInfo::heartbeat())]
        #[pallet::call_index(10)]
        pub fn heartbeat(
            origin: OriginFor<T>,
            machine: MachineId,
            firmware: Option<Vec<u8>>,
        ) -> DispatchResultWithPostInfo {
            let sender = ensure_signed(origin)?;
            <Machines<T>>::try_mutate(machine, |record| -> DispatchResult {
                let record = record.as_mut().ok_or(Error::<T>::MachineNotFound)?;
                ensure!(
                    T::Sites::can_operate(&sender, record.site),
                    Error::<T>::NotAuthorized
                );
                record.integration.last_heartbeat = Some(T::Time::now());
                record.integration.connection = ConnectionStatus::Connected;
                if let Some(firmware) = firmware {
                    record.integration.firmware = firmware;
                }
                Ok(())
            })?;

            Self::deposit_event(Event::HeartbeatReceived(machine));
            Ok(().into())
        }

        /// Schedule the next service visit.
        #[pallet::weight(T::WeightInfo::schedule_service())]
        #[pallet::call_index(11)]
        pub fn schedule_service(
            origin: OriginFor<T>,
            machine: MachineId,
            due: Moment,
        ) -> DispatchResultWithPostInfo {
            let sender = ensure_signed(origin)?;
            <Machines<T>>::try_mutate(machine, |record| -> DispatchResult {
                let record = record.as_mut().ok_or(Error::<T>::MachineNotFound)?;
                ensure!(
                    T::Sites::is_admin(&sender) || T::Sites::can_manage(&sender, record.site),
                    Error::<T>::NotAuthorized
                );
                record.next_service_due = Some(due);
                Ok(())
            })?;

            Self::deposit_event(Event::ServiceScheduled(machine, due));
            Ok(().into())
        }
    }

    impl<T: Config> Pallet<T> {
        /// Run a scoped mutation on one machine; counters are recomputed and
        /// the record saved when the closure succeeds.
        fn with_machine<R>(
            machine: MachineId,
            sender: &T::AccountId,
            f: impl FnOnce(&mut Machine, Moment) -> Result<R, DispatchError>,
        ) -> Result<R, DispatchError> {
            <Machines<T>>::try_mutate(machine, |record| {
                let record = record.as_mut().ok_or(Error::<T>::MachineNotFound)?;
                ensure!(
                    T::Sites::can_operate(sender, record.site),
                    Error::<T>::NotAuthorized
                );
                let out = f(record, T::Time::now())?;
                record.recompute_capacity();
                Ok(out)
            })
        }

        /// Mutation path for the booking engine: no origin, keyed by the
        /// booking's denormalized identifiers. Returns the machine id along
        /// with the closure result.
        fn with_machine_by_code<R>(
            site: SiteId,
            code: &[u8],
            f: impl FnOnce(&mut Machine, Moment) -> Result<R, AllocationError>,
        ) -> Result<(MachineId, R), AllocationError> {
            let id = Self::machine_by_code((site, code.to_vec()))
                .ok_or(AllocationError::MachineNotFound)?;
            <Machines<T>>::try_mutate(id, |record| {
                let record = record.as_mut().ok_or(AllocationError::MachineNotFound)?;
                let out = f(record, T::Time::now())?;
                record.recompute_capacity();
                Ok((id, out))
            })
        }

        /// Machines able to take a vehicle of the class right now, sorted by
        /// free capacity descending.
        pub fn find_available(
            class: VehicleClass,
            site: Option<SiteId>,
        ) -> Vec<(MachineId, Machine)> {
            let mut candidates: Vec<(MachineId, Machine)> = <Machines<T>>::iter()
                .filter(|(_, m)| {
                    m.status == MachineStatus::Online
                        && m.capacity.available > 0
                        && m.specs.supported_classes.contains(&class)
                        && site.map_or(true, |s| m.site == s)
                        && m.has_room()
                })
                .collect();
            candidates.sort_by(|(_, a), (_, b)| b.capacity.available.cmp(&a.capacity.available));
            candidates
        }

        /// Machines whose scheduled service date has passed.
        pub fn maintenance_due(now: Moment) -> Vec<(MachineId, Machine)> {
            <Machines<T>>::iter()
                .filter(|(_, m)| m.next_service_due.map_or(false, |due| due <= now))
                .collect()
        }
    }

    impl<T: Config> PalletAllocator for Pallet<T> {
        fn occupy(
            site: SiteId,
            machine_code: &[u8],
            pallet: PalletNumber,
            booking: BookingId,
            vehicle: &[u8],
            position: Option<Position>,
        ) -> Result<Position, AllocationError> {
            let (id, (number, position)) =
                Self::with_machine_by_code(site, machine_code, |record, now| {
                    if record.status != MachineStatus::Online {
                        return Err(AllocationError::MachineOffline);
                    }
                    let class = record.vehicle_class;
                    let vehicle = vehicle.to_ascii_uppercase();
                    let tray = record
                        .pallet_mut(&PalletKey::Number(pallet))
                        .ok_or(AllocationError::PalletNotFound)?;
                    let position = tray.occupy(booking, vehicle, position, class, now)?;
                    Ok((tray.number, position))
                })?;
            Self::deposit_event(Event::PalletOccupied(id, number, booking, position));
            Ok(position)
        }

        fn release_booking(
            site: SiteId,
            machine_code: &[u8],
            pallet: PalletNumber,
            booking: BookingId,
        ) -> Result<(), AllocationError> {
            let (id, number) = Self::with_machine_by_code(site, machine_code, |record, _| {
                let tray = record
                    .pallet_mut(&PalletKey::Number(pallet))
                    .ok_or(AllocationError::PalletNotFound)?;
                tray.release_booking(booking)?;
                Ok(tray.number)
            })?;
            Self::deposit_event(Event::PalletReleased(id, number, booking));
            Ok(())
        }

        fn release_vehicle(
            site: SiteId,
            machine_code: &[u8],
            pallet: PalletNumber,
            vehicle: &[u8],
        ) -> Result<(), AllocationError> {
            let vehicle = vehicle.to_ascii_uppercase();
            let (id, number) = Self::with_machine_by_code(site, machine_code, |record, _| {
                let tray = record
                    .pallet_mut(&PalletKey::Number(pallet))
                    .ok_or(AllocationError::PalletNotFound)?;
                tray.release_vehicle(&vehicle)?;
                Ok(tray.number)
            })?;
            Self::deposit_event(Event::VehicleReleased(id, number, vehicle));
            Ok(())
        }
    }

    impl<T: Config> pallet_parknet_sites::SiteMachines for Pallet<T> {
        fn machine_count(site: SiteId, now: Moment) -> (u32, u32) {
            let mut total = 0;
            let mut online = 0;
            for (_, machine) in <Machines<T>>::iter() {
                if machine.site == site {
                    total += 1;
                    if machine.is_live(now) {
                        online += 1;
                    }
                }
            }
            (total, online)
        }

        fn occupied_count(site: SiteId) -> u32 {
            <Machines<T>>::iter()
                .filter(|(_, m)| m.site == site)
                .map(|(_, m)| m.occupancy())
                .sum()
        }

        fn force_offline(site: SiteId, _now: Moment) -> u32 {
            let mut changed = 0;
            <Machines<T>>::translate(|_, mut machine: Machine| {
                if machine.site == site && machine.status != MachineStatus::Offline {
                    machine.status = MachineStatus::Offline;
                    machine.integration.connection = ConnectionStatus::Disconnected;
                    changed += 1;
                }
                Some(machine)
            });
            changed
        }

        fn purge_site(site: SiteId) -> u32 {
            let mut purged = 0;
            <Machines<T>>::translate(|_, machine: Machine| {
                if machine.site == site {
                    <MachineCodes<T>>::remove((site, &machine.code));
                    purged += 1;
                    None
                } else {
                    Some(machine)
                }
            });
            purged
        }
    }
}
