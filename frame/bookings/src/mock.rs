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
//! Mock runtime composing the full Parknet module stack for booking tests.

use crate as bookings;
use frame_support::{assert_ok, parameter_types, traits::Randomness};
use pallet_parknet_customers as customers;
use pallet_parknet_machines as machines;
use pallet_parknet_sites::{self as sites, PostalAddress, Role, SiteRole};
use parknet_primitives::{KinematicType, MachineId, SiteId, VehicleClass, MINUTE_MS};
use sp_core::H256;
use sp_runtime::{traits::IdentityLookup, BuildStorage};

type Block = frame_system::mocking::MockBlock<Test>;

frame_support::construct_runtime!(
    pub enum Test {
        System: frame_system,
        Timestamp: pallet_timestamp,
        Sites: sites,
        Machines: machines,
        Customers: customers,
        Bookings: bookings,
    }
);

parameter_types! {
    pub const BlockHashCount: u64 = 250;
}

impl frame_system::Config for Test {
    type RuntimeOrigin = RuntimeOrigin;
    type RuntimeCall = RuntimeCall;
    type Nonce = u64;
    type Block = Block;
    type Hash = H256;
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

impl pallet_timestamp::Config for Test {
    type Moment = u64;
    type OnTimestampSet = ();
    type MinimumPeriod = ();
    type WeightInfo = ();
}

impl sites::Config for Test {
    type Time = Timestamp;
    type Machines = Machines;
    type Bookings = Bookings;
    type RuntimeEvent = RuntimeEvent;
    type WeightInfo = ();
}

parameter_types! {
    pub const MaxPalletsPerMachine: u32 = 64;
}

impl machines::Config for Test {
    type Time = Timestamp;
    type Sites = Sites;
    type RuntimeEvent = RuntimeEvent;
    type MaxPalletsPerMachine = MaxPalletsPerMachine;
    type WeightInfo = ();
}

/// Deterministic entropy: a hash of the subject bytes.
pub struct TestRandomness;
impl Randomness<H256, u64> for TestRandomness {
    fn random(subject: &[u8]) -> (H256, u64) {
        (H256::from(sp_io::hashing::blake2_256(subject)), 0)
    }
}

parameter_types! {
    pub const CredentialRetries: u32 = 5;
}

impl customers::Config for Test {
    type Time = Timestamp;
    type Randomness = TestRandomness;
    type Sites = Sites;
    type Bookings = Bookings;
    type RuntimeEvent = RuntimeEvent;
    type CredentialRetries = CredentialRetries;
    type WeightInfo = ();
}

parameter_types! {
    pub const OtpTtl: u64 = 30 * MINUTE_MS;
    pub const OtpRetries: u32 = 5;
}

impl bookings::Config for Test {
    type Time = Timestamp;
    type Randomness = TestRandomness;
    type Sites = Sites;
    type Machines = Machines;
    type Customers = Customers;
    type RuntimeEvent = RuntimeEvent;
    type OtpTtl = OtpTtl;
    type OtpRetries = OtpRetries;
    type WeightInfo = ();
}

pub const ADMIN: u64 = 1;
pub const SUPERVISOR: u64 = 2;
pub const OPERATOR: u64 = 3;
pub const OUTSIDER: u64 = 9;

/// 2025-01-01T10:00:00Z.
pub const NOW: u64 = 1_735_725_600_000;

/// Staff, one site and three machines, mirroring the operational floor the
/// scenario tests run on: `M001` rotary two-wheeler, `M002` rotary
/// four-wheeler, `M003` puzzle four-wheeler.
pub fn new_test_ext() -> sp_io::TestExternalities {
    let storage = frame_system::GenesisConfig::<Test>::default()
        .build_storage()
        .unwrap();
    let mut ext: sp_io::TestExternalities = storage.into();
    ext.execute_with(|| {
        System::set_block_number(1);
        Timestamp::set_timestamp(NOW);

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

        let site = create_site(b"SITE001");
        for staff in [SUPERVISOR, OPERATOR] {
            assert_ok!(Sites::assign_operator(
                RuntimeOrigin::signed(ADMIN),
                staff,
                site,
                SiteRole::Operator,
                vec![],
            ));
        }

        register_machine(site, b"M001", KinematicType::Rotary, VehicleClass::TwoWheeler, 8);
        register_machine(site, b"M002", KinematicType::Rotary, VehicleClass::FourWheeler, 4);
        register_machine(site, b"M003", KinematicType::Puzzle, VehicleClass::FourWheeler, 4);
    });
    ext
}

pub fn create_site(code: &[u8]) -> SiteId {
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
        3,
        16,
    ));
    id
}

pub fn register_machine(
    site: SiteId,
    code: &[u8],
    kinematic: KinematicType,
    class: VehicleClass,
    total: u32,
) -> MachineId {
    let id = Machines::next_machine_id();
    assert_ok!(Machines::register_machine(
        RuntimeOrigin::signed(ADMIN),
        site,
        code.to_vec(),
        kinematic,
        class,
        total,
        Default::default(),
        None,
    ));
    id
}

/// The site created by `new_test_ext`.
pub const SITE: SiteId = 0;

/// Machine ids in registration order.
pub const M001: MachineId = 0;
pub const M002: MachineId = 1;
pub const M003: MachineId = 2;
