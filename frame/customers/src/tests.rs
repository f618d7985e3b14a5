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
//! Customer and membership engine tests.

use crate::{self as customers, *};
use frame_support::{assert_err, assert_ok, parameter_types, traits::Randomness};
use pallet_parknet_sites::{self as sites, Role};
use parknet_primitives::MONTH_MS;
use sp_core::H256;
use sp_runtime::{traits::IdentityLookup, BuildStorage};
use std::cell::RefCell;

type Block = frame_system::mocking::MockBlock<Runtime>;

frame_support::construct_runtime!(
    pub enum Runtime {
        System: frame_system,
        Timestamp: pallet_timestamp,
        Sites: sites,
        Customers: customers,
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

impl pallet_timestamp::Config for Runtime {
    type Moment = u64;
    type OnTimestampSet = ();
    type MinimumPeriod = ();
    type WeightInfo = ();
}

impl sites::Config for Runtime {
    type Time = Timestamp;
    type Machines = ();
    type Bookings = ();
    type RuntimeEvent = RuntimeEvent;
    type WeightInfo = ();
}

/// Deterministic entropy: a hash of the subject bytes.
pub struct TestRandomness;
impl Randomness<H256, u64> for TestRandomness {
    fn random(subject: &[u8]) -> (H256, u64) {
        (H256::from(sp_io::hashing::blake2_256(subject)), 0)
    }
}

thread_local! {
    static PLATE_IN_USE: RefCell<bool> = RefCell::new(false);
    static CUSTOMER_IN_USE: RefCell<bool> = RefCell::new(false);
}

pub struct TestBookings;
impl BookingGuard for TestBookings {
    fn has_active_for_plate(_: &[u8]) -> bool {
        PLATE_IN_USE.with(|b| *b.borrow())
    }
    fn has_active_for_customer(_: CustomerId) -> bool {
        CUSTOMER_IN_USE.with(|b| *b.borrow())
    }
}

parameter_types! {
    pub const CredentialRetries: u32 = 5;
}

impl Config for Runtime {
    type Time = Timestamp;
    type Randomness = TestRandomness;
    type Sites = Sites;
    type Bookings = TestBookings;
    type RuntimeEvent = RuntimeEvent;
    type CredentialRetries = CredentialRetries;
    type WeightInfo = ();
}

const OPERATOR: u64 = 1;
const OUTSIDER: u64 = 9;

const NOW: u64 = 1_600_438_152_000;

fn new_test_ext() -> sp_io::TestExternalities {
    PLATE_IN_USE.with(|b| *b.borrow_mut() = false);
    CUSTOMER_IN_USE.with(|b| *b.borrow_mut() = false);
    let storage = frame_system::GenesisConfig::<Runtime>::default()
        .build_storage()
        .unwrap();
    let mut ext: sp_io::TestExternalities = storage.into();
    ext.execute_with(|| {
        System::set_block_number(1);
        Timestamp::set_timestamp(NOW);
        assert_ok!(Sites::register_operator(
            RuntimeOrigin::root(),
            OPERATOR,
            b"OP001".to_vec(),
            b"Asha Rao".to_vec(),
            Role::Operator,
        ));
    });
    ext
}

fn create_customer(phone: &[u8]) -> CustomerId {
    let id = Customers::next_customer_id();
    assert_ok!(Customers::create_customer(
        RuntimeOrigin::signed(OPERATOR),
        b"Ravi".to_vec(),
        b"Menon".to_vec(),
        phone.to_vec(),
        Some(b"ravi@example.com".to_vec()),
        vec![(b"ka01ab1001".to_vec(), VehicleClass::TwoWheeler)],
    ));
    id
}

#[test]
fn test_create_customer() {
    new_test_ext().execute_with(|| {
        let id = create_customer(b"9876543210");
        let record = Customers::customer(id).unwrap();
        assert_eq!(record.code, b"CUST152000".to_vec());
        assert_eq!(record.full_name(), b"Ravi Menon".to_vec());
        assert_eq!(record.status, CustomerStatus::Active);
        // Plates are normalized uppercase on the way in.
        assert_eq!(record.vehicles[0].plate, b"KA01AB1001".to_vec());
        assert_eq!(Customers::customer_by_phone(b"9876543210"), Some(id));

        assert_err!(
            Customers::create_customer(
                RuntimeOrigin::signed(OPERATOR),
                b"Ravi".to_vec(),
                vec![],
                b"9876543210".to_vec(),
                None,
                vec![],
            ),
            Error::<Runtime>::DuplicatePhone
        );
        assert_err!(
            Customers::create_customer(
                RuntimeOrigin::signed(OPERATOR),
                b"Ravi".to_vec(),
                vec![],
                b"1234567890".to_vec(),
                None,
                vec![],
            ),
            Error::<Runtime>::InvalidPhone
        );
        assert_err!(
            Customers::create_customer(
                RuntimeOrigin::signed(OPERATOR),
                b"Ravi".to_vec(),
                vec![],
                b"9876543211".to_vec(),
                Some(b"not-an-email".to_vec()),
                vec![],
            ),
            Error::<Runtime>::InvalidEmail
        );
        assert_err!(
            Customers::create_customer(
                RuntimeOrigin::signed(OUTSIDER),
                b"Ravi".to_vec(),
                vec![],
                b"9876543212".to_vec(),
                None,
                vec![],
            ),
            Error::<Runtime>::NotAuthorized
        );
    })
}

#[test]
fn test_vehicle_lifecycle() {
    new_test_ext().execute_with(|| {
        let id = create_customer(b"9876543210");

        assert_err!(
            Customers::add_vehicle(
                RuntimeOrigin::signed(OPERATOR),
                id,
                b"KA01AB1001".to_vec(),
                VehicleClass::TwoWheeler,
                vec![],
                vec![],
                vec![],
            ),
            Error::<Runtime>::DuplicateVehicle
        );

        assert_ok!(Customers::add_vehicle(
            RuntimeOrigin::signed(OPERATOR),
            id,
            b"ka05mh1234".to_vec(),
            VehicleClass::FourWheeler,
            b"Maruti".to_vec(),
            b"Swift".to_vec(),
            b"red".to_vec(),
        ));
        let record = Customers::customer(id).unwrap();
        assert_eq!(record.vehicles.len(), 2);
        assert_eq!(record.vehicles[1].id, 1);
        assert_eq!(record.vehicles[1].plate, b"KA05MH1234".to_vec());

        // Removal is blocked while a session for the plate is active.
        PLATE_IN_USE.with(|b| *b.borrow_mut() = true);
        assert_err!(
            Customers::remove_vehicle(RuntimeOrigin::signed(OPERATOR), id, 1),
            Error::<Runtime>::VehicleHasActiveBooking
        );
        PLATE_IN_USE.with(|b| *b.borrow_mut() = false);

        assert_ok!(Customers::remove_vehicle(RuntimeOrigin::signed(OPERATOR), id, 1));
        let record = Customers::customer(id).unwrap();
        assert!(!record.vehicles[1].active);
        assert_err!(
            Customers::remove_vehicle(RuntimeOrigin::signed(OPERATOR), id, 1),
            Error::<Runtime>::VehicleNotFound
        );

        // The plate can be attached again after the soft delete.
        assert_ok!(Customers::add_vehicle(
            RuntimeOrigin::signed(OPERATOR),
            id,
            b"KA05MH1234".to_vec(),
            VehicleClass::FourWheeler,
            vec![],
            vec![],
            vec![],
        ));
    })
}

#[test]
fn test_deactivate_customer_frees_phone() {
    new_test_ext().execute_with(|| {
        let id = create_customer(b"9876543210");

        CUSTOMER_IN_USE.with(|b| *b.borrow_mut() = true);
        assert_err!(
            Customers::deactivate_customer(
                RuntimeOrigin::signed(OPERATOR),
                id,
                b"moved away".to_vec()
            ),
            Error::<Runtime>::CustomerHasActiveBooking
        );
        CUSTOMER_IN_USE.with(|b| *b.borrow_mut() = false);

        assert_ok!(Customers::deactivate_customer(
            RuntimeOrigin::signed(OPERATOR),
            id,
            b"moved away".to_vec()
        ));
        let record = Customers::customer(id).unwrap();
        assert_eq!(record.status, CustomerStatus::Inactive);
        assert_eq!(record.deleted, Some((NOW, b"moved away".to_vec())));
        assert_eq!(Customers::customer_by_phone(b"9876543210"), None);

        // Phone uniqueness holds among active customers only.
        create_customer(b"9876543210");
    })
}

#[test]
fn test_membership_issue_and_validate() {
    new_test_ext().execute_with(|| {
        let id = create_customer(b"9876543210");

        assert_ok!(Customers::create_membership(
            RuntimeOrigin::signed(OPERATOR),
            id,
            MembershipKind::Yearly,
            12,
            vec![VehicleClass::TwoWheeler],
            None,
            PaymentMethod::Upi,
            None,
        ));
        let record = Customers::customer(id).unwrap();
        let membership = record.membership.clone().unwrap();
        assert!((100_000..=999_999).contains(&membership.number));
        assert!((1_000..=9_999).contains(&membership.pin));
        assert_eq!(membership.expires_at, NOW + 12 * MONTH_MS);
        assert!(membership.active);
        assert_eq!(Customers::customer_by_membership(membership.number), Some(id));

        // Ledger row with the yearly default fee.
        let payment = Customers::membership_payment(0).unwrap();
        assert_eq!(payment.amount, 4_000);
        assert_eq!(payment.status, PaymentStatus::Completed);
        assert_eq!(payment.membership_number, membership.number);
        assert_eq!(payment.created_by, Some(OPERATOR));

        // Credential round-trip.
        assert_eq!(
            Customers::validate(
                membership.number,
                membership.pin,
                Some(VehicleClass::TwoWheeler),
                NOW
            ),
            Some(id)
        );
        // Wrong PIN, wrong class, expired: all indistinguishable failures.
        assert_eq!(
            Customers::validate(membership.number, membership.pin + 1, None, NOW),
            None
        );
        assert_eq!(
            Customers::validate(
                membership.number,
                membership.pin,
                Some(VehicleClass::FourWheeler),
                NOW
            ),
            None
        );
        assert_eq!(
            Customers::validate(
                membership.number,
                membership.pin,
                None,
                membership.expires_at
            ),
            None
        );
        assert_eq!(
            Customers::validate(
                membership.number,
                membership.pin,
                None,
                membership.expires_at - 1
            ),
            Some(id)
        );
    })
}

#[test]
fn test_membership_coverage_extension_keeps_expiry() {
    new_test_ext().execute_with(|| {
        let id = create_customer(b"9876543210");
        assert_ok!(Customers::create_membership(
            RuntimeOrigin::signed(OPERATOR),
            id,
            MembershipKind::Yearly,
            12,
            vec![VehicleClass::TwoWheeler],
            None,
            PaymentMethod::Upi,
            None,
        ));
        let before = Customers::customer(id).unwrap().membership.unwrap();

        // Same coverage again is already entitled.
        assert_err!(
            Customers::create_membership(
                RuntimeOrigin::signed(OPERATOR),
                id,
                MembershipKind::Yearly,
                12,
                vec![VehicleClass::TwoWheeler],
                None,
                PaymentMethod::Upi,
                None,
            ),
            Error::<Runtime>::AlreadyCovered
        );

        // Adding the other class widens coverage in place: same number,
        // same expiry, one more ledger row.
        assert_ok!(Customers::create_membership(
            RuntimeOrigin::signed(OPERATOR),
            id,
            MembershipKind::Yearly,
            12,
            vec![VehicleClass::FourWheeler],
            Some(4_000),
            PaymentMethod::Upi,
            None,
        ));
        let after = Customers::customer(id).unwrap().membership.unwrap();
        assert_eq!(after.number, before.number);
        assert_eq!(after.expires_at, before.expires_at);
        assert_eq!(
            after.covered,
            vec![VehicleClass::TwoWheeler, VehicleClass::FourWheeler]
        );
        let payment = Customers::membership_payment(1).unwrap();
        assert_eq!(payment.amount, 4_000);
        assert_eq!(payment.expiry, before.expires_at);
        assert_eq!(Customers::next_payment_id(), 2);
    })
}

#[test]
fn test_lapsed_membership_renews_fresh() {
    new_test_ext().execute_with(|| {
        let id = create_customer(b"9876543210");
        assert_ok!(Customers::create_membership(
            RuntimeOrigin::signed(OPERATOR),
            id,
            MembershipKind::Monthly,
            1,
            vec![VehicleClass::TwoWheeler],
            None,
            PaymentMethod::Cash,
            None,
        ));
        let old = Customers::customer(id).unwrap().membership.unwrap();

        // Run the clock past expiry; a renewal issues fresh credentials
        // with a fresh term.
        Timestamp::set_timestamp(NOW + 2 * MONTH_MS);
        assert_ok!(Customers::create_membership(
            RuntimeOrigin::signed(OPERATOR),
            id,
            MembershipKind::Monthly,
            1,
            vec![VehicleClass::TwoWheeler],
            None,
            PaymentMethod::Cash,
            None,
        ));
        let renewed = Customers::customer(id).unwrap().membership.unwrap();
        assert_ne!(renewed.number, old.number);
        assert_eq!(renewed.expires_at, NOW + 3 * MONTH_MS);
        assert_eq!(Customers::customer_by_membership(old.number), None);
        assert_eq!(Customers::customer_by_membership(renewed.number), Some(id));
    })
}

#[test]
fn test_deactivate_membership_keeps_ledger() {
    new_test_ext().execute_with(|| {
        let id = create_customer(b"9876543210");
        assert_ok!(Customers::create_membership(
            RuntimeOrigin::signed(OPERATOR),
            id,
            MembershipKind::Premium,
            12,
            vec![VehicleClass::TwoWheeler, VehicleClass::FourWheeler],
            None,
            PaymentMethod::Card,
            None,
        ));
        let membership = Customers::customer(id).unwrap().membership.unwrap();

        assert_ok!(Customers::deactivate_membership(
            RuntimeOrigin::signed(OPERATOR),
            id
        ));
        assert_eq!(
            Customers::validate(membership.number, membership.pin, None, NOW),
            None
        );
        assert_eq!(Customers::customer_by_membership(membership.number), None);
        // The ledger row survives, with the premium default fee.
        assert_eq!(Customers::membership_payment(0).unwrap().amount, 6_000);

        assert_err!(
            Customers::deactivate_membership(RuntimeOrigin::signed(OPERATOR), 99),
            Error::<Runtime>::CustomerNotFound
        );
    })
}

#[test]
fn test_public_purchase_creates_customer() {
    new_test_ext().execute_with(|| {
        assert_ok!(Customers::purchase_membership(
            RuntimeOrigin::signed(OUTSIDER),
            b"9876543210".to_vec(),
            b"Ravi".to_vec(),
            b"Menon".to_vec(),
            MembershipKind::Quarterly,
            3,
            vec![VehicleClass::TwoWheeler],
            None,
            PaymentMethod::Upi,
            Some(b"upi:TXN123".to_vec()),
        ));
        let id = Customers::customer_by_phone(b"9876543210").unwrap();
        let record = Customers::customer(id).unwrap();
        assert!(record.membership.is_some());
        // No operator audit on the public path.
        let payment = Customers::membership_payment(0).unwrap();
        assert_eq!(payment.created_by, None);
        assert_eq!(payment.amount, 1_200);
    })
}

#[test]
fn test_membership_validation_rejects_inactive_customer() {
    new_test_ext().execute_with(|| {
        let id = create_customer(b"9876543210");
        assert_ok!(Customers::create_membership(
            RuntimeOrigin::signed(OPERATOR),
            id,
            MembershipKind::Yearly,
            12,
            vec![VehicleClass::TwoWheeler],
            None,
            PaymentMethod::Upi,
            None,
        ));
        let membership = Customers::customer(id).unwrap().membership.unwrap();
        assert_ok!(Customers::deactivate_customer(
            RuntimeOrigin::signed(OPERATOR),
            id,
            vec![],
        ));
        assert_eq!(
            Customers::validate(membership.number, membership.pin, None, NOW),
            None
        );
    })
}

#[test]
fn test_search() {
    new_test_ext().execute_with(|| {
        let ravi = create_customer(b"9876543210");
        let id = Customers::next_customer_id();
        assert_ok!(Customers::create_customer(
            RuntimeOrigin::signed(OPERATOR),
            b"Meera".to_vec(),
            b"Pillai".to_vec(),
            b"9812345678".to_vec(),
            None,
            vec![(b"KA05MH1234".to_vec(), VehicleClass::FourWheeler)],
        ));

        // Too short a query returns nothing.
        assert!(Customers::search(b"9", SearchMode::All).is_empty());

        let hits = Customers::search(b"meera", SearchMode::Name);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, id);

        let hits = Customers::search(b"98765", SearchMode::Phone);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, ravi);

        let hits = Customers::search(b"ka05", SearchMode::Vehicle);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, id);

        // `All` spans every field.
        assert_eq!(Customers::search(b"98", SearchMode::All).len(), 2);
        assert!(Customers::search(b"meera", SearchMode::Phone).is_empty());
    })
}

#[test]
fn test_registry_resolve_or_create() {
    new_test_ext().execute_with(|| {
        let link = <Customers as CustomerRegistry>::resolve_or_create(
            b"9876543210",
            b"Ravi Menon",
            None,
            b"ka01ab1001",
            VehicleClass::TwoWheeler,
        )
        .unwrap();
        assert!(link.is_new);
        assert!(!link.name_updated);

        // Same phone, same name: nothing changes.
        let link = <Customers as CustomerRegistry>::resolve_or_create(
            b"9876543210",
            b"Ravi Menon",
            None,
            b"KA01AB1001",
            VehicleClass::TwoWheeler,
        )
        .unwrap();
        assert!(!link.is_new);
        assert!(!link.name_updated);

        // A differing name is operator-authoritative; a new plate is
        // attached on the fly.
        let link = <Customers as CustomerRegistry>::resolve_or_create(
            b"9876543210",
            b"Ravindra Menon",
            None,
            b"KA01AB2002",
            VehicleClass::TwoWheeler,
        )
        .unwrap();
        assert!(!link.is_new);
        assert!(link.name_updated);
        let record = Customers::customer(link.customer).unwrap();
        assert_eq!(record.first_name, b"Ravindra".to_vec());
        assert_eq!(record.vehicles.len(), 2);

        <Customers as CustomerRegistry>::note_booking(link.customer, NOW);
        <Customers as CustomerRegistry>::note_completed(link.customer, 120);
        let record = Customers::customer(link.customer).unwrap();
        assert_eq!(record.stats.total_bookings, 1);
        assert_eq!(record.stats.total_amount, 120);
        assert_eq!(record.stats.last_booking_at, Some(NOW));
    })
}
