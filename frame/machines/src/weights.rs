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
use frame_support::weights::Weight;

pub trait WeightInfo {
    fn register_machine() -> Weight;
    fn update_machine() -> Weight;
    fn set_machine_status() -> Weight;
    fn remove_machine() -> Weight;
    fn occupy_pallet() -> Weight;
    fn release_pallet() -> Weight;
    fn release_vehicle() -> Weight;
    fn set_pallet_maintenance() -> Weight;
    fn clear_pallet_maintenance() -> Weight;
    fn set_pallet_name() -> Weight;
    fn heartbeat() -> Weight;
    fn schedule_service() -> Weight;
}

impl WeightInfo for () {
    fn register_machine() -> Weight {
        Default::default()
    }
    fn update_machine() -> Weight {
        Default::default()
    }
    fn set_machine_status() -> Weight {
        Default::default()
    }
    fn remove_machine() -> Weight {
        Default::default()
    }
    fn occupy_pallet() -> Weight {
        Default::default()
    }
    fn release_pallet() -> Weight {
        Default::default()
    }
    fn release_vehicle() -> Weight {
        Default::default()
    }
    fn set_pallet_maintenance() -> Weight {
        Default::default()
    }
    fn clear_pallet_maintenance() -> Weight {
        Default::default()
    }
    fn set_pallet_name() -> Weight {
        Default::default()
    }
    fn heartbeat() -> Weight {
        Default::default()
    }
    fn schedule_service() -> Weight {
        Default::default()
    }
}
