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
    fn create_customer() -> Weight;
    fn add_vehicle() -> Weight;
    fn remove_vehicle() -> Weight;
    fn deactivate_customer() -> Weight;
    fn create_membership() -> Weight;
    fn purchase_membership() -> Weight;
    fn deactivate_membership() -> Weight;
}

impl WeightInfo for () {
    fn create_customer() -> Weight {
        Default::default()
    }
    fn add_vehicle() -> Weight {
        Default::default()
    }
    fn remove_vehicle() -> Weight {
        Default::default()
    }
    fn deactivate_customer() -> Weight {
        Default::default()
    }
    fn create_membership() -> Weight {
        Default::default()
    }
    fn purchase_membership() -> Weight {
        Default::default()
    }
    fn deactivate_membership() -> Weight {
        Default::default()
    }
}
