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
    fn create_site() -> Weight;
    fn update_site() -> Weight;
    fn set_site_status() -> Weight;
    fn deactivate_site() -> Weight;
    fn delete_site() -> Weight;
    fn register_operator() -> Weight;
    fn set_operator_status() -> Weight;
    fn assign_operator() -> Weight;
    fn unassign_operator() -> Weight;
}

impl WeightInfo for () {
    fn create_site() -> Weight {
        Default::default()
    }
    fn update_site() -> Weight {
        Default::default()
    }
    fn set_site_status() -> Weight {
        Default::default()
    }
    fn deactivate_site() -> Weight {
        Default::default()
    }
    fn delete_site() -> Weight {
        Default::default()
    }
    fn register_operator() -> Weight {
        Default::default()
    }
    fn set_operator_status() -> Weight {
        Default::default()
    }
    fn assign_operator() -> Weight {
        Default::default()
    }
    fn unassign_operator() -> Weight {
        Default::default()
    }
}
