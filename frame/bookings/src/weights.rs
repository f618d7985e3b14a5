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
    fn create_booking() -> Weight;
    fn verify_otp() -> Weight;
    fn regenerate_otp() -> Weight;
    fn complete_booking() -> Weight;
    fn cancel_booking() -> Weight;
    fn extend_booking() -> Weight;
    fn update_booking() -> Weight;
}

impl WeightInfo for () {
    fn create_booking() -> Weight {
        Default::default()
    }
    fn verify_otp() -> Weight {
        Default::default()
    }
    fn regenerate_otp() -> Weight {
        Default::default()
    }
    fn complete_booking() -> Weight {
        Default::default()
    }
    fn cancel_booking() -> Weight {
        Default::default()
    }
    fn extend_booking() -> Weight {
        Default::default()
    }
    fn update_booking() -> Weight {
        Default::default()
    }
}
