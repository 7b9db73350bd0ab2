// Copyright 2022 Matthew Ingwersen.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you
// may not use this file except in compliance with the License. You may
// obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied. See the License for the specific language governing
// permissions and limitations under the License.

//! Resource records: their types, data, and construction from textual
//! descriptors.

mod builder;
mod error;
mod record;
mod rr_type;
mod ttl;
pub use builder::{build, build_with_ttl, strip_mask};
pub use error::BuildError;
pub use record::{Rdata, Record, Soa};
pub use rr_type::Type;
pub use ttl::Ttl;
