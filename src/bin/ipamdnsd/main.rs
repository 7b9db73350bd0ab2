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

//! The `ipamdnsd` daemon: an authoritative DNS server fed by an IPAM
//! system.

mod args;
mod config;
mod handlers;
mod ipam;
mod run;
mod telemetry;
mod webhook;

use args::Command;

fn main() {
    let args = args::parse();
    match args.command {
        Command::Run(run_args) => run::run(run_args),
    }
}
