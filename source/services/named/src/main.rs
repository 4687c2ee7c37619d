// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Name Service daemon entrypoint

fn main() {
    env_logger::init();
    named::cli::run();
}
