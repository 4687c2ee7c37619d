// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use super::{deadline, park};
use crate::{AioStatus, AsyncOp, Result, Wait};

struct AioBlock {
    status: Mutex<AioStatus>,
    cond: Condvar,
}

/// Control block of one asynchronous host transfer.
#[derive(Clone)]
pub struct HostAio {
    block: Arc<AioBlock>,
}

impl HostAio {
    pub(super) fn submitted() -> Self {
        Self {
            block: Arc::new(AioBlock {
                status: Mutex::new(AioStatus::InProgress),
                cond: Condvar::new(),
            }),
        }
    }

    pub(super) fn complete(&self, outcome: Result<usize>) {
        let mut status = self.block.status.lock();
        *status = match outcome {
            Ok(bytes) => AioStatus::Done(bytes),
            Err(err) => AioStatus::Failed(err),
        };
        self.block.cond.notify_all();
    }
}

impl AsyncOp for HostAio {
    fn poll(&self) -> AioStatus {
        self.block.status.lock().clone()
    }

    fn wait(&self, wait: Wait) -> Result<usize> {
        let deadline = deadline(wait);
        let mut status = self.block.status.lock();
        loop {
            let current = status.clone();
            match current {
                AioStatus::Done(bytes) => return Ok(bytes),
                AioStatus::Failed(err) => return Err(err),
                AioStatus::Idle | AioStatus::InProgress => {
                    park(&self.block.cond, &mut status, wait, deadline)?
                }
            }
        }
    }
}
