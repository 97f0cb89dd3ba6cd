// src/engine/core.rs

//! Pure core runtime state machine.
//!
//! This module contains a synchronous, deterministic "core runtime" that
//! consumes [`RuntimeEvent`]s and produces:
//! - an updated scheduler state
//! - a list of commands describing what the IO shell should do next
//!
//! The async shell (`engine::runtime::Runtime`) reads events from the
//! channel, talks to the worker backend and publishes snapshots. The core
//! is tested without any Tokio, channels or processes.

use std::time::Instant;

use crate::engine::event_handlers::{CoreStep, apply_event, finish_step, handle_shutdown};
use crate::engine::{RuntimeEvent, RuntimeOptions};
use crate::errors::Result;
use crate::resources::ResourceDescription;
use crate::scheduler::{SchedulerSnapshot, TaskScheduler};

/// Pure core runtime state.
///
/// It has **no** channels, no Tokio types, and does not perform any IO.
#[derive(Debug)]
pub struct CoreRuntime<D: ResourceDescription> {
    scheduler: TaskScheduler<D>,
    options: RuntimeOptions,
    submissions_closed: bool,
    stopped: bool,
}

impl<D: ResourceDescription> CoreRuntime<D> {
    pub fn new(scheduler: TaskScheduler<D>, options: RuntimeOptions) -> Self {
        Self {
            scheduler,
            options,
            submissions_closed: false,
            stopped: false,
        }
    }

    pub fn scheduler(&self) -> &TaskScheduler<D> {
        &self.scheduler
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn snapshot(&self) -> SchedulerSnapshot {
        self.scheduler.snapshot(Instant::now())
    }

    /// Handle a single runtime event, updating core state and returning the
    /// resulting commands for the IO shell.
    ///
    /// An error means the scheduler lost track of an action (or was fed an
    /// invalid task) and the runtime must stop.
    pub fn step(&mut self, event: RuntimeEvent<D>) -> Result<CoreStep<D>> {
        if self.stopped {
            return Ok(CoreStep {
                commands: Vec::new(),
                keep_running: false,
            });
        }

        let step = match event {
            RuntimeEvent::ShutdownRequested => handle_shutdown(&mut self.scheduler),
            event => {
                if apply_event(&mut self.scheduler, event)? {
                    self.submissions_closed = true;
                }
                finish_step(&mut self.scheduler, &self.options, self.submissions_closed)
            }
        };
        if !step.keep_running {
            self.stopped = true;
        }
        Ok(step)
    }
}
