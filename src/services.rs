//! Best-effort service supervision.
//!
//! A service whose status output matches its healthy pattern is left alone;
//! otherwise it is started and given a grace period. The start command's exit
//! status is trusted: nothing re-probes after the grace period, so a later
//! step that depends on the service is what notices if it did not come up.
use crate::error::{BootstrapError, Result};
use crate::exec::{command_line, CommandRunner};
use crate::retry::Sleeper;
use regex::Regex;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceOutcome {
    AlreadyRunning,
    Started,
}

pub struct ServiceSupervisor<'a> {
    runner: &'a dyn CommandRunner,
    sleeper: &'a dyn Sleeper,
    service_command: String,
    grace: Duration,
}

impl<'a> ServiceSupervisor<'a> {
    pub fn new(
        runner: &'a dyn CommandRunner,
        sleeper: &'a dyn Sleeper,
        service_command: &str,
        grace: Duration,
    ) -> Self {
        Self {
            runner,
            sleeper,
            service_command: service_command.to_string(),
            grace,
        }
    }

    pub fn ensure_running(&self, service: &str, healthy: &Regex) -> Result<ServiceOutcome> {
        let status = self
            .runner
            .run(&command_line(&self.service_command, [service, "status"])?)?;
        if healthy.is_match(&status.stdout) || healthy.is_match(&status.stderr) {
            tracing::debug!(service, "service already running");
            return Ok(ServiceOutcome::AlreadyRunning);
        }

        tracing::info!(service, "starting service");
        let start = self
            .runner
            .run(&command_line(&self.service_command, [service, "start"])?)?;
        if !start.success() {
            return Err(BootstrapError::ServiceStart {
                service: service.to_string(),
                detail: start.detail(),
            });
        }
        self.sleeper.sleep(self.grace);
        Ok(ServiceOutcome::Started)
    }
}
