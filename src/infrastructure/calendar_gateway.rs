use crate::domain::intervals::Interval;
use crate::domain::models::Appointment;
use crate::infrastructure::error::CoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Mutex;

/// Busy-time source for regeneration. Implementations own provider
/// specifics; the engine only ever sees merged-ready intervals and
/// read-only appointments.
#[async_trait]
pub trait CalendarGateway: Send + Sync {
    /// Raw busy intervals over `[from, to)` across the given calendars.
    /// May overlap; the caller merges.
    async fn busy_intervals(
        &self,
        calendar_ids: &[String],
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Interval>, CoreError>;

    /// Appointments over `[from, to)` for the today view.
    async fn appointments(
        &self,
        calendar_ids: &[String],
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Appointment>, CoreError>;
}

/// Deterministic gateway used by the engine tests and as the default until
/// a provider client is wired in.
#[derive(Debug, Default)]
pub struct InMemoryCalendarGateway {
    appointments: Mutex<Vec<Appointment>>,
}

impl InMemoryCalendarGateway {
    pub fn with_appointments(appointments: Vec<Appointment>) -> Self {
        Self {
            appointments: Mutex::new(appointments),
        }
    }

    pub fn set_appointments(&self, appointments: Vec<Appointment>) -> Result<(), CoreError> {
        *self.locked()? = appointments;
        Ok(())
    }

    fn locked(&self) -> Result<std::sync::MutexGuard<'_, Vec<Appointment>>, CoreError> {
        self.appointments
            .lock()
            .map_err(|error| CoreError::InvalidConfig(format!("gateway lock poisoned: {error}")))
    }
}

// The fake holds one flat appointment list, so calendar ids are accepted
// and ignored.
#[async_trait]
impl CalendarGateway for InMemoryCalendarGateway {
    async fn busy_intervals(
        &self,
        _calendar_ids: &[String],
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Interval>, CoreError> {
        let appointments = self.locked()?;
        Ok(appointments
            .iter()
            .filter(|appointment| appointment.start_time < to && from < appointment.end_time)
            .map(|appointment| Interval::new(appointment.start_time, appointment.end_time))
            .collect())
    }

    async fn appointments(
        &self,
        _calendar_ids: &[String],
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Appointment>, CoreError> {
        let appointments = self.locked()?;
        let mut selected: Vec<Appointment> = appointments
            .iter()
            .filter(|appointment| appointment.start_time < to && from < appointment.end_time)
            .cloned()
            .collect();
        selected.sort_by(|left, right| left.start_time.cmp(&right.start_time));
        Ok(selected)
    }
}
