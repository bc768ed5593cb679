// ── State tracker ──
//
// Holds the authoritative snapshot and folds device reads into it. Each
// event kind maps to one `Action` through an exhaustive match, so a new
// event variant cannot be added without deciding what it re-reads.

use embermug_api::{BatteryState, Event, LiquidState, Mug, Peripheral, Temperature};
use tracing::{debug, warn};

use crate::error::CoreError;
use crate::protocol::Snapshot;

/// A snapshot field backed by one device attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    State,
    Current,
    Target,
    HasLiquid,
    Battery,
}

impl Field {
    /// Read order for a full refresh.
    pub const ALL: [Field; 5] = [
        Field::State,
        Field::Current,
        Field::Target,
        Field::HasLiquid,
        Field::Battery,
    ];

    async fn read<P: Peripheral>(self, mug: &Mug<P>) -> Result<Reading, embermug_api::Error> {
        Ok(match self {
            Field::State => Reading::State(mug.liquid_state().await?),
            Field::Current => Reading::Current(mug.current_temperature().await?),
            Field::Target => Reading::Target(mug.target_temperature().await?),
            Field::HasLiquid => Reading::HasLiquid(mug.has_liquid().await?),
            Field::Battery => Reading::Battery(mug.battery().await?),
        })
    }
}

/// A freshly read value for one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reading {
    State(LiquidState),
    Current(Temperature),
    Target(Temperature),
    HasLiquid(bool),
    Battery(BatteryState),
}

/// What an event asks the tracker to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Reread(Field),
    SetCharging(bool),
    Ignore,
}

impl Action {
    pub fn for_event(event: Event) -> Self {
        match event {
            Event::RefreshBattery => Action::Reread(Field::Battery),
            Event::Charging => Action::SetCharging(true),
            Event::NotCharging => Action::SetCharging(false),
            Event::RefreshTarget => Action::Reread(Field::Target),
            Event::RefreshTemperature => Action::Reread(Field::Current),
            Event::RefreshLevel => Action::Reread(Field::HasLiquid),
            Event::RefreshState => Action::Reread(Field::State),
            Event::NotImplemented => Action::Ignore,
        }
    }
}

/// Replace one field, returning whether the value differed.
fn replace<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        false
    } else {
        *slot = value;
        true
    }
}

impl Snapshot {
    fn apply(&mut self, reading: Reading) -> bool {
        match reading {
            Reading::State(v) => replace(&mut self.state, v),
            Reading::Current(v) => replace(&mut self.current, v),
            Reading::Target(v) => replace(&mut self.target, v),
            Reading::HasLiquid(v) => replace(&mut self.has_liquid, v),
            Reading::Battery(v) => replace(&mut self.battery, v),
        }
    }
}

// ── StateTracker ─────────────────────────────────────────────────────

/// Owner of the live [`Snapshot`].
#[derive(Debug, Default)]
pub struct StateTracker {
    snapshot: Snapshot,
}

impl StateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// Set the connectivity flag. Returns whether it changed.
    pub fn set_connected(&mut self, connected: bool) -> bool {
        replace(&mut self.snapshot.connected, connected)
    }

    /// Read every field from the mug.
    ///
    /// A failed read is logged and leaves that field at its previous value;
    /// it never stops the remaining reads. Returns whether anything changed.
    pub async fn refresh<P: Peripheral>(&mut self, mug: &Mug<P>) -> bool {
        let mut changed = false;
        for field in Field::ALL {
            match field.read(mug).await {
                Ok(reading) => changed |= self.snapshot.apply(reading),
                Err(e) => warn!(?field, error = %e, "failed to read mug attribute"),
            }
        }
        debug!(changed, "full refresh complete");
        changed
    }

    /// Fold one device event into the snapshot.
    ///
    /// Charging notifications carry their own value and always count as a
    /// change. On a read error the snapshot is left untouched and the error
    /// is returned for the caller to log.
    pub async fn apply_event<P: Peripheral>(
        &mut self,
        mug: &Mug<P>,
        event: Event,
    ) -> Result<bool, CoreError> {
        match Action::for_event(event) {
            Action::Reread(field) => {
                let reading = field.read(mug).await?;
                Ok(self.snapshot.apply(reading))
            }
            Action::SetCharging(charging) => {
                self.snapshot.battery.charging = charging;
                Ok(true)
            }
            Action::Ignore => Ok(false),
        }
    }
}
