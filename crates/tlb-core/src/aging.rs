//! The two periodic background tasks of the engine.
//!
//! - **DRE decay** runs every `dre.period` and decays every path's rate counter.
//! - **Health check** runs every `aging.check_period`, expiring soft/hard
//!   windows on path records and reclaiming idle flows and acklets.
//!
//! Each task owns at most one pending timer. Both start on the first engine
//! call and reschedule themselves from their own fire time, so their phase is
//! independent of flow events and of each other.

use crate::time::SimTime;
use crate::timer::{TimerHandle, TimerQueue};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgingTask {
    DreDecay,
    HealthCheck,
}

pub struct AgingScheduler {
    timers: TimerQueue<AgingTask>,
    dre: Option<TimerHandle>,
    check: Option<TimerHandle>,
    dre_period: Duration,
    check_period: Duration,
    stopped: bool,
}

impl AgingScheduler {
    pub fn new(dre_period: Duration, check_period: Duration) -> Self {
        Self {
            timers: TimerQueue::new(),
            dre: None,
            check: None,
            dre_period,
            check_period,
            stopped: false,
        }
    }

    pub fn is_started(&self) -> bool {
        self.dre.is_some() || self.check.is_some()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Number of pending task timers (0..=2).
    pub fn pending(&self) -> usize {
        self.timers.len()
    }

    /// Schedules whichever task has no pending timer.
    pub fn ensure_started(&mut self, now: SimTime) {
        if self.stopped {
            return;
        }
        if self.dre.is_none() {
            self.dre = Some(self.timers.schedule(now + self.dre_period, AgingTask::DreDecay));
        }
        if self.check.is_none() {
            self.check = Some(
                self.timers
                    .schedule(now + self.check_period, AgingTask::HealthCheck),
            );
        }
    }

    pub fn next_deadline(&mut self) -> Option<SimTime> {
        self.timers.next_deadline()
    }

    /// Pops the next task due at or before `now`, releasing its handle.
    pub fn next_due(&mut self, now: SimTime) -> Option<(SimTime, AgingTask)> {
        let (at, _, task) = self.timers.pop_due(now)?;
        match task {
            AgingTask::DreDecay => self.dre = None,
            AgingTask::HealthCheck => self.check = None,
        }
        Some((at, task))
    }

    /// Re-arms `task` one period after `fired_at`, unless it is already pending.
    pub fn reschedule(&mut self, task: AgingTask, fired_at: SimTime) {
        if self.stopped {
            return;
        }
        match task {
            AgingTask::DreDecay if self.dre.is_none() => {
                self.dre = Some(self.timers.schedule(fired_at + self.dre_period, task));
            }
            AgingTask::HealthCheck if self.check.is_none() => {
                self.check = Some(self.timers.schedule(fired_at + self.check_period, task));
            }
            _ => {}
        }
    }

    /// Cancels both pending timers; no task runs again.
    pub fn cancel_all(&mut self) {
        for handle in [self.dre.take(), self.check.take()].into_iter().flatten() {
            self.timers.cancel(handle);
        }
        self.timers.clear();
        self.stopped = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheduler() -> AgingScheduler {
        AgingScheduler::new(Duration::from_micros(30), Duration::from_micros(100))
    }

    fn drain(s: &mut AgingScheduler, now: SimTime) -> Vec<(SimTime, AgingTask)> {
        let mut fired = Vec::new();
        while let Some((at, task)) = s.next_due(now) {
            fired.push((at, task));
            s.reschedule(task, at);
        }
        fired
    }

    #[test]
    fn lazy_start_schedules_one_timer_per_task() {
        let mut s = scheduler();
        assert!(!s.is_started());
        s.ensure_started(SimTime::ZERO);
        s.ensure_started(SimTime::from_micros(5));
        assert!(s.is_started());
        assert_eq!(s.pending(), 2);
    }

    #[test]
    fn tasks_run_on_independent_periods() {
        let mut s = scheduler();
        s.ensure_started(SimTime::ZERO);
        let fired = drain(&mut s, SimTime::from_micros(200));

        let dre: Vec<u64> = fired
            .iter()
            .filter(|(_, t)| *t == AgingTask::DreDecay)
            .map(|(at, _)| at.as_nanos() / 1_000)
            .collect();
        let check: Vec<u64> = fired
            .iter()
            .filter(|(_, t)| *t == AgingTask::HealthCheck)
            .map(|(at, _)| at.as_nanos() / 1_000)
            .collect();

        assert_eq!(dre, vec![30, 60, 90, 120, 150, 180]);
        assert_eq!(check, vec![100, 200]);
        // still exactly one pending timer each
        assert_eq!(s.pending(), 2);
    }

    #[test]
    fn reschedule_is_at_most_one_in_flight() {
        let mut s = scheduler();
        s.ensure_started(SimTime::ZERO);
        s.reschedule(AgingTask::DreDecay, SimTime::ZERO);
        assert_eq!(s.pending(), 2);
    }

    #[test]
    fn cancel_all_stops_everything() {
        let mut s = scheduler();
        s.ensure_started(SimTime::ZERO);
        s.cancel_all();
        assert_eq!(s.pending(), 0);
        assert!(drain(&mut s, SimTime::from_millis(1)).is_empty());
        s.ensure_started(SimTime::from_millis(1));
        assert_eq!(s.pending(), 0);
        assert!(s.is_stopped());
    }
}
