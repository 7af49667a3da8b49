use std::collections::VecDeque;

/// Events due at a tick number. Entries with the same due tick fire in the
/// order they were scheduled.
pub struct Schedule<E> {
    now: u64,
    pending: VecDeque<(u64, E)>,
}

impl<E> Default for Schedule<E> {
    fn default() -> Self {
        Schedule { now: 0, pending: VecDeque::new() }
    }
}

impl<E> Schedule<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> u64 {
        self.now
    }

    pub fn schedule(&mut self, delay_ticks: u64, event: E) {
        let due = self.now + delay_ticks;
        let index = self.pending.partition_point(|(at, _)| *at <= due);
        self.pending.insert(index, (due, event));
    }

    /// Moves time forward one tick and returns everything now due.
    pub fn advance(&mut self) -> Vec<E> {
        self.now += 1;
        let mut due = Vec::new();
        while self.pending.front().is_some_and(|(at, _)| *at <= self.now) {
            if let Some((_, event)) = self.pending.pop_front() {
                due.push(event);
            }
        }
        due
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_fire_after_their_delay() {
        let mut schedule = Schedule::new();
        schedule.schedule(3, "respawn");

        assert!(schedule.advance().is_empty());
        assert!(schedule.advance().is_empty());
        assert_eq!(schedule.advance(), vec!["respawn"]);
        assert!(schedule.is_empty());
    }

    #[test]
    fn same_tick_events_keep_insertion_order() {
        let mut schedule = Schedule::new();
        schedule.schedule(2, 'b');
        schedule.schedule(1, 'a');
        schedule.schedule(2, 'c');
        schedule.schedule(0, 'z');

        assert_eq!(schedule.advance(), vec!['z', 'a']);
        assert_eq!(schedule.advance(), vec!['b', 'c']);
        assert_eq!(schedule.len(), 0);
    }

    #[test]
    fn delays_are_relative_to_current_tick() {
        let mut schedule = Schedule::new();
        for _ in 0..10 {
            schedule.advance();
        }
        schedule.schedule(2, 1u8);
        assert!(schedule.advance().is_empty());
        assert_eq!(schedule.advance(), vec![1]);
        assert_eq!(schedule.now(), 12);
    }
}
