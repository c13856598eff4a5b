//! Ownership handoff of the instruction-word buffers.
//!
//! The driver keeps [`SLOTS`] buffers. Only their indices move between the
//! producer (the thread calling `show()`) and the consumer (the blit thread);
//! whoever holds an index owns the buffer behind it. Indices travel over
//! bounded channels, which also provide the happens-before edge between the
//! producer's writes and the consumer's reads.
//!
//! When the producer publishes faster than frames are transferred, the
//! consumer skips straight to the newest filled buffer and recycles the stale
//! ones. The producer never touches a buffer it has published.

use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use crossbeam_channel::bounded;
use crossbeam_channel::select;
use crossbeam_channel::Receiver;
use crossbeam_channel::Sender;
use crossbeam_channel::TryRecvError;

/// Number of instruction-word buffers (triple buffering).
pub const SLOTS: usize = 3;

/// Result of a consumer poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filled {
    /// A newly published buffer, now owned by the consumer.
    Ready(usize),
    /// Nothing new since the last poll.
    Empty,
    /// Exit was requested and nothing is pending.
    Exit,
}

pub struct BufferManager {
    free_tx: Sender<usize>,
    free_rx: Receiver<usize>,
    filled_tx: Sender<usize>,
    filled_rx: Receiver<usize>,
    // never sends; dropping the sender disconnects `exit_rx` for everyone
    exit_tx: Mutex<Option<Sender<()>>>,
    exit_rx: Receiver<()>,
}

impl Default for BufferManager {
    fn default() -> Self {
        Self::new()
    }
}

impl BufferManager {
    pub fn new() -> Self {
        let (free_tx, free_rx) = bounded(SLOTS);
        let (filled_tx, filled_rx) = bounded(SLOTS);
        let (exit_tx, exit_rx) = bounded(0);
        for index in 0..SLOTS {
            // capacity is SLOTS, this can't block
            let _ = free_tx.send(index);
        }
        Self {
            free_tx,
            free_rx,
            filled_tx,
            filled_rx,
            exit_tx: Mutex::new(Some(exit_tx)),
            exit_rx,
        }
    }

    /// Blocks until a free buffer is available. Returns `None` once exit has
    /// been requested.
    pub fn get_free_buffer(&self) -> Option<usize> {
        if self.exit_requested() {
            return None;
        }
        select! {
            recv(self.free_rx) -> index => index.ok(),
            recv(self.exit_rx) -> _ => None,
        }
    }

    /// Hands a fully written buffer to the consumer.
    pub fn put_filled_buffer(&self, index: usize) {
        debug_assert!(index < SLOTS);
        // at most SLOTS indices exist, so the channel never fills up
        let _ = self.filled_tx.send(index);
    }

    /// Polls for the newest published buffer without blocking.
    ///
    /// Older buffers published since the last poll are recycled straight
    /// into the free pool.
    pub fn get_filled_buffer(&self) -> Filled {
        let mut newest = None;
        while let Ok(index) = self.filled_rx.try_recv() {
            if let Some(stale) = newest.replace(index) {
                self.put_free_buffer(stale);
            }
        }
        match newest {
            Some(index) => Filled::Ready(index),
            None if self.exit_requested() => Filled::Exit,
            None => Filled::Empty,
        }
    }

    /// Returns a buffer the consumer no longer reads to the free pool.
    pub fn put_free_buffer(&self, index: usize) {
        debug_assert!(index < SLOTS);
        let _ = self.free_tx.send(index);
    }

    /// Signals shutdown. Safe to call any number of times.
    pub fn request_exit(&self) {
        self.exit_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    pub fn exit_requested(&self) -> bool {
        matches!(self.exit_rx.try_recv(), Err(TryRecvError::Disconnected))
    }
}

/// The buffers themselves together with the manager deciding who owns them.
///
/// Each buffer sits behind a mutex only so it can be shared in safe code;
/// the index protocol already guarantees the lock is never contended.
pub struct Slots {
    buffers: [Mutex<Vec<u32>>; SLOTS],
    pub manager: BufferManager,
}

impl Default for Slots {
    fn default() -> Self {
        Self::new()
    }
}

impl Slots {
    pub fn new() -> Self {
        Self {
            buffers: Default::default(),
            manager: BufferManager::new(),
        }
    }

    /// Access to buffer `index`. Only the current owner of `index` may call
    /// this.
    pub fn lock(&self, index: usize) -> MutexGuard<'_, Vec<u32>> {
        self.buffers[index]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;
    use std::time::Instant;

    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_free_buffers_are_distinct() {
        let manager = BufferManager::new();
        let mut taken: Vec<_> = (0..SLOTS)
            .map(|_| manager.get_free_buffer().unwrap())
            .collect();
        taken.sort_unstable();
        assert_eq!(taken, vec![0, 1, 2]);
    }

    #[test]
    fn test_filled_is_empty_until_published() {
        let manager = BufferManager::new();
        assert_eq!(manager.get_filled_buffer(), Filled::Empty);
        let index = manager.get_free_buffer().unwrap();
        manager.put_filled_buffer(index);
        assert_eq!(manager.get_filled_buffer(), Filled::Ready(index));
        assert_eq!(manager.get_filled_buffer(), Filled::Empty);
    }

    #[test]
    fn test_consumer_skips_to_newest() {
        let manager = BufferManager::new();
        let first = manager.get_free_buffer().unwrap();
        manager.put_filled_buffer(first);
        let second = manager.get_free_buffer().unwrap();
        manager.put_filled_buffer(second);

        assert_eq!(manager.get_filled_buffer(), Filled::Ready(second));
        // `first` went back to the pool along with the untouched third slot
        let mut free = vec![
            manager.get_free_buffer().unwrap(),
            manager.get_free_buffer().unwrap(),
        ];
        free.sort_unstable();
        let mut expected: Vec<_> = (0..SLOTS).filter(|&i| i != second).collect();
        expected.sort_unstable();
        assert_eq!(free, expected);
    }

    #[test]
    fn test_pending_buffer_is_delivered_before_exit() {
        let manager = BufferManager::new();
        let index = manager.get_free_buffer().unwrap();
        manager.put_filled_buffer(index);
        manager.request_exit();
        manager.request_exit();
        assert_eq!(manager.get_filled_buffer(), Filled::Ready(index));
        assert_eq!(manager.get_filled_buffer(), Filled::Exit);
        assert_eq!(manager.get_free_buffer(), None);
    }

    #[test]
    fn test_exit_wakes_blocked_producer() {
        let manager = Arc::new(BufferManager::new());
        for _ in 0..SLOTS {
            manager.get_free_buffer().unwrap();
        }
        let producer = {
            let manager = manager.clone();
            thread::spawn(move || manager.get_free_buffer())
        };
        thread::sleep(Duration::from_millis(20));
        let start = Instant::now();
        manager.request_exit();
        assert_eq!(producer.join().unwrap(), None);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_producer_and_consumer_never_share_a_buffer() {
        const FRAMES: u32 = 500;
        let slots = Arc::new(Slots::new());

        let consumer = {
            let slots = slots.clone();
            thread::spawn(move || {
                let mut current: Option<usize> = None;
                let mut last_frame = 0;
                loop {
                    match slots.manager.get_filled_buffer() {
                        Filled::Exit => break,
                        Filled::Ready(index) => {
                            if let Some(previous) = current.replace(index) {
                                slots.manager.put_free_buffer(previous);
                            }
                        }
                        Filled::Empty => {}
                    }
                    if let Some(index) = current {
                        let buffer = slots.lock(index);
                        let frame = buffer[0];
                        // a torn buffer would mix two frame numbers
                        assert!(buffer.iter().all(|&w| w == frame));
                        assert!(frame >= last_frame, "frames went backwards");
                        last_frame = frame;
                    }
                }
                last_frame
            })
        };

        for frame in 1..=FRAMES {
            let index = slots.manager.get_free_buffer().unwrap();
            {
                let mut buffer = slots.lock(index);
                buffer.clear();
                buffer.resize(64, frame);
            }
            slots.manager.put_filled_buffer(index);
        }
        slots.manager.request_exit();
        assert_eq!(consumer.join().unwrap(), FRAMES);
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum State {
        Free,
        Writing,
        Filled,
        InUse,
    }

    #[derive(Debug, Clone, Copy)]
    enum Step {
        Produce,
        Consume,
    }

    fn step() -> impl Strategy<Value = Step> {
        prop_oneof![Just(Step::Produce), Just(Step::Consume)]
    }

    proptest! {
        #[test]
        fn prop_slot_states_stay_disjoint(steps in proptest::collection::vec(step(), 1..200)) {
            let manager = BufferManager::new();
            let mut states = [State::Free; SLOTS];
            let mut current: Option<usize> = None;

            for step in steps {
                match step {
                    Step::Produce => {
                        // a real producer would block here, skip instead
                        if !states.contains(&State::Free) {
                            continue;
                        }
                        let index = manager.get_free_buffer().unwrap();
                        prop_assert_eq!(states[index], State::Free);
                        states[index] = State::Writing;
                        manager.put_filled_buffer(index);
                        states[index] = State::Filled;
                    }
                    Step::Consume => match manager.get_filled_buffer() {
                        Filled::Ready(index) => {
                            prop_assert_eq!(states[index], State::Filled);
                            for state in states.iter_mut() {
                                if *state == State::Filled {
                                    *state = State::Free;
                                }
                            }
                            if let Some(previous) = current.replace(index) {
                                manager.put_free_buffer(previous);
                                states[previous] = State::Free;
                            }
                            states[index] = State::InUse;
                        }
                        Filled::Empty => {
                            prop_assert!(!states.contains(&State::Filled));
                        }
                        Filled::Exit => prop_assert!(false, "exit was never requested"),
                    },
                }
                let writing = states.iter().filter(|&&s| s == State::Writing).count();
                let in_use = states.iter().filter(|&&s| s == State::InUse).count();
                prop_assert!(writing <= 1);
                prop_assert!(in_use <= 1);
            }
        }
    }
}
