//! lock: the advisory lock shared between a buffer's producer and the display. The display
//! holds a read lock while a buffer is queued so the producer cannot overwrite it mid-scanout.

use std::sync::Condvar;
use std::sync::Mutex;
use std::time::Duration;

use crate::hwc_utils::*;

#[derive(Debug, Default)]
struct LockState {
    readers: usize,
    writer: bool,
}

/// Shared read / exclusive write lock with bounded waits.
#[derive(Debug, Default)]
pub struct BufferLock {
    state: Mutex<LockState>,
    cond: Condvar,
}

impl BufferLock {
    pub fn new() -> BufferLock {
        BufferLock::default()
    }

    /// Takes a shared lock, waiting up to `timeout` for a writer to finish.
    pub fn lock_read(&self, timeout: Duration) -> HwcResult<()> {
        let state = self.state.lock().unwrap();
        let (mut state, result) = self
            .cond
            .wait_timeout_while(state, timeout, |s| s.writer)
            .unwrap();
        if result.timed_out() && state.writer {
            warn!("buffer lock: read lock timed out after {:?}", timeout);
            return Err(HwcError::LockTimeout(timeout));
        }
        state.readers += 1;
        Ok(())
    }

    /// Takes the exclusive lock, waiting up to `timeout` for readers and writers to leave.
    pub fn lock_write(&self, timeout: Duration) -> HwcResult<()> {
        let state = self.state.lock().unwrap();
        let (mut state, result) = self
            .cond
            .wait_timeout_while(state, timeout, |s| s.writer || s.readers > 0)
            .unwrap();
        if result.timed_out() && (state.writer || state.readers > 0) {
            warn!("buffer lock: write lock timed out after {:?}", timeout);
            return Err(HwcError::LockTimeout(timeout));
        }
        state.writer = true;
        Ok(())
    }

    /// Drops the writer if there is one, otherwise one reader.
    pub fn unlock(&self) {
        let mut state = self.state.lock().unwrap();
        if state.writer {
            state.writer = false;
        } else if state.readers > 0 {
            state.readers -= 1;
        } else {
            warn!("buffer lock: unlock without a holder");
            return;
        }
        self.cond.notify_all();
    }

    pub fn readers(&self) -> usize {
        self.state.lock().unwrap().readers
    }

    pub fn is_write_locked(&self) -> bool {
        self.state.lock().unwrap().writer
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    const SHORT: Duration = Duration::from_millis(20);

    #[test]
    fn readers_share() {
        let lock = BufferLock::new();
        lock.lock_read(SHORT).unwrap();
        lock.lock_read(SHORT).unwrap();
        assert_eq!(lock.readers(), 2);
        assert!(matches!(
            lock.lock_write(SHORT),
            Err(HwcError::LockTimeout(_))
        ));
        lock.unlock();
        lock.unlock();
        lock.lock_write(SHORT).unwrap();
        assert!(lock.is_write_locked());
    }

    #[test]
    fn reader_times_out_behind_writer() {
        let lock = BufferLock::new();
        lock.lock_write(SHORT).unwrap();
        assert!(matches!(
            lock.lock_read(SHORT),
            Err(HwcError::LockTimeout(_))
        ));
        assert_eq!(lock.readers(), 0);
    }

    #[test]
    fn reader_wakes_when_writer_leaves() {
        let lock = Arc::new(BufferLock::new());
        lock.lock_write(SHORT).unwrap();
        let producer = lock.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            producer.unlock();
        });
        lock.lock_read(Duration::from_secs(5)).unwrap();
        handle.join().unwrap();
        assert_eq!(lock.readers(), 1);
    }

    #[test]
    fn stray_unlock_is_ignored() {
        let lock = BufferLock::new();
        lock.unlock();
        assert_eq!(lock.readers(), 0);
        assert!(!lock.is_write_locked());
    }
}
