//! Terminal input thread.
//!
//! One reader thread blocks on stdin and hands characters to the CPU
//! loop one at a time. After storing a character it waits on the
//! condition variable until the CPU consumes it through the terminal
//! interrupt, so at most one character is ever buffered.

use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;

struct Shared {
    pending: Mutex<Option<u8>>,
    consumed: Condvar,
    stop: AtomicBool,
}

pub struct Terminal {
    shared: Arc<Shared>,
}

impl Terminal {
    /// Start the stdin reader thread.
    pub fn spawn() -> Self {
        let shared = Arc::new(Shared {
            pending: Mutex::new(None),
            consumed: Condvar::new(),
            stop: AtomicBool::new(false),
        });

        let reader_shared = Arc::clone(&shared);
        thread::spawn(move || {
            let mut stdin = std::io::stdin();
            let mut buffer = [0u8; 1];
            loop {
                match stdin.read(&mut buffer) {
                    Ok(1) => {}
                    _ => break,
                }
                if reader_shared.stop.load(Ordering::SeqCst) {
                    break;
                }
                let mut pending = match reader_shared.pending.lock() {
                    Ok(guard) => guard,
                    Err(_) => break,
                };
                *pending = Some(buffer[0]);
                while pending.is_some() && !reader_shared.stop.load(Ordering::SeqCst) {
                    pending = match reader_shared.consumed.wait(pending) {
                        Ok(guard) => guard,
                        Err(_) => return,
                    };
                }
            }
        });

        Terminal { shared }
    }

    /// Take the buffered character, if any, and release the reader to
    /// fetch the next one.
    pub fn poll(&self) -> Option<u8> {
        let mut pending = match self.shared.pending.lock() {
            Ok(guard) => guard,
            Err(_) => return None,
        };
        let ch = pending.take();
        if ch.is_some() {
            self.shared.consumed.notify_one();
        }
        ch
    }

    /// Tell the reader thread to exit. It may still be blocked in a stdin
    /// read; process exit takes care of that.
    pub fn stop(&self) {
        self.shared.stop.store(true, Ordering::SeqCst);
        self.shared.consumed.notify_one();
    }
}

impl Drop for Terminal {
    fn drop(&mut self) {
        self.stop();
    }
}
