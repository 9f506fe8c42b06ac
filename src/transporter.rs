//! The external delivery collaborator.

use crate::error::Result;

/// Delivers a sealed chunk's bytes downstream (e.g. over the network to a
/// forwarding daemon).
///
/// Implementations must not retain `bytes` after `transport` returns: the
/// engine releases the underlying region back to the pool immediately on
/// success.
pub trait Transporter: Send + Sync {
    fn transport(&self, tag: &str, bytes: &[u8]) -> Result<()>;
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::sync::Mutex;

    /// A transporter that records every call it received, for assertions
    /// in engine-level tests.
    #[derive(Default)]
    pub struct CapturingTransporter {
        pub calls: Mutex<Vec<(String, Vec<u8>)>>,
    }

    impl Transporter for CapturingTransporter {
        fn transport(&self, tag: &str, bytes: &[u8]) -> Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push((tag.to_string(), bytes.to_vec()));
            Ok(())
        }
    }

    /// A transporter that fails its first `fail_count` calls, then
    /// delegates to a capturing transporter.
    pub struct FlakyTransporter {
        pub fail_count: std::sync::atomic::AtomicUsize,
        pub inner: CapturingTransporter,
    }

    impl FlakyTransporter {
        pub fn new(fail_count: usize) -> Self {
            Self {
                fail_count: std::sync::atomic::AtomicUsize::new(fail_count),
                inner: CapturingTransporter::default(),
            }
        }
    }

    impl Transporter for FlakyTransporter {
        fn transport(&self, tag: &str, bytes: &[u8]) -> Result<()> {
            use std::sync::atomic::Ordering;
            let remaining = self.fail_count.load(Ordering::SeqCst);
            if remaining > 0 {
                self.fail_count.fetch_sub(1, Ordering::SeqCst);
                return Err(crate::error::BufferError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "simulated transport failure",
                )));
            }
            self.inner.transport(tag, bytes)
        }
    }
}
