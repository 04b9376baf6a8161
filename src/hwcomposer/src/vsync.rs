//! vsync: a background thread that waits on the kernel's vsync timestamp node and forwards
//! every timestamp to the display server. It never touches pipe state.

use std::fs::File;
use std::io;
use std::os::unix::io::AsRawFd;
use std::os::unix::io::RawFd;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::thread::JoinHandle;

use crossbeam_channel::Sender;
use nix::errno::Errno;
use nix::poll::poll;
use nix::poll::PollFd;
use nix::poll::PollFlags;
use nix::sys::uio::pread;
use vmm_sys_util::eventfd::EventFd;
use vmm_sys_util::eventfd::EFD_NONBLOCK;

use crate::hwc_utils::*;

/// Vsync timestamp node of the primary framebuffer.
pub const VSYNC_EVENT_PATH: &str = "/sys/class/graphics/fb0/vsync_event";

const VSYNC_THREAD_NAME: &str = "hwc-vsync";

/// Parses the contents of a vsync node, either `VSYNC=<ns>` or a bare number. When several
/// events were read at once the last one wins.
pub fn parse_vsync_timestamp(text: &str) -> Option<u64> {
    let line = text.lines().map(str::trim).filter(|l| !l.is_empty()).last()?;
    let value = line.strip_prefix("VSYNC=").unwrap_or(line);
    value.parse().ok()
}

/// Something that signals readability on every vsync.
pub trait VsyncSource: Send {
    fn raw_fd(&self) -> RawFd;

    /// Events that mean a new timestamp is ready.
    fn poll_flags(&self) -> PollFlags {
        PollFlags::POLLIN
    }

    /// Reads the timestamp of the vsync that made the descriptor readable.
    fn read_timestamp(&mut self) -> io::Result<Option<u64>>;
}

/// The sysfs vsync node. Sysfs attributes always poll readable, so only the `POLLPRI` and
/// `POLLERR` raised by the kernel's notification count, and the node is re-read from offset 0.
pub struct SysfsVsync {
    file: File,
}

impl SysfsVsync {
    pub fn open<P: AsRef<Path>>(path: P) -> HwcResult<SysfsVsync> {
        Ok(SysfsVsync {
            file: File::open(path)?,
        })
    }
}

impl VsyncSource for SysfsVsync {
    fn raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }

    fn poll_flags(&self) -> PollFlags {
        PollFlags::POLLPRI | PollFlags::POLLERR
    }

    fn read_timestamp(&mut self) -> io::Result<Option<u64>> {
        let mut buf = [0u8; 64];
        let len = pread(self.file.as_raw_fd(), &mut buf, 0).map_err(io::Error::from)?;
        Ok(parse_vsync_timestamp(&String::from_utf8_lossy(&buf[..len])))
    }
}

/// Handle on the running vsync thread. Dropping it stops the thread.
pub struct VsyncThread {
    enabled: Arc<AtomicBool>,
    stop: EventFd,
    handle: Option<JoinHandle<()>>,
}

impl VsyncThread {
    /// Starts forwarding the timestamps of `source` to `sender`. Delivery starts disabled.
    pub fn spawn(source: Box<dyn VsyncSource>, sender: Sender<u64>) -> HwcResult<VsyncThread> {
        let stop = EventFd::new(EFD_NONBLOCK).map_err(HwcError::EventFd)?;
        let thread_stop = stop.try_clone().map_err(HwcError::EventFd)?;
        let enabled = Arc::new(AtomicBool::new(false));
        let thread_enabled = enabled.clone();
        let handle = thread::Builder::new()
            .name(VSYNC_THREAD_NAME.to_string())
            .spawn(move || run(source, thread_stop, thread_enabled, sender))
            .map_err(|err| HwcError::SpawnThread {
                name: VSYNC_THREAD_NAME,
                err,
            })?;
        Ok(VsyncThread {
            enabled,
            stop,
            handle: Some(handle),
        })
    }

    /// Turns timestamp delivery on or off. Events that arrive while disabled are dropped.
    pub fn set_enabled(&self, enabled: bool) {
        debug!("vsync: {}", if enabled { "enabled" } else { "disabled" });
        self.enabled.store(enabled, Ordering::Release);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Stops the thread and waits for it. Stopping twice does nothing.
    pub fn stop(&mut self) {
        let handle = match self.handle.take() {
            Some(handle) => handle,
            None => return,
        };
        if let Err(e) = self.stop.write(1) {
            error!("vsync: failed to signal stop: {}", e);
            return;
        }
        if handle.join().is_err() {
            error!("vsync: thread panicked");
        }
    }
}

impl Drop for VsyncThread {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(
    mut source: Box<dyn VsyncSource>,
    stop: EventFd,
    enabled: Arc<AtomicBool>,
    sender: Sender<u64>,
) {
    let readable = source.poll_flags();
    loop {
        let mut fds = [
            PollFd::new(source.raw_fd(), readable),
            PollFd::new(stop.as_raw_fd(), PollFlags::POLLIN),
        ];
        match poll(&mut fds, -1) {
            Ok(_) => {}
            Err(Errno::EINTR) => continue,
            Err(e) => {
                error!("vsync: poll failed: {}", e);
                return;
            }
        }
        if fds[1].revents().map_or(false, |r| r.contains(PollFlags::POLLIN)) {
            debug!("vsync: stopping");
            return;
        }
        let revents = match fds[0].revents() {
            Some(revents) => revents,
            None => continue,
        };
        if !revents.intersects(readable) {
            if revents.intersects(PollFlags::POLLHUP | PollFlags::POLLNVAL) {
                warn!("vsync: source closed");
                return;
            }
            continue;
        }
        match source.read_timestamp() {
            Ok(Some(timestamp)) => {
                if !enabled.load(Ordering::Acquire) {
                    continue;
                }
                trace!("vsync: {}", timestamp);
                if sender.send(timestamp).is_err() {
                    debug!("vsync: receiver gone, stopping");
                    return;
                }
            }
            Ok(None) => warn!("vsync: unreadable timestamp"),
            Err(e) => {
                error!("vsync: failed to read timestamp: {}", e);
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;
    use std::io::Write;
    use std::os::unix::io::FromRawFd;
    use std::time::Duration;

    use crossbeam_channel::unbounded;
    use vmm_sys_util::tempdir::TempDir;

    use super::*;

    struct PipeVsync {
        file: File,
    }

    impl VsyncSource for PipeVsync {
        fn raw_fd(&self) -> RawFd {
            self.file.as_raw_fd()
        }

        fn read_timestamp(&mut self) -> io::Result<Option<u64>> {
            let mut buf = [0u8; 64];
            let len = self.file.read(&mut buf)?;
            Ok(parse_vsync_timestamp(&String::from_utf8_lossy(&buf[..len])))
        }
    }

    fn pipe_source() -> (PipeVsync, File) {
        let (read_fd, write_fd) = nix::unistd::pipe().unwrap();
        // SAFETY: both descriptors were just created and are owned by nothing else.
        let (read, write) = unsafe { (File::from_raw_fd(read_fd), File::from_raw_fd(write_fd)) };
        (PipeVsync { file: read }, write)
    }

    #[test]
    fn parses_timestamps() {
        assert_eq!(parse_vsync_timestamp("VSYNC=41866165"), Some(41866165));
        assert_eq!(parse_vsync_timestamp("12345\n"), Some(12345));
        assert_eq!(parse_vsync_timestamp("VSYNC=1\nVSYNC=2\n"), Some(2));
        assert_eq!(parse_vsync_timestamp("VSYNC="), None);
        assert_eq!(parse_vsync_timestamp(""), None);
    }

    #[test]
    fn forwards_timestamps_when_enabled() {
        let (source, mut writer) = pipe_source();
        let (tx, rx) = unbounded();
        let mut vsync = VsyncThread::spawn(Box::new(source), tx).unwrap();
        assert!(!vsync.is_enabled());

        writer.write_all(b"VSYNC=100\n").unwrap();
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());

        vsync.set_enabled(true);
        writer.write_all(b"VSYNC=200\n").unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)), Ok(200));

        vsync.stop();
        vsync.stop();
    }

    #[test]
    fn closed_source_ends_the_thread() {
        let (source, writer) = pipe_source();
        let (tx, rx) = unbounded();
        let _vsync = VsyncThread::spawn(Box::new(source), tx).unwrap();
        drop(writer);
        // The thread drops its sender when it exits.
        assert!(rx.recv_timeout(Duration::from_secs(5)).is_err());
        assert!(rx.is_empty());
    }

    fn vsync_node(dir: &TempDir) -> std::path::PathBuf {
        let path = dir.as_path().join("vsync_event");
        std::fs::write(&path, "VSYNC=42\n").unwrap();
        path
    }

    #[test]
    fn sysfs_node_is_reread_from_the_start() {
        let dir = TempDir::new().unwrap();
        let mut node = SysfsVsync::open(vsync_node(&dir)).unwrap();
        assert_eq!(node.poll_flags(), PollFlags::POLLPRI | PollFlags::POLLERR);
        assert_eq!(node.read_timestamp().unwrap(), Some(42));
        assert_eq!(node.read_timestamp().unwrap(), Some(42));
    }

    #[test]
    fn sysfs_node_waits_for_a_notification() {
        let dir = TempDir::new().unwrap();
        let node = SysfsVsync::open(vsync_node(&dir)).unwrap();
        let (tx, rx) = unbounded();
        let mut vsync = VsyncThread::spawn(Box::new(node), tx).unwrap();
        vsync.set_enabled(true);

        // An always-readable node must not be taken as a stream of vsyncs.
        std::thread::sleep(Duration::from_millis(100));
        assert!(rx.try_recv().is_err());

        vsync.stop();
    }
}
